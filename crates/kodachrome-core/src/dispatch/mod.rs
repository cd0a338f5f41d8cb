//! Eval dispatch: runs the external evaluation tool against a stored policy.
//!
//! # Modules
//!
//! - [`command`]: `EvalCommand` construction and render-backend environment
//! - [`runner`]: `EvalDispatcher` (admission gate, timeout, output capture)
//! - [`error`]: `DispatchError` / `DispatchResult`

pub mod command;
pub mod error;
pub mod runner;

pub use command::{render_env, EvalCommand};
pub use error::{DispatchError, DispatchResult};
pub use runner::{EvalDispatcher, ProcessOutput, TIMEOUT_EXIT_CODE, TIMEOUT_MARKER};
