//! Kodachrome Core Library
//!
//! Policy intake and eval orchestration behind the Kodachrome bot:
//! - Store uploaded policies under generated nicknames
//! - Run the external eval tool under a concurrency cap and a timeout
//! - Resolve the result link from run artifacts or captured output

pub mod config;
pub mod dispatch;
pub mod metrics;
pub mod names;
pub mod obs;
pub mod resolve;
pub mod store;
pub mod telemetry;
pub mod workflow;

pub use config::{ConfigError, EvalConfig, RenderBackend, StoreConfig};
pub use dispatch::{
    DispatchError, DispatchResult, EvalCommand, EvalDispatcher, ProcessOutput, TIMEOUT_EXIT_CODE,
};
pub use metrics::DispatchMetrics;
pub use names::{DockerStyleNames, NicknameGenerator, SequenceNames};
pub use resolve::{resolve_link, LinkSource, ResolvedLink, RunSummary};
pub use store::{MemoryUpload, PolicyStore, StoreError, StoredPolicy, Upload};
pub use telemetry::init_tracing;
pub use workflow::{Coordinator, EvalOutcome, IntakeOutcome, ReplySink};

/// Kodachrome version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
