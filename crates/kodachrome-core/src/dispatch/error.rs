//! Error types for eval dispatch.

/// Errors produced while launching or supervising an eval subprocess.
///
/// A nonzero exit or a timeout is not an error; both are reported through
/// [`ProcessOutput`](super::ProcessOutput).
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed while waiting on {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("eval admission gate is closed")]
    GateClosed,
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
