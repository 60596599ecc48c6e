//! Error types for solver invocation

use thiserror::Error;

/// Failures of a single solver invocation.
///
/// These never reach callers of [`crate::SolverAdapter::solve`]; the adapter
/// folds them into an `Undetermined` result with the error text retained.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("solver program is not configured")]
    EmptyCommand,

    #[error("failed to start solver {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("solver timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("solver run cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for solver operations.
pub type Result<T> = std::result::Result<T, SolverError>;
