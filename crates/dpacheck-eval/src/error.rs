//! Pipeline error types

use dpacheck_core::DpaError;
use llm_gateway::GatewayError;
use thiserror::Error;

/// Errors that abort a run before or after the evaluation itself.
///
/// Per-requirement failures never surface here; they become `Unclear`
/// verdicts.
#[derive(Error, Debug)]
pub enum EvalError {
    #[error(transparent)]
    Dpa(#[from] DpaError),

    #[error("LLM backend: {0}")]
    Gateway(#[from] GatewayError),

    #[error("failed to write report: {0}")]
    Report(String),
}

impl EvalError {
    /// True for problems with the run parameters or inputs, as opposed to
    /// the environment.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EvalError::Dpa(
                DpaError::Configuration(_)
                    | DpaError::MalformedRequirement { .. }
                    | DpaError::UnknownRequirement(_)
                    | DpaError::EmptyDocument(_)
                    | DpaError::UnknownDocument(_)
            )
        )
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, EvalError>;
