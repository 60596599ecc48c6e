//! Domain-level error taxonomy for dpacheck.

/// Errors that abort a run before or while its inputs are loaded.
///
/// Per-requirement problems (backend failures, unparseable model output,
/// solver trouble) never surface here; they degrade the affected verdict
/// to `Unclear` instead.
#[derive(Debug, thiserror::Error)]
pub enum DpaError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("malformed requirement {id}: {reason}")]
    MalformedRequirement { id: String, reason: String },

    #[error("unknown requirement id: {0}")]
    UnknownRequirement(String),

    #[error("document {0} produced no segments")]
    EmptyDocument(String),

    #[error("no segments found for document {0}")]
    UnknownDocument(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DpaError {
    pub fn malformed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRequirement {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for dpacheck domain operations.
pub type Result<T> = std::result::Result<T, DpaError>;
