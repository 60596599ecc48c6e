//! Error types for the LLM gateway

use thiserror::Error;

/// Errors produced by backends and the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// A single attempt failed in a way that may succeed on retry
    /// (connection refused, timeout, HTTP 5xx or 429).
    #[error("transient backend failure: {0}")]
    Transient(String),

    /// Every attempt failed transiently.
    #[error("backend unavailable after {attempts} attempt(s): {reason}")]
    BackendUnavailable { attempts: u32, reason: String },

    /// The backend rejected the request (HTTP 4xx other than 429).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The backend answered but the payload could not be decoded.
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    /// The run's cancellation signal fired while the call was pending.
    #[error("request cancelled")]
    Cancelled,
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: &str) -> Self {
        let mut body = body.trim().to_string();
        if body.len() > 200 {
            let mut cut = 200;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        let msg = format!("HTTP {status}: {body}");
        if status == 429 || (500..600).contains(&status) {
            GatewayError::Transient(msg)
        } else {
            GatewayError::InvalidRequest(msg)
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::MalformedResponse(err.to_string())
        } else if let Some(status) = err.status() {
            GatewayError::from_status(status.as_u16(), &err.to_string())
        } else if err.is_builder() {
            GatewayError::InvalidRequest(err.to_string())
        } else {
            // connect, timeout, request and body errors
            GatewayError::Transient(err.to_string())
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(GatewayError::from_status(503, "overloaded").is_transient());
        assert!(GatewayError::from_status(429, "slow down").is_transient());
        assert!(matches!(
            GatewayError::from_status(400, "bad prompt"),
            GatewayError::InvalidRequest(_)
        ));
        assert!(matches!(
            GatewayError::from_status(404, "model not found"),
            GatewayError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_status_body_is_truncated() {
        let body = "é".repeat(300);
        let msg = GatewayError::from_status(500, &body).to_string();
        assert!(msg.len() < 260);
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::BackendUnavailable {
            attempts: 3,
            reason: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "backend unavailable after 3 attempt(s): connection refused"
        );
        assert_eq!(GatewayError::Cancelled.to_string(), "request cancelled");
    }
}
