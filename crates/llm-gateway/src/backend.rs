use async_trait::async_trait;

use crate::error::GatewayResult;
use crate::request::GenerateRequest;

/// A text-generation backend.
///
/// Implementations perform exactly one attempt per call; retry, timeout,
/// caching and cancellation are layered on top by [`crate::Gateway`].
/// Transient failures must be reported as [`crate::GatewayError::Transient`].
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Generate a completion for the request.
    async fn generate(&self, request: &GenerateRequest) -> GatewayResult<String>;

    /// Cheap liveness check used by the readiness probe.
    async fn health(&self) -> GatewayResult<()>;
}
