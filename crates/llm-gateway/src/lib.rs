//! LLM gateway
//!
//! A uniform request/response interface to text-generation backends.
//! [`HttpBackend`] speaks the Ollama and OpenAI-compatible HTTP APIs;
//! [`Gateway`] adds per-call timeouts, retry with exponential backoff on
//! transient failures, an optional response cache, readiness probing and
//! cancellation.

pub mod backend;
pub mod clean;
pub mod error;
pub mod fakes;
pub mod gateway;
pub mod http;
pub mod request;
pub mod retry;

pub use backend::LlmBackend;
pub use clean::clean_response;
pub use error::{GatewayError, GatewayResult};
pub use gateway::{wait_for_cancel, Gateway, GatewayConfig, GatewayStats};
pub use http::{BackendKind, HttpBackend, HttpBackendConfig, DEFAULT_OLLAMA_URL};
pub use request::{GenerateOptions, GenerateRequest, DEFAULT_MODEL};
pub use retry::{run_with_retry, RetryOutcome, RetryPolicy};
