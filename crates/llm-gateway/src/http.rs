//! HTTP backends: Ollama and OpenAI-compatible chat completion servers.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::backend::LlmBackend;
use crate::error::{GatewayError, GatewayResult};
use crate::request::GenerateRequest;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Wire protocol spoken by the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// `POST /api/generate`, health via `GET /api/tags`.
    #[default]
    Ollama,
    /// `POST /v1/chat/completions`, health via `GET /v1/models`.
    #[serde(rename = "openai", alias = "open_ai")]
    OpenAi,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Ollama => f.write_str("ollama"),
            BackendKind::OpenAi => f.write_str("openai"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(BackendKind::Ollama),
            "openai" | "open_ai" | "openai-compatible" => Ok(BackendKind::OpenAi),
            other => Err(format!(
                "unknown backend kind '{other}' (expected ollama or openai)"
            )),
        }
    }
}

/// Connection settings for an [`HttpBackend`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpBackendConfig {
    pub kind: BackendKind,
    pub base_url: String,
    /// Bearer token; only sent to OpenAI-compatible servers.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Ollama,
            base_url: std::env::var("OLLAMA_HOST")
                .unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string()),
            api_key: None,
        }
    }
}

impl HttpBackendConfig {
    pub fn new(kind: BackendKind, base_url: impl Into<String>) -> Self {
        Self {
            kind,
            base_url: base_url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Backend reached over HTTP.
pub struct HttpBackend {
    config: HttpBackendConfig,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("dpacheck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::InvalidRequest(format!("build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HttpBackendConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> GatewayResult<reqwest::Response> {
        let builder = match (&self.config.kind, &self.config.api_key) {
            (BackendKind::OpenAi, Some(key)) => builder.bearer_auth(key),
            _ => builder,
        };
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status.as_u16(), &body));
        }
        Ok(response)
    }

    async fn generate_ollama(&self, request: &GenerateRequest) -> GatewayResult<String> {
        let mut payload = json!({
            "model": request.options.model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": request.options.temperature,
                "num_predict": request.options.max_tokens,
            },
        });
        if let Some(system) = &request.system {
            payload["system"] = json!(system);
        }

        let response = self
            .send(self.client.post(self.url("/api/generate")).json(&payload))
            .await?;
        let body: OllamaResponse = response.json().await?;
        Ok(body.response)
    }

    async fn generate_openai(&self, request: &GenerateRequest) -> GatewayResult<String> {
        let mut messages = Vec::new();
        if let Some(system) = request.system.as_deref().filter(|s| !s.trim().is_empty()) {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));
        let payload = json!({
            "model": request.options.model,
            "messages": messages,
            "temperature": request.options.temperature,
            "max_tokens": request.options.max_tokens,
        });

        let response = self
            .send(self.client.post(self.url("/v1/chat/completions")).json(&payload))
            .await?;
        let body: OpenAiResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                GatewayError::MalformedResponse("response did not include choices".into())
            })
    }
}

#[async_trait]
impl LlmBackend for HttpBackend {
    fn name(&self) -> &str {
        match self.config.kind {
            BackendKind::Ollama => "ollama",
            BackendKind::OpenAi => "openai",
        }
    }

    async fn generate(&self, request: &GenerateRequest) -> GatewayResult<String> {
        match self.config.kind {
            BackendKind::Ollama => self.generate_ollama(request).await,
            BackendKind::OpenAi => self.generate_openai(request).await,
        }
    }

    async fn health(&self) -> GatewayResult<()> {
        let path = match self.config.kind {
            BackendKind::Ollama => "/api/tags",
            BackendKind::OpenAi => "/v1/models",
        };
        self.send(self.client.get(self.url(path))).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("Ollama".parse::<BackendKind>().unwrap(), BackendKind::Ollama);
        assert_eq!("openai".parse::<BackendKind>().unwrap(), BackendKind::OpenAi);
        assert!("anthropic".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::OpenAi.to_string(), "openai");
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let backend =
            HttpBackend::new(HttpBackendConfig::new(BackendKind::Ollama, "http://host:11434/"))
                .unwrap();
        assert_eq!(backend.url("/api/generate"), "http://host:11434/api/generate");
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let cfg =
            HttpBackendConfig::new(BackendKind::OpenAi, "http://x").with_api_key("sk-secret");
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
