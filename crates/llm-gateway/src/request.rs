use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_MODEL: &str = "llama3.3:70b";

/// Sampling and transport options for one generation call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateOptions {
    /// Backend model identifier.
    pub model: String,
    pub temperature: f32,
    /// Response length cap in tokens.
    pub max_tokens: u32,
    /// Deadline for a single attempt, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: 1024,
            timeout_ms: 120_000,
        }
    }
}

impl GenerateOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// A prompt plus the options it is sent with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub options: GenerateOptions,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, options: GenerateOptions) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            options,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// SHA-256 over the full prompt and every option, hex encoded.
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.options.model.as_bytes(),
            self.system.as_deref().unwrap_or("").as_bytes(),
            self.prompt.as_bytes(),
        ] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        hasher.update(u8::from(self.system.is_some()).to_le_bytes());
        hasher.update(self.options.temperature.to_bits().to_le_bytes());
        hasher.update(self.options.max_tokens.to_le_bytes());
        hasher.update(self.options.timeout_ms.to_le_bytes());
        hex::encode(hasher.finalize())
    }
}
