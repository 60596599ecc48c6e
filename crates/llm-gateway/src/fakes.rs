//! Scripted in-process backend (testing only)
//!
//! [`ScriptedBackend`] answers every request through a closure, so tests can
//! decide per prompt what the "model" says, how long it takes and whether
//! it fails.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::LlmBackend;
use crate::error::{GatewayError, GatewayResult};
use crate::request::GenerateRequest;

type Responder = dyn Fn(&GenerateRequest) -> GatewayResult<String> + Send + Sync;
type Latency = dyn Fn(&GenerateRequest) -> Duration + Send + Sync;

pub struct ScriptedBackend {
    responder: Box<Responder>,
    latency: Box<Latency>,
    unhealthy_remaining: AtomicU32,
    calls: AtomicU64,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&GenerateRequest) -> GatewayResult<String> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            latency: Box::new(|_| Duration::ZERO),
            unhealthy_remaining: AtomicU32::new(0),
            calls: AtomicU64::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `text`.
    pub fn constant(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Fail transiently `failures` times, then answer with `text`.
    pub fn failing_then(failures: u32, text: &str) -> Self {
        let text = text.to_string();
        let seen = AtomicU32::new(0);
        Self::new(move |_| {
            if seen.fetch_add(1, Ordering::Relaxed) < failures {
                Err(GatewayError::Transient("connection refused".into()))
            } else {
                Ok(text.clone())
            }
        })
    }

    /// Delay every answer by `delay`.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.with_latency(move |_| delay)
    }

    /// Delay each answer by a per-request amount.
    pub fn with_latency<F>(mut self, latency: F) -> Self
    where
        F: Fn(&GenerateRequest) -> Duration + Send + Sync + 'static,
    {
        self.latency = Box::new(latency);
        self
    }

    /// Fail the first `checks` health checks.
    pub fn unhealthy_for(self, checks: u32) -> Self {
        self.unhealthy_remaining.store(checks, Ordering::Relaxed);
        self
    }

    /// Number of `generate` calls received.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Every prompt received, in arrival order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerateRequest) -> GatewayResult<String> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).push(request.prompt.clone());
        let delay = (self.latency)(request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(request)
    }

    async fn health(&self) -> GatewayResult<()> {
        let remaining = self.unhealthy_remaining.load(Ordering::Relaxed);
        if remaining > 0 {
            self.unhealthy_remaining.store(remaining - 1, Ordering::Relaxed);
            return Err(GatewayError::Transient("connection refused".into()));
        }
        Ok(())
    }
}
