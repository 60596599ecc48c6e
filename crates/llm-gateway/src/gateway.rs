//! The gateway: one entry point for every model call made during a run.
//!
//! Layers per-call timeout, transient-failure retry, response caching,
//! response cleaning and cancellation over an [`LlmBackend`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::backend::LlmBackend;
use crate::clean::clean_response;
use crate::error::{GatewayError, GatewayResult};
use crate::request::GenerateRequest;
use crate::retry::{run_with_retry, RetryPolicy};

/// Upper bound on a single readiness check.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Gateway behaviour independent of the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayConfig {
    pub retry: RetryPolicy,
    /// Cache cleaned responses in memory, keyed by the full request.
    pub cache: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            cache: true,
        }
    }
}

/// Counter values of a gateway.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayStats {
    /// Calls that reached the backend (cache misses).
    pub calls: u64,
    /// Extra attempts spent on transient failures.
    pub retries: u64,
    pub cache_hits: u64,
}

/// Resolve once the cancellation flag is set. Never resolves if the
/// sender goes away without cancelling.
pub async fn wait_for_cancel(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub struct Gateway {
    backend: Arc<dyn LlmBackend>,
    config: GatewayConfig,
    cache: Mutex<HashMap<String, String>>,
    cancel: Option<watch::Receiver<bool>>,
    calls: AtomicU64,
    retries: AtomicU64,
    cache_hits: AtomicU64,
}

impl Gateway {
    pub fn new(backend: Arc<dyn LlmBackend>, config: GatewayConfig) -> Self {
        Self {
            backend,
            config,
            cache: Mutex::new(HashMap::new()),
            cancel: None,
            calls: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        }
    }

    /// Abort pending and future calls once `cancel` turns true.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Generate a completion and return it with reasoning sections removed.
    ///
    /// Fails with [`GatewayError::BackendUnavailable`] once transient
    /// retries are exhausted, [`GatewayError::InvalidRequest`] when the
    /// backend rejects the request, and [`GatewayError::Cancelled`] when the
    /// run is cancelled first.
    pub async fn generate(&self, request: &GenerateRequest) -> GatewayResult<String> {
        if self.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        let key = self.config.cache.then(|| request.cache_key());
        if let Some(key) = &key {
            if let Some(hit) = self.cache.lock().await.get(key).cloned() {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                debug!(backend = self.backend.name(), "cache hit");
                return Ok(hit);
            }
        }

        self.calls.fetch_add(1, Ordering::Relaxed);
        let timeout = Duration::from_millis(request.options.timeout_ms);
        let attempt = run_with_retry(&self.config.retry, timeout, || {
            self.backend.generate(request)
        });
        let outcome = match self.cancel.clone() {
            Some(mut rx) => tokio::select! {
                biased;
                _ = wait_for_cancel(&mut rx) => return Err(GatewayError::Cancelled),
                outcome = attempt => outcome,
            },
            None => attempt.await,
        };
        self.retries
            .fetch_add(u64::from(outcome.attempts.saturating_sub(1)), Ordering::Relaxed);

        let text = clean_response(&outcome.result?);
        if let Some(key) = key {
            self.cache.lock().await.insert(key, text.clone());
        }
        Ok(text)
    }

    /// Poll the backend's health endpoint until it answers, at most
    /// `attempts` times with `delay` between polls.
    pub async fn probe_ready(&self, attempts: u32, delay: Duration) -> GatewayResult<()> {
        let attempts = attempts.max(1);
        let mut last_reason = String::new();
        for attempt in 1..=attempts {
            let result = tokio::time::timeout(HEALTH_TIMEOUT, self.backend.health())
                .await
                .unwrap_or_else(|_| Err(GatewayError::Transient("health check timed out".into())));
            match result {
                Ok(()) => {
                    info!(backend = self.backend.name(), attempt, "backend ready");
                    return Ok(());
                }
                Err(err) => {
                    warn!(backend = self.backend.name(), attempt, error = %err, "backend not ready");
                    last_reason = err.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(GatewayError::BackendUnavailable {
            attempts,
            reason: last_reason,
        })
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            calls: self.calls.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }
}
