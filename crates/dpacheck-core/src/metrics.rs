//! Run-scoped atomic counters.
//!
//! One [`Metrics`] instance is shared (behind an `Arc`) by every task of a
//! run. Counters are incremented silently at the call site; call
//! [`Metrics::flush`] at the end of the run to emit the totals as a single
//! `tracing::info!` event and [`Metrics::snapshot`] to copy them into the
//! report.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counter values persisted in the report's `statistics` block.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunStatistics {
    pub llm_calls: u64,
    pub llm_retries: u64,
    pub cache_hits: u64,
    pub solver_invocations: u64,
    pub extraction_failures: u64,
}

/// Lightweight atomic counters, no allocations, no locking.
pub struct Metrics {
    llm_calls: AtomicU64,
    llm_retries: AtomicU64,
    cache_hits: AtomicU64,
    solver_invocations: AtomicU64,
    extraction_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            llm_calls: AtomicU64::new(0),
            llm_retries: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            solver_invocations: AtomicU64::new(0),
            extraction_failures: AtomicU64::new(0),
        }
    }

    /// Add the gateway's call counters, typically once at the end of a run.
    pub fn record_gateway(&self, calls: u64, retries: u64, cache_hits: u64) {
        self.llm_calls.fetch_add(calls, Ordering::Relaxed);
        self.llm_retries.fetch_add(retries, Ordering::Relaxed);
        self.cache_hits.fetch_add(cache_hits, Ordering::Relaxed);
    }

    pub fn inc_solver_invocations(&self) {
        self.solver_invocations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "solver_invocations", "counter incremented");
    }

    pub fn inc_extraction_failures(&self) {
        self.extraction_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "extraction_failures", "counter incremented");
    }

    pub fn solver_invocations(&self) -> u64 {
        self.solver_invocations.load(Ordering::Relaxed)
    }

    pub fn extraction_failures(&self) -> u64 {
        self.extraction_failures.load(Ordering::Relaxed)
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> RunStatistics {
        RunStatistics {
            llm_calls: self.llm_calls.load(Ordering::Relaxed),
            llm_retries: self.llm_retries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            solver_invocations: self.solver_invocations(),
            extraction_failures: self.extraction_failures(),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            llm_calls = s.llm_calls,
            llm_retries = s.llm_retries,
            cache_hits = s.cache_hits,
            solver_invocations = s.solver_invocations,
            extraction_failures = s.extraction_failures,
        );
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.llm_calls.store(0, Ordering::Relaxed);
        self.llm_retries.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.solver_invocations.store(0, Ordering::Relaxed);
        self.extraction_failures.store(0, Ordering::Relaxed);
    }
}
