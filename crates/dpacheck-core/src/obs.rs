//! Structured lifecycle events for evaluation runs.
//!
//! Every run enters a [`RunSpan`] so that all events emitted while it is
//! alive carry the run's `run_id`. Events are plain `tracing` records with
//! an `event` field naming them.

use tracing::{debug, info, warn};

/// RAII guard that enters a run-scoped tracing span.
///
/// ```ignore
/// let _span = RunSpan::enter("6f1c...");
/// // every event below is tagged run_id = 6f1c...
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        Self {
            _span: run_span(run_id).entered(),
        }
    }
}

/// The run span itself, for instrumenting futures that cross `.await`.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("dpacheck.run", run_id = %run_id)
}

/// Emit event: run started.
pub fn emit_run_started(
    run_id: &str,
    strategy: &str,
    model: &str,
    requirement_count: usize,
    segment_count: usize,
) {
    info!(
        event = "run.started",
        run_id = %run_id,
        strategy = %strategy,
        model = %model,
        requirements = requirement_count,
        segments = segment_count,
    );
}

/// Emit event: a requirement received its verdict.
pub fn emit_requirement_evaluated(requirement_id: &str, completeness: &str) {
    info!(
        event = "requirement.evaluated",
        requirement_id = %requirement_id,
        completeness = %completeness,
    );
}

/// Emit event: model output for a segment could not be used.
pub fn emit_extraction_failed(
    segment_id: &str,
    requirement_id: Option<&str>,
    stage: &str,
    reason: &str,
) {
    warn!(
        event = "extraction.failed",
        segment_id = %segment_id,
        requirement_id = requirement_id.unwrap_or("-"),
        stage = %stage,
        reason = %reason,
    );
}

/// Emit event: solver finished for a requirement.
pub fn emit_solver_invoked(requirement_id: &str, status: &str, duration_ms: u64) {
    info!(
        event = "solver.invoked",
        requirement_id = %requirement_id,
        status = %status,
        duration_ms = duration_ms,
    );
}

/// Emit event: a pair score was dropped because the response was unusable.
pub fn emit_pair_unscored(segment_id: &str, requirement_id: &str, reason: &str) {
    debug!(
        event = "pair.unscored",
        segment_id = %segment_id,
        requirement_id = %requirement_id,
        reason = %reason,
    );
}

/// Emit event: the run was cancelled before all work finished.
pub fn emit_run_cancelled(run_id: &str, reason: &str) {
    warn!(event = "run.cancelled", run_id = %run_id, reason = %reason);
}

/// Emit event: run finished.
pub fn emit_run_finished(
    run_id: &str,
    duration_ms: u64,
    complete: usize,
    incomplete: usize,
    unclear: usize,
) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        complete = complete,
        incomplete = incomplete,
        unclear = unclear,
    );
}
