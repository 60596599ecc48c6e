//! Pipeline orchestration.
//!
//! Order of a run:
//!
//! 1. validate the configuration (no I/O yet)
//! 2. load the requirement registry and select the targeted requirements
//! 3. segment the document
//! 4. probe the LLM backend
//! 5. run the selected strategy under the run's cancellation token
//! 6. aggregate one verdict per requirement
//! 7. write the report
//!
//! Steps 1-4 abort the run on failure. From step 5 on, failures are local to
//! a requirement and end up as `Unclear` verdicts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use deontic_solver::SolverAdapter;
use dpacheck_core::{
    aggregate, load_document, obs, retain_segment_ids, write_report, CancelToken,
    CompletenessReport, Metrics, Requirement, RequirementRegistry, Segment,
};
use llm_gateway::{Gateway, HttpBackend, LlmBackend};
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::error::{EvalError, Result};
use crate::strategy::StrategyRunner;

/// A finished run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: CompletenessReport,
    pub report_path: PathBuf,
}

/// Inputs resolved before any model call.
struct PreparedRun {
    requirements: Vec<Requirement>,
    segments: Vec<Segment>,
    document_name: String,
}

pub struct Pipeline {
    config: RunConfig,
    backend: Arc<dyn LlmBackend>,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(config: RunConfig, backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            config,
            backend,
            cancel: CancelToken::new(),
        }
    }

    /// Build the HTTP backend described by the configuration.
    pub fn from_config(config: RunConfig) -> Result<Self> {
        let backend = HttpBackend::new(config.backend_config())?;
        Ok(Self::new(config, Arc::new(backend)))
    }

    /// Use an externally owned token, e.g. one cancelled on Ctrl-C.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    fn prepare(&self) -> Result<PreparedRun> {
        let config = &self.config;
        config.validate()?;

        let registry = RequirementRegistry::load(&config.requirements_path)?;
        let requirements = registry.select(&config.requirement_ids)?;

        let mut segments = load_document(
            &config.document_path,
            config.target_document.as_deref(),
            config.max_segments,
        )?;
        if let Some(ids) = &config.segment_ids {
            segments = retain_segment_ids(segments, ids)?;
        }
        let document_name = segments
            .first()
            .map(|s| s.source_document_id.clone())
            .unwrap_or_default();

        Ok(PreparedRun {
            requirements,
            segments,
            document_name,
        })
    }

    /// Execute the whole run and write the report.
    pub async fn run(&self) -> Result<RunOutcome> {
        let started = Instant::now();
        let config = &self.config;
        let prepared = self.prepare()?;

        let gateway = Arc::new(
            Gateway::new(Arc::clone(&self.backend), config.gateway_config())
                .with_cancel(self.cancel.subscribe()),
        );
        // a cancelled probe falls through; the strategy then marks every
        // requirement as cancelled without calling the backend
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                info!("run cancelled during readiness probe");
            }
            ready = gateway.probe_ready(config.llm.readiness_attempts, config.readiness_delay()) => {
                ready?;
            }
        }

        let run_id = Uuid::new_v4();
        let run_label = run_id.to_string();
        let metrics = Arc::new(Metrics::new());

        obs::emit_run_started(
            &run_label,
            config.strategy.as_str(),
            &config.model,
            prepared.requirements.len(),
            prepared.segments.len(),
        );

        let deadline = config.deadline().map(|d| self.cancel.cancel_after(d));
        let runner = StrategyRunner::new(
            Arc::clone(&gateway),
            config.generate_options(),
            self.cancel.clone(),
            Arc::clone(&metrics),
        )
        .with_solver(SolverAdapter::new(config.solver_config()))
        .with_workers(config.max_workers, config.max_solver_workers)
        .with_require_actor_fact(config.require_actor_fact);

        let outcomes = runner
            .run(config.strategy, &prepared.requirements, &prepared.segments)
            .instrument(obs::run_span(&run_label))
            .await;
        if let Some(handle) = deadline {
            handle.abort();
        }

        let _span = obs::RunSpan::enter(&run_label);
        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            let reason = if config.deadline_ms.is_some() {
                "deadline reached or cancellation requested"
            } else {
                "cancellation requested"
            };
            obs::emit_run_cancelled(&run_label, reason);
        }

        let verdicts = aggregate(
            config.strategy,
            &prepared.requirements,
            outcomes,
            &config.aggregation_policy(),
        );
        for verdict in &verdicts {
            obs::emit_requirement_evaluated(
                &verdict.requirement_id,
                &verdict.completeness.to_string(),
            );
        }

        let gateway_stats = gateway.stats();
        metrics.record_gateway(
            gateway_stats.calls,
            gateway_stats.retries,
            gateway_stats.cache_hits,
        );
        metrics.flush();

        let report = CompletenessReport::new(
            run_id,
            config.strategy,
            config.model.clone(),
            prepared.document_name,
            prepared.segments.len(),
            verdicts,
        )
        .with_statistics(metrics.snapshot())
        .with_cancelled(cancelled);

        let report_path = write_report(&config.output_directory, &report)
            .map_err(|e| EvalError::Report(format!("{e:#}")))?;
        info!(path = %report_path.display(), "report written");

        obs::emit_run_finished(
            &run_label,
            started.elapsed().as_millis() as u64,
            report.summary.complete,
            report.summary.incomplete,
            report.summary.unclear,
        );

        Ok(RunOutcome {
            report,
            report_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpacheck_core::DpaError;
    use llm_gateway::fakes::ScriptedBackend;

    #[tokio::test]
    async fn invalid_config_fails_before_any_io() {
        let backend = Arc::new(ScriptedBackend::constant("NONE"));
        let config = RunConfig {
            requirements_path: "/nonexistent/requirements.json".into(),
            document_path: "/nonexistent/dpa.txt".into(),
            max_workers: 0,
            ..RunConfig::default()
        };
        let err = Pipeline::new(config, backend.clone()).run().await.unwrap_err();
        assert!(matches!(err, EvalError::Dpa(DpaError::Configuration(_))));
        assert_eq!(backend.calls(), 0);
    }

    #[test]
    fn from_config_builds_http_backend() {
        let config = RunConfig::default();
        let pipeline = Pipeline::from_config(config).unwrap();
        assert_eq!(pipeline.backend.name(), "ollama");
        assert!(!pipeline.cancel_token().is_cancelled());
    }
}
