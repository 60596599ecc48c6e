//! Run configuration.
//!
//! A [`RunConfig`] is either loaded from JSON (missing fields take their
//! defaults) or assembled from command-line flags, then checked with
//! [`RunConfig::validate`] before any input is read.

use std::path::{Path, PathBuf};
use std::time::Duration;

use deontic_solver::SolverConfig;
use dpacheck_core::{
    AggregationPolicy, CoverageAggregation, DpaError, RequirementSelector, Result, SegmentId,
    Strategy, DEFAULT_COVERAGE_THRESHOLD,
};
use llm_gateway::{
    BackendKind, GatewayConfig, GenerateOptions, HttpBackendConfig, RetryPolicy,
    DEFAULT_MODEL, DEFAULT_OLLAMA_URL,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_OUTPUT_DIR: &str = "results";
pub const PROGRAMS_DIR: &str = "programs";

/// LLM backend and request settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    pub kind: BackendKind,
    pub base_url: String,
    /// Never written back out; supply via `DPACHECK_API_KEY`.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub readiness_attempts: u32,
    pub readiness_delay_ms: u64,
    pub cache: bool,
}

impl Default for LlmSettings {
    fn default() -> Self {
        let options = GenerateOptions::default();
        let retry = RetryPolicy::default();
        Self {
            kind: BackendKind::Ollama,
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            api_key: None,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            timeout_ms: options.timeout_ms,
            max_retries: retry.max_retries,
            backoff_base_ms: retry.backoff_base_ms,
            readiness_attempts: 5,
            readiness_delay_ms: 2_000,
            cache: true,
        }
    }
}

/// External solver settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverSettings {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_ms: u64,
    pub success_exit_codes: Vec<i32>,
    /// Keep every generated program under `<output_directory>/programs`.
    pub keep_programs: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        let solver = SolverConfig::default();
        Self {
            program: solver.program,
            args: solver.args,
            timeout_ms: solver.timeout_ms,
            success_exit_codes: solver.success_exit_codes,
            keep_programs: false,
        }
    }
}

/// Everything one evaluation run needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    pub model: String,
    pub strategy: Strategy,

    /// Requirement source (JSON object keyed by requirement id).
    pub requirements_path: PathBuf,

    /// Plain-text DPA or a JSON segment table.
    pub document_path: PathBuf,

    /// Document name inside a segment table; defaults to the file stem.
    pub target_document: Option<String>,

    /// Keep only the first N segments (0 = all).
    pub max_segments: usize,

    pub requirement_ids: RequirementSelector,

    /// Restrict the run to these segment ids (applied after truncation).
    pub segment_ids: Option<Vec<SegmentId>>,

    pub output_directory: PathBuf,
    pub verbose: bool,

    pub llm: LlmSettings,
    pub solver: SolverSettings,

    pub coverage_threshold: f32,
    pub aggregation: CoverageAggregation,

    /// Drop a segment's facts unless the requirement's actor was extracted.
    pub require_actor_fact: bool,

    /// Concurrent LLM calls.
    pub max_workers: usize,
    /// Concurrent solver processes.
    pub max_solver_workers: usize,

    /// Cancel the evaluation once this much time has passed.
    pub deadline_ms: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            strategy: Strategy::default(),
            requirements_path: PathBuf::new(),
            document_path: PathBuf::new(),
            target_document: None,
            max_segments: 0,
            requirement_ids: RequirementSelector::All,
            segment_ids: None,
            output_directory: PathBuf::from(DEFAULT_OUTPUT_DIR),
            verbose: false,
            llm: LlmSettings::default(),
            solver: SolverSettings::default(),
            coverage_threshold: DEFAULT_COVERAGE_THRESHOLD,
            aggregation: CoverageAggregation::Max,
            require_actor_fact: false,
            max_workers: 4,
            max_solver_workers: 2,
            deadline_ms: None,
        }
    }
}

fn invalid(message: impl Into<String>) -> DpaError {
    DpaError::Configuration(message.into())
}

impl RunConfig {
    /// Load a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Check every parameter that can be checked without touching inputs.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(invalid("model must not be empty"));
        }
        if self.requirements_path.as_os_str().is_empty() {
            return Err(invalid("requirements path is required"));
        }
        if self.document_path.as_os_str().is_empty() {
            return Err(invalid("document path is required"));
        }
        if self.output_directory.as_os_str().is_empty() {
            return Err(invalid("output directory is required"));
        }
        if self.max_workers == 0 {
            return Err(invalid("max_workers must be at least 1"));
        }
        if self.max_solver_workers == 0 {
            return Err(invalid("max_solver_workers must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.coverage_threshold) {
            return Err(invalid(format!(
                "coverage threshold {} is outside [0, 1]",
                self.coverage_threshold
            )));
        }
        if let CoverageAggregation::MeanTopK { k: 0 } = self.aggregation {
            return Err(invalid("mean-top-k aggregation needs k >= 1"));
        }
        if self.llm.base_url.trim().is_empty() {
            return Err(invalid("LLM base URL must not be empty"));
        }
        if self.llm.timeout_ms == 0 {
            return Err(invalid("LLM timeout must be positive"));
        }
        if self.strategy == Strategy::ClassifyExtractVerify
            && self.solver.program.trim().is_empty()
        {
            return Err(invalid("solver program must not be empty"));
        }
        if matches!(&self.segment_ids, Some(ids) if ids.is_empty()) {
            return Err(invalid("segment id filter is empty"));
        }
        if self.deadline_ms == Some(0) {
            return Err(invalid("deadline must be positive"));
        }
        Ok(())
    }

    /// Per-request options sent to the gateway.
    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions::default()
            .with_model(self.model.clone())
            .with_temperature(self.llm.temperature)
            .with_max_tokens(self.llm.max_tokens)
            .with_timeout_ms(self.llm.timeout_ms)
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            retry: RetryPolicy {
                max_retries: self.llm.max_retries,
                backoff_base_ms: self.llm.backoff_base_ms,
            },
            cache: self.llm.cache,
        }
    }

    pub fn backend_config(&self) -> HttpBackendConfig {
        let config = HttpBackendConfig::new(self.llm.kind, self.llm.base_url.clone());
        match &self.llm.api_key {
            Some(key) => config.with_api_key(key.clone()),
            None => config,
        }
    }

    pub fn solver_config(&self) -> SolverConfig {
        let config = SolverConfig::custom(
            self.solver.program.clone(),
            self.solver.args.clone(),
            self.solver.timeout_ms,
        )
        .with_success_exit_codes(self.solver.success_exit_codes.clone());
        if self.solver.keep_programs {
            config.with_keep_programs_dir(self.output_directory.join(PROGRAMS_DIR))
        } else {
            config
        }
    }

    pub fn aggregation_policy(&self) -> AggregationPolicy {
        AggregationPolicy::default()
            .with_threshold(self.coverage_threshold)
            .with_aggregation(self.aggregation)
    }

    pub fn readiness_delay(&self) -> Duration {
        Duration::from_millis(self.llm.readiness_delay_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}
