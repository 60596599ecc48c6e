//! dpacheck - DPA completeness checker
//!
//! Evaluates a Data Processing Agreement against GDPR requirements with a
//! language model and a deontic-logic solver.
//!
//! ## Commands
//!
//! - `run`: evaluate a document and write the completeness report
//! - `requirements`: list the requirements a selection resolves to
//! - `segment`: show how a document is segmented
//! - `probe`: check that the LLM backend answers

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dpacheck_core::{
    load_document, CoverageAggregation, RequirementRegistry, RequirementSelector, Strategy,
};
use dpacheck_eval::{Pipeline, RunConfig};
use llm_gateway::{BackendKind, Gateway, GatewayConfig, HttpBackend, HttpBackendConfig};
use tracing::info;

#[derive(Parser)]
#[command(name = "dpacheck")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "GDPR completeness checks for Data Processing Agreements", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a DPA and write completeness_report.json
    Run(RunArgs),

    /// Load the requirement source and list the selected requirements
    Requirements {
        /// Requirement source (JSON)
        #[arg(short, long)]
        requirements: PathBuf,

        /// "all" or a comma-separated id list
        #[arg(long, default_value = "all")]
        req_ids: String,
    },

    /// Print the segments of a document
    Segment {
        /// Plain-text DPA or JSON segment table
        #[arg(short, long)]
        document: PathBuf,

        /// Document name inside a segment table
        #[arg(long)]
        target_document: Option<String>,

        /// Keep only the first N segments (0 = all)
        #[arg(long, default_value = "0")]
        max_segments: usize,
    },

    /// Check that the LLM backend is reachable
    Probe {
        #[command(flatten)]
        backend: BackendArgs,

        /// Health checks before giving up
        #[arg(long, default_value = "3")]
        attempts: u32,

        /// Delay between health checks (milliseconds)
        #[arg(long, default_value = "1000")]
        delay_ms: u64,
    },
}

#[derive(Args, Debug, Clone)]
struct BackendArgs {
    /// Backend protocol: ollama or openai
    #[arg(long, env = "DPACHECK_BACKEND")]
    backend: Option<BackendKind>,

    /// Backend base URL
    #[arg(long, env = "OLLAMA_HOST")]
    base_url: Option<String>,

    /// Bearer token for OpenAI-compatible servers
    #[arg(long, env = "DPACHECK_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

/// Flags for `run`. Every flag left out keeps the value from `--config`
/// (or the built-in default).
#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Load a RunConfig JSON file; other flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// rcv (classify-extract-verify), pairwise or direct
    #[arg(short, long)]
    strategy: Option<Strategy>,

    /// Requirement source (JSON)
    #[arg(short, long)]
    requirements: Option<PathBuf>,

    /// Plain-text DPA or JSON segment table
    #[arg(short, long)]
    document: Option<PathBuf>,

    /// Document name inside a segment table
    #[arg(long)]
    target_document: Option<String>,

    /// Model identifier
    #[arg(short, long, env = "DPACHECK_MODEL")]
    model: Option<String>,

    /// Keep only the first N segments (0 = all)
    #[arg(long)]
    max_segments: Option<usize>,

    /// "all" or a comma-separated requirement id list
    #[arg(long)]
    req_ids: Option<RequirementSelector>,

    /// Restrict the run to these segment ids
    #[arg(long, value_delimiter = ',')]
    segment_ids: Option<Vec<String>>,

    /// Output directory for the report
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    backend: BackendArgs,

    /// Sampling temperature
    #[arg(long)]
    temperature: Option<f32>,

    /// Response length cap
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Per-call timeout (milliseconds)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Retries for transient backend failures
    #[arg(long)]
    max_retries: Option<u32>,

    /// Disable the in-memory response cache
    #[arg(long)]
    no_cache: bool,

    /// Solver executable
    #[arg(long, env = "DPACHECK_SOLVER")]
    solver: Option<String>,

    /// Extra solver argument (repeatable)
    #[arg(long = "solver-arg", allow_hyphen_values = true)]
    solver_args: Vec<String>,

    /// Solver timeout (milliseconds)
    #[arg(long)]
    solver_timeout_ms: Option<u64>,

    /// Keep generated logic programs under <output>/programs
    #[arg(long)]
    keep_programs: bool,

    /// Coverage threshold for the pairwise strategy
    #[arg(long)]
    threshold: Option<f32>,

    /// Coverage aggregation: max or mean-top-k:<k>
    #[arg(long)]
    aggregation: Option<CoverageAggregation>,

    /// Drop facts unless the requirement's actor was also extracted
    #[arg(long)]
    require_actor_fact: bool,

    /// Concurrent LLM calls
    #[arg(long)]
    workers: Option<usize>,

    /// Concurrent solver processes
    #[arg(long)]
    solver_workers: Option<usize>,

    /// Cancel the evaluation after this many milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,
}

impl BackendArgs {
    fn apply(&self, config: &mut RunConfig) {
        if let Some(kind) = self.backend {
            config.llm.kind = kind;
        }
        if let Some(url) = &self.base_url {
            config.llm.base_url = url.clone();
        }
        if let Some(key) = &self.api_key {
            config.llm.api_key = Some(key.clone());
        }
    }

    fn http_config(&self) -> HttpBackendConfig {
        let mut config = RunConfig::default();
        self.apply(&mut config);
        config.backend_config()
    }
}

impl RunArgs {
    /// Build the run configuration: config file (or defaults), then flags.
    fn into_config(self, verbose: bool) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)
                .with_context(|| format!("Failed to load run config {:?}", path))?,
            None => RunConfig::default(),
        };

        macro_rules! set {
            ($($flag:ident => $($field:ident).+),* $(,)?) => {
                $(if let Some(value) = self.$flag.clone() {
                    config.$($field).+ = value;
                })*
            };
        }
        set! {
            strategy => strategy,
            requirements => requirements_path,
            document => document_path,
            model => model,
            max_segments => max_segments,
            req_ids => requirement_ids,
            output => output_directory,
            temperature => llm.temperature,
            max_tokens => llm.max_tokens,
            timeout_ms => llm.timeout_ms,
            max_retries => llm.max_retries,
            solver => solver.program,
            solver_timeout_ms => solver.timeout_ms,
            threshold => coverage_threshold,
            aggregation => aggregation,
            workers => max_workers,
            solver_workers => max_solver_workers,
        }
        if self.target_document.is_some() {
            config.target_document = self.target_document.clone();
        }
        if self.segment_ids.is_some() {
            config.segment_ids = self.segment_ids.clone();
        }
        if self.deadline_ms.is_some() {
            config.deadline_ms = self.deadline_ms;
        }
        if !self.solver_args.is_empty() {
            config.solver.args = self.solver_args.clone();
        }
        self.backend.apply(&mut config);
        config.llm.cache &= !self.no_cache;
        config.solver.keep_programs |= self.keep_programs;
        config.require_actor_fact |= self.require_actor_fact;
        config.verbose |= verbose;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        verbose,
        json,
        command,
    } = Cli::parse();

    let init_tracing = |verbose: bool| {
        dpacheck_core::init_tracing(json, dpacheck_core::level_for(verbose));
    };

    match command {
        Commands::Run(args) => {
            // a run's verbosity may also come from its config file
            let config = args.into_config(verbose)?;
            init_tracing(config.verbose);
            cmd_run(config).await
        }
        Commands::Requirements {
            requirements,
            req_ids,
        } => {
            init_tracing(verbose);
            cmd_requirements(&requirements, &req_ids)
        }
        Commands::Segment {
            document,
            target_document,
            max_segments,
        } => {
            init_tracing(verbose);
            cmd_segment(&document, target_document.as_deref(), max_segments)
        }
        Commands::Probe {
            backend,
            attempts,
            delay_ms,
        } => {
            init_tracing(verbose);
            cmd_probe(&backend, attempts, delay_ms).await
        }
    }
}

/// Run a full evaluation
async fn cmd_run(config: RunConfig) -> Result<()> {
    let pipeline = Pipeline::from_config(config).context("Failed to set up the LLM backend")?;

    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let outcome = pipeline.run().await.context("Evaluation run failed")?;
    let report = &outcome.report;

    println!(
        "{} requirement(s) evaluated with {} on '{}'",
        report.summary.total, report.strategy, report.target_document
    );
    println!("  complete:   {}", report.summary.complete);
    println!("  incomplete: {}", report.summary.incomplete);
    println!("  unclear:    {}", report.summary.unclear);
    if report.cancelled {
        println!("Run was cancelled; unfinished requirements are marked unclear.");
    }
    println!("Report: {}", outcome.report_path.display());
    Ok(())
}

/// List selected requirements
fn cmd_requirements(path: &Path, req_ids: &str) -> Result<()> {
    let registry = RequirementRegistry::load(path)
        .with_context(|| format!("Failed to load requirements from {:?}", path))?;
    let selector: RequirementSelector = req_ids.parse().context("Invalid --req-ids")?;
    let selected = registry
        .select(&selector)
        .context("Failed to select requirements")?;

    println!("{:<6} {:<12} {:<12} PREDICATE", "ID", "MODALITY", "ACTOR");
    for req in &selected {
        println!(
            "{:<6} {:<12} {:<12} {}",
            req.id,
            req.modality.to_string(),
            req.actor,
            req.encoding.predicate
        );
    }
    println!("\n{} of {} requirement(s)", selected.len(), registry.len());
    Ok(())
}

/// Print document segments
fn cmd_segment(path: &Path, target_document: Option<&str>, max_segments: usize) -> Result<()> {
    let segments = load_document(path, target_document, max_segments)
        .with_context(|| format!("Failed to segment {:?}", path))?;
    for segment in &segments {
        println!("[{}] {}", segment.id, segment.raw_text);
    }
    println!("\n{} segment(s)", segments.len());
    Ok(())
}

/// Probe backend readiness
async fn cmd_probe(backend: &BackendArgs, attempts: u32, delay_ms: u64) -> Result<()> {
    let http_config = backend.http_config();
    let url = http_config.base_url.clone();
    let http = HttpBackend::new(http_config).context("Failed to build HTTP client")?;
    let gateway = Gateway::new(Arc::new(http), GatewayConfig::default());

    gateway
        .probe_ready(attempts, Duration::from_millis(delay_ms))
        .await
        .with_context(|| format!("Backend at {} is not ready", url))?;

    println!("Backend {} at {} is ready", gateway.backend_name(), url);
    Ok(())
}
