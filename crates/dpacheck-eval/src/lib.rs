//! dpacheck evaluation
//!
//! The three completeness strategies (classify-extract-verify, pairwise,
//! direct), the bounded worker pool they share, and the [`Pipeline`] that
//! turns a [`RunConfig`] into a completeness report.

pub mod config;
pub mod direct;
pub mod error;
pub mod extractor;
pub mod pairwise;
pub mod pipeline;
pub mod pool;
pub mod prompts;
pub mod strategy;

pub use config::{LlmSettings, RunConfig, SolverSettings, DEFAULT_OUTPUT_DIR, PROGRAMS_DIR};
pub use direct::{parse_direct_response, DirectEvaluator};
pub use error::{EvalError, Result};
pub use extractor::{
    merge_facts, parse_classification, parse_facts, ExtractionFailure, ExtractionStage,
    FactExtractor,
};
pub use pairwise::{parse_pair_response, PairwiseComparator};
pub use pipeline::{Pipeline, RunOutcome};
pub use pool::WorkerPool;
pub use strategy::{Outcomes, StrategyRunner};
