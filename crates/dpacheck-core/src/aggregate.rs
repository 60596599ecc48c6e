//! Verdict aggregation.
//!
//! Maps the strategy-specific outcome of every targeted requirement onto the
//! common [`Verdict`] shape. The three strategies report through one tagged
//! variant, [`StrategyOutcome`], so there is a single mapping path.
//!
//! # Invariants
//!
//! - The output has exactly one verdict per targeted requirement, in the
//!   order the requirements were given (registry order).
//! - A requirement without an outcome, or with a missing one, is `Unclear`.
//! - Outcomes for ids outside the targeted set are dropped.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{
    Completeness, DpaError, Evidence, PairScore, Requirement, RequirementId, SolverResult,
    SolverStatus, Strategy, Verdict,
};

// ---------------------------------------------------------------------------
// Strategy outcomes (input to the aggregator)
// ---------------------------------------------------------------------------

/// What a strategy produced for one requirement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyOutcome {
    /// Classify-extract-verify: the solver's judgement.
    Solver(SolverResult),
    /// Pairwise: every coverage score obtained for the requirement.
    Pairwise { scores: Vec<PairScore> },
    /// Direct: the model's verdict, passed through.
    Direct(Verdict),
    /// No usable evidence (backend failure, cancellation, nothing matched).
    Missing { reason: String },
}

impl StrategyOutcome {
    pub fn missing(reason: impl Into<String>) -> Self {
        Self::Missing {
            reason: reason.into(),
        }
    }

    fn produced_by(&self, strategy: Strategy) -> bool {
        match self {
            StrategyOutcome::Solver(_) => strategy == Strategy::ClassifyExtractVerify,
            StrategyOutcome::Pairwise { .. } => strategy == Strategy::Pairwise,
            StrategyOutcome::Direct(_) => strategy == Strategy::Direct,
            StrategyOutcome::Missing { .. } => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Pairwise policy
// ---------------------------------------------------------------------------

/// How per-segment coverage scores combine into one requirement score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoverageAggregation {
    #[default]
    Max,
    MeanTopK { k: usize },
}

impl CoverageAggregation {
    /// Combine scores; `None` when there are none.
    pub fn combine(&self, scores: &[f32]) -> Option<f32> {
        if scores.is_empty() {
            return None;
        }
        match self {
            CoverageAggregation::Max => scores.iter().copied().reduce(f32::max),
            CoverageAggregation::MeanTopK { k } => {
                let mut sorted = scores.to_vec();
                sorted.sort_by(|a, b| b.total_cmp(a));
                let take = (*k).clamp(1, sorted.len());
                Some(sorted[..take].iter().sum::<f32>() / take as f32)
            }
        }
    }
}

impl fmt::Display for CoverageAggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoverageAggregation::Max => f.write_str("max"),
            CoverageAggregation::MeanTopK { k } => write!(f, "mean-top-k:{k}"),
        }
    }
}

impl FromStr for CoverageAggregation {
    type Err = DpaError;

    /// Accepts `max` or `mean-top-k:<k>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s == "max" {
            return Ok(Self::Max);
        }
        let k = s
            .strip_prefix("mean-top-k:")
            .or_else(|| s.strip_prefix("mean_top_k:"))
            .and_then(|k| k.trim().parse::<usize>().ok())
            .ok_or_else(|| {
                DpaError::Configuration(format!(
                    "unknown coverage aggregation '{s}' (expected max or mean-top-k:<k>)"
                ))
            })?;
        Ok(Self::MeanTopK { k })
    }
}

/// Default coverage threshold for the pairwise strategy.
pub const DEFAULT_COVERAGE_THRESHOLD: f32 = 0.7;

/// Parameters the aggregator needs for pairwise outcomes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AggregationPolicy {
    /// Combined coverage at or above this value is `Complete`.
    pub coverage_threshold: f32,
    pub aggregation: CoverageAggregation,
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        Self {
            coverage_threshold: DEFAULT_COVERAGE_THRESHOLD,
            aggregation: CoverageAggregation::Max,
        }
    }
}

impl AggregationPolicy {
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.coverage_threshold = threshold;
        self
    }

    pub fn with_aggregation(mut self, aggregation: CoverageAggregation) -> Self {
        self.aggregation = aggregation;
        self
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Produce one verdict per requirement, in the order of `requirements`.
pub fn aggregate(
    strategy: Strategy,
    requirements: &[Requirement],
    mut outcomes: HashMap<RequirementId, StrategyOutcome>,
    policy: &AggregationPolicy,
) -> Vec<Verdict> {
    let verdicts: Vec<Verdict> = requirements
        .iter()
        .map(|req| match outcomes.remove(&req.id) {
            Some(outcome) if !outcome.produced_by(strategy) => {
                warn!(
                    requirement_id = %req.id,
                    strategy = %strategy,
                    "outcome does not belong to the running strategy"
                );
                Verdict::unclear(&req.id, format!("outcome not produced by {strategy}"))
            }
            Some(outcome) => to_verdict(&req.id, outcome, policy),
            None => Verdict::unclear(&req.id, "no result produced"),
        })
        .collect();

    for stray in outcomes.keys() {
        warn!(requirement_id = %stray, "dropping outcome for untargeted requirement");
    }
    verdicts
}

fn to_verdict(
    requirement_id: &str,
    outcome: StrategyOutcome,
    policy: &AggregationPolicy,
) -> Verdict {
    match outcome {
        StrategyOutcome::Solver(result) => solver_verdict(requirement_id, result),
        StrategyOutcome::Pairwise { scores } => pairwise_verdict(requirement_id, scores, policy),
        StrategyOutcome::Direct(mut verdict) => {
            verdict.requirement_id = requirement_id.to_string();
            verdict
        }
        StrategyOutcome::Missing { reason } => Verdict::unclear(requirement_id, reason),
    }
}

fn solver_verdict(requirement_id: &str, result: SolverResult) -> Verdict {
    let completeness = match result.status {
        SolverStatus::Satisfied => Completeness::Complete,
        SolverStatus::Violated => Completeness::Incomplete,
        SolverStatus::Undetermined => Completeness::Unclear,
    };

    let mut segment_ids: Vec<&str> = Vec::new();
    for fact in &result.supporting_facts {
        if !segment_ids.contains(&fact.segment_id.as_str()) {
            segment_ids.push(&fact.segment_id);
        }
    }
    let justification = match result.status {
        SolverStatus::Satisfied => format!(
            "solver found the requirement fulfilled by {} fact(s)",
            result.supporting_facts.len()
        ),
        SolverStatus::Violated => format!(
            "solver found the requirement violated by {} fact(s)",
            result.supporting_facts.len()
        ),
        SolverStatus::Undetermined => "solver could not determine the status".to_string(),
    };

    let mut evidence: Vec<Evidence> = segment_ids
        .into_iter()
        .map(|id| Evidence::Segment {
            segment_id: id.to_string(),
        })
        .collect();
    evidence.push(Evidence::Solver(result));

    Verdict {
        requirement_id: requirement_id.to_string(),
        completeness,
        evidence,
        justification,
    }
}

fn pairwise_verdict(
    requirement_id: &str,
    scores: Vec<PairScore>,
    policy: &AggregationPolicy,
) -> Verdict {
    let values: Vec<f32> = scores.iter().map(|s| s.coverage_score).collect();
    let Some(coverage) = policy.aggregation.combine(&values) else {
        return Verdict::unclear(requirement_id, "no segment produced a coverage score");
    };

    let completeness = if coverage >= policy.coverage_threshold {
        Completeness::Complete
    } else {
        Completeness::Incomplete
    };
    let best = scores
        .iter()
        .max_by(|a, b| a.coverage_score.total_cmp(&b.coverage_score))
        .map(|s| s.segment_id.clone())
        .unwrap_or_default();
    let justification = format!(
        "coverage {:.2} ({} over {} segment(s), threshold {:.2}), best segment {}",
        coverage,
        policy.aggregation,
        scores.len(),
        policy.coverage_threshold,
        best
    );

    Verdict {
        requirement_id: requirement_id.to_string(),
        completeness,
        evidence: scores.into_iter().map(Evidence::Pair).collect(),
        justification,
    }
}
