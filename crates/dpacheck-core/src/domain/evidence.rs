//! Intermediate results produced by the evaluation strategies.

use serde::{Deserialize, Serialize};

use super::requirement::RequirementId;
use super::segment::SegmentId;

/// A ground predicate asserted by a segment with respect to a requirement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedFact {
    pub segment_id: SegmentId,
    pub requirement_id: RequirementId,
    /// Ground atom, with a leading `-` when the segment asserts it false.
    pub predicate: String,
    pub confidence: f32,
}

impl ExtractedFact {
    pub fn is_negated(&self) -> bool {
        self.predicate.starts_with('-')
    }

    /// The atom without classical negation.
    pub fn atom(&self) -> &str {
        self.predicate.strip_prefix('-').unwrap_or(&self.predicate)
    }
}

/// Outcome reported by the deontic solver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SolverStatus {
    Satisfied,
    Violated,
    Undetermined,
}

/// Solver result for one requirement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolverResult {
    pub requirement_id: RequirementId,
    pub status: SolverStatus,
    pub supporting_facts: Vec<ExtractedFact>,
    /// Raw solver stdout (and stderr when the run failed), kept for audit.
    pub raw_solver_output: String,
}

/// Coverage score for one (segment, requirement) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PairScore {
    pub segment_id: SegmentId,
    pub requirement_id: RequirementId,
    /// Always within `[0, 1]`.
    pub coverage_score: f32,
    pub rationale_text: String,
}

impl PairScore {
    pub fn new(
        segment_id: impl Into<SegmentId>,
        requirement_id: impl Into<RequirementId>,
        coverage_score: f32,
        rationale_text: impl Into<String>,
    ) -> Self {
        Self {
            segment_id: segment_id.into(),
            requirement_id: requirement_id.into(),
            coverage_score: clamp_score(coverage_score),
            rationale_text: rationale_text.into(),
        }
    }
}

/// Clamp a model-reported score into `[0, 1]`. NaN maps to 0.
pub fn clamp_score(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}
