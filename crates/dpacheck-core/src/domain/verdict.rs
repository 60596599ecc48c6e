use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::evidence::{PairScore, SolverResult};
use super::requirement::RequirementId;
use super::segment::SegmentId;

/// Final completeness label for one requirement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    Complete,
    Incomplete,
    Unclear,
}

impl fmt::Display for Completeness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Completeness::Complete => "complete",
            Completeness::Incomplete => "incomplete",
            Completeness::Unclear => "unclear",
        };
        f.write_str(s)
    }
}

/// One piece of evidence backing a verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    Segment { segment_id: SegmentId },
    Solver(SolverResult),
    Pair(PairScore),
}

/// Completeness verdict for one requirement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub requirement_id: RequirementId,
    pub completeness: Completeness,
    pub evidence: Vec<Evidence>,
    /// Short human-readable explanation of how the label was reached.
    pub justification: String,
}

impl Verdict {
    pub fn unclear(requirement_id: impl Into<RequirementId>, reason: impl Into<String>) -> Self {
        Self {
            requirement_id: requirement_id.into(),
            completeness: Completeness::Unclear,
            evidence: Vec::new(),
            justification: reason.into(),
        }
    }
}

/// Evaluation strategy selected for a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Classify segments, extract facts, verify with the deontic solver.
    #[default]
    #[serde(alias = "rcv")]
    ClassifyExtractVerify,
    /// Score every (segment, requirement) pair for coverage.
    Pairwise,
    /// Ask the model for a whole-document verdict per requirement.
    Direct,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::ClassifyExtractVerify => "classify_extract_verify",
            Strategy::Pairwise => "pairwise",
            Strategy::Direct => "direct",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "rcv" | "classify_extract_verify" => Ok(Strategy::ClassifyExtractVerify),
            "pairwise" => Ok(Strategy::Pairwise),
            "direct" => Ok(Strategy::Direct),
            other => Err(format!(
                "unknown strategy '{other}' (expected rcv, pairwise or direct)"
            )),
        }
    }
}
