//! Core domain types for DPA completeness checking.

pub mod error;
pub mod evidence;
pub mod requirement;
pub mod segment;
pub mod verdict;

pub use error::{DpaError, Result};
pub use evidence::{clamp_score, ExtractedFact, PairScore, SolverResult, SolverStatus};
pub use requirement::{
    is_atom, DeonticEncoding, Modality, Requirement, RequirementId, DEFAULT_ACTOR,
};
pub use segment::{Segment, SegmentId};
pub use verdict::{Completeness, Evidence, Strategy, Verdict};
