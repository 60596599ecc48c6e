//! dpacheck core library
//!
//! Domain model, requirement registry, document segmentation, verdict
//! aggregation, run cancellation, report artifacts and the observability
//! helpers shared by the evaluation crates.

pub mod aggregate;
pub mod cancel;
pub mod domain;
pub mod metrics;
pub mod obs;
pub mod registry;
pub mod report;
pub mod segmenter;
pub mod telemetry;

pub use aggregate::{
    aggregate, AggregationPolicy, CoverageAggregation, StrategyOutcome,
    DEFAULT_COVERAGE_THRESHOLD,
};
pub use cancel::CancelToken;
pub use domain::{
    clamp_score, is_atom, Completeness, DeonticEncoding, DpaError, Evidence, ExtractedFact,
    Modality, PairScore, Requirement, RequirementId, Result, Segment, SegmentId, SolverResult,
    SolverStatus, Strategy, Verdict, DEFAULT_ACTOR,
};
pub use metrics::{Metrics, RunStatistics};
pub use registry::{RequirementRegistry, RequirementSelector};
pub use report::{
    render_summary_md, write_report, write_report_json, CompletenessReport, ReportSummary,
    REPORT_FILE_NAME, SUMMARY_FILE_NAME,
};
pub use segmenter::{
    document_id_from_path, load_document, parse_segment_table, retain_segment_ids, segment,
};
pub use telemetry::{init_tracing, level_for};
