//! Completeness report artifacts.
//!
//! A run writes `completeness_report.json` (the canonical artifact) and a
//! Markdown rendering, `completeness_summary.md`, once at completion.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Completeness, Evidence, Strategy, Verdict};
use crate::metrics::RunStatistics;

pub const REPORT_SCHEMA_VERSION: &str = "1.0";
pub const REPORT_FILE_NAME: &str = "completeness_report.json";
pub const SUMMARY_FILE_NAME: &str = "completeness_summary.md";

/// Verdict counts by completeness label.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportSummary {
    pub total: usize,
    pub complete: usize,
    pub incomplete: usize,
    pub unclear: usize,
}

impl ReportSummary {
    pub fn from_verdicts(verdicts: &[Verdict]) -> Self {
        let count = |c: Completeness| verdicts.iter().filter(|v| v.completeness == c).count();
        Self {
            total: verdicts.len(),
            complete: count(Completeness::Complete),
            incomplete: count(Completeness::Incomplete),
            unclear: count(Completeness::Unclear),
        }
    }
}

/// The persisted result of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletenessReport {
    pub schema_version: String,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub strategy: Strategy,
    pub model: String,
    pub target_document: String,
    pub segment_count: usize,
    /// True when the run was cancelled or hit its deadline.
    pub cancelled: bool,
    pub summary: ReportSummary,
    pub statistics: RunStatistics,
    pub verdicts: Vec<Verdict>,
}

impl CompletenessReport {
    pub fn new(
        run_id: Uuid,
        strategy: Strategy,
        model: impl Into<String>,
        target_document: impl Into<String>,
        segment_count: usize,
        verdicts: Vec<Verdict>,
    ) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            run_id,
            generated_at: Utc::now(),
            strategy,
            model: model.into(),
            target_document: target_document.into(),
            segment_count,
            cancelled: false,
            summary: ReportSummary::from_verdicts(&verdicts),
            statistics: RunStatistics::default(),
            verdicts,
        }
    }

    pub fn with_statistics(mut self, statistics: RunStatistics) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn with_cancelled(mut self, cancelled: bool) -> Self {
        self.cancelled = cancelled;
        self
    }
}

/// Write `completeness_report.json` in pretty JSON format.
pub fn write_report_json(path: &Path, report: &CompletenessReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize completeness report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

fn evidence_ref(evidence: &Evidence) -> String {
    match evidence {
        Evidence::Segment { segment_id } => format!("segment {segment_id}"),
        Evidence::Solver(r) => format!("solver: {:?}", r.status).to_lowercase(),
        Evidence::Pair(p) => format!("segment {} ({:.2})", p.segment_id, p.coverage_score),
    }
}

/// Render the Markdown summary.
pub fn render_summary_md(report: &CompletenessReport) -> String {
    let mut out = String::new();
    out.push_str("# DPA Completeness Report\n\n");
    out.push_str(&format!(
        "- document: `{}`\n- strategy: {}\n- model: `{}`\n- segments: {}\n- run: `{}`\n",
        report.target_document, report.strategy, report.model, report.segment_count, report.run_id
    ));
    if report.cancelled {
        out.push_str("- **run was cancelled; unfinished requirements are marked unclear**\n");
    }
    out.push('\n');

    out.push_str("## Summary\n");
    out.push_str(&format!(
        "- total: {}\n- complete: {}\n- incomplete: {}\n- unclear: {}\n\n",
        report.summary.total,
        report.summary.complete,
        report.summary.incomplete,
        report.summary.unclear
    ));

    out.push_str("## Verdicts\n\n");
    out.push_str("| requirement | completeness | evidence | justification |\n");
    out.push_str("|---|---|---|---|\n");
    for v in &report.verdicts {
        let evidence = v
            .evidence
            .iter()
            .map(evidence_ref)
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            v.requirement_id,
            v.completeness,
            evidence,
            v.justification.replace('|', "\\|").replace('\n', " ")
        ));
    }
    out
}

/// Write both report artifacts into `dir`, creating it if needed.
/// Returns the path of the JSON report.
pub fn write_report(dir: &Path, report: &CompletenessReport) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;
    let json_path = dir.join(REPORT_FILE_NAME);
    write_report_json(&json_path, report)?;
    let md_path = dir.join(SUMMARY_FILE_NAME);
    std::fs::write(&md_path, render_summary_md(report))
        .with_context(|| format!("write {:?}", md_path))?;
    Ok(json_path)
}
