//! Document segmentation.
//!
//! Two document sources are supported:
//! - plain text, split into paragraphs on blank lines;
//! - a pre-segmented JSON table of `{ "dpa", "id", "sentence" }` rows
//!   covering one or more documents.
//!
//! # Invariants
//!
//! - Segmentation is deterministic: the same input yields the same ordered
//!   sequence of segments.
//! - Segment ids are unique within the returned sequence.
//! - `order_index` is the zero-based position in the document. Filtering
//!   by segment id keeps it unchanged.
//! - `max_segments == 0` is unbounded; `N > 0` keeps the first `N`
//!   segments in document order.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::domain::{DpaError, Result, Segment, SegmentId};

fn truncate(mut segments: Vec<Segment>, max_segments: usize) -> Vec<Segment> {
    if max_segments > 0 && segments.len() > max_segments {
        segments.truncate(max_segments);
    }
    segments
}

/// Split a plain-text document into paragraph segments.
///
/// Paragraphs are separated by one or more blank lines. Internal
/// whitespace is collapsed to single spaces. Ids are 1-based ordinals.
pub fn segment(document_id: &str, text: &str, max_segments: usize) -> Result<Vec<Segment>> {
    if text.trim().is_empty() {
        return Err(DpaError::EmptyDocument(document_id.to_string()));
    }

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }

    let segments = paragraphs
        .into_iter()
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty())
        .enumerate()
        .map(|(i, p)| Segment::new((i + 1).to_string(), i, p, document_id))
        .collect();

    Ok(truncate(segments, max_segments))
}

#[derive(Debug, Deserialize)]
struct SegmentRow {
    #[serde(alias = "DPA")]
    dpa: String,
    #[serde(alias = "ID")]
    id: serde_json::Value,
    #[serde(alias = "Sentence")]
    sentence: String,
}

fn row_id(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Select the rows of one document from a pre-segmented JSON table.
pub fn parse_segment_table(
    raw: &str,
    target_document: &str,
    max_segments: usize,
) -> Result<Vec<Segment>> {
    let rows: Vec<SegmentRow> = serde_json::from_str(raw)?;
    let rows: Vec<SegmentRow> = rows
        .into_iter()
        .filter(|r| r.dpa.trim() == target_document)
        .collect();
    if rows.is_empty() {
        return Err(DpaError::UnknownDocument(target_document.to_string()));
    }

    let mut seen = HashSet::new();
    let mut segments = Vec::with_capacity(rows.len());
    for row in rows {
        let text = row.sentence.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            continue;
        }
        let id = row_id(&row.id);
        if !seen.insert(id.clone()) {
            return Err(DpaError::Configuration(format!(
                "duplicate segment id {id} in document {target_document}"
            )));
        }
        let order_index = segments.len();
        segments.push(Segment::new(id, order_index, text, target_document));
    }
    if segments.is_empty() {
        return Err(DpaError::EmptyDocument(target_document.to_string()));
    }

    Ok(truncate(segments, max_segments))
}

/// Keep only the listed segment ids, preserving document order.
///
/// Every listed id must be present.
pub fn retain_segment_ids(segments: Vec<Segment>, ids: &[SegmentId]) -> Result<Vec<Segment>> {
    if ids.is_empty() {
        return Ok(segments);
    }
    for id in ids {
        if !segments.iter().any(|s| &s.id == id) {
            return Err(DpaError::Configuration(format!(
                "segment id {id} not present in the (truncated) document"
            )));
        }
    }
    // order_index keeps the position in the full document
    Ok(segments
        .into_iter()
        .filter(|s| ids.contains(&s.id))
        .collect())
}

/// Document id derived from a file path (its stem).
pub fn document_id_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

/// Load and segment a document file.
///
/// `.json` files are treated as pre-segmented tables and require a target
/// document; anything else is plain text.
pub fn load_document(
    path: &Path,
    target_document: Option<&str>,
    max_segments: usize,
) -> Result<Vec<Segment>> {
    let raw = std::fs::read_to_string(path)?;
    let is_table = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let segments = if is_table {
        let target = target_document.ok_or_else(|| {
            DpaError::Configuration(
                "a target document is required for pre-segmented input".to_string(),
            )
        })?;
        parse_segment_table(&raw, target, max_segments)?
    } else {
        let document_id = target_document
            .map(str::to_string)
            .unwrap_or_else(|| document_id_from_path(path));
        segment(&document_id, &raw, max_segments)?
    };

    debug!(path = %path.display(), count = segments.len(), "segmented document");
    Ok(segments)
}
