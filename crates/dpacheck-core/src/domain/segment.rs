use serde::{Deserialize, Serialize};

/// Segment identifier, unique within one document.
pub type SegmentId = String;

/// A contiguous unit of DPA text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Segment {
    pub id: SegmentId,
    /// Zero-based position in the source document.
    pub order_index: usize,
    pub raw_text: String,
    pub source_document_id: String,
}

impl Segment {
    pub fn new(
        id: impl Into<SegmentId>,
        order_index: usize,
        raw_text: impl Into<String>,
        source_document_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            order_index,
            raw_text: raw_text.into(),
            source_document_id: source_document_id.into(),
        }
    }
}
