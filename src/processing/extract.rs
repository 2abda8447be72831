//! Turn a succeeded analysis body into plain text plus a flat metadata record.

use crate::analysis::AnalysisPayload;
use crate::analysis::schema::{AnalyzeOperation, AnalyzeResult, Page};
use thiserror::Error;

/// Errors raised while reading an analysis payload.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Payload was not JSON at all.
    #[error("analysis payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Keys of the metadata record, in output order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataKey {
    /// Canonical file name.
    FileName,
    /// Model-detected document type.
    DocumentType,
    /// Number of analyzed pages.
    PageCount,
    /// Service-reported creation timestamp.
    CreatedDate,
}

impl MetadataKey {
    /// Key as written into the metadata block.
    pub fn as_str(self) -> &'static str {
        match self {
            MetadataKey::FileName => "filename",
            MetadataKey::DocumentType => "document_type",
            MetadataKey::PageCount => "page_count",
            MetadataKey::CreatedDate => "created_date",
        }
    }
}

/// Text body and metadata recovered from one analysis result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    /// Artifact name with its outermost extension removed.
    pub file_name: String,
    /// All line contents, trimmed, newline-joined, pages concatenated.
    pub text: String,
    /// Ordered metadata pairs; `filename` is always first, absent fields are omitted.
    pub metadata: Vec<(MetadataKey, String)>,
}

impl ExtractedContent {
    /// Look up one metadata value.
    pub fn metadata_value(&self, key: MetadataKey) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, value)| value.as_str())
    }

    /// Serialize metadata as `key: value` lines.
    pub fn metadata_block(&self) -> String {
        self.metadata
            .iter()
            .map(|(key, value)| format!("{}: {}", key.as_str(), value))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Extract text and metadata from a succeeded analysis body.
///
/// Missing or mis-shaped sections never fail the extraction; they yield empty text or omitted
/// metadata entries. Only a body that is not JSON is an error.
pub fn extract(
    artifact_name: &str,
    payload: &AnalysisPayload,
) -> Result<ExtractedContent, ExtractionError> {
    let operation: AnalyzeOperation = serde_json::from_slice(payload.as_bytes())?;
    let result = operation.analyze_result.unwrap_or_default();
    let file_name = canonical_file_name(artifact_name);

    let text = extract_text(result.pages.as_deref().unwrap_or_default());
    let metadata = extract_metadata(&file_name, &result);

    tracing::debug!(
        file_name = %file_name,
        chars = text.len(),
        metadata_fields = metadata.len(),
        "Extracted analysis content"
    );

    Ok(ExtractedContent {
        file_name,
        text,
        metadata,
    })
}

fn extract_text(pages: &[Page]) -> String {
    let lines: Vec<&str> = pages
        .iter()
        .flat_map(|page| page.lines.as_deref().unwrap_or_default())
        .map(|line| line.content.as_deref().unwrap_or_default().trim())
        .collect();
    lines.join("\n").trim().to_string()
}

fn extract_metadata(file_name: &str, result: &AnalyzeResult) -> Vec<(MetadataKey, String)> {
    let mut metadata = vec![(MetadataKey::FileName, file_name.to_string())];
    if let Some(doc_type) = &result.doc_type {
        metadata.push((MetadataKey::DocumentType, doc_type.clone()));
    }
    if let Some(pages) = &result.pages {
        metadata.push((MetadataKey::PageCount, pages.len().to_string()));
    }
    if let Some(created) = &result.created_date_time {
        metadata.push((MetadataKey::CreatedDate, created.clone()));
    }
    metadata
}

/// Remove exactly one trailing extension from an artifact name.
///
/// `report.pdf` becomes `report`, `report.pdf.json` becomes `report.pdf`; names without an
/// extension (or dot-files such as `.env`) are returned unchanged. Any directory prefix is kept.
pub fn canonical_file_name(artifact_name: &str) -> String {
    let trimmed = artifact_name.trim();
    let (dir, base) = match trimmed.rsplit_once('/') {
        Some((dir, base)) => (Some(dir), base),
        None => (None, trimmed),
    };
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };
    match dir {
        Some(dir) => format!("{dir}/{stem}"),
        None => stem.to_string(),
    }
}
