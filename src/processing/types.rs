//! Core data types and error definitions for the processing pipeline.

use crate::analysis::AnalysisError;
use crate::gate::RejectReason;
use crate::processing::extract::ExtractionError;
use crate::search::SearchError;
use serde::Serialize;
use thiserror::Error;

/// Pipeline step that produced an outcome or error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// File-type gate.
    Validate,
    /// Analysis submission.
    Submit,
    /// Analysis polling.
    Poll,
    /// Text and metadata extraction.
    Extract,
    /// Index record assembly.
    Build,
    /// Index upload.
    Publish,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Stage::Validate => "validate",
            Stage::Submit => "submit",
            Stage::Poll => "poll",
            Stage::Extract => "extract",
            Stage::Build => "build",
            Stage::Publish => "publish",
        };
        f.write_str(label)
    }
}

/// Errors emitted inside a single pipeline run.
///
/// They never escape [`crate::processing::PipelineService::process`]; they are folded into a
/// [`PipelineOutcome`] after logging.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Submission or polling failed.
    #[error("{stage} failed: {source}")]
    Analysis {
        /// Step that failed.
        stage: Stage,
        /// Underlying analysis error.
        #[source]
        source: AnalysisError,
    },
    /// Analysis payload could not be read.
    #[error("extract failed: {0}")]
    Extraction(#[from] ExtractionError),
    /// Search index rejected the upload.
    #[error("publish failed: {0}")]
    Publish(#[from] SearchError),
}

impl PipelineError {
    /// Step that raised the error.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Analysis { stage, .. } => *stage,
            PipelineError::Extraction(_) => Stage::Extract,
            PipelineError::Publish(_) => Stage::Publish,
        }
    }
}

/// Result of running one document through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Record reached the search index.
    Indexed {
        /// Key of the published record.
        record_id: String,
        /// Canonical file name.
        file_name: String,
    },
    /// Gate rejected the document; no external call was made.
    Skipped {
        /// Rejection reason.
        reason: RejectReason,
    },
    /// Submission or polling did not produce a result.
    AnalysisFailed {
        /// Step that failed.
        stage: Stage,
        /// Rendered error.
        error: String,
        /// Failure-sink key holding the original bytes, when diverted.
        quarantine_key: Option<String>,
    },
    /// Extraction, building, or publishing failed after a successful analysis.
    IndexFailed {
        /// Step that failed.
        stage: Stage,
        /// Rendered error.
        error: String,
        /// Failure-sink key holding the analysis payload, when diverted.
        failure_key: Option<String>,
    },
}

impl PipelineOutcome {
    /// Whether the document was indexed.
    pub fn is_indexed(&self) -> bool {
        matches!(self, PipelineOutcome::Indexed { .. })
    }

    /// Whether nothing is left to retry: the document was indexed, skipped, or its bytes were
    /// diverted to the failure sink. Anything else must stay queued.
    pub fn is_settled(&self) -> bool {
        match self {
            PipelineOutcome::Indexed { .. } | PipelineOutcome::Skipped { .. } => true,
            PipelineOutcome::AnalysisFailed { quarantine_key, .. } => quarantine_key.is_some(),
            PipelineOutcome::IndexFailed { failure_key, .. } => failure_key.is_some(),
        }
    }
}

/// Errors raised while constructing the pipeline's HTTP clients.
#[derive(Debug, Error)]
pub enum ServiceInitError {
    /// Analysis client could not be built.
    #[error("Failed to initialize analysis client: {0}")]
    Analysis(#[from] AnalysisError),
    /// Search client could not be built.
    #[error("Failed to initialize search client: {0}")]
    Search(#[from] SearchError),
}
