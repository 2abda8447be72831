//! Shared types used by the analysis client and poller.

use bytes::Bytes;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Errors returned while submitting or polling an analysis job.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Endpoint URL failed to parse or normalize.
    #[error("Invalid analysis URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Submission was answered with a non-success status.
    #[error("Analysis submission rejected ({status}): {body}")]
    SubmissionRejected {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Submission succeeded but did not name the async operation.
    #[error("Operation-Location header not found in analysis response")]
    MissingOperationLocation,
    /// Status query returned a non-transient, non-success status.
    #[error("Unexpected analysis response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Status body was empty or not the expected JSON shape.
    #[error("Malformed analysis response: {0}")]
    MalformedBody(String),
    /// Service reported the job as failed.
    #[error("Document analysis failed: {reason}")]
    Failed {
        /// Reason reported by the service, or a generic message.
        reason: String,
    },
    /// Retry budget ran out without a terminal status.
    #[error("Document analysis did not complete within {rounds} rounds")]
    TimedOut {
        /// Rounds issued before giving up.
        rounds: u32,
        /// Error observed on the final round, if it failed.
        last_error: Option<String>,
    },
    /// Caller cancelled the poll loop.
    #[error("Document analysis cancelled during round {round}")]
    Cancelled {
        /// Round in progress (or about to start) when cancellation fired.
        round: u32,
    },
    /// Overall submit-and-poll deadline elapsed.
    #[error("Document analysis exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),
}

impl AnalysisError {
    /// Whether a later attempt could plausibly succeed without changing the input.
    pub fn is_transient(&self) -> bool {
        match self {
            AnalysisError::Http(err) => err.is_timeout() || err.is_connect(),
            AnalysisError::UnexpectedStatus { status, .. }
            | AnalysisError::SubmissionRejected { status, .. } => is_transient_status(*status),
            AnalysisError::TimedOut { .. } | AnalysisError::DeadlineExceeded(_) => true,
            _ => false,
        }
    }
}

/// Rate limiting and server faults are retried; everything else is not.
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Opaque reference to one in-flight analysis operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle(String);

impl JobHandle {
    /// Wrap an operation location returned by the service.
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    /// Operation location URL.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw JSON body of a succeeded analysis operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisPayload(Bytes);

impl AnalysisPayload {
    /// Wrap a response body.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self(body.into())
    }

    /// Body bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Owned body bytes; cloning is cheap.
    pub fn bytes(&self) -> Bytes {
        self.0.clone()
    }
}

/// Classified job status reported by one successful status query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    /// Terminal success.
    Succeeded,
    /// Terminal failure.
    Failed,
    /// Anything else, including a missing or unrecognized status.
    Pending,
}

impl JobStatus {
    /// Case-insensitive classification of the service's `status` string.
    pub fn classify(status: Option<&str>) -> Self {
        match status.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("succeeded") => JobStatus::Succeeded,
            Some("failed") => JobStatus::Failed,
            _ => JobStatus::Pending,
        }
    }
}

/// Parsed status body returned by one poll round.
#[derive(Debug, Clone)]
pub struct OperationReport {
    /// Raw `status` field, if present.
    pub status: Option<String>,
    /// Failure reason from the body's `error` object, if present.
    pub failure_reason: Option<String>,
    /// Complete response body.
    pub body: Bytes,
}

impl OperationReport {
    /// Classified status of this report.
    pub fn job_status(&self) -> JobStatus {
        JobStatus::classify(self.status.as_deref())
    }
}

/// What a single status query produced, before the poller decides what to do with it.
#[derive(Debug, Clone)]
pub enum StatusRound {
    /// Rate limited or server fault; retry after the delay.
    Transient {
        /// HTTP status returned by the service.
        status: StatusCode,
    },
    /// A well-formed status body.
    Report(OperationReport),
}

/// Terminal outcome of polling one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisResult {
    /// Job finished; carries the full response body.
    Succeeded(AnalysisPayload),
    /// Service said no.
    Failed {
        /// Reason reported by the service, or a generic message.
        reason: String,
    },
    /// Service never answered with a terminal status.
    TimedOut {
        /// Rounds issued before giving up.
        rounds: u32,
        /// Error observed on the final round, if it failed.
        last_error: Option<String>,
    },
}

impl AnalysisResult {
    /// Convert non-success outcomes into their error counterparts.
    pub fn into_payload(self) -> Result<AnalysisPayload, AnalysisError> {
        match self {
            AnalysisResult::Succeeded(payload) => Ok(payload),
            AnalysisResult::Failed { reason } => Err(AnalysisError::Failed { reason }),
            AnalysisResult::TimedOut { rounds, last_error } => {
                Err(AnalysisError::TimedOut { rounds, last_error })
            }
        }
    }
}
