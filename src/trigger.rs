//! Upload events: envelope parsing and the ingestion stage that queues accepted artifacts.
//!
//! An upload notification carries the stored artifact's URL under `data.url`. The ingestion
//! stage looks the artifact up in the blob store, runs the file-type gate with existence
//! known, and publishes a `PENDING` [`ProcessingMessage`] for accepted artifacts. Rejected
//! artifacts are logged and skipped without a message.

use crate::gate::{ArtifactInfo, FileTypeGate, RejectReason, ValidationVerdict};
use crate::metrics::PipelineMetrics;
use crate::queue::{DocumentMetadata, ProcessingMessage, QueueError, QueuePublisher, STATUS_PENDING};
use crate::storage::{BlobStore, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Errors raised while handling an upload event.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// Event body is not an envelope with a non-empty `data.url`.
    #[error("Malformed event envelope: {0}")]
    MalformedEnvelope(String),
    /// `data.url` is not an absolute URL with a container and blob segment.
    #[error("Invalid blob URL: {0}")]
    InvalidUrl(String),
    /// Blob lookup failed.
    #[error("Blob store failed: {0}")]
    Store(#[from] StoreError),
    /// Queue publish failed.
    #[error("Queue publish failed: {0}")]
    Queue(#[from] QueueError),
}

impl TriggerError {
    /// Whether the event itself is unusable, so redelivering it cannot help.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            TriggerError::MalformedEnvelope(_) | TriggerError::InvalidUrl(_)
        )
    }
}

#[derive(Deserialize)]
struct EventEnvelope {
    data: Option<EventData>,
}

#[derive(Deserialize)]
struct EventData {
    url: Option<String>,
}

/// Extract the artifact URL from a raw event body.
pub fn parse_blob_url(raw: &[u8]) -> Result<String, TriggerError> {
    let envelope: EventEnvelope = serde_json::from_slice(raw)
        .map_err(|err| TriggerError::MalformedEnvelope(err.to_string()))?;
    let data = envelope
        .data
        .ok_or_else(|| TriggerError::MalformedEnvelope("missing 'data' field".into()))?;
    match data.url {
        Some(url) if !url.trim().is_empty() => Ok(url),
        _ => Err(TriggerError::MalformedEnvelope(
            "missing 'url' field".into(),
        )),
    }
}

/// Blob name within its container: the URL path with the leading container segment removed.
pub fn blob_name_from_url(blob_url: &str) -> Result<String, TriggerError> {
    let url = reqwest::Url::parse(blob_url)
        .map_err(|err| TriggerError::InvalidUrl(format!("{blob_url}: {err}")))?;
    let path = url.path().trim_start_matches('/');
    match path.split_once('/') {
        Some((container, name)) if !container.is_empty() && !name.is_empty() => {
            Ok(name.to_string())
        }
        _ => Err(TriggerError::InvalidUrl(blob_url.to_string())),
    }
}

/// Result of handling one upload event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestionOutcome {
    /// Artifact accepted; the message was published.
    Queued {
        /// Message handed to the processing queue.
        message: ProcessingMessage,
    },
    /// Artifact rejected by the gate; nothing was published.
    Skipped {
        /// Artifact URL from the event.
        blob_url: String,
        /// Rejection reason.
        reason: RejectReason,
    },
}

/// Abstraction over event ingestion used by the HTTP surface.
#[async_trait]
pub trait IngestionApi: Send + Sync {
    /// Handle one raw upload event.
    async fn handle_event(&self, raw: &[u8]) -> Result<IngestionOutcome, TriggerError>;
}

/// Validates stored uploads and queues them for processing.
pub struct IngestionService {
    gate: FileTypeGate,
    blobs: Arc<dyn BlobStore>,
    queue: Arc<dyn QueuePublisher>,
    metrics: Arc<PipelineMetrics>,
}

impl IngestionService {
    /// Assemble the ingestion stage from its collaborators.
    pub fn new(
        gate: FileTypeGate,
        blobs: Arc<dyn BlobStore>,
        queue: Arc<dyn QueuePublisher>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            gate,
            blobs,
            queue,
            metrics,
        }
    }

    /// Handle one raw upload event.
    pub async fn handle_event(&self, raw: &[u8]) -> Result<IngestionOutcome, TriggerError> {
        let blob_url = parse_blob_url(raw).inspect_err(|error| {
            tracing::error!(error = %error, "Rejected upload event");
        })?;
        let name = blob_name_from_url(&blob_url)?;
        let properties = self.blobs.properties(&name).await?;

        let artifact = ArtifactInfo {
            name: &name,
            content_type: properties.as_ref().and_then(|p| p.content_type.as_deref()),
            size: properties.as_ref().map_or(0, |p| p.size),
            exists: Some(properties.is_some()),
        };
        if let ValidationVerdict::Reject(reason) = self.gate.validate(&artifact) {
            tracing::error!(
                blob = %blob_url,
                reason = %reason,
                size = artifact.size,
                "Invalid document"
            );
            self.metrics.record_skipped();
            return Ok(IngestionOutcome::Skipped { blob_url, reason });
        }

        let message = ProcessingMessage {
            blob_url: blob_url.clone(),
            metadata: DocumentMetadata {
                file_name: name.clone(),
                file_type: artifact.content_type.map(str::to_string),
                file_size: artifact.size,
                upload_date: now_rfc3339(),
                blob_url: blob_url.clone(),
                content_type: artifact.content_type.map(str::to_string),
            },
            processing_status: STATUS_PENDING.to_string(),
        };
        self.queue.publish(&message).await?;
        self.metrics.record_queued();
        tracing::info!(blob = %blob_url, "Queued document for processing");
        Ok(IngestionOutcome::Queued { message })
    }
}

#[async_trait]
impl IngestionApi for IngestionService {
    async fn handle_event(&self, raw: &[u8]) -> Result<IngestionOutcome, TriggerError> {
        IngestionService::handle_event(self, raw).await
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}
