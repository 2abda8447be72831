//! Processing-queue messages and publishers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Name of the queue receiving accepted uploads.
pub const PROCESSING_QUEUE_NAME: &str = "document-processing-queue";

/// Status attached to freshly queued documents.
pub const STATUS_PENDING: &str = "PENDING";

/// Errors raised while publishing or reading queue messages.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Message could not be encoded or decoded.
    #[error("Invalid queue message: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Underlying filesystem operation failed.
    #[error("Queue I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Descriptive metadata captured when an upload is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    /// Blob name within its container.
    pub file_name: String,
    /// Declared file type (MIME).
    pub file_type: Option<String>,
    /// Size in bytes.
    pub file_size: u64,
    /// Acceptance time, RFC3339.
    pub upload_date: String,
    /// Reference to the stored artifact.
    pub blob_url: String,
    /// Stored content type.
    pub content_type: Option<String>,
}

/// Message handed to the processing queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingMessage {
    /// Reference to the stored artifact.
    pub blob_url: String,
    /// Artifact metadata.
    pub metadata: DocumentMetadata,
    /// Processing status, `PENDING` on publish.
    pub processing_status: String,
}

/// Outbound queue.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    /// Enqueue one message.
    async fn publish(&self, message: &ProcessingMessage) -> Result<(), QueueError>;
}

/// Queue stored as a JSON-lines file.
pub struct LocalQueue {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LocalQueue {
    /// Queue backed by `path`; parent directories are created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Default queue file below a storage root.
    pub fn under(root: &Path) -> Self {
        Self::new(root.join("queue").join(format!("{PROCESSING_QUEUE_NAME}.jsonl")))
    }

    /// Every queued message, oldest first. Messages stay queued until acknowledged.
    pub async fn pending(&self) -> Result<Vec<ProcessingMessage>, QueueError> {
        let _guard = self.lock.lock().await;
        self.read_all().await
    }

    /// Remove one queued occurrence of each message in `done`; returns how many were removed.
    ///
    /// Messages published after [`LocalQueue::pending`] was read are kept.
    pub async fn acknowledge(&self, done: &[ProcessingMessage]) -> Result<usize, QueueError> {
        let _guard = self.lock.lock().await;
        let mut remaining = self.read_all().await?;
        let before = remaining.len();
        for message in done {
            if let Some(index) = remaining.iter().position(|queued| queued == message) {
                remaining.remove(index);
            }
        }

        let removed = before - remaining.len();
        if removed == 0 {
            return Ok(0);
        }

        let mut contents = Vec::new();
        for message in &remaining {
            contents.extend(serde_json::to_vec(message)?);
            contents.push(b'\n');
        }
        let staging = self.path.with_extension("jsonl.tmp");
        tokio::fs::write(&staging, &contents).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        tracing::debug!(
            queue = PROCESSING_QUEUE_NAME,
            removed,
            left = remaining.len(),
            "Acknowledged messages"
        );
        Ok(removed)
    }

    async fn read_all(&self) -> Result<Vec<ProcessingMessage>, QueueError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let messages = contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<ProcessingMessage>, _>>()?;
        Ok(messages)
    }
}

#[async_trait]
impl QueuePublisher for LocalQueue {
    async fn publish(&self, message: &ProcessingMessage) -> Result<(), QueueError> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        tracing::debug!(queue = PROCESSING_QUEUE_NAME, blob = %message.blob_url, "Queued message");
        Ok(())
    }
}
