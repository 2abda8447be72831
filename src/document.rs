//! In-memory representation of one uploaded artifact.

use bytes::Bytes;

/// Immutable byte payload plus the metadata the pipeline needs to route it.
///
/// Lives for exactly one pipeline run and is never persisted by the pipeline itself.
#[derive(Debug, Clone)]
pub struct Document {
    name: String,
    content_type: Option<String>,
    bytes: Bytes,
}

impl Document {
    /// Wrap a payload with its identifying name and optional declared content type.
    pub fn new(
        name: impl Into<String>,
        content_type: Option<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.filter(|value| !value.trim().is_empty()),
            bytes: bytes.into(),
        }
    }

    /// Artifact name, including extension.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared content type, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Raw payload; cloning is cheap.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Payload length in bytes.
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Gate view of this document; the bytes are in hand so existence is not in question.
    pub fn artifact_info(&self) -> crate::gate::ArtifactInfo<'_> {
        crate::gate::ArtifactInfo {
            name: &self.name,
            content_type: self.content_type.as_deref(),
            size: self.len(),
            exists: None,
        }
    }
}
