//! File-type gate deciding whether an artifact is eligible for analysis.

use serde::Serialize;

/// Default size ceiling for accepted documents (50 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Document formats the analysis service understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Portable Document Format.
    Pdf,
    /// Word (OOXML) document.
    Docx,
    /// PowerPoint (OOXML) presentation.
    Pptx,
    /// Excel (OOXML) workbook.
    Xlsx,
    /// Plain text.
    Txt,
    /// HTML page.
    Html,
}

impl FileType {
    /// Every supported type, in declaration order.
    pub const ALL: [FileType; 6] = [
        FileType::Pdf,
        FileType::Docx,
        FileType::Pptx,
        FileType::Xlsx,
        FileType::Txt,
        FileType::Html,
    ];

    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
            FileType::Pptx => "pptx",
            FileType::Xlsx => "xlsx",
            FileType::Txt => "txt",
            FileType::Html => "html",
        }
    }

    /// Canonical MIME type.
    pub fn mime_type(self) -> &'static str {
        match self {
            FileType::Pdf => "application/pdf",
            FileType::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            FileType::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            FileType::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            FileType::Txt => "text/plain",
            FileType::Html => "text/html",
        }
    }

    /// Resolve an extension (with or without leading dot, any case).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        Self::ALL.into_iter().find(|ty| ty.extension() == ext)
    }

    /// Resolve a MIME type, ignoring parameters such as `charset`.
    pub fn from_mime_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        Self::ALL.into_iter().find(|ty| ty.mime_type() == essence)
    }

    /// Resolve from a file name's last extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        Self::from_extension(ext)
    }
}

/// Metadata the gate needs about an incoming artifact.
#[derive(Debug, Clone)]
pub struct ArtifactInfo<'a> {
    /// Artifact name, including extension.
    pub name: &'a str,
    /// Declared content type, when known.
    pub content_type: Option<&'a str>,
    /// Declared size in bytes.
    pub size: u64,
    /// Whether the stored artifact exists; `None` when the bytes are already in hand.
    pub exists: Option<bool>,
}

/// Reason code attached to a rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// The extension (or, for extension-less names, the content type) is not supported.
    UnsupportedType,
    /// Declared size exceeds the configured maximum.
    Oversized,
    /// Stored artifact could not be found.
    MissingBlob,
}

impl RejectReason {
    /// Stable reason code used in logs and API responses.
    pub fn code(self) -> &'static str {
        match self {
            RejectReason::UnsupportedType => "unsupported-type",
            RejectReason::Oversized => "oversized",
            RejectReason::MissingBlob => "missing-blob",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of [`FileTypeGate::validate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationVerdict {
    /// Artifact may enter the pipeline as the given type.
    Accept(FileType),
    /// Artifact is skipped.
    Reject(RejectReason),
}

impl ValidationVerdict {
    /// Whether the artifact was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationVerdict::Accept(_))
    }
}

/// Pure accept/reject decision over artifact metadata.
#[derive(Debug, Clone)]
pub struct FileTypeGate {
    allowed: Vec<FileType>,
    max_size: u64,
}

impl FileTypeGate {
    /// Build a gate from an allow list and a size ceiling.
    pub fn new(allowed: Vec<FileType>, max_size: u64) -> Self {
        Self { allowed, max_size }
    }

    /// Build a gate from runtime configuration.
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(config.allowed_file_types.clone(), config.max_file_size)
    }

    /// Decide whether the artifact is eligible for analysis.
    pub fn validate(&self, artifact: &ArtifactInfo<'_>) -> ValidationVerdict {
        if artifact.exists == Some(false) {
            return ValidationVerdict::Reject(RejectReason::MissingBlob);
        }
        if artifact.size > self.max_size {
            return ValidationVerdict::Reject(RejectReason::Oversized);
        }
        match self.resolve_type(artifact) {
            Some(file_type) => ValidationVerdict::Accept(file_type),
            None => ValidationVerdict::Reject(RejectReason::UnsupportedType),
        }
    }

    /// The extension decides when the name has one; the declared content type is only
    /// consulted for extension-less names.
    fn resolve_type(&self, artifact: &ArtifactInfo<'_>) -> Option<FileType> {
        let resolved = match name_extension(artifact.name) {
            Some(ext) => FileType::from_extension(ext),
            None => artifact.content_type.and_then(FileType::from_mime_type),
        };
        resolved.filter(|ty| self.allowed.contains(ty))
    }
}

fn name_extension(name: &str) -> Option<&str> {
    let file = name.rsplit('/').next().unwrap_or(name);
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

impl Default for FileTypeGate {
    fn default() -> Self {
        Self::new(FileType::ALL.to_vec(), DEFAULT_MAX_FILE_SIZE)
    }
}
