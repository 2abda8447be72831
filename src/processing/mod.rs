//! Document processing pipeline: extraction, record assembly, and orchestration.

pub mod extract;
pub mod record;
mod service;
pub mod types;

pub use extract::{ExtractedContent, ExtractionError, MetadataKey, canonical_file_name, extract};
pub use record::{IndexRecord, RecordBuilder, derive_record_id};
pub use service::{PipelineApi, PipelineService};
pub use types::{PipelineError, PipelineOutcome, ServiceInitError, Stage};
