#![deny(missing_docs)]

//! Core library for the docpipe document ingestion pipeline.

/// Document analysis service: submission, polling, and result schema.
pub mod analysis;
/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// In-memory uploaded artifact.
pub mod document;
/// File-type and size validation.
pub mod gate;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Extraction, record assembly, and pipeline orchestration.
pub mod processing;
/// Processing queue messages and publishers.
pub mod queue;
/// Search index integration.
pub mod search;
/// Blob storage and failure sink.
pub mod storage;
/// Upload event handling.
pub mod trigger;
