//! Remote document analysis: submission, polling, and the result schema.

pub mod client;
pub mod poller;
pub mod schema;
pub mod types;

pub use client::{AnalysisClient, AnalysisService};
pub use poller::AnalysisPoller;
pub use schema::AnalyzeOperation;
pub use types::{
    AnalysisError, AnalysisPayload, AnalysisResult, JobHandle, JobStatus, OperationReport,
    StatusRound,
};
