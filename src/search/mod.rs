//! Search index publishing.

pub mod client;

pub use client::{IndexPublisher, SearchError, SearchIndexClient};
