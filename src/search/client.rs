//! HTTP client wrapper for the search index upload API.

use crate::config::Config;
use crate::processing::IndexRecord;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned while publishing to the search index.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid search URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Search service responded with an unexpected status code.
    #[error("Unexpected search response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Service accepted the batch but rejected the record.
    #[error("Search index rejected record {key}: {message}")]
    Rejected {
        /// Record key reported by the service.
        key: String,
        /// Error message reported by the service.
        message: String,
    },
}

/// Destination for finished index records.
#[async_trait]
pub trait IndexPublisher: Send + Sync {
    /// Upload a single record.
    async fn publish(&self, record: &IndexRecord) -> Result<(), SearchError>;
}

/// Lightweight HTTP client for the index documents API.
pub struct SearchIndexClient {
    pub(crate) client: Client,
    pub(crate) index_url: String,
    pub(crate) api_key: String,
}

#[derive(Serialize)]
struct UploadBatch<'a> {
    value: [UploadAction<'a>; 1],
}

#[derive(Serialize)]
struct UploadAction<'a> {
    #[serde(rename = "@search.action")]
    action: &'static str,
    #[serde(flatten)]
    record: &'a IndexRecord,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(default)]
    value: Vec<UploadResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResult {
    #[serde(default)]
    key: String,
    #[serde(default = "default_true")]
    status: bool,
    #[serde(default)]
    error_message: Option<String>,
}

fn default_true() -> bool {
    true
}

impl SearchIndexClient {
    /// Construct a client from runtime configuration.
    pub fn new(config: &Config) -> Result<Self, SearchError> {
        let client = Client::builder().user_agent("docpipe/0.1").build()?;
        let index_url = build_index_url(
            &config.search_endpoint,
            &config.search_index_name,
            &config.search_api_version,
        )
        .map_err(SearchError::InvalidUrl)?;

        tracing::debug!(
            url = %index_url,
            has_api_key = !config.search_api_key.is_empty(),
            "Initialized search HTTP client"
        );

        Ok(Self {
            client,
            index_url,
            api_key: config.search_api_key.clone(),
        })
    }
}

#[async_trait]
impl IndexPublisher for SearchIndexClient {
    async fn publish(&self, record: &IndexRecord) -> Result<(), SearchError> {
        let batch = UploadBatch {
            value: [UploadAction {
                action: "upload",
                record,
            }],
        };

        let response = self
            .client
            .post(&self.index_url)
            .header("api-key", &self.api_key)
            .json(&batch)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = SearchError::UnexpectedStatus { status, body };
            tracing::error!(record = %record.id, error = %error, "Search upload failed");
            return Err(error);
        }

        let results = match response.json::<UploadResponse>().await {
            Ok(results) => results.value,
            Err(err) => {
                tracing::warn!(
                    record = %record.id,
                    status = status.as_u16(),
                    error = %err,
                    "Unreadable upload response; treating record as accepted"
                );
                Vec::new()
            }
        };
        if let Some(rejected) = results.into_iter().find(|result| !result.status) {
            let error = SearchError::Rejected {
                key: rejected.key,
                message: rejected
                    .error_message
                    .unwrap_or_else(|| "no error message".to_string()),
            };
            tracing::error!(record = %record.id, error = %error, "Search index rejected record");
            return Err(error);
        }

        tracing::info!(record = %record.id, file_name = %record.file_name, "Record indexed");
        Ok(())
    }
}

/// Compose `{endpoint}/indexes/{index}/docs/index?api-version={version}`.
pub(crate) fn build_index_url(
    endpoint: &str,
    index: &str,
    api_version: &str,
) -> Result<String, String> {
    let base = endpoint.trim().trim_end_matches('/');
    let mut url = reqwest::Url::parse(&format!("{base}/indexes/{index}/docs/index"))
        .map_err(|err| err.to_string())?;
    url.query_pairs_mut().append_pair("api-version", api_version);
    Ok(url.to_string())
}
