//! HTTP client wrapper for the document analysis service.

use crate::analysis::schema::AnalyzeOperation;
use crate::analysis::types::{
    AnalysisError, JobHandle, OperationReport, StatusRound, is_transient_status,
};
use crate::config::Config;
use crate::document::Document;
use async_trait::async_trait;
use reqwest::{Client, Method, header};

/// Header carrying the subscription key on every request.
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
/// Response header naming the async operation created by a submission.
pub const OPERATION_LOCATION_HEADER: &str = "operation-location";

/// Remote long-running analysis operations, as seen by the submitter and poller.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Start an analysis job for the document and return its handle.
    async fn submit(&self, document: &Document) -> Result<JobHandle, AnalysisError>;

    /// Issue one status query against a job.
    async fn fetch_status(&self, handle: &JobHandle) -> Result<StatusRound, AnalysisError>;
}

/// Lightweight HTTP client for the layout analysis API.
pub struct AnalysisClient {
    pub(crate) client: Client,
    pub(crate) analyze_url: String,
    pub(crate) api_key: String,
}

impl AnalysisClient {
    /// Construct a client from runtime configuration.
    pub fn new(config: &Config) -> Result<Self, AnalysisError> {
        let client = Client::builder().user_agent("docpipe/0.1").build()?;
        let analyze_url = build_analyze_url(
            &config.analysis_endpoint,
            &config.analysis_model,
            &config.analysis_api_version,
        )
        .map_err(AnalysisError::InvalidUrl)?;

        tracing::debug!(
            url = %analyze_url,
            has_api_key = !config.analysis_api_key.is_empty(),
            "Initialized analysis HTTP client"
        );

        Ok(Self {
            client,
            analyze_url,
            api_key: config.analysis_api_key.clone(),
        })
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
    }
}

#[async_trait]
impl AnalysisService for AnalysisClient {
    async fn submit(&self, document: &Document) -> Result<JobHandle, AnalysisError> {
        let response = self
            .request(Method::POST, &self.analyze_url)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(document.bytes().clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = AnalysisError::SubmissionRejected { status, body };
            tracing::error!(error = %error, "Analysis submission rejected");
            return Err(error);
        }

        let location = response
            .headers()
            .get(OPERATION_LOCATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(AnalysisError::MissingOperationLocation)?;

        tracing::info!(
            operation = location,
            bytes = document.len(),
            "Submitted document for analysis"
        );
        Ok(JobHandle::new(location))
    }

    async fn fetch_status(&self, handle: &JobHandle) -> Result<StatusRound, AnalysisError> {
        let response = self.request(Method::GET, handle.as_str()).send().await?;
        let status = response.status();
        tracing::debug!(status = status.as_u16(), "Received analysis status response");

        if is_transient_status(status) {
            return Ok(StatusRound::Transient { status });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::UnexpectedStatus { status, body });
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(AnalysisError::MalformedBody("empty response body".into()));
        }
        let operation: AnalyzeOperation = serde_json::from_slice(&body)
            .map_err(|err| AnalysisError::MalformedBody(err.to_string()))?;

        Ok(StatusRound::Report(OperationReport {
            status: operation.status,
            failure_reason: operation.error.and_then(|error| error.reason()),
            body,
        }))
    }
}

/// Compose `{endpoint}/formrecognizer/documentModels/{model}:analyze?api-version={version}`.
pub(crate) fn build_analyze_url(
    endpoint: &str,
    model: &str,
    api_version: &str,
) -> Result<String, String> {
    let base = endpoint.trim().trim_end_matches('/');
    let mut url = reqwest::Url::parse(&format!(
        "{base}/formrecognizer/documentModels/{model}:analyze"
    ))
    .map_err(|err| err.to_string())?;
    url.query_pairs_mut().append_pair("api-version", api_version);
    Ok(url.to_string())
}
