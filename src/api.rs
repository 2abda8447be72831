//! HTTP surface for docpipe.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /documents/{name}` – Run the raw request body through the pipeline as document
//!   `name` (the `Content-Type` header is used as the declared type). Returns the pipeline
//!   outcome: `indexed`, `skipped`, `analysis_failed`, or `index_failed`.
//! - `POST /events` – Accept an upload notification (`{ "data": { "url": ... } }`), validate the
//!   stored artifact, and queue it for processing. Malformed envelopes are answered with 400.
//! - `GET /metrics` – Observe pipeline counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.

use crate::document::Document;
use crate::processing::{PipelineApi, PipelineOutcome};
use crate::trigger::{IngestionApi, IngestionOutcome, TriggerError};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct AppState<P, I> {
    pipeline: Arc<P>,
    ingestion: Arc<I>,
    shutdown: CancellationToken,
}

impl<P, I> Clone for AppState<P, I> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            ingestion: Arc::clone(&self.ingestion),
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Build the HTTP router exposing the pipeline and ingestion surface.
///
/// Pipeline runs started by a request are cancelled when `shutdown` fires.
pub fn create_router<P, I>(
    pipeline: Arc<P>,
    ingestion: Arc<I>,
    shutdown: CancellationToken,
) -> Router
where
    P: PipelineApi + 'static,
    I: IngestionApi + 'static,
{
    Router::new()
        .route("/documents/*name", post(process_document::<P, I>))
        .route("/events", post(ingest_event::<P, I>))
        .route("/metrics", get(get_metrics::<P, I>))
        .route("/commands", get(get_commands))
        .with_state(AppState {
            pipeline,
            ingestion,
            shutdown,
        })
}

/// Process an uploaded document synchronously and report the outcome.
async fn process_document<P, I>(
    State(state): State<AppState<P, I>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    P: PipelineApi,
    I: IngestionApi,
{
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let document = Document::new(name, content_type, body);
    let cancel = state.shutdown.child_token();
    let outcome = state.pipeline.process(document, &cancel).await;

    let status = match &outcome {
        PipelineOutcome::Indexed { .. } => StatusCode::OK,
        PipelineOutcome::Skipped { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineOutcome::AnalysisFailed { .. } | PipelineOutcome::IndexFailed { .. } => {
            StatusCode::BAD_GATEWAY
        }
    };
    (status, Json(outcome)).into_response()
}

/// Validate a stored upload and queue it for processing.
async fn ingest_event<P, I>(
    State(state): State<AppState<P, I>>,
    body: Bytes,
) -> Result<Response, AppError>
where
    P: PipelineApi,
    I: IngestionApi,
{
    let outcome = state.ingestion.handle_event(&body).await?;
    let status = match &outcome {
        IngestionOutcome::Queued { .. } => StatusCode::ACCEPTED,
        IngestionOutcome::Skipped { .. } => StatusCode::OK,
    };
    Ok((status, Json(outcome)).into_response())
}

/// Return the current pipeline counters.
async fn get_metrics<P, I>(
    State(state): State<AppState<P, I>>,
) -> Json<crate::metrics::MetricsSnapshot>
where
    P: PipelineApi,
    I: IngestionApi,
{
    Json(state.pipeline.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "process_document",
                method: "POST",
                path: "/documents/{name}",
                description: "Analyze the raw request body as document {name}, extract its \
                              text, and publish one record to the search index. Response \
                              returns { \"outcome\": \"indexed\" | \"skipped\" | \
                              \"analysis_failed\" | \"index_failed\", ... }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ingest_event",
                method: "POST",
                path: "/events",
                description: "Validate a stored upload and queue it for processing \
                              with status PENDING.",
                request_example: Some(json!({
                    "data": { "url": "https://account.blob.example.net/raw-documents/report.pdf" }
                })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return pipeline counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

struct AppError(TriggerError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.is_malformed() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, self.0.to_string()).into_response()
    }
}

impl From<TriggerError> for AppError {
    fn from(inner: TriggerError) -> Self {
        Self(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{create_router, get_commands};
    use crate::document::Document;
    use crate::gate::RejectReason;
    use crate::metrics::MetricsSnapshot;
    use crate::processing::{PipelineApi, PipelineOutcome};
    use crate::trigger::{IngestionApi, IngestionOutcome, TriggerError, parse_blob_url};
    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    #[tokio::test]
    async fn commands_catalog_exposes_document_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let process = commands
            .iter()
            .find(|cmd| cmd.name == "process_document")
            .expect("process command present");

        assert_eq!(process.method, "POST");
        assert_eq!(process.path, "/documents/{name}");
        assert!(commands.len() >= 3);
    }

    #[tokio::test]
    async fn document_route_forwards_name_type_and_body() {
        let pipeline = Arc::new(StubPipeline::new(PipelineOutcome::Indexed {
            record_id: "abc".into(),
            file_name: "reports/q1".into(),
        }));
        let app = router(pipeline.clone(), Arc::new(StubIngestion));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/documents/reports/q1.pdf")
                    .header("content-type", "application/pdf")
                    .body(Body::from("%PDF-1.7"))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["outcome"], "indexed");
        assert_eq!(json["record_id"], "abc");

        let calls = pipeline.calls.lock().await.clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name(), "reports/q1.pdf");
        assert_eq!(calls[0].content_type(), Some("application/pdf"));
        assert_eq!(calls[0].bytes().as_ref(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn skipped_document_is_unprocessable() {
        let pipeline = Arc::new(StubPipeline::new(PipelineOutcome::Skipped {
            reason: RejectReason::UnsupportedType,
        }));
        let response = router(pipeline, Arc::new(StubIngestion))
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/documents/archive.zip")
                    .body(Body::from("PK"))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["reason"], "unsupported-type");
    }

    #[tokio::test]
    async fn malformed_event_is_a_bad_request() {
        let app = router(
            Arc::new(StubPipeline::new(PipelineOutcome::Skipped {
                reason: RejectReason::MissingBlob,
            })),
            Arc::new(StubIngestion),
        );

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/events")
                    .body(Body::from(json!({ "data": {} }).to_string()))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn metrics_route_returns_snapshot() {
        let app = router(
            Arc::new(StubPipeline::new(PipelineOutcome::Skipped {
                reason: RejectReason::Oversized,
            })),
            Arc::new(StubIngestion),
        );
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["documents_indexed"], 7);
        assert_eq!(json["payloads_diverted"], 0);
    }

    fn router(pipeline: Arc<StubPipeline>, ingestion: Arc<StubIngestion>) -> Router {
        create_router(pipeline, ingestion, CancellationToken::new())
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json body")
    }

    struct StubPipeline {
        calls: Mutex<Vec<Document>>,
        outcome: PipelineOutcome,
    }

    impl StubPipeline {
        fn new(outcome: PipelineOutcome) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                outcome,
            }
        }
    }

    #[async_trait]
    impl PipelineApi for StubPipeline {
        async fn process(
            &self,
            document: Document,
            _cancel: &CancellationToken,
        ) -> PipelineOutcome {
            self.calls.lock().await.push(document);
            self.outcome.clone()
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_indexed: 7,
                ..MetricsSnapshot::default()
            }
        }
    }

    struct StubIngestion;

    #[async_trait]
    impl IngestionApi for StubIngestion {
        async fn handle_event(&self, raw: &[u8]) -> Result<IngestionOutcome, TriggerError> {
            let blob_url = parse_blob_url(raw)?;
            Ok(IngestionOutcome::Skipped {
                blob_url,
                reason: RejectReason::MissingBlob,
            })
        }
    }
}
