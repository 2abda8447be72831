use std::collections::HashMap;
use std::path::Path;

use docpipe::config::Config;
use docpipe::document::Document;
use docpipe::processing::{PipelineOutcome, PipelineService, Stage, derive_record_id};
use httpmock::{
    Method::{GET, POST},
    MockServer,
};
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const ANALYZE_PATH: &str = "/formrecognizer/documentModels/prebuilt-layout:analyze";
const INDEX_PATH: &str = "/indexes/documents/docs/index";

fn config(analysis: &MockServer, search: &MockServer, storage_root: &Path) -> Config {
    let vars: HashMap<&str, String> = HashMap::from([
        ("DOC_ANALYSIS_ENDPOINT", analysis.base_url()),
        ("DOC_ANALYSIS_KEY", "analysis-key".to_string()),
        ("SEARCH_ENDPOINT", search.base_url()),
        ("SEARCH_INDEX_NAME", "documents".to_string()),
        ("SEARCH_API_KEY", "search-key".to_string()),
        ("STORAGE_ROOT", storage_root.display().to_string()),
        ("POLL_MAX_ROUNDS", "3".to_string()),
        ("POLL_DELAY_MS", "1".to_string()),
    ]);
    Config::from_lookup(|key| vars.get(key).cloned()).expect("config")
}

#[tokio::test]
async fn pdf_is_analyzed_and_indexed_in_one_round() {
    let analysis = MockServer::start_async().await;
    let search = MockServer::start_async().await;
    let storage_root = TempDir::new().expect("tempdir");

    let submit = analysis
        .mock_async(|when, then| {
            when.method(POST)
                .path(ANALYZE_PATH)
                .query_param("api-version", "2023-07-31")
                .header("Ocp-Apim-Subscription-Key", "analysis-key")
                .header("content-type", "application/octet-stream");
            then.status(202)
                .header("Operation-Location", analysis.url("/operations/H"));
        })
        .await;
    let poll = analysis
        .mock_async(|when, then| {
            when.method(GET).path("/operations/H");
            then.status(200).json_body(json!({
                "status": "succeeded",
                "analyzeResult": {
                    "pages": [
                        { "lines": [ { "content": "Hello" } ] },
                        { "lines": [ { "content": "World" } ] }
                    ]
                }
            }));
        })
        .await;
    let upload = search
        .mock_async(|when, then| {
            when.method(POST)
                .path(INDEX_PATH)
                .header("api-key", "search-key")
                .json_body_partial(
                    json!({
                        "value": [{
                            "@search.action": "upload",
                            "fileName": "report",
                            "content": "Hello\nWorld"
                        }]
                    })
                    .to_string(),
                );
            then.status(200)
                .json_body(json!({ "value": [ { "key": "k", "status": true } ] }));
        })
        .await;

    let service = PipelineService::from_config(&config(&analysis, &search, storage_root.path()))
        .expect("service");
    let document = Document::new(
        "report.pdf",
        Some("application/pdf".into()),
        vec![7u8; 10 * 1024],
    );

    let outcome = service.process(document, &CancellationToken::new()).await;

    assert_eq!(
        outcome,
        PipelineOutcome::Indexed {
            record_id: derive_record_id("report"),
            file_name: "report".into()
        }
    );
    submit.assert_async().await;
    poll.assert_hits_async(1).await;
    upload.assert_hits_async(1).await;
    assert_eq!(service.metrics_snapshot().documents_indexed, 1);
}

#[tokio::test]
async fn publish_failure_diverts_analysis_payload() {
    let analysis = MockServer::start_async().await;
    let search = MockServer::start_async().await;
    let storage_root = TempDir::new().expect("tempdir");

    analysis
        .mock_async(|when, then| {
            when.method(POST).path(ANALYZE_PATH);
            then.status(202)
                .header("Operation-Location", analysis.url("/operations/H"));
        })
        .await;
    analysis
        .mock_async(|when, then| {
            when.method(GET).path("/operations/H");
            then.status(200)
                .json_body(json!({ "status": "succeeded", "analyzeResult": { "pages": [] } }));
        })
        .await;
    search
        .mock_async(|when, then| {
            when.method(POST).path(INDEX_PATH);
            then.status(503).body("unavailable");
        })
        .await;

    let service = PipelineService::from_config(&config(&analysis, &search, storage_root.path()))
        .expect("service");
    let document = Document::new("notes.txt", None, "plain text");

    let outcome = service.process(document, &CancellationToken::new()).await;

    let PipelineOutcome::IndexFailed {
        stage, failure_key, ..
    } = outcome
    else {
        panic!("expected index failure");
    };
    assert_eq!(stage, Stage::Publish);
    let key = failure_key.expect("diverted");
    let stored = tokio::fs::read(storage_root.path().join("processing-failures").join(&key))
        .await
        .expect("failure entry");
    let stored: serde_json::Value = serde_json::from_slice(&stored).expect("json");
    assert_eq!(stored["status"], "succeeded");
}

#[tokio::test]
async fn missing_operation_location_never_polls() {
    let analysis = MockServer::start_async().await;
    let search = MockServer::start_async().await;
    let storage_root = TempDir::new().expect("tempdir");

    analysis
        .mock_async(|when, then| {
            when.method(POST).path(ANALYZE_PATH);
            then.status(202);
        })
        .await;
    let poll = analysis
        .mock_async(|when, then| {
            when.method(GET);
            then.status(200).json_body(json!({ "status": "succeeded" }));
        })
        .await;

    let service = PipelineService::from_config(&config(&analysis, &search, storage_root.path()))
        .expect("service");
    let outcome = service
        .process(
            Document::new("report.pdf", None, vec![1u8; 32]),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        outcome,
        PipelineOutcome::AnalysisFailed {
            stage: Stage::Submit,
            quarantine_key: None,
            ..
        }
    ));
    poll.assert_hits_async(0).await;
}
