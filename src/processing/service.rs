//! Pipeline orchestrator: gate, analysis, extraction, record assembly, and publish.

use crate::{
    analysis::{AnalysisClient, AnalysisError, AnalysisPayload, AnalysisPoller, AnalysisService},
    config::{Config, FailurePolicy, PollSettings},
    document::Document,
    gate::{FileTypeGate, ValidationVerdict},
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        extract::extract,
        record::{IndexRecord, RecordBuilder},
        types::{PipelineError, PipelineOutcome, ServiceInitError, Stage},
    },
    search::{IndexPublisher, SearchIndexClient},
    storage::{FailureSink, LocalFailureSink},
};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Runs one document at a time through validate, submit, poll, extract, build, and publish.
///
/// The service holds no per-document state, so a single instance is shared (behind an `Arc`)
/// by the HTTP surface, the CLI, and the queue drain. Every failure is logged and folded into
/// a [`PipelineOutcome`]; nothing raised for one document can abort processing of another.
pub struct PipelineService {
    gate: FileTypeGate,
    analysis: Arc<dyn AnalysisService>,
    publisher: Arc<dyn IndexPublisher>,
    failure_sink: Option<Arc<dyn FailureSink>>,
    poll: PollSettings,
    analysis_timeout: Option<Duration>,
    policy: FailurePolicy,
    records: RecordBuilder,
    metrics: Arc<PipelineMetrics>,
}

/// Abstraction over the pipeline used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Process one document to completion or cancellation.
    async fn process(&self, document: Document, cancel: &CancellationToken) -> PipelineOutcome;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl PipelineService {
    /// Assemble a pipeline from explicit collaborators.
    pub fn new(
        config: &Config,
        analysis: Arc<dyn AnalysisService>,
        publisher: Arc<dyn IndexPublisher>,
        failure_sink: Option<Arc<dyn FailureSink>>,
    ) -> Self {
        Self {
            gate: FileTypeGate::from_config(config),
            analysis,
            publisher,
            failure_sink,
            poll: config.poll,
            analysis_timeout: config.analysis_timeout,
            policy: config.failure_policy,
            records: RecordBuilder::new(config.record_id_strategy),
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Build the HTTP clients and local failure sink described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, ServiceInitError> {
        tracing::info!("Initializing analysis and search clients");
        let analysis = Arc::new(AnalysisClient::new(config)?);
        let publisher = Arc::new(SearchIndexClient::new(config)?);
        let sink = Arc::new(LocalFailureSink::under(&config.storage_root));
        Ok(Self::new(config, analysis, publisher, Some(sink)))
    }

    /// Share an existing metrics registry instead of the service's own.
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Metrics registry updated by this service.
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run `document` through the pipeline.
    ///
    /// `cancel` bounds the submit and poll stages; once it fires the run stops at the next
    /// suspension point and reports [`PipelineOutcome::AnalysisFailed`].
    pub async fn process(&self, document: Document, cancel: &CancellationToken) -> PipelineOutcome {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("pipeline", document = %document.name(), run_id = %run_id);
        self.run(document, &run_id, cancel).instrument(span).await
    }

    /// Return the current pipeline metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn run(
        &self,
        document: Document,
        run_id: &str,
        cancel: &CancellationToken,
    ) -> PipelineOutcome {
        if let ValidationVerdict::Reject(reason) = self.gate.validate(&document.artifact_info()) {
            tracing::warn!(
                stage = %Stage::Validate,
                reason = %reason,
                size = document.len(),
                content_type = document.content_type().unwrap_or("<none>"),
                "Document skipped"
            );
            self.metrics.record_skipped();
            return PipelineOutcome::Skipped { reason };
        }

        let payload = match self.analyze(&document, cancel).await {
            Ok(payload) => payload,
            Err(error) => return self.analysis_failed(&document, run_id, error).await,
        };

        match self.index(document.name(), &payload).await {
            Ok(record) => {
                self.metrics.record_indexed();
                tracing::info!(
                    record = %record.id,
                    file_name = %record.file_name,
                    "Document indexed"
                );
                PipelineOutcome::Indexed {
                    record_id: record.id,
                    file_name: record.file_name,
                }
            }
            Err(error) => self.index_failed(document.name(), run_id, payload, error).await,
        }
    }

    /// Submit and poll, bounded by the caller's token and the optional analysis deadline.
    async fn analyze(
        &self,
        document: &Document,
        cancel: &CancellationToken,
    ) -> Result<AnalysisPayload, PipelineError> {
        let token = cancel.child_token();
        let timer = self.analysis_timeout.map(|limit| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                token.cancel();
            })
        });

        let result = self.submit_and_poll(document, &token).await;
        if let Some(timer) = timer {
            timer.abort();
        }

        result.map_err(|error| match (error, self.analysis_timeout) {
            (
                PipelineError::Analysis {
                    stage,
                    source: AnalysisError::Cancelled { .. },
                },
                Some(limit),
            ) if !cancel.is_cancelled() => PipelineError::Analysis {
                stage,
                source: AnalysisError::DeadlineExceeded(limit),
            },
            (error, _) => error,
        })
    }

    async fn submit_and_poll(
        &self,
        document: &Document,
        cancel: &CancellationToken,
    ) -> Result<AnalysisPayload, PipelineError> {
        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AnalysisError::Cancelled { round: 0 }),
            submitted = self.analysis.submit(document) => submitted,
        };
        let handle = submitted.map_err(|source| PipelineError::Analysis {
            stage: Stage::Submit,
            source,
        })?;

        AnalysisPoller::new(self.analysis.as_ref(), self.poll)
            .poll(handle, cancel)
            .await
            .and_then(|result| result.into_payload())
            .map_err(|source| PipelineError::Analysis {
                stage: Stage::Poll,
                source,
            })
    }

    async fn index(
        &self,
        artifact_name: &str,
        payload: &AnalysisPayload,
    ) -> Result<IndexRecord, PipelineError> {
        let extracted = extract(artifact_name, payload)?;
        let metadata = extracted.metadata_block();
        let record = self
            .records
            .build(&extracted.file_name, extracted.text, metadata);
        tracing::debug!(
            stage = %Stage::Build,
            record = %record.id,
            chars = record.content.len(),
            "Built index record"
        );
        self.publisher.publish(&record).await?;
        Ok(record)
    }

    async fn analysis_failed(
        &self,
        document: &Document,
        run_id: &str,
        error: PipelineError,
    ) -> PipelineOutcome {
        let stage = error.stage();
        tracing::error!(stage = %stage, error = %error, "Document analysis failed");
        self.metrics.record_analysis_failure();

        let cancelled = matches!(
            error,
            PipelineError::Analysis {
                source: AnalysisError::Cancelled { .. },
                ..
            }
        );
        let quarantine_key = if self.policy.divert_analysis_failures && !cancelled {
            let key = format!("quarantine/{}_{run_id}", document.name());
            self.divert(key, document.bytes().clone()).await
        } else {
            None
        };

        PipelineOutcome::AnalysisFailed {
            stage,
            error: error.to_string(),
            quarantine_key,
        }
    }

    async fn index_failed(
        &self,
        document_name: &str,
        run_id: &str,
        payload: AnalysisPayload,
        error: PipelineError,
    ) -> PipelineOutcome {
        let stage = error.stage();
        tracing::error!(stage = %stage, error = %error, "Failed to index analyzed document");
        self.metrics.record_index_failure();

        let failure_key = if self.policy.divert_index_failures {
            let key = format!("failed/{document_name}_{run_id}");
            self.divert(key, payload.bytes()).await
        } else {
            tracing::warn!(stage = %stage, "Failure diversion disabled; payload dropped");
            None
        };

        PipelineOutcome::IndexFailed {
            stage,
            error: error.to_string(),
            failure_key,
        }
    }

    /// Write a payload to the failure sink; returns the key on success.
    async fn divert(&self, key: String, payload: Bytes) -> Option<String> {
        let Some(sink) = &self.failure_sink else {
            tracing::warn!(key = %key, "No failure sink configured; payload dropped");
            return None;
        };
        match sink.divert(&key, payload).await {
            Ok(()) => {
                self.metrics.record_diverted();
                tracing::info!(key = %key, "Diverted payload to failure sink");
                Some(key)
            }
            Err(error) => {
                tracing::error!(key = %key, error = %error, "Failed to divert payload");
                None
            }
        }
    }
}

#[async_trait]
impl PipelineApi for PipelineService {
    async fn process(&self, document: Document, cancel: &CancellationToken) -> PipelineOutcome {
        PipelineService::process(self, document, cancel).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        PipelineService::metrics_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::poller::tests::{Scripted, ScriptedService};
    use crate::config::test_config;
    use crate::gate::RejectReason;
    use crate::search::SearchError;
    use crate::storage::StoreError;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        records: Mutex<Vec<IndexRecord>>,
        fail: bool,
    }

    impl RecordingPublisher {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn published(&self) -> Vec<IndexRecord> {
            self.records.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl IndexPublisher for RecordingPublisher {
        async fn publish(&self, record: &IndexRecord) -> Result<(), SearchError> {
            if self.fail {
                return Err(SearchError::UnexpectedStatus {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    body: "index offline".into(),
                });
            }
            self.records.lock().expect("lock").push(record.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemorySink {
        entries: Mutex<HashMap<String, Bytes>>,
    }

    impl MemorySink {
        fn get(&self, key: &str) -> Option<Bytes> {
            self.entries.lock().expect("lock").get(key).cloned()
        }

        fn len(&self) -> usize {
            self.entries.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl FailureSink for MemorySink {
        async fn divert(&self, key: &str, payload: Bytes) -> Result<(), StoreError> {
            self.entries.lock().expect("lock").insert(key.to_string(), payload);
            Ok(())
        }
    }

    struct Harness {
        analysis: Arc<ScriptedService>,
        publisher: Arc<RecordingPublisher>,
        sink: Arc<MemorySink>,
        service: PipelineService,
    }

    fn harness(
        config: &Config,
        analysis: ScriptedService,
        publisher: RecordingPublisher,
    ) -> Harness {
        let analysis = Arc::new(analysis);
        let publisher = Arc::new(publisher);
        let sink = Arc::new(MemorySink::default());
        let service = PipelineService::new(
            config,
            analysis.clone(),
            publisher.clone(),
            Some(sink.clone() as Arc<dyn FailureSink>),
        );
        Harness {
            analysis,
            publisher,
            sink,
            service,
        }
    }

    fn succeeded_body() -> serde_json::Value {
        json!({
            "status": "succeeded",
            "analyzeResult": {
                "pages": [
                    { "lines": [ { "content": "Hello" } ] },
                    { "lines": [ { "content": "World" } ] }
                ]
            }
        })
    }

    fn pdf(name: &str) -> Document {
        Document::new(name, Some("application/pdf".into()), vec![b'x'; 10 * 1024])
    }

    #[tokio::test]
    async fn unsupported_extension_makes_no_external_calls() {
        let h = harness(
            &test_config(),
            ScriptedService::new(vec![Scripted::Body(succeeded_body())]),
            RecordingPublisher::default(),
        );
        let document = Document::new("archive.zip", Some("application/zip".into()), vec![0u8; 64]);

        let outcome = h.service.process(document, &CancellationToken::new()).await;

        assert_eq!(
            outcome,
            PipelineOutcome::Skipped {
                reason: RejectReason::UnsupportedType
            }
        );
        assert_eq!(h.analysis.submit_count(), 0);
        assert_eq!(h.analysis.poll_count(), 0);
        assert!(h.publisher.published().is_empty());
        assert_eq!(h.service.metrics_snapshot().documents_skipped, 1);
    }

    #[tokio::test]
    async fn unsupported_extension_with_supported_content_type_is_skipped() {
        let h = harness(
            &test_config(),
            ScriptedService::new(vec![Scripted::Body(succeeded_body())]),
            RecordingPublisher::default(),
        );
        let document = Document::new("malware.exe", Some("application/pdf".into()), vec![0u8; 64]);

        let outcome = h.service.process(document, &CancellationToken::new()).await;

        assert_eq!(
            outcome,
            PipelineOutcome::Skipped {
                reason: RejectReason::UnsupportedType
            }
        );
        assert_eq!(h.analysis.submit_count(), 0);
        assert_eq!(h.analysis.poll_count(), 0);
        assert!(h.publisher.published().is_empty());
    }

    #[tokio::test]
    async fn successful_analysis_publishes_one_record() {
        let h = harness(
            &test_config(),
            ScriptedService::new(vec![
                Scripted::Status("running"),
                Scripted::Body(succeeded_body()),
            ]),
            RecordingPublisher::default(),
        );

        let outcome = h.service.process(pdf("report.pdf"), &CancellationToken::new()).await;

        let published = h.publisher.published();
        assert_eq!(published.len(), 1);
        let record = &published[0];
        assert_eq!(record.file_name, "report");
        assert_eq!(record.content, "Hello\nWorld");
        assert!(record.metadata.starts_with("filename: report"));
        assert_eq!(
            outcome,
            PipelineOutcome::Indexed {
                record_id: record.id.clone(),
                file_name: "report".into()
            }
        );
        assert_eq!(h.analysis.poll_count(), 2);
        assert_eq!(h.sink.len(), 0);
        assert_eq!(h.service.metrics_snapshot().documents_indexed, 1);
    }

    #[tokio::test]
    async fn failed_analysis_is_quarantined_when_enabled() {
        let mut config = test_config();
        config.failure_policy.divert_analysis_failures = true;
        let h = harness(
            &config,
            ScriptedService::new(vec![Scripted::Body(
                json!({ "status": "failed", "error": { "message": "Corrupt" } }),
            )]),
            RecordingPublisher::default(),
        );

        let outcome = h.service.process(pdf("report.pdf"), &CancellationToken::new()).await;

        let PipelineOutcome::AnalysisFailed {
            stage,
            error,
            quarantine_key,
        } = outcome
        else {
            panic!("unexpected outcome");
        };
        assert_eq!(stage, Stage::Poll);
        assert!(error.contains("Corrupt"));
        let key = quarantine_key.expect("quarantined");
        assert!(key.starts_with("quarantine/report.pdf_"));
        assert_eq!(h.sink.get(&key).expect("stored").len(), 10 * 1024);
        assert!(h.publisher.published().is_empty());
    }

    #[tokio::test]
    async fn failed_analysis_is_only_logged_by_default() {
        let h = harness(
            &test_config(),
            ScriptedService::new(vec![Scripted::Status("failed")]),
            RecordingPublisher::default(),
        );

        let outcome = h.service.process(pdf("report.pdf"), &CancellationToken::new()).await;

        assert!(matches!(
            outcome,
            PipelineOutcome::AnalysisFailed {
                quarantine_key: None,
                ..
            }
        ));
        assert_eq!(h.sink.len(), 0);
        assert_eq!(h.service.metrics_snapshot().analysis_failures, 1);
    }

    #[tokio::test]
    async fn missing_operation_location_stops_before_polling() {
        let h = harness(
            &test_config(),
            ScriptedService::failing_submit(AnalysisError::MissingOperationLocation),
            RecordingPublisher::default(),
        );

        let outcome = h.service.process(pdf("report.pdf"), &CancellationToken::new()).await;

        assert!(matches!(
            outcome,
            PipelineOutcome::AnalysisFailed {
                stage: Stage::Submit,
                ..
            }
        ));
        assert_eq!(h.analysis.submit_count(), 1);
        assert_eq!(h.analysis.poll_count(), 0);
    }

    #[tokio::test]
    async fn publish_failure_diverts_analysis_payload() {
        let h = harness(
            &test_config(),
            ScriptedService::new(vec![Scripted::Body(succeeded_body())]),
            RecordingPublisher::failing(),
        );

        let outcome = h.service.process(pdf("report.pdf"), &CancellationToken::new()).await;

        let PipelineOutcome::IndexFailed {
            stage, failure_key, ..
        } = outcome
        else {
            panic!("unexpected outcome");
        };
        assert_eq!(stage, Stage::Publish);
        let key = failure_key.expect("diverted");
        assert!(key.starts_with("failed/report.pdf_"));
        let stored: serde_json::Value =
            serde_json::from_slice(&h.sink.get(&key).expect("stored")).expect("json payload");
        assert_eq!(stored["status"], "succeeded");

        let snapshot = h.service.metrics_snapshot();
        assert_eq!(snapshot.index_failures, 1);
        assert_eq!(snapshot.payloads_diverted, 1);
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_pending_submission() {
        let mut config = test_config();
        config.failure_policy.divert_analysis_failures = true;
        let h = harness(
            &config,
            ScriptedService::hanging_submit(),
            RecordingPublisher::default(),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            h.service.process(pdf("report.pdf"), &cancel),
        )
        .await
        .expect("submission should be abandoned promptly");

        let PipelineOutcome::AnalysisFailed {
            stage,
            error,
            quarantine_key,
        } = outcome
        else {
            panic!("unexpected outcome");
        };
        assert_eq!(stage, Stage::Submit);
        assert!(error.contains("cancel"), "{error}");
        assert!(quarantine_key.is_none());
        assert_eq!(h.analysis.submit_count(), 1);
        assert_eq!(h.analysis.poll_count(), 0);
        assert_eq!(h.sink.len(), 0);
    }

    #[tokio::test]
    async fn cancelled_run_is_not_quarantined() {
        let mut config = test_config();
        config.failure_policy.divert_analysis_failures = true;
        let h = harness(
            &config,
            ScriptedService::new(Vec::new()),
            RecordingPublisher::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = h.service.process(pdf("report.pdf"), &cancel).await;

        assert!(matches!(
            outcome,
            PipelineOutcome::AnalysisFailed {
                stage: Stage::Submit,
                quarantine_key: None,
                ..
            }
        ));
        assert_eq!(h.analysis.submit_count(), 0);
        assert_eq!(h.sink.len(), 0);
    }

    #[tokio::test]
    async fn analysis_deadline_stops_a_stuck_poll() {
        let mut config = test_config();
        config.poll = PollSettings {
            max_rounds: 100,
            delay: Duration::from_secs(3600),
        };
        config.analysis_timeout = Some(Duration::from_millis(20));
        let h = harness(
            &config,
            ScriptedService::new(Vec::new()),
            RecordingPublisher::default(),
        );

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            h.service.process(pdf("report.pdf"), &CancellationToken::new()),
        )
        .await
        .expect("deadline should stop the run");

        let PipelineOutcome::AnalysisFailed { stage, error, .. } = outcome else {
            panic!("unexpected outcome");
        };
        assert_eq!(stage, Stage::Poll);
        assert!(error.contains("deadline"));
        assert_eq!(h.analysis.poll_count(), 1);
    }
}
