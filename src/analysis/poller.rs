//! Bounded, cancellable poll loop over an analysis job.
//!
//! Each round issues one status query. Rate limiting and server faults (429/5xx) are transient
//! and simply consume the round; other transport or body failures are logged and also consume
//! the round. A `succeeded` or `failed` status ends the loop immediately. Anything else keeps
//! the job pending until the round budget runs out, which yields [`AnalysisResult::TimedOut`].
//!
//! The only suspension points are the status query itself and the fixed inter-round delay.
//! Both race against the caller's [`CancellationToken`], so a cancelled run stops promptly
//! instead of finishing its remaining rounds.

use crate::analysis::client::AnalysisService;
use crate::analysis::types::{
    AnalysisError, AnalysisPayload, AnalysisResult, JobHandle, JobStatus, StatusRound,
};
use crate::config::PollSettings;
use tokio_util::sync::CancellationToken;

/// Drives a single job handle to a terminal [`AnalysisResult`].
pub struct AnalysisPoller<'a> {
    service: &'a dyn AnalysisService,
    settings: PollSettings,
}

impl<'a> AnalysisPoller<'a> {
    /// Poll through `service` using the given round budget and delay.
    pub fn new(service: &'a dyn AnalysisService, settings: PollSettings) -> Self {
        Self { service, settings }
    }

    /// Poll `handle` until a terminal status, budget exhaustion, or cancellation.
    ///
    /// Returns `Err` only for [`AnalysisError::Cancelled`]; every other outcome is an
    /// [`AnalysisResult`].
    pub async fn poll(
        &self,
        handle: JobHandle,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let max_rounds = self.settings.max_rounds.max(1);
        let mut last_error: Option<String> = None;

        for round in 1..=max_rounds {
            tracing::debug!(round, max_rounds, "Polling for analysis result");

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(round)),
                response = self.service.fetch_status(&handle) => response,
            };

            match response {
                Ok(StatusRound::Transient { status }) => {
                    tracing::warn!(
                        round,
                        status = status.as_u16(),
                        "Transient analysis error; will retry"
                    );
                    last_error = Some(format!("transient HTTP status {status}"));
                }
                Ok(StatusRound::Report(report)) => match report.job_status() {
                    JobStatus::Succeeded => {
                        tracing::info!(round, "Document analysis succeeded");
                        return Ok(AnalysisResult::Succeeded(AnalysisPayload::new(report.body)));
                    }
                    JobStatus::Failed => {
                        let reason = report
                            .failure_reason
                            .unwrap_or_else(|| "analysis service reported failure".to_string());
                        tracing::warn!(round, reason = %reason, "Document analysis failed");
                        return Ok(AnalysisResult::Failed { reason });
                    }
                    JobStatus::Pending => {
                        tracing::info!(
                            round,
                            status = report.status.as_deref().unwrap_or("<missing>"),
                            "Analysis not complete yet"
                        );
                        last_error = None;
                    }
                },
                Err(error) => {
                    tracing::error!(round, error = %error, "Error during poll round");
                    last_error = Some(error.to_string());
                }
            }

            if round < max_rounds {
                self.wait(round, cancel).await?;
            }
        }

        tracing::warn!(
            rounds = max_rounds,
            last_error = last_error.as_deref().unwrap_or("none"),
            "Document analysis did not complete within retry limit"
        );
        Ok(AnalysisResult::TimedOut {
            rounds: max_rounds,
            last_error,
        })
    }

    async fn wait(&self, round: u32, cancel: &CancellationToken) -> Result<(), AnalysisError> {
        tracing::debug!(
            round,
            delay_ms = self.settings.delay.as_millis() as u64,
            "Waiting before next poll round"
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(self.cancelled(round + 1)),
            _ = tokio::time::sleep(self.settings.delay) => Ok(()),
        }
    }

    fn cancelled(&self, round: u32) -> AnalysisError {
        tracing::warn!(round, "Analysis polling cancelled");
        AnalysisError::Cancelled { round }
    }
}
