use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::batch::sanitize::sanitize_request;
use crate::batch::{BatchOutcome, BatchReport, BatchResult, GENERIC_FAILURE_MESSAGE};
use crate::domain::counterparty::{CounterpartyId, CounterpartySummary, EntityId};
use crate::domain::field::StepPayload;
use crate::services::{CounterpartyDirectory, NegotiationGateway};

/// Starts one negotiation per selected counterparty, concurrently, and
/// reports an outcome for every one of them.
pub struct BatchSubmissionOrchestrator {
    gateway: Arc<dyn NegotiationGateway>,
    directory: Arc<dyn CounterpartyDirectory>,
    audit: Option<(Arc<dyn AuditSink>, AuditContext)>,
}

impl BatchSubmissionOrchestrator {
    pub fn new(
        gateway: Arc<dyn NegotiationGateway>,
        directory: Arc<dyn CounterpartyDirectory>,
    ) -> Self {
        Self { gateway, directory, audit: None }
    }

    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>, context: AuditContext) -> Self {
        self.audit = Some((sink, context));
        self
    }

    /// Never fails: the report always holds `counterparty_ids.len()` results in
    /// submission order.
    pub async fn submit_batch(
        &self,
        entity_id: &EntityId,
        payload: &StepPayload,
        counterparty_ids: &[CounterpartyId],
    ) -> BatchReport {
        let run_id = Uuid::new_v4();
        if counterparty_ids.is_empty() {
            return BatchReport { run_id, results: Vec::new() };
        }

        let directory = self.lookup_counterparties(entity_id).await;
        info!(
            event_name = "batch.started",
            run_id = %run_id,
            entity_id = %entity_id,
            targets = counterparty_ids.len(),
            "submitting negotiation batch"
        );

        let handles = counterparty_ids.iter().map(|counterparty_id| {
            let summary = directory.get(counterparty_id);
            let link = summary.and_then(|summary| summary.existing_negotiation_id.clone());
            let request = sanitize_request(entity_id, counterparty_id, link, payload);
            let gateway = Arc::clone(&self.gateway);
            let counterparty_id = counterparty_id.clone();
            tokio::spawn(async move { gateway.create_negotiation(&counterparty_id, request).await })
        });
        let settled = join_all(handles).await;

        let results: Vec<BatchResult> = counterparty_ids
            .iter()
            .zip(settled)
            .map(|(counterparty_id, settled)| {
                let display_name = directory.get(counterparty_id).map_or_else(
                    || counterparty_id.0.clone(),
                    |summary| summary.display_name.clone(),
                );
                let outcome = match settled {
                    Ok(Ok(negotiation)) => {
                        BatchOutcome::Fulfilled { negotiation_id: negotiation.id }
                    }
                    Ok(Err(error)) => {
                        warn!(
                            event_name = "batch.request_rejected",
                            run_id = %run_id,
                            counterparty_id = %counterparty_id,
                            error = %error,
                            "negotiation request failed"
                        );
                        let message = error.message_or(GENERIC_FAILURE_MESSAGE);
                        BatchOutcome::Rejected { message }
                    }
                    Err(join_error) => {
                        warn!(
                            event_name = "batch.request_aborted",
                            run_id = %run_id,
                            counterparty_id = %counterparty_id,
                            error = %join_error,
                            "negotiation request task did not complete"
                        );
                        BatchOutcome::Rejected { message: GENERIC_FAILURE_MESSAGE.to_owned() }
                    }
                };
                BatchResult { counterparty_id: counterparty_id.clone(), display_name, outcome }
            })
            .collect();

        let report = BatchReport { run_id, results };
        self.emit_audit(&report);
        info!(
            event_name = "batch.completed",
            run_id = %run_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "negotiation batch settled"
        );
        report
    }

    /// Resubmits only the counterparties rejected in `last`. The returned
    /// report replaces `last`.
    pub async fn retry_failed(
        &self,
        entity_id: &EntityId,
        payload: &StepPayload,
        last: &BatchReport,
    ) -> BatchReport {
        let failed = last.failed_ids();
        info!(
            event_name = "batch.retry",
            previous_run_id = %last.run_id,
            retrying = failed.len(),
            "retrying failed negotiations"
        );
        self.submit_batch(entity_id, payload, &failed).await
    }

    async fn lookup_counterparties(
        &self,
        entity_id: &EntityId,
    ) -> HashMap<CounterpartyId, CounterpartySummary> {
        match self.directory.fetch_counterparty_list(entity_id).await {
            Ok(list) => list.into_iter().map(|summary| (summary.id.clone(), summary)).collect(),
            Err(error) => {
                warn!(
                    event_name = "batch.directory_unavailable",
                    entity_id = %entity_id,
                    error = %error,
                    "counterparty directory unavailable; using ids as names"
                );
                HashMap::new()
            }
        }
    }

    fn emit_audit(&self, report: &BatchReport) {
        let Some((sink, context)) = &self.audit else {
            return;
        };
        for result in &report.results {
            let (event_type, outcome) = match &result.outcome {
                BatchOutcome::Fulfilled { .. } => {
                    ("batch.request_fulfilled", AuditOutcome::Success)
                }
                BatchOutcome::Rejected { .. } => ("batch.request_rejected", AuditOutcome::Rejected),
            };
            let mut event = context
                .event(event_type, AuditCategory::Batch, outcome)
                .with_metadata("run_id", report.run_id.to_string())
                .with_metadata("counterparty_id", result.counterparty_id.0.clone());
            if let BatchOutcome::Fulfilled { negotiation_id } = &result.outcome {
                event = event.with_metadata("negotiation_id", negotiation_id.0.clone());
            }
            sink.emit(event);
        }
    }
}
