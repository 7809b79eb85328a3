use crate::config::Config;
use crate::error::Result;
use crate::extract::{extract_lead_info, LeadInfo};
use crate::ledger::EventLedger;
use crate::notify::Notifier;
use crate::processor::{classify, SessionProcessor};
use crate::types::{CalendarEvent, CalendarSource, Phase};
use chrono::Duration;
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Result of one complete batch run.
#[derive(Debug, Default, Serialize)]
pub struct BatchSummary {
    pub fetched: usize,
    /// Newly processed (including staleness-triggered reprocesses)
    pub processed: usize,
    /// Skipped because the ledger shows them fully done
    pub already_processed: usize,
    /// Skipped because no keyword set matched
    pub unmatched: usize,
    pub errors: Vec<String>,
}

/// Pulls every in-window event from the configured sources and runs each
/// through the state machine, isolating per-event failures so one bad event
/// never aborts the batch.
pub struct BatchRunner {
    sources: Vec<Box<dyn CalendarSource>>,
    ledger: EventLedger,
    processor: SessionProcessor,
    notifier: Arc<dyn Notifier>,
    config: Arc<Config>,
}

impl BatchRunner {
    pub fn new(
        sources: Vec<Box<dyn CalendarSource>>,
        ledger: EventLedger,
        processor: SessionProcessor,
        notifier: Arc<dyn Notifier>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            sources,
            ledger,
            processor,
            notifier,
            config,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> BatchSummary {
        let started = std::time::Instant::now();
        counter!("buildflow_batch_runs_total").increment(1);

        let now = chrono::Utc::now();
        let window_start = now - Duration::days(self.config.monitoring.lookback_days);
        let window_end = now + Duration::days(self.config.monitoring.lookahead_days);
        info!(%window_start, %window_end, "Starting batch run");

        let mut summary = BatchSummary::default();
        for source in &self.sources {
            match source.list_events(window_start, window_end).await {
                Ok(events) => {
                    info!("Fetched {} events from source '{}'", events.len(), source.name());
                    summary.fetched += events.len();
                    for event in events {
                        self.handle_event(&event, &mut summary).await;
                    }
                }
                Err(e) => {
                    error!("Source '{}' failed to list events: {}", source.name(), e);
                    summary
                        .errors
                        .push(format!("source '{}': {}", source.name(), e));
                }
            }
        }

        counter!("buildflow_events_processed_total").increment(summary.processed as u64);
        counter!("buildflow_events_skipped_total")
            .increment((summary.already_processed + summary.unmatched) as u64);
        counter!("buildflow_event_errors_total").increment(summary.errors.len() as u64);
        histogram!("buildflow_batch_duration_seconds").record(started.elapsed().as_secs_f64());

        info!(
            fetched = summary.fetched,
            processed = summary.processed,
            already_processed = summary.already_processed,
            unmatched = summary.unmatched,
            errors = summary.errors.len(),
            "Batch run finished"
        );
        summary
    }

    async fn handle_event(&self, event: &CalendarEvent, summary: &mut BatchSummary) {
        let Some(phase) = classify(event, &self.config.classification) else {
            debug!(event_id = %event.id, "Event matches no keyword set, skipping");
            summary.unmatched += 1;
            return;
        };

        let status = self.ledger.is_processed(event).await;
        if status.processed {
            debug!(event_id = %event.id, "Event already fully processed, skipping");
            summary.already_processed += 1;
            return;
        }
        if status.needs_update {
            info!(event_id = %event.id, "Event details changed, reprocessing");
        }

        match self.process_one(event, phase, status.row).await {
            Ok((lead, file_id)) => {
                self.notifier.notify_success(&lead, &file_id).await;
                summary.processed += 1;
            }
            Err(e) => {
                error!(event_id = %event.id, phase = %phase, "Failed to process event: {}", e);
                // Include whatever lead info is still extractable in the
                // failure notice
                let lead = extract_lead_info(event).ok();
                self.notifier
                    .notify_failure(event, lead.as_ref(), &e.to_string())
                    .await;
                summary
                    .errors
                    .push(format!("{} ({}): {}", event.title, event.id, e));
            }
        }
    }

    /// One state-machine transition plus the ledger write. Any error leaves
    /// the ledger untouched so the next batch retries the event.
    async fn process_one(
        &self,
        event: &CalendarEvent,
        phase: Phase,
        row: Option<Uuid>,
    ) -> Result<(LeadInfo, String)> {
        match phase {
            Phase::Phase1 => {
                let outcome = self.processor.process_phase1(event).await?;
                self.ledger
                    .mark_processed(
                        event,
                        phase,
                        &outcome.lead,
                        row,
                        Some(outcome.file_id.as_str()),
                        Some(outcome.folder_id.as_str()),
                    )
                    .await?;
                Ok((outcome.lead, outcome.file_id))
            }
            Phase::Phase2 => {
                let outcome = self.processor.process_phase2(event, &self.ledger).await?;
                self.ledger
                    .mark_processed(event, phase, &outcome.lead, row, None, None)
                    .await?;
                Ok((outcome.lead, outcome.file_id))
            }
        }
    }
}
