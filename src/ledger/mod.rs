pub mod memory;
pub mod sqlite;

use crate::error::Result;
use crate::extract::LeadInfo;
use crate::fingerprint::fingerprint;
use crate::types::{CalendarEvent, Phase};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// One row of the processed-events ledger. The ledger is the single source
/// of truth for "has this event been handled".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Stable opaque row handle, assigned by the store on insert
    pub row_id: Option<Uuid>,
    /// Unique key; at most one record per calendar event
    pub event_id: String,
    pub fingerprint: String,
    pub phase: Phase,
    pub leader_name: String,
    pub company: String,
    pub event_date: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub email: Option<String>,
    pub build_file_id: Option<String>,
    pub build_folder_id: Option<String>,
}

/// Outcome of a ledger lookup for an incoming event.
///
/// The trichotomy: new event (no row), fully done (fingerprint match), or
/// stale (row exists but details changed, reuse it on reprocess).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedStatus {
    pub processed: bool,
    pub needs_update: bool,
    pub row: Option<Uuid>,
}

impl ProcessedStatus {
    fn new_event() -> Self {
        Self {
            processed: false,
            needs_update: false,
            row: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub total: usize,
    pub phase1: usize,
    pub phase2: usize,
    pub with_email: usize,
    pub with_build_file: usize,
}

/// Durable tabular backing store for the ledger, keyed by event id.
///
/// `scan` returns rows in ledger order (insertion order); `find_by_email`
/// disambiguation and Phase 2 resolution depend on that ordering.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<LedgerRecord>>;

    /// Append a new row; assigns and returns the row id.
    async fn insert(&self, record: &mut LedgerRecord) -> Result<Uuid>;

    /// Overwrite an existing row in place.
    async fn update(&self, row_id: Uuid, record: &LedgerRecord) -> Result<()>;

    async fn scan(&self) -> Result<Vec<LedgerRecord>>;

    async fn delete(&self, row_ids: &[Uuid]) -> Result<usize>;

    async fn clear(&self) -> Result<()>;
}

/// Policy layer over a [`LedgerStore`].
///
/// Read failures degrade to "nothing is processed" so a broken store can
/// only cause reprocessing, never a silent skip. Write failures propagate.
pub struct EventLedger {
    store: Arc<dyn LedgerStore>,
    dedupe_enabled: bool,
}

impl EventLedger {
    pub fn new(store: Arc<dyn LedgerStore>, dedupe_enabled: bool) -> Self {
        Self {
            store,
            dedupe_enabled,
        }
    }

    /// Classify an incoming event against the ledger.
    pub async fn is_processed(&self, event: &CalendarEvent) -> ProcessedStatus {
        if !self.dedupe_enabled {
            return ProcessedStatus::new_event();
        }
        match self.store.find_by_event_id(&event.id).await {
            Ok(None) => ProcessedStatus::new_event(),
            Ok(Some(record)) => {
                if record.fingerprint == fingerprint(event) {
                    ProcessedStatus {
                        processed: true,
                        needs_update: false,
                        row: record.row_id,
                    }
                } else {
                    debug!(event_id = %event.id, "Event details changed since last processing");
                    ProcessedStatus {
                        processed: false,
                        needs_update: true,
                        row: record.row_id,
                    }
                }
            }
            Err(e) => {
                warn!(event_id = %event.id, "Ledger read failed, treating event as unprocessed: {}", e);
                ProcessedStatus::new_event()
            }
        }
    }

    /// Record a successfully processed event. Updates the given row in place
    /// when this was a staleness-triggered reprocess, otherwise appends.
    pub async fn mark_processed(
        &self,
        event: &CalendarEvent,
        phase: Phase,
        lead: &LeadInfo,
        row: Option<Uuid>,
        build_file_id: Option<&str>,
        build_folder_id: Option<&str>,
    ) -> Result<Uuid> {
        let now = Utc::now();
        let mut record = LedgerRecord {
            row_id: row,
            event_id: event.id.clone(),
            fingerprint: fingerprint(event),
            phase,
            leader_name: lead.full_name.clone(),
            company: lead.company_name.clone(),
            event_date: event.start_time,
            processed_at: now,
            last_updated_at: now,
            email: Some(lead.email.clone()),
            build_file_id: build_file_id.map(str::to_string),
            build_folder_id: build_folder_id.map(str::to_string),
        };

        match row {
            Some(row_id) => {
                // Reuse the existing row; artifact ids absent from this pass
                // carry over rather than being wiped.
                if record.build_file_id.is_none() || record.build_folder_id.is_none() {
                    if let Some(existing) = self.store.find_by_event_id(&event.id).await? {
                        if record.build_file_id.is_none() {
                            record.build_file_id = existing.build_file_id;
                        }
                        if record.build_folder_id.is_none() {
                            record.build_folder_id = existing.build_folder_id;
                        }
                    }
                }
                self.store.update(row_id, &record).await?;
                debug!(event_id = %event.id, %row_id, "Updated ledger row in place");
                Ok(row_id)
            }
            None => {
                let row_id = self.store.insert(&mut record).await?;
                debug!(event_id = %event.id, %row_id, "Appended ledger row");
                Ok(row_id)
            }
        }
    }

    /// Case-insensitive email lookup across rows that carry a Build File id.
    ///
    /// Email is a fast index but not unique (shared company inboxes,
    /// re-bookings), so with multiple candidates the leader-name hint acts as
    /// a soft tie-breaker. When the hint narrows to anything other than
    /// exactly one row, this degrades to the first candidate in ledger order
    /// with a loud log, never an error.
    pub async fn find_by_email(
        &self,
        email: &str,
        leader_name: Option<&str>,
    ) -> Option<LedgerRecord> {
        let rows = match self.store.scan().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Ledger scan failed, treating ledger as empty: {}", e);
                return None;
            }
        };

        let candidates: Vec<&LedgerRecord> = rows
            .iter()
            .filter(|r| {
                r.email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
                    && r.build_file_id.as_deref().is_some_and(|id| !id.is_empty())
            })
            .collect();

        match candidates.len() {
            0 => None,
            1 => Some(candidates[0].clone()),
            n => {
                if let Some(hint) = leader_name {
                    let named: Vec<&&LedgerRecord> = candidates
                        .iter()
                        .filter(|r| r.leader_name.eq_ignore_ascii_case(hint))
                        .collect();
                    if named.len() == 1 {
                        return Some((*named[0]).clone());
                    }
                }
                warn!(
                    email,
                    candidates = n,
                    "Ambiguous email lookup, falling back to first ledger match"
                );
                Some(candidates[0].clone())
            }
        }
    }

    /// Delete rows whose event date precedes the retention horizon.
    /// Returns the number of rows removed.
    pub async fn prune_older_than(&self, horizon: Duration) -> Result<usize> {
        let cutoff = Utc::now() - horizon;
        let rows = self.store.scan().await?;
        let stale: Vec<Uuid> = rows
            .iter()
            .filter(|r| r.event_date < cutoff)
            .filter_map(|r| r.row_id)
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        let removed = self.store.delete(&stale).await?;
        debug!(removed, "Pruned ledger rows past retention horizon");
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<LedgerStats> {
        let rows = self.store.scan().await?;
        let mut stats = LedgerStats {
            total: rows.len(),
            ..LedgerStats::default()
        };
        for row in &rows {
            match row.phase {
                Phase::Phase1 => stats.phase1 += 1,
                Phase::Phase2 => stats.phase2 += 1,
            }
            if row.email.as_deref().is_some_and(|e| !e.is_empty()) {
                stats.with_email += 1;
            }
            if row.build_file_id.as_deref().is_some_and(|id| !id.is_empty()) {
                stats.with_build_file += 1;
            }
        }
        Ok(stats)
    }

    /// Drop every row. Explicit operator action only.
    pub async fn reset(&self) -> Result<()> {
        self.store.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryLedgerStore;
    use super::*;
    use crate::error::AutomationError;
    use chrono::TimeZone;

    fn sample_event(id: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: "Phase 1 Session".to_string(),
            description: "Phase 1\nFirst name: Ava\nLast name: Brooks\nEmail: ava@acme.com"
                .to_string(),
            location: "https://zoom.us/j/111".to_string(),
            start_time: Utc.with_ymd_and_hms(2025, 1, 10, 18, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 1, 10, 19, 0, 0).unwrap(),
        }
    }

    fn sample_lead(name: &str, email: &str) -> LeadInfo {
        let mut parts = name.splitn(2, ' ');
        let first = parts.next().unwrap_or_default().to_string();
        let last = parts.next().unwrap_or_default().to_string();
        LeadInfo {
            first_name: first,
            last_name: last,
            full_name: name.to_string(),
            email: email.to_string(),
            company_name: "Acme Co".to_string(),
            phone: String::new(),
            formatted_date: "January 10, 2025".to_string(),
            formatted_time: "6:00 PM".to_string(),
            zoom_link: "https://zoom.us/j/111".to_string(),
        }
    }

    fn ledger() -> EventLedger {
        EventLedger::new(Arc::new(MemoryLedgerStore::new()), true)
    }

    #[tokio::test]
    async fn unknown_event_is_new() {
        let ledger = ledger();
        let status = ledger.is_processed(&sample_event("e1")).await;
        assert_eq!(
            status,
            ProcessedStatus {
                processed: false,
                needs_update: false,
                row: None
            }
        );
    }

    #[tokio::test]
    async fn unchanged_event_is_fully_processed() {
        let ledger = ledger();
        let event = sample_event("e1");
        let lead = sample_lead("Ava Brooks", "ava@acme.com");
        let row = ledger
            .mark_processed(&event, Phase::Phase1, &lead, None, Some("bf-1"), Some("fo-1"))
            .await
            .unwrap();

        let status = ledger.is_processed(&event).await;
        assert!(status.processed);
        assert!(!status.needs_update);
        assert_eq!(status.row, Some(row));
    }

    #[tokio::test]
    async fn changed_details_flag_the_row_as_stale() {
        let ledger = ledger();
        let event = sample_event("e1");
        let lead = sample_lead("Ava Brooks", "ava@acme.com");
        let row = ledger
            .mark_processed(&event, Phase::Phase1, &lead, None, Some("bf-1"), Some("fo-1"))
            .await
            .unwrap();

        let mut moved = event.clone();
        moved.location = "https://zoom.us/j/999".to_string();
        let status = ledger.is_processed(&moved).await;
        assert!(!status.processed);
        assert!(status.needs_update);
        assert_eq!(status.row, Some(row));
    }

    #[tokio::test]
    async fn reprocessing_updates_the_same_row() {
        let ledger = ledger();
        let event = sample_event("e1");
        let lead = sample_lead("Ava Brooks", "ava@acme.com");
        let row = ledger
            .mark_processed(&event, Phase::Phase1, &lead, None, Some("bf-1"), Some("fo-1"))
            .await
            .unwrap();
        let fp_before = ledger.store.scan().await.unwrap()[0].fingerprint.clone();

        let mut moved = event.clone();
        moved.location = "https://zoom.us/j/999".to_string();
        let status = ledger.is_processed(&moved).await;
        let row_again = ledger
            .mark_processed(
                &moved,
                Phase::Phase1,
                &lead,
                status.row,
                Some("bf-1"),
                Some("fo-1"),
            )
            .await
            .unwrap();

        assert_eq!(row, row_again);
        let rows = ledger.store.scan().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_ne!(rows[0].fingerprint, fp_before);
        assert!(ledger.is_processed(&moved).await.processed);
    }

    #[tokio::test]
    async fn in_place_update_preserves_artifact_ids_when_absent() {
        let ledger = ledger();
        let event = sample_event("e1");
        let lead = sample_lead("Ava Brooks", "ava@acme.com");
        ledger
            .mark_processed(&event, Phase::Phase1, &lead, None, Some("bf-1"), Some("fo-1"))
            .await
            .unwrap();

        let mut moved = event.clone();
        moved.location = "https://zoom.us/j/999".to_string();
        let status = ledger.is_processed(&moved).await;
        ledger
            .mark_processed(&moved, Phase::Phase1, &lead, status.row, None, None)
            .await
            .unwrap();

        let rows = ledger.store.scan().await.unwrap();
        assert_eq!(rows[0].build_file_id.as_deref(), Some("bf-1"));
        assert_eq!(rows[0].build_folder_id.as_deref(), Some("fo-1"));
    }

    #[tokio::test]
    async fn dedupe_disabled_treats_every_event_as_new() {
        let ledger = EventLedger::new(Arc::new(MemoryLedgerStore::new()), false);
        let event = sample_event("e1");
        let lead = sample_lead("Ava Brooks", "ava@acme.com");
        ledger
            .mark_processed(&event, Phase::Phase1, &lead, None, Some("bf-1"), None)
            .await
            .unwrap();
        let status = ledger.is_processed(&event).await;
        assert!(!status.processed);
        assert!(status.row.is_none());
    }

    #[tokio::test]
    async fn email_lookup_requires_a_build_file_id() {
        let ledger = ledger();
        let lead = sample_lead("Ava Brooks", "ava@acme.com");
        // Phase 2 row, no artifact minted
        ledger
            .mark_processed(&sample_event("e2"), Phase::Phase2, &lead, None, None, None)
            .await
            .unwrap();
        assert!(ledger.find_by_email("ava@acme.com", None).await.is_none());
    }

    #[tokio::test]
    async fn email_lookup_is_case_insensitive() {
        let ledger = ledger();
        let lead = sample_lead("Ava Brooks", "ava@acme.com");
        ledger
            .mark_processed(&sample_event("e1"), Phase::Phase1, &lead, None, Some("bf-1"), None)
            .await
            .unwrap();
        let hit = ledger.find_by_email("AVA@ACME.COM", None).await.unwrap();
        assert_eq!(hit.build_file_id.as_deref(), Some("bf-1"));
    }

    #[tokio::test]
    async fn shared_email_disambiguates_by_name_hint() {
        let ledger = ledger();
        let lead_a = sample_lead("Ava Brooks", "team@acme.com");
        let lead_b = sample_lead("Ben Cole", "team@acme.com");
        ledger
            .mark_processed(&sample_event("e1"), Phase::Phase1, &lead_a, None, Some("bf-a"), None)
            .await
            .unwrap();
        ledger
            .mark_processed(&sample_event("e2"), Phase::Phase1, &lead_b, None, Some("bf-b"), None)
            .await
            .unwrap();

        let hit = ledger
            .find_by_email("team@acme.com", Some("ben cole"))
            .await
            .unwrap();
        assert_eq!(hit.build_file_id.as_deref(), Some("bf-b"));
    }

    #[tokio::test]
    async fn shared_email_without_hint_returns_first_in_ledger_order() {
        let ledger = ledger();
        let lead_a = sample_lead("Ava Brooks", "team@acme.com");
        let lead_b = sample_lead("Ben Cole", "team@acme.com");
        ledger
            .mark_processed(&sample_event("e1"), Phase::Phase1, &lead_a, None, Some("bf-a"), None)
            .await
            .unwrap();
        ledger
            .mark_processed(&sample_event("e2"), Phase::Phase1, &lead_b, None, Some("bf-b"), None)
            .await
            .unwrap();

        let hit = ledger.find_by_email("team@acme.com", None).await.unwrap();
        assert_eq!(hit.build_file_id.as_deref(), Some("bf-a"));
    }

    #[tokio::test]
    async fn unmatched_hint_falls_back_to_first_candidate() {
        let ledger = ledger();
        let lead_a = sample_lead("Ava Brooks", "team@acme.com");
        let lead_b = sample_lead("Ben Cole", "team@acme.com");
        ledger
            .mark_processed(&sample_event("e1"), Phase::Phase1, &lead_a, None, Some("bf-a"), None)
            .await
            .unwrap();
        ledger
            .mark_processed(&sample_event("e2"), Phase::Phase1, &lead_b, None, Some("bf-b"), None)
            .await
            .unwrap();

        let hit = ledger
            .find_by_email("team@acme.com", Some("Nobody Known"))
            .await
            .unwrap();
        assert_eq!(hit.build_file_id.as_deref(), Some("bf-a"));
    }

    #[tokio::test]
    async fn prune_removes_only_rows_past_horizon() {
        let ledger = ledger();
        let lead = sample_lead("Ava Brooks", "ava@acme.com");

        let mut old_event = sample_event("old");
        old_event.start_time = Utc::now() - Duration::days(400);
        old_event.end_time = old_event.start_time + Duration::hours(1);
        let mut fresh_event = sample_event("fresh");
        fresh_event.start_time = Utc::now() - Duration::days(10);
        fresh_event.end_time = fresh_event.start_time + Duration::hours(1);

        ledger
            .mark_processed(&old_event, Phase::Phase1, &lead, None, Some("bf-1"), None)
            .await
            .unwrap();
        ledger
            .mark_processed(&fresh_event, Phase::Phase2, &lead, None, None, None)
            .await
            .unwrap();

        let removed = ledger.prune_older_than(Duration::days(365)).await.unwrap();
        assert_eq!(removed, 1);
        let rows = ledger.store.scan().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_id, "fresh");

        // Second run finds nothing left to remove
        let removed = ledger.prune_older_than(Duration::days(365)).await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn stats_aggregate_phases_and_optional_fields() {
        let ledger = ledger();
        let lead = sample_lead("Ava Brooks", "ava@acme.com");
        ledger
            .mark_processed(&sample_event("e1"), Phase::Phase1, &lead, None, Some("bf-1"), None)
            .await
            .unwrap();
        ledger
            .mark_processed(&sample_event("e2"), Phase::Phase2, &lead, None, None, None)
            .await
            .unwrap();

        let stats = ledger.stats().await.unwrap();
        assert_eq!(
            stats,
            LedgerStats {
                total: 2,
                phase1: 1,
                phase2: 1,
                with_email: 2,
                with_build_file: 1,
            }
        );
    }

    /// Backing store that refuses every operation, standing in for a ledger
    /// spreadsheet that is missing or permission-denied.
    struct UnavailableStore;

    #[async_trait]
    impl LedgerStore for UnavailableStore {
        async fn find_by_event_id(&self, _event_id: &str) -> Result<Option<LedgerRecord>> {
            Err(AutomationError::LedgerUnavailable("no access".to_string()))
        }
        async fn insert(&self, _record: &mut LedgerRecord) -> Result<Uuid> {
            Err(AutomationError::LedgerUnavailable("no access".to_string()))
        }
        async fn update(&self, _row_id: Uuid, _record: &LedgerRecord) -> Result<()> {
            Err(AutomationError::LedgerUnavailable("no access".to_string()))
        }
        async fn scan(&self) -> Result<Vec<LedgerRecord>> {
            Err(AutomationError::LedgerUnavailable("no access".to_string()))
        }
        async fn delete(&self, _row_ids: &[Uuid]) -> Result<usize> {
            Err(AutomationError::LedgerUnavailable("no access".to_string()))
        }
        async fn clear(&self) -> Result<()> {
            Err(AutomationError::LedgerUnavailable("no access".to_string()))
        }
    }

    #[tokio::test]
    async fn unavailable_store_reads_as_empty_but_writes_fail() {
        let ledger = EventLedger::new(Arc::new(UnavailableStore), true);
        let event = sample_event("e1");
        let lead = sample_lead("Ava Brooks", "ava@acme.com");

        // Safe default: must reprocess, never skip
        let status = ledger.is_processed(&event).await;
        assert!(!status.processed);
        assert!(ledger.find_by_email("ava@acme.com", None).await.is_none());

        // Losing a record is worse than reprocessing: writes surface
        let err = ledger
            .mark_processed(&event, Phase::Phase1, &lead, None, Some("bf-1"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::LedgerUnavailable(_)));
    }
}
