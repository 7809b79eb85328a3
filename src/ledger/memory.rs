use super::{LedgerRecord, LedgerStore};
use crate::error::{AutomationError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// In-memory ledger store for development and testing.
///
/// Rows live in a plain vector; insertion order is ledger order.
pub struct MemoryLedgerStore {
    rows: Mutex<Vec<LedgerRecord>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<LedgerRecord>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|r| r.event_id == event_id).cloned())
    }

    async fn insert(&self, record: &mut LedgerRecord) -> Result<Uuid> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|r| r.event_id == record.event_id) {
            return Err(AutomationError::Storage(format!(
                "duplicate ledger row for event '{}'",
                record.event_id
            )));
        }
        let row_id = Uuid::new_v4();
        record.row_id = Some(row_id);
        rows.push(record.clone());
        debug!(event_id = %record.event_id, %row_id, "Inserted ledger row");
        Ok(row_id)
    }

    async fn update(&self, row_id: Uuid, record: &LedgerRecord) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let slot = rows
            .iter_mut()
            .find(|r| r.row_id == Some(row_id))
            .ok_or_else(|| AutomationError::Storage(format!("unknown ledger row {row_id}")))?;
        *slot = record.clone();
        slot.row_id = Some(row_id);
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<LedgerRecord>> {
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn delete(&self, row_ids: &[Uuid]) -> Result<usize> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.row_id.map_or(true, |id| !row_ids.contains(&id)));
        Ok(before - rows.len())
    }

    async fn clear(&self) -> Result<()> {
        self.rows.lock().unwrap().clear();
        Ok(())
    }
}
