use super::{LedgerRecord, LedgerStore};
use crate::error::{AutomationError, Result};
use crate::types::Phase;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

const SELECT_COLUMNS: &str = "row_id, event_id, fingerprint, phase, leader_name, company, \
     event_date, processed_at, last_updated_at, email, build_file_id, build_folder_id";

/// SQLite-backed ledger store. One row per calendar event; ledger order is
/// SQLite rowid order, which matches insertion order.
pub struct SqliteLedgerStore {
    conn: Mutex<Connection>,
}

impl SqliteLedgerStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| {
            AutomationError::LedgerUnavailable(format!("cannot open '{}': {}", path.display(), e))
        })?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS ledger (
                row_id          TEXT PRIMARY KEY,
                event_id        TEXT NOT NULL UNIQUE,
                fingerprint     TEXT NOT NULL,
                phase           TEXT NOT NULL,
                leader_name     TEXT NOT NULL,
                company         TEXT NOT NULL,
                event_date      TEXT NOT NULL,
                processed_at    TEXT NOT NULL,
                last_updated_at TEXT NOT NULL,
                email           TEXT,
                build_file_id   TEXT,
                build_folder_id TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_ledger_email ON ledger(email);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn parse_ts(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AutomationError::LedgerUnavailable(format!("corrupt timestamp '{text}': {e}")))
}

fn read_record(row: &Row<'_>) -> Result<LedgerRecord> {
    let row_id: String = row.get(0)?;
    let phase: String = row.get(3)?;
    let event_date: String = row.get(6)?;
    let processed_at: String = row.get(7)?;
    let last_updated_at: String = row.get(8)?;
    Ok(LedgerRecord {
        row_id: Some(Uuid::parse_str(&row_id).map_err(|e| {
            AutomationError::LedgerUnavailable(format!("corrupt row id '{row_id}': {e}"))
        })?),
        event_id: row.get(1)?,
        fingerprint: row.get(2)?,
        phase: Phase::parse(&phase).ok_or_else(|| {
            AutomationError::LedgerUnavailable(format!("corrupt phase '{phase}'"))
        })?,
        leader_name: row.get(4)?,
        company: row.get(5)?,
        event_date: parse_ts(&event_date)?,
        processed_at: parse_ts(&processed_at)?,
        last_updated_at: parse_ts(&last_updated_at)?,
        email: row.get(9)?,
        build_file_id: row.get(10)?,
        build_folder_id: row.get(11)?,
    })
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<LedgerRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM ledger WHERE event_id = ?1"
        ))?;
        let mut rows = stmt.query(params![event_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(read_record(row)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, record: &mut LedgerRecord) -> Result<Uuid> {
        let row_id = Uuid::new_v4();
        record.row_id = Some(row_id);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO ledger (row_id, event_id, fingerprint, phase, leader_name, company, \
             event_date, processed_at, last_updated_at, email, build_file_id, build_folder_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                row_id.to_string(),
                record.event_id,
                record.fingerprint,
                record.phase.as_str(),
                record.leader_name,
                record.company,
                record.event_date.to_rfc3339(),
                record.processed_at.to_rfc3339(),
                record.last_updated_at.to_rfc3339(),
                record.email,
                record.build_file_id,
                record.build_folder_id,
            ],
        )?;
        Ok(row_id)
    }

    async fn update(&self, row_id: Uuid, record: &LedgerRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE ledger SET event_id = ?2, fingerprint = ?3, phase = ?4, leader_name = ?5, \
             company = ?6, event_date = ?7, processed_at = ?8, last_updated_at = ?9, \
             email = ?10, build_file_id = ?11, build_folder_id = ?12 WHERE row_id = ?1",
            params![
                row_id.to_string(),
                record.event_id,
                record.fingerprint,
                record.phase.as_str(),
                record.leader_name,
                record.company,
                record.event_date.to_rfc3339(),
                record.processed_at.to_rfc3339(),
                record.last_updated_at.to_rfc3339(),
                record.email,
                record.build_file_id,
                record.build_folder_id,
            ],
        )?;
        if changed == 0 {
            return Err(AutomationError::Storage(format!(
                "unknown ledger row {row_id}"
            )));
        }
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<LedgerRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM ledger ORDER BY rowid"
        ))?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(read_record(row)?);
        }
        Ok(records)
    }

    async fn delete(&self, row_ids: &[Uuid]) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut removed = 0;
        for row_id in row_ids {
            removed += tx.execute(
                "DELETE FROM ledger WHERE row_id = ?1",
                params![row_id.to_string()],
            )?;
        }
        tx.commit()?;
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM ledger", [])?;
        Ok(())
    }
}
