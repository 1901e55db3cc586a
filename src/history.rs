//! Historical sample log.
//!
//! Samplers append one `SampleRecord` per completed sample. Appends are
//! fire-and-forget: a failing log never affects detection or alerting.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};

use crate::detect::SafetyStatus;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SampleRecord {
    pub id: String,
    pub count: u32,
    pub status: SafetyStatus,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

pub trait SampleLog: Send + Sync {
    fn append(&self, record: &SampleRecord) -> Result<()>;
}

/// SQLite-backed sample log.
pub struct SqliteSampleLog {
    conn: Mutex<Connection>,
}

impl SqliteSampleLog {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("open sample log {}", db_path))?;
        let log = Self {
            conn: Mutex::new(conn),
        };
        log.ensure_schema()?;
        Ok(log)
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS samples (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              session_id TEXT NOT NULL,
              count INTEGER NOT NULL,
              status TEXT NOT NULL,
              timestamp_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_samples_session_time ON samples(session_id, timestamp_ms);
            "#,
        )?;
        Ok(())
    }

    /// Most recent records for a session, newest first.
    pub fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<SampleRecord>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare(
            "SELECT session_id, count, status, timestamp_ms FROM samples
             WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![session_id, limit as i64], |row| {
            let status: String = row.get(2)?;
            Ok(SampleRecord {
                id: row.get(0)?,
                count: row.get(1)?,
                status: parse_status(&status),
                timestamp_ms: row.get::<_, i64>(3)? as u64,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

impl SampleLog for SqliteSampleLog {
    fn append(&self, record: &SampleRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO samples(session_id, count, status, timestamp_ms) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id,
                record.count,
                record.status.as_str(),
                record.timestamp_ms as i64
            ],
        )?;
        Ok(())
    }
}

fn parse_status(value: &str) -> SafetyStatus {
    match value {
        "critical" => SafetyStatus::Critical,
        "caution" => SafetyStatus::Caution,
        _ => SafetyStatus::Safe,
    }
}

/// In-memory sample log for tests and short-lived tools.
#[derive(Default)]
pub struct InMemorySampleLog {
    records: Mutex<Vec<SampleRecord>>,
}

impl InMemorySampleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SampleRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SampleLog for InMemorySampleLog {
    fn append(&self, record: &SampleRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}
