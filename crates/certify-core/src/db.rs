use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::sync::Mutex;

use crate::tools::{RecordId, ToolError, Vault};
use crate::types::VaultRecord;

const SCHEMA_SQL: &str = include_str!("../../../schema.sql");

pub struct Db {
    conn: Mutex<Connection>,
}

// ── Timestamp helpers ─────────────────────────────────────────────────────

fn parse_ts(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|ndt| ndt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

fn now_str() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

// ── Row mappers ───────────────────────────────────────────────────────────

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<VaultRecord> {
    let payload: String = row.get(2)?;
    let created_at_str: String = row.get(3)?;
    let analysis = serde_json::from_str(&payload).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(VaultRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        analysis,
        created_at: parse_ts(&created_at_str),
    })
}

impl Db {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open SQLite database at {path:?}"))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .context("failed to set PRAGMAs")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn migrate(&mut self) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to apply schema migrations")?;
        Ok(())
    }

    // ── Analyses ──────────────────────────────────────────────────────────

    pub fn insert_analysis(&self, user_id: &str, analysis: &Value) -> Result<i64> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let payload = serde_json::to_string(analysis).context("serialize analysis")?;
        conn.execute(
            "INSERT INTO analyses (user_id, payload, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, payload, now_str()],
        )
        .context("insert_analysis")?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_analysis(&self, user_id: &str, id: i64) -> Result<Option<VaultRecord>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let result = conn
            .query_row(
                "SELECT id, user_id, payload, created_at FROM analyses \
                 WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                row_to_record,
            )
            .optional()
            .context("get_analysis")?;
        Ok(result)
    }

    /// Newest first.
    pub fn list_analyses(&self, user_id: &str, limit: i64) -> Result<Vec<VaultRecord>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, payload, created_at FROM analyses \
                 WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .context("prepare list_analyses")?;
        let rows = stmt
            .query_map(params![user_id, limit], row_to_record)
            .context("list_analyses")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("collect list_analyses")?;
        Ok(rows)
    }

    pub fn count_analyses(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let n = conn
            .query_row(
                "SELECT COUNT(*) FROM analyses WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .context("count_analyses")?;
        Ok(n)
    }
}

#[async_trait]
impl Vault for Db {
    async fn save_analysis(&self, user_id: &str, analysis: &Value) -> Result<RecordId, ToolError> {
        self.insert_analysis(user_id, analysis)
            .map(|id| RecordId(id.to_string()))
            .map_err(|e| ToolError::Storage(format!("{e:#}")))
    }
}
