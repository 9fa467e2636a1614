use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::CallStore;
use crate::error::{InsightError, Result};
use crate::models::{AgentRecord, CallRecord, InsightUpdate, ProcessingStatus};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS agents (
    id INTEGER PRIMARY KEY,
    name TEXT NULL
);

CREATE TABLE IF NOT EXISTS calls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    call_id INTEGER NOT NULL UNIQUE,
    agent_id INTEGER NULL REFERENCES agents(id),
    customer_id INTEGER NULL,
    language TEXT NULL,
    start_time TEXT NULL,
    duration_seconds INTEGER NULL,
    transcript TEXT NULL,
    agent_talk_ratio REAL NULL,
    sentiment_score REAL NULL,
    sentiment_scores TEXT NULL,
    embedding TEXT NULL,
    processed_at TEXT NULL,
    processing_status TEXT NOT NULL DEFAULT 'pending'
);
CREATE INDEX IF NOT EXISTS idx_calls_customer_id ON calls(customer_id);
CREATE INDEX IF NOT EXISTS idx_calls_start_time ON calls(start_time);
CREATE INDEX IF NOT EXISTS idx_calls_status ON calls(processing_status);
"#;

const COLUMNS: &str = "id, call_id, agent_id, customer_id, language, start_time, \
    duration_seconds, transcript, agent_talk_ratio, sentiment_score, sentiment_scores, \
    embedding, processed_at, processing_status";

/// Status with any failure reason folded away
const STATUS_KIND: &str =
    "CASE WHEN processing_status LIKE 'failed%' THEN 'failed' ELSE processing_status END";

/// SQLite-backed call record store
///
/// One connection guarded by a mutex; each operation takes the lock,
/// runs one transaction and releases it.
pub struct SqliteCallStore {
    connection: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteCallStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCallStore").finish_non_exhaustive()
    }
}

impl SqliteCallStore {
    /// Open or create a database file and ensure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let connection = Connection::open(path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        Self::from_connection(connection)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self> {
        connection.pragma_update(None, "foreign_keys", "ON")?;
        connection.execute_batch(SCHEMA)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-operation has already rolled back its transaction.
        self.connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Acquire, run `op`, then commit, or roll back and propagate
    fn with_transaction<T, F>(&self, operation: &str, op: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut connection = self.lock();
        let tx = connection.transaction()?;

        match op(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                warn!(operation, "Rolling back transaction: {}", e);
                if let Err(rollback_error) = tx.rollback() {
                    warn!(operation, "Rollback failed: {}", rollback_error);
                }
                Err(e)
            }
        }
    }

    /// Look up an agent row
    pub fn agent(&self, id: i64) -> Result<Option<AgentRecord>> {
        self.with_transaction("agent", |tx| {
            let agent = tx
                .query_row(
                    "SELECT id, name FROM agents WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(AgentRecord {
                            id: row.get(0)?,
                            name: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(agent)
        })
    }

    /// Insert or rename an agent
    pub fn upsert_agent(&self, agent: &AgentRecord) -> Result<AgentRecord> {
        self.with_transaction("upsert_agent", |tx| {
            tx.execute(
                "INSERT INTO agents (id, name) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                params![agent.id, agent.name],
            )?;
            Ok(agent.clone())
        })
    }
}

impl CallStore for SqliteCallStore {
    fn get(&self, call_id: i64) -> Result<Option<CallRecord>> {
        self.with_transaction("get", |tx| select_call(tx, call_id))
    }

    fn upsert(&self, record: &CallRecord) -> Result<CallRecord> {
        self.with_transaction("upsert", |tx| {
            if let Some(agent_id) = record.agent_id {
                tx.execute(
                    "INSERT OR IGNORE INTO agents (id, name) VALUES (?1, NULL)",
                    params![agent_id],
                )?;
            }

            let sentiment_scores = to_json(record.sentiment_scores.as_ref())?;
            let embedding = to_json(record.embedding.as_ref())?;

            tx.execute(
                r#"
                INSERT INTO calls (
                    call_id, agent_id, customer_id, language, start_time, duration_seconds,
                    transcript, agent_talk_ratio, sentiment_score, sentiment_scores,
                    embedding, processed_at, processing_status
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                ON CONFLICT(call_id) DO UPDATE SET
                    agent_id = excluded.agent_id,
                    customer_id = excluded.customer_id,
                    language = excluded.language,
                    start_time = excluded.start_time,
                    duration_seconds = excluded.duration_seconds,
                    transcript = excluded.transcript,
                    agent_talk_ratio = excluded.agent_talk_ratio,
                    sentiment_score = excluded.sentiment_score,
                    sentiment_scores = excluded.sentiment_scores,
                    embedding = excluded.embedding,
                    processed_at = excluded.processed_at,
                    processing_status = excluded.processing_status
                "#,
                params![
                    record.call_id,
                    record.agent_id,
                    record.customer_id,
                    record.language,
                    record.start_time.map(format_timestamp),
                    record.duration_seconds,
                    record.transcript,
                    record.agent_talk_ratio,
                    record.sentiment_score,
                    sentiment_scores,
                    embedding,
                    record.processed_at.map(format_timestamp),
                    record.processing_status.to_string(),
                ],
            )?;

            debug!(call_id = record.call_id, "Upserted call");
            select_call(tx, record.call_id)?.ok_or(InsightError::NotFound {
                call_id: record.call_id,
            })
        })
    }

    fn update_insights(
        &self,
        call_id: i64,
        update: &InsightUpdate,
        status: &ProcessingStatus,
    ) -> Result<CallRecord> {
        self.with_transaction("update_insights", |tx| {
            let sentiment_scores = to_json(update.sentiment_scores.as_ref())?;
            let embedding = to_json(update.embedding.as_ref())?;

            let changed = tx.execute(
                r#"
                UPDATE calls SET
                    agent_talk_ratio = COALESCE(?2, agent_talk_ratio),
                    sentiment_score = COALESCE(?3, sentiment_score),
                    sentiment_scores = COALESCE(?4, sentiment_scores),
                    embedding = COALESCE(?5, embedding),
                    processing_status = ?6,
                    processed_at = ?7
                WHERE call_id = ?1
                "#,
                params![
                    call_id,
                    update.agent_talk_ratio,
                    update.sentiment_score,
                    sentiment_scores,
                    embedding,
                    status.to_string(),
                    format_timestamp(Utc::now()),
                ],
            )?;

            if changed == 0 {
                return Err(InsightError::NotFound { call_id });
            }

            debug!(call_id, status = %status, "Updated insights");
            select_call(tx, call_id)?.ok_or(InsightError::NotFound { call_id })
        })
    }

    fn list(&self, status_kind: Option<&str>) -> Result<Vec<CallRecord>> {
        self.with_transaction("list", |tx| {
            let sql = format!(
                "SELECT {} FROM calls WHERE (?1 IS NULL OR {} = ?1) ORDER BY call_id",
                COLUMNS, STATUS_KIND
            );
            let mut stmt = tx.prepare(&sql)?;
            let records = stmt
                .query_map(params![status_kind], row_to_call)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
    }

    fn status_counts(&self) -> Result<Vec<(String, usize)>> {
        self.with_transaction("status_counts", |tx| {
            let sql = format!(
                "SELECT {kind} AS kind, COUNT(*) FROM calls GROUP BY kind ORDER BY kind",
                kind = STATUS_KIND
            );
            let mut stmt = tx.prepare(&sql)?;
            let counts = stmt
                .query_map([], |row| {
                    let kind: String = row.get(0)?;
                    let count: i64 = row.get(1)?;
                    Ok((kind, count as usize))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(counts)
        })
    }
}

fn select_call(conn: &Connection, call_id: i64) -> Result<Option<CallRecord>> {
    let sql = format!("SELECT {} FROM calls WHERE call_id = ?1", COLUMNS);
    let record = conn
        .query_row(&sql, params![call_id], row_to_call)
        .optional()?;
    Ok(record)
}

fn row_to_call(row: &Row<'_>) -> rusqlite::Result<CallRecord> {
    let status: String = row.get(13)?;
    let processing_status = status
        .parse::<ProcessingStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(13, Type::Text, e.into()))?;

    Ok(CallRecord {
        id: row.get(0)?,
        call_id: row.get(1)?,
        agent_id: row.get(2)?,
        customer_id: row.get(3)?,
        language: row.get(4)?,
        start_time: timestamp_column(row, 5)?,
        duration_seconds: row.get(6)?,
        transcript: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        agent_talk_ratio: row.get(8)?,
        sentiment_score: row.get(9)?,
        sentiment_scores: json_column(row, 10)?,
        embedding: json_column(row, 11)?,
        processed_at: timestamp_column(row, 12)?,
        processing_status,
    })
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<T>> {
    match row.get::<_, Option<String>>(index)? {
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

fn timestamp_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(index)? {
        Some(text) => DateTime::parse_from_rfc3339(&text)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

fn to_json<T: serde::Serialize>(value: Option<&T>) -> Result<Option<String>> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(InsightError::from)
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}
