// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Durable document store backed by SQLite.
//!
//! Four collections: `memories` (with an FTS5 full-text index over content
//! and summary), `generated` (one row per model call), `iteration_logs`
//! (the flushed log buffer), and `usage_summaries`.  Dev/test mode runs
//! against an in-memory database; production opens a file path.
//!
//! Provider-opaque `signature` fields on thinking blocks are stripped here,
//! at the persistence boundary — callers never deal with them.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

// ─── Row types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: i64,
    pub content: String,
    pub summary: String,
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
}

/// One row per language-model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedCallRecord {
    pub iteration_id: String,
    pub phase: String,
    pub model: String,
    /// Serialized system blocks
    pub system: Value,
    /// Serialized request messages
    pub messages: Value,
    /// Serialized response content
    pub response: Value,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_5m_tokens: u64,
    pub cache_write_1h_tokens: u64,
    pub cost: f64,
    pub batch: bool,
    pub stop_reason: Option<String>,
}

/// The token/cost slice of a generated row, read back for usage accounting.
#[derive(Debug, Clone)]
pub struct GeneratedUsageRow {
    pub phase: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_5m_tokens: u64,
    pub cache_write_1h_tokens: u64,
    pub cost: f64,
    pub batch: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

// ─── Signature stripping ──────────────────────────────────────────────────────

/// Remove the opaque `signature` field from every thinking block in a
/// serialized message/response tree.  The field is a provider integrity
/// blob with no value at rest.
pub fn strip_thinking_signatures(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type").and_then(Value::as_str) == Some("thinking") {
                map.remove("signature");
            }
            for v in map.values_mut() {
                strip_thinking_signatures(v);
            }
        }
        Value::Array(items) => {
            for v in items {
                strip_thinking_signatures(v);
            }
        }
        _ => {}
    }
}

// ─── Store ────────────────────────────────────────────────────────────────────

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open the store.  `None` opens an in-memory database (dev/test mode).
    pub fn open(path: Option<&Path>) -> Result<Self, StoreError> {
        let conn = match path {
            Some(p) => Connection::open(p)?,
            None => Connection::open_in_memory()?,
        };
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                content    TEXT NOT NULL,
                summary    TEXT NOT NULL,
                pinned     INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_memories_pinned_created
                ON memories(pinned, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_memories_created
                ON memories(created_at DESC);

            CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts
                USING fts5(content, summary, content='memories', content_rowid='id');
            CREATE TRIGGER IF NOT EXISTS memories_fts_insert AFTER INSERT ON memories BEGIN
                INSERT INTO memories_fts(rowid, content, summary)
                VALUES (new.id, new.content, new.summary);
            END;
            CREATE TRIGGER IF NOT EXISTS memories_fts_delete AFTER DELETE ON memories BEGIN
                INSERT INTO memories_fts(memories_fts, rowid, content, summary)
                VALUES ('delete', old.id, old.content, old.summary);
            END;
            CREATE TRIGGER IF NOT EXISTS memories_fts_update AFTER UPDATE ON memories BEGIN
                INSERT INTO memories_fts(memories_fts, rowid, content, summary)
                VALUES ('delete', old.id, old.content, old.summary);
                INSERT INTO memories_fts(rowid, content, summary)
                VALUES (new.id, new.content, new.summary);
            END;

            CREATE TABLE IF NOT EXISTS generated (
                id                    INTEGER PRIMARY KEY AUTOINCREMENT,
                iteration_id          TEXT NOT NULL,
                phase                 TEXT NOT NULL,
                model                 TEXT NOT NULL,
                system                TEXT NOT NULL,
                messages              TEXT NOT NULL,
                response              TEXT NOT NULL,
                input_tokens          INTEGER NOT NULL,
                output_tokens         INTEGER NOT NULL,
                cache_read_tokens     INTEGER NOT NULL,
                cache_write_5m_tokens INTEGER NOT NULL,
                cache_write_1h_tokens INTEGER NOT NULL,
                cost                  REAL NOT NULL,
                batch                 INTEGER NOT NULL,
                stop_reason           TEXT,
                created_at            TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_generated_created
                ON generated(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_generated_iteration
                ON generated(iteration_id);

            CREATE TABLE IF NOT EXISTS iteration_logs (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                iteration_id TEXT NOT NULL,
                entries      TEXT NOT NULL,
                created_at   TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_iteration_logs_created
                ON iteration_logs(created_at DESC);

            CREATE TABLE IF NOT EXISTS usage_summaries (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                iteration_id TEXT NOT NULL,
                summary      TEXT NOT NULL,
                created_at   TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Flush SQLite's internal state.  The connection itself closes when the
    /// store is dropped.
    pub fn close(&self) {
        if let Ok(conn) = self.conn.lock() {
            let _ = conn.execute_batch("PRAGMA optimize;");
        }
        debug!("store closed");
    }

    // ── Memories ─────────────────────────────────────────────────────────────

    pub fn insert_memory(
        &self,
        content: &str,
        summary: &str,
        pinned: bool,
    ) -> Result<MemoryRecord, StoreError> {
        let created_at = Utc::now();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO memories (content, summary, pinned, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![content, summary, pinned as i64, created_at.to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();
        Ok(MemoryRecord {
            id,
            content: content.to_string(),
            summary: summary.to_string(),
            pinned,
            created_at,
        })
    }

    /// Unpin a note.  Returns `false` when no pinned row with that id exists.
    pub fn unpin_memory(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE memories SET pinned = 0 WHERE id = ?1 AND pinned = 1",
            params![id],
        )?;
        Ok(changed > 0)
    }

    pub fn pinned_memories(&self) -> Result<Vec<MemoryRecord>, StoreError> {
        self.query_memories(
            "SELECT id, content, summary, pinned, created_at FROM memories \
             WHERE pinned = 1 ORDER BY created_at DESC, id DESC",
        )
    }

    pub fn unpinned_memories_newest_first(&self) -> Result<Vec<MemoryRecord>, StoreError> {
        self.query_memories(
            "SELECT id, content, summary, pinned, created_at FROM memories \
             WHERE pinned = 0 ORDER BY created_at DESC, id DESC",
        )
    }

    pub fn memories_newest_first(&self) -> Result<Vec<MemoryRecord>, StoreError> {
        self.query_memories(
            "SELECT id, content, summary, pinned, created_at FROM memories \
             ORDER BY created_at DESC, id DESC",
        )
    }

    pub fn memory_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    pub fn memory_by_id(&self, id: i64) -> Result<Option<MemoryRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, content, summary, pinned, created_at FROM memories WHERE id = ?1",
                params![id],
                map_memory_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Full-text search ranked by relevance.  A query the FTS engine cannot
    /// parse yields no hits rather than an error, so callers can fall
    /// through to their regex path.
    pub fn search_memories(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = match conn.prepare(
            "SELECT m.id, m.content, m.summary, m.pinned, m.created_at \
             FROM memories_fts f JOIN memories m ON m.id = f.rowid \
             WHERE memories_fts MATCH ?1 ORDER BY rank LIMIT ?2",
        ) {
            Ok(s) => s,
            Err(e) => {
                warn!("fts prepare failed: {e}");
                return Ok(Vec::new());
            }
        };
        // Malformed MATCH syntax (unbalanced quotes, stray operators) is not
        // a store failure — the caller has a regex fallback.  The error can
        // surface either at query time or on the first row step.
        let result = match stmt.query_map(params![query, limit as i64], map_memory_row) {
            Ok(rows) => match rows.collect::<Result<Vec<_>, _>>() {
                Ok(hits) => Ok(hits),
                Err(e) => {
                    debug!("fts query rejected ({e}); returning no hits");
                    Ok(Vec::new())
                }
            },
            Err(e) => {
                debug!("fts query rejected ({e}); returning no hits");
                Ok(Vec::new())
            }
        };
        result
    }

    fn query_memories(&self, sql: &str) -> Result<Vec<MemoryRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], map_memory_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ── Generated call records ───────────────────────────────────────────────

    pub fn record_generated(&self, mut rec: GeneratedCallRecord) -> Result<(), StoreError> {
        strip_thinking_signatures(&mut rec.messages);
        strip_thinking_signatures(&mut rec.response);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO generated (iteration_id, phase, model, system, messages, response, \
             input_tokens, output_tokens, cache_read_tokens, cache_write_5m_tokens, \
             cache_write_1h_tokens, cost, batch, stop_reason, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                rec.iteration_id,
                rec.phase,
                rec.model,
                rec.system.to_string(),
                rec.messages.to_string(),
                rec.response.to_string(),
                rec.input_tokens as i64,
                rec.output_tokens as i64,
                rec.cache_read_tokens as i64,
                rec.cache_write_5m_tokens as i64,
                rec.cache_write_1h_tokens as i64,
                rec.cost,
                rec.batch as i64,
                rec.stop_reason,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn generated_for_iteration(
        &self,
        iteration_id: &str,
    ) -> Result<Vec<GeneratedUsageRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT phase, model, input_tokens, output_tokens, cache_read_tokens, \
             cache_write_5m_tokens, cache_write_1h_tokens, cost, batch \
             FROM generated WHERE iteration_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![iteration_id], |r| {
            Ok(GeneratedUsageRow {
                phase: r.get(0)?,
                model: r.get(1)?,
                input_tokens: r.get::<_, i64>(2)? as u64,
                output_tokens: r.get::<_, i64>(3)? as u64,
                cache_read_tokens: r.get::<_, i64>(4)? as u64,
                cache_write_5m_tokens: r.get::<_, i64>(5)? as u64,
                cache_write_1h_tokens: r.get::<_, i64>(6)? as u64,
                cost: r.get(7)?,
                batch: r.get::<_, i64>(8)? != 0,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Raw serialized response of a generated row, for inspection in tests.
    pub fn generated_response_json(&self, row_id: i64) -> Result<Option<Value>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let text: Option<String> = conn
            .query_row(
                "SELECT response FROM generated WHERE id = ?1",
                params![row_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(match text {
            Some(t) => Some(serde_json::from_str(&t)?),
            None => None,
        })
    }

    // ── Iteration logs & usage ───────────────────────────────────────────────

    pub fn insert_iteration_log(
        &self,
        iteration_id: &str,
        entries: &[LogEntry],
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO iteration_logs (iteration_id, entries, created_at) VALUES (?1, ?2, ?3)",
            params![
                iteration_id,
                serde_json::to_string(entries)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_usage_summary(
        &self,
        iteration_id: &str,
        summary: &Value,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO usage_summaries (iteration_id, summary, created_at) VALUES (?1, ?2, ?3)",
            params![iteration_id, summary.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn iteration_log_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM iteration_logs", [], |r| r.get(0))?;
        Ok(n as u64)
    }
}

fn map_memory_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let created: String = r.get(4)?;
    Ok(MemoryRecord {
        id: r.get(0)?,
        content: r.get(1)?,
        summary: r.get(2)?,
        pinned: r.get::<_, i64>(3)? != 0,
        created_at: DateTime::parse_from_rfc3339(&created)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
