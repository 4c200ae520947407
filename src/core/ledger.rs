//! Hash-chained decision ledger.
//!
//! The ledger is the append-only record of authorization decisions. Every
//! entry stores the canonical JSON of the original payload plus a chain link:
//! `hash = sha256(prev_hash + "\n" + content)`, with the genesis entry
//! chaining from the empty string. Entries are write-once and
//! order-preserving; integrity violations are surfaced, never repaired.
//!
//! Two backends share identical chain semantics: a SQLite store (WAL, one
//! IMMEDIATE transaction per append) and a flat JSONL file. The
//! read-head-then-write sequence is the critical shared-mutation point, so
//! both backends serialize appends: SQLite through the write transaction,
//! the file backend through an instance lock. Two concurrent appends can
//! never observe the same head and fork the chain.

use crate::core::db;
use crate::core::error::MagistrateError;
use crate::core::hash::{canonical_json, chain_hash};
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// A stored, chained ledger entry. The indexed columns (`intent`,
/// `decision`, ...) are projections of the canonical `content` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_initiated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub content: String,
    pub prev_hash: Option<String>,
    pub hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct LedgerFilter {
    pub entry_type: Option<String>,
    pub execution_id: Option<String>,
    pub session_id: Option<String>,
}

/// Exact failing entry from a chain walk. `prev_ok` covers the link to the
/// predecessor, `hash_ok` the entry's own content hash.
#[derive(Debug, Clone, Serialize)]
pub struct ChainFault {
    pub index: usize,
    pub id: String,
    pub prev_hash: Option<String>,
    pub expected_prev_hash: Option<String>,
    pub hash: String,
    pub expected_hash: String,
    pub prev_ok: bool,
    pub hash_ok: bool,
}

/// Result of walking the chain. Either fully valid up to `count` entries, or
/// invalid at exactly `fault`; there is no partial-success mode.
#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    pub ok: bool,
    pub count: usize,
    pub head: Option<String>,
    pub tail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<ChainFault>,
}

enum Backend {
    Sqlite(PathBuf),
    File(PathBuf),
}

pub struct DecisionLedger {
    backend: Backend,
    // Serializes the head-read/append pair for the file backend, and
    // in-process appends generally.
    write_lock: Mutex<()>,
}

fn payload_str(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

impl DecisionLedger {
    pub fn open_sqlite(store: &Store) -> Result<Self, MagistrateError> {
        let path = store.ledger_db_path();
        let conn = db::db_connect(&path)?;
        conn.execute_batch(schemas::LEDGER_DB_SCHEMA)?;
        conn.execute_batch(schemas::CANON_DB_SCHEMA)?;
        Ok(Self {
            backend: Backend::Sqlite(path),
            write_lock: Mutex::new(()),
        })
    }

    pub fn open_file(store: &Store) -> Result<Self, MagistrateError> {
        Ok(Self {
            backend: Backend::File(store.ledger_file_path()),
            write_lock: Mutex::new(()),
        })
    }

    /// Appends `payload` as a new chained entry and returns the stored
    /// entry including its hash. `payload` must carry a string `type`.
    pub fn append(&self, payload: &Value) -> Result<LedgerEntry, MagistrateError> {
        let entry_type = payload_str(payload, "type").ok_or_else(|| {
            MagistrateError::ValidationError("ledger payload requires a string 'type'".to_string())
        })?;

        let content = canonical_json(payload);
        let entry = LedgerEntry {
            id: time::new_id(),
            entry_type,
            intent: payload_str(payload, "intent"),
            decision: payload_str(payload, "decision"),
            rationale: payload_str(payload, "rationale"),
            actor: payload_str(payload, "actor"),
            system_initiated: payload.get("systemInitiated").and_then(Value::as_bool),
            execution_id: payload_str(payload, "executionId"),
            session_id: payload_str(payload, "sessionId"),
            content,
            prev_hash: None,
            hash: String::new(),
            created_at: time::now_rfc3339(),
        };

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| MagistrateError::ValidationError("ledger lock poisoned".to_string()))?;

        match &self.backend {
            Backend::Sqlite(path) => self.append_sqlite(path, entry),
            Backend::File(path) => self.append_file(path, entry),
        }
    }

    fn append_sqlite(
        &self,
        path: &PathBuf,
        mut entry: LedgerEntry,
    ) -> Result<LedgerEntry, MagistrateError> {
        let mut conn = db::db_connect(path)?;
        // IMMEDIATE takes the write lock up front, so head-read and insert
        // are one atomic unit even across processes.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let head: Option<String> = tx
            .query_row(
                "SELECT hash FROM ledger_entries ORDER BY seq DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        entry.prev_hash = head;
        entry.hash = chain_hash(entry.prev_hash.as_deref(), &entry.content);

        tx.execute(
            "INSERT INTO ledger_entries
             (id, entry_type, intent, decision, rationale, actor, system_initiated,
              execution_id, session_id, content, prev_hash, hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                entry.id,
                entry.entry_type,
                entry.intent,
                entry.decision,
                entry.rationale,
                entry.actor,
                entry.system_initiated,
                entry.execution_id,
                entry.session_id,
                entry.content,
                entry.prev_hash,
                entry.hash,
                entry.created_at,
            ],
        )?;
        tx.commit()?;
        Ok(entry)
    }

    fn append_file(
        &self,
        path: &PathBuf,
        mut entry: LedgerEntry,
    ) -> Result<LedgerEntry, MagistrateError> {
        let head = read_file_entries(path)?.last().map(|e| e.hash.clone());
        entry.prev_hash = head;
        entry.hash = chain_hash(entry.prev_hash.as_deref(), &entry.content);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(&entry)?;
        writeln!(file, "{}", line)?;
        Ok(entry)
    }

    /// Current chain head hash, `None` on an empty ledger.
    pub fn head(&self) -> Result<Option<String>, MagistrateError> {
        match &self.backend {
            Backend::Sqlite(path) => {
                let conn = db::db_connect(path)?;
                let head = conn
                    .query_row(
                        "SELECT hash FROM ledger_entries ORDER BY seq DESC LIMIT 1",
                        [],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(head)
            }
            Backend::File(path) => Ok(read_file_entries(path)?.last().map(|e| e.hash.clone())),
        }
    }

    /// Reads entries in creation order, optionally filtered, keeping the
    /// most recent `limit` after the filter. The file backend skips
    /// unparsable lines rather than failing the whole read.
    pub fn read(
        &self,
        filter: &LedgerFilter,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, MagistrateError> {
        let mut entries = self.read_all()?;
        entries.retain(|e| {
            filter
                .entry_type
                .as_ref()
                .map_or(true, |t| &e.entry_type == t)
                && filter
                    .execution_id
                    .as_ref()
                    .map_or(true, |x| e.execution_id.as_ref() == Some(x))
                && filter
                    .session_id
                    .as_ref()
                    .map_or(true, |s| e.session_id.as_ref() == Some(s))
        });
        if entries.len() > limit {
            entries.drain(..entries.len() - limit);
        }
        Ok(entries)
    }

    fn read_all(&self) -> Result<Vec<LedgerEntry>, MagistrateError> {
        match &self.backend {
            Backend::Sqlite(path) => {
                let conn = db::db_connect(path)?;
                let mut stmt = conn.prepare(
                    "SELECT id, entry_type, intent, decision, rationale, actor,
                            system_initiated, execution_id, session_id, content,
                            prev_hash, hash, created_at
                     FROM ledger_entries ORDER BY seq ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(LedgerEntry {
                        id: row.get(0)?,
                        entry_type: row.get(1)?,
                        intent: row.get(2)?,
                        decision: row.get(3)?,
                        rationale: row.get(4)?,
                        actor: row.get(5)?,
                        system_initiated: row.get(6)?,
                        execution_id: row.get(7)?,
                        session_id: row.get(8)?,
                        content: row.get(9)?,
                        prev_hash: row.get(10)?,
                        hash: row.get(11)?,
                        created_at: row.get(12)?,
                    })
                })?;
                let mut entries = Vec::new();
                for row in rows {
                    entries.push(row?);
                }
                Ok(entries)
            }
            Backend::File(path) => read_file_entries(path),
        }
    }

    /// Walks the first `limit` entries in creation order, recomputing both
    /// the predecessor link and the content hash. Returns the exact failing
    /// entry on first mismatch, or head/tail hashes on success.
    pub fn verify_chain(&self, limit: usize) -> Result<ChainReport, MagistrateError> {
        let entries = {
            let mut all = self.read_all()?;
            all.truncate(limit);
            all
        };
        Ok(verify_entries(&entries))
    }
}

/// Chain verification over already-loaded entries. Shared with the offline
/// export verifier, which replays the same formula from exported JSONL.
pub fn verify_entries(entries: &[LedgerEntry]) -> ChainReport {
    let mut prev: Option<String> = None;
    for (index, entry) in entries.iter().enumerate() {
        let expected_hash = chain_hash(prev.as_deref(), &entry.content);
        let prev_ok = entry.prev_hash == prev;
        let hash_ok = entry.hash == expected_hash;
        if !prev_ok || !hash_ok {
            return ChainReport {
                ok: false,
                count: entries.len(),
                head: entries.first().map(|e| e.hash.clone()),
                tail: entries.last().map(|e| e.hash.clone()),
                fault: Some(ChainFault {
                    index,
                    id: entry.id.clone(),
                    prev_hash: entry.prev_hash.clone(),
                    expected_prev_hash: prev,
                    hash: entry.hash.clone(),
                    expected_hash,
                    prev_ok,
                    hash_ok,
                }),
            };
        }
        prev = Some(entry.hash.clone());
    }

    ChainReport {
        ok: true,
        count: entries.len(),
        head: entries.first().map(|e| e.hash.clone()),
        tail: entries.last().map(|e| e.hash.clone()),
        fault: None,
    }
}

fn read_file_entries(path: &PathBuf) -> Result<Vec<LedgerEntry>, MagistrateError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LedgerEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unparsable ledger line");
            }
        }
    }
    Ok(entries)
}
