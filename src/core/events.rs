//! Per-execution event log.
//!
//! The event log is the workflow trace: one JSONL line per lifecycle event,
//! scoped to an execution id. Unlike the decision ledger it is not
//! hash-chained; it exists for operational replay, not integrity proof.
//! The two logs deliberately stay separate surfaces.

use crate::core::error::MagistrateError;
use crate::core::store::Store;
use crate::core::time;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "EXECUTION_STARTED")]
    ExecutionStarted,
    #[serde(rename = "PLAN_GENERATED")]
    PlanGenerated,
    #[serde(rename = "CANON_DENIAL")]
    CanonDenial,
    #[serde(rename = "FILES_APPLIED")]
    FilesApplied,
    #[serde(rename = "DEPLOY_TRIGGERED")]
    DeployTriggered,
    #[serde(rename = "DEPLOY_COMPLETE")]
    DeployComplete,
    #[serde(rename = "ROLLBACK_EXECUTED")]
    RollbackExecuted,
    #[serde(rename = "SELF_HEAL_RECORDED")]
    SelfHealRecorded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEvent {
    pub id: String,
    pub execution_id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub timestamp: String,
}

pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn open(store: &Store) -> Self {
        Self {
            path: store.events_path(),
        }
    }

    pub fn append(
        &self,
        execution_id: &str,
        kind: EventKind,
        summary: &str,
        details: Option<Value>,
    ) -> Result<ExecutionEvent, MagistrateError> {
        let event = ExecutionEvent {
            id: time::new_id(),
            execution_id: execution_id.to_string(),
            kind,
            summary: summary.to_string(),
            details,
            timestamp: time::now_rfc3339(),
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(&event)?)?;
        Ok(event)
    }

    /// All events in timestamp order. Malformed lines are skipped, not fatal.
    pub fn read_all(&self) -> Result<Vec<ExecutionEvent>, MagistrateError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        let mut events: Vec<ExecutionEvent> = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ExecutionEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unparsable event line");
                }
            }
        }
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(events)
    }

    /// Replay trace for one execution, in timestamp order.
    pub fn read_by_execution(
        &self,
        execution_id: &str,
    ) -> Result<Vec<ExecutionEvent>, MagistrateError> {
        let mut events = self.read_all()?;
        events.retain(|e| e.execution_id == execution_id);
        Ok(events)
    }
}
