//! Intents, proposed plans, and the proposer seam.
//!
//! An intent is what a caller asks for; a plan is the file-level change an
//! (external, possibly unavailable) proposer derives from it. Plans are
//! ephemeral: they live only through one execution's evaluation and are
//! never persisted apart from the ledger record that references them.

use crate::core::config::ProposerMode;
use crate::core::error::MagistrateError;
use crate::core::time;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub action: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    pub origin: String,
    pub timestamp: String,
}

impl Intent {
    pub fn new(action: &str, origin: &str) -> Self {
        Self {
            action: action.to_string(),
            params: Map::new(),
            origin: origin.to_string(),
            timestamp: time::now_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Create,
    Modify,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanFile {
    pub path: String,
    pub action: FileAction,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedPlan {
    pub summary: String,
    #[serde(default)]
    pub files: Vec<PlanFile>,
}

impl ProposedPlan {
    pub fn file_paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }

    /// Reclassifies create/modify from the current workspace state.
    /// Delete actions are left as proposed; the canon safety rule rejects
    /// them downstream.
    pub fn classify_against(&mut self, workspace_root: &Path) {
        for file in &mut self.files {
            if file.action == FileAction::Delete {
                continue;
            }
            file.action = if workspace_root.join(&file.path).exists() {
                FileAction::Modify
            } else {
                FileAction::Create
            };
        }
    }
}

/// Seam to the external plan proposer. May be unavailable; the orchestrator
/// either substitutes the deterministic fallback or propagates, per config.
pub trait PlanProposer {
    fn propose(&self, intent: &str) -> Result<ProposedPlan, MagistrateError>;
}

/// Deterministic minimal plan: a single note file recording the intent.
pub fn fallback_plan(intent: &str) -> ProposedPlan {
    ProposedPlan {
        summary: format!("Apply intent: {}", intent),
        files: vec![PlanFile {
            path: "NOTES.md".to_string(),
            action: FileAction::Create,
            content: format!("# Magistrate Update\n\nIntent:\n{}\n", intent),
        }],
    }
}

/// Always-unavailable proposer. Combined with `ProposerMode::Fallback` this
/// yields the deterministic minimal plan; with `Propagate` the failure
/// surfaces to the caller.
pub struct UnavailableProposer;

impl PlanProposer for UnavailableProposer {
    fn propose(&self, _intent: &str) -> Result<ProposedPlan, MagistrateError> {
        Err(MagistrateError::ProposerFailure(
            "no plan proposer configured".to_string(),
        ))
    }
}

/// Resolves a plan through the proposer, honoring the configured failure
/// mode. Which mode is active is explicit in the config, never implicit.
pub fn resolve_plan(
    proposer: &dyn PlanProposer,
    mode: ProposerMode,
    intent: &str,
) -> Result<ProposedPlan, MagistrateError> {
    match proposer.propose(intent) {
        Ok(plan) => Ok(plan),
        Err(e) => match mode {
            ProposerMode::Fallback => {
                tracing::warn!(error = %e, "proposer unavailable, substituting fallback plan");
                Ok(fallback_plan(intent))
            }
            ProposerMode::Propagate => Err(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_plan_is_deterministic() {
        let a = fallback_plan("ship the docs");
        let b = fallback_plan("ship the docs");
        assert_eq!(a.summary, b.summary);
        assert_eq!(a.files[0].path, b.files[0].path);
        assert_eq!(a.files[0].content, b.files[0].content);
        assert_eq!(a.summary, "Apply intent: ship the docs");
    }

    #[test]
    fn test_resolve_plan_propagates_when_configured() {
        let err = resolve_plan(&UnavailableProposer, ProposerMode::Propagate, "x");
        assert!(matches!(err, Err(MagistrateError::ProposerFailure(_))));

        let plan = resolve_plan(&UnavailableProposer, ProposerMode::Fallback, "x").unwrap();
        assert_eq!(plan.files.len(), 1);
    }
}
