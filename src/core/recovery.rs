//! Failure recovery: last-known-good lookup, rollback, failure
//! classification, and advisory self-heal records.

use crate::core::config::KernelConfig;
use crate::core::error::MagistrateError;
use crate::core::events::{EventKind, EventLog};
use crate::core::git::GitClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    #[serde(rename = "BUILD_ERROR")]
    BuildError,
    #[serde(rename = "CANON_CONFLICT")]
    CanonConflict,
    #[serde(rename = "DEPLOY_CONFIG")]
    DeployConfig,
    #[serde(rename = "DEPLOY_RUNTIME")]
    DeployRuntime,
    #[serde(rename = "GIT_ERROR")]
    GitError,
    #[serde(rename = "AUTHZ_DENY")]
    AuthzDeny,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

/// Classifies a failure from its error text. Keyword order matters: authz
/// and canon markers are checked before the broader build/deploy buckets.
pub fn analyze_failure(message: &str) -> FailureReason {
    let m = message.to_lowercase();

    if m.contains("forbidden") || m.contains("unauthorized") || m.contains("403") {
        return FailureReason::AuthzDeny;
    }
    if m.contains("canon") || m.contains("non-interference") || m.contains("arbitrat") {
        return FailureReason::CanonConflict;
    }
    if m.contains("build") || m.contains("typecheck") || m.contains("compile") {
        return FailureReason::BuildError;
    }
    if m.contains("hook") || m.contains("site id") || m.contains("platform token") {
        return FailureReason::DeployConfig;
    }
    if m.contains("deploy") || m.contains("runtime") || m.contains("crash") {
        return FailureReason::DeployRuntime;
    }
    if m.contains("git") {
        return FailureReason::GitError;
    }
    FailureReason::Unknown
}

fn detail_str(details: &Option<Value>, key: &str) -> Option<String> {
    details
        .as_ref()
        .and_then(|d| d.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Last known good restore target, preferring the most recent successful
/// deploy's commit from the event log, then the most recent rollback's
/// target, then one commit behind HEAD as a deterministic last resort.
pub fn last_known_good(events: &EventLog, git: &GitClient) -> Result<String, MagistrateError> {
    let all = events.read_all()?;

    for event in all.iter().rev() {
        if event.kind == EventKind::DeployComplete {
            let status = detail_str(&event.details, "status");
            if status.as_deref() == Some("ready") {
                if let Some(sha) = detail_str(&event.details, "commitSha") {
                    return Ok(sha);
                }
            }
        }
    }

    for event in all.iter().rev() {
        if event.kind == EventKind::RollbackExecuted {
            if let Some(sha) = detail_str(&event.details, "revertedTo") {
                return Ok(sha);
            }
        }
    }

    git.rev_parse("HEAD~1")
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackResult {
    pub reverted_to: String,
    pub pushed: bool,
}

/// Hard-resets the workspace to the last known good commit and force-pushes
/// with lease. Refuses loudly unless rollback (and git) are explicitly
/// enabled.
pub fn rollback_to_safe_state(
    config: &KernelConfig,
    events: &EventLog,
    git: &GitClient,
    execution_id: &str,
    reason: &str,
) -> Result<RollbackResult, MagistrateError> {
    config.require_rollback_enabled()?;

    let commit = last_known_good(events, git)?;
    git.reset_hard(&commit)?;
    git.force_push_with_lease()?;

    events.append(
        execution_id,
        EventKind::RollbackExecuted,
        "Rollback executed",
        Some(json!({ "revertedTo": commit, "reason": reason })),
    )?;

    Ok(RollbackResult {
        reverted_to: commit,
        pushed: true,
    })
}

/// Records an advisory self-heal event. Fire-and-forget: recording failure
/// never propagates into the caller's control flow.
pub fn record_self_heal(events: &EventLog, execution_id: &str, reason: FailureReason, message: &str) {
    let result = events.append(
        execution_id,
        EventKind::SelfHealRecorded,
        "Self-heal recorded",
        Some(json!({
            "reason": reason,
            "message": message,
            "action": "ADJUST_PLAN",
        })),
    );
    if let Err(e) = result {
        tracing::warn!(error = %e, execution_id, "self-heal record failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_failure_buckets() {
        assert_eq!(analyze_failure("HTTP 403 Forbidden"), FailureReason::AuthzDeny);
        assert_eq!(
            analyze_failure("canon conflict on rule CANON-SAFETY-001"),
            FailureReason::CanonConflict
        );
        assert_eq!(analyze_failure("build failed: typecheck"), FailureReason::BuildError);
        assert_eq!(
            analyze_failure("deploy crashed at runtime"),
            FailureReason::DeployRuntime
        );
        assert_eq!(analyze_failure("git push rejected"), FailureReason::GitError);
        assert_eq!(analyze_failure("something odd"), FailureReason::Unknown);
    }
}
