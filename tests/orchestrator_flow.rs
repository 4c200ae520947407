use magistrate::core::config::{KernelConfig, PersistMode, ProposerMode};
use magistrate::core::deploy::{DeployPlatform, DeployState, DeployStatus};
use magistrate::core::error::MagistrateError;
use magistrate::core::events::{EventKind, EventLog};
use magistrate::core::ledger::DecisionLedger;
use magistrate::core::orchestrator::{ExecuteOptions, ExecutionStatus, Orchestrator};
use magistrate::core::plan::{FileAction, PlanFile, PlanProposer, ProposedPlan, UnavailableProposer};
use magistrate::core::store::Store;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{tempdir, TempDir};

struct FixedProposer {
    plan: ProposedPlan,
}

impl PlanProposer for FixedProposer {
    fn propose(&self, _intent: &str) -> Result<ProposedPlan, MagistrateError> {
        Ok(self.plan.clone())
    }
}

struct ScriptedDeploy {
    status: DeployStatus,
}

impl DeployPlatform for ScriptedDeploy {
    fn trigger_build(&self) -> Result<(), MagistrateError> {
        Ok(())
    }

    fn poll_status(&self) -> Result<DeployStatus, MagistrateError> {
        Ok(self.status.clone())
    }
}

fn run_git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git spawns");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// A working checkout with one commit, pushed to a bare remote so that
/// plain `git push` and `git push --force-with-lease` both work.
fn git_workspace() -> (TempDir, PathBuf) {
    let tmp = tempdir().unwrap();
    let remote = tmp.path().join("remote.git");
    let work = tmp.path().join("work");
    fs::create_dir_all(&remote).unwrap();
    fs::create_dir_all(&work).unwrap();

    run_git(&remote, &["init", "--bare"]);
    run_git(&work, &["init"]);
    run_git(&work, &["config", "user.email", "kernel@example.invalid"]);
    run_git(&work, &["config", "user.name", "magistrate tests"]);
    fs::write(work.join("README.md"), "seed\n").unwrap();
    run_git(&work, &["add", "."]);
    run_git(&work, &["commit", "-m", "init"]);
    run_git(&work, &["remote", "add", "origin", remote.to_str().unwrap()]);
    run_git(&work, &["push", "-u", "origin", "HEAD"]);

    (tmp, work)
}

fn head_sha(work: &Path) -> String {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(work)
        .output()
        .unwrap();
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn kinds(events: &EventLog, execution_id: &str) -> Vec<EventKind> {
    events
        .read_by_execution(execution_id)
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect()
}

#[test]
fn ledger_mutation_intent_is_denied_and_recorded_without_side_effects() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let ledger = DecisionLedger::open_sqlite(&store).unwrap();

    let config = KernelConfig {
        proposer_mode: ProposerMode::Fallback,
        ..KernelConfig::default()
    };
    let orchestrator = Orchestrator::new(
        tmp.path().to_path_buf(),
        config,
        &store,
        Box::new(UnavailableProposer),
    );

    let report = orchestrator
        .execute(&ledger, "delete ledger", &ExecuteOptions::default())
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::Denied);
    assert_eq!(report.canon_rule.as_deref(), Some("CANON-001"));
    assert!(report
        .canon_reason
        .as_deref()
        .unwrap()
        .contains("append-only"));

    // The denial is both event-logged and ledgered.
    let seen = kinds(orchestrator.events(), &report.execution_id);
    assert!(seen.contains(&EventKind::ExecutionStarted));
    assert!(seen.contains(&EventKind::CanonDenial));
    assert!(!seen.contains(&EventKind::FilesApplied));

    let entries = ledger.read(&Default::default(), 10).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].decision.as_deref(), Some("DENY"));
    assert_eq!(entries[0].hash, report.ledger_hash.unwrap());

    // Nothing from the fallback plan reached the workspace.
    assert!(!tmp.path().join("NOTES.md").exists());
}

#[test]
fn dry_run_evaluates_without_touching_ledger_events_or_workspace() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let ledger = DecisionLedger::open_sqlite(&store).unwrap();

    let orchestrator = Orchestrator::new(
        tmp.path().to_path_buf(),
        KernelConfig::default(),
        &store,
        Box::new(UnavailableProposer),
    );

    let opts = ExecuteOptions {
        dry_run: true,
        ..ExecuteOptions::default()
    };
    let report = orchestrator
        .execute(&ledger, "ship the release notes", &opts)
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::DryRun);
    assert!(report.admission.allowed);
    assert!(report.ledger_hash.is_none());
    assert!(orchestrator.events().read_all().unwrap().is_empty());
    assert!(ledger.head().unwrap().is_none());
    assert!(!tmp.path().join("NOTES.md").exists());
}

#[test]
fn allowed_execution_applies_persists_and_deploys() {
    let (_tmp, work) = git_workspace();
    let store = Store::open(&work).unwrap();
    let ledger = DecisionLedger::open_sqlite(&store).unwrap();

    let config = KernelConfig {
        git_enabled: true,
        persist_mode: PersistMode::Local,
        deploy_poll_interval_secs: 0,
        ..KernelConfig::default()
    };
    let plan = ProposedPlan {
        summary: "ship the release notes page".to_string(),
        files: vec![PlanFile {
            path: "docs/release-notes.md".to_string(),
            action: FileAction::Create,
            content: "# Release notes\n".to_string(),
        }],
    };
    let orchestrator = Orchestrator::new(
        work.clone(),
        config,
        &store,
        Box::new(FixedProposer { plan }),
    )
    .with_deploy(Box::new(ScriptedDeploy {
        status: DeployStatus {
            state: DeployState::Ready,
            url: Some("https://app.example.invalid".to_string()),
            error: None,
        },
    }));

    let report = orchestrator
        .execute(&ledger, "ship the release notes", &ExecuteOptions::default())
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::Completed);
    assert!(work.join("docs/release-notes.md").exists());

    let persisted = report.persist.unwrap();
    assert_eq!(persisted.mode, "local");
    assert_eq!(persisted.commit_sha.as_deref(), Some(head_sha(&work).as_str()));
    assert!(report.deploy.unwrap().succeeded());

    let seen = kinds(orchestrator.events(), &report.execution_id);
    assert_eq!(
        seen,
        vec![
            EventKind::ExecutionStarted,
            EventKind::PlanGenerated,
            EventKind::FilesApplied,
            EventKind::DeployTriggered,
            EventKind::DeployComplete,
        ]
    );

    let entries = ledger.read(&Default::default(), 10).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].decision.as_deref(), Some("ALLOW"));
    assert!(ledger.verify_chain(100).unwrap().ok);
}

#[test]
fn deploy_failure_rolls_back_to_the_last_known_good_commit() {
    let (_tmp, work) = git_workspace();
    let base = head_sha(&work);
    let store = Store::open(&work).unwrap();
    let ledger = DecisionLedger::open_sqlite(&store).unwrap();

    // A prior successful deploy at the seed commit is the restore target.
    let prior = EventLog::open(&store);
    prior
        .append(
            "exec-prior",
            EventKind::DeployComplete,
            "Deploy ready",
            Some(serde_json::json!({ "status": "ready", "commitSha": base })),
        )
        .unwrap();

    let config = KernelConfig {
        git_enabled: true,
        rollback_enabled: true,
        deploy_poll_attempts: 2,
        deploy_poll_interval_secs: 0,
        ..KernelConfig::default()
    };
    let plan = ProposedPlan {
        summary: "ship the broken feature".to_string(),
        files: vec![PlanFile {
            path: "docs/feature.md".to_string(),
            action: FileAction::Create,
            content: "wip\n".to_string(),
        }],
    };
    let orchestrator = Orchestrator::new(
        work.clone(),
        config,
        &store,
        Box::new(FixedProposer { plan }),
    )
    .with_deploy(Box::new(ScriptedDeploy {
        status: DeployStatus {
            state: DeployState::Error,
            url: None,
            error: Some("runtime crash after deploy".to_string()),
        },
    }));

    let report = orchestrator
        .execute(&ledger, "ship the broken feature", &ExecuteOptions::default())
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::RolledBack);
    let rollback = report.rollback.unwrap();
    assert_eq!(rollback.reverted_to, base);
    assert_eq!(head_sha(&work), base);
    assert!(!work.join("docs/feature.md").exists());

    let seen = kinds(orchestrator.events(), &report.execution_id);
    assert!(seen.contains(&EventKind::RollbackExecuted));
    assert!(seen.contains(&EventKind::SelfHealRecorded));
}

#[test]
fn deploy_failure_without_rollback_enabled_fails_closed() {
    let (_tmp, work) = git_workspace();
    let store = Store::open(&work).unwrap();
    let ledger = DecisionLedger::open_sqlite(&store).unwrap();

    let config = KernelConfig {
        git_enabled: true,
        rollback_enabled: false,
        deploy_poll_attempts: 1,
        deploy_poll_interval_secs: 0,
        ..KernelConfig::default()
    };
    let plan = ProposedPlan {
        summary: "ship the broken feature".to_string(),
        files: vec![PlanFile {
            path: "docs/feature.md".to_string(),
            action: FileAction::Create,
            content: "wip\n".to_string(),
        }],
    };
    let orchestrator = Orchestrator::new(
        work.clone(),
        config,
        &store,
        Box::new(FixedProposer { plan }),
    )
    .with_deploy(Box::new(ScriptedDeploy {
        status: DeployStatus {
            state: DeployState::Error,
            url: None,
            error: Some("runtime crash after deploy".to_string()),
        },
    }));

    let result = orchestrator.execute(&ledger, "ship the broken feature", &ExecuteOptions::default());
    assert!(matches!(result, Err(MagistrateError::DeployFailure(_))));

    // The commit stands; nothing was reset without the rollback flag.
    assert!(work.join("docs/feature.md").exists());
}

#[test]
fn proposer_failure_in_propagate_mode_is_event_logged_before_surfacing() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let ledger = DecisionLedger::open_sqlite(&store).unwrap();

    let config = KernelConfig {
        proposer_mode: ProposerMode::Propagate,
        ..KernelConfig::default()
    };
    let orchestrator = Orchestrator::new(
        tmp.path().to_path_buf(),
        config,
        &store,
        Box::new(UnavailableProposer),
    );

    let result = orchestrator.execute(&ledger, "ship the docs", &ExecuteOptions::default());
    assert!(matches!(result, Err(MagistrateError::ProposerFailure(_))));

    // The failure reaches the event log before it reaches the caller.
    let seen: Vec<EventKind> = orchestrator
        .events()
        .read_all()
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        seen,
        vec![EventKind::ExecutionStarted, EventKind::SelfHealRecorded]
    );
    assert!(ledger.head().unwrap().is_none());
}

#[test]
fn risk_denial_cites_the_denying_check_not_an_allow_rule() {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    let ledger = DecisionLedger::open_sqlite(&store).unwrap();

    let orchestrator = Orchestrator::new(
        tmp.path().to_path_buf(),
        KernelConfig::default(),
        &store,
        Box::new(UnavailableProposer),
    );

    // Canon allows this intent; only the risk ceiling denies it.
    let opts = ExecuteOptions {
        risk: 9.0,
        allowed_risk: 1.0,
        ..ExecuteOptions::default()
    };
    let report = orchestrator
        .execute(&ledger, "ship the docs", &opts)
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::Denied);
    assert_eq!(report.canon_rule.as_deref(), Some("OPTR-001"));
    assert_eq!(report.canon_reason.as_deref(), Some("Risk exceeds invariant"));

    let entries = ledger.read(&Default::default(), 10).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].decision.as_deref(), Some("DENY"));
    let content: serde_json::Value = serde_json::from_str(&entries[0].content).unwrap();
    assert_eq!(content["canon"], "OPTR-001");
}
