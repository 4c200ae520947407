//! The execution state machine.
//!
//! One execution flows STARTED -> PLAN_GENERATED -> {CANON_DENIAL terminal |
//! FILES_APPLIED} -> persisted -> DEPLOY_TRIGGERED -> DEPLOY_COMPLETE ->
//! [on failure] ROLLBACK_EXECUTED. Every stage failure is written to the
//! event log (as an advisory self-heal record) before the error propagates,
//! and nothing touches the filesystem or the network after a denial.
//!
//! Executions are independent units of work: nothing here takes
//! cross-execution locks beyond the ledger's own append serialization.

use crate::core::apply::apply_plan;
use crate::core::canon::{evaluate_canon, CanonInput};
use crate::core::config::KernelConfig;
use crate::core::deploy::{poll_until_terminal, DeployOutcome, DeployPlatform, DeployTerminal};
use crate::core::error::MagistrateError;
use crate::core::events::{EventKind, EventLog};
use crate::core::git::GitClient;
use crate::core::hash::sha256_hex;
use crate::core::ledger::DecisionLedger;
use crate::core::optr::{admit, Admission, NiContext};
use crate::core::persist::{persist_plan, HostingClient, PersistOutcome};
use crate::core::plan::{resolve_plan, Intent, PlanProposer, ProposedPlan};
use crate::core::recovery::{analyze_failure, record_self_heal, rollback_to_safe_state, RollbackResult};
use crate::core::store::Store;
use crate::core::time;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Denied,
    Completed,
    RolledBack,
    DryRun,
}

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub risk: f64,
    pub allowed_risk: f64,
    pub ni: NiContext,
    pub dry_run: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            risk: 1.0,
            allowed_risk: 2.0,
            ni: NiContext::default(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub intent: String,
    pub intent_hash: String,
    pub admission: Admission,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canon_rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canon_reason: Option<String>,
    pub plan_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist: Option<PersistOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeployOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackResult>,
}

pub struct Orchestrator {
    workspace_root: PathBuf,
    config: KernelConfig,
    events: EventLog,
    git: GitClient,
    proposer: Box<dyn PlanProposer>,
    hosting: Option<Box<dyn HostingClient>>,
    deploy: Option<Box<dyn DeployPlatform>>,
}

impl Orchestrator {
    pub fn new(
        workspace_root: PathBuf,
        config: KernelConfig,
        store: &Store,
        proposer: Box<dyn PlanProposer>,
    ) -> Self {
        let events = EventLog::open(store);
        let git = GitClient::new(&workspace_root);
        Self {
            workspace_root,
            config,
            events,
            git,
            proposer,
            hosting: None,
            deploy: None,
        }
    }

    pub fn with_hosting(mut self, hosting: Box<dyn HostingClient>) -> Self {
        self.hosting = Some(hosting);
        self
    }

    pub fn with_deploy(mut self, deploy: Box<dyn DeployPlatform>) -> Self {
        self.deploy = Some(deploy);
        self
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Runs one intent through the full state machine. Denials are an
    /// expected outcome and come back as a report, not an error; stage
    /// failures after admission propagate as errors once recorded.
    pub fn execute(
        &self,
        ledger: &DecisionLedger,
        intent: &str,
        opts: &ExecuteOptions,
    ) -> Result<ExecutionReport, MagistrateError> {
        let execution_id = time::new_execution_id();
        let intent_hash = sha256_hex(intent.as_bytes());
        let span = tracing::info_span!("execute", execution_id = %execution_id);
        let _enter = span.enter();

        let intent_record = Intent::new(intent, &self.config.actor);
        if !opts.dry_run {
            self.events.append(
                &execution_id,
                EventKind::ExecutionStarted,
                intent,
                Some(json!({ "intentHash": intent_hash, "intent": intent_record })),
            )?;
        }

        // Plan stage: propose, classify against the workspace, evaluate.
        // A dry run stays side-effect free, so its proposer failure is not
        // event-logged.
        let mut plan = if opts.dry_run {
            resolve_plan(self.proposer.as_ref(), self.config.proposer_mode, intent)?
        } else {
            self.stage(&execution_id, "plan", || {
                resolve_plan(self.proposer.as_ref(), self.config.proposer_mode, intent)
            })?
        };
        plan.classify_against(&self.workspace_root);

        if !opts.dry_run {
            self.events.append(
                &execution_id,
                EventKind::PlanGenerated,
                &plan.summary,
                Some(json!({ "files": plan.file_paths() })),
            )?;
        }

        let canon = evaluate_canon(&CanonInput {
            intent,
            plan: &plan,
            founder_mode: self.config.founder_mode,
        });
        let admission = admit(intent, &opts.ni, opts.risk, opts.allowed_risk);
        let allowed = canon.allowed && admission.allowed;

        if opts.dry_run {
            return Ok(ExecutionReport {
                execution_id,
                status: ExecutionStatus::DryRun,
                intent: intent.to_string(),
                intent_hash,
                admission,
                canon_rule: canon.rule,
                canon_reason: canon.reason,
                plan_summary: plan.summary,
                ledger_hash: None,
                persist: None,
                deploy: None,
                rollback: None,
            });
        }

        if !allowed {
            return self.record_denial(ledger, execution_id, intent, intent_hash, plan, canon, admission);
        }

        let entry = ledger.append(&json!({
            "type": "execution",
            "intent": intent,
            "decision": "ALLOW",
            "rationale": admission.why,
            "intentHash": intent_hash,
            "executionId": execution_id,
            "actor": self.config.actor,
            "systemInitiated": true,
            "optr": admission.optr,
        }))?;

        // Apply stage.
        let applied = self
            .stage(&execution_id, "apply", || {
                apply_plan(&self.workspace_root, &self.git, &plan)
            })?;
        self.events.append(
            &execution_id,
            EventKind::FilesApplied,
            &plan.summary,
            Some(applied.details()),
        )?;

        // Persist stage.
        let persisted = self.stage(&execution_id, "persist", || {
            persist_plan(
                &self.config,
                &self.git,
                self.hosting.as_deref(),
                &plan,
                &execution_id,
            )
        })?;

        // Deploy stage, when a platform is wired in.
        let (deploy, rollback) = match &self.deploy {
            Some(platform) => self.run_deploy(&execution_id, platform.as_ref(), &persisted)?,
            None => (None, None),
        };

        let status = if rollback.is_some() {
            ExecutionStatus::RolledBack
        } else {
            ExecutionStatus::Completed
        };

        Ok(ExecutionReport {
            execution_id,
            status,
            intent: intent.to_string(),
            intent_hash,
            admission,
            canon_rule: None,
            canon_reason: None,
            plan_summary: plan.summary,
            ledger_hash: Some(entry.hash),
            persist: Some(persisted),
            deploy,
            rollback,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn record_denial(
        &self,
        ledger: &DecisionLedger,
        execution_id: String,
        intent: &str,
        intent_hash: String,
        plan: ProposedPlan,
        canon: crate::core::canon::CanonVerdict,
        admission: Admission,
    ) -> Result<ExecutionReport, MagistrateError> {
        let (rule, reason) = if !canon.allowed {
            (canon.rule.clone(), canon.reason.clone())
        } else {
            (admission.denied_by(), Some(admission.why.clone()))
        };

        self.events.append(
            &execution_id,
            EventKind::CanonDenial,
            reason.as_deref().unwrap_or("denied"),
            Some(json!({ "rule": rule })),
        )?;

        let entry = ledger.append(&json!({
            "type": "deny",
            "intent": intent,
            "decision": "DENY",
            "rationale": reason,
            "canon": rule,
            "intentHash": intent_hash,
            "executionId": execution_id,
            "actor": self.config.actor,
            "systemInitiated": true,
        }))?;

        Ok(ExecutionReport {
            execution_id,
            status: ExecutionStatus::Denied,
            intent: intent.to_string(),
            intent_hash,
            admission,
            canon_rule: rule,
            canon_reason: reason,
            plan_summary: plan.summary,
            ledger_hash: Some(entry.hash),
            persist: None,
            deploy: None,
            rollback: None,
        })
    }

    /// Runs one stage; on failure the classified self-heal advisory is
    /// recorded before the error propagates.
    fn stage<T>(
        &self,
        execution_id: &str,
        name: &str,
        f: impl FnOnce() -> Result<T, MagistrateError>,
    ) -> Result<T, MagistrateError> {
        match f() {
            Ok(value) => Ok(value),
            Err(e) => {
                let message = format!("{} stage failed: {}", name, e);
                tracing::error!(execution_id, stage = name, code = e.code(), error = %e, "stage failed");
                record_self_heal(&self.events, execution_id, analyze_failure(&message), &message);
                Err(e)
            }
        }
    }

    fn run_deploy(
        &self,
        execution_id: &str,
        platform: &dyn DeployPlatform,
        persisted: &PersistOutcome,
    ) -> Result<(Option<DeployOutcome>, Option<RollbackResult>), MagistrateError> {
        self.stage(execution_id, "deploy-trigger", || platform.trigger_build())?;
        self.events.append(
            execution_id,
            EventKind::DeployTriggered,
            "Deploy triggered",
            Some(json!({ "commitSha": persisted.commit_sha })),
        )?;

        let outcome = poll_until_terminal(
            platform,
            self.config.deploy_poll_attempts,
            Duration::from_secs(self.config.deploy_poll_interval_secs),
        );

        let status = match outcome.terminal {
            DeployTerminal::Ready => "ready",
            DeployTerminal::Error => "error",
            DeployTerminal::Timeout => "timeout",
        };
        self.events.append(
            execution_id,
            EventKind::DeployComplete,
            &format!("Deploy {}", status),
            Some(json!({
                "status": status,
                "commitSha": persisted.commit_sha,
                "url": outcome.url,
                "error": outcome.error,
            })),
        )?;

        if outcome.succeeded() {
            return Ok((Some(outcome), None));
        }

        let failure = MagistrateError::DeployFailure(
            outcome
                .error
                .clone()
                .unwrap_or_else(|| format!("deploy terminal state: {}", status)),
        );

        if !self.config.rollback_enabled {
            record_self_heal(
                &self.events,
                execution_id,
                analyze_failure(&failure.to_string()),
                &failure.to_string(),
            );
            return Err(failure);
        }

        let rollback = self.stage(execution_id, "rollback", || {
            rollback_to_safe_state(
                &self.config,
                &self.events,
                &self.git,
                execution_id,
                &failure.to_string(),
            )
        })?;
        record_self_heal(
            &self.events,
            execution_id,
            analyze_failure(&failure.to_string()),
            &failure.to_string(),
        );

        Ok((Some(outcome), Some(rollback)))
    }
}
