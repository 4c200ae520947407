//! Persisting an applied plan: local commit/push or a remote hosted branch
//! plus pull request.
//!
//! Both strategies are safe to retry: a local commit is idempotent per
//! content, and the remote path looks up the branch and pull request before
//! creating either, so a replayed execution reuses what already exists.

use crate::core::apply::assert_safe_relative_path;
use crate::core::config::{KernelConfig, PersistMode};
use crate::core::error::MagistrateError;
use crate::core::git::GitClient;
use crate::core::plan::ProposedPlan;
use serde::Serialize;

/// Seam to a git hosting API. Implementations must create-or-reuse: an
/// existing branch or open pull request for the same head is returned, not
/// duplicated.
pub trait HostingClient {
    fn ensure_branch(&self, branch: &str) -> Result<(), MagistrateError>;
    fn put_file(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<(), MagistrateError>;
    fn open_or_reuse_pull_request(
        &self,
        branch: &str,
        title: &str,
        body: &str,
    ) -> Result<String, MagistrateError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistOutcome {
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

pub fn branch_for_execution(execution_id: &str) -> String {
    format!("magistrate/{}", execution_id)
}

pub fn persist_plan(
    config: &KernelConfig,
    git: &GitClient,
    hosting: Option<&dyn HostingClient>,
    plan: &ProposedPlan,
    execution_id: &str,
) -> Result<PersistOutcome, MagistrateError> {
    match config.persist_mode {
        PersistMode::Local => persist_local(config, git, plan),
        PersistMode::Remote => {
            let hosting = hosting.ok_or_else(|| {
                MagistrateError::ConfigurationMissing(
                    "remote persist mode requires a hosting client".to_string(),
                )
            })?;
            persist_remote(hosting, plan, execution_id)
        }
    }
}

fn persist_local(
    config: &KernelConfig,
    git: &GitClient,
    plan: &ProposedPlan,
) -> Result<PersistOutcome, MagistrateError> {
    config.require_git_enabled()?;
    git.stage_all()?;
    git.commit(&plan.summary)?;
    git.push()?;
    let sha = git.head_sha()?;
    Ok(PersistOutcome {
        mode: "local".to_string(),
        commit_sha: Some(sha),
        pr_url: None,
        branch: None,
    })
}

fn persist_remote(
    hosting: &dyn HostingClient,
    plan: &ProposedPlan,
    execution_id: &str,
) -> Result<PersistOutcome, MagistrateError> {
    for file in &plan.files {
        assert_safe_relative_path(&file.path)?;
    }

    let branch = branch_for_execution(execution_id);
    let title: String = plan.summary.chars().take(200).collect();
    let message = format!("magistrate: {}", title);

    hosting.ensure_branch(&branch)?;
    for file in &plan.files {
        hosting.put_file(&branch, &file.path, &file.content, &message)?;
    }

    let body = format!(
        "ExecutionId: {}\n\nFiles:\n{}",
        execution_id,
        plan.files
            .iter()
            .map(|f| format!("- {}", f.path))
            .collect::<Vec<_>>()
            .join("\n")
    );
    let pr_url = hosting.open_or_reuse_pull_request(&branch, &title, &body)?;

    Ok(PersistOutcome {
        mode: "remote".to_string(),
        commit_sha: None,
        pr_url: Some(pr_url),
        branch: Some(branch),
    })
}
