//! Typed git client.
//!
//! Every git invocation goes through an explicit operation allowlist and is
//! built from argument arrays, never concatenated shell strings. Write
//! operations are additionally gated on `MAGISTRATE_GIT_ENABLED` by callers
//! through `KernelConfig::require_git_enabled`.

use crate::core::error::MagistrateError;
use std::path::{Path, PathBuf};
use std::process::Command;

/// The permitted git operations. Anything outside this set has no code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitOp {
    AddAll,
    Commit,
    Push,
    ForcePushWithLease,
    RevParse,
    ResetHard,
    DiffHead,
}

impl GitOp {
    pub fn is_write(self) -> bool {
        matches!(
            self,
            GitOp::AddAll | GitOp::Commit | GitOp::Push | GitOp::ForcePushWithLease | GitOp::ResetHard
        )
    }
}

#[derive(Debug, Clone)]
pub struct GitClient {
    repo_root: PathBuf,
}

impl GitClient {
    pub fn new(repo_root: &Path) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
        }
    }

    fn run(&self, op: GitOp, args: &[&str]) -> Result<String, MagistrateError> {
        tracing::debug!(?op, write = op.is_write(), "git invocation");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .map_err(|e| MagistrateError::GitError(format!("git {:?} failed to spawn: {}", op, e)))?;

        if !output.status.success() {
            return Err(MagistrateError::GitError(format!(
                "git {:?} failed: {}",
                op,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn stage_all(&self) -> Result<(), MagistrateError> {
        self.run(GitOp::AddAll, &["add", "."])?;
        Ok(())
    }

    /// Commit with the message passed as a single argv element; no shell is
    /// involved, so the message needs no sanitization.
    pub fn commit(&self, message: &str) -> Result<(), MagistrateError> {
        self.run(GitOp::Commit, &["commit", "-m", message])?;
        Ok(())
    }

    pub fn push(&self) -> Result<(), MagistrateError> {
        self.run(GitOp::Push, &["push"])?;
        Ok(())
    }

    pub fn force_push_with_lease(&self) -> Result<(), MagistrateError> {
        self.run(GitOp::ForcePushWithLease, &["push", "--force-with-lease"])?;
        Ok(())
    }

    pub fn rev_parse(&self, rev: &str) -> Result<String, MagistrateError> {
        self.run(GitOp::RevParse, &["rev-parse", rev])
    }

    pub fn head_sha(&self) -> Result<String, MagistrateError> {
        self.rev_parse("HEAD")
    }

    pub fn reset_hard(&self, commit: &str) -> Result<(), MagistrateError> {
        self.run(GitOp::ResetHard, &["reset", "--hard", commit])?;
        Ok(())
    }

    /// Diff of staged and unstaged changes against HEAD. `None` when the
    /// diff cannot be captured; degraded evidence, not an error.
    pub fn diff_head(&self) -> Option<String> {
        self.run(GitOp::DiffHead, &["diff", "HEAD"]).ok()
    }
}
