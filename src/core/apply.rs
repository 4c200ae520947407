//! Applying a plan's write set to the workspace.
//!
//! Path safety is checked for the entire write set before any file is
//! written: absolute paths, traversal out of the workspace root, and `.git`
//! internals are refused up front, so a plan either applies wholly inside
//! the workspace or not at all. The writes are bracketed by diff captures
//! for audit evidence; a failed capture degrades the evidence but does not
//! fail the apply.

use crate::core::error::MagistrateError;
use crate::core::git::GitClient;
use crate::core::plan::{FileAction, ProposedPlan};
use serde_json::json;
use std::fs;
use std::path::{Component, Path};

/// Rejects absolute paths, parent-escapes, backslashes, and `.git` paths.
pub fn assert_safe_relative_path(path: &str) -> Result<(), MagistrateError> {
    if path.trim().is_empty() {
        return Err(MagistrateError::PathSafety("empty file path".to_string()));
    }
    if path.contains('\\') {
        return Err(MagistrateError::PathSafety(format!(
            "refusing backslash path: {}",
            path
        )));
    }
    let p = Path::new(path);
    if p.is_absolute() {
        return Err(MagistrateError::PathSafety(format!(
            "refusing absolute path: {}",
            path
        )));
    }
    let mut depth: i32 = 0;
    for component in p.components() {
        match component {
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return Err(MagistrateError::PathSafety(format!(
                        "refusing to write outside workspace: {}",
                        path
                    )));
                }
            }
            Component::Normal(seg) => {
                if seg == ".git" {
                    return Err(MagistrateError::PathSafety(format!(
                        "refusing to touch .git: {}",
                        path
                    )));
                }
                depth += 1;
            }
            Component::CurDir => {}
            _ => {
                return Err(MagistrateError::PathSafety(format!(
                    "refusing path: {}",
                    path
                )));
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub files: Vec<String>,
    pub diff_before: Option<String>,
    pub diff_after: Option<String>,
}

impl ApplyOutcome {
    pub fn details(&self) -> serde_json::Value {
        json!({
            "files": self.files,
            "diffBefore": self.diff_before,
            "diffAfter": self.diff_after,
        })
    }
}

/// Writes the plan's files into the workspace. The whole write set is
/// path-checked before the first write; delete actions never reach this
/// point (the canon safety rule refuses them earlier).
pub fn apply_plan(
    workspace_root: &Path,
    git: &GitClient,
    plan: &ProposedPlan,
) -> Result<ApplyOutcome, MagistrateError> {
    for file in &plan.files {
        assert_safe_relative_path(&file.path)?;
        if file.action == FileAction::Delete {
            return Err(MagistrateError::PathSafety(format!(
                "delete action reached apply stage for {}",
                file.path
            )));
        }
    }

    let diff_before = git.diff_head();

    for file in &plan.files {
        let target = workspace_root.join(&file.path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, &file.content)?;
    }

    let diff_after = git.diff_head();

    Ok(ApplyOutcome {
        files: plan.files.iter().map(|f| f.path.clone()).collect(),
        diff_before,
        diff_after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_absolute_and_traversal() {
        assert!(assert_safe_relative_path("/etc/passwd").is_err());
        assert!(assert_safe_relative_path("../../etc/passwd").is_err());
        assert!(assert_safe_relative_path("a/../../b").is_err());
        assert!(assert_safe_relative_path("..").is_err());
    }

    #[test]
    fn test_rejects_git_and_backslash() {
        assert!(assert_safe_relative_path(".git/config").is_err());
        assert!(assert_safe_relative_path("a\\b").is_err());
        assert!(assert_safe_relative_path("").is_err());
    }

    #[test]
    fn test_accepts_normal_relative_paths() {
        assert!(assert_safe_relative_path("docs/guide.md").is_ok());
        assert!(assert_safe_relative_path("a/b/../c").is_ok());
        assert!(assert_safe_relative_path("./README.md").is_ok());
    }
}
