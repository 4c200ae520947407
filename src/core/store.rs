//! Store abstraction for magistrate's on-disk state.
//!
//! A store is the directory holding the decision ledger database, the
//! file-backed ledger (when configured), and the per-execution event log.
//! All kernel state is scoped to a store root; nothing is written outside it
//! except plan files applied into the workspace.

use crate::core::error::MagistrateError;
use std::fs;
use std::path::{Path, PathBuf};

pub const STORE_DIR: &str = ".magistrate";

/// Store handle for a kernel state workspace.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory.
    pub root: PathBuf,
}

impl Store {
    /// Opens (creating if needed) the store under `workspace/.magistrate/data`.
    pub fn open(workspace_root: &Path) -> Result<Self, MagistrateError> {
        let root = workspace_root.join(STORE_DIR).join("data");
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// A store rooted at an explicit directory, used by tests and the
    /// offline verifier.
    pub fn at(root: PathBuf) -> Result<Self, MagistrateError> {
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn ledger_db_path(&self) -> PathBuf {
        self.root.join(crate::core::schemas::LEDGER_DB_NAME)
    }

    pub fn ledger_file_path(&self) -> PathBuf {
        self.root.join("ledger.jsonl")
    }

    pub fn events_path(&self) -> PathBuf {
        self.root.join("execution.events.jsonl")
    }
}
