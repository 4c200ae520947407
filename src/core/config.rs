//! Kernel configuration.
//!
//! Config resolves in three layers: built-in defaults, then
//! `.magistrate/config.toml` at the workspace root, then `MAGISTRATE_*`
//! environment variables. Risky capabilities (git writes, rollback, founder
//! mode) default to off and are only ever enabled explicitly; a missing flag
//! fails closed at the call site, never silently proceeds.

use crate::core::error::MagistrateError;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistMode {
    /// Stage, commit, and push in the local checkout.
    Local,
    /// Write files through a hosting API onto a branch and open a pull request.
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposerMode {
    /// Substitute a deterministic minimal plan when the proposer is unavailable.
    Fallback,
    /// Propagate proposer failure to the caller.
    Propagate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Operator-controlled gate for touching ledger/execution source paths.
    pub founder_mode: bool,
    /// Rollback refuses to run unless this is set.
    pub rollback_enabled: bool,
    /// Git writes (commit, push, reset) refuse to run unless this is set.
    pub git_enabled: bool,
    pub persist_mode: PersistMode,
    pub proposer_mode: ProposerMode,
    /// Bounded deploy polling: attempts x interval.
    pub deploy_poll_attempts: u32,
    pub deploy_poll_interval_secs: u64,
    /// Default risk ceiling applied when the caller supplies none.
    pub default_allowed_risk: f64,
    /// Actor recorded on system-initiated ledger entries.
    pub actor: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            founder_mode: false,
            rollback_enabled: false,
            git_enabled: false,
            persist_mode: PersistMode::Local,
            proposer_mode: ProposerMode::Fallback,
            deploy_poll_attempts: 20,
            deploy_poll_interval_secs: 3,
            default_allowed_risk: 2.0,
            actor: "magistrate-system".to_string(),
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name).ok().map(|v| v.trim() == "true" || v.trim() == "1")
}

impl KernelConfig {
    /// Loads config from `<workspace>/.magistrate/config.toml` (if present),
    /// then applies environment overrides.
    pub fn load(workspace_root: &Path) -> Result<Self, MagistrateError> {
        let path = workspace_root.join(crate::core::store::STORE_DIR).join("config.toml");
        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)?;
            toml::from_str(&content)
                .map_err(|e| MagistrateError::ValidationError(format!("config.toml: {}", e)))?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        if let Some(v) = env_flag("MAGISTRATE_FOUNDER_MODE") {
            self.founder_mode = v;
        }
        if let Some(v) = env_flag("MAGISTRATE_ROLLBACK_ENABLED") {
            self.rollback_enabled = v;
        }
        if let Some(v) = env_flag("MAGISTRATE_GIT_ENABLED") {
            self.git_enabled = v;
        }
        if let Ok(v) = env::var("MAGISTRATE_PERSIST_MODE") {
            match v.trim().to_lowercase().as_str() {
                "remote" => self.persist_mode = PersistMode::Remote,
                "local" => self.persist_mode = PersistMode::Local,
                _ => {}
            }
        }
        if let Ok(v) = env::var("MAGISTRATE_PROPOSER_MODE") {
            match v.trim().to_lowercase().as_str() {
                "fallback" => self.proposer_mode = ProposerMode::Fallback,
                "propagate" => self.proposer_mode = ProposerMode::Propagate,
                _ => {}
            }
        }
        if let Some(v) = env::var("MAGISTRATE_DEPLOY_POLL_ATTEMPTS")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
        {
            self.deploy_poll_attempts = v;
        }
        if let Some(v) = env::var("MAGISTRATE_DEPLOY_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            self.deploy_poll_interval_secs = v;
        }
    }

    /// Fails closed when git writes are not explicitly enabled.
    pub fn require_git_enabled(&self) -> Result<(), MagistrateError> {
        if !self.git_enabled {
            return Err(MagistrateError::ConfigurationMissing(
                "MAGISTRATE_GIT_ENABLED is not true; refusing git write".to_string(),
            ));
        }
        Ok(())
    }

    /// Fails closed when rollback is not explicitly enabled.
    pub fn require_rollback_enabled(&self) -> Result<(), MagistrateError> {
        if !self.rollback_enabled {
            return Err(MagistrateError::ConfigurationMissing(
                "MAGISTRATE_ROLLBACK_ENABLED is not true; refusing to rollback".to_string(),
            ));
        }
        self.require_git_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fail_closed() {
        let config = KernelConfig::default();
        assert!(!config.founder_mode);
        assert!(!config.rollback_enabled);
        assert!(!config.git_enabled);
        assert!(config.require_rollback_enabled().is_err());
        assert!(config.require_git_enabled().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = KernelConfig {
            rollback_enabled: true,
            git_enabled: true,
            persist_mode: PersistMode::Remote,
            ..KernelConfig::default()
        };
        let text = toml::to_string(&config).unwrap();
        let back: KernelConfig = toml::from_str(&text).unwrap();
        assert!(back.rollback_enabled);
        assert_eq!(back.persist_mode, PersistMode::Remote);
    }
}
