//! Deploy platform seam and bounded status polling.
//!
//! Polling is a blocking loop bounded by attempts x interval (default 20 x
//! 3s), so a stuck deploy can never hold an execution open indefinitely.
//! Terminal states are `ready` and `error`; exhausting the attempt budget is
//! a timeout, which callers treat as failure.

use crate::core::error::MagistrateError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployState {
    Ready,
    Error,
    #[serde(untagged)]
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployStatus {
    pub state: DeployState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Seam to the deploy platform. `trigger_build` fires the build hook;
/// `poll_status` reports the most recent deploy's state.
pub trait DeployPlatform {
    fn trigger_build(&self) -> Result<(), MagistrateError>;
    fn poll_status(&self) -> Result<DeployStatus, MagistrateError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployTerminal {
    Ready,
    Error,
    Timeout,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutcome {
    pub terminal: DeployTerminal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
}

impl DeployOutcome {
    pub fn succeeded(&self) -> bool {
        self.terminal == DeployTerminal::Ready
    }
}

/// Polls until a terminal state or the attempt budget runs out. Poll errors
/// are tolerated per attempt (transient API failures should not flip a
/// deploy to failed on their own); only the budget or a terminal state ends
/// the loop.
pub fn poll_until_terminal(
    platform: &dyn DeployPlatform,
    attempts: u32,
    interval: Duration,
) -> DeployOutcome {
    let mut last_error = None;
    for attempt in 1..=attempts {
        match platform.poll_status() {
            Ok(status) => match status.state {
                DeployState::Ready => {
                    return DeployOutcome {
                        terminal: DeployTerminal::Ready,
                        url: status.url,
                        error: None,
                        attempts: attempt,
                    };
                }
                DeployState::Error => {
                    return DeployOutcome {
                        terminal: DeployTerminal::Error,
                        url: status.url,
                        error: status.error.or(last_error),
                        attempts: attempt,
                    };
                }
                DeployState::Other(state) => {
                    tracing::debug!(attempt, state = %state, "deploy not terminal yet");
                }
            },
            Err(e) => {
                tracing::warn!(attempt, error = %e, "deploy status poll failed");
                last_error = Some(e.to_string());
            }
        }
        if attempt < attempts {
            std::thread::sleep(interval);
        }
    }

    DeployOutcome {
        terminal: DeployTerminal::Timeout,
        url: None,
        error: last_error,
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedPlatform {
        calls: AtomicU32,
        states: Vec<DeployState>,
    }

    impl DeployPlatform for ScriptedPlatform {
        fn trigger_build(&self) -> Result<(), MagistrateError> {
            Ok(())
        }

        fn poll_status(&self) -> Result<DeployStatus, MagistrateError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let state = self
                .states
                .get(n)
                .cloned()
                .unwrap_or(DeployState::Other("building".to_string()));
            Ok(DeployStatus {
                state,
                url: None,
                error: None,
            })
        }
    }

    #[test]
    fn test_poll_stops_on_ready() {
        let platform = ScriptedPlatform {
            calls: AtomicU32::new(0),
            states: vec![
                DeployState::Other("building".to_string()),
                DeployState::Ready,
            ],
        };
        let outcome = poll_until_terminal(&platform, 5, Duration::from_millis(0));
        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts, 2);
    }

    #[test]
    fn test_poll_times_out_after_budget() {
        let platform = ScriptedPlatform {
            calls: AtomicU32::new(0),
            states: vec![],
        };
        let outcome = poll_until_terminal(&platform, 3, Duration::from_millis(0));
        assert_eq!(outcome.terminal, DeployTerminal::Timeout);
        assert_eq!(outcome.attempts, 3);
    }
}
