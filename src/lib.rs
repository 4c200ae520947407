//! Magistrate: an execution governance kernel.
//!
//! **Magistrate gates autonomous change plans behind a deterministic policy
//! layer and leaves cryptographically verifiable evidence of every decision.**
//!
//! An autonomous (or semi-autonomous) actor proposes file-level change plans
//! from natural-language intents. A separate, auditable authority (the
//! canon) decides whether each change is allowed, and every step, allowed
//! or denied, successful or failed, lands in append-only logs.
//!
//! # Core Principles
//!
//! - **Deterministic**: policy matching is plain keyword/regex work, so every
//!   decision is reproducible and explainable; randomness is never an
//!   authority signal
//! - **Tamper-evident**: authorization decisions chain through
//!   `sha256(prev_hash + "\n" + canonical_json(entry))`; one flipped byte is
//!   detectable forever after
//! - **Fail-closed**: risky capabilities (git writes, rollback, founder-mode
//!   edits to kernel paths) are off unless explicitly enabled
//! - **Offline-verifiable**: the audit export re-verifies from files alone,
//!   with no trust in the running system
//!
//! # Architecture
//!
//! Two record surfaces with different guarantees, kept deliberately
//! separate:
//!
//! - the **decision ledger** ([`core::ledger`]): hash-chained, append-only,
//!   the integrity proof
//! - the **event log** ([`core::events`]): per-execution workflow trace,
//!   unchained, for operational replay
//!
//! Admission requires all four checks: the ordered canon
//! ([`core::canon`]), non-interference, arbitration, and the OPTR risk
//! score ([`core::optr`]). The orchestrator ([`core::orchestrator`]) drives
//! plan -> apply -> persist -> deploy, rolling back to the last known good
//! commit on deploy failure when rollback is enabled.
//!
//! # Examples
//!
//! ```bash
//! # Admission dry run: decision + rationale, no ledger write
//! magistrate execute --intent "Update the onboarding docs" --dry-run
//!
//! # Full execution
//! magistrate execute --intent "Update the onboarding docs"
//!
//! # Walk the chain
//! magistrate ledger verify
//!
//! # Export evidence, then verify it offline
//! magistrate export --out ./data-room
//! magistrate verify-export --out ./data-room
//! ```

pub mod cli;
pub mod core;

pub use crate::core::error::MagistrateError;
