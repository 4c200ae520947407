//! Core modules for magistrate's governance kernel.
//!
//! Everything the kernel does lives here: canonical hashing, the chained
//! decision ledger, the per-execution event log, the canon rule engine,
//! multi-agent safety checks, the execution state machine, and the audit
//! export/verify pair.

pub mod apply;
pub mod canon;
pub mod config;
pub mod db;
pub mod deploy;
pub mod error;
pub mod events;
pub mod export;
pub mod git;
pub mod hash;
pub mod ledger;
pub mod optr;
pub mod orchestrator;
pub mod persist;
pub mod plan;
pub mod recovery;
pub mod schemas;
pub mod store;
pub mod time;
pub mod verify;
