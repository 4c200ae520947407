//! CLI struct definitions and dispatch for the magistrate binary.

use crate::core::canon::{self, CanonInput};
use crate::core::config::KernelConfig;
use crate::core::error::MagistrateError;
use crate::core::export::export_data_room;
use crate::core::ledger::{DecisionLedger, LedgerFilter};
use crate::core::optr::NiContext;
use crate::core::orchestrator::{ExecuteOptions, Orchestrator};
use crate::core::plan::UnavailableProposer;
use crate::core::store::Store;
use crate::core::verify::verify_export;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "magistrate",
    version = env!("CARGO_PKG_VERSION"),
    about = "Magistrate gates autonomous change plans behind an ordered canon, records every decision in a hash-chained ledger, and verifies the whole evidence trail offline."
)]
pub struct Cli {
    /// Workspace root (defaults to the current directory).
    #[clap(long, global = true)]
    pub workspace: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an intent through admission and, unless denied, the full
    /// plan/apply/persist/deploy pipeline.
    Execute {
        #[clap(long)]
        intent: String,
        #[clap(long, default_value = "1")]
        risk: f64,
        #[clap(long)]
        allowed_risk: Option<f64>,
        /// Evaluate and report the decision without side effects.
        #[clap(long)]
        dry_run: bool,
    },
    /// Decision ledger operations.
    Ledger {
        #[clap(subcommand)]
        command: LedgerCommand,
    },
    /// Canon operations.
    Canon {
        #[clap(subcommand)]
        command: CanonCommand,
    },
    /// Export the audit data room.
    Export {
        #[clap(long)]
        out: PathBuf,
    },
    /// Verify an exported data room offline.
    VerifyExport {
        #[clap(long)]
        out: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum LedgerCommand {
    /// Walk the chain and report the first fault, if any.
    Verify {
        #[clap(long, default_value = "5000")]
        limit: usize,
    },
    /// List recent entries.
    List {
        #[clap(long, default_value = "50")]
        limit: usize,
        #[clap(long)]
        entry_type: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum CanonCommand {
    /// Evaluate an intent (and the plan it would produce) against the canon.
    Eval {
        #[clap(long)]
        intent: String,
    },
    /// Promote a policy artifact into the durable canon.
    Promote {
        #[clap(long)]
        title: String,
        #[clap(long)]
        content: String,
    },
    /// List promoted canon entries in promotion order.
    Snapshot,
    /// List the ordered canon rules and constitutional predicates.
    Rules,
}

pub fn run(cli: Cli) -> Result<(), MagistrateError> {
    let workspace = cli
        .workspace
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let config = KernelConfig::load(&workspace)?;
    let store = Store::open(&workspace)?;
    let ledger = DecisionLedger::open_sqlite(&store)?;

    match cli.command {
        Command::Execute {
            intent,
            risk,
            allowed_risk,
            dry_run,
        } => {
            let opts = ExecuteOptions {
                risk,
                allowed_risk: allowed_risk.unwrap_or(config.default_allowed_risk),
                ni: NiContext::default(),
                dry_run,
            };
            let orchestrator = Orchestrator::new(
                workspace,
                config,
                &store,
                Box::new(UnavailableProposer),
            );
            let report = orchestrator.execute(&ledger, &intent, &opts)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.status == crate::core::orchestrator::ExecutionStatus::Denied {
                return Err(MagistrateError::PolicyDenied {
                    rule: report.canon_rule.unwrap_or_else(|| "CANON".to_string()),
                    reason: report.canon_reason.unwrap_or_default(),
                });
            }
        }
        Command::Ledger { command } => match command {
            LedgerCommand::Verify { limit } => {
                let report = ledger.verify_chain(limit)?;
                println!("{}", serde_json::to_string_pretty(&report)?);
                if !report.ok {
                    return Err(MagistrateError::IntegrityViolation(
                        "ledger chain verification failed".to_string(),
                    ));
                }
            }
            LedgerCommand::List { limit, entry_type } => {
                let filter = LedgerFilter {
                    entry_type,
                    ..LedgerFilter::default()
                };
                let entries = ledger.read(&filter, limit)?;
                println!("{}", serde_json::to_string_pretty(&entries)?);
            }
        },
        Command::Canon { command } => match command {
            CanonCommand::Eval { intent } => {
                let plan = crate::core::plan::fallback_plan(&intent);
                let verdict = canon::evaluate_canon(&CanonInput {
                    intent: &intent,
                    plan: &plan,
                    founder_mode: config.founder_mode,
                });
                let auth = canon::authorize(&intent);
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "plan": verdict,
                        "intent": auth,
                    }))?
                );
            }
            CanonCommand::Promote { title, content } => {
                let entry = canon::promote_canon(&store, &ledger, &title, &content)?;
                println!("{}", serde_json::to_string_pretty(&entry)?);
            }
            CanonCommand::Snapshot => {
                let entries = canon::canon_snapshot(&store)?;
                println!("{}", serde_json::to_string_pretty(&entries)?);
            }
            CanonCommand::Rules => {
                let rules: Vec<_> = canon::canon_rules()
                    .iter()
                    .map(|r| serde_json::json!({ "id": r.id, "description": r.description }))
                    .collect();
                let constitutional: Vec<_> = canon::constitutional_canon()
                    .iter()
                    .map(|r| serde_json::json!({ "id": r.id, "rule": r.rule }))
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "canon": rules,
                        "constitutional": constitutional,
                    }))?
                );
            }
        },
        Command::Export { out } => {
            let summary = export_data_room(&store, &ledger, &out)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::VerifyExport { out } => {
            let report = verify_export(&out)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
