//! The canon: ordered policy rules governing what execution is allowed.
//!
//! Rules run in a fixed order and the first denying rule short-circuits;
//! insertion order is precedence, there is no weighting mechanism. Matching
//! is deliberately plain keyword/regex work so every decision is
//! reproducible and explainable in audit evidence.
//!
//! Also here: intent-level authorization (the constitutional predicates over
//! raw intent text) and promoted canon artifacts, whose promotion is itself
//! recorded as a chained ledger entry.

use crate::core::db;
use crate::core::error::MagistrateError;
use crate::core::hash::sha256_hex;
use crate::core::ledger::DecisionLedger;
use crate::core::plan::{FileAction, ProposedPlan};
use crate::core::store::Store;
use crate::core::time;
use regex::Regex;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::OnceLock;

#[derive(Debug, Clone, Serialize)]
pub struct CanonInput<'a> {
    pub intent: &'a str,
    pub plan: &'a ProposedPlan,
    pub founder_mode: bool,
}

#[derive(Debug, Clone)]
pub enum RuleVerdict {
    Allow,
    Deny(String),
}

pub struct CanonRule {
    pub id: &'static str,
    pub description: &'static str,
    pub evaluate: fn(&CanonInput) -> RuleVerdict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonVerdict {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CanonVerdict {
    fn allow() -> Self {
        Self {
            allowed: true,
            rule: None,
            reason: None,
        }
    }

    fn deny(rule: &str, reason: String) -> Self {
        Self {
            allowed: false,
            rule: Some(rule.to_string()),
            reason: Some(reason),
        }
    }
}

fn normalize_slash(path: &str) -> String {
    path.replace('\\', "/")
}

fn looks_like_dependency_dir(path: &str) -> bool {
    let p = normalize_slash(path);
    p == "node_modules"
        || p.starts_with("node_modules/")
        || p.contains("/node_modules/")
        || p == "target"
        || p.starts_with("target/")
        || p.contains("/target/")
}

fn is_kernel_locked(path: &str) -> bool {
    let p = normalize_slash(path);
    p == crate::core::store::STORE_DIR || p.starts_with(".magistrate/") || p.contains("/.magistrate/")
}

fn is_critical_file(path: &str, action: FileAction) -> bool {
    let p = normalize_slash(path);
    if action == FileAction::Delete {
        return true;
    }
    if looks_like_dependency_dir(&p) || is_kernel_locked(&p) {
        return true;
    }
    // Root dotfiles are a common footgun.
    if !p.contains('/') && p.starts_with('.') {
        return true;
    }
    if p.ends_with(".env") || p.contains("/.env") {
        return true;
    }
    false
}

fn structural_rule(input: &CanonInput) -> RuleVerdict {
    if input.plan.files.is_empty() {
        RuleVerdict::Deny("No file-level change proposed".to_string())
    } else {
        RuleVerdict::Allow
    }
}

fn safety_rule(input: &CanonInput) -> RuleVerdict {
    for file in &input.plan.files {
        if is_critical_file(&file.path, file.action) {
            return RuleVerdict::Deny(format!(
                "Destructive or critical action blocked on {}",
                normalize_slash(&file.path)
            ));
        }
    }
    RuleVerdict::Allow
}

fn scope_rule(input: &CanonInput) -> RuleVerdict {
    let first_token = input
        .intent
        .split_whitespace()
        .next()
        .map(str::to_lowercase)
        .unwrap_or_default();
    if first_token.is_empty() {
        return RuleVerdict::Allow;
    }
    if !input.plan.summary.to_lowercase().contains(&first_token) {
        return RuleVerdict::Deny("Plan summary does not align with intent".to_string());
    }
    RuleVerdict::Allow
}

fn touches_kernel_source(path: &str) -> bool {
    let p = normalize_slash(path);
    p.starts_with("src/core/ledger")
        || p.starts_with("src/core/orchestrator")
        || p.contains("/ledger")
        || p.contains("/execute")
}

fn founder_rule(input: &CanonInput) -> RuleVerdict {
    let touches_core = input.plan.files.iter().any(|f| touches_kernel_source(&f.path));
    if touches_core && !input.founder_mode {
        return RuleVerdict::Deny(
            "Core execution paths may only be modified in founder mode \
             (set MAGISTRATE_FOUNDER_MODE=true)"
                .to_string(),
        );
    }
    RuleVerdict::Allow
}

fn constitutional_rule(input: &CanonInput) -> RuleVerdict {
    for rule in constitutional_canon() {
        if !(rule.enforce)(input.intent) {
            return RuleVerdict::Deny(format!("{}: {}", rule.id, rule.rationale));
        }
    }
    RuleVerdict::Allow
}

/// The ordered canon. Extension means inserting a rule here; position in
/// this list is the rule's precedence.
pub fn canon_rules() -> Vec<CanonRule> {
    vec![
        CanonRule {
            id: "CANON-STRUCT-001",
            description: "Plan must propose at least one file change",
            evaluate: structural_rule,
        },
        CanonRule {
            id: "CANON-SAFETY-001",
            description: "No deletion or writes to critical system files",
            evaluate: safety_rule,
        },
        CanonRule {
            id: "CANON-SCOPE-001",
            description: "Plan summary must match declared intent",
            evaluate: scope_rule,
        },
        CanonRule {
            id: "CANON-FOUNDER-001",
            description: "Only founder-authorized execution may touch kernel source paths",
            evaluate: founder_rule,
        },
        CanonRule {
            id: "CANON-CONST-001",
            description: "Intent text must pass the constitutional predicates",
            evaluate: constitutional_rule,
        },
    ]
}

/// Evaluates the ordered canon; the first denying rule wins and later rules
/// never run.
pub fn evaluate_canon(input: &CanonInput) -> CanonVerdict {
    for rule in canon_rules() {
        if let RuleVerdict::Deny(reason) = (rule.evaluate)(input) {
            return CanonVerdict::deny(rule.id, reason);
        }
    }
    CanonVerdict::allow()
}

/// A constitutional content predicate: pure, enumerable, deterministic.
pub struct ConstitutionalRule {
    pub id: &'static str,
    pub rule: &'static str,
    pub rationale: &'static str,
    pub enforce: fn(&str) -> bool,
}

fn re(cell: &'static OnceLock<Regex>, pattern: &'static str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern"))
}

fn no_harm(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    !re(&RE, r"(?i)harm|injure|kill|exploit").is_match(text)
}

fn no_pii(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    !re(&RE, r"(?i)\bssn\b|\b\d{3}-\d{2}-\d{4}\b").is_match(text)
}

fn no_deception(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    !re(&RE, r"(?i)bypass|evade|override|spoof").is_match(text)
}

fn non_empty(text: &str) -> bool {
    !text.trim().is_empty()
}

pub fn constitutional_canon() -> Vec<ConstitutionalRule> {
    vec![
        ConstitutionalRule {
            id: "CAI-001",
            rule: "Prevent harm to humans",
            rationale: "Denied: harm-indicative language",
            enforce: no_harm,
        },
        ConstitutionalRule {
            id: "CAI-004",
            rule: "No PII exposure (SSN)",
            rationale: "Denied: PII detected (SSN)",
            enforce: no_pii,
        },
        ConstitutionalRule {
            id: "CAI-002",
            rule: "No deception or bypass",
            rationale: "Denied: deception/bypass attempt",
            enforce: no_deception,
        },
        ConstitutionalRule {
            id: "CAI-003",
            rule: "Respect user intent and authority",
            rationale: "Denied: empty intent",
            enforce: non_empty,
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationDecision {
    pub allowed: bool,
    pub decision: String,
    pub canon_rule_id: String,
    pub rationale: String,
}

/// Intent-level authorization over raw text, before any plan exists.
/// Attempts against the ledger's immutability are refused first, then the
/// constitutional predicates run in order.
pub fn authorize(intent: &str) -> AuthorizationDecision {
    let normalized = intent.to_lowercase();
    if normalized.contains("delete ledger") || normalized.contains("truncate ledger") {
        return AuthorizationDecision {
            allowed: false,
            decision: "DENY".to_string(),
            canon_rule_id: "CANON-001".to_string(),
            rationale: "Ledger is append-only and immutable".to_string(),
        };
    }

    for rule in constitutional_canon() {
        if !(rule.enforce)(intent) {
            return AuthorizationDecision {
                allowed: false,
                decision: "DENY".to_string(),
                canon_rule_id: rule.id.to_string(),
                rationale: rule.rationale.to_string(),
            };
        }
    }

    AuthorizationDecision {
        allowed: true,
        decision: "ALLOW".to_string(),
        canon_rule_id: "CAI-ALLOW".to_string(),
        rationale: "Intent conforms to the constitutional canon".to_string(),
    }
}

/// A promoted canon artifact: durable policy/knowledge, linked to the
/// ledger entry that recorded its promotion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    pub ledger_hash: String,
    pub promoted_at: String,
}

/// Promotes a policy artifact: the promotion is appended to the decision
/// ledger (type `canon`) and the durable entry stores that ledger hash,
/// linking the two logs by hash reference.
pub fn promote_canon(
    store: &Store,
    ledger: &DecisionLedger,
    title: &str,
    content: &str,
) -> Result<CanonEntry, MagistrateError> {
    let content_hash = sha256_hex(content.as_bytes());
    let ledger_entry = ledger.append(&json!({
        "type": "canon",
        "title": title,
        "contentHash": content_hash,
        "systemInitiated": true,
    }))?;

    let entry = CanonEntry {
        id: time::new_id(),
        title: title.to_string(),
        content: content.to_string(),
        ledger_hash: ledger_entry.hash.clone(),
        promoted_at: time::now_rfc3339(),
    };

    let conn = db::db_connect(&store.ledger_db_path())?;
    conn.execute_batch(crate::core::schemas::CANON_DB_SCHEMA)?;
    conn.execute(
        "INSERT INTO canon_entries (id, title, content, ledger_hash, promoted_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entry.id,
            entry.title,
            entry.content,
            entry.ledger_hash,
            entry.promoted_at
        ],
    )?;
    Ok(entry)
}

/// Promoted canon in promotion order.
pub fn canon_snapshot(store: &Store) -> Result<Vec<CanonEntry>, MagistrateError> {
    let conn = db::db_connect(&store.ledger_db_path())?;
    conn.execute_batch(crate::core::schemas::CANON_DB_SCHEMA)?;
    let mut stmt = conn.prepare(
        "SELECT id, title, content, ledger_hash, promoted_at
         FROM canon_entries ORDER BY seq ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(CanonEntry {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            ledger_hash: row.get(3)?,
            promoted_at: row.get(4)?,
        })
    })?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}
