//! Deterministic audit export ("data room").
//!
//! The export lays down the promoted canon and the full decision ledger as
//! plain files, each independently hashed, plus a flat hash-chain file per
//! log and a manifest of every artifact's byte length and SHA-256. The
//! offline verifier in `verify.rs` re-derives everything from the files
//! alone.

use crate::core::canon::{canon_snapshot, CanonEntry};
use crate::core::error::MagistrateError;
use crate::core::hash::{hash_value, sha256_hex};
use crate::core::ledger::{DecisionLedger, LedgerFilter};
use crate::core::store::Store;
use crate::core::time;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "MANIFEST.json";
pub const CANON_DIR: &str = "CANON";
pub const LEDGER_DIR: &str = "LEDGER";
pub const CANON_INDEX_FILE: &str = "CANON/canon-index.json";
pub const CANON_CHAIN_FILE: &str = "CANON/canon-hash-chain.txt";
pub const LEDGER_EXPORT_FILE: &str = "LEDGER/ledger-export.jsonl";
pub const LEDGER_CHAIN_FILE: &str = "LEDGER/ledger-hash-chain.txt";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestArtifact {
    pub path: String,
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    pub project: String,
    pub export_type: String,
    pub generated_at: String,
    pub artifacts: Vec<ManifestArtifact>,
}

/// One line of the exported ledger JSONL. `content` is the parsed canonical
/// payload; the verifier re-canonicalizes it when replaying the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedLedgerLine {
    pub id: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub created_at: String,
    pub prev_hash: Option<String>,
    pub hash: String,
    pub content: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonIndexEntry {
    pub id: String,
    pub title: String,
    pub promoted_at: String,
    pub ledger_hash: String,
    pub hash: String,
    pub file: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub out_root: PathBuf,
    pub canon_entries: usize,
    pub ledger_entries: usize,
    pub artifacts: usize,
}

fn write_text(path: &Path, text: &str) -> Result<(), MagistrateError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    Ok(())
}

fn canon_payload(entry: &CanonEntry) -> Value {
    json!({
        "id": entry.id,
        "title": entry.title,
        "content": entry.content,
        "ledgerHash": entry.ledger_hash,
        "promotedAt": entry.promoted_at,
    })
}

fn export_canon(store: &Store, out_root: &Path) -> Result<usize, MagistrateError> {
    let entries = canon_snapshot(store)?;
    let mut index = Vec::new();
    let mut chain = Vec::new();

    for entry in &entries {
        let payload = canon_payload(entry);
        let hash = hash_value(&payload);
        let file = format!("{}/{}.json", CANON_DIR, entry.id);
        write_text(
            &out_root.join(&file),
            &serde_json::to_string_pretty(&payload)?,
        )?;
        chain.push(hash.clone());
        index.push(CanonIndexEntry {
            id: entry.id.clone(),
            title: entry.title.clone(),
            promoted_at: entry.promoted_at.clone(),
            ledger_hash: entry.ledger_hash.clone(),
            hash,
            file,
        });
    }

    write_text(
        &out_root.join(CANON_INDEX_FILE),
        &serde_json::to_string_pretty(&index)?,
    )?;
    write_text(
        &out_root.join(CANON_CHAIN_FILE),
        &format!("{}\n", chain.join("\n")),
    )?;
    Ok(entries.len())
}

fn export_ledger(ledger: &DecisionLedger, out_root: &Path) -> Result<usize, MagistrateError> {
    let entries = ledger.read(&LedgerFilter::default(), usize::MAX)?;
    let mut lines = Vec::new();
    let mut chain = Vec::new();

    for entry in &entries {
        let content: Value = serde_json::from_str(&entry.content)?;
        let line = ExportedLedgerLine {
            id: entry.id.clone(),
            entry_type: entry.entry_type.clone(),
            created_at: entry.created_at.clone(),
            prev_hash: entry.prev_hash.clone(),
            hash: entry.hash.clone(),
            content,
        };
        lines.push(serde_json::to_string(&line)?);
        chain.push(entry.hash.clone());
    }

    write_text(
        &out_root.join(LEDGER_EXPORT_FILE),
        &format!("{}\n", lines.join("\n")),
    )?;
    write_text(
        &out_root.join(LEDGER_CHAIN_FILE),
        &format!("{}\n", chain.join("\n")),
    )?;
    Ok(entries.len())
}

pub fn list_files_recursively(root: &Path) -> Result<Vec<PathBuf>, MagistrateError> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Builds the manifest last so it covers every other artifact.
fn write_manifest(out_root: &Path) -> Result<usize, MagistrateError> {
    let mut artifacts = Vec::new();
    for file in list_files_recursively(out_root)? {
        if file.file_name().map(|n| n == MANIFEST_FILE).unwrap_or(false) {
            continue;
        }
        let rel = file
            .strip_prefix(out_root)
            .map_err(|_| MagistrateError::ValidationError("artifact outside export root".to_string()))?
            .to_string_lossy()
            .replace('\\', "/");
        let bytes = fs::read(&file)?;
        artifacts.push(ManifestArtifact {
            path: rel,
            bytes: bytes.len() as u64,
            sha256: sha256_hex(&bytes),
        });
    }
    artifacts.sort_by(|a, b| a.path.cmp(&b.path));

    let manifest = Manifest {
        schema_version: 1,
        project: "magistrate".to_string(),
        export_type: "audit-data-room".to_string(),
        generated_at: time::now_rfc3339(),
        artifacts,
    };
    let count = manifest.artifacts.len();
    write_text(
        &out_root.join(MANIFEST_FILE),
        &serde_json::to_string_pretty(&manifest)?,
    )?;
    Ok(count)
}

/// Exports the promoted canon and the decision ledger into `out_root`,
/// finishing with the manifest.
pub fn export_data_room(
    store: &Store,
    ledger: &DecisionLedger,
    out_root: &Path,
) -> Result<ExportSummary, MagistrateError> {
    fs::create_dir_all(out_root.join(CANON_DIR))?;
    fs::create_dir_all(out_root.join(LEDGER_DIR))?;

    let canon_entries = export_canon(store, out_root)?;
    let ledger_entries = export_ledger(ledger, out_root)?;
    let artifacts = write_manifest(out_root)?;

    Ok(ExportSummary {
        out_root: out_root.to_path_buf(),
        canon_entries,
        ledger_entries,
        artifacts,
    })
}
