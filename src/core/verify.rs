//! Offline verification of an exported data room.
//!
//! Operates only on the exported files: no live store, no database. Three
//! categories run in order, each all-or-nothing: (1) every manifest entry's
//! bytes and hash against disk, (2) every canon payload's canonical hash
//! against its index record and chain position, (3) a full replay of the
//! ledger's prevHash linkage and `sha256(prev + "\n" + content)` formula,
//! failing at the first broken link with the exact line index and both
//! expected/actual values. An integrity violation invalidates the export;
//! nothing is repaired.

use crate::core::error::MagistrateError;
use crate::core::export::{
    CanonIndexEntry, ExportedLedgerLine, Manifest, CANON_CHAIN_FILE, CANON_INDEX_FILE,
    LEDGER_CHAIN_FILE, LEDGER_EXPORT_FILE, MANIFEST_FILE,
};
use crate::core::hash::{canonical_json, chain_hash, hash_value, sha256_hex};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportVerifyReport {
    pub manifest_artifacts: usize,
    pub canon_entries: usize,
    pub ledger_entries: usize,
}

fn read_chain_file(path: &Path) -> Result<Vec<String>, MagistrateError> {
    let raw = fs::read_to_string(path)?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

fn verify_manifest(out_root: &Path) -> Result<usize, MagistrateError> {
    let raw = fs::read_to_string(out_root.join(MANIFEST_FILE))?;
    let manifest: Manifest = serde_json::from_str(&raw)?;

    let mut errors = Vec::new();
    for artifact in &manifest.artifacts {
        let bytes = match fs::read(out_root.join(&artifact.path)) {
            Ok(b) => b,
            Err(e) => {
                errors.push(format!("{}: unreadable ({})", artifact.path, e));
                continue;
            }
        };
        let sha = sha256_hex(&bytes);
        if bytes.len() as u64 != artifact.bytes || sha != artifact.sha256 {
            errors.push(format!(
                "{}: bytes {} vs {}, sha {} vs {}",
                artifact.path,
                bytes.len(),
                artifact.bytes,
                sha,
                artifact.sha256
            ));
        }
    }

    if !errors.is_empty() {
        return Err(MagistrateError::IntegrityViolation(format!(
            "manifest mismatch:\n{}",
            errors.join("\n")
        )));
    }
    Ok(manifest.artifacts.len())
}

fn verify_canon(out_root: &Path) -> Result<usize, MagistrateError> {
    let raw = fs::read_to_string(out_root.join(CANON_INDEX_FILE))?;
    let index: Vec<CanonIndexEntry> = serde_json::from_str(&raw)?;
    let chain = read_chain_file(&out_root.join(CANON_CHAIN_FILE))?;

    if chain.len() != index.len() {
        return Err(MagistrateError::IntegrityViolation(format!(
            "canon chain length mismatch: {} vs {}",
            chain.len(),
            index.len()
        )));
    }

    for (i, entry) in index.iter().enumerate() {
        let payload_raw = fs::read_to_string(out_root.join(&entry.file))?;
        let payload: Value = serde_json::from_str(&payload_raw)?;
        let recomputed = hash_value(&payload);
        if recomputed != entry.hash {
            return Err(MagistrateError::IntegrityViolation(format!(
                "canon hash mismatch for {}: {} vs {}",
                entry.file, recomputed, entry.hash
            )));
        }
        if chain[i] != entry.hash {
            return Err(MagistrateError::IntegrityViolation(format!(
                "canon chain mismatch at {}: {} vs {}",
                i, chain[i], entry.hash
            )));
        }
    }
    Ok(index.len())
}

fn verify_ledger(out_root: &Path) -> Result<usize, MagistrateError> {
    let raw = fs::read_to_string(out_root.join(LEDGER_EXPORT_FILE))?;
    let chain = read_chain_file(&out_root.join(LEDGER_CHAIN_FILE))?;

    let mut prev: Option<String> = None;
    let mut index = 0usize;
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let row: ExportedLedgerLine = serde_json::from_str(line).map_err(|e| {
            MagistrateError::IntegrityViolation(format!(
                "ledger line {} unparsable: {}",
                index + 1,
                e
            ))
        })?;

        if row.prev_hash != prev {
            return Err(MagistrateError::IntegrityViolation(format!(
                "ledger prevHash mismatch at line {}: expected {:?} but got {:?}",
                index + 1,
                prev,
                row.prev_hash
            )));
        }

        let recomputed = chain_hash(prev.as_deref(), &canonical_json(&row.content));
        if recomputed != row.hash {
            return Err(MagistrateError::IntegrityViolation(format!(
                "ledger entry hash mismatch at line {}: {} vs {}",
                index + 1,
                recomputed,
                row.hash
            )));
        }

        if chain.get(index).map(String::as_str) != Some(row.hash.as_str()) {
            return Err(MagistrateError::IntegrityViolation(format!(
                "ledger chain mismatch at index {}: {:?} vs {}",
                index,
                chain.get(index),
                row.hash
            )));
        }

        prev = Some(row.hash);
        index += 1;
    }

    if index != chain.len() {
        return Err(MagistrateError::IntegrityViolation(format!(
            "ledger line count mismatch: read {} lines but chain has {}",
            index,
            chain.len()
        )));
    }
    Ok(index)
}

/// Full offline verification. Any failure means the export is invalid.
pub fn verify_export(out_root: &Path) -> Result<ExportVerifyReport, MagistrateError> {
    let manifest_artifacts = verify_manifest(out_root)?;
    let canon_entries = verify_canon(out_root)?;
    let ledger_entries = verify_ledger(out_root)?;
    Ok(ExportVerifyReport {
        manifest_artifacts,
        canon_entries,
        ledger_entries,
    })
}
