use magistrate::core::hash::{chain_hash, hash_value};
use magistrate::core::ledger::{DecisionLedger, LedgerFilter};
use magistrate::core::store::Store;
use serde_json::json;
use std::fs;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

fn open_store(root: &std::path::Path) -> Store {
    Store::at(root.join("data")).expect("store")
}

#[test]
fn append_links_each_entry_to_the_prior_head() {
    let tmp = tempdir().unwrap();
    let store = open_store(tmp.path());
    let ledger = DecisionLedger::open_sqlite(&store).unwrap();

    let first = ledger
        .append(&json!({"type": "execution", "intent": "a", "decision": "ALLOW"}))
        .unwrap();
    assert!(first.prev_hash.is_none());
    assert!(!first.hash.is_empty());

    let second = ledger
        .append(&json!({"type": "execution", "intent": "b", "decision": "ALLOW"}))
        .unwrap();
    assert_eq!(second.prev_hash.as_deref(), Some(first.hash.as_str()));
    assert_eq!(
        second.hash,
        chain_hash(Some(&first.hash), &second.content)
    );
}

#[test]
fn verify_chain_passes_on_untampered_ledger() {
    let tmp = tempdir().unwrap();
    let store = open_store(tmp.path());
    let ledger = DecisionLedger::open_sqlite(&store).unwrap();

    for i in 0..5 {
        ledger
            .append(&json!({"type": "execution", "intent": format!("intent {}", i)}))
            .unwrap();
    }

    let report = ledger.verify_chain(100).unwrap();
    assert!(report.ok);
    assert_eq!(report.count, 5);
    assert!(report.head.is_some());
    assert!(report.tail.is_some());
    assert_ne!(report.head, report.tail);
}

#[test]
fn tampering_with_stored_content_fails_at_that_exact_index() {
    let tmp = tempdir().unwrap();
    let store = open_store(tmp.path());
    let ledger = DecisionLedger::open_file(&store).unwrap();

    for i in 0..4 {
        ledger
            .append(&json!({"type": "execution", "intent": format!("intent {}", i)}))
            .unwrap();
    }

    // Flip one byte of entry 2's content on disk.
    let path = store.ledger_file_path();
    let raw = fs::read_to_string(&path).unwrap();
    let lines: Vec<String> = raw
        .lines()
        .enumerate()
        .map(|(i, l)| {
            if i == 2 {
                l.replace("intent 2", "intent X")
            } else {
                l.to_string()
            }
        })
        .collect();
    fs::write(&path, format!("{}\n", lines.join("\n"))).unwrap();

    let report = ledger.verify_chain(100).unwrap();
    assert!(!report.ok);
    let fault = report.fault.expect("fault");
    assert_eq!(fault.index, 2);
    assert!(!fault.hash_ok);
    assert_ne!(fault.expected_hash, fault.hash);
}

#[test]
fn tampering_with_a_hash_breaks_the_link_for_the_successor() {
    let tmp = tempdir().unwrap();
    let store = open_store(tmp.path());
    let ledger = DecisionLedger::open_file(&store).unwrap();

    let mut hashes = Vec::new();
    for i in 0..3 {
        hashes.push(
            ledger
                .append(&json!({"type": "execution", "intent": format!("intent {}", i)}))
                .unwrap()
                .hash,
        );
    }

    let path = store.ledger_file_path();
    let raw = fs::read_to_string(&path).unwrap();
    let tampered = raw.replace(&hashes[1], &"0".repeat(64));
    fs::write(&path, tampered).unwrap();

    let report = ledger.verify_chain(100).unwrap();
    assert!(!report.ok);
    // Entry 1's own hash no longer matches its content.
    assert_eq!(report.fault.unwrap().index, 1);
}

#[test]
fn concurrent_appends_never_fork_the_chain() {
    let tmp = tempdir().unwrap();
    let store = open_store(tmp.path());
    let ledger = Arc::new(DecisionLedger::open_sqlite(&store).unwrap());

    let mut handles = Vec::new();
    for t in 0..8 {
        let ledger = Arc::clone(&ledger);
        handles.push(thread::spawn(move || {
            for i in 0..5 {
                ledger
                    .append(&json!({"type": "execution", "intent": format!("t{} i{}", t, i)}))
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let report = ledger.verify_chain(1000).unwrap();
    assert!(report.ok, "forked chain: {:?}", report.fault);
    assert_eq!(report.count, 40);
}

#[test]
fn file_backend_read_skips_unparsable_lines() {
    let tmp = tempdir().unwrap();
    let store = open_store(tmp.path());
    let ledger = DecisionLedger::open_file(&store).unwrap();

    ledger.append(&json!({"type": "execution", "intent": "a"})).unwrap();
    ledger.append(&json!({"type": "deny", "intent": "b"})).unwrap();

    let path = store.ledger_file_path();
    let mut raw = fs::read_to_string(&path).unwrap();
    raw.push_str("this is not json\n");
    fs::write(&path, raw).unwrap();

    let all = ledger.read(&LedgerFilter::default(), 100).unwrap();
    assert_eq!(all.len(), 2);

    let denies = ledger
        .read(
            &LedgerFilter {
                entry_type: Some("deny".to_string()),
                ..LedgerFilter::default()
            },
            100,
        )
        .unwrap();
    assert_eq!(denies.len(), 1);
    assert_eq!(denies[0].intent.as_deref(), Some("b"));
}

#[test]
fn key_order_never_changes_an_entry_hash() {
    let tmp = tempdir().unwrap();
    let store = open_store(tmp.path());
    let ledger = DecisionLedger::open_sqlite(&store).unwrap();

    let entry = ledger
        .append(&json!({"b": 2, "a": 1, "type": "execution"}))
        .unwrap();
    let reordered = json!({"type": "execution", "a": 1, "b": 2});
    assert_eq!(
        entry.hash,
        chain_hash(None, &magistrate::core::hash::canonical_json(&reordered))
    );
    assert_eq!(hash_value(&reordered), hash_value(&json!({"a":1,"b":2,"type":"execution"})));
}

#[test]
fn read_limit_keeps_the_most_recent_entries() {
    let tmp = tempdir().unwrap();
    let store = open_store(tmp.path());
    let ledger = DecisionLedger::open_sqlite(&store).unwrap();

    for i in 0..5 {
        ledger
            .append(&json!({"type": "execution", "intent": format!("intent {}", i)}))
            .unwrap();
    }

    let entries = ledger.read(&LedgerFilter::default(), 2).unwrap();
    assert_eq!(entries.len(), 2);
    let intents: Vec<String> = entries
        .iter()
        .map(|e| {
            let content: serde_json::Value = serde_json::from_str(&e.content).unwrap();
            content["intent"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(intents, vec!["intent 3", "intent 4"]);
}
