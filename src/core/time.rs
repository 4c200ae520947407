//! Shared timestamp and id helpers for ledger entries and event envelopes.

use chrono::{SecondsFormat, Utc};
use ulid::Ulid;

/// Returns the current time as an RFC3339 string with millisecond precision,
/// e.g. `2026-08-26T14:03:07.512Z`. This is the wire format for every
/// `created_at` / `timestamp` field in the ledger and event log.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn new_id() -> String {
    Ulid::new().to_string()
}

/// Execution ids are ULIDs with a short prefix so they read distinctly in
/// branch names and event traces.
pub fn new_execution_id() -> String {
    format!("exec-{}", Ulid::new().to_string().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_rfc3339_parses_back() {
        let ts = now_rfc3339();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn test_new_id_is_unique_ulid() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
        assert!(Ulid::from_string(&a).is_ok());
    }

    #[test]
    fn test_execution_id_prefix() {
        assert!(new_execution_id().starts_with("exec-"));
    }
}
