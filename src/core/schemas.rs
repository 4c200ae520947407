//! SQL schema constants. Subsystems own their schemas and initialization.

pub const LEDGER_DB_NAME: &str = "ledger.db";

pub const LEDGER_DB_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS ledger_entries (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    entry_type TEXT NOT NULL,
    intent TEXT,
    decision TEXT,
    rationale TEXT,
    actor TEXT,
    system_initiated INTEGER,
    execution_id TEXT,
    session_id TEXT,
    content TEXT NOT NULL,
    prev_hash TEXT,
    hash TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);
";

pub const CANON_DB_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS canon_entries (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    ledger_hash TEXT NOT NULL,
    promoted_at TEXT NOT NULL
);
";
