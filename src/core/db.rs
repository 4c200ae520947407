use crate::core::error::MagistrateError;
use rusqlite::Connection;
use std::path::Path;

pub fn db_connect(db_path: &Path) -> Result<Connection, MagistrateError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(MagistrateError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(MagistrateError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(MagistrateError::RusqliteError)?;
    Ok(conn)
}
