use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;

pub mod queries;
pub mod schema;

pub fn init_database(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(db_path)?;

    // Enable WAL mode
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    schema::create_tables(&conn)?;

    Ok(conn)
}

/// Same schema on a throwaway connection, for tests.
pub fn init_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::create_tables(&conn)?;
    Ok(conn)
}
