use anyhow::Result;
use rusqlite::Connection;

pub fn create_tables(conn: &Connection) -> Result<()> {
    // Chat sessions
    conn.execute(
        "CREATE TABLE IF NOT EXISTS chat_sessions (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        [],
    )?;

    // Chat messages
    conn.execute(
        "CREATE TABLE IF NOT EXISTS chat_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (session_id) REFERENCES chat_sessions(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_chat_messages_session ON chat_messages(session_id, created_at)",
        [],
    )?;

    // Command history
    conn.execute(
        "CREATE TABLE IF NOT EXISTS command_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            raw_text TEXT NOT NULL,
            mode TEXT NOT NULL,
            category TEXT NOT NULL,
            parameters TEXT,
            confidence TEXT NOT NULL,
            success INTEGER NOT NULL,
            message TEXT,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;

    // Recently used chat models
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ai_model_usage (
            model_id TEXT PRIMARY KEY,
            model_name TEXT NOT NULL,
            use_count INTEGER NOT NULL DEFAULT 0,
            last_used INTEGER NOT NULL
        )",
        [],
    )?;

    Ok(())
}
