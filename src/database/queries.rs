use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::models::{
    ActionOutcome, ChatMessage, ChatMessageRecord, ChatSession, CommandRecord, Intent, Mode,
    RecentModel,
};
use crate::utils::text::truncate_at_char_boundary;

const TITLE_MAX_CHARS: usize = 50;

fn parse_text_enum<T: DeserializeOwned>(idx: usize, value: String) -> rusqlite::Result<T> {
    serde_json::from_value(serde_json::Value::String(value)).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ─── Chat sessions ───

pub fn create_session(conn: &Connection) -> Result<ChatSession> {
    let now = Utc::now().timestamp();
    let session = ChatSession {
        id: Uuid::new_v4().to_string(),
        title: "New Chat".to_string(),
        created_at: now,
        updated_at: now,
    };

    conn.execute(
        "INSERT INTO chat_sessions (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
        params![session.id, session.title, session.created_at, session.updated_at],
    )?;

    Ok(session)
}

pub fn get_session(conn: &Connection, session_id: &str) -> Result<Option<ChatSession>> {
    let session = conn
        .query_row(
            "SELECT id, title, created_at, updated_at FROM chat_sessions WHERE id = ?1",
            [session_id],
            |row| {
                Ok(ChatSession {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    created_at: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(session)
}

/// Sessions that have at least one message, most recently updated first.
pub fn list_sessions(conn: &Connection) -> Result<Vec<ChatSession>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.title, s.created_at, s.updated_at
         FROM chat_sessions s
         WHERE EXISTS (SELECT 1 FROM chat_messages m WHERE m.session_id = s.id)
         ORDER BY s.updated_at DESC, s.created_at DESC",
    )?;

    let sessions = stmt
        .query_map([], |row| {
            Ok(ChatSession {
                id: row.get(0)?,
                title: row.get(1)?,
                created_at: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(sessions)
}

pub fn delete_session(conn: &Connection, session_id: &str) -> Result<()> {
    // Delete messages first, then session
    conn.execute("DELETE FROM chat_messages WHERE session_id = ?1", [session_id])?;
    conn.execute("DELETE FROM chat_sessions WHERE id = ?1", [session_id])?;
    Ok(())
}

// ─── Chat messages ───

/// Stores a message; the first user message also becomes the session title.
pub fn insert_message(
    conn: &Connection,
    session_id: &str,
    role: &str,
    content: &str,
) -> Result<i64> {
    let now = Utc::now().timestamp();
    conn.execute(
        "INSERT INTO chat_messages (session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![session_id, role, content, now],
    )?;
    let id = conn.last_insert_rowid();

    let user_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM chat_messages WHERE session_id = ?1 AND role = 'user'",
        [session_id],
        |row| row.get(0),
    )?;

    if role == "user" && user_count == 1 {
        let mut title = truncate_at_char_boundary(content.trim(), TITLE_MAX_CHARS);
        if content.trim().chars().count() > TITLE_MAX_CHARS {
            title.push_str("...");
        }
        conn.execute(
            "UPDATE chat_sessions SET title = ?1, updated_at = ?2 WHERE id = ?3",
            params![title, now, session_id],
        )?;
    } else {
        conn.execute(
            "UPDATE chat_sessions SET updated_at = ?1 WHERE id = ?2",
            params![now, session_id],
        )?;
    }

    Ok(id)
}

pub fn get_messages(conn: &Connection, session_id: &str) -> Result<Vec<ChatMessageRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, role, content, created_at
         FROM chat_messages WHERE session_id = ?1 ORDER BY created_at ASC, id ASC",
    )?;

    let messages = stmt
        .query_map([session_id], |row| {
            Ok(ChatMessageRecord {
                id: row.get(0)?,
                session_id: row.get(1)?,
                role: row.get(2)?,
                content: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(messages)
}

/// The last `limit` turns of a session, oldest first, ready to send to the model.
pub fn recent_context(conn: &Connection, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
    let mut stmt = conn.prepare(
        "SELECT role, content
         FROM chat_messages
         WHERE session_id = ?1
         ORDER BY created_at DESC, id DESC
         LIMIT ?2",
    )?;

    let mut rows = stmt
        .query_map(params![session_id, limit as i64], |row| {
            Ok(ChatMessage {
                role: row.get(0)?,
                content: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.reverse();
    Ok(rows)
}

// ─── Command history ───

pub fn record_command(
    conn: &Connection,
    intent: &Intent,
    mode: Mode,
    outcome: &ActionOutcome,
) -> Result<i64> {
    let parameters = serde_json::to_string(&intent.parameters)?;
    conn.execute(
        "INSERT INTO command_history
            (raw_text, mode, category, parameters, confidence, success, message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            intent.raw_text,
            mode.as_str(),
            intent.category.as_str(),
            parameters,
            intent.confidence.as_str(),
            outcome.success,
            outcome.message,
            Utc::now().timestamp(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Keeps only the newest `keep` rows.
pub fn trim_command_history(conn: &Connection, keep: usize) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM command_history
         WHERE id NOT IN (SELECT id FROM command_history ORDER BY id DESC LIMIT ?1)",
        [keep as i64],
    )?;
    Ok(removed)
}

/// Most recent first.
pub fn get_command_history(conn: &Connection, limit: usize) -> Result<Vec<CommandRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, raw_text, mode, category, parameters, confidence, success, message, created_at
         FROM command_history
         ORDER BY id DESC
         LIMIT ?1",
    )?;

    let records = stmt
        .query_map([limit as i64], |row| {
            let parameters: Option<String> = row.get(4)?;
            Ok(CommandRecord {
                id: row.get(0)?,
                raw_text: row.get(1)?,
                mode: parse_text_enum(2, row.get(2)?)?,
                category: parse_text_enum(3, row.get(3)?)?,
                parameters: parameters
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or_default(),
                confidence: parse_text_enum(5, row.get(5)?)?,
                success: row.get(6)?,
                message: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                created_at: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

pub fn clear_command_history(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM command_history", [])?;
    Ok(())
}

// ─── Model usage ───

/// Bumps the use count for `model_id`, creating the row on first use.
pub fn touch_model_usage(conn: &Connection, model_id: &str, increment: bool) -> Result<()> {
    let model_id = model_id.trim();
    if model_id.is_empty() {
        return Ok(());
    }
    conn.execute(
        "INSERT INTO ai_model_usage (model_id, model_name, use_count, last_used)
         VALUES (?1, ?1, ?2, ?3)
         ON CONFLICT(model_id) DO UPDATE SET
            use_count = ai_model_usage.use_count + excluded.use_count,
            last_used = excluded.last_used",
        params![model_id, increment as i32, Utc::now().timestamp()],
    )?;
    Ok(())
}

pub fn recent_models(conn: &Connection, limit: usize) -> Result<Vec<RecentModel>> {
    let mut stmt = conn.prepare(
        "SELECT model_id, model_name, use_count, last_used
         FROM ai_model_usage
         ORDER BY last_used DESC, use_count DESC
         LIMIT ?1",
    )?;

    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok(RecentModel {
                id: row.get(0)?,
                name: row.get(1)?,
                use_count: row.get(2)?,
                last_used: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn remove_recent_model(conn: &Connection, model_id: &str) -> Result<()> {
    conn.execute("DELETE FROM ai_model_usage WHERE model_id = ?1", [model_id])?;
    Ok(())
}
