use super::AppContext;
use crate::database::queries;
use crate::models::{ChatMessageRecord, ChatSession, RecentModel};
use crate::services::ollama::{fallback_reply, OllamaClient};

pub async fn create_chat_session(ctx: &AppContext) -> Result<ChatSession, String> {
    let conn = ctx.open_db()?;
    queries::create_session(&conn).map_err(|e| e.to_string())
}

pub async fn get_chat_sessions(ctx: &AppContext) -> Result<Vec<ChatSession>, String> {
    let conn = ctx.open_db()?;
    queries::list_sessions(&conn).map_err(|e| e.to_string())
}

pub async fn delete_chat_session(ctx: &AppContext, session_id: String) -> Result<(), String> {
    let conn = ctx.open_db()?;
    queries::delete_session(&conn, &session_id).map_err(|e| e.to_string())
}

pub async fn get_chat_messages(
    ctx: &AppContext,
    session_id: String,
) -> Result<Vec<ChatMessageRecord>, String> {
    let conn = ctx.open_db()?;
    queries::get_messages(&conn, &session_id).map_err(|e| e.to_string())
}

/// Sends one chat turn in `session_id`, optionally with a different model
/// than the configured one, and returns the stored assistant message.
pub async fn send_chat_message(
    ctx: &AppContext,
    session_id: String,
    message: String,
    model: Option<String>,
) -> Result<ChatMessageRecord, String> {
    if message.trim().is_empty() {
        return Err("Message is empty".to_string());
    }

    let mut settings = ctx.load_settings()?;
    if let Some(model_id) = model.as_ref().map(|m| m.trim()).filter(|m| !m.is_empty()) {
        settings.ai.model = model_id.to_string();
    }

    // 1. Load recent chat context (before inserting this message)
    let conn = ctx.open_db()?;
    if queries::get_session(&conn, &session_id).map_err(|e| e.to_string())?.is_none() {
        return Err(format!("No chat session with id {}", session_id));
    }
    let context = queries::recent_context(&conn, &session_id, settings.ai.history_turns)
        .map_err(|e| e.to_string())?;

    // 2. Store user message
    queries::insert_message(&conn, &session_id, "user", &message).map_err(|e| e.to_string())?;

    // 3. Ask the model
    let answer = if settings.ai.enabled {
        let client = OllamaClient::new(&settings.ai);
        match client.chat(&context, &message).await {
            Ok(reply) => {
                // Track recently used model for quick selection.
                let _ = queries::touch_model_usage(&conn, &settings.ai.model, true);
                reply
            }
            Err(e) => {
                log::warn!("[Ollama] chat failed, using offline reply: {}", e);
                fallback_reply(&message)
            }
        }
    } else {
        fallback_reply(&message)
    };

    // 4. Store assistant message
    queries::insert_message(&conn, &session_id, "assistant", &answer).map_err(|e| e.to_string())?;
    queries::get_messages(&conn, &session_id)
        .map_err(|e| e.to_string())?
        .pop()
        .ok_or_else(|| "Assistant message was not stored".to_string())
}

pub async fn get_recent_models(
    ctx: &AppContext,
    limit: Option<i32>,
) -> Result<Vec<RecentModel>, String> {
    let conn = ctx.open_db()?;
    let row_limit = limit.unwrap_or(5).clamp(1, 20) as usize;
    queries::recent_models(&conn, row_limit).map_err(|e| e.to_string())
}

pub async fn remove_recent_model(ctx: &AppContext, model_id: String) -> Result<(), String> {
    let conn = ctx.open_db()?;
    queries::remove_recent_model(&conn, &model_id).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::config;

    fn offline_ctx(dir: &std::path::Path) -> AppContext {
        let mut settings = crate::models::Settings::default();
        settings.ai.enabled = false;
        config::save_settings(dir, &settings).unwrap();
        AppContext::new(dir)
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = offline_ctx(dir.path());

        let session = create_chat_session(&ctx).await.unwrap();
        assert!(get_chat_sessions(&ctx).await.unwrap().is_empty());

        let reply = send_chat_message(&ctx, session.id.clone(), "hello there".to_string(), None)
            .await
            .unwrap();
        assert_eq!(reply.role, "assistant");
        assert!(reply.content.contains("JARIS"));

        let sessions = get_chat_sessions(&ctx).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].title, "hello there");
        assert_eq!(get_chat_messages(&ctx, session.id.clone()).await.unwrap().len(), 2);

        delete_chat_session(&ctx, session.id.clone()).await.unwrap();
        assert!(get_chat_sessions(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_to_unknown_session() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = offline_ctx(dir.path());
        let err = send_chat_message(&ctx, "nope".to_string(), "hi".to_string(), None)
            .await
            .unwrap_err();
        assert!(err.contains("nope"));
    }
}
