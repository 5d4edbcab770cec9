use std::path::Path;

use super::AppContext;
use crate::database::queries;
use crate::models::{ActionOutcome, Intent, Mode};
use crate::services::catalog::resolve_catalog;
use crate::services::executor::ActionExecutor;
use crate::services::interpreter::CommandInterpreter;

/// Classifies `input` without performing anything. `mode` defaults to the
/// configured startup mode.
pub async fn parse_intent(
    ctx: &AppContext,
    input: String,
    mode: Option<Mode>,
) -> Result<Intent, String> {
    if input.trim().is_empty() {
        return Err("Input is empty".to_string());
    }
    let settings = ctx.load_settings()?;
    let mode = mode.unwrap_or(settings.general.default_mode);
    let catalog = resolve_catalog(settings.control.catalog_path.as_deref().map(Path::new));
    Ok(CommandInterpreter::new(catalog).interpret(&input, mode))
}

/// Performs a previously parsed intent and records it in command history.
pub async fn execute_intent(ctx: &AppContext, intent: Intent) -> Result<ActionOutcome, String> {
    if intent.is_chat() {
        return Err("Chat messages go through send_chat_message".to_string());
    }
    let settings = ctx.load_settings()?;
    let mut executor = match ctx.working_dir() {
        Some(dir) => ActionExecutor::with_working_dir(settings.control.clone(), dir),
        None => ActionExecutor::new(settings.control.clone()),
    };
    let outcome = executor.execute(&intent).await;
    ctx.set_working_dir(executor.working_dir());

    let conn = ctx.open_db()?;
    queries::record_command(&conn, &intent, Mode::PcControl, &outcome).map_err(|e| e.to_string())?;
    queries::trim_command_history(&conn, settings.storage.max_command_history)
        .map_err(|e| e.to_string())?;

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, IntentCategory};

    #[tokio::test]
    async fn test_parse_intent_uses_mode() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::new(dir.path());

        let chat = parse_intent(&ctx, "open chrome".to_string(), None).await.unwrap();
        assert_eq!(chat.category, IntentCategory::AiChat);

        let pc = parse_intent(&ctx, "open chrome".to_string(), Some(Mode::PcControl))
            .await
            .unwrap();
        assert_eq!(pc.category, IntentCategory::LaunchApp);
        assert_eq!(pc.param("app"), Some("chrome"));
        assert_eq!(pc.confidence, Confidence::Exact);

        assert!(parse_intent(&ctx, "  ".to_string(), None).await.is_err());
    }

    #[tokio::test]
    async fn test_execute_intent_records_history() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::new(dir.path().join("data"));
        let target = dir.path().join("listing");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("a.txt"), "").unwrap();

        let input = format!("list files in {}", target.display());
        let intent = parse_intent(&ctx, input, Some(Mode::PcControl)).await.unwrap();
        assert_eq!(intent.category, IntentCategory::FileList);

        let outcome = execute_intent(&ctx, intent).await.unwrap();
        assert!(outcome.success, "{}", outcome.message);

        let conn = ctx.open_db().unwrap();
        let history = queries::get_command_history(&conn, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].category, IntentCategory::FileList);

        assert!(execute_intent(&ctx, Intent::fallback("hi")).await.is_err());
    }

    #[tokio::test]
    async fn test_navigate_carries_over_to_next_command() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::new(dir.path().join("data"));
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("notes.txt"), "").unwrap();

        let go = parse_intent(&ctx, format!("navigate to {}", sub.display()), Some(Mode::PcControl))
            .await
            .unwrap();
        assert_eq!(go.category, IntentCategory::Navigate);
        let outcome = execute_intent(&ctx, go).await.unwrap();
        assert!(outcome.success, "{}", outcome.message);
        let sub = sub.canonicalize().unwrap();
        assert_eq!(ctx.working_dir(), Some(sub.clone()));

        let list = parse_intent(&ctx, "list files".to_string(), Some(Mode::PcControl))
            .await
            .unwrap();
        let outcome = execute_intent(&ctx, list).await.unwrap();
        let data = outcome.data.unwrap();
        assert_eq!(data["path"], sub.display().to_string());
        assert_eq!(data["files"], serde_json::json!(["notes.txt"]));

        let created = parse_intent(&ctx, "create folder Drafts".to_string(), Some(Mode::PcControl))
            .await
            .unwrap();
        assert!(execute_intent(&ctx, created).await.unwrap().success);
        assert!(sub.join("Drafts").is_dir());
    }
}
