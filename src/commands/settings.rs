use serde::{Deserialize, Serialize};

use super::AppContext;
use crate::database::queries;
use crate::models::Settings;
use crate::services::ollama::OllamaClient;
use crate::utils::config;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
}

pub async fn get_settings(ctx: &AppContext) -> Result<Settings, String> {
    ctx.load_settings()
}

pub async fn update_settings(ctx: &AppContext, settings: Settings) -> Result<(), String> {
    config::save_settings(ctx.data_dir(), &settings).map_err(|e| e.to_string())?;

    // Keep selected settings model visible in "recent models" so chat can use it immediately.
    let model_id = settings.ai.model.trim();
    if !model_id.is_empty() {
        let conn = ctx.open_db()?;
        let _ = queries::touch_model_usage(&conn, model_id, false);
    }

    Ok(())
}

/// Models installed on the configured Ollama server.
pub async fn get_ollama_models(ctx: &AppContext) -> Result<Vec<ModelInfo>, String> {
    let settings = ctx.load_settings()?;
    let client = OllamaClient::new(&settings.ai);
    let names = client
        .list_models()
        .await
        .map_err(|e| format!("Failed to fetch models from {}: {}", client.base_url(), e))?;

    Ok(names
        .into_iter()
        .map(|name| ModelInfo { id: name.clone(), name })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::chat::get_recent_models;
    use crate::models::Mode;

    #[tokio::test]
    async fn test_update_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::new(dir.path());

        let mut settings = get_settings(&ctx).await.unwrap();
        settings.general.default_mode = Mode::PcControl;
        settings.ai.model = "mistral:7b".to_string();
        update_settings(&ctx, settings).await.unwrap();

        let loaded = get_settings(&ctx).await.unwrap();
        assert_eq!(loaded.general.default_mode, Mode::PcControl);

        let recent = get_recent_models(&ctx, None).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "mistral:7b");
        assert_eq!(recent[0].use_count, 0);
    }
}
