use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::models::Settings;

const ENV_OLLAMA_URL: &str = "OLLAMA_URL";
const ENV_OLLAMA_MODEL: &str = "OLLAMA_MODEL";
const ENV_DATA_DIR: &str = "JARIS_DATA_DIR";

pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// `$JARIS_DATA_DIR`, else the platform data dir, else `./.jaris`.
pub fn default_data_dir() -> PathBuf {
    if let Some(dir) = env_value(ENV_DATA_DIR) {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .map(|d| d.join("jaris"))
        .unwrap_or_else(|| PathBuf::from(".jaris"))
}

pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config").join("settings.json")
}

pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join("jaris.db")
}

pub fn apply_overrides(settings: &mut Settings, base_url: Option<String>, model: Option<String>) {
    if let Some(url) = base_url {
        settings.ai.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(model) = model {
        settings.ai.model = model;
    }
}

pub fn apply_env_overrides(settings: &mut Settings) {
    apply_overrides(settings, env_value(ENV_OLLAMA_URL), env_value(ENV_OLLAMA_MODEL));
}

/// Reads `config/settings.json`; a missing file yields defaults.
pub fn load_settings(data_dir: &Path) -> Result<Settings> {
    let path = settings_path(data_dir);
    let mut settings = if path.exists() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?
    } else {
        Settings::default()
    };
    apply_env_overrides(&mut settings);
    Ok(settings)
}

pub fn save_settings(data_dir: &Path, settings: &Settings) -> Result<()> {
    let path = settings_path(data_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(&path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Mode;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(dir.path()).unwrap();
        assert_eq!(settings.general.default_mode, Mode::Chat);
        assert!(!settings.control.allow_power_actions);
        assert_eq!(settings.storage.max_command_history, 100);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.general.default_mode = Mode::PcControl;
        settings.control.allow_shell = false;
        settings.control.catalog_path = Some("/etc/jaris/patterns.json".to_string());
        save_settings(dir.path(), &settings).unwrap();

        assert!(settings_path(dir.path()).exists());
        let loaded = load_settings(dir.path()).unwrap();
        assert_eq!(loaded.general.default_mode, Mode::PcControl);
        assert!(!loaded.control.allow_shell);
        assert_eq!(
            loaded.control.catalog_path.as_deref(),
            Some("/etc/jaris/patterns.json")
        );
    }

    #[test]
    fn test_partial_file_fills_missing_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = settings_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{ "version": "1.0.0" }"#).unwrap();

        let loaded = load_settings(dir.path()).unwrap();
        assert!(loaded.ai.enabled);
        assert_eq!(loaded.control.shell_timeout_secs, 30);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = settings_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{").unwrap();
        assert!(load_settings(dir.path()).is_err());
    }

    #[test]
    fn test_overrides() {
        let mut settings = Settings::default();
        apply_overrides(
            &mut settings,
            Some("http://gpu-box:11434/".to_string()),
            Some("mistral".to_string()),
        );
        assert_eq!(settings.ai.base_url, "http://gpu-box:11434");
        assert_eq!(settings.ai.model, "mistral");

        let before = settings.clone();
        apply_overrides(&mut settings, None, None);
        assert_eq!(settings.ai.base_url, before.ai.base_url);
    }
}
