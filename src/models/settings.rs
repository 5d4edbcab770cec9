use serde::{Deserialize, Serialize};

use super::Mode;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.2:latest";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub version: String,
    pub general: GeneralSettings,
    pub ai: AISettings,
    pub control: ControlSettings,
    pub storage: StorageSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            general: GeneralSettings::default(),
            ai: AISettings::default(),
            control: ControlSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub assistant_name: String,
    pub default_mode: Mode,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            assistant_name: "JARIS".to_string(),
            default_mode: Mode::Chat,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AISettings {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub stream: bool,
    pub timeout_secs: u64,
    /// Prior user/assistant messages sent along with each request.
    pub history_turns: usize,
    pub system_prompt: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_history_turns() -> usize {
    10
}

impl Default for AISettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            stream: false,
            timeout_secs: default_timeout_secs(),
            history_turns: default_history_turns(),
            system_prompt: "You are JARIS, a helpful desktop assistant running on the user's own computer. \
                You are friendly, concise and precise. Keep answers brief unless asked for detail."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    pub allow_shell: bool,
    pub shell_timeout_secs: u64,
    /// Shutdown/restart/sleep/lock only run when this is set.
    pub allow_power_actions: bool,
    pub screenshot_dir: Option<String>,
    /// JSON catalog replacing the built-in command patterns.
    pub catalog_path: Option<String>,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            allow_shell: true,
            shell_timeout_secs: 30,
            allow_power_actions: false,
            screenshot_dir: None,
            catalog_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub max_command_history: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            max_command_history: 100,
        }
    }
}
