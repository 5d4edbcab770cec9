use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Structured classification of one user utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub category: IntentCategory,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    pub raw_text: String,
    pub confidence: Confidence,
}

impl Intent {
    /// The universal fallback: hand the utterance to the chat model.
    pub fn fallback(raw_text: &str) -> Self {
        Self {
            category: IntentCategory::AiChat,
            parameters: BTreeMap::new(),
            raw_text: raw_text.to_string(),
            confidence: Confidence::Fallback,
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn is_chat(&self) -> bool {
        self.category == IntentCategory::AiChat
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    LaunchApp,
    CloseApp,
    FileCreate,
    FolderCreate,
    FileList,
    Navigate,
    ShellExecute,
    SystemVolume,
    SystemPower,
    MediaControl,
    WindowControl,
    WebSearch,
    WebOpen,
    Screenshot,
    AiChat,
}

impl IntentCategory {
    pub const ALL: [IntentCategory; 15] = [
        IntentCategory::LaunchApp,
        IntentCategory::CloseApp,
        IntentCategory::FileCreate,
        IntentCategory::FolderCreate,
        IntentCategory::FileList,
        IntentCategory::Navigate,
        IntentCategory::ShellExecute,
        IntentCategory::SystemVolume,
        IntentCategory::SystemPower,
        IntentCategory::MediaControl,
        IntentCategory::WindowControl,
        IntentCategory::WebSearch,
        IntentCategory::WebOpen,
        IntentCategory::Screenshot,
        IntentCategory::AiChat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentCategory::LaunchApp => "launch_app",
            IntentCategory::CloseApp => "close_app",
            IntentCategory::FileCreate => "file_create",
            IntentCategory::FolderCreate => "folder_create",
            IntentCategory::FileList => "file_list",
            IntentCategory::Navigate => "navigate",
            IntentCategory::ShellExecute => "shell_execute",
            IntentCategory::SystemVolume => "system_volume",
            IntentCategory::SystemPower => "system_power",
            IntentCategory::MediaControl => "media_control",
            IntentCategory::WindowControl => "window_control",
            IntentCategory::WebSearch => "web_search",
            IntentCategory::WebOpen => "web_open",
            IntentCategory::Screenshot => "screenshot",
            IntentCategory::AiChat => "ai_chat",
        }
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// A catalog template matched fully.
    Exact,
    /// Nothing matched; routed to `ai_chat`.
    Fallback,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Exact => "exact",
            Confidence::Fallback => "fallback",
        }
    }
}

/// UI toggle deciding whether pattern matching runs at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Chat,
    PcControl,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Chat => "chat",
            Mode::PcControl => "pc_control",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chat" | "ai" => Ok(Mode::Chat),
            "pc_control" | "pc-control" | "pc" => Ok(Mode::PcControl),
            other => Err(format!("unknown mode '{}' (expected chat or pc_control)", other)),
        }
    }
}
