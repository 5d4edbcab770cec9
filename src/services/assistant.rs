use anyhow::{bail, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;

use crate::database::{self, queries};
use crate::models::{ActionOutcome, ChatSession, Intent, Mode, Settings};
use crate::services::catalog::resolve_catalog;
use crate::services::executor::ActionExecutor;
use crate::services::interpreter::CommandInterpreter;
use crate::services::ollama::{fallback_reply, OllamaClient};
use crate::utils::config;

/// What came of one utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantReply {
    pub intent: Intent,
    pub outcome: ActionOutcome,
    /// True when the reply text was already delivered through the token callback.
    #[serde(default)]
    pub streamed: bool,
}

/// Ties interpreter, executor and chat model together for one user.
pub struct Assistant {
    settings: Settings,
    interpreter: CommandInterpreter,
    executor: ActionExecutor,
    ollama: OllamaClient,
    conn: Connection,
    mode: Mode,
    session_id: Option<String>,
}

impl Assistant {
    /// Opens (or creates) the database under `data_dir` and loads the catalog
    /// named in settings.
    pub fn open(data_dir: &Path, settings: Settings) -> Result<Self> {
        let conn = database::init_database(&config::database_path(data_dir))?;
        let catalog = resolve_catalog(settings.control.catalog_path.as_deref().map(Path::new));
        let interpreter = CommandInterpreter::new(catalog);
        let executor = ActionExecutor::new(settings.control.clone());
        Ok(Self::from_parts(settings, interpreter, executor, conn))
    }

    pub fn from_parts(
        settings: Settings,
        interpreter: CommandInterpreter,
        executor: ActionExecutor,
        conn: Connection,
    ) -> Self {
        let ollama = OllamaClient::new(&settings.ai);
        let mode = settings.general.default_mode;
        Self {
            settings,
            interpreter,
            executor,
            ollama,
            conn,
            mode,
            session_id: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        log::info!("[Assistant] mode -> {}", mode);
        self.mode = mode;
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn interpreter(&self) -> &CommandInterpreter {
        &self.interpreter
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    pub fn ollama(&self) -> &OllamaClient {
        &self.ollama
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn set_model(&mut self, model: &str) {
        self.settings.ai.model = model.trim().to_string();
        self.ollama.set_model(model.trim());
    }

    pub fn new_session(&mut self) -> Result<ChatSession> {
        let session = queries::create_session(&self.conn)?;
        self.session_id = Some(session.id.clone());
        Ok(session)
    }

    /// Continues an existing conversation.
    pub fn resume_session(&mut self, session_id: &str) -> Result<ChatSession> {
        match queries::get_session(&self.conn, session_id)? {
            Some(session) => {
                self.session_id = Some(session.id.clone());
                Ok(session)
            }
            None => bail!("No chat session with id {}", session_id),
        }
    }

    pub async fn handle(&mut self, text: &str) -> Result<AssistantReply> {
        self.handle_with(text, |_| {}).await
    }

    /// Like [`handle`](Self::handle), but streams chat tokens to `on_token`
    /// when streaming is enabled in settings.
    pub async fn handle_with<F>(&mut self, text: &str, on_token: F) -> Result<AssistantReply>
    where
        F: FnMut(&str),
    {
        if text.trim().is_empty() {
            bail!("Please type a command or a message");
        }

        let intent = self.interpreter.interpret(text, self.mode);
        log::debug!(
            "[Assistant] '{}' -> {} ({})",
            intent.raw_text,
            intent.category,
            intent.confidence.as_str()
        );

        let (outcome, streamed) = if intent.is_chat() {
            self.chat(&intent.raw_text, on_token).await?
        } else {
            (self.executor.execute(&intent).await, false)
        };

        queries::record_command(&self.conn, &intent, self.mode, &outcome)?;
        queries::trim_command_history(&self.conn, self.settings.storage.max_command_history)?;

        Ok(AssistantReply { intent, outcome, streamed })
    }

    async fn chat<F>(&mut self, text: &str, on_token: F) -> Result<(ActionOutcome, bool)>
    where
        F: FnMut(&str),
    {
        let session_id = match self.session_id.clone() {
            Some(id) => id,
            None => self.new_session()?.id,
        };

        let context = queries::recent_context(&self.conn, &session_id, self.settings.ai.history_turns)?;
        queries::insert_message(&self.conn, &session_id, "user", text)?;

        let (reply, offline, streamed) = if !self.settings.ai.enabled {
            (fallback_reply(text), true, false)
        } else {
            let result = if self.settings.ai.stream {
                self.ollama.chat_stream(&context, text, on_token).await
            } else {
                self.ollama.chat(&context, text).await
            };
            match result {
                Ok(reply) => {
                    queries::touch_model_usage(&self.conn, self.ollama.model(), true)?;
                    (reply, false, self.settings.ai.stream)
                }
                Err(e) => {
                    log::warn!("[Ollama] chat failed, using offline reply: {}", e);
                    (fallback_reply(text), true, false)
                }
            }
        };

        queries::insert_message(&self.conn, &session_id, "assistant", &reply)?;

        let outcome = ActionOutcome::ok(reply).with_data(json!({
            "session_id": session_id,
            "model": self.ollama.model(),
            "offline": offline,
        }));
        Ok((outcome, streamed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IntentCategory;

    fn offline_assistant(dir: &Path) -> Assistant {
        let mut settings = Settings::default();
        settings.ai.enabled = false;
        settings.storage.max_command_history = 3;
        let executor = ActionExecutor::with_working_dir(settings.control.clone(), dir);
        let conn = database::init_in_memory().unwrap();
        Assistant::from_parts(settings, CommandInterpreter::builtin(), executor, conn)
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut assistant = offline_assistant(dir.path());
        assert!(assistant.handle("   ").await.is_err());
        assert!(queries::get_command_history(assistant.connection(), 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chat_mode_stores_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let mut assistant = offline_assistant(dir.path());
        assert_eq!(assistant.mode(), Mode::Chat);

        let reply = assistant.handle("create folder MyProject").await.unwrap();
        assert_eq!(reply.intent.category, IntentCategory::AiChat);
        assert!(reply.outcome.success);
        assert_eq!(reply.outcome.data.as_ref().unwrap()["offline"], true);
        assert!(!dir.path().join("MyProject").exists());

        let session_id = assistant.session_id().unwrap().to_string();
        let messages = queries::get_messages(assistant.connection(), &session_id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "create folder MyProject");
        assert_eq!(messages[1].role, "assistant");
    }

    #[tokio::test]
    async fn test_pc_control_executes_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut assistant = offline_assistant(dir.path());
        assistant.set_mode(Mode::PcControl);

        let reply = assistant.handle("create folder MyProject").await.unwrap();
        assert_eq!(reply.intent.category, IntentCategory::FolderCreate);
        assert!(reply.outcome.success, "{}", reply.outcome.message);
        assert!(dir.path().join("MyProject").is_dir());
        assert!(assistant.session_id().is_none());

        let history = queries::get_command_history(assistant.connection(), 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].category, IntentCategory::FolderCreate);
        assert_eq!(history[0].mode, Mode::PcControl);
    }

    #[tokio::test]
    async fn test_unmatched_pc_control_falls_back_to_chat() {
        let dir = tempfile::tempdir().unwrap();
        let mut assistant = offline_assistant(dir.path());
        assistant.set_mode(Mode::PcControl);

        let reply = assistant.handle("what's the weather like?").await.unwrap();
        assert!(reply.intent.is_chat());
        assert!(reply.outcome.message.contains("weather"));
        assert!(assistant.session_id().is_some());
    }

    #[tokio::test]
    async fn test_history_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let mut assistant = offline_assistant(dir.path());
        for i in 0..5 {
            assistant.handle(&format!("message {}", i)).await.unwrap();
        }
        let history = queries::get_command_history(assistant.connection(), 10).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].raw_text, "message 4");
    }

    #[tokio::test]
    async fn test_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let mut assistant = offline_assistant(dir.path());
        let first = assistant.new_session().unwrap();
        assistant.handle("hello").await.unwrap();
        let second = assistant.new_session().unwrap();
        assert_ne!(first.id, second.id);

        assistant.resume_session(&first.id).unwrap();
        assert_eq!(assistant.session_id(), Some(first.id.as_str()));
        assert!(assistant.resume_session("missing").is_err());
    }
}
