use anyhow::{anyhow, Result};
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::{AISettings, ChatMessage};

const HEALTH_TIMEOUT_SECS: u64 = 5;

// ─── Ollama API types ───

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

/// Client for a local Ollama server.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    system_prompt: String,
    history_turns: usize,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(settings: &AISettings) -> Self {
        let timeout = Duration::from_secs(settings.timeout_secs.max(1));
        Self {
            client: Client::builder()
                .connect_timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            system_prompt: settings.system_prompt.clone(),
            history_turns: settings.history_turns,
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// System prompt, then the tail of `history`, then the new user turn.
    fn build_messages(&self, history: &[ChatMessage], text: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len().min(self.history_turns) + 2);
        if !self.system_prompt.trim().is_empty() {
            messages.push(ChatMessage::system(self.system_prompt.clone()));
        }
        let skip = history.len().saturating_sub(self.history_turns);
        messages.extend(history.iter().skip(skip).cloned());
        messages.push(ChatMessage::user(text));
        messages
    }

    fn request<'a>(&'a self, history: &[ChatMessage], text: &str, stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: self.build_messages(history, text),
            stream,
        }
    }

    pub async fn chat(&self, history: &[ChatMessage], text: &str) -> Result<String> {
        let body = self.request(history, text, false);
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Ollama returned {}: {}", status, text.trim()));
        }

        let parsed: ChatResponse = response.json().await?;
        if let Some(err) = parsed.error {
            return Err(anyhow!("Ollama error: {}", err));
        }
        let reply = parsed
            .message
            .map(|m| m.content.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| anyhow!("Empty reply from model {}", self.model))?;
        Ok(reply)
    }

    /// Streams the reply, calling `on_token` for every content fragment.
    /// Returns the full reply once the server reports `done`.
    pub async fn chat_stream<F>(&self, history: &[ChatMessage], text: &str, mut on_token: F) -> Result<String>
    where
        F: FnMut(&str),
    {
        let body = self.request(history, text, true);
        let send = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send();
        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| anyhow!("Ollama did not answer within {}s", self.timeout.as_secs()))??;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Ollama returned {}: {}", status, text.trim()));
        }

        let mut stream = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        let mut reply = String::new();

        'read: loop {
            // Each chunk gets the full timeout; a stalled stream is an error.
            let next = tokio::time::timeout(self.timeout, stream.next())
                .await
                .map_err(|_| anyhow!("Ollama stream stalled for {}s", self.timeout.as_secs()))?;
            let Some(chunk) = next else {
                break;
            };
            pending.extend_from_slice(&chunk?);

            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                match parse_stream_line(&line)? {
                    Some(StreamEvent::Token(token)) => {
                        reply.push_str(&token);
                        on_token(&token);
                    }
                    Some(StreamEvent::Done) => break 'read,
                    None => {}
                }
            }
        }

        // Last line without a trailing newline
        if !pending.is_empty() {
            let line = String::from_utf8_lossy(&pending);
            if let Some(StreamEvent::Token(token)) = parse_stream_line(&line)? {
                reply.push_str(&token);
                on_token(&token);
            }
        }

        if reply.trim().is_empty() {
            return Err(anyhow!("Empty reply from model {}", self.model));
        }
        Ok(reply)
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(HEALTH_TIMEOUT_SECS))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("Ollama returned {}", response.status()));
        }
        let tags: TagsResponse = response.json().await?;
        let mut names: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
        names.sort();
        Ok(names)
    }

    pub async fn is_available(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(HEALTH_TIMEOUT_SECS))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                log::debug!("[Ollama] health check failed: {}", e);
                false
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum StreamEvent {
    Token(String),
    Done,
}

fn parse_stream_line(line: &str) -> Result<Option<StreamEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let chunk: ChatResponse = match serde_json::from_str(line) {
        Ok(chunk) => chunk,
        Err(e) => {
            log::warn!("[Ollama] skipping malformed stream line: {}", e);
            return Ok(None);
        }
    };
    if let Some(err) = chunk.error {
        return Err(anyhow!("Ollama error: {}", err));
    }
    if chunk.done {
        return Ok(Some(StreamEvent::Done));
    }
    Ok(chunk
        .message
        .map(|m| m.content)
        .filter(|c| !c.is_empty())
        .map(StreamEvent::Token))
}

/// Offline reply used when the model server can't be reached.
pub fn fallback_reply(text: &str) -> String {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();
    let has = |candidates: &[&str]| words.iter().any(|w| candidates.contains(w));

    if has(&["hello", "hi", "hey"]) {
        "Hello! I'm JARIS, your desktop assistant. How can I help you today?".to_string()
    } else if lower.contains("how are you") {
        "I'm doing well, thank you! How are you?".to_string()
    } else if has(&["time"]) {
        format!("It's {} right now.", chrono::Local::now().format("%H:%M"))
    } else if has(&["weather"]) {
        "I'm sorry, I can't provide weather information at the moment.".to_string()
    } else if has(&["joke", "jokes"]) {
        "Here's one: why do computers stay cool? Because they keep their Windows open!".to_string()
    } else if has(&["help"]) {
        "I can control your PC and chat with you. Switch to PC control mode and try 'open chrome', \
         'take a screenshot' or 'create folder Projects'."
            .to_string()
    } else {
        "I'm sorry, the AI service is currently unavailable. Please make sure Ollama is running and try again."
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_turns(turns: usize) -> OllamaClient {
        let settings = AISettings {
            history_turns: turns,
            base_url: "http://localhost:11434/".to_string(),
            ..AISettings::default()
        };
        OllamaClient::new(&settings)
    }

    #[test]
    fn test_messages_keep_last_turns() {
        let client = client_with_turns(2);
        let history = vec![
            ChatMessage::user("one"),
            ChatMessage::assistant("two"),
            ChatMessage::user("three"),
            ChatMessage::assistant("four"),
        ];
        let messages = client.build_messages(&history, "five");
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(&contents[1..], &["three", "four", "five"]);
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_request_body_shape() {
        let client = client_with_turns(10);
        let body = serde_json::to_value(client.request(&[], "hi there", false)).unwrap();
        assert_eq!(body["model"], client.model());
        assert_eq!(body["stream"], false);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.last().unwrap()["role"], "user");
        assert_eq!(messages.last().unwrap()["content"], "hi there");
    }

    #[test]
    fn test_parse_stream_lines() {
        let token = r#"{"model":"llama3.2","message":{"role":"assistant","content":"Hel"},"done":false}"#;
        assert_eq!(
            parse_stream_line(token).unwrap(),
            Some(StreamEvent::Token("Hel".to_string()))
        );

        let done = r#"{"model":"llama3.2","message":{"role":"assistant","content":""},"done":true}"#;
        assert_eq!(parse_stream_line(done).unwrap(), Some(StreamEvent::Done));

        assert_eq!(parse_stream_line("   ").unwrap(), None);
        assert_eq!(parse_stream_line("not json").unwrap(), None);
        assert!(parse_stream_line(r#"{"error":"model not found"}"#).is_err());
    }

    #[test]
    fn test_fallback_replies() {
        assert!(fallback_reply("Hello JARIS").contains("JARIS"));
        assert!(fallback_reply("how are you doing").contains("doing well"));
        assert!(fallback_reply("what's the weather like?").contains("weather"));
        assert!(fallback_reply("tell me a joke").contains("Windows"));
        assert!(fallback_reply("I need help").contains("PC control"));
        assert!(fallback_reply("explain monads").contains("unavailable"));
        assert!(fallback_reply("hi, JARIS!").contains("JARIS"));
    }

    #[test]
    fn test_fallback_greeting_needs_whole_word() {
        assert!(!fallback_reply("history of rome").contains("Hello"));
        assert!(!fallback_reply("they said so").contains("Hello"));
        assert!(!fallback_reply("sometimes it rains").contains("right now"));
    }

    #[tokio::test]
    async fn test_stalled_stream_times_out() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let line = "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n";
            let head = "HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nTransfer-Encoding: chunked\r\n\r\n";
            let body = format!("{}{:x}\r\n{}\r\n", head, line.len(), line);
            socket.write_all(body.as_bytes()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let settings = AISettings {
            base_url: format!("http://127.0.0.1:{}", port),
            timeout_secs: 1,
            ..AISettings::default()
        };
        let client = OllamaClient::new(&settings);
        let mut tokens = Vec::new();
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            client.chat_stream(&[], "hello", |t| tokens.push(t.to_string())),
        )
        .await
        .expect("chat_stream should give up on its own");

        let err = result.unwrap_err();
        assert!(err.to_string().contains("stalled"), "{}", err);
        assert_eq!(tokens, vec!["Hel".to_string()]);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let settings = AISettings {
            base_url: format!("http://127.0.0.1:{}", port),
            ..AISettings::default()
        };
        let client = OllamaClient::new(&settings);
        assert!(!client.is_available().await);
        assert!(client.chat(&[], "hello").await.is_err());
    }
}
