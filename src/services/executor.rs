use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use image::RgbaImage;
use serde_json::json;
use thiserror::Error;

use crate::models::{ActionOutcome, ControlSettings, Intent, IntentCategory};
use crate::utils::text::truncate_at_char_boundary;

const MAX_SHELL_OUTPUT_CHARS: usize = 4000;
const HOST_COMMAND_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
enum ActionError {
    #[error("Missing '{0}' for this command")]
    MissingParam(&'static str),
    #[error("'{0}' already exists")]
    AlreadyExists(String),
    #[error("'{0}' does not exist")]
    NotFound(String),
    #[error("'{0}' is not a folder")]
    NotADirectory(String),
    #[error("{0}")]
    Refused(String),
    #[error("{0}")]
    Unsupported(String),
    #[error("'{0}' is not installed or not on PATH")]
    ToolMissing(String),
    #[error("{program} failed: {detail}")]
    HostCommand { program: String, detail: String },
    #[error("Command timed out after {0}s")]
    Timeout(u64),
    #[error("Screenshot failed: {0}")]
    Capture(String),
    #[error("Could not open '{target}': {source}")]
    Open {
        target: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }
}

/// A program plus arguments to run on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HostCommand {
    program: String,
    args: Vec<String>,
}

fn host(program: &str, args: &[&str]) -> HostCommand {
    HostCommand {
        program: program.to_string(),
        args: args.iter().map(|a| a.to_string()).collect(),
    }
}

fn osascript(script: &str) -> HostCommand {
    host("osascript", &["-e", script])
}

/// Sends a virtual key through WScript.Shell. `keys` is either a SendKeys
/// string or a `[char]NNN` media key code.
fn send_keys(keys: &str) -> HostCommand {
    let script = format!("(New-Object -ComObject WScript.Shell).SendKeys({})", keys);
    host("powershell", &["-NoProfile", "-Command", &script])
}

// ─── Applications ───

struct AppTarget {
    windows: &'static str,
    macos: &'static str,
    linux: &'static str,
}

const APP_ALIASES: &[(&[&str], AppTarget)] = &[
    (
        &["chrome", "google chrome", "browser"],
        AppTarget { windows: "chrome", macos: "Google Chrome", linux: "google-chrome" },
    ),
    (
        &["firefox", "mozilla firefox"],
        AppTarget { windows: "firefox", macos: "Firefox", linux: "firefox" },
    ),
    (
        &["notepad", "text editor", "textedit"],
        AppTarget { windows: "notepad", macos: "TextEdit", linux: "gedit" },
    ),
    (
        &["calculator", "calc"],
        AppTarget { windows: "calc", macos: "Calculator", linux: "gnome-calculator" },
    ),
    (
        &["code", "vscode", "vs code", "visual studio code"],
        AppTarget { windows: "code", macos: "Visual Studio Code", linux: "code" },
    ),
    (
        &["explorer", "file explorer", "finder", "files", "file manager"],
        AppTarget { windows: "explorer", macos: "Finder", linux: "nautilus" },
    ),
    (
        &["terminal", "cmd", "command prompt"],
        AppTarget { windows: "cmd", macos: "Terminal", linux: "x-terminal-emulator" },
    ),
    (
        &["powershell"],
        AppTarget { windows: "powershell", macos: "Terminal", linux: "pwsh" },
    ),
    (
        &["spotify"],
        AppTarget { windows: "spotify", macos: "Spotify", linux: "spotify" },
    ),
    (
        &["discord"],
        AppTarget { windows: "discord", macos: "Discord", linux: "discord" },
    ),
];

/// Maps a spoken app name to the platform's executable or bundle name.
fn resolve_app(name: &str, platform: Platform) -> String {
    let key = name.trim().to_lowercase();
    APP_ALIASES
        .iter()
        .find(|(aliases, _)| aliases.contains(&key.as_str()))
        .map(|(_, target)| {
            match platform {
                Platform::Windows => target.windows,
                Platform::MacOs => target.macos,
                Platform::Linux => target.linux,
            }
            .to_string()
        })
        .unwrap_or_else(|| name.trim().to_string())
}

fn launch_command(app: &str, platform: Platform) -> HostCommand {
    match platform {
        Platform::Windows => host("cmd", &["/C", "start", "", app]),
        Platform::MacOs => host("open", &["-a", app]),
        Platform::Linux => host(app, &[]),
    }
}

fn close_command(app: &str, platform: Platform) -> HostCommand {
    match platform {
        Platform::Windows => {
            let image = if app.to_lowercase().ends_with(".exe") {
                app.to_string()
            } else {
                format!("{}.exe", app)
            };
            host("taskkill", &["/IM", &image, "/F"])
        }
        Platform::MacOs | Platform::Linux => host("pkill", &["-i", "-x", &exact_name_pattern(app)]),
    }
}

/// pkill always reads its pattern as an extended regex.
fn exact_name_pattern(name: &str) -> String {
    let mut pattern = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if matches!(c, '.' | '[' | ']' | '(' | ')' | '*' | '+' | '?' | '{' | '}' | '|' | '^' | '$' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern
}

// ─── System tables ───

fn parse_level(raw: &str) -> Option<u8> {
    let digits = raw.trim().trim_end_matches('%').trim();
    digits.parse::<u32>().ok().map(|v| v.min(100) as u8)
}

fn volume_command(delta: Option<&str>, level: Option<u8>, platform: Platform) -> Result<HostCommand, ActionError> {
    if let Some(level) = level {
        let pct = level.to_string();
        return match platform {
            Platform::Linux => Ok(host("pactl", &["set-sink-volume", "@DEFAULT_SINK@", &format!("{}%", pct)])),
            Platform::MacOs => Ok(osascript(&format!("set volume output volume {}", pct))),
            Platform::Windows => Err(ActionError::Unsupported(
                "Setting an exact volume level is not supported on Windows; try 'volume up' or 'volume down'".to_string(),
            )),
        };
    }

    let delta = delta.ok_or(ActionError::MissingParam("delta"))?;
    let cmd = match (delta, platform) {
        ("up", Platform::Linux) => host("pactl", &["set-sink-volume", "@DEFAULT_SINK@", "+10%"]),
        ("down", Platform::Linux) => host("pactl", &["set-sink-volume", "@DEFAULT_SINK@", "-10%"]),
        ("mute", Platform::Linux) => host("pactl", &["set-sink-mute", "@DEFAULT_SINK@", "1"]),
        ("unmute", Platform::Linux) => host("pactl", &["set-sink-mute", "@DEFAULT_SINK@", "0"]),
        ("up", Platform::MacOs) => osascript("set volume output volume (output volume of (get volume settings) + 10)"),
        ("down", Platform::MacOs) => osascript("set volume output volume (output volume of (get volume settings) - 10)"),
        ("mute", Platform::MacOs) => osascript("set volume output muted true"),
        ("unmute", Platform::MacOs) => osascript("set volume output muted false"),
        ("up", Platform::Windows) => send_keys("[char]175"),
        ("down", Platform::Windows) => send_keys("[char]174"),
        // Windows only has a mute toggle key
        ("mute", Platform::Windows) | ("unmute", Platform::Windows) => send_keys("[char]173"),
        (other, _) => return Err(ActionError::Unsupported(format!("Unknown volume change '{}'", other))),
    };
    Ok(cmd)
}

fn media_command(action: &str, platform: Platform) -> Result<HostCommand, ActionError> {
    let cmd = match (action, platform) {
        ("play_pause", Platform::Linux) => host("playerctl", &["play-pause"]),
        ("next", Platform::Linux) => host("playerctl", &["next"]),
        ("previous", Platform::Linux) => host("playerctl", &["previous"]),
        ("stop", Platform::Linux) => host("playerctl", &["stop"]),
        ("play_pause", Platform::MacOs) => osascript("tell application \"System Events\" to key code 100"),
        ("next", Platform::MacOs) => osascript("tell application \"System Events\" to key code 101"),
        ("previous", Platform::MacOs) => osascript("tell application \"System Events\" to key code 98"),
        ("stop", Platform::MacOs) => osascript("tell application \"Music\" to stop"),
        ("play_pause", Platform::Windows) => send_keys("[char]179"),
        ("next", Platform::Windows) => send_keys("[char]176"),
        ("previous", Platform::Windows) => send_keys("[char]177"),
        ("stop", Platform::Windows) => send_keys("[char]178"),
        (other, _) => return Err(ActionError::Unsupported(format!("Unknown media action '{}'", other))),
    };
    Ok(cmd)
}

fn window_command(action: &str, platform: Platform) -> Result<HostCommand, ActionError> {
    let cmd = match (action, platform) {
        ("minimize", Platform::Linux) => host("xdotool", &["getactivewindow", "windowminimize"]),
        ("maximize", Platform::Linux) => host("xdotool", &["key", "super+Up"]),
        ("close", Platform::Linux) => host("xdotool", &["key", "alt+F4"]),
        ("switch", Platform::Linux) => host("xdotool", &["key", "alt+Tab"]),
        ("minimize", Platform::MacOs) => {
            osascript("tell application \"System Events\" to keystroke \"m\" using command down")
        }
        ("maximize", Platform::MacOs) => osascript(
            "tell application \"System Events\" to tell (first process whose frontmost is true) \
             to set value of attribute \"AXFullScreen\" of window 1 to true",
        ),
        ("close", Platform::MacOs) => {
            osascript("tell application \"System Events\" to keystroke \"w\" using command down")
        }
        ("switch", Platform::MacOs) => {
            osascript("tell application \"System Events\" to key code 48 using command down")
        }
        ("minimize", Platform::Windows) => send_keys("'% n'"),
        ("maximize", Platform::Windows) => send_keys("'% x'"),
        ("close", Platform::Windows) => send_keys("'%{F4}'"),
        ("switch", Platform::Windows) => send_keys("'%{TAB}'"),
        (other, _) => return Err(ActionError::Unsupported(format!("Unknown window action '{}'", other))),
    };
    Ok(cmd)
}

fn power_command(action: &str, platform: Platform) -> Result<HostCommand, ActionError> {
    let cmd = match (action, platform) {
        ("shutdown", Platform::Linux) => host("systemctl", &["poweroff"]),
        ("restart", Platform::Linux) => host("systemctl", &["reboot"]),
        ("sleep", Platform::Linux) => host("systemctl", &["suspend"]),
        ("lock", Platform::Linux) => host("loginctl", &["lock-session"]),
        ("shutdown", Platform::MacOs) => osascript("tell application \"System Events\" to shut down"),
        ("restart", Platform::MacOs) => osascript("tell application \"System Events\" to restart"),
        ("sleep", Platform::MacOs) => host("pmset", &["sleepnow"]),
        ("lock", Platform::MacOs) => host("pmset", &["displaysleepnow"]),
        ("shutdown", Platform::Windows) => host("shutdown", &["/s", "/t", "0"]),
        ("restart", Platform::Windows) => host("shutdown", &["/r", "/t", "0"]),
        ("sleep", Platform::Windows) => host("rundll32.exe", &["powrprof.dll,SetSuspendState", "0,1,0"]),
        ("lock", Platform::Windows) => host("rundll32.exe", &["user32.dll,LockWorkStation"]),
        (other, _) => return Err(ActionError::Unsupported(format!("Unknown power action '{}'", other))),
    };
    Ok(cmd)
}

// ─── Web ───

fn search_url(query: &str) -> Result<reqwest::Url, ActionError> {
    reqwest::Url::parse_with_params("https://www.google.com/search", &[("q", query.trim())])
        .map_err(|e| ActionError::Unsupported(format!("Bad search query: {}", e)))
}

/// Adds `https://` to bare hosts like `github.com`.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

// ─── Executor ───

/// Performs interpreted intents on the host.
///
/// Holds the working directory that `navigate` changes and that relative
/// file paths and shell commands resolve against.
pub struct ActionExecutor {
    settings: ControlSettings,
    current_dir: PathBuf,
    platform: Platform,
}

impl ActionExecutor {
    pub fn new(settings: ControlSettings) -> Self {
        let current_dir = std::env::current_dir()
            .ok()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::with_working_dir(settings, current_dir)
    }

    pub fn with_working_dir(settings: ControlSettings, dir: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            current_dir: dir.into(),
            platform: Platform::current(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.current_dir
    }

    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: ControlSettings) {
        self.settings = settings;
    }

    /// Never fails outright; errors come back as an unsuccessful outcome.
    pub async fn execute(&mut self, intent: &Intent) -> ActionOutcome {
        let category = intent.category;
        match self.dispatch(intent).await {
            Ok(outcome) => {
                log::info!("[Executor] {}: {}", category, outcome.message);
                outcome
            }
            Err(e) => {
                log::warn!("[Executor] {} failed: {}", category, e);
                ActionOutcome::failed(e.to_string())
            }
        }
    }

    async fn dispatch(&mut self, intent: &Intent) -> Result<ActionOutcome, ActionError> {
        match intent.category {
            IntentCategory::LaunchApp => self.launch_app(required(intent, "app")?),
            IntentCategory::CloseApp => self.close_app(required(intent, "app")?).await,
            IntentCategory::FileCreate => self.create_file(required(intent, "path")?),
            IntentCategory::FolderCreate => {
                self.create_folder(required(intent, "name")?, intent.param("location"))
            }
            IntentCategory::FileList => self.list_files(intent.param("path")),
            IntentCategory::Navigate => self.navigate(required(intent, "path")?),
            IntentCategory::ShellExecute => self.run_shell(required(intent, "cmd")?).await,
            IntentCategory::SystemVolume => {
                let level = match intent.param("level") {
                    Some(raw) => Some(parse_level(raw).ok_or_else(|| {
                        ActionError::Unsupported(format!("'{}' is not a volume level (0-100)", raw))
                    })?),
                    None => None,
                };
                let cmd = volume_command(intent.param("delta"), level, self.platform)?;
                self.run_host(cmd).await?;
                let message = match (level, intent.param("delta")) {
                    (Some(level), _) => format!("Volume set to {}%", level),
                    (None, Some("up")) => "Volume increased".to_string(),
                    (None, Some("down")) => "Volume decreased".to_string(),
                    (None, Some("mute")) => "Volume muted".to_string(),
                    _ => "Volume unmuted".to_string(),
                };
                Ok(ActionOutcome::ok(message))
            }
            IntentCategory::MediaControl => {
                let action = required(intent, "action")?;
                self.run_host(media_command(action, self.platform)?).await?;
                Ok(ActionOutcome::ok(format!("Media: {}", action.replace('_', "/"))))
            }
            IntentCategory::WindowControl => {
                let action = required(intent, "action")?;
                self.run_host(window_command(action, self.platform)?).await?;
                Ok(ActionOutcome::ok(format!("Window: {}", action)))
            }
            IntentCategory::SystemPower => {
                let action = required(intent, "action")?;
                if !self.settings.allow_power_actions {
                    return Err(ActionError::Refused(format!(
                        "Power actions are disabled ({} was not performed). Enable control.allow_power_actions to allow them.",
                        action
                    )));
                }
                self.run_host(power_command(action, self.platform)?).await?;
                Ok(ActionOutcome::ok(format!("System {} requested", action)))
            }
            IntentCategory::WebSearch => {
                let query = required(intent, "query")?;
                let url = search_url(query)?;
                open_target(url.as_str())?;
                Ok(ActionOutcome::ok(format!("Searching Google for '{}'", query))
                    .with_data(json!({ "url": url.as_str() })))
            }
            IntentCategory::WebOpen => {
                let url = normalize_url(required(intent, "url")?);
                open_target(&url)?;
                Ok(ActionOutcome::ok(format!("Opened {}", url)).with_data(json!({ "url": url })))
            }
            IntentCategory::Screenshot => self.screenshot().await,
            IntentCategory::AiChat => Err(ActionError::Unsupported(
                "Chat messages are answered by the assistant, not executed".to_string(),
            )),
        }
    }

    // ─── Paths ───

    fn resolve_path(&self, raw: &str, allow_places: bool) -> PathBuf {
        let raw = raw.trim();
        if allow_places {
            if let Some(dir) = place_dir(raw) {
                return dir;
            }
        }

        if raw == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
        if let Some(rest) = raw.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }

        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.current_dir.join(path)
        }
    }

    // ─── Files ───

    fn create_file(&self, raw: &str) -> Result<ActionOutcome, ActionError> {
        let path = self.resolve_path(raw, false);
        if path.exists() {
            return Err(ActionError::AlreadyExists(path.display().to_string()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::File::create(&path)?;
        Ok(ActionOutcome::ok(format!("Created file {}", path.display()))
            .with_data(json!({ "path": path.display().to_string() })))
    }

    /// `location` names a user directory; a missing one falls back to home.
    fn folder_path(&self, name: &str, location: Option<&str>) -> Result<PathBuf, ActionError> {
        match location {
            Some(place) => {
                let parent = place_dir(place)
                    .filter(|dir| dir.is_dir())
                    .or_else(dirs::home_dir)
                    .ok_or_else(|| ActionError::NotFound(place.to_string()))?;
                Ok(parent.join(name.trim()))
            }
            None => Ok(self.resolve_path(name, false)),
        }
    }

    fn create_folder(&self, name: &str, location: Option<&str>) -> Result<ActionOutcome, ActionError> {
        let path = self.folder_path(name, location)?;
        if path.is_dir() {
            return Err(ActionError::AlreadyExists(path.display().to_string()));
        }
        std::fs::create_dir_all(&path)?;
        Ok(ActionOutcome::ok(format!("Created folder {}", path.display()))
            .with_data(json!({ "path": path.display().to_string() })))
    }

    fn list_files(&self, raw: Option<&str>) -> Result<ActionOutcome, ActionError> {
        let path = match raw.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => self.resolve_path(p, true),
            None => self.current_dir.clone(),
        };
        if !path.exists() {
            return Err(ActionError::NotFound(path.display().to_string()));
        }
        if !path.is_dir() {
            return Err(ActionError::NotADirectory(path.display().to_string()));
        }

        let mut folders = Vec::new();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type()?.is_dir() {
                folders.push(name);
            } else {
                files.push(name);
            }
        }
        folders.sort();
        files.sort();

        let mut message = format!(
            "{} folders, {} files in {}",
            folders.len(),
            files.len(),
            path.display()
        );
        for folder in &folders {
            message.push_str(&format!("\n  {}/", folder));
        }
        for file in &files {
            message.push_str(&format!("\n  {}", file));
        }

        Ok(ActionOutcome::ok(message).with_data(json!({
            "path": path.display().to_string(),
            "folders": folders,
            "files": files,
        })))
    }

    fn navigate(&mut self, raw: &str) -> Result<ActionOutcome, ActionError> {
        let path = self.resolve_path(raw, true);
        if !path.exists() {
            return Err(ActionError::NotFound(path.display().to_string()));
        }
        if !path.is_dir() {
            return Err(ActionError::NotADirectory(path.display().to_string()));
        }
        self.current_dir = path.canonicalize().unwrap_or(path);
        Ok(ActionOutcome::ok(format!("Now in {}", self.current_dir.display()))
            .with_data(json!({ "path": self.current_dir.display().to_string() })))
    }

    // ─── Processes ───

    fn launch_app(&self, app: &str) -> Result<ActionOutcome, ActionError> {
        let target = resolve_app(app, self.platform);
        let cmd = launch_command(&target, self.platform);
        std::process::Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| spawn_error(&cmd.program, e))?;
        Ok(ActionOutcome::ok(format!("Opening {}", app)))
    }

    async fn close_app(&self, app: &str) -> Result<ActionOutcome, ActionError> {
        let target = resolve_app(app, self.platform);
        let cmd = close_command(&target, self.platform);
        match self.run_host(cmd).await {
            Ok(()) => Ok(ActionOutcome::ok(format!("Closed {}", app))),
            Err(ActionError::HostCommand { .. }) => {
                Err(ActionError::NotFound(format!("running process for {}", app)))
            }
            Err(e) => Err(e),
        }
    }

    async fn run_shell(&self, command: &str) -> Result<ActionOutcome, ActionError> {
        if !self.settings.allow_shell {
            return Err(ActionError::Refused(
                "Shell commands are disabled in settings".to_string(),
            ));
        }

        let mut cmd = match self.platform {
            Platform::Windows => {
                let mut c = tokio::process::Command::new("cmd");
                c.args(["/C", command]);
                c
            }
            _ => {
                let mut c = tokio::process::Command::new("sh");
                c.args(["-c", command]);
                c
            }
        };
        cmd.current_dir(&self.current_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let secs = self.settings.shell_timeout_secs.max(1);
        let output = tokio::time::timeout(Duration::from_secs(secs), cmd.output())
            .await
            .map_err(|_| ActionError::Timeout(secs))??;

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        let exit_code = output.status.code();

        let mut combined = stdout.clone();
        if !stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        let mut message = truncate_at_char_boundary(&combined, MAX_SHELL_OUTPUT_CHARS);
        if combined.chars().count() > MAX_SHELL_OUTPUT_CHARS {
            message.push_str("\n... (output truncated)");
        }
        if message.is_empty() {
            message = match exit_code {
                Some(code) => format!("Command finished with exit code {}", code),
                None => "Command finished".to_string(),
            };
        }

        let data = json!({
            "exit_code": exit_code,
            "stdout": truncate_at_char_boundary(&stdout, MAX_SHELL_OUTPUT_CHARS),
            "stderr": truncate_at_char_boundary(&stderr, MAX_SHELL_OUTPUT_CHARS),
        });
        let outcome = if output.status.success() {
            ActionOutcome::ok(message)
        } else {
            ActionOutcome::failed(message)
        };
        Ok(outcome.with_data(data))
    }

    async fn run_host(&self, cmd: HostCommand) -> Result<(), ActionError> {
        log::debug!("[Executor] running {} {:?}", cmd.program, cmd.args);
        let child = tokio::process::Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(Duration::from_secs(HOST_COMMAND_TIMEOUT_SECS), child)
            .await
            .map_err(|_| ActionError::Timeout(HOST_COMMAND_TIMEOUT_SECS))?
            .map_err(|e| spawn_error(&cmd.program, e))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if stderr.is_empty() {
                format!("exit status {}", output.status)
            } else {
                stderr
            };
            Err(ActionError::HostCommand { program: cmd.program, detail })
        }
    }

    // ─── Screenshot ───

    fn screenshot_dir(&self) -> PathBuf {
        self.settings
            .screenshot_dir
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(PathBuf::from)
            .or_else(dirs::picture_dir)
            .or_else(dirs::desktop_dir)
            .unwrap_or_else(|| self.current_dir.clone())
    }

    async fn screenshot(&self) -> Result<ActionOutcome, ActionError> {
        let dir = self.screenshot_dir();
        let filename = chrono::Local::now()
            .format("screenshot_%Y%m%d_%H%M%S.png")
            .to_string();
        let path = dir.join(filename);

        let target = path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), ActionError> {
            let image = capture_primary_monitor()?;
            std::fs::create_dir_all(&dir)?;
            image
                .save(&target)
                .map_err(|e| ActionError::Capture(format!("saving {}: {}", target.display(), e)))
        })
        .await
        .map_err(|e| ActionError::Capture(format!("capture task failed: {}", e)))??;

        Ok(ActionOutcome::ok(format!("Screenshot saved to {}", path.display()))
            .with_data(json!({ "path": path.display().to_string() })))
    }
}

fn capture_primary_monitor() -> Result<RgbaImage, ActionError> {
    let monitors = xcap::Monitor::all().map_err(|e| ActionError::Capture(format!("monitor list: {}", e)))?;
    let primary = monitors
        .iter()
        .find(|m| m.is_primary())
        .or_else(|| monitors.first())
        .ok_or_else(|| ActionError::Capture("no monitor found".to_string()))?;

    let img = primary
        .capture_image()
        .map_err(|e| ActionError::Capture(format!("monitor capture: {}", e)))?;
    let (width, height) = (img.width(), img.height());
    RgbaImage::from_raw(width, height, img.into_raw())
        .ok_or_else(|| ActionError::Capture("unexpected pixel buffer size".to_string()))
}

fn place_dir(raw: &str) -> Option<PathBuf> {
    match raw.trim().to_lowercase().as_str() {
        "desktop" | "the desktop" => dirs::desktop_dir(),
        "downloads" | "my downloads" => dirs::download_dir(),
        "documents" | "my documents" => dirs::document_dir(),
        "home" | "home folder" => dirs::home_dir(),
        _ => None,
    }
}

fn required<'a>(intent: &'a Intent, key: &'static str) -> Result<&'a str, ActionError> {
    intent
        .param(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ActionError::MissingParam(key))
}

fn spawn_error(program: &str, e: std::io::Error) -> ActionError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ActionError::ToolMissing(program.to_string())
    } else {
        ActionError::Io(e)
    }
}

fn open_target(target: &str) -> Result<(), ActionError> {
    open::that(target).map_err(|source| ActionError::Open {
        target: target.to_string(),
        source,
    })
}
