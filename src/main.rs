use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use jaris::database::queries;
use jaris::models::{Mode, Settings};
use jaris::services::assistant::{Assistant, AssistantReply};
use jaris::services::catalog::resolve_catalog;
use jaris::services::interpreter::CommandInterpreter;
use jaris::utils::config;

#[derive(Parser)]
#[command(name = "jaris", version)]
#[command(about = "JARIS - chat with a local model or control your PC in plain English", long_about = None)]
struct Cli {
    /// Start in this mode: chat or pc_control
    #[arg(short, long)]
    mode: Option<Mode>,

    /// Where settings and the database live
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// JSON pattern catalog to use instead of the built-in one
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Chat model to use for this run
    #[arg(long)]
    model: Option<String>,

    /// Only print the interpreted intent as JSON; perform nothing
    #[arg(long)]
    parse: bool,

    /// Handle this text once and exit (interactive prompt when omitted)
    text: Vec<String>,
}

const HELP: &str = "\
Commands:
  /mode [chat|pc_control]  switch mode (toggles when no mode is given)
  /new                     start a new chat session
  /sessions                list chat sessions
  /history [n]             show recent commands
  /models                  list installed and recently used models
  /model <name>            chat with a different model
  /help                    show this help
  /quit                    exit";

#[tokio::main]
async fn main() -> Result<()> {
    config::load_dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.clone().unwrap_or_else(config::default_data_dir);
    let settings = build_settings(&cli, &data_dir);

    let text = cli.text.join(" ");

    if cli.parse {
        if text.trim().is_empty() {
            anyhow::bail!("--parse needs some text to interpret");
        }
        let catalog = resolve_catalog(settings.control.catalog_path.as_deref().map(Path::new));
        let intent = CommandInterpreter::new(catalog).interpret(&text, settings.general.default_mode);
        println!("{}", serde_json::to_string_pretty(&intent)?);
        return Ok(());
    }

    let mut assistant = Assistant::open(&data_dir, settings)?;

    if !text.trim().is_empty() {
        let reply = handle_line(&mut assistant, &text).await?;
        print_reply(&assistant, &reply);
        return Ok(());
    }

    run_repl(&mut assistant).await
}

fn build_settings(cli: &Cli, data_dir: &Path) -> Settings {
    let mut settings = config::load_settings(data_dir).unwrap_or_else(|e| {
        log::warn!("[Config] {:#}; using defaults", e);
        Settings::default()
    });
    config::apply_overrides(&mut settings, None, cli.model.clone());
    if let Some(catalog) = &cli.catalog {
        settings.control.catalog_path = Some(catalog.display().to_string());
    }
    if let Some(mode) = cli.mode {
        settings.general.default_mode = mode;
    }
    settings
}

/// Writes streamed tokens after a `NAME: ` prefix.
struct TokenPrinter<W: Write> {
    out: W,
    name: String,
    started: bool,
}

impl<W: Write> TokenPrinter<W> {
    fn new(out: W, name: String) -> Self {
        Self { out, name, started: false }
    }

    fn token(&mut self, token: &str) {
        if !self.started {
            let _ = write!(self.out, "{}: ", self.name);
            self.started = true;
        }
        let _ = write!(self.out, "{}", token);
        let _ = self.out.flush();
    }

    /// Closes the partial line, including when the stream broke off midway.
    fn finish(&mut self) {
        if self.started {
            let _ = writeln!(self.out);
        }
    }
}

async fn handle_line(assistant: &mut Assistant, text: &str) -> Result<AssistantReply> {
    if !assistant.settings().ai.stream {
        return assistant.handle(text).await;
    }
    let mut printer = TokenPrinter::new(
        std::io::stdout(),
        assistant.settings().general.assistant_name.clone(),
    );
    let result = assistant.handle_with(text, |token| printer.token(token)).await;
    printer.finish();
    result
}

fn print_reply(assistant: &Assistant, reply: &AssistantReply) {
    if reply.streamed {
        return;
    }
    if reply.intent.is_chat() {
        println!("{}: {}", assistant.settings().general.assistant_name, reply.outcome.message);
    } else if reply.outcome.success {
        println!("[{}] {}", reply.intent.category, reply.outcome.message);
    } else {
        println!("[{}] failed: {}", reply.intent.category, reply.outcome.message);
    }
}

async fn run_repl(assistant: &mut Assistant) -> Result<()> {
    let name = assistant.settings().general.assistant_name.clone();
    println!("{} ready. Mode: {}. Type /help for commands.", name, assistant.mode());

    if assistant.settings().ai.enabled && !assistant.ollama().is_available().await {
        println!(
            "Note: no Ollama server at {}; chat will use offline replies.",
            assistant.ollama().base_url()
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("[{}] > ", assistant.mode());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            if !run_slash_command(assistant, command).await? {
                break;
            }
            continue;
        }

        match handle_line(assistant, line).await {
            Ok(reply) => print_reply(assistant, &reply),
            Err(e) => println!("{}", e),
        }
    }

    Ok(())
}

/// Returns false when the user asked to quit.
async fn run_slash_command(assistant: &mut Assistant, command: &str) -> Result<bool> {
    let mut parts = command.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default().to_lowercase();
    let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

    match name.as_str() {
        "quit" | "exit" | "q" => return Ok(false),
        "help" | "?" => println!("{}", HELP),
        "mode" => {
            let next = match arg {
                Some(raw) => match raw.parse::<Mode>() {
                    Ok(mode) => mode,
                    Err(e) => {
                        println!("{}", e);
                        return Ok(true);
                    }
                },
                None => match assistant.mode() {
                    Mode::Chat => Mode::PcControl,
                    Mode::PcControl => Mode::Chat,
                },
            };
            assistant.set_mode(next);
            println!("Mode: {}", next);
        }
        "new" => {
            let session = assistant.new_session()?;
            println!("Started session {}", session.id);
        }
        "sessions" => {
            let sessions = queries::list_sessions(assistant.connection())?;
            if sessions.is_empty() {
                println!("No chat sessions yet.");
            }
            for session in sessions {
                let when = chrono::DateTime::from_timestamp(session.updated_at, 0)
                    .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                let marker = if assistant.session_id() == Some(session.id.as_str()) { "*" } else { " " };
                println!("{} {}  {}  {}", marker, when, session.id, session.title);
            }
        }
        "history" => {
            let limit = arg.and_then(|a| a.parse::<usize>().ok()).unwrap_or(10);
            let records = queries::get_command_history(assistant.connection(), limit)?;
            for record in records.iter().rev() {
                let status = if record.success { "ok" } else { "failed" };
                println!("{:<14} {:<7} {}", record.category.as_str(), status, record.raw_text);
            }
        }
        "models" => {
            match assistant.ollama().list_models().await {
                Ok(models) if !models.is_empty() => {
                    println!("Installed:");
                    for model in models {
                        let marker = if model == assistant.ollama().model() { "*" } else { " " };
                        println!("  {} {}", marker, model);
                    }
                }
                Ok(_) => println!("No models installed on {}", assistant.ollama().base_url()),
                Err(e) => println!("Could not reach Ollama: {}", e),
            }
            let recent = queries::recent_models(assistant.connection(), 5)?;
            if !recent.is_empty() {
                println!("Recently used:");
                for model in recent {
                    println!("    {} ({} chats)", model.name, model.use_count);
                }
            }
        }
        "model" => match arg {
            Some(model) => {
                assistant.set_model(model);
                println!("Chat model: {}", model);
            }
            None => println!("Chat model: {}", assistant.ollama().model()),
        },
        other => println!("Unknown command /{}. Type /help for commands.", other),
    }

    Ok(true)
}
