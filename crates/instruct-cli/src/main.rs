mod projector;

use std::io::{self, BufRead, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use instruct_contracts::chat::{parse_chat_input, ChatInput, CHAT_HELP_COMMANDS};
use instruct_contracts::events::EventWriter;
use instruct_contracts::request::{ComposerEdit, ImageAttachment, ParameterName};
use instruct_engine::{
    ClientConfig, ConfigOverrides, NetworkTransport, SessionDriver, UserAction, ViewProjector,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use projector::{exit_code, TerminalProjector};

#[derive(Debug, Parser)]
#[command(
    name = "instruct-chat",
    version,
    about = "Streaming client for an instruct text-generation server"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive chat; `/help` lists commands.
    Chat(ChatArgs),
    /// One generation streamed to stdout.
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct ConnectionArgs {
    /// WebSocket endpoint, e.g. ws://127.0.0.1:8000/ws
    #[arg(long)]
    url: Option<String>,
    /// Cancel endpoint; derived from --url when omitted.
    #[arg(long)]
    abort_url: Option<String>,
    /// Append a JSONL session trace to this file.
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[command(flatten)]
    connection: ConnectionArgs,
}

// Parameters stay strings so they get the same permissive coercion as
// values typed into the chat.
#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    system: Option<String>,
    #[arg(long)]
    prefix: Option<String>,
    /// Image file or data URL.
    #[arg(long)]
    image: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    max_new_tokens: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    temperature: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    top_p: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    repetition_penalty: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    frequency_penalty: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    presence_penalty: Option<String>,
    #[command(flatten)]
    connection: ConnectionArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("instruct-chat error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => run_chat(args),
        Command::Run(args) => run_once(args),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("INSTRUCT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_config(connection: &ConnectionArgs) -> Result<ClientConfig> {
    ClientConfig::from_env(&ConfigOverrides {
        websocket_url: connection.url.clone(),
        abort_url: connection.abort_url.clone(),
    })
}

fn build_driver<V: ViewProjector>(
    config: &ClientConfig,
    view: V,
    events: Option<&Path>,
) -> Result<SessionDriver<NetworkTransport, V>> {
    let transport = NetworkTransport::new(config)?;
    let mut driver = SessionDriver::new(transport, config.defaults.clone(), view)
        .with_cancel_grace(config.cancel_timeout);
    if let Some(path) = events {
        let writer = EventWriter::for_session(path);
        info!(
            session_id = writer.session_id(),
            path = %path.display(),
            "writing session events"
        );
        driver = driver.with_events(writer);
    }
    Ok(driver)
}

fn run_chat(args: ChatArgs) -> Result<i32> {
    let config = load_config(&args.connection)?;
    println!(
        "Instruct chat on {} (cancel via {}). Type /help for commands.",
        config.websocket_url, config.abort_url
    );
    let view = TerminalProjector::new(io::stdout(), io::stdout());
    let mut driver = build_driver(&config, view, args.connection.events.as_deref())?;
    driver.connect()?;

    let (tx, rx) = mpsc::channel();
    // Detached: a blocked stdin read must not hold up exit.
    thread::spawn(move || read_chat_lines(tx));
    driver.run(&rx)?;
    Ok(0)
}

fn read_chat_lines(tx: mpsc::Sender<UserAction>) {
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!(error = %err, "stdin read failed");
                break;
            }
        }

        let actions = chat_actions(parse_chat_input(&line));
        let quit = actions.contains(&UserAction::Quit);
        for action in actions {
            if tx.send(action).is_err() {
                return;
            }
        }
        if quit {
            break;
        }
    }
}

fn chat_actions(input: ChatInput) -> Vec<UserAction> {
    match input {
        ChatInput::Noop => Vec::new(),
        ChatInput::Submit { prompt } => vec![UserAction::Submit { prompt }],
        ChatInput::Cancel => vec![UserAction::Cancel],
        ChatInput::SetSystemPrompt(text) => vec![
            UserAction::Compose(ComposerEdit::SystemPrompt(text)),
            UserAction::Notice("[system prompt set for the next message]".to_string()),
        ],
        ChatInput::SetReplyPrefix(text) => vec![
            UserAction::Compose(ComposerEdit::ReplyPrefix(text)),
            UserAction::Notice("[reply prefix set for the next message]".to_string()),
        ],
        ChatInput::Attach(arg) if arg.trim().is_empty() => vec![UserAction::Notice(
            "usage: /attach <path|data-url>".to_string(),
        )],
        ChatInput::Attach(arg) => match load_attachment(&arg) {
            Ok(image) => {
                let notice = format!(
                    "[attached {} image, {} bytes]",
                    image.mime(),
                    image.byte_len()
                );
                vec![
                    UserAction::Compose(ComposerEdit::Attach(image)),
                    UserAction::Notice(notice),
                ]
            }
            Err(err) => vec![UserAction::Notice(format!("[attach failed: {err:#}]"))],
        },
        ChatInput::Detach => vec![
            UserAction::Compose(ComposerEdit::Detach),
            UserAction::Notice("[image detached]".to_string()),
        ],
        ChatInput::SetParameter { name, value } => {
            vec![UserAction::Compose(ComposerEdit::Parameter { name, value })]
        }
        ChatInput::InvalidParameter { arg } => vec![UserAction::Notice(format!(
            "usage: /set <param> <value> (got '{arg}'; params: {})",
            ParameterName::ALL
                .iter()
                .map(|name| name.wire_name())
                .collect::<Vec<_>>()
                .join(", ")
        ))],
        ChatInput::ShowParameters => vec![UserAction::ShowParameters],
        ChatInput::ResetParameters => vec![
            UserAction::Compose(ComposerEdit::ResetParameters),
            UserAction::ShowParameters,
        ],
        ChatInput::Reconnect => vec![UserAction::Reconnect],
        ChatInput::Help => vec![UserAction::Notice(help_text())],
        ChatInput::Quit => vec![UserAction::Quit],
        ChatInput::Unknown { command, .. } => vec![UserAction::Notice(format!(
            "[unknown command /{command}; try /help]"
        ))],
    }
}

fn help_text() -> String {
    let mut lines = vec!["Commands (plain text sends a message):".to_string()];
    for (command, summary) in CHAT_HELP_COMMANDS {
        lines.push(format!("  {command:<26} {summary}"));
    }
    lines.join("\n")
}

fn load_attachment(arg: &str) -> Result<ImageAttachment> {
    if arg.trim_start().starts_with("data:") {
        ImageAttachment::from_data_url(arg.trim())
    } else {
        ImageAttachment::from_path(Path::new(arg))
    }
}

fn run_once(args: RunArgs) -> Result<i32> {
    let config = load_config(&args.connection)?;

    let mut edits = Vec::new();
    if let Some(system) = args.system {
        edits.push(ComposerEdit::SystemPrompt(system));
    }
    if let Some(prefix) = args.prefix {
        edits.push(ComposerEdit::ReplyPrefix(prefix));
    }
    if let Some(image) = args.image.as_deref() {
        let attachment =
            load_attachment(image).with_context(|| format!("failed to attach {image}"))?;
        edits.push(ComposerEdit::Attach(attachment));
    }
    let parameters = [
        (ParameterName::MaxNewTokens, args.max_new_tokens),
        (ParameterName::Temperature, args.temperature),
        (ParameterName::TopP, args.top_p),
        (ParameterName::RepetitionPenalty, args.repetition_penalty),
        (ParameterName::FrequencyPenalty, args.frequency_penalty),
        (ParameterName::PresencePenalty, args.presence_penalty),
    ];
    for (name, value) in parameters {
        if let Some(value) = value {
            edits.push(ComposerEdit::Parameter { name, value });
        }
    }

    let view = TerminalProjector::new(io::stdout(), io::stderr());
    let mut driver = build_driver(&config, view, args.connection.events.as_deref())?;
    if !driver.connect()? {
        return Ok(exit_code(None));
    }
    for edit in edits {
        driver.handle_action(UserAction::Compose(edit))?;
    }
    driver.handle_action(UserAction::Submit {
        prompt: args.prompt,
    })?;
    driver.run_until_idle()?;
    driver.shutdown()?;
    Ok(exit_code(driver.view().last_outcome()))
}
