use super::command_registry::{
    CommandAction, CommandSpec, NO_ARG_COMMANDS, RAW_ARG_COMMANDS, SET_COMMAND,
    SINGLE_PATH_COMMANDS,
};
use crate::request::ParameterName;

/// One line typed at the chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Noop,
    Submit { prompt: String },
    Cancel,
    SetSystemPrompt(String),
    SetReplyPrefix(String),
    Attach(String),
    Detach,
    SetParameter { name: ParameterName, value: String },
    /// `/set` whose name is unknown or whose value is missing.
    InvalidParameter { arg: String },
    ShowParameters,
    ResetParameters,
    Reconnect,
    Help,
    Quit,
    Unknown { command: String, arg: String },
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<CommandAction> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    let parts = parse_path_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

fn parse_set_args(arg: &str) -> ChatInput {
    let mut parts = arg.splitn(2, char::is_whitespace);
    let name = parts.next().and_then(ParameterName::parse);
    let value = parts.next().map(str::trim).filter(|value| !value.is_empty());
    match (name, value) {
        (Some(name), Some(value)) => ChatInput::SetParameter {
            name,
            value: value.to_string(),
        },
        _ => ChatInput::InvalidParameter {
            arg: arg.to_string(),
        },
    }
}

fn apply_action(action: CommandAction, arg: &str) -> ChatInput {
    match action {
        CommandAction::SetSystemPrompt => ChatInput::SetSystemPrompt(arg.to_string()),
        CommandAction::SetReplyPrefix => ChatInput::SetReplyPrefix(arg.to_string()),
        CommandAction::Attach => ChatInput::Attach(parse_single_path_arg(arg)),
        CommandAction::Cancel => ChatInput::Cancel,
        CommandAction::Detach => ChatInput::Detach,
        CommandAction::ShowParameters => ChatInput::ShowParameters,
        CommandAction::ResetParameters => ChatInput::ResetParameters,
        CommandAction::Reconnect => ChatInput::Reconnect,
        CommandAction::Help => ChatInput::Help,
        CommandAction::Quit => ChatInput::Quit,
    }
}

/// Lines starting with `//` are sent as prompts with one slash removed.
pub fn parse_chat_input(text: &str) -> ChatInput {
    let line = text.trim_end_matches(['\r', '\n']);
    let raw_trimmed = line.trim();
    if raw_trimmed.is_empty() {
        return ChatInput::Noop;
    }

    if let Some(escaped) = raw_trimmed.strip_prefix("//") {
        return ChatInput::Submit {
            prompt: format!("/{escaped}"),
        };
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(action) = find_action(&command, RAW_ARG_COMMANDS)
                .or_else(|| find_action(&command, SINGLE_PATH_COMMANDS))
                .or_else(|| find_action(&command, NO_ARG_COMMANDS))
            {
                return apply_action(action, arg);
            }
            if command == SET_COMMAND {
                return parse_set_args(arg);
            }
            return ChatInput::Unknown {
                command,
                arg: arg.to_string(),
            };
        }
    }

    ChatInput::Submit {
        prompt: line.to_string(),
    }
}
