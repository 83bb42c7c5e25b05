#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CommandAction {
    SetSystemPrompt,
    SetReplyPrefix,
    Attach,
    Cancel,
    Detach,
    ShowParameters,
    ResetParameters,
    Reconnect,
    Help,
    Quit,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: CommandAction,
}

/// The rest of the line is taken verbatim, empty included.
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "system",
        action: CommandAction::SetSystemPrompt,
    },
    CommandSpec {
        command: "prefix",
        action: CommandAction::SetReplyPrefix,
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "attach",
    action: CommandAction::Attach,
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "cancel",
        action: CommandAction::Cancel,
    },
    CommandSpec {
        command: "abort",
        action: CommandAction::Cancel,
    },
    CommandSpec {
        command: "detach",
        action: CommandAction::Detach,
    },
    CommandSpec {
        command: "params",
        action: CommandAction::ShowParameters,
    },
    CommandSpec {
        command: "reset",
        action: CommandAction::ResetParameters,
    },
    CommandSpec {
        command: "reconnect",
        action: CommandAction::Reconnect,
    },
    CommandSpec {
        command: "help",
        action: CommandAction::Help,
    },
    CommandSpec {
        command: "quit",
        action: CommandAction::Quit,
    },
    CommandSpec {
        command: "exit",
        action: CommandAction::Quit,
    },
];

pub(crate) const SET_COMMAND: &str = "set";

pub const CHAT_HELP_COMMANDS: &[(&str, &str)] = &[
    ("/cancel", "stop the running generation"),
    ("/system <text>", "system prompt for the next message"),
    ("/prefix <text>", "reply prefix for the next message"),
    ("/attach <path|data-url>", "attach an image to the next message"),
    ("/detach", "drop the staged image"),
    ("/set <param> <value>", "change a sampling parameter"),
    ("/params", "show sampling parameters"),
    ("/reset", "restore default parameters and system prompt"),
    ("/reconnect", "open a new connection"),
    ("/help", "show this list"),
    ("/quit", "leave the chat"),
];
