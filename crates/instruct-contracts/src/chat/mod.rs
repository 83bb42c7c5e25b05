mod command_registry;
mod input_parser;

pub use command_registry::CHAT_HELP_COMMANDS;
pub use input_parser::{parse_chat_input, ChatInput};
