mod command_registry;
mod intent_parser;
mod message;
mod session;

pub use command_registry::CHAT_HELP_COMMANDS;
pub use intent_parser::{parse_intent, Intent};
pub use message::{Message, Role};
pub use session::{ImageAttachment, Session, EXPORT_FILE_NAME};
