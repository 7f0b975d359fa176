use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use super::message::Message;

pub const EXPORT_FILE_NAME: &str = "chat_history.txt";

/// Raw bytes of an image the user attached to the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn base64_data(&self) -> String {
        BASE64.encode(&self.bytes)
    }
}

/// In-memory conversation state for one interactive session.
///
/// The message log only grows by whole appends; `reset` is the one way to
/// shrink it. Generated image references are replaced wholesale after a
/// successful image job and cleared together with the log.
///
/// An attached image applies to exactly one chat turn: the dispatcher takes
/// it when a turn reaches a provider, and `reset` drops it.
#[derive(Debug, Clone, Default)]
pub struct Session {
    messages: Vec<Message>,
    generated_images: Vec<String>,
    pending_image: Option<ImageAttachment>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        self.messages.as_slice()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn generated_images(&self) -> &[String] {
        self.generated_images.as_slice()
    }

    pub fn replace_generated_images(&mut self, images: Vec<String>) {
        self.generated_images = images;
    }

    pub fn attach_image(&mut self, image: ImageAttachment) {
        self.pending_image = Some(image);
    }

    pub fn pending_image(&self) -> Option<&ImageAttachment> {
        self.pending_image.as_ref()
    }

    pub fn take_pending_image(&mut self) -> Option<ImageAttachment> {
        self.pending_image.take()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn export_as_text(&self) -> String {
        self.messages
            .iter()
            .map(Message::export_line)
            .collect::<Vec<String>>()
            .join("\n\n")
    }

    /// Self-contained HTML link carrying the export inline, or `None` when
    /// there is nothing to export.
    pub fn export_download_link(&self) -> Option<String> {
        if self.messages.is_empty() {
            return None;
        }
        let encoded = BASE64.encode(self.export_as_text().as_bytes());
        Some(format!(
            "<a href=\"data:text/plain;base64,{encoded}\" download=\"{EXPORT_FILE_NAME}\">Export Chat</a>"
        ))
    }
}
