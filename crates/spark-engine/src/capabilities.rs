//! Optional front-end widgets. The defaults do nothing, so callers can wire
//! them unconditionally.

/// Offers a piece of text for copying (a copy button in a graphical front end).
pub trait Clipboard {
    fn offer(&self, text: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoClipboard;

impl Clipboard for NoClipboard {
    fn offer(&self, _text: &str) {}
}

/// Source of spoken prompts, polled once per turn.
pub trait VoiceInput {
    fn poll_prompt(&mut self) -> Option<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoVoiceInput;

impl VoiceInput for NoVoiceInput {
    fn poll_prompt(&mut self) -> Option<String> {
        None
    }
}

/// Typed text wins; the voice source is only polled when nothing was typed.
pub fn resolve_prompt(typed: Option<&str>, voice: &mut dyn VoiceInput) -> Option<String> {
    if let Some(text) = typed.map(str::trim).filter(|value| !value.is_empty()) {
        return Some(text.to_string());
    }
    voice
        .poll_prompt()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
