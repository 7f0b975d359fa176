mod attachment;
mod capabilities;
mod config;
mod dispatcher;
mod download;
mod engine;
mod error;
mod image_jobs;
mod image_providers;
mod streaming;
#[cfg(test)]
mod test_support;
mod text_providers;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Response as HttpResponse;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub use attachment::{image_dimensions, load_attachment, mime_for_path};
pub use capabilities::{resolve_prompt, Clipboard, NoClipboard, NoVoiceInput, VoiceInput};
pub use config::{EngineConfig, ProviderMode};
pub use dispatcher::{DispatchOutcome, Dispatcher, Route, DESCRIBE_PROMPT};
pub use download::{
    format_link, generated_image_filename, ImageDownloader, DOWNLOAD_FAILED_PLACEHOLDER,
};
pub use engine::SparkEngine;
pub use error::SparkError;
pub use image_jobs::{ImageJob, ImageJobRunner, ImageJobState};
pub use image_providers::{DryrunImageProvider, ImageJobRequest, ImageProvider, ReplicateProvider};
pub use streaming::{
    NoPacer, Pacer, RenderMode, Rendered, SleepPacer, StreamingRenderer, WordStream,
    CODE_KEYWORDS, DEFAULT_CHUNK_DELAY,
};
pub use text_providers::{
    DryrunTextProvider, GeminiProvider, TextProvider, TextRequest, TextResponse,
};

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().is_some_and(|existing| existing == trimmed) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn digest_bytes(prompt: &str, idx: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(idx.to_be_bytes());
    hasher.finalize().into()
}

fn short_id(prompt: &str, idx: u64) -> String {
    hex::encode(&digest_bytes(prompt, idx)[..4])
}

fn color_from_prompt(prompt: &str, idx: u64) -> (u8, u8, u8) {
    let digest = digest_bytes(prompt, idx);
    (digest[0], digest[1], digest[2])
}

#[cfg(test)]
mod tests {
    use super::{color_from_prompt, error_chain_text, short_id, truncate_text};

    #[test]
    fn error_chain_text_joins_distinct_causes() {
        let err = anyhow::anyhow!("connection refused").context("Gemini request failed");
        assert_eq!(
            error_chain_text(&err, 200),
            "Gemini request failed | caused by: connection refused"
        );
    }

    #[test]
    fn truncate_text_marks_cut() {
        assert_eq!(truncate_text("abcdef", 3), "abc…");
        assert_eq!(truncate_text("abc", 3), "abc");
    }

    #[test]
    fn prompt_hashes_are_stable_per_index() {
        assert_eq!(short_id("owl", 0), short_id("owl", 0));
        assert_ne!(short_id("owl", 0), short_id("owl", 1));
        assert_eq!(short_id("owl", 0).len(), 8);
        assert_eq!(color_from_prompt("owl", 2), color_from_prompt("owl", 2));
    }
}
