use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use spark_contracts::chat::ImageAttachment;

use crate::attachment::image_dimensions;
use crate::response_json_or_error;

#[derive(Debug, Clone, Copy)]
pub struct TextRequest<'a> {
    /// Wire identifier of the model to call.
    pub model: &'a str,
    pub prompt: &'a str,
    pub image: Option<&'a ImageAttachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextResponse {
    pub text: String,
    pub model: String,
}

/// A multimodal language model. Requests carrying an image go to a
/// vision-capable model; the provider itself does not choose.
pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &TextRequest<'_>) -> Result<TextResponse>;
}

pub struct GeminiProvider {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(request: &TextRequest<'_>) -> Value {
        let mut parts = vec![json!({ "text": request.prompt })];
        if let Some(image) = request.image {
            parts.push(json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": image.base64_data(),
                }
            }));
        }
        json!({
            "contents": [{
                "role": "user",
                "parts": parts,
            }]
        })
    }

    fn extract_text(payload: &Value) -> Result<String> {
        let candidates = payload
            .get("candidates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if candidates.is_empty() {
            if let Some(reason) = payload
                .get("promptFeedback")
                .and_then(|feedback| feedback.get("blockReason"))
                .and_then(Value::as_str)
            {
                bail!("Gemini blocked the prompt ({reason})");
            }
        }

        let text = candidates
            .first()
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect::<Vec<&str>>()
                    .join("")
            })
            .unwrap_or_default();
        Ok(text)
    }
}

impl TextProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &TextRequest<'_>) -> Result<TextResponse> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint_for_model(request.model);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .json(&Self::build_payload(request))
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let payload = response_json_or_error("Gemini", response)?;
        Ok(TextResponse {
            text: Self::extract_text(&payload)?,
            model: request.model.to_string(),
        })
    }
}

/// Offline stand-in that answers deterministically.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunTextProvider;

impl TextProvider for DryrunTextProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &TextRequest<'_>) -> Result<TextResponse> {
        let text = match request.image {
            Some(image) => {
                let dims = image_dimensions(image)
                    .map(|(width, height)| format!("{width}x{height}"))
                    .unwrap_or_else(|| "unknown size".to_string());
                format!(
                    "[dryrun] Looking at {} ({dims}): {}",
                    image.name,
                    request.prompt.trim()
                )
            }
            None => format!("[dryrun] You said: {}", request.prompt.trim()),
        };
        Ok(TextResponse {
            text,
            model: request.model.to_string(),
        })
    }
}
