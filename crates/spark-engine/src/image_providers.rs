use std::io::Cursor;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};

use crate::{color_from_prompt, response_json_or_error, short_id};

/// One text-to-image submission, already validated.
#[derive(Debug, Clone)]
pub struct ImageJobRequest<'a> {
    /// Wire identifier, e.g. `owner/model:version`.
    pub model: &'a str,
    pub credential: &'a str,
    pub input: Map<String, Value>,
}

pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    /// Returns image references in provider order. An empty list is a valid
    /// provider reply; deciding whether it counts as success is up to the caller.
    fn generate(&self, request: &ImageJobRequest<'_>) -> Result<Vec<String>>;
}

pub struct ReplicateProvider {
    api_base: String,
    poll_interval: Duration,
    poll_timeout: Duration,
    http: HttpClient,
}

impl ReplicateProvider {
    pub fn new(
        api_base: impl Into<String>,
        poll_interval: Duration,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            poll_interval,
            poll_timeout,
            http: HttpClient::new(),
        }
    }

    /// `owner/name:version` goes to the generic predictions endpoint with a
    /// pinned version; a bare `owner/name` uses the model's own endpoint.
    fn prediction_target(&self, model: &str, input: &Map<String, Value>) -> (String, Value) {
        let trimmed = model.trim();
        match trimmed.split_once(':') {
            Some((_, version)) => (
                format!("{}/predictions", self.api_base),
                json!({ "version": version, "input": input }),
            ),
            None => (
                format!("{}/models/{}/predictions", self.api_base, trimmed),
                json!({ "input": input }),
            ),
        }
    }

    fn prediction_status(prediction: &Value) -> String {
        prediction
            .get("status")
            .and_then(Value::as_str)
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_default()
    }

    fn poll_prediction(&self, poll_url: &str, credential: &str) -> Result<Value> {
        let started = Instant::now();
        loop {
            let response = self
                .http
                .get(poll_url)
                .bearer_auth(credential)
                .send()
                .with_context(|| format!("Replicate poll request failed ({poll_url})"))?;
            let payload = response_json_or_error("Replicate poll", response)?;
            let status = Self::prediction_status(&payload);
            if status == "succeeded" {
                return Ok(payload);
            }
            if matches!(status.as_str(), "failed" | "canceled") {
                bail!("Replicate prediction {status}: {}", prediction_error(&payload));
            }
            if started.elapsed() >= self.poll_timeout {
                bail!(
                    "Replicate polling gave up after {:.1}s",
                    self.poll_timeout.as_secs_f64()
                );
            }
            thread::sleep(self.poll_interval);
        }
    }

    fn extract_output_urls(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(url) => {
                let trimmed = url.trim();
                if !trimmed.is_empty()
                    && (trimmed.starts_with("http") || trimmed.starts_with("data:"))
                    && !out.iter().any(|existing| existing == trimmed)
                {
                    out.push(trimmed.to_string());
                }
            }
            Value::Array(rows) => {
                for row in rows {
                    Self::extract_output_urls(row, out);
                }
            }
            Value::Object(obj) => {
                if let Some(url) = obj.get("url") {
                    Self::extract_output_urls(url, out);
                }
                if let Some(output) = obj.get("output") {
                    Self::extract_output_urls(output, out);
                }
            }
            _ => {}
        }
    }
}

fn prediction_error(prediction: &Value) -> String {
    prediction
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| prediction.to_string())
}

impl ImageProvider for ReplicateProvider {
    fn name(&self) -> &str {
        "replicate"
    }

    fn generate(&self, request: &ImageJobRequest<'_>) -> Result<Vec<String>> {
        let (endpoint, payload) = self.prediction_target(request.model, &request.input);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(request.credential)
            .header("Prefer", "wait")
            .json(&payload)
            .send()
            .with_context(|| format!("Replicate request failed ({endpoint})"))?;
        let mut prediction = response_json_or_error("Replicate", response)?;

        let status = Self::prediction_status(&prediction);
        if status != "succeeded" {
            if !matches!(status.as_str(), "starting" | "processing") {
                bail!("Replicate prediction {status}: {}", prediction_error(&prediction));
            }
            let poll_url = prediction
                .get("urls")
                .and_then(|urls| urls.get("get"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .ok_or_else(|| anyhow!("Replicate prediction missing poll URL"))?;
            prediction = self.poll_prediction(&poll_url, request.credential)?;
        }

        let mut urls = Vec::new();
        if let Some(output) = prediction.get("output") {
            Self::extract_output_urls(output, &mut urls);
        }
        Ok(urls)
    }
}

/// Offline stand-in: one solid-colour PNG per requested output, derived from
/// the prompt and returned inline as `data:` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunImageProvider;

impl DryrunImageProvider {
    const MAX_EDGE: u32 = 256;

    fn render_png(prompt: &str, idx: u64, width: u32, height: u32) -> Result<Vec<u8>> {
        let (r, g, b) = color_from_prompt(prompt, idx);
        let image = RgbImage::from_pixel(width, height, Rgb([r, g, b]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut buffer, ImageFormat::Png)
            .context("failed encoding dryrun image")?;
        Ok(buffer.into_inner())
    }
}

impl ImageProvider for DryrunImageProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &ImageJobRequest<'_>) -> Result<Vec<String>> {
        let input = &request.input;
        let prompt = input
            .get("prompt")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let dimension = |key: &str| {
            input
                .get(key)
                .and_then(Value::as_u64)
                .map(|value| (value as u32).clamp(1, Self::MAX_EDGE))
                .unwrap_or(Self::MAX_EDGE)
        };
        let (width, height) = (dimension("width"), dimension("height"));
        let count = input
            .get("num_outputs")
            .and_then(Value::as_u64)
            .unwrap_or(1);

        let mut urls = Vec::new();
        for idx in 0..count {
            let png = Self::render_png(prompt, idx, width, height)?;
            urls.push(format!(
                "data:image/png;base64,{}#{}",
                BASE64.encode(png),
                short_id(prompt, idx)
            ));
        }
        Ok(urls)
    }
}
