use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Map, Value};
use spark_contracts::events::EventWriter;

use crate::error::SparkError;
use crate::{error_chain_text, truncate_text};

pub const DOWNLOAD_FAILED_PLACEHOLDER: &str = "<small>Download failed</small>";

/// Suggested file name for the `index`-th (zero-based) generated image.
pub fn generated_image_filename(index: usize) -> String {
    format!("msai_img_{}.png", index + 1)
}

pub fn format_link(text: &str, url: &str) -> String {
    format!("<a href=\"{url}\" target=\"_blank\">{text}</a>")
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FetchedImage {
    bytes: Vec<u8>,
    mime_type: String,
}

/// Turns image references into bytes, files, or self-contained links.
pub struct ImageDownloader {
    http: HttpClient,
    events: EventWriter,
}

impl ImageDownloader {
    pub fn new(events: EventWriter) -> Self {
        Self {
            http: HttpClient::new(),
            events,
        }
    }

    /// HTML link with the image bytes inline. Fetch failures degrade to
    /// [`DOWNLOAD_FAILED_PLACEHOLDER`].
    pub fn image_download_link(&self, url: &str, filename: &str) -> String {
        match self.fetch(url) {
            Ok(image) => format!(
                "<a href=\"data:{};base64,{}\" download=\"{filename}\">Download Image</a>",
                image.mime_type,
                BASE64.encode(image.bytes)
            ),
            Err(err) => {
                self.report(url, &err);
                DOWNLOAD_FAILED_PLACEHOLDER.to_string()
            }
        }
    }

    /// Saves the image at `url` to `destination`; `false` if anything failed.
    pub fn download_file(&self, url: &str, destination: &Path) -> bool {
        let result = self.fetch(url).and_then(|image| {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(destination, image.bytes)
                .with_context(|| format!("failed to write {}", destination.display()))
        });
        match result {
            Ok(()) => true,
            Err(err) => {
                self.report(url, &err);
                false
            }
        }
    }

    pub fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, SparkError> {
        self.fetch(url)
            .map(|image| image.bytes)
            .map_err(|err| SparkError::DownloadFailure(error_chain_text(&err, 512)))
    }

    fn fetch(&self, url: &str) -> Result<FetchedImage> {
        let trimmed = url.trim();
        if trimmed.starts_with("data:") {
            return decode_data_url(trimmed);
        }
        let response = self
            .http
            .get(trimmed)
            .send()
            .with_context(|| format!("failed downloading image ({trimmed})"))?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            bail!("image download failed ({code})");
        }
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or_default().trim().to_string())
            .filter(|value| value.starts_with("image/"))
            .unwrap_or_else(|| "image/png".to_string());
        let bytes = response
            .bytes()
            .context("failed reading image bytes")?
            .to_vec();
        Ok(FetchedImage { bytes, mime_type })
    }

    fn report(&self, url: &str, err: &anyhow::Error) {
        let mut payload = Map::new();
        payload.insert(
            "url".to_string(),
            Value::String(truncate_text(url, 120)),
        );
        payload.insert("error".to_string(), Value::String(error_chain_text(err, 512)));
        let _ = self.events.emit("image_download_failed", payload);
    }
}

fn decode_data_url(url: &str) -> Result<FetchedImage> {
    let without_fragment = url.split('#').next().unwrap_or_default();
    let (header, data) = without_fragment
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| anyhow!("malformed data URL"))?;
    let Some(mime_type) = header.strip_suffix(";base64") else {
        bail!("data URL is not base64 encoded");
    };
    let bytes = BASE64
        .decode(data.as_bytes())
        .context("data URL base64 decode failed")?;
    let mime_type = if mime_type.is_empty() {
        "image/png".to_string()
    } else {
        mime_type.to_string()
    };
    Ok(FetchedImage { bytes, mime_type })
}
