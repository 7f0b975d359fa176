use std::env;
use std::time::Duration;

use crate::streaming::DEFAULT_CHUNK_DELAY;

const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    Live,
    Dryrun,
}

/// Runtime settings, read from the environment and overridable by CLI flags.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub provider_mode: ProviderMode,
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub text_model: String,
    pub vision_model: String,
    pub image_model: String,
    pub replicate_api_token: Option<String>,
    pub replicate_api_base: String,
    pub replicate_poll_interval: Duration,
    pub replicate_poll_timeout: Duration,
    pub stream_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider_mode: ProviderMode::Live,
            gemini_api_key: None,
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            text_model: "gemini-pro".to_string(),
            vision_model: "gemini-pro-vision".to_string(),
            image_model: "sdxl".to_string(),
            replicate_api_token: None,
            replicate_api_base: DEFAULT_REPLICATE_API_BASE.to_string(),
            replicate_poll_interval: Duration::from_secs(1),
            replicate_poll_timeout: Duration::from_secs(600),
            stream_delay: DEFAULT_CHUNK_DELAY,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter().find_map(|key| {
                lookup(key)
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
            })
        };
        let defaults = Self::default();

        let provider_mode = match get(&["SPARK_PROVIDER"]).map(|value| value.to_ascii_lowercase())
        {
            Some(mode) if mode == "dryrun" => ProviderMode::Dryrun,
            _ => ProviderMode::Live,
        };
        let millis = |keys: &[&str], default: Duration| {
            get(keys)
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            provider_mode,
            gemini_api_key: get(&["GOOGLE_API_KEY", "GEMINI_API_KEY"]),
            gemini_api_base: get(&["GEMINI_API_BASE"])
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.gemini_api_base),
            text_model: get(&["SPARK_TEXT_MODEL"]).unwrap_or(defaults.text_model),
            vision_model: get(&["SPARK_VISION_MODEL"]).unwrap_or(defaults.vision_model),
            image_model: get(&["SPARK_IMAGE_MODEL"]).unwrap_or(defaults.image_model),
            replicate_api_token: get(&["REPLICATE_API_TOKEN"]),
            replicate_api_base: get(&["REPLICATE_API_BASE"])
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.replicate_api_base),
            replicate_poll_interval: millis(
                &["REPLICATE_POLL_INTERVAL_MS"],
                defaults.replicate_poll_interval,
            ),
            replicate_poll_timeout: millis(
                &["REPLICATE_POLL_TIMEOUT_MS"],
                defaults.replicate_poll_timeout,
            ),
            stream_delay: millis(&["SPARK_STREAM_DELAY_MS"], defaults.stream_delay),
        }
    }
}
