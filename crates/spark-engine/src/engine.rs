use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use spark_contracts::chat::{ImageAttachment, Session};
use spark_contracts::events::EventWriter;
use spark_contracts::generation::GenerationRequest;
use spark_contracts::models::{Capability, ModelSelection, ModelSelector};

use crate::config::{EngineConfig, ProviderMode};
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::download::ImageDownloader;
use crate::error::SparkError;
use crate::image_jobs::{ImageJob, ImageJobRunner};
use crate::image_providers::{DryrunImageProvider, ImageProvider, ReplicateProvider};
use crate::map_object;
use crate::streaming::StreamingRenderer;
use crate::text_providers::{DryrunTextProvider, GeminiProvider, TextProvider};

/// Wires configuration, providers and the session-facing components together.
pub struct SparkEngine {
    config: EngineConfig,
    events: EventWriter,
    dispatcher: Dispatcher,
    image_runner: ImageJobRunner,
    downloader: ImageDownloader,
    renderer: StreamingRenderer,
}

impl SparkEngine {
    pub fn new(config: EngineConfig, events: EventWriter) -> Result<Self> {
        let selector = ModelSelector::default();
        let (text_provider, image_provider, provider_name): (
            Box<dyn TextProvider>,
            Box<dyn ImageProvider>,
            Option<&str>,
        ) = match config.provider_mode {
            ProviderMode::Dryrun => (
                Box::new(DryrunTextProvider),
                Box::new(DryrunImageProvider),
                Some("dryrun"),
            ),
            ProviderMode::Live => (
                Box::new(GeminiProvider::new(
                    config.gemini_api_base.clone(),
                    config.gemini_api_key.clone(),
                )),
                Box::new(ReplicateProvider::new(
                    config.replicate_api_base.clone(),
                    config.replicate_poll_interval,
                    config.replicate_poll_timeout,
                )),
                None,
            ),
        };

        let select = |requested: &str, capability: Capability, provider: &str| {
            let provider = provider_name.unwrap_or(provider);
            selector
                .select_from_provider(Some(requested), capability, provider)
                .map_err(|err| anyhow!(err))
        };
        let text = select(&config.text_model, Capability::Text, "gemini")?;
        let vision = select(&config.vision_model, Capability::Vision, "gemini")?;
        let image = select(&config.image_model, Capability::Image, "replicate")?;

        let mut payload = map_object(json!({
            "provider_mode": match config.provider_mode {
                ProviderMode::Live => "live",
                ProviderMode::Dryrun => "dryrun",
            },
            "text_model": text.model.name,
            "vision_model": vision.model.name,
            "image_model": image.model.name,
        }));
        let fallbacks: Vec<Value> = [&text, &vision, &image]
            .iter()
            .filter_map(|selection| fallback_note(selection))
            .collect();
        payload.insert("fallbacks".to_string(), Value::Array(fallbacks));
        events.emit("session_started", payload)?;

        Ok(Self {
            dispatcher: Dispatcher::new(text_provider, text.model, vision.model, events.clone()),
            image_runner: ImageJobRunner::new(image_provider, image.model, events.clone()),
            downloader: ImageDownloader::new(events.clone()),
            renderer: StreamingRenderer::new(config.stream_delay),
            config,
            events,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn image_runner(&self) -> &ImageJobRunner {
        &self.image_runner
    }

    pub fn downloader(&self) -> &ImageDownloader {
        &self.downloader
    }

    pub fn renderer(&self) -> &StreamingRenderer {
        &self.renderer
    }

    pub fn chat(
        &self,
        session: &mut Session,
        prompt: Option<&str>,
    ) -> Result<DispatchOutcome, SparkError> {
        self.dispatcher.dispatch_turn(session, prompt)
    }

    pub fn describe(
        &self,
        session: &mut Session,
        image: &ImageAttachment,
    ) -> Result<String, SparkError> {
        self.dispatcher.describe_image(session, image)
    }

    /// Falls back to the configured token when the caller supplies none.
    pub fn generate_images(
        &self,
        session: &mut Session,
        request: &GenerationRequest,
        credential: Option<&str>,
    ) -> Result<Vec<String>, SparkError> {
        let credential = credential.or(self.config.replicate_api_token.as_deref());
        self.image_runner.generate_into(session, request, credential)
    }

    pub fn run_image_job(
        &self,
        request: &GenerationRequest,
        credential: Option<&str>,
    ) -> ImageJob {
        let credential = credential.or(self.config.replicate_api_token.as_deref());
        self.image_runner.run(request, credential)
    }

    pub fn reset(&self, session: &mut Session) {
        let dropped = session.len();
        session.reset();
        let _ = self.events.emit(
            "session_reset",
            map_object(json!({ "dropped_messages": dropped })),
        );
    }

    pub fn export(&self, session: &Session) -> String {
        let text = session.export_as_text();
        let _ = self.events.emit(
            "chat_exported",
            map_object(json!({
                "messages": session.len(),
                "bytes": text.len(),
            })),
        );
        text
    }
}

fn fallback_note(selection: &ModelSelection) -> Option<Value> {
    let reason = selection.fallback_reason.as_ref()?;
    Some(json!({
        "requested": selection.requested,
        "model": selection.model.name,
        "reason": reason,
    }))
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use spark_contracts::chat::{Message, Session};
    use spark_contracts::events::EventWriter;
    use spark_contracts::generation::GenerationRequest;

    use super::SparkEngine;
    use crate::config::{EngineConfig, ProviderMode};
    use crate::error::SparkError;

    fn dryrun_config() -> EngineConfig {
        EngineConfig {
            provider_mode: ProviderMode::Dryrun,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn dryrun_engine_selects_dryrun_models() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events = temp.path().join("events.jsonl");
        let engine = SparkEngine::new(dryrun_config(), EventWriter::new(&events, "s-1"))?;
        assert_eq!(engine.dispatcher().text_model().name, "dryrun-text-1");
        assert_eq!(engine.dispatcher().vision_model().name, "dryrun-text-1");
        assert_eq!(engine.image_runner().model().name, "dryrun-image-1");

        let raw = std::fs::read_to_string(&events)?;
        let first: Value = serde_json::from_str(raw.lines().next().unwrap_or("{}"))?;
        assert_eq!(first["type"], "session_started");
        assert_eq!(first["fallbacks"].as_array().map(Vec::len), Some(3));
        Ok(())
    }

    #[test]
    fn live_engine_keeps_configured_models() -> anyhow::Result<()> {
        let engine = SparkEngine::new(EngineConfig::default(), EventWriter::disabled("s-1"))?;
        assert_eq!(engine.dispatcher().text_model().name, "gemini-pro");
        assert_eq!(engine.dispatcher().vision_model().name, "gemini-pro-vision");
        assert_eq!(engine.image_runner().model().name, "sdxl");
        assert_eq!(engine.dispatcher().provider_name(), "gemini");
        assert_eq!(engine.image_runner().provider_name(), "replicate");
        Ok(())
    }

    #[test]
    fn chat_round_trip_then_reset() -> anyhow::Result<()> {
        let engine = SparkEngine::new(dryrun_config(), EventWriter::disabled("s-1"))?;
        let mut session = Session::new();
        let outcome = engine.chat(&mut session, Some("Summarize"))?;
        assert_eq!(outcome.text, "[dryrun] You said: Summarize");
        assert_eq!(
            engine.export(&session),
            "User: Summarize\n\nAssistant: [dryrun] You said: Summarize"
        );

        engine.reset(&mut session);
        assert!(session.is_empty());
        assert!(session.generated_images().is_empty());
        Ok(())
    }

    #[test]
    fn generate_images_uses_configured_token() -> anyhow::Result<()> {
        let config = EngineConfig {
            replicate_api_token: Some("r8_from_env".to_string()),
            ..dryrun_config()
        };
        let engine = SparkEngine::new(config, EventWriter::disabled("s-1"))?;
        let mut session = Session::new();
        session.append(Message::user("keep me"));

        let request = GenerationRequest {
            num_outputs: 2,
            ..GenerationRequest::new("owl")
        };
        let images = engine.generate_images(&mut session, &request, None)?;
        assert_eq!(images.len(), 2);
        assert_eq!(session.generated_images().len(), 2);
        assert_eq!(session.len(), 1);
        Ok(())
    }

    #[test]
    fn bad_or_missing_token_blocks_generation() -> anyhow::Result<()> {
        let engine = SparkEngine::new(dryrun_config(), EventWriter::disabled("s-1"))?;
        let mut session = Session::new();
        let request = GenerationRequest::default();
        let result = engine.generate_images(&mut session, &request, Some("abc123"));
        assert!(matches!(result, Err(SparkError::InvalidCredential(_))));
        assert_eq!(
            engine
                .run_image_job(&GenerationRequest::default(), None)
                .state()
                .label(),
            "invalid_credential"
        );
        Ok(())
    }
}
