use serde_json::{json, Value};
use spark_contracts::chat::{ImageAttachment, Message, Session};
use spark_contracts::events::EventWriter;
use spark_contracts::models::ModelSpec;

use crate::error::SparkError;
use crate::map_object;
use crate::text_providers::{TextProvider, TextRequest, TextResponse};

pub const DESCRIBE_PROMPT: &str = "Describe this image in detail.";
const NO_DESCRIPTION: &str = "No description.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Vision,
    Text,
}

impl Route {
    /// Vision needs both an image and prompt text; an image alone is not
    /// routed anywhere.
    pub fn select(prompt: Option<&str>, image: Option<&ImageAttachment>) -> Option<Self> {
        let has_prompt = prompt.is_some_and(|value| !value.trim().is_empty());
        match (has_prompt, image.is_some()) {
            (true, true) => Some(Self::Vision),
            (true, false) => Some(Self::Text),
            (false, _) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vision => "vision",
            Self::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub route: Route,
    pub model: String,
    pub text: String,
}

pub struct Dispatcher {
    provider: Box<dyn TextProvider>,
    text_model: ModelSpec,
    vision_model: ModelSpec,
    events: EventWriter,
}

impl Dispatcher {
    pub fn new(
        provider: Box<dyn TextProvider>,
        text_model: ModelSpec,
        vision_model: ModelSpec,
        events: EventWriter,
    ) -> Self {
        Self {
            provider,
            text_model,
            vision_model,
            events,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn text_model(&self) -> &ModelSpec {
        &self.text_model
    }

    pub fn vision_model(&self) -> &ModelSpec {
        &self.vision_model
    }

    /// Runs one chat turn with explicit inputs.
    ///
    /// The user message is appended before the provider call and stays in
    /// the session if the call fails; the assistant message is appended only
    /// for a non-empty reply.
    pub fn dispatch(
        &self,
        session: &mut Session,
        prompt: Option<&str>,
        image: Option<&ImageAttachment>,
    ) -> Result<DispatchOutcome, SparkError> {
        let (Some(route), Some(prompt)) = (Route::select(prompt, image), prompt) else {
            return Err(self.fail(None, SparkError::MissingInput));
        };

        self.append(session, Message::user(prompt), route);
        let response = self.call(route, prompt, image)?;
        if response.text.trim().is_empty() {
            return Err(self.fail(
                Some(route),
                SparkError::EmptyResult("provider returned no text".to_string()),
            ));
        }

        self.append(session, Message::assistant(response.text.clone()), route);
        Ok(DispatchOutcome {
            route,
            model: response.model,
            text: response.text,
        })
    }

    /// Runs one chat turn using the session's attached image, if any. The
    /// attachment is consumed only when the turn reaches a provider.
    pub fn dispatch_turn(
        &self,
        session: &mut Session,
        prompt: Option<&str>,
    ) -> Result<DispatchOutcome, SparkError> {
        let image = match Route::select(prompt, session.pending_image()) {
            Some(Route::Vision) => session.take_pending_image(),
            _ => None,
        };
        self.dispatch(session, prompt, image.as_ref())
    }

    /// Asks the vision model for a description and records it as a single
    /// assistant message.
    pub fn describe_image(
        &self,
        session: &mut Session,
        image: &ImageAttachment,
    ) -> Result<String, SparkError> {
        let response = self.call(Route::Vision, DESCRIBE_PROMPT, Some(image))?;
        let description = match response.text.trim() {
            "" => NO_DESCRIPTION.to_string(),
            text => text.to_string(),
        };
        self.append(
            session,
            Message::assistant(format!("**Description:** {description}")),
            Route::Vision,
        );
        Ok(description)
    }

    fn call(
        &self,
        route: Route,
        prompt: &str,
        image: Option<&ImageAttachment>,
    ) -> Result<TextResponse, SparkError> {
        let model = match route {
            Route::Vision => &self.vision_model,
            Route::Text => &self.text_model,
        };
        let request = TextRequest {
            model: &model.remote_id,
            prompt,
            image: image.filter(|_| route == Route::Vision),
        };
        self.provider
            .generate(&request)
            .map_err(|err| self.fail(Some(route), SparkError::provider(&err)))
    }

    fn append(&self, session: &mut Session, message: Message, route: Route) {
        self.log(json!({
            "type": "message_appended",
            "role": message.role().as_str(),
            "route": route.as_str(),
            "chars": message.content().chars().count(),
            "index": session.len(),
        }));
        session.append(message);
    }

    fn fail(&self, route: Option<Route>, err: SparkError) -> SparkError {
        self.log(json!({
            "type": "dispatch_failed",
            "kind": err.kind(),
            "route": route.map(|value| value.as_str()),
            "error": err.to_string(),
        }));
        err
    }

    fn log(&self, payload: Value) {
        let event_type = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("dispatch")
            .to_string();
        let mut payload = map_object(payload);
        payload.remove("type");
        // Logging failures never fail the turn.
        let _ = self.events.emit(&event_type, payload);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::bail;
    use serde_json::Value;
    use spark_contracts::chat::{ImageAttachment, Role, Session};
    use spark_contracts::events::EventWriter;
    use spark_contracts::models::{Capability, ModelRegistry};

    use super::{Dispatcher, Route};
    use crate::error::SparkError;
    use crate::text_providers::{TextProvider, TextRequest, TextResponse};

    #[derive(Debug, Clone, PartialEq)]
    struct Call {
        model: String,
        prompt: String,
        had_image: bool,
    }

    #[derive(Clone)]
    struct FakeProvider {
        reply: Result<String, String>,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl FakeProvider {
        fn replying(reply: Result<&str, &str>) -> Self {
            Self {
                reply: reply.map(str::to_string).map_err(str::to_string),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
        }
    }

    impl TextProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        fn generate(&self, request: &TextRequest<'_>) -> anyhow::Result<TextResponse> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(Call {
                    model: request.model.to_string(),
                    prompt: request.prompt.to_string(),
                    had_image: request.image.is_some(),
                });
            }
            match &self.reply {
                Ok(text) => Ok(TextResponse {
                    text: text.clone(),
                    model: request.model.to_string(),
                }),
                Err(message) => bail!("{message}"),
            }
        }
    }

    fn dispatcher(provider: &FakeProvider, events: EventWriter) -> Dispatcher {
        let registry = ModelRegistry::default();
        let text = registry.ensure("gemini-pro", Capability::Text);
        let vision = registry.ensure("gemini-pro-vision", Capability::Vision);
        match (text, vision) {
            (Some(text), Some(vision)) => {
                Dispatcher::new(Box::new(provider.clone()), text, vision, events)
            }
            _ => panic!("default registry is missing gemini models"),
        }
    }

    fn image() -> ImageAttachment {
        ImageAttachment::new("cat.png", "image/png", vec![0, 1, 2])
    }

    #[test]
    fn route_precedence() {
        let img = image();
        assert_eq!(Route::select(Some("hi"), Some(&img)), Some(Route::Vision));
        assert_eq!(Route::select(Some("hi"), None), Some(Route::Text));
        assert_eq!(Route::select(Some("  "), Some(&img)), None);
        assert_eq!(Route::select(None, Some(&img)), None);
        assert_eq!(Route::select(None, None), None);
    }

    #[test]
    fn text_prompt_calls_text_model_once_and_appends_both_turns() -> anyhow::Result<()> {
        let provider = FakeProvider::replying(Ok("Here is a summary."));
        let dispatcher = dispatcher(&provider, EventWriter::disabled("test"));
        let mut session = Session::new();

        let outcome = dispatcher.dispatch(&mut session, Some("Summarize"), None)?;
        assert_eq!(outcome.route, Route::Text);
        assert_eq!(outcome.text, "Here is a summary.");
        assert_eq!(
            provider.calls(),
            vec![Call {
                model: "gemini-pro".to_string(),
                prompt: "Summarize".to_string(),
                had_image: false,
            }]
        );

        let roles: Vec<Role> = session.messages().iter().map(|m| m.role()).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(session.messages()[0].content(), "Summarize");
        assert_eq!(session.messages()[1].content(), "Here is a summary.");
        Ok(())
    }

    #[test]
    fn image_with_prompt_goes_to_vision_model() -> anyhow::Result<()> {
        let provider = FakeProvider::replying(Ok("A cat."));
        let dispatcher = dispatcher(&provider, EventWriter::disabled("test"));
        let mut session = Session::new();
        let img = image();

        let outcome = dispatcher.dispatch(&mut session, Some("What is this?"), Some(&img))?;
        assert_eq!(outcome.route, Route::Vision);
        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "gemini-pro-vision");
        assert!(calls[0].had_image);
        Ok(())
    }

    #[test]
    fn image_without_prompt_makes_no_call() {
        let provider = FakeProvider::replying(Ok("unused"));
        let dispatcher = dispatcher(&provider, EventWriter::disabled("test"));
        let mut session = Session::new();
        let img = image();

        let result = dispatcher.dispatch(&mut session, Some(""), Some(&img));
        assert_eq!(result, Err(SparkError::MissingInput));
        assert!(provider.calls().is_empty());
        assert!(session.is_empty());
    }

    #[test]
    fn provider_failure_keeps_user_turn_only() {
        let provider = FakeProvider::replying(Err("quota exceeded"));
        let dispatcher = dispatcher(&provider, EventWriter::disabled("test"));
        let mut session = Session::new();
        session.append(spark_contracts::chat::Message::assistant("earlier"));

        let result = dispatcher.dispatch(&mut session, Some("Hello"), None);
        assert_eq!(
            result,
            Err(SparkError::Provider("quota exceeded".to_string()))
        );
        assert_eq!(session.len(), 2);
        assert_eq!(session.messages()[0].content(), "earlier");
        assert_eq!(session.messages()[1].role(), Role::User);
    }

    #[test]
    fn empty_reply_is_reported_and_not_appended() {
        let provider = FakeProvider::replying(Ok("   "));
        let dispatcher = dispatcher(&provider, EventWriter::disabled("test"));
        let mut session = Session::new();

        let result = dispatcher.dispatch(&mut session, Some("Hello"), None);
        assert!(matches!(result, Err(SparkError::EmptyResult(_))));
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn attachment_applies_to_exactly_one_turn() -> anyhow::Result<()> {
        let provider = FakeProvider::replying(Ok("ok"));
        let dispatcher = dispatcher(&provider, EventWriter::disabled("test"));
        let mut session = Session::new();
        session.attach_image(image());

        assert_eq!(
            dispatcher.dispatch_turn(&mut session, None),
            Err(SparkError::MissingInput)
        );
        assert!(session.pending_image().is_some());

        assert_eq!(
            dispatcher.dispatch_turn(&mut session, Some("What is it?"))?.route,
            Route::Vision
        );
        assert!(session.pending_image().is_none());

        assert_eq!(
            dispatcher.dispatch_turn(&mut session, Some("And now?"))?.route,
            Route::Text
        );
        let had_image: Vec<bool> = provider.calls().iter().map(|c| c.had_image).collect();
        assert_eq!(had_image, vec![true, false]);
        Ok(())
    }

    #[test]
    fn describe_image_appends_single_assistant_message() -> anyhow::Result<()> {
        let provider = FakeProvider::replying(Ok(""));
        let dispatcher = dispatcher(&provider, EventWriter::disabled("test"));
        let mut session = Session::new();

        let description = dispatcher.describe_image(&mut session, &image())?;
        assert_eq!(description, "No description.");
        assert_eq!(session.len(), 1);
        assert_eq!(session.messages()[0].role(), Role::Assistant);
        assert_eq!(
            session.messages()[0].content(),
            "**Description:** No description."
        );
        assert_eq!(provider.calls()[0].prompt, "Describe this image in detail.");
        Ok(())
    }

    #[test]
    fn failed_describe_leaves_session_untouched() {
        let provider = FakeProvider::replying(Err("down"));
        let dispatcher = dispatcher(&provider, EventWriter::disabled("test"));
        let mut session = Session::new();

        let result = dispatcher.describe_image(&mut session, &image());
        assert_eq!(result, Err(SparkError::Provider("down".to_string())));
        assert_eq!(session.len(), 0);
        assert_eq!(provider.calls().len(), 1);
        assert!(provider.calls()[0].had_image);
    }

    #[test]
    fn events_record_appends_and_failures() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let provider = FakeProvider::replying(Err("boom"));
        let dispatcher = dispatcher(&provider, EventWriter::new(&path, "session-1"));
        let mut session = Session::new();

        let _ = dispatcher.dispatch(&mut session, Some("Hello"), None);
        let _ = dispatcher.dispatch(&mut session, None, None);

        let rows: Vec<Value> = std::fs::read_to_string(&path)?
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        let kinds: Vec<(String, String)> = rows
            .iter()
            .map(|row| {
                (
                    row["type"].as_str().unwrap_or_default().to_string(),
                    row.get("kind")
                        .or_else(|| row.get("role"))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                )
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("message_appended".to_string(), "user".to_string()),
                ("dispatch_failed".to_string(), "provider_error".to_string()),
                ("dispatch_failed".to_string(), "missing_input".to_string()),
            ]
        );
        assert!(rows.iter().all(|row| row["session_id"] == "session-1"));
        Ok(())
    }
}
