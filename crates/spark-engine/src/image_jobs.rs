use serde_json::{Map, Value};
use spark_contracts::chat::Session;
use spark_contracts::events::EventWriter;
use spark_contracts::generation::{
    validate_credential, CredentialError, GenerationRequest, RequestError,
};
use spark_contracts::models::ModelSpec;

use crate::error::SparkError;
use crate::error_chain_text;
use crate::image_providers::{ImageJobRequest, ImageProvider};

/// Lifecycle of one generate action:
/// `Idle → Validating → Submitting → Succeeded | EmptyResult`, with
/// `InvalidCredential`, `InvalidRequest` and `ProviderError` as early exits.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageJobState {
    Idle,
    Validating,
    InvalidCredential(CredentialError),
    InvalidRequest(RequestError),
    Submitting,
    ProviderError(String),
    EmptyResult,
    Succeeded(Vec<String>),
}

impl ImageJobState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::InvalidCredential(_) => "invalid_credential",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Submitting => "submitting",
            Self::ProviderError(_) => "provider_error",
            Self::EmptyResult => "empty_result",
            Self::Succeeded(_) => "succeeded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Idle | Self::Validating | Self::Submitting)
    }

    fn detail(&self) -> Option<String> {
        match self {
            Self::InvalidCredential(err) => Some(err.to_string()),
            Self::InvalidRequest(err) => Some(err.to_string()),
            Self::ProviderError(message) => Some(message.clone()),
            Self::Succeeded(images) => Some(format!("{} image(s)", images.len())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageJob {
    state: ImageJobState,
    trail: Vec<&'static str>,
}

impl ImageJob {
    fn new() -> Self {
        Self {
            state: ImageJobState::Idle,
            trail: vec![ImageJobState::Idle.label()],
        }
    }

    pub fn state(&self) -> &ImageJobState {
        &self.state
    }

    /// Labels of every state the job passed through, in order.
    pub fn trail(&self) -> &[&'static str] {
        self.trail.as_slice()
    }

    pub fn images(&self) -> Option<&[String]> {
        match &self.state {
            ImageJobState::Succeeded(images) => Some(images.as_slice()),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<Vec<String>, SparkError> {
        match self.state {
            ImageJobState::Succeeded(images) => Ok(images),
            ImageJobState::InvalidCredential(err) => Err(err.into()),
            ImageJobState::InvalidRequest(err) => Err(err.into()),
            ImageJobState::ProviderError(message) => Err(SparkError::Provider(message)),
            ImageJobState::EmptyResult => Err(SparkError::EmptyResult(
                "image provider returned no images".to_string(),
            )),
            other => Err(SparkError::Provider(format!(
                "image job stopped in state '{}'",
                other.label()
            ))),
        }
    }
}

pub struct ImageJobRunner {
    provider: Box<dyn ImageProvider>,
    model: ModelSpec,
    events: EventWriter,
}

impl ImageJobRunner {
    pub fn new(provider: Box<dyn ImageProvider>, model: ModelSpec, events: EventWriter) -> Self {
        Self {
            provider,
            model,
            events,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    /// Validates, submits once, and reports where the job ended. Nothing
    /// reaches the provider unless both the credential and the request pass.
    pub fn run(&self, request: &GenerationRequest, credential: Option<&str>) -> ImageJob {
        let mut job = ImageJob::new();
        self.advance(&mut job, ImageJobState::Validating);

        let token = match validate_credential(credential) {
            Ok(token) => token,
            Err(err) => {
                self.advance(&mut job, ImageJobState::InvalidCredential(err));
                return job;
            }
        };
        if let Err(err) = request.validate() {
            self.advance(&mut job, ImageJobState::InvalidRequest(err));
            return job;
        }

        self.advance(&mut job, ImageJobState::Submitting);
        let submission = ImageJobRequest {
            model: &self.model.remote_id,
            credential: token,
            input: request.provider_input(),
        };
        let expected = request.num_outputs as usize;
        let next = match self.provider.generate(&submission) {
            Err(err) => ImageJobState::ProviderError(error_chain_text(&err, 512)),
            Ok(images) if images.is_empty() => ImageJobState::EmptyResult,
            Ok(images) if images.len() != expected => ImageJobState::ProviderError(format!(
                "image provider returned {} of {expected} requested images",
                images.len()
            )),
            Ok(images) => ImageJobState::Succeeded(images),
        };
        self.advance(&mut job, next);
        job
    }

    /// Runs a job and, only on success, replaces the session's generated images.
    pub fn generate_into(
        &self,
        session: &mut Session,
        request: &GenerationRequest,
        credential: Option<&str>,
    ) -> Result<Vec<String>, SparkError> {
        let images = self.run(request, credential).into_result()?;
        session.replace_generated_images(images.clone());
        Ok(images)
    }

    fn advance(&self, job: &mut ImageJob, next: ImageJobState) {
        let mut payload = Map::new();
        payload.insert(
            "from".to_string(),
            Value::String(job.state.label().to_string()),
        );
        payload.insert("state".to_string(), Value::String(next.label().to_string()));
        payload.insert("model".to_string(), Value::String(self.model.name.clone()));
        payload.insert(
            "detail".to_string(),
            next.detail().map(Value::String).unwrap_or(Value::Null),
        );
        let _ = self.events.emit("image_job_state", payload);

        job.trail.push(next.label());
        job.state = next;
    }
}
