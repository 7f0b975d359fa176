mod credential;
mod request;

pub use credential::{validate_credential, CredentialError, CREDENTIAL_PREFIX};
pub use request::{
    GenerationRequest, RequestError, Scheduler, DEFAULT_IMAGE_PROMPT, GUIDANCE_SCALE,
    HIGH_NOISE_FRAC, NEGATIVE_PROMPT, REFINER,
};
