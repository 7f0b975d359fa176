use spark_contracts::generation::{CredentialError, RequestError};
use thiserror::Error;

use crate::error_chain_text;

/// Failure of one user action. None of these end the session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SparkError {
    #[error("Enter text or upload image.")]
    MissingInput,
    #[error("Error: {0}")]
    Provider(String),
    #[error("Enter valid token: {0}")]
    InvalidCredential(#[from] CredentialError),
    #[error("No output: {0}")]
    EmptyResult(String),
    #[error("Download failed: {0}")]
    DownloadFailure(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),
}

impl SparkError {
    pub fn provider(err: &anyhow::Error) -> Self {
        Self::Provider(error_chain_text(err, 512))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingInput => "missing_input",
            Self::Provider(_) => "provider_error",
            Self::InvalidCredential(_) => "invalid_credential",
            Self::EmptyResult(_) => "empty_result",
            Self::DownloadFailure(_) => "download_failure",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}
