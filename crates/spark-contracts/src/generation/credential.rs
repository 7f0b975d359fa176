use thiserror::Error;

pub const CREDENTIAL_PREFIX: &str = "r8_";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("image provider token is missing")]
    Missing,
    #[error("image provider token must start with '{CREDENTIAL_PREFIX}'")]
    Malformed,
}

/// Checks an image-provider token before anything is submitted. The token is
/// taken verbatim: surrounding whitespace makes it malformed.
pub fn validate_credential(token: Option<&str>) -> Result<&str, CredentialError> {
    let token = token.unwrap_or_default();
    if token.is_empty() {
        return Err(CredentialError::Missing);
    }
    if !token.starts_with(CREDENTIAL_PREFIX) {
        return Err(CredentialError::Malformed);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::{validate_credential, CredentialError};

    #[test]
    fn accepts_prefixed_token() {
        assert_eq!(validate_credential(Some("r8_abc")), Ok("r8_abc"));
    }

    #[test]
    fn leading_whitespace_is_not_stripped() {
        assert_eq!(
            validate_credential(Some(" r8_abc")),
            Err(CredentialError::Malformed)
        );
        assert_eq!(
            validate_credential(Some("\tr8_abc")),
            Err(CredentialError::Malformed)
        );
    }

    #[test]
    fn rejects_missing_and_malformed_tokens() {
        assert_eq!(validate_credential(None), Err(CredentialError::Missing));
        assert_eq!(validate_credential(Some("")), Err(CredentialError::Missing));
        assert_eq!(validate_credential(Some("  ")), Err(CredentialError::Malformed));
        assert_eq!(
            validate_credential(Some("abc123")),
            Err(CredentialError::Malformed)
        );
    }
}
