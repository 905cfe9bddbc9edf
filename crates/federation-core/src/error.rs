//! Error types for federation statement handling

use thiserror::Error;

/// Result type alias using FederationError
pub type Result<T> = std::result::Result<T, FederationError>;

/// Errors raised while decoding statements or checking their signatures
///
/// Variants carry rendered messages rather than source errors so the type
/// stays `Clone`; a single failure can then be handed to every caller that
/// awaited the same computation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FederationError {
    /// The compact JWS could not be split or its segments decoded
    #[error("Malformed JWT: {0}")]
    MalformedJwt(String),

    /// A claim the statement type requires is absent
    #[error("Missing required claim: {0}")]
    MissingClaim(String),

    /// A claim is present but has the wrong shape or value
    #[error("Invalid claim: {0}")]
    InvalidClaim(String),

    /// No JWK with the requested kid
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// The JWS algorithm cannot be used with the selected key
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Signature did not verify
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Entity identifier or endpoint is not a usable URL
    #[error("Invalid entity identifier: {0}")]
    InvalidEntityIdentifier(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for FederationError {
    fn from(err: serde_json::Error) -> Self {
        FederationError::SerializationError(err.to_string())
    }
}

impl From<base64::DecodeError> for FederationError {
    fn from(err: base64::DecodeError) -> Self {
        FederationError::MalformedJwt(format!("invalid base64url segment: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for FederationError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::InvalidSignature => FederationError::InvalidSignature(err.to_string()),
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                FederationError::UnsupportedAlgorithm(err.to_string())
            }
            ErrorKind::InvalidKeyFormat
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey => {
                FederationError::InvalidClaim(format!("unusable JWK: {}", err))
            }
            _ => FederationError::MalformedJwt(err.to_string()),
        }
    }
}
