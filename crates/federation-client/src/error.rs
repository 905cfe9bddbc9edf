//! Error types for the federation client

use federation_core::FederationError;
use thiserror::Error;

/// Result type for federation client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised while fetching and resolving statements
///
/// `Clone` so one failed fetch can be handed to every caller waiting on the
/// same in-flight computation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Decoding or crypto failure from the core crate
    #[error(transparent)]
    Federation(#[from] FederationError),

    /// Transport-level HTTP failure (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Endpoint answered with a status we cannot use
    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// URL could not be parsed or built
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Cache-only lookup found nothing
    #[error("no cached value available")]
    CacheMiss,

    /// Client construction failed
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Whether another attempt at the same request could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::HttpError(_) => true,
            ClientError::UnexpectedStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::HttpError(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::InvalidUrl(err.to_string())
    }
}
