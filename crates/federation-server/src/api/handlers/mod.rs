//! API request handlers

pub mod resolve;
pub mod trust_marks;
pub mod verify;

pub use resolve::{resolve, ResolveQuery};
pub use trust_marks::{validate_trust_mark, ValidateTrustMarkRequest};
pub use verify::{verify, VerifyRequest};

use std::sync::Arc;

use federation_client::{StatementFetcher, TrustChainResolver, TrustMarkValidator};
use federation_core::{JsonWebTokenVerifier, JwsVerifier, TrustChainVerifier};

use crate::config::ServerConfig;

/// Application state shared across handlers
pub struct AppState {
    /// Statement source shared by every component
    pub fetcher: Arc<dyn StatementFetcher>,
    pub jws: Arc<dyn JwsVerifier>,
    pub resolver: TrustChainResolver,
    pub verifier: TrustChainVerifier,
    pub trust_marks: TrustMarkValidator,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(fetcher: Arc<dyn StatementFetcher>, config: ServerConfig) -> Self {
        let jws: Arc<dyn JwsVerifier> = Arc::new(JsonWebTokenVerifier);

        Self {
            resolver: TrustChainResolver::with_verifier(fetcher.clone(), jws.clone())
                .with_config(config.resolver.clone()),
            verifier: TrustChainVerifier::new(jws.clone()),
            trust_marks: TrustMarkValidator::with_verifier(fetcher.clone(), jws.clone()),
            fetcher,
            jws,
            config,
        }
    }
}
