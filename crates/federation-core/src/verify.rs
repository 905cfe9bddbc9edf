//! Trust chain verification
//!
//! Re-validates an already assembled trust chain, independent of how it was
//! discovered. Verification is authoritative: it never retries, never
//! touches the network, and fails closed.
//!
//! For every statement `j`, in order, stopping at the first failure:
//!
//! 1. Required claims `sub, iss, exp, iat, jwks` are present
//! 2. `iat <= now` and `exp > now`
//! 3. `j == 0`: the subject configuration is self-issued and verifies
//!    against its own JWKS
//! 4. `j < last`: `chain[j].iss == chain[j+1].sub`, and `chain[j]` verifies
//!    against a key in `chain[j+1]`'s JWKS
//! 5. `j == last`: the issuer matches the expected trust anchor (if any) and
//!    the statement verifies against its own JWKS

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::FederationError;
use crate::jws::{verify_with_jwks, JsonWebTokenVerifier, JwsVerifier};
use crate::jwt::Jwt;
use crate::statement::{EntityStatement, StatementClaims, REQUIRED_CLAIMS};

/// Message returned for chains shorter than [`crate::TrustChain::MIN_LENGTH`]
pub const CHAIN_TOO_SHORT: &str = "Trust chain must contain at least 3 statements";

/// Outcome of verifying a trust chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResult {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl VerifyResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(error.into()),
        }
    }
}

/// Why a chain was rejected
enum Rejection {
    /// A verification rule did not hold
    Rule(String),
    /// Decoding or crypto failed outright
    Failure(FederationError),
}

impl From<FederationError> for Rejection {
    fn from(err: FederationError) -> Self {
        Rejection::Failure(err)
    }
}

/// Stateless verifier for assembled trust chains
#[derive(Clone)]
pub struct TrustChainVerifier {
    jws: Arc<dyn JwsVerifier>,
}

impl TrustChainVerifier {
    /// Create a verifier using the given JWS verification capability
    pub fn new(jws: Arc<dyn JwsVerifier>) -> Self {
        Self { jws }
    }

    /// Verify `chain`, optionally pinning the trust anchor
    ///
    /// `current_time` is epoch seconds; wall-clock time is used when absent.
    pub async fn verify(
        &self,
        chain: &[String],
        trust_anchor: Option<&str>,
        current_time: Option<i64>,
    ) -> VerifyResult {
        let now = current_time.unwrap_or_else(|| chrono::Utc::now().timestamp());

        match self.check_chain(chain, trust_anchor, now).await {
            Ok(()) => {
                debug!(length = chain.len(), "Trust chain verified");
                VerifyResult::valid()
            }
            Err(Rejection::Rule(reason)) => {
                warn!(reason = %reason, "Trust chain rejected");
                VerifyResult::invalid(reason)
            }
            Err(Rejection::Failure(e)) => {
                warn!(error = %e, "Trust chain verification errored");
                VerifyResult::invalid(format!("Trust chain verification failed: {}", e))
            }
        }
    }

    async fn check_chain(
        &self,
        chain: &[String],
        trust_anchor: Option<&str>,
        now: i64,
    ) -> Result<(), Rejection> {
        if chain.len() < crate::TrustChain::MIN_LENGTH {
            return Err(Rejection::Rule(CHAIN_TOO_SHORT.into()));
        }

        let last = chain.len() - 1;

        // Statements are decoded as each rule reaches them so the first
        // failing position is the one reported.
        for (j, raw) in chain.iter().enumerate() {
            let jwt = Jwt::decode(raw)?;
            let statement = statement_at(&jwt, j)?;

            if statement.iat() > now {
                return Err(Rejection::Rule(format!(
                    "Statement at position {} has invalid iat",
                    j
                )));
            }
            if statement.exp() <= now {
                return Err(Rejection::Rule(format!(
                    "Statement at position {} has expired",
                    j
                )));
            }

            if j == 0 {
                if statement.iss() != statement.sub() {
                    return Err(Rejection::Rule(
                        "First statement must be self-issued (iss must equal sub)".into(),
                    ));
                }
                if !verify_with_jwks(self.jws.as_ref(), &jwt, statement.jwks()).await {
                    return Err(Rejection::Rule(
                        "Invalid signature for statement at position 0 against its own JWKS"
                            .into(),
                    ));
                }
            }

            if j < last {
                let next_jwt = Jwt::decode(&chain[j + 1])?;
                let next = statement_at(&next_jwt, j + 1)?;
                if statement.iss() != next.sub() {
                    return Err(Rejection::Rule(format!(
                        "Issuer of statement at position {} does not match subject of statement at position {}",
                        j,
                        j + 1
                    )));
                }
                if !verify_with_jwks(self.jws.as_ref(), &jwt, next.jwks()).await {
                    return Err(Rejection::Rule(format!(
                        "Invalid signature for statement at position {}",
                        j
                    )));
                }
            } else {
                if let Some(anchor) = trust_anchor {
                    if statement.iss() != anchor {
                        return Err(Rejection::Rule(
                            "Last statement issuer does not match trust anchor".into(),
                        ));
                    }
                }
                if !verify_with_jwks(self.jws.as_ref(), &jwt, statement.jwks()).await {
                    return Err(Rejection::Rule(
                        "Invalid signature for trust anchor statement".into(),
                    ));
                }
            }
        }

        Ok(())
    }
}

impl Default for TrustChainVerifier {
    fn default() -> Self {
        Self::new(Arc::new(JsonWebTokenVerifier))
    }
}

impl std::fmt::Debug for TrustChainVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustChainVerifier").finish_non_exhaustive()
    }
}

fn statement_at(jwt: &Jwt, position: usize) -> Result<EntityStatement, Rejection> {
    let missing = jwt.missing_claims(&REQUIRED_CLAIMS);
    if !missing.is_empty() {
        return Err(Rejection::Rule(format!(
            "Statement at position {} is missing required claims: {}",
            position,
            missing.join(", ")
        )));
    }
    Ok(EntityStatement::from_jwt(jwt)?)
}
