//! Trust mark validation
//!
//! A trust mark is accepted when it is unexpired, carries a valid signature
//! from its issuer's published keys, and the trust anchor's policy
//! recognizes the issuer for that mark id. Policy comes from the anchor's
//! entity configuration:
//!
//! - `trust_mark_owners[id]`: the mark must carry a `delegation` JWT signed
//!   by the owner and issued by the owner's `sub`
//! - otherwise `trust_mark_issuers[id]`: the mark's `iss` must be listed
//!
//! When an id has an owner, the issuer list for it is never consulted.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use federation_core::{
    entity_configuration_url, verify_with_jwks, EntityConfiguration, JsonWebTokenVerifier,
    JwsVerifier, Jwt, TrustMarkClaims,
};

use crate::fetcher::StatementFetcher;

/// Outcome of validating a trust mark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustMarkValidationResult {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl TrustMarkValidationResult {
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

/// Validates trust marks against a trust anchor's policy
#[derive(Clone)]
pub struct TrustMarkValidator {
    fetcher: Arc<dyn StatementFetcher>,
    jws: Arc<dyn JwsVerifier>,
}

impl TrustMarkValidator {
    pub fn new(fetcher: Arc<dyn StatementFetcher>) -> Self {
        Self::with_verifier(fetcher, Arc::new(JsonWebTokenVerifier))
    }

    pub fn with_verifier(fetcher: Arc<dyn StatementFetcher>, jws: Arc<dyn JwsVerifier>) -> Self {
        Self { fetcher, jws }
    }

    /// Validate one trust mark JWT against `trust_anchor`'s policy
    ///
    /// Never fails: fetch and decode problems are reported as an invalid
    /// result.
    pub async fn validate_trust_mark(
        &self,
        trust_mark: &str,
        trust_anchor: &EntityConfiguration,
        current_time: Option<i64>,
    ) -> TrustMarkValidationResult {
        let now = current_time.unwrap_or_else(|| chrono::Utc::now().timestamp());

        let result = match self.check(trust_mark, trust_anchor, now).await {
            Ok(claims) => {
                debug!(id = %claims.id, issuer = %claims.iss, "Trust mark valid");
                TrustMarkValidationResult::valid()
            }
            Err(reason) => TrustMarkValidationResult::invalid(reason),
        };

        if let Some(reason) = &result.error {
            warn!(reason = %reason, "Trust mark rejected");
        }
        result
    }

    /// Validate every trust mark `entity` carries
    ///
    /// One result per `trust_marks` entry, in order. An entry whose JWT has a
    /// different id than the one it is listed under, or was issued to a
    /// different subject than `entity`, is invalid.
    pub async fn validate_trust_marks(
        &self,
        entity: &EntityConfiguration,
        trust_anchor: &EntityConfiguration,
        current_time: Option<i64>,
    ) -> Vec<(String, TrustMarkValidationResult)> {
        let mut results = Vec::with_capacity(entity.trust_marks.len());

        for entry in &entity.trust_marks {
            let result = match held_by(&entry.trust_mark, &entry.id, &entity.sub) {
                Ok(()) => {
                    self.validate_trust_mark(&entry.trust_mark, trust_anchor, current_time)
                        .await
                }
                Err(reason) => {
                    warn!(id = %entry.id, holder = %entity.sub, reason = %reason, "Trust mark rejected");
                    TrustMarkValidationResult::invalid(reason)
                }
            };
            results.push((entry.id.clone(), result));
        }

        results
    }

    async fn check(
        &self,
        trust_mark: &str,
        trust_anchor: &EntityConfiguration,
        now: i64,
    ) -> std::result::Result<TrustMarkClaims, String> {
        let jwt = Jwt::decode(trust_mark).map_err(|e| format!("Invalid trust mark: {}", e))?;

        let mut missing = jwt.missing_claims(&["iss"]);
        if jwt.claims().get("id").is_none() && jwt.claims().get("trust_mark_id").is_none() {
            missing.push("id".into());
        }
        if !missing.is_empty() {
            return Err(format!(
                "Trust mark is missing required claims: {}",
                missing.join(", ")
            ));
        }

        let claims: TrustMarkClaims = jwt
            .deserialize()
            .map_err(|e| format!("Invalid trust mark: {}", e))?;

        if let Some(exp) = claims.exp {
            if exp <= now {
                return Err("Trust mark has expired".into());
            }
        }

        self.verify_issuer_signature(&jwt, &claims.iss).await?;

        if let Some(owner) = trust_anchor.trust_mark_owners.get(&claims.id) {
            let Some(delegation) = &claims.delegation else {
                return Err(format!(
                    "Trust mark '{}' requires a delegation from its owner",
                    claims.id
                ));
            };
            let delegation = Jwt::decode(delegation)
                .map_err(|e| format!("Invalid trust mark delegation: {}", e))?;

            if !verify_with_jwks(self.jws.as_ref(), &delegation, &owner.jwks).await {
                return Err("Trust mark delegation signature is invalid".into());
            }
            if delegation.claim_str("iss") != Some(owner.sub.as_str()) {
                return Err("Trust mark delegation was not issued by the owner".into());
            }
            return Ok(claims);
        }

        if let Some(issuers) = trust_anchor.trust_mark_issuers.get(&claims.id) {
            if issuers.iter().any(|issuer| issuer == &claims.iss) {
                return Ok(claims);
            }
            return Err(format!(
                "Trust mark issuer '{}' is not authorized for '{}'",
                claims.iss, claims.id
            ));
        }

        Err(format!(
            "Trust mark '{}' is not recognized by the trust anchor",
            claims.id
        ))
    }

    /// Fetch the issuer's configuration and check the mark's signature
    async fn verify_issuer_signature(
        &self,
        trust_mark: &Jwt,
        issuer: &str,
    ) -> std::result::Result<(), String> {
        let url = entity_configuration_url(issuer)
            .map_err(|e| format!("Invalid trust mark issuer: {}", e))?;
        let raw = self
            .fetcher
            .fetch_statement(&url)
            .await
            .map_err(|e| format!("Failed to fetch trust mark issuer configuration: {}", e))?;

        let issuer_jwt = Jwt::decode(&raw)
            .map_err(|e| format!("Invalid trust mark issuer configuration: {}", e))?;
        let configuration = EntityConfiguration::from_jwt(&issuer_jwt)
            .map_err(|e| format!("Invalid trust mark issuer configuration: {}", e))?;

        if configuration.sub != issuer
            || !verify_with_jwks(self.jws.as_ref(), &issuer_jwt, &configuration.jwks).await
        {
            return Err("Trust mark issuer configuration is not validly self-signed".into());
        }
        if !verify_with_jwks(self.jws.as_ref(), trust_mark, &configuration.jwks).await {
            return Err("Trust mark signature is invalid".into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for TrustMarkValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustMarkValidator").finish_non_exhaustive()
    }
}

/// Check a listed mark carries the listed id and names `holder` as its subject
fn held_by(trust_mark: &str, listed_id: &str, holder: &str) -> std::result::Result<(), String> {
    let jwt = Jwt::decode(trust_mark).map_err(|e| format!("Invalid trust mark: {}", e))?;

    let embedded_id = jwt.claim_str("id").or(jwt.claim_str("trust_mark_id"));
    if embedded_id != Some(listed_id) {
        return Err(format!(
            "Trust mark listed as '{}' does not carry that id",
            listed_id
        ));
    }
    if jwt.claim_str("sub") != Some(holder) {
        return Err(format!("Trust mark was not issued to '{}'", holder));
    }
    Ok(())
}

