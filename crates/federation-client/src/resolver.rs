//! Trust chain discovery
//!
//! Depth-first search from a subject up its `authority_hints` until a trust
//! anchor is reached. Each hop is cryptographically bound before the search
//! descends:
//!
//! 1. The authority's own configuration verifies against its own JWKS
//! 2. The subordinate statement it serves about the current entity verifies
//!    against that JWKS
//! 3. The subordinate statement attests the key the current entity signed
//!    its last statement with
//!
//! Hints naming a trust anchor are tried first. The first complete chain
//! found is returned, which is not necessarily the shortest.
//!
//! Fetch failures abort the search and are reported as errors. Statements
//! that fail to decode or verify only end the branch they were found on.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use federation_core::{
    contains_kid, entity_configuration_url, subordinate_statement_url, verify_with_jwks,
    EntityConfiguration, JsonWebTokenVerifier, JwsVerifier, Jwt, SubordinateStatement,
    TrustChain, TrustChainVerifier,
};

use crate::error::Result;
use crate::fetcher::StatementFetcher;

fn default_max_depth() -> usize {
    5
}

/// Configuration for [`TrustChainResolver`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Most authority levels to climb above the subject
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

impl ResolverConfig {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Outcome of a resolution
///
/// `trust_chain` is `None` with `error == false` when no chain exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResult {
    pub trust_chain: Option<TrustChain>,
    pub error: bool,
    pub error_message: Option<String>,
}

impl ResolveResult {
    pub fn found(chain: TrustChain) -> Self {
        Self {
            trust_chain: Some(chain),
            error: false,
            error_message: None,
        }
    }

    pub fn not_found() -> Self {
        Self {
            trust_chain: None,
            error: false,
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            trust_chain: None,
            error: true,
            error_message: Some(message.into()),
        }
    }
}

/// State owned by one resolve call
struct ResolutionContext {
    anchors: HashSet<String>,
    max_depth: usize,
    /// Configuration URLs already fetched as authorities
    visited: HashSet<String>,
}

impl ResolutionContext {
    fn is_anchor(&self, entity_id: &str) -> bool {
        self.anchors.contains(canonical_id(entity_id))
    }

    /// Hints with trust anchors first, otherwise in published order
    fn ordered_hints(&self, hints: &[String]) -> Vec<String> {
        let mut ordered = hints.to_vec();
        ordered.sort_by_key(|hint| !self.is_anchor(hint));
        ordered
    }
}

/// Discovers trust chains from a subject to one of a set of anchors
#[derive(Clone)]
pub struct TrustChainResolver {
    fetcher: Arc<dyn StatementFetcher>,
    jws: Arc<dyn JwsVerifier>,
    config: ResolverConfig,
}

impl TrustChainResolver {
    /// Create a resolver that verifies with [`JsonWebTokenVerifier`]
    pub fn new(fetcher: Arc<dyn StatementFetcher>) -> Self {
        Self::with_verifier(fetcher, Arc::new(JsonWebTokenVerifier))
    }

    pub fn with_verifier(fetcher: Arc<dyn StatementFetcher>, jws: Arc<dyn JwsVerifier>) -> Self {
        Self {
            fetcher,
            jws,
            config: ResolverConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve a chain, folding failures into the result
    ///
    /// `max_depth` overrides the configured depth for this call.
    pub async fn resolve(
        &self,
        entity_id: &str,
        trust_anchors: &[String],
        max_depth: Option<usize>,
    ) -> ResolveResult {
        let max_depth = max_depth.unwrap_or(self.config.max_depth);

        match self.try_resolve(entity_id, trust_anchors, max_depth).await {
            Ok(Some(chain)) => {
                info!(
                    subject = %entity_id,
                    length = chain.len(),
                    "Trust chain resolved"
                );
                ResolveResult::found(chain)
            }
            Ok(None) => {
                info!(subject = %entity_id, "No trust chain found");
                ResolveResult::not_found()
            }
            Err(e) => {
                warn!(subject = %entity_id, error = %e, "Trust chain resolution failed");
                ResolveResult::failed(e.to_string())
            }
        }
    }

    /// Resolve a chain, surfacing fetch failures as `Err`
    pub async fn try_resolve(
        &self,
        entity_id: &str,
        trust_anchors: &[String],
        max_depth: usize,
    ) -> Result<Option<TrustChain>> {
        let subject_url = entity_configuration_url(entity_id)?;
        let mut context = ResolutionContext {
            anchors: trust_anchors
                .iter()
                .map(|anchor| canonical_id(anchor).to_string())
                .collect(),
            max_depth,
            visited: HashSet::from([subject_url.clone()]),
        };

        let raw = self.fetcher.fetch_statement(&subject_url).await?;
        let Some((subject, jwt)) = self.self_verified_configuration(&raw).await else {
            debug!(subject = %entity_id, "Subject configuration unusable");
            return Ok(None);
        };
        let Some(kid) = jwt.kid().map(str::to_string) else {
            return Ok(None);
        };

        let chain = self.search(&mut context, subject, kid, vec![raw], 0).await?;
        Ok(chain.map(TrustChain::new))
    }

    /// Resolve a chain and accept it only if it also verifies
    ///
    /// Verification failures are reported as errors carrying the verifier's
    /// message.
    pub async fn resolve_and_verify(
        &self,
        entity_id: &str,
        trust_anchors: &[String],
        verifier: &TrustChainVerifier,
        current_time: Option<i64>,
    ) -> ResolveResult {
        let resolved = self.resolve(entity_id, trust_anchors, None).await;
        let Some(chain) = &resolved.trust_chain else {
            return resolved;
        };

        if anchored_in(chain, trust_anchors).is_none() {
            warn!(subject = %entity_id, "Resolved chain ends outside the requested trust anchors");
            return ResolveResult::failed("Last statement issuer does not match trust anchor");
        }
        let verdict = verifier
            .verify(chain.statements(), None, current_time)
            .await;

        if verdict.is_valid {
            resolved
        } else {
            let reason = verdict
                .error
                .unwrap_or_else(|| "Trust chain verification failed".into());
            warn!(subject = %entity_id, reason = %reason, "Resolved chain did not verify");
            ResolveResult::failed(reason)
        }
    }

    /// Climb from `current`, whose last statement in `chain` was signed
    /// with `signing_kid`
    fn search<'a>(
        &'a self,
        context: &'a mut ResolutionContext,
        current: EntityConfiguration,
        signing_kid: String,
        chain: Vec<String>,
        depth: usize,
    ) -> BoxFuture<'a, Result<Option<Vec<String>>>> {
        Box::pin(async move {
            if depth >= context.max_depth {
                debug!(entity = %current.sub, depth, "Maximum depth reached");
                return Ok(None);
            }
            if current.authority_hints.is_empty() {
                debug!(entity = %current.sub, "No authority hints");
                return Ok(None);
            }

            for authority_id in context.ordered_hints(&current.authority_hints) {
                let authority_url = match entity_configuration_url(&authority_id) {
                    Ok(url) => url,
                    Err(e) => {
                        debug!(authority = %authority_id, error = %e, "Skipping invalid hint");
                        continue;
                    }
                };
                if !context.visited.insert(authority_url.clone()) {
                    debug!(authority = %authority_id, "Authority already visited");
                    continue;
                }

                let authority_raw = self.fetcher.fetch_statement(&authority_url).await?;
                let Some((authority, _)) = self.self_verified_configuration(&authority_raw).await
                else {
                    debug!(authority = %authority_id, "Authority configuration unusable");
                    continue;
                };
                if canonical_id(&authority.sub) != canonical_id(&authority_id) {
                    debug!(authority = %authority_id, sub = %authority.sub, "Authority identifier mismatch");
                    continue;
                }

                let Some(fetch_endpoint) = authority.federation_fetch_endpoint() else {
                    debug!(authority = %authority_id, "Authority has no fetch endpoint");
                    continue;
                };
                let statement_url = match subordinate_statement_url(fetch_endpoint, &current.sub)
                {
                    Ok(url) => url,
                    Err(e) => {
                        debug!(authority = %authority_id, error = %e, "Invalid fetch endpoint");
                        continue;
                    }
                };

                let statement_raw = self.fetcher.fetch_statement(&statement_url).await?;
                let Some(statement_kid) = self
                    .verified_subordinate(&statement_raw, &authority, &current.sub, &signing_kid)
                    .await
                else {
                    continue;
                };

                let mut branch = chain.clone();
                branch.push(statement_raw);

                if context.is_anchor(&authority_id) {
                    debug!(anchor = %authority_id, depth, "Reached trust anchor");
                    branch.push(authority_raw);
                    return Ok(Some(branch));
                }

                if let Some(found) = self
                    .search(&mut *context, authority, statement_kid, branch, depth + 1)
                    .await?
                {
                    return Ok(Some(found));
                }
                debug!(authority = %authority_id, "Backtracking");
            }

            Ok(None)
        })
    }

    /// Decode an entity configuration and check its self-signature
    async fn self_verified_configuration(&self, raw: &str) -> Option<(EntityConfiguration, Jwt)> {
        let jwt = match Jwt::decode(raw) {
            Ok(jwt) => jwt,
            Err(e) => {
                debug!(error = %e, "Undecodable entity configuration");
                return None;
            }
        };
        let configuration = match EntityConfiguration::from_jwt(&jwt) {
            Ok(configuration) => configuration,
            Err(e) => {
                debug!(error = %e, "Invalid entity configuration");
                return None;
            }
        };

        if configuration.jwks.keys.is_empty() {
            debug!(entity = %configuration.sub, "Entity configuration has no keys");
            return None;
        }
        if !verify_with_jwks(self.jws.as_ref(), &jwt, &configuration.jwks).await {
            warn!(entity = %configuration.sub, "Entity configuration self-signature invalid");
            return None;
        }

        Some((configuration, jwt))
    }

    /// Check a subordinate statement binds `subject` to its signing key
    ///
    /// Returns the statement's own signing kid.
    async fn verified_subordinate(
        &self,
        raw: &str,
        authority: &EntityConfiguration,
        subject: &str,
        subject_kid: &str,
    ) -> Option<String> {
        let jwt = Jwt::decode(raw)
            .map_err(|e| debug!(authority = %authority.sub, error = %e, "Undecodable subordinate statement"))
            .ok()?;
        let statement = SubordinateStatement::from_jwt(&jwt)
            .map_err(|e| debug!(authority = %authority.sub, error = %e, "Invalid subordinate statement"))
            .ok()?;

        if statement.iss != authority.sub || statement.sub != subject {
            debug!(
                iss = %statement.iss,
                sub = %statement.sub,
                "Subordinate statement names the wrong parties"
            );
            return None;
        }
        if !verify_with_jwks(self.jws.as_ref(), &jwt, &authority.jwks).await {
            warn!(authority = %authority.sub, subject = %subject, "Subordinate statement signature invalid");
            return None;
        }
        if !contains_kid(&statement.jwks, subject_kid) {
            warn!(
                authority = %authority.sub,
                subject = %subject,
                kid = %subject_kid,
                "Subordinate statement does not attest the subject's signing key"
            );
            return None;
        }

        jwt.kid().map(str::to_string)
    }
}

impl std::fmt::Debug for TrustChainResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustChainResolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Entity identifier with any trailing slash removed
fn canonical_id(entity_id: &str) -> &str {
    entity_id.trim_end_matches('/')
}

/// The entry of `trust_anchors` that issued the last statement of `chain`
fn anchored_in<'a>(chain: &TrustChain, trust_anchors: &'a [String]) -> Option<&'a String> {
    let issuer = chain.trust_anchor().ok()?;
    trust_anchors
        .iter()
        .find(|anchor| canonical_id(anchor) == canonical_id(&issuer))
}
