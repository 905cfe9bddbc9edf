//! Entity statement types
//!
//! Two statement shapes flow through a federation:
//!
//! - **Entity Configuration (EC)**: self-signed, `iss == sub`, published by an
//!   entity at its well-known endpoint.
//! - **Subordinate Statement (SS)**: issued by a superior about a subordinate.
//!   Its `jwks` carries the *subordinate's* keys, which is what links one hop
//!   of a trust chain to the next.
//!
//! Both share the claims exposed by [`StatementClaims`].

use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use url::Url;

use crate::error::{FederationError, Result};
use crate::jwt::Jwt;

/// Path of the entity configuration relative to the entity identifier
pub const WELL_KNOWN_PATH: &str = "/.well-known/openid-federation";

/// Media type entity statements are served with
pub const ENTITY_STATEMENT_CONTENT_TYPE: &str = "application/entity-statement+jwt";

/// Claims every statement in a trust chain must carry
pub const REQUIRED_CLAIMS: [&str; 5] = ["sub", "iss", "exp", "iat", "jwks"];

/// Claims shared by entity configurations and subordinate statements
pub trait StatementClaims {
    /// Issuer entity identifier
    fn iss(&self) -> &str;

    /// Subject entity identifier
    fn sub(&self) -> &str;

    /// Issued at (epoch seconds)
    fn iat(&self) -> i64;

    /// Expiration (epoch seconds)
    fn exp(&self) -> i64;

    /// Keys carried by the statement
    fn jwks(&self) -> &JwkSet;

    /// Whether `iat <= now < exp`
    fn is_valid_at(&self, now: i64) -> bool {
        self.iat() <= now && self.exp() > now
    }
}

/// Self-signed statement an entity publishes about itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfiguration {
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jwks: JwkSet,

    /// Candidate superior authorities
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authority_hints: Vec<String>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Trust mark id -> entities allowed to issue it
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub trust_mark_issuers: HashMap<String, Vec<String>>,

    /// Trust mark id -> owner that delegates issuance
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub trust_mark_owners: HashMap<String, TrustMarkOwner>,

    /// Trust marks this entity holds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trust_marks: Vec<TrustMarkEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub crit: Vec<String>,
}

impl EntityConfiguration {
    /// Decode an entity configuration, requiring `iss == sub`
    pub fn from_jwt(jwt: &Jwt) -> Result<Self> {
        let ec: Self = jwt.deserialize()?;
        if ec.iss != ec.sub {
            return Err(FederationError::InvalidClaim(format!(
                "entity configuration must be self-issued: iss '{}' != sub '{}'",
                ec.iss, ec.sub
            )));
        }
        Ok(ec)
    }

    /// The endpoint this entity serves subordinate statements from
    pub fn federation_fetch_endpoint(&self) -> Option<&str> {
        self.metadata
            .federation_entity
            .as_ref()
            .and_then(|fe| fe.federation_fetch_endpoint.as_deref())
    }
}

/// Per entity-type metadata blocks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation_entity: Option<FederationEntityMetadata>,

    /// openid_relying_party, openid_provider, ... kept verbatim
    #[serde(flatten)]
    pub other: HashMap<String, Value>,
}

/// The `federation_entity` metadata block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FederationEntityMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation_fetch_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation_list_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation_resolve_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,

    #[serde(flatten)]
    pub other: HashMap<String, Value>,
}

/// Owner entry from `trust_mark_owners`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustMarkOwner {
    /// Owner entity identifier
    pub sub: String,
    /// Keys the owner signs delegations with
    pub jwks: JwkSet,
}

/// Entry from an entity's `trust_marks` array
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustMarkEntry {
    #[serde(alias = "trust_mark_id")]
    pub id: String,
    /// The trust mark JWT
    pub trust_mark: String,
}

/// Statement a superior authority issues about a subordinate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubordinateStatement {
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    /// The subordinate's attested keys
    pub jwks: JwkSet,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_policy: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub crit: Vec<String>,
}

impl SubordinateStatement {
    /// Decode a subordinate statement
    pub fn from_jwt(jwt: &Jwt) -> Result<Self> {
        jwt.deserialize()
    }
}

/// Constraints a superior places on the chain below it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_path_length: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naming_constraints: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_entity_types: Option<Vec<String>>,
}

/// Either statement shape, discriminated by `iss == sub`
#[derive(Debug, Clone)]
pub enum EntityStatement {
    Configuration(EntityConfiguration),
    Subordinate(SubordinateStatement),
}

impl EntityStatement {
    /// Decode a statement into the matching variant
    pub fn from_jwt(jwt: &Jwt) -> Result<Self> {
        let missing = jwt.missing_claims(&["iss", "sub"]);
        if !missing.is_empty() {
            return Err(FederationError::MissingClaim(missing.join(", ")));
        }

        if jwt.claim_str("iss") == jwt.claim_str("sub") {
            EntityConfiguration::from_jwt(jwt).map(EntityStatement::Configuration)
        } else {
            SubordinateStatement::from_jwt(jwt).map(EntityStatement::Subordinate)
        }
    }

    /// Decode from a compact JWS
    pub fn decode(raw: &str) -> Result<Self> {
        Self::from_jwt(&Jwt::decode(raw)?)
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, EntityStatement::Configuration(_))
    }
}

impl StatementClaims for EntityConfiguration {
    fn iss(&self) -> &str {
        &self.iss
    }
    fn sub(&self) -> &str {
        &self.sub
    }
    fn iat(&self) -> i64 {
        self.iat
    }
    fn exp(&self) -> i64 {
        self.exp
    }
    fn jwks(&self) -> &JwkSet {
        &self.jwks
    }
}

impl StatementClaims for SubordinateStatement {
    fn iss(&self) -> &str {
        &self.iss
    }
    fn sub(&self) -> &str {
        &self.sub
    }
    fn iat(&self) -> i64 {
        self.iat
    }
    fn exp(&self) -> i64 {
        self.exp
    }
    fn jwks(&self) -> &JwkSet {
        &self.jwks
    }
}

impl StatementClaims for EntityStatement {
    fn iss(&self) -> &str {
        match self {
            EntityStatement::Configuration(s) => s.iss(),
            EntityStatement::Subordinate(s) => s.iss(),
        }
    }
    fn sub(&self) -> &str {
        match self {
            EntityStatement::Configuration(s) => s.sub(),
            EntityStatement::Subordinate(s) => s.sub(),
        }
    }
    fn iat(&self) -> i64 {
        match self {
            EntityStatement::Configuration(s) => s.iat(),
            EntityStatement::Subordinate(s) => s.iat(),
        }
    }
    fn exp(&self) -> i64 {
        match self {
            EntityStatement::Configuration(s) => s.exp(),
            EntityStatement::Subordinate(s) => s.exp(),
        }
    }
    fn jwks(&self) -> &JwkSet {
        match self {
            EntityStatement::Configuration(s) => s.jwks(),
            EntityStatement::Subordinate(s) => s.jwks(),
        }
    }
}

/// Claims of a trust mark JWT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustMarkClaims {
    pub iss: String,
    #[serde(alias = "trust_mark_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Delegation JWT issued by the trust mark owner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation: Option<String>,
}

/// URL of an entity's configuration
///
/// Tolerates a trailing slash on the identifier.
pub fn entity_configuration_url(entity_id: &str) -> Result<String> {
    let base = entity_id.trim_end_matches('/');
    let url = format!("{}{}", base, WELL_KNOWN_PATH);
    Url::parse(&url)
        .map_err(|e| FederationError::InvalidEntityIdentifier(format!("{}: {}", entity_id, e)))?;
    Ok(url)
}

/// URL of the subordinate statement `fetch_endpoint` serves about `sub`
pub fn subordinate_statement_url(fetch_endpoint: &str, sub: &str) -> Result<String> {
    let mut url = Url::parse(fetch_endpoint).map_err(|e| {
        FederationError::InvalidEntityIdentifier(format!("{}: {}", fetch_endpoint, e))
    })?;
    url.query_pairs_mut().append_pair("sub", sub);
    Ok(url.into())
}
