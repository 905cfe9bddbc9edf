//! # Federation Core
//!
//! Entity statement model, JWS primitives and trust chain verification for
//! OpenID Federation.
//!
//! ## Key Concepts
//!
//! - **Entity Configuration (EC)**: a self-signed statement an entity
//!   publishes about itself at `/.well-known/openid-federation`
//! - **Subordinate Statement (SS)**: a statement a superior issues about a
//!   subordinate, attesting the subordinate's keys
//! - **Trust Chain**: `[EC(subject), SS, ..., SS, EC(anchor)]`, each link
//!   signed by the next
//! - **Trust Mark**: a signed assertion that an entity meets some profile
//!
//! Fetching and chain discovery live in `federation-client`.

pub mod chain;
pub mod error;
pub mod jws;
pub mod jwt;
pub mod statement;
pub mod verify;

#[cfg(feature = "test-util")]
pub mod testing;

pub use chain::TrustChain;
pub use error::{FederationError, Result};
pub use jws::{contains_kid, find_key, verify_with_jwks, JsonWebTokenVerifier, JwsVerifier};
pub use jwt::Jwt;
pub use statement::{
    entity_configuration_url, subordinate_statement_url, Constraints, EntityConfiguration,
    EntityStatement, FederationEntityMetadata, Metadata, StatementClaims, SubordinateStatement,
    TrustMarkClaims, TrustMarkEntry, TrustMarkOwner, ENTITY_STATEMENT_CONTENT_TYPE,
    REQUIRED_CLAIMS, WELL_KNOWN_PATH,
};
pub use verify::{TrustChainVerifier, VerifyResult, CHAIN_TOO_SHORT};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the library version
pub fn version() -> &'static str {
    VERSION
}
