//! Trust chain container

use serde::{Deserialize, Serialize};

use crate::error::{FederationError, Result};
use crate::jwt::Jwt;

/// Ordered statements from a subject's entity configuration to a trust
/// anchor's:
///
/// `[EC(subject), SS(A1 about subject), SS(A2 about A1), ..., EC(anchor)]`
///
/// Built once by the resolver and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrustChain(Vec<String>);

impl TrustChain {
    /// Fewest statements a complete chain can have
    pub const MIN_LENGTH: usize = 3;

    pub fn new(statements: Vec<String>) -> Self {
        Self(statements)
    }

    pub fn statements(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }

    /// `sub` of the first statement
    pub fn subject(&self) -> Result<String> {
        self.claim_of(self.0.first(), "sub")
    }

    /// `iss` of the last statement
    pub fn trust_anchor(&self) -> Result<String> {
        self.claim_of(self.0.last(), "iss")
    }

    /// Earliest `exp` across the chain
    pub fn expires_at(&self) -> Result<i64> {
        let mut earliest: Option<i64> = None;
        for raw in &self.0 {
            let exp = Jwt::decode(raw)?
                .claims()
                .get("exp")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| FederationError::MissingClaim("exp".into()))?;
            earliest = Some(earliest.map_or(exp, |e| e.min(exp)));
        }
        earliest.ok_or_else(|| FederationError::InvalidClaim("empty trust chain".into()))
    }

    fn claim_of(&self, statement: Option<&String>, claim: &str) -> Result<String> {
        let raw = statement
            .ok_or_else(|| FederationError::InvalidClaim("empty trust chain".into()))?;
        Jwt::decode(raw)?
            .claim_str(claim)
            .map(str::to_string)
            .ok_or_else(|| FederationError::MissingClaim(claim.to_string()))
    }
}

impl From<Vec<String>> for TrustChain {
    fn from(statements: Vec<String>) -> Self {
        Self(statements)
    }
}

impl AsRef<[String]> for TrustChain {
    fn as_ref(&self) -> &[String] {
        &self.0
    }
}

impl IntoIterator for TrustChain {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
