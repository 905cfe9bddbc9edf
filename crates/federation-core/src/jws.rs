//! JWS signature verification against JWKs
//!
//! Chain building and validation only ever need one capability from the
//! crypto layer: "does this JWS verify under this public key". That seam is
//! the [`JwsVerifier`] trait, so a KMS- or HSM-backed implementation can be
//! swapped in for [`JsonWebTokenVerifier`].

use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey};
use tracing::debug;

use crate::error::{FederationError, Result};
use crate::jwt::Jwt;

/// Verifies a compact JWS against a single public key
#[async_trait]
pub trait JwsVerifier: Send + Sync {
    /// `true` only if `jwt` carries a valid signature made with `key`
    ///
    /// Never fails: any problem (unusable key, algorithm mismatch,
    /// malformed token) is reported as `false`.
    async fn verify(&self, jwt: &str, key: &Jwk) -> bool;
}

/// Default verifier backed by `jsonwebtoken`
///
/// Only asymmetric algorithms are accepted, and the JWS `alg` must match the
/// key type (and the key's own `alg`, when it declares one).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonWebTokenVerifier;

impl JsonWebTokenVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Verify with a descriptive error instead of a bare `bool`
    pub fn verify_signature(jwt: &str, key: &Jwk) -> Result<()> {
        let header = jsonwebtoken::decode_header(jwt)?;

        if !algorithm_matches_key(header.alg, key) {
            return Err(FederationError::UnsupportedAlgorithm(format!(
                "{:?} cannot be used with key '{}'",
                header.alg,
                key.common.key_id.as_deref().unwrap_or("<no kid>")
            )));
        }

        let (message, signature) = jwt
            .trim()
            .rsplit_once('.')
            .ok_or_else(|| FederationError::MalformedJwt("missing signature segment".into()))?;

        let decoding_key = DecodingKey::from_jwk(key)?;
        if jsonwebtoken::crypto::verify(signature, message.as_bytes(), &decoding_key, header.alg)? {
            Ok(())
        } else {
            Err(FederationError::InvalidSignature(
                "signature does not match key".into(),
            ))
        }
    }
}

#[async_trait]
impl JwsVerifier for JsonWebTokenVerifier {
    async fn verify(&self, jwt: &str, key: &Jwk) -> bool {
        match Self::verify_signature(jwt, key) {
            Ok(()) => true,
            Err(e) => {
                debug!(
                    kid = ?key.common.key_id,
                    error = %e,
                    "JWS verification failed"
                );
                false
            }
        }
    }
}

/// Whether `alg` is usable with the key material in `key`
fn algorithm_matches_key(alg: Algorithm, key: &Jwk) -> bool {
    if let Some(declared) = &key.common.key_algorithm {
        if format!("{:?}", declared) != format!("{:?}", alg) {
            return false;
        }
    }

    match &key.algorithm {
        AlgorithmParameters::RSA(_) => matches!(
            alg,
            Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512
        ),
        AlgorithmParameters::EllipticCurve(_) => {
            matches!(alg, Algorithm::ES256 | Algorithm::ES384)
        }
        AlgorithmParameters::OctetKeyPair(_) => alg == Algorithm::EdDSA,
        // Symmetric keys never belong in a published JWKS
        _ => false,
    }
}

/// Find a key by `kid`
pub fn find_key<'a>(jwks: &'a JwkSet, kid: &str) -> Result<&'a Jwk> {
    jwks.find(kid)
        .ok_or_else(|| FederationError::KeyNotFound(kid.to_string()))
}

/// Verify `jwt` with the key its header `kid` selects from `jwks`
///
/// A token without a kid, or whose kid is absent from `jwks`, does not
/// verify.
pub async fn verify_with_jwks(verifier: &dyn JwsVerifier, jwt: &Jwt, jwks: &JwkSet) -> bool {
    let Some(kid) = jwt.kid() else {
        debug!("JWS header carries no kid");
        return false;
    };

    match find_key(jwks, kid) {
        Ok(key) => verifier.verify(jwt.raw(), key).await,
        Err(e) => {
            debug!(kid = %kid, error = %e, "Signing key not in JWKS");
            false
        }
    }
}

/// Whether `jwks` contains a key with this kid
pub fn contains_kid(jwks: &JwkSet, kid: &str) -> bool {
    jwks.find(kid).is_some()
}
