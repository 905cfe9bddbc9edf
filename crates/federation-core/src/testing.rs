//! Signed-federation fixtures for tests
//!
//! Generates Ed25519 entity keys and signs entity statements so tests can
//! exercise resolution and verification against real signatures. Only
//! compiled with the `test-util` feature.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::SigningKey;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rand::rngs::OsRng;
use serde_json::{json, Map, Value};

use crate::statement::WELL_KNOWN_PATH;

/// Default `iat` for fixture statements
pub const ISSUED_AT: i64 = 1_728_000_000;

/// Default `exp` for fixture statements
pub const EXPIRES_AT: i64 = 1_730_000_000;

/// A federation entity with its own Ed25519 signing key
#[derive(Clone)]
pub struct TestEntity {
    entity_id: String,
    kid: String,
    signing_key: SigningKey,
}

impl std::fmt::Debug for TestEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestEntity")
            .field("entity_id", &self.entity_id)
            .field("kid", &self.kid)
            .finish()
    }
}

impl TestEntity {
    /// Generate a fresh key for `entity_id`
    pub fn new(entity_id: impl Into<String>) -> Self {
        let entity_id = entity_id.into();
        let kid = format!("{}#sig-{}", entity_id, rand::random::<u32>());
        Self::with_kid(entity_id, kid)
    }

    /// Generate a fresh key with an explicit kid
    pub fn with_kid(entity_id: impl Into<String>, kid: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            kid: kid.into(),
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Path-relative URL of this entity's configuration
    pub fn configuration_url(&self) -> String {
        format!("{}{}", self.entity_id.trim_end_matches('/'), WELL_KNOWN_PATH)
    }

    /// Public key as an OKP JWK
    pub fn jwk(&self) -> Jwk {
        serde_json::from_value(json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "use": "sig",
            "alg": "EdDSA",
            "kid": self.kid,
            "x": URL_SAFE_NO_PAD.encode(self.signing_key.verifying_key().to_bytes()),
        }))
        .expect("OKP JWK is well-formed")
    }

    pub fn jwks(&self) -> JwkSet {
        JwkSet {
            keys: vec![self.jwk()],
        }
    }

    /// Sign arbitrary claims as an EdDSA compact JWS with this entity's kid
    pub fn sign(&self, claims: &Value) -> String {
        let der = self
            .signing_key
            .to_pkcs8_der()
            .expect("Ed25519 key encodes as PKCS#8");
        let key = EncodingKey::from_ed_der(der.as_bytes());

        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(self.kid.clone());
        header.typ = Some("entity-statement+jwt".into());

        jsonwebtoken::encode(&header, claims, &key).expect("EdDSA signing succeeds")
    }

    /// Claims of this entity's self-signed configuration
    pub fn entity_configuration(&self, iat: i64, exp: i64) -> StatementBuilder<'_> {
        StatementBuilder::new(self)
            .claim("iss", json!(self.entity_id))
            .claim("sub", json!(self.entity_id))
            .claim("iat", json!(iat))
            .claim("exp", json!(exp))
            .claim("jwks", json!(self.jwks()))
    }

    /// Claims of a statement this entity issues about `subject`
    pub fn subordinate_statement(
        &self,
        subject: &TestEntity,
        iat: i64,
        exp: i64,
    ) -> StatementBuilder<'_> {
        StatementBuilder::new(self)
            .claim("iss", json!(self.entity_id))
            .claim("sub", json!(subject.entity_id))
            .claim("iat", json!(iat))
            .claim("exp", json!(exp))
            .claim("jwks", json!(subject.jwks()))
    }

    /// Claims of a trust mark this entity issues
    pub fn trust_mark(&self, id: &str, sub: &str, exp: i64) -> StatementBuilder<'_> {
        StatementBuilder::new(self)
            .claim("iss", json!(self.entity_id))
            .claim("sub", json!(sub))
            .claim("id", json!(id))
            .claim("iat", json!(ISSUED_AT))
            .claim("exp", json!(exp))
    }
}

/// Accumulates claims and signs them with the issuing entity's key
pub struct StatementBuilder<'a> {
    signer: &'a TestEntity,
    claims: Map<String, Value>,
}

impl<'a> StatementBuilder<'a> {
    fn new(signer: &'a TestEntity) -> Self {
        Self {
            signer,
            claims: Map::new(),
        }
    }

    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    pub fn authority_hints(self, hints: &[&str]) -> Self {
        self.claim("authority_hints", json!(hints))
    }

    pub fn fetch_endpoint(self, endpoint: &str) -> Self {
        self.claim(
            "metadata",
            json!({"federation_entity": {"federation_fetch_endpoint": endpoint}}),
        )
    }

    /// Replace the embedded JWKS
    pub fn jwks(self, jwks: &JwkSet) -> Self {
        self.claim("jwks", json!(jwks))
    }

    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }

    pub fn sign(self) -> String {
        let signer = self.signer;
        signer.sign(&self.build())
    }

    /// Sign with a different entity's key
    pub fn sign_with(self, signer: &TestEntity) -> String {
        signer.sign(&self.build())
    }
}
