//! Compact JWS decoding
//!
//! Statements travel as compact-serialized JWS strings. Decoding here is
//! purely syntactic: the protected header and the payload are parsed once,
//! and nothing about the signature is checked. See [`crate::jws`] for that.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use jsonwebtoken::Header;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{FederationError, Result};

/// base64url that accepts segments with or without trailing padding
const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A decoded (but unverified) compact JWS
#[derive(Debug, Clone)]
pub struct Jwt {
    raw: String,
    header: Header,
    claims: Map<String, Value>,
}

impl Jwt {
    /// Decode the header and payload of a compact JWS
    pub fn decode(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let mut segments = raw.split('.');
        let (Some(_), Some(payload), Some(_), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(FederationError::MalformedJwt(
                "expected three dot-separated segments".into(),
            ));
        };

        let header = jsonwebtoken::decode_header(raw)?;
        let payload = LENIENT_URL_SAFE.decode(payload)?;

        match serde_json::from_slice::<Value>(&payload)? {
            Value::Object(claims) => Ok(Self {
                raw: raw.to_string(),
                header,
                claims,
            }),
            _ => Err(FederationError::MalformedJwt(
                "payload is not a JSON object".into(),
            )),
        }
    }

    /// The compact serialization this was decoded from
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The protected header
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Key ID from the protected header
    pub fn kid(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }

    /// All payload claims
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// A string-valued claim, if present
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    /// Names from `required` that are absent (or null) in the payload
    pub fn missing_claims(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| matches!(self.claims.get(**name), None | Some(Value::Null)))
            .map(|name| name.to_string())
            .collect()
    }

    /// Deserialize the payload into a typed claim set
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.claims.clone())).map_err(|e| {
            FederationError::InvalidClaim(e.to_string())
        })
    }
}
