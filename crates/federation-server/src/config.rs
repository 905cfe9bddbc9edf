//! Environment-driven server configuration

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use federation_client::{CacheConfig, HttpResolverConfig, ResolverConfig};

/// Configuration could not be read from the environment
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Everything the server needs at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Anchors used when a resolve request names none
    pub trust_anchors: Vec<String>,
    pub resolver: ResolverConfig,
    pub http: HttpResolverConfig,
    pub cache: CacheConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            trust_anchors: Vec::new(),
            resolver: ResolverConfig::default(),
            http: HttpResolverConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read `FEDERATION_*` variables from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(port) = parse_var(&lookup, "FEDERATION_PORT")? {
            config.port = port;
        }
        if let Some(anchors) = lookup("FEDERATION_TRUST_ANCHORS") {
            config.trust_anchors = anchors
                .split(',')
                .map(str::trim)
                .filter(|anchor| !anchor.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(max_depth) = parse_var(&lookup, "FEDERATION_MAX_DEPTH")? {
            config.resolver.max_depth = max_depth;
        }
        if let Some(retries) = parse_var(&lookup, "FEDERATION_HTTP_RETRIES")? {
            config.http.max_retries = retries;
        }
        if let Some(secs) = parse_var(&lookup, "FEDERATION_HTTP_TIMEOUT_SECS")? {
            config.http.request_timeout = Duration::from_secs(secs);
        }
        if let Some(max_size) = parse_var(&lookup, "FEDERATION_CACHE_MAX_SIZE")? {
            config.cache.max_size = max_size;
        }
        if let Some(secs) = parse_var(&lookup, "FEDERATION_CACHE_TTL_SECS")? {
            config.cache.expire_after_write = Some(Duration::from_secs(secs));
        }

        Ok(config)
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            })
        })
        .transpose()
}
