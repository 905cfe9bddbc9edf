//! Statement fetching over HTTP
//!
//! [`HttpResolver`] pulls raw entity statements from federation endpoints,
//! retrying with exponential backoff and keeping fetched statements in a
//! shared [`Cache`]. When HTTP caching is enabled, validators from a cached
//! response are sent on refetch so unchanged statements come back as
//! `304 Not Modified`.

use async_trait::async_trait;
use futures::FutureExt;
use reqwest::header::{
    HeaderMap, ACCEPT, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use federation_core::ENTITY_STATEMENT_CONTENT_TYPE;

use crate::cache::{Cache, CacheConfig, MemoryCache};
use crate::error::{ClientError, Result};

/// Fetches a raw statement (compact JWS) from an endpoint URL
#[async_trait]
pub trait StatementFetcher: Send + Sync {
    async fn fetch_statement(&self, url: &str) -> Result<String>;
}

/// How [`HttpResolver::get`] consults the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchStrategy {
    /// Serve only from cache
    CacheOnly,
    /// Always refetch, then refresh the cache
    ForceRemote,
    /// Serve from cache, fetching once on a miss
    #[default]
    CacheFirst,
}

/// A fetched statement and the validators its response carried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedStatement {
    pub body: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff() -> Duration {
    Duration::from_millis(1000)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_enable_http_caching() -> bool {
    true
}

fn default_user_agent() -> String {
    format!("federation-client/{}", env!("CARGO_PKG_VERSION"))
}

/// Configuration for [`HttpResolver`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResolverConfig {
    /// Total attempts per fetch (at least one is always made)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the second attempt; doubles for each attempt after
    #[serde(default = "default_base_backoff")]
    pub base_backoff: Duration,

    /// Timeout applied to each individual request
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,

    /// Send `If-None-Match` / `If-Modified-Since` from cached responses
    #[serde(default = "default_enable_http_caching")]
    pub enable_http_caching: bool,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpResolverConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_backoff: default_base_backoff(),
            request_timeout: default_request_timeout(),
            enable_http_caching: default_enable_http_caching(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpResolverConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_http_caching(mut self, enabled: bool) -> Self {
        self.enable_http_caching = enabled;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Delay before attempt `attempt + 1`, given `attempt` already failed
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// HTTP statement fetcher backed by a shared cache
#[derive(Clone)]
pub struct HttpResolver {
    client: reqwest::Client,
    cache: Arc<dyn Cache<String, CachedStatement>>,
    config: HttpResolverConfig,
}

impl HttpResolver {
    /// Create a resolver with its own [`MemoryCache`]
    pub fn new(config: HttpResolverConfig) -> Result<Self> {
        Self::with_cache(config, Arc::new(MemoryCache::new(CacheConfig::default())))
    }

    /// Create a resolver over an existing cache
    pub fn with_cache(
        config: HttpResolverConfig,
        cache: Arc<dyn Cache<String, CachedStatement>>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            cache,
            config,
        })
    }

    pub fn config(&self) -> &HttpResolverConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn Cache<String, CachedStatement>> {
        &self.cache
    }

    /// Raw statement at `url`, consulting the cache per `strategy`
    pub async fn get(&self, url: &str, strategy: FetchStrategy) -> Result<String> {
        match strategy {
            FetchStrategy::CacheOnly => self
                .cache
                .get(&url.to_string())
                .await
                .map(|cached| cached.body)
                .ok_or(ClientError::CacheMiss),

            FetchStrategy::ForceRemote => {
                let previous = if self.config.enable_http_caching {
                    self.cache.get(&url.to_string()).await
                } else {
                    None
                };
                let fresh = fetch_with_retry(
                    self.client.clone(),
                    self.config.clone(),
                    url.to_string(),
                    previous,
                )
                .await?;
                self.cache.put(url.to_string(), fresh.clone()).await;
                Ok(fresh.body)
            }

            FetchStrategy::CacheFirst => {
                let compute = fetch_with_retry(
                    self.client.clone(),
                    self.config.clone(),
                    url.to_string(),
                    None,
                )
                .boxed();
                self.cache
                    .get_or_put(url.to_string(), compute)
                    .await
                    .map(|cached| cached.body)
            }
        }
    }
}

impl std::fmt::Debug for HttpResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StatementFetcher for HttpResolver {
    async fn fetch_statement(&self, url: &str) -> Result<String> {
        self.get(url, FetchStrategy::CacheFirst).await
    }
}

/// Fetch `url`, retrying retryable failures with exponential backoff
///
/// Owns its inputs so it can run as a cache computation.
async fn fetch_with_retry(
    client: reqwest::Client,
    config: HttpResolverConfig,
    url: String,
    previous: Option<CachedStatement>,
) -> Result<CachedStatement> {
    let attempts = config.max_retries.max(1);
    let mut attempt = 1;

    loop {
        match fetch_once(&client, &config, &url, previous.as_ref()).await {
            Ok(statement) => return Ok(statement),
            Err(e) if attempt < attempts && e.is_retryable() => {
                let delay = config.backoff(attempt);
                warn!(
                    url = %url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Statement fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(url = %url, attempt, error = %e, "Statement fetch failed");
                return Err(e);
            }
        }
    }
}

async fn fetch_once(
    client: &reqwest::Client,
    config: &HttpResolverConfig,
    url: &str,
    previous: Option<&CachedStatement>,
) -> Result<CachedStatement> {
    let mut request = client
        .get(url)
        .timeout(config.request_timeout)
        .header(ACCEPT, ENTITY_STATEMENT_CONTENT_TYPE);

    if config.enable_http_caching {
        if let Some(previous) = previous {
            if let Some(etag) = &previous.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &previous.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }
    }

    debug!(url = %url, "Fetching statement");
    let response = request.send().await?;
    let status = response.status();

    if status == StatusCode::NOT_MODIFIED {
        return match previous {
            Some(previous) => {
                debug!(url = %url, "Statement not modified");
                Ok(previous.clone())
            }
            None => Err(ClientError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            }),
        };
    }

    if !status.is_success() {
        return Err(ClientError::UnexpectedStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let headers = response.headers();
    let content_type = header_value(headers, CONTENT_TYPE);
    if !content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with(ENTITY_STATEMENT_CONTENT_TYPE))
    {
        debug!(
            url = %url,
            content_type = content_type.as_deref().unwrap_or("<none>"),
            "Unexpected content type for entity statement"
        );
    }
    let etag = header_value(headers, ETAG);
    let last_modified = header_value(headers, LAST_MODIFIED);

    let body = response.text().await?;

    Ok(CachedStatement {
        body: body.trim().to_string(),
        etag,
        last_modified,
    })
}

fn header_value(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
