//! # Federation Client
//!
//! Network-facing side of OpenID Federation trust evaluation:
//!
//! - [`MemoryCache`]: async cache with single-flight `get_or_put`
//! - [`HttpResolver`]: statement fetching with retry, backoff and
//!   conditional revalidation
//! - [`TrustChainResolver`]: depth-first discovery of trust chains
//! - [`TrustMarkValidator`]: trust mark checks against anchor policy
//!
//! Chains found here are re-validated with
//! [`federation_core::TrustChainVerifier`].

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod resolver;
pub mod trust_mark;

pub use cache::{Cache, CacheConfig, Compute, MemoryCache};
pub use error::{ClientError, Result};
pub use fetcher::{CachedStatement, FetchStrategy, HttpResolver, HttpResolverConfig, StatementFetcher};
pub use resolver::{ResolveResult, ResolverConfig, TrustChainResolver};
pub use trust_mark::{TrustMarkValidationResult, TrustMarkValidator};
