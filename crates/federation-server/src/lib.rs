//! Federation Server
//!
//! HTTP surface over the federation client:
//!
//! - `GET /health` - Liveness check
//! - `GET /v1/resolve` - Discover a trust chain for `sub`
//! - `POST /v1/verify` - Verify an assembled trust chain
//! - `POST /v1/trust-marks/validate` - Validate a trust mark against an
//!   anchor's policy

pub mod api;
pub mod config;

pub use api::create_router;
pub use api::handlers::AppState;
pub use config::{ConfigError, ServerConfig};
