//! Federation Server Binary
//!
//! Runs the HTTP server for trust chain resolution and verification.

use std::env;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use federation_client::{CachedStatement, HttpResolver, MemoryCache};
use federation_server::{create_router, AppState, ServerConfig};

#[tokio::main]
async fn main() {
    // Initialize logging
    let log_level = env::var("FEDERATION_LOG_LEVEL")
        .unwrap_or_else(|_| "info".into())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let config = ServerConfig::from_env().expect("Invalid configuration");

    // Statement cache shared by resolution and trust mark validation
    let cache: Arc<MemoryCache<String, CachedStatement>> =
        Arc::new(MemoryCache::new(config.cache.clone()));
    let http = HttpResolver::with_cache(config.http.clone(), cache)
        .expect("Failed to build HTTP client");

    info!(
        port = config.port,
        trust_anchors = ?config.trust_anchors,
        max_depth = config.resolver.max_depth,
        "Starting federation server"
    );

    let port = config.port;
    let state = Arc::new(AppState::new(Arc::new(http), config));
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    info!(addr = %addr, "Federation server listening");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
