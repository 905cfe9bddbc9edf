//! Trust chain verification handler

use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use federation_core::VerifyResult;

use crate::api::handlers::AppState;

/// Request to verify an assembled trust chain
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    /// Statements from the subject's configuration to the anchor's
    pub trust_chain: Vec<String>,

    /// Expected trust anchor; any anchor is accepted when absent
    #[serde(default)]
    pub trust_anchor: Option<String>,

    /// Evaluation time in epoch seconds; defaults to now
    #[serde(default)]
    pub current_time: Option<i64>,
}

/// POST /v1/verify
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyRequest>,
) -> Json<VerifyResult> {
    let result = state
        .verifier
        .verify(
            &request.trust_chain,
            request.trust_anchor.as_deref(),
            request.current_time,
        )
        .await;

    info!(
        length = request.trust_chain.len(),
        valid = result.is_valid,
        "Trust chain verification requested"
    );

    Json(result)
}
