//! Trust mark validation handler

use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use federation_client::TrustMarkValidationResult;
use federation_core::{
    entity_configuration_url, verify_with_jwks, EntityConfiguration, Jwt, StatementClaims,
};

use crate::api::error::ApiError;
use crate::api::handlers::AppState;

/// Request to validate a trust mark
#[derive(Debug, Deserialize)]
pub struct ValidateTrustMarkRequest {
    /// Trust mark JWT
    pub trust_mark: String,

    /// Entity identifier of the anchor whose policy applies
    pub trust_anchor: String,

    #[serde(default)]
    pub current_time: Option<i64>,
}

/// POST /v1/trust-marks/validate
///
/// Fetches the anchor's configuration for its trust mark policy. An anchor
/// that cannot be fetched, does not verify, or is outside its validity
/// window at `current_time` is a 502.
pub async fn validate_trust_mark(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ValidateTrustMarkRequest>,
) -> Result<Json<TrustMarkValidationResult>, ApiError> {
    let now = request
        .current_time
        .unwrap_or_else(|| chrono::Utc::now().timestamp());
    let anchor = fetch_anchor_configuration(&state, &request.trust_anchor, now).await?;

    let result = state
        .trust_marks
        .validate_trust_mark(&request.trust_mark, &anchor, Some(now))
        .await;

    info!(
        anchor = %request.trust_anchor,
        valid = result.is_valid,
        "Trust mark validation requested"
    );

    Ok(Json(result))
}

async fn fetch_anchor_configuration(
    state: &AppState,
    anchor_id: &str,
    now: i64,
) -> Result<EntityConfiguration, ApiError> {
    let url = entity_configuration_url(anchor_id)?;
    let raw = state.fetcher.fetch_statement(&url).await.map_err(|e| {
        warn!(anchor = %anchor_id, error = %e, "Trust anchor configuration unavailable");
        ApiError::BadGateway(format!("trust anchor configuration unavailable: {}", e))
    })?;

    let jwt = Jwt::decode(&raw)?;
    let configuration = EntityConfiguration::from_jwt(&jwt)?;

    if configuration.sub != anchor_id
        || !verify_with_jwks(state.jws.as_ref(), &jwt, &configuration.jwks).await
    {
        warn!(anchor = %anchor_id, "Trust anchor configuration failed self-verification");
        return Err(ApiError::BadGateway(
            "trust anchor configuration is not validly self-signed".into(),
        ));
    }

    if !configuration.is_valid_at(now) {
        warn!(
            anchor = %anchor_id,
            iat = configuration.iat,
            exp = configuration.exp,
            now,
            "Trust anchor configuration outside its validity window"
        );
        return Err(ApiError::BadGateway(
            "trust anchor configuration is not currently valid".into(),
        ));
    }

    Ok(configuration)
}
