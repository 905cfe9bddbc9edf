//! Trust chain resolution handler

use axum::{
    extract::{RawQuery, State},
    Json,
};
use std::sync::Arc;
use tracing::info;

use federation_client::ResolveResult;

use crate::api::error::ApiError;
use crate::api::handlers::AppState;

/// Parsed `/v1/resolve` query
///
/// `trust_anchor` may repeat, which the stock `Query` extractor cannot
/// express.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ResolveQuery {
    pub sub: String,
    pub trust_anchors: Vec<String>,
    pub max_depth: Option<usize>,
}

impl ResolveQuery {
    pub fn parse(query: Option<&str>) -> Result<Self, ApiError> {
        let mut sub = None;
        let mut trust_anchors = Vec::new();
        let mut max_depth = None;

        for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            match key.as_ref() {
                "sub" => sub = Some(value.into_owned()),
                "trust_anchor" => trust_anchors.push(value.into_owned()),
                "max_depth" => {
                    let depth = value.parse::<usize>().map_err(|_| {
                        ApiError::BadRequest(format!("max_depth must be a number, got '{}'", value))
                    })?;
                    max_depth = Some(depth);
                }
                _ => {}
            }
        }

        let sub = sub
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::BadRequest("missing 'sub' query parameter".into()))?;

        Ok(Self {
            sub,
            trust_anchors,
            max_depth,
        })
    }
}

/// GET /v1/resolve?sub=..&trust_anchor=..[&trust_anchor=..][&max_depth=n]
///
/// Falls back to the configured trust anchors when none are given.
pub async fn resolve(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Result<Json<ResolveResult>, ApiError> {
    let query = ResolveQuery::parse(query.as_deref())?;

    let anchors = if query.trust_anchors.is_empty() {
        state.config.trust_anchors.clone()
    } else {
        query.trust_anchors
    };
    if anchors.is_empty() {
        return Err(ApiError::BadRequest(
            "no trust_anchor given and none configured".into(),
        ));
    }

    info!(
        subject = %query.sub,
        anchors = anchors.len(),
        "Resolving trust chain"
    );

    let result = state
        .resolver
        .resolve(&query.sub, &anchors, query.max_depth)
        .await;

    Ok(Json(result))
}
