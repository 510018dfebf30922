//! Score feed ingestion handlers

use crate::api::auth::require_feed;
use crate::engine::scoring::{self, FixtureApplyOutcome};
use crate::error::{EngineError, EngineResult};
use crate::models::AuthRole;
use crate::state::AppState;
use axum::http::HeaderMap;
use axum::{
    extract::{Query, State},
    Json,
};
use score_feed::FixtureUpdate;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct IngestQuery {
    /// Admin-only correction of a result already marked full-time.
    #[serde(rename = "override", default)]
    pub override_final: bool,
}

pub async fn ingest_result(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<IngestQuery>,
    Json(update): Json<FixtureUpdate>,
) -> EngineResult<Json<FixtureApplyOutcome>> {
    let session = require_feed(&state, &headers)?;
    if query.override_final && session.role != AuthRole::Admin {
        return Err(EngineError::Forbidden);
    }

    let outcome = scoring::apply_fixture_result(
        &state.db,
        state.scoring.as_ref(),
        &update,
        query.override_final,
    )
    .await?;
    Ok(Json(outcome))
}
