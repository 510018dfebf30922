//! Admin API handlers: verification review, winner override, settlement,
//! rank recompute

use crate::api::auth::require_admin;
use crate::audit::{self, AuditEventType};
use crate::db::queries;
use crate::engine::{ranking, settlement, verification};
use crate::error::{EngineError, EngineResult};
use crate::models::{
    GameKind, ReviewProofRequest, SettlementOutcome, TeamSelection, WinnerOverrideRequest,
};
use crate::state::AppState;
use axum::http::HeaderMap;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub async fn review_proof(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((selection_id, step)): Path<(String, i32)>,
    Json(req): Json<ReviewProofRequest>,
) -> EngineResult<Json<TeamSelection>> {
    let session = require_admin(&state, &headers)?;
    let selection = verification::review_proof(
        &state.db,
        &selection_id,
        step,
        req.verified,
        &session.user_id,
    )
    .await?;
    Ok(Json(selection))
}

pub async fn disqualify_participant(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(selection_id): Path<String>,
) -> EngineResult<Json<TeamSelection>> {
    let session = require_admin(&state, &headers)?;
    let selection = verification::disqualify(&state.db, &selection_id, &session.user_id).await?;
    Ok(Json(selection))
}

pub async fn requalify_participant(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(selection_id): Path<String>,
) -> EngineResult<Json<TeamSelection>> {
    let session = require_admin(&state, &headers)?;
    let selection = verification::requalify(&state.db, &selection_id, &session.user_id).await?;
    Ok(Json(selection))
}

/// Explicit winner override, set before settlement; it wins over the
/// algorithmic rank-1 pick when the competition deactivates.
pub async fn set_winner(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(competition_id): Path<String>,
    Json(req): Json<WinnerOverrideRequest>,
) -> EngineResult<Json<serde_json::Value>> {
    let session = require_admin(&state, &headers)?;
    let user_ids = req.user_ids.into_vec();
    if user_ids.is_empty() {
        return Err(EngineError::Validation(
            "winner override requires at least one user id".to_string(),
        ));
    }

    if !queries::set_winner_override(&state.db, &competition_id, &user_ids).await? {
        return match queries::get_competition(&state.db, &competition_id).await? {
            None => Err(EngineError::NotFound("competition".to_string())),
            Some(_) => Err(EngineError::AlreadySettled),
        };
    }

    info!(competition = %competition_id, winners = ?user_ids, "Winner override set");
    audit::record(
        &state.db,
        AuditEventType::WinnerOverrideSet,
        "competition",
        &competition_id,
        Some(serde_json::json!({ "user_ids": user_ids })),
        Some(&session.user_id),
    )
    .await;

    Ok(Json(serde_json::json!({
        "success": true,
        "competition_id": competition_id,
        "user_ids": user_ids,
    })))
}

/// Trigger settlement. Idempotent: re-invoking on a settled competition
/// returns success without re-running side effects.
pub async fn deactivate_competition(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(competition_id): Path<String>,
) -> EngineResult<Json<SettlementOutcome>> {
    require_admin(&state, &headers)?;
    let outcome = settlement::deactivate(&state.db, &competition_id).await?;
    state.rankings_cache.clear();
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct RecomputeQuery {
    pub scope: Option<String>,
    #[serde(rename = "type")]
    pub game_type: Option<String>,
}

pub async fn recompute_rankings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RecomputeQuery>,
) -> EngineResult<Json<serde_json::Value>> {
    require_admin(&state, &headers)?;

    let scope = ranking::RecomputeScope::from(query.scope.as_deref().unwrap_or("world"));
    let touched = match query.game_type.as_deref() {
        None => ranking::recompute(&state.db, scope, None).await?,
        Some("all") => ranking::recompute_all(&state.db, scope).await?,
        Some(kind) => ranking::recompute(&state.db, scope, Some(GameKind::from(kind))).await?,
    };
    state.rankings_cache.clear();

    Ok(Json(serde_json::json!({
        "success": true,
        "scope": scope.as_str(),
        "touched": touched,
    })))
}
