//! Competitions API handlers

use crate::api::auth::require_admin;
use crate::db::queries;
use crate::error::{EngineError, EngineResult};
use crate::models::{Competition, CreateCompetitionRequest, StandingRow};
use crate::state::AppState;
use axum::http::HeaderMap;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct ListCompetitionsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub active: Option<bool>,
}

pub async fn list_competitions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListCompetitionsQuery>,
) -> EngineResult<Json<Vec<Competition>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * limit;

    let competitions =
        queries::list_competitions(&state.db, query.active.unwrap_or(true), limit, offset).await?;
    Ok(Json(competitions))
}

pub async fn get_competition(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> EngineResult<Json<Competition>> {
    let competition = queries::get_competition(&state.db, &id)
        .await?
        .ok_or_else(|| EngineError::NotFound("competition".to_string()))?;
    Ok(Json(competition))
}

pub async fn get_standings(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> EngineResult<Json<Vec<StandingRow>>> {
    if queries::get_competition(&state.db, &id).await?.is_none() {
        return Err(EngineError::NotFound("competition".to_string()));
    }
    let standings = queries::competition_standings(&state.db, &id).await?;
    Ok(Json(standings))
}

pub async fn create_competition(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateCompetitionRequest>,
) -> EngineResult<Json<Competition>> {
    let session = require_admin(&state, &headers)?;

    if req.participant_cap < 1 {
        return Err(EngineError::Validation(
            "participant_cap must be at least 1".to_string(),
        ));
    }
    if req.entry_fee < 0 || req.host_contribution < 0 {
        return Err(EngineError::Validation(
            "entry_fee and host_contribution must be non-negative".to_string(),
        ));
    }
    if req.min_teams < 3 || req.max_teams < req.min_teams {
        return Err(EngineError::Validation(
            "team bounds must satisfy 3 <= min_teams <= max_teams".to_string(),
        ));
    }
    if req.ends_at <= req.starts_at {
        return Err(EngineError::Validation(
            "ends_at must be after starts_at".to_string(),
        ));
    }

    let competition = queries::create_competition(&state.db, &req, &session.user_id).await?;
    info!(
        competition = %competition.id,
        kind = %competition.kind.to_string(),
        prize_pool = competition.prize_pool,
        "Competition created"
    );
    Ok(Json(competition))
}
