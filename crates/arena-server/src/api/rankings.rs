//! Rankings API handlers

use crate::db::queries;
use crate::error::{EngineError, EngineResult};
use crate::models::{GameKind, RankRow};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct RankingsQuery {
    /// Game type filter: topscore | mangoset | league | all
    #[serde(rename = "type")]
    pub game_type: Option<String>,
    /// world (default) | country
    pub scope: Option<String>,
    pub country: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn get_rankings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RankingsQuery>,
) -> EngineResult<Json<Vec<RankRow>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * limit;

    let game_type = match query.game_type.as_deref() {
        None | Some("all") => None,
        Some(kind) => Some(GameKind::from(kind)),
    };

    let country = if query.scope.as_deref() == Some("country") {
        let country = query
            .country
            .as_deref()
            .ok_or_else(|| {
                EngineError::Validation("country scope requires a country parameter".to_string())
            })?;
        Some(country)
    } else {
        None
    };

    let cache_key = format!(
        "{}|{}|{}|{}",
        query.game_type.as_deref().unwrap_or("all"),
        country.unwrap_or("world"),
        page,
        limit
    );
    if let Some(rows) = state.rankings_cache.get(&cache_key) {
        return Ok(Json(rows));
    }

    let rows = queries::get_rankings(&state.db, game_type, country, limit, offset).await?;
    state.rankings_cache.put(cache_key, rows.clone());
    Ok(Json(rows))
}

pub async fn get_user_rank(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> EngineResult<Json<RankRow>> {
    let row = queries::get_rank_row(&state.db, &user_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("rank row".to_string()))?;
    Ok(Json(row))
}
