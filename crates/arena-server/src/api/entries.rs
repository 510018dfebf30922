//! Team selection API handlers: joining, viewing, proof submission

use crate::api::auth::{require_auth, require_self_or_admin};
use crate::db::queries;
use crate::engine::entry;
use crate::engine::verification::{self, VerificationState};
use crate::error::{EngineError, EngineResult};
use crate::models::{AuthRole, JoinRequest, SubmitProofsRequest, TeamSelection};
use crate::state::AppState;
use axum::http::HeaderMap;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

/// Selection plus its derived verification progress.
#[derive(Debug, Serialize)]
pub struct SelectionResponse {
    #[serde(flatten)]
    pub selection: TeamSelection,
    pub verification_state: VerificationState,
}

async fn with_verification_state(
    state: &AppState,
    selection: TeamSelection,
) -> EngineResult<SelectionResponse> {
    let competition = queries::get_competition(&state.db, &selection.competition_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("competition".to_string()))?;
    let verified = selection.proofs.iter().filter(|p| p.verified).count();
    let verification_state = verification::derive_state(verified, competition.rules.len());
    Ok(SelectionResponse {
        selection,
        verification_state,
    })
}

pub async fn join_competition(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(competition_id): Path<String>,
    Json(req): Json<JoinRequest>,
) -> EngineResult<Json<TeamSelection>> {
    let session = require_auth(&state, &headers)?;
    if session.role == AuthRole::Feed {
        return Err(EngineError::Forbidden);
    }

    let selection = entry::join(&state.db, &competition_id, &session.user_id, &req.selections).await?;
    Ok(Json(selection))
}

pub async fn get_selection(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> EngineResult<Json<SelectionResponse>> {
    let selection = queries::get_selection(&state.db, &id)
        .await?
        .ok_or_else(|| EngineError::NotFound("team selection".to_string()))?;
    require_self_or_admin(&state, &headers, &selection.user_id)?;

    Ok(Json(with_verification_state(&state, selection).await?))
}

pub async fn submit_proofs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<SubmitProofsRequest>,
) -> EngineResult<Json<SelectionResponse>> {
    let session = require_auth(&state, &headers)?;
    let selection =
        verification::submit_proofs(&state.db, &id, &session.user_id, &req.urls).await?;
    Ok(Json(with_verification_state(&state, selection).await?))
}
