//! Wallet API handlers

use crate::api::auth::{require_admin, require_self_or_admin};
use crate::audit::{self, AuditEventType};
use crate::db::queries;
use crate::error::{EngineError, EngineResult};
use crate::models::{DepositRequest, Wallet};
use crate::state::AppState;
use axum::http::HeaderMap;
use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use tracing::info;

pub async fn get_wallet(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> EngineResult<Json<Wallet>> {
    require_self_or_admin(&state, &headers, &user_id)?;
    let wallet = queries::get_wallet(&state.db, &user_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("wallet".to_string()))?;
    Ok(Json(wallet))
}

pub async fn deposit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Json(req): Json<DepositRequest>,
) -> EngineResult<Json<serde_json::Value>> {
    let session = require_admin(&state, &headers)?;
    if req.amount <= 0 {
        return Err(EngineError::Validation(
            "deposit amount must be positive".to_string(),
        ));
    }

    let balance =
        queries::deposit(&state.db, &user_id, req.amount, req.payout_details.as_ref()).await?;

    info!(user = %user_id, amount = req.amount, balance, "Wallet deposit");
    audit::record(
        &state.db,
        AuditEventType::WalletDeposit,
        "wallet",
        &user_id,
        Some(serde_json::json!({ "amount": req.amount, "balance": balance })),
        Some(&session.user_id),
    )
    .await;

    Ok(Json(serde_json::json!({
        "success": true,
        "user_id": user_id,
        "balance": balance,
    })))
}
