//! Authentication API handlers
//!
//! Identity is resolved upstream: the gateway signs `{user_id, timestamp,
//! role}` with the shared secret and this endpoint exchanges the assertion
//! for a session token. The engine itself never sees credentials.

use crate::audit::{self, AuditEventType};
use crate::db::queries;
use crate::error::EngineError;
use crate::models::{AuthRequest, AuthResponse, AuthRole, AuthSession};
use crate::state::AppState;
use axum::http::HeaderMap;
use axum::{extract::State, http::StatusCode, Json};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use uuid::Uuid;

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

pub fn expected_signature(secret: &str, user_id: &str, timestamp: i64, role: &AuthRole) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b":");
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(timestamp.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(role.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_signature(
    secret: &str,
    user_id: &str,
    timestamp: i64,
    role: &AuthRole,
    signature: &str,
) -> bool {
    expected_signature(secret, user_id, timestamp, role) == signature
}

fn reject(status: StatusCode, message: &str) -> (StatusCode, Json<AuthResponse>) {
    (
        status,
        Json(AuthResponse {
            success: false,
            token: None,
            expires_at: None,
            error: Some(message.to_string()),
        }),
    )
}

pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AuthRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, Json<AuthResponse>)> {
    let current_time = now();
    if (current_time - req.timestamp).abs() > 300 {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "Timestamp too old or in future",
        ));
    }

    if !verify_signature(
        &state.auth_secret,
        &req.user_id,
        req.timestamp,
        &req.role,
        &req.signature,
    ) {
        warn!("Invalid signature for auth request from {}", req.user_id);
        audit::record(
            &state.db,
            AuditEventType::AuthFailed,
            "user",
            &req.user_id,
            None,
            None,
        )
        .await;
        return Err(reject(StatusCode::UNAUTHORIZED, "Invalid signature"));
    }

    // Participants get their wallet and leaderboard row lazily on first auth.
    if req.role == AuthRole::User {
        let _ = queries::ensure_wallet(&state.db, &req.user_id).await;
        let _ = queries::ensure_rank_row(&state.db, &req.user_id, req.country.as_deref()).await;
    }

    let token = Uuid::new_v4().to_string();
    let expires_at = current_time + 3600;

    let session = AuthSession {
        user_id: req.user_id.clone(),
        role: req.role.clone(),
        expires_at,
    };
    state.sessions.insert(token.clone(), session);

    info!("Authenticated {} as {:?}", req.user_id, req.role);
    audit::record(
        &state.db,
        AuditEventType::AuthSuccess,
        "user",
        &req.user_id,
        Some(serde_json::json!({ "role": req.role.as_str() })),
        None,
    )
    .await;

    Ok(Json(AuthResponse {
        success: true,
        token: Some(token),
        expires_at: Some(expires_at),
        error: None,
    }))
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    if let Some(v) = headers.get("x-auth-token").and_then(|v| v.to_str().ok()) {
        return Some(v.to_string());
    }
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

pub fn require_auth(state: &AppState, headers: &HeaderMap) -> Result<AuthSession, EngineError> {
    let token = bearer_token(headers)
        .ok_or_else(|| EngineError::Unauthorized("missing auth token".to_string()))?;
    let session = state
        .sessions
        .get(&token)
        .map(|s| s.clone())
        .ok_or_else(|| EngineError::Unauthorized("invalid or expired token".to_string()))?;

    if session.expires_at < now() {
        return Err(EngineError::Unauthorized("token expired".to_string()));
    }

    Ok(session)
}

pub fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<AuthSession, EngineError> {
    let session = require_auth(state, headers)?;
    if session.role != AuthRole::Admin {
        return Err(EngineError::Forbidden);
    }
    Ok(session)
}

/// Score-feed ingestion is open to the feed service and to admins.
pub fn require_feed(state: &AppState, headers: &HeaderMap) -> Result<AuthSession, EngineError> {
    let session = require_auth(state, headers)?;
    if session.role != AuthRole::Feed && session.role != AuthRole::Admin {
        return Err(EngineError::Forbidden);
    }
    Ok(session)
}

/// Owner-or-admin access to per-user resources.
pub fn require_self_or_admin(
    state: &AppState,
    headers: &HeaderMap,
    user_id: &str,
) -> Result<AuthSession, EngineError> {
    let session = require_auth(state, headers)?;
    if session.role != AuthRole::Admin && session.user_id != user_id {
        return Err(EngineError::Forbidden);
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_roundtrip() {
        let sig = expected_signature("secret", "user-1", 1_700_000_000, &AuthRole::User);
        assert!(verify_signature(
            "secret",
            "user-1",
            1_700_000_000,
            &AuthRole::User,
            &sig
        ));
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let sig = expected_signature("secret", "user-1", 1_700_000_000, &AuthRole::User);
        // Different user
        assert!(!verify_signature(
            "secret",
            "user-2",
            1_700_000_000,
            &AuthRole::User,
            &sig
        ));
        // Role escalation
        assert!(!verify_signature(
            "secret",
            "user-1",
            1_700_000_000,
            &AuthRole::Admin,
            &sig
        ));
        // Wrong secret
        assert!(!verify_signature(
            "other",
            "user-1",
            1_700_000_000,
            &AuthRole::User,
            &sig
        ));
    }
}
