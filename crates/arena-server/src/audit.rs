//! Observability - Sentry integration and audit trail
//!
//! Every money movement, verification action, and settlement side effect
//! lands in the `events` table so a competition's closeout can be
//! reconstructed after the fact. Corruption alerts (failed compensations)
//! are the one event class that pages a human.

use crate::db::DbPool;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Initialize Sentry if SENTRY_DSN is set
pub fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok()?;

    if dsn.is_empty() {
        info!("Sentry DSN is empty, error tracking disabled");
        return None;
    }

    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: std::env::var("ENVIRONMENT").ok().map(|s| s.into()),
            traces_sample_rate: 0.1,
            ..Default::default()
        },
    ));

    info!("Sentry initialized for error tracking");
    Some(guard)
}

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Authentication
    AuthSuccess,
    AuthFailed,

    // Entry coordination
    JoinAdmitted,
    JoinRejected,
    JoinCompensated,

    // Scoring
    FixtureApplied,

    // Verification
    ProofsSubmitted,
    ProofReviewed,
    ParticipantDisqualified,
    ParticipantRequalified,

    // Settlement
    WinnerOverrideSet,
    SettlementStarted,
    SettlementResumed,
    PayoutCredited,
    StakeRefunded,
    CompetitionSettled,
    RanksRecomputed,

    // Wallet
    WalletDeposit,

    // Escalations
    CorruptionAlert,
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_string(self).unwrap_or_else(|_| "unknown".to_string());
        write!(f, "{}", s.trim_matches('"'))
    }
}

/// Record an audit event. Audit failures are logged but never abort the
/// operation being audited.
pub async fn record(
    db: &DbPool,
    event_type: AuditEventType,
    entity_type: &str,
    entity_id: &str,
    payload: Option<serde_json::Value>,
    actor: Option<&str>,
) {
    let name = event_type.to_string();
    if let Err(e) = crate::db::queries::log_event(
        db,
        &name,
        Some(entity_type),
        Some(entity_id),
        payload.as_ref(),
        actor,
    )
    .await
    {
        warn!(event = %name, entity = %entity_id, "Failed to record audit event: {}", e);
    }
}
