//! Verification state machine
//!
//! Tracks per-step proof review on a selection and derives the qualification
//! flags. Disqualification is orthogonal to verification progress and is
//! reversible only through requalify, whose precondition (every required
//! step verified) is enforced as a single conditional write.

use crate::audit::{self, AuditEventType};
use crate::db::{queries, DbPool};
use crate::error::{EngineError, EngineResult};
use crate::models::TeamSelection;
use serde::Serialize;
use tracing::info;

/// Verification progress, derived from proof review state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    Unverified,
    PartiallyVerified,
    FullyVerified,
}

pub fn derive_state(verified_steps: usize, required_steps: usize) -> VerificationState {
    if required_steps == 0 || verified_steps >= required_steps {
        VerificationState::FullyVerified
    } else if verified_steps == 0 {
        VerificationState::Unverified
    } else {
        VerificationState::PartiallyVerified
    }
}

async fn load_selection(db: &DbPool, selection_id: &str) -> EngineResult<TeamSelection> {
    queries::get_selection(db, selection_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("team selection".to_string()))
}

async fn required_steps(db: &DbPool, competition_id: &str) -> EngineResult<usize> {
    let competition = queries::get_competition(db, competition_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("competition".to_string()))?;
    Ok(competition.rules.len())
}

/// A participant submits proof URLs for the competition's verification
/// steps, in step order. Resubmitting a step resets its verified flag.
pub async fn submit_proofs(
    db: &DbPool,
    selection_id: &str,
    caller_user_id: &str,
    urls: &[String],
) -> EngineResult<TeamSelection> {
    let selection = load_selection(db, selection_id).await?;
    if selection.user_id != caller_user_id {
        return Err(EngineError::Forbidden);
    }

    let required = required_steps(db, &selection.competition_id).await?;
    if required == 0 {
        return Err(EngineError::Validation(
            "competition has no verification steps".to_string(),
        ));
    }
    if urls.is_empty() || urls.len() > required {
        return Err(EngineError::Validation(format!(
            "expected between 1 and {} proof urls, got {}",
            required,
            urls.len()
        )));
    }

    for (step, url) in urls.iter().enumerate() {
        queries::upsert_proof(db, selection_id, step as i32, url).await?;
    }
    queries::refresh_steps_verified(db, selection_id, required as i64).await?;

    audit::record(
        db,
        AuditEventType::ProofsSubmitted,
        "team_selection",
        selection_id,
        Some(serde_json::json!({ "steps": urls.len() })),
        Some(caller_user_id),
    )
    .await;

    load_selection(db, selection_id).await
}

/// Admin review of one proof step.
pub async fn review_proof(
    db: &DbPool,
    selection_id: &str,
    step_index: i32,
    verified: bool,
    reviewer: &str,
) -> EngineResult<TeamSelection> {
    let selection = load_selection(db, selection_id).await?;
    let required = required_steps(db, &selection.competition_id).await?;
    if step_index < 0 || step_index as usize >= required {
        return Err(EngineError::NotFound("proof step".to_string()));
    }

    if !queries::set_proof_verified(db, selection_id, step_index, verified).await? {
        return Err(EngineError::NotFound("proof".to_string()));
    }
    queries::refresh_steps_verified(db, selection_id, required as i64).await?;

    info!(
        selection = %selection_id,
        step = step_index,
        verified,
        "Proof reviewed"
    );
    audit::record(
        db,
        AuditEventType::ProofReviewed,
        "team_selection",
        selection_id,
        Some(serde_json::json!({ "step": step_index, "verified": verified })),
        Some(reviewer),
    )
    .await;

    load_selection(db, selection_id).await
}

/// Disqualify a participant. Keeps them on the participant list and leaves
/// accrued points visible; only winner eligibility is revoked.
pub async fn disqualify(db: &DbPool, selection_id: &str, actor: &str) -> EngineResult<TeamSelection> {
    if !queries::set_disqualified(db, selection_id).await? {
        return Err(EngineError::NotFound("team selection".to_string()));
    }

    info!(selection = %selection_id, "Participant disqualified");
    audit::record(
        db,
        AuditEventType::ParticipantDisqualified,
        "team_selection",
        selection_id,
        None,
        Some(actor),
    )
    .await;

    load_selection(db, selection_id).await
}

/// Reverse a disqualification. Hard precondition: every required proof step
/// must be verified, enforced by the conditional write itself.
pub async fn requalify(db: &DbPool, selection_id: &str, actor: &str) -> EngineResult<TeamSelection> {
    let selection = load_selection(db, selection_id).await?;
    let required = required_steps(db, &selection.competition_id).await?;

    if !queries::try_requalify(db, selection_id, required as i64).await? {
        return Err(EngineError::NotAllProofsVerified);
    }

    info!(selection = %selection_id, "Participant requalified");
    audit::record(
        db,
        AuditEventType::ParticipantRequalified,
        "team_selection",
        selection_id,
        None,
        Some(actor),
    )
    .await;

    load_selection(db, selection_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_state_unverified() {
        assert_eq!(derive_state(0, 3), VerificationState::Unverified);
    }

    #[test]
    fn test_derive_state_partial() {
        assert_eq!(derive_state(1, 3), VerificationState::PartiallyVerified);
        assert_eq!(derive_state(2, 3), VerificationState::PartiallyVerified);
    }

    #[test]
    fn test_derive_state_full() {
        assert_eq!(derive_state(3, 3), VerificationState::FullyVerified);
    }

    #[test]
    fn test_derive_state_no_required_steps() {
        // A competition without verification rules is trivially verified.
        assert_eq!(derive_state(0, 0), VerificationState::FullyVerified);
    }
}
