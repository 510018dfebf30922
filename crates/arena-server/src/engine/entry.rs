//! Entry coordinator
//!
//! Admits a team selection into a competition while money changes hands.
//! The side effects (participant-count increment, star-fixture reservation,
//! wallet debit, selection insert) form a saga: each step is one conditional
//! write, and a failure after any step compensates the earlier ones in
//! reverse order. A failed compensation is escalated as a corruption alert,
//! never retried silently.

use crate::audit::{self, AuditEventType};
use crate::db::{queries, DbPool};
use crate::error::{EngineError, EngineResult};
use crate::models::{Competition, TeamPick, TeamSelection};
use std::collections::HashSet;
use tracing::{error, info};

/// Hard floor on selection size, independent of competition configuration.
pub const ABSOLUTE_MIN_TEAMS: usize = 3;

/// Synchronous validation; no side effects. Returns the starred pick.
pub fn validate_selection<'a>(
    competition: &Competition,
    picks: &'a [TeamPick],
    now: i64,
) -> Result<&'a TeamPick, EngineError> {
    if !competition.is_active {
        return Err(EngineError::Validation(
            "competition is not active".to_string(),
        ));
    }
    if now < competition.starts_at || now > competition.ends_at {
        return Err(EngineError::Validation(
            "competition is not open for entries".to_string(),
        ));
    }

    let min = (competition.min_teams as usize).max(ABSOLUTE_MIN_TEAMS);
    let max = competition.max_teams as usize;
    if picks.len() < min || picks.len() > max {
        return Err(EngineError::InvalidTeamCount(format!(
            "expected between {} and {} teams, got {}",
            min,
            max,
            picks.len()
        )));
    }

    let mut fixtures = HashSet::new();
    for pick in picks {
        if !fixtures.insert(pick.fixture_id.as_str()) {
            return Err(EngineError::Validation(format!(
                "fixture {} appears more than once in the selection",
                pick.fixture_id
            )));
        }
    }

    let mut starred = picks.iter().filter(|p| p.is_starred);
    match (starred.next(), starred.next()) {
        (Some(star), None) => Ok(star),
        _ => Err(EngineError::InvalidStarSelection),
    }
}

/// Join a competition. Race-safe under concurrent joins: the capacity
/// increment and the star reservation are conditional writes that either win
/// or fail cleanly, never overshoot.
pub async fn join(
    db: &DbPool,
    competition_id: &str,
    user_id: &str,
    picks: &[TeamPick],
) -> EngineResult<TeamSelection> {
    let competition = queries::get_competition(db, competition_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("competition".to_string()))?;

    let now = chrono::Utc::now().timestamp();
    let star = validate_selection(&competition, picks, now)?;

    // Fast-path duplicate check; the UNIQUE constraint on the selection
    // insert backs this up under races.
    if queries::user_already_joined(db, competition_id, user_id).await? {
        return Err(EngineError::DuplicateJoin);
    }

    // Step 1: capacity check-and-increment.
    if !queries::try_increment_participants(db, competition_id).await? {
        return Err(EngineError::CapacityExceeded);
    }

    // Step 2: star-fixture reservation.
    let reserved = match queries::try_reserve_star(db, competition_id, &star.fixture_id, user_id)
        .await
    {
        Ok(ok) => ok,
        Err(e) => {
            compensate(db, competition_id, user_id, None, 0).await?;
            return Err(e.into());
        }
    };
    if !reserved {
        compensate(db, competition_id, user_id, None, 0).await?;
        return Err(EngineError::StarFixtureTaken);
    }

    // Step 3: fee debit.
    let fee = competition.entry_fee;
    if fee > 0 {
        let debited = match queries::debit_wallet(db, user_id, fee).await {
            Ok(ok) => ok,
            Err(e) => {
                compensate(db, competition_id, user_id, Some(&star.fixture_id), 0).await?;
                return Err(e.into());
            }
        };
        if !debited {
            compensate(db, competition_id, user_id, Some(&star.fixture_id), 0).await?;
            return Err(EngineError::InsufficientBalance);
        }
    }

    // Step 4: persist the selection.
    let inserted = match queries::insert_selection(
        db,
        competition_id,
        user_id,
        fee,
        Some(&star.fixture_id),
        picks,
    )
    .await
    {
        Ok(v) => v,
        Err(e) => {
            compensate(db, competition_id, user_id, Some(&star.fixture_id), fee).await?;
            return Err(e.into());
        }
    };

    let selection = match inserted {
        Some(selection) => selection,
        None => {
            compensate(db, competition_id, user_id, Some(&star.fixture_id), fee).await?;
            return Err(EngineError::DuplicateJoin);
        }
    };

    info!(
        competition = %competition_id,
        user = %user_id,
        teams = picks.len(),
        star = %star.fixture_id,
        fee,
        "Participant admitted"
    );
    audit::record(
        db,
        AuditEventType::JoinAdmitted,
        "team_selection",
        &selection.id,
        Some(serde_json::json!({
            "competition_id": competition_id,
            "staked_amount": fee,
            "star_fixture": star.fixture_id,
        })),
        Some(user_id),
    )
    .await;

    Ok(selection)
}

/// Undo partial reservations, in reverse order of acquisition: refund the
/// debit, release the star, decrement the count. A failure here leaves a
/// known-orphaned reservation and is escalated for manual reconciliation.
async fn compensate(
    db: &DbPool,
    competition_id: &str,
    user_id: &str,
    star_fixture: Option<&str>,
    refund: i64,
) -> EngineResult<()> {
    let result: anyhow::Result<()> = async {
        if refund > 0 {
            queries::credit_wallet(db, user_id, refund).await?;
        }
        if let Some(fixture_id) = star_fixture {
            queries::release_star(db, competition_id, fixture_id, user_id).await?;
        }
        queries::decrement_participants(db, competition_id).await?;
        Ok(())
    }
    .await;

    match result {
        Ok(()) => {
            audit::record(
                db,
                AuditEventType::JoinCompensated,
                "competition",
                competition_id,
                Some(serde_json::json!({
                    "refund": refund,
                    "star_fixture": star_fixture,
                })),
                Some(user_id),
            )
            .await;
            Ok(())
        }
        Err(e) => {
            error!(
                competition = %competition_id,
                user = %user_id,
                "Join compensation failed: {}", e
            );
            audit::record(
                db,
                AuditEventType::CorruptionAlert,
                "competition",
                competition_id,
                Some(serde_json::json!({
                    "operation": "join_compensation",
                    "refund": refund,
                    "star_fixture": star_fixture,
                    "error": e.to_string(),
                })),
                Some(user_id),
            )
            .await;
            Err(EngineError::Corruption(format!(
                "join compensation for user {} in competition {}: {}",
                user_id, competition_id, e
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GameKind;
    use score_feed::Side;

    fn competition() -> Competition {
        Competition {
            id: "c-1".to_string(),
            name: "Weekend Cup".to_string(),
            kind: GameKind::ManGoSet,
            entry_fee: 50,
            host_contribution: 100,
            prize_pool: 200,
            participant_cap: 2,
            participant_count: 0,
            min_participants: 2,
            min_teams: 3,
            max_teams: 5,
            rules: vec![],
            shared_winners: false,
            is_active: true,
            is_public: true,
            starts_at: 1_000,
            ends_at: 2_000,
            winner_override: None,
            winners: None,
            settled_at: None,
            created_by: "admin-1".to_string(),
            created_at: 900,
        }
    }

    fn pick(fixture: &str, starred: bool) -> TeamPick {
        TeamPick {
            fixture_id: fixture.to_string(),
            selected_team: "Lions".to_string(),
            opponent_team: "Tigers".to_string(),
            venue: Side::Home,
            is_starred: starred,
        }
    }

    #[test]
    fn test_validate_selection_ok() {
        let picks = vec![pick("f1", true), pick("f2", false), pick("f3", false)];
        let star = validate_selection(&competition(), &picks, 1_500).unwrap();
        assert_eq!(star.fixture_id, "f1");
    }

    #[test]
    fn test_validate_rejects_inactive() {
        let mut comp = competition();
        comp.is_active = false;
        let picks = vec![pick("f1", true), pick("f2", false), pick("f3", false)];
        assert!(matches!(
            validate_selection(&comp, &picks, 1_500),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_outside_window() {
        let picks = vec![pick("f1", true), pick("f2", false), pick("f3", false)];
        assert!(matches!(
            validate_selection(&competition(), &picks, 2_500),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            validate_selection(&competition(), &picks, 500),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_team_count_bounds() {
        // Too few
        let picks = vec![pick("f1", true), pick("f2", false)];
        assert!(matches!(
            validate_selection(&competition(), &picks, 1_500),
            Err(EngineError::InvalidTeamCount(_))
        ));

        // Too many
        let picks: Vec<_> = (0..6)
            .map(|i| pick(&format!("f{}", i), i == 0))
            .collect();
        assert!(matches!(
            validate_selection(&competition(), &picks, 1_500),
            Err(EngineError::InvalidTeamCount(_))
        ));
    }

    #[test]
    fn test_validate_min_teams_floor_is_three() {
        // Competition config below the hard floor is clamped up.
        let mut comp = competition();
        comp.min_teams = 1;
        let picks = vec![pick("f1", true), pick("f2", false)];
        assert!(matches!(
            validate_selection(&comp, &picks, 1_500),
            Err(EngineError::InvalidTeamCount(_))
        ));
    }

    #[test]
    fn test_validate_star_exactly_one() {
        // No star
        let picks = vec![pick("f1", false), pick("f2", false), pick("f3", false)];
        assert!(matches!(
            validate_selection(&competition(), &picks, 1_500),
            Err(EngineError::InvalidStarSelection)
        ));

        // Two stars
        let picks = vec![pick("f1", true), pick("f2", true), pick("f3", false)];
        assert!(matches!(
            validate_selection(&competition(), &picks, 1_500),
            Err(EngineError::InvalidStarSelection)
        ));
    }

    #[test]
    fn test_validate_duplicate_fixture() {
        let picks = vec![pick("f1", true), pick("f1", false), pick("f3", false)];
        assert!(matches!(
            validate_selection(&competition(), &picks, 1_500),
            Err(EngineError::Validation(_))
        ));
    }
}
