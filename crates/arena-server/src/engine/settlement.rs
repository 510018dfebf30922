//! Settlement engine
//!
//! One-time competition closeout: rank, pay, update streaks, freeze. The
//! compare-and-swap on `is_active` is the single linearization point; every
//! side effect after it is gated on a settlement-ledger marker, so a retry
//! against an already-deactivated competition re-runs safely without
//! double-crediting anyone.

use crate::audit::{self, AuditEventType};
use crate::db::queries::{self, ParticipantStanding};
use crate::db::DbPool;
use crate::engine::ranking;
use crate::error::{EngineError, EngineResult};
use crate::models::{Competition, Payout, SettlementOutcome};
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RankedParticipant {
    pub selection_id: String,
    pub user_id: String,
    pub total_points: i64,
    pub rank: i32,
}

/// Rank non-disqualified participants: points descending, ties broken by
/// earlier join (first-come precedence). Positions are 1..N.
pub fn assign_ranks(eligible: &[ParticipantStanding]) -> Vec<RankedParticipant> {
    let mut sorted: Vec<&ParticipantStanding> = eligible.iter().collect();
    sorted.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then(a.joined_at.cmp(&b.joined_at))
    });

    sorted
        .into_iter()
        .enumerate()
        .map(|(i, p)| RankedParticipant {
            selection_id: p.selection_id.clone(),
            user_id: p.user_id.clone(),
            total_points: p.total_points,
            rank: (i + 1) as i32,
        })
        .collect()
}

/// Winner determination. An explicit admin override takes precedence, but
/// only for users that are still eligible (a disqualified participant can
/// never be a winner); an override emptied by that filter falls back to the
/// algorithmic pick. Without an override the winner is rank 1, widened to
/// every top-point tie when the competition shares wins.
pub fn select_winners(
    ranked: &[RankedParticipant],
    override_ids: Option<&[String]>,
    shared_winners: bool,
) -> Vec<String> {
    let eligible: HashSet<&str> = ranked.iter().map(|r| r.user_id.as_str()).collect();

    if let Some(ids) = override_ids {
        let mut seen = HashSet::new();
        let filtered: Vec<String> = ids
            .iter()
            .filter(|id| eligible.contains(id.as_str()) && seen.insert(id.as_str()))
            .cloned()
            .collect();
        if !filtered.is_empty() {
            return filtered;
        }
    }

    let top = match ranked.first() {
        Some(first) => first,
        None => return Vec::new(),
    };

    if shared_winners {
        ranked
            .iter()
            .take_while(|r| r.total_points == top.total_points)
            .map(|r| r.user_id.clone())
            .collect()
    } else {
        vec![top.user_id.clone()]
    }
}

/// Even split of the pool; the integer remainder goes to the first winner in
/// rank/ID order, which keeps payouts reproducible.
pub fn split_prize(prize_pool: i64, winner_count: usize) -> Vec<i64> {
    if winner_count == 0 {
        return Vec::new();
    }
    let n = winner_count as i64;
    let share = prize_pool / n;
    let remainder = prize_pool - share * n;
    (0..winner_count)
        .map(|i| if i == 0 { share + remainder } else { share })
        .collect()
}

/// Deactivate a competition and settle it exactly once. Idempotent: a call
/// that loses the CAS to a completed settlement returns success without side
/// effects, and a call that finds a half-finished settlement (deactivated
/// but no winners recorded) resumes it against the frozen snapshot.
pub async fn deactivate(db: &DbPool, competition_id: &str) -> EngineResult<SettlementOutcome> {
    if queries::get_competition(db, competition_id).await?.is_none() {
        return Err(EngineError::NotFound("competition".to_string()));
    }

    let won_cas = queries::cas_deactivate(db, competition_id).await?;

    // Snapshot taken after the CAS: the winner override can no longer change
    // under us once the competition is frozen.
    let competition = queries::get_competition(db, competition_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("competition".to_string()))?;

    if !won_cas {
        if let Some(winners) = competition.winners.clone() {
            return Ok(SettlementOutcome {
                competition_id: competition_id.to_string(),
                already_settled: true,
                refunded: false,
                winners,
                payouts: Vec::new(),
            });
        }
        // A prior attempt died between the CAS and recording winners; the
        // ledger markers make re-running the side effects safe.
        warn!(competition = %competition_id, "Resuming interrupted settlement");
        audit::record(
            db,
            AuditEventType::SettlementResumed,
            "competition",
            competition_id,
            None,
            None,
        )
        .await;
    } else {
        audit::record(
            db,
            AuditEventType::SettlementStarted,
            "competition",
            competition_id,
            None,
            None,
        )
        .await;
    }

    settle(db, &competition).await
}

/// Runs after the CAS from a consistent snapshot of the frozen competition.
async fn settle(db: &DbPool, competition: &Competition) -> EngineResult<SettlementOutcome> {
    let competition_id = competition.id.as_str();
    let standings = queries::participants_for_settlement(db, competition_id).await?;
    let eligible: Vec<ParticipantStanding> = standings
        .iter()
        .filter(|p| !p.is_disqualified)
        .cloned()
        .collect();

    // Undersubscribed competitions close with a refund: every stake goes
    // back, nobody wins, no streak is touched.
    if (eligible.len() as i32) < competition.min_participants {
        return refund_all(db, competition, &standings).await;
    }

    let ranked = assign_ranks(&eligible);
    for participant in &ranked {
        queries::set_final_rank(db, &participant.selection_id, participant.rank).await?;
    }

    let winners = select_winners(
        &ranked,
        competition.winner_override.as_deref(),
        competition.shared_winners,
    );
    let shares = split_prize(competition.prize_pool, winners.len());

    let mut payouts = Vec::with_capacity(winners.len());
    for (user_id, amount) in winners.iter().zip(shares.iter()) {
        let credited = queries::credit_once(db, competition_id, user_id, "payout", *amount).await?;
        if credited {
            info!(
                competition = %competition_id,
                user = %user_id,
                amount,
                "Prize credited"
            );
            audit::record(
                db,
                AuditEventType::PayoutCredited,
                "competition",
                competition_id,
                Some(serde_json::json!({ "user_id": user_id, "amount": amount })),
                None,
            )
            .await;
        }
        payouts.push(Payout {
            user_id: user_id.clone(),
            amount: *amount,
        });
    }

    // Streak and win counters, marker-gated per (competition, user).
    let winner_set: HashSet<&str> = winners.iter().map(|s| s.as_str()).collect();
    for participant in &eligible {
        if winner_set.contains(participant.user_id.as_str()) {
            queries::apply_winner_standing(
                db,
                competition_id,
                &participant.user_id,
                competition.kind,
                participant.total_points,
            )
            .await?;
        } else {
            queries::apply_nonwinner_standing(
                db,
                competition_id,
                &participant.user_id,
                competition.kind,
                participant.total_points,
            )
            .await?;
        }
    }

    // Recording winners marks the settlement complete; later deactivate
    // calls short-circuit on it.
    queries::set_winners(db, competition_id, &winners).await?;

    // Leaderboard positions are eventually consistent; a failed recompute is
    // retried from the admin endpoint rather than failing the settlement.
    if let Err(e) = ranking::recompute_after_settlement(db, competition.kind).await {
        warn!(competition = %competition_id, "Post-settlement rank recompute failed: {}", e);
    }

    info!(
        competition = %competition_id,
        winners = winners.len(),
        prize_pool = competition.prize_pool,
        "Competition settled"
    );
    audit::record(
        db,
        AuditEventType::CompetitionSettled,
        "competition",
        competition_id,
        Some(serde_json::json!({
            "winners": winners,
            "prize_pool": competition.prize_pool,
        })),
        None,
    )
    .await;

    Ok(SettlementOutcome {
        competition_id: competition_id.to_string(),
        already_settled: false,
        refunded: false,
        winners,
        payouts,
    })
}

async fn refund_all(
    db: &DbPool,
    competition: &Competition,
    standings: &[ParticipantStanding],
) -> EngineResult<SettlementOutcome> {
    let competition_id = competition.id.as_str();
    let mut payouts = Vec::new();

    for participant in standings {
        if participant.staked_amount <= 0 {
            continue;
        }
        let credited = queries::credit_once(
            db,
            competition_id,
            &participant.user_id,
            "refund",
            participant.staked_amount,
        )
        .await?;
        if credited {
            audit::record(
                db,
                AuditEventType::StakeRefunded,
                "competition",
                competition_id,
                Some(serde_json::json!({
                    "user_id": participant.user_id,
                    "amount": participant.staked_amount,
                })),
                None,
            )
            .await;
        }
        payouts.push(Payout {
            user_id: participant.user_id.clone(),
            amount: participant.staked_amount,
        });
    }

    queries::set_winners(db, competition_id, &[]).await?;

    info!(
        competition = %competition_id,
        refunds = payouts.len(),
        "Competition closed undersubscribed, stakes refunded"
    );
    audit::record(
        db,
        AuditEventType::CompetitionSettled,
        "competition",
        competition_id,
        Some(serde_json::json!({ "refunded": true })),
        None,
    )
    .await;

    Ok(SettlementOutcome {
        competition_id: competition_id.to_string(),
        already_settled: false,
        refunded: true,
        winners: Vec::new(),
        payouts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standing(user: &str, points: i64, joined_at: i64, disqualified: bool) -> ParticipantStanding {
        ParticipantStanding {
            selection_id: format!("sel-{}", user),
            user_id: user.to_string(),
            total_points: points,
            staked_amount: 50,
            is_disqualified: disqualified,
            joined_at,
        }
    }

    #[test]
    fn test_assign_ranks_by_points() {
        let ranked = assign_ranks(&[
            standing("a", 10, 100, false),
            standing("b", 7, 50, false),
            standing("c", 12, 200, false),
        ]);
        assert_eq!(ranked[0].user_id, "c");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].user_id, "a");
        assert_eq!(ranked[1].rank, 2);
        assert_eq!(ranked[2].user_id, "b");
        assert_eq!(ranked[2].rank, 3);
    }

    #[test]
    fn test_assign_ranks_tie_first_come() {
        let ranked = assign_ranks(&[
            standing("late", 10, 200, false),
            standing("early", 10, 100, false),
        ]);
        assert_eq!(ranked[0].user_id, "early");
        assert_eq!(ranked[1].user_id, "late");
    }

    #[test]
    fn test_select_single_winner() {
        let ranked = assign_ranks(&[
            standing("a", 10, 100, false),
            standing("b", 10, 200, false),
            standing("c", 7, 50, false),
        ]);
        // Without shared wins the join-order tiebreak decides.
        assert_eq!(select_winners(&ranked, None, false), vec!["a".to_string()]);
    }

    #[test]
    fn test_select_shared_winners_on_tie() {
        let ranked = assign_ranks(&[
            standing("a", 10, 100, false),
            standing("b", 10, 200, false),
            standing("c", 7, 50, false),
        ]);
        assert_eq!(
            select_winners(&ranked, None, true),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_override_takes_precedence() {
        let ranked = assign_ranks(&[
            standing("a", 10, 100, false),
            standing("b", 7, 200, false),
        ]);
        let override_ids = vec!["b".to_string()];
        assert_eq!(
            select_winners(&ranked, Some(&override_ids), false),
            vec!["b".to_string()]
        );
    }

    #[test]
    fn test_override_filters_non_eligible() {
        // "x" never joined, "b" did; the override keeps only eligible users.
        let ranked = assign_ranks(&[
            standing("a", 10, 100, false),
            standing("b", 7, 200, false),
        ]);
        let override_ids = vec!["x".to_string(), "b".to_string()];
        assert_eq!(
            select_winners(&ranked, Some(&override_ids), false),
            vec!["b".to_string()]
        );
    }

    #[test]
    fn test_override_emptied_falls_back_to_rank_one() {
        let ranked = assign_ranks(&[standing("a", 10, 100, false)]);
        let override_ids = vec!["ghost".to_string()];
        assert_eq!(
            select_winners(&ranked, Some(&override_ids), false),
            vec!["a".to_string()]
        );
    }

    #[test]
    fn test_disqualified_never_wins() {
        // Disqualified participants are filtered out before ranking; the
        // highest-point eligible participant wins instead.
        let standings = vec![
            standing("cheater", 99, 100, true),
            standing("honest", 7, 200, false),
        ];
        let eligible: Vec<_> = standings.iter().filter(|p| !p.is_disqualified).cloned().collect();
        let ranked = assign_ranks(&eligible);
        assert_eq!(select_winners(&ranked, None, false), vec!["honest".to_string()]);
    }

    #[test]
    fn test_no_participants_no_winner() {
        let ranked = assign_ranks(&[]);
        assert!(select_winners(&ranked, None, false).is_empty());
        assert!(select_winners(&ranked, None, true).is_empty());
    }

    #[test]
    fn test_split_prize_even() {
        assert_eq!(split_prize(200, 2), vec![100, 100]);
        assert_eq!(split_prize(200, 1), vec![200]);
    }

    #[test]
    fn test_split_prize_remainder_to_first() {
        assert_eq!(split_prize(200, 3), vec![68, 66, 66]);
        assert_eq!(split_prize(7, 2), vec![4, 3]);
    }

    #[test]
    fn test_split_prize_conserves_pool() {
        for n in 1..=7 {
            let shares = split_prize(1_000, n);
            assert_eq!(shares.iter().sum::<i64>(), 1_000);
            assert_eq!(shares.len(), n);
        }
    }

    #[test]
    fn test_split_prize_no_winners() {
        assert!(split_prize(200, 0).is_empty());
    }
}
