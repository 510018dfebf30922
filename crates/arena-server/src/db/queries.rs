//! Database queries for the arena server (PostgreSQL)
//!
//! Every invariant-bearing mutation here is a single conditional statement
//! (UPDATE with a guard, INSERT .. ON CONFLICT DO NOTHING) so that concurrent
//! request workers on separate machines cannot race past an invariant. The
//! return value of those functions is "did the conditional write win".

use crate::models::{
    Competition, CreateCompetitionRequest, GameKind, GameTypeRank, Proof, RankRow, SelectedTeam,
    StandingRow, TeamPick, TeamPoints, TeamSelection, Trend, Wallet,
};
use anyhow::{anyhow, Result};
use deadpool_postgres::Pool;
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;
use uuid::Uuid;

/// Snapshot row the settlement engine ranks and pays from.
#[derive(Debug, Clone)]
pub struct ParticipantStanding {
    pub selection_id: String,
    pub user_id: String,
    pub total_points: i64,
    pub staked_amount: i64,
    pub is_disqualified: bool,
    pub joined_at: i64,
}

/// One pick affected by a fixture update.
#[derive(Debug, Clone)]
pub struct FixturePick {
    pub selection_id: String,
    pub selected_team: String,
    pub venue: score_feed::Side,
}

// ============================================================================
// WALLETS
// ============================================================================

pub async fn ensure_wallet(pool: &Pool, user_id: &str) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            "INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING",
            &[&user_id],
        )
        .await?;
    Ok(())
}

pub async fn get_wallet(pool: &Pool, user_id: &str) -> Result<Option<Wallet>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            "SELECT user_id, balance, made_first_deposit, payout_details, created_at
         FROM wallets WHERE user_id = $1",
            &[&user_id],
        )
        .await?;

    Ok(row.map(|row| Wallet {
        user_id: row.get(0),
        balance: row.get(1),
        made_first_deposit: row.get(2),
        payout_details: row.get(3),
        created_at: row.get::<_, chrono::DateTime<chrono::Utc>>(4).timestamp(),
    }))
}

/// Admin deposit; marks the first-deposit flag and returns the new balance.
pub async fn deposit(
    pool: &Pool,
    user_id: &str,
    amount: i64,
    payout_details: Option<&serde_json::Value>,
) -> Result<i64> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            "INSERT INTO wallets (user_id, balance, made_first_deposit, payout_details)
         VALUES ($1, $2, TRUE, $3)
         ON CONFLICT (user_id) DO UPDATE SET
            balance = wallets.balance + EXCLUDED.balance,
            made_first_deposit = TRUE,
            payout_details = COALESCE(EXCLUDED.payout_details, wallets.payout_details),
            updated_at = NOW()
         RETURNING balance",
            &[&user_id, &amount, &payout_details],
        )
        .await?;
    Ok(row.get(0))
}

/// Atomic debit: succeeds only if the balance covers the amount.
pub async fn debit_wallet(pool: &Pool, user_id: &str, amount: i64) -> Result<bool> {
    let client = pool.get().await?;
    let rows = client
        .execute(
            "UPDATE wallets SET balance = balance - $2, updated_at = NOW()
         WHERE user_id = $1 AND balance >= $2",
            &[&user_id, &amount],
        )
        .await?;
    Ok(rows > 0)
}

/// Unconditional credit (payout, refund). Creates the wallet if missing so a
/// settlement credit can never be lost.
pub async fn credit_wallet(pool: &Pool, user_id: &str, amount: i64) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            "INSERT INTO wallets (user_id, balance) VALUES ($1, $2)
         ON CONFLICT (user_id) DO UPDATE SET
            balance = wallets.balance + EXCLUDED.balance,
            updated_at = NOW()",
            &[&user_id, &amount],
        )
        .await?;
    Ok(())
}

// ============================================================================
// COMPETITIONS
// ============================================================================

fn competition_from_row(row: &Row) -> Competition {
    let rules: serde_json::Value = row.get(11);
    let winner_override: Option<serde_json::Value> = row.get(17);
    let winners: Option<serde_json::Value> = row.get(18);

    Competition {
        id: row.get::<_, Uuid>(0).to_string(),
        name: row.get(1),
        kind: GameKind::from(row.get::<_, String>(2).as_str()),
        entry_fee: row.get(3),
        host_contribution: row.get(4),
        prize_pool: row.get(5),
        participant_cap: row.get(6),
        participant_count: row.get(7),
        min_participants: row.get(8),
        min_teams: row.get(9),
        max_teams: row.get(10),
        rules: serde_json::from_value(rules).unwrap_or_default(),
        shared_winners: row.get(12),
        is_active: row.get(13),
        is_public: row.get(14),
        starts_at: row.get::<_, chrono::DateTime<chrono::Utc>>(15).timestamp(),
        ends_at: row.get::<_, chrono::DateTime<chrono::Utc>>(16).timestamp(),
        winner_override: winner_override.and_then(|v| serde_json::from_value(v).ok()),
        winners: winners.and_then(|v| serde_json::from_value(v).ok()),
        settled_at: row
            .get::<_, Option<chrono::DateTime<chrono::Utc>>>(19)
            .map(|dt| dt.timestamp()),
        created_by: row.get(20),
        created_at: row.get::<_, chrono::DateTime<chrono::Utc>>(21).timestamp(),
    }
}

const COMPETITION_COLUMNS: &str = "id, name, kind, entry_fee, host_contribution, prize_pool, \
     participant_cap, participant_count, min_participants, min_teams, max_teams, rules, \
     shared_winners, is_active, is_public, starts_at, ends_at, winner_override, winners, \
     settled_at, created_by, created_at";

pub async fn create_competition(
    pool: &Pool,
    req: &CreateCompetitionRequest,
    created_by: &str,
) -> Result<Competition> {
    let client = pool.get().await?;

    // Prize pool is fixed here, once, and never recomputed.
    let prize_pool = req
        .entry_fee
        .checked_mul(req.participant_cap as i64)
        .and_then(|v| v.checked_add(req.host_contribution))
        .ok_or_else(|| anyhow!("prize pool overflow"))?;

    let starts_at = chrono::DateTime::from_timestamp(req.starts_at, 0)
        .ok_or_else(|| anyhow!("invalid starts_at"))?;
    let ends_at = chrono::DateTime::from_timestamp(req.ends_at, 0)
        .ok_or_else(|| anyhow!("invalid ends_at"))?;
    let rules = serde_json::json!(req.rules);

    let row = client
        .query_one(
            &format!(
                "INSERT INTO competitions (name, kind, entry_fee, host_contribution, prize_pool,
                 participant_cap, min_participants, min_teams, max_teams, rules, shared_winners,
                 is_public, starts_at, ends_at, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
             RETURNING {}",
                COMPETITION_COLUMNS
            ),
            &[
                &req.name,
                &req.kind.to_string(),
                &req.entry_fee,
                &req.host_contribution,
                &prize_pool,
                &req.participant_cap,
                &req.min_participants,
                &req.min_teams,
                &req.max_teams,
                &rules,
                &req.shared_winners,
                &req.is_public,
                &starts_at,
                &ends_at,
                &created_by,
            ],
        )
        .await?;

    Ok(competition_from_row(&row))
}

pub async fn get_competition(pool: &Pool, id: &str) -> Result<Option<Competition>> {
    let client = pool.get().await?;
    let uuid = match Uuid::parse_str(id) {
        Ok(u) => u,
        Err(_) => return Ok(None),
    };

    let row = client
        .query_opt(
            &format!(
                "SELECT {} FROM competitions WHERE id = $1",
                COMPETITION_COLUMNS
            ),
            &[&uuid],
        )
        .await?;

    Ok(row.as_ref().map(competition_from_row))
}

pub async fn list_competitions(
    pool: &Pool,
    active_only: bool,
    limit: i64,
    offset: i64,
) -> Result<Vec<Competition>> {
    let client = pool.get().await?;
    let rows = if active_only {
        client
            .query(
                &format!(
                    "SELECT {} FROM competitions WHERE is_active AND is_public
                 ORDER BY created_at DESC LIMIT $1 OFFSET $2",
                    COMPETITION_COLUMNS
                ),
                &[&limit, &offset],
            )
            .await?
    } else {
        client
            .query(
                &format!(
                    "SELECT {} FROM competitions WHERE is_public
                 ORDER BY created_at DESC LIMIT $1 OFFSET $2",
                    COMPETITION_COLUMNS
                ),
                &[&limit, &offset],
            )
            .await?
    };

    Ok(rows.iter().map(competition_from_row).collect())
}

/// Check-and-increment against the cap. A benign race loses this write and
/// the join fails cleanly; the count can never overshoot the cap.
pub async fn try_increment_participants(pool: &Pool, id: &str) -> Result<bool> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(id)?;
    let rows = client
        .execute(
            "UPDATE competitions SET participant_count = participant_count + 1
         WHERE id = $1 AND is_active AND participant_count < participant_cap",
            &[&uuid],
        )
        .await?;
    Ok(rows > 0)
}

pub async fn decrement_participants(pool: &Pool, id: &str) -> Result<bool> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(id)?;
    let rows = client
        .execute(
            "UPDATE competitions SET participant_count = GREATEST(participant_count - 1, 0)
         WHERE id = $1",
            &[&uuid],
        )
        .await?;
    Ok(rows > 0)
}

/// Explicit winner override; only accepted while the competition is active.
pub async fn set_winner_override(pool: &Pool, id: &str, user_ids: &[String]) -> Result<bool> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(id)?;
    let ids = serde_json::json!(user_ids);
    let rows = client
        .execute(
            "UPDATE competitions SET winner_override = $2 WHERE id = $1 AND is_active",
            &[&uuid, &ids],
        )
        .await?;
    Ok(rows > 0)
}

/// The settlement linearization point: flips is_active exactly once.
pub async fn cas_deactivate(pool: &Pool, id: &str) -> Result<bool> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(id)?;
    let rows = client
        .execute(
            "UPDATE competitions SET is_active = FALSE, settled_at = NOW()
         WHERE id = $1 AND is_active",
            &[&uuid],
        )
        .await?;
    Ok(rows > 0)
}

pub async fn set_winners(pool: &Pool, id: &str, winners: &[String]) -> Result<()> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(id)?;
    let ids = serde_json::json!(winners);
    client
        .execute(
            "UPDATE competitions SET winners = $2 WHERE id = $1",
            &[&uuid, &ids],
        )
        .await?;
    Ok(())
}

/// Active competitions past their end date, due for scheduled settlement.
pub async fn expired_active_competitions(pool: &Pool) -> Result<Vec<String>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT id FROM competitions WHERE is_active AND ends_at < NOW()",
            &[],
        )
        .await?;
    Ok(rows
        .iter()
        .map(|row| row.get::<_, Uuid>(0).to_string())
        .collect())
}

// ============================================================================
// TEAM SELECTIONS
// ============================================================================

pub async fn user_already_joined(pool: &Pool, competition_id: &str, user_id: &str) -> Result<bool> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(competition_id)?;
    let row = client
        .query_opt(
            "SELECT 1 FROM team_selections WHERE competition_id = $1 AND user_id = $2",
            &[&uuid, &user_id],
        )
        .await?;
    Ok(row.is_some())
}

/// Persist the selection and its picks. Returns None when the
/// (competition, user) uniqueness constraint loses a race.
pub async fn insert_selection(
    pool: &Pool,
    competition_id: &str,
    user_id: &str,
    staked_amount: i64,
    star_fixture: Option<&str>,
    picks: &[TeamPick],
) -> Result<Option<TeamSelection>> {
    let mut client = pool.get().await?;
    let uuid = Uuid::parse_str(competition_id)?;

    // The selection and its picks are one logical entity; write them as one
    // unit so a mid-write failure leaves nothing for the saga to clean up.
    let tx = client.transaction().await?;

    let res = tx
        .query_one(
            "INSERT INTO team_selections (competition_id, user_id, staked_amount, star_fixture)
         VALUES ($1, $2, $3, $4)
         RETURNING id, joined_at",
            &[&uuid, &user_id, &staked_amount, &star_fixture],
        )
        .await;

    let row = match res {
        Ok(row) => row,
        Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let id: Uuid = row.get(0);
    let joined_at: chrono::DateTime<chrono::Utc> = row.get(1);

    for (slot, pick) in picks.iter().enumerate() {
        tx.execute(
            "INSERT INTO selection_teams (selection_id, fixture_id, slot, selected_team, opponent_team, venue)
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &id,
                &pick.fixture_id,
                &(slot as i32),
                &pick.selected_team,
                &pick.opponent_team,
                &pick.venue.as_str(),
            ],
        )
        .await?;
    }

    tx.commit().await?;

    Ok(Some(TeamSelection {
        id: id.to_string(),
        competition_id: competition_id.to_string(),
        user_id: user_id.to_string(),
        staked_amount,
        star_fixture: star_fixture.map(|s| s.to_string()),
        teams: picks
            .iter()
            .map(|p| SelectedTeam {
                fixture_id: p.fixture_id.clone(),
                selected_team: p.selected_team.clone(),
                opponent_team: p.opponent_team.clone(),
                venue: p.venue,
            })
            .collect(),
        team_points: Vec::new(),
        total_points: 0,
        rank: None,
        steps_verified: false,
        is_disqualified: false,
        proofs: Vec::new(),
        joined_at: joined_at.timestamp(),
    }))
}

pub async fn get_selection(pool: &Pool, id: &str) -> Result<Option<TeamSelection>> {
    let client = pool.get().await?;
    let uuid = match Uuid::parse_str(id) {
        Ok(u) => u,
        Err(_) => return Ok(None),
    };

    let row = client
        .query_opt(
            "SELECT id, competition_id, user_id, staked_amount, star_fixture, total_points,
                final_rank, steps_verified, is_disqualified, joined_at
         FROM team_selections WHERE id = $1",
            &[&uuid],
        )
        .await?;

    let row = match row {
        Some(row) => row,
        None => return Ok(None),
    };

    let teams = client
        .query(
            "SELECT fixture_id, selected_team, opponent_team, venue
         FROM selection_teams WHERE selection_id = $1 ORDER BY slot ASC",
            &[&uuid],
        )
        .await?
        .iter()
        .map(|r| SelectedTeam {
            fixture_id: r.get(0),
            selected_team: r.get(1),
            opponent_team: r.get(2),
            venue: score_feed::Side::from(r.get::<_, String>(3).as_str()),
        })
        .collect();

    let team_points = client
        .query(
            "SELECT fixture_id, home_goals, away_goals, points, is_live, is_final, updated_at
         FROM team_points WHERE selection_id = $1 ORDER BY fixture_id ASC",
            &[&uuid],
        )
        .await?
        .iter()
        .map(|r| TeamPoints {
            fixture_id: r.get(0),
            home_goals: r.get(1),
            away_goals: r.get(2),
            points: r.get(3),
            is_live: r.get(4),
            is_final: r.get(5),
            updated_at: r.get::<_, chrono::DateTime<chrono::Utc>>(6).timestamp(),
        })
        .collect();

    let proofs = client
        .query(
            "SELECT step_index, url, verified FROM proofs
         WHERE selection_id = $1 ORDER BY step_index ASC",
            &[&uuid],
        )
        .await?
        .iter()
        .map(|r| Proof {
            step_index: r.get(0),
            url: r.get(1),
            verified: r.get(2),
        })
        .collect();

    Ok(Some(TeamSelection {
        id: row.get::<_, Uuid>(0).to_string(),
        competition_id: row.get::<_, Uuid>(1).to_string(),
        user_id: row.get(2),
        staked_amount: row.get(3),
        star_fixture: row.get(4),
        teams,
        team_points,
        total_points: row.get(5),
        rank: row.get(6),
        steps_verified: row.get(7),
        is_disqualified: row.get(8),
        proofs,
        joined_at: row.get::<_, chrono::DateTime<chrono::Utc>>(9).timestamp(),
    }))
}

pub async fn competition_standings(pool: &Pool, competition_id: &str) -> Result<Vec<StandingRow>> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(competition_id)?;
    let rows = client
        .query(
            "SELECT user_id, total_points, final_rank, is_disqualified, steps_verified, star_fixture
         FROM team_selections WHERE competition_id = $1
         ORDER BY total_points DESC, joined_at ASC",
            &[&uuid],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| StandingRow {
            user_id: row.get(0),
            total_points: row.get(1),
            rank: row.get(2),
            is_disqualified: row.get(3),
            steps_verified: row.get(4),
            star_fixture: row.get(5),
        })
        .collect())
}

/// Snapshot taken after the settlement CAS; ordering is the rank precedence.
pub async fn participants_for_settlement(
    pool: &Pool,
    competition_id: &str,
) -> Result<Vec<ParticipantStanding>> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(competition_id)?;
    let rows = client
        .query(
            "SELECT id, user_id, total_points, staked_amount, is_disqualified, joined_at
         FROM team_selections WHERE competition_id = $1
         ORDER BY total_points DESC, joined_at ASC",
            &[&uuid],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| ParticipantStanding {
            selection_id: row.get::<_, Uuid>(0).to_string(),
            user_id: row.get(1),
            total_points: row.get(2),
            staked_amount: row.get(3),
            is_disqualified: row.get(4),
            joined_at: row.get::<_, chrono::DateTime<chrono::Utc>>(5).timestamp(),
        })
        .collect())
}

pub async fn set_final_rank(pool: &Pool, selection_id: &str, rank: i32) -> Result<()> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(selection_id)?;
    client
        .execute(
            "UPDATE team_selections SET final_rank = $2 WHERE id = $1",
            &[&uuid, &rank],
        )
        .await?;
    Ok(())
}

// ============================================================================
// STAR RESERVATIONS
// ============================================================================

/// Atomic star-fixture reservation: the primary-key insert either wins or
/// loses, there is no read-then-write window.
pub async fn try_reserve_star(
    pool: &Pool,
    competition_id: &str,
    fixture_id: &str,
    user_id: &str,
) -> Result<bool> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(competition_id)?;
    let rows = client
        .execute(
            "INSERT INTO star_reservations (competition_id, fixture_id, user_id)
         VALUES ($1, $2, $3)
         ON CONFLICT (competition_id, fixture_id) DO NOTHING",
            &[&uuid, &fixture_id, &user_id],
        )
        .await?;
    Ok(rows > 0)
}

pub async fn release_star(
    pool: &Pool,
    competition_id: &str,
    fixture_id: &str,
    user_id: &str,
) -> Result<bool> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(competition_id)?;
    let rows = client
        .execute(
            "DELETE FROM star_reservations
         WHERE competition_id = $1 AND fixture_id = $2 AND user_id = $3",
            &[&uuid, &fixture_id, &user_id],
        )
        .await?;
    Ok(rows > 0)
}

// ============================================================================
// SCORING
// ============================================================================

pub async fn picks_on_fixture(pool: &Pool, fixture_id: &str) -> Result<Vec<FixturePick>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT selection_id, selected_team, venue
         FROM selection_teams WHERE fixture_id = $1",
            &[&fixture_id],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| FixturePick {
            selection_id: row.get::<_, Uuid>(0).to_string(),
            selected_team: row.get(1),
            venue: score_feed::Side::from(row.get::<_, String>(2).as_str()),
        })
        .collect())
}

/// Upsert one pick's score state. The conflict guard refuses to touch a row
/// already marked final unless the caller passes the admin override, which
/// makes duplicate delivery of a final result a no-op.
pub async fn upsert_team_points(
    pool: &Pool,
    selection_id: &str,
    fixture_id: &str,
    home_goals: i32,
    away_goals: i32,
    points: i64,
    is_live: bool,
    is_final: bool,
    override_final: bool,
) -> Result<bool> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(selection_id)?;
    let rows = client
        .execute(
            "INSERT INTO team_points (selection_id, fixture_id, home_goals, away_goals, points, is_live, is_final)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (selection_id, fixture_id) DO UPDATE SET
            home_goals = EXCLUDED.home_goals,
            away_goals = EXCLUDED.away_goals,
            points = EXCLUDED.points,
            is_live = EXCLUDED.is_live,
            is_final = EXCLUDED.is_final,
            updated_at = NOW()
         WHERE NOT team_points.is_final OR $8",
            &[
                &uuid,
                &fixture_id,
                &home_goals,
                &away_goals,
                &points,
                &is_live,
                &is_final,
                &override_final,
            ],
        )
        .await?;
    Ok(rows > 0)
}

/// Re-derive total_points for every selection touching the fixture, keeping
/// the sum invariant in one statement.
pub async fn recompute_total_points(pool: &Pool, fixture_id: &str) -> Result<u64> {
    let client = pool.get().await?;
    let rows = client
        .execute(
            "UPDATE team_selections ts
         SET total_points = COALESCE(
             (SELECT SUM(tp.points) FROM team_points tp WHERE tp.selection_id = ts.id), 0)
         WHERE ts.id IN (SELECT selection_id FROM team_points WHERE fixture_id = $1)",
            &[&fixture_id],
        )
        .await?;
    Ok(rows)
}

// ============================================================================
// VERIFICATION
// ============================================================================

/// Resubmitting a step's proof resets its verified flag for re-review.
pub async fn upsert_proof(pool: &Pool, selection_id: &str, step_index: i32, url: &str) -> Result<()> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(selection_id)?;
    client
        .execute(
            "INSERT INTO proofs (selection_id, step_index, url)
         VALUES ($1, $2, $3)
         ON CONFLICT (selection_id, step_index) DO UPDATE SET
            url = EXCLUDED.url,
            verified = FALSE,
            submitted_at = NOW()",
            &[&uuid, &step_index, &url],
        )
        .await?;
    Ok(())
}

pub async fn set_proof_verified(
    pool: &Pool,
    selection_id: &str,
    step_index: i32,
    verified: bool,
) -> Result<bool> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(selection_id)?;
    let rows = client
        .execute(
            "UPDATE proofs SET verified = $3 WHERE selection_id = $1 AND step_index = $2",
            &[&uuid, &step_index, &verified],
        )
        .await?;
    Ok(rows > 0)
}

/// Re-derive steps_verified: true iff every required step has a verified
/// proof.
pub async fn refresh_steps_verified(
    pool: &Pool,
    selection_id: &str,
    required_steps: i64,
) -> Result<()> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(selection_id)?;
    client
        .execute(
            "UPDATE team_selections ts SET steps_verified =
             ((SELECT COUNT(*) FROM proofs p
               WHERE p.selection_id = ts.id AND p.verified AND p.step_index::BIGINT < $2) = $2)
         WHERE ts.id = $1",
            &[&uuid, &required_steps],
        )
        .await?;
    Ok(())
}

pub async fn set_disqualified(pool: &Pool, selection_id: &str) -> Result<bool> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(selection_id)?;
    let rows = client
        .execute(
            "UPDATE team_selections SET is_disqualified = TRUE WHERE id = $1",
            &[&uuid],
        )
        .await?;
    Ok(rows > 0)
}

/// Requalification is a hard precondition, enforced in one conditional
/// write: the flag clears only when every required step is verified.
pub async fn try_requalify(pool: &Pool, selection_id: &str, required_steps: i64) -> Result<bool> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(selection_id)?;
    let rows = client
        .execute(
            "UPDATE team_selections ts SET is_disqualified = FALSE, steps_verified = TRUE
         WHERE ts.id = $1
           AND (SELECT COUNT(*) FROM proofs p
                WHERE p.selection_id = ts.id AND p.verified AND p.step_index::BIGINT < $2) = $2",
            &[&uuid, &required_steps],
        )
        .await?;
    Ok(rows > 0)
}

// ============================================================================
// SETTLEMENT LEDGER
// ============================================================================

/// Idempotent settlement credit: the wallet is credited if and only if the
/// ledger marker insert wins, in one atomic statement. A retried settlement
/// loses the marker insert and the wallet is left alone.
pub async fn credit_once(
    pool: &Pool,
    competition_id: &str,
    user_id: &str,
    entry_kind: &str,
    amount: i64,
) -> Result<bool> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(competition_id)?;
    let rows = client
        .execute(
            "WITH marker AS (
             INSERT INTO settlement_ledger (competition_id, user_id, entry_kind, amount)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (competition_id, user_id, entry_kind) DO NOTHING
             RETURNING amount
         )
         INSERT INTO wallets (user_id, balance)
         SELECT $2, amount FROM marker
         ON CONFLICT (user_id) DO UPDATE SET
            balance = wallets.balance + EXCLUDED.balance,
            updated_at = NOW()",
            &[&uuid, &user_id, &entry_kind, &amount],
        )
        .await?;
    Ok(rows > 0)
}

// ============================================================================
// RANK ROWS
// ============================================================================

pub async fn ensure_rank_row(pool: &Pool, user_id: &str, country: Option<&str>) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            "INSERT INTO rank_rows (user_id, country) VALUES ($1, $2)
         ON CONFLICT (user_id) DO UPDATE SET
            country = COALESCE(EXCLUDED.country, rank_rows.country)",
            &[&user_id, &country],
        )
        .await?;
    Ok(())
}

/// Winner counters: points accrue, wins and streak increment, globally and
/// for the competition's game type. Gated on the per-competition standing
/// marker so a retried settlement cannot double-count.
pub async fn apply_winner_standing(
    pool: &Pool,
    competition_id: &str,
    user_id: &str,
    kind: GameKind,
    points: i64,
) -> Result<bool> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(competition_id)?;
    let k = kind.column_prefix();
    let rows = client
        .execute(
            &format!(
                "WITH marker AS (
                 INSERT INTO settlement_ledger (competition_id, user_id, entry_kind, amount)
                 VALUES ($1, $2, 'standing', $3)
                 ON CONFLICT (competition_id, user_id, entry_kind) DO NOTHING
                 RETURNING user_id
             )
             INSERT INTO rank_rows (user_id, points, total_wins, winning_streak,
                 {k}_points, {k}_wins, {k}_streak)
             SELECT $2, $3, 1, 1, $3, 1, 1 FROM marker
             ON CONFLICT (user_id) DO UPDATE SET
                points = rank_rows.points + EXCLUDED.points,
                total_wins = rank_rows.total_wins + 1,
                winning_streak = rank_rows.winning_streak + 1,
                {k}_points = rank_rows.{k}_points + EXCLUDED.{k}_points,
                {k}_wins = rank_rows.{k}_wins + 1,
                {k}_streak = rank_rows.{k}_streak + 1,
                updated_at = NOW()"
            ),
            &[&uuid, &user_id, &points],
        )
        .await?;
    Ok(rows > 0)
}

/// Non-winning active participant: points accrue, streaks reset to zero.
/// Same marker gating as the winner path.
pub async fn apply_nonwinner_standing(
    pool: &Pool,
    competition_id: &str,
    user_id: &str,
    kind: GameKind,
    points: i64,
) -> Result<bool> {
    let client = pool.get().await?;
    let uuid = Uuid::parse_str(competition_id)?;
    let k = kind.column_prefix();
    let rows = client
        .execute(
            &format!(
                "WITH marker AS (
                 INSERT INTO settlement_ledger (competition_id, user_id, entry_kind, amount)
                 VALUES ($1, $2, 'standing', $3)
                 ON CONFLICT (competition_id, user_id, entry_kind) DO NOTHING
                 RETURNING user_id
             )
             INSERT INTO rank_rows (user_id, points, {k}_points, winning_streak, {k}_streak)
             SELECT $2, $3, $3, 0, 0 FROM marker
             ON CONFLICT (user_id) DO UPDATE SET
                points = rank_rows.points + EXCLUDED.points,
                {k}_points = rank_rows.{k}_points + EXCLUDED.{k}_points,
                winning_streak = 0,
                {k}_streak = 0,
                updated_at = NOW()"
            ),
            &[&uuid, &user_id, &points],
        )
        .await?;
    Ok(rows > 0)
}

/// World positions: dense 1..N by points, ties by total wins then account
/// age. Trend compares against the position being overwritten.
pub async fn recompute_world_ranks(pool: &Pool) -> Result<u64> {
    let client = pool.get().await?;
    let rows = client
        .execute(
            "UPDATE rank_rows r SET
            world_trend = CASE
                WHEN r.world_rank IS NULL OR r.world_rank = s.new_rank THEN 'stable'
                WHEN s.new_rank < r.world_rank THEN 'up'
                ELSE 'down' END,
            world_rank = s.new_rank,
            updated_at = NOW()
         FROM (SELECT user_id,
                      ROW_NUMBER() OVER (ORDER BY points DESC, total_wins DESC, created_at ASC)::INT AS new_rank
               FROM rank_rows) s
         WHERE r.user_id = s.user_id",
            &[],
        )
        .await?;
    Ok(rows)
}

/// Country positions, partitioned per country; rows without a country keep a
/// NULL position.
pub async fn recompute_country_ranks(pool: &Pool) -> Result<u64> {
    let client = pool.get().await?;
    let rows = client
        .execute(
            "UPDATE rank_rows r SET
            country_trend = CASE
                WHEN r.country_rank IS NULL OR r.country_rank = s.new_rank THEN 'stable'
                WHEN s.new_rank < r.country_rank THEN 'up'
                ELSE 'down' END,
            country_rank = s.new_rank,
            updated_at = NOW()
         FROM (SELECT user_id,
                      ROW_NUMBER() OVER (PARTITION BY country ORDER BY points DESC, total_wins DESC, created_at ASC)::INT AS new_rank
               FROM rank_rows WHERE country IS NOT NULL) s
         WHERE r.user_id = s.user_id",
            &[],
        )
        .await?;
    Ok(rows)
}

pub async fn recompute_game_type_ranks(pool: &Pool, kind: GameKind) -> Result<u64> {
    let client = pool.get().await?;
    let k = kind.column_prefix();
    let rows = client
        .execute(
            &format!(
                "UPDATE rank_rows r SET {k}_rank = s.new_rank, updated_at = NOW()
             FROM (SELECT user_id,
                          ROW_NUMBER() OVER (ORDER BY {k}_points DESC, total_wins DESC, created_at ASC)::INT AS new_rank
                   FROM rank_rows) s
             WHERE r.user_id = s.user_id"
            ),
            &[],
        )
        .await?;
    Ok(rows)
}

fn rank_row_from_row(row: &Row) -> RankRow {
    RankRow {
        user_id: row.get(0),
        country: row.get(1),
        points: row.get(2),
        total_wins: row.get(3),
        winning_streak: row.get(4),
        topscore: GameTypeRank {
            points: row.get(5),
            wins: row.get(6),
            streak: row.get(7),
            rank: row.get(8),
        },
        mangoset: GameTypeRank {
            points: row.get(9),
            wins: row.get(10),
            streak: row.get(11),
            rank: row.get(12),
        },
        league: GameTypeRank {
            points: row.get(13),
            wins: row.get(14),
            streak: row.get(15),
            rank: row.get(16),
        },
        world_rank: row.get(17),
        world_trend: Trend::from(row.get::<_, String>(18).as_str()),
        country_rank: row.get(19),
        country_trend: Trend::from(row.get::<_, String>(20).as_str()),
        updated_at: row.get::<_, chrono::DateTime<chrono::Utc>>(21).timestamp(),
    }
}

const RANK_ROW_COLUMNS: &str = "user_id, country, points, total_wins, winning_streak, \
     topscore_points, topscore_wins, topscore_streak, topscore_rank, \
     mangoset_points, mangoset_wins, mangoset_streak, mangoset_rank, \
     league_points, league_wins, league_streak, league_rank, \
     world_rank, world_trend, country_rank, country_trend, updated_at";

/// Paginated leaderboard read. Game-type scope orders by the per-type
/// position, country scope filters and orders by country position, otherwise
/// world position. Reads are lock-free and may trail a recompute.
pub async fn get_rankings(
    pool: &Pool,
    game_type: Option<GameKind>,
    country: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<RankRow>> {
    let client = pool.get().await?;

    let rows = if let Some(kind) = game_type {
        let k = kind.column_prefix();
        client
            .query(
                &format!(
                    "SELECT {RANK_ROW_COLUMNS} FROM rank_rows
                 ORDER BY {k}_rank ASC NULLS LAST, {k}_points DESC LIMIT $1 OFFSET $2"
                ),
                &[&limit, &offset],
            )
            .await?
    } else if let Some(country) = country {
        client
            .query(
                &format!(
                    "SELECT {RANK_ROW_COLUMNS} FROM rank_rows WHERE country = $1
                 ORDER BY country_rank ASC NULLS LAST, points DESC LIMIT $2 OFFSET $3"
                ),
                &[&country, &limit, &offset],
            )
            .await?
    } else {
        client
            .query(
                &format!(
                    "SELECT {RANK_ROW_COLUMNS} FROM rank_rows
                 ORDER BY world_rank ASC NULLS LAST, points DESC LIMIT $1 OFFSET $2"
                ),
                &[&limit, &offset],
            )
            .await?
    };

    Ok(rows.iter().map(rank_row_from_row).collect())
}

pub async fn get_rank_row(pool: &Pool, user_id: &str) -> Result<Option<RankRow>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!("SELECT {RANK_ROW_COLUMNS} FROM rank_rows WHERE user_id = $1"),
            &[&user_id],
        )
        .await?;
    Ok(row.as_ref().map(rank_row_from_row))
}

// ============================================================================
// EVENTS
// ============================================================================

pub async fn log_event(
    pool: &Pool,
    event_type: &str,
    entity_type: Option<&str>,
    entity_id: Option<&str>,
    payload: Option<&serde_json::Value>,
    actor: Option<&str>,
) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            "INSERT INTO events (event_type, entity_type, entity_id, payload, actor)
         VALUES ($1, $2, $3, $4, $5)",
            &[&event_type, &entity_type, &entity_id, &payload, &actor],
        )
        .await?;
    Ok(())
}
