//! Scoring aggregator
//!
//! Folds normalized score-feed events into per-participant point totals.
//! Idempotent: re-applying an identical final result changes nothing, and a
//! result already marked full-time is only touched by an explicit admin
//! override. Updates to different fixtures are independent; within one
//! fixture the full-time flag never regresses to live.

use crate::audit::{self, AuditEventType};
use crate::db::{queries, DbPool};
use crate::error::EngineResult;
use score_feed::{FixtureUpdate, ScoringAdapter};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct FixtureApplyOutcome {
    pub fixture_id: String,
    /// Picks referencing the fixture across all selections.
    pub picks_matched: usize,
    /// Picks whose score state actually changed (final rows without an
    /// override are skipped).
    pub picks_written: usize,
}

/// A full-time update supersedes the live flag regardless of what the feed
/// sent alongside it.
pub fn normalized_flags(is_live: bool, is_ft: bool) -> (bool, bool) {
    (is_live && !is_ft, is_ft)
}

pub async fn apply_fixture_result(
    db: &DbPool,
    adapter: &dyn ScoringAdapter,
    update: &FixtureUpdate,
    override_final: bool,
) -> EngineResult<FixtureApplyOutcome> {
    let (is_live, is_final) = normalized_flags(update.is_live, update.is_ft);

    let picks = queries::picks_on_fixture(db, &update.fixture_id).await?;
    let mut written = 0usize;

    for pick in &picks {
        let points = adapter.points(
            &update.fixture_id,
            &pick.selected_team,
            pick.venue,
            &update.score,
        );
        let changed = queries::upsert_team_points(
            db,
            &pick.selection_id,
            &update.fixture_id,
            update.score.home,
            update.score.away,
            points,
            is_live,
            is_final,
            override_final,
        )
        .await?;
        if changed {
            written += 1;
        }
    }

    // total_points stays the sum of team_points; one statement per fixture.
    if written > 0 {
        queries::recompute_total_points(db, &update.fixture_id).await?;
    }

    info!(
        fixture = %update.fixture_id,
        home = update.score.home,
        away = update.score.away,
        is_final,
        matched = picks.len(),
        written,
        "Fixture result applied"
    );
    audit::record(
        db,
        AuditEventType::FixtureApplied,
        "fixture",
        &update.fixture_id,
        Some(serde_json::json!({
            "home": update.score.home,
            "away": update.score.away,
            "is_final": is_final,
            "picks_written": written,
            "override": override_final,
        })),
        None,
    )
    .await;

    Ok(FixtureApplyOutcome {
        fixture_id: update.fixture_id.clone(),
        picks_matched: picks.len(),
        picks_written: written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_time_clears_live() {
        assert_eq!(normalized_flags(true, true), (false, true));
        assert_eq!(normalized_flags(false, true), (false, true));
    }

    #[test]
    fn test_live_passes_through() {
        assert_eq!(normalized_flags(true, false), (true, false));
        assert_eq!(normalized_flags(false, false), (false, false));
    }
}
