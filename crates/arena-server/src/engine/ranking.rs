//! Rank recalculator
//!
//! Batch recompute of global leaderboard positions from aggregate point
//! totals: world scope, country scope (partitioned per country), and
//! per-game-type positions. Eventually consistent; runs after every
//! settlement and on demand from the admin endpoint. Reads stay lock-free.

use crate::audit::{self, AuditEventType};
use crate::db::{queries, DbPool};
use crate::error::EngineResult;
use crate::models::GameKind;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeScope {
    World,
    Country,
}

impl RecomputeScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecomputeScope::World => "world",
            RecomputeScope::Country => "country",
        }
    }
}

impl From<&str> for RecomputeScope {
    fn from(s: &str) -> Self {
        match s {
            "country" => RecomputeScope::Country,
            _ => RecomputeScope::World,
        }
    }
}

/// Recompute positions for one scope, optionally refreshing one game type's
/// positions alongside. Returns the number of rank rows touched.
pub async fn recompute(
    db: &DbPool,
    scope: RecomputeScope,
    game_type: Option<GameKind>,
) -> EngineResult<u64> {
    let mut touched = match scope {
        RecomputeScope::World => queries::recompute_world_ranks(db).await?,
        RecomputeScope::Country => queries::recompute_country_ranks(db).await?,
    };

    if let Some(kind) = game_type {
        touched += queries::recompute_game_type_ranks(db, kind).await?;
    }

    info!(scope = scope.as_str(), touched, "Rank positions recomputed");
    audit::record(
        db,
        AuditEventType::RanksRecomputed,
        "rank_scope",
        scope.as_str(),
        Some(serde_json::json!({
            "game_type": game_type.map(|k| k.to_string()),
            "touched": touched,
        })),
        None,
    )
    .await;

    Ok(touched)
}

/// Recompute one scope plus every game type's positions.
pub async fn recompute_all(db: &DbPool, scope: RecomputeScope) -> EngineResult<u64> {
    let mut touched = recompute(db, scope, None).await?;
    for kind in [GameKind::TopScore, GameKind::ManGoSet, GameKind::League] {
        touched += queries::recompute_game_type_ranks(db, kind).await?;
    }
    Ok(touched)
}

/// Settlement hook: refresh every scope a settlement can move — world,
/// country, and the settled competition's game type.
pub async fn recompute_after_settlement(db: &DbPool, kind: GameKind) -> EngineResult<()> {
    queries::recompute_world_ranks(db).await?;
    queries::recompute_country_ranks(db).await?;
    queries::recompute_game_type_ranks(db, kind).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_roundtrip() {
        assert_eq!(RecomputeScope::from("world"), RecomputeScope::World);
        assert_eq!(RecomputeScope::from("country"), RecomputeScope::Country);
        assert_eq!(RecomputeScope::from("galaxy"), RecomputeScope::World);
        assert_eq!(RecomputeScope::Country.as_str(), "country");
    }
}
