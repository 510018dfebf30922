//! Score feed contract
//!
//! The arena server consumes an already-normalized fixture/score feed: an
//! external ingester pushes [`FixtureUpdate`] events, and a pluggable
//! [`ScoringAdapter`] turns a fixture score into the points awarded to one
//! participant's pick. The engine never interprets a score itself; it only
//! aggregates adapter output.
//!
//! Key invariants:
//! - A fixture marked full-time stays full-time; the feed may re-deliver the
//!   final score but never downgrade it to live.
//! - Adapter output is a plain point value per (fixture, pick); aggregation
//!   (summing, idempotent re-application) is owned by the server.

use serde::{Deserialize, Serialize};

/// Normalized score of one fixture, as delivered by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureScore {
    pub home: i32,
    pub away: i32,
}

/// One update event from the score feed.
///
/// `is_ft` marks the result as full-time (final). A full-time update
/// supersedes any live state for the same fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureUpdate {
    pub fixture_id: String,
    pub score: FixtureScore,
    pub is_live: bool,
    pub is_ft: bool,
}

/// Which side of the fixture a participant's selected team plays on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }
}

impl From<&str> for Side {
    fn from(s: &str) -> Self {
        match s {
            "away" => Side::Away,
            _ => Side::Home,
        }
    }
}

/// Maps a fixture score to the points awarded to one selected team.
///
/// Implementations own the scoring formula end to end; the server treats the
/// returned value as opaque and only aggregates it.
pub trait ScoringAdapter: Send + Sync {
    fn points(&self, fixture_id: &str, team_id: &str, side: Side, score: &FixtureScore) -> i64;
}

/// Default formula: 3 points for a win, 1 for a draw, plus one point per goal
/// scored by the selected team.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardScoring;

impl ScoringAdapter for StandardScoring {
    fn points(&self, _fixture_id: &str, _team_id: &str, side: Side, score: &FixtureScore) -> i64 {
        let (own, other) = match side {
            Side::Home => (score.home, score.away),
            Side::Away => (score.away, score.home),
        };
        let outcome = if own > other {
            3
        } else if own == other {
            1
        } else {
            0
        };
        outcome + own as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(home: i32, away: i32) -> FixtureScore {
        FixtureScore { home, away }
    }

    #[test]
    fn test_standard_scoring_win() {
        let adapter = StandardScoring;
        // 2-0 home win: 3 + 2 goals
        assert_eq!(adapter.points("f1", "t1", Side::Home, &score(2, 0)), 5);
        // Same fixture from the away loser's perspective: 0 + 0 goals
        assert_eq!(adapter.points("f1", "t2", Side::Away, &score(2, 0)), 0);
    }

    #[test]
    fn test_standard_scoring_draw() {
        let adapter = StandardScoring;
        assert_eq!(adapter.points("f1", "t1", Side::Home, &score(1, 1)), 2);
        assert_eq!(adapter.points("f1", "t2", Side::Away, &score(1, 1)), 2);
    }

    #[test]
    fn test_standard_scoring_away_win() {
        let adapter = StandardScoring;
        assert_eq!(adapter.points("f1", "t2", Side::Away, &score(0, 3)), 6);
    }

    #[test]
    fn test_side_roundtrip() {
        assert_eq!(Side::from("home"), Side::Home);
        assert_eq!(Side::from("away"), Side::Away);
        assert_eq!(Side::Home.as_str(), "home");
        assert_eq!(Side::Away.as_str(), "away");
        // Unknown values default to home
        assert_eq!(Side::from("center"), Side::Home);
    }

    #[test]
    fn test_fixture_update_serialization() {
        let update = FixtureUpdate {
            fixture_id: "fx-100".to_string(),
            score: score(2, 1),
            is_live: false,
            is_ft: true,
        };
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("fx-100"));
        let back: FixtureUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(back.score, score(2, 1));
        assert!(back.is_ft);
    }
}
