//! Data models for the arena server

use score_feed::Side;
use serde::{Deserialize, Serialize};

// ============================================================================
// COMPETITION
// ============================================================================

/// Competition game types. Each type has its own leaderboard counters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    TopScore,
    ManGoSet,
    League,
}

impl GameKind {
    /// Column prefix for the per-game-type counters on a rank row.
    pub fn column_prefix(&self) -> &'static str {
        match self {
            GameKind::TopScore => "topscore",
            GameKind::ManGoSet => "mangoset",
            GameKind::League => "league",
        }
    }
}

impl ToString for GameKind {
    fn to_string(&self) -> String {
        self.column_prefix().to_string()
    }
}

impl From<&str> for GameKind {
    fn from(s: &str) -> Self {
        match s {
            "mangoset" => GameKind::ManGoSet,
            "league" => GameKind::League,
            _ => GameKind::TopScore,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Competition {
    pub id: String,
    pub name: String,
    pub kind: GameKind,
    pub entry_fee: i64,
    pub host_contribution: i64,
    /// entry_fee x participant_cap + host_contribution, fixed at creation.
    pub prize_pool: i64,
    pub participant_cap: i32,
    pub participant_count: i32,
    pub min_participants: i32,
    pub min_teams: i32,
    pub max_teams: i32,
    /// Ordered verification steps a participant must prove.
    pub rules: Vec<String>,
    /// When several participants tie on top points, split the pool between
    /// them instead of falling back to join-order precedence.
    pub shared_winners: bool,
    pub is_active: bool,
    pub is_public: bool,
    pub starts_at: i64,
    pub ends_at: i64,
    /// Explicit admin winner override; takes precedence at settlement.
    pub winner_override: Option<Vec<String>>,
    /// Final winners, recorded by settlement.
    pub winners: Option<Vec<String>>,
    pub settled_at: Option<i64>,
    pub created_by: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCompetitionRequest {
    pub name: String,
    pub kind: GameKind,
    pub entry_fee: i64,
    pub host_contribution: i64,
    pub participant_cap: i32,
    #[serde(default = "default_min_participants")]
    pub min_participants: i32,
    #[serde(default = "default_min_teams")]
    pub min_teams: i32,
    #[serde(default = "default_max_teams")]
    pub max_teams: i32,
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(default)]
    pub shared_winners: bool,
    #[serde(default = "default_is_public")]
    pub is_public: bool,
    pub starts_at: i64,
    pub ends_at: i64,
}

fn default_min_participants() -> i32 {
    2
}
fn default_min_teams() -> i32 {
    3
}
fn default_max_teams() -> i32 {
    20
}
fn default_is_public() -> bool {
    true
}

// ============================================================================
// TEAM SELECTION
// ============================================================================

/// One pick in a join request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamPick {
    pub fixture_id: String,
    pub selected_team: String,
    pub opponent_team: String,
    pub venue: Side,
    #[serde(default)]
    pub is_starred: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub selections: Vec<TeamPick>,
}

/// A pick as persisted on a selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedTeam {
    pub fixture_id: String,
    pub selected_team: String,
    pub opponent_team: String,
    pub venue: Side,
}

/// Per-fixture score state on a selection, written only by the scoring
/// aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamPoints {
    pub fixture_id: String,
    pub home_goals: i32,
    pub away_goals: i32,
    pub points: i64,
    pub is_live: bool,
    pub is_final: bool,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proof {
    pub step_index: i32,
    pub url: String,
    pub verified: bool,
}

/// A user's entry into one competition. One per (competition, user).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSelection {
    pub id: String,
    pub competition_id: String,
    pub user_id: String,
    pub staked_amount: i64,
    pub star_fixture: Option<String>,
    pub teams: Vec<SelectedTeam>,
    pub team_points: Vec<TeamPoints>,
    /// Always the sum of team_points[].points; never mutated independently.
    pub total_points: i64,
    /// Within-competition rank, assigned at settlement.
    pub rank: Option<i32>,
    pub steps_verified: bool,
    pub is_disqualified: bool,
    pub proofs: Vec<Proof>,
    pub joined_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitProofsRequest {
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewProofRequest {
    pub verified: bool,
}

/// One row of a competition's standings view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingRow {
    pub user_id: String,
    pub total_points: i64,
    pub rank: Option<i32>,
    pub is_disqualified: bool,
    pub steps_verified: bool,
    pub star_fixture: Option<String>,
}

// ============================================================================
// WALLET
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: String,
    pub balance: i64,
    pub made_first_deposit: bool,
    pub payout_details: Option<serde_json::Value>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub amount: i64,
    pub payout_details: Option<serde_json::Value>,
}

// ============================================================================
// SETTLEMENT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub user_id: String,
    pub amount: i64,
}

/// Result of a deactivate call. `already_settled` means the caller lost the
/// settlement CAS to a prior completed settlement and no side effects ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementOutcome {
    pub competition_id: String,
    pub already_settled: bool,
    /// True when the competition closed under its minimum participant count
    /// and stakes were refunded instead of a prize paid.
    pub refunded: bool,
    pub winners: Vec<String>,
    pub payouts: Vec<Payout>,
}

/// Accepts the admin winner-override body as either one id or a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(id) => vec![id],
            OneOrMany::Many(ids) => ids,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinnerOverrideRequest {
    pub user_ids: OneOrMany,
}

// ============================================================================
// RANK ROWS (global leaderboard)
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl ToString for Trend {
    fn to_string(&self) -> String {
        match self {
            Trend::Up => "up".to_string(),
            Trend::Down => "down".to_string(),
            Trend::Stable => "stable".to_string(),
        }
    }
}

impl From<&str> for Trend {
    fn from(s: &str) -> Self {
        match s {
            "up" => Trend::Up,
            "down" => Trend::Down,
            _ => Trend::Stable,
        }
    }
}

/// Per-game-type counters on a rank row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameTypeRank {
    pub points: i64,
    pub wins: i32,
    pub streak: i32,
    pub rank: Option<i32>,
}

/// A user's global leaderboard record, recomputed by the rank recalculator.
/// Derived state: always rebuildable from competition/selection history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankRow {
    pub user_id: String,
    pub country: Option<String>,
    pub points: i64,
    pub total_wins: i32,
    pub winning_streak: i32,
    pub topscore: GameTypeRank,
    pub mangoset: GameTypeRank,
    pub league: GameTypeRank,
    pub world_rank: Option<i32>,
    pub world_trend: Trend,
    pub country_rank: Option<i32>,
    pub country_trend: Trend,
    pub updated_at: i64,
}

// ============================================================================
// AUTH
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AuthRole {
    User,
    Admin,
    Feed,
}

impl AuthRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthRole::User => "user",
            AuthRole::Admin => "admin",
            AuthRole::Feed => "feed",
        }
    }
}

/// Gateway-signed identity assertion. The upstream identity service resolves
/// the user and signs `{user_id, timestamp, role}` with the shared secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub user_id: String,
    pub role: AuthRole,
    pub timestamp: i64,
    pub country: Option<String>,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    pub token: Option<String>,
    pub expires_at: Option<i64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: String,
    pub role: AuthRole,
    pub expires_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_kind_to_string() {
        assert_eq!(GameKind::TopScore.to_string(), "topscore");
        assert_eq!(GameKind::ManGoSet.to_string(), "mangoset");
        assert_eq!(GameKind::League.to_string(), "league");
    }

    #[test]
    fn test_game_kind_from_str() {
        assert_eq!(GameKind::from("topscore"), GameKind::TopScore);
        assert_eq!(GameKind::from("mangoset"), GameKind::ManGoSet);
        assert_eq!(GameKind::from("league"), GameKind::League);
        // Default case
        assert_eq!(GameKind::from("unknown"), GameKind::TopScore);
    }

    #[test]
    fn test_game_kind_serde() {
        assert_eq!(
            serde_json::to_string(&GameKind::ManGoSet).unwrap(),
            "\"mangoset\""
        );
        let kind: GameKind = serde_json::from_str("\"league\"").unwrap();
        assert_eq!(kind, GameKind::League);
    }

    #[test]
    fn test_trend_roundtrip() {
        assert_eq!(Trend::from("up"), Trend::Up);
        assert_eq!(Trend::from("down"), Trend::Down);
        assert_eq!(Trend::from("stable"), Trend::Stable);
        assert_eq!(Trend::from("sideways"), Trend::Stable);
        assert_eq!(Trend::Up.to_string(), "up");
    }

    #[test]
    fn test_one_or_many_single() {
        let req: WinnerOverrideRequest =
            serde_json::from_str(r#"{"user_ids": "user-1"}"#).unwrap();
        assert_eq!(req.user_ids.into_vec(), vec!["user-1".to_string()]);
    }

    #[test]
    fn test_one_or_many_list() {
        let req: WinnerOverrideRequest =
            serde_json::from_str(r#"{"user_ids": ["user-1", "user-2"]}"#).unwrap();
        assert_eq!(
            req.user_ids.into_vec(),
            vec!["user-1".to_string(), "user-2".to_string()]
        );
    }

    #[test]
    fn test_auth_role_equality() {
        assert_eq!(AuthRole::User, AuthRole::User);
        assert_ne!(AuthRole::User, AuthRole::Admin);
        assert_ne!(AuthRole::Admin, AuthRole::Feed);
    }

    #[test]
    fn test_team_pick_deserialization_defaults() {
        let pick: TeamPick = serde_json::from_str(
            r#"{"fixture_id": "fx-1", "selected_team": "Lions", "opponent_team": "Tigers", "venue": "home"}"#,
        )
        .unwrap();
        assert!(!pick.is_starred);
        assert_eq!(pick.venue, score_feed::Side::Home);
    }

    #[test]
    fn test_create_competition_request_defaults() {
        let req: CreateCompetitionRequest = serde_json::from_str(
            r#"{"name": "Weekend Cup", "kind": "topscore", "entry_fee": 50,
                "host_contribution": 100, "participant_cap": 2,
                "starts_at": 1000, "ends_at": 2000}"#,
        )
        .unwrap();
        assert_eq!(req.min_participants, 2);
        assert_eq!(req.min_teams, 3);
        assert_eq!(req.max_teams, 20);
        assert!(req.is_public);
        assert!(!req.shared_winners);
        assert!(req.rules.is_empty());
    }

    #[test]
    fn test_competition_serialization() {
        let comp = Competition {
            id: "c-1".to_string(),
            name: "Weekend Cup".to_string(),
            kind: GameKind::TopScore,
            entry_fee: 50,
            host_contribution: 100,
            prize_pool: 200,
            participant_cap: 2,
            participant_count: 0,
            min_participants: 2,
            min_teams: 3,
            max_teams: 20,
            rules: vec!["stadium selfie".to_string()],
            shared_winners: false,
            is_active: true,
            is_public: true,
            starts_at: 1000,
            ends_at: 2000,
            winner_override: None,
            winners: None,
            settled_at: None,
            created_by: "admin-1".to_string(),
            created_at: 900,
        };
        let json = serde_json::to_string(&comp).unwrap();
        let back: Competition = serde_json::from_str(&json).unwrap();
        assert_eq!(back.prize_pool, 200);
        assert_eq!(back.kind, GameKind::TopScore);
        assert!(back.winners.is_none());
    }
}
