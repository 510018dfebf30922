//! End-to-end settlement flow tests
//!
//! These run against a real PostgreSQL (`cargo test -- --ignored` with
//! DATABASE_URL set) and exercise the full join -> score -> settle path,
//! including idempotent re-settlement and the requalify precondition.

use arena_server::db::{self, queries, DbPool};
use arena_server::engine::{entry, scoring, settlement, verification};
use arena_server::error::EngineError;
use arena_server::models::{CreateCompetitionRequest, GameKind, TeamPick};
use score_feed::{FixtureScore, FixtureUpdate, Side, StandardScoring};
use uuid::Uuid;

fn user(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

fn fixture(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

fn competition_request(name: &str, cap: i32) -> CreateCompetitionRequest {
    let now = chrono::Utc::now().timestamp();
    CreateCompetitionRequest {
        name: name.to_string(),
        kind: GameKind::ManGoSet,
        entry_fee: 50,
        host_contribution: 100,
        participant_cap: cap,
        min_participants: 2,
        min_teams: 3,
        max_teams: 20,
        rules: vec![],
        shared_winners: false,
        is_public: true,
        starts_at: now - 60,
        ends_at: now + 3600,
    }
}

fn picks(fixtures: &[String], side: Side, star: &str) -> Vec<TeamPick> {
    fixtures
        .iter()
        .map(|f| TeamPick {
            fixture_id: f.clone(),
            selected_team: match side {
                Side::Home => "Lions".to_string(),
                Side::Away => "Tigers".to_string(),
            },
            opponent_team: match side {
                Side::Home => "Tigers".to_string(),
                Side::Away => "Lions".to_string(),
            },
            venue: side,
            is_starred: f == star,
        })
        .collect()
}

async fn apply_ft(db: &DbPool, fixture_id: &str, home: i32, away: i32) {
    let update = FixtureUpdate {
        fixture_id: fixture_id.to_string(),
        score: FixtureScore { home, away },
        is_live: false,
        is_ft: true,
    };
    scoring::apply_fixture_result(db, &StandardScoring, &update, false)
        .await
        .expect("fixture apply failed");
}

async fn balance(db: &DbPool, user_id: &str) -> i64 {
    queries::get_wallet(db, user_id)
        .await
        .unwrap()
        .map(|w| w.balance)
        .unwrap_or(0)
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set DATABASE_URL and run with --ignored"]
async fn test_full_settlement_flow() {
    let db = db::init_db(&db::get_base_url()).await.unwrap();

    let user_a = user("alice");
    let user_b = user("bob");
    queries::deposit(&db, &user_a, 100, None).await.unwrap();
    queries::deposit(&db, &user_b, 100, None).await.unwrap();

    let competition = queries::create_competition(&db, &competition_request("Weekend Cup", 2), "admin")
        .await
        .unwrap();
    assert_eq!(competition.prize_pool, 200);

    let fixtures = vec![fixture("f1"), fixture("f2"), fixture("f3")];

    // A backs the home sides starring fixture 0, B the away sides starring 1.
    entry::join(
        &db,
        &competition.id,
        &user_a,
        &picks(&fixtures, Side::Home, &fixtures[0]),
    )
    .await
    .unwrap();
    entry::join(
        &db,
        &competition.id,
        &user_b,
        &picks(&fixtures, Side::Away, &fixtures[1]),
    )
    .await
    .unwrap();

    // Both fees debited
    assert_eq!(balance(&db, &user_a).await, 50);
    assert_eq!(balance(&db, &user_b).await, 50);

    // Duplicate join rejected without touching the wallet
    let err = entry::join(
        &db,
        &competition.id,
        &user_a,
        &picks(&fixtures, Side::Home, &fixtures[2]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateJoin));
    assert_eq!(balance(&db, &user_a).await, 50);

    // Results: home wins 2-0, draw 1-1, home wins 1-0
    // A: (3+2) + (1+1) + (3+1) = 11, B: 0 + (1+1) + 0 = 2
    apply_ft(&db, &fixtures[0], 2, 0).await;
    apply_ft(&db, &fixtures[1], 1, 1).await;
    apply_ft(&db, &fixtures[2], 1, 0).await;

    // Duplicate delivery of a final result changes nothing
    let update = FixtureUpdate {
        fixture_id: fixtures[0].clone(),
        score: FixtureScore { home: 2, away: 0 },
        is_live: false,
        is_ft: true,
    };
    let outcome = scoring::apply_fixture_result(&db, &StandardScoring, &update, false)
        .await
        .unwrap();
    assert_eq!(outcome.picks_written, 0);

    let standings = queries::competition_standings(&db, &competition.id)
        .await
        .unwrap();
    assert_eq!(standings[0].user_id, user_a);
    assert_eq!(standings[0].total_points, 11);
    assert_eq!(standings[1].total_points, 2);

    // Settle
    let outcome = settlement::deactivate(&db, &competition.id).await.unwrap();
    assert!(!outcome.already_settled);
    assert_eq!(outcome.winners, vec![user_a.clone()]);
    assert_eq!(outcome.payouts.len(), 1);
    assert_eq!(outcome.payouts[0].amount, 200);

    assert_eq!(balance(&db, &user_a).await, 250);
    assert_eq!(balance(&db, &user_b).await, 50);

    let rank_a = queries::get_rank_row(&db, &user_a).await.unwrap().unwrap();
    assert_eq!(rank_a.total_wins, 1);
    assert_eq!(rank_a.winning_streak, 1);
    assert_eq!(rank_a.mangoset.wins, 1);

    let rank_b = queries::get_rank_row(&db, &user_b).await.unwrap().unwrap();
    assert_eq!(rank_b.total_wins, 0);
    assert_eq!(rank_b.winning_streak, 0);

    // Second deactivate is a no-op returning success
    let again = settlement::deactivate(&db, &competition.id).await.unwrap();
    assert!(again.already_settled);
    assert_eq!(again.winners, vec![user_a.clone()]);
    assert_eq!(balance(&db, &user_a).await, 250);
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set DATABASE_URL and run with --ignored"]
async fn test_star_fixture_exclusive_and_compensated() {
    let db = db::init_db(&db::get_base_url()).await.unwrap();

    let user_a = user("carol");
    let user_b = user("dave");
    queries::deposit(&db, &user_a, 100, None).await.unwrap();
    queries::deposit(&db, &user_b, 100, None).await.unwrap();

    let competition = queries::create_competition(&db, &competition_request("Star Clash", 3), "admin")
        .await
        .unwrap();
    let fixtures = vec![fixture("g1"), fixture("g2"), fixture("g3")];

    entry::join(
        &db,
        &competition.id,
        &user_a,
        &picks(&fixtures, Side::Home, &fixtures[0]),
    )
    .await
    .unwrap();

    // Same star fixture loses the reservation and the wallet stays whole
    let err = entry::join(
        &db,
        &competition.id,
        &user_b,
        &picks(&fixtures, Side::Away, &fixtures[0]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::StarFixtureTaken));
    assert_eq!(balance(&db, &user_b).await, 100);

    // A different star admits B normally
    entry::join(
        &db,
        &competition.id,
        &user_b,
        &picks(&fixtures, Side::Away, &fixtures[1]),
    )
    .await
    .unwrap();
    assert_eq!(balance(&db, &user_b).await, 50);
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set DATABASE_URL and run with --ignored"]
async fn test_insufficient_balance_releases_star() {
    let db = db::init_db(&db::get_base_url()).await.unwrap();

    let poor = user("poor");
    let rich = user("rich");
    queries::ensure_wallet(&db, &poor).await.unwrap();
    queries::deposit(&db, &rich, 100, None).await.unwrap();

    let competition = queries::create_competition(&db, &competition_request("Fee Gate", 3), "admin")
        .await
        .unwrap();
    let fixtures = vec![fixture("h1"), fixture("h2"), fixture("h3")];

    let err = entry::join(
        &db,
        &competition.id,
        &poor,
        &picks(&fixtures, Side::Home, &fixtures[0]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientBalance));

    // The failed join released its star reservation and capacity slot
    entry::join(
        &db,
        &competition.id,
        &rich,
        &picks(&fixtures, Side::Home, &fixtures[0]),
    )
    .await
    .unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set DATABASE_URL and run with --ignored"]
async fn test_requalify_requires_all_proofs_verified() {
    let db = db::init_db(&db::get_base_url()).await.unwrap();

    let user_a = user("eve");
    let user_b = user("frank");
    queries::deposit(&db, &user_a, 100, None).await.unwrap();
    queries::deposit(&db, &user_b, 100, None).await.unwrap();

    let mut req = competition_request("Proof Gate", 2);
    req.rules = vec!["stadium selfie".to_string(), "ticket stub".to_string()];
    // One eligible participant must still be enough to settle after the
    // disqualification at the end of this test.
    req.min_participants = 1;
    let competition = queries::create_competition(&db, &req, "admin").await.unwrap();
    let fixtures = vec![fixture("k1"), fixture("k2"), fixture("k3")];

    let selection = entry::join(
        &db,
        &competition.id,
        &user_a,
        &picks(&fixtures, Side::Home, &fixtures[0]),
    )
    .await
    .unwrap();
    entry::join(
        &db,
        &competition.id,
        &user_b,
        &picks(&fixtures, Side::Away, &fixtures[1]),
    )
    .await
    .unwrap();

    verification::disqualify(&db, &selection.id, "admin").await.unwrap();

    // No proofs at all
    let err = verification::requalify(&db, &selection.id, "admin")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotAllProofsVerified));

    // One of two steps verified is still not enough
    verification::submit_proofs(
        &db,
        &selection.id,
        &user_a,
        &[
            "https://proofs/selfie.jpg".to_string(),
            "https://proofs/stub.jpg".to_string(),
        ],
    )
    .await
    .unwrap();
    verification::review_proof(&db, &selection.id, 0, true, "admin")
        .await
        .unwrap();
    let err = verification::requalify(&db, &selection.id, "admin")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotAllProofsVerified));

    // All steps verified clears the flag
    verification::review_proof(&db, &selection.id, 1, true, "admin")
        .await
        .unwrap();
    let selection = verification::requalify(&db, &selection.id, "admin")
        .await
        .unwrap();
    assert!(!selection.is_disqualified);
    assert!(selection.steps_verified);

    // A disqualified top scorer never wins: disqualify A again and settle.
    verification::disqualify(&db, &selection.id, "admin").await.unwrap();
    apply_ft(&db, &fixtures[0], 2, 0).await;
    let outcome = settlement::deactivate(&db, &competition.id).await.unwrap();
    assert_eq!(outcome.winners, vec![user_b.clone()]);
}
