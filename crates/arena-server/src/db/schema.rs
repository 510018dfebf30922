//! Database schema and migrations

use anyhow::Result;
use deadpool_postgres::Object;
use tracing::info;

pub async fn run_migrations(client: &Object) -> Result<()> {
    client.batch_execute(SCHEMA_SQL).await?;
    info!("Database migrations applied");
    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Arena Server Database Schema
-- PostgreSQL migrations for the competition lifecycle & settlement engine

-- Per-user coin wallets. Mutated only through the atomic debit/credit
-- statements in queries.rs.
CREATE TABLE IF NOT EXISTS wallets (
    user_id VARCHAR(128) PRIMARY KEY,
    balance BIGINT NOT NULL DEFAULT 0 CHECK (balance >= 0),
    made_first_deposit BOOLEAN NOT NULL DEFAULT FALSE,
    payout_details JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Competitions. prize_pool is computed once at creation and never changes;
-- is_active flips true -> false exactly once via the settlement CAS.
CREATE TABLE IF NOT EXISTS competitions (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name VARCHAR(255) NOT NULL,
    kind VARCHAR(32) NOT NULL,
    entry_fee BIGINT NOT NULL DEFAULT 0,
    host_contribution BIGINT NOT NULL DEFAULT 0,
    prize_pool BIGINT NOT NULL,
    participant_cap INTEGER NOT NULL,
    participant_count INTEGER NOT NULL DEFAULT 0,
    min_participants INTEGER NOT NULL DEFAULT 2,
    min_teams INTEGER NOT NULL DEFAULT 3,
    max_teams INTEGER NOT NULL DEFAULT 20,
    rules JSONB NOT NULL DEFAULT '[]',
    shared_winners BOOLEAN NOT NULL DEFAULT FALSE,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    is_public BOOLEAN NOT NULL DEFAULT TRUE,
    starts_at TIMESTAMPTZ NOT NULL,
    ends_at TIMESTAMPTZ NOT NULL,
    winner_override JSONB,
    winners JSONB,
    settled_at TIMESTAMPTZ,
    created_by VARCHAR(128) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_competitions_active ON competitions(is_active, ends_at);
CREATE INDEX IF NOT EXISTS idx_competitions_public ON competitions(is_public, created_at DESC);

-- Team selections: one per (competition, user).
CREATE TABLE IF NOT EXISTS team_selections (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    competition_id UUID NOT NULL REFERENCES competitions(id) ON DELETE CASCADE,
    user_id VARCHAR(128) NOT NULL,
    staked_amount BIGINT NOT NULL DEFAULT 0,
    star_fixture VARCHAR(128),
    total_points BIGINT NOT NULL DEFAULT 0,
    final_rank INTEGER,
    steps_verified BOOLEAN NOT NULL DEFAULT FALSE,
    is_disqualified BOOLEAN NOT NULL DEFAULT FALSE,
    joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE(competition_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_selections_competition ON team_selections(competition_id);
CREATE INDEX IF NOT EXISTS idx_selections_user ON team_selections(user_id);

-- The picks on a selection, in the order the user submitted them.
CREATE TABLE IF NOT EXISTS selection_teams (
    selection_id UUID NOT NULL REFERENCES team_selections(id) ON DELETE CASCADE,
    fixture_id VARCHAR(128) NOT NULL,
    slot INTEGER NOT NULL,
    selected_team VARCHAR(128) NOT NULL,
    opponent_team VARCHAR(128) NOT NULL,
    venue VARCHAR(8) NOT NULL,
    PRIMARY KEY (selection_id, fixture_id)
);

CREATE INDEX IF NOT EXISTS idx_selection_teams_fixture ON selection_teams(fixture_id);

-- Per-fixture score state. Written only by the scoring aggregator; is_final
-- never regresses to live without an explicit admin override.
CREATE TABLE IF NOT EXISTS team_points (
    selection_id UUID NOT NULL REFERENCES team_selections(id) ON DELETE CASCADE,
    fixture_id VARCHAR(128) NOT NULL,
    home_goals INTEGER NOT NULL DEFAULT 0,
    away_goals INTEGER NOT NULL DEFAULT 0,
    points BIGINT NOT NULL DEFAULT 0,
    is_live BOOLEAN NOT NULL DEFAULT FALSE,
    is_final BOOLEAN NOT NULL DEFAULT FALSE,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (selection_id, fixture_id)
);

CREATE INDEX IF NOT EXISTS idx_team_points_fixture ON team_points(fixture_id);

-- Star-fixture exclusivity: the primary key is the atomic reservation
-- primitive. A reservation lives as long as the participation; only a join
-- compensation releases it.
CREATE TABLE IF NOT EXISTS star_reservations (
    competition_id UUID NOT NULL REFERENCES competitions(id) ON DELETE CASCADE,
    fixture_id VARCHAR(128) NOT NULL,
    user_id VARCHAR(128) NOT NULL,
    reserved_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (competition_id, fixture_id)
);

-- Proof uploads per verification step.
CREATE TABLE IF NOT EXISTS proofs (
    selection_id UUID NOT NULL REFERENCES team_selections(id) ON DELETE CASCADE,
    step_index INTEGER NOT NULL,
    url TEXT NOT NULL,
    verified BOOLEAN NOT NULL DEFAULT FALSE,
    submitted_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (selection_id, step_index)
);

-- Settlement idempotency markers: a side effect is applied if and only if
-- its marker insert wins. entry_kind: payout | refund | standing.
CREATE TABLE IF NOT EXISTS settlement_ledger (
    competition_id UUID NOT NULL,
    user_id VARCHAR(128) NOT NULL,
    entry_kind VARCHAR(32) NOT NULL,
    amount BIGINT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (competition_id, user_id, entry_kind)
);

-- Global leaderboard rows (derived, recomputable from settlement history).
CREATE TABLE IF NOT EXISTS rank_rows (
    user_id VARCHAR(128) PRIMARY KEY,
    country VARCHAR(64),
    points BIGINT NOT NULL DEFAULT 0,
    total_wins INTEGER NOT NULL DEFAULT 0,
    winning_streak INTEGER NOT NULL DEFAULT 0,
    topscore_points BIGINT NOT NULL DEFAULT 0,
    topscore_wins INTEGER NOT NULL DEFAULT 0,
    topscore_streak INTEGER NOT NULL DEFAULT 0,
    topscore_rank INTEGER,
    mangoset_points BIGINT NOT NULL DEFAULT 0,
    mangoset_wins INTEGER NOT NULL DEFAULT 0,
    mangoset_streak INTEGER NOT NULL DEFAULT 0,
    mangoset_rank INTEGER,
    league_points BIGINT NOT NULL DEFAULT 0,
    league_wins INTEGER NOT NULL DEFAULT 0,
    league_streak INTEGER NOT NULL DEFAULT 0,
    league_rank INTEGER,
    world_rank INTEGER,
    world_trend VARCHAR(8) NOT NULL DEFAULT 'stable',
    country_rank INTEGER,
    country_trend VARCHAR(8) NOT NULL DEFAULT 'stable',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_rank_rows_points ON rank_rows(points DESC);
CREATE INDEX IF NOT EXISTS idx_rank_rows_world ON rank_rows(world_rank);
CREATE INDEX IF NOT EXISTS idx_rank_rows_country ON rank_rows(country, country_rank);

-- Audit trail
CREATE TABLE IF NOT EXISTS events (
    id BIGSERIAL PRIMARY KEY,
    event_type VARCHAR(64) NOT NULL,
    entity_id VARCHAR(128),
    entity_type VARCHAR(64),
    payload JSONB,
    actor VARCHAR(128),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_events_created ON events(created_at DESC);
"#;
