//! Arena Server - Competition Lifecycle & Settlement Engine
//!
//! Runs time-boxed prediction competitions: users stake entry fees, pick
//! sports fixtures, accumulate points as matches resolve, and get ranked and
//! paid when a competition closes.
//!
//! Architecture:
//! - Entry Coordinator: race-safe admission (capacity, star exclusivity, fee)
//! - Scoring Aggregator: idempotent fold of the external score feed
//! - Verification State Machine: proof review, disqualify/requalify
//! - Settlement Engine: CAS-gated exactly-once closeout and payout
//! - Rank Recalculator: batch world/country/game-type leaderboard positions
//!
//! Key invariants:
//! - Staked fees never exceed entry_fee x participant_cap per competition
//! - One non-disqualified star holder per (competition, fixture)
//! - is_active flips true -> false exactly once; settlement side effects are
//!   ledger-gated and apply exactly once under retries
//! - total_points is always the sum of per-fixture points

pub mod api;
pub mod audit;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod state;

pub use db::DbPool;
pub use error::{EngineError, EngineResult};
pub use state::AppState;
