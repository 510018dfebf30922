//! The competition lifecycle & settlement engine
//!
//! Five components over a shared competition/participant data model:
//!
//! - `entry`: race-safe admission of team selections (capacity, star
//!   exclusivity, fee debit) as a saga with compensations
//! - `scoring`: idempotent aggregation of fixture results into points
//! - `verification`: per-step proof review and disqualification state
//! - `settlement`: CAS-gated, exactly-once competition closeout
//! - `ranking`: batch recompute of global leaderboard positions
//!
//! Cross-entity invariants are enforced with storage-level conditional
//! writes, never in-process locks: request workers may run on separate
//! machines.

pub mod entry;
pub mod ranking;
pub mod scoring;
pub mod settlement;
pub mod verification;
