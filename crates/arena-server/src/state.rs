//! Application state

use crate::db::DbPool;
use crate::models::{AuthSession, RankRow};
use dashmap::DashMap;
use parking_lot::RwLock;
use score_feed::ScoringAdapter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// In-memory cache for rankings pages (30 second TTL). Leaderboard reads are
/// lock-free and may serve data that trails a recompute.
pub struct RankingsCache {
    /// cache key -> (rows, inserted_at)
    entries: RwLock<HashMap<String, (Vec<RankRow>, Instant)>>,
    ttl_secs: u64,
}

impl RankingsCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl_secs,
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<RankRow>> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|(_, at)| at.elapsed().as_secs() < self.ttl_secs)
            .map(|(rows, _)| rows.clone())
    }

    pub fn put(&self, key: String, rows: Vec<RankRow>) {
        let mut entries = self.entries.write();
        entries.insert(key, (rows, Instant::now()));
        // Drop stale pages while we hold the write lock
        let ttl = self.ttl_secs;
        entries.retain(|_, (_, at)| at.elapsed().as_secs() < ttl);
    }

    /// Invalidate everything; called after a recompute.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for RankingsCache {
    fn default() -> Self {
        Self::new(30)
    }
}

pub struct AppState {
    pub db: DbPool,
    pub sessions: DashMap<String, AuthSession>,
    /// External scoring adapter; the points formula is a black box here.
    pub scoring: Arc<dyn ScoringAdapter>,
    /// Shared secret the identity gateway signs auth assertions with.
    pub auth_secret: String,
    pub rankings_cache: RankingsCache,
}

impl AppState {
    pub fn new(db: DbPool, auth_secret: String, scoring: Arc<dyn ScoringAdapter>) -> Self {
        Self {
            db,
            sessions: DashMap::new(),
            scoring,
            auth_secret,
            rankings_cache: RankingsCache::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rankings_cache_roundtrip() {
        let cache = RankingsCache::new(30);
        assert!(cache.get("world|1|50").is_none());
        cache.put("world|1|50".to_string(), Vec::new());
        assert!(cache.get("world|1|50").is_some());
        cache.clear();
        assert!(cache.get("world|1|50").is_none());
    }

    #[test]
    fn test_rankings_cache_expiry() {
        // Zero TTL: entries are stale the moment they land.
        let cache = RankingsCache::new(0);
        cache.put("k".to_string(), Vec::new());
        assert!(cache.get("k").is_none());
    }
}
