//! USM time-window replay protection (RFC 3414 §3.2.7, §4.2;
//! spec.md §4.4 step 3).
//!
//! The engine caches its best-known (engineBoots, engineTime) for
//! every remote authoritative engine it has talked to. A manager is
//! always the non-authoritative party for requests it originates, so
//! it trusts and adopts the authoritative engine's asserted values on
//! every successful exchange (RFC 3414 §3.2.7 step 3).

use std::time::Instant;

use dashmap::DashMap;

/// The lateral time window's default, RFC 3414 §3.2.7. `TimeWindowCache`
/// takes its actual window from `EngineConfig::time_window_secs`; this
/// is only the fallback `Default` uses.
pub const TIME_WINDOW_SECS: u32 = 150;

#[derive(Debug, Clone, Copy)]
struct CachedTime {
    engine_boots: u32,
    engine_time: u32,
    /// Local monotonic instant the cached value was learned at, used
    /// to extrapolate `engine_time` forward between updates.
    learned_at: Instant,
}

impl CachedTime {
    fn extrapolated_time(&self) -> u32 {
        self.engine_time
            .saturating_add(self.learned_at.elapsed().as_secs() as u32)
    }
}

#[derive(Debug)]
pub struct TimeWindowCache {
    by_engine_id: DashMap<Vec<u8>, CachedTime>,
    window_secs: u32,
}

impl Default for TimeWindowCache {
    fn default() -> Self {
        Self::with_window(TIME_WINDOW_SECS)
    }
}

impl TimeWindowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window_secs: u32) -> Self {
        Self {
            by_engine_id: DashMap::new(),
            window_secs,
        }
    }

    /// Adopts `(engine_boots, engine_time)` as the current truth for
    /// `engine_id`, as reported by that authoritative engine.
    pub fn learn(&self, engine_id: &[u8], engine_boots: u32, engine_time: u32) {
        self.by_engine_id.insert(
            engine_id.to_vec(),
            CachedTime {
                engine_boots,
                engine_time,
                learned_at: Instant::now(),
            },
        );
    }

    /// RFC 3414 §3.2.7: reject if boots differ, or if boots match and
    /// `|time - cached_time|` exceeds the window. An engine this cache
    /// has never seen before is accepted unconditionally (first
    /// contact establishes trust; this only runs post-authentication).
    pub fn check(&self, engine_id: &[u8], msg_boots: u32, msg_time: u32) -> bool {
        let cached = match self.by_engine_id.get(engine_id) {
            Some(c) => *c,
            None => return true,
        };

        if msg_boots != cached.engine_boots {
            return false;
        }

        let local = cached.extrapolated_time();
        let delta = local.abs_diff(msg_time);
        delta <= self.window_secs
    }

    pub fn remove(&self, engine_id: &[u8]) {
        self.by_engine_id.remove(engine_id);
    }

    pub fn clear(&self) {
        self.by_engine_id.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_engine_is_accepted() {
        let cache = TimeWindowCache::new();
        assert!(cache.check(b"unseen", 1, 1000));
    }

    #[test]
    fn matching_boots_and_time_within_window_accepted() {
        let cache = TimeWindowCache::new();
        cache.learn(b"engine", 5, 1000);
        assert!(cache.check(b"engine", 5, 1100));
        assert!(cache.check(b"engine", 5, 900));
    }

    #[test]
    fn time_outside_window_rejected() {
        let cache = TimeWindowCache::new();
        cache.learn(b"engine", 5, 1000);
        assert!(!cache.check(b"engine", 5, 1000 + 300));
    }

    #[test]
    fn mismatched_boots_rejected() {
        let cache = TimeWindowCache::new();
        cache.learn(b"engine", 5, 1000);
        assert!(!cache.check(b"engine", 6, 1000));
    }

    #[test]
    fn custom_window_is_honoured() {
        let cache = TimeWindowCache::with_window(10);
        cache.learn(b"engine", 5, 1000);
        assert!(cache.check(b"engine", 5, 1009));
        assert!(!cache.check(b"engine", 5, 1011));
    }

    #[test]
    fn relearning_resynchronises() {
        let cache = TimeWindowCache::new();
        cache.learn(b"engine", 5, 1000);
        assert!(!cache.check(b"engine", 5, 1300));
        cache.learn(b"engine", 5, 1300);
        assert!(cache.check(b"engine", 5, 1300));
    }
}
