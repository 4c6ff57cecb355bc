//! In-memory cache of autocomplete suggestions keyed by normalized query text.
//!
//! Expiry is lazy: a read drops stale suggestions and deletes the entry once
//! nothing is left, so no timer is needed for TTL. Capacity is enforced on
//! every write by dropping the entries whose first suggestion is oldest. This
//! approximates LRU by insertion time only; reads do not refresh an entry.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::clock::{Clock, to_delta};
use crate::config::CacheConfig;
use crate::models::{CachedSuggestion, Suggestion};

/// Cache key for a query: surrounding whitespace dropped, lower-cased.
#[must_use]
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub queries: Vec<String>,
}

pub struct QueryCache {
    entries: Mutex<HashMap<String, Vec<CachedSuggestion>>>,
    ttl: TimeDelta,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl QueryCache {
    #[must_use]
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: to_delta(config.ttl()),
            max_entries: config.max_entries.max(1),
            clock,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Vec<CachedSuggestion>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the unexpired suggestions for `query`, in provider order.
    pub fn get(&self, query: &str) -> Option<Vec<CachedSuggestion>> {
        let key = normalize_query(query);
        let now = self.clock.now();
        let mut entries = self.entries();

        let Some(suggestions) = entries.get_mut(&key) else {
            metrics::counter!("places_cache_misses_total").increment(1);
            return None;
        };

        suggestions.retain(|s| !s.is_expired(now, self.ttl));

        if suggestions.is_empty() {
            entries.remove(&key);
            debug!(query = %key, "Cache entry expired");
            metrics::counter!("places_cache_misses_total").increment(1);
            return None;
        }

        metrics::counter!("places_cache_hits_total").increment(1);
        Some(suggestions.clone())
    }

    /// Stores `suggestions` for `query`, replacing any previous entry.
    pub fn set(&self, query: &str, suggestions: Vec<Suggestion>) {
        let key = normalize_query(query);
        let now = self.clock.now();
        let stamped = suggestions
            .into_iter()
            .map(|suggestion| CachedSuggestion {
                suggestion,
                cached_at: now,
            })
            .collect();

        let mut entries = self.entries();
        entries.insert(key, stamped);
        Self::evict(&mut entries, self.max_entries);
    }

    pub fn has(&self, query: &str) -> bool {
        self.get(query).is_some_and(|s| !s.is_empty())
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries();
        let mut queries: Vec<String> = entries.keys().cloned().collect();
        queries.sort();

        CacheStats {
            size: entries.len(),
            queries,
        }
    }

    fn evict(entries: &mut HashMap<String, Vec<CachedSuggestion>>, max_entries: usize) {
        if entries.len() <= max_entries {
            return;
        }

        let mut by_age: Vec<(DateTime<Utc>, String)> = entries
            .iter()
            .map(|(key, suggestions)| {
                let inserted = suggestions
                    .first()
                    .map_or(DateTime::<Utc>::MIN_UTC, |s| s.cached_at);
                (inserted, key.clone())
            })
            .collect();
        by_age.sort();

        let excess = entries.len() - max_entries;
        for (_, key) in by_age.into_iter().take(excess) {
            entries.remove(&key);
        }

        debug!(evicted = excess, "Evicted oldest cache entries");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn new_cache(max_entries: usize) -> (QueryCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let config = CacheConfig {
            ttl_seconds: 24 * 60 * 60,
            max_entries,
        };
        (QueryCache::new(&config, clock.clone()), clock)
    }

    fn paris() -> Vec<Suggestion> {
        vec![
            Suggestion::new("Paris, France", "paris-fr"),
            Suggestion::new("Paris, TX, USA", "paris-tx"),
        ]
    }

    #[test]
    fn normalizes_keys() {
        let (cache, _) = new_cache(10);
        cache.set("PARIS", paris());

        assert!(cache.get("Paris").is_some());
        assert!(cache.get("  paris  ").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn preserves_provider_order() {
        let (cache, _) = new_cache(10);
        cache.set("paris", paris());

        let ids: Vec<String> = cache
            .get("paris")
            .unwrap()
            .into_iter()
            .map(|s| s.suggestion.place_id.to_string())
            .collect();
        assert_eq!(ids, vec!["paris-fr", "paris-tx"]);
    }

    #[test]
    fn expired_entries_are_removed_on_read() {
        let (cache, clock) = new_cache(10);
        cache.set("paris", paris());

        clock.advance(TimeDelta::hours(23));
        assert!(cache.has("paris"));

        clock.advance(TimeDelta::hours(1));
        assert!(cache.get("paris").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn set_resets_timestamps() {
        let (cache, clock) = new_cache(10);
        cache.set("paris", paris());
        clock.advance(TimeDelta::hours(20));
        cache.set("paris", paris());
        clock.advance(TimeDelta::hours(20));

        let entry = cache.get("paris").unwrap();
        assert!(entry.iter().all(|s| s.cached_at == clock.now() - TimeDelta::hours(20)));
    }

    #[test]
    fn evicts_oldest_by_first_insertion() {
        let (cache, clock) = new_cache(3);
        for q in ["one", "two", "three", "four", "five"] {
            cache.set(q, vec![Suggestion::new(q, q)]);
            clock.advance(TimeDelta::seconds(1));
        }

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.stats().queries, vec!["five", "four", "three"]);
        assert!(!cache.has("one"));
        assert!(!cache.has("two"));
    }

    #[test]
    fn overwriting_an_entry_makes_it_young_again() {
        let (cache, clock) = new_cache(2);
        cache.set("a", vec![Suggestion::new("a", "a")]);
        clock.advance(TimeDelta::seconds(1));
        cache.set("b", vec![Suggestion::new("b", "b")]);
        clock.advance(TimeDelta::seconds(1));
        cache.set("a", vec![Suggestion::new("a", "a")]);
        clock.advance(TimeDelta::seconds(1));
        cache.set("c", vec![Suggestion::new("c", "c")]);

        assert!(cache.has("a"));
        assert!(!cache.has("b"));
        assert!(cache.has("c"));
    }

    #[test]
    fn clear_drops_everything() {
        let (cache, _) = new_cache(10);
        cache.set("paris", paris());
        cache.set("berlin", vec![Suggestion::new("Berlin, Germany", "b")]);
        cache.clear();

        assert_eq!(cache.stats(), CacheStats::default());
    }
}
