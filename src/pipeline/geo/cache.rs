//! In-memory address cache with a fixed lifetime per entry.
//!
//! Shared by every job, so all access goes through one mutex. Lookups use
//! `peek`, which leaves the recency order alone: eviction is oldest-inserted
//! first, after expired entries have been purged.

use crate::output::Coordinates;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use tokio::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    inserted: Instant,
    address: String,
}

/// Address cache keyed by [`cache_key`].
pub struct GeoCache {
    ttl: Duration,
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl GeoCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Instant::now())
    }

    /// Look up `key` as of `now`. An expired entry is dropped on the way.
    pub fn get_at(&self, key: &str, now: Instant) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.peek(key) {
            None => return None,
            Some(entry) if now.saturating_duration_since(entry.inserted) < self.ttl => {
                return Some(entry.address.clone());
            }
            Some(_) => {}
        }
        entries.pop(key);
        None
    }

    pub fn insert(&self, key: String, address: String) {
        self.insert_at(key, address, Instant::now());
    }

    pub fn insert_at(&self, key: String, address: String, now: Instant) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= entries.cap().get() && !entries.contains(&key) {
            let stale: Vec<String> = entries
                .iter()
                .filter(|(_, e)| now.saturating_duration_since(e.inserted) >= self.ttl)
                .map(|(k, _)| k.clone())
                .collect();
            for k in &stale {
                entries.pop(k);
            }
            if !stale.is_empty() {
                debug!("Geo cache: purged {} expired entries", stale.len());
            }
        }
        // `put` evicts the oldest entry when still full.
        entries.put(
            key,
            CacheEntry {
                inserted: now,
                address,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Quantise a coordinate pair to six decimals.
///
/// Values are snapped to 0.1 micro-degree first, then truncated toward zero
/// at micro-degree resolution, so float noise in the seventh decimal never
/// splits one physical point across two keys.
pub fn cache_key(c: Coordinates) -> String {
    format!("{},{}", micro_degrees(c.lat), micro_degrees(c.lon))
}

fn micro_degrees(value: f64) -> String {
    let tenths = (value * 1e7).round();
    let micros = (tenths / 10.0).trunc() as i64;
    let sign = if micros < 0 { "-" } else { "" };
    let abs = micros.unsigned_abs();
    format!("{sign}{}.{:06}", abs / 1_000_000, abs % 1_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearby_points_share_a_key() {
        let a = cache_key(Coordinates::new(40.123456789, -73.987654321));
        let b = cache_key(Coordinates::new(40.1234564, -73.9876543));
        assert_eq!(a, b);
        assert_eq!(a, "40.123456,-73.987654");
    }

    #[test]
    fn key_formatting() {
        assert_eq!(cache_key(Coordinates::new(0.0, 0.0)), "0.000000,0.000000");
        assert_eq!(cache_key(Coordinates::new(-0.5, 2.2945)), "-0.500000,2.294500");
        assert_eq!(
            cache_key(Coordinates::new(48.8584, 2.2945)),
            "48.858400,2.294500"
        );
    }

    #[test]
    fn entry_lifetime_boundaries() {
        let cache = GeoCache::new(10, Duration::from_secs(3600));
        let t0 = Instant::now();
        cache.insert_at("k".into(), "Paris".into(), t0);

        assert_eq!(
            cache.get_at("k", t0 + Duration::from_secs(3599)).as_deref(),
            Some("Paris")
        );
        assert_eq!(cache.get_at("k", t0 + Duration::from_secs(3601)), None);
        // Expired entries are dropped on lookup.
        assert!(cache.is_empty());
    }

    #[test]
    fn hit_is_byte_identical() {
        let cache = GeoCache::new(10, Duration::from_secs(60));
        let stored = "Tour Eiffel, 5, Avenue Anatole France, Paris, Île-de-France, 75007, France";
        cache.insert(cache_key(Coordinates::new(48.8584, 2.2945)), stored.to_string());
        let hit = cache
            .get(&cache_key(Coordinates::new(48.85840004, 2.29450001)))
            .unwrap();
        assert_eq!(hit.as_bytes(), stored.as_bytes());
    }

    #[test]
    fn full_cache_purges_expired_before_evicting() {
        let cache = GeoCache::new(2, Duration::from_secs(10));
        let t0 = Instant::now();
        cache.insert_at("old".into(), "a".into(), t0);
        cache.insert_at("fresh".into(), "b".into(), t0 + Duration::from_secs(8));

        // "old" is expired at t0+11, "fresh" is not.
        let t1 = t0 + Duration::from_secs(11);
        cache.insert_at("new".into(), "c".into(), t1);
        assert_eq!(cache.get_at("fresh", t1).as_deref(), Some("b"));
        assert_eq!(cache.get_at("new", t1).as_deref(), Some("c"));
        assert_eq!(cache.get_at("old", t1), None);
    }

    #[test]
    fn full_cache_evicts_oldest_insert() {
        let cache = GeoCache::new(2, Duration::from_secs(3600));
        let t0 = Instant::now();
        cache.insert_at("first".into(), "1".into(), t0);
        cache.insert_at("second".into(), "2".into(), t0);
        // Reading does not refresh recency.
        assert!(cache.get_at("first", t0).is_some());
        cache.insert_at("third".into(), "3".into(), t0);

        assert_eq!(cache.get_at("first", t0), None);
        assert!(cache.get_at("second", t0).is_some());
        assert!(cache.get_at("third", t0).is_some());
    }
}
