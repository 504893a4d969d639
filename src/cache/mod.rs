//! URL-keyed TTL cache
//!
//! Backs both the response cache (values are shared in-flight futures, so
//! concurrent lookups of the same key observe one request) and the
//! visited-pages set of the site crawler. Expiry is measured from
//! insertion; reads never refresh an entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use url::Url;

struct Entry<V> {
    value: V,
    inserted: Instant,
}

/// A URL-keyed store whose entries expire a fixed time after insertion
pub struct UrlCache<V> {
    entries: Arc<Mutex<HashMap<Url, Entry<V>>>>,
    expiry: Duration,
}

impl<V> Clone for UrlCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            expiry: self.expiry,
        }
    }
}

impl<V: Clone> UrlCache<V> {
    /// Creates an empty cache whose entries live for `expiry` after insertion
    pub fn new(expiry: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            expiry,
        }
    }

    /// Returns the fresh value for `url`, dropping it if expired
    pub fn get(&self, url: &Url) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(url) {
            Some(entry) if entry.inserted.elapsed() < self.expiry => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(url);
                None
            }
            None => None,
        }
    }

    /// Whether a fresh entry exists for `url`
    pub fn contains(&self, url: &Url) -> bool {
        self.get(url).is_some()
    }

    /// Returns the fresh value for `url`, or inserts the one `create`
    /// builds; the boolean reports whether it was a hit
    ///
    /// Lookup and insertion happen under one lock, so two concurrent
    /// misses cannot both insert — the loser observes the winner's value.
    pub fn get_or_insert_with(&self, url: &Url, create: impl FnOnce() -> V) -> (V, bool) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get(url) {
            if entry.inserted.elapsed() < self.expiry {
                return (entry.value.clone(), true);
            }
        }
        let value = create();
        entries.insert(
            url.clone(),
            Entry {
                value: value.clone(),
                inserted: Instant::now(),
            },
        );
        (value, false)
    }

    /// Stores a value, overwriting any previous entry and restarting its TTL
    pub fn set(&self, url: Url, value: V) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            url,
            Entry {
                value,
                inserted: Instant::now(),
            },
        );
    }

    /// Drops every entry
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Number of stored entries, including any not yet swept expired ones
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_set_and_get() {
        let cache = UrlCache::new(Duration::from_secs(60));
        cache.set(url("https://example.com/a"), 1);
        assert_eq!(cache.get(&url("https://example.com/a")), Some(1));
        assert_eq!(cache.get(&url("https://example.com/b")), None);
    }

    #[test]
    fn test_set_overwrites() {
        let cache = UrlCache::new(Duration::from_secs(60));
        cache.set(url("https://example.com/"), 1);
        cache.set(url("https://example.com/"), 2);
        assert_eq!(cache.get(&url("https://example.com/")), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expiry_from_insertion() {
        let cache = UrlCache::new(Duration::from_millis(20));
        cache.set(url("https://example.com/"), 1);
        assert_eq!(cache.get(&url("https://example.com/")), Some(1));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get(&url("https://example.com/")), None);
    }

    #[test]
    fn test_read_does_not_refresh() {
        let cache = UrlCache::new(Duration::from_millis(40));
        cache.set(url("https://example.com/"), 1);

        std::thread::sleep(Duration::from_millis(25));
        // Still fresh; this read must not extend the TTL
        assert_eq!(cache.get(&url("https://example.com/")), Some(1));

        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(cache.get(&url("https://example.com/")), None);
    }

    #[test]
    fn test_clear() {
        let cache = UrlCache::new(Duration::from_secs(60));
        cache.set(url("https://example.com/a"), 1);
        cache.set(url("https://example.com/b"), 2);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&url("https://example.com/a")), None);
    }

    #[test]
    fn test_get_or_insert_with() {
        let cache = UrlCache::new(Duration::from_secs(60));
        let (value, hit) = cache.get_or_insert_with(&url("https://example.com/"), || 1);
        assert_eq!((value, hit), (1, false));

        let (value, hit) = cache.get_or_insert_with(&url("https://example.com/"), || 2);
        assert_eq!((value, hit), (1, true));
    }

    #[test]
    fn test_get_or_insert_with_replaces_expired() {
        let cache = UrlCache::new(Duration::from_millis(20));
        cache.set(url("https://example.com/"), 1);
        std::thread::sleep(Duration::from_millis(30));

        let (value, hit) = cache.get_or_insert_with(&url("https://example.com/"), || 2);
        assert_eq!((value, hit), (2, false));
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = UrlCache::new(Duration::from_secs(60));
        let other = cache.clone();
        cache.set(url("https://example.com/"), 7);
        assert_eq!(other.get(&url("https://example.com/")), Some(7));
    }
}
