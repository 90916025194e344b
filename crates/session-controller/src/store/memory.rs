//! In-process store backend.
//!
//! Serves the same contract as the Redis backend with process-local
//! semantics: state is lost on restart and not shared across instances.
//! Expiry is enforced lazily on read against `tokio::time::Instant`, so
//! paused-clock tests can drive TTL behavior deterministically.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

struct ValueEntry {
    value: String,
    expires_at: Instant,
}

struct ListEntry {
    values: VecDeque<String>,
    expires_at: Instant,
}

#[derive(Default)]
struct MemoryInner {
    values: HashMap<String, ValueEntry>,
    lists: HashMap<String, ListEntry>,
}

/// In-process implementation of the store contract.
///
/// Cheaply cloneable; clones share the same map.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryInner>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryInner::default())),
        }
    }

    /// Store a value with a TTL.
    pub fn put(&self, key: &str, value: &str, ttl: Duration) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.values.insert(
            key.to_string(),
            ValueEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Fetch a value, dropping it if expired.
    pub fn get(&self, key: &str) -> Option<String> {
        let Ok(mut inner) = self.inner.lock() else {
            return None;
        };
        match inner.values.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                inner.values.remove(key);
                None
            }
            None => None,
        }
    }

    /// Push a value onto the front of a list and refresh the list TTL.
    pub fn push_to_list(&self, list_key: &str, value: &str, ttl: Duration) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let now = Instant::now();
        let entry = inner
            .lists
            .entry(list_key.to_string())
            .or_insert_with(|| ListEntry {
                values: VecDeque::new(),
                expires_at: now + ttl,
            });
        if entry.expires_at <= now {
            entry.values.clear();
        }
        entry.values.push_front(value.to_string());
        entry.expires_at = now + ttl;
    }

    /// Read a range from a list, newest first.
    pub fn range_list(&self, list_key: &str, start: usize, count: usize) -> Vec<String> {
        let Ok(mut inner) = self.inner.lock() else {
            return Vec::new();
        };
        match inner.lists.get(list_key) {
            Some(entry) if entry.expires_at > Instant::now() => entry
                .values
                .iter()
                .skip(start)
                .take(count)
                .cloned()
                .collect(),
            Some(_) => {
                inner.lists.remove(list_key);
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// List unexpired keys (values and lists) starting with `prefix`.
    pub fn keys_by_prefix(&self, prefix: &str) -> Vec<String> {
        let Ok(inner) = self.inner.lock() else {
            return Vec::new();
        };
        let now = Instant::now();
        let values = inner
            .values
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.expires_at > now)
            .map(|(key, _)| key.clone());
        let lists = inner
            .lists
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.expires_at > now)
            .map(|(key, _)| key.clone());
        values.chain(lists).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get() {
        let backend = MemoryBackend::new();
        backend.put("k", "v", Duration::from_secs(10));
        assert_eq!(backend.get("k").as_deref(), Some("v"));
        assert!(backend.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value_and_ttl() {
        let backend = MemoryBackend::new();
        backend.put("k", "old", Duration::from_secs(10));
        backend.put("k", "new", Duration::from_secs(20));
        assert_eq!(backend.get("k").as_deref(), Some("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_value_is_absent() {
        let backend = MemoryBackend::new();
        backend.put("k", "v", Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(backend.get("k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_list_is_cleared_before_new_push() {
        let backend = MemoryBackend::new();
        backend.push_to_list("log", "stale", Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(6)).await;

        backend.push_to_list("log", "fresh", Duration::from_secs(5));
        assert_eq!(backend.range_list("log", 0, 10), vec!["fresh".to_string()]);
    }

    #[tokio::test]
    async fn test_range_list_pagination() {
        let backend = MemoryBackend::new();
        for value in ["a", "b", "c", "d"] {
            backend.push_to_list("log", value, Duration::from_secs(60));
        }

        assert_eq!(
            backend.range_list("log", 0, 2),
            vec!["d".to_string(), "c".to_string()]
        );
        assert_eq!(
            backend.range_list("log", 2, 2),
            vec!["b".to_string(), "a".to_string()]
        );
        assert!(backend.range_list("log", 4, 2).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_by_prefix_skips_expired() {
        let backend = MemoryBackend::new();
        backend.put("session:a:state", "{}", Duration::from_secs(5));
        backend.put("session:b:state", "{}", Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(
            backend.keys_by_prefix("session:"),
            vec!["session:b:state".to_string()]
        );
    }
}
