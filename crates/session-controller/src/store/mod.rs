//! TTL-bounded shared state store.
//!
//! The [`StateStore`] is the single source of truth for durable session
//! state across controller instances. It exposes a small key/value + list
//! contract where every write carries its own TTL; nothing is retained
//! indefinitely.
//!
//! # Backends
//!
//! Two backends sit behind one contract:
//!
//! - [`redis::RedisBackend`] — the networked backend, shared across
//!   instances. Connections are cheap clones of a `MultiplexedConnection`.
//! - [`memory::MemoryBackend`] — an in-process map with identical
//!   semantics, except state is lost on restart and not shared.
//!
//! When a Redis operation fails the store transparently serves the request
//! from the in-process backend and flips into degraded mode. Degradation
//! is surfaced through [`StateStore::health_check`] and the readiness
//! endpoint; it is never hidden from operators. The next successful Redis
//! operation (including the health-check ping) flips the store back.
//!
//! # Key Patterns
//!
//! - `session:{id}:state` - Live session snapshot (JSON)
//! - `session:{id}:moderation` - Moderation event log (LIST, newest first)
//! - `session:{id}:alerts` - Emergency alerts (LIST, newest first)
//! - `participant:{id}:voice` - Transient voice settings (JSON)

pub mod memory;
pub mod redis;

use crate::errors::ScError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use memory::MemoryBackend;
use redis::RedisBackend;

/// Retention windows for stored state. Design constants, not configuration.
pub mod retention {
    use std::time::Duration;

    /// Live session snapshot: 24 hours.
    pub const SESSION_STATE: Duration = Duration::from_secs(24 * 60 * 60);

    /// Per-participant transient config (voice settings): 1 hour.
    pub const PARTICIPANT_CONFIG: Duration = Duration::from_secs(60 * 60);

    /// Moderation log entries: 7 days.
    pub const MODERATION_LOG: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    /// Emergency alerts: 30 days. Crisis records must survive session
    /// teardown for review.
    pub const EMERGENCY_ALERTS: Duration = Duration::from_secs(30 * 24 * 60 * 60);
}

/// Key builders for the store's key patterns.
pub mod keys {
    use common::types::{ParticipantId, SessionId};

    /// Prefix shared by all session keys, used by `keys_by_prefix`.
    pub const SESSION_PREFIX: &str = "session:";

    /// Live session snapshot key.
    #[must_use]
    pub fn session_state(session_id: &SessionId) -> String {
        format!("session:{session_id}:state")
    }

    /// Moderation event log key.
    #[must_use]
    pub fn moderation_log(session_id: &SessionId) -> String {
        format!("session:{session_id}:moderation")
    }

    /// Emergency alert log key.
    #[must_use]
    pub fn emergency_alerts(session_id: &SessionId) -> String {
        format!("session:{session_id}:alerts")
    }

    /// Transient voice settings key.
    #[must_use]
    pub fn participant_voice(participant_id: &ParticipantId) -> String {
        format!("participant:{participant_id}:voice")
    }
}

/// Store health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    /// The networked backend is serving requests.
    Healthy,
    /// Requests are being served by the in-process fallback; state is
    /// process-local and lost on restart.
    Degraded,
}

/// Result of a [`StateStore::health_check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHealth {
    /// Healthy or degraded.
    pub status: StoreStatus,
    /// Which backend is currently serving requests.
    pub backend: &'static str,
}

/// TTL-bounded key/value + list store with a degraded in-process fallback.
///
/// Cheaply cloneable; clones share the fallback map and the degraded flag.
#[derive(Clone)]
pub struct StateStore {
    /// Networked backend, absent when the initial connection failed.
    redis: Option<RedisBackend>,
    /// In-process fallback, always available.
    memory: MemoryBackend,
    /// Whether the last Redis operation failed.
    degraded: Arc<AtomicBool>,
}

impl StateStore {
    /// Connect to the networked backend.
    ///
    /// Never fails: if the backend is unreachable at startup the store
    /// comes up degraded on the in-process backend and keeps probing Redis
    /// through `health_check`.
    pub async fn connect(redis_url: &str) -> Self {
        match RedisBackend::connect(redis_url).await {
            Ok(backend) => {
                info!(target: "sc.store", "Connected to Redis backend");
                Self {
                    redis: Some(backend),
                    memory: MemoryBackend::new(),
                    degraded: Arc::new(AtomicBool::new(false)),
                }
            }
            Err(e) => {
                warn!(
                    target: "sc.store",
                    error = %e,
                    "Redis unreachable at startup, serving from in-process fallback"
                );
                Self {
                    redis: None,
                    memory: MemoryBackend::new(),
                    degraded: Arc::new(AtomicBool::new(true)),
                }
            }
        }
    }

    /// Create a store with no networked backend (tests, local runs).
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            redis: None,
            memory: MemoryBackend::new(),
            degraded: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Store a value under `key` with the given TTL.
    pub async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ScError> {
        if let Some(redis) = &self.redis {
            match redis.put(key, value, ttl).await {
                Ok(()) => {
                    self.mark_healthy();
                    return Ok(());
                }
                Err(e) => self.mark_degraded("put", &e),
            }
        }
        self.memory.put(key, value, ttl);
        Ok(())
    }

    /// Fetch the value under `key`, or `None` if absent or expired.
    pub async fn get(&self, key: &str) -> Result<Option<String>, ScError> {
        if let Some(redis) = &self.redis {
            match redis.get(key).await {
                Ok(value) => {
                    self.mark_healthy();
                    return Ok(value);
                }
                Err(e) => self.mark_degraded("get", &e),
            }
        }
        Ok(self.memory.get(key))
    }

    /// Push a value onto the front of the list under `list_key` and
    /// refresh the list's TTL. Lists are newest-first.
    pub async fn append_to_list(
        &self,
        list_key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), ScError> {
        if let Some(redis) = &self.redis {
            match redis.push_to_list(list_key, value, ttl).await {
                Ok(()) => {
                    self.mark_healthy();
                    return Ok(());
                }
                Err(e) => self.mark_degraded("append_to_list", &e),
            }
        }
        self.memory.push_to_list(list_key, value, ttl);
        Ok(())
    }

    /// Read `count` entries from the list under `list_key` starting at
    /// `start` (0 = most recent).
    pub async fn range_list(
        &self,
        list_key: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<String>, ScError> {
        if let Some(redis) = &self.redis {
            match redis.range_list(list_key, start, count).await {
                Ok(values) => {
                    self.mark_healthy();
                    return Ok(values);
                }
                Err(e) => self.mark_degraded("range_list", &e),
            }
        }
        Ok(self.memory.range_list(list_key, start, count))
    }

    /// List all keys starting with `prefix`.
    ///
    /// Admin/debug surface (session listing), not a hot path.
    pub async fn keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, ScError> {
        if let Some(redis) = &self.redis {
            match redis.keys_by_prefix(prefix).await {
                Ok(keys) => {
                    self.mark_healthy();
                    return Ok(keys);
                }
                Err(e) => self.mark_degraded("keys_by_prefix", &e),
            }
        }
        Ok(self.memory.keys_by_prefix(prefix))
    }

    /// Report which backend is serving requests.
    ///
    /// Actively pings the networked backend so a recovered Redis flips the
    /// store back to healthy without waiting for the next data operation.
    pub async fn health_check(&self) -> StoreHealth {
        if let Some(redis) = &self.redis {
            match redis.ping().await {
                Ok(()) => self.mark_healthy(),
                Err(e) => self.mark_degraded("ping", &e),
            }
        }
        if self.is_degraded() {
            StoreHealth {
                status: StoreStatus::Degraded,
                backend: "memory",
            }
        } else {
            StoreHealth {
                status: StoreStatus::Healthy,
                backend: "redis",
            }
        }
    }

    /// Whether the store is currently serving from the in-process fallback.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Store a serializable value as JSON.
    pub async fn put_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), ScError> {
        let json = serde_json::to_string(value)
            .map_err(|e| ScError::Internal(format!("serialization failed: {e}")))?;
        self.put(key, &json, ttl).await
    }

    /// Fetch and deserialize a JSON value.
    ///
    /// A stored value that no longer parses is treated as absent and
    /// logged; callers must handle absence anyway.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ScError> {
        match self.get(key).await? {
            Some(json) => match serde_json::from_str(&json) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!(
                        target: "sc.store",
                        key = %key,
                        error = %e,
                        "Stored value failed to deserialize, treating as absent"
                    );
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Append a serializable value to a list as JSON.
    pub async fn append_json<T: Serialize>(
        &self,
        list_key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), ScError> {
        let json = serde_json::to_string(value)
            .map_err(|e| ScError::Internal(format!("serialization failed: {e}")))?;
        self.append_to_list(list_key, &json, ttl).await
    }

    fn mark_healthy(&self) {
        if self.degraded.swap(false, Ordering::SeqCst) {
            info!(target: "sc.store", "Redis backend recovered, leaving degraded mode");
        }
    }

    fn mark_degraded(&self, operation: &str, error: &ScError) {
        if self.degraded.swap(true, Ordering::SeqCst) {
            debug!(
                target: "sc.store",
                operation = %operation,
                error = %error,
                "Redis operation failed while degraded"
            );
        } else {
            warn!(
                target: "sc.store",
                operation = %operation,
                error = %error,
                "Redis operation failed, entering degraded mode (in-process fallback)"
            );
        }
    }
}
