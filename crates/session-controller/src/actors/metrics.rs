//! Actor metrics and mailbox monitoring.
//!
//! Provides mailbox depth monitoring with configurable thresholds:
//!
//! | Actor Type | Normal | Warning |
//! |------------|--------|---------|
//! | Directory  | < 200  | >= 200  |
//! | Session    | < 100  | >= 100  |
//!
//! All metrics are emitted with the `sc_` prefix.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Mailbox depth warning threshold for the directory actor.
pub const DIRECTORY_MAILBOX_WARNING: usize = 200;

/// Mailbox depth warning threshold for session actors.
pub const SESSION_MAILBOX_WARNING: usize = 100;

/// Actor type for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// `SessionDirectoryActor` (singleton).
    Directory,
    /// `SessionActor` (one per live session).
    Session,
}

impl ActorType {
    /// Returns the actor type as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Directory => "directory",
            ActorType::Session => "session",
        }
    }

    /// Returns the warning threshold for this actor type.
    #[must_use]
    pub const fn warning_threshold(&self) -> usize {
        match self {
            ActorType::Directory => DIRECTORY_MAILBOX_WARNING,
            ActorType::Session => SESSION_MAILBOX_WARNING,
        }
    }
}

/// Mailbox monitor for tracking queue depth.
#[derive(Debug)]
pub struct MailboxMonitor {
    /// Actor type for labeling.
    actor_type: ActorType,
    /// Actor identifier (session id, instance id).
    actor_id: String,
    /// Current mailbox depth.
    depth: AtomicUsize,
    /// Total messages processed.
    messages_processed: AtomicU64,
    /// Whether the warning threshold was already logged for this spike.
    warned: std::sync::atomic::AtomicBool,
}

impl MailboxMonitor {
    /// Create a new mailbox monitor for the given actor.
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
            warned: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Record a message being added to the mailbox.
    pub fn record_enqueue(&self) {
        let new_depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!(
            "sc_actor_mailbox_depth",
            "actor_type" => self.actor_type.as_str()
        )
        .set(usize_to_f64(new_depth));

        if new_depth >= self.actor_type.warning_threshold()
            && !self.warned.swap(true, Ordering::Relaxed)
        {
            warn!(
                target: "sc.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = new_depth,
                "Mailbox depth above warning threshold"
            );
        }
    }

    /// Record a message being processed.
    pub fn record_dequeue(&self) {
        let prev = self.depth.fetch_sub(1, Ordering::Relaxed);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        if prev.saturating_sub(1) < self.actor_type.warning_threshold() {
            self.warned.store(false, Ordering::Relaxed);
        }
    }

    /// Current mailbox depth.
    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Total messages processed.
    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }
}

fn usize_to_f64(value: usize) -> f64 {
    u32::try_from(value).map_or(f64::MAX, f64::from)
}

/// Live counters reported by the coordinator for health and heartbeats.
///
/// This struct is shared between the actor system (which updates values)
/// and the health surface (which reads them).
#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
    sessions: AtomicU32,
    participants: AtomicU32,
    moderation_analyses: AtomicU64,
    actor_panics: AtomicU32,
}

/// Point-in-time snapshot of [`CoordinatorMetrics`].
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorMetricsSnapshot {
    pub sessions: u32,
    pub participants: u32,
    pub moderation_analyses: u64,
    pub actor_panics: u32,
}

impl CoordinatorMetrics {
    /// Create shared metrics.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Increment the live session count.
    pub fn increment_sessions(&self) {
        let value = self.sessions.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!("sc_sessions_active").set(f64::from(value));
    }

    /// Decrement the live session count.
    pub fn decrement_sessions(&self) {
        let value = self.sessions.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        metrics::gauge!("sc_sessions_active").set(f64::from(value));
    }

    /// Increment the connected participant count.
    pub fn increment_participants(&self) {
        let value = self.participants.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!("sc_participants_connected").set(f64::from(value));
    }

    /// Decrement the connected participant count.
    pub fn decrement_participants(&self) {
        let value = self
            .participants
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        metrics::gauge!("sc_participants_connected").set(f64::from(value));
    }

    /// Record one completed moderation analysis.
    pub fn record_moderation_analysis(&self, severity: &'static str) {
        self.moderation_analyses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sc_moderation_analyses_total", "severity" => severity).increment(1);
    }

    /// Record a panicked actor task.
    pub fn record_panic(&self, actor_type: ActorType) {
        self.actor_panics.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("sc_actor_panics_total", "actor_type" => actor_type.as_str())
            .increment(1);
    }

    /// Current counter values.
    #[must_use]
    pub fn snapshot(&self) -> CoordinatorMetricsSnapshot {
        CoordinatorMetricsSnapshot {
            sessions: self.sessions.load(Ordering::Relaxed),
            participants: self.participants.load(Ordering::Relaxed),
            moderation_analyses: self.moderation_analyses.load(Ordering::Relaxed),
            actor_panics: self.actor_panics.load(Ordering::Relaxed),
        }
    }
}
