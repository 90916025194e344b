//! Room-scoped event fan-out.
//!
//! The [`BroadcastRouter`] is an explicit registry mapping (session,
//! scope) to subscriber sets - no string-concatenated channel names. Each
//! session owns three logical channels: all participants, moderators, and
//! one direct channel per connected participant.
//!
//! # Delivery guarantees
//!
//! - A publish to one session reaches only that session's subscribers.
//! - Delivery order within one channel preserves publish order (publishes
//!   for one session are issued by its single session actor).
//! - Per-subscriber queues are bounded and fed with `try_send`: a slow or
//!   disconnected subscriber drops its own deliveries, never anyone
//!   else's. Drops are counted and logged.

use common::types::{ParticipantId, Severity, SessionId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::moderation::ContentFlag;
use common::types::ModerationAction;

/// Size of each subscriber's delivery queue.
pub const SUBSCRIBER_QUEUE_SIZE: usize = 64;

/// Delivery scope for a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every subscribed participant of the session.
    Session,
    /// Only subscribers registered as moderators.
    Moderators,
    /// A single participant's direct channel.
    Participant(ParticipantId),
}

/// Why a participant left the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveReason {
    Voluntary,
    Kicked,
    Banned,
    Disconnected,
    SessionEnded,
}

/// Events delivered to the connection layer.
///
/// Serialized with a `type` tag so the transport can frame them without
/// knowing their shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// A chat message cleared for room delivery.
    ChatMessage {
        participant_id: ParticipantId,
        alias: String,
        content: String,
        timestamp: i64,
    },
    ParticipantJoined {
        participant_id: ParticipantId,
        alias: String,
    },
    ParticipantLeft {
        participant_id: ParticipantId,
        reason: LeaveReason,
    },
    /// The participant's audio turn ended (including on disconnect).
    SpeakingEnded {
        participant_id: ParticipantId,
    },
    HandRaised {
        participant_id: ParticipantId,
        raised: bool,
    },
    /// A moderator muted or unmuted a participant (enforced).
    MutedByModerator {
        participant_id: ParticipantId,
        muted: bool,
    },
    /// Direct notice to the target of an enforced mute.
    ForceMuted {
        muted: bool,
    },
    /// Direct notice: the receiver was removed from the session.
    Removed {
        reason: LeaveReason,
    },
    /// Direct notice: the sender's message was blocked from delivery.
    MessageBlocked {
        reason: String,
    },
    /// Supportive-but-firm room-wide warning.
    RoomWarning {
        message: String,
    },
    /// Supportive auto-response broadcast during an intervention.
    SupportiveMessage {
        message: String,
    },
    /// The session was paused by an escalation protocol.
    SessionPaused {
        reason: String,
    },
    SessionEnded {
        reason: String,
    },
    /// Moderator-only: flagged content with full context.
    ModeratorAlert {
        participant_id: ParticipantId,
        alias: String,
        severity: Severity,
        action: ModerationAction,
        flags: Vec<ContentFlag>,
        content: String,
    },
    /// Moderator-only: the crisis-intervention sequence fired.
    CrisisTriggered {
        participant_id: ParticipantId,
        alias: String,
    },
    /// Direct to the flagged participant: crisis resources.
    CrisisResources {
        message: String,
        resources: Vec<String>,
    },
    /// Moderator-only: a participant filed an emergency report.
    EmergencyAlertRaised {
        alert_id: common::types::AlertId,
        reporter: ParticipantId,
        alert_type: String,
        message: String,
        severity: Severity,
    },
    /// Direct to the reporter: the report was received.
    EmergencyAcknowledged {
        alert_id: common::types::AlertId,
        message: String,
    },
    /// Direct confirmation of a voice-settings update.
    VoiceSettingsUpdated {
        participant_id: ParticipantId,
    },
}

struct RoomSubscriber {
    tx: mpsc::Sender<OutboundEvent>,
    moderator: bool,
    /// Distinguishes a replaced subscription from the one a guard owns.
    token: u64,
}

#[derive(Default)]
struct Room {
    members: DashMap<ParticipantId, RoomSubscriber>,
}

struct RouterInner {
    rooms: DashMap<SessionId, Arc<Room>>,
    next_token: AtomicU64,
    dropped_events: AtomicU64,
}

/// Registry of (session, scope) subscriber sets.
///
/// Thread-safe and cheaply cloneable; clones share the registry.
#[derive(Clone)]
pub struct BroadcastRouter {
    inner: Arc<RouterInner>,
}

impl Default for BroadcastRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RouterInner {
                rooms: DashMap::new(),
                next_token: AtomicU64::new(1),
                dropped_events: AtomicU64::new(0),
            }),
        }
    }

    /// Register a participant's delivery queue for a session.
    ///
    /// Re-subscribing the same participant replaces the previous queue
    /// (reconnect); the stale guard becomes a no-op.
    pub fn subscribe(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
        moderator: bool,
    ) -> (Subscription, mpsc::Receiver<OutboundEvent>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_SIZE);
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);

        let room = self
            .inner
            .rooms
            .entry(session_id)
            .or_default()
            .clone();
        room.members.insert(
            participant_id,
            RoomSubscriber {
                tx,
                moderator,
                token,
            },
        );

        debug!(
            target: "sc.broadcast",
            session_id = %session_id,
            participant_id = %participant_id,
            moderator = moderator,
            "Subscriber registered"
        );

        (
            Subscription {
                inner: Arc::clone(&self.inner),
                session_id,
                participant_id,
                token,
            },
            rx,
        )
    }

    /// Deliver an event to the given scope of one session.
    ///
    /// Returns the number of queues the event was placed on. An empty
    /// scope (no moderators online, departed participant) delivers zero
    /// and is not an error.
    pub fn publish(&self, session_id: &SessionId, scope: &Scope, event: &OutboundEvent) -> usize {
        let Some(room) = self.inner.rooms.get(session_id).map(|r| Arc::clone(&r)) else {
            return 0;
        };

        let mut delivered = 0;
        match scope {
            Scope::Session => {
                for entry in room.members.iter() {
                    if self.offer(entry.value(), event) {
                        delivered += 1;
                    }
                }
            }
            Scope::Moderators => {
                for entry in room.members.iter() {
                    if entry.value().moderator && self.offer(entry.value(), event) {
                        delivered += 1;
                    }
                }
            }
            Scope::Participant(participant_id) => {
                if let Some(subscriber) = room.members.get(participant_id) {
                    if self.offer(subscriber.value(), event) {
                        delivered += 1;
                    }
                }
            }
        }
        delivered
    }

    /// Number of subscribers currently registered for a session.
    #[must_use]
    pub fn subscriber_count(&self, session_id: &SessionId) -> usize {
        self.inner
            .rooms
            .get(session_id)
            .map_or(0, |room| room.members.len())
    }

    /// Remove a whole session's registry entry (session end).
    pub fn drop_session(&self, session_id: &SessionId) {
        self.inner.rooms.remove(session_id);
    }

    /// Total events dropped to full or closed subscriber queues.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped_events.load(Ordering::Relaxed)
    }

    /// Non-blocking enqueue onto one subscriber's queue.
    fn offer(&self, subscriber: &RoomSubscriber, event: &OutboundEvent) -> bool {
        match subscriber.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.inner.dropped_events.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: "sc.broadcast",
                    "Subscriber queue full, event dropped for that subscriber"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.inner.dropped_events.fetch_add(1, Ordering::Relaxed);
                debug!(
                    target: "sc.broadcast",
                    "Subscriber queue closed (receiver gone)"
                );
                false
            }
        }
    }

    fn unsubscribe(inner: &RouterInner, session_id: &SessionId, participant_id: &ParticipantId, token: u64) {
        let Some(room) = inner.rooms.get(session_id).map(|r| Arc::clone(&r)) else {
            return;
        };
        // Only remove the entry this guard created; a reconnect may have
        // replaced it already.
        room.members
            .remove_if(participant_id, |_, subscriber| subscriber.token == token);
        if room.members.is_empty() {
            inner
                .rooms
                .remove_if(session_id, |_, room| room.members.is_empty());
        }
    }
}

/// Guard for one subscription; unregisters on drop.
pub struct Subscription {
    inner: Arc<RouterInner>,
    session_id: SessionId,
    participant_id: ParticipantId,
    token: u64,
}

impl Subscription {
    /// The subscribed participant.
    #[must_use]
    pub fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        BroadcastRouter::unsubscribe(
            &self.inner,
            &self.session_id,
            &self.participant_id,
            self.token,
        );
    }
}
