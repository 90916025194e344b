//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via
//! `tokio::sync::mpsc`. Response patterns use `tokio::sync::oneshot` for
//! request-reply semantics.
//!
//! [`SessionMessage`] is the single typed inbound-event surface consumed
//! by a session actor; the connection layer translates transport frames
//! into these variants and nothing else.

use crate::broadcast::OutboundEvent;
use crate::errors::ScError;
use crate::moderation::Verdict;
use crate::voice::VoiceSettings;
use common::types::{
    AlertId, ConnectionStatus, ParticipantId, SessionId, SessionStatus, Severity,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

/// Messages sent to the `SessionDirectoryActor`.
#[derive(Debug)]
pub enum DirectoryMessage {
    /// Create a new session actor.
    CreateSession {
        params: CreateSessionParams,
        /// Response channel for the created session's info or error.
        respond_to: oneshot::Sender<Result<SessionInfo, ScError>>,
    },

    /// Get a handle to a session actor, rehydrating from the store when
    /// another instance owns the in-memory copy.
    GetSession {
        session_id: SessionId,
        /// Response channel for the session handle or error.
        respond_to: oneshot::Sender<Result<crate::actors::session::SessionActorHandle, ScError>>,
    },

    /// Remove a session (after it ended or emptied out).
    RemoveSession {
        session_id: SessionId,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    /// Get current status (for health checks).
    GetStatus {
        /// Response channel for directory status.
        respond_to: oneshot::Sender<DirectoryStatus>,
    },

    /// Initiate graceful shutdown (SIGTERM received).
    Shutdown {
        /// Deadline for shutdown.
        deadline: std::time::Duration,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },
}

/// Messages sent to a `SessionActor`.
///
/// This is the inbound event sum type: join, leave, send-message,
/// raise/lower-hand, mute/kick/ban, emergency-report,
/// voice-settings-update, plus internal coordination variants.
#[derive(Debug)]
pub enum SessionMessage {
    /// A participant joins (idempotent on participant id).
    Join {
        participant_id: ParticipantId,
        alias: String,
        is_host: bool,
        is_moderator: bool,
        /// Response channel for the join result.
        respond_to: oneshot::Sender<Result<JoinResult, ScError>>,
    },

    /// A participant leaves explicitly.
    Leave {
        participant_id: ParticipantId,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    /// A participant's transport dropped. Roster removal and the
    /// "speaking ended" broadcast fire deterministically, even with
    /// moderation analysis still in flight.
    Disconnected { participant_id: ParticipantId },

    /// A chat message or voice-transcript fragment for moderation and
    /// room delivery.
    SendMessage {
        participant_id: ParticipantId,
        content: String,
        /// Acknowledges acceptance; delivery is decided by moderation.
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    /// Raise or lower a hand.
    RaiseHand {
        participant_id: ParticipantId,
        raised: bool,
    },

    /// Moderator-enforced mute/unmute.
    SetMuted {
        requested_by: ParticipantId,
        target: ParticipantId,
        muted: bool,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    /// Moderator removes a participant from the session.
    Kick {
        requested_by: ParticipantId,
        target: ParticipantId,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    /// Moderator removes a participant and bars rejoining.
    Ban {
        requested_by: ParticipantId,
        target: ParticipantId,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    /// A participant files an emergency report.
    EmergencyReport {
        reporter: ParticipantId,
        alert_type: String,
        message: String,
        /// Response channel for the created alert id.
        respond_to: oneshot::Sender<Result<AlertId, ScError>>,
    },

    /// Update the participant's transient voice settings.
    UpdateVoiceSettings {
        participant_id: ParticipantId,
        settings: VoiceSettings,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    /// A participant started or stopped speaking (accumulates speaking
    /// time; stop broadcasts "speaking ended").
    SpeakingChanged {
        participant_id: ParticipantId,
        speaking: bool,
    },

    /// Get the current session view (for moderators and health).
    GetState {
        /// Response channel for the session view.
        respond_to: oneshot::Sender<SessionView>,
    },

    /// Moderator view of the newest moderation-log entries.
    GetModerationLog {
        requested_by: ParticipantId,
        limit: usize,
        /// Response channel for the raw log entries (newest first).
        respond_to: oneshot::Sender<Result<Vec<String>, ScError>>,
    },

    /// End the session (host or system).
    End {
        reason: String,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    /// Internal: a spawned moderation analysis completed.
    ModerationVerdict {
        participant_id: ParticipantId,
        content: String,
        verdict: Verdict,
    },
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Moderation sensitivity level for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    /// Only medium-or-worse verdicts trigger actions.
    Relaxed,
    /// Low-or-worse verdicts trigger actions.
    #[default]
    Standard,
    /// Every verdict's action is honored.
    Strict,
}

impl Sensitivity {
    /// Minimum severity at which a verdict's action is dispatched.
    #[must_use]
    pub fn action_threshold(&self) -> Severity {
        match self {
            Sensitivity::Relaxed => Severity::Medium,
            Sensitivity::Standard => Severity::Low,
            Sensitivity::Strict => Severity::None,
        }
    }
}

/// Per-session moderation configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationSettings {
    /// Whether content moderation runs at all.
    pub enabled: bool,
    /// Sensitivity level gating which verdicts act.
    pub sensitivity: Sensitivity,
    /// Whether the AI stage may run.
    pub ai_monitoring: bool,
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sensitivity: Sensitivity::Standard,
            ai_monitoring: true,
        }
    }
}

/// Public roster entry for one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub participant_id: ParticipantId,
    pub alias: String,
    pub is_host: bool,
    pub is_moderator: bool,
    pub is_muted: bool,
    pub is_blocked: bool,
    pub hand_raised: bool,
    pub status: ConnectionStatus,
    /// Accumulated speaking time in seconds.
    pub speaking_seconds: u64,
    /// Number of times this participant's content was flagged.
    pub flagged_count: u32,
}

/// The authoritative session snapshot, persisted to the state store with
/// a 24h TTL on every mutating event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub topic: String,
    pub host_id: ParticipantId,
    pub status: SessionStatus,
    pub participants: Vec<ParticipantInfo>,
    /// Always equals `participants.len()`.
    pub current_participants: usize,
    pub moderation: ModerationSettings,
    /// Unix timestamp (seconds).
    pub created_at: i64,
    /// Unix timestamp (seconds); the session self-expires at this point.
    pub expires_at: i64,
}

/// Session view returned by `GetState`.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub snapshot: SessionSnapshot,
    pub mailbox_depth: usize,
    pub is_shutting_down: bool,
}

/// Result of a successful join.
#[derive(Debug)]
pub struct JoinResult {
    /// The joining participant's roster entry.
    pub participant: ParticipantInfo,
    /// Whether this was an idempotent rejoin of a present participant.
    pub rejoined: bool,
    /// The rest of the roster at join time.
    pub roster: Vec<ParticipantInfo>,
    /// The participant's delivery queue; the connection layer drains it.
    pub events: mpsc::Receiver<OutboundEvent>,
}

/// Parameters for creating a session.
#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    /// Explicit id, or a fresh one when absent.
    pub session_id: Option<SessionId>,
    pub topic: String,
    pub host_id: ParticipantId,
    pub moderation: ModerationSettings,
}

/// Information about a session returned by the directory.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub topic: String,
    pub participant_count: usize,
    /// Unix timestamp (seconds).
    pub created_at: i64,
}

/// Directory status for health checks.
#[derive(Debug, Clone)]
pub struct DirectoryStatus {
    pub active_sessions: usize,
    pub total_participants: usize,
    pub accepting_new: bool,
}
