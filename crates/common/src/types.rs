//! Common data types for Sanctuary components.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a live session (one sanctuary room).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub Uuid);

impl ParticipantId {
    /// Create a new random participant ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an emergency alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(pub Uuid);

impl AlertId {
    /// Create a new random alert ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AlertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content severity, totally ordered.
///
/// The derived `Ord` follows declaration order:
/// `None < Low < Medium < High < Critical`. Severity comparisons across
/// the moderation pipeline rely on this structural order; there is no
/// separate ranking table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// No concerning content detected.
    #[default]
    None,
    /// Mildly inappropriate content.
    Low,
    /// Content that warrants filtering.
    Medium,
    /// Content requiring human attention.
    High,
    /// Content requiring immediate intervention.
    Critical,
}

impl Severity {
    /// Returns the severity as a string for metric labels and log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Action recommended by the moderation pipeline for one piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    /// Deliver normally.
    #[default]
    None,
    /// Block the content from room delivery and notify the sender.
    AutoFilter,
    /// Deliver, but warn the room and track the sender.
    WarnAndMonitor,
    /// Notify moderators and run the escalation protocol.
    ImmediateIntervention,
}

impl ModerationAction {
    /// Returns the action as a string for metric labels and log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ModerationAction::None => "none",
            ModerationAction::AutoFilter => "auto_filter",
            ModerationAction::WarnAndMonitor => "warn_and_monitor",
            ModerationAction::ImmediateIntervention => "immediate_intervention",
        }
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created but not yet live.
    Scheduled,
    /// Accepting participants.
    Live,
    /// Ended; retained only until its store key expires.
    Ended,
}

/// Connection status of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Transport established, receiving events.
    Connected,
    /// Transport handshake in progress.
    Connecting,
    /// Transport dropped.
    Disconnected,
    /// Attempting to re-establish transport.
    Reconnecting,
}
