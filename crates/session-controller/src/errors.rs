//! Session Controller error types.
//!
//! Error types map to connection-layer `ErrorCode` values for client
//! responses. Internal details are logged server-side but not exposed to
//! clients.

use thiserror::Error;

/// Session Controller error type.
///
/// Maps to connection-layer `ErrorCode` values:
/// - `PermissionDenied`: `FORBIDDEN` (3)
/// - `SessionNotFound`, `ParticipantNotFound`: `NOT_FOUND` (4)
/// - `Conflict`, `Validation`: `CONFLICT` (5)
/// - `Store`, `Classifier`, `Synthesis`, `Config`, `Internal`: `INTERNAL_ERROR` (6)
/// - `SessionCapacityExceeded`, `ControllerCapacityExceeded`, `Draining`: `CAPACITY_EXCEEDED` (7)
#[derive(Debug, Error)]
pub enum ScError {
    /// State store operation failed on both backends.
    #[error("Store error: {0}")]
    Store(String),

    /// State store is reachable only through the degraded in-process
    /// backend and the caller required shared state.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Semantic classifier call failed (recovered by rule-stage fallback;
    /// surfaces only in logs and classifier-specific paths).
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// Voice synthesis provider call failed.
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session not found.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Participant not found in the session roster.
    #[error("Participant not found: {0}")]
    ParticipantNotFound(String),

    /// Session is at participant capacity.
    #[error("Session at capacity: {0}")]
    SessionCapacityExceeded(String),

    /// Controller is at session capacity (load shedding).
    #[error("Controller at capacity")]
    ControllerCapacityExceeded,

    /// Controller is draining (graceful shutdown).
    #[error("Controller is draining")]
    Draining,

    /// Conflict (e.g., session already exists).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request rejected by validation (structured reason, no retry).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Caller lacks moderator/host authority for the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScError {
    /// Returns the connection-layer `ErrorCode` value for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            ScError::Store(_)
            | ScError::StoreUnavailable(_)
            | ScError::Classifier(_)
            | ScError::Synthesis(_)
            | ScError::Config(_)
            | ScError::Internal(_) => 6, // INTERNAL_ERROR
            ScError::PermissionDenied(_) => 3, // FORBIDDEN
            ScError::SessionNotFound(_) | ScError::ParticipantNotFound(_) => 4, // NOT_FOUND
            ScError::Conflict(_) | ScError::Validation(_) => 5, // CONFLICT
            ScError::SessionCapacityExceeded(_)
            | ScError::ControllerCapacityExceeded
            | ScError::Draining => 7, // CAPACITY_EXCEEDED
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            ScError::Store(_)
            | ScError::StoreUnavailable(_)
            | ScError::Classifier(_)
            | ScError::Synthesis(_)
            | ScError::Config(_)
            | ScError::Internal(_) => "An internal error occurred".to_string(),
            ScError::SessionNotFound(_) => "Session not found".to_string(),
            ScError::ParticipantNotFound(_) => "Participant not found".to_string(),
            ScError::SessionCapacityExceeded(_) => "Session is at capacity".to_string(),
            ScError::ControllerCapacityExceeded => {
                "Server is at capacity, please try again".to_string()
            }
            ScError::Draining => "Server is shutting down, please reconnect".to_string(),
            ScError::Conflict(msg) | ScError::Validation(msg) | ScError::PermissionDenied(msg) => {
                msg.clone()
            }
        }
    }
}
