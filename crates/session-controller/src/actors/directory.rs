//! `SessionDirectoryActor` - singleton supervisor for session actors.
//!
//! The directory is the top-level actor in the controller hierarchy:
//!
//! - Singleton per controller instance
//! - Supervises N `SessionActor` instances
//! - Handles session creation/lookup/removal
//! - Owns the root `CancellationToken` for graceful shutdown
//! - Monitors child actor health (panic detection via `JoinHandle`)
//!
//! # Store reconciliation
//!
//! The in-memory session map is advisory; the state store is the source
//! of truth across instances. Creation refuses ids whose stored snapshot
//! is still live elsewhere, and lookups that miss in memory rehydrate
//! the actor from the stored snapshot when one exists.

use crate::errors::ScError;
use crate::store::keys;

use super::messages::{CreateSessionParams, DirectoryMessage, DirectoryStatus, SessionInfo, SessionSnapshot};
use super::metrics::{ActorType, MailboxMonitor};
use super::session::{SessionActor, SessionActorHandle, SessionDeps};

use common::types::{SessionId, SessionStatus};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the directory mailbox.
const DIRECTORY_CHANNEL_BUFFER: usize = 1000;

/// How often the directory reaps finished session tasks.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Capacity limits applied by the directory.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryLimits {
    /// Maximum concurrent live sessions.
    pub max_sessions: usize,
    /// Maximum participants per session.
    pub max_participants_per_session: usize,
}

/// Handle to the `SessionDirectoryActor`.
///
/// This is the public interface for interacting with the directory.
/// All methods are async and return results via oneshot channels.
#[derive(Clone)]
pub struct SessionDirectoryHandle {
    sender: mpsc::Sender<DirectoryMessage>,
    cancel_token: CancellationToken,
}

impl SessionDirectoryHandle {
    /// Create a new `SessionDirectoryActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    #[must_use]
    pub fn new(sc_id: String, limits: DirectoryLimits, deps: SessionDeps) -> Self {
        let (sender, receiver) = mpsc::channel(DIRECTORY_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = SessionDirectoryActor {
            sc_id,
            receiver,
            cancel_token: cancel_token.clone(),
            sessions: HashMap::new(),
            accepting_new: true,
            limits,
            deps,
            mailbox: MailboxMonitor::new(ActorType::Directory, "directory"),
        };

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Create a new session.
    pub async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionInfo, ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DirectoryMessage::CreateSession {
                params,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get a handle to a session, rehydrating from the store if needed.
    pub async fn session(&self, session_id: SessionId) -> Result<SessionActorHandle, ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DirectoryMessage::GetSession {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Remove a session (after it ended or emptied out).
    pub async fn remove_session(&self, session_id: SessionId) -> Result<(), ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DirectoryMessage::RemoveSession {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get the current directory status.
    pub async fn status(&self) -> Result<DirectoryStatus, ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DirectoryMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))
    }

    /// Initiate graceful shutdown.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), ScError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(DirectoryMessage::Shutdown {
                deadline,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Internal state for a managed session.
struct ManagedSession {
    /// Handle to the session actor.
    handle: SessionActorHandle,
    /// Join handle for monitoring the actor task.
    task_handle: JoinHandle<()>,
}

/// The `SessionDirectoryActor` implementation.
pub struct SessionDirectoryActor {
    /// Controller instance ID.
    sc_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<DirectoryMessage>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    /// Managed sessions by ID.
    sessions: HashMap<SessionId, ManagedSession>,
    /// Whether the directory is accepting new sessions.
    accepting_new: bool,
    limits: DirectoryLimits,
    deps: SessionDeps,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
}

impl SessionDirectoryActor {
    /// Run the actor message loop.
    #[instrument(skip_all, name = "sc.actor.directory", fields(sc_id = %self.sc_id))]
    async fn run(mut self) {
        info!(
            target: "sc.actor.directory",
            sc_id = %self.sc_id,
            "SessionDirectoryActor started"
        );

        let mut health_check = tokio::time::interval(HEALTH_CHECK_INTERVAL);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "sc.actor.directory",
                        "SessionDirectoryActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                _ = health_check.tick() => {
                    self.check_session_health().await;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                        }
                        None => {
                            info!(
                                target: "sc.actor.directory",
                                "SessionDirectoryActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "sc.actor.directory",
            sessions = self.sessions.len(),
            messages_processed = self.mailbox.messages_processed(),
            "SessionDirectoryActor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: DirectoryMessage) {
        match message {
            DirectoryMessage::CreateSession { params, respond_to } => {
                let result = self.create_session(params).await;
                let _ = respond_to.send(result);
            }

            DirectoryMessage::GetSession {
                session_id,
                respond_to,
            } => {
                let result = self.get_session(session_id).await;
                let _ = respond_to.send(result);
            }

            DirectoryMessage::RemoveSession {
                session_id,
                respond_to,
            } => {
                let result = self.remove_session(session_id).await;
                let _ = respond_to.send(result);
            }

            DirectoryMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.status());
            }

            DirectoryMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                let result = self.initiate_shutdown(deadline);
                let _ = respond_to.send(result);
            }
        }
    }

    /// Create a new session actor.
    #[instrument(skip_all, fields(sc_id = %self.sc_id))]
    async fn create_session(
        &mut self,
        params: CreateSessionParams,
    ) -> Result<SessionInfo, ScError> {
        if !self.accepting_new {
            return Err(ScError::Draining);
        }
        if self.sessions.len() >= self.limits.max_sessions {
            warn!(
                target: "sc.actor.directory",
                max_sessions = self.limits.max_sessions,
                "Session capacity reached, shedding create request"
            );
            return Err(ScError::ControllerCapacityExceeded);
        }
        if params.topic.trim().is_empty() {
            return Err(ScError::Validation("topic must not be empty".to_string()));
        }

        let session_id = params.session_id.unwrap_or_default();
        if self.sessions.contains_key(&session_id) {
            return Err(ScError::Conflict("Session already exists".to_string()));
        }

        // The store is authoritative across instances: refuse ids whose
        // snapshot is still live elsewhere.
        match self
            .deps
            .store
            .get_json::<SessionSnapshot>(&keys::session_state(&session_id))
            .await
        {
            Ok(Some(snapshot)) if snapshot.status == SessionStatus::Live => {
                return Err(ScError::Conflict(
                    "Session already exists".to_string(),
                ));
            }
            Ok(_) => {}
            Err(e) => {
                // Degraded store: local creation proceeds; the store
                // surfaces its own health state.
                debug!(
                    target: "sc.actor.directory",
                    error = %e,
                    "Store read failed during create, proceeding locally"
                );
            }
        }

        let (handle, task_handle) = SessionActor::spawn(
            session_id,
            params.topic.clone(),
            params.host_id,
            params.moderation,
            self.limits.max_participants_per_session,
            self.cancel_token.child_token(),
            self.deps.clone(),
        );

        let created_at = chrono::Utc::now().timestamp();
        self.sessions.insert(
            session_id,
            ManagedSession {
                handle,
                task_handle,
            },
        );
        self.deps.metrics.increment_sessions();

        info!(
            target: "sc.actor.directory",
            session_id = %session_id,
            active_sessions = self.sessions.len(),
            "Session created"
        );

        Ok(SessionInfo {
            session_id,
            topic: params.topic,
            participant_count: 0,
            created_at,
        })
    }

    /// Look up a session, rehydrating from the store on a memory miss.
    async fn get_session(&mut self, session_id: SessionId) -> Result<SessionActorHandle, ScError> {
        if let Some(managed) = self.sessions.get(&session_id) {
            return Ok(managed.handle.clone());
        }

        // Memory miss: reconcile against the store before answering
        // not-found. A missing snapshot means not-found, never
        // empty-but-valid.
        let snapshot = self
            .deps
            .store
            .get_json::<SessionSnapshot>(&keys::session_state(&session_id))
            .await?
            .ok_or_else(|| ScError::SessionNotFound(session_id.to_string()))?;

        if snapshot.status != SessionStatus::Live
            || chrono::Utc::now().timestamp() >= snapshot.expires_at
        {
            return Err(ScError::SessionNotFound(session_id.to_string()));
        }

        info!(
            target: "sc.actor.directory",
            session_id = %session_id,
            participants = snapshot.participants.len(),
            "Rehydrating session from store"
        );

        let (handle, task_handle) = SessionActor::rehydrate(
            &snapshot,
            self.limits.max_participants_per_session,
            self.cancel_token.child_token(),
            self.deps.clone(),
        );
        self.sessions.insert(
            session_id,
            ManagedSession {
                handle: handle.clone(),
                task_handle,
            },
        );
        self.deps.metrics.increment_sessions();

        Ok(handle)
    }

    /// Remove a session and wait briefly for its actor to stop.
    async fn remove_session(&mut self, session_id: SessionId) -> Result<(), ScError> {
        let Some(managed) = self.sessions.remove(&session_id) else {
            return Err(ScError::SessionNotFound(session_id.to_string()));
        };

        managed.handle.cancel();
        match tokio::time::timeout(Duration::from_secs(5), managed.task_handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if e.is_panic() {
                    error!(
                        target: "sc.actor.directory",
                        session_id = %session_id,
                        error = ?e,
                        "Session actor panicked during removal"
                    );
                    self.deps.metrics.record_panic(ActorType::Session);
                }
            }
            Err(_) => {
                warn!(
                    target: "sc.actor.directory",
                    session_id = %session_id,
                    "Session actor removal timed out"
                );
            }
        }
        self.deps.metrics.decrement_sessions();

        info!(
            target: "sc.actor.directory",
            session_id = %session_id,
            active_sessions = self.sessions.len(),
            "Session removed"
        );
        Ok(())
    }

    fn status(&self) -> DirectoryStatus {
        DirectoryStatus {
            active_sessions: self.sessions.len(),
            total_participants: self.deps.metrics.snapshot().participants as usize,
            accepting_new: self.accepting_new,
        }
    }

    fn initiate_shutdown(&mut self, _deadline: Duration) -> Result<(), ScError> {
        info!(
            target: "sc.actor.directory",
            sessions = self.sessions.len(),
            "Initiating graceful shutdown"
        );
        self.accepting_new = false;
        self.cancel_token.cancel();
        Ok(())
    }

    /// Reap session actors whose tasks have finished.
    async fn check_session_health(&mut self) {
        let finished: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(id, _)| *id)
            .collect();

        for session_id in finished {
            if let Some(managed) = self.sessions.remove(&session_id) {
                match managed.task_handle.await {
                    Ok(()) => {
                        debug!(
                            target: "sc.actor.directory",
                            session_id = %session_id,
                            "Session actor exited cleanly"
                        );
                    }
                    Err(join_error) => {
                        if join_error.is_panic() {
                            error!(
                                target: "sc.actor.directory",
                                session_id = %session_id,
                                error = ?join_error,
                                "Session actor panicked"
                            );
                            self.deps.metrics.record_panic(ActorType::Session);
                        }
                    }
                }
                self.deps.metrics.decrement_sessions();
            }
        }
    }

    /// Perform graceful shutdown: cancel children and wait for them.
    async fn graceful_shutdown(&mut self) {
        info!(
            target: "sc.actor.directory",
            sessions = self.sessions.len(),
            "Performing graceful shutdown"
        );

        self.accepting_new = false;

        for managed in self.sessions.values() {
            managed.handle.cancel();
        }

        for (session_id, managed) in self.sessions.drain() {
            match tokio::time::timeout(Duration::from_secs(5), managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "sc.actor.directory",
                        session_id = %session_id,
                        "Session completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "sc.actor.directory",
                        session_id = %session_id,
                        error = ?e,
                        "Session task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "sc.actor.directory",
                        session_id = %session_id,
                        "Session shutdown timed out"
                    );
                }
            }
        }

        info!(
            target: "sc.actor.directory",
            "Graceful shutdown complete"
        );
    }
}

