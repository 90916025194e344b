//! `SessionActor` - per-session actor that owns session state.
//!
//! Each `SessionActor`:
//! - Owns all state for one live session (roster, flags, counters)
//! - Serializes every mutation through its mailbox; sessions never share
//!   state except through the store
//! - Runs moderation analysis on spawned tasks (copy-then-release) and
//!   consumes the verdicts back through its own mailbox
//! - Synchronizes its snapshot into the state store on every mutating
//!   event (24h TTL)
//!
//! # Disconnect Handling
//!
//! A transport drop removes the participant from the roster and
//! broadcasts "speaking ended" deterministically, even when a moderation
//! analysis for that participant is still in flight. A verdict that
//! completes after the departure is logged (the pipeline persisted it)
//! but triggers no broadcast into the room.

use crate::broadcast::{LeaveReason, OutboundEvent, Scope, Subscription};
use crate::errors::ScError;
use crate::escalation::EscalationContext;
use crate::moderation::AnalysisContext;
use crate::store::{keys, retention, StateStore};
use crate::voice::VoiceSettings;

use super::messages::{
    JoinResult, ModerationSettings, ParticipantInfo, SessionMessage, SessionSnapshot, SessionView,
};
use super::metrics::{ActorType, CoordinatorMetrics, MailboxMonitor};

use common::types::{
    AlertId, ConnectionStatus, ModerationAction, ParticipantId, SessionId, SessionStatus,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the session mailbox.
const SESSION_CHANNEL_BUFFER: usize = 256;

/// Maximum accepted message length in bytes.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// How often the actor checks whether its snapshot TTL elapsed.
const EXPIRY_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Voice used for synthesized supportive responses.
const GUIDE_VOICE_SETTINGS: VoiceSettings = VoiceSettings {
    voice_id: String::new(),
    stability: 0.7,
    similarity_boost: 0.8,
    style: 0.15,
};

/// Shared collaborators handed to every session actor.
#[derive(Clone)]
pub struct SessionDeps {
    pub store: StateStore,
    pub pipeline: Arc<crate::moderation::ModerationPipeline>,
    pub escalation: crate::escalation::EscalationEngine,
    pub router: crate::broadcast::BroadcastRouter,
    pub synthesis: Arc<crate::voice::SynthesisClient>,
    pub metrics: Arc<CoordinatorMetrics>,
}

/// Handle to a `SessionActor`.
#[derive(Clone, Debug)]
pub struct SessionActorHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    session_id: SessionId,
}

impl SessionActorHandle {
    /// Get the session ID.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Join the session (idempotent on participant id).
    pub async fn join(
        &self,
        participant_id: ParticipantId,
        alias: String,
        is_host: bool,
        is_moderator: bool,
    ) -> Result<JoinResult, ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::Join {
                participant_id,
                alias,
                is_host,
                is_moderator,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Leave the session explicitly.
    pub async fn leave(&self, participant_id: ParticipantId) -> Result<(), ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::Leave {
                participant_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Notify of a transport drop.
    pub async fn disconnected(&self, participant_id: ParticipantId) -> Result<(), ScError> {
        self.sender
            .send(SessionMessage::Disconnected { participant_id })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))
    }

    /// Submit content for moderation and room delivery.
    pub async fn send_message(
        &self,
        participant_id: ParticipantId,
        content: String,
    ) -> Result<(), ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::SendMessage {
                participant_id,
                content,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Raise or lower a hand.
    pub async fn raise_hand(
        &self,
        participant_id: ParticipantId,
        raised: bool,
    ) -> Result<(), ScError> {
        self.sender
            .send(SessionMessage::RaiseHand {
                participant_id,
                raised,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))
    }

    /// Moderator-enforced mute/unmute.
    pub async fn set_muted(
        &self,
        requested_by: ParticipantId,
        target: ParticipantId,
        muted: bool,
    ) -> Result<(), ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::SetMuted {
                requested_by,
                target,
                muted,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Moderator removes a participant.
    pub async fn kick(
        &self,
        requested_by: ParticipantId,
        target: ParticipantId,
    ) -> Result<(), ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::Kick {
                requested_by,
                target,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Moderator removes a participant and bars rejoining.
    pub async fn ban(
        &self,
        requested_by: ParticipantId,
        target: ParticipantId,
    ) -> Result<(), ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::Ban {
                requested_by,
                target,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// File an emergency report.
    pub async fn emergency_report(
        &self,
        reporter: ParticipantId,
        alert_type: String,
        message: String,
    ) -> Result<AlertId, ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::EmergencyReport {
                reporter,
                alert_type,
                message,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Update transient voice settings.
    pub async fn update_voice_settings(
        &self,
        participant_id: ParticipantId,
        settings: VoiceSettings,
    ) -> Result<(), ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::UpdateVoiceSettings {
                participant_id,
                settings,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Report a speaking start/stop.
    pub async fn speaking_changed(
        &self,
        participant_id: ParticipantId,
        speaking: bool,
    ) -> Result<(), ScError> {
        self.sender
            .send(SessionMessage::SpeakingChanged {
                participant_id,
                speaking,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))
    }

    /// Moderator view of the newest moderation-log entries.
    pub async fn moderation_log(
        &self,
        requested_by: ParticipantId,
        limit: usize,
    ) -> Result<Vec<String>, ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::GetModerationLog {
                requested_by,
                limit,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get the current session view.
    pub async fn get_state(&self) -> Result<SessionView, ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::GetState { respond_to: tx })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))
    }

    /// End the session.
    pub async fn end(&self, reason: String) -> Result<(), ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::End {
                reason,
                respond_to: tx,
            })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the session actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Roster state for one participant.
#[derive(Debug)]
struct Participant {
    participant_id: ParticipantId,
    alias: String,
    is_host: bool,
    is_moderator: bool,
    is_muted: bool,
    is_blocked: bool,
    hand_raised: bool,
    status: ConnectionStatus,
    speaking_seconds: u64,
    /// Set while the participant holds the floor.
    speaking_since: Option<Instant>,
    flagged_count: u32,
}

impl Participant {
    fn to_info(&self) -> ParticipantInfo {
        ParticipantInfo {
            participant_id: self.participant_id,
            alias: self.alias.clone(),
            is_host: self.is_host,
            is_moderator: self.is_moderator,
            is_muted: self.is_muted,
            is_blocked: self.is_blocked,
            hand_raised: self.hand_raised,
            status: self.status,
            speaking_seconds: self.speaking_seconds,
            flagged_count: self.flagged_count,
        }
    }

    fn from_info(info: &ParticipantInfo) -> Self {
        Self {
            participant_id: info.participant_id,
            alias: info.alias.clone(),
            is_host: info.is_host,
            is_moderator: info.is_moderator,
            is_muted: info.is_muted,
            is_blocked: info.is_blocked,
            hand_raised: info.hand_raised,
            status: info.status,
            speaking_seconds: info.speaking_seconds,
            speaking_since: None,
            flagged_count: info.flagged_count,
        }
    }

    /// Whether this participant may issue moderator-authorized actions.
    fn can_moderate(&self) -> bool {
        self.is_host || self.is_moderator
    }
}

/// The `SessionActor` implementation.
pub struct SessionActor {
    session_id: SessionId,
    topic: String,
    host_id: ParticipantId,
    status: SessionStatus,
    moderation: ModerationSettings,
    /// Unix timestamps (seconds).
    created_at: i64,
    expires_at: i64,
    receiver: mpsc::Receiver<SessionMessage>,
    /// Cloned into moderation tasks so verdicts return to this mailbox.
    self_sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    participants: HashMap<ParticipantId, Participant>,
    /// Router subscription guards, keyed by participant.
    subscriptions: HashMap<ParticipantId, Subscription>,
    /// Banned participant ids; rejoins are refused.
    banned: HashSet<ParticipantId>,
    max_participants: usize,
    deps: SessionDeps,
    is_shutting_down: bool,
    mailbox: MailboxMonitor,
}

impl SessionActor {
    /// Spawn a new session actor for a freshly created session.
    pub fn spawn(
        session_id: SessionId,
        topic: String,
        host_id: ParticipantId,
        moderation: ModerationSettings,
        max_participants: usize,
        cancel_token: CancellationToken,
        deps: SessionDeps,
    ) -> (SessionActorHandle, JoinHandle<()>) {
        let created_at = chrono::Utc::now().timestamp();
        let expires_at =
            created_at.saturating_add(i64::try_from(retention::SESSION_STATE.as_secs()).unwrap_or(0));

        Self::spawn_inner(
            session_id,
            topic,
            host_id,
            SessionStatus::Live,
            moderation,
            created_at,
            expires_at,
            Vec::new(),
            max_participants,
            cancel_token,
            deps,
        )
    }

    /// Respawn a session actor from a stored snapshot (cross-instance
    /// takeover). Roster entries come back disconnected; participants
    /// re-establish their subscriptions by rejoining.
    pub fn rehydrate(
        snapshot: &SessionSnapshot,
        max_participants: usize,
        cancel_token: CancellationToken,
        deps: SessionDeps,
    ) -> (SessionActorHandle, JoinHandle<()>) {
        let roster = snapshot
            .participants
            .iter()
            .map(|info| {
                let mut info = info.clone();
                info.status = ConnectionStatus::Disconnected;
                info
            })
            .collect();

        Self::spawn_inner(
            snapshot.session_id,
            snapshot.topic.clone(),
            snapshot.host_id,
            snapshot.status,
            snapshot.moderation,
            snapshot.created_at,
            snapshot.expires_at,
            roster,
            max_participants,
            cancel_token,
            deps,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_inner(
        session_id: SessionId,
        topic: String,
        host_id: ParticipantId,
        status: SessionStatus,
        moderation: ModerationSettings,
        created_at: i64,
        expires_at: i64,
        roster: Vec<ParticipantInfo>,
        max_participants: usize,
        cancel_token: CancellationToken,
        deps: SessionDeps,
    ) -> (SessionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);

        let participants = roster
            .iter()
            .map(|info| (info.participant_id, Participant::from_info(info)))
            .collect();

        let actor = Self {
            session_id,
            topic,
            host_id,
            status,
            moderation,
            created_at,
            expires_at,
            receiver,
            self_sender: sender.clone(),
            cancel_token: cancel_token.clone(),
            participants,
            subscriptions: HashMap::new(),
            banned: HashSet::new(),
            max_participants,
            deps,
            is_shutting_down: false,
            mailbox: MailboxMonitor::new(ActorType::Session, session_id.to_string()),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionActorHandle {
            sender,
            cancel_token,
            session_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "sc.actor.session", fields(session_id = %self.session_id))]
    async fn run(mut self) {
        info!(
            target: "sc.actor.session",
            session_id = %self.session_id,
            topic = %self.topic,
            "SessionActor started"
        );

        let mut expiry_check = tokio::time::interval(EXPIRY_CHECK_INTERVAL);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "sc.actor.session",
                        session_id = %self.session_id,
                        "SessionActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                _ = expiry_check.tick() => {
                    if self.status == SessionStatus::Live
                        && chrono::Utc::now().timestamp() >= self.expires_at
                    {
                        info!(
                            target: "sc.actor.session",
                            session_id = %self.session_id,
                            "Session TTL elapsed, ending"
                        );
                        self.end_session("session expired").await;
                    }
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
                                target: "sc.actor.session",
                                session_id = %self.session_id,
                                "SessionActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "sc.actor.session",
            session_id = %self.session_id,
            participants = self.participants.len(),
            messages_processed = self.mailbox.messages_processed(),
            "SessionActor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Join {
                participant_id,
                alias,
                is_host,
                is_moderator,
                respond_to,
            } => {
                let result = self.handle_join(participant_id, alias, is_host, is_moderator).await;
                let _ = respond_to.send(result);
            }

            SessionMessage::Leave {
                participant_id,
                respond_to,
            } => {
                let result = self
                    .remove_participant(participant_id, LeaveReason::Voluntary)
                    .await;
                let _ = respond_to.send(result);
            }

            SessionMessage::Disconnected { participant_id } => {
                self.handle_disconnected(participant_id).await;
            }

            SessionMessage::SendMessage {
                participant_id,
                content,
                respond_to,
            } => {
                let result = self.handle_send_message(participant_id, content);
                let _ = respond_to.send(result);
            }

            SessionMessage::RaiseHand {
                participant_id,
                raised,
            } => {
                self.handle_raise_hand(participant_id, raised).await;
            }

            SessionMessage::SetMuted {
                requested_by,
                target,
                muted,
                respond_to,
            } => {
                let result = self.handle_set_muted(requested_by, target, muted).await;
                let _ = respond_to.send(result);
            }

            SessionMessage::Kick {
                requested_by,
                target,
                respond_to,
            } => {
                let result = self.handle_removal(requested_by, target, LeaveReason::Kicked).await;
                let _ = respond_to.send(result);
            }

            SessionMessage::Ban {
                requested_by,
                target,
                respond_to,
            } => {
                let result = self.handle_removal(requested_by, target, LeaveReason::Banned).await;
                let _ = respond_to.send(result);
            }

            SessionMessage::EmergencyReport {
                reporter,
                alert_type,
                message,
                respond_to,
            } => {
                let result = self.handle_emergency(reporter, alert_type, message).await;
                let _ = respond_to.send(result);
            }

            SessionMessage::UpdateVoiceSettings {
                participant_id,
                settings,
                respond_to,
            } => {
                let result = self.handle_voice_settings(participant_id, settings).await;
                let _ = respond_to.send(result);
            }

            SessionMessage::SpeakingChanged {
                participant_id,
                speaking,
            } => {
                self.handle_speaking_changed(participant_id, speaking).await;
            }

            SessionMessage::GetState { respond_to } => {
                let view = SessionView {
                    snapshot: self.snapshot(),
                    mailbox_depth: self.mailbox.current_depth(),
                    is_shutting_down: self.is_shutting_down,
                };
                let _ = respond_to.send(view);
            }

            SessionMessage::GetModerationLog {
                requested_by,
                limit,
                respond_to,
            } => {
                let result = self.handle_moderation_log(requested_by, limit).await;
                let _ = respond_to.send(result);
            }

            SessionMessage::End { reason, respond_to } => {
                self.end_session(&reason).await;
                let _ = respond_to.send(Ok(()));
            }

            SessionMessage::ModerationVerdict {
                participant_id,
                content,
                verdict,
            } => {
                self.handle_verdict(participant_id, content, verdict).await;
            }
        }
    }

    /// Handle a join. Duplicate joins for a present participant update
    /// non-identity fields instead of duplicating the roster entry.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    async fn handle_join(
        &mut self,
        participant_id: ParticipantId,
        alias: String,
        is_host: bool,
        is_moderator: bool,
    ) -> Result<JoinResult, ScError> {
        if self.is_shutting_down || self.status == SessionStatus::Ended {
            return Err(ScError::Draining);
        }
        if self.banned.contains(&participant_id) {
            return Err(ScError::PermissionDenied(
                "Removed from this session".to_string(),
            ));
        }

        if let Some(existing) = self.participants.get_mut(&participant_id) {
            // Idempotent rejoin: last-write-wins on non-identity fields,
            // counters survive.
            existing.alias = alias;
            existing.is_host = is_host;
            existing.is_moderator = is_moderator;
            existing.status = ConnectionStatus::Connected;
            let info = existing.to_info();

            let (subscription, events) = self.deps.router.subscribe(
                self.session_id,
                participant_id,
                is_moderator || is_host,
            );
            self.subscriptions.insert(participant_id, subscription);

            let roster = self.roster_except(participant_id);
            self.persist_snapshot().await;

            debug!(
                target: "sc.actor.session",
                participant_id = %participant_id,
                "Participant rejoined"
            );
            return Ok(JoinResult {
                participant: info,
                rejoined: true,
                roster,
                events,
            });
        }

        if self.participants.len() >= self.max_participants {
            return Err(ScError::SessionCapacityExceeded(format!(
                "limit {}",
                self.max_participants
            )));
        }

        let participant = Participant {
            participant_id,
            alias: alias.clone(),
            is_host,
            is_moderator,
            is_muted: false,
            is_blocked: false,
            hand_raised: false,
            status: ConnectionStatus::Connected,
            speaking_seconds: 0,
            speaking_since: None,
            flagged_count: 0,
        };
        let info = participant.to_info();

        // Announce to those already present, then register the joiner so
        // it does not receive its own join event.
        self.deps.router.publish(
            &self.session_id,
            &Scope::Session,
            &OutboundEvent::ParticipantJoined {
                participant_id,
                alias,
            },
        );

        let (subscription, events) =
            self.deps
                .router
                .subscribe(self.session_id, participant_id, is_moderator || is_host);

        self.participants.insert(participant_id, participant);
        self.subscriptions.insert(participant_id, subscription);
        self.deps.metrics.increment_participants();

        let roster = self.roster_except(participant_id);
        self.persist_snapshot().await;

        info!(
            target: "sc.actor.session",
            total_participants = self.participants.len(),
            "Participant joined"
        );

        Ok(JoinResult {
            participant: info,
            rejoined: false,
            roster,
            events,
        })
    }

    /// Handle a transport drop: deterministic roster removal plus the
    /// "speaking ended" broadcast. Idempotent for unknown participants.
    async fn handle_disconnected(&mut self, participant_id: ParticipantId) {
        if !self.participants.contains_key(&participant_id) {
            return;
        }
        let _ = self
            .remove_participant(participant_id, LeaveReason::Disconnected)
            .await;
    }

    /// Accept content for moderation. The analysis runs on a spawned
    /// task; the verdict returns through the mailbox. The mailbox is
    /// never held across the classifier await.
    fn handle_send_message(
        &mut self,
        participant_id: ParticipantId,
        content: String,
    ) -> Result<(), ScError> {
        let participant = self
            .participants
            .get(&participant_id)
            .ok_or_else(|| ScError::ParticipantNotFound("not in session".to_string()))?;

        if participant.is_blocked {
            return Err(ScError::PermissionDenied(
                "You cannot send messages in this session".to_string(),
            ));
        }
        if participant.is_muted {
            return Err(ScError::PermissionDenied(
                "You are muted by a moderator".to_string(),
            ));
        }
        if content.trim().is_empty() {
            return Err(ScError::Validation("message must not be empty".to_string()));
        }
        if content.len() > MAX_MESSAGE_LENGTH {
            return Err(ScError::Validation(format!(
                "message too long: {} bytes (maximum {MAX_MESSAGE_LENGTH})",
                content.len()
            )));
        }

        if !self.moderation.enabled {
            let alias = participant.alias.clone();
            self.deliver_message(participant_id, alias, content);
            return Ok(());
        }

        let ctx = AnalysisContext {
            session_id: self.session_id,
            participant_id,
            ai_monitoring: self.moderation.ai_monitoring,
        };
        let pipeline = Arc::clone(&self.deps.pipeline);
        let verdict_tx = self.self_sender.clone();
        tokio::spawn(async move {
            let verdict = pipeline.analyze(&content, &ctx).await;
            // The actor may be gone (session ended); the event is already
            // persisted by the pipeline, so dropping the send is safe.
            let _ = verdict_tx
                .send(SessionMessage::ModerationVerdict {
                    participant_id,
                    content,
                    verdict,
                })
                .await;
        });

        Ok(())
    }

    /// Consume a completed moderation verdict.
    async fn handle_verdict(
        &mut self,
        participant_id: ParticipantId,
        content: String,
        verdict: crate::moderation::Verdict,
    ) {
        self.deps
            .metrics
            .record_moderation_analysis(verdict.severity.as_str());

        let Some(alias) = self
            .participants
            .get(&participant_id)
            .map(|p| p.alias.clone())
        else {
            debug!(
                target: "sc.actor.session",
                session_id = %self.session_id,
                participant_id = %participant_id,
                "Verdict for departed participant; event logged, no broadcast"
            );
            return;
        };

        // Sensitivity gate: verdicts below the session's threshold keep
        // their record but dispatch no action.
        let mut effective = verdict;
        if effective.action != ModerationAction::None
            && effective.severity < self.moderation.sensitivity.action_threshold()
        {
            debug!(
                target: "sc.actor.session",
                severity = effective.severity.as_str(),
                "Verdict below sensitivity threshold, action suppressed"
            );
            effective.action = ModerationAction::None;
        }

        let ctx = EscalationContext {
            session_id: self.session_id,
            participant_id,
            alias: alias.clone(),
            content: content.clone(),
        };
        let report = self.deps.escalation.execute(&effective, &ctx).await;
        debug!(
            target: "sc.actor.session",
            action = effective.action.as_str(),
            executed = ?report.executed,
            "Escalation dispatched"
        );

        match effective.action {
            ModerationAction::None => {
                self.deliver_message(participant_id, alias, content);
            }
            ModerationAction::WarnAndMonitor => {
                // Warned content is still delivered; the sender is tracked.
                if let Some(participant) = self.participants.get_mut(&participant_id) {
                    participant.flagged_count += 1;
                }
                self.deliver_message(participant_id, alias, content);
                self.persist_snapshot().await;
            }
            ModerationAction::AutoFilter => {
                // Blocked from room delivery; the engine notified the sender.
            }
            ModerationAction::ImmediateIntervention => {
                // Content is withheld from the room; moderators received it
                // with full context. Synthesize the supportive response for
                // the audio path, text delivery already stands as fallback.
                if let Some(text) = effective.supportive_response.clone() {
                    self.spawn_supportive_synthesis(text);
                }
            }
        }
    }

    fn spawn_supportive_synthesis(&self, text: String) {
        if !self.deps.synthesis.is_enabled() {
            return;
        }
        let synthesis = Arc::clone(&self.deps.synthesis);
        let session_id = self.session_id;
        tokio::spawn(async move {
            let mut settings = GUIDE_VOICE_SETTINGS;
            settings.voice_id = "sanctuary-guide".to_string();
            match synthesis.synthesize(&text, &settings).await {
                Ok(audio) => debug!(
                    target: "sc.actor.session",
                    session_id = %session_id,
                    bytes = audio.len(),
                    "Supportive response synthesized for the audio path"
                ),
                Err(e) => warn!(
                    target: "sc.actor.session",
                    session_id = %session_id,
                    error = %e,
                    "Supportive response synthesis failed, text delivery stands"
                ),
            }
        });
    }

    async fn handle_raise_hand(&mut self, participant_id: ParticipantId, raised: bool) {
        let Some(participant) = self.participants.get_mut(&participant_id) else {
            return;
        };
        participant.hand_raised = raised;
        self.deps.router.publish(
            &self.session_id,
            &Scope::Session,
            &OutboundEvent::HandRaised {
                participant_id,
                raised,
            },
        );
        self.persist_snapshot().await;
    }

    async fn handle_set_muted(
        &mut self,
        requested_by: ParticipantId,
        target: ParticipantId,
        muted: bool,
    ) -> Result<(), ScError> {
        self.authorize_moderator(requested_by)?;

        let participant = self
            .participants
            .get_mut(&target)
            .ok_or_else(|| ScError::ParticipantNotFound("target not in session".to_string()))?;
        participant.is_muted = muted;

        info!(
            target: "sc.actor.session",
            session_id = %self.session_id,
            muted = muted,
            "Moderator mute applied"
        );

        self.deps.router.publish(
            &self.session_id,
            &Scope::Participant(target),
            &OutboundEvent::ForceMuted { muted },
        );
        self.deps.router.publish(
            &self.session_id,
            &Scope::Session,
            &OutboundEvent::MutedByModerator {
                participant_id: target,
                muted,
            },
        );
        self.persist_snapshot().await;
        Ok(())
    }

    /// Kick or ban a target out of the session.
    async fn handle_removal(
        &mut self,
        requested_by: ParticipantId,
        target: ParticipantId,
        reason: LeaveReason,
    ) -> Result<(), ScError> {
        self.authorize_moderator(requested_by)?;

        let participant = self
            .participants
            .get_mut(&target)
            .ok_or_else(|| ScError::ParticipantNotFound("target not in session".to_string()))?;
        if participant.is_host {
            return Err(ScError::PermissionDenied(
                "The host cannot be removed".to_string(),
            ));
        }

        if reason == LeaveReason::Banned {
            // Mark blocked in the stored snapshot before removal.
            participant.is_blocked = true;
            self.persist_snapshot().await;
            self.banned.insert(target);
        }

        // Direct notice before the subscription goes away.
        self.deps.router.publish(
            &self.session_id,
            &Scope::Participant(target),
            &OutboundEvent::Removed { reason },
        );

        self.remove_participant(target, reason).await
    }

    /// Shared removal path for leave/kick/ban/disconnect.
    async fn remove_participant(
        &mut self,
        participant_id: ParticipantId,
        reason: LeaveReason,
    ) -> Result<(), ScError> {
        let Some(mut participant) = self.participants.remove(&participant_id) else {
            return Err(ScError::ParticipantNotFound("not in session".to_string()));
        };

        let was_speaking = participant.speaking_since.take().map(|started| {
            participant.speaking_seconds += started.elapsed().as_secs();
        });
        // A dropped transport always ends the participant's audio turn
        // for the room, whether or not the floor was formally held.
        if was_speaking.is_some() || reason == LeaveReason::Disconnected {
            self.deps.router.publish(
                &self.session_id,
                &Scope::Session,
                &OutboundEvent::SpeakingEnded { participant_id },
            );
        }

        self.subscriptions.remove(&participant_id);
        self.deps.router.publish(
            &self.session_id,
            &Scope::Session,
            &OutboundEvent::ParticipantLeft {
                participant_id,
                reason,
            },
        );
        self.deps.metrics.decrement_participants();
        self.persist_snapshot().await;

        info!(
            target: "sc.actor.session",
            session_id = %self.session_id,
            participant_id = %participant_id,
            reason = ?reason,
            remaining_participants = self.participants.len(),
            "Participant removed"
        );
        Ok(())
    }

    async fn handle_emergency(
        &mut self,
        reporter: ParticipantId,
        alert_type: String,
        message: String,
    ) -> Result<AlertId, ScError> {
        if !self.participants.contains_key(&reporter) {
            return Err(ScError::ParticipantNotFound(
                "reporter not in session".to_string(),
            ));
        }
        if alert_type.trim().is_empty() {
            return Err(ScError::Validation("alert type required".to_string()));
        }

        let alert =
            crate::escalation::EmergencyAlert::new(self.session_id, reporter, alert_type, message);
        let alert_id = alert.id;
        let report = self.deps.escalation.report_emergency(&alert).await;
        debug!(
            target: "sc.actor.session",
            alert_id = %alert_id,
            executed = ?report.executed,
            "Emergency report handled"
        );
        Ok(alert_id)
    }

    async fn handle_voice_settings(
        &mut self,
        participant_id: ParticipantId,
        settings: VoiceSettings,
    ) -> Result<(), ScError> {
        if !self.participants.contains_key(&participant_id) {
            return Err(ScError::ParticipantNotFound("not in session".to_string()));
        }
        settings.validate()?;

        self.deps
            .store
            .put_json(
                &keys::participant_voice(&participant_id),
                &settings,
                retention::PARTICIPANT_CONFIG,
            )
            .await?;

        self.deps.router.publish(
            &self.session_id,
            &Scope::Participant(participant_id),
            &OutboundEvent::VoiceSettingsUpdated { participant_id },
        );
        Ok(())
    }

    /// Moderator view of the newest moderation-log entries.
    async fn handle_moderation_log(
        &mut self,
        requested_by: ParticipantId,
        limit: usize,
    ) -> Result<Vec<String>, ScError> {
        self.authorize_moderator(requested_by)?;
        self.deps
            .store
            .range_list(&keys::moderation_log(&self.session_id), 0, limit)
            .await
    }

    async fn handle_speaking_changed(&mut self, participant_id: ParticipantId, speaking: bool) {
        let Some(participant) = self.participants.get_mut(&participant_id) else {
            return;
        };

        if speaking {
            if participant.speaking_since.is_none() {
                participant.speaking_since = Some(Instant::now());
            }
        } else if let Some(started) = participant.speaking_since.take() {
            participant.speaking_seconds += started.elapsed().as_secs();
            self.deps.router.publish(
                &self.session_id,
                &Scope::Session,
                &OutboundEvent::SpeakingEnded { participant_id },
            );
            self.persist_snapshot().await;
        }
    }

    /// End the session: notify the room, clear the roster, persist the
    /// final snapshot, and cancel the actor.
    async fn end_session(&mut self, reason: &str) {
        if self.status == SessionStatus::Ended {
            return;
        }

        info!(
            target: "sc.actor.session",
            session_id = %self.session_id,
            reason = %reason,
            participants = self.participants.len(),
            "Ending session"
        );

        self.status = SessionStatus::Ended;
        self.is_shutting_down = true;

        self.deps.router.publish(
            &self.session_id,
            &Scope::Session,
            &OutboundEvent::SessionEnded {
                reason: reason.to_string(),
            },
        );

        for _ in 0..self.participants.len() {
            self.deps.metrics.decrement_participants();
        }
        self.participants.clear();
        self.subscriptions.clear();
        self.deps.router.drop_session(&self.session_id);

        // The ended snapshot stays until its TTL; the emergency alert log
        // outlives it by design.
        self.persist_snapshot().await;

        self.cancel_token.cancel();
    }

    /// Persist the live snapshot before releasing control on cancellation,
    /// so another instance can rehydrate the session.
    async fn graceful_shutdown(&mut self) {
        self.is_shutting_down = true;
        if self.status == SessionStatus::Live {
            self.persist_snapshot().await;
        }
        self.subscriptions.clear();
        self.deps.router.drop_session(&self.session_id);
    }

    fn authorize_moderator(&self, requested_by: ParticipantId) -> Result<(), ScError> {
        let authorized = self
            .participants
            .get(&requested_by)
            .is_some_and(Participant::can_moderate);
        if authorized {
            Ok(())
        } else {
            warn!(
                target: "sc.actor.session",
                session_id = %self.session_id,
                "Non-moderator attempted a moderator action"
            );
            Err(ScError::PermissionDenied(
                "Only hosts and moderators can do that".to_string(),
            ))
        }
    }

    fn deliver_message(&self, participant_id: ParticipantId, alias: String, content: String) {
        self.deps.router.publish(
            &self.session_id,
            &Scope::Session,
            &OutboundEvent::ChatMessage {
                participant_id,
                alias,
                content,
                timestamp: chrono::Utc::now().timestamp(),
            },
        );
    }

    fn roster_except(&self, participant_id: ParticipantId) -> Vec<ParticipantInfo> {
        self.participants
            .values()
            .filter(|p| p.participant_id != participant_id)
            .map(Participant::to_info)
            .collect()
    }

    fn snapshot(&self) -> SessionSnapshot {
        let participants: Vec<ParticipantInfo> =
            self.participants.values().map(Participant::to_info).collect();
        SessionSnapshot {
            session_id: self.session_id,
            topic: self.topic.clone(),
            host_id: self.host_id,
            status: self.status,
            current_participants: participants.len(),
            participants,
            moderation: self.moderation,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }

    async fn persist_snapshot(&self) {
        let snapshot = self.snapshot();
        if let Err(e) = self
            .deps
            .store
            .put_json(
                &keys::session_state(&self.session_id),
                &snapshot,
                retention::SESSION_STATE,
            )
            .await
        {
            warn!(
                target: "sc.actor.session",
                session_id = %self.session_id,
                error = %e,
                "Failed to persist session snapshot"
            );
        }
    }
}

