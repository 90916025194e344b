//! Escalation protocols and action dispatch.
//!
//! The [`EscalationEngine`] maps a moderation verdict - or a direct
//! emergency report - to a fixed protocol: who gets notified, what
//! auto-response (if any) is sent, whether the session is paused, and
//! whether the crisis-intervention sequence fires.
//!
//! Each invocation is terminal: one verdict yields exactly one action
//! dispatch, no multi-step transitions. Every branch tolerates downstream
//! delivery failure (an empty moderator channel, a departed participant);
//! failures are logged and recorded in the returned [`ActionReport`],
//! never thrown, and never roll back the moderation decision.

use crate::broadcast::{BroadcastRouter, OutboundEvent, Scope};
use crate::moderation::Verdict;
use crate::store::{keys, retention, StateStore};
use common::types::{AlertId, ModerationAction, ParticipantId, Severity, SessionId};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

/// Crisis resources pushed to a flagged participant.
pub const CRISIS_RESOURCES: &[&str] = &[
    "988 Suicide & Crisis Lifeline - call or text 988 (US)",
    "Crisis Text Line - text HOME to 741741",
    "Find a local crisis centre - https://findahelpline.com",
];

/// Message accompanying the crisis resources payload.
pub const CRISIS_RESOURCES_MESSAGE: &str =
    "You matter, and you don't have to carry this alone. These lines are \
     open right now, and a moderator has been notified so someone is with you.";

/// Who a protocol notifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyTarget {
    /// Session moderators, with full context.
    Moderators,
    /// The participant whose content triggered the action.
    Sender,
    /// Everyone in the room.
    Room,
}

/// A named escalation policy. Configuration data, not mutated at runtime.
pub struct EscalationProtocol {
    pub name: &'static str,
    pub notify: &'static [NotifyTarget],
    /// Fixed auto-response, if the protocol carries one. The
    /// immediate-intervention protocol instead uses the supportive
    /// response supplied by the pipeline.
    pub auto_response: Option<&'static str>,
    pub pause_session: bool,
}

/// Protocol for `auto_filter`.
pub const AUTO_FILTER: EscalationProtocol = EscalationProtocol {
    name: "auto_filter",
    notify: &[NotifyTarget::Sender],
    auto_response: Some("Your message was held back to keep this space safe."),
    pause_session: false,
};

/// Protocol for `warn_and_monitor`.
pub const WARN_AND_MONITOR: EscalationProtocol = EscalationProtocol {
    name: "warn_and_monitor",
    notify: &[NotifyTarget::Room],
    auto_response: Some(
        "A gentle reminder: this sanctuary stays supportive for everyone in it.",
    ),
    pause_session: false,
};

/// Protocol for `immediate_intervention`.
pub const IMMEDIATE_INTERVENTION: EscalationProtocol = EscalationProtocol {
    name: "immediate_intervention",
    notify: &[NotifyTarget::Moderators, NotifyTarget::Room],
    auto_response: None,
    pause_session: true,
};

/// Protocol for `none`: no effects.
pub const NO_ACTION: EscalationProtocol = EscalationProtocol {
    name: "none",
    notify: &[],
    auto_response: None,
    pause_session: false,
};

/// Look up the protocol for an action.
#[must_use]
pub fn protocol_for(action: ModerationAction) -> &'static EscalationProtocol {
    match action {
        ModerationAction::None => &NO_ACTION,
        ModerationAction::AutoFilter => &AUTO_FILTER,
        ModerationAction::WarnAndMonitor => &WARN_AND_MONITOR,
        ModerationAction::ImmediateIntervention => &IMMEDIATE_INTERVENTION,
    }
}

/// A direct emergency report or a crisis record raised by escalation.
///
/// Immutable; retained far longer than ordinary moderation events so
/// crisis records survive session teardown for review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyAlert {
    pub id: AlertId,
    pub session_id: SessionId,
    pub reporter: ParticipantId,
    pub alert_type: String,
    pub message: String,
    pub severity: Severity,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
}

impl EmergencyAlert {
    /// Build an alert with the default High severity.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        reporter: ParticipantId,
        alert_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: AlertId::new(),
            session_id,
            reporter,
            alert_type: alert_type.into(),
            message: message.into(),
            severity: Severity::High,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Incident entry appended to the moderation log when a message is
/// blocked from delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub kind: String,
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub timestamp: i64,
}

/// What one escalation dispatch actually did.
#[derive(Debug, Clone, Serialize)]
pub struct ActionReport {
    pub action: ModerationAction,
    /// Steps that completed, in dispatch order.
    pub executed: Vec<String>,
    /// Steps that failed; logged, never fatal.
    pub failures: Vec<String>,
}

impl ActionReport {
    fn new(action: ModerationAction) -> Self {
        Self {
            action,
            executed: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn step(&mut self, name: &str) {
        self.executed.push(name.to_string());
    }

    fn failure(&mut self, name: &str, detail: impl std::fmt::Display) {
        self.failures.push(format!("{name}: {detail}"));
    }
}

/// Context for one escalation dispatch.
#[derive(Debug, Clone)]
pub struct EscalationContext {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub alias: String,
    /// The analyzed content, forwarded to moderators on intervention.
    pub content: String,
}

/// Dispatches escalation protocols against the router and store.
#[derive(Clone)]
pub struct EscalationEngine {
    router: BroadcastRouter,
    store: StateStore,
}

impl EscalationEngine {
    /// Create an engine over the given router and store.
    #[must_use]
    pub fn new(router: BroadcastRouter, store: StateStore) -> Self {
        Self { router, store }
    }

    /// Execute the protocol selected by the verdict's action.
    #[instrument(skip_all, fields(session_id = %ctx.session_id, action = %verdict.action.as_str()))]
    pub async fn execute(&self, verdict: &Verdict, ctx: &EscalationContext) -> ActionReport {
        let mut report = ActionReport::new(verdict.action);
        metrics::counter!("sc_escalations_total", "action" => verdict.action.as_str())
            .increment(1);

        match verdict.action {
            ModerationAction::None => {}
            ModerationAction::AutoFilter => self.run_auto_filter(ctx, &mut report).await,
            ModerationAction::WarnAndMonitor => self.run_warning(ctx, &mut report),
            ModerationAction::ImmediateIntervention => {
                self.run_intervention(verdict, ctx, &mut report).await;
            }
        }

        if !report.failures.is_empty() {
            warn!(
                target: "sc.escalation",
                session_id = %ctx.session_id,
                failures = ?report.failures,
                "Escalation completed with failures"
            );
        }
        report
    }

    /// Handle a direct emergency report from a participant.
    ///
    /// Persists the alert (with retry), notifies moderators, and
    /// acknowledges the reporter with crisis resources.
    #[instrument(skip_all, fields(session_id = %alert.session_id, alert_type = %alert.alert_type))]
    pub async fn report_emergency(&self, alert: &EmergencyAlert) -> ActionReport {
        let mut report = ActionReport::new(ModerationAction::ImmediateIntervention);
        metrics::counter!("sc_emergency_alerts_total").increment(1);

        self.persist_alert(alert, &mut report).await;

        let delivered = self.router.publish(
            &alert.session_id,
            &Scope::Moderators,
            &OutboundEvent::EmergencyAlertRaised {
                alert_id: alert.id,
                reporter: alert.reporter,
                alert_type: alert.alert_type.clone(),
                message: alert.message.clone(),
                severity: alert.severity,
            },
        );
        if delivered > 0 {
            report.step("moderators_notified");
        } else {
            report.failure("moderators_notified", "no moderators subscribed");
        }

        let delivered = self.router.publish(
            &alert.session_id,
            &Scope::Participant(alert.reporter),
            &OutboundEvent::EmergencyAcknowledged {
                alert_id: alert.id,
                message: CRISIS_RESOURCES_MESSAGE.to_string(),
            },
        );
        if delivered > 0 {
            report.step("reporter_acknowledged");
        } else {
            report.failure("reporter_acknowledged", "reporter not subscribed");
        }

        info!(
            target: "sc.escalation",
            session_id = %alert.session_id,
            alert_id = %alert.id,
            "Emergency report dispatched"
        );
        report
    }

    async fn run_auto_filter(&self, ctx: &EscalationContext, report: &mut ActionReport) {
        let protocol = &AUTO_FILTER;
        // Blocking the message itself is enforced by the session actor,
        // which only delivers verdict-cleared content.
        report.step("message_blocked");

        let reason = protocol
            .auto_response
            .unwrap_or("Message blocked")
            .to_string();
        let delivered = self.router.publish(
            &ctx.session_id,
            &Scope::Participant(ctx.participant_id),
            &OutboundEvent::MessageBlocked { reason },
        );
        if delivered > 0 {
            report.step("sender_notified");
        } else {
            report.failure("sender_notified", "sender not subscribed");
        }

        let incident = IncidentRecord {
            kind: "message_blocked".to_string(),
            session_id: ctx.session_id,
            participant_id: ctx.participant_id,
            timestamp: chrono::Utc::now().timestamp(),
        };
        match self
            .store
            .append_json(
                &keys::moderation_log(&ctx.session_id),
                &incident,
                retention::MODERATION_LOG,
            )
            .await
        {
            Ok(()) => report.step("incident_logged"),
            Err(e) => report.failure("incident_logged", e),
        }
    }

    fn run_warning(&self, ctx: &EscalationContext, report: &mut ActionReport) {
        let protocol = &WARN_AND_MONITOR;
        let message = protocol
            .auto_response
            .unwrap_or("Please keep this space supportive.")
            .to_string();
        let delivered = self.router.publish(
            &ctx.session_id,
            &Scope::Session,
            &OutboundEvent::RoomWarning { message },
        );
        if delivered > 0 {
            report.step("room_warned");
        } else {
            report.failure("room_warned", "no subscribers");
        }
        // The flagged-count increment lives with the roster owner (the
        // session actor), which applies it when it sees this action.
    }

    async fn run_intervention(
        &self,
        verdict: &Verdict,
        ctx: &EscalationContext,
        report: &mut ActionReport,
    ) {
        let protocol = &IMMEDIATE_INTERVENTION;

        let delivered = self.router.publish(
            &ctx.session_id,
            &Scope::Moderators,
            &OutboundEvent::ModeratorAlert {
                participant_id: ctx.participant_id,
                alias: ctx.alias.clone(),
                severity: verdict.severity,
                action: verdict.action,
                flags: verdict.flags.clone(),
                content: ctx.content.clone(),
            },
        );
        if delivered > 0 {
            report.step("moderators_notified");
        } else {
            report.failure("moderators_notified", "no moderators subscribed");
        }

        if let Some(supportive) = &verdict.supportive_response {
            let delivered = self.router.publish(
                &ctx.session_id,
                &Scope::Session,
                &OutboundEvent::SupportiveMessage {
                    message: supportive.clone(),
                },
            );
            if delivered > 0 {
                report.step("supportive_response_broadcast");
            } else {
                report.failure("supportive_response_broadcast", "no subscribers");
            }
        }

        let alert = EmergencyAlert {
            id: AlertId::new(),
            session_id: ctx.session_id,
            reporter: ctx.participant_id,
            alert_type: "moderation_intervention".to_string(),
            message: ctx.content.clone(),
            severity: verdict.severity.max(Severity::High),
            timestamp: chrono::Utc::now().timestamp(),
        };
        self.persist_alert(&alert, report).await;

        if protocol.pause_session {
            let delivered = self.router.publish(
                &ctx.session_id,
                &Scope::Session,
                &OutboundEvent::SessionPaused {
                    reason: "A moderator is stepping in.".to_string(),
                },
            );
            if delivered > 0 {
                report.step("session_paused");
            } else {
                report.failure("session_paused", "no subscribers");
            }
        }

        if verdict.is_crisis() {
            self.run_crisis_sequence(ctx, report);
        }
    }

    /// The crisis-intervention sequence: resources straight to the
    /// flagged participant, a distinct notice to moderators.
    fn run_crisis_sequence(&self, ctx: &EscalationContext, report: &mut ActionReport) {
        metrics::counter!("sc_crisis_sequences_total").increment(1);

        let delivered = self.router.publish(
            &ctx.session_id,
            &Scope::Participant(ctx.participant_id),
            &OutboundEvent::CrisisResources {
                message: CRISIS_RESOURCES_MESSAGE.to_string(),
                resources: CRISIS_RESOURCES.iter().map(ToString::to_string).collect(),
            },
        );
        if delivered > 0 {
            report.step("crisis_resources_sent");
        } else {
            report.failure("crisis_resources_sent", "participant not subscribed");
        }

        let delivered = self.router.publish(
            &ctx.session_id,
            &Scope::Moderators,
            &OutboundEvent::CrisisTriggered {
                participant_id: ctx.participant_id,
                alias: ctx.alias.clone(),
            },
        );
        if delivered > 0 {
            report.step("crisis_moderators_notified");
        } else {
            report.failure("crisis_moderators_notified", "no moderators subscribed");
        }
    }

    /// Persist an emergency alert, retrying once before recording the
    /// failure. An alert is never silently dropped.
    async fn persist_alert(&self, alert: &EmergencyAlert, report: &mut ActionReport) {
        let key = keys::emergency_alerts(&alert.session_id);
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self
                .store
                .append_json(&key, alert, retention::EMERGENCY_ALERTS)
                .await
            {
                Ok(()) => {
                    report.step("alert_persisted");
                    return;
                }
                Err(e) if attempts < 2 => {
                    warn!(
                        target: "sc.escalation",
                        alert_id = %alert.id,
                        error = %e,
                        "Alert persistence failed, retrying"
                    );
                }
                Err(e) => {
                    error!(
                        target: "sc.escalation",
                        alert_id = %alert.id,
                        error = %e,
                        "Alert persistence failed after retry"
                    );
                    report.failure("alert_persisted", e);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::moderation::{categories, ContentFlag, FlagSource};

    fn engine_with_router() -> (EscalationEngine, BroadcastRouter) {
        let router = BroadcastRouter::new();
        let store = StateStore::in_memory();
        (EscalationEngine::new(router.clone(), store), router)
    }

    fn intervention_verdict(crisis: bool) -> Verdict {
        let mut verdict = Verdict::clean();
        verdict.severity = Severity::Critical;
        verdict.action = ModerationAction::ImmediateIntervention;
        verdict.confidence = 0.8;
        verdict.definitive = true;
        if crisis {
            verdict.flags.push(ContentFlag {
                category: categories::SUICIDE_IDEATION.to_string(),
                evidence: "kill myself".to_string(),
                source: FlagSource::Rule,
            });
        }
        verdict
    }

    fn ctx(session_id: SessionId, participant_id: ParticipantId) -> EscalationContext {
        EscalationContext {
            session_id,
            participant_id,
            alias: "quiet-fox".to_string(),
            content: "flagged content".to_string(),
        }
    }

    #[test]
    fn test_protocol_lookup() {
        assert_eq!(protocol_for(ModerationAction::None).name, "none");
        assert_eq!(
            protocol_for(ModerationAction::AutoFilter).name,
            "auto_filter"
        );
        assert_eq!(
            protocol_for(ModerationAction::WarnAndMonitor).name,
            "warn_and_monitor"
        );
        assert_eq!(
            protocol_for(ModerationAction::ImmediateIntervention).name,
            "immediate_intervention"
        );
        assert!(protocol_for(ModerationAction::ImmediateIntervention).pause_session);
    }

    #[tokio::test]
    async fn test_none_action_has_no_effects() {
        let (engine, _router) = engine_with_router();
        let session_id = SessionId::new();
        let participant_id = ParticipantId::new();

        let report = engine
            .execute(&Verdict::clean(), &ctx(session_id, participant_id))
            .await;

        assert!(report.executed.is_empty());
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_auto_filter_notifies_sender_and_logs_incident() {
        let (engine, router) = engine_with_router();
        let session_id = SessionId::new();
        let participant_id = ParticipantId::new();
        let (_sub, mut rx) = router.subscribe(session_id, participant_id, false);

        let mut verdict = Verdict::clean();
        verdict.severity = Severity::Medium;
        verdict.action = ModerationAction::AutoFilter;

        let report = engine
            .execute(&verdict, &ctx(session_id, participant_id))
            .await;

        assert!(report.executed.contains(&"message_blocked".to_string()));
        assert!(report.executed.contains(&"sender_notified".to_string()));
        assert!(report.executed.contains(&"incident_logged".to_string()));
        assert!(matches!(
            rx.try_recv().unwrap(),
            OutboundEvent::MessageBlocked { .. }
        ));
    }

    #[tokio::test]
    async fn test_warning_reaches_room() {
        let (engine, router) = engine_with_router();
        let session_id = SessionId::new();
        let sender = ParticipantId::new();
        let other = ParticipantId::new();
        let (_s1, mut rx_sender) = router.subscribe(session_id, sender, false);
        let (_s2, mut rx_other) = router.subscribe(session_id, other, false);

        let mut verdict = Verdict::clean();
        verdict.severity = Severity::Low;
        verdict.action = ModerationAction::WarnAndMonitor;

        let report = engine.execute(&verdict, &ctx(session_id, sender)).await;

        assert!(report.executed.contains(&"room_warned".to_string()));
        assert!(matches!(
            rx_sender.try_recv().unwrap(),
            OutboundEvent::RoomWarning { .. }
        ));
        assert!(matches!(
            rx_other.try_recv().unwrap(),
            OutboundEvent::RoomWarning { .. }
        ));
    }

    #[tokio::test]
    async fn test_intervention_with_crisis_fires_full_sequence() {
        let (engine, router) = engine_with_router();
        let session_id = SessionId::new();
        let flagged = ParticipantId::new();
        let moderator = ParticipantId::new();
        let (_s1, mut rx_flagged) = router.subscribe(session_id, flagged, false);
        let (_s2, mut rx_mod) = router.subscribe(session_id, moderator, true);

        let report = engine
            .execute(&intervention_verdict(true), &ctx(session_id, flagged))
            .await;

        assert!(report.executed.contains(&"moderators_notified".to_string()));
        assert!(report.executed.contains(&"alert_persisted".to_string()));
        assert!(report.executed.contains(&"session_paused".to_string()));
        assert!(report.executed.contains(&"crisis_resources_sent".to_string()));
        assert!(report
            .executed
            .contains(&"crisis_moderators_notified".to_string()));

        // Moderator sees the alert and the crisis notice (plus the pause).
        let mod_events: Vec<OutboundEvent> =
            std::iter::from_fn(|| rx_mod.try_recv().ok()).collect();
        assert!(mod_events
            .iter()
            .any(|e| matches!(e, OutboundEvent::ModeratorAlert { .. })));
        assert!(mod_events
            .iter()
            .any(|e| matches!(e, OutboundEvent::CrisisTriggered { .. })));

        // Flagged participant receives the crisis resources directly.
        let flagged_events: Vec<OutboundEvent> =
            std::iter::from_fn(|| rx_flagged.try_recv().ok()).collect();
        assert!(flagged_events
            .iter()
            .any(|e| matches!(e, OutboundEvent::CrisisResources { .. })));
    }

    #[tokio::test]
    async fn test_intervention_without_crisis_flags_skips_crisis_sequence() {
        let (engine, router) = engine_with_router();
        let session_id = SessionId::new();
        let flagged = ParticipantId::new();
        let (_s1, mut rx_flagged) = router.subscribe(session_id, flagged, false);

        let report = engine
            .execute(&intervention_verdict(false), &ctx(session_id, flagged))
            .await;

        assert!(!report
            .executed
            .contains(&"crisis_resources_sent".to_string()));
        let events: Vec<OutboundEvent> =
            std::iter::from_fn(|| rx_flagged.try_recv().ok()).collect();
        assert!(!events
            .iter()
            .any(|e| matches!(e, OutboundEvent::CrisisResources { .. })));
    }

    #[tokio::test]
    async fn test_empty_moderator_channel_is_nonfatal() {
        let (engine, _router) = engine_with_router();
        let session_id = SessionId::new();
        let flagged = ParticipantId::new();

        // Nobody subscribed at all.
        let report = engine
            .execute(&intervention_verdict(true), &ctx(session_id, flagged))
            .await;

        // Alert still persisted; delivery failures recorded, not thrown.
        assert!(report.executed.contains(&"alert_persisted".to_string()));
        assert!(report
            .failures
            .iter()
            .any(|f| f.starts_with("moderators_notified")));
    }

    #[tokio::test]
    async fn test_emergency_report_persists_and_notifies() {
        let (engine, router) = engine_with_router();
        let session_id = SessionId::new();
        let reporter = ParticipantId::new();
        let moderator = ParticipantId::new();
        let (_s1, mut rx_reporter) = router.subscribe(session_id, reporter, false);
        let (_s2, mut rx_mod) = router.subscribe(session_id, moderator, true);

        let alert = EmergencyAlert::new(session_id, reporter, "panic_attack", "I need help now");
        assert_eq!(alert.severity, Severity::High, "severity defaults to high");

        let report = engine.report_emergency(&alert).await;

        assert!(report.executed.contains(&"alert_persisted".to_string()));
        assert!(report.executed.contains(&"moderators_notified".to_string()));
        assert!(report.executed.contains(&"reporter_acknowledged".to_string()));
        assert!(matches!(
            rx_mod.try_recv().unwrap(),
            OutboundEvent::EmergencyAlertRaised { .. }
        ));
        assert!(matches!(
            rx_reporter.try_recv().unwrap(),
            OutboundEvent::EmergencyAcknowledged { .. }
        ));
    }

    #[tokio::test]
    async fn test_alert_round_trips_through_store() {
        let router = BroadcastRouter::new();
        let store = StateStore::in_memory();
        let engine = EscalationEngine::new(router, store.clone());

        let session_id = SessionId::new();
        let alert =
            EmergencyAlert::new(session_id, ParticipantId::new(), "panic_attack", "help");
        let _ = engine.report_emergency(&alert).await;

        let stored = store
            .range_list(&keys::emergency_alerts(&session_id), 0, 10)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        let restored: EmergencyAlert =
            serde_json::from_str(stored.first().unwrap()).unwrap();
        assert_eq!(restored.id, alert.id);
        assert_eq!(restored.alert_type, "panic_attack");
    }
}
