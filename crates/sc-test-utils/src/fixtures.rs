//! Pre-configured dependencies and parameters for controller tests.

use crate::scripted_classifier::ScriptedClassifier;
use common::secret::SecretString;
use common::types::ParticipantId;
use session_controller::actors::{CoordinatorMetrics, CreateSessionParams, ModerationSettings, SessionDeps};
use session_controller::broadcast::BroadcastRouter;
use session_controller::escalation::EscalationEngine;
use session_controller::moderation::rules::RuleSet;
use session_controller::moderation::ModerationPipeline;
use session_controller::store::StateStore;
use session_controller::voice::SynthesisClient;
use std::sync::Arc;

/// Builder for a full [`SessionDeps`] wired to in-process fakes:
/// in-memory store, scripted classifier, disabled synthesis.
pub struct TestDeps {
    store: StateStore,
    router: BroadcastRouter,
    classifier: ScriptedClassifier,
}

impl Default for TestDeps {
    fn default() -> Self {
        Self::new()
    }
}

impl TestDeps {
    /// Start from an in-memory store and a clean classifier.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: StateStore::in_memory(),
            router: BroadcastRouter::new(),
            classifier: ScriptedClassifier::clean(),
        }
    }

    /// Substitute the scripted classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: ScriptedClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Substitute the store (e.g. one shared with assertions).
    #[must_use]
    pub fn with_store(mut self, store: StateStore) -> Self {
        self.store = store;
        self
    }

    /// Substitute the router (e.g. one shared with subscribers).
    #[must_use]
    pub fn with_router(mut self, router: BroadcastRouter) -> Self {
        self.router = router;
        self
    }

    /// Assemble the dependency bundle.
    ///
    /// Returns the deps plus the store and router handles so tests can
    /// observe state and subscribe out-of-band.
    #[must_use]
    pub fn build(self) -> (SessionDeps, StateStore, BroadcastRouter) {
        let synthesis = SynthesisClient::new(
            "http://localhost:0/unused".to_string(),
            SecretString::from(""),
        )
        .expect("building a disabled synthesis client cannot fail");

        let deps = SessionDeps {
            store: self.store.clone(),
            pipeline: Arc::new(ModerationPipeline::new(
                RuleSet::builtin(),
                Arc::new(self.classifier),
                self.store.clone(),
            )),
            escalation: EscalationEngine::new(self.router.clone(), self.store.clone()),
            router: self.router.clone(),
            synthesis: Arc::new(synthesis),
            metrics: CoordinatorMetrics::new(),
        };
        (deps, self.store, self.router)
    }
}

/// Session creation parameters with sensible test defaults.
#[must_use]
pub fn test_create_params(topic: &str, host_id: ParticipantId) -> CreateSessionParams {
    CreateSessionParams {
        session_id: None,
        topic: topic.to_string(),
        host_id,
        moderation: ModerationSettings::default(),
    }
}

/// Drain a delivery queue until an event matches, failing the test after
/// two seconds. Earlier non-matching events (join notices etc.) are
/// discarded.
pub async fn wait_for_event<F>(
    rx: &mut tokio::sync::mpsc::Receiver<session_controller::broadcast::OutboundEvent>,
    predicate: F,
) -> session_controller::broadcast::OutboundEvent
where
    F: Fn(&session_controller::broadcast::OutboundEvent) -> bool,
{
    tokio::time::timeout(std::time::Duration::from_secs(2), async {
        loop {
            let event = rx.recv().await.expect("delivery queue closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event was not delivered in time")
}

/// Drain everything currently queued on a delivery queue.
#[must_use]
pub fn drain_events(
    rx: &mut tokio::sync::mpsc::Receiver<session_controller::broadcast::OutboundEvent>,
) -> Vec<session_controller::broadcast::OutboundEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
