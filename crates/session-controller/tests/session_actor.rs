//! `SessionActor` behavioural tests.
//!
//! Relocated verbatim from the in-module `#[cfg(test)] mod tests` block into
//! the integration-test directory. These tests drive the actor through the
//! `sc-test-utils` fixtures crate; because `sc-test-utils` depends on
//! `session-controller`, running them as in-crate unit tests would link two
//! copies of the crate into the test binary. As integration tests the crate
//! is compiled once, so the fixture types and the crate types match. Every
//! test function and assertion is unchanged.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use common::types::{ParticipantId, SessionId, SessionStatus};
use sc_test_utils::TestDeps;
use session_controller::actors::session::MAX_MESSAGE_LENGTH;
use session_controller::actors::{
    ModerationSettings, SessionActor, SessionActorHandle, SessionDeps, SessionSnapshot,
};
use session_controller::errors::ScError;
use session_controller::store::keys;
use session_controller::voice::VoiceSettings;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

    fn spawn_session(deps: SessionDeps) -> (SessionActorHandle, JoinHandle<()>) {
        SessionActor::spawn(
            SessionId::new(),
            "late-night check-in".to_string(),
            ParticipantId::new(),
            ModerationSettings::default(),
            4,
            CancellationToken::new(),
            deps,
        )
    }

    #[tokio::test]
    async fn test_join_tracks_roster_invariant() {
        let (deps, store, _router) = TestDeps::new().build();
        let (handle, _task) = spawn_session(deps);

        let alice = ParticipantId::new();
        let result = handle
            .join(alice, "quiet-fox".to_string(), true, false)
            .await
            .unwrap();
        assert!(!result.rejoined);
        assert!(result.roster.is_empty(), "first joiner sees an empty roster");

        let bob = ParticipantId::new();
        let result = handle
            .join(bob, "soft-owl".to_string(), false, false)
            .await
            .unwrap();
        assert_eq!(result.roster.len(), 1);

        let view = handle.get_state().await.unwrap();
        assert_eq!(view.snapshot.current_participants, 2);
        assert_eq!(
            view.snapshot.current_participants,
            view.snapshot.participants.len()
        );

        // The snapshot round-trips through the store.
        let stored: SessionSnapshot = store
            .get_json(&keys::session_state(&handle.session_id()))
            .await
            .unwrap()
            .expect("snapshot persisted");
        assert_eq!(stored.current_participants, 2);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_duplicate_join_is_idempotent() {
        let (deps, _store, _router) = TestDeps::new().build();
        let (handle, _task) = spawn_session(deps);

        let alice = ParticipantId::new();
        let first = handle
            .join(alice, "quiet-fox".to_string(), false, false)
            .await
            .unwrap();
        assert!(!first.rejoined);

        // Same id joins again with updated fields.
        let second = handle
            .join(alice, "brave-fox".to_string(), false, true)
            .await
            .unwrap();
        assert!(second.rejoined);
        assert_eq!(second.participant.alias, "brave-fox");
        assert!(second.participant.is_moderator);

        let view = handle.get_state().await.unwrap();
        assert_eq!(view.snapshot.current_participants, 1, "no duplicate entry");

        handle.cancel();
    }

    #[tokio::test]
    async fn test_join_capacity_limit() {
        let (deps, _store, _router) = TestDeps::new().build();
        let (handle, _task) = spawn_session(deps); // capacity 4

        for n in 0..4 {
            handle
                .join(ParticipantId::new(), format!("guest-{n}"), false, false)
                .await
                .unwrap();
        }

        let result = handle
            .join(ParticipantId::new(), "one-too-many".to_string(), false, false)
            .await;
        assert!(matches!(result, Err(ScError::SessionCapacityExceeded(_))));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_leave_unknown_participant_is_not_found() {
        let (deps, _store, _router) = TestDeps::new().build();
        let (handle, _task) = spawn_session(deps);

        let result = handle.leave(ParticipantId::new()).await;
        assert!(matches!(result, Err(ScError::ParticipantNotFound(_))));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_banned_participant_cannot_rejoin() {
        let (deps, _store, _router) = TestDeps::new().build();
        let (handle, _task) = spawn_session(deps);

        let moderator = ParticipantId::new();
        let target = ParticipantId::new();
        handle
            .join(moderator, "keeper".to_string(), false, true)
            .await
            .unwrap();
        handle
            .join(target, "trouble".to_string(), false, false)
            .await
            .unwrap();

        handle.ban(moderator, target).await.unwrap();

        let view = handle.get_state().await.unwrap();
        assert_eq!(view.snapshot.current_participants, 1);

        let rejoin = handle
            .join(target, "trouble".to_string(), false, false)
            .await;
        assert!(matches!(rejoin, Err(ScError::PermissionDenied(_))));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_moderator_actions_require_authority() {
        let (deps, _store, _router) = TestDeps::new().build();
        let (handle, _task) = spawn_session(deps);

        let regular = ParticipantId::new();
        let other = ParticipantId::new();
        handle
            .join(regular, "guest-a".to_string(), false, false)
            .await
            .unwrap();
        handle
            .join(other, "guest-b".to_string(), false, false)
            .await
            .unwrap();

        let result = handle.set_muted(regular, other, true).await;
        assert!(matches!(result, Err(ScError::PermissionDenied(_))));

        let result = handle.kick(regular, other).await;
        assert!(matches!(result, Err(ScError::PermissionDenied(_))));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_host_cannot_be_removed() {
        let (deps, _store, _router) = TestDeps::new().build();
        let (handle, _task) = spawn_session(deps);

        let host = ParticipantId::new();
        let moderator = ParticipantId::new();
        handle
            .join(host, "host".to_string(), true, false)
            .await
            .unwrap();
        handle
            .join(moderator, "keeper".to_string(), false, true)
            .await
            .unwrap();

        let result = handle.kick(moderator, host).await;
        assert!(matches!(result, Err(ScError::PermissionDenied(_))));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_muted_participant_cannot_send() {
        let (deps, _store, _router) = TestDeps::new().build();
        let (handle, _task) = spawn_session(deps);

        let moderator = ParticipantId::new();
        let target = ParticipantId::new();
        handle
            .join(moderator, "keeper".to_string(), false, true)
            .await
            .unwrap();
        handle
            .join(target, "guest".to_string(), false, false)
            .await
            .unwrap();

        handle.set_muted(moderator, target, true).await.unwrap();

        let result = handle.send_message(target, "hello".to_string()).await;
        assert!(matches!(result, Err(ScError::PermissionDenied(_))));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_voice_settings_validated_and_persisted() {
        let (deps, store, _router) = TestDeps::new().build();
        let (handle, _task) = spawn_session(deps);

        let alice = ParticipantId::new();
        handle
            .join(alice, "quiet-fox".to_string(), false, false)
            .await
            .unwrap();

        let mut settings = VoiceSettings {
            voice_id: "warm-dusk".to_string(),
            stability: 0.5,
            similarity_boost: 0.7,
            style: 0.1,
        };
        handle
            .update_voice_settings(alice, settings.clone())
            .await
            .unwrap();

        let stored: VoiceSettings = store
            .get_json(&keys::participant_voice(&alice))
            .await
            .unwrap()
            .expect("settings persisted");
        assert_eq!(stored, settings);

        settings.stability = 2.0;
        let result = handle.update_voice_settings(alice, settings).await;
        assert!(matches!(result, Err(ScError::Validation(_))));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_empty_and_oversized_messages_rejected() {
        let (deps, _store, _router) = TestDeps::new().build();
        let (handle, _task) = spawn_session(deps);

        let alice = ParticipantId::new();
        handle
            .join(alice, "quiet-fox".to_string(), false, false)
            .await
            .unwrap();

        let result = handle.send_message(alice, "   ".to_string()).await;
        assert!(matches!(result, Err(ScError::Validation(_))));

        let result = handle
            .send_message(alice, "x".repeat(MAX_MESSAGE_LENGTH + 1))
            .await;
        assert!(matches!(result, Err(ScError::Validation(_))));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_end_session_clears_roster_and_persists_ended() {
        let (deps, store, _router) = TestDeps::new().build();
        let (handle, _task) = spawn_session(deps);

        handle
            .join(ParticipantId::new(), "guest".to_string(), false, false)
            .await
            .unwrap();

        handle.end("host closed the room".to_string()).await.unwrap();

        let stored: SessionSnapshot = store
            .get_json(&keys::session_state(&handle.session_id()))
            .await
            .unwrap()
            .expect("final snapshot persisted");
        assert_eq!(stored.status, SessionStatus::Ended);
        assert_eq!(stored.current_participants, 0);
        assert!(stored.participants.is_empty());
        assert!(handle.is_cancelled());
    }
