//! `SessionDirectory` behavioural tests.
//!
//! Relocated verbatim from the in-module `#[cfg(test)] mod tests` block into
//! the integration-test directory. See `session_actor.rs` for why: the
//! `sc-test-utils` fixtures crate depends on `session-controller`, so these
//! must run as integration tests (crate compiled once) rather than in-crate
//! unit tests (crate compiled twice). Every test and assertion is unchanged.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use common::types::ParticipantId;
use sc_test_utils::{test_create_params, TestDeps};
use session_controller::actors::directory::{DirectoryLimits, SessionDirectoryHandle};
use session_controller::actors::{ModerationSettings, SessionSnapshot};
use session_controller::errors::ScError;
use session_controller::store::keys;
use common::types::SessionStatus;
use std::time::Duration;

    fn directory_with_limits(max_sessions: usize) -> SessionDirectoryHandle {
        let (deps, _store, _router) = TestDeps::new().build();
        SessionDirectoryHandle::new(
            "sc-test".to_string(),
            DirectoryLimits {
                max_sessions,
                max_participants_per_session: 10,
            },
            deps,
        )
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let directory = directory_with_limits(10);
        let host = ParticipantId::new();

        let info = directory
            .create_session(test_create_params("grief support", host))
            .await
            .unwrap();
        assert_eq!(info.topic, "grief support");
        assert_eq!(info.participant_count, 0);

        let handle = directory.session(info.session_id).await.unwrap();
        assert_eq!(handle.session_id(), info.session_id);

        directory.cancel();
    }

    #[tokio::test]
    async fn test_duplicate_session_id_conflicts() {
        let directory = directory_with_limits(10);
        let host = ParticipantId::new();

        let mut params = test_create_params("first", host);
        params.session_id = Some(common::types::SessionId::new());
        directory.create_session(params.clone()).await.unwrap();

        let result = directory.create_session(params).await;
        assert!(matches!(result, Err(ScError::Conflict(_))));

        directory.cancel();
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let directory = directory_with_limits(10);

        let result = directory.session(common::types::SessionId::new()).await;
        assert!(matches!(result, Err(ScError::SessionNotFound(_))));

        directory.cancel();
    }

    #[tokio::test]
    async fn test_session_capacity_sheds_creates() {
        let directory = directory_with_limits(1);
        let host = ParticipantId::new();

        directory
            .create_session(test_create_params("only room", host))
            .await
            .unwrap();

        let result = directory
            .create_session(test_create_params("overflow", host))
            .await;
        assert!(matches!(result, Err(ScError::ControllerCapacityExceeded)));

        directory.cancel();
    }

    #[tokio::test]
    async fn test_empty_topic_rejected() {
        let directory = directory_with_limits(10);

        let result = directory
            .create_session(test_create_params("   ", ParticipantId::new()))
            .await;
        assert!(matches!(result, Err(ScError::Validation(_))));

        directory.cancel();
    }

    #[tokio::test]
    async fn test_remove_session() {
        let directory = directory_with_limits(10);
        let info = directory
            .create_session(test_create_params("short-lived", ParticipantId::new()))
            .await
            .unwrap();

        directory.remove_session(info.session_id).await.unwrap();

        let status = directory.status().await.unwrap();
        assert_eq!(status.active_sessions, 0);

        let result = directory.remove_session(info.session_id).await;
        assert!(matches!(result, Err(ScError::SessionNotFound(_))));

        directory.cancel();
    }

    #[tokio::test]
    async fn test_status_reports_counts() {
        let directory = directory_with_limits(10);

        let status = directory.status().await.unwrap();
        assert_eq!(status.active_sessions, 0);
        assert!(status.accepting_new);

        directory
            .create_session(test_create_params("room", ParticipantId::new()))
            .await
            .unwrap();
        let status = directory.status().await.unwrap();
        assert_eq!(status.active_sessions, 1);

        directory.cancel();
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let directory = directory_with_limits(10);

        directory.shutdown(Duration::from_secs(1)).await.unwrap();
        assert!(directory.is_cancelled());
    }

    #[tokio::test]
    async fn test_rehydrates_live_session_from_store() {
        let (deps, store, _router) = TestDeps::new().build();
        let directory = SessionDirectoryHandle::new(
            "sc-test".to_string(),
            DirectoryLimits {
                max_sessions: 10,
                max_participants_per_session: 10,
            },
            deps,
        );

        // A live snapshot written by "another instance".
        let session_id = common::types::SessionId::new();
        let now = chrono::Utc::now().timestamp();
        let snapshot = SessionSnapshot {
            session_id,
            topic: "carried over".to_string(),
            host_id: ParticipantId::new(),
            status: SessionStatus::Live,
            participants: Vec::new(),
            current_participants: 0,
            moderation: ModerationSettings::default(),
            created_at: now,
            expires_at: now + 3600,
        };
        store
            .put_json(
                &keys::session_state(&session_id),
                &snapshot,
                std::time::Duration::from_secs(3600),
            )
            .await
            .unwrap();

        let handle = directory.session(session_id).await.unwrap();
        assert_eq!(handle.session_id(), session_id);

        let view = handle.get_state().await.unwrap();
        assert_eq!(view.snapshot.topic, "carried over");

        directory.cancel();
    }
