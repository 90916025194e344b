//! HTTP classifier contract tests against a mock provider.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use common::secret::SecretString;
use common::types::{ModerationAction, ParticipantId, Severity, SessionId};
use session_controller::errors::ScError;
use session_controller::moderation::classifier::{HttpClassifier, SemanticClassifier};
use session_controller::moderation::AnalysisContext;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ctx() -> AnalysisContext {
    AnalysisContext {
        session_id: SessionId::new(),
        participant_id: ParticipantId::new(),
        ai_monitoring: true,
    }
}

fn classifier_for(server: &MockServer) -> HttpClassifier {
    HttpClassifier::new(
        format!("{}/v1/classify", server.uri()),
        SecretString::from("test-key"),
        Duration::from_secs(2),
    )
    .unwrap()
}

#[tokio::test]
async fn parses_structured_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/classify"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "content": "I feel like a burden to everyone"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "severity": "high",
            "flags": [{"category": "suicide_ideation", "evidence": "burden ideation"}],
            "action": "immediate_intervention",
            "confidence": 0.87,
            "supportive_response": "You are not a burden here.",
            "details": "indirect ideation phrasing"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let classifier = classifier_for(&server);
    let verdict = classifier
        .classify("I feel like a burden to everyone", &ctx())
        .await
        .unwrap();

    assert_eq!(verdict.severity, Severity::High);
    assert_eq!(verdict.action, ModerationAction::ImmediateIntervention);
    assert_eq!(verdict.confidence, 0.87);
    assert_eq!(verdict.flags.len(), 1);
    assert_eq!(
        verdict.supportive_response.as_deref(),
        Some("You are not a burden here.")
    );
}

#[tokio::test]
async fn malformed_body_is_a_classifier_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/classify"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
        .mount(&server)
        .await;

    let classifier = classifier_for(&server);
    let result = classifier.classify("some content here", &ctx()).await;
    assert!(matches!(result, Err(ScError::Classifier(_))));
}

#[tokio::test]
async fn unknown_severity_is_a_classifier_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/classify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "severity": "apocalyptic",
            "action": "none"
        })))
        .mount(&server)
        .await;

    let classifier = classifier_for(&server);
    let result = classifier.classify("some content here", &ctx()).await;
    assert!(matches!(result, Err(ScError::Classifier(_))));
}

#[tokio::test]
async fn error_status_is_a_classifier_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/classify"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let classifier = classifier_for(&server);
    let result = classifier.classify("some content here", &ctx()).await;
    assert!(matches!(result, Err(ScError::Classifier(_))));
}
