//! Semantic classifier stage.
//!
//! The classifier is an external HTTP service: request = content string
//! plus short context, response = structured JSON. The trait seam exists
//! so tests can substitute a scripted classifier; production uses
//! [`HttpClassifier`].
//!
//! # Security
//!
//! - The API key is sent as a bearer token and never logged
//! - Timeouts prevent hanging connections from stalling moderation
//! - Errors are logged server-side; callers fall back to the rule stage

use super::{AnalysisContext, ContentFlag, FlagSource};
use crate::errors::ScError;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use common::types::{ModerationAction, Severity};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{instrument, warn};

/// Verdict produced by the AI stage, merged into the rule verdict by the
/// pipeline.
#[derive(Debug, Clone)]
pub struct ClassifierVerdict {
    pub severity: Severity,
    pub action: ModerationAction,
    pub flags: Vec<ContentFlag>,
    pub confidence: f64,
    pub supportive_response: Option<String>,
    pub details: Option<String>,
}

/// Seam over the external semantic classifier.
#[async_trait]
pub trait SemanticClassifier: Send + Sync {
    /// Classify one piece of content.
    ///
    /// # Errors
    ///
    /// Returns `ScError::Classifier` on transport failure or a malformed
    /// response; the pipeline recovers with the rule-stage verdict.
    async fn classify(
        &self,
        content: &str,
        ctx: &AnalysisContext,
    ) -> Result<ClassifierVerdict, ScError>;
}

/// Request body sent to the classifier service.
#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    content: &'a str,
    session_id: String,
    participant_id: String,
}

/// One flag in the classifier response.
#[derive(Debug, Deserialize)]
struct ResponseFlag {
    category: String,
    #[serde(default)]
    evidence: String,
}

/// Structured classifier response.
///
/// Unknown severity/action strings fail deserialization, which the caller
/// treats the same as a transport error: fall back to the rule stage.
#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    severity: Severity,
    #[serde(default)]
    flags: Vec<ResponseFlag>,
    action: ModerationAction,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    supportive_response: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// HTTP implementation of the classifier seam.
pub struct HttpClassifier {
    client: Client,
    endpoint: String,
    api_key: SecretString,
}

impl HttpClassifier {
    /// Create a classifier client.
    ///
    /// # Errors
    ///
    /// Returns `ScError::Config` if the HTTP client cannot be built.
    pub fn new(
        endpoint: String,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, ScError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScError::Config(format!("failed to build classifier client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl SemanticClassifier for HttpClassifier {
    #[instrument(skip_all, fields(session_id = %ctx.session_id))]
    async fn classify(
        &self,
        content: &str,
        ctx: &AnalysisContext,
    ) -> Result<ClassifierVerdict, ScError> {
        let request = ClassifyRequest {
            content,
            session_id: ctx.session_id.to_string(),
            participant_id: ctx.participant_id.to_string(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(
                    target: "sc.moderation.classifier",
                    error = %e,
                    "Classifier request failed"
                );
                ScError::Classifier(format!("request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                target: "sc.moderation.classifier",
                status = %status,
                "Classifier returned error status"
            );
            return Err(ScError::Classifier(format!("status {status}")));
        }

        let parsed: ClassifyResponse = response.json().await.map_err(|e| {
            warn!(
                target: "sc.moderation.classifier",
                error = %e,
                "Classifier returned malformed response"
            );
            ScError::Classifier(format!("malformed response: {e}"))
        })?;

        Ok(verdict_from_response(parsed))
    }
}

fn verdict_from_response(response: ClassifyResponse) -> ClassifierVerdict {
    ClassifierVerdict {
        severity: response.severity,
        action: response.action,
        flags: response
            .flags
            .into_iter()
            .map(|flag| ContentFlag {
                category: flag.category,
                evidence: flag.evidence,
                source: FlagSource::Classifier,
            })
            .collect(),
        confidence: response.confidence.clamp(0.0, 1.0),
        supportive_response: response.supportive_response,
        details: response.details,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing_full() {
        let json = r#"{
            "severity": "high",
            "flags": [{"category": "distress", "evidence": "phrasing"}],
            "action": "immediate_intervention",
            "confidence": 0.92,
            "supportive_response": "You are not alone here.",
            "details": "escalating distress"
        }"#;

        let parsed: ClassifyResponse = serde_json::from_str(json).unwrap();
        let verdict = verdict_from_response(parsed);

        assert_eq!(verdict.severity, Severity::High);
        assert_eq!(verdict.action, ModerationAction::ImmediateIntervention);
        assert_eq!(verdict.confidence, 0.92);
        assert_eq!(verdict.flags.len(), 1);
        assert!(verdict
            .flags
            .iter()
            .all(|f| f.source == FlagSource::Classifier));
    }

    #[test]
    fn test_response_parsing_minimal() {
        let json = r#"{"severity": "none", "action": "none"}"#;

        let parsed: ClassifyResponse = serde_json::from_str(json).unwrap();
        let verdict = verdict_from_response(parsed);

        assert_eq!(verdict.severity, Severity::None);
        assert_eq!(verdict.action, ModerationAction::None);
        assert_eq!(verdict.confidence, 0.0);
        assert!(verdict.flags.is_empty());
        assert!(verdict.supportive_response.is_none());
    }

    #[test]
    fn test_unknown_severity_fails_parsing() {
        let json = r#"{"severity": "catastrophic", "action": "none"}"#;
        let parsed: Result<ClassifyResponse, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let json = r#"{"severity": "low", "action": "none", "confidence": 3.5}"#;
        let parsed: ClassifyResponse = serde_json::from_str(json).unwrap();
        let verdict = verdict_from_response(parsed);
        assert_eq!(verdict.confidence, 1.0);
    }
}
