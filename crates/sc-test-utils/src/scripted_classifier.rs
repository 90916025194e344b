//! Scripted semantic classifier for tests.
//!
//! Implements the classifier seam without any network: tests script the
//! verdicts (or failures) it returns and assert on how it was called.

use async_trait::async_trait;
use common::types::{ModerationAction, Severity};
use session_controller::errors::ScError;
use session_controller::moderation::classifier::{ClassifierVerdict, SemanticClassifier};
use session_controller::moderation::{AnalysisContext, ContentFlag, FlagSource};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

enum ScriptedResponse {
    Verdict(ClassifierVerdict),
    Failure(String),
}

struct Inner {
    /// Queued responses consumed front-first; the last one repeats.
    script: Mutex<VecDeque<ScriptedResponse>>,
    calls: AtomicUsize,
    last_content: Mutex<Option<String>>,
    /// Artificial classification latency, for in-flight-analysis tests.
    delay: Mutex<Option<std::time::Duration>>,
}

/// A classifier whose responses are scripted by the test.
#[derive(Clone)]
pub struct ScriptedClassifier {
    inner: Arc<Inner>,
}

impl ScriptedClassifier {
    fn with_response(response: ScriptedResponse) -> Self {
        Self {
            inner: Arc::new(Inner {
                script: Mutex::new(VecDeque::from([response])),
                calls: AtomicUsize::new(0),
                last_content: Mutex::new(None),
                delay: Mutex::new(None),
            }),
        }
    }

    /// Delay every classification by `duration` (simulates a slow
    /// external classifier with analysis still in flight).
    #[must_use]
    pub fn with_delay(self, duration: std::time::Duration) -> Self {
        *self.inner.delay.lock().unwrap() = Some(duration);
        self
    }

    /// Always returns a clean verdict.
    #[must_use]
    pub fn clean() -> Self {
        Self::with_response(ScriptedResponse::Verdict(ClassifierVerdict {
            severity: Severity::None,
            action: ModerationAction::None,
            flags: Vec::new(),
            confidence: 0.95,
            supportive_response: None,
            details: None,
        }))
    }

    /// Always returns the given verdict parameters, with a single
    /// classifier-sourced flag.
    #[must_use]
    pub fn returning(
        severity: Severity,
        action: ModerationAction,
        confidence: f64,
        category: &str,
    ) -> Self {
        Self::with_response(ScriptedResponse::Verdict(ClassifierVerdict {
            severity,
            action,
            flags: vec![ContentFlag {
                category: category.to_string(),
                evidence: "scripted".to_string(),
                source: FlagSource::Classifier,
            }],
            confidence,
            supportive_response: None,
            details: Some("scripted verdict".to_string()),
        }))
    }

    /// Always fails, as a timed-out or malformed classifier would.
    #[must_use]
    pub fn failing(reason: &str) -> Self {
        Self::with_response(ScriptedResponse::Failure(reason.to_string()))
    }

    /// Attach a supportive response to the scripted verdict.
    #[must_use]
    pub fn with_supportive_response(self, text: &str) -> Self {
        {
            let mut script = self.inner.script.lock().unwrap();
            for response in script.iter_mut() {
                if let ScriptedResponse::Verdict(verdict) = response {
                    verdict.supportive_response = Some(text.to_string());
                }
            }
        }
        self
    }

    /// Queue an additional response after the current ones.
    #[must_use]
    pub fn then_returning(self, severity: Severity, action: ModerationAction) -> Self {
        {
            let mut script = self.inner.script.lock().unwrap();
            script.push_back(ScriptedResponse::Verdict(ClassifierVerdict {
                severity,
                action,
                flags: Vec::new(),
                confidence: 0.9,
                supportive_response: None,
                details: None,
            }));
        }
        self
    }

    /// How many times `classify` was invoked.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// The content of the most recent `classify` call.
    #[must_use]
    pub fn last_content(&self) -> Option<String> {
        self.inner.last_content.lock().unwrap().clone()
    }
}

#[async_trait]
impl SemanticClassifier for ScriptedClassifier {
    async fn classify(
        &self,
        content: &str,
        _ctx: &AnalysisContext,
    ) -> Result<ClassifierVerdict, ScError> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        *self.inner.last_content.lock().unwrap() = Some(content.to_string());

        let delay = *self.inner.delay.lock().unwrap();
        if let Some(duration) = delay {
            tokio::time::sleep(duration).await;
        }

        let mut script = self.inner.script.lock().unwrap();
        let response = if script.len() > 1 {
            script.pop_front()
        } else {
            None
        };
        let response = match response {
            Some(r) => r,
            None => match script.front() {
                Some(ScriptedResponse::Verdict(v)) => ScriptedResponse::Verdict(v.clone()),
                Some(ScriptedResponse::Failure(reason)) => {
                    ScriptedResponse::Failure(reason.clone())
                }
                None => ScriptedResponse::Failure("script exhausted".to_string()),
            },
        };

        match response {
            ScriptedResponse::Verdict(verdict) => Ok(verdict),
            ScriptedResponse::Failure(reason) => Err(ScError::Classifier(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::{ParticipantId, SessionId};

    fn ctx() -> AnalysisContext {
        AnalysisContext {
            session_id: SessionId::new(),
            participant_id: ParticipantId::new(),
            ai_monitoring: true,
        }
    }

    #[tokio::test]
    async fn test_clean_classifier_records_calls() {
        let classifier = ScriptedClassifier::clean();
        assert_eq!(classifier.calls(), 0);

        let verdict = classifier.classify("hello there", &ctx()).await.unwrap();
        assert_eq!(verdict.severity, Severity::None);
        assert_eq!(classifier.calls(), 1);
        assert_eq!(classifier.last_content().as_deref(), Some("hello there"));
    }

    #[tokio::test]
    async fn test_failing_classifier_errors() {
        let classifier = ScriptedClassifier::failing("timeout");
        let result = classifier.classify("anything", &ctx()).await;
        assert!(matches!(result, Err(ScError::Classifier(_))));
    }

    #[tokio::test]
    async fn test_queued_responses_consume_in_order() {
        let classifier = ScriptedClassifier::clean()
            .then_returning(Severity::High, ModerationAction::ImmediateIntervention);

        let first = classifier.classify("a", &ctx()).await.unwrap();
        assert_eq!(first.severity, Severity::None);

        let second = classifier.classify("b", &ctx()).await.unwrap();
        assert_eq!(second.severity, Severity::High);

        // The final response repeats.
        let third = classifier.classify("c", &ctx()).await.unwrap();
        assert_eq!(third.severity, Severity::High);
    }
}
