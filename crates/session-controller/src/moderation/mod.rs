//! Two-stage content moderation pipeline.
//!
//! Stage 1 always runs: a bounded-latency scan of category rules
//! ([`rules::RuleSet`]). Stage 2 is the external semantic classifier
//! ([`classifier::SemanticClassifier`]), skipped when stage 1 already
//! produced a definitive (critical) verdict or the content is below the
//! minimum analysis length.
//!
//! # Merge semantics
//!
//! The AI verdict merges into the rule verdict by taking the higher
//! severity; on a tie the rule verdict stands. Confidence becomes the
//! maximum of the two stages. Flags from both stages are concatenated -
//! each flag is categorized evidence, not a unique key.
//!
//! # Failure semantics
//!
//! A classifier error or malformed response degrades to the rule-stage
//! verdict with a warning; it never blocks message flow. Every produced
//! verdict is persisted as a [`ModerationEvent`] before being returned;
//! a persistence failure is logged and does not drop the verdict.

pub mod classifier;
pub mod rules;

use crate::store::{keys, retention, StateStore};
use common::types::{ModerationAction, ParticipantId, Severity, SessionId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use classifier::{ClassifierVerdict, SemanticClassifier};
use rules::RuleSet;

/// Minimum content length (bytes) for the AI stage. Shorter content is
/// covered by the rule stage alone.
pub const MIN_AI_CONTENT_LENGTH: usize = 12;

/// Maximum characters of content retained in a persisted moderation event.
const EVENT_SNIPPET_CHARS: usize = 200;

/// Flag categories shared by the rule tables and the crisis checks.
/// The classifier may emit categories outside this set; they are carried
/// as evidence but trigger no category-specific behavior.
pub mod categories {
    pub const SELF_HARM: &str = "self_harm";
    pub const SUICIDE_IDEATION: &str = "suicide_ideation";
    pub const HARASSMENT: &str = "harassment";
    pub const HATE_SPEECH: &str = "hate_speech";
    pub const SPAM: &str = "spam";
    pub const PROFANITY: &str = "profanity";
}

/// Which stage produced a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagSource {
    /// Keyword or pattern rule.
    Rule,
    /// External semantic classifier.
    Classifier,
}

/// One piece of categorized evidence attached to a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFlag {
    /// Category slug (see [`categories`]).
    pub category: String,
    /// The matched text or classifier rationale.
    pub evidence: String,
    /// Which stage produced this flag.
    pub source: FlagSource,
}

/// Context for one analysis call.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisContext {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    /// Whether the session has AI monitoring enabled; when false the
    /// pipeline runs the rule stage only.
    pub ai_monitoring: bool,
}

/// The pipeline's output for one piece of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub severity: Severity,
    pub action: ModerationAction,
    pub flags: Vec<ContentFlag>,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// A critical rule match makes the verdict definitive, skipping the
    /// AI stage.
    pub definitive: bool,
    /// Supportive auto-response supplied by the classifier, broadcast by
    /// the escalation engine on immediate intervention.
    pub supportive_response: Option<String>,
    pub details: Option<String>,
}

impl Verdict {
    /// A clean verdict: no severity, no action.
    #[must_use]
    pub fn clean() -> Self {
        Self {
            severity: Severity::None,
            action: ModerationAction::None,
            flags: Vec::new(),
            confidence: 0.0,
            definitive: false,
            supportive_response: None,
            details: None,
        }
    }

    /// Whether the flags include a crisis category (self-harm or
    /// suicide ideation).
    #[must_use]
    pub fn is_crisis(&self) -> bool {
        self.flags.iter().any(|flag| {
            flag.category == categories::SELF_HARM || flag.category == categories::SUICIDE_IDEATION
        })
    }
}

/// Immutable record of one analysis, appended to the session's
/// moderation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationEvent {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    /// Leading snippet of the analyzed content.
    pub content: String,
    pub severity: Severity,
    pub flags: Vec<ContentFlag>,
    pub action: ModerationAction,
    pub confidence: f64,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
}

/// The two-stage moderation pipeline.
pub struct ModerationPipeline {
    rules: RuleSet,
    classifier: Arc<dyn SemanticClassifier>,
    store: StateStore,
}

impl ModerationPipeline {
    /// Create a pipeline over the given classifier and store.
    #[must_use]
    pub fn new(rules: RuleSet, classifier: Arc<dyn SemanticClassifier>, store: StateStore) -> Self {
        Self {
            rules,
            classifier,
            store,
        }
    }

    /// Classify one piece of content and persist the resulting event.
    #[instrument(skip_all, fields(session_id = %ctx.session_id, participant_id = %ctx.participant_id))]
    pub async fn analyze(&self, content: &str, ctx: &AnalysisContext) -> Verdict {
        let mut verdict = self.rules.evaluate(content);

        let run_ai =
            ctx.ai_monitoring && !verdict.definitive && content.len() >= MIN_AI_CONTENT_LENGTH;
        if run_ai {
            match self.classifier.classify(content, ctx).await {
                Ok(ai_verdict) => {
                    verdict = merge_verdicts(verdict, ai_verdict);
                }
                Err(e) => {
                    warn!(
                        target: "sc.moderation",
                        error = %e,
                        "Classifier unavailable, keeping rule-stage verdict"
                    );
                }
            }
        } else {
            debug!(
                target: "sc.moderation",
                definitive = verdict.definitive,
                content_len = content.len(),
                "AI stage skipped"
            );
        }

        self.persist_event(content, ctx, &verdict).await;
        verdict
    }

    async fn persist_event(&self, content: &str, ctx: &AnalysisContext, verdict: &Verdict) {
        let event = ModerationEvent {
            session_id: ctx.session_id,
            participant_id: ctx.participant_id,
            content: content.chars().take(EVENT_SNIPPET_CHARS).collect(),
            severity: verdict.severity,
            flags: verdict.flags.clone(),
            action: verdict.action,
            confidence: verdict.confidence,
            timestamp: chrono::Utc::now().timestamp(),
        };

        if let Err(e) = self
            .store
            .append_json(
                &keys::moderation_log(&ctx.session_id),
                &event,
                retention::MODERATION_LOG,
            )
            .await
        {
            warn!(
                target: "sc.moderation",
                session_id = %ctx.session_id,
                error = %e,
                "Failed to persist moderation event"
            );
        }
    }
}

/// Merge the AI verdict into the rule verdict.
///
/// Higher severity wins; on a tie the rule verdict (already applied)
/// stands. Confidence takes the maximum of the two. Flags concatenate.
fn merge_verdicts(rule: Verdict, ai: ClassifierVerdict) -> Verdict {
    let ai_wins = ai.severity > rule.severity;

    let mut flags = rule.flags;
    flags.extend(ai.flags);

    Verdict {
        severity: if ai_wins { ai.severity } else { rule.severity },
        action: if ai_wins { ai.action } else { rule.action },
        flags,
        confidence: rule.confidence.max(ai.confidence),
        definitive: rule.definitive,
        supportive_response: ai.supportive_response,
        details: if ai_wins { ai.details } else { rule.details },
    }
}
