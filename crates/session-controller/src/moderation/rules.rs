//! Rule stage: category tables of keyword and pattern matchers.
//!
//! The rule stage always runs and is bounded-latency: a linear scan over
//! a fixed table, no external calls. For every match, a strictly higher
//! severity replaces the running verdict's severity/action/confidence;
//! every match contributes a flag regardless of whether it won.
//!
//! Confidence is fixed per matcher kind: 0.8 for keyword matches, 0.7 for
//! pattern matches. A critical match marks the verdict definitive, which
//! short-circuits the AI stage (the scan itself continues so the event
//! log carries every flag).

use super::{categories, ContentFlag, FlagSource, Verdict};
use common::types::{ModerationAction, Severity};
use regex::Regex;
use tracing::warn;

/// Confidence assigned to keyword matches.
pub const KEYWORD_CONFIDENCE: f64 = 0.8;

/// Confidence assigned to pattern matches.
pub const PATTERN_CONFIDENCE: f64 = 0.7;

/// One moderation category: matchers plus the verdict they imply.
pub struct CategoryRule {
    /// Category slug attached to flags (see [`categories`]).
    pub category: &'static str,
    pub severity: Severity,
    pub action: ModerationAction,
    /// Case-insensitive substring matchers.
    pub keywords: &'static [&'static str],
    /// Compiled pattern matchers.
    pub patterns: Vec<Regex>,
}

/// The fixed rule table scanned by stage 1.
pub struct RuleSet {
    rules: Vec<CategoryRule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RuleSet {
    /// The built-in category table.
    #[must_use]
    pub fn builtin() -> Self {
        let rules = vec![
            CategoryRule {
                category: categories::SUICIDE_IDEATION,
                severity: Severity::Critical,
                action: ModerationAction::ImmediateIntervention,
                keywords: &[
                    "kill myself",
                    "want to die",
                    "end my life",
                    "suicide",
                    "no reason to live",
                    "better off without me",
                ],
                patterns: Vec::new(),
            },
            CategoryRule {
                category: categories::SELF_HARM,
                severity: Severity::Critical,
                action: ModerationAction::ImmediateIntervention,
                keywords: &["hurt myself", "self harm", "cutting myself"],
                patterns: Vec::new(),
            },
            CategoryRule {
                category: categories::HARASSMENT,
                severity: Severity::High,
                action: ModerationAction::ImmediateIntervention,
                keywords: &["kill you", "hunt you down", "you should die"],
                patterns: Vec::new(),
            },
            CategoryRule {
                category: categories::HATE_SPEECH,
                severity: Severity::High,
                action: ModerationAction::WarnAndMonitor,
                keywords: &["your kind doesn't belong", "go back where you came from"],
                patterns: Vec::new(),
            },
            CategoryRule {
                category: categories::SPAM,
                severity: Severity::Medium,
                action: ModerationAction::AutoFilter,
                keywords: &["buy now", "free money", "click here", "limited offer"],
                patterns: compile_patterns(&[
                    // 20+ consecutive capitals (shouting floods)
                    r"[A-Z]{20,}",
                    // the same punctuation repeated 10+ times in a row
                    r"[!?.]{10,}",
                    // three or more links in one message
                    r"(?:https?://\S+\s*){3,}",
                ]),
            },
            CategoryRule {
                category: categories::PROFANITY,
                severity: Severity::Low,
                action: ModerationAction::WarnAndMonitor,
                keywords: &["damn", "crap", "screw you"],
                patterns: Vec::new(),
            },
        ];

        Self { rules }
    }

    /// Scan `content` against every rule and fold matches into a verdict.
    #[must_use]
    pub fn evaluate(&self, content: &str) -> Verdict {
        let lowered = content.to_lowercase();
        let mut verdict = Verdict::clean();

        for rule in &self.rules {
            for keyword in rule.keywords {
                if lowered.contains(keyword) {
                    apply_match(&mut verdict, rule, keyword, KEYWORD_CONFIDENCE);
                }
            }
            for pattern in &rule.patterns {
                if let Some(matched) = pattern.find(content) {
                    apply_match(&mut verdict, rule, matched.as_str(), PATTERN_CONFIDENCE);
                }
            }
        }

        verdict
    }
}

/// Record one match: always a flag, and a verdict upgrade when the rule's
/// severity is strictly greater than the running maximum.
fn apply_match(verdict: &mut Verdict, rule: &CategoryRule, evidence: &str, confidence: f64) {
    verdict.flags.push(ContentFlag {
        category: rule.category.to_string(),
        evidence: evidence.to_string(),
        source: FlagSource::Rule,
    });

    if rule.severity > verdict.severity {
        verdict.severity = rule.severity;
        verdict.action = rule.action;
        verdict.confidence = confidence;
    }

    if rule.severity == Severity::Critical {
        verdict.definitive = true;
    }
}

fn compile_patterns(sources: &[&str]) -> Vec<Regex> {
    sources
        .iter()
        .filter_map(|source| match Regex::new(source) {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(
                    target: "sc.moderation",
                    pattern = %source,
                    error = %e,
                    "Skipping unparsable rule pattern"
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_content_yields_clean_verdict() {
        let rules = RuleSet::builtin();
        let verdict = rules.evaluate("tonight was hard but talking here helps");

        assert_eq!(verdict.severity, Severity::None);
        assert_eq!(verdict.action, ModerationAction::None);
        assert!(verdict.flags.is_empty());
        assert!(!verdict.definitive);
    }

    #[test]
    fn test_crisis_keywords_are_definitive() {
        let rules = RuleSet::builtin();
        let verdict = rules.evaluate("I want to kill myself");

        assert_eq!(verdict.severity, Severity::Critical);
        assert_eq!(verdict.action, ModerationAction::ImmediateIntervention);
        assert!(verdict.definitive);
        assert_eq!(verdict.confidence, KEYWORD_CONFIDENCE);
        assert!(verdict
            .flags
            .iter()
            .any(|f| f.category == categories::SUICIDE_IDEATION));
    }

    #[test]
    fn test_caps_flood_matches_spam_pattern() {
        let rules = RuleSet::builtin();
        let verdict = rules.evaluate("AAAAAAAAAAAAAAAAAAAA");

        assert_eq!(verdict.severity, Severity::Medium);
        assert_eq!(verdict.action, ModerationAction::AutoFilter);
        assert!(!verdict.definitive);
        assert_eq!(verdict.confidence, PATTERN_CONFIDENCE);
        assert!(verdict.flags.iter().any(|f| f.category == categories::SPAM));
    }

    #[test]
    fn test_link_flood_matches_spam_pattern() {
        let rules = RuleSet::builtin();
        let verdict = rules
            .evaluate("https://a.example https://b.example https://c.example");

        assert_eq!(verdict.severity, Severity::Medium);
        assert_eq!(verdict.action, ModerationAction::AutoFilter);
    }

    #[test]
    fn test_highest_severity_wins_and_flags_accumulate() {
        let rules = RuleSet::builtin();
        // Profanity (low) plus a crisis keyword (critical) in one message.
        let verdict = rules.evaluate("damn it, I want to die");

        assert_eq!(verdict.severity, Severity::Critical);
        assert_eq!(verdict.action, ModerationAction::ImmediateIntervention);
        assert!(verdict.definitive);
        assert!(verdict.flags.len() >= 2);
        assert!(verdict
            .flags
            .iter()
            .any(|f| f.category == categories::PROFANITY));
        assert!(verdict
            .flags
            .iter()
            .any(|f| f.category == categories::SUICIDE_IDEATION));
    }

    #[test]
    fn test_lower_severity_match_does_not_downgrade() {
        let rules = RuleSet::builtin();
        // Crisis keyword first in the table, profanity later: the later,
        // lower-severity match must not replace the verdict.
        let verdict = rules.evaluate("no reason to live, damn");

        assert_eq!(verdict.severity, Severity::Critical);
        assert_eq!(verdict.confidence, KEYWORD_CONFIDENCE);
    }

    #[test]
    fn test_keyword_matching_is_case_insensitive() {
        let rules = RuleSet::builtin();
        let verdict = rules.evaluate("BUY NOW and get free money");

        assert_eq!(verdict.severity, Severity::Medium);
        assert_eq!(verdict.action, ModerationAction::AutoFilter);
        assert_eq!(verdict.confidence, KEYWORD_CONFIDENCE);
    }

    #[test]
    fn test_harassment_is_high_not_critical() {
        let rules = RuleSet::builtin();
        let verdict = rules.evaluate("I will hunt you down");

        assert_eq!(verdict.severity, Severity::High);
        assert!(!verdict.definitive, "only critical matches are definitive");
    }
}
