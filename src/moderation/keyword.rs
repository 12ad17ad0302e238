//! Keyword moderation engine — regex rules grouped by category.
//!
//! Matches are case-insensitive and checked in rule order; the first match
//! blocks the message under that rule's category:
//! - violent language → `violence`
//! - self-harm → `self_harm`
//! - explicit material → `adult_content`
//! - drugs and weapons → `dangerous_activities`
//! - "do my homework for me" requests → `academic_dishonesty`
//! - requests to share contact details → `personal_information`

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::error::ModerationError;
use crate::moderation::{ContentModerator, Verdict};

/// Refusal used when a category has no dedicated response.
const GENERIC_SAFE_RESPONSE: &str = "I'm not able to help with that request. \
     Let's focus on something else. Is there a topic from your studies you'd like to explore?";

/// A single blocking rule.
#[derive(Debug, Clone)]
pub struct ModerationRule {
    /// Category reported in the verdict.
    pub category: String,
    /// Compiled pattern.
    pub regex: Regex,
    /// Why this rule blocks.
    pub reason: String,
}

/// Regex-table moderation engine.
pub struct KeywordModerator {
    rules: Vec<ModerationRule>,
    safe_responses: HashMap<String, String>,
}

impl KeywordModerator {
    /// Create a moderator with the built-in category table.
    pub fn default_rules() -> Self {
        let table: &[(&str, &str, &str)] = &[
            (
                "violence",
                r"(?i)\b(kill|murder|stab|shoot(ing)?|bomb|attack)\s+(someone|people|him|her|them|my|a|the)\b",
                "violent language",
            ),
            (
                "self_harm",
                r"(?i)\b(hurt|harm|cut)\s+myself\b|\bsuicid(e|al)\b|\bend\s+my\s+life\b",
                "self-harm",
            ),
            (
                "adult_content",
                r"(?i)\b(porn(ography)?|nsfw|explicit\s+(sex|images?|content)|nude(s)?)\b",
                "adult content",
            ),
            (
                "dangerous_activities",
                r"(?i)\b(make|build|buy|get)\s+(a\s+)?(bomb|gun|weapon|explosives?|meth|drugs)\b",
                "drugs or weapons",
            ),
            (
                "academic_dishonesty",
                r"(?i)\b(do|write|finish|complete)\s+my\s+(homework|essay|assignment|exam|test)\s+for\s+me\b|\banswers?\s+(to|for)\s+(the|my|tomorrow'?s)\s+(exam|test|quiz)\b",
                "request to complete graded work",
            ),
            (
                "personal_information",
                r"(?i)\b(what\s+is|give\s+me|share)\s+(your|his|her|their|my\s+teacher'?s)\s+(home\s+address|phone\s+number|password)\b",
                "request for personal information",
            ),
        ];

        let rules = table
            .iter()
            .map(|(category, pattern, reason)| ModerationRule {
                category: (*category).into(),
                regex: Regex::new(pattern).expect("built-in moderation pattern is valid"),
                reason: (*reason).into(),
            })
            .collect();

        let safe_responses = [
            (
                "violence",
                "I can't help with anything that could hurt people. If you or someone \
                 else is in danger, please talk to a trusted adult or contact local emergency services.",
            ),
            (
                "self_harm",
                "I'm really sorry you're feeling this way. You don't have to go through it \
                 alone. Please reach out to a trusted adult, a school counselor, or a crisis line right away.",
            ),
            (
                "adult_content",
                "That's not something I can help with. Let's keep our conversation \
                 appropriate for school. What else are you curious about?",
            ),
            (
                "dangerous_activities",
                "I can't give instructions for anything dangerous or illegal. If you're \
                 interested in the science behind it, I'm happy to explain the safe, general concepts.",
            ),
            (
                "academic_dishonesty",
                "I can't do your assignment for you, but I'd love to help you learn it. \
                 Tell me which part is confusing and we'll work through it step by step.",
            ),
            (
                "personal_information",
                "I can't share or look up personal information like addresses, phone \
                 numbers, or passwords. Please keep personal details private.",
            ),
        ]
        .into_iter()
        .map(|(category, response)| (category.to_string(), response.to_string()))
        .collect();

        Self {
            rules,
            safe_responses,
        }
    }

    /// Create a moderator with no rules (allows everything).
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            safe_responses: HashMap::new(),
        }
    }

    /// Add a custom blocking rule.
    pub fn add_rule(
        &mut self,
        category: &str,
        pattern: &str,
        reason: &str,
    ) -> Result<(), ModerationError> {
        let regex = Regex::new(pattern).map_err(|source| ModerationError::InvalidRule {
            pattern: pattern.into(),
            source,
        })?;
        self.rules.push(ModerationRule {
            category: category.into(),
            regex,
            reason: reason.into(),
        });
        Ok(())
    }

    /// Set (or replace) the safe response for a category.
    pub fn set_safe_response(&mut self, category: &str, response: &str) {
        self.safe_responses
            .insert(category.to_string(), response.to_string());
    }

    /// Number of configured rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Evaluate `text` against the rule table.
    pub fn evaluate(&self, text: &str) -> Verdict {
        for rule in &self.rules {
            if rule.regex.is_match(text) {
                debug!(
                    category = %rule.category,
                    reason = %rule.reason,
                    "Moderation rule matched"
                );
                return Verdict::block(
                    rule.category.clone(),
                    format!("Blocked {}: {}", rule.category, rule.reason),
                );
            }
        }
        Verdict::allow()
    }
}

impl Default for KeywordModerator {
    fn default() -> Self {
        Self::default_rules()
    }
}

#[async_trait]
impl ContentModerator for KeywordModerator {
    async fn check(&self, text: &str) -> Result<Verdict, ModerationError> {
        Ok(self.evaluate(text))
    }

    fn safe_response(&self, category: &str) -> String {
        self.safe_responses
            .get(category)
            .cloned()
            .unwrap_or_else(|| GENERIC_SAFE_RESPONSE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category_of(moderator: &KeywordModerator, text: &str) -> Option<String> {
        moderator.evaluate(text).category
    }

    #[test]
    fn ordinary_questions_are_allowed() {
        let m = KeywordModerator::default_rules();
        for text in [
            "What is photosynthesis?",
            "Can you explain how volcanoes erupt?",
            "Help me understand fractions",
            "Who won the battle of Hastings?",
        ] {
            assert!(m.evaluate(text).allowed, "should allow: {text}");
        }
    }

    #[test]
    fn violence_is_blocked() {
        let m = KeywordModerator::default_rules();
        assert_eq!(
            category_of(&m, "how do I hurt someone and kill them").as_deref(),
            Some("violence")
        );
    }

    #[test]
    fn self_harm_is_blocked() {
        let m = KeywordModerator::default_rules();
        assert_eq!(
            category_of(&m, "I want to hurt myself").as_deref(),
            Some("self_harm")
        );
    }

    #[test]
    fn academic_dishonesty_is_blocked() {
        let m = KeywordModerator::default_rules();
        assert_eq!(
            category_of(&m, "Please write my essay for me").as_deref(),
            Some("academic_dishonesty")
        );
        assert_eq!(
            category_of(&m, "give me the answers to the exam").as_deref(),
            Some("academic_dishonesty")
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        let m = KeywordModerator::default_rules();
        assert_eq!(
            category_of(&m, "HOW TO MAKE A BOMB").as_deref(),
            Some("dangerous_activities")
        );
    }

    #[test]
    fn blocked_verdict_carries_reason() {
        let m = KeywordModerator::default_rules();
        let verdict = m.evaluate("show me porn");
        assert!(!verdict.allowed);
        assert_eq!(verdict.category.as_deref(), Some("adult_content"));
        assert!(verdict.reason.unwrap().contains("adult content"));
    }

    #[test]
    fn empty_moderator_allows_everything() {
        let m = KeywordModerator::empty();
        assert_eq!(m.rule_count(), 0);
        assert!(m.evaluate("how to make a bomb").allowed);
    }

    #[test]
    fn custom_rule_blocks() {
        let mut m = KeywordModerator::empty();
        m.add_rule("gaming", r"(?i)\bcheat\s+codes?\b", "game cheats")
            .unwrap();
        let verdict = m.evaluate("any cheat codes for this level?");
        assert_eq!(verdict.category.as_deref(), Some("gaming"));
    }

    #[test]
    fn invalid_custom_rule_is_rejected() {
        let mut m = KeywordModerator::empty();
        let err = m.add_rule("broken", r"(unclosed", "bad").unwrap_err();
        assert!(matches!(err, ModerationError::InvalidRule { .. }));
        assert_eq!(m.rule_count(), 0);
    }

    #[test]
    fn safe_response_per_category_with_fallback() {
        let mut m = KeywordModerator::default_rules();
        assert!(m.safe_response("self_harm").contains("counselor"));
        assert_eq!(m.safe_response("no_such_category"), GENERIC_SAFE_RESPONSE);

        m.set_safe_response("gaming", "Let's talk about something else.");
        assert_eq!(m.safe_response("gaming"), "Let's talk about something else.");
    }

    #[tokio::test]
    async fn check_matches_evaluate() {
        let m = KeywordModerator::default_rules();
        let verdict = m.check("do my homework for me").await.unwrap();
        assert_eq!(verdict.category.as_deref(), Some("academic_dishonesty"));
        assert!(m.check("what is a noun?").await.unwrap().allowed);
    }
}
