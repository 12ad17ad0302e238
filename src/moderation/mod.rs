//! Content moderation for restricted senders.
//!
//! The relay only sees moderation through the `ContentModerator` trait.
//! `KeywordModerator` is the built-in engine: a category table of regex rules
//! with a pre-authored safe response per category.

pub mod keyword;

use async_trait::async_trait;

use crate::error::ModerationError;

pub use keyword::KeywordModerator;

/// Outcome of a single moderation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub allowed: bool,
    /// Category of the blocked content (only set when blocked).
    pub category: Option<String>,
    /// Human-readable explanation (only set when blocked).
    pub reason: Option<String>,
}

impl Verdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            category: None,
            reason: None,
        }
    }

    pub fn block(category: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            category: Some(category.into()),
            reason: Some(reason.into()),
        }
    }
}

/// A moderation engine.
#[async_trait]
pub trait ContentModerator: Send + Sync {
    /// Decide whether `text` may be forwarded to the inference backend.
    async fn check(&self, text: &str) -> Result<Verdict, ModerationError>;

    /// The reply sent in place of a backend answer for a blocked `category`.
    ///
    /// Unknown categories get a generic refusal.
    fn safe_response(&self, category: &str) -> String;
}
