//! Moderation gate — keeps blocked restricted content away from the backend.
//!
//! Only `Role::Restricted` content is checked. A blocked message never reaches
//! inference; the moderator's pre-authored safe response is returned instead.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::moderation::ContentModerator;
use crate::pipeline::classifier::Role;

/// Category reported when the moderation engine itself fails closed.
pub const MODERATION_UNAVAILABLE: &str = "moderation_unavailable";

/// What the gate does when the moderation engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationFailurePolicy {
    /// Treat the message as blocked.
    FailClosed,
    /// Let the message through and log a warning.
    FailOpen,
}

/// Gate decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResult {
    /// Forward this content to the backend.
    Allow(String),
    /// Reply with `reply` and do not call the backend.
    Block {
        reply: String,
        category: String,
        reason: String,
    },
}

/// Consults the moderation engine for restricted senders.
pub struct ModerationGate {
    moderator: Arc<dyn ContentModerator>,
    policy: ModerationFailurePolicy,
}

impl ModerationGate {
    pub fn new(moderator: Arc<dyn ContentModerator>, policy: ModerationFailurePolicy) -> Self {
        Self { moderator, policy }
    }

    pub fn policy(&self) -> ModerationFailurePolicy {
        self.policy
    }

    /// Decide whether `content` may reach the backend.
    pub async fn gate(&self, content: &str, role: Role) -> GateResult {
        if role != Role::Restricted {
            return GateResult::Allow(content.to_string());
        }

        match self.moderator.check(content).await {
            Ok(verdict) if verdict.allowed => {
                debug!("Restricted content allowed by moderation");
                GateResult::Allow(content.to_string())
            }
            Ok(verdict) => {
                let category = verdict
                    .category
                    .unwrap_or_else(|| "unspecified".to_string());
                let reason = verdict
                    .reason
                    .unwrap_or_else(|| format!("Blocked {category}"));
                warn!(category = %category, reason = %reason, "Blocked restricted request");
                GateResult::Block {
                    reply: self.moderator.safe_response(&category),
                    category,
                    reason,
                }
            }
            Err(e) => match self.policy {
                ModerationFailurePolicy::FailClosed => {
                    error!(error = %e, "Moderation check failed, blocking message");
                    GateResult::Block {
                        reply: self.moderator.safe_response(MODERATION_UNAVAILABLE),
                        category: MODERATION_UNAVAILABLE.to_string(),
                        reason: format!("Moderation unavailable: {e}"),
                    }
                }
                ModerationFailurePolicy::FailOpen => {
                    warn!(error = %e, "Moderation check failed, allowing message (fail-open)");
                    GateResult::Allow(content.to_string())
                }
            },
        }
    }
}
