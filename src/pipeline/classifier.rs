//! Role classification — decides what the router does with an envelope.

use crate::envelope::{Envelope, MessageKind};

/// What an envelope is, from the router's point of view.
///
/// This is the only input to the moderation decision: a `Restricted`
/// envelope must never be treated as `OrdinaryUser`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// A reply this relay published. Skipped to avoid feedback loops.
    OwnOutput,
    /// Forwarded to the backend without moderation.
    OrdinaryUser,
    /// Forwarded only if moderation allows it.
    Restricted,
    /// Nothing to act on.
    Ignore,
}

impl Role {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::OwnOutput => "own_output",
            Self::OrdinaryUser => "ordinary_user",
            Self::Restricted => "restricted",
            Self::Ignore => "ignore",
        }
    }
}

/// Classify an envelope.
///
/// Envelopes without usable content are ignored, except our own replies,
/// which are always reported as `OwnOutput`.
pub fn classify(envelope: &Envelope) -> Role {
    let has_content = envelope.non_blank_content().is_some();

    match envelope.kind() {
        MessageKind::AssistantMessage => Role::OwnOutput,
        MessageKind::StudentMessage if has_content => Role::Restricted,
        MessageKind::UserMessage | MessageKind::User if has_content => Role::OrdinaryUser,
        MessageKind::Unknown if has_content => Role::OrdinaryUser,
        MessageKind::StudentMessage
        | MessageKind::UserMessage
        | MessageKind::User
        | MessageKind::Unknown => Role::Ignore,
    }
}
