//! Reply composition — builds outbound replies with ids and timestamps.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::envelope::OutboundReply;

/// Builds `OutboundReply` values.
///
/// Ids have the form `{assistant|filtered}_{epoch_ms}_{uuid}`. The random
/// suffix keeps ids unique even for identical replies composed in the same
/// millisecond.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplyComposer;

impl ReplyComposer {
    pub fn new() -> Self {
        Self
    }

    /// Compose a reply stamped with the current wall-clock time.
    pub fn compose(
        &self,
        content: impl Into<String>,
        filtered: bool,
        filter_reason: Option<String>,
    ) -> OutboundReply {
        self.compose_at(content, filtered, filter_reason, Utc::now())
    }

    /// Compose a reply stamped with `now`.
    pub fn compose_at(
        &self,
        content: impl Into<String>,
        filtered: bool,
        filter_reason: Option<String>,
        now: DateTime<Utc>,
    ) -> OutboundReply {
        let timestamp_ms = now.timestamp_millis();
        let prefix = if filtered { "filtered" } else { "assistant" };

        OutboundReply {
            content: content.into(),
            filtered,
            // An unfiltered reply never carries a reason.
            filter_reason: if filtered { filter_reason } else { None },
            message_id: format!("{prefix}_{timestamp_ms}_{}", Uuid::new_v4().simple()),
            timestamp_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::TimeZone;

    use super::*;

    #[test]
    fn assistant_reply_id_and_timestamp() {
        let now = Utc.timestamp_millis_opt(1_718_000_000_123).unwrap();
        let reply = ReplyComposer::new().compose_at("hi", false, None, now);

        assert_eq!(reply.timestamp_ms, 1_718_000_000_123);
        assert!(reply.message_id.starts_with("assistant_1718000000123_"));
        assert!(!reply.filtered);
        assert!(reply.filter_reason.is_none());
    }

    #[test]
    fn filtered_reply_keeps_reason() {
        let reply = ReplyComposer::new().compose("safe reply", true, Some("violence".into()));
        assert!(reply.message_id.starts_with("filtered_"));
        assert!(reply.filtered);
        assert_eq!(reply.filter_reason.as_deref(), Some("violence"));
    }

    #[test]
    fn unfiltered_reply_drops_reason() {
        let reply = ReplyComposer::new().compose("x", false, Some("ignored".into()));
        assert!(reply.filter_reason.is_none());
    }

    #[test]
    fn ids_unique_for_same_content_and_millisecond() {
        let composer = ReplyComposer::new();
        let now = Utc::now();
        let ids: HashSet<String> = (0..1000)
            .map(|_| composer.compose_at("same", false, None, now).message_id)
            .collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn compose_uses_wall_clock() {
        let before = Utc::now().timestamp_millis();
        let reply = ReplyComposer::new().compose("x", false, None);
        let after = Utc::now().timestamp_millis();
        assert!(reply.timestamp_ms >= before && reply.timestamp_ms <= after);
    }
}
