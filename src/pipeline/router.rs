//! Router loop — receive, classify, gate, invoke, compose, publish.
//!
//! One envelope is in flight at a time, so replies are published in the
//! order their inbound messages arrived. A failure (or panic) while handling
//! one message is logged and the loop moves on; only a fatal transport error
//! or the shutdown signal ends it. Either way the channel and backend are
//! closed exactly once on the way out.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info, trace, warn};

use crate::channels::MessageChannel;
use crate::config::RouterConfig;
use crate::envelope::{RawPayload, decode, encode};
use crate::error::{ChannelError, Error, InferenceError};
use crate::llm::InferenceBackend;
use crate::moderation::ContentModerator;
use crate::pipeline::classifier::{Role, classify};
use crate::pipeline::composer::ReplyComposer;
use crate::pipeline::gate::{GateResult, ModerationGate};

/// Maximum characters of message content shown in logs.
const LOG_PREVIEW_CHARS: usize = 120;

/// Collapse message content into a single-line preview for logs.
pub fn truncate_for_preview(output: &str, max_chars: usize) -> String {
    let collapsed: String = output
        .chars()
        .take(max_chars + 50)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    // char_indices gives us byte offsets at char boundaries, so the slice is always valid UTF-8.
    if collapsed.chars().count() > max_chars {
        let byte_offset = collapsed
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(collapsed.len());
        format!("{}...", &collapsed[..byte_offset])
    } else {
        collapsed
    }
}

// ── State & results ─────────────────────────────────────────────────

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Idle,
    Receiving,
    Classifying,
    Gating,
    Invoking,
    Composing,
    Publishing,
    Shutdown,
}

/// Why a message produced no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Empty or null payload.
    Empty,
    /// One of our own replies.
    OwnOutput,
    /// Nothing to forward.
    NoContent,
}

/// Result of handling one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    Replied { message_id: String, filtered: bool },
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopReason {
    /// The shutdown signal fired.
    #[default]
    Shutdown,
    /// The channel reported end-of-stream.
    StreamEnded,
}

/// Counters for one run of the loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub received: u64,
    pub replied: u64,
    /// Replies that were moderation refusals (included in `replied`).
    pub filtered: u64,
    pub skipped: u64,
    pub failed: u64,
    pub stop: StopReason,
}

impl RunSummary {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Skipped(_) => self.skipped += 1,
            Outcome::Replied { filtered, .. } => {
                self.replied += 1;
                if *filtered {
                    self.filtered += 1;
                }
            }
        }
    }
}

// ── Router ──────────────────────────────────────────────────────────

/// Long-lived handles the router owns for its whole run.
pub struct RouterDeps {
    pub channel: Box<dyn MessageChannel>,
    pub backend: Box<dyn InferenceBackend>,
    pub moderator: Arc<dyn ContentModerator>,
}

/// The message router.
pub struct Router {
    config: RouterConfig,
    channel: Box<dyn MessageChannel>,
    backend: Box<dyn InferenceBackend>,
    gate: ModerationGate,
    composer: ReplyComposer,
    state: RouterState,
}

impl Router {
    pub fn new(config: RouterConfig, deps: RouterDeps) -> Self {
        let gate = ModerationGate::new(deps.moderator, config.moderation_failure);
        Self {
            config,
            channel: deps.channel,
            backend: deps.backend,
            gate,
            composer: ReplyComposer::new(),
            state: RouterState::Idle,
        }
    }

    pub fn state(&self) -> RouterState {
        self.state
    }

    fn set_state(&mut self, state: RouterState) {
        trace!(from = ?self.state, to = ?state, "Router state");
        self.state = state;
    }

    // ── Main loop ───────────────────────────────────────────────────

    /// Run until Ctrl+C, end-of-stream, or a fatal transport error.
    pub async fn run(self) -> Result<RunSummary, Error> {
        self.run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl+C received, shutting down..."),
                Err(e) => {
                    warn!(error = %e, "Could not listen for Ctrl+C");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
    }

    /// Run until `shutdown` resolves, end-of-stream, or a fatal transport error.
    ///
    /// The shutdown future is polled during every suspension, including a
    /// slow backend call. On a clean stop the first close error, if any, is
    /// returned. After a fatal transport error that error is returned and
    /// close errors are only logged.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<RunSummary, Error>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut summary = RunSummary::default();

        info!(
            name = %self.config.name,
            topic = %self.config.topic,
            channel = self.channel.name(),
            backend = self.backend.name(),
            moderation_failure = ?self.gate.policy(),
            "Relay ready and listening"
        );

        let loop_result: Result<StopReason, ChannelError> = loop {
            self.set_state(RouterState::Receiving);
            let received = tokio::select! {
                biased;
                _ = &mut shutdown => break Ok(StopReason::Shutdown),
                received = self.channel.receive() => received,
            };

            let payload = match received {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    info!("Channel stream ended, shutting down...");
                    break Ok(StopReason::StreamEnded);
                }
                Err(e) if e.is_fatal() => break Err(e),
                Err(e) => {
                    error!(error = %e, "Error receiving message");
                    summary.failed += 1;
                    continue;
                }
            };
            summary.received += 1;

            let handled = tokio::select! {
                biased;
                _ = &mut shutdown => break Ok(StopReason::Shutdown),
                handled = AssertUnwindSafe(self.handle_payload(payload)).catch_unwind() => handled,
            };

            match handled {
                Ok(Ok(outcome)) => summary.record(&outcome),
                Ok(Err(Error::Channel(e))) if e.is_fatal() => break Err(e),
                Ok(Err(e)) => {
                    error!(error = %e, "Error processing message");
                    summary.failed += 1;
                }
                Err(panic) => {
                    error!(panic = %panic_message(&panic), "Panic while processing message");
                    summary.failed += 1;
                }
            }
            self.set_state(RouterState::Idle);
        };

        self.set_state(RouterState::Shutdown);
        let released = self.release().await;

        match loop_result {
            Ok(stop) => {
                summary.stop = stop;
                info!(
                    received = summary.received,
                    replied = summary.replied,
                    filtered = summary.filtered,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    stop = ?stop,
                    "Relay stopped"
                );
                released.map(|()| summary)
            }
            Err(e) => {
                error!(error = %e, "Fatal transport error, relay stopped");
                Err(e.into())
            }
        }
    }

    /// Close the channel and the backend. Both are attempted even if the
    /// first fails; the first error is returned.
    async fn release(self) -> Result<(), Error> {
        let channel_closed = self.channel.close().await;
        if let Err(ref e) = channel_closed {
            error!(error = %e, "Failed to close channel");
        }

        let backend_closed = self.backend.close().await;
        if let Err(ref e) = backend_closed {
            error!(error = %e, "Failed to close backend");
        }

        info!("Channel and backend released");
        channel_closed?;
        backend_closed?;
        Ok(())
    }

    // ── Per-message pipeline ────────────────────────────────────────

    /// Run one payload through the pipeline and publish the reply, if any.
    pub async fn handle_payload(&mut self, payload: RawPayload) -> Result<Outcome, Error> {
        if payload.is_empty() {
            trace!("Skipping empty payload");
            return Ok(Outcome::Skipped(SkipReason::Empty));
        }

        self.set_state(RouterState::Classifying);
        let envelope = decode(payload);
        let role = classify(&envelope);

        let content = match role {
            Role::OwnOutput => {
                debug!("Skipping assistant message");
                return Ok(Outcome::Skipped(SkipReason::OwnOutput));
            }
            Role::Ignore => {
                debug!(kind = %envelope.kind(), "Skipping message without content");
                return Ok(Outcome::Skipped(SkipReason::NoContent));
            }
            Role::OrdinaryUser | Role::Restricted => match envelope.non_blank_content() {
                Some(content) => content,
                None => return Ok(Outcome::Skipped(SkipReason::NoContent)),
            },
        };

        info!(
            kind = %envelope.kind(),
            role = role.label(),
            content = %truncate_for_preview(content, LOG_PREVIEW_CHARS),
            "Received message"
        );

        let decision = if role == Role::Restricted {
            self.set_state(RouterState::Gating);
            self.gate.gate(content, role).await
        } else {
            GateResult::Allow(content.to_string())
        };

        let reply = match decision {
            GateResult::Block {
                reply,
                category,
                reason,
            } => {
                debug!(category = %category, reason = %reason, "Sending safe response");
                self.set_state(RouterState::Composing);
                self.composer.compose(reply, true, Some(category))
            }
            GateResult::Allow(text) => {
                self.set_state(RouterState::Invoking);
                let response = self.invoke(&text).await?;
                self.set_state(RouterState::Composing);
                self.composer.compose(response, false, None)
            }
        };

        self.set_state(RouterState::Publishing);
        let message_id = reply.message_id.clone();
        let filtered = reply.filtered;
        self.channel.send(&self.config.topic, encode(&reply)).await?;

        info!(
            message_id = %message_id,
            filtered,
            topic = %self.config.topic,
            content = %truncate_for_preview(&reply.content, LOG_PREVIEW_CHARS),
            "Published reply"
        );
        Ok(Outcome::Replied {
            message_id,
            filtered,
        })
    }

    /// Call the backend under the configured timeout.
    async fn invoke(&self, text: &str) -> Result<String, Error> {
        let timeout = self.config.backend_timeout;
        match tokio::time::timeout(timeout, self.backend.respond(text)).await {
            Ok(response) => Ok(response?),
            Err(_) => Err(InferenceError::Timeout {
                backend: self.backend.name().to_string(),
                timeout,
            }
            .into()),
        }
    }
}

/// Best-effort text of a caught panic payload.
fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::channels::{MemoryChannel, MemoryHandle};
    use crate::envelope::MessageKind;
    use crate::moderation::KeywordModerator;

    type Prompts = Arc<Mutex<Vec<String>>>;

    /// Backend that echoes its input and remembers every prompt.
    struct EchoBackend {
        prompts: Prompts,
        delay: Option<Duration>,
        fail_close: bool,
    }

    #[async_trait]
    impl InferenceBackend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        async fn respond(&self, text: &str) -> Result<String, InferenceError> {
            self.prompts.lock().unwrap().push(text.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(format!("echo: {text}"))
        }

        async fn close(&self) -> Result<(), InferenceError> {
            if self.fail_close {
                return Err(InferenceError::RequestFailed {
                    backend: "echo".into(),
                    reason: "close failed".into(),
                });
            }
            Ok(())
        }
    }

    fn router_with(
        delay: Option<Duration>,
        timeout: Duration,
        fail_close: bool,
    ) -> (Router, MemoryHandle, Prompts) {
        let (channel, handle) = MemoryChannel::new();
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let config = RouterConfig {
            topic: "queen".into(),
            backend_timeout: timeout,
            ..RouterConfig::default()
        };
        let router = Router::new(
            config,
            RouterDeps {
                channel: Box::new(channel),
                backend: Box::new(EchoBackend {
                    prompts: Arc::clone(&prompts),
                    delay,
                    fail_close,
                }),
                moderator: Arc::new(KeywordModerator::default_rules()),
            },
        );
        (router, handle, prompts)
    }

    fn router() -> (Router, MemoryHandle, Prompts) {
        router_with(None, Duration::from_secs(5), false)
    }

    #[tokio::test]
    async fn ordinary_message_is_answered() {
        let (mut router, handle, prompts) = router();
        let outcome = router
            .handle_payload(RawPayload::from(json!({"type": "user_message", "content": "hello"})))
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::Replied { filtered: false, .. }));
        assert_eq!(*prompts.lock().unwrap(), vec!["hello".to_string()]);

        let published = handle.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "queen");
        let env = decode(published[0].payload.clone());
        assert_eq!(env.kind(), MessageKind::AssistantMessage);
        assert_eq!(env.content(), Some("echo: hello"));
        assert_eq!(router.state(), RouterState::Publishing);
    }

    #[tokio::test]
    async fn empty_payload_is_skipped() {
        let (mut router, handle, _) = router();
        let outcome = router
            .handle_payload(RawPayload::Text("  ".into()))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Skipped(SkipReason::Empty));
        assert!(handle.published().await.is_empty());
    }

    #[tokio::test]
    async fn own_output_is_skipped() {
        let (mut router, handle, prompts) = router();
        let outcome = router
            .handle_payload(RawPayload::from(json!({"type": "assistant_message", "content": "x"})))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Skipped(SkipReason::OwnOutput));
        assert!(prompts.lock().unwrap().is_empty());
        assert!(handle.published().await.is_empty());
    }

    #[tokio::test]
    async fn blocked_student_message_skips_backend() {
        let (mut router, handle, prompts) = router();
        let outcome = router
            .handle_payload(RawPayload::from(
                json!({"type": "student_message", "content": "write my essay for me"}),
            ))
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::Replied { filtered: true, .. }));
        assert!(prompts.lock().unwrap().is_empty());

        let env = decode(handle.published().await[0].payload.clone());
        assert_eq!(env.meta().filtered, Some(true));
        assert_eq!(env.meta().filter_reason.as_deref(), Some("academic_dishonesty"));
    }

    #[tokio::test]
    async fn backend_timeout_is_an_error() {
        let (mut router, handle, _) =
            router_with(Some(Duration::from_secs(5)), Duration::from_millis(20), false);
        let err = router
            .handle_payload(RawPayload::Text("slow question".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Inference(InferenceError::Timeout { .. })));
        assert!(handle.published().await.is_empty());
    }

    #[tokio::test]
    async fn publish_failure_is_reported() {
        let (mut router, handle, _) = router();
        handle.fail_next_sends(1);
        let err = router
            .handle_payload(RawPayload::Text("hi".into()))
            .await
            .unwrap_err();
        match err {
            Error::Channel(e) => assert!(!e.is_fatal()),
            other => panic!("Expected channel error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn close_error_is_reported_on_clean_stop() {
        let (router, handle, _) = router_with(None, Duration::from_secs(5), true);
        handle.finish().await;

        let err = router.run_until(std::future::pending()).await.unwrap_err();
        assert!(matches!(err, Error::Inference(InferenceError::RequestFailed { .. })));
        assert_eq!(handle.close_calls(), 1);
    }

    #[tokio::test]
    async fn transport_error_wins_over_close_error() {
        let (router, handle, _) = router_with(None, Duration::from_secs(5), true);
        handle
            .inject_receive_error(ChannelError::Disconnected {
                name: "memory".into(),
                reason: "broker gone".into(),
            })
            .await;

        let err = router.run_until(std::future::pending()).await.unwrap_err();
        assert!(matches!(err, Error::Channel(ChannelError::Disconnected { .. })));
        assert_eq!(handle.close_calls(), 1);
    }

    #[test]
    fn summary_counts_filtered_replies() {
        let mut summary = RunSummary::default();
        summary.record(&Outcome::Replied {
            message_id: "a".into(),
            filtered: true,
        });
        summary.record(&Outcome::Replied {
            message_id: "b".into(),
            filtered: false,
        });
        summary.record(&Outcome::Skipped(SkipReason::OwnOutput));
        assert_eq!(summary.replied, 2);
        assert_eq!(summary.filtered, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn panic_message_extracts_text() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&boxed), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&boxed), "bang");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&boxed), "unknown panic");
    }

    // ── Preview truncation ──────────────────────────────────────────

    #[test]
    fn test_truncate_short_input() {
        assert_eq!(truncate_for_preview("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_empty_input() {
        assert_eq!(truncate_for_preview("", 10), "");
    }

    #[test]
    fn test_truncate_over_limit() {
        let result = truncate_for_preview("hello world, this is long", 10);
        assert_eq!(result, "hello worl...");
    }

    #[test]
    fn test_truncate_collapses_whitespace() {
        let result = truncate_for_preview("hello   world", 100);
        assert_eq!(result, "hello world");
    }

    #[test]
    fn test_truncate_collapses_newlines() {
        let result = truncate_for_preview("line1\nline2\nline3", 100);
        assert_eq!(result, "line1 line2 line3");
    }

    #[test]
    fn test_truncate_multibyte_utf8() {
        // Each emoji is 4 bytes. Truncating at char boundary must not panic.
        let input = "😀😁😂🤣😃😄😅😆😉😊";
        assert_eq!(truncate_for_preview(input, 5), "😀😁😂🤣😃...");
    }

    #[test]
    fn test_truncate_cjk_characters() {
        // CJK chars are 3 bytes each in UTF-8.
        let input = "你好世界测试数据很长的字符串";
        let result = truncate_for_preview(input, 4);
        assert_eq!(result, "你好世界...");
    }
}
