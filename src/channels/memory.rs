//! In-process topic — for tests and local runs without a broker.
//!
//! `MemoryChannel` is the consumer/producer handed to the router;
//! `MemoryHandle` is the other side: it injects inbound payloads and inspects
//! what the router published. With loopback enabled, every published payload
//! is also delivered back to the consumer, the way a real topic echoes a
//! producer's own records.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, watch};

use crate::channels::MessageChannel;
use crate::envelope::RawPayload;
use crate::error::ChannelError;

/// A payload the router published.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: RawPayload,
}

struct Shared {
    name: String,
    loopback: bool,
    inbox_tx: Mutex<Option<mpsc::UnboundedSender<RawPayload>>>,
    published: Mutex<Vec<Published>>,
    published_count: watch::Sender<usize>,
    receive_errors: Mutex<VecDeque<ChannelError>>,
    failing_sends: AtomicUsize,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

/// Router side of an in-process topic.
pub struct MemoryChannel {
    shared: Arc<Shared>,
    inbox_rx: Mutex<mpsc::UnboundedReceiver<RawPayload>>,
}

/// Test/driver side of an in-process topic.
#[derive(Clone)]
pub struct MemoryHandle {
    shared: Arc<Shared>,
}

impl MemoryChannel {
    /// Create a channel without loopback.
    pub fn new() -> (Self, MemoryHandle) {
        Self::build(false)
    }

    /// Create a channel that re-delivers everything it publishes.
    pub fn with_loopback() -> (Self, MemoryHandle) {
        Self::build(true)
    }

    fn build(loopback: bool) -> (Self, MemoryHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (count_tx, _) = watch::channel(0usize);
        let shared = Arc::new(Shared {
            name: "memory".to_string(),
            loopback,
            inbox_tx: Mutex::new(Some(tx)),
            published: Mutex::new(Vec::new()),
            published_count: count_tx,
            receive_errors: Mutex::new(VecDeque::new()),
            failing_sends: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        });

        let channel = Self {
            shared: Arc::clone(&shared),
            inbox_rx: Mutex::new(rx),
        };
        (channel, MemoryHandle { shared })
    }
}

#[async_trait]
impl MessageChannel for MemoryChannel {
    fn name(&self) -> &str {
        &self.shared.name
    }

    async fn receive(&self) -> Result<Option<RawPayload>, ChannelError> {
        if let Some(err) = self.shared.receive_errors.lock().await.pop_front() {
            return Err(err);
        }
        let mut rx = self.inbox_rx.lock().await;
        Ok(rx.recv().await)
    }

    async fn send(&self, topic: &str, payload: RawPayload) -> Result<(), ChannelError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed {
                name: self.shared.name.clone(),
            });
        }

        let failing = self
            .shared
            .failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(ChannelError::SendFailed {
                name: self.shared.name.clone(),
                topic: topic.to_string(),
                reason: "injected send failure".into(),
            });
        }

        if self.shared.loopback
            && let Some(tx) = self.shared.inbox_tx.lock().await.as_ref()
        {
            let _ = tx.send(payload.clone());
        }

        let count = {
            let mut published = self.shared.published.lock().await;
            published.push(Published {
                topic: topic.to_string(),
                payload,
            });
            published.len()
        };
        self.shared.published_count.send_replace(count);
        Ok(())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        self.shared.close_calls.fetch_add(1, Ordering::SeqCst);
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.inbox_tx.lock().await.take();
        Ok(())
    }
}

impl MemoryHandle {
    /// Deliver a payload to the consumer. Returns false once the inbox is closed.
    pub async fn inject(&self, payload: RawPayload) -> bool {
        match self.shared.inbox_tx.lock().await.as_ref() {
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }

    /// Deliver a JSON record (or string) to the consumer.
    pub async fn inject_json(&self, value: serde_json::Value) -> bool {
        self.inject(RawPayload::from(value)).await
    }

    /// Make the next `receive` call fail with `err`.
    pub async fn inject_receive_error(&self, err: ChannelError) {
        self.shared.receive_errors.lock().await.push_back(err);
    }

    /// Make the next `n` sends fail.
    pub fn fail_next_sends(&self, n: usize) {
        self.shared.failing_sends.store(n, Ordering::SeqCst);
    }

    /// End the stream: the consumer sees `None` after draining queued payloads.
    pub async fn finish(&self) {
        self.shared.inbox_tx.lock().await.take();
    }

    /// Everything published so far, in order.
    pub async fn published(&self) -> Vec<Published> {
        self.shared.published.lock().await.clone()
    }

    /// Wait until at least `n` payloads have been published.
    pub async fn wait_for_published(&self, n: usize) {
        let mut rx = self.shared.published_count.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    /// How many times the channel was closed.
    pub fn close_calls(&self) -> usize {
        self.shared.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::timeout;

    use super::*;

    const TEST_TIMEOUT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn injected_payloads_arrive_in_order() {
        let (channel, handle) = MemoryChannel::new();
        handle.inject_json(json!({"n": 1})).await;
        handle.inject_json(json!({"n": 2})).await;
        handle.finish().await;

        let first = channel.receive().await.unwrap().unwrap();
        let second = channel.receive().await.unwrap().unwrap();
        assert_eq!(first, RawPayload::from(json!({"n": 1})));
        assert_eq!(second, RawPayload::from(json!({"n": 2})));
        assert!(channel.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn send_records_publications() {
        let (channel, handle) = MemoryChannel::new();
        channel
            .send("queen", RawPayload::Text("hi".into()))
            .await
            .unwrap();

        let published = handle.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "queen");
        timeout(TEST_TIMEOUT, handle.wait_for_published(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn loopback_redelivers_published_payloads() {
        let (channel, _handle) = MemoryChannel::with_loopback();
        channel
            .send("queen", RawPayload::Text("echo".into()))
            .await
            .unwrap();

        let echoed = timeout(TEST_TIMEOUT, channel.receive())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(echoed, Some(RawPayload::Text("echo".into())));
    }

    #[tokio::test]
    async fn injected_failures() {
        let (channel, handle) = MemoryChannel::new();
        handle.fail_next_sends(1);
        assert!(channel.send("t", RawPayload::Text("a".into())).await.is_err());
        assert!(channel.send("t", RawPayload::Text("b".into())).await.is_ok());

        handle
            .inject_receive_error(ChannelError::Disconnected {
                name: "memory".into(),
                reason: "gone".into(),
            })
            .await;
        let err = channel.receive().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn close_ends_stream_and_rejects_sends() {
        let (channel, handle) = MemoryChannel::new();
        channel.close().await.unwrap();

        assert!(handle.is_closed());
        assert_eq!(handle.close_calls(), 1);
        assert!(!handle.inject(RawPayload::Text("late".into())).await);
        assert!(channel.receive().await.unwrap().is_none());
        assert!(matches!(
            channel.send("t", RawPayload::Text("x".into())).await,
            Err(ChannelError::Closed { .. })
        ));
    }
}
