//! Transport abstraction for the relay's topic.

pub mod memory;
pub mod stdio;

use async_trait::async_trait;

use crate::envelope::RawPayload;
use crate::error::ChannelError;

pub use memory::{MemoryChannel, MemoryHandle, Published};
pub use stdio::StdioChannel;

/// A pub/sub transport bound to one consumer.
///
/// Implementations own connection details (brokers, auth, offsets); the
/// router only pulls payloads and publishes replies.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Channel name (e.g. "memory", "stdio").
    fn name(&self) -> &str;

    /// Wait for the next payload.
    ///
    /// `Ok(None)` means the stream has ended. Errors for which
    /// `ChannelError::is_fatal` is true stop the router.
    async fn receive(&self) -> Result<Option<RawPayload>, ChannelError>;

    /// Publish a payload to `topic`.
    async fn send(&self, topic: &str, payload: RawPayload) -> Result<(), ChannelError>;

    /// Release the transport. Called once when the router stops.
    async fn close(&self) -> Result<(), ChannelError>;
}
