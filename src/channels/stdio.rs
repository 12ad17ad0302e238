//! Line channel — one JSON record per line in, one per line out.
//!
//! `StdioChannel::stdio()` reads stdin and writes stdout for local testing:
//! type `{"type":"user_message","content":"hello"}` and press Enter.

use async_trait::async_trait;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout,
};
use tokio::sync::Mutex;

use crate::channels::MessageChannel;
use crate::envelope::RawPayload;
use crate::error::ChannelError;

/// A channel over a line-oriented reader and writer.
pub struct StdioChannel<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
}

impl StdioChannel<BufReader<Stdin>, Stdout> {
    /// Read from stdin, write to stdout.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> StdioChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl<R, W> MessageChannel for StdioChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &str {
        "stdio"
    }

    async fn receive(&self) -> Result<Option<RawPayload>, ChannelError> {
        let mut reader = self.reader.lock().await;
        let mut line = Vec::new();
        let read = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(|e| ChannelError::Disconnected {
                name: "stdio".into(),
                reason: e.to_string(),
            })?;
        if read == 0 {
            return Ok(None); // EOF
        }

        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        // Bytes, not `String`: a line that is not valid UTF-8 is decoded lossily
        // instead of ending the stream. Blank and `null` lines become an empty
        // payload, which the router skips.
        Ok(Some(
            RawPayload::from_bytes(&line).unwrap_or_else(|| RawPayload::Text(String::new())),
        ))
    }

    async fn send(&self, topic: &str, payload: RawPayload) -> Result<(), ChannelError> {
        let mut line = payload.to_json_string();
        line.push('\n');

        let send_failed = |e: std::io::Error| ChannelError::SendFailed {
            name: "stdio".into(),
            topic: topic.to_string(),
            reason: e.to_string(),
        };

        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await.map_err(send_failed)?;
        writer.flush().await.map_err(send_failed)
    }

    async fn close(&self) -> Result<(), ChannelError> {
        let mut writer = self.writer.lock().await;
        writer.flush().await.map_err(|e| ChannelError::Disconnected {
            name: "stdio".into(),
            reason: e.to_string(),
        })
    }
}
