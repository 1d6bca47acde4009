//! Nonce-checked send/receive over one inbound and one outbound pipe.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bridge::codec::FrameCodec;
use crate::bridge::format::WireFormat;
use crate::bridge::protocol::{self, Message, MessageBody};
use crate::error::IpcError;

/// One endpoint of a dialogue.
///
/// Each side keeps a local nonce. `send` increments it and stamps the outgoing
/// message; `receive` accepts only `local + 1` and then adopts it, so the two
/// sides alternate 1, 2, 3, … within a dialogue. A mismatch means the pipes are
/// out of sync and is never repaired locally.
pub struct Messenger<R, W> {
    name: &'static str,
    reader: FramedRead<R, FrameCodec>,
    writer: FramedWrite<W, FrameCodec>,
    format: WireFormat,
    nonce: u32,
}

impl<R, W> Messenger<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        name: &'static str,
        reader: R,
        writer: W,
        format: WireFormat,
        max_frame_length: usize,
    ) -> Self {
        Self {
            name,
            reader: FramedRead::new(reader, FrameCodec::new(max_frame_length)),
            writer: FramedWrite::new(writer, FrameCodec::new(max_frame_length)),
            format,
            nonce: 0,
        }
    }

    pub async fn send(&mut self, body: &MessageBody) -> Result<(), IpcError> {
        let nonce = self.nonce.wrapping_add(1);
        let frame = protocol::encode(body, nonce, self.format)?;
        tracing::trace!(
            messenger = self.name,
            nonce,
            kind = ?body.kind(),
            size = frame.payload.len(),
            "send"
        );
        self.writer.send(frame).await?;
        self.nonce = nonce;
        Ok(())
    }

    /// Waits for the next message. A zero `timeout` blocks indefinitely.
    pub async fn receive(&mut self, timeout: Duration) -> Result<Message, IpcError> {
        let next = if timeout.is_zero() {
            self.reader.next().await
        } else {
            tokio::time::timeout(timeout, self.reader.next())
                .await
                .map_err(|_| IpcError::Timeout(timeout))?
        };
        let frame = next.ok_or(IpcError::PipeClosed)??;
        let message = protocol::decode(&frame, self.format)?;

        if let MessageBody::Undefined { kind } = message.body {
            tracing::error!(
                messenger = self.name,
                kind,
                nonce = message.dialogue_nonce,
                "received message of undefined kind"
            );
        }

        let expected = self.nonce.wrapping_add(1);
        if message.dialogue_nonce != expected {
            return Err(IpcError::NonceMismatch {
                expected,
                received: message.dialogue_nonce,
            });
        }

        tracing::trace!(
            messenger = self.name,
            nonce = expected,
            kind = ?message.body.kind(),
            "receive"
        );
        self.nonce = expected;
        Ok(message)
    }

    /// Starts a fresh dialogue: the next message either side sends is nonce 1.
    pub fn reset_dialogue(&mut self) {
        self.nonce = 0;
    }

    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }
}
