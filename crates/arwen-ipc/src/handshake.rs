//! One-shot exchange over the init pipe.
//!
//! The node writes a single `Initialize` frame and closes its end. The frame is
//! always JSON: the child cannot know the negotiated format before reading it.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bridge::codec::FrameCodec;
use crate::bridge::format::WireFormat;
use crate::bridge::protocol::{self, ArwenArguments, MessageBody};
use crate::error::IpcError;
use crate::version::PROTOCOL_VERSION;

pub async fn send_arguments<W>(init: W, arguments: &ArwenArguments) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
{
    let frame = protocol::encode(&MessageBody::Initialize(arguments.clone()), 0, WireFormat::Json)?;
    let mut writer = FramedWrite::new(init, FrameCodec::default());
    writer.send(frame).await?;
    Ok(())
}

/// Reads the `Initialize` frame and checks the protocol version.
pub async fn receive_arguments<R>(init: R) -> Result<ArwenArguments, IpcError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = FramedRead::new(init, FrameCodec::default());
    let frame = reader.next().await.ok_or(IpcError::PipeClosed)??;
    let message = protocol::decode(&frame, WireFormat::Json)?;
    let arguments = match message.body {
        MessageBody::Initialize(arguments) => arguments,
        other => return Err(IpcError::UnexpectedMessage { kind: other.tag() }),
    };
    if arguments.protocol_version != PROTOCOL_VERSION {
        return Err(IpcError::ProtocolVersion {
            expected: PROTOCOL_VERSION,
            received: arguments.protocol_version,
        });
    }
    Ok(arguments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::VmHostParameters;

    fn arguments() -> ArwenArguments {
        let mut params = VmHostParameters::default();
        params.block_gas_limit = 1_500_000_000;
        params
            .gas_schedule
            .entry("BaseOperationCost".to_string())
            .or_default()
            .insert("StorePerByte".to_string(), 50);
        ArwenArguments::new(params)
            .with_messages_format(WireFormat::Postcard)
            .with_max_frame_length(1 << 20)
    }

    #[tokio::test]
    async fn arguments_cross_the_init_pipe() {
        let (node, arwen) = tokio::io::duplex(4096);
        send_arguments(node, &arguments()).await.unwrap();
        assert_eq!(receive_arguments(arwen).await.unwrap(), arguments());
    }

    #[tokio::test]
    async fn closed_init_pipe() {
        let (node, arwen) = tokio::io::duplex(64);
        drop(node);
        assert!(matches!(
            receive_arguments(arwen).await,
            Err(IpcError::PipeClosed)
        ));
    }

    #[tokio::test]
    async fn other_protocol_version_is_refused() {
        let mut args = arguments();
        args.protocol_version = PROTOCOL_VERSION + 1;
        let (node, arwen) = tokio::io::duplex(4096);
        send_arguments(node, &args).await.unwrap();
        let err = receive_arguments(arwen).await.unwrap_err();
        assert!(matches!(
            err,
            IpcError::ProtocolVersion { expected, received }
                if expected == PROTOCOL_VERSION && received == PROTOCOL_VERSION + 1
        ));
    }

    #[tokio::test]
    async fn anything_but_initialize_is_refused() {
        let (node, arwen) = tokio::io::duplex(4096);
        let frame = protocol::encode(&MessageBody::Stop, 0, WireFormat::Json).unwrap();
        FramedWrite::new(node, FrameCodec::default()).send(frame).await.unwrap();
        assert!(matches!(
            receive_arguments(arwen).await,
            Err(IpcError::UnexpectedMessage { kind }) if kind == MessageBody::Stop.tag()
        ));
    }
}
