//! Child-side dialogue loop: receive a request, run it through the VM host,
//! answer, repeat.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::bridge::protocol::MessageBody;
use crate::error::IpcError;
use crate::gateway::BlockchainGateway;
use crate::host::VmHost;
use crate::messenger::Messenger;

/// The child's end of the request/response pipes, plus the VM host it serves.
///
/// The loop is passive: it blocks on the node without a deadline and only ever
/// answers. Hook calls issued by the host during an execution go out over the
/// same messenger and are answered before the host call returns.
pub struct ArwenPart<H, R, W> {
    messenger: Messenger<R, W>,
    host: H,
    version: String,
}

impl<H, R, W> ArwenPart<H, R, W>
where
    H: VmHost,
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(messenger: Messenger<R, W>, host: H, version: impl Into<String>) -> Self {
        Self {
            messenger,
            host,
            version: version.into(),
        }
    }

    /// Serves dialogues until the node sends `Stop` (returns `Ok`) or something
    /// critical happens (returns the error after a best-effort `CriticalError`
    /// message to the node).
    pub async fn start_loop(&mut self) -> Result<(), IpcError> {
        tracing::debug!(version = %self.version, "arwen part loop started");
        loop {
            match self.serve_one().await {
                Ok(()) => {}
                Err(err) if err.is_stop() => {
                    tracing::info!("stop requested, leaving loop");
                    return Ok(());
                }
                Err(err) => {
                    tracing::error!(error = %err, "critical error, leaving loop");
                    self.send_critical(&err).await;
                    return Err(err);
                }
            }
        }
    }

    async fn serve_one(&mut self) -> Result<(), IpcError> {
        let message = self.messenger.receive(Duration::ZERO).await?;
        tracing::trace!(nonce = message.dialogue_nonce, kind = ?message.body.kind(), "request");

        let response = match self.reply(message.body).await {
            Ok(response) => response,
            Err(err) => {
                if err.is_stop() {
                    self.messenger.reset_dialogue();
                }
                return Err(err);
            }
        };

        self.messenger.send(&response).await?;
        self.messenger.reset_dialogue();
        Ok(())
    }

    async fn reply(&mut self, body: MessageBody) -> Result<MessageBody, IpcError> {
        let tag = body.tag();
        match body {
            MessageBody::ContractDeployRequest(input) => {
                let mut gateway = BlockchainGateway::new(&mut self.messenger);
                let result = self.host.run_create(&input, &mut gateway).await;
                gateway.finish()?;
                Ok(MessageBody::ContractResponse(
                    result.map_err(|e| e.to_string()),
                ))
            }
            MessageBody::ContractCallRequest(input) => {
                let mut gateway = BlockchainGateway::new(&mut self.messenger);
                let result = self.host.run_call(&input, &mut gateway).await;
                gateway.finish()?;
                Ok(MessageBody::ContractResponse(
                    result.map_err(|e| e.to_string()),
                ))
            }
            MessageBody::GasScheduleChangeRequest(schedule) => {
                let result = self.host.gas_schedule_change(schedule).await;
                Ok(MessageBody::GasScheduleChangeResponse(
                    result.map_err(|e| e.to_string()),
                ))
            }
            MessageBody::DiagnoseWaitRequest { milliseconds } => {
                tracing::debug!(milliseconds, "diagnose wait");
                tokio::time::sleep(Duration::from_millis(u64::from(milliseconds))).await;
                Ok(MessageBody::DiagnoseWaitResponse(Ok(())))
            }
            MessageBody::VersionRequest => Ok(MessageBody::VersionResponse(self.version.clone())),
            MessageBody::Stop => Err(IpcError::Stopped),
            MessageBody::Initialize(_)
            | MessageBody::ContractResponse(_)
            | MessageBody::GasScheduleChangeResponse(_)
            | MessageBody::HookCallRequest(_)
            | MessageBody::HookCallResponse(_)
            | MessageBody::DiagnoseWaitResponse(_)
            | MessageBody::VersionResponse(_)
            | MessageBody::CriticalError(_)
            | MessageBody::Undefined { .. } => Err(IpcError::UnhandledKind(tag)),
        }
    }

    async fn send_critical(&mut self, err: &IpcError) {
        let body = MessageBody::CriticalError(err.to_string());
        if let Err(send_err) = self.messenger.send(&body).await {
            tracing::debug!(error = %send_err, "could not report critical error to node");
        }
    }

    pub fn messenger(&self) -> &Messenger<R, W> {
        &self.messenger
    }

    pub fn host(&self) -> &H {
        &self.host
    }
}
