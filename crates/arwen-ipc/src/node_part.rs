//! Node-side dialogue: send one request, service the child's hook calls, and
//! return the matching response.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

use crate::bridge::hook_calls::{HookCallRequest, HookCallResponse};
use crate::bridge::kind::MessageKind;
use crate::bridge::protocol::MessageBody;
use crate::error::IpcError;
use crate::hook::BlockchainHook;
use crate::messenger::Messenger;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Deadline for each individual receive. Zero waits for the whole budget.
    pub receive_timeout: Duration,
    /// Wall-clock ceiling for one dialogue, hook calls included. Unlike
    /// `receive_timeout`, zero is not "unbounded": it must be non-zero, or every
    /// dialogue fails with [`IpcError::BudgetExceeded`].
    pub max_loop_time: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_secs(1),
            max_loop_time: Duration::from_secs(10),
        }
    }
}

impl NodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_max_loop_time(mut self, max: Duration) -> Self {
        self.max_loop_time = max;
        self
    }
}

/// The node's end of the request/response pipes.
pub struct NodePart<R, W> {
    messenger: Messenger<R, W>,
    config: NodeConfig,
}

impl<R, W> NodePart<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(messenger: Messenger<R, W>, config: NodeConfig) -> Self {
        Self { messenger, config }
    }

    /// Runs one dialogue opened by `request` and returns the body that closes
    /// it. Every error is critical: the child can no longer be trusted.
    ///
    /// The nonce is reset before and after, whatever the outcome.
    pub async fn start_loop(
        &mut self,
        request: MessageBody,
        hook: &mut dyn BlockchainHook,
    ) -> Result<MessageBody, IpcError> {
        self.messenger.reset_dialogue();
        let result = self.run_dialogue(request, hook).await;
        self.messenger.reset_dialogue();
        result
    }

    async fn run_dialogue(
        &mut self,
        request: MessageBody,
        hook: &mut dyn BlockchainHook,
    ) -> Result<MessageBody, IpcError> {
        let Some(expected) = request.kind().response_kind() else {
            return Err(IpcError::UnexpectedMessage { kind: request.tag() });
        };

        let deadline = Instant::now() + self.config.max_loop_time;
        self.messenger.send(&request).await?;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(IpcError::BudgetExceeded(self.config.max_loop_time));
            }
            let timeout = if self.config.receive_timeout.is_zero() {
                remaining
            } else {
                remaining.min(self.config.receive_timeout)
            };

            let message = match self.messenger.receive(timeout).await {
                Ok(message) => message,
                Err(IpcError::Timeout(_)) if Instant::now() >= deadline => {
                    return Err(IpcError::BudgetExceeded(self.config.max_loop_time));
                }
                Err(err) => return Err(err),
            };

            match message.body {
                // Only contract executions reach the VM, so only they may call back.
                MessageBody::HookCallRequest(call)
                    if expected == MessageKind::ContractResponse =>
                {
                    tracing::trace!(kind = ?call.kind(), nonce = message.dialogue_nonce, "hook call");
                    let response = reply_to_hook_call(hook, call).await;
                    self.messenger
                        .send(&MessageBody::HookCallResponse(response))
                        .await?;
                }
                MessageBody::CriticalError(reason) => {
                    return Err(IpcError::PeerCritical(reason));
                }
                body if body.kind() == expected => return Ok(body),
                body => return Err(IpcError::UnexpectedMessage { kind: body.tag() }),
            }
        }
    }

    /// Asks the child to leave its loop. The child does not answer.
    pub async fn send_stop_signal(&mut self) -> Result<(), IpcError> {
        self.messenger.reset_dialogue();
        let result = self.messenger.send(&MessageBody::Stop).await;
        self.messenger.reset_dialogue();
        result
    }

    pub fn messenger(&self) -> &Messenger<R, W> {
        &self.messenger
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
}

/// Services one hook call against the node's state. Hook failures are answered
/// in-band; they never end the dialogue.
pub async fn reply_to_hook_call(
    hook: &mut dyn BlockchainHook,
    request: HookCallRequest,
) -> HookCallResponse {
    use HookCallRequest as Req;
    use HookCallResponse as Resp;

    fn wire<T>(result: Result<T, crate::hook::HookError>) -> Result<T, String> {
        result.map_err(|e| e.to_string())
    }

    match request {
        Req::NewAddress {
            creator_address,
            creator_nonce,
            vm_type,
        } => Resp::NewAddress(wire(
            hook.new_address(&creator_address, creator_nonce, &vm_type)
                .await,
        )),
        Req::GetStorageData {
            account_address,
            index,
        } => Resp::GetStorageData(wire(hook.get_storage_data(&account_address, &index).await)),
        Req::GetBlockhash { nonce } => Resp::GetBlockhash(wire(hook.get_blockhash(nonce).await)),
        Req::LastNonce => Resp::LastNonce(wire(hook.last_nonce().await)),
        Req::LastRound => Resp::LastRound(wire(hook.last_round().await)),
        Req::LastTimeStamp => Resp::LastTimeStamp(wire(hook.last_time_stamp().await)),
        Req::LastRandomSeed => Resp::LastRandomSeed(wire(hook.last_random_seed().await)),
        Req::LastEpoch => Resp::LastEpoch(wire(hook.last_epoch().await)),
        Req::GetStateRootHash => Resp::GetStateRootHash(wire(hook.get_state_root_hash().await)),
        Req::CurrentNonce => Resp::CurrentNonce(wire(hook.current_nonce().await)),
        Req::CurrentRound => Resp::CurrentRound(wire(hook.current_round().await)),
        Req::CurrentTimeStamp => Resp::CurrentTimeStamp(wire(hook.current_time_stamp().await)),
        Req::CurrentRandomSeed => Resp::CurrentRandomSeed(wire(hook.current_random_seed().await)),
        Req::CurrentEpoch => Resp::CurrentEpoch(wire(hook.current_epoch().await)),
        Req::ProcessBuiltinFunction(input) => {
            Resp::ProcessBuiltinFunction(wire(hook.process_builtin_function(&input).await))
        }
        Req::GetBuiltinFunctionNames => {
            Resp::GetBuiltinFunctionNames(wire(hook.get_builtin_function_names().await))
        }
        Req::GetAllState { address } => Resp::GetAllState(wire(hook.get_all_state(&address).await)),
        Req::GetUserAccount { address } => {
            Resp::GetUserAccount(wire(hook.get_user_account(&address).await))
        }
        Req::GetCode { address } => Resp::GetCode(wire(hook.get_code(&address).await)),
        Req::GetShardOfAddress { address } => {
            Resp::GetShardOfAddress(wire(hook.get_shard_of_address(&address).await))
        }
        Req::IsPayable { address } => Resp::IsPayable(wire(hook.is_payable(&address).await)),
        Req::IsSmartContract { address } => {
            Resp::IsSmartContract(wire(hook.is_smart_contract(&address).await))
        }
        Req::SaveCompiledCode { code_hash, code } => {
            Resp::SaveCompiledCode(wire(hook.save_compiled_code(&code_hash, &code).await))
        }
        Req::GetCompiledCode { code_hash } => {
            Resp::GetCompiledCode(wire(hook.get_compiled_code(&code_hash).await))
        }
    }
}
