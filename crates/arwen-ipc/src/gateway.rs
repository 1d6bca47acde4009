//! Child-side [`BlockchainHook`] that forwards every call to the node.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::bridge::hook_calls::{HookCallRequest, HookCallResponse};
use crate::bridge::kind::MessageKind;
use crate::bridge::protocol::MessageBody;
use crate::error::IpcError;
use crate::hook::{BlockchainHook, HookError};
use crate::messenger::Messenger;
use crate::vm::{ContractCallInput, UserAccount, VmOutput};

/// Turns hook calls into request/response round trips on the dialogue that is
/// currently open.
///
/// A transport failure or a response of the wrong kind poisons the gateway: the
/// VM sees a [`HookError::Transport`], and [`finish`](Self::finish) hands the
/// underlying [`IpcError`] back to the dialogue so it can end.
pub struct BlockchainGateway<'a, R, W> {
    messenger: &'a mut Messenger<R, W>,
    critical: Option<IpcError>,
}

impl<'a, R, W> BlockchainGateway<'a, R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(messenger: &'a mut Messenger<R, W>) -> Self {
        Self {
            messenger,
            critical: None,
        }
    }

    /// Surfaces the first critical error seen during the execution, if any.
    pub fn finish(self) -> Result<(), IpcError> {
        match self.critical {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn round_trip(&mut self, request: HookCallRequest) -> Result<HookCallResponse, HookError> {
        if let Some(err) = &self.critical {
            return Err(HookError::Transport(err.to_string()));
        }

        let request_kind = request.kind();
        let result = async {
            self.messenger
                .send(&MessageBody::HookCallRequest(request))
                .await?;
            let message = self.messenger.receive(Duration::ZERO).await?;
            match message.body {
                MessageBody::HookCallResponse(response) => Ok(response),
                other => Err(IpcError::BadHookResponse {
                    request: request_kind,
                    response: other.kind(),
                }),
            }
        }
        .await;

        result.map_err(|err| self.poison(err))
    }

    fn poison(&mut self, err: IpcError) -> HookError {
        tracing::error!(error = %err, "hook call failed");
        let hook_err = HookError::Transport(err.to_string());
        self.critical.get_or_insert(err);
        hook_err
    }

    fn mismatch(&mut self, request: MessageKind, response: &HookCallResponse) -> HookError {
        self.poison(IpcError::BadHookResponse {
            request,
            response: response.kind(),
        })
    }
}

/// Unpacks the expected response variant or poisons the gateway.
macro_rules! expect_response {
    ($self:ident, $request:expr, $variant:ident) => {{
        let request = $request;
        let kind = request.kind();
        match $self.round_trip(request).await? {
            HookCallResponse::$variant(result) => result.map_err(HookError::Node),
            other => Err($self.mismatch(kind, &other)),
        }
    }};
}

#[async_trait]
impl<'a, R, W> BlockchainHook for BlockchainGateway<'a, R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn new_address(
        &mut self,
        creator_address: &[u8],
        creator_nonce: u64,
        vm_type: &[u8],
    ) -> Result<Vec<u8>, HookError> {
        expect_response!(
            self,
            HookCallRequest::NewAddress {
                creator_address: creator_address.to_vec(),
                creator_nonce,
                vm_type: vm_type.to_vec(),
            },
            NewAddress
        )
    }

    async fn get_storage_data(
        &mut self,
        account_address: &[u8],
        index: &[u8],
    ) -> Result<Vec<u8>, HookError> {
        expect_response!(
            self,
            HookCallRequest::GetStorageData {
                account_address: account_address.to_vec(),
                index: index.to_vec(),
            },
            GetStorageData
        )
    }

    async fn get_blockhash(&mut self, nonce: u64) -> Result<Vec<u8>, HookError> {
        expect_response!(self, HookCallRequest::GetBlockhash { nonce }, GetBlockhash)
    }

    async fn last_nonce(&mut self) -> Result<u64, HookError> {
        expect_response!(self, HookCallRequest::LastNonce, LastNonce)
    }

    async fn last_round(&mut self) -> Result<u64, HookError> {
        expect_response!(self, HookCallRequest::LastRound, LastRound)
    }

    async fn last_time_stamp(&mut self) -> Result<u64, HookError> {
        expect_response!(self, HookCallRequest::LastTimeStamp, LastTimeStamp)
    }

    async fn last_random_seed(&mut self) -> Result<Vec<u8>, HookError> {
        expect_response!(self, HookCallRequest::LastRandomSeed, LastRandomSeed)
    }

    async fn last_epoch(&mut self) -> Result<u32, HookError> {
        expect_response!(self, HookCallRequest::LastEpoch, LastEpoch)
    }

    async fn get_state_root_hash(&mut self) -> Result<Vec<u8>, HookError> {
        expect_response!(self, HookCallRequest::GetStateRootHash, GetStateRootHash)
    }

    async fn current_nonce(&mut self) -> Result<u64, HookError> {
        expect_response!(self, HookCallRequest::CurrentNonce, CurrentNonce)
    }

    async fn current_round(&mut self) -> Result<u64, HookError> {
        expect_response!(self, HookCallRequest::CurrentRound, CurrentRound)
    }

    async fn current_time_stamp(&mut self) -> Result<u64, HookError> {
        expect_response!(self, HookCallRequest::CurrentTimeStamp, CurrentTimeStamp)
    }

    async fn current_random_seed(&mut self) -> Result<Vec<u8>, HookError> {
        expect_response!(self, HookCallRequest::CurrentRandomSeed, CurrentRandomSeed)
    }

    async fn current_epoch(&mut self) -> Result<u32, HookError> {
        expect_response!(self, HookCallRequest::CurrentEpoch, CurrentEpoch)
    }

    async fn process_builtin_function(
        &mut self,
        input: &ContractCallInput,
    ) -> Result<VmOutput, HookError> {
        expect_response!(
            self,
            HookCallRequest::ProcessBuiltinFunction(input.clone()),
            ProcessBuiltinFunction
        )
    }

    async fn get_builtin_function_names(&mut self) -> Result<Vec<String>, HookError> {
        expect_response!(
            self,
            HookCallRequest::GetBuiltinFunctionNames,
            GetBuiltinFunctionNames
        )
    }

    async fn get_all_state(&mut self, address: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, HookError> {
        expect_response!(
            self,
            HookCallRequest::GetAllState {
                address: address.to_vec()
            },
            GetAllState
        )
    }

    async fn get_user_account(&mut self, address: &[u8]) -> Result<UserAccount, HookError> {
        expect_response!(
            self,
            HookCallRequest::GetUserAccount {
                address: address.to_vec()
            },
            GetUserAccount
        )
    }

    async fn get_code(&mut self, address: &[u8]) -> Result<Vec<u8>, HookError> {
        expect_response!(
            self,
            HookCallRequest::GetCode {
                address: address.to_vec()
            },
            GetCode
        )
    }

    async fn get_shard_of_address(&mut self, address: &[u8]) -> Result<u32, HookError> {
        expect_response!(
            self,
            HookCallRequest::GetShardOfAddress {
                address: address.to_vec()
            },
            GetShardOfAddress
        )
    }

    async fn is_payable(&mut self, address: &[u8]) -> Result<bool, HookError> {
        expect_response!(
            self,
            HookCallRequest::IsPayable {
                address: address.to_vec()
            },
            IsPayable
        )
    }

    async fn is_smart_contract(&mut self, address: &[u8]) -> Result<bool, HookError> {
        expect_response!(
            self,
            HookCallRequest::IsSmartContract {
                address: address.to_vec()
            },
            IsSmartContract
        )
    }

    async fn save_compiled_code(&mut self, code_hash: &[u8], code: &[u8]) -> Result<(), HookError> {
        expect_response!(
            self,
            HookCallRequest::SaveCompiledCode {
                code_hash: code_hash.to_vec(),
                code: code.to_vec(),
            },
            SaveCompiledCode
        )
    }

    async fn get_compiled_code(&mut self, code_hash: &[u8]) -> Result<Option<Vec<u8>>, HookError> {
        expect_response!(
            self,
            HookCallRequest::GetCompiledCode {
                code_hash: code_hash.to_vec()
            },
            GetCompiledCode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arwen_part::ArwenPart;
    use crate::bridge::format::WireFormat;
    use crate::messenger::tests::messenger_pair;
    use crate::node_part::{NodeConfig, NodePart};
    use crate::testing::{EveryHookHost, FullHook};

    #[tokio::test]
    async fn every_hook_operation_crosses_the_pipe() {
        let expected = EveryHookHost::execute(&mut FullHook::default()).await;
        assert_eq!(expected.return_data.len(), 26);

        for format in [WireFormat::Json, WireFormat::Postcard] {
            let (node, arwen) = messenger_pair(format);
            let mut part = ArwenPart::new(arwen, EveryHookHost, "test");
            let child = tokio::spawn(async move { part.start_loop().await });

            let mut node = NodePart::new(node, NodeConfig::default());
            let mut hook = FullHook::default();
            let response = node
                .start_loop(
                    MessageBody::ContractCallRequest(ContractCallInput::default()),
                    &mut hook,
                )
                .await
                .unwrap();

            match response {
                MessageBody::ContractResponse(Ok(output)) => {
                    for (got, want) in output.return_data.iter().zip(&expected.return_data) {
                        assert_eq!(String::from_utf8_lossy(got), String::from_utf8_lossy(want));
                    }
                    assert_eq!(output, expected);
                }
                other => panic!("unexpected response {other:?}"),
            }

            let mut operations = hook.calls.clone();
            operations.sort_unstable();
            operations.dedup();
            assert_eq!(operations.len(), 24, "{format:?}: {operations:?}");
            assert_eq!(hook.calls.len(), 26);

            node.send_stop_signal().await.unwrap();
            assert!(child.await.unwrap().is_ok());
        }
    }

    #[tokio::test]
    async fn node_errors_come_back_as_node_errors() {
        let (mut node, mut arwen) = messenger_pair(WireFormat::Postcard);
        tokio::spawn(async move {
            let message = node.receive(Duration::ZERO).await.unwrap();
            let MessageBody::HookCallRequest(call) = message.body else {
                panic!("expected a hook call");
            };
            let response = crate::node_part::reply_to_hook_call(&mut FullHook::default(), call).await;
            node.send(&MessageBody::HookCallResponse(response))
                .await
                .unwrap();
            node
        });

        let mut gateway = BlockchainGateway::new(&mut arwen);
        let err = gateway.get_user_account(b"").await.unwrap_err();
        assert_eq!(err, HookError::Node("account not found".to_string()));
        assert!(gateway.finish().is_ok());
    }
}
