//! The blockchain-state capability the VM calls back into during execution.
//!
//! The node implements [`BlockchainHook`] over its real state; inside the child
//! the same trait is implemented by [`BlockchainGateway`](crate::gateway::BlockchainGateway),
//! which forwards every call over the pipe. Operations a given implementation
//! does not provide fail fast with [`HookError::Unsupported`].

use async_trait::async_trait;

use crate::vm::{ContractCallInput, UserAccount, VmOutput};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    /// The state provider answered with a domain error, e.g. an unknown account.
    #[error("{0}")]
    Node(String),

    #[error("unsupported blockchain hook operation: {0}")]
    Unsupported(&'static str),

    /// The round trip to the node failed; the dialogue is no longer usable.
    #[error("hook call transport failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait BlockchainHook: Send {
    async fn new_address(
        &mut self,
        _creator_address: &[u8],
        _creator_nonce: u64,
        _vm_type: &[u8],
    ) -> Result<Vec<u8>, HookError> {
        Err(HookError::Unsupported("new_address"))
    }

    async fn get_storage_data(
        &mut self,
        _account_address: &[u8],
        _index: &[u8],
    ) -> Result<Vec<u8>, HookError> {
        Err(HookError::Unsupported("get_storage_data"))
    }

    async fn get_blockhash(&mut self, _nonce: u64) -> Result<Vec<u8>, HookError> {
        Err(HookError::Unsupported("get_blockhash"))
    }

    async fn last_nonce(&mut self) -> Result<u64, HookError> {
        Err(HookError::Unsupported("last_nonce"))
    }

    async fn last_round(&mut self) -> Result<u64, HookError> {
        Err(HookError::Unsupported("last_round"))
    }

    async fn last_time_stamp(&mut self) -> Result<u64, HookError> {
        Err(HookError::Unsupported("last_time_stamp"))
    }

    async fn last_random_seed(&mut self) -> Result<Vec<u8>, HookError> {
        Err(HookError::Unsupported("last_random_seed"))
    }

    async fn last_epoch(&mut self) -> Result<u32, HookError> {
        Err(HookError::Unsupported("last_epoch"))
    }

    async fn get_state_root_hash(&mut self) -> Result<Vec<u8>, HookError> {
        Err(HookError::Unsupported("get_state_root_hash"))
    }

    async fn current_nonce(&mut self) -> Result<u64, HookError> {
        Err(HookError::Unsupported("current_nonce"))
    }

    async fn current_round(&mut self) -> Result<u64, HookError> {
        Err(HookError::Unsupported("current_round"))
    }

    async fn current_time_stamp(&mut self) -> Result<u64, HookError> {
        Err(HookError::Unsupported("current_time_stamp"))
    }

    async fn current_random_seed(&mut self) -> Result<Vec<u8>, HookError> {
        Err(HookError::Unsupported("current_random_seed"))
    }

    async fn current_epoch(&mut self) -> Result<u32, HookError> {
        Err(HookError::Unsupported("current_epoch"))
    }

    async fn process_builtin_function(
        &mut self,
        _input: &ContractCallInput,
    ) -> Result<VmOutput, HookError> {
        Err(HookError::Unsupported("process_builtin_function"))
    }

    async fn get_builtin_function_names(&mut self) -> Result<Vec<String>, HookError> {
        Err(HookError::Unsupported("get_builtin_function_names"))
    }

    async fn get_all_state(&mut self, _address: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, HookError> {
        Err(HookError::Unsupported("get_all_state"))
    }

    async fn get_user_account(&mut self, _address: &[u8]) -> Result<UserAccount, HookError> {
        Err(HookError::Unsupported("get_user_account"))
    }

    async fn get_code(&mut self, _address: &[u8]) -> Result<Vec<u8>, HookError> {
        Err(HookError::Unsupported("get_code"))
    }

    async fn get_shard_of_address(&mut self, _address: &[u8]) -> Result<u32, HookError> {
        Err(HookError::Unsupported("get_shard_of_address"))
    }

    async fn is_payable(&mut self, _address: &[u8]) -> Result<bool, HookError> {
        Err(HookError::Unsupported("is_payable"))
    }

    async fn is_smart_contract(&mut self, _address: &[u8]) -> Result<bool, HookError> {
        Err(HookError::Unsupported("is_smart_contract"))
    }

    async fn save_compiled_code(&mut self, _code_hash: &[u8], _code: &[u8]) -> Result<(), HookError> {
        Err(HookError::Unsupported("save_compiled_code"))
    }

    async fn get_compiled_code(&mut self, _code_hash: &[u8]) -> Result<Option<Vec<u8>>, HookError> {
        Err(HookError::Unsupported("get_compiled_code"))
    }
}
