//! Hook-call payloads: the callbacks the child issues into the node's
//! blockchain state while a contract executes.
//!
//! One request variant and one response variant per operation. Responses carry
//! `Result<T, String>` so node-side failures travel in-band.

use serde::{Deserialize, Serialize};

use super::kind::MessageKind;
use crate::vm::{ContractCallInput, UserAccount, VmOutput};

/// Node-side outcome of a hook call, as carried over the pipe.
pub type HookResult<T> = Result<T, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookCallRequest {
    NewAddress {
        creator_address: Vec<u8>,
        creator_nonce: u64,
        vm_type: Vec<u8>,
    },
    GetStorageData {
        account_address: Vec<u8>,
        index: Vec<u8>,
    },
    GetBlockhash {
        nonce: u64,
    },
    LastNonce,
    LastRound,
    LastTimeStamp,
    LastRandomSeed,
    LastEpoch,
    GetStateRootHash,
    CurrentNonce,
    CurrentRound,
    CurrentTimeStamp,
    CurrentRandomSeed,
    CurrentEpoch,
    ProcessBuiltinFunction(ContractCallInput),
    GetBuiltinFunctionNames,
    GetAllState {
        address: Vec<u8>,
    },
    GetUserAccount {
        address: Vec<u8>,
    },
    GetCode {
        address: Vec<u8>,
    },
    GetShardOfAddress {
        address: Vec<u8>,
    },
    IsPayable {
        address: Vec<u8>,
    },
    IsSmartContract {
        address: Vec<u8>,
    },
    SaveCompiledCode {
        code_hash: Vec<u8>,
        code: Vec<u8>,
    },
    GetCompiledCode {
        code_hash: Vec<u8>,
    },
}

impl HookCallRequest {
    pub fn kind(&self) -> MessageKind {
        use HookCallRequest as R;
        match self {
            R::NewAddress { .. } => MessageKind::NewAddressRequest,
            R::GetStorageData { .. } => MessageKind::GetStorageDataRequest,
            R::GetBlockhash { .. } => MessageKind::GetBlockhashRequest,
            R::LastNonce => MessageKind::LastNonceRequest,
            R::LastRound => MessageKind::LastRoundRequest,
            R::LastTimeStamp => MessageKind::LastTimeStampRequest,
            R::LastRandomSeed => MessageKind::LastRandomSeedRequest,
            R::LastEpoch => MessageKind::LastEpochRequest,
            R::GetStateRootHash => MessageKind::GetStateRootHashRequest,
            R::CurrentNonce => MessageKind::CurrentNonceRequest,
            R::CurrentRound => MessageKind::CurrentRoundRequest,
            R::CurrentTimeStamp => MessageKind::CurrentTimeStampRequest,
            R::CurrentRandomSeed => MessageKind::CurrentRandomSeedRequest,
            R::CurrentEpoch => MessageKind::CurrentEpochRequest,
            R::ProcessBuiltinFunction(_) => MessageKind::ProcessBuiltinFunctionRequest,
            R::GetBuiltinFunctionNames => MessageKind::GetBuiltinFunctionNamesRequest,
            R::GetAllState { .. } => MessageKind::GetAllStateRequest,
            R::GetUserAccount { .. } => MessageKind::GetUserAccountRequest,
            R::GetCode { .. } => MessageKind::GetCodeRequest,
            R::GetShardOfAddress { .. } => MessageKind::GetShardOfAddressRequest,
            R::IsPayable { .. } => MessageKind::IsPayableRequest,
            R::IsSmartContract { .. } => MessageKind::IsSmartContractRequest,
            R::SaveCompiledCode { .. } => MessageKind::SaveCompiledCodeRequest,
            R::GetCompiledCode { .. } => MessageKind::GetCompiledCodeRequest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookCallResponse {
    NewAddress(HookResult<Vec<u8>>),
    GetStorageData(HookResult<Vec<u8>>),
    GetBlockhash(HookResult<Vec<u8>>),
    LastNonce(HookResult<u64>),
    LastRound(HookResult<u64>),
    LastTimeStamp(HookResult<u64>),
    LastRandomSeed(HookResult<Vec<u8>>),
    LastEpoch(HookResult<u32>),
    GetStateRootHash(HookResult<Vec<u8>>),
    CurrentNonce(HookResult<u64>),
    CurrentRound(HookResult<u64>),
    CurrentTimeStamp(HookResult<u64>),
    CurrentRandomSeed(HookResult<Vec<u8>>),
    CurrentEpoch(HookResult<u32>),
    ProcessBuiltinFunction(HookResult<VmOutput>),
    GetBuiltinFunctionNames(HookResult<Vec<String>>),
    /// Key/value pairs; a list because byte keys are not valid JSON object keys.
    GetAllState(HookResult<Vec<(Vec<u8>, Vec<u8>)>>),
    GetUserAccount(HookResult<UserAccount>),
    GetCode(HookResult<Vec<u8>>),
    GetShardOfAddress(HookResult<u32>),
    IsPayable(HookResult<bool>),
    IsSmartContract(HookResult<bool>),
    SaveCompiledCode(HookResult<()>),
    /// `None` when the node has no compiled code under that hash.
    GetCompiledCode(HookResult<Option<Vec<u8>>>),
}

impl HookCallResponse {
    pub fn kind(&self) -> MessageKind {
        use HookCallResponse as R;
        match self {
            R::NewAddress(_) => MessageKind::NewAddressResponse,
            R::GetStorageData(_) => MessageKind::GetStorageDataResponse,
            R::GetBlockhash(_) => MessageKind::GetBlockhashResponse,
            R::LastNonce(_) => MessageKind::LastNonceResponse,
            R::LastRound(_) => MessageKind::LastRoundResponse,
            R::LastTimeStamp(_) => MessageKind::LastTimeStampResponse,
            R::LastRandomSeed(_) => MessageKind::LastRandomSeedResponse,
            R::LastEpoch(_) => MessageKind::LastEpochResponse,
            R::GetStateRootHash(_) => MessageKind::GetStateRootHashResponse,
            R::CurrentNonce(_) => MessageKind::CurrentNonceResponse,
            R::CurrentRound(_) => MessageKind::CurrentRoundResponse,
            R::CurrentTimeStamp(_) => MessageKind::CurrentTimeStampResponse,
            R::CurrentRandomSeed(_) => MessageKind::CurrentRandomSeedResponse,
            R::CurrentEpoch(_) => MessageKind::CurrentEpochResponse,
            R::ProcessBuiltinFunction(_) => MessageKind::ProcessBuiltinFunctionResponse,
            R::GetBuiltinFunctionNames(_) => MessageKind::GetBuiltinFunctionNamesResponse,
            R::GetAllState(_) => MessageKind::GetAllStateResponse,
            R::GetUserAccount(_) => MessageKind::GetUserAccountResponse,
            R::GetCode(_) => MessageKind::GetCodeResponse,
            R::GetShardOfAddress(_) => MessageKind::GetShardOfAddressResponse,
            R::IsPayable(_) => MessageKind::IsPayableResponse,
            R::IsSmartContract(_) => MessageKind::IsSmartContractResponse,
            R::SaveCompiledCode(_) => MessageKind::SaveCompiledCodeResponse,
            R::GetCompiledCode(_) => MessageKind::GetCompiledCodeResponse,
        }
    }
}
