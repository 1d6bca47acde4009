//! The closed set of message kinds and their wire tags.
//!
//! Tags are part of the protocol version: reordering this enum breaks every
//! deployed child.

/// Wire tag carried in the second word of every frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageKind {
    FirstKind = 0,
    Initialize = 1,
    Stop = 2,
    ContractDeployRequest = 3,
    ContractCallRequest = 4,
    ContractResponse = 5,
    GasScheduleChangeRequest = 6,
    GasScheduleChangeResponse = 7,
    NewAddressRequest = 8,
    NewAddressResponse = 9,
    GetStorageDataRequest = 10,
    GetStorageDataResponse = 11,
    GetBlockhashRequest = 12,
    GetBlockhashResponse = 13,
    LastNonceRequest = 14,
    LastNonceResponse = 15,
    LastRoundRequest = 16,
    LastRoundResponse = 17,
    LastTimeStampRequest = 18,
    LastTimeStampResponse = 19,
    LastRandomSeedRequest = 20,
    LastRandomSeedResponse = 21,
    LastEpochRequest = 22,
    LastEpochResponse = 23,
    GetStateRootHashRequest = 24,
    GetStateRootHashResponse = 25,
    CurrentNonceRequest = 26,
    CurrentNonceResponse = 27,
    CurrentRoundRequest = 28,
    CurrentRoundResponse = 29,
    CurrentTimeStampRequest = 30,
    CurrentTimeStampResponse = 31,
    CurrentRandomSeedRequest = 32,
    CurrentRandomSeedResponse = 33,
    CurrentEpochRequest = 34,
    CurrentEpochResponse = 35,
    ProcessBuiltinFunctionRequest = 36,
    ProcessBuiltinFunctionResponse = 37,
    GetBuiltinFunctionNamesRequest = 38,
    GetBuiltinFunctionNamesResponse = 39,
    GetAllStateRequest = 40,
    GetAllStateResponse = 41,
    GetUserAccountRequest = 42,
    GetUserAccountResponse = 43,
    GetCodeRequest = 44,
    GetCodeResponse = 45,
    GetShardOfAddressRequest = 46,
    GetShardOfAddressResponse = 47,
    IsPayableRequest = 48,
    IsPayableResponse = 49,
    IsSmartContractRequest = 50,
    IsSmartContractResponse = 51,
    SaveCompiledCodeRequest = 52,
    SaveCompiledCodeResponse = 53,
    GetCompiledCodeRequest = 54,
    GetCompiledCodeResponse = 55,
    DiagnoseWaitRequest = 56,
    DiagnoseWaitResponse = 57,
    VersionRequest = 58,
    VersionResponse = 59,
    UndefinedRequestOrResponse = 60,
    CriticalError = 61,
}

const FIRST_HOOK_TAG: u32 = MessageKind::NewAddressRequest as u32;
const LAST_HOOK_TAG: u32 = MessageKind::GetCompiledCodeResponse as u32;

impl MessageKind {
    /// Every kind, in tag order.
    pub const ALL: [MessageKind; 62] = [
        MessageKind::FirstKind,
        MessageKind::Initialize,
        MessageKind::Stop,
        MessageKind::ContractDeployRequest,
        MessageKind::ContractCallRequest,
        MessageKind::ContractResponse,
        MessageKind::GasScheduleChangeRequest,
        MessageKind::GasScheduleChangeResponse,
        MessageKind::NewAddressRequest,
        MessageKind::NewAddressResponse,
        MessageKind::GetStorageDataRequest,
        MessageKind::GetStorageDataResponse,
        MessageKind::GetBlockhashRequest,
        MessageKind::GetBlockhashResponse,
        MessageKind::LastNonceRequest,
        MessageKind::LastNonceResponse,
        MessageKind::LastRoundRequest,
        MessageKind::LastRoundResponse,
        MessageKind::LastTimeStampRequest,
        MessageKind::LastTimeStampResponse,
        MessageKind::LastRandomSeedRequest,
        MessageKind::LastRandomSeedResponse,
        MessageKind::LastEpochRequest,
        MessageKind::LastEpochResponse,
        MessageKind::GetStateRootHashRequest,
        MessageKind::GetStateRootHashResponse,
        MessageKind::CurrentNonceRequest,
        MessageKind::CurrentNonceResponse,
        MessageKind::CurrentRoundRequest,
        MessageKind::CurrentRoundResponse,
        MessageKind::CurrentTimeStampRequest,
        MessageKind::CurrentTimeStampResponse,
        MessageKind::CurrentRandomSeedRequest,
        MessageKind::CurrentRandomSeedResponse,
        MessageKind::CurrentEpochRequest,
        MessageKind::CurrentEpochResponse,
        MessageKind::ProcessBuiltinFunctionRequest,
        MessageKind::ProcessBuiltinFunctionResponse,
        MessageKind::GetBuiltinFunctionNamesRequest,
        MessageKind::GetBuiltinFunctionNamesResponse,
        MessageKind::GetAllStateRequest,
        MessageKind::GetAllStateResponse,
        MessageKind::GetUserAccountRequest,
        MessageKind::GetUserAccountResponse,
        MessageKind::GetCodeRequest,
        MessageKind::GetCodeResponse,
        MessageKind::GetShardOfAddressRequest,
        MessageKind::GetShardOfAddressResponse,
        MessageKind::IsPayableRequest,
        MessageKind::IsPayableResponse,
        MessageKind::IsSmartContractRequest,
        MessageKind::IsSmartContractResponse,
        MessageKind::SaveCompiledCodeRequest,
        MessageKind::SaveCompiledCodeResponse,
        MessageKind::GetCompiledCodeRequest,
        MessageKind::GetCompiledCodeResponse,
        MessageKind::DiagnoseWaitRequest,
        MessageKind::DiagnoseWaitResponse,
        MessageKind::VersionRequest,
        MessageKind::VersionResponse,
        MessageKind::UndefinedRequestOrResponse,
        MessageKind::CriticalError,
    ];

    /// Looks up a wire tag. `None` for tags this build does not know.
    pub fn from_u32(tag: u32) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Kinds the child sends back to the parent in the middle of a dialogue.
    pub fn is_hook_call_request(self) -> bool {
        let tag = self.tag();
        (FIRST_HOOK_TAG..=LAST_HOOK_TAG).contains(&tag) && tag % 2 == 0
    }

    pub fn is_hook_call_response(self) -> bool {
        let tag = self.tag();
        (FIRST_HOOK_TAG..=LAST_HOOK_TAG).contains(&tag) && tag % 2 == 1
    }

    /// The kind that closes a dialogue opened by `self`, if `self` opens one.
    pub fn response_kind(self) -> Option<Self> {
        match self {
            MessageKind::ContractDeployRequest | MessageKind::ContractCallRequest => {
                Some(MessageKind::ContractResponse)
            }
            MessageKind::GasScheduleChangeRequest
            | MessageKind::DiagnoseWaitRequest
            | MessageKind::VersionRequest => Self::from_u32(self.tag() + 1),
            k if k.is_hook_call_request() => Self::from_u32(k.tag() + 1),
            _ => None,
        }
    }
}
