//! Data exchanged with the VM host: contract inputs, outputs and account views.
//!
//! Everything here is plain data so it serializes the same way in every
//! [`WireFormat`](crate::bridge::format::WireFormat). Addresses, hashes and code
//! are raw bytes; balances are `u128`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Gas costs grouped by category, e.g. `{"BaseOperationCost": {"StorePerByte": 50}}`.
pub type GasSchedule = BTreeMap<String, BTreeMap<String, u64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CallType {
    #[default]
    DirectCall,
    AsynchronousCall,
    AsynchronousCallBack,
    EsdtTransferAndExecute,
}

/// Fields shared by deploy and call requests.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VmInput {
    pub caller_addr: Vec<u8>,
    pub arguments: Vec<Vec<u8>>,
    pub call_value: u128,
    pub call_type: CallType,
    pub gas_price: u64,
    pub gas_provided: u64,
    pub original_tx_hash: Vec<u8>,
    pub current_tx_hash: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContractCreateInput {
    pub vm_input: VmInput,
    pub contract_code: Vec<u8>,
    pub contract_code_metadata: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContractCallInput {
    pub vm_input: VmInput,
    pub recipient_addr: Vec<u8>,
    pub function: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReturnCode {
    #[default]
    Ok,
    FunctionNotFound,
    FunctionWrongSignature,
    ContractNotFound,
    UserError,
    OutOfGas,
    AccountCollision,
    OutOfFunds,
    CallStackOverFlow,
    ContractInvalid,
    ExecutionFailed,
    UpgradeFailed,
    SimulateFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageUpdate {
    pub offset: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputTransfer {
    pub value: u128,
    pub gas_limit: u64,
    pub data: Vec<u8>,
    pub call_type: CallType,
}

/// State delta of one account touched by an execution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputAccount {
    pub address: Vec<u8>,
    pub nonce: u64,
    /// New balance, when the VM knows it.
    pub balance: Option<u128>,
    pub balance_delta: i128,
    pub storage_updates: Vec<StorageUpdate>,
    pub code: Vec<u8>,
    pub code_metadata: Vec<u8>,
    pub code_deployer_address: Vec<u8>,
    pub gas_used: u64,
    pub transfers: Vec<OutputTransfer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogEntry {
    pub identifier: Vec<u8>,
    pub address: Vec<u8>,
    pub topics: Vec<Vec<u8>>,
    pub data: Vec<u8>,
}

/// Result of one contract execution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VmOutput {
    pub return_data: Vec<Vec<u8>>,
    pub return_code: ReturnCode,
    pub return_message: String,
    pub gas_remaining: u64,
    pub gas_refund: u128,
    pub output_accounts: Vec<OutputAccount>,
    pub deleted_accounts: Vec<Vec<u8>>,
    pub touched_accounts: Vec<Vec<u8>>,
    pub logs: Vec<LogEntry>,
}

impl VmOutput {
    /// Output carrying only a return code and message, as used for early exits.
    pub fn with_code(return_code: ReturnCode, message: impl Into<String>) -> Self {
        Self {
            return_code,
            return_message: message.into(),
            ..Self::default()
        }
    }

    pub fn output_account(&self, address: &[u8]) -> Option<&OutputAccount> {
        self.output_accounts.iter().find(|a| a.address == address)
    }
}

/// Account view the node hands to the VM.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserAccount {
    pub address: Vec<u8>,
    pub nonce: u64,
    pub balance: u128,
    pub code_hash: Vec<u8>,
    pub root_hash: Vec<u8>,
    pub code_metadata: Vec<u8>,
    pub owner_address: Vec<u8>,
    pub developer_reward: u128,
    pub user_name: Vec<u8>,
}

/// Parameters the VM host is built from in the child.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VmHostParameters {
    pub vm_type: Vec<u8>,
    pub block_gas_limit: u64,
    pub gas_schedule: GasSchedule,
    pub protected_key_prefix: Vec<u8>,
}
