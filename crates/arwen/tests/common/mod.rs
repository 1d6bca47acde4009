//! An in-memory chain for driving the real arwen binary.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arwen_ipc::vm::{
    ContractCallInput, ContractCreateInput, GasSchedule, UserAccount, VmHostParameters, VmOutput,
};
use arwen_ipc::{ArwenArguments, ArwenDriver, BlockchainHook, DriverConfig, HookError};
use async_trait::async_trait;
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

pub const VM_TYPE: &[u8] = &[5, 0];

#[derive(Debug, Default, Clone)]
pub struct Account {
    pub nonce: u64,
    pub code: Vec<u8>,
    pub storage: HashMap<Vec<u8>, Vec<u8>>,
}

/// Shared handle: the driver owns one clone, the test keeps another.
#[derive(Clone, Default)]
pub struct World {
    accounts: Arc<Mutex<HashMap<Vec<u8>, Account>>>,
}

impl World {
    pub fn add_account(&self, address: &[u8], nonce: u64) {
        self.accounts.lock().unwrap().insert(
            address.to_vec(),
            Account {
                nonce,
                ..Account::default()
            },
        );
    }

    pub fn account(&self, address: &[u8]) -> Option<Account> {
        self.accounts.lock().unwrap().get(address).cloned()
    }

    /// Commits the state changes of a successful execution.
    pub fn apply_output(&self, output: &VmOutput) {
        let mut accounts = self.accounts.lock().unwrap();
        for delta in &output.output_accounts {
            let account = accounts.entry(delta.address.clone()).or_default();
            if !delta.code.is_empty() {
                account.code = delta.code.clone();
            }
            for update in &delta.storage_updates {
                account
                    .storage
                    .insert(update.offset.clone(), update.data.clone());
            }
        }
    }
}

fn not_found() -> HookError {
    HookError::Node("account not found".to_string())
}

#[async_trait]
impl BlockchainHook for World {
    async fn new_address(
        &mut self,
        creator_address: &[u8],
        creator_nonce: u64,
        vm_type: &[u8],
    ) -> Result<Vec<u8>, HookError> {
        let mut address = creator_address.to_vec();
        address.extend_from_slice(&creator_nonce.to_be_bytes());
        address.extend_from_slice(vm_type);
        Ok(address)
    }

    async fn get_storage_data(
        &mut self,
        account_address: &[u8],
        index: &[u8],
    ) -> Result<Vec<u8>, HookError> {
        let accounts = self.accounts.lock().unwrap();
        let account = accounts.get(account_address).ok_or_else(not_found)?;
        Ok(account.storage.get(index).cloned().unwrap_or_default())
    }

    async fn get_user_account(&mut self, address: &[u8]) -> Result<UserAccount, HookError> {
        let accounts = self.accounts.lock().unwrap();
        let account = accounts.get(address).ok_or_else(not_found)?;
        Ok(UserAccount {
            address: address.to_vec(),
            nonce: account.nonce,
            ..UserAccount::default()
        })
    }

    async fn get_code(&mut self, address: &[u8]) -> Result<Vec<u8>, HookError> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .get(address)
            .map(|account| account.code.clone())
            .unwrap_or_default())
    }
}

pub fn expected_address(creator: &[u8], nonce: u64) -> Vec<u8> {
    let mut address = creator.to_vec();
    address.extend_from_slice(&nonce.to_be_bytes());
    address.extend_from_slice(VM_TYPE);
    address
}

pub fn gas_schedule() -> GasSchedule {
    let mut schedule = GasSchedule::new();
    let costs = schedule.entry("CounterCost".to_string()).or_default();
    costs.insert("Deploy".to_string(), 1_000);
    costs.insert("Call".to_string(), 100);
    schedule
}

pub fn arguments() -> ArwenArguments {
    ArwenArguments::new(VmHostParameters {
        vm_type: VM_TYPE.to_vec(),
        block_gas_limit: 1_500_000_000,
        gas_schedule: gas_schedule(),
        protected_key_prefix: b"ELROND".to_vec(),
    })
}

pub fn config() -> DriverConfig {
    DriverConfig::new()
        .with_executable(env!("CARGO_BIN_EXE_arwen"))
        .with_receive_timeout(Duration::from_secs(5))
        .with_max_loop_time(Duration::from_secs(20))
}

pub async fn start(world: &World, arguments: ArwenArguments, config: DriverConfig) -> ArwenDriver {
    ArwenDriver::new(Box::new(world.clone()), arguments, config)
        .await
        .expect("arwen should start")
}

pub fn deploy(caller: &[u8], initial: u64) -> ContractCreateInput {
    let mut input = ContractCreateInput {
        contract_code: b"\0asm counter".to_vec(),
        contract_code_metadata: vec![1, 0],
        ..ContractCreateInput::default()
    };
    input.vm_input.caller_addr = caller.to_vec();
    input.vm_input.gas_provided = 10_000;
    input.vm_input.arguments = vec![initial.to_be_bytes().to_vec()];
    input
}

pub fn call(contract: &[u8], function: &str) -> ContractCallInput {
    let mut input = ContractCallInput {
        recipient_addr: contract.to_vec(),
        function: function.to_string(),
        ..ContractCallInput::default()
    };
    input.vm_input.caller_addr = b"alice".to_vec();
    input.vm_input.gas_provided = 1_000;
    input
}

pub fn counter(output: &VmOutput) -> u64 {
    let raw: [u8; 8] = output.return_data[0].as_slice().try_into().unwrap();
    u64::from_be_bytes(raw)
}

/// Records every event the node's subscriber sees.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<(String, Level, String)>>>,
}

impl CapturedLogs {
    pub fn contains(&self, target: &str, level: Level, needle: &str) -> bool {
        self.events
            .lock()
            .unwrap()
            .iter()
            .any(|(t, l, m)| t == target && *l == level && m.contains(needle))
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        #[derive(Default)]
        struct Message(String);
        impl tracing::field::Visit for Message {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.0 = format!("{value:?}");
                }
            }
            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "message" {
                    self.0 = value.to_string();
                }
            }
        }

        let mut message = Message::default();
        event.record(&mut message);
        let metadata = event.metadata();
        self.events.lock().unwrap().push((
            metadata.target().to_string(),
            *metadata.level(),
            message.0,
        ));
    }
}
