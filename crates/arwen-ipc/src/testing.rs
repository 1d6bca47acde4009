//! Hosts and hooks used by the dialogue tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::hook::{BlockchainHook, HookError};
use crate::host::{VmError, VmHost};
use crate::vm::{
    ContractCallInput, ContractCreateInput, GasSchedule, OutputAccount, UserAccount, VmOutput,
};

/// VM host that makes a fixed number of `last_nonce` hook calls per execution
/// and returns every answer, in order, as return data.
pub(crate) struct ScriptedHost {
    hook_calls: usize,
    pub(crate) schedule: Option<GasSchedule>,
}

impl ScriptedHost {
    pub(crate) fn new(hook_calls: usize) -> Self {
        Self {
            hook_calls,
            schedule: None,
        }
    }

    async fn execute(&self, hook: &mut dyn BlockchainHook) -> Result<VmOutput, VmError> {
        let mut output = VmOutput::default();
        for _ in 0..self.hook_calls {
            let nonce = hook.last_nonce().await?;
            output.return_data.push(nonce.to_be_bytes().to_vec());
        }
        Ok(output)
    }
}

#[async_trait]
impl VmHost for ScriptedHost {
    async fn run_create(
        &mut self,
        _input: &ContractCreateInput,
        hook: &mut dyn BlockchainHook,
    ) -> Result<VmOutput, VmError> {
        self.execute(hook).await
    }

    async fn run_call(
        &mut self,
        input: &ContractCallInput,
        hook: &mut dyn BlockchainHook,
    ) -> Result<VmOutput, VmError> {
        if input.function == "fail" {
            return Err(VmError::Execution("requested fail".to_string()));
        }
        self.execute(hook).await
    }

    async fn gas_schedule_change(&mut self, schedule: GasSchedule) -> Result<(), VmError> {
        if schedule.is_empty() {
            return Err(VmError::GasSchedule("empty schedule".to_string()));
        }
        self.schedule = Some(schedule);
        Ok(())
    }
}

/// Node-side hook answering `last_nonce` with 100, 101, … and logging each call.
#[derive(Default)]
pub(crate) struct CountingHook {
    pub(crate) calls: Vec<u64>,
    pub(crate) delay: Duration,
}

#[async_trait]
impl BlockchainHook for CountingHook {
    async fn last_nonce(&mut self) -> Result<u64, HookError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let nonce = 100 + self.calls.len() as u64;
        self.calls.push(nonce);
        Ok(nonce)
    }

    async fn get_user_account(
        &mut self,
        _address: &[u8],
    ) -> Result<UserAccount, HookError> {
        Err(HookError::Node("account not found".to_string()))
    }
}

/// Node-side hook with a deterministic answer for every operation. Records the
/// name of each call; compiled code round-trips through an in-memory cache.
#[derive(Default)]
pub(crate) struct FullHook {
    pub(crate) calls: Vec<&'static str>,
    compiled: HashMap<Vec<u8>, Vec<u8>>,
}

impl FullHook {
    fn record(&mut self, name: &'static str) {
        self.calls.push(name);
    }
}

#[async_trait]
impl BlockchainHook for FullHook {
    async fn new_address(
        &mut self,
        creator_address: &[u8],
        creator_nonce: u64,
        vm_type: &[u8],
    ) -> Result<Vec<u8>, HookError> {
        self.record("new_address");
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
        self.record("get_storage_data");
        Ok([account_address, b"/".as_slice(), index].concat())
    }

    async fn get_blockhash(&mut self, nonce: u64) -> Result<Vec<u8>, HookError> {
        self.record("get_blockhash");
        Ok(nonce.to_le_bytes().to_vec())
    }

    async fn last_nonce(&mut self) -> Result<u64, HookError> {
        self.record("last_nonce");
        Ok(41)
    }

    async fn last_round(&mut self) -> Result<u64, HookError> {
        self.record("last_round");
        Ok(u64::MAX)
    }

    async fn last_time_stamp(&mut self) -> Result<u64, HookError> {
        self.record("last_time_stamp");
        Ok(1_600_000_000)
    }

    async fn last_random_seed(&mut self) -> Result<Vec<u8>, HookError> {
        self.record("last_random_seed");
        Ok(vec![0xAA; 48])
    }

    async fn last_epoch(&mut self) -> Result<u32, HookError> {
        self.record("last_epoch");
        Ok(7)
    }

    async fn get_state_root_hash(&mut self) -> Result<Vec<u8>, HookError> {
        self.record("get_state_root_hash");
        Ok(vec![0x5A; 32])
    }

    async fn current_nonce(&mut self) -> Result<u64, HookError> {
        self.record("current_nonce");
        Ok(42)
    }

    async fn current_round(&mut self) -> Result<u64, HookError> {
        self.record("current_round");
        Ok(0)
    }

    async fn current_time_stamp(&mut self) -> Result<u64, HookError> {
        self.record("current_time_stamp");
        Ok(1_600_000_006)
    }

    async fn current_random_seed(&mut self) -> Result<Vec<u8>, HookError> {
        self.record("current_random_seed");
        Ok(Vec::new())
    }

    async fn current_epoch(&mut self) -> Result<u32, HookError> {
        self.record("current_epoch");
        Ok(u32::MAX)
    }

    async fn process_builtin_function(
        &mut self,
        input: &ContractCallInput,
    ) -> Result<VmOutput, HookError> {
        self.record("process_builtin_function");
        Ok(VmOutput {
            return_data: input.vm_input.arguments.clone(),
            return_message: input.function.clone(),
            gas_refund: u128::MAX,
            output_accounts: vec![OutputAccount {
                address: input.recipient_addr.clone(),
                balance: Some(input.vm_input.call_value),
                balance_delta: i128::MIN,
                ..OutputAccount::default()
            }],
            ..VmOutput::default()
        })
    }

    async fn get_builtin_function_names(&mut self) -> Result<Vec<String>, HookError> {
        self.record("get_builtin_function_names");
        Ok(vec!["ClaimDeveloperRewards".to_string(), "SetUserName".to_string()])
    }

    async fn get_all_state(&mut self, address: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, HookError> {
        self.record("get_all_state");
        Ok(vec![
            (b"counter".to_vec(), address.to_vec()),
            (vec![0xFF, 0x00], Vec::new()),
        ])
    }

    async fn get_user_account(&mut self, address: &[u8]) -> Result<UserAccount, HookError> {
        self.record("get_user_account");
        if address.is_empty() {
            return Err(HookError::Node("account not found".to_string()));
        }
        Ok(UserAccount {
            address: address.to_vec(),
            nonce: 3,
            balance: u128::MAX - 1,
            code_hash: vec![0xC0; 32],
            developer_reward: 1 << 100,
            user_name: b"alice.elrond".to_vec(),
            ..UserAccount::default()
        })
    }

    async fn get_code(&mut self, address: &[u8]) -> Result<Vec<u8>, HookError> {
        self.record("get_code");
        Ok([b"\0asm".as_slice(), address].concat())
    }

    async fn get_shard_of_address(&mut self, address: &[u8]) -> Result<u32, HookError> {
        self.record("get_shard_of_address");
        Ok(address.last().copied().unwrap_or_default() as u32 % 3)
    }

    async fn is_payable(&mut self, address: &[u8]) -> Result<bool, HookError> {
        self.record("is_payable");
        Ok(!address.is_empty())
    }

    async fn is_smart_contract(&mut self, address: &[u8]) -> Result<bool, HookError> {
        self.record("is_smart_contract");
        Ok(address.starts_with(&[0; 8]))
    }

    async fn save_compiled_code(&mut self, code_hash: &[u8], code: &[u8]) -> Result<(), HookError> {
        self.record("save_compiled_code");
        self.compiled.insert(code_hash.to_vec(), code.to_vec());
        Ok(())
    }

    async fn get_compiled_code(&mut self, code_hash: &[u8]) -> Result<Option<Vec<u8>>, HookError> {
        self.record("get_compiled_code");
        Ok(self.compiled.get(code_hash).cloned())
    }
}

/// VM host whose every execution calls each hook operation once, plus one call
/// the node refuses, and returns the `Debug` rendering of each result.
pub(crate) struct EveryHookHost;

impl EveryHookHost {
    pub(crate) async fn execute(hook: &mut dyn BlockchainHook) -> VmOutput {
        let contract = [[0u8; 8].as_slice(), b"counter".as_slice()].concat();
        let builtin = ContractCallInput {
            recipient_addr: contract.clone(),
            function: "ESDTTransfer".to_string(),
            vm_input: crate::vm::VmInput {
                arguments: vec![b"token".to_vec(), Vec::new()],
                call_value: u128::MAX,
                ..crate::vm::VmInput::default()
            },
        };

        let results = vec![
            format!("{:?}", hook.new_address(b"alice", 9, &[5, 0]).await),
            format!("{:?}", hook.get_storage_data(&contract, b"counter").await),
            format!("{:?}", hook.get_blockhash(u64::MAX).await),
            format!("{:?}", hook.last_nonce().await),
            format!("{:?}", hook.last_round().await),
            format!("{:?}", hook.last_time_stamp().await),
            format!("{:?}", hook.last_random_seed().await),
            format!("{:?}", hook.last_epoch().await),
            format!("{:?}", hook.get_state_root_hash().await),
            format!("{:?}", hook.current_nonce().await),
            format!("{:?}", hook.current_round().await),
            format!("{:?}", hook.current_time_stamp().await),
            format!("{:?}", hook.current_random_seed().await),
            format!("{:?}", hook.current_epoch().await),
            format!("{:?}", hook.process_builtin_function(&builtin).await),
            format!("{:?}", hook.get_builtin_function_names().await),
            format!("{:?}", hook.get_all_state(&contract).await),
            format!("{:?}", hook.get_user_account(b"alice").await),
            format!("{:?}", hook.get_user_account(b"").await),
            format!("{:?}", hook.get_code(&contract).await),
            format!("{:?}", hook.get_shard_of_address(&contract).await),
            format!("{:?}", hook.is_payable(b"").await),
            format!("{:?}", hook.is_smart_contract(&contract).await),
            format!("{:?}", hook.get_compiled_code(b"hash").await),
            format!("{:?}", hook.save_compiled_code(b"hash", b"\x01\x02").await),
            format!("{:?}", hook.get_compiled_code(b"hash").await),
        ];

        VmOutput {
            return_data: results.into_iter().map(String::into_bytes).collect(),
            ..VmOutput::default()
        }
    }
}

#[async_trait]
impl VmHost for EveryHookHost {
    async fn run_create(
        &mut self,
        _input: &ContractCreateInput,
        hook: &mut dyn BlockchainHook,
    ) -> Result<VmOutput, VmError> {
        Ok(Self::execute(hook).await)
    }

    async fn run_call(
        &mut self,
        _input: &ContractCallInput,
        hook: &mut dyn BlockchainHook,
    ) -> Result<VmOutput, VmError> {
        Ok(Self::execute(hook).await)
    }

    async fn gas_schedule_change(&mut self, _schedule: GasSchedule) -> Result<(), VmError> {
        Ok(())
    }
}
