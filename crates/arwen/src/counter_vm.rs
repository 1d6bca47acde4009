//! A counter contract engine standing in for the WASM VM.
//!
//! Every deployed contract holds one big-endian `u64` under the `counter`
//! storage key. Functions:
//!
//! - `increment`: adds one and returns the new value
//! - `get`: returns the value
//! - `echo`: prints its first argument on stdout and returns it
//! - `fail`: fails the execution
//! - `crash`: exits the process mid-call

use arwen_ipc::vm::{
    ContractCallInput, ContractCreateInput, GasSchedule, OutputAccount, ReturnCode,
    StorageUpdate, VmHostParameters, VmOutput,
};
use arwen_ipc::{BlockchainHook, HookError, VmError, VmHost};
use async_trait::async_trait;

pub const COUNTER_KEY: &[u8] = b"counter";

const COST_CATEGORY: &str = "CounterCost";
const DEFAULT_DEPLOY_COST: u64 = 1_000;
const DEFAULT_CALL_COST: u64 = 100;

pub struct CounterVm {
    vm_type: Vec<u8>,
    gas_schedule: GasSchedule,
}

impl CounterVm {
    pub fn new(params: &VmHostParameters) -> Self {
        Self {
            vm_type: params.vm_type.clone(),
            gas_schedule: params.gas_schedule.clone(),
        }
    }

    fn cost(&self, name: &str, default: u64) -> u64 {
        self.gas_schedule
            .get(COST_CATEGORY)
            .and_then(|costs| costs.get(name))
            .copied()
            .unwrap_or(default)
    }
}

fn decode_counter(bytes: &[u8]) -> u64 {
    match <[u8; 8]>::try_from(bytes) {
        Ok(raw) => u64::from_be_bytes(raw),
        Err(_) => 0,
    }
}

#[async_trait]
impl VmHost for CounterVm {
    async fn run_create(
        &mut self,
        input: &ContractCreateInput,
        hook: &mut dyn BlockchainHook,
    ) -> Result<VmOutput, VmError> {
        let cost = self.cost("Deploy", DEFAULT_DEPLOY_COST);
        let caller = &input.vm_input.caller_addr;
        if input.vm_input.gas_provided < cost {
            return Ok(VmOutput::with_code(ReturnCode::OutOfGas, "not enough gas to deploy"));
        }

        let nonce = match hook.get_user_account(caller).await {
            Ok(account) => account.nonce,
            Err(HookError::Node(reason)) => {
                tracing::debug!(%reason, "deploying from an unknown account");
                0
            }
            Err(err) => return Err(err.into()),
        };
        let address = hook.new_address(caller, nonce, &self.vm_type).await?;
        let initial = input
            .vm_input
            .arguments
            .first()
            .map(|arg| decode_counter(arg))
            .unwrap_or(0);

        tracing::info!(nonce, initial, "counter deployed");
        Ok(VmOutput {
            return_data: vec![address.clone()],
            gas_remaining: input.vm_input.gas_provided - cost,
            output_accounts: vec![OutputAccount {
                address: address.clone(),
                storage_updates: vec![StorageUpdate {
                    offset: COUNTER_KEY.to_vec(),
                    data: initial.to_be_bytes().to_vec(),
                }],
                code: input.contract_code.clone(),
                code_metadata: input.contract_code_metadata.clone(),
                code_deployer_address: caller.clone(),
                gas_used: cost,
                ..OutputAccount::default()
            }],
            touched_accounts: vec![caller.clone(), address],
            ..VmOutput::default()
        })
    }

    async fn run_call(
        &mut self,
        input: &ContractCallInput,
        hook: &mut dyn BlockchainHook,
    ) -> Result<VmOutput, VmError> {
        let cost = self.cost("Call", DEFAULT_CALL_COST);
        let contract = &input.recipient_addr;
        if hook.get_code(contract).await?.is_empty() {
            return Ok(VmOutput::with_code(ReturnCode::ContractNotFound, "no code at address"));
        }
        if input.vm_input.gas_provided < cost {
            return Ok(VmOutput::with_code(ReturnCode::OutOfGas, "not enough gas to call"));
        }
        tracing::debug!(function = %input.function, "executing");

        let mut output = VmOutput {
            gas_remaining: input.vm_input.gas_provided - cost,
            ..VmOutput::default()
        };
        match input.function.as_str() {
            "increment" => {
                let current = decode_counter(&hook.get_storage_data(contract, COUNTER_KEY).await?);
                let next = current
                    .checked_add(1)
                    .ok_or_else(|| VmError::Execution("counter overflow".to_string()))?;
                output.return_data.push(next.to_be_bytes().to_vec());
                output.output_accounts.push(OutputAccount {
                    address: contract.clone(),
                    storage_updates: vec![StorageUpdate {
                        offset: COUNTER_KEY.to_vec(),
                        data: next.to_be_bytes().to_vec(),
                    }],
                    gas_used: cost,
                    ..OutputAccount::default()
                });
            }
            "get" => {
                let current = decode_counter(&hook.get_storage_data(contract, COUNTER_KEY).await?);
                output.return_data.push(current.to_be_bytes().to_vec());
            }
            "echo" => {
                let text = input.vm_input.arguments.first().cloned().unwrap_or_default();
                println!("{}", String::from_utf8_lossy(&text));
                output.return_data.push(text);
            }
            "fail" => return Err(VmError::Execution("requested fail".to_string())),
            "crash" => std::process::exit(3),
            other => {
                return Ok(VmOutput::with_code(
                    ReturnCode::FunctionNotFound,
                    format!("function {other} not found"),
                ));
            }
        }
        Ok(output)
    }

    async fn gas_schedule_change(&mut self, schedule: GasSchedule) -> Result<(), VmError> {
        if schedule.is_empty() {
            return Err(VmError::GasSchedule("empty gas schedule".to_string()));
        }
        self.gas_schedule = schedule;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use arwen_ipc::vm::UserAccount;

    #[derive(Default)]
    struct Chain {
        storage: HashMap<Vec<u8>, Vec<u8>>,
        code: Vec<u8>,
        nonce: Option<u64>,
    }

    #[async_trait]
    impl BlockchainHook for Chain {
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

        async fn get_user_account(&mut self, address: &[u8]) -> Result<UserAccount, HookError> {
            match self.nonce {
                Some(nonce) => Ok(UserAccount {
                    address: address.to_vec(),
                    nonce,
                    ..UserAccount::default()
                }),
                None => Err(HookError::Node("account not found".to_string())),
            }
        }

        async fn get_storage_data(
            &mut self,
            _account_address: &[u8],
            index: &[u8],
        ) -> Result<Vec<u8>, HookError> {
            Ok(self.storage.get(index).cloned().unwrap_or_default())
        }

        async fn get_code(&mut self, _address: &[u8]) -> Result<Vec<u8>, HookError> {
            Ok(self.code.clone())
        }
    }

    fn vm() -> CounterVm {
        CounterVm::new(&VmHostParameters {
            vm_type: vec![5, 0],
            ..VmHostParameters::default()
        })
    }

    fn call(function: &str) -> ContractCallInput {
        let mut input = ContractCallInput {
            recipient_addr: b"counter".to_vec(),
            function: function.to_string(),
            ..ContractCallInput::default()
        };
        input.vm_input.gas_provided = 500;
        input
    }

    #[tokio::test]
    async fn deploy_derives_address_from_caller_nonce() {
        let mut chain = Chain {
            nonce: Some(7),
            ..Chain::default()
        };
        let mut input = ContractCreateInput {
            contract_code: b"wasm".to_vec(),
            ..ContractCreateInput::default()
        };
        input.vm_input.caller_addr = b"alice".to_vec();
        input.vm_input.gas_provided = 5_000;
        input.vm_input.arguments = vec![41u64.to_be_bytes().to_vec()];

        let output = vm().run_create(&input, &mut chain).await.unwrap();
        let mut expected = b"alice".to_vec();
        expected.extend_from_slice(&7u64.to_be_bytes());
        expected.extend_from_slice(&[5, 0]);
        assert_eq!(output.return_data, vec![expected.clone()]);
        assert_eq!(output.gas_remaining, 4_000);
        let account = output.output_account(&expected).unwrap();
        assert_eq!(account.code, b"wasm");
        assert_eq!(account.code_deployer_address, b"alice");
        assert_eq!(account.storage_updates[0].data, 41u64.to_be_bytes());
    }

    #[tokio::test]
    async fn unknown_deployer_starts_at_nonce_zero() {
        let mut input = ContractCreateInput::default();
        input.vm_input.caller_addr = b"bob".to_vec();
        input.vm_input.gas_provided = 5_000;
        let output = vm().run_create(&input, &mut Chain::default()).await.unwrap();
        assert!(output.return_data[0].starts_with(b"bob\0\0\0\0\0\0\0\0"));
    }

    #[tokio::test]
    async fn increment_reads_and_writes_storage() {
        let mut chain = Chain {
            code: b"wasm".to_vec(),
            ..Chain::default()
        };
        chain
            .storage
            .insert(COUNTER_KEY.to_vec(), 9u64.to_be_bytes().to_vec());
        let output = vm().run_call(&call("increment"), &mut chain).await.unwrap();
        assert_eq!(output.return_data, vec![10u64.to_be_bytes().to_vec()]);
        assert_eq!(output.gas_remaining, 400);
        assert_eq!(
            output.output_accounts[0].storage_updates[0].data,
            10u64.to_be_bytes()
        );
    }

    #[tokio::test]
    async fn missing_code_and_function() {
        let output = vm()
            .run_call(&call("increment"), &mut Chain::default())
            .await
            .unwrap();
        assert_eq!(output.return_code, ReturnCode::ContractNotFound);

        let mut chain = Chain {
            code: b"wasm".to_vec(),
            ..Chain::default()
        };
        let output = vm().run_call(&call("decrement"), &mut chain).await.unwrap();
        assert_eq!(output.return_code, ReturnCode::FunctionNotFound);
        assert!(vm().run_call(&call("fail"), &mut chain).await.is_err());
    }

    #[tokio::test]
    async fn gas_schedule_prices_calls() {
        let mut vm = vm();
        assert!(vm.gas_schedule_change(GasSchedule::new()).await.is_err());

        let mut schedule = GasSchedule::new();
        schedule
            .entry(COST_CATEGORY.to_string())
            .or_default()
            .insert("Call".to_string(), 450);
        vm.gas_schedule_change(schedule).await.unwrap();

        let mut chain = Chain {
            code: b"wasm".to_vec(),
            ..Chain::default()
        };
        let output = vm.run_call(&call("get"), &mut chain).await.unwrap();
        assert_eq!(output.gas_remaining, 50);
    }
}
