//! The VM host the child drives. Contract execution itself lives behind this
//! trait; the IPC layer only moves its inputs and outputs.

use async_trait::async_trait;

use crate::hook::{BlockchainHook, HookError};
use crate::vm::{ContractCallInput, ContractCreateInput, GasSchedule, VmOutput};

#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("execution failed: {0}")]
    Execution(String),

    #[error("invalid gas schedule: {0}")]
    GasSchedule(String),

    #[error("blockchain hook failed: {0}")]
    Hook(#[from] HookError),
}

/// Executes contracts. Hook calls made through `hook` complete before the
/// method returns; the host never runs two executions at once.
#[async_trait]
pub trait VmHost: Send {
    async fn run_create(
        &mut self,
        input: &ContractCreateInput,
        hook: &mut dyn BlockchainHook,
    ) -> Result<VmOutput, VmError>;

    async fn run_call(
        &mut self,
        input: &ContractCallInput,
        hook: &mut dyn BlockchainHook,
    ) -> Result<VmOutput, VmError>;

    async fn gas_schedule_change(&mut self, schedule: GasSchedule) -> Result<(), VmError>;
}
