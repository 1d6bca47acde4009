//! The arwen child executable. Must be started by the node, which provides the
//! pipes on fds 3..=7.

mod counter_vm;

use arwen_ipc::{ChildConfig, run_arwen};

use crate::counter_vm::CounterVm;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    run_arwen(ChildConfig::new(env!("CARGO_PKG_VERSION")), |arguments| {
        Ok(CounterVm::new(&arguments.vm_host_parameters))
    })
    .await?;
    Ok(())
}
