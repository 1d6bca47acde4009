//! Entry point for the arwen executable.
//!
//! ```ignore
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     arwen_ipc::run_arwen(ChildConfig::new(env!("CARGO_PKG_VERSION")), |args| {
//!         MyVm::new(&args.vm_host_parameters)
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use crate::arwen_part::ArwenPart;
use crate::bridge::protocol::ArwenArguments;
use crate::error::IpcError;
use crate::handshake;
use crate::host::{VmError, VmHost};
use crate::logs;
use crate::messenger::Messenger;
use crate::pipes::ArwenEnds;
use crate::version::{ARWEN_IPC_VERSION, VersionInfo};

/// Time left to the log writer once the loop has ended.
const LOG_FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ChildConfig {
    /// Reported to the node in `VersionResponse`.
    pub version: String,
}

impl ChildConfig {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

impl Default for ChildConfig {
    fn default() -> Self {
        Self::new(ARWEN_IPC_VERSION)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChildError {
    #[error("cannot take inherited pipes: {0}")]
    Pipes(#[source] std::io::Error),

    #[error("initialization failed: {0}")]
    Handshake(#[source] IpcError),

    #[error("cannot create VM host: {0}")]
    Host(#[source] VmError),

    #[error("dialogue loop failed: {0}")]
    Dialogue(#[source] IpcError),
}

/// Takes over fds 3..=7, reads the init arguments, builds the host and serves
/// the node until it sends `Stop`.
pub async fn run_arwen<H, F>(config: ChildConfig, make_host: F) -> Result<(), ChildError>
where
    H: VmHost,
    F: FnOnce(&ArwenArguments) -> Result<H, VmError>,
{
    let ends = ArwenEnds::take_inherited().map_err(ChildError::Pipes)?;
    let arguments = handshake::receive_arguments(ends.init)
        .await
        .map_err(ChildError::Handshake)?;

    let logging = logs::init_child_tracing(
        ends.log,
        ends.log_profile,
        arguments.logs_format,
        arguments.max_frame_length,
    );

    let version = VersionInfo::new(config.version);
    tracing::info!(
        %version,
        messages_format = ?arguments.messages_format,
        logs_format = ?arguments.logs_format,
        "arwen initialized"
    );

    let host = match make_host(&arguments) {
        Ok(host) => host,
        Err(err) => {
            tracing::error!(error = %err, "cannot create VM host");
            logging.flush(LOG_FLUSH_TIMEOUT).await;
            return Err(ChildError::Host(err));
        }
    };
    let messenger = Messenger::new(
        "arwen",
        ends.input,
        ends.output,
        arguments.messages_format,
        arguments.max_frame_length,
    );
    let mut part = ArwenPart::new(messenger, host, version.to_string());
    let result = part.start_loop().await.map_err(ChildError::Dialogue);
    if result.is_ok() {
        tracing::info!("arwen stopped");
    }

    // The runtime is dropped right after this returns, taking the writer with it.
    logging.flush(LOG_FLUSH_TIMEOUT).await;
    result
}
