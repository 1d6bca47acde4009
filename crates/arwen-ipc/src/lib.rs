//! Process isolation for the arwen VM.
//!
//! The node runs contracts in a separate `arwen` process and talks to it over
//! pipes with a length-framed, nonce-ordered request/response protocol:
//!
//! - [`bridge`]: frame codec, message kinds, payload formats
//! - [`messenger`]: nonce-checked send/receive over one pipe pair
//! - [`node_part`] / [`arwen_part`]: the two dialogue loops
//! - [`gateway`]: the child's [`BlockchainHook`] that forwards to the node
//! - [`driver`]: the node-side supervisor that spawns and restarts the child
//! - [`child`]: the child-side entry point
//!
//! ```text
//! node                                       arwen
//!  ArwenDriver ── init (fd 3) ─────────────▶  run_arwen
//!  NodePart    ── input (fd 4) ────────────▶  ArwenPart ── VmHost
//!  NodePart    ◀─ output (fd 5) ───────────   BlockchainGateway
//!  log profile ── fd 6 ────────────────────▶  reload filter
//!  log forward ◀─ fd 7 ────────────────────   PipeTracingLayer
//! ```

pub mod arwen_part;
pub mod bridge;
pub mod error;
pub mod gateway;
pub mod handshake;
pub mod hook;
pub mod host;
pub mod logs;
pub mod messenger;
pub mod node_part;
pub mod version;
pub mod vm;

#[cfg(unix)]
pub mod child;
#[cfg(unix)]
pub mod driver;
#[cfg(unix)]
mod pipes;

#[cfg(test)]
mod testing;

pub use arwen_part::ArwenPart;
pub use bridge::format::WireFormat;
pub use bridge::kind::MessageKind;
pub use bridge::protocol::{ArwenArguments, LogProfile, MessageBody};
pub use error::IpcError;
pub use gateway::BlockchainGateway;
pub use hook::{BlockchainHook, HookError};
pub use host::{VmError, VmHost};
pub use messenger::Messenger;
pub use node_part::{NodeConfig, NodePart};
pub use version::{ARWEN_IPC_VERSION, PROTOCOL_VERSION, VersionInfo};

#[cfg(unix)]
pub use child::{ChildConfig, ChildError, run_arwen};
#[cfg(unix)]
pub use driver::{ArwenDriver, DriverConfig, DriverError};
