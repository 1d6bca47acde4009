//! Version information for the arwen IPC layer.

/// arwen-ipc version from Cargo.toml
pub const ARWEN_IPC_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bumped whenever kind tags or payload shapes change.
pub const PROTOCOL_VERSION: u32 = 1;

/// Version information reported by a child process.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VersionInfo {
    /// Version of the child executable.
    pub arwen: String,
    pub ipc: &'static str,
    pub protocol: u32,
}

impl VersionInfo {
    pub fn new(arwen: impl Into<String>) -> Self {
        Self {
            arwen: arwen.into(),
            ipc: ARWEN_IPC_VERSION,
            protocol: PROTOCOL_VERSION,
        }
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (ipc {}, protocol {})",
            self.arwen, self.ipc, self.protocol
        )
    }
}
