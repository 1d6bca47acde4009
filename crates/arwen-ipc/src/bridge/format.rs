//! Payload serialization formats, chosen once per connection at initialization.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::IpcError;

/// How frame payloads are serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Json,
    /// Compact binary (postcard).
    Postcard,
}

impl WireFormat {
    pub fn serialize<T: Serialize>(self, value: &T) -> Result<Vec<u8>, IpcError> {
        match self {
            WireFormat::Json => {
                serde_json::to_vec(value).map_err(|e| IpcError::Serialization(e.to_string()))
            }
            WireFormat::Postcard => {
                postcard::to_stdvec(value).map_err(|e| IpcError::Serialization(e.to_string()))
            }
        }
    }

    pub fn deserialize<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T, IpcError> {
        match self {
            WireFormat::Json => {
                serde_json::from_slice(bytes).map_err(|e| IpcError::Serialization(e.to_string()))
            }
            WireFormat::Postcard => {
                postcard::from_bytes(bytes).map_err(|e| IpcError::Serialization(e.to_string()))
            }
        }
    }

    /// Reads only the leading dialogue nonce of an envelope whose payload type is
    /// unknown to this build.
    pub fn deserialize_nonce(self, bytes: &[u8]) -> Option<u32> {
        #[derive(Deserialize)]
        struct NonceOnly {
            dialogue_nonce: u32,
        }

        match self {
            WireFormat::Json => serde_json::from_slice::<NonceOnly>(bytes)
                .ok()
                .map(|n| n.dialogue_nonce),
            WireFormat::Postcard => postcard::take_from_bytes::<u32>(bytes)
                .ok()
                .map(|(nonce, _rest)| nonce),
        }
    }
}
