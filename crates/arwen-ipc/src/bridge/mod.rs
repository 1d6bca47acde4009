//! Wire protocol between the node (parent) and the arwen child process.
//!
//! # Architecture
//!
//! - **codec**: kind-tagged frames for the message pipes, length-prefixed records for the log pipes
//! - **format**: payload serialization (JSON or postcard), fixed per connection
//! - **kind**: the closed, versioned set of message kinds
//! - **protocol**: envelope, message bodies and per-kind decoding
//! - **hook_calls**: callback payloads the child sends into the node's blockchain state

pub mod codec;
pub mod format;
pub mod hook_calls;
pub mod kind;
pub mod protocol;
