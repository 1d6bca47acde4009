//! Message envelope, message bodies and the per-kind decode table.
//!
//! Every payload on the message pipes is an envelope
//! `{ dialogue_nonce, payload }` serialized in the connection's [`WireFormat`].
//! The frame header carries the kind; bodies never carry it themselves, so a
//! body can only be framed under the kind its variant implies.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::codec::{DEFAULT_MAX_FRAME_LENGTH, Frame};
use super::format::WireFormat;
use super::hook_calls::{HookCallRequest, HookCallResponse};
use super::kind::MessageKind;
use crate::error::IpcError;
use crate::version::PROTOCOL_VERSION;
use crate::vm::{ContractCallInput, ContractCreateInput, GasSchedule, VmHostParameters, VmOutput};

/// Nonce given to messages whose envelope could not be read.
pub const UNDEFINED_NONCE: u32 = u32::MAX;

/// One-shot initialization payload sent over the init pipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArwenArguments {
    pub protocol_version: u32,
    pub vm_host_parameters: VmHostParameters,
    pub messages_format: WireFormat,
    pub logs_format: WireFormat,
    pub max_frame_length: usize,
}

impl ArwenArguments {
    pub fn new(vm_host_parameters: VmHostParameters) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            vm_host_parameters,
            messages_format: WireFormat::Json,
            logs_format: WireFormat::Json,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }

    pub fn with_messages_format(mut self, format: WireFormat) -> Self {
        self.messages_format = format;
        self
    }

    pub fn with_logs_format(mut self, format: WireFormat) -> Self {
        self.logs_format = format;
        self
    }

    pub fn with_max_frame_length(mut self, max: usize) -> Self {
        self.max_frame_length = max;
        self
    }
}

/// A tracing event shipped from the child over the log pipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub target: String,
    pub level: String,
    pub message: String,
}

/// Filter directives (EnvFilter syntax) the child applies to its own logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogProfile {
    pub filter: String,
}

impl LogProfile {
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
        }
    }
}

impl Default for LogProfile {
    fn default() -> Self {
        Self::new("info")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Initialize(ArwenArguments),
    Stop,
    ContractDeployRequest(ContractCreateInput),
    ContractCallRequest(ContractCallInput),
    ContractResponse(Result<VmOutput, String>),
    GasScheduleChangeRequest(GasSchedule),
    GasScheduleChangeResponse(Result<(), String>),
    HookCallRequest(HookCallRequest),
    HookCallResponse(HookCallResponse),
    DiagnoseWaitRequest { milliseconds: u32 },
    DiagnoseWaitResponse(Result<(), String>),
    VersionRequest,
    VersionResponse(String),
    /// Best-effort closing message from a child that is about to exit.
    CriticalError(String),
    /// A frame whose kind this build does not recognize.
    Undefined { kind: u32 },
}

impl MessageBody {
    /// Wire tag this body is framed under.
    pub fn tag(&self) -> u32 {
        match self {
            MessageBody::Undefined { kind } => *kind,
            other => other.kind().tag(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Initialize(_) => MessageKind::Initialize,
            MessageBody::Stop => MessageKind::Stop,
            MessageBody::ContractDeployRequest(_) => MessageKind::ContractDeployRequest,
            MessageBody::ContractCallRequest(_) => MessageKind::ContractCallRequest,
            MessageBody::ContractResponse(_) => MessageKind::ContractResponse,
            MessageBody::GasScheduleChangeRequest(_) => MessageKind::GasScheduleChangeRequest,
            MessageBody::GasScheduleChangeResponse(_) => MessageKind::GasScheduleChangeResponse,
            MessageBody::HookCallRequest(request) => request.kind(),
            MessageBody::HookCallResponse(response) => response.kind(),
            MessageBody::DiagnoseWaitRequest { .. } => MessageKind::DiagnoseWaitRequest,
            MessageBody::DiagnoseWaitResponse(_) => MessageKind::DiagnoseWaitResponse,
            MessageBody::VersionRequest => MessageKind::VersionRequest,
            MessageBody::VersionResponse(_) => MessageKind::VersionResponse,
            MessageBody::CriticalError(_) => MessageKind::CriticalError,
            MessageBody::Undefined { .. } => MessageKind::UndefinedRequestOrResponse,
        }
    }
}

/// A decoded message: envelope nonce plus typed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub dialogue_nonce: u32,
    pub body: MessageBody,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    dialogue_nonce: u32,
    payload: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    dialogue_nonce: u32,
    payload: T,
}

fn pack<T: Serialize>(
    kind: u32,
    dialogue_nonce: u32,
    payload: &T,
    format: WireFormat,
) -> Result<Frame, IpcError> {
    let bytes = format.serialize(&EnvelopeRef {
        dialogue_nonce,
        payload,
    })?;
    Ok(Frame::new(kind, bytes))
}

fn open<T: DeserializeOwned>(frame: &Frame, format: WireFormat) -> Result<(u32, T), IpcError> {
    let envelope: Envelope<T> = format.deserialize(&frame.payload)?;
    Ok((envelope.dialogue_nonce, envelope.payload))
}

/// Frames `body` under its kind with the given nonce.
pub fn encode(body: &MessageBody, dialogue_nonce: u32, format: WireFormat) -> Result<Frame, IpcError> {
    let tag = body.tag();
    match body {
        MessageBody::Initialize(arguments) => pack(tag, dialogue_nonce, arguments, format),
        MessageBody::Stop | MessageBody::VersionRequest | MessageBody::Undefined { .. } => {
            pack(tag, dialogue_nonce, &(), format)
        }
        MessageBody::ContractDeployRequest(input) => pack(tag, dialogue_nonce, input, format),
        MessageBody::ContractCallRequest(input) => pack(tag, dialogue_nonce, input, format),
        MessageBody::ContractResponse(output) => pack(tag, dialogue_nonce, output, format),
        MessageBody::GasScheduleChangeRequest(schedule) => {
            pack(tag, dialogue_nonce, schedule, format)
        }
        MessageBody::GasScheduleChangeResponse(result)
        | MessageBody::DiagnoseWaitResponse(result) => pack(tag, dialogue_nonce, result, format),
        MessageBody::HookCallRequest(request) => pack(tag, dialogue_nonce, request, format),
        MessageBody::HookCallResponse(response) => pack(tag, dialogue_nonce, response, format),
        MessageBody::DiagnoseWaitRequest { milliseconds } => {
            pack(tag, dialogue_nonce, milliseconds, format)
        }
        MessageBody::VersionResponse(version) => pack(tag, dialogue_nonce, version, format),
        MessageBody::CriticalError(reason) => pack(tag, dialogue_nonce, reason, format),
    }
}

/// Rebuilds a typed message from a frame, dispatching on the header kind.
///
/// Unknown kinds do not fail: they decode to [`MessageBody::Undefined`] and keep
/// whatever nonce can be read from the envelope, or [`UNDEFINED_NONCE`].
pub fn decode(frame: &Frame, format: WireFormat) -> Result<Message, IpcError> {
    let Some(kind) = MessageKind::from_u32(frame.kind) else {
        return Ok(undefined(frame, format));
    };

    let (dialogue_nonce, body) = match kind {
        MessageKind::Initialize => {
            let (nonce, arguments) = open(frame, format)?;
            (nonce, MessageBody::Initialize(arguments))
        }
        MessageKind::Stop => {
            let (nonce, ()) = open(frame, format)?;
            (nonce, MessageBody::Stop)
        }
        MessageKind::ContractDeployRequest => {
            let (nonce, input) = open(frame, format)?;
            (nonce, MessageBody::ContractDeployRequest(input))
        }
        MessageKind::ContractCallRequest => {
            let (nonce, input) = open(frame, format)?;
            (nonce, MessageBody::ContractCallRequest(input))
        }
        MessageKind::ContractResponse => {
            let (nonce, output) = open(frame, format)?;
            (nonce, MessageBody::ContractResponse(output))
        }
        MessageKind::GasScheduleChangeRequest => {
            let (nonce, schedule) = open(frame, format)?;
            (nonce, MessageBody::GasScheduleChangeRequest(schedule))
        }
        MessageKind::GasScheduleChangeResponse => {
            let (nonce, result) = open(frame, format)?;
            (nonce, MessageBody::GasScheduleChangeResponse(result))
        }
        MessageKind::DiagnoseWaitRequest => {
            let (nonce, milliseconds) = open(frame, format)?;
            (nonce, MessageBody::DiagnoseWaitRequest { milliseconds })
        }
        MessageKind::DiagnoseWaitResponse => {
            let (nonce, result) = open(frame, format)?;
            (nonce, MessageBody::DiagnoseWaitResponse(result))
        }
        MessageKind::VersionRequest => {
            let (nonce, ()) = open(frame, format)?;
            (nonce, MessageBody::VersionRequest)
        }
        MessageKind::VersionResponse => {
            let (nonce, version) = open(frame, format)?;
            (nonce, MessageBody::VersionResponse(version))
        }
        MessageKind::CriticalError => {
            let (nonce, reason) = open(frame, format)?;
            (nonce, MessageBody::CriticalError(reason))
        }
        k if k.is_hook_call_request() => {
            let (nonce, request): (u32, HookCallRequest) = open(frame, format)?;
            if request.kind() != k {
                return Err(IpcError::KindMismatch {
                    header: k,
                    payload: request.kind(),
                });
            }
            (nonce, MessageBody::HookCallRequest(request))
        }
        k if k.is_hook_call_response() => {
            let (nonce, response): (u32, HookCallResponse) = open(frame, format)?;
            if response.kind() != k {
                return Err(IpcError::KindMismatch {
                    header: k,
                    payload: response.kind(),
                });
            }
            (nonce, MessageBody::HookCallResponse(response))
        }
        _ => return Ok(undefined(frame, format)),
    };

    Ok(Message {
        dialogue_nonce,
        body,
    })
}

fn undefined(frame: &Frame, format: WireFormat) -> Message {
    Message {
        dialogue_nonce: format
            .deserialize_nonce(&frame.payload)
            .unwrap_or(UNDEFINED_NONCE),
        body: MessageBody::Undefined { kind: frame.kind },
    }
}
