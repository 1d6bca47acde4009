//! Framed codecs for the node/arwen pipes.
//!
//! Message pipes carry `[length: u32 LE][kind: u32 LE][payload]` frames
//! ([`FrameCodec`]). The log pipes carry bare `[length: u32 LE][payload]` records
//! ([`RecordCodec`]). Both work over any AsyncRead/AsyncWrite.

use std::io;
use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};
use tokio_util::bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use super::format::WireFormat;
use crate::error::IpcError;

/// Size of the frame header: payload length followed by kind tag.
pub const HEADER_LEN: usize = 8;

/// Ceiling on a single payload unless configured otherwise.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

/// One unit of wire data. The codec never looks inside `payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: u32,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }
}

/// Codec for kind-tagged frames.
///
/// A stream that ends inside a header or payload is an I/O error (the default
/// `decode_eof` reports leftover bytes), never an empty frame.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_length: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LENGTH)
    }
}

impl FrameCodec {
    pub fn new(max_frame_length: usize) -> Self {
        Self { max_frame_length }
    }

    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }

    fn check_length(&self, size: usize) -> Result<(), IpcError> {
        if size > self.max_frame_length || u32::try_from(size).is_err() {
            return Err(IpcError::FrameTooLarge {
                size,
                max: self.max_frame_length,
            });
        }
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = IpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            src.reserve(HEADER_LEN - src.len());
            return Ok(None);
        }

        let mut length = [0u8; 4];
        length.copy_from_slice(&src[..4]);
        let length = u32::from_le_bytes(length) as usize;
        self.check_length(length)?;

        let total = HEADER_LEN + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(4);
        let kind = src.get_u32_le();
        let payload = src.split_to(length).freeze();
        Ok(Some(Frame { kind, payload }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = IpcError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let length = frame.payload.len();
        self.check_length(length)?;

        dst.reserve(HEADER_LEN + length);
        dst.put_u32_le(length as u32);
        dst.put_u32_le(frame.kind);
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}

/// Length-prefixed records serialized in a [`WireFormat`].
///
/// Wraps LengthDelimitedCodec (4-byte little-endian length) and adds payload
/// serialization. Used for the log and log-profile pipes.
pub struct RecordCodec<T> {
    inner: LengthDelimitedCodec,
    format: WireFormat,
    _phantom: PhantomData<T>,
}

impl<T> RecordCodec<T> {
    pub fn new(format: WireFormat, max_frame_length: usize) -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .little_endian()
                .length_field_length(4)
                .max_frame_length(max_frame_length)
                .new_codec(),
            format,
            _phantom: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Decoder for RecordCodec<T> {
    type Item = T;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(bytes) => {
                let item = self
                    .format
                    .deserialize(&bytes)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}

impl<T: Serialize> Encoder<T> for RecordCodec<T> {
    type Error = io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // No tracing here: the child's log writer encodes through this codec.
        let bytes = self
            .format
            .serialize(&item)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.inner.encode(Bytes::from(bytes), dst)
    }
}
