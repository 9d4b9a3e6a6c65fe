//! Selects the payload encoder matching a response's framing.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;

use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::LengthEncoder;
use crate::protocol::{PayloadItem, PayloadSize, SendError};

/// Encodes the payload of one response.
///
/// Like [`super::PayloadDecoder`], an empty payload has no encoder: its head is the whole
/// response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadEncoder {
    Length(LengthEncoder),
    Chunked(ChunkedEncoder),
}

impl PayloadEncoder {
    pub fn new(payload_size: PayloadSize) -> Option<Self> {
        match payload_size {
            PayloadSize::Length(length) => Some(PayloadEncoder::Length(LengthEncoder::new(length))),
            PayloadSize::Chunked => Some(PayloadEncoder::Chunked(ChunkedEncoder::new())),
            PayloadSize::Empty => None,
        }
    }

    /// Returns true once the terminal [`PayloadItem::Eof`] was encoded.
    pub fn is_finish(&self) -> bool {
        match self {
            PayloadEncoder::Length(encoder) => encoder.is_finish(),
            PayloadEncoder::Chunked(encoder) => encoder.is_finish(),
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match self {
            PayloadEncoder::Length(encoder) => encoder.encode(item, dst),
            PayloadEncoder::Chunked(encoder) => encoder.encode(item, dst),
        }
    }
}
