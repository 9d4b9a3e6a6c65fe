//! Selects the payload decoder matching a request's framing.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::protocol::{ParseError, PayloadItem, PayloadSize};

/// Decodes the payload of one request.
///
/// There is no decoder for [`PayloadSize::Empty`]: a request without a payload produces no
/// payload events at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadDecoder {
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
}

impl PayloadDecoder {
    pub fn new(payload_size: PayloadSize) -> Option<Self> {
        match payload_size {
            PayloadSize::Length(length) => Some(PayloadDecoder::Length(LengthDecoder::new(length))),
            PayloadSize::Chunked => Some(PayloadDecoder::Chunked(ChunkedDecoder::new())),
            PayloadSize::Empty => None,
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self {
            PayloadDecoder::Length(decoder) => decoder.decode(src),
            PayloadDecoder::Chunked(decoder) => decoder.decode(src),
        }
    }
}
