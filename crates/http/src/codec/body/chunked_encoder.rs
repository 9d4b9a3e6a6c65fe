use std::fmt::Write;
use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::ensure;
use crate::protocol::{PayloadItem, SendError};

/// Writes a `Transfer-Encoding: chunked` payload.
///
/// Empty chunks are dropped since a zero-size chunk would end the payload early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedEncoder {
    finished: bool,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { finished: false }
    }

    pub fn is_finish(&self) -> bool {
        self.finished
    }
}

impl Default for ChunkedEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        ensure!(!self.finished, SendError::invalid_body("payload already finished"));

        match item {
            PayloadItem::Chunk(bytes) if !bytes.has_remaining() => Ok(()),
            PayloadItem::Chunk(mut bytes) => {
                dst.reserve(bytes.remaining() + 20);
                write!(dst, "{:X}\r\n", bytes.remaining()).map_err(|e| SendError::io(io::Error::other(e)))?;
                while bytes.has_remaining() {
                    let chunk = bytes.chunk();
                    let n = chunk.len();
                    dst.put_slice(chunk);
                    bytes.advance(n);
                }
                dst.put_slice(b"\r\n");
                Ok(())
            }
            PayloadItem::Eof => {
                self.finished = true;
                dst.put_slice(b"0\r\n\r\n");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn frames_chunks_and_terminator() {
        let mut encoder = ChunkedEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello world, foo bar")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::new()), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert_eq!(&dst[..], b"14\r\nhello world, foo bar\r\n0\r\n\r\n");
        assert!(encoder.is_finish());
        assert!(encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).is_err());
    }
}
