use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::ensure;
use crate::protocol::{PayloadItem, SendError};

/// Writes a payload framed by `Content-Length`, holding the body to exactly that many bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    remaining: u64,
    finished: bool,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length, finished: false }
    }

    pub fn is_finish(&self) -> bool {
        self.finished
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        ensure!(!self.finished, SendError::invalid_body("payload already finished"));

        match item {
            PayloadItem::Chunk(mut bytes) => {
                let len = bytes.remaining() as u64;
                ensure!(
                    len <= self.remaining,
                    SendError::invalid_body(format!("body exceeds its declared length by {} bytes", len - self.remaining))
                );
                dst.reserve(bytes.remaining());
                while bytes.has_remaining() {
                    let chunk = bytes.chunk();
                    let n = chunk.len();
                    dst.put_slice(chunk);
                    bytes.advance(n);
                }
                self.remaining -= len;
                Ok(())
            }
            PayloadItem::Eof => {
                ensure!(
                    self.remaining == 0,
                    SendError::invalid_body(format!("body ended {} bytes short of its declared length", self.remaining))
                );
                self.finished = true;
                Ok(())
            }
        }
    }
}
