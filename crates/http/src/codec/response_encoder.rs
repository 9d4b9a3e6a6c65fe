//! Streaming response encoding.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Message, PayloadSize, ResponseHead, SendError};

/// Encodes response heads followed by their payload events.
///
/// A head with a non-empty [`PayloadSize`] must be followed by its chunks and a closing
/// [`PayloadItem::Eof`](crate::protocol::PayloadItem::Eof) before the next head.
#[derive(Debug, Default)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<D: Buf> Encoder<Message<(ResponseHead, PayloadSize), D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive response head");
                    return Err(SendError::invalid_body("previous response payload is not finished"));
                }

                self.header_encoder.encode((head, payload_size), dst)?;
                self.payload_encoder = PayloadEncoder::new(payload_size);
                Ok(())
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect response header but receive payload item");
                    return Err(SendError::invalid_body("payload without a response head"));
                };

                payload_encoder.encode(payload_item, dst)?;
                if payload_encoder.is_finish() {
                    self.payload_encoder = None;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadItem;
    use bytes::Bytes;
    use http::Response;

    #[test]
    fn fixed_then_chunked_responses() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        let head = Response::new(());
        encoder.encode(Message::<_, Bytes>::Header((head, PayloadSize::Length(2))), &mut dst).unwrap();
        encoder.encode(Message::<(ResponseHead, PayloadSize), _>::Payload(PayloadItem::Chunk(Bytes::from_static(b"ok"))), &mut dst).unwrap();
        encoder.encode(Message::<(ResponseHead, PayloadSize), Bytes>::Payload(PayloadItem::Eof), &mut dst).unwrap();

        encoder.encode(Message::<_, Bytes>::Header((Response::new(()), PayloadSize::Chunked)), &mut dst).unwrap();
        encoder.encode(Message::<(ResponseHead, PayloadSize), _>::Payload(PayloadItem::Chunk(Bytes::from_static(b"abc"))), &mut dst).unwrap();
        encoder.encode(Message::<(ResponseHead, PayloadSize), Bytes>::Payload(PayloadItem::Eof), &mut dst).unwrap();

        assert_eq!(
            &dst[..],
            &b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok\
               HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n"[..]
        );
    }

    #[test]
    fn empty_payload_takes_no_events() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Message::<_, Bytes>::Header((Response::new(()), PayloadSize::Empty)), &mut dst).unwrap();
        let stray = encoder.encode(Message::<(ResponseHead, PayloadSize), Bytes>::Payload(PayloadItem::Eof), &mut dst);
        assert!(stray.is_err());
    }

    #[test]
    fn head_before_payload_end_is_rejected() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Message::<_, Bytes>::Header((Response::new(()), PayloadSize::Chunked)), &mut dst).unwrap();
        let early = encoder.encode(Message::<_, Bytes>::Header((Response::new(()), PayloadSize::Empty)), &mut dst);
        assert!(early.is_err());
    }
}
