//! Streaming request decoding.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHeader};

/// Decodes a byte stream into request heads and payload events.
///
/// For each request the decoder yields one [`Message::Header`], then, unless the payload is
/// [`PayloadSize::Empty`], payload chunks closed by a single [`PayloadItem::Eof`]. Pipelined
/// requests left in the buffer are decoded on the following calls.
#[derive(Debug, Default)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHeader, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode(src)?;
            if item.as_ref().is_some_and(PayloadItem::is_eof) {
                self.payload_decoder = None;
            }
            return Ok(item.map(Message::Payload));
        }

        Ok(self.header_decoder.decode(src)?.map(|(header, payload_size)| {
            self.payload_decoder = PayloadDecoder::new(payload_size);
            Message::Header((header, payload_size))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn decode_all(input: &str) -> Vec<Message<(RequestHeader, PayloadSize)>> {
        let mut decoder = RequestDecoder::new();
        let mut buffer = BytesMut::from(input);
        let mut messages = Vec::new();
        while let Some(message) = decoder.decode(&mut buffer).unwrap() {
            messages.push(message);
        }
        messages
    }

    #[test]
    fn empty_payload_has_no_events() {
        let messages = decode_all(indoc! {"
            GET / HTTP/1.1
            Host: localhost

            GET /next HTTP/1.1
            Host: localhost

        "});

        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(Message::is_header));
    }

    #[test]
    fn pipelined_requests_with_payloads() {
        let input = "POST /a HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello\
                     POST /b HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n\
                     GET /c HTTP/1.1\r\n\r\n";
        let messages = decode_all(input);

        let kinds: Vec<&str> = messages
            .iter()
            .map(|message| match message {
                Message::Header((header, _)) => header.uri().path(),
                Message::Payload(PayloadItem::Chunk(_)) => "chunk",
                Message::Payload(PayloadItem::Eof) => "eof",
            })
            .collect();
        assert_eq!(kinds, ["/a", "chunk", "eof", "/b", "chunk", "eof", "/c"]);
    }
}
