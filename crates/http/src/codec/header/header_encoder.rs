//! Response head encoding.

use std::fmt::Write;
use std::io;

use bytes::{BufMut, BytesMut};
use http::{HeaderValue, StatusCode, Version, header};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::{PayloadSize, ResponseHead, SendError};

/// Bytes reserved up front for a response head
const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Writes the status line and headers of a response.
///
/// The framing headers are always derived from the [`PayloadSize`]: any `Content-Length` or
/// `Transfer-Encoding` set by the handler is replaced.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        if head.version() != Version::HTTP_11 {
            error!(http_version = ?head.version(), "unsupported http version");
            return Err(SendError::io(io::Error::from(io::ErrorKind::Unsupported)));
        }

        let status = head.status();
        let headers = head.headers_mut();
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::TRANSFER_ENCODING);
        match payload_size {
            PayloadSize::Length(length) => {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            }
            PayloadSize::Chunked => {
                headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            }
            PayloadSize::Empty if forbids_content_length(status) => {}
            PayloadSize::Empty => {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
            }
        }

        dst.reserve(INIT_HEADER_SIZE);
        write!(dst, "HTTP/1.1 {} {}\r\n", status.as_str(), status.canonical_reason().unwrap_or_default())
            .map_err(|e| SendError::io(io::Error::other(e)))?;

        for (name, value) in head.headers() {
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

fn forbids_content_length(status: StatusCode) -> bool {
    status.is_informational() || status == StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Response;

    fn encode(head: ResponseHead, payload_size: PayloadSize) -> String {
        let mut dst = BytesMut::new();
        HeaderEncoder.encode((head, payload_size), &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn fixed_length_head() {
        let head = Response::builder().header("Content-Type", "text/plain").body(()).unwrap();
        assert_eq!(encode(head, PayloadSize::Length(11)), "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 11\r\n\r\n");
    }

    #[test]
    fn framing_headers_are_replaced() {
        let head = Response::builder().header("Content-Length", "99").body(()).unwrap();
        assert_eq!(encode(head, PayloadSize::Chunked), "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n");

        let head = Response::builder().status(StatusCode::NOT_FOUND).body(()).unwrap();
        assert_eq!(encode(head, PayloadSize::Empty), "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\n\r\n");

        let head = Response::builder().status(StatusCode::NO_CONTENT).body(()).unwrap();
        assert_eq!(encode(head, PayloadSize::Empty), "HTTP/1.1 204 No Content\r\n\r\n");
    }

    #[test]
    fn only_http_11_is_written() {
        let head = Response::builder().version(Version::HTTP_10).body(()).unwrap();
        assert!(HeaderEncoder.encode((head, PayloadSize::Empty), &mut BytesMut::new()).is_err());
    }
}
