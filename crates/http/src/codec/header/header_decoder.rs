//! Request head decoding.
//!
//! The head is parsed with `httparse` against a fixed table of [`MAX_HEADER_NUM`] entries.
//! Once a head is complete its bytes are split off the read buffer and frozen, and the URI and
//! header values are taken as shared slices of that one allocation.
//!
//! The payload framing is decided from the headers alone:
//!
//! - `Transfer-Encoding` whose final coding is `chunked` selects chunked framing
//! - `Content-Length` selects fixed-length framing, `0` meaning no payload
//! - neither header means no payload, whatever the method
//!
//! Requests carrying both headers, or a transfer coding other than a final `chunked`, are
//! rejected.

use std::ops::Range;

use bytes::BytesMut;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri, Version, header};
use httparse::Status;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, RequestHeader};

/// Maximum number of headers allowed in a request
const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes of the request line plus all headers
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decodes a request head into a [`RequestHeader`] and the [`PayloadSize`] that follows it.
///
/// HTTP/1.0 heads decode successfully; rejecting them is up to the connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderDecoder;

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut parsed = httparse::Request::new(&mut headers);

        let head_len = match parsed.parse(src).map_err(into_parse_error)? {
            Status::Complete(head_len) => head_len,
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                return Ok(None);
            }
        };
        trace!(head_len, "parsed request head");
        ensure!(head_len <= MAX_HEADER_BYTES, ParseError::too_large_header(head_len, MAX_HEADER_BYTES));

        let version = match parsed.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            _ => return Err(ParseError::invalid_header("missing http version")),
        };
        let method = parsed.method.ok_or(ParseError::InvalidMethod)?;
        let method = Method::from_bytes(method.as_bytes()).map_err(|_invalid| ParseError::InvalidMethod)?;

        // positions are recorded against `src` so the values can later be sliced out of the
        // frozen head without copying
        let base = src.as_ptr() as usize;
        let span = |slice: &[u8]| {
            let start = slice.as_ptr() as usize - base;
            start..start + slice.len()
        };

        let path = span(parsed.path.ok_or(ParseError::InvalidUri)?.as_bytes());
        let fields = parsed
            .headers
            .iter()
            .map(|field| {
                let name = HeaderName::from_bytes(field.name.as_bytes()).map_err(ParseError::invalid_header)?;
                Ok((name, span(field.value)))
            })
            .collect::<Result<Vec<(HeaderName, Range<usize>)>, ParseError>>()?;

        let head = src.split_to(head_len).freeze();

        let mut header_map = HeaderMap::with_capacity(fields.len());
        for (name, value) in fields {
            let value = HeaderValue::from_maybe_shared(head.slice(value)).map_err(ParseError::invalid_header)?;
            header_map.append(name, value);
        }

        let payload_size = payload_size(&header_map)?;

        let mut request = Request::new(());
        *request.method_mut() = method;
        *request.uri_mut() = Uri::from_maybe_shared(head.slice(path)).map_err(|_invalid| ParseError::InvalidUri)?;
        *request.version_mut() = version;
        *request.headers_mut() = header_map;

        Ok(Some((RequestHeader::from(request), payload_size)))
    }
}

fn into_parse_error(e: httparse::Error) -> ParseError {
    match e {
        httparse::Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
        e => ParseError::invalid_header(e),
    }
}

/// Decides how the request payload is framed, refer to
/// <https://www.rfc-editor.org/rfc/rfc9112.html#name-message-body-length>.
fn payload_size(headers: &HeaderMap) -> Result<PayloadSize, ParseError> {
    let has_transfer_encoding = headers.contains_key(header::TRANSFER_ENCODING);
    let has_content_length = headers.contains_key(header::CONTENT_LENGTH);

    match (has_transfer_encoding, has_content_length) {
        (false, false) => Ok(PayloadSize::new_empty()),
        (true, false) if is_chunked(headers) => Ok(PayloadSize::new_chunked()),
        (true, false) => Err(ParseError::invalid_transfer_encoding("chunked must be the final transfer coding")),
        (false, true) => content_length(headers).map(PayloadSize::new_length),
        (true, true) => Err(ParseError::invalid_transfer_encoding("transfer-encoding and content-length both present")),
    }
}

/// Parses every `Content-Length` value; repeated values must agree.
fn content_length(headers: &HeaderMap) -> Result<u64, ParseError> {
    let mut length = None;
    for value in headers.get_all(header::CONTENT_LENGTH) {
        for part in value.as_bytes().split(|b| *b == b',') {
            let part = part.trim_ascii();
            let parsed = std::str::from_utf8(part)
                .ok()
                .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| ParseError::invalid_content_length(format!("value {} is not u64", String::from_utf8_lossy(part))))?;

            match length {
                Some(previous) if previous != parsed => {
                    return Err(ParseError::invalid_content_length(format!("conflicting values {previous} and {parsed}")));
                }
                _ => length = Some(parsed),
            }
        }
    }
    length.ok_or_else(|| ParseError::invalid_content_length("empty value"))
}

/// Returns true if the final transfer coding is `chunked`.
fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::TRANSFER_ENCODING)
        .iter()
        .next_back()
        .and_then(|value| value.as_bytes().rsplit(|b| *b == b',').next())
        .is_some_and(|coding| coding.trim_ascii().eq_ignore_ascii_case(b"chunked"))
}
