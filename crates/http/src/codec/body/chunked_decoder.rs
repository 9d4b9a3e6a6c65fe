//! Decoder for `Transfer-Encoding: chunked` payloads, see
//! [RFC 9112 section 7.1](https://www.rfc-editor.org/rfc/rfc9112.html#name-chunked-transfer-coding).
//!
//! Size lines and trailer lines are consumed whole, so the decoder only ever waits for a
//! complete line; chunk data is handed out as soon as any of it is buffered. Chunk extensions
//! and trailer fields are skipped.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, PayloadItem};

/// Longest size or trailer line accepted, extensions included
const MAX_LINE_BYTES: usize = 4 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Waiting for `<hex size>[;extensions]\r\n`
    SizeLine,
    /// Inside chunk data
    Data { remaining: u64 },
    /// Waiting for the `\r\n` closing a chunk
    DataEnd,
    /// After the last chunk, skipping trailer lines up to the empty line
    Trailers,
    End,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: ChunkedState::SizeLine }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                ChunkedState::SizeLine => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    let size = parse_chunk_size(&line)?;
                    trace!(size, "read chunk size");
                    self.state = if size == 0 { ChunkedState::Trailers } else { ChunkedState::Data { remaining: size } };
                }

                ChunkedState::Data { remaining } => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let len = usize::try_from(remaining).unwrap_or(usize::MAX).min(src.len());
                    let remaining = remaining - len as u64;
                    self.state = if remaining == 0 { ChunkedState::DataEnd } else { ChunkedState::Data { remaining } };
                    return Ok(Some(PayloadItem::Chunk(src.split_to(len).freeze())));
                }

                ChunkedState::DataEnd => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    ensure!(src.starts_with(b"\r\n"), ParseError::invalid_body("chunk data is not followed by CRLF"));
                    src.advance(2);
                    self.state = ChunkedState::SizeLine;
                }

                ChunkedState::Trailers => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    if line.is_empty() {
                        trace!("finished reading chunked payload");
                        self.state = ChunkedState::End;
                    }
                }

                ChunkedState::End => return Ok(Some(PayloadItem::Eof)),
            }
        }
    }
}

/// Splits one CRLF terminated line off `src`, without its terminator.
fn take_line(src: &mut BytesMut) -> Result<Option<BytesMut>, ParseError> {
    let Some(lf) = src.iter().position(|b| *b == b'\n') else {
        ensure!(src.len() <= MAX_LINE_BYTES, ParseError::invalid_body("chunk line too long"));
        return Ok(None);
    };
    ensure!(lf <= MAX_LINE_BYTES, ParseError::invalid_body("chunk line too long"));
    ensure!(lf > 0 && src[lf - 1] == b'\r', ParseError::invalid_body("chunk line is not terminated by CRLF"));

    let mut line = src.split_to(lf + 1);
    line.truncate(lf - 1);
    Ok(Some(line))
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, ParseError> {
    let digits = match line.iter().position(|b| *b == b';') {
        Some(extension) => &line[..extension],
        None => line,
    };
    let digits = digits.trim_ascii();
    ensure!(!digits.is_empty(), ParseError::invalid_body("missing chunk size"));

    digits.iter().try_fold(0_u64, |size, b| {
        let digit = char::from(*b).to_digit(16).ok_or_else(|| ParseError::invalid_body("invalid chunk size"))?;
        size.checked_mul(16)
            .and_then(|size| size.checked_add(u64::from(digit)))
            .ok_or_else(|| ParseError::invalid_body("chunk size overflow"))
    })
}
