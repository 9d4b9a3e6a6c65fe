//! HTTP/1.1 wire codec.
//!
//! [`RequestDecoder`] and [`ResponseEncoder`] plug into `tokio_util`'s `FramedRead` and
//! `FramedWrite`. Both speak in [`Message`](crate::protocol::Message) events: a head, then
//! payload chunks closed by an end marker.
//!
//! Request heads are limited to 8 KiB and 64 headers.

mod body;
mod header;
mod request_decoder;
mod response_encoder;

pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
