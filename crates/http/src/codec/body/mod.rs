//! Payload framing.
//!
//! Requests are decoded and responses encoded with one of two framings:
//!
//! - fixed length, declared by `Content-Length` ([`LengthDecoder`](length_decoder::LengthDecoder), [`LengthEncoder`](length_encoder::LengthEncoder))
//! - chunked transfer coding ([`ChunkedDecoder`](chunked_decoder::ChunkedDecoder), [`ChunkedEncoder`](chunked_encoder::ChunkedEncoder))
//!
//! [`PayloadDecoder`] and [`PayloadEncoder`] pick between them from a [`PayloadSize`](crate::protocol::PayloadSize).

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
