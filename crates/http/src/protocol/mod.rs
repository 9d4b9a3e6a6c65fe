//! Protocol vocabulary shared by the codec, the connection pipeline and handlers.
//!
//! - [`Message`], [`PayloadItem`] and [`PayloadSize`]: the events exchanged with the codec
//! - [`RequestHeader`] / [`ResponseHead`]: message heads without bodies
//! - [`body`]: the [`Body`](body::Body) type and the request body ingress bridge
//! - error types: [`HttpError`], [`ParseError`], [`SendError`], [`BodyError`], [`BufError`]

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHeader;
pub(crate) use request::has_connection_close;

mod response;
pub use response::ResponseHead;
pub(crate) use response::{bad_request_head, status_head};

mod error;
pub use error::BodyError;
pub use error::BufError;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
