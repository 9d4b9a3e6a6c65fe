//! The connection-handling core of an embeddable HTTP/1.1 server.
//!
//! `fiber-http` accepts connections, decodes request framing, hands requests to a [`Handler`]
//! and writes the responses back on the same connection. Request and response bodies are
//! streams: a handler reads the request body only as fast as it wants, and the connection reads
//! from the socket only as fast as the handler consumes.
//!
//! # Example
//!
//! ```no_run
//! use std::error::Error;
//! use std::net::SocketAddr;
//!
//! use fiber_http::handler::make_handler;
//! use fiber_http::protocol::body::Body;
//! use fiber_http::server::Server;
//! use http::{Method, Request, Response, StatusCode};
//!
//! async fn echo(request: Request<Body>) -> Result<Response<Body>, Box<dyn Error + Send + Sync>> {
//!     match *request.method() {
//!         Method::GET => Ok(Response::new(Body::from("Hello World"))),
//!         Method::POST => Ok(Response::new(request.into_body())),
//!         _ => Ok(Response::builder().status(StatusCode::METHOD_NOT_ALLOWED).body(Body::empty())?),
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn Error>> {
//!     let server = Server::builder()
//!         .address("127.0.0.1:8080".parse::<SocketAddr>()?)
//!         .serve(make_handler(echo))?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.close();
//!     server.closed().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`buffer`]: immutable byte buffers and a builder for them
//! - [`protocol`]: message events, heads, errors and the [`Body`](protocol::body::Body) type
//! - [`codec`]: the request decoder and response encoder
//! - [`connection`]: the per-connection request pipeline, [`connection::HttpConnection`]
//! - [`handler`]: the [`Handler`] trait and [`handler::make_handler`]
//! - [`transport`]: transport selection, sockets and worker threads
//! - [`server`]: [`server::Server`], putting all of the above together
//!
//! # Threading
//!
//! Each connection is served on exactly one worker thread for its whole life, together with
//! the handler futures it runs. Handlers are shared between workers and must be `Send + Sync`;
//! the futures they return need not be `Send`.
//!
//! # Limitations
//!
//! - HTTP/1.1 only; other versions are answered with `400 Bad Request`
//! - Request heads are limited to 8 KiB and 64 headers
//! - No TLS of its own; plug one in through [`connection::EncryptionLayer`]
//!
//! [`Handler`]: handler::Handler

pub mod buffer;
pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod transport;

mod utils;
pub(crate) use utils::ensure;
