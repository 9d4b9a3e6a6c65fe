use std::io;

use futures::future::LocalBoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional byte stream a connection can run on.
pub trait Io: AsyncRead + AsyncWrite + Unpin {}

impl<T: AsyncRead + AsyncWrite + Unpin> Io for T {}

/// Wraps freshly accepted streams before any HTTP is read, for example to run a TLS handshake.
///
/// The returned future runs on the worker that owns the connection. A failed `accept` drops the
/// connection without a response.
pub trait EncryptionLayer: Send + Sync + 'static {
    fn accept<'a>(&'a self, io: Box<dyn Io>) -> LocalBoxFuture<'a, io::Result<Box<dyn Io>>>;
}
