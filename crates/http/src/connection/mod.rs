//! Per-connection request processing.
//!
//! [`HttpConnection`] runs the request pipeline over one byte stream: decode a head, hand the
//! request to the handler while its body is streamed on demand, write the response, discard
//! any unread body, and repeat until either side closes.

mod encryption;
mod http_connection;

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

pub use encryption::{EncryptionLayer, Io};
pub use http_connection::HttpConnection;

/// The remote end of a connection, available to handlers as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddr {
    Inet(SocketAddr),
    /// A domain socket peer, with its path if the peer socket was bound to one
    Unix(Option<PathBuf>),
}

impl From<SocketAddr> for PeerAddr {
    fn from(addr: SocketAddr) -> Self {
        PeerAddr::Inet(addr)
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerAddr::Inet(addr) => write!(f, "{addr}"),
            PeerAddr::Unix(Some(path)) => write!(f, "unix:{}", path.display()),
            PeerAddr::Unix(None) => f.write_str("unix:unnamed"),
        }
    }
}
