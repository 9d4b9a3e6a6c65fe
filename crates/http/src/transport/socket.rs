use std::fmt;
use std::io;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use socket2::{Domain, Protocol, SockAddr, SockRef, Socket, Type};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use crate::connection::PeerAddr;
use crate::server::ServerOptions;

/// Where a server listens, or where a client connects to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    Inet(SocketAddr),
    #[cfg(unix)]
    Unix(PathBuf),
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::Inet(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Inet(addr) => write!(f, "{addr}"),
            #[cfg(unix)]
            Address::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// A connected stream over TCP or a domain socket.
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    /// Detaches the stream from the current reactor so it can move to another worker.
    pub(crate) fn into_std(self) -> io::Result<StdStream> {
        match self {
            Stream::Tcp(stream) => stream.into_std().map(StdStream::Tcp),
            #[cfg(unix)]
            Stream::Unix(stream) => stream.into_std().map(StdStream::Unix),
        }
    }
}

impl AsyncRead for Stream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            Stream::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            Stream::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            Stream::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            Stream::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// A stream in flight between workers, not registered with any reactor.
#[derive(Debug)]
pub(crate) enum StdStream {
    Tcp(std::net::TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl StdStream {
    /// Registers the stream with the reactor of the calling worker.
    pub(crate) fn into_tokio(self) -> io::Result<Stream> {
        match self {
            StdStream::Tcp(stream) => TcpStream::from_std(stream).map(Stream::Tcp),
            #[cfg(unix)]
            StdStream::Unix(stream) => UnixStream::from_std(stream).map(Stream::Unix),
        }
    }
}

/// A bound listening socket, not yet registered with any reactor.
#[derive(Debug)]
pub(crate) enum StdListener {
    Tcp(std::net::TcpListener),
    #[cfg(unix)]
    Unix { listener: std::os::unix::net::UnixListener, path: SocketPath },
}

impl StdListener {
    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            StdListener::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            StdListener::Unix { .. } => None,
        }
    }

    pub(crate) fn into_tokio(self) -> io::Result<Listener> {
        match self {
            StdListener::Tcp(listener) => TcpListener::from_std(listener).map(Listener::Tcp),
            #[cfg(unix)]
            StdListener::Unix { listener, path } => {
                UnixListener::from_std(listener).map(|listener| Listener::Unix { listener, _path: path })
            }
        }
    }
}

#[derive(Debug)]
pub(crate) enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix { listener: UnixListener, _path: SocketPath },
}

impl Listener {
    pub(crate) async fn accept(&self, options: &ServerOptions) -> io::Result<(Stream, PeerAddr)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                tune_stream(&stream, options)?;
                Ok((Stream::Tcp(stream), PeerAddr::Inet(addr)))
            }
            #[cfg(unix)]
            Listener::Unix { listener, .. } => {
                let (stream, addr) = listener.accept().await?;
                Ok((Stream::Unix(stream), PeerAddr::Unix(addr.as_pathname().map(Path::to_path_buf))))
            }
        }
    }
}

/// Owns the file of a bound domain socket and removes it on drop.
#[cfg(unix)]
#[derive(Debug)]
pub(crate) struct SocketPath(PathBuf);

#[cfg(unix)]
impl Drop for SocketPath {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => debug!(path = %self.0.display(), "removed socket file"),
            Err(e) => warn!(cause = %e, path = %self.0.display(), "failed to remove socket file"),
        }
    }
}

pub(super) fn bind(address: &Address, options: &ServerOptions, native: bool) -> io::Result<StdListener> {
    match address {
        Address::Inet(addr) => {
            let socket = Socket::new(Domain::for_address(*addr), Type::STREAM, Some(Protocol::TCP))?;
            #[cfg(unix)]
            if native {
                socket.set_reuse_port(true)?;
            }
            #[cfg(not(unix))]
            let _ = native;
            socket.set_reuse_address(true)?;
            tune_listener(&socket, options)?;
            socket.bind(&SockAddr::from(*addr))?;
            socket.listen(backlog(options))?;
            Ok(StdListener::Tcp(socket.into()))
        }
        #[cfg(unix)]
        Address::Unix(path) => {
            let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
            tune_listener(&socket, options)?;
            socket.bind(&SockAddr::unix(path)?)?;
            // the file exists from here on and is removed with the guard
            let path = SocketPath(path.clone());
            socket.listen(backlog(options))?;
            Ok(StdListener::Unix { listener: socket.into(), path })
        }
    }
}

fn tune_listener(socket: &Socket, options: &ServerOptions) -> io::Result<()> {
    socket.set_nonblocking(true)?;
    socket.set_recv_buffer_size(options.recv_buffer_size())?;
    socket.set_send_buffer_size(options.send_buffer_size())?;
    Ok(())
}

fn backlog(options: &ServerOptions) -> i32 {
    i32::try_from(options.backlog()).unwrap_or(i32::MAX)
}

pub(super) fn tune_stream(stream: &TcpStream, options: &ServerOptions) -> io::Result<()> {
    stream.set_nodelay(options.tcp_nodelay())?;
    SockRef::from(stream).set_keepalive(options.keep_alive())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_tcp_listener_reports_ephemeral_port() {
        let options = ServerOptions::default();
        let listener = bind(&Address::Inet("127.0.0.1:0".parse().unwrap()), &options, false).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn address_display() {
        assert_eq!(Address::from("127.0.0.1:80".parse::<SocketAddr>().unwrap()).to_string(), "127.0.0.1:80");
    }

    #[cfg(unix)]
    #[test]
    fn socket_file_is_removed_with_listener() {
        let path = std::env::temp_dir().join(format!("fiber-http-socket-{}.sock", std::process::id()));
        let listener = bind(&Address::Unix(path.clone()), &ServerOptions::default(), true).unwrap();
        assert!(path.exists());

        assert!(bind(&Address::Unix(path.clone()), &ServerOptions::default(), true).is_err());

        drop(listener);
        assert!(!path.exists());
    }
}
