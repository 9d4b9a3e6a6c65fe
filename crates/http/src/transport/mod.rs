//! Socket plumbing and worker threads.
//!
//! A [`Transport`] names the readiness mechanism a server runs on. The native transports
//! (epoll on Linux, kqueue on the BSDs and macOS) are preferred when the running kernel
//! provides them; [`Transport::Portable`] is always available. Native listeners are bound with
//! `SO_REUSEPORT` in addition to the common socket tuning.
//!
//! Every transport offers three factories:
//!
//! - [`Transport::worker_group`] spawns the worker threads connections run on
//! - `Transport::listener` binds a listening socket for an [`Address`], used by the server
//! - [`Transport::connect`] opens an outbound [`Stream`], used mostly by clients and tests

mod socket;
mod worker;

use std::fmt;
use std::io;

use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tracing::debug;

pub use crate::connection::PeerAddr;
pub(crate) use socket::{StdListener, StdStream};
pub use socket::{Address, Stream};
pub use worker::WorkerGroup;

use crate::server::ServerOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Linux epoll
    Epoll,
    /// BSD and macOS kqueue
    Kqueue,
    /// Works everywhere tokio does
    Portable,
}

impl Transport {
    /// Every transport, most preferred first.
    pub const PREFERENCE: [Transport; 3] = [Transport::Epoll, Transport::Kqueue, Transport::Portable];

    /// Picks the first available transport in [`Transport::PREFERENCE`] order, or the portable
    /// one when native transports are not wanted.
    pub fn select(prefer_native: bool) -> Transport {
        if !prefer_native {
            return Transport::Portable;
        }
        Self::PREFERENCE.into_iter().find(|transport| transport.is_available()).unwrap_or(Transport::Portable)
    }

    pub fn is_native(self) -> bool {
        self != Transport::Portable
    }

    /// Probes whether the running system supports this transport.
    pub fn is_available(self) -> bool {
        match self {
            Transport::Epoll => epoll_available(),
            Transport::Kqueue => kqueue_available(),
            Transport::Portable => true,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Transport::Epoll => "epoll",
            Transport::Kqueue => "kqueue",
            Transport::Portable => "portable",
        }
    }

    /// Spawns `threads` workers, or one per available core when `threads` is 0.
    pub fn worker_group(self, threads: usize) -> io::Result<WorkerGroup> {
        WorkerGroup::new(self, threads)
    }

    /// Binds a listening socket tuned by `options`.
    ///
    /// Binding happens synchronously; the listener is registered with a reactor later, on the
    /// worker that accepts from it.
    pub(crate) fn listener(self, address: &Address, options: &ServerOptions) -> io::Result<StdListener> {
        debug!(transport = self.name(), %address, "bind listener");
        socket::bind(address, options, self.is_native())
    }

    /// Opens a stream to `address`, honouring the no-delay, keep-alive and connect timeout
    /// settings of `options`.
    pub async fn connect(self, address: &Address, options: &ServerOptions) -> io::Result<Stream> {
        debug!(transport = self.name(), %address, "connect");
        let connecting = async {
            match address {
                Address::Inet(addr) => {
                    let stream = TcpStream::connect(addr).await?;
                    socket::tune_stream(&stream, options)?;
                    Ok(Stream::Tcp(stream))
                }
                #[cfg(unix)]
                Address::Unix(path) => Ok(Stream::Unix(UnixStream::connect(path).await?)),
            }
        };

        match options.connect_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, connecting)
                .await
                .map_err(|_elapsed| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))?,
            None => connecting.await,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(target_os = "linux")]
fn epoll_available() -> bool {
    // SAFETY: epoll_create1 takes no pointers and only returns a descriptor or -1
    let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
    if fd < 0 {
        return false;
    }
    // SAFETY: `fd` was just created here and is not shared
    unsafe { libc::close(fd) };
    true
}

#[cfg(not(target_os = "linux"))]
fn epoll_available() -> bool {
    false
}

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
fn kqueue_available() -> bool {
    // SAFETY: kqueue takes no arguments and only returns a descriptor or -1
    let fd = unsafe { libc::kqueue() };
    if fd < 0 {
        return false;
    }
    // SAFETY: `fd` was just created here and is not shared
    unsafe { libc::close(fd) };
    true
}

#[cfg(not(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
)))]
fn kqueue_available() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portable_is_always_available() {
        assert!(Transport::Portable.is_available());
        assert_eq!(Transport::select(false), Transport::Portable);
    }

    #[test]
    fn selection_follows_preference() {
        let selected = Transport::select(true);
        assert!(selected.is_available());

        let position = |t: Transport| Transport::PREFERENCE.iter().position(|p| *p == t);
        for transport in Transport::PREFERENCE {
            if transport.is_available() {
                assert!(position(transport) >= position(selected));
            }
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_has_epoll() {
        assert!(Transport::Epoll.is_available());
        assert!(!Transport::Kqueue.is_available());
        assert_eq!(Transport::select(true), Transport::Epoll);
    }
}
