//! A ready-made server: a listening socket, a group of worker threads and the connections
//! running on them.
//!
//! Connections are accepted on the first worker and handed out to all workers in turn. Each
//! connection stays on the worker it was handed to until it closes, so its state is never
//! touched by another thread. Only the [`ConnectionStats`] are shared between workers.
//!
//! ```no_run
//! use std::error::Error;
//! use std::net::SocketAddr;
//!
//! use fiber_http::handler::make_handler;
//! use fiber_http::protocol::body::Body;
//! use fiber_http::server::Server;
//! use http::{Request, Response};
//!
//! async fn hello(_request: Request<Body>) -> Result<Response<&'static str>, Box<dyn Error + Send + Sync>> {
//!     Ok(Response::new("Hello World"))
//! }
//!
//! # async fn run() -> Result<(), Box<dyn Error>> {
//! let server = Server::builder()
//!     .address("127.0.0.1:8080".parse::<SocketAddr>()?)
//!     .serve(make_handler(hello))?;
//!
//! println!("listening on {}", server.local_addr());
//! server.closed().await;
//! # Ok(())
//! # }
//! ```

mod options;
mod stats;

use std::io;
#[cfg(unix)]
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use options::{ConfigError, ServerOptions, ServerOptionsBuilder};
pub use stats::{ConnectionGuard, ConnectionStats};

use crate::connection::{EncryptionLayer, HttpConnection, Io, PeerAddr};
use crate::handler::Handler;
use crate::transport::{Address, StdListener, StdStream, Transport, WorkerGroup};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("address must be set")]
    MissingAddress,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: Address,
        #[source]
        source: io::Error,
    },

    #[error("failed to start workers: {source}")]
    Workers {
        #[from]
        source: io::Error,
    },
}

#[derive(Debug)]
pub struct ServerBuilder {
    address: Option<Address>,
    options: ServerOptions,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { address: None, options: ServerOptions::default() }
    }

    /// Listens on `address`; port 0 picks a free port, see [`Server::local_addr`].
    pub fn address(mut self, address: impl Into<Address>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Listens on a domain socket at `path`, which must not exist yet.
    #[cfg(unix)]
    pub fn unix_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.address = Some(Address::Unix(path.into()));
        self
    }

    pub fn options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    /// Binds the listener, starts the workers and begins accepting connections for `handler`.
    ///
    /// Returns once the socket is bound; a bind failure is reported here and no server is
    /// left running.
    pub fn serve<H: Handler>(self, handler: H) -> Result<Server, ServerError> {
        let address = self.address.ok_or(ServerError::MissingAddress)?;
        let options = self.options;

        let transport = Transport::select(options.prefer_native_transport());
        let listener = transport
            .listener(&address, &options)
            .map_err(|source| ServerError::Bind { address: address.clone(), source })?;
        let local_addr = listener.local_addr().map_or(address, Address::Inet);

        let workers = transport.worker_group(options.worker_threads())?;
        let stats = Arc::new(ConnectionStats::new());

        let acceptor = Acceptor {
            workers: workers.clone(),
            options,
            handler: Arc::new(handler),
            stats: Arc::clone(&stats),
        };
        if let Err(e) = workers.spawn_on(0, move || acceptor.run(listener)) {
            workers.shutdown();
            return Err(e.into());
        }

        info!(%transport, address = %local_addr, workers = workers.size(), "server started");
        Ok(Server { transport, local_addr, workers, stats, closed: AtomicBool::new(false) })
    }
}

/// A running server. Dropping it closes it.
#[derive(Debug)]
pub struct Server {
    transport: Transport,
    local_addr: Address,
    workers: WorkerGroup,
    stats: Arc<ConnectionStats>,
    closed: AtomicBool,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// The address actually bound, with the port filled in when port 0 was requested.
    pub fn local_addr(&self) -> &Address {
        &self.local_addr
    }

    /// Number of open connections.
    pub fn connections(&self) -> u64 {
        self.stats.active()
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Stops accepting connections and lets the workers wind down.
    ///
    /// Connections waiting for their next request are closed; exchanges in progress run to
    /// completion. Calling this more than once has no further effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(address = %self.local_addr, connections = self.connections(), "closing server");
        self.workers.shutdown();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once the server is closed and every worker thread has exited.
    pub async fn closed(&self) {
        self.workers.closed().await;
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.close();
    }
}

struct Acceptor<H> {
    workers: WorkerGroup,
    options: ServerOptions,
    handler: Arc<H>,
    stats: Arc<ConnectionStats>,
}

impl<H: Handler> Acceptor<H> {
    async fn run(self, listener: StdListener) {
        let listener = match listener.into_tokio() {
            Ok(listener) => listener,
            Err(e) => {
                error!(cause = %e, "failed to register listener, shutting down");
                self.workers.shutdown();
                return;
            }
        };

        let shutdown = self.workers.shutdown_token();
        loop {
            let accepted = select! {
                biased;
                () = shutdown.cancelled() => break,
                accepted = listener.accept(&self.options) => accepted,
            };

            let (stream, peer_addr) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let guard = self.stats.activate();
            let stream = match stream.into_std() {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(cause = %e, peer = %peer_addr, "failed to detach accepted stream");
                    continue;
                }
            };

            let connection = Connection {
                stream,
                peer_addr,
                encryption: self.options.encryption().cloned(),
                shutdown: shutdown.clone(),
                guard,
            };
            let handler = Arc::clone(&self.handler);
            if let Err(e) = self.workers.spawn(move || connection.serve(handler)) {
                warn!(cause = %e, "no worker left for accepted connection");
            }
        }

        debug!("stop accepting connections");
    }
}

/// An accepted connection on its way to the worker that will serve it.
struct Connection {
    stream: StdStream,
    peer_addr: PeerAddr,
    encryption: Option<Arc<dyn EncryptionLayer>>,
    shutdown: CancellationToken,
    guard: ConnectionGuard,
}

impl Connection {
    async fn serve<H: Handler>(self, handler: Arc<H>) {
        let Connection { stream, peer_addr, encryption, shutdown, guard } = self;

        let stream = match stream.into_tokio() {
            Ok(stream) => stream,
            Err(e) => {
                error!(cause = %e, peer = %peer_addr, "failed to register connection");
                return;
            }
        };
        info!(peer = %peer_addr, "connection open");

        let io: Box<dyn Io> = match encryption {
            Some(layer) => match layer.accept(Box::new(stream)).await {
                Ok(io) => io,
                Err(e) => {
                    warn!(cause = %e, peer = %peer_addr, "encryption layer rejected connection");
                    return;
                }
            },
            None => Box::new(stream),
        };

        let (reader, writer) = tokio::io::split(io);
        let result = HttpConnection::new(reader, writer)
            .with_peer_addr(peer_addr.clone())
            .with_shutdown(shutdown)
            .process(handler)
            .await;

        guard.deactivate();
        match result {
            Ok(()) => info!(peer = %peer_addr, "connection closed"),
            Err(e) => error!(cause = %e, peer = %peer_addr, "connection terminated"),
        }
    }
}
