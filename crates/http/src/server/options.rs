use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::connection::EncryptionLayer;

/// Socket and worker settings of a [`Server`](super::Server).
///
/// Every value has a usable default; use [`ServerOptions::builder`] to change some of them with
/// validation.
#[derive(Clone)]
pub struct ServerOptions {
    backlog: u32,
    worker_threads: usize,
    tcp_nodelay: bool,
    keep_alive: bool,
    recv_buffer_size: usize,
    send_buffer_size: usize,
    connect_timeout: Option<Duration>,
    prefer_native_transport: bool,
    encryption: Option<Arc<dyn EncryptionLayer>>,
}

impl ServerOptions {
    pub fn builder() -> ServerOptionsBuilder {
        ServerOptionsBuilder { options: ServerOptions::default() }
    }

    /// Length of the queue of pending connections.
    pub fn backlog(&self) -> u32 {
        self.backlog
    }

    /// Number of worker threads, 0 meaning one per available core.
    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn tcp_nodelay(&self) -> bool {
        self.tcp_nodelay
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn recv_buffer_size(&self) -> usize {
        self.recv_buffer_size
    }

    pub fn send_buffer_size(&self) -> usize {
        self.send_buffer_size
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn prefer_native_transport(&self) -> bool {
        self.prefer_native_transport
    }

    pub fn encryption(&self) -> Option<&Arc<dyn EncryptionLayer>> {
        self.encryption.as_ref()
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            backlog: 128,
            worker_threads: 0,
            tcp_nodelay: true,
            keep_alive: true,
            recv_buffer_size: 64 * 1024,
            send_buffer_size: 64 * 1024,
            connect_timeout: None,
            prefer_native_transport: true,
            encryption: None,
        }
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("backlog", &self.backlog)
            .field("worker_threads", &self.worker_threads)
            .field("tcp_nodelay", &self.tcp_nodelay)
            .field("keep_alive", &self.keep_alive)
            .field("recv_buffer_size", &self.recv_buffer_size)
            .field("send_buffer_size", &self.send_buffer_size)
            .field("connect_timeout", &self.connect_timeout)
            .field("prefer_native_transport", &self.prefer_native_transport)
            .field("encryption", &self.encryption.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub struct ServerOptionsBuilder {
    options: ServerOptions,
}

impl ServerOptionsBuilder {
    pub fn backlog(mut self, backlog: u32) -> Self {
        self.options.backlog = backlog;
        self
    }

    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.options.worker_threads = threads;
        self
    }

    pub fn tcp_nodelay(mut self, nodelay: bool) -> Self {
        self.options.tcp_nodelay = nodelay;
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.options.keep_alive = keep_alive;
        self
    }

    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.options.recv_buffer_size = size;
        self
    }

    pub fn send_buffer_size(mut self, size: usize) -> Self {
        self.options.send_buffer_size = size;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = Some(timeout);
        self
    }

    pub fn prefer_native_transport(mut self, prefer: bool) -> Self {
        self.options.prefer_native_transport = prefer;
        self
    }

    /// Runs every accepted stream through `layer` before any HTTP is read from it.
    pub fn encryption(mut self, layer: impl EncryptionLayer) -> Self {
        self.options.encryption = Some(Arc::new(layer));
        self
    }

    pub fn build(self) -> Result<ServerOptions, ConfigError> {
        let options = self.options;
        if options.backlog == 0 {
            return Err(ConfigError::new("backlog", "must be positive"));
        }
        if options.recv_buffer_size == 0 {
            return Err(ConfigError::new("recv_buffer_size", "must be positive"));
        }
        if options.send_buffer_size == 0 {
            return Err(ConfigError::new("send_buffer_size", "must be positive"));
        }
        if options.connect_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(ConfigError::new("connect_timeout", "must not be zero"));
        }
        Ok(options)
    }
}

/// An option rejected by [`ServerOptionsBuilder::build`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid server option `{option}`: {reason}")]
pub struct ConfigError {
    option: &'static str,
    reason: &'static str,
}

impl ConfigError {
    fn new(option: &'static str, reason: &'static str) -> Self {
        Self { option, reason }
    }

    pub fn option(&self) -> &'static str {
        self.option
    }
}
