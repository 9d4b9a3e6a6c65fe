use std::error::Error;
use std::io;

use http::Version;
use thiserror::Error;

/// The error a connection finishes with.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },
}

impl HttpError {
    /// Returns true if the error came from the underlying byte stream rather than from
    /// malformed input or a misbehaving body.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            HttpError::RequestError { source: ParseError::Io { .. } } | HttpError::ResponseError { source: SendError::Io { .. } }
        )
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("unsupported http version: {0:?}")]
    UnsupportedVersion(Version),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid transfer-encoding header: {reason}")]
    InvalidTransferEncoding { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn invalid_transfer_encoding<S: ToString>(str: S) -> Self {
        Self::InvalidTransferEncoding { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// The error a body consumer observes while pulling chunks.
///
/// Failures on the network side are reported as [`BodyError::Aborted`] carrying a short
/// description only; the connection keeps the underlying cause for its own logs.
#[derive(Error, Debug)]
pub enum BodyError {
    #[error("body aborted: {reason}")]
    Aborted { reason: String },

    #[error("body stream error: {source}")]
    Stream {
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    #[error("body is not valid utf-8: {source}")]
    InvalidUtf8 {
        #[from]
        source: std::string::FromUtf8Error,
    },
}

impl BodyError {
    pub fn aborted<S: ToString>(str: S) -> Self {
        Self::Aborted { reason: str.to_string() }
    }

    pub fn stream<E: Into<Box<dyn Error + Send + Sync>>>(e: E) -> Self {
        Self::Stream { source: e.into() }
    }
}

/// A local contract violation while copying out of a [`Buf`](crate::buffer::Buf).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufError {
    #[error("destination is too small, capacity: {capacity}, needed: {needed}")]
    DestinationTooSmall { capacity: usize, needed: usize },
}

impl BufError {
    pub fn destination_too_small(capacity: usize, needed: usize) -> Self {
        Self::DestinationTooSmall { capacity, needed }
    }
}
