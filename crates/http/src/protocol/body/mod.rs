//! HTTP bodies.
//!
//! A [`Body`] is one of three things:
//!
//! - **empty**: no content at all
//! - **fixed**: a single [`Buf`] that is fully available up front
//! - **streaming**: a lazy, single-pass sequence of [`Buf`]s whose total size may be unknown
//!
//! Request bodies that arrive over the network are streaming bodies backed by the ingress
//! bridge (see [`ingress`]): nothing is read from the connection until the handler asks for
//! the next chunk. Response bodies can be any of the three; the connection writes fixed and
//! empty bodies in a single write and streams the rest chunk by chunk.
//!
//! Consume a body with [`Body::chunks`] (a [`Stream`] of buffers) or materialize it with
//! [`Body::to_buf`] / [`Body::text`]. Materializing accumulates the whole content in memory.

pub(crate) mod ingress;
mod writer;

pub use writer::BodyWriter;

use std::error::Error;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use http_body::{Body as HttpBody, Frame};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, StreamBody};

use crate::buffer::{Buf, BufBuilder};
use crate::protocol::BodyError;

/// Largest up-front reservation made when materializing a body of known size.
const MAX_PREALLOCATE: u64 = 64 * 1024;

pub struct Body {
    kind: Kind,
}

pub(crate) enum Kind {
    Empty,
    Fixed(Buf),
    Streaming(Streaming),
}

pub(crate) struct Streaming {
    size: Option<u64>,
    // `None` once the sequence ended, failed or was abandoned
    inner: Option<UnsyncBoxBody<Bytes, BodyError>>,
}

impl Body {
    pub const fn empty() -> Self {
        Self { kind: Kind::Empty }
    }

    /// A body whose whole content is `buf`. An empty buffer yields an empty body.
    pub fn fixed(buf: impl Into<Buf>) -> Self {
        let buf = buf.into();
        if buf.is_empty() { Self::empty() } else { Self { kind: Kind::Fixed(buf) } }
    }

    /// A streaming body pulling chunks from `stream`.
    ///
    /// `size` is the total length if known; `None` makes the response use chunked framing.
    pub fn from_stream<S, T, E>(size: Option<u64>, stream: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        T: Into<Buf> + 'static,
        E: Into<Box<dyn Error + Send + Sync>> + 'static,
    {
        let frames = stream.map_ok(|chunk| Frame::data(Bytes::from(chunk.into()))).map_err(BodyError::stream);
        Self::streaming(size, StreamBody::new(frames).boxed_unsync())
    }

    /// A streaming body over any [`http_body::Body`]. The size is taken from its exact size hint.
    pub fn from_http_body<B>(body: B) -> Self
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        let size = body.size_hint().exact();
        Self::streaming(size, body.map_err(BodyError::stream).boxed_unsync())
    }

    /// Creates a streaming body fed by the returned [`BodyWriter`].
    ///
    /// Each write waits until the previous chunk was taken by the reader.
    pub fn channel(size: Option<u64>) -> (BodyWriter, Body) {
        writer::channel(size)
    }

    pub(crate) fn streaming(size: Option<u64>, inner: UnsyncBoxBody<Bytes, BodyError>) -> Self {
        Self { kind: Kind::Streaming(Streaming { size, inner: Some(inner) }) }
    }

    /// Wraps the consumer half of a request body; empty payloads become [`Body::empty`].
    pub(crate) fn from_ingress(ingress: ingress::IngressBody) -> Self {
        if ingress.is_end_stream() {
            return Self::empty();
        }
        Self::streaming(ingress.size_hint().exact(), ingress.boxed_unsync())
    }

    /// Total size in bytes, `None` when unknown (chunked).
    pub fn size(&self) -> Option<u64> {
        match &self.kind {
            Kind::Empty => Some(0),
            Kind::Fixed(buf) => Some(buf.len() as u64),
            Kind::Streaming(streaming) => streaming.size,
        }
    }

    /// Returns true once no more bytes can be pulled from the network for this body.
    ///
    /// Empty and fixed bodies are consumed from the start; a streaming body becomes consumed
    /// when its sequence ends, fails, or is abandoned.
    pub fn is_consumed(&self) -> bool {
        match &self.kind {
            Kind::Empty | Kind::Fixed(_) => true,
            Kind::Streaming(streaming) => streaming.inner.is_none(),
        }
    }

    /// Returns a single-pass view of the body as a stream of buffers.
    ///
    /// Fixed bodies replay their content every time `chunks` is called. Streaming bodies do
    /// not: once a traversal has run to completion, later traversals yield nothing.
    pub fn chunks(&mut self) -> Chunks<'_> {
        Chunks { body: self, replayed: false }
    }

    /// Collects the whole body into one buffer.
    pub async fn to_buf(&mut self) -> Result<Buf, BodyError> {
        let capacity = match &self.kind {
            Kind::Empty => return Ok(Buf::new()),
            Kind::Fixed(buf) => return Ok(buf.clone()),
            Kind::Streaming(streaming) => streaming.size.unwrap_or(0).min(MAX_PREALLOCATE),
        };

        #[allow(clippy::cast_possible_truncation, reason = "bounded by MAX_PREALLOCATE")]
        let mut builder = BufBuilder::with_capacity(capacity as usize);
        let mut chunks = self.chunks();
        while let Some(chunk) = chunks.next().await {
            builder.append_buf(&chunk?);
        }
        Ok(builder.build())
    }

    /// Collects the whole body and decodes it as UTF-8.
    pub async fn text(&mut self) -> Result<String, BodyError> {
        let buf = self.to_buf().await?;
        Ok(String::from_utf8(Vec::from(Bytes::from(buf)))?)
    }

    pub(crate) fn into_kind(self) -> Kind {
        self.kind
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Empty => f.write_str("Body::Empty"),
            Kind::Fixed(buf) => f.debug_tuple("Body::Fixed").field(&buf.len()).finish(),
            Kind::Streaming(streaming) => f
                .debug_struct("Body::Streaming")
                .field("size", &streaming.size)
                .field("consumed", &streaming.inner.is_none())
                .finish(),
        }
    }
}

impl Streaming {
    pub(crate) fn size(&self) -> Option<u64> {
        self.size
    }

    pub(crate) fn poll_chunk(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Buf, BodyError>>> {
        loop {
            let Some(inner) = self.inner.as_mut() else {
                return Poll::Ready(None);
            };

            match ready!(Pin::new(inner).poll_frame(cx)) {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(bytes) => return Poll::Ready(Some(Ok(Buf::from(bytes)))),
                    // trailers carry no payload
                    Err(_trailers) => {}
                },
                Some(Err(e)) => {
                    self.inner = None;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    self.inner = None;
                    return Poll::Ready(None);
                }
            }
        }
    }

    pub(crate) async fn next_chunk(&mut self) -> Option<Result<Buf, BodyError>> {
        futures::future::poll_fn(|cx| self.poll_chunk(cx)).await
    }
}

/// A single traversal over a [`Body`], see [`Body::chunks`].
#[derive(Debug)]
pub struct Chunks<'a> {
    body: &'a mut Body,
    replayed: bool,
}

impl Stream for Chunks<'_> {
    type Item = Result<Buf, BodyError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match &mut this.body.kind {
            Kind::Empty => Poll::Ready(None),
            Kind::Fixed(_) if this.replayed => Poll::Ready(None),
            Kind::Fixed(buf) => {
                this.replayed = true;
                Poll::Ready(Some(Ok(buf.clone())))
            }
            Kind::Streaming(streaming) => streaming.poll_chunk(cx),
        }
    }
}

impl From<Buf> for Body {
    fn from(buf: Buf) -> Self {
        Self::fixed(buf)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::fixed(bytes)
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Self::fixed(value)
    }
}

impl From<&'static str> for Body {
    fn from(value: &'static str) -> Self {
        Self::fixed(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Self::fixed(value)
    }
}

impl From<()> for Body {
    fn from((): ()) -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn check_send<T: Send>() {}

    #[test]
    fn is_send() {
        check_send::<Body>();
    }

    #[tokio::test]
    async fn round_trips_strings() {
        for input in ["", "Hello World", "ünïcödé", "\r\n\r\n", "0\r\n\r\n"] {
            let mut body = Body::from(input.to_string());
            assert_eq!(body.text().await.unwrap(), input);
            assert_eq!(body.size(), Some(input.len() as u64));
        }
    }

    #[tokio::test]
    async fn empty_body_is_consumed_and_yields_nothing() {
        let mut body = Body::empty();
        assert!(body.is_consumed());
        assert_eq!(body.size(), Some(0));
        assert!(body.chunks().next().await.is_none());
        assert!(body.to_buf().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fixed_body_replays_on_every_traversal() {
        let mut body = Body::from("Hello World");
        for _ in 0..2 {
            let chunks: Vec<_> = body.chunks().collect().await;
            assert_eq!(chunks.len(), 1);
            assert_eq!(chunks[0].as_ref().unwrap().to_str().unwrap(), "Hello World");
        }
    }

    #[tokio::test]
    async fn streaming_body_is_single_pass() {
        let parts: Vec<Result<&'static str, io::Error>> = vec![Ok("hello"), Ok(" "), Ok("world")];
        let mut body = Body::from_stream(None, futures::stream::iter(parts));

        assert_eq!(body.size(), None);
        assert!(!body.is_consumed());
        assert_eq!(body.text().await.unwrap(), "hello world");
        assert!(body.is_consumed());

        for _ in 0..3 {
            assert!(body.chunks().next().await.is_none());
        }
        assert!(body.to_buf().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn streaming_error_ends_the_sequence() {
        let parts: Vec<Result<&'static str, io::Error>> = vec![Ok("a"), Err(io::Error::other("boom")), Ok("b")];
        let mut body = Body::from_stream(Some(2), futures::stream::iter(parts));

        let mut chunks = body.chunks();
        assert_eq!(chunks.next().await.unwrap().unwrap().to_str().unwrap(), "a");
        assert!(matches!(chunks.next().await, Some(Err(BodyError::Stream { .. }))));
        assert!(chunks.next().await.is_none());
        assert!(body.is_consumed());
    }

    #[tokio::test]
    async fn from_stream_takes_owned_chunks_and_custom_errors() {
        #[derive(Debug, thiserror::Error)]
        #[error("upstream closed")]
        struct UpstreamClosed;

        let parts: Vec<Result<Vec<u8>, UpstreamClosed>> = vec![Ok(b"owned ".to_vec()), Ok(b"chunks".to_vec()), Err(UpstreamClosed)];
        let mut body = Body::from_stream(None, futures::stream::iter(parts));

        let mut chunks = body.chunks();
        assert_eq!(chunks.next().await.unwrap().unwrap().to_str().unwrap(), "owned ");
        assert_eq!(chunks.next().await.unwrap().unwrap().to_str().unwrap(), "chunks");
        let err = chunks.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("upstream closed"));
    }

    #[tokio::test]
    async fn channel_body_collects_all_writes() {
        let (mut writer, mut body) = Body::channel(None);

        let producer = async move {
            writer.write_str("hello").await.unwrap();
            writer.write_slice(b" world").await.unwrap();
            writer.write(Buf::from(". Foo bar.")).await.unwrap();
        };

        let (text, ()) = tokio::join!(body.text(), producer);
        assert_eq!(text.unwrap(), "hello world. Foo bar.");
    }

    #[tokio::test]
    async fn http_body_size_hint_becomes_size() {
        let body = Body::from_http_body(http_body_util::Full::new(Bytes::from_static(b"abc")));
        assert_eq!(body.size(), Some(3));
    }

    #[tokio::test]
    async fn text_rejects_invalid_utf8() {
        let mut body = Body::from(vec![0xff, 0xfe]);
        assert!(matches!(body.text().await, Err(BodyError::InvalidUtf8 { .. })));
    }
}
