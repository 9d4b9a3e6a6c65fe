//! The bridge between the connection's decoded payload stream and a handler's request body.
//!
//! The connection keeps an [`IngressSender`] that borrows its framed reader; the handler gets
//! an [`IngressBody`] inside the request. The two halves talk over two rendezvous channels:
//!
//! - the body sends [`IngressSignal::ReadMore`] each time its consumer asks for a chunk
//! - the sender reads exactly one decoded item per signal and hands it back as an [`IngressItem`]
//!
//! Nothing is read from the network unless a consumer is waiting, so a handler that never
//! touches the body never causes the body to be buffered. Whatever remains unread when the
//! exchange is over is discarded by [`IngressSender::drain`] so the next request head can be
//! decoded.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, Stream, StreamExt};
use http_body::{Body, Frame, SizeHint};
use tracing::{error, info, trace};

use crate::protocol::{BodyError, Message, ParseError, PayloadItem, PayloadSize, RequestHeader};

pub(crate) fn channel<S>(payload_stream: &mut S, payload_size: PayloadSize) -> (IngressSender<'_, S>, IngressBody)
where
    S: Stream<Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>> + Unpin,
{
    let (signal_sender, signal_receiver) = mpsc::channel(0);
    let (data_sender, data_receiver) = mpsc::channel(0);

    let state = if payload_size.is_empty() { IngressState::Closed } else { IngressState::Active };
    let sender = IngressSender { payload_stream, signal_receiver, data_sender, state };
    let body = IngressBody { signal_sender, data_receiver, payload_size, in_flight: false, finished: payload_size.is_empty() };
    (sender, body)
}

#[derive(Debug)]
pub(crate) enum IngressSignal {
    ReadMore,
}

#[derive(Debug)]
pub(crate) enum IngressItem {
    Chunk(Bytes),
    /// The payload completed normally
    End,
    Failed(BodyError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum IngressState {
    /// Reading on behalf of the body's consumer
    Active,
    /// Reading and discarding whatever the consumer left behind
    Draining,
    /// The payload end was reached or the stream failed
    Closed,
}

pub(crate) struct IngressSender<'conn, S> {
    payload_stream: &'conn mut S,
    signal_receiver: mpsc::Receiver<IngressSignal>,
    data_sender: mpsc::Sender<IngressItem>,
    state: IngressState,
}

impl<S> IngressSender<'_, S>
where
    S: Stream<Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>> + Unpin,
{
    pub(crate) fn state(&self) -> IngressState {
        self.state
    }

    /// Serves read requests from the body until the payload ends, fails, or the body is dropped.
    ///
    /// Returns an error only when the payload stream itself failed; the body then observes an
    /// [`BodyError::Aborted`] and the connection must not be reused.
    pub(crate) async fn pump(&mut self) -> Result<(), ParseError> {
        while self.state == IngressState::Active {
            let Some(IngressSignal::ReadMore) = self.signal_receiver.next().await else {
                trace!("request body dropped before its end");
                return Ok(());
            };

            match self.read_item().await {
                Ok(PayloadItem::Chunk(bytes)) => {
                    if self.data_sender.send(IngressItem::Chunk(bytes)).await.is_err() {
                        trace!("request body dropped while a chunk was in flight");
                        return Ok(());
                    }
                }
                Ok(PayloadItem::Eof) => {
                    self.state = IngressState::Closed;
                    if self.data_sender.send(IngressItem::End).await.is_err() {
                        trace!("request body dropped at its end");
                    }
                    self.data_sender.close_channel();
                }
                Err(e) => {
                    self.state = IngressState::Closed;
                    error!(cause = %e, "failed to read request body");
                    let failure = IngressItem::Failed(BodyError::aborted("failed to read request body"));
                    if self.data_sender.send(failure).await.is_err() {
                        trace!("request body dropped before the failure was delivered");
                    }
                    self.data_sender.close_channel();
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Reads and discards the rest of the payload, leaving the stream at the next request head.
    ///
    /// The body, if still alive, sees its stream end without a terminal marker and reports an
    /// abort.
    pub(crate) async fn drain(&mut self) -> Result<(), ParseError> {
        if self.state == IngressState::Closed {
            return Ok(());
        }

        self.state = IngressState::Draining;
        self.data_sender.close_channel();
        self.signal_receiver.close();

        let mut skipped = 0_usize;
        let result = loop {
            match self.read_item().await {
                Ok(PayloadItem::Chunk(bytes)) => skipped += bytes.len(),
                Ok(PayloadItem::Eof) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.state = IngressState::Closed;

        if skipped > 0 {
            info!(size = skipped, "skipped unread request body");
        }
        result
    }

    async fn read_item(&mut self) -> Result<PayloadItem, ParseError> {
        match self.payload_stream.next().await {
            Some(Ok(Message::Payload(item))) => Ok(item),
            Some(Ok(Message::Header(_))) => Err(ParseError::invalid_body("received a request head inside a body")),
            Some(Err(e)) => Err(e),
            None => Err(ParseError::io(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed inside a request body"))),
        }
    }
}

/// The consumer half, exposed to handlers as a streaming [`crate::protocol::body::Body`].
#[derive(Debug)]
pub(crate) struct IngressBody {
    signal_sender: mpsc::Sender<IngressSignal>,
    data_receiver: mpsc::Receiver<IngressItem>,
    payload_size: PayloadSize,
    in_flight: bool,
    finished: bool,
}

impl IngressBody {
    fn finish(&mut self, result: Option<Result<Frame<Bytes>, BodyError>>) -> Poll<Option<Result<Frame<Bytes>, BodyError>>> {
        self.finished = true;
        self.in_flight = false;
        self.signal_sender.close_channel();
        Poll::Ready(result)
    }
}

impl Body for IngressBody {
    type Data = Bytes;
    type Error = BodyError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        if !this.in_flight {
            match ready!(this.signal_sender.poll_ready(cx)) {
                Ok(()) => {
                    if this.signal_sender.start_send(IngressSignal::ReadMore).is_err() {
                        return this.finish(Some(Err(BodyError::aborted("request body is no longer readable"))));
                    }
                    this.in_flight = true;
                }
                Err(_disconnected) => {
                    return this.finish(Some(Err(BodyError::aborted("request body is no longer readable"))));
                }
            }
        }

        match ready!(this.data_receiver.poll_next_unpin(cx)) {
            Some(IngressItem::Chunk(bytes)) => {
                this.in_flight = false;
                Poll::Ready(Some(Ok(Frame::data(bytes))))
            }
            Some(IngressItem::End) => this.finish(None),
            Some(IngressItem::Failed(e)) => this.finish(Some(Err(e))),
            None => this.finish(Some(Err(BodyError::aborted("request body ended before its declared end")))),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.finished
    }

    fn size_hint(&self) -> SizeHint {
        match self.payload_size {
            PayloadSize::Length(length) => SizeHint::with_exact(length),
            PayloadSize::Chunked => SizeHint::new(),
            PayloadSize::Empty => SizeHint::with_exact(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use futures::stream;
    use futures::task::noop_waker_ref;
    use http_body_util::BodyExt;

    type Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>;

    fn payload(parts: &[&'static str]) -> stream::Iter<std::vec::IntoIter<Item>> {
        let mut items: Vec<Item> =
            parts.iter().map(|&part| Ok(Message::Payload(PayloadItem::Chunk(Bytes::from_static(part.as_bytes()))))).collect();
        items.push(Ok(Message::Payload(PayloadItem::Eof)));
        stream::iter(items)
    }

    #[tokio::test]
    async fn body_requests_once_until_served() {
        let (signal_sender, mut signal_receiver) = mpsc::channel(0);
        let (mut data_sender, data_receiver) = mpsc::channel(0);
        let mut body =
            IngressBody { signal_sender, data_receiver, payload_size: PayloadSize::Chunked, in_flight: false, finished: false };

        let mut cx = Context::from_waker(noop_waker_ref());

        assert!(Pin::new(&mut body).poll_frame(&mut cx).is_pending());
        assert!(matches!(signal_receiver.next().await, Some(IngressSignal::ReadMore)));

        assert!(Pin::new(&mut body).poll_frame(&mut cx).is_pending());
        assert!(signal_receiver.next().now_or_never().is_none());

        data_sender.try_send(IngressItem::Chunk(Bytes::from_static(b"hello"))).unwrap();
        match Pin::new(&mut body).poll_frame(&mut cx) {
            Poll::Ready(Some(Ok(frame))) => assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"hello")),
            other => panic!("unexpected poll result: {other:?}"),
        }

        assert!(Pin::new(&mut body).poll_frame(&mut cx).is_pending());
        assert!(matches!(signal_receiver.next().await, Some(IngressSignal::ReadMore)));

        data_sender.try_send(IngressItem::End).unwrap();
        assert!(matches!(Pin::new(&mut body).poll_frame(&mut cx), Poll::Ready(None)));
        assert!(matches!(Pin::new(&mut body).poll_frame(&mut cx), Poll::Ready(None)));
        assert!(body.is_end_stream());
    }

    #[tokio::test]
    async fn pump_serves_whole_payload() {
        let mut payload_stream = payload(&["hello", " ", "world"]);
        let (mut sender, body) = channel(&mut payload_stream, PayloadSize::Chunked);

        let (pumped, collected) = tokio::join!(sender.pump(), body.collect());
        pumped.unwrap();
        assert_eq!(collected.unwrap().to_bytes(), Bytes::from_static(b"hello world"));
        assert_eq!(sender.state(), IngressState::Closed);
        sender.drain().await.unwrap();
    }

    #[tokio::test]
    async fn nothing_is_read_without_a_consumer() {
        let mut payload_stream = payload(&["unread"]);
        let (mut sender, body) = channel(&mut payload_stream, PayloadSize::Length(6));
        drop(body);

        sender.pump().await.unwrap();
        assert_eq!(sender.state(), IngressState::Active);

        sender.drain().await.unwrap();
        assert_eq!(sender.state(), IngressState::Closed);
        drop(sender);
        assert!(payload_stream.next().await.is_none());
    }

    #[tokio::test]
    async fn drain_aborts_a_live_body() {
        let mut payload_stream = payload(&["a", "b"]);
        let (mut sender, mut body) = channel(&mut payload_stream, PayloadSize::Chunked);

        sender.drain().await.unwrap();
        let result = body.frame().await;
        assert!(matches!(result, Some(Err(BodyError::Aborted { .. }))));
        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn truncated_payload_fails_both_halves() {
        let items: Vec<Item> = vec![Ok(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"part"))))];
        let mut payload_stream = stream::iter(items);
        let (mut sender, body) = channel(&mut payload_stream, PayloadSize::Length(10));

        let (pumped, collected) = tokio::join!(sender.pump(), body.collect());
        assert!(matches!(pumped, Err(ParseError::Io { .. })));
        assert!(matches!(collected, Err(BodyError::Aborted { .. })));
        assert_eq!(sender.state(), IngressState::Closed);
    }

    #[tokio::test]
    async fn empty_payload_starts_closed() {
        let mut payload_stream = stream::iter(Vec::<Item>::new());
        let (mut sender, mut body) = channel(&mut payload_stream, PayloadSize::Empty);

        assert_eq!(sender.state(), IngressState::Closed);
        sender.pump().await.unwrap();
        sender.drain().await.unwrap();
        assert!(body.frame().await.is_none());
        assert_eq!(body.size_hint().exact(), Some(0));
    }
}
