use std::error::Error;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::{Request, Response, StatusCode, Version};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::select;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::connection::PeerAddr;
use crate::handler::Handler;
use crate::protocol::body::ingress::{self, IngressState};
use crate::protocol::body::{Body, Kind};
use crate::protocol::{
    HttpError, Message, ParseError, PayloadItem, PayloadSize, RequestHeader, ResponseHead, SendError, bad_request_head,
    has_connection_close, status_head,
};

type ResponseMessage = Message<(ResponseHead, PayloadSize), Bytes>;

/// Initial capacity of the read buffer, enough for a typical request head
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Whether the connection can carry another exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reuse {
    KeepAlive,
    Close,
}

/// An HTTP/1.1 connection over a split byte stream.
///
/// Requests are served strictly one after another. While a handler runs, its request body is
/// read from the connection only as fast as the handler consumes it; whatever it leaves unread
/// is skipped before the next request head is decoded.
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
    peer_addr: Option<PeerAddr>,
    shutdown: CancellationToken,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), READ_BUFFER_SIZE),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
            peer_addr: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Attaches the remote address, inserted into every request's extensions.
    pub fn with_peer_addr(mut self, peer_addr: PeerAddr) -> Self {
        self.peer_addr = Some(peer_addr);
        self
    }

    /// Ends the connection once `shutdown` fires while it waits for the next request head.
    ///
    /// An exchange already in progress runs to completion first.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Serves requests until the client closes, an exchange asks to close, or an error occurs.
    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
    {
        loop {
            let next = select! {
                biased;
                next = self.framed_read.next() => Some(next),
                () = self.shutdown.cancelled() => None,
            };

            let Some(next) = next else {
                debug!("shutdown while idle, close connection");
                self.close().await;
                return Ok(());
            };

            match next {
                Some(Ok(Message::Header((header, payload_size)))) => {
                    if self.do_process(header, payload_size, handler.as_ref()).await? == Reuse::Close {
                        self.close().await;
                        return Ok(());
                    }
                }

                Some(Ok(Message::Payload(_))) => {
                    error!("receive payload while expecting a request head");
                    self.send_head(bad_request_head()).await?;
                    return Err(ParseError::invalid_body("payload without a request head").into());
                }

                Some(Err(e)) => {
                    if !matches!(e, ParseError::Io { .. }) {
                        warn!(cause = %e, "failed to decode request head, respond with 400");
                        self.send_head(bad_request_head()).await?;
                        self.close().await;
                    }
                    return Err(e.into());
                }

                None => {
                    trace!("client closed the connection");
                    return Ok(());
                }
            }
        }
    }

    async fn do_process<H>(&mut self, header: RequestHeader, payload_size: PayloadSize, handler: &H) -> Result<Reuse, HttpError>
    where
        H: Handler,
    {
        if header.version() != Version::HTTP_11 {
            warn!(http_version = ?header.version(), "reject request with unsupported http version");
            self.send_head(bad_request_head()).await?;
            return Ok(Reuse::Close);
        }

        let request_reuse = if header.is_keep_alive() { Reuse::KeepAlive } else { Reuse::Close };

        if header.expects_continue() && !payload_size.is_empty() {
            let writer = self.framed_write.get_mut();
            writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.map_err(SendError::io)?;
            writer.flush().await.map_err(SendError::io)?;
            info!("receive expect request header, sent continue response");
        }

        let Self { framed_read, framed_write, peer_addr, .. } = self;
        let (mut body_sender, ingress_body) = ingress::channel(framed_read, payload_size);

        let mut request = header.body(Body::from_ingress(ingress_body));
        if let Some(peer_addr) = peer_addr {
            request.extensions_mut().insert(peer_addr.clone());
        }

        // The body must be pumped while the whole exchange runs, not only the handler: a
        // response body may itself be streaming the request body.
        let exchange = exchange(handler, request, framed_write);
        tokio::pin!(exchange);

        let mut pump_result = Ok(());
        let mut pump_done = false;
        let exchange_result = loop {
            select! {
                biased;
                result = &mut exchange => break result,
                result = body_sender.pump(), if !pump_done => {
                    pump_done = true;
                    pump_result = result;
                }
            }
        };

        let response_reuse = exchange_result?;
        pump_result?;

        if request_reuse == Reuse::Close || response_reuse == Reuse::Close {
            return Ok(Reuse::Close);
        }

        body_sender.drain().await?;
        debug_assert_eq!(body_sender.state(), IngressState::Closed);
        Ok(Reuse::KeepAlive)
    }

    async fn send_head(&mut self, head: ResponseHead) -> Result<(), HttpError> {
        self.framed_write.send(ResponseMessage::Header((head, PayloadSize::Empty))).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.framed_write.get_mut().shutdown().await {
            trace!(cause = %e, "failed to shutdown write half");
        }
    }
}

impl<R, W> fmt::Debug for HttpConnection<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnection")
            .field("peer_addr", &self.peer_addr)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Runs the handler and writes whatever it answered.
async fn exchange<H, W>(handler: &H, request: Request<Body>, framed_write: &mut FramedWrite<W, ResponseEncoder>) -> Result<Reuse, HttpError>
where
    H: Handler,
    W: AsyncWrite + Unpin,
{
    let response = match handler.call(request).await {
        Ok(response) => response,
        Err(e) => {
            let e: Box<dyn Error + Send + Sync> = e.into();
            error!(cause = %e, "handle request error, respond with 500");
            status_head(StatusCode::INTERNAL_SERVER_ERROR).map(|()| Body::empty())
        }
    };

    write_response(framed_write, response).await
}

/// Writes a response; empty and fixed bodies go out in a single flush, streaming bodies are
/// flushed chunk by chunk.
async fn write_response<W>(framed_write: &mut FramedWrite<W, ResponseEncoder>, response: Response<Body>) -> Result<Reuse, HttpError>
where
    W: AsyncWrite + Unpin,
{
    let (parts, body) = response.into_parts();
    let mut head = ResponseHead::from_parts(parts, ());
    *head.version_mut() = Version::HTTP_11;
    let reuse = if has_connection_close(head.headers()) { Reuse::Close } else { Reuse::KeepAlive };

    match body.into_kind() {
        Kind::Empty => {
            framed_write.send(ResponseMessage::Header((head, PayloadSize::Empty))).await?;
        }

        Kind::Fixed(buf) => {
            framed_write.feed(ResponseMessage::Header((head, PayloadSize::new_length(buf.len() as u64)))).await?;
            framed_write.feed(ResponseMessage::Payload(PayloadItem::Chunk(Bytes::from(buf)))).await?;
            framed_write.send(ResponseMessage::Payload(PayloadItem::Eof)).await?;
        }

        Kind::Streaming(mut streaming) => {
            let payload_size = PayloadSize::from_size(streaming.size());
            framed_write.send(ResponseMessage::Header((head, payload_size))).await?;
            if payload_size.is_empty() {
                return Ok(reuse);
            }

            while let Some(chunk) = streaming.next_chunk().await {
                let chunk = chunk.map_err(|e| {
                    error!(cause = %e, "response body failed after its head was sent");
                    SendError::invalid_body(e)
                })?;
                if chunk.is_empty() {
                    continue;
                }
                framed_write.send(ResponseMessage::Payload(PayloadItem::Chunk(Bytes::from(chunk)))).await?;
            }
            framed_write.send(ResponseMessage::Payload(PayloadItem::Eof)).await?;
        }
    }

    Ok(reuse)
}
