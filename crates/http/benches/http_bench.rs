use std::convert::Infallible;
use std::hint::black_box;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use criterion::{Criterion, criterion_group, criterion_main};
use fiber_http::buffer::{Buf, BufBuilder};
use fiber_http::codec::{RequestDecoder, ResponseEncoder};
use fiber_http::connection::HttpConnection;
use fiber_http::handler::make_handler;
use fiber_http::protocol::body::Body;
use fiber_http::protocol::{Message, PayloadItem, PayloadSize, ResponseHead};
use http::{Request, Response};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::codec::{Decoder, Encoder};

/// Replays a fixed input, then reports end of stream; writes are discarded.
struct ReplayIo {
    input: Bytes,
}

impl AsyncRead for ReplayIo {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let n = self.input.len().min(buf.remaining());
        let chunk = self.input.split_to(n);
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

struct Sink;

impl AsyncWrite for Sink {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

const SIMPLE_GET: &[u8] = b"GET /index.html HTTP/1.1\r\nHost: localhost\r\nAccept: */*\r\nUser-Agent: bench\r\n\r\n";

fn bench_request_decoder(c: &mut Criterion) {
    c.bench_function("decode_simple_request", |b| {
        b.iter(|| {
            let mut decoder = RequestDecoder::new();
            let mut bytes = BytesMut::from(SIMPLE_GET);
            black_box(decoder.decode(&mut bytes).unwrap());
        });
    });

    let chunked = b"POST /upload HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n\
        10\r\n0123456789abcdef\r\n10\r\n0123456789abcdef\r\n0\r\n\r\n";
    c.bench_function("decode_chunked_request", |b| {
        b.iter(|| {
            let mut decoder = RequestDecoder::new();
            let mut bytes = BytesMut::from(&chunked[..]);
            while let Some(message) = decoder.decode(&mut bytes).unwrap() {
                black_box(message);
            }
        });
    });
}

fn bench_response_encoder(c: &mut Criterion) {
    let body = Bytes::from_static(b"Hello World!");

    c.bench_function("encode_simple_response", |b| {
        b.iter(|| {
            let mut encoder = ResponseEncoder::new();
            let mut bytes = BytesMut::new();
            let head = ResponseHead::new(());
            let size = PayloadSize::new_length(body.len() as u64);
            encoder.encode(Message::<_, Bytes>::Header((head, size)), &mut bytes).unwrap();
            encoder.encode(Message::<(ResponseHead, PayloadSize), _>::Payload(PayloadItem::Chunk(body.clone())), &mut bytes).unwrap();
            encoder.encode(Message::<(ResponseHead, PayloadSize), Bytes>::Payload(PayloadItem::Eof), &mut bytes).unwrap();
            black_box(bytes);
        });
    });
}

fn bench_buffer(c: &mut Criterion) {
    let parts: Vec<Buf> = (0..16).map(|i| Buf::from(format!("part-{i:04}-of-the-body;"))).collect();

    c.bench_function("build_buffer", |b| {
        b.iter(|| {
            let mut builder = BufBuilder::with_capacity(512);
            for part in &parts {
                builder.append_buf(part);
            }
            black_box(builder.build());
        });
    });
}

async fn hello(_request: Request<Body>) -> Result<Response<&'static str>, Infallible> {
    Ok(Response::new("Hello World!"))
}

fn bench_http_connection(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let handler = Arc::new(make_handler(hello));
    let pipelined = Bytes::from(SIMPLE_GET.repeat(8));

    c.bench_function("process_pipelined_requests", |b| {
        b.to_async(&runtime).iter(|| {
            let handler = Arc::clone(&handler);
            let input = pipelined.clone();
            async move {
                let connection = HttpConnection::new(ReplayIo { input }, Sink);
                black_box(connection.process(handler).await.unwrap());
            }
        });
    });
}

criterion_group!(benches, bench_request_decoder, bench_response_encoder, bench_buffer, bench_http_connection);
criterion_main!(benches);
