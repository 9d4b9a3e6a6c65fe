use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use http_body::Frame;
use http_body_util::{BodyExt, StreamBody};

use super::Body;
use crate::buffer::Buf;
use crate::protocol::BodyError;

/// Pushes chunks into a streaming [`Body`] created by [`Body::channel`].
///
/// Dropping the writer ends the body normally.
#[derive(Debug)]
pub struct BodyWriter {
    sender: mpsc::Sender<Result<Bytes, BodyError>>,
}

pub(super) fn channel(size: Option<u64>) -> (BodyWriter, Body) {
    let (sender, receiver) = mpsc::channel(0);
    let frames = receiver.map(|item: Result<Bytes, BodyError>| item.map(Frame::data));
    (BodyWriter { sender }, Body::streaming(size, StreamBody::new(frames).boxed_unsync()))
}

impl BodyWriter {
    /// Sends one chunk. Empty chunks are skipped.
    ///
    /// Fails once the body has been dropped by its reader.
    pub async fn write(&mut self, buf: impl Into<Buf>) -> Result<(), BodyError> {
        let buf = buf.into();
        if buf.is_empty() {
            return Ok(());
        }
        self.sender.send(Ok(buf.into())).await.map_err(|_disconnected| BodyError::aborted("body reader dropped"))
    }

    pub async fn write_str(&mut self, str: &str) -> Result<(), BodyError> {
        self.write_slice(str.as_bytes()).await
    }

    pub async fn write_slice(&mut self, slice: &[u8]) -> Result<(), BodyError> {
        self.write(Buf::copy_from_slice(slice)).await
    }

    /// Ends the body with an error instead of a normal end.
    pub async fn abort<S: ToString>(mut self, reason: S) {
        // a reader that is already gone has nothing left to fail
        let _sent = self.sender.send(Err(BodyError::aborted(reason))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn abort_fails_the_reader() {
        let (mut writer, mut body) = Body::channel(Some(10));
        let producer = async move {
            writer.write_str("part").await.unwrap();
            writer.abort("gave up").await;
        };

        let (result, ()) = tokio::join!(body.to_buf(), producer);
        assert!(matches!(result, Err(BodyError::Aborted { .. })));
        assert!(body.is_consumed());
    }

    #[tokio::test]
    async fn write_after_reader_dropped_fails() {
        let (mut writer, body) = Body::channel(None);
        drop(body);
        assert!(writer.write_str("late").await.is_err());
    }

    #[tokio::test]
    async fn empty_writes_are_skipped() {
        let (mut writer, mut body) = Body::channel(None);
        let producer = async move {
            writer.write_str("").await.unwrap();
            writer.write_str("x").await.unwrap();
        };

        let mut chunks = Vec::new();
        let consumer = async {
            let mut stream = body.chunks();
            while let Some(chunk) = stream.next().await {
                chunks.push(chunk.unwrap());
            }
        };
        tokio::join!(consumer, producer);
        assert_eq!(chunks.len(), 1);
    }
}
