use bytes::{Buf, Bytes};

/// One event on the codec boundary: either a message head or a piece of its payload.
///
/// The request decoder produces `Message<(RequestHeader, PayloadSize)>` and the response
/// encoder consumes `Message<(ResponseHead, PayloadSize), D>`. A head whose [`PayloadSize`]
/// is [`PayloadSize::Empty`] is never followed by payload events.
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    /// The message head
    Header(T),
    /// A chunk of payload data or the end-of-payload marker
    Payload(PayloadItem<Data>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    Chunk(Data),
    /// Terminal marker; the payload is complete
    Eof,
}

/// How the payload of a message is framed on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Declared by `Content-Length`
    Length(u64),
    /// `Transfer-Encoding: chunked`, length unknown up front
    Chunked,
    /// No payload at all
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn new_length(length: u64) -> Self {
        if length == 0 { PayloadSize::Empty } else { PayloadSize::Length(length) }
    }

    #[inline]
    pub fn new_chunked() -> Self {
        PayloadSize::Chunked
    }

    #[inline]
    pub fn new_empty() -> Self {
        PayloadSize::Empty
    }

    /// Framing for a payload whose size may be unknown.
    #[inline]
    pub fn from_size(size: Option<u64>) -> Self {
        size.map_or(PayloadSize::Chunked, PayloadSize::new_length)
    }

    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    /// The declared size, `None` for chunked payloads.
    #[inline]
    pub fn size(&self) -> Option<u64> {
        match self {
            PayloadSize::Length(length) => Some(*length),
            PayloadSize::Chunked => None,
            PayloadSize::Empty => Some(0),
        }
    }
}

impl<T, D: Buf> Message<T, D> {
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}
