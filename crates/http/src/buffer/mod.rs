//! Immutable byte buffers.
//!
//! [`Buf`] is the unit in which bytes flow through the crate: request body chunks handed to
//! handlers, response chunks handed to the encoder, and fixed bodies. It is a thin view over
//! [`bytes::Bytes`], so cloning and slicing never copy the underlying storage.
//!
//! [`BufBuilder`] assembles a new [`Buf`] from strings, slices and other buffers.

use std::fmt;
use std::ops::Index;
use std::str::Utf8Error;

use bytes::{BufMut, Bytes, BytesMut};

use crate::protocol::BufError;

/// An immutable, cheaply cloneable sequence of bytes.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Buf {
    bytes: Bytes,
}

impl Buf {
    /// Creates an empty buffer. Does not allocate.
    pub const fn new() -> Self {
        Self { bytes: Bytes::new() }
    }

    /// Creates a buffer pointing at static memory.
    pub const fn from_static(bytes: &'static [u8]) -> Self {
        Self { bytes: Bytes::from_static(bytes) }
    }

    /// Creates a buffer holding a copy of `data`.
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self { bytes: Bytes::copy_from_slice(data) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the byte at `index`, or `None` when the index is out of bounds.
    #[inline]
    pub fn get(&self, index: usize) -> Option<u8> {
        self.bytes.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.bytes.iter().copied()
    }

    #[inline]
    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Views the content as UTF-8 text.
    pub fn to_str(&self) -> Result<&str, Utf8Error> {
        std::str::from_utf8(&self.bytes)
    }

    /// Decodes the content as UTF-8, replacing invalid sequences with `U+FFFD`.
    pub fn decode_to_string(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Copies the whole buffer into `destination` starting at `offset`.
    ///
    /// Fails without writing anything when fewer than `self.len()` bytes are available
    /// after `offset`.
    pub fn copy_to(&self, destination: &mut [u8], offset: usize) -> Result<(), BufError> {
        let capacity = destination.len().saturating_sub(offset);
        if offset > destination.len() || capacity < self.len() {
            return Err(BufError::destination_too_small(capacity, self.len()));
        }

        destination[offset..offset + self.len()].copy_from_slice(&self.bytes);
        Ok(())
    }

    /// Copies the whole buffer into a growable or fixed `destination`.
    ///
    /// Fails without writing anything when `destination` cannot take `self.len()` more bytes.
    pub fn copy_into<B: BufMut>(&self, destination: &mut B) -> Result<(), BufError> {
        let capacity = destination.remaining_mut();
        if capacity < self.len() {
            return Err(BufError::destination_too_small(capacity, self.len()));
        }

        destination.put_slice(&self.bytes);
        Ok(())
    }

    /// Returns a new buffer holding `self` followed by `other`. Neither input changes.
    pub fn append(&self, other: &Buf) -> Buf {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }

        let mut builder = BufBuilder::with_capacity(self.len() + other.len());
        builder.append_buf(self);
        builder.append_buf(other);
        builder.build()
    }
}

impl Index<usize> for Buf {
    type Output = u8;

    fn index(&self, index: usize) -> &Self::Output {
        &self.bytes[index]
    }
}

impl AsRef<[u8]> for Buf {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Buf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.bytes, f)
    }
}

impl<'a> IntoIterator for &'a Buf {
    type Item = &'a u8;
    type IntoIter = std::slice::Iter<'a, u8>;

    fn into_iter(self) -> Self::IntoIter {
        self.bytes.iter()
    }
}

impl From<Bytes> for Buf {
    #[inline]
    fn from(bytes: Bytes) -> Self {
        Self { bytes }
    }
}

impl From<BytesMut> for Buf {
    #[inline]
    fn from(bytes: BytesMut) -> Self {
        Self { bytes: bytes.freeze() }
    }
}

impl From<Buf> for Bytes {
    #[inline]
    fn from(buf: Buf) -> Self {
        buf.bytes
    }
}

impl From<Vec<u8>> for Buf {
    fn from(vec: Vec<u8>) -> Self {
        Self { bytes: Bytes::from(vec) }
    }
}

impl From<String> for Buf {
    fn from(string: String) -> Self {
        Self { bytes: Bytes::from(string) }
    }
}

impl From<&'static str> for Buf {
    fn from(str: &'static str) -> Self {
        Self { bytes: Bytes::from_static(str.as_bytes()) }
    }
}

impl From<&'static [u8]> for Buf {
    fn from(slice: &'static [u8]) -> Self {
        Self { bytes: Bytes::from_static(slice) }
    }
}

/// Incrementally builds a [`Buf`], growing its storage geometrically.
#[derive(Debug, Default)]
pub struct BufBuilder {
    inner: BytesMut,
}

impl BufBuilder {
    const DEFAULT_CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { inner: BytesMut::with_capacity(capacity) }
    }

    pub fn append_str(&mut self, str: &str) -> &mut Self {
        self.inner.extend_from_slice(str.as_bytes());
        self
    }

    pub fn append_slice(&mut self, slice: &[u8]) -> &mut Self {
        self.inner.extend_from_slice(slice);
        self
    }

    pub fn append_buf(&mut self, buf: &Buf) -> &mut Self {
        self.inner.extend_from_slice(buf.as_ref());
        self
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn build(self) -> Buf {
        if self.inner.is_empty() { Buf::new() } else { Buf::from(self.inner) }
    }
}
