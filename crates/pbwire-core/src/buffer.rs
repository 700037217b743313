//! Immutable byte strings for `bytes` fields.

use bytes::Bytes;
use std::fmt;
use std::ops::{Deref, RangeBounds};

/// Immutable, reference-counted byte sequence.
///
/// A `ByteBuffer` either shares a slice of an existing backing allocation or
/// owns a copy of its bytes. Cloning never copies the payload. Equality,
/// ordering and hashing are byte-wise.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteBuffer(Bytes);

impl ByteBuffer {
    /// Creates an empty buffer
    pub const fn new() -> Self {
        Self(Bytes::new())
    }

    /// Creates a buffer over static data without copying
    pub const fn from_static(data: &'static [u8]) -> Self {
        Self(Bytes::from_static(data))
    }

    /// Creates a buffer holding a copy of `data`
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(data))
    }

    /// Creates a buffer holding the UTF-8 bytes of `text`
    pub fn copy_from_str(text: &str) -> Self {
        Self::copy_from_slice(text.as_bytes())
    }

    /// Returns a sub-range that shares this buffer's storage
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Self {
        Self(self.0.slice(range))
    }

    /// Returns the number of bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the buffer holds no bytes
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the bytes as a slice
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Decodes the bytes as UTF-8
    pub fn to_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Returns the underlying shared bytes
    pub fn into_inner(self) -> Bytes {
        self.0
    }
}

impl Deref for ByteBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Bytes> for ByteBuffer {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self(Bytes::from(data))
    }
}

impl From<&'static [u8]> for ByteBuffer {
    fn from(data: &'static [u8]) -> Self {
        Self::from_static(data)
    }
}

impl From<ByteBuffer> for Bytes {
    fn from(buffer: ByteBuffer) -> Self {
        buffer.0
    }
}

impl PartialEq<[u8]> for ByteBuffer {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_slice() == other
    }
}

impl PartialEq<&[u8]> for ByteBuffer {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_slice() == *other
    }
}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteBuffer(")?;
        for byte in self.0.iter() {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}
