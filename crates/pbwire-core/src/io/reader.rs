//! Streaming decoder for the protobuf wire format.
//!
//! [`CodedReader`] pulls bytes either from memory or from any [`Read`]
//! implementation through a fixed-size refill buffer. Nested length-delimited
//! fields are framed with an absolute *limit*: once a limit is pushed the
//! reader behaves as if the stream ended there, even when the source holds
//! more bytes.
//!
//! ## Buffer bookkeeping
//!
//! ```text
//!  total_bytes_retired   buffer_pos      buffer_size   (hidden by limit)
//!  |<--- earlier bufs --->|[====read====|===unread===|~~~~~~~~~~~~~~~~~]
//!                                                    ^ current_limit
//! ```
//!
//! `buffer_size` never extends past the active limit; the bytes that do are
//! counted in `buffer_size_after_limit` and become visible again when the
//! limit is popped.

use std::io::{ErrorKind, Read};

use bytes::Bytes;
use tracing::trace;

use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::wire::{
    decode_varint, decode_zigzag32, decode_zigzag64, make_tag, tag_field_number, tag_wire_type,
    WireType, FIXED32_SIZE, FIXED64_SIZE, MAX_VARINT_LEN,
};

/// Default maximum nesting depth of messages and groups
pub const DEFAULT_RECURSION_LIMIT: usize = 64;

/// Default ceiling on the total number of bytes read from a stream
pub const DEFAULT_SIZE_LIMIT: usize = i32::MAX as usize;

/// Default capacity of the refill buffer used for streams
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

const NO_LIMIT: usize = usize::MAX;

/// Configuration for the reader
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Maximum nesting depth of messages and groups
    pub recursion_limit: usize,
    /// Maximum number of bytes a stream may supply
    pub size_limit: usize,
    /// Capacity of the refill buffer for stream input
    pub buffer_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            size_limit: DEFAULT_SIZE_LIMIT,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl ReaderConfig {
    /// Creates a new reader config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum nesting depth
    pub fn recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Sets the maximum number of bytes read from a stream
    pub fn size_limit(mut self, limit: usize) -> Self {
        self.size_limit = limit;
        self
    }

    /// Sets the refill buffer capacity (at least one byte)
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }
}

enum Input<'a> {
    Slice(&'a [u8]),
    Shared(Bytes),
    Stream {
        source: Box<dyn Read + 'a>,
        buffer: Box<[u8]>,
    },
}

impl Input<'_> {
    fn bytes(&self) -> &[u8] {
        match self {
            Input::Slice(data) => &data[..],
            Input::Shared(data) => &data[..],
            Input::Stream { buffer, .. } => &buffer[..],
        }
    }
}

/// Decoder for protobuf-encoded data.
///
/// A reader is scoped to one decode operation or stream session and is not
/// meant to be reused across unrelated messages. When built from an owned
/// source the source is dropped together with the reader; pass `&mut source`
/// to keep it open afterwards.
pub struct CodedReader<'a> {
    input: Input<'a>,
    buffer_pos: usize,
    buffer_size: usize,
    buffer_size_after_limit: usize,
    total_bytes_retired: usize,
    current_limit: usize,
    last_tag: u32,
    pending_tag: Option<u32>,
    recursion_depth: usize,
    config: ReaderConfig,
}

impl<'a> CodedReader<'a> {
    /// Creates a reader over a borrowed slice
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_input(Input::Slice(data), data.len())
    }

    /// Creates a reader over shared bytes.
    ///
    /// `bytes` fields read from this reader share the input's storage
    /// instead of copying.
    pub fn from_shared(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let len = data.len();
        Self::with_input(Input::Shared(data), len)
    }

    /// Creates a reader pulling from `source` through a refill buffer
    pub fn from_reader(source: impl Read + 'a) -> Self {
        let input = Input::Stream {
            source: Box::new(source),
            buffer: vec![0u8; DEFAULT_BUFFER_SIZE].into_boxed_slice(),
        };
        Self::with_input(input, 0)
    }

    fn with_input(input: Input<'a>, buffer_size: usize) -> Self {
        Self {
            input,
            buffer_pos: 0,
            buffer_size,
            buffer_size_after_limit: 0,
            total_bytes_retired: 0,
            current_limit: NO_LIMIT,
            last_tag: 0,
            pending_tag: None,
            recursion_depth: 0,
            config: ReaderConfig::default(),
        }
    }

    /// Applies a custom configuration.
    ///
    /// The refill buffer is resized only if nothing has been read yet. For
    /// in-memory input, bytes past `size_limit` become unreadable and reaching
    /// them fails with [`Error::SizeLimitExceeded`].
    pub fn with_config(mut self, config: ReaderConfig) -> Self {
        match &mut self.input {
            Input::Stream { buffer, .. } => {
                if self.total_bytes_retired == 0
                    && self.buffer_size == 0
                    && buffer.len() != config.buffer_size
                {
                    *buffer = vec![0u8; config.buffer_size.max(1)].into_boxed_slice();
                }
            }
            input => {
                let len = input.bytes().len();
                self.buffer_size = len.min(config.size_limit.max(self.buffer_pos));
                self.buffer_size_after_limit = 0;
                self.recompute_buffer_size_after_limit();
            }
        }
        self.config = config;
        self
    }

    /// Returns the active configuration
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Absolute number of bytes consumed so far
    pub fn position(&self) -> usize {
        self.total_bytes_retired + self.buffer_pos
    }

    /// The tag most recently returned by [`read_tag`](Self::read_tag), or 0
    pub fn last_tag(&self) -> u32 {
        self.last_tag
    }

    /// Current message/group nesting depth
    pub fn recursion_depth(&self) -> usize {
        self.recursion_depth
    }

    fn available(&self) -> usize {
        self.buffer_size - self.buffer_pos
    }

    /// Bytes readable without touching the source, clipped to the limit
    pub(crate) fn buffered_len(&self) -> usize {
        self.available()
    }

    fn remaining(&self) -> &[u8] {
        &self.input.bytes()[self.buffer_pos..self.buffer_size]
    }

    fn is_stream(&self) -> bool {
        matches!(self.input, Input::Stream { .. })
    }

    /// Pulls the next chunk from the source into the (empty) buffer.
    ///
    /// Returns `Ok(false)` at the end of the logical stream unless
    /// `must_succeed` is set, in which case that is a truncation.
    fn refill_buffer(&mut self, must_succeed: bool) -> Result<bool> {
        if self.buffer_pos < self.buffer_size {
            return Err(Error::misuse(
                "refill_buffer called while unread bytes remain in the buffer",
            ));
        }

        let end_of_input = |must_succeed: bool| {
            if must_succeed {
                Err(Error::TruncatedMessage)
            } else {
                Ok(false)
            }
        };

        if self.total_bytes_retired + self.buffer_size == self.current_limit {
            return end_of_input(must_succeed);
        }

        if !self.is_stream() {
            if self.input.bytes().len() > self.config.size_limit {
                return Err(Error::size_limit(self.config.size_limit));
            }
            return end_of_input(must_succeed);
        }
        let Input::Stream { source, buffer } = &mut self.input else {
            return end_of_input(must_succeed);
        };

        let read = loop {
            match source.read(buffer) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };

        self.total_bytes_retired += self.buffer_size;
        self.buffer_pos = 0;
        self.buffer_size = read;

        if read == 0 {
            return end_of_input(must_succeed);
        }

        trace!(
            read,
            retired = self.total_bytes_retired,
            "refilled reader buffer"
        );

        self.recompute_buffer_size_after_limit();
        let total = self.total_bytes_retired + self.buffer_size + self.buffer_size_after_limit;
        if total > self.config.size_limit {
            return Err(Error::size_limit(self.config.size_limit));
        }

        Ok(true)
    }

    fn recompute_buffer_size_after_limit(&mut self) {
        self.buffer_size += self.buffer_size_after_limit;
        let buffer_end = self.total_bytes_retired + self.buffer_size;
        if buffer_end > self.current_limit {
            self.buffer_size_after_limit = buffer_end - self.current_limit;
            self.buffer_size -= self.buffer_size_after_limit;
        } else {
            self.buffer_size_after_limit = 0;
        }
    }

    /// Restricts reading to the next `byte_count` bytes.
    ///
    /// Returns the previous limit, to be handed back to
    /// [`pop_limit`](Self::pop_limit) once the nested region is consumed. A
    /// limit reaching past the enclosing one means the enclosing length was
    /// wrong and fails as a truncation.
    pub fn push_limit(&mut self, byte_count: usize) -> Result<usize> {
        let new_limit = self
            .position()
            .checked_add(byte_count)
            .ok_or(Error::TruncatedMessage)?;
        let old_limit = self.current_limit;
        if new_limit > old_limit {
            return Err(Error::TruncatedMessage);
        }
        trace!(byte_count, new_limit, "pushed limit");
        self.current_limit = new_limit;
        self.recompute_buffer_size_after_limit();
        Ok(old_limit)
    }

    /// Restores a limit returned by [`push_limit`](Self::push_limit)
    pub fn pop_limit(&mut self, old_limit: usize) {
        self.current_limit = old_limit;
        self.recompute_buffer_size_after_limit();
    }

    /// True when a limit is active and has been reached
    pub fn reached_limit(&self) -> bool {
        self.current_limit != NO_LIMIT && self.position() >= self.current_limit
    }

    /// Bytes left before the active limit, or `None` without a limit
    pub fn bytes_until_limit(&self) -> Option<usize> {
        if self.current_limit == NO_LIMIT {
            None
        } else {
            Some(self.current_limit.saturating_sub(self.position()))
        }
    }

    /// True when no more bytes can be read, either because the source is
    /// exhausted or because the active limit has been reached
    pub fn is_at_end(&mut self) -> Result<bool> {
        if let Some(tag) = self.pending_tag {
            return Ok(tag == 0);
        }
        Ok(self.buffer_pos == self.buffer_size && !self.refill_buffer(false)?)
    }

    /// Reads a field tag, returning 0 at the end of the logical stream.
    ///
    /// A tag with field number 0 is rejected.
    pub fn read_tag(&mut self) -> Result<u32> {
        if let Some(tag) = self.pending_tag.take() {
            self.last_tag = tag;
            return Ok(tag);
        }

        if self.is_at_end()? {
            self.last_tag = 0;
            return Ok(0);
        }

        let tag = self.read_varint32()?;
        if tag_field_number(tag) == 0 {
            return Err(Error::invalid_tag(tag));
        }
        self.last_tag = tag;
        Ok(tag)
    }

    /// Returns the next tag without consuming it.
    ///
    /// The tag is held in a one-slot lookahead and handed out by the next
    /// [`read_tag`](Self::read_tag); [`last_tag`](Self::last_tag) is not
    /// affected by peeking.
    pub fn peek_tag(&mut self) -> Result<u32> {
        if let Some(tag) = self.pending_tag {
            return Ok(tag);
        }
        let saved = self.last_tag;
        let tag = self.read_tag()?;
        self.pending_tag = Some(tag);
        self.last_tag = saved;
        Ok(tag)
    }

    /// Consumes the next tag only if it equals `tag`
    pub fn maybe_consume_tag(&mut self, tag: u32) -> Result<bool> {
        if self.peek_tag()? == tag {
            self.pending_tag = None;
            self.last_tag = tag;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Fails unless the last tag read equals `expected`.
    ///
    /// A last tag of 0 means the input ended before `expected` arrived, which
    /// is reported as [`Error::TruncatedMessage`]: an unterminated group is
    /// corrupt input rather than a caller mistake, and skipping the same group
    /// fails the same way.
    pub fn check_last_tag_was(&self, expected: u32) -> Result<()> {
        if self.last_tag == expected {
            Ok(())
        } else if self.last_tag == 0 {
            Err(Error::TruncatedMessage)
        } else {
            Err(Error::MismatchedEndGroup)
        }
    }

    fn read_raw_byte(&mut self) -> Result<u8> {
        if self.buffer_pos == self.buffer_size {
            self.refill_buffer(true)?;
        }
        let byte = self.input.bytes()[self.buffer_pos];
        self.buffer_pos += 1;
        Ok(byte)
    }

    fn read_raw_into(&mut self, dst: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        loop {
            let take = (dst.len() - filled).min(self.available());
            let start = self.buffer_pos;
            dst[filled..filled + take].copy_from_slice(&self.input.bytes()[start..start + take]);
            self.buffer_pos += take;
            filled += take;
            if filled == dst.len() {
                return Ok(());
            }
            self.refill_buffer(true)?;
        }
    }

    /// Reads `size` bytes that do not fit in the current buffer.
    ///
    /// Values shorter than the refill buffer go straight into one exact
    /// allocation. Longer ones are collected per refill and joined once the
    /// last byte has arrived, so a huge declared length allocates nothing
    /// the source does not deliver.
    fn read_raw_bytes_slow(&mut self, size: usize) -> Result<Vec<u8>> {
        if let Some(until_limit) = self.bytes_until_limit() {
            if size > until_limit {
                return Err(Error::TruncatedMessage);
            }
        }
        if !self.is_stream() {
            if self.input.bytes().len() > self.config.size_limit {
                return Err(Error::size_limit(self.config.size_limit));
            }
            return Err(Error::TruncatedMessage);
        }

        if size < self.input.bytes().len() {
            let mut out = vec![0u8; size];
            self.read_raw_into(&mut out)?;
            return Ok(out);
        }

        let mut chunks = Vec::new();
        let mut collected = 0;
        loop {
            let take = (size - collected).min(self.available());
            if take > 0 {
                let start = self.buffer_pos;
                chunks.push(self.input.bytes()[start..start + take].to_vec());
                self.buffer_pos += take;
                collected += take;
            }
            if collected == size {
                break;
            }
            self.refill_buffer(true)?;
        }

        trace!(size, chunks = chunks.len(), "joined large value");
        let mut out = Vec::with_capacity(size);
        for chunk in &chunks {
            out.extend_from_slice(chunk);
        }
        Ok(out)
    }

    fn read_raw_bytes(&mut self, size: usize) -> Result<Vec<u8>> {
        if size <= self.available() {
            let start = self.buffer_pos;
            self.buffer_pos += size;
            return Ok(self.input.bytes()[start..start + size].to_vec());
        }
        self.read_raw_bytes_slow(size)
    }

    fn skip_raw_bytes(&mut self, size: usize) -> Result<()> {
        if let Some(until_limit) = self.bytes_until_limit() {
            if size > until_limit {
                return Err(Error::TruncatedMessage);
            }
        }
        let mut remaining = size;
        loop {
            let take = remaining.min(self.available());
            self.buffer_pos += take;
            remaining -= take;
            if remaining == 0 {
                return Ok(());
            }
            self.refill_buffer(true)?;
        }
    }

    /// Reads a raw varint of up to 64 bits
    pub fn read_varint64(&mut self) -> Result<u64> {
        let remaining = self.remaining();
        if !remaining.is_empty() {
            match decode_varint(remaining) {
                Ok((value, len)) => {
                    self.buffer_pos += len;
                    return Ok(value);
                }
                // The varint straddles the end of the buffer
                Err(Error::TruncatedMessage) => {}
                Err(e) => return Err(e),
            }
        }
        self.read_varint64_slow()
    }

    fn read_varint64_slow(&mut self) -> Result<u64> {
        let mut result = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.read_raw_byte()?;
            result |= u64::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(Error::MalformedVarint)
    }

    /// Reads a raw varint, keeping only the low 32 bits of longer encodings
    pub fn read_varint32(&mut self) -> Result<u32> {
        Ok(self.read_varint64()? as u32)
    }

    /// Reads a little-endian 32-bit value
    pub fn read_fixed32(&mut self) -> Result<u32> {
        let mut bytes = [0u8; FIXED32_SIZE];
        self.read_raw_into(&mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Reads a little-endian 64-bit value
    pub fn read_fixed64(&mut self) -> Result<u64> {
        let mut bytes = [0u8; FIXED64_SIZE];
        self.read_raw_into(&mut bytes)?;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Reads a `double` field value
    pub fn read_double(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_fixed64()?))
    }

    /// Reads a `float` field value
    pub fn read_float(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_fixed32()?))
    }

    /// Reads an `int32` field value
    pub fn read_int32(&mut self) -> Result<i32> {
        Ok(self.read_varint32()? as i32)
    }

    /// Reads an `int64` field value
    pub fn read_int64(&mut self) -> Result<i64> {
        Ok(self.read_varint64()? as i64)
    }

    /// Reads a `uint32` field value
    pub fn read_uint32(&mut self) -> Result<u32> {
        self.read_varint32()
    }

    /// Reads a `uint64` field value
    pub fn read_uint64(&mut self) -> Result<u64> {
        self.read_varint64()
    }

    /// Reads a ZigZag-encoded `sint32` field value
    pub fn read_sint32(&mut self) -> Result<i32> {
        Ok(decode_zigzag32(self.read_varint32()?))
    }

    /// Reads a ZigZag-encoded `sint64` field value
    pub fn read_sint64(&mut self) -> Result<i64> {
        Ok(decode_zigzag64(self.read_varint64()?))
    }

    /// Reads an `sfixed32` field value
    pub fn read_sfixed32(&mut self) -> Result<i32> {
        Ok(self.read_fixed32()? as i32)
    }

    /// Reads an `sfixed64` field value
    pub fn read_sfixed64(&mut self) -> Result<i64> {
        Ok(self.read_fixed64()? as i64)
    }

    /// Reads a `bool` field value
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_varint64()? != 0)
    }

    /// Reads an enum value as its raw number
    pub fn read_enum(&mut self) -> Result<i32> {
        self.read_int32()
    }

    /// Reads the length prefix of a length-delimited field
    pub fn read_length(&mut self) -> Result<usize> {
        let length = self.read_varint32()? as i32;
        if length < 0 {
            return Err(Error::NegativeSize);
        }
        Ok(length as usize)
    }

    /// Reads a length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<String> {
        let length = self.read_length()?;
        if length == 0 {
            return Ok(String::new());
        }
        let bytes = self.read_raw_bytes(length)?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Reads a length-prefixed byte string
    pub fn read_bytes(&mut self) -> Result<ByteBuffer> {
        let length = self.read_length()?;
        if length <= self.available() {
            let start = self.buffer_pos;
            self.buffer_pos += length;
            let range = start..start + length;
            return Ok(match &self.input {
                Input::Shared(data) => ByteBuffer::from(data.slice(range)),
                input => ByteBuffer::copy_from_slice(&input.bytes()[range]),
            });
        }
        Ok(ByteBuffer::from(self.read_raw_bytes_slow(length)?))
    }

    pub(crate) fn enter_recursion(&mut self) -> Result<()> {
        if self.recursion_depth >= self.config.recursion_limit {
            return Err(Error::recursion_limit(self.config.recursion_limit));
        }
        self.recursion_depth += 1;
        Ok(())
    }

    pub(crate) fn exit_recursion(&mut self) {
        self.recursion_depth -= 1;
    }

    /// Reads a length-delimited embedded message into `message`.
    ///
    /// The embedded message must consume exactly its declared length.
    pub fn read_message<M: Message + ?Sized>(&mut self, message: &mut M) -> Result<()> {
        let length = self.read_length()?;
        self.enter_recursion()?;
        let old_limit = self.push_limit(length)?;
        message.merge_from(self)?;
        // merge stopped on an end-group tag with no open group
        if self.last_tag != 0 {
            return Err(Error::MismatchedEndGroup);
        }
        if !self.reached_limit() {
            return Err(Error::TruncatedMessage);
        }
        self.exit_recursion();
        self.pop_limit(old_limit);
        Ok(())
    }

    /// Reads a group into `message`. The start-group tag must be the last
    /// tag read; the group must be closed by the matching end-group tag.
    pub fn read_group<M: Message + ?Sized>(&mut self, message: &mut M) -> Result<()> {
        let start_tag = self.last_tag;
        if start_tag == 0 || tag_wire_type(start_tag)? != WireType::StartGroup {
            return Err(Error::misuse("read_group called without a start-group tag"));
        }
        self.enter_recursion()?;
        message.merge_from(self)?;
        self.check_last_tag_was(make_tag(tag_field_number(start_tag), WireType::EndGroup))?;
        self.exit_recursion();
        Ok(())
    }

    /// Discards the payload of the field whose tag was just read
    pub fn skip_last_field(&mut self) -> Result<()> {
        let tag = self.last_tag;
        if tag == 0 {
            return Err(Error::misuse("skip_last_field called before reading a tag"));
        }
        trace!(tag, "skipping field");
        match tag_wire_type(tag)? {
            WireType::Varint => {
                self.read_varint64()?;
            }
            WireType::Fixed64 => self.skip_raw_bytes(FIXED64_SIZE)?,
            WireType::LengthDelimited => {
                let length = self.read_length()?;
                self.skip_raw_bytes(length)?;
            }
            WireType::StartGroup => self.skip_group(tag)?,
            WireType::EndGroup => return Err(Error::MismatchedEndGroup),
            WireType::Fixed32 => self.skip_raw_bytes(FIXED32_SIZE)?,
        }
        Ok(())
    }

    fn skip_group(&mut self, start_tag: u32) -> Result<()> {
        self.enter_recursion()?;
        let end_tag = loop {
            let tag = self.read_tag()?;
            if tag == 0 {
                return Err(Error::TruncatedMessage);
            }
            if tag_wire_type(tag)? == WireType::EndGroup {
                break tag;
            }
            self.skip_last_field()?;
        };
        if tag_field_number(end_tag) != tag_field_number(start_tag) {
            return Err(Error::MismatchedEndGroup);
        }
        self.exit_recursion();
        Ok(())
    }
}

impl std::fmt::Debug for CodedReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodedReader")
            .field("position", &self.position())
            .field("current_limit", &self.current_limit)
            .field("last_tag", &self.last_tag)
            .field("pending_tag", &self.pending_tag)
            .field("recursion_depth", &self.recursion_depth)
            .finish_non_exhaustive()
    }
}
