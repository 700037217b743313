//! Streaming encoder for the protobuf wire format.
//!
//! [`CodedWriter`] appends encoded bytes to growable memory, to a fixed
//! caller-provided slice, or to any [`Write`] sink through an internal
//! buffer. Embedded messages are written with their length prefix first, so
//! the writer relies on [`Message::compute_size`] being available before any
//! nested byte is emitted.

use std::io::Write;

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::{Error, Result};
use crate::message::Message;
use crate::wire::{
    encode_varint, encode_zigzag32, encode_zigzag64, make_tag, WireType, MAX_VARINT_LEN,
};

use super::reader::DEFAULT_BUFFER_SIZE;

/// Configuration for the writer
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Capacity of the internal buffer used for sink output
    pub buffer_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl WriterConfig {
    /// Creates a new writer config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the internal buffer capacity (at least one byte)
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }
}

enum Output<'a> {
    Memory(BytesMut),
    Slice {
        buffer: &'a mut [u8],
        position: usize,
    },
    Stream {
        sink: Box<dyn Write + 'a>,
        buffer: Vec<u8>,
        capacity: usize,
        flushed: usize,
    },
}

/// Encoder for protobuf-encoded data.
///
/// Sink output is buffered; call [`flush`](Self::flush) to observe errors.
/// Dropping the writer flushes on a best-effort basis, like
/// [`std::io::BufWriter`]. An owned sink is dropped with the writer, a
/// borrowed one (`&mut sink`) stays open.
pub struct CodedWriter<'a> {
    output: Output<'a>,
}

impl CodedWriter<'static> {
    /// Creates a writer accumulating into growable memory
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a memory writer with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            output: Output::Memory(BytesMut::with_capacity(capacity)),
        }
    }
}

impl Default for CodedWriter<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> CodedWriter<'a> {
    /// Creates a writer filling a fixed slice; overflowing it fails with
    /// [`Error::OutOfSpace`]
    pub fn with_slice(buffer: &'a mut [u8]) -> Self {
        Self {
            output: Output::Slice {
                buffer,
                position: 0,
            },
        }
    }

    /// Creates a writer pushing to `sink` through an internal buffer
    pub fn from_writer(sink: impl Write + 'a) -> Self {
        Self {
            output: Output::Stream {
                sink: Box::new(sink),
                buffer: Vec::with_capacity(DEFAULT_BUFFER_SIZE),
                capacity: DEFAULT_BUFFER_SIZE,
                flushed: 0,
            },
        }
    }

    /// Applies a custom configuration. Only sink output is affected.
    pub fn with_config(mut self, config: WriterConfig) -> Self {
        if let Output::Stream {
            buffer, capacity, ..
        } = &mut self.output
        {
            *capacity = config.buffer_size.max(1);
            buffer.reserve(capacity.saturating_sub(buffer.len()));
        }
        self
    }

    /// Total number of bytes written so far
    pub fn position(&self) -> usize {
        match &self.output {
            Output::Memory(data) => data.len(),
            Output::Slice { position, .. } => *position,
            Output::Stream {
                buffer, flushed, ..
            } => flushed + buffer.len(),
        }
    }

    /// Bytes left in a fixed slice, `None` for growable output
    pub fn space_left(&self) -> Option<usize> {
        match &self.output {
            Output::Slice { buffer, position } => Some(buffer.len() - position),
            _ => None,
        }
    }

    /// Verifies that a fixed slice was filled exactly
    pub fn check_no_space_left(&self) -> Result<()> {
        match self.space_left() {
            Some(0) => Ok(()),
            Some(left) => Err(Error::misuse(format!(
                "{} bytes left unwritten in the output slice",
                left
            ))),
            None => Err(Error::misuse(
                "check_no_space_left is only meaningful for slice output",
            )),
        }
    }

    /// Returns the accumulated bytes of a memory writer
    pub fn into_bytes(mut self) -> Result<Bytes> {
        match std::mem::replace(&mut self.output, Output::Memory(BytesMut::new())) {
            Output::Memory(data) => Ok(data.freeze()),
            other => {
                self.output = other;
                Err(Error::misuse("into_bytes called on a writer without memory output"))
            }
        }
    }

    /// Returns the accumulated bytes of a memory writer as a vector
    pub fn into_vec(self) -> Result<Vec<u8>> {
        Ok(self.into_bytes()?.into())
    }

    /// Pushes buffered bytes to the sink and flushes it
    pub fn flush(&mut self) -> Result<()> {
        if let Output::Stream {
            sink,
            buffer,
            flushed,
            ..
        } = &mut self.output
        {
            drain_buffer(sink, buffer, flushed)?;
            sink.flush()?;
        }
        Ok(())
    }

    /// Writes bytes verbatim, without any prefix
    pub fn write_raw_bytes(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.output {
            Output::Memory(out) => {
                out.extend_from_slice(data);
                Ok(())
            }
            Output::Slice { buffer, position } => {
                let end = *position + data.len();
                if end > buffer.len() {
                    return Err(Error::OutOfSpace);
                }
                buffer[*position..end].copy_from_slice(data);
                *position = end;
                Ok(())
            }
            Output::Stream {
                sink,
                buffer,
                capacity,
                flushed,
            } => {
                if buffer.len() + data.len() > *capacity {
                    drain_buffer(sink, buffer, flushed)?;
                    if data.len() >= *capacity {
                        sink.write_all(data)?;
                        *flushed += data.len();
                        return Ok(());
                    }
                }
                buffer.extend_from_slice(data);
                Ok(())
            }
        }
    }

    /// Writes a raw varint of up to 64 bits
    pub fn write_varint64(&mut self, value: u64) -> Result<()> {
        let mut buf = [0u8; MAX_VARINT_LEN];
        let len = encode_varint(value, &mut buf);
        self.write_raw_bytes(&buf[..len])
    }

    /// Writes a raw 32-bit varint
    pub fn write_varint32(&mut self, value: u32) -> Result<()> {
        self.write_varint64(u64::from(value))
    }

    /// Writes a tag for the given field number and wire type
    pub fn write_tag(&mut self, field_number: u32, wire_type: WireType) -> Result<()> {
        self.write_varint32(make_tag(field_number, wire_type))
    }

    /// Writes an already-built tag
    pub fn write_raw_tag(&mut self, tag: u32) -> Result<()> {
        self.write_varint32(tag)
    }

    /// Writes a little-endian 32-bit value
    pub fn write_fixed32(&mut self, value: u32) -> Result<()> {
        self.write_raw_bytes(&value.to_le_bytes())
    }

    /// Writes a little-endian 64-bit value
    pub fn write_fixed64(&mut self, value: u64) -> Result<()> {
        self.write_raw_bytes(&value.to_le_bytes())
    }

    /// Writes a `double` field value
    pub fn write_double(&mut self, value: f64) -> Result<()> {
        self.write_fixed64(value.to_bits())
    }

    /// Writes a `float` field value
    pub fn write_float(&mut self, value: f32) -> Result<()> {
        self.write_fixed32(value.to_bits())
    }

    /// Writes an `int32` field value; negative values take ten bytes
    pub fn write_int32(&mut self, value: i32) -> Result<()> {
        if value >= 0 {
            self.write_varint32(value as u32)
        } else {
            self.write_varint64(i64::from(value) as u64)
        }
    }

    /// Writes an `int64` field value
    pub fn write_int64(&mut self, value: i64) -> Result<()> {
        self.write_varint64(value as u64)
    }

    /// Writes a `uint32` field value
    pub fn write_uint32(&mut self, value: u32) -> Result<()> {
        self.write_varint32(value)
    }

    /// Writes a `uint64` field value
    pub fn write_uint64(&mut self, value: u64) -> Result<()> {
        self.write_varint64(value)
    }

    /// Writes a ZigZag-encoded `sint32` field value
    pub fn write_sint32(&mut self, value: i32) -> Result<()> {
        self.write_varint32(encode_zigzag32(value))
    }

    /// Writes a ZigZag-encoded `sint64` field value
    pub fn write_sint64(&mut self, value: i64) -> Result<()> {
        self.write_varint64(encode_zigzag64(value))
    }

    /// Writes an `sfixed32` field value
    pub fn write_sfixed32(&mut self, value: i32) -> Result<()> {
        self.write_fixed32(value as u32)
    }

    /// Writes an `sfixed64` field value
    pub fn write_sfixed64(&mut self, value: i64) -> Result<()> {
        self.write_fixed64(value as u64)
    }

    /// Writes a `bool` field value
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_raw_bytes(&[u8::from(value)])
    }

    /// Writes an enum value as its raw number
    pub fn write_enum(&mut self, value: i32) -> Result<()> {
        self.write_int32(value)
    }

    /// Writes the length prefix of a length-delimited field
    pub fn write_length(&mut self, length: usize) -> Result<()> {
        let length = u32::try_from(length)
            .ok()
            .filter(|&len| len <= i32::MAX as u32)
            .ok_or_else(|| Error::misuse("length-delimited field larger than 2 GiB"))?;
        self.write_varint32(length)
    }

    /// Writes a length-prefixed UTF-8 string
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Writes a length-prefixed byte string
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_length(value.len())?;
        self.write_raw_bytes(value)
    }

    /// Writes an embedded message: its size, then its fields.
    ///
    /// The size comes from [`Message::compute_size`], which must agree with
    /// what [`Message::write_to`] emits.
    pub fn write_message<M: Message + ?Sized>(&mut self, message: &M) -> Result<()> {
        self.write_length(message.compute_size())?;
        message.write_to(self)
    }

    /// Writes a group body followed by its end-group tag. The start-group
    /// tag is written by the caller.
    pub fn write_group<M: Message + ?Sized>(
        &mut self,
        field_number: u32,
        message: &M,
    ) -> Result<()> {
        message.write_to(self)?;
        self.write_tag(field_number, WireType::EndGroup)
    }
}

fn drain_buffer<W: Write + ?Sized>(
    sink: &mut W,
    buffer: &mut Vec<u8>,
    flushed: &mut usize,
) -> Result<()> {
    if !buffer.is_empty() {
        sink.write_all(buffer)?;
        *flushed += buffer.len();
        debug!(bytes = buffer.len(), total = *flushed, "flushed writer buffer");
        buffer.clear();
    }
    Ok(())
}

impl Drop for CodedWriter<'_> {
    fn drop(&mut self) {
        if matches!(self.output, Output::Stream { .. }) {
            let _ = self.flush();
        }
    }
}

impl std::fmt::Debug for CodedWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.output {
            Output::Memory(_) => "memory",
            Output::Slice { .. } => "slice",
            Output::Stream { .. } => "stream",
        };
        f.debug_struct("CodedWriter")
            .field("output", &kind)
            .field("position", &self.position())
            .finish()
    }
}
