//! The contract every message-shaped value implements.
//!
//! Encoding is two-pass: a writer emits the length prefix of an embedded
//! message before its fields, so [`Message::compute_size`] has to be callable
//! any number of times before [`Message::write_to`] without changing the
//! result. Whether an implementation caches the size is up to it.

use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::io::{CodedReader, CodedWriter, ReaderConfig};

/// A value encoded as a sequence of tagged fields.
pub trait Message {
    /// Merges fields read from `reader` into `self`.
    ///
    /// Implementations read tags until [`CodedReader::read_tag`] returns 0 or
    /// an end-group tag is seen (left as [`CodedReader::last_tag`] for the
    /// caller to check). Fields the message does not know should go to an
    /// [`UnknownFieldSet`](crate::UnknownFieldSet) or be skipped with
    /// [`CodedReader::skip_last_field`].
    fn merge_from(&mut self, reader: &mut CodedReader<'_>) -> Result<()>;

    /// Number of bytes [`write_to`](Self::write_to) will produce.
    ///
    /// Must be deterministic and idempotent.
    fn compute_size(&self) -> usize;

    /// Writes all fields to `writer`.
    fn write_to(&self, writer: &mut CodedWriter<'_>) -> Result<()>;

    /// Merges a complete encoded message held in `data`
    fn merge_from_slice(&mut self, data: &[u8]) -> Result<()>
    where
        Self: Sized,
    {
        let mut reader = CodedReader::new(data);
        merge_top_level(self, &mut reader)
    }

    /// Decodes a complete encoded message
    fn decode(data: &[u8]) -> Result<Self>
    where
        Self: Default + Sized,
    {
        let mut message = Self::default();
        message.merge_from_slice(data)?;
        Ok(message)
    }

    /// Decodes a complete encoded message using custom reader limits
    fn decode_with_config(data: &[u8], config: ReaderConfig) -> Result<Self>
    where
        Self: Default + Sized,
    {
        let mut message = Self::default();
        let mut reader = CodedReader::new(data).with_config(config);
        merge_top_level(&mut message, &mut reader)?;
        Ok(message)
    }

    /// Decodes a message from a stream, reading it to the end
    fn decode_from<R: Read>(source: R) -> Result<Self>
    where
        Self: Default + Sized,
    {
        Self::decode_from_with_config(source, ReaderConfig::default())
    }

    /// Decodes a message from a stream using custom reader limits
    fn decode_from_with_config<R: Read>(source: R, config: ReaderConfig) -> Result<Self>
    where
        Self: Default + Sized,
    {
        let mut message = Self::default();
        let mut reader = CodedReader::from_reader(source).with_config(config);
        merge_top_level(&mut message, &mut reader)?;
        Ok(message)
    }

    /// Encodes the message into a new vector
    fn encode_to_vec(&self) -> Result<Vec<u8>>
    where
        Self: Sized,
    {
        let mut writer = CodedWriter::with_capacity(self.compute_size());
        self.write_to(&mut writer)?;
        writer.into_vec()
    }

    /// Encodes the message into a sink
    fn encode_to<W: Write>(&self, sink: W) -> Result<()>
    where
        Self: Sized,
    {
        let mut writer = CodedWriter::from_writer(sink);
        self.write_to(&mut writer)?;
        writer.flush()
    }

    /// Encodes the message preceded by its length as a varint, so several
    /// messages can share one stream
    fn encode_length_delimited_to<W: Write>(&self, sink: W) -> Result<()>
    where
        Self: Sized,
    {
        let mut writer = CodedWriter::from_writer(sink);
        writer.write_message(self)?;
        writer.flush()
    }

    /// Merges one message written by
    /// [`encode_length_delimited_to`](Self::encode_length_delimited_to).
    ///
    /// Returns `Ok(false)` if the stream ends cleanly before the length
    /// prefix. Exactly the prefix and the message bytes are consumed from
    /// `source`.
    fn merge_length_delimited_from<R: Read>(&mut self, source: &mut R) -> Result<bool>
    where
        Self: Sized,
    {
        self.merge_length_delimited_from_with_config(source, ReaderConfig::default())
    }

    /// Like [`merge_length_delimited_from`](Self::merge_length_delimited_from),
    /// with custom reader limits applied to the message body
    fn merge_length_delimited_from_with_config<R: Read>(
        &mut self,
        source: &mut R,
        config: ReaderConfig,
    ) -> Result<bool>
    where
        Self: Sized,
    {
        let Some(length) = read_length_prefix(source)? else {
            return Ok(false);
        };
        let mut reader =
            CodedReader::from_reader(source.by_ref().take(length as u64)).with_config(config);
        let old_limit = reader.push_limit(length)?;
        merge_top_level(self, &mut reader)?;
        if !reader.reached_limit() {
            return Err(Error::TruncatedMessage);
        }
        reader.pop_limit(old_limit);
        Ok(true)
    }

    /// Reads the next length-delimited message, or `None` at a clean end of
    /// the stream
    fn decode_length_delimited<R: Read>(source: &mut R) -> Result<Option<Self>>
    where
        Self: Default + Sized,
    {
        Self::decode_length_delimited_with_config(source, ReaderConfig::default())
    }

    /// Like [`decode_length_delimited`](Self::decode_length_delimited), with
    /// custom reader limits
    fn decode_length_delimited_with_config<R: Read>(
        source: &mut R,
        config: ReaderConfig,
    ) -> Result<Option<Self>>
    where
        Self: Default + Sized,
    {
        let mut message = Self::default();
        if message.merge_length_delimited_from_with_config(source, config)? {
            Ok(Some(message))
        } else {
            Ok(None)
        }
    }
}

impl<M: Message + ?Sized> Message for Box<M> {
    fn merge_from(&mut self, reader: &mut CodedReader<'_>) -> Result<()> {
        (**self).merge_from(reader)
    }

    fn compute_size(&self) -> usize {
        (**self).compute_size()
    }

    fn write_to(&self, writer: &mut CodedWriter<'_>) -> Result<()> {
        (**self).write_to(writer)
    }
}

fn merge_top_level<M: Message + ?Sized>(message: &mut M, reader: &mut CodedReader<'_>) -> Result<()> {
    message.merge_from(reader)?;
    // merge stopped on an end-group tag outside of any group
    if reader.last_tag() != 0 {
        return Err(Error::MismatchedEndGroup);
    }
    Ok(())
}

/// Reads a varint length prefix one byte at a time so nothing beyond it is
/// taken from the source.
fn read_length_prefix<R: Read>(source: &mut R) -> Result<Option<usize>> {
    let mut result = 0u64;
    for i in 0..crate::wire::MAX_VARINT_LEN {
        let mut byte = [0u8; 1];
        let read = loop {
            match source.read(&mut byte) {
                Ok(n) => break n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if read == 0 {
            return if i == 0 {
                Ok(None)
            } else {
                Err(Error::TruncatedMessage)
            };
        }
        result |= u64::from(byte[0] & 0x7F) << (7 * i);
        if byte[0] & 0x80 == 0 {
            let length = result as u32 as i32;
            if length < 0 {
                return Err(Error::NegativeSize);
            }
            return Ok(Some(length as usize));
        }
    }
    Err(Error::MalformedVarint)
}
