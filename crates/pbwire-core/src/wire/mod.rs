//! Protobuf wire format primitives.
//!
//! Each protobuf field is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 3/4: SGROUP/EGROUP (deprecated groups)
//! - 5: I32 (fixed32, sfixed32, float)
//!
//! This module also holds the encoded-size calculators used by the two-pass
//! writer: sizes compose bottom-up, so every length prefix is computed from
//! these before any nested bytes are emitted.

mod varint;

use crate::error::{Error, Result};
use crate::message::Message;

pub use varint::{
    decode_varint, decode_zigzag32, decode_zigzag64, encode_varint, encode_zigzag32,
    encode_zigzag64, varint_len, MAX_VARINT_LEN,
};

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    Fixed64 = 1,
    /// Length-delimited (strings, bytes, embedded messages, packed fields)
    LengthDelimited = 2,
    /// Start group (deprecated)
    StartGroup = 3,
    /// End group (deprecated)
    EndGroup = 4,
    /// 32-bit fixed-width
    Fixed32 = 5,
}

impl WireType {
    /// Returns the short name used in dumps
    pub fn as_str(&self) -> &'static str {
        match self {
            WireType::Varint => "varint",
            WireType::Fixed64 => "fixed64",
            WireType::LengthDelimited => "len",
            WireType::StartGroup => "sgroup",
            WireType::EndGroup => "egroup",
            WireType::Fixed32 => "fixed32",
        }
    }
}

impl std::fmt::Display for WireType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u32> for WireType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Fixed32),
            _ => Err(Error::invalid_wire_type(value)),
        }
    }
}

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;

/// Number of low tag bits holding the wire type
pub const TAG_TYPE_BITS: u32 = 3;

const TAG_TYPE_MASK: u32 = (1 << TAG_TYPE_BITS) - 1;

/// Encoded size of a fixed32, sfixed32 or float value
pub const FIXED32_SIZE: usize = 4;

/// Encoded size of a fixed64, sfixed64 or double value
pub const FIXED64_SIZE: usize = 8;

/// Builds a tag from a field number and wire type.
#[inline]
pub const fn make_tag(field_number: u32, wire_type: WireType) -> u32 {
    (field_number << TAG_TYPE_BITS) | wire_type as u32
}

/// Extracts the field number from a tag.
#[inline]
pub const fn tag_field_number(tag: u32) -> u32 {
    tag >> TAG_TYPE_BITS
}

/// Extracts the wire type from a tag.
#[inline]
pub fn tag_wire_type(tag: u32) -> Result<WireType> {
    WireType::try_from(tag & TAG_TYPE_MASK)
}

/// Size of a tag for the given field number.
#[inline]
pub fn size_tag(field_number: u32) -> usize {
    varint_len(u64::from(make_tag(field_number, WireType::Varint)))
}

/// Size of an unsigned 32-bit varint.
#[inline]
pub fn size_varint32(value: u32) -> usize {
    varint_len(u64::from(value))
}

/// Size of an unsigned 64-bit varint.
#[inline]
pub fn size_varint64(value: u64) -> usize {
    varint_len(value)
}

/// Size of an int32; negative values are sign-extended to ten bytes.
#[inline]
pub fn size_int32(value: i32) -> usize {
    if value >= 0 {
        size_varint32(value as u32)
    } else {
        MAX_VARINT_LEN
    }
}

/// Size of an int64.
#[inline]
pub fn size_int64(value: i64) -> usize {
    varint_len(value as u64)
}

/// Size of a ZigZag-encoded sint32.
#[inline]
pub fn size_sint32(value: i32) -> usize {
    size_varint32(encode_zigzag32(value))
}

/// Size of a ZigZag-encoded sint64.
#[inline]
pub fn size_sint64(value: i64) -> usize {
    varint_len(encode_zigzag64(value))
}

/// Size of a bool.
#[inline]
pub fn size_bool(_value: bool) -> usize {
    1
}

/// Size of a length prefix.
#[inline]
pub fn size_length(length: usize) -> usize {
    varint_len(length as u64)
}

/// Size of a length-prefixed UTF-8 string.
#[inline]
pub fn size_string(value: &str) -> usize {
    size_length(value.len()) + value.len()
}

/// Size of a length-prefixed byte string.
#[inline]
pub fn size_bytes(value: &[u8]) -> usize {
    size_length(value.len()) + value.len()
}

/// Size of an embedded message including its length prefix.
pub fn size_message<M: Message + ?Sized>(message: &M) -> usize {
    let size = message.compute_size();
    size_length(size) + size
}

/// Size of a group body. The surrounding tags are not included.
pub fn size_group<M: Message + ?Sized>(message: &M) -> usize {
    message.compute_size()
}
