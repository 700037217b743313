//! Base-128 varints and the ZigZag transform.
//!
//! A varint stores seven data bits per byte, least significant group first,
//! with the high bit of every byte except the last set as a continuation
//! flag. A 64-bit value needs at most ten bytes.

use crate::error::{Error, Result};

/// Maximum encoded length of a 64-bit varint
pub const MAX_VARINT_LEN: usize = 10;

/// Encode a varint into `out`, returning the number of bytes written.
pub fn encode_varint(mut value: u64, out: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut i = 0;
    while value >= 0x80 {
        out[i] = (value as u8) | 0x80;
        value >>= 7;
        i += 1;
    }
    out[i] = value as u8;
    i + 1
}

/// Decode a varint from the given bytes.
///
/// Returns the decoded value and the number of bytes consumed. Bits beyond
/// the 64th are discarded. Running out of input is a truncation; ten bytes
/// without a terminator is a malformed varint.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in data.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return Err(Error::MalformedVarint);
        }

        result |= ((byte & 0x7F) as u64) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    if data.len() >= MAX_VARINT_LEN {
        Err(Error::MalformedVarint)
    } else {
        Err(Error::TruncatedMessage)
    }
}

/// Number of bytes needed to encode `value` as a varint.
#[inline]
pub fn varint_len(value: u64) -> usize {
    (70 - (value | 1).leading_zeros() as usize) / 7
}

/// ZigZag-encode a signed 32-bit value.
#[inline]
pub fn encode_zigzag32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// ZigZag-encode a signed 64-bit value.
#[inline]
pub fn encode_zigzag64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Inverse of [`encode_zigzag32`].
#[inline]
pub fn decode_zigzag32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

/// Inverse of [`encode_zigzag64`].
#[inline]
pub fn decode_zigzag64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}
