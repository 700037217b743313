//! Error types for the pbwire-core library.
//!
//! Every failure in the codec surfaces as a variant of [`Error`]. None of them
//! are recovered internally: a decode or encode call that hits one of these
//! aborts and hands it to the caller.

use std::string::FromUtf8Error;
use thiserror::Error;

/// Result type alias for pbwire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all codec operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Input ended before a declared length, limit or varint was satisfied
    #[error("message truncated: input ended in the middle of a field or a length was misreported")]
    TruncatedMessage,

    /// A varint ran past the maximum of ten bytes without terminating
    #[error("malformed varint: no terminating byte within 10 bytes")]
    MalformedVarint,

    /// A tag with field number zero was read
    #[error("invalid tag {tag:#x}: field number must be at least 1")]
    InvalidTag {
        /// The raw tag value
        tag: u32,
    },

    /// A field number outside 1..=2^29-1
    #[error("invalid field number {number}: must be between 1 and {max}")]
    InvalidFieldNumber {
        /// The offending field number
        number: u32,
        /// The largest valid field number
        max: u32,
    },

    /// A tag carried one of the unused wire types 6 or 7
    #[error("invalid wire type {value}")]
    InvalidWireType {
        /// The low three bits of the tag
        value: u32,
    },

    /// A length prefix decoded to a negative number
    #[error("negative size in length-delimited field")]
    NegativeSize,

    /// Nested messages or groups went deeper than allowed
    #[error("recursion limit of {limit} exceeded")]
    RecursionLimitExceeded {
        /// The configured maximum depth
        limit: usize,
    },

    /// The input grew past the configured size ceiling
    #[error("size limit of {limit} bytes exceeded")]
    SizeLimitExceeded {
        /// The configured maximum size
        limit: usize,
    },

    /// An end-group tag did not close the group that was open
    #[error("end-group tag does not match an open start-group tag")]
    MismatchedEndGroup,

    /// A string field did not hold valid UTF-8
    #[error("string field is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),

    /// A fixed output slice ran out of room
    #[error("out of space: the output buffer is full")]
    OutOfSpace,

    /// Index passed to a repeated field operation was out of bounds
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Current length
        len: usize,
    },

    /// The underlying byte source or sink failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse descriptor bytes
    #[error("failed to parse descriptor: {0}")]
    DescriptorParse(#[from] prost::DecodeError),

    /// A descriptor named a field type the codec cannot bind
    #[error("unsupported field type: {0}")]
    UnsupportedFieldType(String),

    /// A descriptor declared a syntax other than proto2 or proto3
    #[error("unsupported syntax: {syntax}")]
    UnsupportedSyntax {
        /// The declared syntax string
        syntax: String,
    },

    /// The API was used out of order
    #[error("misuse: {0}")]
    Misuse(String),
}

impl Error {
    /// Creates a new invalid tag error
    pub fn invalid_tag(tag: u32) -> Self {
        Self::InvalidTag { tag }
    }

    /// Creates a new invalid field number error
    pub fn invalid_field_number(number: u32) -> Self {
        Self::InvalidFieldNumber {
            number,
            max: crate::wire::MAX_FIELD_NUMBER,
        }
    }

    /// Creates a new invalid wire type error
    pub fn invalid_wire_type(value: u32) -> Self {
        Self::InvalidWireType { value }
    }

    /// Creates a new recursion limit error
    pub fn recursion_limit(limit: usize) -> Self {
        Self::RecursionLimitExceeded { limit }
    }

    /// Creates a new size limit error
    pub fn size_limit(limit: usize) -> Self {
        Self::SizeLimitExceeded { limit }
    }

    /// Creates a new misuse error
    pub fn misuse(msg: impl Into<String>) -> Self {
        Self::Misuse(msg.into())
    }

    /// Creates a new unsupported field type error
    pub fn unsupported_field_type(name: impl Into<String>) -> Self {
        Self::UnsupportedFieldType(name.into())
    }

    /// Returns true if the error was caused by corrupt or hostile input
    /// rather than by I/O or API misuse
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::TruncatedMessage
                | Self::MalformedVarint
                | Self::InvalidTag { .. }
                | Self::InvalidWireType { .. }
                | Self::NegativeSize
                | Self::RecursionLimitExceeded { .. }
                | Self::SizeLimitExceeded { .. }
                | Self::MismatchedEndGroup
                | Self::InvalidUtf8(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::recursion_limit(64);
        assert!(err.to_string().contains("recursion limit"));
        assert!(err.to_string().contains("64"));

        let err = Error::invalid_tag(0x02);
        assert!(err.to_string().contains("0x2"));
    }

    #[test]
    fn test_is_malformed_input() {
        assert!(Error::TruncatedMessage.is_malformed_input());
        assert!(Error::size_limit(10).is_malformed_input());
        assert!(!Error::misuse("refill").is_malformed_input());
        assert!(!Error::OutOfSpace.is_malformed_input());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
