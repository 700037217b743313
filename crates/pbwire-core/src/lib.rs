//! # pbwire-core
//!
//! A runtime codec for the Protocol Buffers binary wire format.
//!
//! This crate provides the pieces generated message code builds on:
//! - Streaming decoding with nested length limits, lookahead and
//!   recursion/size guards ([`CodedReader`])
//! - Buffered encoding to memory, fixed slices or any [`std::io::Write`]
//!   ([`CodedWriter`])
//! - Per-field codecs and a growable container for repeated fields
//!   ([`FieldCodec`], [`RepeatedField`])
//! - Preservation of unrecognised fields ([`UnknownFieldSet`])
//! - A bridge from compiled `.proto` descriptors to field layouts
//!   ([`schema`])
//!
//! ## Architecture
//!
//! - [`wire`]: Tags, wire types, varint/ZigZag primitives and size calculators
//! - [`io`]: The coded reader and writer
//! - [`message`]: The [`Message`] trait
//! - [`codec`], [`repeated`], [`unknown`]: Field-level building blocks
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```
//! use pbwire_core::{Message, UnknownFieldSet};
//!
//! // field 1 = 150, field 2 = "hi"
//! let data = [0x08, 0x96, 0x01, 0x12, 0x02, b'h', b'i'];
//!
//! let fields = UnknownFieldSet::decode(&data)?;
//! assert_eq!(fields.get(1).unwrap().varints(), &[150]);
//! assert_eq!(fields.encode_to_vec()?, data);
//! # Ok::<(), pbwire_core::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod buffer;
pub mod codec;
pub mod error;
pub mod io;
pub mod message;
pub mod repeated;
pub mod schema;
pub mod unknown;
pub mod wire;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience
pub use buffer::ByteBuffer;
pub use codec::{FieldCodec, FieldType};
pub use error::{Error, Result};
pub use io::{CodedReader, CodedWriter, ReaderConfig, WriterConfig};
pub use message::Message;
pub use repeated::RepeatedField;
pub use schema::{FieldLayout, MessageLayout, Syntax};
pub use unknown::{UnknownField, UnknownFieldSet, WireValues};
pub use wire::{WireType, MAX_FIELD_NUMBER};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
