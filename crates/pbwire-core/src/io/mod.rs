//! Coded input and output streams.
//!
//! - [`CodedReader`]: decodes tags and values from memory or a [`std::io::Read`]
//! - [`CodedWriter`]: encodes tags and values to memory or a [`std::io::Write`]
//!
//! Both are scoped to one encode/decode call (or one stream session) and
//! carry mutable cursor state, so they are used through `&mut` only.

mod reader;
mod writer;

pub use reader::{
    CodedReader, ReaderConfig, DEFAULT_BUFFER_SIZE, DEFAULT_RECURSION_LIMIT, DEFAULT_SIZE_LIMIT,
};
pub use writer::{CodedWriter, WriterConfig};
