//! Per-field codecs binding a tag to value readers, writers and sizers.
//!
//! A [`FieldCodec`] is built once per schema field and shared by every
//! repeated field (or map-like container) that holds values of that field.
//! Constructors are `const fn`, so generated-style code can keep codecs in
//! `const` or `static` items.

use std::fmt;

use crate::buffer::ByteBuffer;
use crate::error::Result;
use crate::io::{CodedReader, CodedWriter};
use crate::message::Message;
use crate::wire::{
    self, tag_field_number, varint_len, WireType, FIXED32_SIZE, FIXED64_SIZE,
};

/// Declared protobuf field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `double`
    Double,
    /// `float`
    Float,
    /// `int64`
    Int64,
    /// `uint64`
    UInt64,
    /// `int32`
    Int32,
    /// `fixed64`
    Fixed64,
    /// `fixed32`
    Fixed32,
    /// `bool`
    Bool,
    /// `string`
    String,
    /// `group` (deprecated)
    Group,
    /// Embedded message
    Message,
    /// `bytes`
    Bytes,
    /// `uint32`
    UInt32,
    /// Enum value
    Enum,
    /// `sfixed32`
    SFixed32,
    /// `sfixed64`
    SFixed64,
    /// `sint32`
    SInt32,
    /// `sint64`
    SInt64,
}

impl FieldType {
    /// Wire type a single value of this type is encoded with
    pub const fn wire_type(self) -> WireType {
        match self {
            FieldType::Double | FieldType::Fixed64 | FieldType::SFixed64 => WireType::Fixed64,
            FieldType::Float | FieldType::Fixed32 | FieldType::SFixed32 => WireType::Fixed32,
            FieldType::String | FieldType::Bytes | FieldType::Message => {
                WireType::LengthDelimited
            }
            FieldType::Group => WireType::StartGroup,
            FieldType::Int64
            | FieldType::UInt64
            | FieldType::Int32
            | FieldType::Bool
            | FieldType::UInt32
            | FieldType::Enum
            | FieldType::SInt32
            | FieldType::SInt64 => WireType::Varint,
        }
    }

    /// True for scalar types that may use the packed repeated encoding
    pub const fn is_packable(self) -> bool {
        !matches!(
            self,
            FieldType::String | FieldType::Bytes | FieldType::Message | FieldType::Group
        )
    }

    /// Encoded size of every value of this type, or 0 if it varies
    pub const fn fixed_size(self) -> usize {
        match self {
            FieldType::Double | FieldType::Fixed64 | FieldType::SFixed64 => FIXED64_SIZE,
            FieldType::Float | FieldType::Fixed32 | FieldType::SFixed32 => FIXED32_SIZE,
            FieldType::Bool => 1,
            _ => 0,
        }
    }

    /// Name as written in a `.proto` file
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Double => "double",
            FieldType::Float => "float",
            FieldType::Int64 => "int64",
            FieldType::UInt64 => "uint64",
            FieldType::Int32 => "int32",
            FieldType::Fixed64 => "fixed64",
            FieldType::Fixed32 => "fixed32",
            FieldType::Bool => "bool",
            FieldType::String => "string",
            FieldType::Group => "group",
            FieldType::Message => "message",
            FieldType::Bytes => "bytes",
            FieldType::UInt32 => "uint32",
            FieldType::Enum => "enum",
            FieldType::SFixed32 => "sfixed32",
            FieldType::SFixed64 => "sfixed64",
            FieldType::SInt32 => "sint32",
            FieldType::SInt64 => "sint64",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reads one value, without its tag
pub type ValueReader<T> = fn(&mut CodedReader<'_>) -> Result<T>;

/// Writes one value, without its tag
pub type ValueWriter<T> = fn(&mut CodedWriter<'_>, &T) -> Result<()>;

/// Computes the encoded size of one value, without its tag
pub type ValueSizer<T> = fn(&T) -> usize;

/// Encoding rules for the values of one field.
///
/// The tag decides the repeated layout: a packable type whose tag carries
/// the length-delimited wire type is written packed. Readers accept both
/// layouts regardless.
pub struct FieldCodec<T> {
    tag: u32,
    end_tag: u32,
    field_type: FieldType,
    reader: ValueReader<T>,
    writer: ValueWriter<T>,
    sizer: ValueSizer<T>,
}

impl<T> Clone for FieldCodec<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FieldCodec<T> {}

impl<T> fmt::Debug for FieldCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCodec")
            .field("tag", &self.tag)
            .field("end_tag", &self.end_tag)
            .field("field_type", &self.field_type)
            .field("packed", &self.is_packed())
            .finish()
    }
}

impl<T> FieldCodec<T> {
    /// Creates a codec from raw parts. `end_tag` is 0 except for groups.
    pub const fn from_parts(
        tag: u32,
        end_tag: u32,
        field_type: FieldType,
        reader: ValueReader<T>,
        writer: ValueWriter<T>,
        sizer: ValueSizer<T>,
    ) -> Self {
        Self {
            tag,
            end_tag,
            field_type,
            reader,
            writer,
            sizer,
        }
    }

    /// Tag written before each value, or before the whole packed run
    pub const fn tag(&self) -> u32 {
        self.tag
    }

    /// Tag closing a group value, 0 for every other type
    pub const fn end_tag(&self) -> u32 {
        self.end_tag
    }

    /// Field number carried by the tag
    pub const fn field_number(&self) -> u32 {
        tag_field_number(self.tag)
    }

    /// Declared type of the field
    pub const fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Encoded size of each value, or 0 if it varies
    pub const fn fixed_size(&self) -> usize {
        self.field_type.fixed_size()
    }

    /// True if the value type may use the packed layout
    pub const fn is_packable(&self) -> bool {
        self.field_type.is_packable()
    }

    /// True if repeated values are written packed
    pub const fn is_packed(&self) -> bool {
        self.field_type.is_packable() && self.tag & 0x7 == WireType::LengthDelimited as u32
    }

    /// Encoded size of the tag
    pub fn tag_size(&self) -> usize {
        varint_len(u64::from(self.tag))
    }

    /// Encoded size of the end tag, 0 if there is none
    pub fn end_tag_size(&self) -> usize {
        if self.end_tag == 0 {
            0
        } else {
            varint_len(u64::from(self.end_tag))
        }
    }

    /// Reads one value
    pub fn read(&self, reader: &mut CodedReader<'_>) -> Result<T> {
        (self.reader)(reader)
    }

    /// Writes one value without any tag
    pub fn write_value(&self, writer: &mut CodedWriter<'_>, value: &T) -> Result<()> {
        (self.writer)(writer, value)
    }

    /// Encoded size of one value without any tag
    pub fn value_size(&self, value: &T) -> usize {
        (self.sizer)(value)
    }

    /// Writes the tag, the value and, for groups, the end tag
    pub fn write_tagged_value(&self, writer: &mut CodedWriter<'_>, value: &T) -> Result<()> {
        writer.write_raw_tag(self.tag)?;
        (self.writer)(writer, value)?;
        if self.end_tag != 0 {
            writer.write_raw_tag(self.end_tag)?;
        }
        Ok(())
    }

    /// Size of what [`write_tagged_value`](Self::write_tagged_value) emits
    pub fn calculate_size_with_tag(&self, value: &T) -> usize {
        self.tag_size() + (self.sizer)(value) + self.end_tag_size()
    }
}

macro_rules! scalar_fns {
    ($($ty:ty => $read_fn:ident / $read:ident, $write_fn:ident / $write:ident, $size_fn:ident / $size:expr;)*) => {
        $(
            fn $read_fn(reader: &mut CodedReader<'_>) -> Result<$ty> {
                reader.$read()
            }

            fn $write_fn(writer: &mut CodedWriter<'_>, value: &$ty) -> Result<()> {
                writer.$write(*value)
            }

            fn $size_fn(value: &$ty) -> usize {
                let size: fn($ty) -> usize = $size;
                size(*value)
            }
        )*
    };
}

scalar_fns! {
    f64 => read_double / read_double, write_double / write_double, size_double / |_| FIXED64_SIZE;
    f32 => read_float / read_float, write_float / write_float, size_float / |_| FIXED32_SIZE;
    i64 => read_int64 / read_int64, write_int64 / write_int64, size_int64 / wire::size_int64;
    u64 => read_uint64 / read_uint64, write_uint64 / write_uint64, size_uint64 / wire::size_varint64;
    i32 => read_int32 / read_int32, write_int32 / write_int32, size_int32 / wire::size_int32;
    u64 => read_fixed64 / read_fixed64, write_fixed64 / write_fixed64, size_fixed64 / |_| FIXED64_SIZE;
    u32 => read_fixed32 / read_fixed32, write_fixed32 / write_fixed32, size_fixed32 / |_| FIXED32_SIZE;
    bool => read_bool / read_bool, write_bool / write_bool, size_bool / wire::size_bool;
    u32 => read_uint32 / read_uint32, write_uint32 / write_uint32, size_uint32 / wire::size_varint32;
    i32 => read_sfixed32 / read_sfixed32, write_sfixed32 / write_sfixed32, size_sfixed32 / |_| FIXED32_SIZE;
    i64 => read_sfixed64 / read_sfixed64, write_sfixed64 / write_sfixed64, size_sfixed64 / |_| FIXED64_SIZE;
    i32 => read_sint32 / read_sint32, write_sint32 / write_sint32, size_sint32 / wire::size_sint32;
    i64 => read_sint64 / read_sint64, write_sint64 / write_sint64, size_sint64 / wire::size_sint64;
    i32 => read_enum / read_enum, write_enum / write_enum, size_enum / wire::size_int32;
}

fn read_string(reader: &mut CodedReader<'_>) -> Result<String> {
    reader.read_string()
}

fn write_string(writer: &mut CodedWriter<'_>, value: &String) -> Result<()> {
    writer.write_string(value)
}

fn size_string(value: &String) -> usize {
    wire::size_string(value)
}

fn read_bytes(reader: &mut CodedReader<'_>) -> Result<ByteBuffer> {
    reader.read_bytes()
}

fn write_bytes(writer: &mut CodedWriter<'_>, value: &ByteBuffer) -> Result<()> {
    writer.write_bytes(value)
}

fn size_bytes(value: &ByteBuffer) -> usize {
    wire::size_bytes(value)
}

fn read_message<T: Message + Default>(reader: &mut CodedReader<'_>) -> Result<T> {
    let mut message = T::default();
    reader.read_message(&mut message)?;
    Ok(message)
}

fn write_message<T: Message>(writer: &mut CodedWriter<'_>, value: &T) -> Result<()> {
    writer.write_message(value)
}

fn size_message<T: Message>(value: &T) -> usize {
    wire::size_message(value)
}

fn read_group<T: Message + Default>(reader: &mut CodedReader<'_>) -> Result<T> {
    let mut message = T::default();
    reader.read_group(&mut message)?;
    Ok(message)
}

fn write_group<T: Message>(writer: &mut CodedWriter<'_>, value: &T) -> Result<()> {
    value.write_to(writer)
}

fn size_group<T: Message>(value: &T) -> usize {
    wire::size_group(value)
}

impl FieldCodec<f64> {
    /// Codec for `double` values
    pub const fn for_double(tag: u32) -> Self {
        Self::from_parts(tag, 0, FieldType::Double, read_double, write_double, size_double)
    }
}

impl FieldCodec<f32> {
    /// Codec for `float` values
    pub const fn for_float(tag: u32) -> Self {
        Self::from_parts(tag, 0, FieldType::Float, read_float, write_float, size_float)
    }
}

impl FieldCodec<i64> {
    /// Codec for `int64` values
    pub const fn for_int64(tag: u32) -> Self {
        Self::from_parts(tag, 0, FieldType::Int64, read_int64, write_int64, size_int64)
    }

    /// Codec for `sfixed64` values
    pub const fn for_sfixed64(tag: u32) -> Self {
        Self::from_parts(
            tag,
            0,
            FieldType::SFixed64,
            read_sfixed64,
            write_sfixed64,
            size_sfixed64,
        )
    }

    /// Codec for `sint64` values
    pub const fn for_sint64(tag: u32) -> Self {
        Self::from_parts(tag, 0, FieldType::SInt64, read_sint64, write_sint64, size_sint64)
    }
}

impl FieldCodec<u64> {
    /// Codec for `uint64` values
    pub const fn for_uint64(tag: u32) -> Self {
        Self::from_parts(tag, 0, FieldType::UInt64, read_uint64, write_uint64, size_uint64)
    }

    /// Codec for `fixed64` values
    pub const fn for_fixed64(tag: u32) -> Self {
        Self::from_parts(
            tag,
            0,
            FieldType::Fixed64,
            read_fixed64,
            write_fixed64,
            size_fixed64,
        )
    }
}

impl FieldCodec<i32> {
    /// Codec for `int32` values
    pub const fn for_int32(tag: u32) -> Self {
        Self::from_parts(tag, 0, FieldType::Int32, read_int32, write_int32, size_int32)
    }

    /// Codec for `sfixed32` values
    pub const fn for_sfixed32(tag: u32) -> Self {
        Self::from_parts(
            tag,
            0,
            FieldType::SFixed32,
            read_sfixed32,
            write_sfixed32,
            size_sfixed32,
        )
    }

    /// Codec for `sint32` values
    pub const fn for_sint32(tag: u32) -> Self {
        Self::from_parts(tag, 0, FieldType::SInt32, read_sint32, write_sint32, size_sint32)
    }

    /// Codec for enum values, carried as their `i32` number
    pub const fn for_enum(tag: u32) -> Self {
        Self::from_parts(tag, 0, FieldType::Enum, read_enum, write_enum, size_enum)
    }
}

impl FieldCodec<u32> {
    /// Codec for `uint32` values
    pub const fn for_uint32(tag: u32) -> Self {
        Self::from_parts(tag, 0, FieldType::UInt32, read_uint32, write_uint32, size_uint32)
    }

    /// Codec for `fixed32` values
    pub const fn for_fixed32(tag: u32) -> Self {
        Self::from_parts(
            tag,
            0,
            FieldType::Fixed32,
            read_fixed32,
            write_fixed32,
            size_fixed32,
        )
    }
}

impl FieldCodec<bool> {
    /// Codec for `bool` values
    pub const fn for_bool(tag: u32) -> Self {
        Self::from_parts(tag, 0, FieldType::Bool, read_bool, write_bool, size_bool)
    }
}

impl FieldCodec<String> {
    /// Codec for `string` values
    pub const fn for_string(tag: u32) -> Self {
        Self::from_parts(tag, 0, FieldType::String, read_string, write_string, size_string)
    }
}

impl FieldCodec<ByteBuffer> {
    /// Codec for `bytes` values
    pub const fn for_bytes(tag: u32) -> Self {
        Self::from_parts(tag, 0, FieldType::Bytes, read_bytes, write_bytes, size_bytes)
    }
}

impl<T: Message + Default> FieldCodec<T> {
    /// Codec for embedded messages
    pub const fn for_message(tag: u32) -> Self {
        Self::from_parts(
            tag,
            0,
            FieldType::Message,
            read_message::<T>,
            write_message::<T>,
            size_message::<T>,
        )
    }

    /// Codec for groups, delimited by `start_tag` and `end_tag`
    pub const fn for_group(start_tag: u32, end_tag: u32) -> Self {
        Self::from_parts(
            start_tag,
            end_tag,
            FieldType::Group,
            read_group::<T>,
            write_group::<T>,
            size_group::<T>,
        )
    }
}
