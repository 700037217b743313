//! Bridge from compiled `.proto` descriptors to field codecs.
//!
//! A `FileDescriptorSet` (as written by `protoc --descriptor_set_out`) is
//! decoded with `prost-types`, and each message's fields are reduced to the
//! facts the wire codec needs: number, declared type, repeated flag and
//! whether repeated values are packed.
//!
//! Packing follows the descriptor's `[packed = ...]` option when present.
//! Without it, packable repeated fields default to packed under proto3 and
//! unpacked under proto2.

use std::collections::BTreeMap;

use prost::Message as _;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet};
use tracing::debug;

use crate::codec::FieldType;
use crate::error::{Error, Result};
use crate::wire::{make_tag, WireType, MAX_FIELD_NUMBER};

/// Decodes a serialized `FileDescriptorSet` into its files
pub fn decode_file_descriptor_set(data: &[u8]) -> Result<Vec<FileDescriptorProto>> {
    let set = FileDescriptorSet::decode(data)?;
    debug!(files = set.file.len(), "decoded descriptor set");
    Ok(set.file)
}

/// Proto syntax version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Syntax {
    /// Proto2 syntax
    Proto2,
    /// Proto3 syntax
    Proto3,
}

impl Syntax {
    /// Returns the syntax declaration string
    pub fn as_str(&self) -> &'static str {
        match self {
            Syntax::Proto2 => "proto2",
            Syntax::Proto3 => "proto3",
        }
    }

    /// Syntax declared by `file`; an empty declaration means proto2
    pub fn of(file: &FileDescriptorProto) -> Result<Self> {
        Self::try_from(file.syntax())
    }
}

impl TryFrom<&str> for Syntax {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "" | "proto2" => Ok(Syntax::Proto2),
            "proto3" => Ok(Syntax::Proto3),
            _ => Err(Error::UnsupportedSyntax {
                syntax: value.to_string(),
            }),
        }
    }
}

impl From<Type> for FieldType {
    fn from(value: Type) -> Self {
        match value {
            Type::Double => FieldType::Double,
            Type::Float => FieldType::Float,
            Type::Int64 => FieldType::Int64,
            Type::Uint64 => FieldType::UInt64,
            Type::Int32 => FieldType::Int32,
            Type::Fixed64 => FieldType::Fixed64,
            Type::Fixed32 => FieldType::Fixed32,
            Type::Bool => FieldType::Bool,
            Type::String => FieldType::String,
            Type::Group => FieldType::Group,
            Type::Message => FieldType::Message,
            Type::Bytes => FieldType::Bytes,
            Type::Uint32 => FieldType::UInt32,
            Type::Enum => FieldType::Enum,
            Type::Sfixed32 => FieldType::SFixed32,
            Type::Sfixed64 => FieldType::SFixed64,
            Type::Sint32 => FieldType::SInt32,
            Type::Sint64 => FieldType::SInt64,
        }
    }
}

/// Wire-level shape of one declared field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    /// Field name as declared
    pub name: String,
    /// Field number
    pub number: u32,
    /// Declared type
    pub field_type: FieldType,
    /// True for `repeated` fields
    pub repeated: bool,
    /// True when repeated values are written packed
    pub packed: bool,
}

impl FieldLayout {
    /// Extracts the layout of `field`, declared in a file of the given syntax
    pub fn from_descriptor(field: &FieldDescriptorProto, syntax: Syntax) -> Result<Self> {
        let number = u32::try_from(field.number())
            .ok()
            .filter(|number| (1..=MAX_FIELD_NUMBER).contains(number))
            .ok_or_else(|| Error::invalid_field_number(field.number() as u32))?;

        let raw_type = field.r#type.ok_or_else(|| {
            Error::unsupported_field_type(format!(
                "field {} has no resolved type ({})",
                field.name(),
                field.type_name()
            ))
        })?;
        let field_type = Type::try_from(raw_type)
            .map(FieldType::from)
            .map_err(|_| {
                Error::unsupported_field_type(format!(
                    "field {} has type number {}",
                    field.name(),
                    raw_type
                ))
            })?;

        let repeated = field.label() == Label::Repeated;
        let packed = repeated
            && field_type.is_packable()
            && field
                .options
                .as_ref()
                .and_then(|options| options.packed)
                .unwrap_or(syntax == Syntax::Proto3);

        Ok(Self {
            name: field.name().to_string(),
            number,
            field_type,
            repeated,
            packed,
        })
    }

    /// Wire type this field is written with
    pub fn wire_type(&self) -> WireType {
        if self.packed {
            WireType::LengthDelimited
        } else {
            self.field_type.wire_type()
        }
    }

    /// Tag written before each value, or before the packed run
    pub fn tag(&self) -> u32 {
        make_tag(self.number, self.wire_type())
    }

    /// End tag for group fields
    pub fn end_tag(&self) -> Option<u32> {
        (self.field_type == FieldType::Group).then_some(make_tag(self.number, WireType::EndGroup))
    }
}

/// Field layouts of one message type, keyed by number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageLayout {
    /// Fully qualified name without the leading dot
    pub full_name: String,
    /// Syntax of the declaring file
    pub syntax: Syntax,
    fields: BTreeMap<u32, FieldLayout>,
}

impl MessageLayout {
    /// Extracts the layout of `message`. Nested types are not included.
    pub fn from_descriptor(message: &DescriptorProto, syntax: Syntax) -> Result<Self> {
        Self::with_name(message.name().to_string(), message, syntax)
    }

    fn with_name(full_name: String, message: &DescriptorProto, syntax: Syntax) -> Result<Self> {
        let fields = message
            .field
            .iter()
            .map(|field| {
                let layout = FieldLayout::from_descriptor(field, syntax)?;
                Ok((layout.number, layout))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self {
            full_name,
            syntax,
            fields,
        })
    }

    /// Finds the message called `full_name` (for example `pkg.Outer.Inner`)
    /// among `files`, searching nested types too
    pub fn find(files: &[FileDescriptorProto], full_name: &str) -> Result<Option<Self>> {
        let wanted = full_name.trim_start_matches('.');
        for file in files {
            let prefix = file.package();
            for message in &file.message_type {
                if let Some((name, found)) = find_nested(prefix, message, wanted) {
                    return Self::with_name(name, found, Syntax::of(file)?).map(Some);
                }
            }
        }
        Ok(None)
    }

    /// Layout of field `number`
    pub fn field(&self, number: u32) -> Option<&FieldLayout> {
        self.fields.get(&number)
    }

    /// True if the message declares field `number`
    pub fn is_known(&self, number: u32) -> bool {
        self.fields.contains_key(&number)
    }

    /// Declared fields in ascending number order
    pub fn fields(&self) -> impl Iterator<Item = &FieldLayout> + '_ {
        self.fields.values()
    }
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn find_nested<'d>(
    prefix: &str,
    message: &'d DescriptorProto,
    wanted: &str,
) -> Option<(String, &'d DescriptorProto)> {
    let name = qualify(prefix, message.name());
    if name == wanted {
        return Some((name, message));
    }
    if !wanted.starts_with(&format!("{}.", name)) {
        return None;
    }
    message
        .nested_type
        .iter()
        .find_map(|nested| find_nested(&name, nested, wanted))
}
