//! Preservation of fields a message does not recognise.
//!
//! Every unrecognised field is kept as raw wire values, keyed by field
//! number, and written back unchanged. Re-encoding is canonical rather than
//! byte-for-byte: fields come out in ascending number order, and within a
//! field the values are grouped by wire kind (varint, fixed32, fixed64,
//! length-delimited, group) while keeping their relative order inside each
//! kind. Input that was already in that order round-trips byte-identically.

use std::collections::BTreeMap;

use tracing::debug;

use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};
use crate::io::{CodedReader, CodedWriter};
use crate::message::Message;
use crate::wire::{
    self, size_tag, tag_field_number, tag_wire_type, WireType, FIXED32_SIZE, FIXED64_SIZE,
    MAX_FIELD_NUMBER,
};

/// Values of a single wire kind, in the order they were seen
#[derive(Debug, Clone, PartialEq)]
pub enum WireValues {
    /// Varint values, stored as their raw 64-bit form
    Varint(Vec<u64>),
    /// Fixed 32-bit values
    Fixed32(Vec<u32>),
    /// Fixed 64-bit values
    Fixed64(Vec<u64>),
    /// Length-delimited payloads
    LengthDelimited(Vec<ByteBuffer>),
    /// Groups, each parsed into a nested set
    Group(Vec<UnknownFieldSet>),
}

impl WireValues {
    /// Wire type the values are written with
    pub fn wire_type(&self) -> WireType {
        match self {
            WireValues::Varint(_) => WireType::Varint,
            WireValues::Fixed32(_) => WireType::Fixed32,
            WireValues::Fixed64(_) => WireType::Fixed64,
            WireValues::LengthDelimited(_) => WireType::LengthDelimited,
            WireValues::Group(_) => WireType::StartGroup,
        }
    }

    /// Number of values
    pub fn len(&self) -> usize {
        match self {
            WireValues::Varint(values) => values.len(),
            WireValues::Fixed32(values) => values.len(),
            WireValues::Fixed64(values) => values.len(),
            WireValues::LengthDelimited(values) => values.len(),
            WireValues::Group(values) => values.len(),
        }
    }

    /// True when the list holds no values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position in the canonical write order
    fn rank(&self) -> u8 {
        match self {
            WireValues::Varint(_) => 0,
            WireValues::Fixed32(_) => 1,
            WireValues::Fixed64(_) => 2,
            WireValues::LengthDelimited(_) => 3,
            WireValues::Group(_) => 4,
        }
    }

    /// Moves `other`'s values after ours. Both lists hold the same kind.
    fn append(&mut self, other: WireValues) {
        match (self, other) {
            (WireValues::Varint(ours), WireValues::Varint(theirs)) => ours.extend(theirs),
            (WireValues::Fixed32(ours), WireValues::Fixed32(theirs)) => ours.extend(theirs),
            (WireValues::Fixed64(ours), WireValues::Fixed64(theirs)) => ours.extend(theirs),
            (WireValues::LengthDelimited(ours), WireValues::LengthDelimited(theirs)) => {
                ours.extend(theirs)
            }
            (WireValues::Group(ours), WireValues::Group(theirs)) => ours.extend(theirs),
            (ours, theirs) => debug_assert_eq!(ours.rank(), theirs.rank()),
        }
    }

    fn calculate_size(&self, field_number: u32) -> usize {
        let tag_size = size_tag(field_number);
        match self {
            WireValues::Varint(values) => values
                .iter()
                .map(|value| tag_size + wire::size_varint64(*value))
                .sum(),
            WireValues::Fixed32(values) => values.len() * (tag_size + FIXED32_SIZE),
            WireValues::Fixed64(values) => values.len() * (tag_size + FIXED64_SIZE),
            WireValues::LengthDelimited(values) => values
                .iter()
                .map(|value| tag_size + wire::size_bytes(value))
                .sum(),
            WireValues::Group(values) => values
                .iter()
                .map(|group| 2 * tag_size + group.calculate_size())
                .sum(),
        }
    }

    fn write_to(&self, field_number: u32, writer: &mut CodedWriter<'_>) -> Result<()> {
        match self {
            WireValues::Varint(values) => {
                for value in values {
                    writer.write_tag(field_number, WireType::Varint)?;
                    writer.write_varint64(*value)?;
                }
            }
            WireValues::Fixed32(values) => {
                for value in values {
                    writer.write_tag(field_number, WireType::Fixed32)?;
                    writer.write_fixed32(*value)?;
                }
            }
            WireValues::Fixed64(values) => {
                for value in values {
                    writer.write_tag(field_number, WireType::Fixed64)?;
                    writer.write_fixed64(*value)?;
                }
            }
            WireValues::LengthDelimited(values) => {
                for value in values {
                    writer.write_tag(field_number, WireType::LengthDelimited)?;
                    writer.write_bytes(value)?;
                }
            }
            WireValues::Group(values) => {
                for group in values {
                    writer.write_tag(field_number, WireType::StartGroup)?;
                    writer.write_group(field_number, group)?;
                }
            }
        }
        Ok(())
    }
}

/// All unknown values recorded for one field number.
///
/// Holds at most one [`WireValues`] list per wire kind, kept in canonical
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnknownField {
    lists: Vec<WireValues>,
}

impl UnknownField {
    /// Creates a field with no values
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, values: WireValues) -> &mut Self {
        let rank = values.rank();
        match self.lists.binary_search_by_key(&rank, WireValues::rank) {
            Ok(index) => self.lists[index].append(values),
            Err(index) => self.lists.insert(index, values),
        }
        self
    }

    /// Appends a varint value
    pub fn add_varint(&mut self, value: u64) -> &mut Self {
        self.push(WireValues::Varint(vec![value]))
    }

    /// Appends a fixed 32-bit value
    pub fn add_fixed32(&mut self, value: u32) -> &mut Self {
        self.push(WireValues::Fixed32(vec![value]))
    }

    /// Appends a fixed 64-bit value
    pub fn add_fixed64(&mut self, value: u64) -> &mut Self {
        self.push(WireValues::Fixed64(vec![value]))
    }

    /// Appends a length-delimited payload
    pub fn add_length_delimited(&mut self, value: impl Into<ByteBuffer>) -> &mut Self {
        self.push(WireValues::LengthDelimited(vec![value.into()]))
    }

    /// Appends a group
    pub fn add_group(&mut self, group: UnknownFieldSet) -> &mut Self {
        self.push(WireValues::Group(vec![group]))
    }

    /// Recorded lists in write order
    pub fn lists(&self) -> &[WireValues] {
        &self.lists
    }

    /// Varint values in the order seen
    pub fn varints(&self) -> &[u64] {
        self.lists
            .iter()
            .find_map(|list| match list {
                WireValues::Varint(values) => Some(values.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Fixed 32-bit values in the order seen
    pub fn fixed32s(&self) -> &[u32] {
        self.lists
            .iter()
            .find_map(|list| match list {
                WireValues::Fixed32(values) => Some(values.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Fixed 64-bit values in the order seen
    pub fn fixed64s(&self) -> &[u64] {
        self.lists
            .iter()
            .find_map(|list| match list {
                WireValues::Fixed64(values) => Some(values.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Length-delimited payloads in the order seen
    pub fn length_delimited(&self) -> &[ByteBuffer] {
        self.lists
            .iter()
            .find_map(|list| match list {
                WireValues::LengthDelimited(values) => Some(values.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Groups in the order seen
    pub fn groups(&self) -> &[UnknownFieldSet] {
        self.lists
            .iter()
            .find_map(|list| match list {
                WireValues::Group(values) => Some(values.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Total number of values across all kinds
    pub fn value_count(&self) -> usize {
        self.lists.iter().map(WireValues::len).sum()
    }

    /// Appends clones of `other`'s values after ours, kind by kind
    pub fn merge_from(&mut self, other: &UnknownField) {
        for list in &other.lists {
            self.push(list.clone());
        }
    }

    /// Encoded size of every value with its tag
    pub fn calculate_size(&self, field_number: u32) -> usize {
        self.lists
            .iter()
            .map(|list| list.calculate_size(field_number))
            .sum()
    }

    /// Writes every value with its tag
    pub fn write_to(&self, field_number: u32, writer: &mut CodedWriter<'_>) -> Result<()> {
        for list in &self.lists {
            list.write_to(field_number, writer)?;
        }
        Ok(())
    }
}

/// Unknown fields of one message, keyed by field number
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnknownFieldSet {
    fields: BTreeMap<u32, UnknownField>,
}

impl UnknownFieldSet {
    /// Creates an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct field numbers
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no field is recorded
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Values recorded for `field_number`
    pub fn get(&self, field_number: u32) -> Option<&UnknownField> {
        self.fields.get(&field_number)
    }

    /// True if any value is recorded for `field_number`
    pub fn has_field(&self, field_number: u32) -> bool {
        self.fields.contains_key(&field_number)
    }

    /// Recorded field numbers in ascending order
    pub fn field_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.fields.keys().copied()
    }

    /// Iterates over fields in ascending number order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &UnknownField)> + '_ {
        self.fields.iter().map(|(number, field)| (*number, field))
    }

    /// Adds or replaces the values of `field_number`
    pub fn add_field(&mut self, field_number: u32, field: UnknownField) -> Result<&mut Self> {
        if field_number == 0 || field_number > MAX_FIELD_NUMBER {
            return Err(Error::invalid_field_number(field_number));
        }
        self.fields.insert(field_number, field);
        Ok(self)
    }

    /// Removes the values of `field_number`
    pub fn remove_field(&mut self, field_number: u32) -> Option<UnknownField> {
        self.fields.remove(&field_number)
    }

    fn field_mut(&mut self, field_number: u32) -> &mut UnknownField {
        self.fields.entry(field_number).or_default()
    }

    /// Records the field whose tag was just read.
    ///
    /// Returns `false` without consuming anything when that tag is an
    /// end-group tag, signalling the enclosing merge loop to stop.
    pub fn merge_field_from(&mut self, reader: &mut CodedReader<'_>) -> Result<bool> {
        let tag = reader.last_tag();
        if tag == 0 {
            return Err(Error::misuse("merge_field_from called before reading a tag"));
        }
        let number = tag_field_number(tag);
        let wire_type = tag_wire_type(tag)?;
        match wire_type {
            WireType::Varint => {
                let value = reader.read_uint64()?;
                self.field_mut(number).add_varint(value);
            }
            WireType::Fixed64 => {
                let value = reader.read_fixed64()?;
                self.field_mut(number).add_fixed64(value);
            }
            WireType::LengthDelimited => {
                let value = reader.read_bytes()?;
                self.field_mut(number).add_length_delimited(value);
            }
            WireType::StartGroup => {
                let mut group = UnknownFieldSet::new();
                reader.read_group(&mut group)?;
                self.field_mut(number).add_group(group);
            }
            WireType::EndGroup => return Ok(false),
            WireType::Fixed32 => {
                let value = reader.read_fixed32()?;
                self.field_mut(number).add_fixed32(value);
            }
        }
        debug!(field = number, %wire_type, "kept unknown field");
        Ok(true)
    }

    /// Appends every value of `other` after ours, field by field
    pub fn merge_from(&mut self, other: &UnknownFieldSet) {
        for (number, field) in &other.fields {
            self.field_mut(*number).merge_from(field);
        }
    }

    /// Encoded size of every recorded field
    pub fn calculate_size(&self) -> usize {
        self.fields
            .iter()
            .map(|(number, field)| field.calculate_size(*number))
            .sum()
    }

    /// Writes every recorded field in ascending number order
    pub fn write_to(&self, writer: &mut CodedWriter<'_>) -> Result<()> {
        for (number, field) in &self.fields {
            field.write_to(*number, writer)?;
        }
        Ok(())
    }
}

impl Message for UnknownFieldSet {
    fn merge_from(&mut self, reader: &mut CodedReader<'_>) -> Result<()> {
        loop {
            let tag = reader.read_tag()?;
            if tag == 0 || !self.merge_field_from(reader)? {
                return Ok(());
            }
        }
    }

    fn compute_size(&self) -> usize {
        self.calculate_size()
    }

    fn write_to(&self, writer: &mut CodedWriter<'_>) -> Result<()> {
        UnknownFieldSet::write_to(self, writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Sample;
    use pretty_assertions::assert_eq;

    fn parse(data: &[u8]) -> UnknownFieldSet {
        UnknownFieldSet::decode(data).unwrap()
    }

    fn encode(set: &UnknownFieldSet) -> Vec<u8> {
        let bytes = set.encode_to_vec().unwrap();
        assert_eq!(bytes.len(), set.calculate_size());
        bytes
    }

    #[test]
    fn test_all_wire_kinds_round_trip() {
        let data = [
            0x08, 0x96, 0x01, // 1: varint 150
            0x11, 1, 2, 3, 4, 5, 6, 7, 8, // 2: fixed64
            0x1A, 0x03, b'a', b'b', b'c', // 3: len
            0x23, 0x08, 0x01, 0x24, // 4: group { 1: 1 }
            0x2D, 9, 8, 7, 6, // 5: fixed32
        ];
        let set = parse(&data);
        assert_eq!(set.len(), 5);
        assert_eq!(set.get(1).unwrap().varints(), &[150]);
        assert_eq!(
            set.get(2).unwrap().fixed64s(),
            &[u64::from_le_bytes([1, 2, 3, 4, 5, 6, 7, 8])]
        );
        assert_eq!(set.get(3).unwrap().length_delimited()[0], b"abc"[..]);
        assert_eq!(set.get(4).unwrap().groups()[0].get(1).unwrap().varints(), &[1]);
        assert_eq!(set.get(5).unwrap().fixed32s(), &[0x06070809]);
        assert_eq!(encode(&set), data.to_vec());
    }

    #[test]
    fn test_order_within_field_is_kept() {
        let data = [0x08, 0x03, 0x08, 0x01, 0x08, 0x02];
        let set = parse(&data);
        assert_eq!(set.get(1).unwrap().varints(), &[3, 1, 2]);
        assert_eq!(encode(&set), data.to_vec());
    }

    #[test]
    fn test_canonical_reordering() {
        // 3: varint 1, 1: len "x", 3: varint 2
        let data = [0x18, 0x01, 0x0A, 0x01, b'x', 0x18, 0x02];
        let set = parse(&data);
        assert_eq!(set.field_numbers().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(
            encode(&set),
            vec![0x0A, 0x01, b'x', 0x18, 0x01, 0x18, 0x02]
        );

        // mixed kinds under one number come out varint first
        let data = [0x0D, 1, 0, 0, 0, 0x08, 0x05];
        assert_eq!(encode(&parse(&data)), vec![0x08, 0x05, 0x0D, 1, 0, 0, 0]);
    }

    #[test]
    fn test_nested_groups() {
        // 1: group { 2: group { 3: 7 } }
        let data = [0x0B, 0x13, 0x18, 0x07, 0x14, 0x0C];
        let set = parse(&data);
        let inner = &set.get(1).unwrap().groups()[0].get(2).unwrap().groups()[0];
        assert_eq!(inner.get(3).unwrap().varints(), &[7]);
        assert_eq!(encode(&set), data.to_vec());
    }

    #[test]
    fn test_mismatched_group_end() {
        // group 1 closed by the end tag of field 2
        assert!(matches!(
            UnknownFieldSet::decode(&[0x0B, 0x08, 0x01, 0x14]),
            Err(Error::MismatchedEndGroup)
        ));
        // group never closed
        assert!(matches!(
            UnknownFieldSet::decode(&[0x0B, 0x08, 0x01]),
            Err(Error::TruncatedMessage)
        ));
        // end tag with no group open
        assert!(matches!(
            UnknownFieldSet::decode(&[0x0C]),
            Err(Error::MismatchedEndGroup)
        ));
    }

    #[test]
    fn test_merge_appends_per_field() {
        let mut left = parse(&[0x08, 0x01, 0x12, 0x00]);
        let right = parse(&[0x08, 0x02, 0x18, 0x03]);
        left.merge_from(&right);
        assert_eq!(left.get(1).unwrap().varints(), &[1, 2]);
        assert!(left.has_field(2));
        assert!(left.has_field(3));
        assert_eq!(encode(&left), vec![0x08, 0x01, 0x08, 0x02, 0x12, 0x00, 0x18, 0x03]);
    }

    #[test]
    fn test_builder() {
        let mut field = UnknownField::new();
        field
            .add_length_delimited(ByteBuffer::from_static(b"z"))
            .add_varint(1)
            .add_varint(2);
        assert_eq!(field.value_count(), 3);
        assert_eq!(field.lists()[0].wire_type(), WireType::Varint);

        let mut set = UnknownFieldSet::new();
        set.add_field(2, field).unwrap();
        assert_eq!(encode(&set), vec![0x10, 0x01, 0x10, 0x02, 0x12, 0x01, b'z']);

        assert!(matches!(
            set.add_field(0, UnknownField::new()),
            Err(Error::InvalidFieldNumber { number: 0, .. })
        ));
        assert!(set.remove_field(2).is_some());
        assert!(set.is_empty());
    }

    #[test]
    fn test_message_keeps_unknown_fields() {
        let mut sample = Sample::populated();
        sample
            .unknown
            .add_field(100, {
                let mut field = UnknownField::new();
                field.add_fixed32(42);
                field
            })
            .unwrap();
        let bytes = sample.encode_to_vec().unwrap();
        let decoded = Sample::decode(&bytes).unwrap();
        assert_eq!(decoded.unknown.get(100).unwrap().fixed32s(), &[42]);
        assert_eq!(decoded.encode_to_vec().unwrap(), bytes);
    }
}
