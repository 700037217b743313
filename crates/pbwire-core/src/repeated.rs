//! Growable container for the values of a repeated field.

use std::fmt;
use std::ops::{Index, IndexMut};

use tracing::trace;

use crate::codec::FieldCodec;
use crate::error::{Error, Result};
use crate::io::{CodedReader, CodedWriter};
use crate::wire::{size_length, tag_wire_type, WireType};

/// Capacity reserved by the first insertion
const MIN_CAPACITY: usize = 8;

/// Ordered, growable sequence of field values.
///
/// Storage grows by doubling, starting at eight elements. Encoding and
/// decoding go through a [`FieldCodec`], which decides the tag and whether
/// the packed layout is used.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RepeatedField<T> {
    items: Vec<T>,
}

impl<T> Default for RepeatedField<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RepeatedField<T> {
    /// Creates an empty field without allocating
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when there are no values
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of values that fit before the storage grows
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    fn reserve_for(&mut self, additional: usize) {
        let required = self.items.len() + additional;
        if required > self.items.capacity() {
            let grown = (self.items.capacity() * 2).max(MIN_CAPACITY).max(required);
            self.items.reserve_exact(grown - self.items.len());
        }
    }

    fn check_index(&self, index: usize, len: usize) -> Result<()> {
        if index < len {
            Ok(())
        } else {
            Err(Error::IndexOutOfRange {
                index,
                len: self.items.len(),
            })
        }
    }

    /// Appends a value
    pub fn add(&mut self, value: T) {
        self.reserve_for(1);
        self.items.push(value);
    }

    /// Inserts a value at `index`, shifting later values back.
    ///
    /// `index` may equal the length, which appends.
    pub fn insert(&mut self, index: usize, value: T) -> Result<()> {
        self.check_index(index, self.items.len() + 1)?;
        self.reserve_for(1);
        self.items.insert(index, value);
        Ok(())
    }

    /// Removes and returns the value at `index`
    pub fn remove_at(&mut self, index: usize) -> Result<T> {
        self.check_index(index, self.items.len())?;
        Ok(self.items.remove(index))
    }

    /// Replaces the value at `index`, returning the old one
    pub fn set(&mut self, index: usize, value: T) -> Result<T> {
        self.check_index(index, self.items.len())?;
        Ok(std::mem::replace(&mut self.items[index], value))
    }

    /// Returns the value at `index`
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Returns the value at `index` mutably
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    /// Appends every value of `iter`.
    ///
    /// An iterator reporting an exact length reserves once up front.
    pub fn add_range<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.extend(iter);
    }

    /// Removes all values, keeping the storage
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Iterates over the values in order
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Iterates mutably over the values in order
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    /// Returns the values as a slice
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Returns the values as a mutable slice
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }

    /// Consumes the field, returning its values
    pub fn into_vec(self) -> Vec<T> {
        self.items
    }

    /// Reads one occurrence of the field whose tag was just read.
    ///
    /// Both layouts are accepted whatever the codec's own layout: a
    /// length-delimited tag on a packable codec is decoded as a packed run,
    /// anything else as a run of individually tagged values.
    pub fn add_entries_from(
        &mut self,
        reader: &mut CodedReader<'_>,
        codec: &FieldCodec<T>,
    ) -> Result<()> {
        let tag = reader.last_tag();
        if tag == 0 {
            return Err(Error::misuse("add_entries_from called before reading a tag"));
        }

        if codec.is_packable() && tag_wire_type(tag)? == WireType::LengthDelimited {
            let length = reader.read_length()?;
            if length == 0 {
                return Ok(());
            }
            let old_limit = reader.push_limit(length)?;
            let fixed_size = codec.fixed_size();
            // only trust the declared length once the payload is in memory
            if fixed_size > 0 && reader.buffered_len() == length {
                self.reserve_for(length / fixed_size);
            }
            let before = self.items.len();
            while !reader.reached_limit() {
                let value = codec.read(reader)?;
                self.add(value);
            }
            reader.pop_limit(old_limit);
            trace!(
                field = codec.field_number(),
                count = self.items.len() - before,
                length,
                "decoded packed field"
            );
        } else {
            loop {
                let value = codec.read(reader)?;
                self.add(value);
                if !reader.maybe_consume_tag(tag)? {
                    break;
                }
            }
        }
        Ok(())
    }

    fn payload_size(&self, codec: &FieldCodec<T>) -> usize {
        match codec.fixed_size() {
            0 => self.items.iter().map(|value| codec.value_size(value)).sum(),
            fixed => fixed * self.items.len(),
        }
    }

    /// Encoded size of all values including tags
    pub fn calculate_size(&self, codec: &FieldCodec<T>) -> usize {
        if self.items.is_empty() {
            return 0;
        }
        let payload = self.payload_size(codec);
        if codec.is_packed() {
            codec.tag_size() + size_length(payload) + payload
        } else {
            self.items.len() * (codec.tag_size() + codec.end_tag_size()) + payload
        }
    }

    /// Writes all values. Nothing is written for an empty field.
    pub fn write_to(&self, writer: &mut CodedWriter<'_>, codec: &FieldCodec<T>) -> Result<()> {
        if self.items.is_empty() {
            return Ok(());
        }
        if codec.is_packed() {
            writer.write_raw_tag(codec.tag())?;
            writer.write_length(self.payload_size(codec))?;
            for value in &self.items {
                codec.write_value(writer, value)?;
            }
        } else {
            for value in &self.items {
                codec.write_tagged_value(writer, value)?;
            }
        }
        Ok(())
    }
}

impl<T: Clone> RepeatedField<T> {
    /// Appends clones of every value in `values` with a single reservation
    pub fn add_slice(&mut self, values: &[T]) {
        self.reserve_for(values.len());
        self.items.extend_from_slice(values);
    }

    /// Appends clones of every value of `other`
    pub fn add_all(&mut self, other: &RepeatedField<T>) {
        self.add_slice(&other.items);
    }
}

impl<T: PartialEq> RepeatedField<T> {
    /// True if some value equals `value`
    pub fn contains(&self, value: &T) -> bool {
        self.items.contains(value)
    }

    /// Position of the first value equal to `value`
    pub fn index_of(&self, value: &T) -> Option<usize> {
        self.items.iter().position(|item| item == value)
    }

    /// Removes the first value equal to `value`; returns whether one was found
    pub fn remove(&mut self, value: &T) -> bool {
        match self.index_of(value) {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for RepeatedField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.items).finish()
    }
}

impl<T> Index<usize> for RepeatedField<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

impl<T> IndexMut<usize> for RepeatedField<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.items[index]
    }
}

impl<T> AsRef<[T]> for RepeatedField<T> {
    fn as_ref(&self) -> &[T] {
        &self.items
    }
}

impl<T> Extend<T> for RepeatedField<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        let (lower, upper) = iter.size_hint();
        if upper == Some(lower) {
            self.reserve_for(lower);
        }
        for value in iter {
            self.add(value);
        }
    }
}

impl<T> FromIterator<T> for RepeatedField<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut field = Self::new();
        field.extend(iter);
        field
    }
}

impl<T> From<Vec<T>> for RepeatedField<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

impl<T> IntoIterator for RepeatedField<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a RepeatedField<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<'a, T> IntoIterator for &'a mut RepeatedField<T> {
    type Item = &'a mut T;
    type IntoIter = std::slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter_mut()
    }
}
