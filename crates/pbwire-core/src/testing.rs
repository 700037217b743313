//! Hand-written message used across the unit tests, shaped like generated
//! code would be.

use crate::codec::FieldCodec;
use crate::error::Result;
use crate::io::{CodedReader, CodedWriter};
use crate::message::Message;
use crate::repeated::RepeatedField;
use crate::unknown::UnknownFieldSet;
use crate::wire::{self, make_tag, WireType};

const ID_TAG: u32 = make_tag(1, WireType::Varint);
const NAME_TAG: u32 = make_tag(2, WireType::LengthDelimited);
const SCORES_TAG: u32 = make_tag(3, WireType::LengthDelimited);
const SCORES_UNPACKED_TAG: u32 = make_tag(3, WireType::Varint);
const LABELS_TAG: u32 = make_tag(4, WireType::LengthDelimited);
const CHILD_TAG: u32 = make_tag(5, WireType::LengthDelimited);
const RATIO_TAG: u32 = make_tag(6, WireType::Fixed64);

const SCORES_CODEC: FieldCodec<i32> = FieldCodec::for_sint32(SCORES_TAG);
const LABELS_CODEC: FieldCodec<String> = FieldCodec::for_string(LABELS_TAG);

/// ```text
/// message Sample {
///   int32 id = 1;
///   string name = 2;
///   repeated sint32 scores = 3;   // packed
///   repeated string labels = 4;
///   Sample child = 5;
///   double ratio = 6;
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Sample {
    pub(crate) id: i32,
    pub(crate) name: String,
    pub(crate) scores: RepeatedField<i32>,
    pub(crate) labels: RepeatedField<String>,
    pub(crate) child: Option<Box<Sample>>,
    pub(crate) ratio: f64,
    pub(crate) unknown: UnknownFieldSet,
}

impl Sample {
    pub(crate) fn populated() -> Self {
        Sample {
            id: -42,
            name: "outer".to_string(),
            scores: vec![0, -1, 1, i32::MIN, i32::MAX].into(),
            labels: vec!["a".to_string(), String::new(), "ü".to_string()].into(),
            child: Some(Box::new(Sample {
                id: 7,
                name: "inner".to_string(),
                ..Default::default()
            })),
            ratio: 0.25,
            unknown: UnknownFieldSet::new(),
        }
    }

    /// Length of the chain of nested children
    pub(crate) fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let Some(child) = &current.child {
            depth += 1;
            current = child;
        }
        depth
    }
}

impl Message for Sample {
    fn merge_from(&mut self, reader: &mut CodedReader<'_>) -> Result<()> {
        loop {
            match reader.read_tag()? {
                0 => return Ok(()),
                ID_TAG => self.id = reader.read_int32()?,
                NAME_TAG => self.name = reader.read_string()?,
                SCORES_TAG | SCORES_UNPACKED_TAG => {
                    self.scores.add_entries_from(reader, &SCORES_CODEC)?
                }
                LABELS_TAG => self.labels.add_entries_from(reader, &LABELS_CODEC)?,
                CHILD_TAG => {
                    let child = self.child.get_or_insert_with(Box::default);
                    reader.read_message(child)?;
                }
                RATIO_TAG => self.ratio = reader.read_double()?,
                _ => {
                    if !self.unknown.merge_field_from(reader)? {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn compute_size(&self) -> usize {
        let mut size = 0;
        if self.id != 0 {
            size += 1 + wire::size_int32(self.id);
        }
        if !self.name.is_empty() {
            size += 1 + wire::size_string(&self.name);
        }
        size += self.scores.calculate_size(&SCORES_CODEC);
        size += self.labels.calculate_size(&LABELS_CODEC);
        if let Some(child) = &self.child {
            size += 1 + wire::size_message(child.as_ref());
        }
        if self.ratio != 0.0 {
            size += 1 + wire::FIXED64_SIZE;
        }
        size + self.unknown.calculate_size()
    }

    fn write_to(&self, writer: &mut CodedWriter<'_>) -> Result<()> {
        if self.id != 0 {
            writer.write_raw_tag(ID_TAG)?;
            writer.write_int32(self.id)?;
        }
        if !self.name.is_empty() {
            writer.write_raw_tag(NAME_TAG)?;
            writer.write_string(&self.name)?;
        }
        self.scores.write_to(writer, &SCORES_CODEC)?;
        self.labels.write_to(writer, &LABELS_CODEC)?;
        if let Some(child) = &self.child {
            writer.write_raw_tag(CHILD_TAG)?;
            writer.write_message(child.as_ref())?;
        }
        if self.ratio != 0.0 {
            writer.write_raw_tag(RATIO_TAG)?;
            writer.write_double(self.ratio)?;
        }
        self.unknown.write_to(writer)
    }
}
