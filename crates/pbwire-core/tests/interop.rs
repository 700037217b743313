//! Bit-exactness checks against prost's encoder.

use pbwire_core::wire::{make_tag, size_message, size_sint32, size_string, WireType};
use pbwire_core::{
    CodedReader, CodedWriter, FieldCodec, Message, RepeatedField, Result, UnknownFieldSet,
};
use pretty_assertions::assert_eq;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FieldOptions, FileDescriptorProto,
};

#[derive(Clone, PartialEq, prost::Message)]
struct ProstInner {
    #[prost(string, tag = "1")]
    label: String,
}

#[derive(Clone, PartialEq, prost::Message)]
struct ProstPoint {
    #[prost(sint32, tag = "1")]
    x: i32,
    #[prost(int64, tag = "2")]
    y: i64,
    #[prost(string, repeated, tag = "3")]
    tags: Vec<String>,
    #[prost(double, repeated, tag = "4")]
    weights: Vec<f64>,
    #[prost(message, optional, tag = "5")]
    inner: Option<ProstInner>,
}

#[derive(Debug, Default, PartialEq)]
struct Inner {
    label: String,
}

impl Message for Inner {
    fn merge_from(&mut self, reader: &mut CodedReader<'_>) -> Result<()> {
        loop {
            match reader.read_tag()? {
                0 => return Ok(()),
                0x0A => self.label = reader.read_string()?,
                _ => reader.skip_last_field()?,
            }
        }
    }

    fn compute_size(&self) -> usize {
        if self.label.is_empty() {
            0
        } else {
            1 + size_string(&self.label)
        }
    }

    fn write_to(&self, writer: &mut CodedWriter<'_>) -> Result<()> {
        if !self.label.is_empty() {
            writer.write_tag(1, WireType::LengthDelimited)?;
            writer.write_string(&self.label)?;
        }
        Ok(())
    }
}

const TAGS: FieldCodec<String> = FieldCodec::for_string(make_tag(3, WireType::LengthDelimited));
const WEIGHTS: FieldCodec<f64> = FieldCodec::for_double(make_tag(4, WireType::LengthDelimited));

#[derive(Debug, Default, PartialEq)]
struct Point {
    x: i32,
    y: i64,
    tags: RepeatedField<String>,
    weights: RepeatedField<f64>,
    inner: Option<Inner>,
}

impl Message for Point {
    fn merge_from(&mut self, reader: &mut CodedReader<'_>) -> Result<()> {
        loop {
            match reader.read_tag()? {
                0 => return Ok(()),
                0x08 => self.x = reader.read_sint32()?,
                0x10 => self.y = reader.read_int64()?,
                0x1A => self.tags.add_entries_from(reader, &TAGS)?,
                0x21 | 0x22 => self.weights.add_entries_from(reader, &WEIGHTS)?,
                0x2A => reader.read_message(self.inner.get_or_insert_with(Inner::default))?,
                _ => reader.skip_last_field()?,
            }
        }
    }

    fn compute_size(&self) -> usize {
        let mut size = 0;
        if self.x != 0 {
            size += 1 + size_sint32(self.x);
        }
        if self.y != 0 {
            size += 1 + pbwire_core::wire::size_int64(self.y);
        }
        size += self.tags.calculate_size(&TAGS);
        size += self.weights.calculate_size(&WEIGHTS);
        if let Some(inner) = &self.inner {
            size += 1 + size_message(inner);
        }
        size
    }

    fn write_to(&self, writer: &mut CodedWriter<'_>) -> Result<()> {
        if self.x != 0 {
            writer.write_tag(1, WireType::Varint)?;
            writer.write_sint32(self.x)?;
        }
        if self.y != 0 {
            writer.write_tag(2, WireType::Varint)?;
            writer.write_int64(self.y)?;
        }
        self.tags.write_to(writer, &TAGS)?;
        self.weights.write_to(writer, &WEIGHTS)?;
        if let Some(inner) = &self.inner {
            writer.write_tag(5, WireType::LengthDelimited)?;
            writer.write_message(inner)?;
        }
        Ok(())
    }
}

fn prost_point() -> ProstPoint {
    ProstPoint {
        x: -12345,
        y: -1,
        tags: vec!["alpha".to_string(), String::new(), "γ".to_string()],
        weights: vec![0.5, -2.0, f64::MAX],
        inner: Some(ProstInner {
            label: "inner".to_string(),
        }),
    }
}

fn our_point() -> Point {
    Point {
        x: -12345,
        y: -1,
        tags: vec!["alpha".to_string(), String::new(), "γ".to_string()].into(),
        weights: vec![0.5, -2.0, f64::MAX].into(),
        inner: Some(Inner {
            label: "inner".to_string(),
        }),
    }
}

#[test]
fn test_message_bytes_match_prost() {
    let expected = prost::Message::encode_to_vec(&prost_point());
    let ours = our_point();
    assert_eq!(ours.compute_size(), expected.len());
    assert_eq!(ours.encode_to_vec().unwrap(), expected);
    assert_eq!(Point::decode(&expected).unwrap(), ours);
}

#[test]
fn test_prost_decodes_our_bytes() {
    let bytes = our_point().encode_to_vec().unwrap();
    let decoded: ProstPoint = prost::Message::decode(bytes.as_slice()).unwrap();
    assert_eq!(decoded, prost_point());
}

#[test]
fn test_unpacked_doubles_are_accepted() {
    let mut buf = Vec::new();
    prost::encoding::double::encode_repeated(4, &[1.0, 2.0], &mut buf);
    let point = Point::decode(&buf).unwrap();
    assert_eq!(point.weights.as_slice(), &[1.0, 2.0]);
}

#[test]
fn test_scalar_encodings_match_prost() {
    for value in [0i32, 1, -1, 127, 128, i32::MIN, i32::MAX] {
        let mut expected = Vec::new();
        prost::encoding::int32::encode(1, &value, &mut expected);
        prost::encoding::sint32::encode(2, &value, &mut expected);
        prost::encoding::sfixed32::encode(3, &value, &mut expected);

        let mut writer = CodedWriter::new();
        writer.write_tag(1, WireType::Varint).unwrap();
        writer.write_int32(value).unwrap();
        writer.write_tag(2, WireType::Varint).unwrap();
        writer.write_sint32(value).unwrap();
        writer.write_tag(3, WireType::Fixed32).unwrap();
        writer.write_sfixed32(value).unwrap();
        assert_eq!(writer.into_vec().unwrap(), expected, "value {}", value);
    }

    for value in [0u64, 300, u64::MAX] {
        let mut expected = Vec::new();
        prost::encoding::uint64::encode(16, &value, &mut expected);
        prost::encoding::fixed64::encode(17, &value, &mut expected);

        let mut writer = CodedWriter::new();
        writer.write_tag(16, WireType::Varint).unwrap();
        writer.write_uint64(value).unwrap();
        writer.write_tag(17, WireType::Fixed64).unwrap();
        writer.write_fixed64(value).unwrap();
        assert_eq!(writer.into_vec().unwrap(), expected, "value {}", value);
    }
}

#[test]
fn test_packed_matches_prost() {
    let values = [3i64, -270, 86942, i64::MIN];
    let mut expected = Vec::new();
    prost::encoding::sint64::encode_packed(7, &values, &mut expected);

    let codec = FieldCodec::for_sint64(make_tag(7, WireType::LengthDelimited));
    let field: RepeatedField<i64> = values.iter().copied().collect();
    let mut writer = CodedWriter::new();
    field.write_to(&mut writer, &codec).unwrap();
    assert_eq!(writer.into_vec().unwrap(), expected);
    assert_eq!(field.calculate_size(&codec), expected.len());
}

fn descriptor() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("shapes.proto".to_string()),
        package: Some("shapes".to_string()),
        message_type: vec![DescriptorProto {
            name: Some("Polygon".to_string()),
            field: vec![
                FieldDescriptorProto {
                    name: Some("points".to_string()),
                    number: Some(1),
                    label: Some(Label::Repeated as i32),
                    r#type: Some(Type::Message as i32),
                    type_name: Some(".shapes.Point".to_string()),
                    ..Default::default()
                },
                FieldDescriptorProto {
                    name: Some("sides".to_string()),
                    number: Some(2),
                    label: Some(Label::Repeated as i32),
                    r#type: Some(Type::Int32 as i32),
                    options: Some(FieldOptions {
                        packed: Some(true),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ],
            nested_type: vec![DescriptorProto {
                name: Some("Point".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

#[test]
fn test_descriptor_round_trips_as_unknown_fields() {
    let bytes = prost::Message::encode_to_vec(&descriptor());
    let set = UnknownFieldSet::decode(&bytes).unwrap();
    assert_eq!(set.field_numbers().collect::<Vec<_>>(), vec![1, 2, 4, 12]);
    assert_eq!(set.get(1).unwrap().length_delimited()[0], b"shapes.proto"[..]);

    let reencoded = set.encode_to_vec().unwrap();
    assert_eq!(reencoded, bytes);

    let decoded: FileDescriptorProto = prost::Message::decode(reencoded.as_slice()).unwrap();
    assert_eq!(decoded, descriptor());
}

#[test]
fn test_length_delimited_file_stream() {
    use std::io::{Seek, SeekFrom, Write};

    let mut file = tempfile::tempfile().unwrap();
    our_point().encode_length_delimited_to(&mut file).unwrap();
    Point::default().encode_length_delimited_to(&mut file).unwrap();
    file.flush().unwrap();

    file.seek(SeekFrom::Start(0)).unwrap();
    let mut bytes = Vec::new();
    std::io::Read::read_to_end(&mut file, &mut bytes).unwrap();
    let mut buf = bytes.as_slice();
    let first: ProstPoint = prost::Message::decode_length_delimited(&mut buf).unwrap();
    assert_eq!(first, prost_point());

    file.seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(Point::decode_length_delimited(&mut file).unwrap(), Some(our_point()));
    assert_eq!(Point::decode_length_delimited(&mut file).unwrap(), Some(Point::default()));
    assert_eq!(Point::decode_length_delimited(&mut file).unwrap(), None);
}

#[test]
fn test_stream_decode_matches_slice_decode() {
    let bytes = prost::Message::encode_to_vec(&descriptor());
    let from_slice = UnknownFieldSet::decode(&bytes).unwrap();
    let from_stream = UnknownFieldSet::decode_from(std::io::Cursor::new(bytes)).unwrap();
    assert_eq!(from_slice, from_stream);
}
