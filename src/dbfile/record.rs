//! Raw rows and their schema-driven conversion into typed values.

use super::cursor::ByteCursor;
use super::errors::{DbError, Result};
use super::layout::Format;
use super::strings::StringBlock;
use crate::schema::{PrimitiveType, Schema};
use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::Range;
use tracing::warn;

// ------------------------------------------------------------------
// 1. Raw rows
// ------------------------------------------------------------------

/// Undecoded bytes of one record, exactly as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    bytes: Vec<u8>,
}

impl RawRow {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<&[u8]> for RawRow {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

// ------------------------------------------------------------------
// 2. Values
// ------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I64(i64),
    U64(u64),
    I32(i32),
    U32(u32),
    I16(i16),
    U16(u16),
    I8(i8),
    U8(u8),
    F32(f32),
    F64(f64),
    Str(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Hashable identity used when grouping key tuples. Floats compare by bits.
    pub(crate) fn key_atom(&self) -> KeyAtom {
        match self {
            Value::I64(v) => KeyAtom::Int(i128::from(*v)),
            Value::U64(v) => KeyAtom::Int(i128::from(*v)),
            Value::I32(v) => KeyAtom::Int(i128::from(*v)),
            Value::U32(v) => KeyAtom::Int(i128::from(*v)),
            Value::I16(v) => KeyAtom::Int(i128::from(*v)),
            Value::U16(v) => KeyAtom::Int(i128::from(*v)),
            Value::I8(v) => KeyAtom::Int(i128::from(*v)),
            Value::U8(v) => KeyAtom::Int(i128::from(*v)),
            Value::F32(v) => KeyAtom::Bits(u64::from(v.to_bits())),
            Value::F64(v) => KeyAtom::Bits(v.to_bits()),
            Value::Str(s) => KeyAtom::Text(s.clone()),
        }
    }
}

/// Bare numbers and strings. NaN and infinities, which JSON cannot hold,
/// are written as `"NaN"`, `"inf"` and `"-inf"`.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::I64(v) => serializer.serialize_i64(*v),
            Value::U64(v) => serializer.serialize_u64(*v),
            Value::I32(v) => serializer.serialize_i32(*v),
            Value::U32(v) => serializer.serialize_u32(*v),
            Value::I16(v) => serializer.serialize_i16(*v),
            Value::U16(v) => serializer.serialize_u16(*v),
            Value::I8(v) => serializer.serialize_i8(*v),
            Value::U8(v) => serializer.serialize_u8(*v),
            Value::F32(v) if v.is_finite() => serializer.serialize_f32(*v),
            Value::F64(v) if v.is_finite() => serializer.serialize_f64(*v),
            Value::F32(_) | Value::F64(_) => serializer.collect_str(self),
            Value::Str(s) => serializer.serialize_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum KeyAtom {
    Int(i128),
    Bits(u64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I64(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::I8(v) => write!(f, "{}", v),
            Value::U8(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Str(s) => f.write_str(s),
        }
    }
}

/// Same bits seen as signed, unsigned and floating point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "width", rename_all = "lowercase")]
pub enum RawView {
    Bits32 { int: i32, uint: u32, float: f32 },
    Bits64 { long: i64, ulong: u64, double: f64 },
}

impl RawView {
    /// Only 4- and 8-byte slices have a view.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes.len() {
            4 => {
                let uint = u32::from_le_bytes(bytes.try_into().ok()?);
                Some(RawView::Bits32 {
                    int: uint as i32,
                    uint,
                    float: f32::from_bits(uint),
                })
            }
            8 => {
                let ulong = u64::from_le_bytes(bytes.try_into().ok()?);
                Some(RawView::Bits64 {
                    long: ulong as i64,
                    ulong,
                    double: f64::from_bits(ulong),
                })
            }
            _ => None,
        }
    }
}

// ------------------------------------------------------------------
// 3. Per-cell problems
// ------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodeWarning {
    /// The cell was replaced with an empty string.
    DanglingStringRef {
        row: usize,
        field: String,
        offset: u32,
    },
}

// ------------------------------------------------------------------
// 4. Decoder
// ------------------------------------------------------------------

/// Where `StringRef` fields get their text from.
#[derive(Debug, Clone, Copy)]
pub enum StringSource<'a> {
    /// 4-byte offset into a string block.
    Block(&'a StringBlock),
    /// 4-byte offset with nothing to resolve it against; cells stay empty.
    Absent,
    /// NUL-terminated bytes stored in the row itself.
    Inline,
}

impl<'a> StringSource<'a> {
    pub fn for_format(format: Format, strings: Option<&'a StringBlock>) -> Self {
        match (format, strings) {
            (Format::Wdb, _) => StringSource::Inline,
            (_, Some(block)) => StringSource::Block(block),
            (_, None) => StringSource::Absent,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecordDecoder<'a> {
    schema: &'a Schema,
    strings: StringSource<'a>,
}

impl<'a> RecordDecoder<'a> {
    pub fn new(schema: &'a Schema, strings: StringSource<'a>) -> Self {
        Self { schema, strings }
    }

    /// Decode one row field by field. A missing string-block entry becomes an
    /// empty string plus a warning; anything structural aborts.
    pub fn decode(
        &self,
        row: &RawRow,
        row_index: usize,
        warnings: &mut Vec<DecodeWarning>,
    ) -> Result<Vec<Value>> {
        let mut cur = ByteCursor::new(row.as_bytes());
        let mut values = Vec::with_capacity(self.schema.len());
        for field in self.schema.fields() {
            let value = match field.ty {
                PrimitiveType::StringRef => match self.strings {
                    StringSource::Inline => {
                        Value::Str(String::from_utf8_lossy(cur.take_cstr()?).into_owned())
                    }
                    StringSource::Absent => {
                        cur.read_u32()?;
                        Value::Str(String::new())
                    }
                    StringSource::Block(block) => {
                        let offset = cur.read_u32()?;
                        match block.resolve(offset) {
                            Ok(s) => Value::Str(s.to_string()),
                            Err(DbError::DanglingStringRef { offset }) => {
                                warn!(row = row_index, field = %field.name, offset, "dangling string reference");
                                warnings.push(DecodeWarning::DanglingStringRef {
                                    row: row_index,
                                    field: field.name.clone(),
                                    offset,
                                });
                                Value::Str(String::new())
                            }
                            Err(e) => return Err(e),
                        }
                    }
                },
                ty => read_numeric(&mut cur, ty)?,
            };
            values.push(value);
        }
        Ok(values)
    }

    /// Byte range of field `col` inside `row`.
    pub fn field_span(&self, row: &RawRow, col: usize) -> Option<Range<usize>> {
        let mut cur = ByteCursor::new(row.as_bytes());
        for (i, field) in self.schema.fields().iter().enumerate() {
            let start = cur.position();
            match (field.ty, self.strings) {
                (PrimitiveType::StringRef, StringSource::Inline) => {
                    cur.take_cstr().ok()?;
                }
                (ty, _) => cur.skip(ty.fixed_width()).ok()?,
            }
            if i == col {
                return Some(start..cur.position());
            }
        }
        None
    }
}

/// Straight little-endian reinterpretation; no range checks.
pub fn read_numeric(cur: &mut ByteCursor<'_>, ty: PrimitiveType) -> Result<Value> {
    Ok(match ty {
        PrimitiveType::I64 => Value::I64(cur.read_i64()?),
        PrimitiveType::U64 => Value::U64(cur.read_u64()?),
        PrimitiveType::I32 => Value::I32(cur.read_i32()?),
        PrimitiveType::U32 => Value::U32(cur.read_u32()?),
        PrimitiveType::I16 => Value::I16(cur.read_i16()?),
        PrimitiveType::U16 => Value::U16(cur.read_u16()?),
        PrimitiveType::I8 => Value::I8(cur.read_i8()?),
        PrimitiveType::U8 => Value::U8(cur.read_u8()?),
        PrimitiveType::F32 => Value::F32(cur.read_f32()?),
        PrimitiveType::F64 => Value::F64(cur.read_f64()?),
        PrimitiveType::StringRef => Value::U32(cur.read_u32()?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;

    #[test]
    fn test_decode_fixed_row() {
        let schema = Schema::new(vec![
            Field::key("ID", PrimitiveType::U32),
            Field::new("Name", PrimitiveType::StringRef),
            Field::new("Scale", PrimitiveType::F32),
            Field::new("Flags", PrimitiveType::I8),
        ]);
        let block = StringBlock::parse(b"\0Hogger\0");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&448u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        bytes.push(0xff);
        let row = RawRow::new(bytes);

        let decoder = RecordDecoder::new(&schema, StringSource::Block(&block));
        let mut warnings = Vec::new();
        let values = decoder.decode(&row, 0, &mut warnings).unwrap();
        assert_eq!(
            values,
            vec![
                Value::U32(448),
                Value::Str("Hogger".into()),
                Value::F32(1.5),
                Value::I8(-1),
            ]
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_dangling_reference_substitutes_empty() {
        let schema = Schema::new(vec![
            Field::new("Name", PrimitiveType::StringRef),
            Field::new("Next", PrimitiveType::U16),
        ]);
        let block = StringBlock::parse(b"\0Hogger\0");
        let mut bytes = 3u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&7u16.to_le_bytes());
        let row = RawRow::new(bytes);

        let decoder = RecordDecoder::new(&schema, StringSource::Block(&block));
        let mut warnings = Vec::new();
        let values = decoder.decode(&row, 4, &mut warnings).unwrap();
        assert_eq!(values, vec![Value::Str(String::new()), Value::U16(7)]);
        assert_eq!(
            warnings,
            vec![DecodeWarning::DanglingStringRef {
                row: 4,
                field: "Name".into(),
                offset: 3,
            }]
        );
    }

    #[test]
    fn test_inline_string_mid_schema() {
        let schema = Schema::new(vec![
            Field::new("Entry", PrimitiveType::U32),
            Field::new("Text", PrimitiveType::StringRef),
            Field::new("Tail", PrimitiveType::U16),
        ]);
        let mut bytes = 25u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"Lok'tar\0");
        bytes.extend_from_slice(&0xBEEFu16.to_le_bytes());
        let row = RawRow::new(bytes);

        let decoder = RecordDecoder::new(&schema, StringSource::Inline);
        let values = decoder.decode(&row, 0, &mut Vec::new()).unwrap();
        assert_eq!(
            values,
            vec![
                Value::U32(25),
                Value::Str("Lok'tar".into()),
                Value::U16(0xBEEF),
            ]
        );
        assert_eq!(decoder.field_span(&row, 1), Some(4..12));
        assert_eq!(decoder.field_span(&row, 2), Some(12..14));
    }

    #[test]
    fn test_float_bits_reinterpretation() {
        let original = -273.15f32;
        let bytes = original.to_le_bytes();
        let mut cur = ByteCursor::new(&bytes);
        let as_uint = match read_numeric(&mut cur, PrimitiveType::U32).unwrap() {
            Value::U32(v) => v,
            other => panic!("unexpected {:?}", other),
        };
        let back = f32::from_bits(as_uint);
        assert_eq!(back.to_bits(), original.to_bits());

        match RawView::from_bytes(&bytes).unwrap() {
            RawView::Bits32 { uint, float, .. } => {
                assert_eq!(uint, as_uint);
                assert_eq!(float.to_bits(), original.to_bits());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_floats_stay_visible_in_json() {
        let row = vec![
            Value::F32(f32::from_bits(0x7fc0_0000)),
            Value::F64(f64::INFINITY),
            Value::F32(f32::NEG_INFINITY),
            Value::F32(1.5),
            Value::U32(7),
            Value::Str("Hogger".into()),
        ];
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"["NaN","inf","-inf",1.5,7,"Hogger"]"#
        );
    }

    #[test]
    fn test_raw_view_widths() {
        assert!(RawView::from_bytes(&[1, 2]).is_none());
        match RawView::from_bytes(&(-2i64).to_le_bytes()).unwrap() {
            RawView::Bits64 { long, ulong, .. } => {
                assert_eq!(long, -2);
                assert_eq!(ulong, u64::MAX - 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
