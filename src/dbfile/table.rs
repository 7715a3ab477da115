//! Decoded table handed to consumers (grid, exporter).

use super::layout::{FileHeader, Format};
use super::record::{DecodeWarning, KeyAtom, RawRow, RawView, RecordDecoder, StringSource, Value};
use super::strings::StringBlock;
use crate::schema::{FieldHints, PrimitiveType, Schema};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub ty: PrimitiveType,
    pub is_key: bool,
    pub hints: FieldHints,
}

/// A key tuple seen on more than one row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateKey {
    pub key: Vec<Value>,
    pub rows: Vec<usize>,
}

/// Immutable once built; a re-decode produces a new table.
#[derive(Debug, Clone)]
pub struct DecodedTable {
    name: String,
    header: FileHeader,
    schema: Schema,
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
    primary_key: Vec<usize>,
    warnings: Vec<DecodeWarning>,
    raw_rows: Vec<RawRow>,
    strings: Option<Arc<StringBlock>>,
}

impl DecodedTable {
    pub(crate) fn new(
        name: String,
        header: FileHeader,
        schema: Schema,
        rows: Vec<Vec<Value>>,
        warnings: Vec<DecodeWarning>,
        raw_rows: Vec<RawRow>,
        strings: Option<Arc<StringBlock>>,
    ) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|f| Column {
                name: f.name.clone(),
                ty: f.ty,
                is_key: f.is_key,
                hints: f.hints.clone(),
            })
            .collect();
        let primary_key = schema.key_fields();
        Self {
            name,
            header,
            schema,
            columns,
            rows,
            primary_key,
            warnings,
            raw_rows,
            strings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> Format {
        self.header.format()
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn warnings(&self) -> &[DecodeWarning] {
        &self.warnings
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// All values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Value> {
        self.rows.get(row)?.get(col)
    }

    // --- keys ----------------------------------------------------------------

    pub fn primary_key_columns(&self) -> Vec<&Column> {
        self.primary_key.iter().map(|&i| &self.columns[i]).collect()
    }

    /// Key tuple of `row`; empty when the schema flags no key.
    pub fn key_of(&self, row: usize) -> Option<Vec<&Value>> {
        let values = self.rows.get(row)?;
        Some(self.primary_key.iter().map(|&i| &values[i]).collect())
    }

    /// Key tuples shared by several rows. Uniqueness is reported, never enforced.
    pub fn duplicate_keys(&self) -> Vec<DuplicateKey> {
        if self.primary_key.is_empty() {
            return Vec::new();
        }
        let mut order: Vec<Vec<KeyAtom>> = Vec::new();
        let mut groups: HashMap<Vec<KeyAtom>, Vec<usize>> = HashMap::new();
        for (i, values) in self.rows.iter().enumerate() {
            let atoms: Vec<KeyAtom> = self
                .primary_key
                .iter()
                .map(|&c| values[c].key_atom())
                .collect();
            let rows = groups.entry(atoms.clone()).or_insert_with(|| {
                order.push(atoms);
                Vec::new()
            });
            rows.push(i);
        }
        order
            .into_iter()
            .filter_map(|atoms| {
                let rows = groups.remove(&atoms)?;
                if rows.len() < 2 {
                    return None;
                }
                let first = &self.rows[rows[0]];
                Some(DuplicateKey {
                    key: self.primary_key.iter().map(|&c| first[c].clone()).collect(),
                    rows,
                })
            })
            .collect()
    }

    // --- raw inspection --------------------------------------------------------

    /// The stored bits of a 4- or 8-byte cell under every numeric reading.
    pub fn raw_view(&self, row: usize, col: usize) -> Option<RawView> {
        let raw = self.raw_rows.get(row)?;
        let source = match self.format() {
            Format::Wdb if self.columns.get(col)?.ty == PrimitiveType::StringRef => return None,
            Format::Wdb => StringSource::Inline,
            _ => StringSource::Absent,
        };
        let span = RecordDecoder::new(&self.schema, source).field_span(raw, col)?;
        RawView::from_bytes(&raw.as_bytes()[span])
    }

    /// Offset in the string block where `value` starts; `None` for inline strings.
    pub fn string_offset(&self, value: &str) -> Option<u32> {
        self.strings.as_ref()?.offset_of(value)
    }
}
