//! Format readers: header parse, row materialization, string block.
//!
//! Each reader returns an `OpenedFile` that owns its rows; nothing here keeps
//! state between files.

use super::cursor::ByteCursor;
use super::errors::{DbError, Result};
use super::layout::{FileHeader, Format, TableCounts};
use super::record::RawRow;
use super::strings::StringBlock;
use crate::schema::{PrimitiveType, Schema};
use tracing::{debug, instrument};

/// Everything a reader pulled out of one file.
#[derive(Debug, Clone)]
pub struct OpenedFile {
    pub header: FileHeader,
    pub rows: Vec<RawRow>,
    pub strings: Option<StringBlock>,
    /// Fixed record width, `None` for variable-size rows.
    pub record_size: Option<usize>,
}

impl OpenedFile {
    pub fn format(&self) -> Format {
        self.header.format()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Parse `data` as `format`. The schema is only consulted by `.adb` (row
/// width) and `.wdb` (row boundaries).
#[instrument(skip(data, schema), fields(len = data.len()))]
pub fn open_bytes(format: Format, data: &[u8], schema: &Schema) -> Result<OpenedFile> {
    let mut cur = ByteCursor::new(data);
    let header = FileHeader::parse(format, data, &mut cur)?;
    debug!(?header, "header parsed");

    let opened = match header {
        FileHeader::Dbc(h) => read_counted(header, &h.counts, &mut cur)?,
        FileHeader::Db2(h) => read_counted(header, &h.counts, &mut cur)?,
        FileHeader::Adb(_) => read_uncounted(header, schema, &mut cur)?,
        FileHeader::Wdb(_) => {
            let rows = InlineRowReader::new(cur, schema)?.read_to_end()?;
            OpenedFile {
                header,
                rows,
                strings: None,
                record_size: None,
            }
        }
    };
    debug!(rows = opened.rows.len(), "rows materialized");
    Ok(opened)
}

fn read_fixed_rows(cur: &mut ByteCursor<'_>, count: usize, size: usize) -> Result<Vec<RawRow>> {
    let total = count.checked_mul(size).ok_or_else(|| {
        DbError::CorruptHeader(format!("{} rows of {} bytes overflow", count, size))
    })?;
    let region = cur.take(total)?;
    if size == 0 {
        return Ok(vec![RawRow::new(Vec::new()); count]);
    }
    Ok(region.chunks_exact(size).map(RawRow::from).collect())
}

/// `.dbc` / `.db2`: rows and string block sized by the header; nothing may follow.
fn read_counted(
    header: FileHeader,
    counts: &TableCounts,
    cur: &mut ByteCursor<'_>,
) -> Result<OpenedFile> {
    let size = counts.record_size as usize;
    if size == 0 && counts.record_count > 0 {
        return Err(DbError::CorruptHeader(format!(
            "{} records declared with a record size of 0",
            counts.record_count
        )));
    }
    let rows = read_fixed_rows(cur, counts.record_count as usize, size)?;
    let strings = StringBlock::parse(cur.take(counts.string_block_size as usize)?);
    if !cur.is_empty() {
        return Err(DbError::CorruptHeader(format!(
            "{} unexpected bytes after string block",
            cur.remaining()
        )));
    }
    Ok(OpenedFile {
        header,
        rows,
        strings: Some(strings),
        record_size: Some(size),
    })
}

/// `.adb`: the row count is whatever the remaining bytes hold at the schema's width.
fn read_uncounted(
    header: FileHeader,
    schema: &Schema,
    cur: &mut ByteCursor<'_>,
) -> Result<OpenedFile> {
    let size = schema.record_width();
    let remaining = cur.remaining();
    if size == 0 {
        return Err(DbError::FieldCountMismatch {
            expected: remaining,
            got: 0,
        });
    }
    let count = remaining / size;
    let tail = remaining % size;
    if tail != 0 {
        return Err(DbError::TruncatedFile {
            offset: cur.position() + count * size,
            needed: size,
            available: tail,
        });
    }
    let rows = read_fixed_rows(cur, count, size)?;
    Ok(OpenedFile {
        header,
        rows,
        strings: None,
        record_size: Some(size),
    })
}

// ------------------------------------------------------------------
// Variable-size rows
// ------------------------------------------------------------------

/// Pulls `.wdb` rows off a stream one at a time. Row boundaries come from the
/// schema: fixed fields advance by their width, strings run to their NUL.
#[derive(Debug, Clone)]
pub struct InlineRowReader<'a> {
    cur: ByteCursor<'a>,
    schema: &'a Schema,
}

impl<'a> InlineRowReader<'a> {
    pub fn new(cur: ByteCursor<'a>, schema: &'a Schema) -> Result<Self> {
        if schema.is_empty() && !cur.is_empty() {
            return Err(DbError::FieldCountMismatch {
                expected: cur.remaining(),
                got: 0,
            });
        }
        Ok(Self { cur, schema })
    }

    pub fn has_remaining(&self) -> bool {
        !self.cur.is_empty()
    }

    /// Next row, or `None` at a clean end of stream. A row cut short is `TruncatedFile`.
    pub fn next_row(&mut self) -> Result<Option<RawRow>> {
        if self.cur.is_empty() {
            return Ok(None);
        }
        let mut scan = self.cur.clone();
        let start = scan.position();
        for field in self.schema.fields() {
            match field.ty {
                PrimitiveType::StringRef => {
                    scan.take_cstr()?;
                }
                ty => scan.skip(ty.fixed_width())?,
            }
        }
        let len = scan.position() - start;
        let row = RawRow::from(self.cur.take(len)?);
        Ok(Some(row))
    }

    /// Up to `count` rows; fewer only if the stream ends on a row boundary.
    pub fn take_rows(&mut self, count: usize) -> Result<Vec<RawRow>> {
        let mut rows = Vec::with_capacity(count);
        while rows.len() < count {
            match self.next_row()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    pub fn read_to_end(mut self) -> Result<Vec<RawRow>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }
}
