//! Binary layout definitions: format variants, signatures and headers.
//!
//! All values are little-endian. Headers are parsed with an explicit cursor so
//! the conditional parts of the `.db2` header stay visible as branches.

use super::cursor::ByteCursor;
use super::errors::{DbError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::debug;

// ------------------------------------------------------------------
// 1. Format variants
// ------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Plain header, fixed rows, trailing string block.
    Dbc,
    /// Extended header with optional id index, fixed rows, string block.
    Db2,
    /// No usable row count; rows sized from the schema, no string block.
    Adb,
    /// Variable-size rows with inline NUL-terminated strings.
    Wdb,
}

impl Format {
    pub const ALL: [Format; 4] = [Format::Dbc, Format::Db2, Format::Adb, Format::Wdb];

    /// Pick a reader by extension. The extension is authoritative: no sniffing.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::from_extension(ext)
    }

    pub fn from_extension(ext: &str) -> Result<Self> {
        let ext = ext.trim_start_matches('.');
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(ext))
            .ok_or_else(|| DbError::UnsupportedFormat(format!(".{}", ext.to_uppercase())))
    }

    pub fn extension(self) -> &'static str {
        match self {
            Format::Dbc => "dbc",
            Format::Db2 => "db2",
            Format::Adb => "adb",
            Format::Wdb => "wdb",
        }
    }

    /// Whether every record has the same byte width.
    pub fn is_fixed_width(self) -> bool {
        !matches!(self, Format::Wdb)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Dbc => "DBC",
            Format::Db2 => "DB2",
            Format::Adb => "ADB",
            Format::Wdb => "WDB",
        })
    }
}

// ------------------------------------------------------------------
// 2. Shared helpers
// ------------------------------------------------------------------

/// Header reads that run off the buffer mean the header itself is damaged.
fn header_read<T>(res: Result<T>) -> Result<T> {
    res.map_err(|e| match e {
        DbError::TruncatedFile {
            offset, available, ..
        } => DbError::CorruptHeader(format!(
            "header cut short at offset {} ({} bytes left)",
            offset, available
        )),
        other => other,
    })
}

fn require_len(data: &[u8], size: usize, format: Format) -> Result<()> {
    if data.len() < size {
        return Err(DbError::CorruptHeader(format!(
            "{} header needs {} bytes, file has {}",
            format,
            size,
            data.len()
        )));
    }
    Ok(())
}

fn expect_magic(cur: &mut ByteCursor<'_>, expected: &[u32], format: Format) -> Result<u32> {
    let found = header_read(cur.read_u32())?;
    if !expected.contains(&found) {
        return Err(DbError::BadMagic { format, found });
    }
    Ok(found)
}

fn read_count(cur: &mut ByteCursor<'_>, what: &str) -> Result<u32> {
    let value = header_read(cur.read_i32())?;
    u32::try_from(value)
        .map_err(|_| DbError::CorruptHeader(format!("negative {}: {}", what, value)))
}

fn timestamp(secs: u32) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(i64::from(secs), 0)
}

// ------------------------------------------------------------------
// 3. Counters shared by `.dbc` and `.db2`
// ------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub record_count: u32,
    pub field_count: u32,
    pub record_size: u32,
    pub string_block_size: u32,
}

impl TableCounts {
    fn parse(cur: &mut ByteCursor<'_>) -> Result<Self> {
        Ok(Self {
            record_count: read_count(cur, "record count")?,
            field_count: read_count(cur, "field count")?,
            record_size: read_count(cur, "record size")?,
            string_block_size: read_count(cur, "string block size")?,
        })
    }
}

/// `.dbc` header: signature plus the four counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DbcHeader {
    pub counts: TableCounts,
}

impl DbcHeader {
    pub const MAGIC: u32 = u32::from_le_bytes(*b"WDBC");
    pub const SIZE: usize = 20;

    pub fn parse(cur: &mut ByteCursor<'_>) -> Result<Self> {
        expect_magic(cur, &[Self::MAGIC], Format::Dbc)?;
        Ok(Self {
            counts: TableCounts::parse(cur)?,
        })
    }
}

// ------------------------------------------------------------------
// 4. `.db2`
// ------------------------------------------------------------------

/// Present only when the build is newer than `Db2Header::EXTENDED_BUILD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Db2Extended {
    pub min_id: i32,
    pub max_id: i32,
    pub locale: u32,
    pub reserved: u32,
}

impl Db2Extended {
    /// Entries in the id index (and in the allocation bank that follows it).
    /// A zero `max_id` means neither array is stored.
    pub fn index_entries(&self) -> Result<usize> {
        if self.max_id == 0 {
            return Ok(0);
        }
        let span = i64::from(self.max_id) - i64::from(self.min_id) + 1;
        usize::try_from(span).map_err(|_| {
            DbError::CorruptHeader(format!(
                "id range {}..={} is inverted",
                self.min_id, self.max_id
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Db2Header {
    pub counts: TableCounts,
    pub table_hash: u32,
    pub build: u32,
    pub timestamp_written: u32,
    pub extended: Option<Db2Extended>,
}

impl Db2Header {
    pub const MAGIC: u32 = u32::from_le_bytes(*b"WDB2");
    pub const SIZE: usize = 32;
    pub const EXTENDED_SIZE: usize = 48;
    /// Builds above this carry the extended header.
    pub const EXTENDED_BUILD: u32 = 12880;

    /// Parse the header and leave the cursor at the first row, past the
    /// optional id index (4 bytes per entry) and allocation bank (2 bytes per entry).
    pub fn parse(cur: &mut ByteCursor<'_>) -> Result<Self> {
        expect_magic(cur, &[Self::MAGIC], Format::Db2)?;
        let counts = TableCounts::parse(cur)?;
        let table_hash = header_read(cur.read_u32())?;
        let build = header_read(cur.read_u32())?;
        let timestamp_written = header_read(cur.read_u32())?;

        let extended = if build > Self::EXTENDED_BUILD {
            Some(Db2Extended {
                min_id: header_read(cur.read_i32())?,
                max_id: header_read(cur.read_i32())?,
                locale: header_read(cur.read_u32())?,
                reserved: header_read(cur.read_u32())?,
            })
        } else {
            None
        };

        let header = Self {
            counts,
            table_hash,
            build,
            timestamp_written,
            extended,
        };

        let entries = header.index_entries()?;
        if entries > 0 {
            cur.skip(entries * 4)?;
            cur.skip(entries * 2)?;
        }
        debug!(build, entries, "db2 header parsed");
        Ok(header)
    }

    pub fn index_entries(&self) -> Result<usize> {
        self.extended
            .as_ref()
            .map_or(Ok(0), Db2Extended::index_entries)
    }

    /// Bytes between the end of the header words and the first row.
    pub fn index_bytes(&self) -> Result<usize> {
        Ok(self.index_entries()? * 6)
    }

    pub fn header_size(&self) -> usize {
        if self.extended.is_some() {
            Self::EXTENDED_SIZE
        } else {
            Self::SIZE
        }
    }

    pub fn written_at(&self) -> Option<DateTime<Utc>> {
        timestamp(self.timestamp_written)
    }
}

// ------------------------------------------------------------------
// 5. `.adb`
// ------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdbHeader {
    pub table_hash: u32,
    pub build: u32,
    pub timestamp_written: u32,
    pub locale: u32,
}

impl AdbHeader {
    pub const MAGIC: u32 = u32::from_le_bytes(*b"WCH2");
    pub const SIZE: usize = 48;

    pub fn parse(cur: &mut ByteCursor<'_>) -> Result<Self> {
        expect_magic(cur, &[Self::MAGIC], Format::Adb)?;
        // legacy counters: record count, field count, record size, string size
        header_read(cur.skip(16))?;
        let table_hash = header_read(cur.read_u32())?;
        let build = header_read(cur.read_u32())?;
        let timestamp_written = header_read(cur.read_u32())?;
        // min id, max id
        header_read(cur.skip(8))?;
        let locale = header_read(cur.read_u32())?;
        header_read(cur.skip(4))?;
        Ok(Self {
            table_hash,
            build,
            timestamp_written,
            locale,
        })
    }

    pub fn written_at(&self) -> Option<DateTime<Utc>> {
        timestamp(self.timestamp_written)
    }
}

// ------------------------------------------------------------------
// 6. `.wdb`
// ------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WdbHeader {
    pub magic: u32,
    pub build: u32,
    pub locale: [u8; 4],
    pub entry_size_hint: u32,
    pub entry_version: u32,
}

impl WdbHeader {
    /// Signatures of the known cache tables (stored reversed on disk).
    pub const SIGNATURES: [u32; 8] = [
        u32::from_le_bytes(*b"BDIW"), // item
        u32::from_le_bytes(*b"BOMW"), // creature
        u32::from_le_bytes(*b"BOGW"), // gameobject
        u32::from_le_bytes(*b"BDNW"), // item name
        u32::from_le_bytes(*b"XTIW"), // item text
        u32::from_le_bytes(*b"CPNW"), // npc text
        u32::from_le_bytes(*b"XTPW"), // page text
        u32::from_le_bytes(*b"TSQW"), // quest
    ];
    pub const SIZE: usize = 24;

    pub fn parse(cur: &mut ByteCursor<'_>) -> Result<Self> {
        let magic = expect_magic(cur, &Self::SIGNATURES, Format::Wdb)?;
        let build = header_read(cur.read_u32())?;
        let mut locale = [0u8; 4];
        locale.copy_from_slice(header_read(cur.take(4))?);
        let entry_size_hint = header_read(cur.read_u32())?;
        let entry_version = header_read(cur.read_u32())?;
        header_read(cur.skip(4))?;
        Ok(Self {
            magic,
            build,
            locale,
            entry_size_hint,
            entry_version,
        })
    }

    /// Locale tag in reading order (`"SUne"` on disk is `"enUS"`).
    pub fn locale_tag(&self) -> String {
        self.locale.iter().rev().map(|&b| b as char).collect()
    }
}

// ------------------------------------------------------------------
// 7. Header sum type
// ------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum FileHeader {
    Dbc(DbcHeader),
    Db2(Db2Header),
    Adb(AdbHeader),
    Wdb(WdbHeader),
}

impl FileHeader {
    /// Check the minimum length, then parse the header for `format`.
    pub fn parse(format: Format, data: &[u8], cur: &mut ByteCursor<'_>) -> Result<Self> {
        let min = match format {
            Format::Dbc => DbcHeader::SIZE,
            Format::Db2 => Db2Header::SIZE,
            Format::Adb => AdbHeader::SIZE,
            Format::Wdb => WdbHeader::SIZE,
        };
        require_len(data, min, format)?;
        Ok(match format {
            Format::Dbc => FileHeader::Dbc(DbcHeader::parse(cur)?),
            Format::Db2 => FileHeader::Db2(Db2Header::parse(cur)?),
            Format::Adb => FileHeader::Adb(AdbHeader::parse(cur)?),
            Format::Wdb => FileHeader::Wdb(WdbHeader::parse(cur)?),
        })
    }

    pub fn format(&self) -> Format {
        match self {
            FileHeader::Dbc(_) => Format::Dbc,
            FileHeader::Db2(_) => Format::Db2,
            FileHeader::Adb(_) => Format::Adb,
            FileHeader::Wdb(_) => Format::Wdb,
        }
    }

    /// Counters declared by the header, for formats that have them.
    pub fn counts(&self) -> Option<&TableCounts> {
        match self {
            FileHeader::Dbc(h) => Some(&h.counts),
            FileHeader::Db2(h) => Some(&h.counts),
            FileHeader::Adb(_) | FileHeader::Wdb(_) => None,
        }
    }

    pub fn build(&self) -> Option<u32> {
        match self {
            FileHeader::Dbc(_) => None,
            FileHeader::Db2(h) => Some(h.build),
            FileHeader::Adb(h) => Some(h.build),
            FileHeader::Wdb(h) => Some(h.build),
        }
    }
}
