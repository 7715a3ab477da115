//! Error taxonomy for opening and decoding client database files.

use super::layout::Format;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Unknown file type {0:?}")]
    UnsupportedFormat(String),
    #[error("File is corrupted: {0}")]
    CorruptHeader(String),
    #[error("Not a valid {format} file: signature {found:#010x}")]
    BadMagic { format: Format, found: u32 },
    #[error("Unexpected end of file: needed {needed} bytes at offset {offset}, {available} available")]
    TruncatedFile {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("Schema does not match record size: expected {expected} bytes, schema declares {got}")]
    FieldCountMismatch { expected: usize, got: usize },
    #[error("No string at offset {offset} in string block")]
    DanglingStringRef { offset: u32 },
    #[error("Unknown field type {0}!")]
    UnknownFieldType(String),
    #[error("Decode cancelled after {rows_done} rows")]
    Cancelled { rows_done: usize },
    #[error("Decode worker failed: {0}")]
    Worker(String),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Structural failures end the whole decode; only per-cell problems are recoverable.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            DbError::FieldCountMismatch { .. } | DbError::DanglingStringRef { .. }
        )
    }
}
