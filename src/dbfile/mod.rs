//! Client database files: `.dbc`, `.db2`, `.adb` and `.wdb` tables.
//!
//! Dispatch by extension, parse the header, materialize raw rows, then decode
//! each row against an external schema.

pub mod cursor;
pub mod decode;
pub mod errors;
pub mod layout;
pub mod reader;
pub mod record;
pub mod store;
pub mod strings;
pub mod table;

pub use decode::{decode, load_table, spawn_decode, CancelToken, DecodeHandle, DecodeRequest, Progress};
pub use errors::{DbError, Result};
pub use layout::{AdbHeader, Db2Extended, Db2Header, DbcHeader, FileHeader, Format, TableCounts, WdbHeader};
pub use reader::{open_bytes, InlineRowReader, OpenedFile};
pub use record::{DecodeWarning, RawRow, RawView, RecordDecoder, StringSource, Value};
pub use store::{find_reference, load_reference_strings, open_path, MappedFile};
pub use strings::StringBlock;
pub use table::{Column, DecodedTable, DuplicateKey};
