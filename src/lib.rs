//! Reader for client database tables: `.dbc`, `.db2`, `.adb` and `.wdb`.

pub mod commands;
pub mod config;
pub mod dbfile;
pub mod schema;

pub use config::{ConfigError, ViewerConfig};
pub use dbfile::{
    decode, load_table, open_bytes, open_path, spawn_decode, DbError, DecodeRequest, DecodedTable,
    Format,
};
pub use schema::{Definitions, Field, PrimitiveType, Schema};
