//! Field lists describing how one record's bytes are laid out.
//!
//! A `Schema` is supplied from outside (see `definitions`) and is only read by
//! the file readers and the record decoder.

pub mod definitions;

pub use definitions::{Definitions, FieldDef, TableDefinition};

use crate::dbfile::{DbError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ------------------------------------------------------------------
// 1. Primitive types
// ------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    I64,
    U64,
    I32,
    U32,
    I16,
    U16,
    I8,
    U8,
    F32,
    F64,
    /// 4-byte string-block offset, or NUL-terminated inline text in `.wdb` rows.
    StringRef,
}

impl PrimitiveType {
    /// Width in a fixed-size record. `StringRef` is always a 4-byte offset there.
    #[inline(always)]
    pub fn fixed_width(self) -> usize {
        match self {
            Self::I64 | Self::U64 | Self::F64 => 8,
            Self::I32 | Self::U32 | Self::F32 | Self::StringRef => 4,
            Self::I16 | Self::U16 => 2,
            Self::I8 | Self::U8 => 1,
        }
    }

    /// Name used in table definitions.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::I64 => "long",
            Self::U64 => "ulong",
            Self::I32 => "int",
            Self::U32 => "uint",
            Self::I16 => "short",
            Self::U16 => "ushort",
            Self::I8 => "sbyte",
            Self::U8 => "byte",
            Self::F32 => "float",
            Self::F64 => "double",
            Self::StringRef => "string",
        }
    }
}

impl FromStr for PrimitiveType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "long" => Self::I64,
            "ulong" => Self::U64,
            "int" => Self::I32,
            "uint" => Self::U32,
            "short" => Self::I16,
            "ushort" => Self::U16,
            "sbyte" => Self::I8,
            "byte" => Self::U8,
            "float" => Self::F32,
            "double" => Self::F64,
            "string" => Self::StringRef,
            other => return Err(DbError::UnknownFieldType(other.to_string())),
        })
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ------------------------------------------------------------------
// 2. Fields
// ------------------------------------------------------------------

/// Presentation hints carried through untouched for the grid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldHints {
    pub format: Option<String>,
    pub visible: Option<bool>,
    pub width: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: PrimitiveType,
    pub is_key: bool,
    #[serde(default)]
    pub hints: FieldHints,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: PrimitiveType) -> Self {
        Self {
            name: name.into(),
            ty,
            is_key: false,
            hints: FieldHints::default(),
        }
    }

    pub fn key(name: impl Into<String>, ty: PrimitiveType) -> Self {
        Self {
            is_key: true,
            ..Self::new(name, ty)
        }
    }
}

// ------------------------------------------------------------------
// 3. Schema
// ------------------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has_strings(&self) -> bool {
        self.fields.iter().any(|f| f.ty == PrimitiveType::StringRef)
    }

    /// Sum of field widths in a fixed-size record.
    pub fn record_width(&self) -> usize {
        self.fields.iter().map(|f| f.ty.fixed_width()).sum()
    }

    /// Smallest possible inline row: every string empty (just its NUL).
    pub fn inline_min_width(&self) -> usize {
        self.fields
            .iter()
            .map(|f| match f.ty {
                PrimitiveType::StringRef => 1,
                ty => ty.fixed_width(),
            })
            .sum()
    }

    /// Indices of the fields flagged as key, in declared order.
    pub fn key_fields(&self) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_key)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn validate_width(&self, record_size: usize) -> Result<()> {
        let got = self.record_width();
        if got != record_size {
            return Err(DbError::FieldCountMismatch {
                expected: record_size,
                got,
            });
        }
        Ok(())
    }
}

impl FromIterator<Field> for Schema {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
