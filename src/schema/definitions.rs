//! Table definitions document (TOML), keyed by file name.
//!
//! File names are matched with their extension because same-named tables in
//! different formats have different layouts.

use super::{Field, FieldHints, PrimitiveType, Schema};
use crate::dbfile::DbError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("Cannot read definitions: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed definitions: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0} missing definition!")]
    Missing(String),
    #[error("{file} has {count} definitions, pick one by index")]
    Ambiguous { file: String, count: usize },
    #[error("Invalid definition: {0}")]
    Schema(#[from] DbError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub key: bool,
    pub format: Option<String>,
    pub visible: Option<bool>,
    pub width: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub file: String,
    pub build: Option<u32>,
    #[serde(rename = "field", default)]
    pub fields: Vec<FieldDef>,
}

impl TableDefinition {
    /// Resolve type names; an unknown name fails before any row is touched.
    pub fn to_schema(&self) -> Result<Schema, DbError> {
        self.fields
            .iter()
            .map(|def| {
                let ty: PrimitiveType = def.ty.parse()?;
                Ok(Field {
                    name: def.name.clone(),
                    ty,
                    is_key: def.key,
                    hints: FieldHints {
                        format: def.format.clone(),
                        visible: def.visible,
                        width: def.width,
                    },
                })
            })
            .collect::<Result<Vec<_>, DbError>>()
            .map(Schema::new)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definitions {
    #[serde(rename = "table", default)]
    tables: Vec<TableDefinition>,
}

impl Definitions {
    pub fn from_toml_str(src: &str) -> Result<Self, DefinitionError> {
        let defs: Definitions = toml::from_str(src)?;
        debug!(tables = defs.tables.len(), "definitions parsed");
        Ok(defs)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let src = std::fs::read_to_string(path)?;
        Self::from_toml_str(&src)
    }

    pub fn tables(&self) -> &[TableDefinition] {
        &self.tables
    }

    /// Every definition registered for `file_name` (extension included).
    pub fn candidates(&self, file_name: &str) -> Vec<&TableDefinition> {
        self.tables
            .iter()
            .filter(|t| t.file.eq_ignore_ascii_case(file_name))
            .collect()
    }

    pub fn select(&self, file_name: &str, index: Option<usize>) -> Result<Schema, DefinitionError> {
        let candidates = self.candidates(file_name);
        let chosen = match (candidates.len(), index) {
            (0, _) => None,
            (1, None) => candidates.first().copied(),
            (count, None) => {
                return Err(DefinitionError::Ambiguous {
                    file: file_name.to_string(),
                    count,
                })
            }
            (_, Some(i)) => candidates.get(i).copied(),
        };
        let def = chosen.ok_or_else(|| DefinitionError::Missing(file_name.to_string()))?;
        Ok(def.to_schema()?)
    }
}
