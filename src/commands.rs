use crate::config::{ConfigError, ViewerConfig};
use crate::dbfile::{find_reference, DecodeRequest, DecodedTable, Format};
use crate::schema::definitions::DefinitionError;
use crate::schema::Definitions;
use serde_json::{json, Map, Value as Json};
use std::path::{Path, PathBuf};

/// Config plus the definitions it points at, loaded once per run.
pub struct Session {
    config: ViewerConfig,
    definitions: Definitions,
}

/* ---------- 1.  SETUP ---------- */

impl Session {
    pub fn new(config: ViewerConfig) -> Result<Self, ConfigError> {
        let definitions = Definitions::load(&config.definitions).map_err(ConfigError::from)?;
        Ok(Self::with_definitions(config, definitions))
    }

    pub fn with_definitions(config: ViewerConfig, definitions: Definitions) -> Self {
        Self {
            config,
            definitions,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Build a decode request: schema by file name, reference strings for
    /// `.adb` from `reference` or the configured directory.
    pub fn request(
        &self,
        file: &Path,
        definition: Option<usize>,
        reference: Option<PathBuf>,
    ) -> Result<DecodeRequest, DefinitionError> {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let schema = self.definitions.select(&name, definition)?;
        let reference = match Format::from_path(file) {
            Ok(Format::Adb) => reference.or_else(|| {
                self.config
                    .reference_dir
                    .as_deref()
                    .and_then(|dir| find_reference(dir, file))
            }),
            _ => None,
        };
        Ok(DecodeRequest::new(file, schema)
            .with_reference(reference)
            .with_progress_step(self.config.progress_step))
    }
}

/* ---------- 2.  RENDERING ---------- */

/// Header, columns and key summary of a decoded table.
pub fn summary(table: &DecodedTable) -> Json {
    let written_at = match table.header() {
        crate::dbfile::FileHeader::Db2(h) => h.written_at(),
        crate::dbfile::FileHeader::Adb(h) => h.written_at(),
        _ => None,
    };
    json!({
        "table": table.name(),
        "format": table.format(),
        "header": table.header(),
        "written_at": written_at,
        "rows": table.row_count(),
        "columns": table.columns(),
        "primary_key": table
            .primary_key_columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>(),
        "warnings": table.warnings().len(),
    })
}

/// One row as a JSON object keyed by column name, in column order.
pub fn row_object(table: &DecodedTable, row: usize) -> Option<Json> {
    let values = table.rows().get(row)?;
    let mut obj = Map::new();
    for (col, value) in table.columns().iter().zip(values) {
        obj.insert(col.name.clone(), serde_json::to_value(value).ok()?);
    }
    Some(Json::Object(obj))
}

pub fn duplicate_report(table: &DecodedTable) -> Vec<Json> {
    table
        .duplicate_keys()
        .into_iter()
        .map(|d| json!({ "key": d.key, "rows": d.rows }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbfile::{decode, open_bytes, CancelToken, DbcHeader};

    const DEFS: &str = r#"
[[table]]
file = "Faction.dbc"
[[table.field]]
name = "ID"
type = "uint"
key = true
[[table.field]]
name = "Name"
type = "string"

[[table]]
file = "Faction.adb"
[[table.field]]
name = "ID"
type = "uint"
[[table.field]]
name = "Name"
type = "string"
"#;

    fn faction_dbc() -> Vec<u8> {
        let strings = b"\0Stormwind\0";
        let mut buf = DbcHeader::MAGIC.to_le_bytes().to_vec();
        for v in [2u32, 2, 8, strings.len() as u32] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        for (id, name) in [(72u32, 1u32), (72, 0)] {
            buf.extend_from_slice(&id.to_le_bytes());
            buf.extend_from_slice(&name.to_le_bytes());
        }
        buf.extend_from_slice(strings);
        buf
    }

    fn session(reference_dir: Option<PathBuf>) -> Session {
        let config = ViewerConfig::builder()
            .reference_dir(reference_dir)
            .build()
            .unwrap();
        Session::with_definitions(config, Definitions::from_toml_str(DEFS).unwrap())
    }

    fn faction_table() -> DecodedTable {
        let s = session(None);
        let request = s.request(Path::new("Faction.dbc"), None, None).unwrap();
        let opened = open_bytes(Format::Dbc, &faction_dbc(), &request.schema).unwrap();
        decode(
            "Faction.dbc",
            opened,
            &request.schema,
            None,
            1,
            &mut |_| {},
            &CancelToken::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_row_object_keeps_names() {
        let table = faction_table();
        assert_eq!(
            row_object(&table, 0).unwrap(),
            json!({ "ID": 72, "Name": "Stormwind" })
        );
        assert!(row_object(&table, 2).is_none());
    }

    #[test]
    fn test_summary_and_duplicates() {
        let table = faction_table();
        let s = summary(&table);
        assert_eq!(s["rows"], 2);
        assert_eq!(s["format"], "dbc");
        assert_eq!(s["primary_key"], json!(["ID"]));

        let dups = duplicate_report(&table);
        assert_eq!(dups, vec![json!({ "key": [72], "rows": [0, 1] })]);
    }

    #[test]
    fn test_request_uses_reference_dir_for_adb() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Faction.dbc"), faction_dbc()).unwrap();
        let s = session(Some(dir.path().to_path_buf()));

        let adb = s.request(Path::new("cache/Faction.adb"), None, None).unwrap();
        assert_eq!(adb.reference, Some(dir.path().join("Faction.dbc")));

        let dbc = s.request(Path::new("Faction.dbc"), None, None).unwrap();
        assert_eq!(dbc.reference, None);
    }
}
