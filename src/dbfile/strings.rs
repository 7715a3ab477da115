//! String block: NUL-terminated strings keyed by their byte offset.

use super::errors::{DbError, Result};
use std::collections::{BTreeMap, HashMap};

/// Built once per file and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringBlock {
    entries: BTreeMap<u32, String>,
    reverse: HashMap<String, u32>,
    size: usize,
}

impl StringBlock {
    /// Split `bytes` on NUL; each fragment is keyed by its start offset.
    /// A trailing fragment without a terminator is kept as-is.
    pub fn parse(bytes: &[u8]) -> Self {
        let mut entries = BTreeMap::new();
        let mut reverse = HashMap::new();
        let mut pos = 0usize;
        while pos < bytes.len() {
            let end = bytes[pos..]
                .iter()
                .position(|&b| b == 0)
                .map_or(bytes.len(), |i| pos + i);
            let text = String::from_utf8_lossy(&bytes[pos..end]).into_owned();
            let offset = pos as u32;
            reverse.entry(text.clone()).or_insert(offset);
            entries.insert(offset, text);
            pos = end + 1;
        }
        Self {
            entries,
            reverse,
            size: bytes.len(),
        }
    }

    pub fn get(&self, offset: u32) -> Option<&str> {
        self.entries.get(&offset).map(String::as_str)
    }

    pub fn resolve(&self, offset: u32) -> Result<&str> {
        self.get(offset)
            .ok_or(DbError::DanglingStringRef { offset })
    }

    /// First offset at which `value` starts.
    pub fn offset_of(&self, value: &str) -> Option<u32> {
        self.reverse.get(value).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Size of the block in bytes.
    pub fn byte_size(&self) -> usize {
        self.size
    }
}
