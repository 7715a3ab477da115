//! Read-only access to table files on disk: map, dispatch, parse.

use super::errors::Result;
use super::layout::Format;
use super::reader::{open_bytes, OpenedFile};
use super::strings::StringBlock;
use crate::schema::Schema;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

pub struct MappedFile {
    path: PathBuf,
    mmap: Mmap,
}

impl MappedFile {
    /// Memory-map the file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        // SAFETY: the map is read-only and dropped with `self`; table files are
        // not expected to change while a decode is running.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { path, mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

/// Pick the reader from the extension, then parse the mapped bytes.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn open_path(path: impl AsRef<Path>, schema: &Schema) -> Result<OpenedFile> {
    let format = Format::from_path(&path)?;
    let mapped = MappedFile::open(&path)?;
    let opened = open_bytes(format, mapped.as_bytes(), schema)?;
    info!(%format, rows = opened.row_count(), bytes = mapped.len(), "file opened");
    Ok(opened)
}

/// String block of a `.dbc`/`.db2` file, used to resolve `.adb` string fields.
pub fn load_reference_strings(path: impl AsRef<Path>) -> Result<Option<StringBlock>> {
    let opened = open_path(path, &Schema::default())?;
    Ok(opened.strings)
}

/// Look for a same-stem `.db2`, then `.dbc`, in `dir`.
pub fn find_reference(dir: &Path, table_file: &Path) -> Option<PathBuf> {
    let stem = table_file.file_stem()?;
    [Format::Db2, Format::Dbc]
        .into_iter()
        .map(|f| dir.join(stem).with_extension(f.extension()))
        .find(|p| p.is_file())
}
