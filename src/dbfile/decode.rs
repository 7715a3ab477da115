//! Decode pipeline: width check, per-row decode, progress and cancellation.
//!
//! A decode either publishes a whole `DecodedTable` or nothing. Cancellation is
//! checked between rows only.

use super::errors::{DbError, Result};
use super::layout::Format;
use super::reader::OpenedFile;
use super::record::{RecordDecoder, StringSource};
use super::store::{load_reference_strings, open_path};
use super::strings::StringBlock;
use super::table::DecodedTable;
use crate::schema::Schema;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

// ------------------------------------------------------------------
// 1. Progress & cancellation
// ------------------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub rows_done: usize,
    pub rows_total: usize,
    pub percent: u8,
}

impl Progress {
    fn at(rows_done: usize, rows_total: usize) -> Self {
        let percent = if rows_total == 0 {
            100
        } else {
            (rows_done * 100 / rows_total) as u8
        };
        Self {
            rows_done,
            rows_total,
            percent,
        }
    }
}

/// Cooperative stop flag shared with a running decode.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ------------------------------------------------------------------
// 2. Decode
// ------------------------------------------------------------------

/// Turn an opened file into a table. `reference` resolves `.adb` string
/// fields; `.dbc`/`.db2` always use their own block. `progress` is called only
/// when the percentage grows by at least `step` (and once at 100).
#[instrument(skip_all, fields(table = %name, format = %opened.format(), rows = opened.row_count()))]
pub fn decode(
    name: &str,
    opened: OpenedFile,
    schema: &Schema,
    reference: Option<Arc<StringBlock>>,
    step: u8,
    progress: &mut dyn FnMut(Progress),
    cancel: &CancelToken,
) -> Result<DecodedTable> {
    if opened.format().is_fixed_width() {
        let size = opened.record_size.ok_or_else(|| {
            DbError::CorruptHeader(format!("{} file without a record size", opened.format()))
        })?;
        schema.validate_width(size)?;
    }

    let OpenedFile {
        header,
        rows: raw_rows,
        strings,
        ..
    } = opened;
    let format = header.format();
    let strings = match format {
        Format::Dbc | Format::Db2 => strings.map(Arc::new),
        Format::Adb => reference,
        Format::Wdb => None,
    };
    if format == Format::Adb && strings.is_none() && schema.has_strings() {
        debug!("no reference string block, string cells left empty");
    }

    let decoder = RecordDecoder::new(
        schema,
        StringSource::for_format(format, strings.as_deref()),
    );
    let total = raw_rows.len();
    let step = step.max(1);
    let mut last_reported: Option<u8> = None;
    let mut warnings = Vec::new();
    let mut rows = Vec::with_capacity(total);

    for (i, raw) in raw_rows.iter().enumerate() {
        if cancel.is_cancelled() {
            info!(rows_done = i, "decode cancelled");
            return Err(DbError::Cancelled { rows_done: i });
        }
        rows.push(decoder.decode(raw, i, &mut warnings)?);

        let p = Progress::at(i + 1, total);
        let due = match last_reported {
            None => true,
            Some(last) => p.percent >= last.saturating_add(step) || (p.percent == 100 && last < 100),
        };
        if due {
            last_reported = Some(p.percent);
            progress(p);
        }
    }
    if total == 0 {
        progress(Progress::at(0, 0));
    }

    if !warnings.is_empty() {
        warn!(count = warnings.len(), "cells with dangling string references");
    }
    info!(rows = rows.len(), "table decoded");
    Ok(DecodedTable::new(
        name.to_string(),
        header,
        schema.clone(),
        rows,
        warnings,
        raw_rows,
        strings,
    ))
}

// ------------------------------------------------------------------
// 3. Path-level loading
// ------------------------------------------------------------------
#[derive(Debug, Clone)]
pub struct DecodeRequest {
    pub path: PathBuf,
    pub schema: Schema,
    /// `.dbc`/`.db2` file whose string block serves `.adb` string fields.
    pub reference: Option<PathBuf>,
    pub progress_step: u8,
}

impl DecodeRequest {
    pub fn new(path: impl Into<PathBuf>, schema: Schema) -> Self {
        Self {
            path: path.into(),
            schema,
            reference: None,
            progress_step: 1,
        }
    }

    pub fn with_reference(mut self, reference: Option<PathBuf>) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_progress_step(mut self, step: u8) -> Self {
        self.progress_step = step;
        self
    }
}

fn table_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Open, then decode, on the calling thread.
pub fn load_table(
    request: &DecodeRequest,
    progress: &mut dyn FnMut(Progress),
    cancel: &CancelToken,
) -> Result<DecodedTable> {
    let opened = open_path(&request.path, &request.schema)?;
    let reference = match (&request.reference, opened.format()) {
        (Some(path), Format::Adb) => load_reference_strings(path)?.map(Arc::new),
        _ => None,
    };
    decode(
        &table_name(&request.path),
        opened,
        &request.schema,
        reference,
        request.progress_step,
        progress,
        cancel,
    )
}

// ------------------------------------------------------------------
// 4. Background decode
// ------------------------------------------------------------------

/// A decode running on a blocking worker thread.
pub struct DecodeHandle {
    progress: watch::Receiver<Progress>,
    cancel: CancelToken,
    task: JoinHandle<Result<DecodedTable>>,
}

impl DecodeHandle {
    /// Latest progress without waiting.
    pub fn progress(&self) -> Progress {
        *self.progress.borrow()
    }

    /// Receiver for awaiting progress changes.
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that outlives the handle, e.g. for a signal listener.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub async fn join(self) -> Result<DecodedTable> {
        self.task
            .await
            .map_err(|e| DbError::Worker(e.to_string()))?
    }
}

/// Must be called inside a tokio runtime.
pub fn spawn_decode(request: DecodeRequest) -> DecodeHandle {
    let (tx, rx) = watch::channel(Progress::default());
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let task = tokio::task::spawn_blocking(move || {
        let mut report = |p: Progress| {
            tx.send_replace(p);
        };
        load_table(&request, &mut report, &worker_cancel)
    });
    DecodeHandle {
        progress: rx,
        cancel,
        task,
    }
}
