use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dbview_lib::commands::{duplicate_report, row_object, summary, Session};
use dbview_lib::dbfile::{spawn_decode, DecodedTable};
use dbview_lib::ViewerConfig;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(version, about = "Inspect client database tables (.dbc, .db2, .adb, .wdb)")]
struct Cli {
    /// Viewer config (TOML); DBVIEW_* variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Table definitions document, overrides the config
    #[arg(long, global = true)]
    defs: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Header, columns and row count as JSON
    Info {
        file: PathBuf,
        /// Which definition to use when several match the file
        #[arg(long)]
        definition: Option<usize>,
        #[arg(long)]
        reference: Option<PathBuf>,
    },
    /// Rows as JSON lines
    Dump {
        file: PathBuf,
        #[arg(long)]
        definition: Option<usize>,
        /// String source for .adb files
        #[arg(long)]
        reference: Option<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Key tuples shared by more than one row
    Keys {
        file: PathBuf,
        #[arg(long)]
        definition: Option<usize>,
        #[arg(long)]
        reference: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ViewerConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ViewerConfig::default(),
    };
    let mut config = config.with_env()?;
    if let Some(defs) = cli.defs {
        config.definitions = defs;
    }
    init_tracing(&config.log_directive());

    let session = Session::new(config.clone())
        .with_context(|| format!("loading definitions {}", config.definitions.display()))?;

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    match cli.cmd {
        Cmd::Info {
            file,
            definition,
            reference,
        } => {
            let table = load(&session, file, definition, reference).await?;
            serde_json::to_writer_pretty(&mut out, &summary(&table))?;
            writeln!(out)?;
        }
        Cmd::Dump {
            file,
            definition,
            reference,
            limit,
        } => {
            let table = load(&session, file, definition, reference).await?;
            let n = limit.unwrap_or(usize::MAX).min(table.row_count());
            for row in 0..n {
                if let Some(obj) = row_object(&table, row) {
                    serde_json::to_writer(&mut out, &obj)?;
                    writeln!(out)?;
                }
            }
        }
        Cmd::Keys {
            file,
            definition,
            reference,
        } => {
            let table = load(&session, file, definition, reference).await?;
            let dups = duplicate_report(&table);
            info!(groups = dups.len(), "duplicate key groups");
            for d in dups {
                serde_json::to_writer(&mut out, &d)?;
                writeln!(out)?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

/// Decode on a worker thread; Ctrl-C cancels between rows.
async fn load(
    session: &Session,
    file: PathBuf,
    definition: Option<usize>,
    reference: Option<PathBuf>,
) -> Result<DecodedTable> {
    let request = session
        .request(&file, definition, reference)
        .with_context(|| format!("selecting definition for {}", file.display()))?;
    let handle = spawn_decode(request);

    let mut rx = handle.subscribe();
    let watcher = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let p = *rx.borrow();
            debug!(rows_done = p.rows_done, rows_total = p.rows_total, percent = p.percent, "progress");
        }
    });
    let cancel = handle.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let table = handle.join().await.map_err(|e| {
        if !e.is_terminal() {
            warn!("the table definition does not fit this file; pick or fix a definition and retry");
        }
        e
    });
    interrupt.abort();
    if let Err(e) = watcher.await {
        debug!(error = %e, "progress watcher ended abnormally");
    }
    table.with_context(|| format!("decoding {}", file.display()))
}

fn init_tracing(directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
