//! **Viewer configuration**: where definitions live, how strings are borrowed
//! for `.adb` tables, progress granularity and log filter.

use crate::schema::definitions::DefinitionError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

// ------------------------------------------------------------------
// 1. Configuration struct
// ------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Table definitions document
    pub definitions: PathBuf,
    /// Directory searched for a `.db2`/`.dbc` string source when opening `.adb`
    pub reference_dir: Option<PathBuf>,
    /// Minimum percentage growth between progress reports
    pub progress_step: u8,
    /// `tracing_subscriber::EnvFilter` directive. Takes precedence over `RUST_LOG`.
    pub log_filter: Option<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            definitions: PathBuf::from("Structure.toml"),
            reference_dir: None,
            progress_step: 1,
            log_filter: None,
        }
    }
}

// ------------------------------------------------------------------
// 2. Builder
// ------------------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct ViewerConfigBuilder {
    inner: ViewerConfig,
}

impl ViewerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn definitions(mut self, path: impl Into<PathBuf>) -> Self {
        self.inner.definitions = path.into();
        self
    }

    pub fn reference_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.inner.reference_dir = dir;
        self
    }

    pub fn progress_step(mut self, step: u8) -> Self {
        self.inner.progress_step = step;
        self
    }

    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.inner.log_filter = Some(filter.into());
        self
    }

    pub fn build(self) -> Result<ViewerConfig, ConfigError> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}

// ------------------------------------------------------------------
// 3. Loading & validation
// ------------------------------------------------------------------
impl ViewerConfig {
    pub fn builder() -> ViewerConfigBuilder {
        ViewerConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.progress_step) {
            return Err(ConfigError::InvalidValue {
                key: "progress_step",
                value: self.progress_step.to_string(),
            });
        }
        Ok(())
    }

    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let cfg: ViewerConfig = toml::from_str(src)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Defaults overridden by the environment.
    /// ENV vars: DBVIEW_DEFINITIONS, DBVIEW_REFERENCE_DIR, DBVIEW_PROGRESS_STEP, DBVIEW_LOG
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env()
    }

    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_vars(|key| env::var(key).ok())
    }

    fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(path) = var("DBVIEW_DEFINITIONS") {
            self.definitions = PathBuf::from(path);
        }
        if let Some(dir) = var("DBVIEW_REFERENCE_DIR") {
            self.reference_dir = Some(PathBuf::from(dir));
        }
        if let Some(step) = var("DBVIEW_PROGRESS_STEP") {
            self.progress_step = step.parse().map_err(|_| ConfigError::InvalidValue {
                key: "DBVIEW_PROGRESS_STEP",
                value: step.clone(),
            })?;
        }
        if let Some(filter) = var("DBVIEW_LOG") {
            self.log_filter = Some(filter);
        }
        self.validate()?;
        Ok(self)
    }

    /// Directive for the log filter: `DBVIEW_LOG` or `log_filter` from the
    /// config file, then `RUST_LOG`, then `info`.
    pub fn log_directive(&self) -> String {
        self.resolve_log_directive(env::var("RUST_LOG").ok())
    }

    fn resolve_log_directive(&self, rust_log: Option<String>) -> String {
        self.log_filter
            .clone()
            .or(rust_log)
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
    }
}
