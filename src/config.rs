//! Pipeline configuration
//!
//! Values come from the process environment (optionally seeded from a `.env`
//! file). Every setting has a default so a bare environment works.

use crate::error::{PipelineError, Result};
use crate::query::QueryLimits;
use crate::reader::ReaderOptions;
use std::path::PathBuf;
use std::str::FromStr;

pub const ENV_SCRATCH_DIR: &str = "TLQ_SCRATCH_DIR";
pub const ENV_STORAGE_ROOT: &str = "TLQ_STORAGE_ROOT";
pub const ENV_DELIMITER: &str = "TLQ_DELIMITER";
pub const ENV_CSV_QUOTING: &str = "TLQ_CSV_QUOTING";
pub const ENV_PROGRESS_INTERVAL: &str = "TLQ_PROGRESS_INTERVAL";
pub const ENV_DEFAULT_LIMIT: &str = "TLQ_DEFAULT_LIMIT";
pub const ENV_MAX_TOP_LIMIT: &str = "TLQ_MAX_TOP_LIMIT";

/// Runtime settings shared by the three entry points
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Local scratch root; database files and cached materializations live here
    pub scratch_dir: PathBuf,

    /// Root directory of the filesystem object store (one sub-directory per bucket)
    pub storage_root: PathBuf,

    pub reader: ReaderOptions,

    /// Loader logs progress every this many rows
    pub progress_interval: u64,

    pub limits: QueryLimits,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from("/tmp"),
            storage_root: PathBuf::from("buckets"),
            reader: ReaderOptions::default(),
            progress_interval: 10_000,
            limits: QueryLimits::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from `.env` (if present) and the process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(ENV_SCRATCH_DIR) {
            config.scratch_dir = PathBuf::from(dir);
        }
        if let Some(root) = lookup(ENV_STORAGE_ROOT) {
            config.storage_root = PathBuf::from(root);
        }
        if let Some(delimiter) = lookup(ENV_DELIMITER) {
            config.reader.delimiter = parse_delimiter(&delimiter)?;
        }
        if let Some(quoting) = lookup(ENV_CSV_QUOTING) {
            config.reader.quoting = parse_bool(ENV_CSV_QUOTING, &quoting)?;
        }
        if let Some(interval) = lookup(ENV_PROGRESS_INTERVAL) {
            config.progress_interval = parse_number(ENV_PROGRESS_INTERVAL, &interval)?;
            if config.progress_interval == 0 {
                return Err(PipelineError::Config(format!(
                    "{} must be greater than zero",
                    ENV_PROGRESS_INTERVAL
                )));
            }
        }
        if let Some(limit) = lookup(ENV_DEFAULT_LIMIT) {
            config.limits.default_limit = parse_number(ENV_DEFAULT_LIMIT, &limit)?;
        }
        if let Some(limit) = lookup(ENV_MAX_TOP_LIMIT) {
            config.limits.max_top_limit = parse_number(ENV_MAX_TOP_LIMIT, &limit)?;
        }

        Ok(config)
    }
}

fn parse_delimiter(value: &str) -> Result<u8> {
    let value = if value == "\\t" { "\t" } else { value };
    match value.as_bytes() {
        [byte] if *byte != b'\n' && *byte != b'\r' => Ok(*byte),
        _ => Err(PipelineError::Config(format!(
            "{} must be a single non-newline byte, got {:?}",
            ENV_DELIMITER, value
        ))),
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(PipelineError::Config(format!(
            "{} must be a boolean, got {:?}",
            name, other
        ))),
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        PipelineError::Config(format!("{} must be a non-negative integer, got {:?}", name, value))
    })
}
