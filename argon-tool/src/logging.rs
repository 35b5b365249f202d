use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::error::ArgError;

const DEFAULT_FILTER: &str = "argon_core=info,argon_gemini=info,argon_tool=info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub fn default_log_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("argon")
        .join("argon.log")
}

/// Logs to stderr; used by the non-interactive commands.
pub fn init_stderr() -> Result<(), ArgError> {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| ArgError::Logging(e.to_string()))
}

/// Logs to `path` so the terminal UI stays clean.
pub fn init_file(path: &Path) -> Result<(), ArgError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| ArgError::Logging(e.to_string()))
}
