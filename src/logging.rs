//! Structured logging module for Followup
//!
//! Events go to stderr and, when a log directory is configured, to a daily rolling file.
//! Every event carries a category and the short id of the pipeline run it belongs to:
//! - PARSE: Transcript parsing
//! - SEGMENTATION: Segmentation stage and fallback partitioning
//! - BOUNDARY: Boundary repairs and rejections
//! - RANKING: Top-K selection
//! - GENERATION: Starter generation and rank repair
//! - ORACLE: Oracle calls, retries and research lookups
//! - PIPELINE: Run lifecycle
//! - ERROR: Errors

use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "followup.log";

/// Log categories for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    Parse,
    Segmentation,
    Boundary,
    Ranking,
    Generation,
    Oracle,
    Pipeline,
    Error,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Parse => "PARSE",
            LogCategory::Segmentation => "SEGMENTATION",
            LogCategory::Boundary => "BOUNDARY",
            LogCategory::Ranking => "RANKING",
            LogCategory::Generation => "GENERATION",
            LogCategory::Oracle => "ORACLE",
            LogCategory::Pipeline => "PIPELINE",
            LogCategory::Error => "ERROR",
        }
    }
}

/// Default log directory: `~/.followup/logs`
pub fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".followup").join("logs")
}

/// Initialize the logging system.
///
/// `RUST_LOG` overrides the configured filter. The returned guard flushes the file writer
/// on drop and must be held for the life of the process.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| Error::Config(format!("invalid log filter '{}': {}", config.filter, e)))?;

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            fs::create_dir_all(dir).map_err(|source| Error::Io {
                path: dir.clone(),
                source,
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {}", e)))?;

    log(LogCategory::Pipeline, None, "Followup logging initialized");

    Ok(guard)
}

fn short_run(run_id: Option<&str>) -> &str {
    run_id.map(|id| &id[..8.min(id.len())]).unwrap_or("-")
}

/// Log a message with category and optional run context
pub fn log(category: LogCategory, run_id: Option<&str>, message: &str) {
    tracing::info!(target: "followup", category = category.as_str(), run = short_run(run_id), "{}", message);
}

/// Log a recovered anomaly
pub fn warn(category: LogCategory, run_id: Option<&str>, message: &str) {
    tracing::warn!(target: "followup", category = category.as_str(), run = short_run(run_id), "{}", message);
}

pub fn log_parse(run_id: Option<&str>, message: &str) {
    log(LogCategory::Parse, run_id, message);
}

pub fn log_segmentation(run_id: Option<&str>, message: &str) {
    log(LogCategory::Segmentation, run_id, message);
}

/// Boundary repairs and rejections are always warnings
pub fn log_boundary(run_id: Option<&str>, message: &str) {
    warn(LogCategory::Boundary, run_id, message);
}

pub fn log_ranking(run_id: Option<&str>, message: &str) {
    log(LogCategory::Ranking, run_id, message);
}

pub fn log_generation(run_id: Option<&str>, message: &str) {
    log(LogCategory::Generation, run_id, message);
}

pub fn log_oracle(run_id: Option<&str>, message: &str) {
    log(LogCategory::Oracle, run_id, message);
}

pub fn log_pipeline(run_id: Option<&str>, message: &str) {
    log(LogCategory::Pipeline, run_id, message);
}

/// Log an error
pub fn log_error(run_id: Option<&str>, message: &str) {
    tracing::error!(target: "followup", category = LogCategory::Error.as_str(), run = short_run(run_id), "{}", message);
}

/// Clean up old log files (keep the last `retention_days` days)
pub fn cleanup_old_logs(log_dir: &Path, retention_days: u32) -> Result<usize> {
    let mut deleted = 0;

    if !log_dir.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
    let io_err = |source| Error::Io {
        path: log_dir.to_path_buf(),
        source,
    };

    for entry in fs::read_dir(log_dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let path = entry.path();

        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
        if !is_log {
            continue;
        }

        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            let modified_time: chrono::DateTime<Utc> = modified.into();
            if modified_time < cutoff && fs::remove_file(&path).is_ok() {
                deleted += 1;
            }
        }
    }

    Ok(deleted)
}
