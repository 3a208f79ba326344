use std::path::PathBuf;

/// Errors that can reach the caller of the library.
///
/// Everything an oracle can do wrong is absorbed inside the pipeline and shows up as a
/// [`crate::pipeline::Diagnostic`] instead. Only `Parse` comes out of a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no conversation turns found in input ({dropped_lines} lines did not match the turn format)")]
    Parse { dropped_lines: usize },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
