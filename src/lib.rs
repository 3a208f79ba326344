pub mod anthropic;
pub mod boundary;
pub mod cli;
pub mod config;
pub mod content;
pub mod error;
pub mod language;
pub mod llm;
pub mod logging;
pub mod openai;
pub mod oracle;
pub mod partition;
pub mod pipeline;
pub mod prompts;
pub mod ranking;
pub mod research;
pub mod retry;
pub mod segment;
pub mod segmenter;
pub mod starters;
pub mod transcript;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use pipeline::{Diagnostic, Pipeline, PipelineReport, RunContext};
pub use segment::Segment;
pub use starters::StarterCandidate;
pub use transcript::Transcript;

use clap::Parser;

// ============ Entry point ============

/// Parse arguments, load configuration, start logging and run the requested command.
pub fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    // Held until exit so buffered file logs get flushed
    let _guard = logging::init_logging(&config.logging)?;

    // Clean up old log files
    if let Some(dir) = &config.logging.directory {
        match logging::cleanup_old_logs(dir, config.logging.retention_days) {
            Ok(0) => {}
            Ok(deleted) => logging::log_pipeline(None, &format!("Removed {} old log files", deleted)),
            Err(e) => logging::warn(logging::LogCategory::Pipeline, None, &e.to_string()),
        }
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(cli::run_cli(cli, config))
}
