//! Command-line interface.

use crate::config::AppConfig;
use crate::logging;
use crate::pipeline::{Diagnostic, Pipeline, PipelineReport, SegmentationReport};
use crate::segment::Segment;
use crate::segmenter::SegmentSource;
use crate::starters::StarterSource;
use crate::transcript::Transcript;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Debug, Parser)]
#[command(name = "followup")]
#[command(about = "Find the most engaging parts of a chat and suggest follow-up messages")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: ./followup.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Don't call any oracle; use the fallback partitioner and fallback starters
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the full pipeline over one or more transcripts
    Run {
        /// Transcript files, processed concurrently
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print JSON reports instead of text
        #[arg(long)]
        json: bool,
    },

    /// Segment and rank a transcript without generating starters
    Segment {
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Show how a transcript file is parsed
    Parse {
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },
}

/// Execute a parsed command line.
pub async fn run_cli(cli: Cli, config: AppConfig) -> Result<()> {
    tracing::debug!(?cli, "parsed arguments");

    match cli.command {
        Commands::Run { files, json } => {
            let pipeline = Arc::new(Pipeline::from_config(&config, cli.offline)?);
            run_files(pipeline, files, json).await
        }
        Commands::Segment { file, json } => {
            let pipeline = Pipeline::from_config(&config, cli.offline)?;
            let raw = read_transcript(&file).await?;
            let report = pipeline
                .segment(&raw)
                .await
                .with_context(|| format!("failed to segment {}", file.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", render_segmentation(&file, &report));
            }
            Ok(())
        }
        Commands::Parse { file, json } => {
            let raw = read_transcript(&file).await?;
            let transcript = Transcript::parse(&raw)
                .with_context(|| format!("failed to parse {}", file.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&transcript)?);
            } else {
                print!("{}", render_transcript(&transcript));
            }
            Ok(())
        }
    }
}

async fn read_transcript(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

/// One pipeline run per file, all in flight at once. Reports print in argument order.
async fn run_files(pipeline: Arc<Pipeline>, files: Vec<PathBuf>, json: bool) -> Result<()> {
    let mut tasks = JoinSet::new();

    for (index, path) in files.iter().cloned().enumerate() {
        let pipeline = Arc::clone(&pipeline);
        tasks.spawn(async move {
            let result = match read_transcript(&path).await {
                Ok(raw) => pipeline
                    .run(&raw)
                    .await
                    .with_context(|| format!("failed to process {}", path.display())),
                Err(e) => Err(e),
            };
            (index, result)
        });
    }

    let mut results: Vec<Option<Result<PipelineReport>>> = files.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined.context("pipeline task panicked")?;
        results[index] = Some(result);
    }

    let mut failed = 0;
    for (path, result) in files.iter().zip(results) {
        match result {
            Some(Ok(report)) if json => println!("{}", serde_json::to_string_pretty(&report)?),
            Some(Ok(report)) => print!("{}", render_report(path, &report)),
            Some(Err(e)) => {
                failed += 1;
                logging::log_error(None, &format!("{:#}", e));
                eprintln!("error: {:#}", e);
            }
            None => failed += 1,
        }
    }

    if failed > 0 {
        bail!("{} of {} transcripts failed", failed, files.len());
    }
    Ok(())
}

fn segment_line(segment: &Segment) -> String {
    let labels = segment.labels();
    let score = match (segment.combined(), segment.engagement(), segment.enjoyment()) {
        (Some(combined), Some(e), Some(j)) => {
            format!("{} (engagement {}, enjoyment {})", combined, e.value(), j.value())
        }
        _ => "unscored".to_string(),
    };
    let topic = if labels.topic.is_empty() { "untitled" } else { labels.topic.as_str() };
    format!(
        "  #{:<2} lines {:<7} {:<40} {} [{}]",
        segment.id(),
        segment.range().to_string(),
        topic,
        score,
        labels.interaction_type.as_str()
    )
}

fn source_line(name: &str, oracle: Option<&str>, reason: Option<&str>) -> String {
    match (oracle, reason) {
        (Some(oracle), _) => format!("{}: {}", name, oracle),
        (None, Some(reason)) => format!("{}: fallback ({})", name, reason),
        (None, None) => format!("{}: fallback", name),
    }
}

fn segment_source_line(source: &SegmentSource) -> String {
    match source {
        SegmentSource::Oracle { name } => source_line("Segmentation", Some(name), None),
        SegmentSource::Fallback { reason } => source_line("Segmentation", None, Some(reason)),
    }
}

fn starter_source_line(source: &StarterSource) -> String {
    match source {
        StarterSource::Oracle { name } => source_line("Starters", Some(name), None),
        StarterSource::Fallback { reason } => source_line("Starters", None, Some(reason)),
    }
}

fn write_segments(out: &mut String, all: &[Segment], top: &[Segment]) {
    let _ = writeln!(out, "\nSegments ({}):", all.len());
    for segment in all {
        let _ = writeln!(out, "{}", segment_line(segment));
    }
    let _ = writeln!(out, "\nTop {}:", top.len());
    for segment in top {
        let _ = writeln!(out, "{}", segment_line(segment));
    }
}

fn write_diagnostics(out: &mut String, diagnostics: &[Diagnostic]) {
    if diagnostics.is_empty() {
        return;
    }
    let _ = writeln!(out, "\nDiagnostics ({}):", diagnostics.len());
    for diagnostic in diagnostics {
        let line = serde_json::to_string(diagnostic).unwrap_or_else(|_| format!("{:?}", diagnostic));
        let _ = writeln!(out, "  {}", line);
    }
}

fn render_segmentation(path: &Path, report: &SegmentationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} (run {})", path.display(), report.run_id);
    let _ = writeln!(
        out,
        "{} turns, {} dropped lines",
        report.transcript.turns, report.transcript.dropped_lines
    );
    let _ = writeln!(out, "{}", segment_source_line(&report.segment_source));
    write_segments(&mut out, &report.segments, &report.top_segments);
    write_diagnostics(&mut out, &report.diagnostics);
    out
}

fn render_report(path: &Path, report: &PipelineReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} (run {})", path.display(), report.run_id);
    let _ = writeln!(
        out,
        "{} turns, {} dropped lines, language {}",
        report.transcript.turns,
        report.transcript.dropped_lines,
        report.transcript.language.map(|l| l.as_str()).unwrap_or("undetected")
    );
    let _ = writeln!(out, "{}", segment_source_line(&report.segment_source));
    let _ = writeln!(out, "{}", starter_source_line(&report.starter_source));
    write_segments(&mut out, &report.segments, &report.top_segments);

    let _ = writeln!(out, "\nStarters ({}):", report.candidates.len());
    for candidate in &report.candidates {
        let _ = writeln!(out, "  {:>2}. [{}] {}", candidate.rank, candidate.context, candidate.text);
    }

    write_diagnostics(&mut out, &report.diagnostics);
    out.push('\n');
    out
}

fn render_transcript(transcript: &Transcript) -> String {
    let mut out = String::new();
    for turn in transcript.turns() {
        let _ = writeln!(
            out,
            "{:>4} {:<6} {}: {}",
            turn.index,
            turn.role().as_str(),
            turn.speaker,
            turn.text
        );
    }
    let _ = writeln!(
        out,
        "{} turns, {} words, {} dropped lines",
        transcript.len(),
        transcript.total_words(),
        transcript.dropped_lines()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_run_with_many_files() {
        let cli = Cli::parse_from(["followup", "run", "a.txt", "b.txt", "--json", "--offline"]);

        assert!(cli.offline);
        assert!(matches!(
            &cli.command,
            Commands::Run { files, json: true } if files.len() == 2
        ));
    }

    #[test]
    fn test_run_requires_a_file() {
        assert!(Cli::try_parse_from(["followup", "run"]).is_err());
    }

    #[test]
    fn test_parses_segment_with_config() {
        let cli = Cli::parse_from(["followup", "segment", "chat.txt", "-c", "custom.toml"]);

        assert_eq!(cli.config.as_deref(), Some(Path::new("custom.toml")));
        assert!(matches!(
            &cli.command,
            Commands::Segment { file, json: false } if file == Path::new("chat.txt")
        ));
    }

    #[test]
    fn test_render_transcript_lists_turns() {
        let transcript = Transcript::parse("user: hi there\nagent: hello").unwrap();
        let text = render_transcript(&transcript);

        assert!(text.contains("   0 user   user: hi there"));
        assert!(text.contains("2 turns, 3 words, 0 dropped lines"));
    }

    #[tokio::test]
    async fn test_run_files_offline() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("chat.txt");
        std::fs::write(&good, "user: I have a cold\nagent: Get well soon").unwrap();

        let pipeline = Arc::new(Pipeline::from_config(&AppConfig::default(), true).unwrap());
        run_files(pipeline.clone(), vec![good.clone()], false).await.unwrap();

        let missing = dir.path().join("missing.txt");
        let err = run_files(pipeline, vec![good, missing], true).await.unwrap_err();
        assert!(err.to_string().contains("1 of 2"));
    }
}
