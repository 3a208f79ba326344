//! One end-to-end run: parse, segment, rank, generate.
//!
//! A [`RunContext`] travels through every stage by `&mut`. It carries the run id used in
//! log lines and collects a [`Diagnostic`] for every anomaly a stage recovered from, so
//! callers see what happened without parsing logs.

use crate::anthropic::AnthropicClient;
use crate::boundary::{RejectReason, Repair};
use crate::config::{AppConfig, Provider};
use crate::error::Result;
use crate::language::{Language, LanguageClassifier, NeutralClassifier, ScriptClassifier};
use crate::llm::{ChatBackend, LlmGenerationOracle, LlmSegmentationOracle};
use crate::logging;
use crate::openai::OpenAIClient;
use crate::oracle::{GenerationOracle, OracleError, ResearchProvider, SegmentationOracle};
use crate::ranking;
use crate::research::FirecrawlResearch;
use crate::segment::Segment;
use crate::segmenter::{SegmentSource, Segmenter};
use crate::starters::{StarterCandidate, StarterGenerator, StarterSource};
use crate::transcript::{Role, Transcript};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    Engagement,
    Enjoyment,
}

impl ScoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreKind::Engagement => "engagement",
            ScoreKind::Enjoyment => "enjoyment",
        }
    }
}

/// A recovered anomaly. None of these abort a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    BoundaryRepaired { proposal: usize, repair: Repair },
    BoundaryRejected { proposal: usize, reason: RejectReason },
    /// Entries in the oracle's segment list that were not objects.
    ProposalMalformed { count: usize },
    ScoreClamped {
        segment: u32,
        score: ScoreKind,
        raw: f64,
        clamped: u8,
    },
    SegmentationFallback { reason: String },
    StartersDropped { count: usize },
    RankPermutationInvalid { ranks: Vec<Option<i64>> },
    ResearchSkipped { query: String, reason: String },
    StarterFallback { reason: String },
}

/// Per-run state handed through the stages.
#[derive(Debug, Clone)]
pub struct RunContext {
    id: String,
    started_at: DateTime<Utc>,
    diagnostics: Vec<Diagnostic>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            diagnostics: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn record(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptSummary {
    pub turns: usize,
    pub dropped_lines: usize,
    pub user_turns: usize,
    pub agent_turns: usize,
    pub words: usize,
    pub language: Option<Language>,
}

impl TranscriptSummary {
    fn of(transcript: &Transcript, language: Option<Language>) -> Self {
        Self {
            turns: transcript.len(),
            dropped_lines: transcript.dropped_lines(),
            user_turns: transcript.count_role(Role::User),
            agent_turns: transcript.count_role(Role::Agent),
            words: transcript.total_words(),
            language,
        }
    }
}

/// Output of segmentation and ranking only.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentationReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub transcript: TranscriptSummary,
    pub segments: Vec<Segment>,
    pub segment_source: SegmentSource,
    pub top_segments: Vec<Segment>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub transcript: TranscriptSummary,
    pub segments: Vec<Segment>,
    pub segment_source: SegmentSource,
    pub top_segments: Vec<Segment>,
    pub candidates: Vec<StarterCandidate>,
    pub starter_source: StarterSource,
    pub diagnostics: Vec<Diagnostic>,
}

/// Segments, top-K and language of one transcript, before generation.
struct Ranked {
    language: Option<Language>,
    segments: Vec<Segment>,
    source: SegmentSource,
    top: Vec<Segment>,
}

pub struct Pipeline {
    segmenter: Segmenter,
    generator: StarterGenerator,
    classifier: Box<dyn LanguageClassifier>,
    top_k: usize,
}

impl Pipeline {
    pub fn new(
        segmenter: Segmenter,
        generator: StarterGenerator,
        classifier: Box<dyn LanguageClassifier>,
        top_k: usize,
    ) -> Self {
        Self {
            segmenter,
            generator,
            classifier,
            top_k: top_k.max(1),
        }
    }

    /// Build a pipeline from configuration.
    ///
    /// Oracles are wired up only when the provider's API key is present and `offline` is
    /// false. Without them every run still completes on the fallback paths.
    pub fn from_config(config: &AppConfig, offline: bool) -> Result<Self> {
        let (segmentation, generation) = match (offline, config.provider_key()) {
            (true, _) => {
                logging::log_pipeline(None, "Offline mode, oracles disabled");
                (None, None)
            }
            (false, None) => {
                logging::warn(
                    logging::LogCategory::Pipeline,
                    None,
                    &format!("No {} API key found, oracles disabled", config.provider.as_str()),
                );
                (None, None)
            }
            (false, Some(key)) => {
                let (s, g) = build_oracles(config, key).map_err(oracle_config_error)?;
                (Some(s), Some(g))
            }
        };

        let research: Option<Arc<dyn ResearchProvider>> =
            match (&config.keys.firecrawl, offline || !config.research.enabled) {
                (Some(key), false) => {
                    let mut provider = FirecrawlResearch::new(
                        key,
                        config.research.results_per_query,
                        config.research.excerpt_chars,
                    )
                    .map_err(oracle_config_error)?;
                    if let Some(url) = &config.research.base_url {
                        provider = provider.with_base_url(url);
                    }
                    Some(Arc::new(provider))
                }
                _ => None,
            };

        let classifier: Box<dyn LanguageClassifier> = if config.pipeline.classify_language {
            Box::new(ScriptClassifier::default())
        } else {
            Box::new(NeutralClassifier)
        };

        Ok(Self::new(
            Segmenter::new(
                segmentation,
                config.retry.clone(),
                config.pipeline.partition.clone(),
            ),
            StarterGenerator::new(
                generation,
                research,
                config.retry.clone(),
                config.pipeline.starters_per_segment,
            ),
            classifier,
            config.pipeline.top_k,
        ))
    }

    /// Run every stage over raw transcript text.
    ///
    /// Fails only when the text holds no turns at all. Oracle trouble of any kind is
    /// absorbed and shows up in the report's diagnostics.
    pub async fn run(&self, raw: &str) -> Result<PipelineReport> {
        let mut ctx = RunContext::new();
        let transcript = self.parse(raw, &ctx)?;
        let ranked = self.segment_and_rank(&transcript, &mut ctx).await;

        let generation = self
            .generator
            .generate(&ranked.top, ranked.language, &mut ctx)
            .await;

        let finished_at = Utc::now();
        logging::log_pipeline(Some(ctx.id()), &format!(
            "Run finished in {}ms with {} starters and {} diagnostics",
            (finished_at - ctx.started_at()).num_milliseconds(),
            generation.candidates.len(),
            ctx.diagnostics().len()
        ));

        Ok(PipelineReport {
            run_id: ctx.id().to_string(),
            started_at: ctx.started_at(),
            finished_at,
            transcript: TranscriptSummary::of(&transcript, ranked.language),
            segments: ranked.segments,
            segment_source: ranked.source,
            top_segments: ranked.top,
            candidates: generation.candidates,
            starter_source: generation.source,
            diagnostics: ctx.into_diagnostics(),
        })
    }

    /// Parse, segment and rank without generating starters.
    pub async fn segment(&self, raw: &str) -> Result<SegmentationReport> {
        let mut ctx = RunContext::new();
        let transcript = self.parse(raw, &ctx)?;
        let ranked = self.segment_and_rank(&transcript, &mut ctx).await;

        Ok(SegmentationReport {
            run_id: ctx.id().to_string(),
            started_at: ctx.started_at(),
            transcript: TranscriptSummary::of(&transcript, ranked.language),
            segments: ranked.segments,
            segment_source: ranked.source,
            top_segments: ranked.top,
            diagnostics: ctx.into_diagnostics(),
        })
    }

    fn parse(&self, raw: &str, ctx: &RunContext) -> Result<Transcript> {
        match Transcript::parse(raw) {
            Ok(transcript) => {
                logging::log_parse(Some(ctx.id()), &format!(
                    "Parsed {} turns ({} lines dropped)",
                    transcript.len(),
                    transcript.dropped_lines()
                ));
                Ok(transcript)
            }
            Err(e) => {
                logging::log_error(Some(ctx.id()), &e.to_string());
                Err(e)
            }
        }
    }

    async fn segment_and_rank(&self, transcript: &Transcript, ctx: &mut RunContext) -> Ranked {
        let language = self.classify(transcript);
        let outcome = self.segmenter.segment(transcript, language, ctx).await;
        let top = ranking::rank(&outcome.segments, self.top_k);

        logging::log_ranking(Some(ctx.id()), &format!(
            "Top {} of {} segments: {}",
            top.len(),
            outcome.segments.len(),
            top.iter()
                .map(|s| format!("#{} {} ({})", s.id(), s.range(), score_label(s)))
                .collect::<Vec<_>>()
                .join(", ")
        ));

        Ranked {
            language,
            segments: outcome.segments,
            source: outcome.source,
            top,
        }
    }

    /// Language of the user's side of the conversation. Agent replies are ignored since
    /// the agent usually mirrors the user.
    fn classify(&self, transcript: &Transcript) -> Option<Language> {
        let user_text: String = transcript
            .turns()
            .iter()
            .filter(|t| t.role() != Role::Agent)
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        self.classifier.classify(&user_text)
    }
}

fn score_label(segment: &Segment) -> String {
    match segment.combined() {
        Some(score) => score.to_string(),
        None => "unscored".to_string(),
    }
}

fn oracle_config_error(e: OracleError) -> crate::error::Error {
    crate::error::Error::Config(format!("failed to set up oracle client: {}", e))
}

fn build_oracles(
    config: &AppConfig,
    key: &str,
) -> std::result::Result<(Arc<dyn SegmentationOracle>, Arc<dyn GenerationOracle>), OracleError> {
    let settings = config.model_settings();
    let model = config.model_name();

    logging::log_pipeline(None, &format!(
        "Using {} model {}", config.provider.as_str(), model
    ));

    match config.provider {
        Provider::OpenAI => {
            let mut client = OpenAIClient::new(key, model)?
                .with_sampling(settings.temperature, settings.max_tokens);
            if let Some(url) = &settings.base_url {
                client = client.with_base_url(url);
            }
            Ok(oracles_for(client))
        }
        Provider::Anthropic => {
            let mut client = AnthropicClient::new(key, model)?
                .with_sampling(settings.temperature, settings.max_tokens);
            if let Some(url) = &settings.base_url {
                client = client.with_base_url(url);
            }
            Ok(oracles_for(client))
        }
    }
}

fn oracles_for<B: ChatBackend + 'static>(
    backend: B,
) -> (Arc<dyn SegmentationOracle>, Arc<dyn GenerationOracle>) {
    let backend = Arc::new(backend);
    (
        Arc::new(LlmSegmentationOracle::new(backend.clone())),
        Arc::new(LlmGenerationOracle::new(backend)),
    )
}
