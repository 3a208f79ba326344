//! Starter generation: one generation-oracle call per run over the top segments,
//! followed by rank repair. Always yields at least one candidate.

use crate::language::Language;
use crate::logging::{self, LogCategory};
use crate::oracle::{
    GenerationOracle, GenerationRequest, RawStarter, ResearchNote, ResearchProvider, SegmentBrief,
};
use crate::pipeline::{Diagnostic, RunContext};
use crate::retry::{with_retry, RetryPolicy};
use crate::segment::Segment;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

pub const DEFAULT_STARTERS_PER_SEGMENT: usize = 5;

/// Returned when generation is impossible. Generic on purpose: nothing here may depend
/// on a conversation the oracle never saw.
pub const FALLBACK_STARTERS: [(&str, &str); 5] = [
    (
        "General check-in",
        "Hey, I was just thinking about our last chat. How have things been going since then?",
    ),
    (
        "General check-in",
        "Just checking in. How are you feeling today?",
    ),
    (
        "Previous conversation",
        "Is there anything from our last conversation you'd like to pick back up?",
    ),
    (
        "New topics",
        "I came across a few ideas I think you'd enjoy. Want me to share them?",
    ),
    (
        "General check-in",
        "I hope your week is going well! Anything new you'd like to talk about?",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StarterCandidate {
    pub rank: u32,
    pub context: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StarterSource {
    Oracle { name: String },
    Fallback { reason: String },
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub candidates: Vec<StarterCandidate>,
    pub source: StarterSource,
}

pub fn fallback_starters() -> Vec<StarterCandidate> {
    FALLBACK_STARTERS
        .iter()
        .enumerate()
        .map(|(i, (context, text))| StarterCandidate {
            rank: i as u32 + 1,
            context: context.to_string(),
            text: text.to_string(),
        })
        .collect()
}

pub struct StarterGenerator {
    oracle: Option<Arc<dyn GenerationOracle>>,
    research: Option<Arc<dyn ResearchProvider>>,
    retry: RetryPolicy,
    starters_per_segment: usize,
}

impl StarterGenerator {
    pub fn new(
        oracle: Option<Arc<dyn GenerationOracle>>,
        research: Option<Arc<dyn ResearchProvider>>,
        retry: RetryPolicy,
        starters_per_segment: usize,
    ) -> Self {
        Self {
            oracle,
            research,
            retry,
            starters_per_segment: starters_per_segment.max(1),
        }
    }

    pub async fn generate(
        &self,
        top_segments: &[Segment],
        language: Option<Language>,
        ctx: &mut RunContext,
    ) -> GenerationOutcome {
        let reason = match (self.oracle.as_deref(), top_segments.is_empty()) {
            (None, _) => "no generation oracle configured".to_string(),
            (Some(_), true) => "no segments to generate from".to_string(),
            (Some(oracle), false) => {
                let mut segments = Vec::with_capacity(top_segments.len());
                for segment in top_segments {
                    let research = self.research_for(segment, ctx).await;
                    segments.push(brief(segment, research));
                }

                let request = GenerationRequest {
                    segments,
                    starters_per_segment: self.starters_per_segment,
                    language,
                };
                let request = &request;

                logging::log_generation(Some(ctx.id()), &format!(
                    "Asking {} for {} starters over {} segments",
                    oracle.name(), request.expected_total(), request.segments.len()
                ));

                let result = with_retry(&self.retry, "generation", Some(ctx.id()), move || {
                    oracle.generate(request)
                })
                .await;

                match result {
                    Ok(raw) => {
                        let candidates = normalize(raw, ctx);
                        if !candidates.is_empty() {
                            logging::log_generation(Some(ctx.id()), &format!(
                                "Generated {} starters", candidates.len()
                            ));
                            return GenerationOutcome {
                                candidates,
                                source: StarterSource::Oracle {
                                    name: oracle.name().to_string(),
                                },
                            };
                        }
                        "generation oracle returned no usable starters".to_string()
                    }
                    Err(e) => format!("generation oracle failed: {}", e),
                }
            }
        };

        logging::warn(
            LogCategory::Generation,
            Some(ctx.id()),
            &format!("{}; using fallback starters", reason),
        );
        ctx.record(Diagnostic::StarterFallback {
            reason: reason.clone(),
        });

        GenerationOutcome {
            candidates: fallback_starters(),
            source: StarterSource::Fallback { reason },
        }
    }

    /// Look up background for a segment's topic. Research is optional; any failure just
    /// means the brief goes out without it.
    async fn research_for(&self, segment: &Segment, ctx: &mut RunContext) -> Vec<ResearchNote> {
        let Some(research) = self.research.as_deref() else {
            return Vec::new();
        };

        let labels = segment.labels();
        let query = format!("{} {}", labels.topic, labels.direction).trim().to_string();
        if query.is_empty() {
            return Vec::new();
        }

        let single_attempt = RetryPolicy {
            max_attempts: 1,
            ..self.retry.clone()
        };
        let query_ref = query.as_str();

        match with_retry(&single_attempt, "research", Some(ctx.id()), move || {
            research.search(query_ref)
        })
        .await
        {
            Ok(notes) => {
                logging::log_oracle(Some(ctx.id()), &format!(
                    "Research for '{}' returned {} notes", query, notes.len()
                ));
                notes
            }
            Err(e) => {
                logging::warn(
                    LogCategory::Oracle,
                    Some(ctx.id()),
                    &format!("Research for '{}' skipped: {}", query, e),
                );
                ctx.record(Diagnostic::ResearchSkipped {
                    query,
                    reason: e.to_string(),
                });
                Vec::new()
            }
        }
    }
}

fn brief(segment: &Segment, research: Vec<ResearchNote>) -> SegmentBrief {
    let labels = segment.labels();
    SegmentBrief {
        topic: labels.topic.clone(),
        tone: labels.tone.clone(),
        direction: labels.direction.clone(),
        interaction_type: labels.interaction_type.as_str().to_string(),
        engagement: segment.engagement().map(|s| s.value()),
        engagement_justification: segment.engagement().map(|s| s.justification().to_string()),
        enjoyment: segment.enjoyment().map(|s| s.value()),
        enjoyment_justification: segment.enjoyment().map(|s| s.justification().to_string()),
        combined: segment.combined(),
        content: segment.content().to_string(),
        research,
    }
}

/// Drop empty candidates and settle ranks.
///
/// Ranks are kept when they are exactly a permutation of `1..=M`. Anything else
/// (duplicates, gaps, missing ranks) is replaced by the order the candidates came in.
pub fn normalize(raw: Vec<RawStarter>, ctx: &mut RunContext) -> Vec<StarterCandidate> {
    let before = raw.len();
    let usable: Vec<RawStarter> = raw
        .into_iter()
        .filter(|s| !s.text.trim().is_empty())
        .collect();

    if usable.len() < before {
        ctx.record(Diagnostic::StartersDropped {
            count: before - usable.len(),
        });
    }

    let ranks: Vec<Option<i64>> = usable.iter().map(|s| s.rank).collect();
    let total = usable.len();

    let mut candidates: Vec<StarterCandidate> = if is_permutation(&ranks) {
        usable
            .into_iter()
            .map(|s| StarterCandidate {
                rank: s.rank.unwrap_or_default() as u32,
                context: s.context,
                text: s.text.trim().to_string(),
            })
            .collect()
    } else {
        logging::warn(
            LogCategory::Generation,
            Some(ctx.id()),
            &format!("Ranks {:?} are not a permutation of 1..={}; re-ranking by order", ranks, total),
        );
        ctx.record(Diagnostic::RankPermutationInvalid { ranks });
        usable
            .into_iter()
            .enumerate()
            .map(|(i, s)| StarterCandidate {
                rank: i as u32 + 1,
                context: s.context,
                text: s.text.trim().to_string(),
            })
            .collect()
    };

    candidates.sort_by_key(|c| c.rank);
    candidates
}

fn is_permutation(ranks: &[Option<i64>]) -> bool {
    let total = ranks.len() as i64;
    let mut seen = HashSet::with_capacity(ranks.len());
    ranks.iter().all(|rank| match rank {
        Some(r) if (1..=total).contains(r) => seen.insert(*r),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleError;
    use crate::segment::test_support::scored;
    use crate::transcript::Transcript;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedGenerator {
        reply: Result<Vec<RawStarter>, ()>,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        fn new(reply: Result<Vec<RawStarter>, ()>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GenerationOracle for ScriptedGenerator {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<Vec<RawStarter>, OracleError> {
            self.seen.lock().unwrap().push(request.clone());
            self.reply
                .clone()
                .map_err(|_| OracleError::Malformed("not JSON".into()))
        }
    }

    struct BrokenResearch;

    #[async_trait]
    impl ResearchProvider for BrokenResearch {
        async fn search(&self, _query: &str) -> Result<Vec<ResearchNote>, OracleError> {
            Err(OracleError::Unavailable("search is down".into()))
        }
    }

    struct FixedResearch;

    #[async_trait]
    impl ResearchProvider for FixedResearch {
        async fn search(&self, query: &str) -> Result<Vec<ResearchNote>, OracleError> {
            Ok(vec![ResearchNote {
                title: format!("About {}", query),
                excerpt: "Some facts".into(),
                url: None,
            }])
        }
    }

    fn raw(rank: Option<i64>, text: &str) -> RawStarter {
        RawStarter {
            rank,
            context: "ctx".into(),
            text: text.into(),
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            min_delay_ms: 1,
            max_delay_ms: 2,
            attempt_timeout_ms: 1_000,
        }
    }

    fn top_segments() -> Vec<Segment> {
        let t = Transcript::parse(
            "user: I drive trucks\nagent: Nice!\nuser: I'm trying to eat vegetarian\nagent: Try salads",
        )
        .unwrap();
        vec![scored(1, &t, 2, 3, 9, 8), scored(2, &t, 0, 1, 6, 6)]
    }

    #[test]
    fn test_valid_permutation_sorted_by_rank() {
        let mut ctx = RunContext::new();
        let out = normalize(vec![raw(Some(2), "b"), raw(Some(3), "c"), raw(Some(1), "a")], &mut ctx);

        let texts: Vec<&str> = out.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert!(ctx.diagnostics().is_empty());
    }

    #[test]
    fn test_duplicate_ranks_rerank_by_first_appearance() {
        let mut ranks = vec![2, 2, 3];
        ranks.extend(4..=15);
        let replies: Vec<RawStarter> = ranks
            .iter()
            .enumerate()
            .map(|(i, r)| raw(Some(*r), &format!("starter {}", i)))
            .collect();

        let mut ctx = RunContext::new();
        let out = normalize(replies, &mut ctx);

        assert_eq!(out.len(), 15);
        for (i, c) in out.iter().enumerate() {
            assert_eq!(c.rank, i as u32 + 1);
            assert_eq!(c.text, format!("starter {}", i));
        }
        assert!(ctx
            .diagnostics()
            .iter()
            .any(|d| matches!(d, Diagnostic::RankPermutationInvalid { .. })));
    }

    #[test]
    fn test_missing_or_out_of_range_ranks_rerank() {
        let mut ctx = RunContext::new();
        let out = normalize(vec![raw(None, "x"), raw(Some(1), "y")], &mut ctx);
        assert_eq!(out[0].text, "x");

        let out = normalize(vec![raw(Some(1), "x"), raw(Some(7), "y")], &mut ctx);
        assert_eq!(out.iter().map(|c| c.rank).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_empty_texts_dropped_before_ranking() {
        let mut ctx = RunContext::new();
        let out = normalize(vec![raw(Some(2), "  "), raw(Some(1), "kept")], &mut ctx);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rank, 1);
        assert!(ctx
            .diagnostics()
            .iter()
            .any(|d| matches!(d, Diagnostic::StartersDropped { count: 1 })));
    }

    #[tokio::test]
    async fn test_oracle_failure_returns_fallback_list() {
        let generator = StarterGenerator::new(Some(ScriptedGenerator::new(Err(()))), None, fast_retry(), 5);
        let mut ctx = RunContext::new();

        let outcome = generator.generate(&top_segments(), None, &mut ctx).await;

        assert!(matches!(outcome.source, StarterSource::Fallback { .. }));
        assert!(!outcome.candidates.is_empty());
        assert_eq!(outcome.candidates, fallback_starters());
    }

    #[tokio::test]
    async fn test_no_oracle_returns_fallback_list() {
        let generator = StarterGenerator::new(None, None, fast_retry(), 5);
        let mut ctx = RunContext::new();

        let outcome = generator.generate(&top_segments(), None, &mut ctx).await;
        assert_eq!(outcome.candidates.len(), FALLBACK_STARTERS.len());
    }

    #[tokio::test]
    async fn test_request_carries_content_not_indices() {
        let oracle = ScriptedGenerator::new(Ok(vec![raw(Some(1), "How did the salads go?")]));
        let generator = StarterGenerator::new(Some(oracle.clone()), Some(Arc::new(FixedResearch)), fast_retry(), 5);
        let mut ctx = RunContext::new();

        let outcome = generator.generate(&top_segments(), Some(Language::English), &mut ctx).await;

        assert_eq!(outcome.source, StarterSource::Oracle { name: "scripted".into() });
        assert_eq!(outcome.candidates[0].text, "How did the salads go?");

        let seen = oracle.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let request = &seen[0];
        assert_eq!(request.starters_per_segment, 5);
        assert_eq!(request.expected_total(), 10);
        assert_eq!(request.segments[0].content, "user: I'm trying to eat vegetarian\nagent: Try salads");
        assert_eq!(request.segments[0].combined, Some(17));
        assert_eq!(request.segments[0].research.len(), 1);
    }

    #[tokio::test]
    async fn test_research_failure_is_soft() {
        let oracle = ScriptedGenerator::new(Ok(vec![raw(Some(1), "hi")]));
        let generator = StarterGenerator::new(Some(oracle.clone()), Some(Arc::new(BrokenResearch)), fast_retry(), 5);
        let mut ctx = RunContext::new();

        let outcome = generator.generate(&top_segments(), None, &mut ctx).await;

        assert!(matches!(outcome.source, StarterSource::Oracle { .. }));
        assert!(oracle.seen.lock().unwrap()[0].segments.iter().all(|s| s.research.is_empty()));
        assert!(ctx
            .diagnostics()
            .iter()
            .any(|d| matches!(d, Diagnostic::ResearchSkipped { .. })));
    }
}
