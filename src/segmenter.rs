use crate::boundary::{self, Validation};
use crate::language::Language;
use crate::logging;
use crate::oracle::{ProposalBatch, SegmentProposal, SegmentationOracle, SegmentationRequest};
use crate::partition::{self, PartitionConfig};
use crate::pipeline::{Diagnostic, RunContext, ScoreKind};
use crate::retry::{with_retry, RetryPolicy};
use crate::segment::{InteractionType, Segment, SegmentDraft, SegmentLabels, SegmentOrigin, SubScore};
use crate::transcript::Transcript;
use serde::Serialize;
use std::sync::Arc;

/// Where a run's segment list came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentSource {
    Oracle { name: String },
    Fallback { reason: String },
}

#[derive(Debug, Clone)]
pub struct SegmentationOutcome {
    pub segments: Vec<Segment>,
    pub source: SegmentSource,
}

/// Turns a transcript into scored segments, through the oracle when it works and the
/// fallback partitioner when it doesn't. Never fails.
pub struct Segmenter {
    oracle: Option<Arc<dyn SegmentationOracle>>,
    retry: RetryPolicy,
    partition: PartitionConfig,
}

impl Segmenter {
    pub fn new(
        oracle: Option<Arc<dyn SegmentationOracle>>,
        retry: RetryPolicy,
        partition: PartitionConfig,
    ) -> Self {
        Self {
            oracle,
            retry,
            partition,
        }
    }

    /// Segment `transcript`. The list is returned whole once the stage is complete.
    pub async fn segment(
        &self,
        transcript: &Transcript,
        language: Option<Language>,
        ctx: &mut RunContext,
    ) -> SegmentationOutcome {
        let reason = match self.oracle.as_deref() {
            None => "no segmentation oracle configured".to_string(),
            Some(oracle) => {
                let request = SegmentationRequest {
                    numbered_transcript: transcript.render_numbered(),
                    total_turns: transcript.len(),
                    first_index: 0,
                    last_index: transcript.last_index(),
                    language,
                };
                let request = &request;

                logging::log_segmentation(Some(ctx.id()), &format!(
                    "Asking {} to segment {} turns (valid lines 0-{})",
                    oracle.name(), request.total_turns, request.last_index
                ));

                let result = with_retry(&self.retry, "segmentation", Some(ctx.id()), move || {
                    oracle.propose(request)
                })
                .await;

                match result {
                    Ok(batch) => {
                        let segments = self.accept(transcript, batch, ctx);
                        if !segments.is_empty() {
                            logging::log_segmentation(Some(ctx.id()), &format!(
                                "Accepted {} segments from {}", segments.len(), oracle.name()
                            ));
                            return SegmentationOutcome {
                                segments,
                                source: SegmentSource::Oracle {
                                    name: oracle.name().to_string(),
                                },
                            };
                        }
                        "segmentation oracle returned no usable segments".to_string()
                    }
                    Err(e) => format!("segmentation oracle failed: {}", e),
                }
            }
        };

        logging::warn(
            logging::LogCategory::Segmentation,
            Some(ctx.id()),
            &format!("{}; using fallback partitioner", reason),
        );
        ctx.record(Diagnostic::SegmentationFallback {
            reason: reason.clone(),
        });

        SegmentationOutcome {
            segments: self.fallback(transcript, ctx),
            source: SegmentSource::Fallback { reason },
        }
    }

    /// Validate each proposal and materialize the survivors. Content always comes from the
    /// transcript; whatever the oracle claimed the text was is never read.
    fn accept(&self, transcript: &Transcript, batch: ProposalBatch, ctx: &mut RunContext) -> Vec<Segment> {
        let n = transcript.len();

        if batch.malformed > 0 {
            logging::log_boundary(Some(ctx.id()), &format!(
                "Dropped {} malformed segment entries", batch.malformed
            ));
            ctx.record(Diagnostic::ProposalMalformed {
                count: batch.malformed,
            });
        }

        let mut segments = Vec::with_capacity(batch.proposals.len());

        for (index, proposal) in batch.proposals.into_iter().enumerate() {
            match boundary::validate(&proposal.boundary, n) {
                Validation::Rejected(reason) => {
                    logging::log_boundary(Some(ctx.id()), &format!(
                        "Rejected proposal {}: {}", index, reason
                    ));
                    ctx.record(Diagnostic::BoundaryRejected {
                        proposal: index,
                        reason,
                    });
                }
                Validation::Accepted { range, repair } => {
                    if let Some(repair) = repair {
                        logging::log_boundary(Some(ctx.id()), &format!(
                            "Repaired proposal {}: now covers {}", index, range
                        ));
                        ctx.record(Diagnostic::BoundaryRepaired {
                            proposal: index,
                            repair,
                        });
                    }

                    let id = segments.len() as u32 + 1;
                    let draft = draft_from_proposal(id, proposal, ctx);
                    segments.push(Segment::materialize(id, transcript, range, draft));
                }
            }
        }

        segments
    }

    fn fallback(&self, transcript: &Transcript, ctx: &mut RunContext) -> Vec<Segment> {
        let ranges = partition::partition(transcript, &self.partition);
        let total = ranges.len();

        logging::log_segmentation(Some(ctx.id()), &format!(
            "Fallback partitioner produced {} unscored segments", total
        ));

        ranges
            .into_iter()
            .enumerate()
            .map(|(i, range)| {
                let draft = SegmentDraft {
                    oracle_id: None,
                    labels: SegmentLabels {
                        topic: format!("Conversation part {} of {}", i + 1, total),
                        ..Default::default()
                    },
                    engagement: None,
                    enjoyment: None,
                    origin: SegmentOrigin::Fallback,
                };
                Segment::materialize(i as u32 + 1, transcript, range, draft)
            })
            .collect()
    }
}

fn draft_from_proposal(id: u32, proposal: SegmentProposal, ctx: &mut RunContext) -> SegmentDraft {
    let engagement = sub_score(
        id,
        ScoreKind::Engagement,
        proposal.engagement,
        proposal.engagement_justification,
        ctx,
    );
    let enjoyment = sub_score(
        id,
        ScoreKind::Enjoyment,
        proposal.enjoyment,
        proposal.enjoyment_justification,
        ctx,
    );

    SegmentDraft {
        oracle_id: proposal.oracle_id,
        labels: SegmentLabels {
            topic: proposal.topic.unwrap_or_default(),
            tone: proposal.tone.unwrap_or_default(),
            direction: proposal.direction.unwrap_or_default(),
            interaction_type: proposal
                .interaction_type
                .as_deref()
                .map(InteractionType::from_label)
                .unwrap_or_default(),
        },
        engagement,
        enjoyment,
        origin: SegmentOrigin::Oracle,
    }
}

fn sub_score(
    segment: u32,
    kind: ScoreKind,
    raw: Option<f64>,
    justification: Option<String>,
    ctx: &mut RunContext,
) -> Option<SubScore> {
    let raw = raw?;
    let (score, clamped) = SubScore::normalize(raw, justification.unwrap_or_default())?;
    if clamped {
        logging::log_boundary(Some(ctx.id()), &format!(
            "Segment {} {} score {} clamped to {}", segment, kind.as_str(), raw, score.value()
        ));
        ctx.record(Diagnostic::ScoreClamped {
            segment,
            score: kind,
            raw,
            clamped: score.value(),
        });
    }
    Some(score)
}
