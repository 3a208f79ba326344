use crate::boundary::ValidatedRange;
use crate::content;
use crate::transcript::Transcript;
use serde::{Deserialize, Serialize};

pub const MIN_SUB_SCORE: u8 = 1;
pub const MAX_SUB_SCORE: u8 = 10;

/// Qualitative description of a segment as reported by the segmentation oracle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentLabels {
    pub topic: String,
    pub tone: String,
    pub direction: String,
    pub interaction_type: InteractionType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    /// The user treated the agent as a tool: learning, lookups, troubleshooting.
    Useful,
    /// The user shared something about their own life or feelings.
    Personal,
    #[default]
    Unknown,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::Useful => "useful_interaction",
            InteractionType::Personal => "personal_interaction",
            InteractionType::Unknown => "unknown",
        }
    }

    pub fn from_label(s: &str) -> InteractionType {
        let lower = s.trim().to_lowercase();
        if lower.starts_with("useful") {
            InteractionType::Useful
        } else if lower.starts_with("personal") {
            InteractionType::Personal
        } else {
            InteractionType::Unknown
        }
    }
}

/// One sub-score in `[1, 10]` with the oracle's reasoning for it. Only
/// [`SubScore::normalize`] builds one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubScore {
    value: u8,
    justification: String,
}

impl SubScore {
    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn justification(&self) -> &str {
        &self.justification
    }

    /// Normalize a raw oracle number. Returns the score and whether it had to be clamped.
    pub fn normalize(raw: f64, justification: String) -> Option<(SubScore, bool)> {
        if !raw.is_finite() {
            return None;
        }
        let rounded = raw.round();
        let clamped = rounded.clamp(MIN_SUB_SCORE as f64, MAX_SUB_SCORE as f64);
        Some((
            SubScore {
                value: clamped as u8,
                justification,
            },
            clamped != rounded,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentOrigin {
    Oracle,
    Fallback,
}

/// A validated, content-bearing span of turns.
///
/// Segments can only be built through [`Segment::materialize`], which derives `content`
/// from the range and the transcript. Nothing an oracle says about content is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    id: u32,
    oracle_id: Option<i64>,
    range: ValidatedRange,
    content: String,
    labels: SegmentLabels,
    engagement: Option<SubScore>,
    enjoyment: Option<SubScore>,
    origin: SegmentOrigin,
}

pub struct SegmentDraft {
    pub oracle_id: Option<i64>,
    pub labels: SegmentLabels,
    pub engagement: Option<SubScore>,
    pub enjoyment: Option<SubScore>,
    pub origin: SegmentOrigin,
}

impl Segment {
    pub fn materialize(
        id: u32,
        transcript: &Transcript,
        range: ValidatedRange,
        draft: SegmentDraft,
    ) -> Self {
        Self {
            id,
            oracle_id: draft.oracle_id,
            range,
            content: content::extract(transcript, range),
            labels: draft.labels,
            engagement: draft.engagement,
            enjoyment: draft.enjoyment,
            origin: draft.origin,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn oracle_id(&self) -> Option<i64> {
        self.oracle_id
    }

    pub fn range(&self) -> ValidatedRange {
        self.range
    }

    pub fn start(&self) -> usize {
        self.range.start()
    }

    pub fn end(&self) -> usize {
        self.range.end()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn labels(&self) -> &SegmentLabels {
        &self.labels
    }

    pub fn engagement(&self) -> Option<&SubScore> {
        self.engagement.as_ref()
    }

    pub fn enjoyment(&self) -> Option<&SubScore> {
        self.enjoyment.as_ref()
    }

    pub fn origin(&self) -> SegmentOrigin {
        self.origin
    }

    /// `engagement + enjoyment` in `[2, 20]`, or `None` if either is undefined.
    pub fn combined(&self) -> Option<u8> {
        match (&self.engagement, &self.enjoyment) {
            (Some(e), Some(j)) => Some(e.value + j.value),
            _ => None,
        }
    }

    pub fn is_scored(&self) -> bool {
        self.combined().is_some()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn scored(id: u32, transcript: &Transcript, start: usize, end: usize, e: u8, j: u8) -> Segment {
        let range = ValidatedRange::checked(start, end, transcript.len()).unwrap();
        Segment::materialize(
            id,
            transcript,
            range,
            SegmentDraft {
                oracle_id: None,
                labels: SegmentLabels {
                    topic: format!("topic {}", id),
                    ..Default::default()
                },
                engagement: SubScore::normalize(e as f64, String::new()).map(|(s, _)| s),
                enjoyment: SubScore::normalize(j as f64, String::new()).map(|(s, _)| s),
                origin: SegmentOrigin::Oracle,
            },
        )
    }

    pub fn unscored(id: u32, transcript: &Transcript, start: usize, end: usize) -> Segment {
        let range = ValidatedRange::checked(start, end, transcript.len()).unwrap();
        Segment::materialize(
            id,
            transcript,
            range,
            SegmentDraft {
                oracle_id: None,
                labels: SegmentLabels::default(),
                engagement: None,
                enjoyment: None,
                origin: SegmentOrigin::Fallback,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_rounds_and_clamps() {
        let (score, clamped) = SubScore::normalize(7.4, "ok".into()).unwrap();
        assert_eq!(score.value(), 7);
        assert!(!clamped);

        let (score, clamped) = SubScore::normalize(14.0, String::new()).unwrap();
        assert_eq!(score.value(), 10);
        assert!(clamped);

        let (score, clamped) = SubScore::normalize(0.0, String::new()).unwrap();
        assert_eq!(score.value(), 1);
        assert!(clamped);

        assert!(SubScore::normalize(f64::NAN, String::new()).is_none());
    }

    #[test]
    fn test_combined_requires_both_scores() {
        let transcript = Transcript::parse("a: x\nb: y").unwrap();
        let seg = test_support::scored(1, &transcript, 0, 1, 6, 9);
        assert_eq!(seg.combined(), Some(15));

        let seg = test_support::unscored(2, &transcript, 0, 1);
        assert_eq!(seg.combined(), None);
        assert!(!seg.is_scored());
    }

    #[test]
    fn test_sub_scores_stay_in_range() {
        let transcript = Transcript::parse("a: x\nb: y").unwrap();
        let seg = test_support::scored(1, &transcript, 0, 1, 200, 255);
        assert_eq!(seg.engagement().map(SubScore::value), Some(10));
        assert_eq!(seg.combined(), Some(20));

        let (score, _) = SubScore::normalize(1e12, String::new()).unwrap();
        assert_eq!(score.value(), MAX_SUB_SCORE);
    }

    #[test]
    fn test_content_derived_from_range() {
        let transcript = Transcript::parse("user: one\nagent: two\nuser: three").unwrap();
        let seg = test_support::scored(1, &transcript, 1, 2, 5, 5);
        assert_eq!(seg.content(), "agent: two\nuser: three");
    }

    #[test]
    fn test_interaction_type_labels() {
        assert_eq!(InteractionType::from_label("useful_interaction"), InteractionType::Useful);
        assert_eq!(InteractionType::from_label("Personal interaction"), InteractionType::Personal);
        assert_eq!(InteractionType::from_label("chit-chat"), InteractionType::Unknown);
    }
}
