//! Validation and repair of segment boundary proposals.
//!
//! Oracles propose inclusive `[start, end]` ranges over turn indices and are frequently
//! wrong about the transcript's length. A proposal with a bad `start` has no anchor and is
//! rejected; a proposal whose `end` overruns is truncated to the last turn.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive range proposed by an oracle, before validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryProposal {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl BoundaryProposal {
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }
}

/// A range that is known to satisfy `0 <= start <= end < n` for its transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidatedRange {
    start: usize,
    end: usize,
}

impl ValidatedRange {
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn as_range(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }

    /// Ranges produced locally (fallback partitioner) go through the same checks.
    pub(crate) fn checked(start: usize, end: usize, n: usize) -> Option<Self> {
        (start <= end && end < n).then_some(Self { start, end })
    }
}

impl fmt::Display for ValidatedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Repair {
    /// `end` was missing, negative or past the last turn.
    EndClamped { from: Option<i64>, to: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    MissingStart,
    StartOutOfRange { start: i64, turns: usize },
    Inverted { start: usize, end: usize },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MissingStart => write!(f, "proposal has no start index"),
            RejectReason::StartOutOfRange { start, turns } => {
                write!(f, "start {} outside 0..{}", start, turns)
            }
            RejectReason::Inverted { start, end } => {
                write!(f, "start {} is after end {}", start, end)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Accepted {
        range: ValidatedRange,
        repair: Option<Repair>,
    },
    Rejected(RejectReason),
}

impl Validation {
    pub fn range(&self) -> Option<ValidatedRange> {
        match self {
            Validation::Accepted { range, .. } => Some(*range),
            Validation::Rejected(_) => None,
        }
    }
}

/// Validate `proposal` against a transcript of `n` turns.
///
/// Rules apply in order: a bad start rejects, a bad end is clamped to `n - 1`, and an
/// inverted range (after clamping) rejects.
pub fn validate(proposal: &BoundaryProposal, n: usize) -> Validation {
    let Some(start) = proposal.start else {
        return Validation::Rejected(RejectReason::MissingStart);
    };

    if start < 0 || start as u64 >= n as u64 {
        return Validation::Rejected(RejectReason::StartOutOfRange { start, turns: n });
    }
    let start = start as usize;

    let (end, repair) = match proposal.end {
        Some(end) if end >= 0 && (end as u64) < n as u64 => (end as usize, None),
        other => (
            n - 1,
            Some(Repair::EndClamped {
                from: other,
                to: n - 1,
            }),
        ),
    };

    if start > end {
        return Validation::Rejected(RejectReason::Inverted { start, end });
    }

    Validation::Accepted {
        range: ValidatedRange { start, end },
        repair,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted(v: Validation) -> (usize, usize, Option<Repair>) {
        match v {
            Validation::Accepted { range, repair } => (range.start(), range.end(), repair),
            Validation::Rejected(reason) => panic!("unexpected rejection: {}", reason),
        }
    }

    #[test]
    fn test_accepts_in_range() {
        assert_eq!(accepted(validate(&BoundaryProposal::new(0, 3), 6)), (0, 3, None));
        assert_eq!(accepted(validate(&BoundaryProposal::new(5, 5), 6)), (5, 5, None));
    }

    #[test]
    fn test_rejects_bad_start() {
        for start in [-1, 6, 100] {
            let v = validate(&BoundaryProposal::new(start, 5), 6);
            assert_eq!(
                v,
                Validation::Rejected(RejectReason::StartOutOfRange { start, turns: 6 })
            );
        }
    }

    #[test]
    fn test_clamps_overrunning_end() {
        let (start, end, repair) = accepted(validate(&BoundaryProposal::new(4, 10), 6));
        assert_eq!((start, end), (4, 5));
        assert_eq!(repair, Some(Repair::EndClamped { from: Some(10), to: 5 }));
    }

    #[test]
    fn test_clamps_negative_or_missing_end() {
        let (_, end, _) = accepted(validate(&BoundaryProposal::new(2, -3), 6));
        assert_eq!(end, 5);

        let proposal = BoundaryProposal { start: Some(1), end: None };
        let (_, end, repair) = accepted(validate(&proposal, 6));
        assert_eq!(end, 5);
        assert_eq!(repair, Some(Repair::EndClamped { from: None, to: 5 }));
    }

    #[test]
    fn test_rejects_inverted() {
        let v = validate(&BoundaryProposal::new(4, 2), 6);
        assert_eq!(v, Validation::Rejected(RejectReason::Inverted { start: 4, end: 2 }));
    }

    #[test]
    fn test_rejects_missing_start() {
        let proposal = BoundaryProposal { start: None, end: Some(2) };
        assert_eq!(validate(&proposal, 6), Validation::Rejected(RejectReason::MissingStart));
    }

    #[test]
    fn test_empty_transcript_rejects_everything() {
        assert!(validate(&BoundaryProposal::new(0, 0), 0).range().is_none());
    }
}
