use crate::boundary::ValidatedRange;
use crate::transcript::Transcript;

/// Materialize the text of turns `range` as `speaker: text` lines.
///
/// Segment content is always produced here from its boundaries, never stored on its own.
pub fn extract(transcript: &Transcript, range: ValidatedRange) -> String {
    transcript
        .slice(range.as_range())
        .iter()
        .map(|turn| format!("{}: {}", turn.speaker, turn.text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{validate, BoundaryProposal};

    fn six_turns() -> Transcript {
        Transcript::parse(
            "user: I have a cold\n\
             agent: Get well soon!\n\
             user: Thanks\n\
             agent: Want tea tips?\n\
             user: Sure\n\
             agent: Lemon and honey.",
        )
        .unwrap()
    }

    #[test]
    fn test_extract_exact_turns() {
        let transcript = six_turns();
        let range = validate(&BoundaryProposal::new(1, 2), transcript.len()).range().unwrap();

        assert_eq!(extract(&transcript, range), "agent: Get well soon!\nuser: Thanks");
    }

    #[test]
    fn test_extract_every_range_matches_turns() {
        let transcript = six_turns();
        let n = transcript.len();
        for s in 0..n {
            for e in s..n {
                let range = ValidatedRange::checked(s, e, n).unwrap();
                let expected: Vec<String> = transcript.turns()[s..=e]
                    .iter()
                    .map(|t| format!("{}: {}", t.speaker, t.text))
                    .collect();
                assert_eq!(extract(&transcript, range), expected.join("\n"));
            }
        }
    }

    #[test]
    fn test_extract_follows_repaired_range() {
        let transcript = six_turns();
        let range = validate(&BoundaryProposal::new(4, 10), transcript.len()).range().unwrap();

        assert_eq!(extract(&transcript, range), "user: Sure\nagent: Lemon and honey.");
    }
}
