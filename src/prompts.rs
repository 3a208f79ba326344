//! Prompt templates for the LLM-backed oracles.

use crate::language::Language;
use crate::oracle::{GenerationRequest, SegmentBrief, SegmentationRequest};
use std::fmt::Write;

pub const SEGMENTATION_SYSTEM: &str = r#"You analyze chat conversations between a user and an AI companion. Split the conversation into segments and rate how the user felt about each one.

Start a new segment where the topic shifts, the user's mood changes, a new question or problem comes up, or the conversation changes direction (learning to planning, casual to serious). Prefer several meaningful segments over a few generic ones, but each segment should hold at least two or three exchanges.

For every segment give:
- start_line and end_line: first and last line numbers, inclusive, taken from the numbered transcript
- topic: what is being discussed
- tone: the emotional quality of the exchange
- conversation_direction: where this part of the conversation is heading
- interaction_type: "useful_interaction" when the user treats the companion as a tool (learning, information, advice, games, troubleshooting) or "personal_interaction" when the user shares experiences, news, feelings or asks for support
- engagement_score (1-10) with engagement_justification: question frequency, depth of replies, follow-up interest
- enjoyment_score (1-10) with enjoyment_justification: positive sentiment, enthusiasm, gratitude, humor

Never copy message text into the answer; it is recovered from the line numbers.

Respond with a JSON object of the form {"segments": [ ... ]} and nothing else."#;

pub const GENERATION_SYSTEM: &str = r#"You write follow-up messages that an AI companion sends to a user some time after a conversation. They should read like a friend checking in, never like marketing.

For useful interactions, pick up what made the user curious: a related insight, a new angle, a discovery about the topic they asked about. For personal interactions, ask how things turned out, acknowledge what they shared, celebrate wins or offer practical support. Background research is attached to some segments; use it only when it makes a message more helpful or interesting.

Rules:
- Refer to what the user said, not to what the companion answered.
- Each message must make sense on its own. Briefly restate the person, event or topic it refers to.
- These messages are sent later, so use past tense where it fits.
- Warm and curious, never pushy.

Rank all messages together, 1 being the one the user is most likely to answer. Every rank from 1 to the total must be used exactly once.

Respond with a JSON object of the form {"starters": [{"rank": 1, "context": "...", "text": "..."}]} and nothing else."#;

fn language_line(language: Option<Language>) -> String {
    match language {
        Some(language) => format!("Write every text field in {}.", language.as_str()),
        None => "Write every text field in the language the conversation is in.".to_string(),
    }
}

pub fn segmentation_user(request: &SegmentationRequest) -> String {
    format!(
        "Conversation ({total} lines, numbered {first} to {last}):\n\n{transcript}\n\n\
         start_line and end_line must both be between {first} and {last}.\n{language}",
        total = request.total_turns,
        first = request.first_index,
        last = request.last_index,
        transcript = request.numbered_transcript,
        language = language_line(request.language),
    )
}

pub fn generation_user(request: &GenerationRequest) -> String {
    let mut out = format!(
        "Write {per} follow-up messages for each of the {count} segments below, {total} in total.\n{language}\n",
        per = request.starters_per_segment,
        count = request.segments.len(),
        total = request.expected_total(),
        language = language_line(request.language),
    );

    for (i, segment) in request.segments.iter().enumerate() {
        out.push('\n');
        write_brief(&mut out, i + 1, segment);
    }

    out
}

fn write_brief(out: &mut String, number: usize, brief: &SegmentBrief) {
    let or_unknown = |s: &str| if s.is_empty() { "unknown".to_string() } else { s.to_string() };
    let score = |value: Option<u8>, why: &Option<String>| match value {
        Some(v) => match why.as_deref().filter(|w| !w.is_empty()) {
            Some(why) => format!("{}/10 ({})", v, why),
            None => format!("{}/10", v),
        },
        None => "not rated".to_string(),
    };

    // Writing to a String never fails.
    let _ = writeln!(out, "## Segment {}", number);
    let _ = writeln!(out, "Topic: {}", or_unknown(&brief.topic));
    let _ = writeln!(out, "Tone: {}", or_unknown(&brief.tone));
    let _ = writeln!(out, "Direction: {}", or_unknown(&brief.direction));
    let _ = writeln!(out, "Interaction type: {}", brief.interaction_type);
    let _ = writeln!(out, "Engagement: {}", score(brief.engagement, &brief.engagement_justification));
    let _ = writeln!(out, "Enjoyment: {}", score(brief.enjoyment, &brief.enjoyment_justification));
    let _ = writeln!(out, "Conversation:\n{}", brief.content);

    if !brief.research.is_empty() {
        let _ = writeln!(out, "Research:");
        for note in &brief.research {
            let _ = writeln!(out, "- {}: {}", note.title, note.excerpt);
        }
    }
}
