//! Parsed conversation transcripts
//!
//! A transcript is an ordered list of turns. Each turn is one message attributed to one
//! speaker, optionally stamped with the time it was sent. Two line shapes are accepted:
//!
//! ```text
//! [4/18/2025, 12:29:52 AM] Agent: What's new?
//! user: I have a very bad cold
//! ```
//!
//! A transcript uses one shape throughout. Once a timestamped turn has been seen, bare
//! `Speaker: text` lines are continuation text (`Ingredients: flour`, pasted URLs) and are
//! dropped like any other line that fits neither shape. Dropping never fails the parse.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// `[timestamp] Speaker: message`
static TIMESTAMPED_TURN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(.*?)\]\s*([^:]+):\s*(.*)$").expect("valid turn regex"));

/// `Speaker: message`. Speakers are short labels, so anything longer is prose that
/// happens to contain a colon.
static BARE_TURN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:\[\]]{1,40}):\s*(.*)$").expect("valid turn regex"));

const ELLIPSIS_PLACEHOLDER: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Agent,
    User,
    Other,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Agent => "agent",
            Role::User => "user",
            Role::Other => "other",
        }
    }

    /// Classify a speaker label. Chat exports number their users ("User 2"), so only the
    /// leading word counts.
    pub fn from_speaker(speaker: &str) -> Role {
        let lower = speaker.trim().to_lowercase();
        let head = lower.split_whitespace().next().unwrap_or("");
        match head {
            "agent" | "assistant" | "bot" | "ai" => Role::Agent,
            "user" | "human" | "customer" => Role::User,
            _ => Role::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub index: usize,
    pub speaker: String,
    pub text: String,
    pub timestamp: Option<String>,
}

impl Turn {
    pub fn role(&self) -> Role {
        Role::from_speaker(&self.speaker)
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    turns: Vec<Turn>,
    #[serde(skip)]
    dropped_lines: usize,
}

impl Transcript {
    /// Parse raw chat text into a transcript.
    ///
    /// Blank lines and `...` placeholders are skipped. Lines that don't look like a turn
    /// are dropped and counted. Fails only when nothing usable is left.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut turns = Vec::new();
        let mut dropped_lines = 0;
        let mut timestamped = false;

        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line == ELLIPSIS_PLACEHOLDER {
                continue;
            }

            match parse_line(line, timestamped) {
                Some((timestamp, speaker, text)) => {
                    timestamped |= timestamp.is_some();
                    turns.push(Turn {
                        index: turns.len(),
                        speaker,
                        text,
                        timestamp,
                    });
                }
                None => dropped_lines += 1,
            }
        }

        if turns.is_empty() {
            return Err(Error::Parse { dropped_lines });
        }

        Ok(Self {
            turns,
            dropped_lines,
        })
    }

    /// Build a transcript from turns that were already parsed elsewhere. Indices are
    /// reassigned so they always match positions.
    pub fn from_turns(turns: impl IntoIterator<Item = Turn>) -> Result<Self> {
        let turns: Vec<Turn> = turns
            .into_iter()
            .enumerate()
            .map(|(index, turn)| Turn { index, ..turn })
            .collect();

        if turns.is_empty() {
            return Err(Error::Parse { dropped_lines: 0 });
        }

        Ok(Self {
            turns,
            dropped_lines: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Turns in `range`. Callers pass validated ranges; anything past the end is cut off.
    pub fn slice(&self, range: RangeInclusive<usize>) -> &[Turn] {
        let (start, end) = range.into_inner();
        if start >= self.turns.len() || start > end {
            return &[];
        }
        let end = end.min(self.turns.len() - 1);
        &self.turns[start..=end]
    }

    pub fn dropped_lines(&self) -> usize {
        self.dropped_lines
    }

    pub fn last_index(&self) -> usize {
        self.turns.len().saturating_sub(1)
    }

    pub fn total_words(&self) -> usize {
        self.turns.iter().map(Turn::word_count).sum()
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.turns.iter().filter(|t| t.role() == role).count()
    }

    /// Render every turn as `Line {i}: {speaker}: {text}`, the form oracles reason over.
    pub fn render_numbered(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("Line {}: {}: {}", t.index, t.speaker, t.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn parse_line(line: &str, timestamped: bool) -> Option<(Option<String>, String, String)> {
    if let Some(caps) = TIMESTAMPED_TURN.captures(line) {
        let speaker = caps[2].trim();
        if speaker.is_empty() {
            return None;
        }
        return Some((
            Some(caps[1].trim().to_string()),
            speaker.to_string(),
            caps[3].trim().to_string(),
        ));
    }

    if timestamped || line.starts_with('[') {
        return None;
    }

    let caps = BARE_TURN.captures(line)?;
    let speaker = caps[1].trim();
    let text = caps[2].trim();
    // "https://..." splits into speaker "https" and text "//..."
    if speaker.is_empty() || speaker.contains('/') || text.starts_with("//") {
        return None;
    }
    Some((None, speaker.to_string(), text.to_string()))
}
