//! Deterministic fallback partitioner.
//!
//! Used when the segmentation oracle is missing or gives nothing usable. It cannot judge
//! engagement, so every segment it produces is unscored and ranks after scored ones.

use crate::boundary::ValidatedRange;
use crate::error::{Error, Result};
use crate::transcript::Transcript;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Upper bound on the number of chunks.
    pub max_segments: usize,
    /// Transcripts this short become a single segment.
    pub single_segment_max_turns: usize,
    /// Word floor: a chunk should carry at least this much text.
    pub min_words_per_segment: usize,
    pub min_turns_per_segment: usize,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            max_segments: 10,
            single_segment_max_turns: 10,
            min_words_per_segment: 60,
            min_turns_per_segment: 3,
        }
    }
}

impl PartitionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_segments == 0 {
            return Err(Error::Config(
                "pipeline.partition.max_segments must be at least 1".to_string(),
            ));
        }
        if self.min_turns_per_segment == 0 {
            return Err(Error::Config(
                "pipeline.partition.min_turns_per_segment must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of chunks for a transcript of `turns` turns holding `words` words.
    fn chunk_count(&self, turns: usize, words: usize) -> usize {
        if turns <= self.single_segment_max_turns {
            return 1;
        }

        let by_words = match self.min_words_per_segment {
            0 => usize::MAX,
            floor => words / floor,
        };
        let by_turns = turns / self.min_turns_per_segment.max(1);

        self.max_segments
            .min(by_words)
            .min(by_turns)
            .clamp(1, turns)
    }
}

/// Split the transcript into contiguous, roughly equal chunks that exactly tile
/// `[0, n-1]`. Chunk `i` of `c` starts at turn `i * n / c`.
pub fn partition(transcript: &Transcript, config: &PartitionConfig) -> Vec<ValidatedRange> {
    let n = transcript.len();
    if n == 0 {
        return Vec::new();
    }

    let chunks = config.chunk_count(n, transcript.total_words());

    (0..chunks)
        .filter_map(|i| {
            let start = i * n / chunks;
            let end = (i + 1) * n / chunks - 1;
            ValidatedRange::checked(start, end, n)
        })
        .collect()
}
