use crate::segment::Segment;
use std::cmp::{Ordering, Reverse};

/// Segments handed to starter generation, matching its per-segment fan-out.
pub const DEFAULT_TOP_K: usize = 3;

/// Select the top `k` segments.
///
/// Scored segments come first by combined score, highest first. Unscored segments
/// (fallback output) follow. The sort is stable, so ties keep creation order and the
/// same input always yields the same output.
pub fn rank(segments: &[Segment], k: usize) -> Vec<Segment> {
    let mut ordered: Vec<&Segment> = segments.iter().collect();
    ordered.sort_by(|a, b| compare(a, b));
    ordered.into_iter().take(k).cloned().collect()
}

fn compare(a: &Segment, b: &Segment) -> Ordering {
    // `None` sorts below every `Some`, so Reverse puts unscored segments last.
    Reverse(a.combined()).cmp(&Reverse(b.combined()))
}
