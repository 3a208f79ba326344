//! Seams to the external reasoning capabilities and the parsing of what they return.
//!
//! Oracle output is untrusted. Everything is read out of loosely-typed JSON field by field,
//! so one bad field costs one value (or one proposal), never the whole response.

use crate::boundary::BoundaryProposal;
use crate::language::Language;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle not configured: {0}")]
    NotConfigured(String),
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle refused request ({status}): {message}")]
    Refused { status: u16, message: String },
    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed oracle response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl OracleError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            OracleError::NotConfigured(_) | OracleError::Refused { .. } => false,
            OracleError::Unavailable(_) | OracleError::Timeout(_) | OracleError::Malformed(_) => true,
            OracleError::Http(e) => !e.is_builder() && !e.is_decode(),
        }
    }
}

// ============ Segmentation ============

/// What the segmentation oracle is asked. The valid index range is always spelled out;
/// oracles are unreliable about inferring it from the text.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentationRequest {
    pub numbered_transcript: String,
    pub total_turns: usize,
    pub first_index: usize,
    pub last_index: usize,
    pub language: Option<Language>,
}

/// One segment as proposed by an oracle, before any validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentProposal {
    pub oracle_id: Option<i64>,
    pub boundary: BoundaryProposal,
    pub topic: Option<String>,
    pub tone: Option<String>,
    pub direction: Option<String>,
    pub interaction_type: Option<String>,
    pub engagement: Option<f64>,
    pub engagement_justification: Option<String>,
    pub enjoyment: Option<f64>,
    pub enjoyment_justification: Option<String>,
}

/// Proposals recovered from one oracle response.
#[derive(Debug, Clone, Default)]
pub struct ProposalBatch {
    pub proposals: Vec<SegmentProposal>,
    /// Array entries that were not objects at all.
    pub malformed: usize,
}

#[async_trait]
pub trait SegmentationOracle: Send + Sync {
    fn name(&self) -> &str;

    async fn propose(&self, request: &SegmentationRequest) -> Result<ProposalBatch, OracleError>;
}

// ============ Generation ============

/// Research findings attached to a segment brief.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResearchNote {
    pub title: String,
    pub excerpt: String,
    pub url: Option<String>,
}

/// Everything the generation oracle may know about one segment: materialized text and
/// labels only, never turn indices.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentBrief {
    pub topic: String,
    pub tone: String,
    pub direction: String,
    pub interaction_type: String,
    pub engagement: Option<u8>,
    pub engagement_justification: Option<String>,
    pub enjoyment: Option<u8>,
    pub enjoyment_justification: Option<String>,
    pub combined: Option<u8>,
    pub content: String,
    pub research: Vec<ResearchNote>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub segments: Vec<SegmentBrief>,
    pub starters_per_segment: usize,
    pub language: Option<Language>,
}

impl GenerationRequest {
    pub fn expected_total(&self) -> usize {
        self.segments.len() * self.starters_per_segment
    }
}

/// A candidate as returned by the generation oracle, rank not yet trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStarter {
    pub rank: Option<i64>,
    pub context: String,
    pub text: String,
}

#[async_trait]
pub trait GenerationOracle: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<RawStarter>, OracleError>;
}

#[async_trait]
pub trait ResearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<ResearchNote>, OracleError>;
}

// ============ Payload recovery ============

/// Find the first JSON object or array in `text`.
///
/// Model output often wraps JSON in code fences or surrounds it with prose (including
/// research notes the model appended mid-answer). Anything outside the first complete
/// JSON value is ignored.
pub fn extract_json_payload(text: &str) -> Result<Value, OracleError> {
    extract_payload(text, |_| true)
}

/// Like [`extract_json_payload`], but skips candidates that don't hold a list of objects
/// under `keys`. A bracketed citation such as `[1]` ahead of the real payload parses as
/// JSON too. If no candidate holds objects, the first one with a named list wins, so an
/// honest empty `{"segments": []}` still comes through.
fn extract_item_payload(text: &str, keys: &[&str]) -> Result<Value, OracleError> {
    extract_payload(text, |value| {
        item_list(value, keys).is_some_and(|items| items.iter().any(Value::is_object))
    })
    .or_else(|_| {
        extract_payload(text, |value| {
            value
                .as_object()
                .is_some_and(|map| keys.iter().any(|k| map.get(*k).is_some_and(Value::is_array)))
        })
    })
    .or_else(|_| extract_json_payload(text))
}

fn extract_payload(text: &str, accept: impl Fn(&Value) -> bool) -> Result<Value, OracleError> {
    let mut last_error = None;
    let mut rejected = false;
    // End of the last rejected value; arrays nested inside it are not candidates.
    let mut resume_at = 0;

    for (pos, ch) in text.char_indices() {
        if pos < resume_at || (ch != '{' && ch != '[') {
            continue;
        }
        let mut stream = serde_json::Deserializer::from_str(&text[pos..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) if accept(&value) => return Ok(value),
            Some(Ok(_)) => {
                rejected = true;
                resume_at = pos + stream.byte_offset();
            }
            Some(Err(e)) => last_error = Some(e.to_string()),
            None => {}
        }
    }

    Err(OracleError::Malformed(match (rejected, last_error) {
        (true, _) => "no JSON value holds the expected list".to_string(),
        (false, Some(e)) => format!("no parseable JSON value ({})", e),
        (false, None) => "response contains no JSON".to_string(),
    }))
}

/// Locate the list of items in a payload: either a bare array, the array under one of
/// `keys`, or failing that the first array-valued field.
fn item_list<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    match payload {
        Value::Array(items) => Some(items),
        Value::Object(map) => keys
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array))
            .or_else(|| map.values().find_map(Value::as_array)),
        _ => None,
    }
}

const SEGMENT_KEYS: &[&str] = &["segments", "conversation_segments"];
const STARTER_KEYS: &[&str] = &["starters", "candidates", "data"];

pub fn parse_segment_proposals(text: &str) -> Result<ProposalBatch, OracleError> {
    let payload = extract_item_payload(text, SEGMENT_KEYS)?;
    let items = item_list(&payload, SEGMENT_KEYS)
        .ok_or_else(|| OracleError::Malformed("no segment list in response".to_string()))?;

    let mut batch = ProposalBatch::default();
    for item in items {
        match item.as_object() {
            Some(obj) => batch.proposals.push(proposal_from_object(obj)),
            None => batch.malformed += 1,
        }
    }
    Ok(batch)
}

fn proposal_from_object(obj: &Map<String, Value>) -> SegmentProposal {
    SegmentProposal {
        oracle_id: int_field(obj, &["segment_id", "id"]),
        boundary: BoundaryProposal {
            start: int_field(obj, &["start_line", "start", "start_index"]),
            end: int_field(obj, &["end_line", "end", "end_index"]),
        },
        topic: str_field(obj, &["topic"]),
        tone: str_field(obj, &["tone"]),
        direction: str_field(obj, &["conversation_direction", "direction"]),
        interaction_type: str_field(obj, &["interaction_type"]),
        engagement: num_field(obj, &["engagement_score", "engagement"]),
        engagement_justification: str_field(obj, &["engagement_justification"]),
        enjoyment: num_field(obj, &["enjoyment_score", "enjoyment"]),
        enjoyment_justification: str_field(obj, &["enjoyment_justification"]),
    }
}

pub fn parse_starters(text: &str) -> Result<Vec<RawStarter>, OracleError> {
    let payload = extract_item_payload(text, STARTER_KEYS)?;
    let items = item_list(&payload, STARTER_KEYS)
        .ok_or_else(|| OracleError::Malformed("no starter list in response".to_string()))?;

    Ok(items
        .iter()
        .filter_map(Value::as_object)
        .map(|obj| RawStarter {
            rank: int_field(obj, &["rank"]),
            context: str_field(obj, &["context"]).unwrap_or_default(),
            text: str_field(obj, &["text", "starter", "message"]).unwrap_or_default(),
        })
        .collect())
}

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k)).filter(|v| !v.is_null())
}

fn num_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    match field(obj, keys)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn int_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    num_field(obj, keys)
        .filter(|v| v.is_finite())
        .map(|v| v.round() as i64)
}

fn str_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    match field(obj, keys)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
