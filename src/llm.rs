use crate::oracle::{
    parse_segment_proposals, parse_starters, GenerationOracle, GenerationRequest, OracleError,
    ProposalBatch, RawStarter, SegmentationOracle, SegmentationRequest,
};
use crate::prompts;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

/// A chat model that answers one system + user prompt pair with text.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, system: &str, user: &str) -> Result<String, OracleError>;
}

/// Map a non-success HTTP status to an oracle error. Rate limits and server errors are
/// worth retrying; any other client error will fail the same way next time.
pub(crate) fn status_error(provider: &str, status: StatusCode, body: &str) -> OracleError {
    let message = format!("{} API error ({}): {}", provider, status, body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        OracleError::Unavailable(message)
    } else {
        OracleError::Refused {
            status: status.as_u16(),
            message,
        }
    }
}

pub(crate) fn transport_error(err: reqwest::Error, timeout: Duration) -> OracleError {
    if err.is_timeout() {
        OracleError::Timeout(timeout)
    } else if err.is_connect() {
        OracleError::Unavailable(err.to_string())
    } else {
        OracleError::Http(err)
    }
}

/// Segmentation over any [`ChatBackend`].
pub struct LlmSegmentationOracle<B> {
    backend: Arc<B>,
}

impl<B: ChatBackend> LlmSegmentationOracle<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: ChatBackend> SegmentationOracle for LlmSegmentationOracle<B> {
    fn name(&self) -> &str {
        self.backend.name()
    }

    async fn propose(&self, request: &SegmentationRequest) -> Result<ProposalBatch, OracleError> {
        let user = prompts::segmentation_user(request);
        let reply = self.backend.complete(prompts::SEGMENTATION_SYSTEM, &user).await?;
        parse_segment_proposals(&reply)
    }
}

/// Starter generation over any [`ChatBackend`].
pub struct LlmGenerationOracle<B> {
    backend: Arc<B>,
}

impl<B: ChatBackend> LlmGenerationOracle<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: ChatBackend> GenerationOracle for LlmGenerationOracle<B> {
    fn name(&self) -> &str {
        self.backend.name()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<RawStarter>, OracleError> {
        let user = prompts::generation_user(request);
        let reply = self.backend.complete(prompts::GENERATION_SYSTEM, &user).await?;
        parse_starters(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CannedBackend {
        reply: String,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl CannedBackend {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatBackend for CannedBackend {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, system: &str, user: &str) -> Result<String, OracleError> {
            self.prompts
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error("OpenAI", StatusCode::UNAUTHORIZED, "bad key"),
            OracleError::Refused { status: 401, .. }
        ));
        assert!(matches!(
            status_error("OpenAI", StatusCode::BAD_REQUEST, ""),
            OracleError::Refused { status: 400, .. }
        ));
        assert!(status_error("OpenAI", StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(status_error("OpenAI", StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(!status_error("OpenAI", StatusCode::FORBIDDEN, "").is_retryable());
    }

    #[tokio::test]
    async fn test_segmentation_oracle_parses_fenced_reply() {
        let backend = CannedBackend::new(
            "```json\n{\"segments\": [{\"start_line\": 0, \"end_line\": 1, \"topic\": \"greeting\"}]}\n```",
        );
        let oracle = LlmSegmentationOracle::new(backend.clone());
        let request = SegmentationRequest {
            numbered_transcript: "Line 0: user: hi\nLine 1: agent: hello".into(),
            total_turns: 2,
            first_index: 0,
            last_index: 1,
            language: None,
        };

        let batch = oracle.propose(&request).await.unwrap();

        assert_eq!(oracle.name(), "canned");
        assert_eq!(batch.proposals.len(), 1);
        assert_eq!(batch.proposals[0].topic.as_deref(), Some("greeting"));
        let seen = backend.prompts.lock().unwrap();
        assert_eq!(seen[0].0, prompts::SEGMENTATION_SYSTEM);
        assert!(seen[0].1.contains("Line 1: agent: hello"));
    }

    #[tokio::test]
    async fn test_generation_oracle_rejects_prose() {
        let oracle = LlmGenerationOracle::new(CannedBackend::new("Sorry, I can't help with that."));
        let request = GenerationRequest {
            segments: Vec::new(),
            starters_per_segment: 5,
            language: None,
        };

        assert!(matches!(
            oracle.generate(&request).await,
            Err(OracleError::Malformed(_))
        ));
    }
}
