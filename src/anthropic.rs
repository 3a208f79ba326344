use crate::llm::{status_error, transport_error, ChatBackend};
use crate::oracle::OracleError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const MESSAGES_PATH: &str = "/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT_SECS: u64 = 60;

// Default model
pub const CLAUDE_SONNET: &str = "claude-sonnet-4-20250514";

#[derive(Debug, Serialize, Clone)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl AnthropicClient {
    pub fn new(api_key: &str, model: &str) -> Result<Self, OracleError> {
        let timeout = Duration::from_secs(REQUEST_TIMEOUT_SECS);
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: ANTHROPIC_API_URL.to_string(),
            model: model.to_string(),
            temperature: 0.4,
            max_tokens: 4096,
            timeout,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Send a messages request to Claude and return the final text block.
    pub async fn chat_completion(
        &self,
        system_prompt: Option<&str>,
        messages: Vec<AnthropicMessage>,
    ) -> Result<String, OracleError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: system_prompt,
            messages,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}{}", self.base_url, MESSAGES_PATH))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            // Try to parse structured error
            let detail = match serde_json::from_str::<AnthropicError>(&error_text) {
                Ok(parsed) => format!("{} - {}", parsed.error.error_type, parsed.error.message),
                Err(_) => error_text,
            };
            return Err(status_error("Anthropic", status, &detail));
        }

        let completion: MessagesResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(format!("unexpected Anthropic response: {}", e)))?;

        completion
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text)
            .last()
            .ok_or_else(|| OracleError::Malformed("No text response from Claude".to_string()))
    }
}

#[async_trait]
impl ChatBackend for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, OracleError> {
        let messages = vec![AnthropicMessage {
            role: "user".to_string(),
            content: user.to_string(),
        }];
        self.chat_completion(Some(system), messages).await
    }
}
