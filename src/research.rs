//! Background research for starter generation, backed by the Firecrawl search API.

use crate::llm::{status_error, transport_error};
use crate::oracle::{OracleError, ResearchNote, ResearchProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const FIRECRAWL_API_URL: &str = "https://api.firecrawl.dev";
const SEARCH_PATH: &str = "/v1/search";
const SEARCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    url: Option<String>,
    title: Option<String>,
    description: Option<String>,
    markdown: Option<String>,
}

pub struct FirecrawlResearch {
    client: Client,
    api_key: String,
    base_url: String,
    limit: usize,
    excerpt_chars: usize,
    timeout: Duration,
}

impl FirecrawlResearch {
    pub fn new(api_key: &str, limit: usize, excerpt_chars: usize) -> Result<Self, OracleError> {
        let timeout = Duration::from_secs(SEARCH_TIMEOUT_SECS);
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: FIRECRAWL_API_URL.to_string(),
            limit,
            excerpt_chars,
            timeout,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn to_note(&self, result: SearchResult) -> Option<ResearchNote> {
        let body = result
            .markdown
            .filter(|m| !m.trim().is_empty())
            .or(result.description)?;

        Some(ResearchNote {
            title: result.title.unwrap_or_else(|| "Untitled".to_string()),
            excerpt: truncate_chars(body.trim(), self.excerpt_chars),
            url: result.url,
        })
    }
}

#[async_trait]
impl ResearchProvider for FirecrawlResearch {
    async fn search(&self, query: &str) -> Result<Vec<ResearchNote>, OracleError> {
        let request = SearchRequest {
            query,
            limit: self.limit,
        };

        let response = self
            .client
            .post(format!("{}{}", self.base_url, SEARCH_PATH))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error("Firecrawl", status, &error_text));
        }

        let results: SearchResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(format!("unexpected Firecrawl response: {}", e)))?;

        Ok(results
            .data
            .into_iter()
            .take(self.limit)
            .filter_map(|r| self.to_note(r))
            .collect())
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("привет мир", 6), "привет...");
        assert_eq!(truncate_chars("short", 300), "short");
    }

    #[tokio::test]
    async fn test_search_returns_top_excerpts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/search"))
            .and(header("authorization", "Bearer fc-test"))
            .and(body_partial_json(json!({"query": "trucks", "limit": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [
                    {"url": "https://a.example", "title": "A", "markdown": "0123456789abc"},
                    {"url": "https://b.example", "description": "desc only"},
                    {"url": "https://c.example", "title": "C", "markdown": "ignored"}
                ]
            })))
            .mount(&server)
            .await;

        let research = FirecrawlResearch::new("fc-test", 2, 10)
            .unwrap()
            .with_base_url(&server.uri());
        let notes = research.search("trucks").await.unwrap();

        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].excerpt, "0123456789...");
        assert_eq!(notes[0].url.as_deref(), Some("https://a.example"));
        assert_eq!(notes[1].title, "Untitled");
        assert_eq!(notes[1].excerpt, "desc only");
    }

    #[tokio::test]
    async fn test_payment_required_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_string("out of credits"))
            .mount(&server)
            .await;

        let research = FirecrawlResearch::new("fc-test", 3, 300)
            .unwrap()
            .with_base_url(&server.uri());
        let err = research.search("anything").await.unwrap_err();
        assert!(matches!(err, OracleError::Refused { status: 402, .. }));
    }
}
