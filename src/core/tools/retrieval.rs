//! Retrieval engine seam.
//!
//! The knowledge base itself (chunking, embeddings, vector store) lives
//! outside the relay. The relay only needs a ranked search, which
//! [`HttpRetrievalEngine`] reaches over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Text returned to the model when a search matches nothing.
pub const NO_RESULTS_MESSAGE: &str = "No relevant information found in the knowledge base.";

const DEFAULT_RETRIEVAL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RetrievalError {
    #[error("retrieval request failed: {0}")]
    Request(String),

    #[error("retrieval request timed out")]
    Timeout,

    #[error("retrieval service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid retrieval response: {0}")]
    Decode(String),

    #[error("invalid retrieval configuration: {0}")]
    InvalidConfiguration(String),
}

pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedSnippet {
    pub content: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl RetrievedSnippet {
    pub fn new(content: impl Into<String>, score: f32) -> Self {
        Self {
            content: content.into(),
            score,
            metadata: None,
        }
    }
}

/// Ranked search over the knowledge base.
#[async_trait]
pub trait RetrievalEngine: Send + Sync {
    /// Return at most `top_k` snippets, best first.
    async fn search(&self, query: &str, top_k: usize) -> RetrievalResult<Vec<RetrievedSnippet>>;
}

/// Render snippets as tool result text for the model.
pub fn format_results(snippets: &[RetrievedSnippet]) -> String {
    if snippets.is_empty() {
        return NO_RESULTS_MESSAGE.to_string();
    }
    snippets
        .iter()
        .enumerate()
        .map(|(i, snippet)| format!("Result {}:\n{}", i + 1, snippet.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Placeholder result for a failed search.
pub fn format_failure(error: &impl std::fmt::Display) -> String {
    format!("Error searching knowledge base: {error}")
}

/// Placeholder result for a tool the session does not offer.
pub fn format_unknown_tool(name: &str) -> String {
    format!("Error: unknown tool '{name}'")
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    k: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RetrievedSnippet>,
}

/// Retrieval engine reached through a JSON search endpoint.
///
/// Sends `POST {url}` with `{"query": ..., "k": ...}` and expects
/// `{"results": [{"content": ..., "score": ...}]}` back.
#[derive(Debug, Clone)]
pub struct HttpRetrievalEngine {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpRetrievalEngine {
    pub fn new(url: impl Into<String>) -> RetrievalResult<Self> {
        let url = url.into();
        url::Url::parse(&url)
            .map_err(|e| RetrievalError::InvalidConfiguration(format!("{url}: {e}")))?;
        Ok(Self {
            url,
            timeout: DEFAULT_RETRIEVAL_TIMEOUT,
            client: reqwest::Client::new(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl RetrievalEngine for HttpRetrievalEngine {
    async fn search(&self, query: &str, top_k: usize) -> RetrievalResult<Vec<RetrievedSnippet>> {
        debug!(url = %self.url, top_k, "Knowledge base search");

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&SearchRequest { query, k: top_k })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RetrievalError::Timeout
                } else {
                    RetrievalError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Decode(e.to_string()))?;
        parsed.results.truncate(top_k);

        debug!(hits = parsed.results.len(), "Knowledge base search complete");
        Ok(parsed.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_format_results_numbers_snippets() {
        let text = format_results(&[
            RetrievedSnippet::new("Founded in 2012.", 0.9),
            RetrievedSnippet::new("Offices in Berlin.", 0.7),
        ]);
        assert_eq!(
            text,
            "Result 1:\nFounded in 2012.\n\nResult 2:\nOffices in Berlin."
        );
    }

    #[test]
    fn test_format_placeholders() {
        assert_eq!(format_results(&[]), NO_RESULTS_MESSAGE);
        assert_eq!(
            format_failure(&RetrievalError::Timeout),
            "Error searching knowledge base: retrieval request timed out"
        );
        assert_eq!(format_unknown_tool("x"), "Error: unknown tool 'x'");
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(matches!(
            HttpRetrievalEngine::new("not a url"),
            Err(RetrievalError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_http_search_posts_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_json(json!({"query": "refund policy", "k": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"content": "Refunds within 30 days.", "score": 0.92},
                    {"content": "Contact support.", "score": 0.41, "metadata": {"source": "faq"}},
                    {"content": "Extra hit.", "score": 0.1}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let engine = HttpRetrievalEngine::new(format!("{}/search", server.uri())).unwrap();
        let results = engine.search("refund policy", 2).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "Refunds within 30 days.");
        assert_eq!(results[1].metadata, Some(json!({"source": "faq"})));
    }

    #[tokio::test]
    async fn test_http_search_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("index loading"))
            .mount(&server)
            .await;

        let engine = HttpRetrievalEngine::new(server.uri()).unwrap();
        let err = engine.search("anything", 3).await.unwrap_err();
        assert_eq!(
            err,
            RetrievalError::Status {
                status: 503,
                body: "index loading".into()
            }
        );
    }

    #[tokio::test]
    async fn test_http_search_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let engine = HttpRetrievalEngine::new(server.uri()).unwrap();
        assert!(matches!(
            engine.search("anything", 3).await,
            Err(RetrievalError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_http_search_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"results": []}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let engine = HttpRetrievalEngine::new(server.uri())
            .unwrap()
            .with_timeout(Duration::from_millis(100));
        assert_eq!(
            engine.search("slow", 3).await,
            Err(RetrievalError::Timeout)
        );
    }
}
