//! Retrieval clients.
//!
//! The retrieval service is a black box answering `GET /search?q=<query>`
//! with `{"hits": [{"content": "..."}]}`. Only the first few hits are kept,
//! each cut to a fixed length, so retrieved context never dominates the prompt.

use async_trait::async_trait;
use opsclaw_config::RetrievalConfig;
use opsclaw_core::error::RetrievalError;
use opsclaw_core::retriever::{ContextRetriever, RetrievedContext};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// HTTP client for the text-retrieval service.
pub struct HttpRetriever {
    endpoint: String,
    top_k: usize,
    snippet_chars: usize,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl HttpRetriever {
    pub fn new(
        endpoint: impl Into<String>,
        top_k: usize,
        snippet_chars: usize,
        timeout_secs: u64,
    ) -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RetrievalError::Unavailable(format!("HTTP client: {e}")))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            top_k,
            snippet_chars,
            timeout_secs,
            client,
        })
    }

    pub fn from_config(config: &RetrievalConfig) -> Result<Self, RetrievalError> {
        Self::new(
            config.endpoint.clone(),
            config.top_k,
            config.snippet_chars,
            config.timeout_secs,
        )
    }

    /// Keep the first `top_k` hits, each cut to `snippet_chars` characters.
    fn shape(&self, hits: Vec<Hit>) -> RetrievedContext {
        hits.into_iter()
            .take(self.top_k)
            .map(|h| h.content.chars().take(self.snippet_chars).collect())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl ContextRetriever for HttpRetriever {
    fn name(&self) -> &str {
        "http"
    }

    async fn retrieve(&self, query: &str) -> Result<RetrievedContext, RetrievalError> {
        let url = format!("{}/search", self.endpoint);
        let response = self
            .client
            .get(&url)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RetrievalError::Timeout(self.timeout_secs)
                } else {
                    RetrievalError::Unavailable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(RetrievalError::Unavailable(format!(
                "search returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::InvalidResponse(e.to_string()))?;

        let total = body.hits.len();
        let snippets = self.shape(body.hits);
        debug!(hits = total, kept = snippets.len(), "Retrieved context");
        Ok(snippets)
    }

    async fn health_check(&self) -> Result<bool, RetrievalError> {
        let response = self
            .client
            .get(format!("{}/", self.endpoint))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| RetrievalError::Unavailable(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

/// Stand-in used when retrieval is disabled: always returns no context.
#[derive(Debug, Default)]
pub struct NoopRetriever;

#[async_trait]
impl ContextRetriever for NoopRetriever {
    fn name(&self) -> &str {
        "noop"
    }

    async fn retrieve(&self, _query: &str) -> Result<RetrievedContext, RetrievalError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::Query, routing::get};
    use std::collections::HashMap;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn keeps_top_hits_and_truncates() {
        let router = Router::new().route(
            "/search",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("q").map(String::as_str), Some("nginx config"));
                let long = "x".repeat(500);
                Json(serde_json::json!({
                    "hits": [
                        {"content": long},
                        {"content": "b"},
                        {"content": "c"},
                        {"content": "d"}
                    ]
                }))
            }),
        );
        let base = serve(router).await;
        let retriever = HttpRetriever::new(base, 3, 300, 5).unwrap();

        let snippets = retriever.retrieve("nginx config").await.unwrap();
        assert_eq!(snippets.len(), 3);
        assert_eq!(snippets[0].len(), 300);
        assert_eq!(snippets[2], "c");
    }

    #[tokio::test]
    async fn empty_hits_is_ok() {
        let router = Router::new().route(
            "/search",
            get(|| async { Json(serde_json::json!({"hits": []})) }),
        );
        let base = serve(router).await;
        let retriever = HttpRetriever::new(base, 3, 300, 5).unwrap();
        assert!(retriever.retrieve("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_response() {
        let router = Router::new().route("/search", get(|| async { "not json" }));
        let base = serve(router).await;
        let retriever = HttpRetriever::new(base, 3, 300, 5).unwrap();
        let err = retriever.retrieve("q").await.unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn noop_returns_nothing() {
        let retriever = NoopRetriever;
        assert!(retriever.retrieve("q").await.unwrap().is_empty());
        assert!(retriever.health_check().await.unwrap());
    }
}
