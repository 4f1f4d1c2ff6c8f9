//! Knowledge-base evidence source.
//!
//! Searches a hosted knowledge store over its REST API. Complements the
//! scholarly works source with previously archived research material.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use super::EvidenceSource;
use crate::config::EvidenceConfig;
use crate::error::EvidenceError;
use crate::state::Document;

const SOURCE_NAME: &str = "knowledge_base";

pub struct KnowledgeBaseSource {
    client: Client,
    base_url: String,
    api_key: String,
    limit: u32,
}

impl KnowledgeBaseSource {
    /// Create a new source from configuration.
    ///
    /// Requires `knowledge_base_url` and an API key, taken from
    /// `knowledge_api_key` or the environment variable named by
    /// `knowledge_api_key_env`.
    pub fn new(config: &EvidenceConfig) -> Result<Self, EvidenceError> {
        let base_url = config.knowledge_base_url.clone().ok_or_else(|| {
            EvidenceError::Connection {
                source: SOURCE_NAME.to_string(),
                message: "knowledge_base_url is not configured".to_string(),
            }
        })?;

        let api_key = config
            .knowledge_api_key
            .clone()
            .or_else(|| std::env::var(&config.knowledge_api_key_env).ok())
            .ok_or_else(|| EvidenceError::Connection {
                source: SOURCE_NAME.to_string(),
                message: format!("env var '{}' not set", config.knowledge_api_key_env),
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| EvidenceError::Connection {
                source: SOURCE_NAME.to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            limit: config.per_page,
        })
    }

    /// Map a search listing into documents: the stored document id as
    /// provenance, title plus preview as content.
    fn parse_results(body: &Value) -> Vec<Document> {
        body.get("results")
            .and_then(|r| r.as_array())
            .map(|results| {
                results
                    .iter()
                    .map(|res| {
                        let doc = res.get("document").cloned().unwrap_or_else(|| json!({}));
                        let title = doc
                            .get("title")
                            .and_then(|v| v.as_str())
                            .unwrap_or("No title");
                        let preview = doc
                            .get("content_preview")
                            .and_then(|v| v.as_str())
                            .unwrap_or("");
                        Document {
                            source: doc
                                .get("document_id")
                                .and_then(|v| v.as_str())
                                .unwrap_or("unknown")
                                .to_string(),
                            content: format!("{title}\n{preview}"),
                            score: res.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl EvidenceSource for KnowledgeBaseSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn search(&self, query: &str) -> Result<Vec<Document>, EvidenceError> {
        if query.trim().is_empty() {
            return Err(EvidenceError::EmptyQuery);
        }

        let url = format!("{}/api/v1/knowledge/search", self.base_url);
        debug!(query = %query, limit = self.limit, "querying knowledge base");

        let response = self
            .client
            .post(&url)
            .header("X-API-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&json!({ "query": query, "limit": self.limit }))
            .send()
            .await
            .map_err(|e| EvidenceError::Connection {
                source: SOURCE_NAME.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EvidenceError::Connection {
                source: SOURCE_NAME.to_string(),
                message: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(EvidenceError::Http {
                source: SOURCE_NAME.to_string(),
                status: status.as_u16(),
                message: body,
            });
        }

        let json: Value =
            serde_json::from_str(&body).map_err(|e| EvidenceError::ResponseParse {
                source: SOURCE_NAME.to_string(),
                message: format!("invalid JSON: {e}"),
            })?;

        Ok(Self::parse_results(&json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EvidenceConfig {
        EvidenceConfig {
            openalex_base_url: "https://api.openalex.org".to_string(),
            mailto: None,
            per_page: 5,
            knowledge_base_url: Some("https://knowledge.example.org".to_string()),
            knowledge_api_key: Some("kb-test-key".to_string()),
            knowledge_api_key_env: "COLLOQUIUM_TEST_KNOWLEDGE_KEY".to_string(),
            request_timeout_secs: 30,
        }
    }

    #[test]
    fn test_parse_results() {
        let body = json!({
            "results": [
                {
                    "document": {
                        "document_id": "doc-42",
                        "title": "Prior debate on electrolytes",
                        "content_preview": "Key findings were..."
                    },
                    "score": 0.87
                }
            ]
        });
        let docs = KnowledgeBaseSource::parse_results(&body);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "doc-42");
        assert_eq!(
            docs[0].content,
            "Prior debate on electrolytes\nKey findings were..."
        );
        assert_eq!(docs[0].score, 0.87);
    }

    #[test]
    fn test_parse_results_missing_document() {
        let body = json!({ "results": [ { "score": 0.5 } ] });
        let docs = KnowledgeBaseSource::parse_results(&body);
        assert_eq!(docs[0].source, "unknown");
        assert_eq!(docs[0].content, "No title\n");
    }

    #[test]
    fn test_new_requires_base_url() {
        let mut config = test_config();
        config.knowledge_base_url = None;
        assert!(KnowledgeBaseSource::new(&config).is_err());
    }

    #[test]
    fn test_new_requires_api_key() {
        // SAFETY: test-only env var manipulation
        unsafe { std::env::remove_var("COLLOQUIUM_TEST_KNOWLEDGE_KEY_MISSING") };
        let mut config = test_config();
        config.knowledge_api_key = None;
        config.knowledge_api_key_env = "COLLOQUIUM_TEST_KNOWLEDGE_KEY_MISSING".to_string();
        assert!(KnowledgeBaseSource::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_empty_query_is_refused() {
        let source = KnowledgeBaseSource::new(&test_config()).unwrap();
        let result = source.search("").await;
        assert!(matches!(result, Err(EvidenceError::EmptyQuery)));
    }
}
