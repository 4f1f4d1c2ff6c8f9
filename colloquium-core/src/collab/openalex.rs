//! OpenAlex evidence source.
//!
//! Queries the OpenAlex works API for scholarly papers matching a search
//! query. Requests carry a `mailto` address when configured, which places
//! them in OpenAlex's polite pool with better rate limits.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::EvidenceSource;
use crate::config::EvidenceConfig;
use crate::error::EvidenceError;
use crate::state::Document;

const SOURCE_NAME: &str = "openalex";

pub struct OpenAlexSource {
    client: Client,
    base_url: String,
    mailto: Option<String>,
    per_page: u32,
}

impl OpenAlexSource {
    pub fn new(config: &EvidenceConfig) -> Result<Self, EvidenceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| EvidenceError::Connection {
                source: SOURCE_NAME.to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config.openalex_base_url.trim_end_matches('/').to_string(),
            mailto: config.mailto.clone(),
            per_page: config.per_page,
        })
    }

    /// Map a works listing into documents: the work id as provenance, the
    /// title as content, the API's relevance score as the score.
    fn parse_works(body: &Value) -> Vec<Document> {
        body.get("results")
            .and_then(|r| r.as_array())
            .map(|works| {
                works
                    .iter()
                    .map(|work| Document {
                        source: work
                            .get("id")
                            .and_then(|v| v.as_str())
                            .unwrap_or("unknown")
                            .to_string(),
                        content: work
                            .get("title")
                            .and_then(|v| v.as_str())
                            .unwrap_or("No title available.")
                            .to_string(),
                        score: work
                            .get("relevance_score")
                            .and_then(|v| v.as_f64())
                            .unwrap_or(0.0),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl EvidenceSource for OpenAlexSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn search(&self, query: &str) -> Result<Vec<Document>, EvidenceError> {
        if query.trim().is_empty() {
            return Err(EvidenceError::EmptyQuery);
        }

        let url = format!("{}/works", self.base_url);
        let mut params: Vec<(&str, String)> = vec![
            ("search", query.to_string()),
            ("per-page", self.per_page.to_string()),
        ];
        if let Some(mailto) = &self.mailto {
            params.push(("mailto", mailto.clone()));
        }

        debug!(query = %query, per_page = self.per_page, "querying OpenAlex works");

        let response = self
            .client
            .get(&url)
            .query(&params)
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

        Ok(Self::parse_works(&json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config() -> EvidenceConfig {
        EvidenceConfig {
            openalex_base_url: "https://api.openalex.org".to_string(),
            mailto: Some("research@example.org".to_string()),
            per_page: 5,
            knowledge_base_url: None,
            knowledge_api_key: None,
            knowledge_api_key_env: "COLLOQUIUM_TEST_KNOWLEDGE_KEY".to_string(),
            request_timeout_secs: 30,
        }
    }

    #[test]
    fn test_parse_works() {
        let body = json!({
            "results": [
                {
                    "id": "https://openalex.org/W1",
                    "title": "Solid-state electrolyte advances",
                    "relevance_score": 12.5
                },
                {
                    "id": "https://openalex.org/W2",
                    "title": "Anode materials review"
                }
            ]
        });
        let docs = OpenAlexSource::parse_works(&body);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source, "https://openalex.org/W1");
        assert_eq!(docs[0].content, "Solid-state electrolyte advances");
        assert_eq!(docs[0].score, 12.5);
        // Missing relevance_score defaults to 0.0.
        assert_eq!(docs[1].score, 0.0);
    }

    #[test]
    fn test_parse_works_handles_nulls() {
        let body = json!({
            "results": [ { "id": null, "title": null } ]
        });
        let docs = OpenAlexSource::parse_works(&body);
        assert_eq!(docs[0].source, "unknown");
        assert_eq!(docs[0].content, "No title available.");
    }

    #[test]
    fn test_parse_works_empty_and_missing() {
        assert!(OpenAlexSource::parse_works(&json!({ "results": [] })).is_empty());
        assert!(OpenAlexSource::parse_works(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_is_refused() {
        let source = OpenAlexSource::new(&test_config()).unwrap();
        let result = source.search("   ").await;
        assert!(matches!(result, Err(EvidenceError::EmptyQuery)));
    }

    #[test]
    fn test_source_name() {
        let source = OpenAlexSource::new(&test_config()).unwrap();
        assert_eq!(source.name(), "openalex");
    }
}
