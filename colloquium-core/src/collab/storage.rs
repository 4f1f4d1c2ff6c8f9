//! HTTP storage collaborators: a key-value document store and a task
//! ledger.
//!
//! Both wrap small REST APIs. The store persists research packets under
//! stable keys; the ledger registers a task when a debate starts and marks
//! it finished after publication. Every call here is best-effort from the
//! executor's point of view.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use super::{KvStore, TaskLedger};
use crate::config::{LedgerConfig, StorageConfig};
use crate::error::StorageError;

fn build_client(timeout_secs: u64) -> Result<Client, StorageError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| StorageError::Connection {
            message: format!("failed to build HTTP client: {e}"),
        })
}

/// Key-value store backed by a documents REST endpoint.
pub struct HttpKvStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpKvStore {
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| StorageError::Connection {
                message: "storage.base_url is not configured".to_string(),
            })?;

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(&config.api_key_env).ok());

        Ok(Self {
            client: build_client(config.request_timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("X-API-Key", key),
            None => builder,
        }
    }
}

#[async_trait]
impl KvStore for HttpKvStore {
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let url = format!("{}/api/v1/documents", self.base_url);
        debug!(key = %key, "storing document");

        let response = self
            .request(self.client.post(&url))
            .json(&json!({ "key": key, "value": value }))
            .send()
            .await
            .map_err(|e| StorageError::Connection {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Http {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let url = format!("{}/api/v1/documents", self.base_url);

        let response = self
            .request(self.client.get(&url))
            .query(&[("key", key)])
            .send()
            .await
            .map_err(|e| StorageError::Connection {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(StorageError::Http {
                status: status.as_u16(),
                message: body,
            });
        }

        let json: Value =
            serde_json::from_str(&body).map_err(|e| StorageError::Serialization {
                message: format!("invalid JSON: {e}"),
            })?;
        let value = json
            .get("value")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StorageError::Serialization {
                message: "no value field in response".to_string(),
            })?;
        Ok(Some(value.to_string()))
    }
}

/// Task ledger backed by a tasks REST endpoint.
pub struct HttpTaskLedger {
    client: Client,
    base_url: String,
}

impl HttpTaskLedger {
    pub fn new(config: &LedgerConfig) -> Result<Self, StorageError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| StorageError::Connection {
                message: "ledger.base_url is not configured".to_string(),
            })?;

        Ok(Self {
            client: build_client(config.request_timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, url: &str, body: Value) -> Result<(), StorageError> {
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| StorageError::Connection {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Http {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TaskLedger for HttpTaskLedger {
    async fn begin(&self, task_id: &str) -> Result<(), StorageError> {
        let url = format!("{}/api/v1/tasks", self.base_url);
        debug!(task_id = %task_id, "registering task");
        self.post(&url, json!({ "task_id": task_id })).await
    }

    async fn complete(&self, task_id: &str) -> Result<(), StorageError> {
        let url = format!("{}/api/v1/tasks/{}/finish", self.base_url, task_id);
        debug!(task_id = %task_id, "finishing task");
        self.post(&url, json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_config(base_url: Option<&str>) -> StorageConfig {
        StorageConfig {
            base_url: base_url.map(str::to_string),
            api_key: Some("store-key".to_string()),
            api_key_env: "COLLOQUIUM_TEST_STORAGE_KEY".to_string(),
            request_timeout_secs: 30,
        }
    }

    #[test]
    fn test_store_requires_base_url() {
        let result = HttpKvStore::new(&storage_config(None));
        assert!(matches!(result, Err(StorageError::Connection { .. })));
    }

    #[test]
    fn test_store_trims_trailing_slash() {
        let store = HttpKvStore::new(&storage_config(Some("https://store.example.org/"))).unwrap();
        assert_eq!(store.base_url, "https://store.example.org");
    }

    #[test]
    fn test_store_without_api_key_is_allowed() {
        // SAFETY: test-only env var manipulation
        unsafe { std::env::remove_var("COLLOQUIUM_TEST_STORAGE_KEY_MISSING") };
        let mut config = storage_config(Some("https://store.example.org"));
        config.api_key = None;
        config.api_key_env = "COLLOQUIUM_TEST_STORAGE_KEY_MISSING".to_string();
        let store = HttpKvStore::new(&config).unwrap();
        assert!(store.api_key.is_none());
    }

    #[test]
    fn test_ledger_requires_base_url() {
        let config = LedgerConfig {
            base_url: None,
            request_timeout_secs: 30,
        };
        assert!(matches!(
            HttpTaskLedger::new(&config),
            Err(StorageError::Connection { .. })
        ));
    }

    #[test]
    fn test_ledger_url_shape() {
        let config = LedgerConfig {
            base_url: Some("https://ledger.example.org".to_string()),
            request_timeout_secs: 30,
        };
        let ledger = HttpTaskLedger::new(&config).unwrap();
        assert_eq!(ledger.base_url, "https://ledger.example.org");
    }
}
