//! Shared snapshot cache: one well-known key, string values, get/set only.
//!
//! The deployed store is an Upstash-style Redis REST endpoint; tests and
//! single-process runs use the in-memory implementation. Absence of the key
//! signals the cold-start condition.

use std::collections::HashMap;
use std::env;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::observations::ObservationSnapshot;

/// Key contract shared by the refresher, the read endpoint, and the
/// original deployment.
pub const SNAPSHOT_KEY: &str = "fred_calendar";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache transport error: {0}")]
    Transport(String),
    #[error("cache payload error: {0}")]
    Payload(String),
    #[error("cache configuration missing: {0}")]
    MissingConfig(&'static str),
}

#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
}

pub fn encode_snapshot(snapshot: &ObservationSnapshot) -> Result<String, CacheError> {
    serde_json::to_string(snapshot).map_err(|err| CacheError::Payload(err.to_string()))
}

pub fn decode_snapshot(raw: &str) -> Result<ObservationSnapshot, CacheError> {
    serde_json::from_str(raw).map_err(|err| CacheError::Payload(err.to_string()))
}

/// Reads and decodes the snapshot under [`SNAPSHOT_KEY`]; `None` means cold
/// start.
pub async fn read_snapshot(
    cache: &dyn SharedCache,
) -> Result<Option<ObservationSnapshot>, CacheError> {
    match cache.get(SNAPSHOT_KEY).await? {
        Some(raw) => Ok(Some(decode_snapshot(&raw)?)),
        None => Ok(None),
    }
}

/// Serializes and stores a full snapshot, overwriting any prior value.
pub async fn write_snapshot(
    cache: &dyn SharedCache,
    snapshot: &ObservationSnapshot,
) -> Result<(), CacheError> {
    cache.set(SNAPSHOT_KEY, &encode_snapshot(snapshot)?).await
}

#[derive(Default)]
pub struct InMemorySharedCache {
    inner: RwLock<HashMap<String, String>>,
}

impl InMemorySharedCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| CacheError::Transport("cache lock poisoned".to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| CacheError::Transport("cache lock poisoned".to_string()))?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestKvConfig {
    pub url: String,
    pub token: String,
    pub timeout_ms: u64,
}

impl RestKvConfig {
    pub fn from_env() -> Result<Self, CacheError> {
        let url = non_empty_env("MACROCAL_KV_REST_URL")
            .ok_or(CacheError::MissingConfig("MACROCAL_KV_REST_URL"))?;
        let token = non_empty_env("MACROCAL_KV_REST_TOKEN")
            .ok_or(CacheError::MissingConfig("MACROCAL_KV_REST_TOKEN"))?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            token,
            timeout_ms: 5_000,
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Upstash-style Redis REST client: `GET {url}/get/{key}` and
/// `POST {url}/set/{key}` with a bearer token, responses wrapped in
/// `{"result": ...}`.
pub struct RestKvCache {
    config: RestKvConfig,
    client: reqwest::Client,
}

impl RestKvCache {
    pub fn new(config: RestKvConfig) -> Result<Self, CacheError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| CacheError::Transport(err.to_string()))?;

        Ok(Self { config, client })
    }

    pub fn from_env() -> Result<Self, CacheError> {
        Self::new(RestKvConfig::from_env()?)
    }
}

#[derive(Debug, Deserialize)]
struct RestKvResult {
    result: Option<serde_json::Value>,
}

#[async_trait]
impl SharedCache for RestKvCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let url = format!("{}/get/{}", self.config.url, key);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|err| CacheError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::Transport(format!(
                "kv get returned HTTP {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|err| CacheError::Transport(err.to_string()))?;
        let parsed: RestKvResult =
            serde_json::from_str(&body).map_err(|err| CacheError::Payload(err.to_string()))?;

        Ok(match parsed.result {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(value)) => Some(value),
            Some(other) => Some(other.to_string()),
        })
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let url = format!("{}/set/{}", self.config.url, key);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.token)
            .body(value.to_string())
            .send()
            .await
            .map_err(|err| CacheError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::Transport(format!(
                "kv set returned HTTP {status}"
            )));
        }

        Ok(())
    }
}
