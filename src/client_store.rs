//! Durable client-side calendar cache.
//!
//! One well-known slot holds the last good `{events, fetchedAt}` entry. The
//! store refuses empty event lists, so a failed or empty refresh can never
//! destroy a previously good entry; replacement only happens through a
//! strictly non-empty save.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schedule::EnrichedEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientCacheEntry {
    pub events: Vec<EnrichedEvent>,
    #[serde(rename = "fetchedAt")]
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("refusing to persist an empty event list")]
    EmptyEvents,
    #[error("client store lock poisoned")]
    Poisoned,
    #[error("client store SQL error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("client store payload error: {0}")]
    Payload(String),
}

pub trait ClientCacheStore: Send {
    fn load(&self) -> Result<Option<ClientCacheEntry>, StoreError>;
    /// Persists a new entry. Rejects empty event lists.
    fn save(&self, entry: &ClientCacheEntry) -> Result<(), StoreError>;
}

pub struct SqliteClientStore {
    conn: Mutex<Connection>,
}

impl SqliteClientStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS calendar_cache (
                slot INTEGER PRIMARY KEY CHECK (slot = 0),
                payload TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl ClientCacheStore for SqliteClientStore {
    fn load(&self) -> Result<Option<ClientCacheEntry>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let payload: Option<String> = conn
            .query_row("SELECT payload FROM calendar_cache WHERE slot = 0", [], |row| {
                row.get(0)
            })
            .optional()?;

        payload
            .map(|raw| serde_json::from_str(&raw).map_err(|err| StoreError::Payload(err.to_string())))
            .transpose()
    }

    fn save(&self, entry: &ClientCacheEntry) -> Result<(), StoreError> {
        if entry.events.is_empty() {
            return Err(StoreError::EmptyEvents);
        }

        let payload =
            serde_json::to_string(entry).map_err(|err| StoreError::Payload(err.to_string()))?;
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT INTO calendar_cache (slot, payload) VALUES (0, ?1)
             ON CONFLICT(slot) DO UPDATE SET payload = excluded.payload",
            params![payload],
        )?;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryClientStore {
    inner: Mutex<Option<ClientCacheEntry>>,
}

impl InMemoryClientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(entry: ClientCacheEntry) -> Self {
        Self {
            inner: Mutex::new(Some(entry)),
        }
    }
}

impl ClientCacheStore for InMemoryClientStore {
    fn load(&self) -> Result<Option<ClientCacheEntry>, StoreError> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .clone())
    }

    fn save(&self, entry: &ClientCacheEntry) -> Result<(), StoreError> {
        if entry.events.is_empty() {
            return Err(StoreError::EmptyEvents);
        }
        *self.inner.lock().map_err(|_| StoreError::Poisoned)? = Some(entry.clone());
        Ok(())
    }
}
