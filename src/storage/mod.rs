//! Typed persistence over a local key-value store.
//!
//! The raw [`KeyValueStore`] methods return errors; the typed helpers below
//! are the boundary where those errors are logged and swallowed. A failed
//! write means "did not persist" and the caller's in-memory state stays
//! authoritative.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use log::warn;
use serde::{de::DeserializeOwned, Serialize};

use crate::db::Database;

pub use memory::MemoryStore;

pub const SESSION_STATE_KEY: &str = "mtp_session_state_v1";
pub const PARTICIPANT_COUNTER_KEY: &str = "mtp_participant_counter_v1";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

#[async_trait]
impl KeyValueStore for Database {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_value(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.set_value(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.delete_value(key).await
    }
}

/// Reads and decodes `key`. Missing keys, store errors and undecodable
/// payloads all come back as `None`.
pub async fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match store.get(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            warn!("Failed to read {key} from storage: {err:#}");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("Discarding unreadable {key} in storage: {err}");
            None
        }
    }
}

/// Encodes and writes `value`. Returns whether the write persisted.
pub async fn write_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> bool {
    let serialized = match serde_json::to_string(value) {
        Ok(serialized) => serialized,
        Err(err) => {
            warn!("Failed to serialize {key}: {err}");
            return false;
        }
    };

    match store.set(key, serialized).await {
        Ok(()) => true,
        Err(err) => {
            warn!("Failed to write {key} to storage: {err:#}");
            false
        }
    }
}

pub async fn clear_key(store: &dyn KeyValueStore, key: &str) -> bool {
    match store.remove(key).await {
        Ok(()) => true,
        Err(err) => {
            warn!("Failed to clear {key} from storage: {err:#}");
            false
        }
    }
}
