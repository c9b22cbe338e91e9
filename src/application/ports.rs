//! Traits describing the collaborators the gallery core talks to.

use async_trait::async_trait;
use serde_json::Value;

use crate::application::error::{FetchError, StorageError};

/// JSON-over-HTTP access to the portfolio API. Paths are absolute
/// (`/api/...`) and resolved by the implementation.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get_json(&self, path: &str) -> Result<Value, FetchError>;

    async fn post_json(&self, path: &str, body: Option<Value>) -> Result<Value, FetchError>;
}

/// Durable key-value slots holding serialized client state.
#[async_trait]
pub trait SlotStore: Send + Sync {
    async fn read(&self, slot: &str) -> Result<Option<String>, StorageError>;

    async fn write(&self, slot: &str, value: &str) -> Result<(), StorageError>;
}
