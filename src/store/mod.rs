//! Persistent key-value store capability
//!
//! The core defines the record schemas and treats the store as opaque string
//! storage with plain keys, hash fields, and membership sets. Anything that
//! must survive a restart or be visible to the peer router role goes through
//! this trait: confirmation records and their indexes, dual-confirmation
//! status, authority registrations, and heartbeats.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Errors surfaced by a store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store backend unavailable: {0}")]
    Unavailable(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store operation failed: {0}")]
    Operation(String),
}

/// Abstract persistent store consumed by the core
///
/// Reads return the latest persisted truth; writes are last-write-wins unless
/// the caller's own merge logic says otherwise (dual confirmation does its own
/// read-merge-write).
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;
    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError>;
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError>;
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;
}
