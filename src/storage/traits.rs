// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use std::time::Duration;
use crate::record::{Page, PageRequest, Record};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Item not found")]
    NotFound,
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Storage connection error: {0}")]
    Connection(String),
    #[error("Invalid record: {0}")]
    Invalid(String),
}

/// The authoritative record store.
///
/// `save` is insert-or-replace: a record without an id is inserted under a
/// freshly generated id, a record with an id replaces the stored row. The
/// store owns identity and audit timestamps.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Record>, StorageError>;
    async fn save(&self, record: &Record) -> Result<Record, StorageError>;
    async fn exists(&self, id: &str) -> Result<bool, StorageError>;

    /// Deleting an absent id is not an error.
    async fn delete(&self, id: &str) -> Result<(), StorageError>;

    /// Page through all records ordered by id.
    async fn list_all(&self, page: PageRequest) -> Result<Page<Record>, StorageError>;
}

/// Read cache in front of the record store.
///
/// Keys are already namespaced by the caller (see [`crate::key_prefix`]).
#[async_trait]
pub trait RecordCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Record>, StorageError>;
    async fn put(&self, key: &str, record: &Record, ttl: Duration) -> Result<(), StorageError>;
    async fn evict(&self, key: &str) -> Result<(), StorageError>;
}
