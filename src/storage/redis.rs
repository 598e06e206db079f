// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis read cache for records.
//!
//! Each entry is the record serialized as JSON under a key built by
//! [`crate::key_prefix::cache_key`], written with `SET .. EX` so stale
//! entries expire on their own:
//!
//! ```text
//! SET 3f9c2a1:find_one:0191f7c2-... '{"id":"0191f7c2-...","name":"Lamp",...}' EX 3600
//! ```

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;

use super::traits::{RecordCache, StorageError};
use crate::record::Record;
use crate::resilience::retry::{retry, RetryConfig};

pub struct RedisRecordCache {
    connection: ConnectionManager,
}

impl RedisRecordCache {
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        let client = Client::open(connection_string)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        // Use startup config: fast-fail after ~30s, don't hang forever
        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Connection(e.to_string()))?;

        Ok(Self { connection })
    }

    /// Get a clone of the connection manager.
    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

fn encode(record: &Record) -> Result<String, StorageError> {
    serde_json::to_string(record).map_err(|e| StorageError::Invalid(e.to_string()))
}

fn decode(key: &str, raw: &str) -> Result<Record, StorageError> {
    serde_json::from_str(raw).map_err(|e| StorageError::Invalid(format!("{}: {}", key, e)))
}

/// `SET EX` rejects 0, so sub-second TTLs round up.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl RecordCache for RedisRecordCache {
    async fn get(&self, key: &str) -> Result<Option<Record>, StorageError> {
        let conn = self.connection.clone();
        let raw: Option<String> = retry("redis_get", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            async move { conn.get::<_, Option<String>>(key).await }
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))?;

        raw.map(|raw| decode(key, &raw)).transpose()
    }

    async fn put(&self, key: &str, record: &Record, ttl: Duration) -> Result<(), StorageError> {
        let payload = encode(record)?;
        let seconds = ttl_secs(ttl);
        let conn = self.connection.clone();

        retry("redis_put", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let payload = payload.clone();
            async move { conn.set_ex::<_, _, ()>(key, payload, seconds).await }
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))
    }

    async fn evict(&self, key: &str) -> Result<(), StorageError> {
        let conn = self.connection.clone();
        retry("redis_evict", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            async move { conn.del::<_, ()>(key).await }
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))
    }
}
