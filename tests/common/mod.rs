// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Shared test doubles and fixtures.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;

use catalog_sync::search::{SearchHits, SearchIndex};
use catalog_sync::{IndexError, MemorySearchIndex, PageRequest, Record, RecordService, SearchQuery, SyncConfig};
use catalog_sync::InMemoryRecordStore;

// =============================================================================
// Chaos Index - failure and latency injection in front of a real index
// =============================================================================

/// Wraps a [`MemorySearchIndex`] and can fail or slow down writes.
pub struct ChaosIndex {
    inner: MemorySearchIndex,
    write_calls: AtomicU64,
    /// Fail every write while set
    fail_writes: AtomicBool,
    /// Fail this many writes, then recover
    fail_next: AtomicU64,
    /// Added to every upsert, so a later delete would overtake it if
    /// jobs were not ordered per id
    upsert_delay: Duration,
}

impl ChaosIndex {
    pub fn new() -> Self {
        Self {
            inner: MemorySearchIndex::new().unwrap(),
            write_calls: AtomicU64::new(0),
            fail_writes: AtomicBool::new(false),
            fail_next: AtomicU64::new(0),
            upsert_delay: Duration::ZERO,
        }
    }

    pub fn with_upsert_delay(mut self, delay: Duration) -> Self {
        self.upsert_delay = delay;
        self
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_next(&self, n: u64) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemorySearchIndex {
        &self.inner
    }

    fn maybe_fail(&self) -> Result<(), IndexError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IndexError::Response("503 Service Unavailable: chaos".into()));
        }
        let took_failure = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took_failure {
            return Err(IndexError::Response("502 Bad Gateway: chaos".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SearchIndex for ChaosIndex {
    async fn index_document(&self, record: &Record) -> Result<(), IndexError> {
        if !self.upsert_delay.is_zero() {
            tokio::time::sleep(self.upsert_delay).await;
        }
        self.maybe_fail()?;
        self.inner.index_document(record).await
    }

    async fn delete_document(&self, id: &str) -> Result<(), IndexError> {
        self.maybe_fail()?;
        self.inner.delete_document(id).await
    }

    async fn execute_query(&self, query: &SearchQuery, page: PageRequest) -> Result<SearchHits, IndexError> {
        self.inner.execute_query(query, page).await
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Fast retries and a breaker that never trips.
pub fn fast_config() -> SyncConfig {
    SyncConfig {
        index_retry_attempts: 3,
        index_retry_initial_ms: 1,
        index_retry_max_ms: 5,
        index_circuit_failure_threshold: 10_000,
        ..Default::default()
    }
}

pub struct Harness {
    pub service: RecordService,
    pub store: Arc<InMemoryRecordStore>,
    pub index: Arc<ChaosIndex>,
}

pub fn harness_with(config: SyncConfig, index: ChaosIndex) -> Harness {
    let store = Arc::new(InMemoryRecordStore::new());
    let index = Arc::new(index);
    let service = RecordService::new(config, store.clone(), index.clone());
    Harness { service, store, index }
}

pub fn harness() -> Harness {
    harness_with(fast_config(), ChaosIndex::new())
}

/// A fresh SQLite URL under the OS temp dir.
pub fn temp_sqlite_url(name: &str) -> (String, PathBuf) {
    let path = std::env::temp_dir().join(format!("catalog_{}_{}.db", name, uuid::Uuid::new_v4()));
    (format!("sqlite://{}?mode=rwc", path.display()), path)
}

/// Clean up SQLite database and its WAL files
pub fn cleanup_db(path: &PathBuf) {
    let _ = std::fs::remove_file(path);
    let _ = std::fs::remove_file(format!("{}-wal", path.display()));
    let _ = std::fs::remove_file(format!("{}-shm", path.display()));
}
