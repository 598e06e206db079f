// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record service coordinator.
//!
//! The [`RecordService`] ties the components together:
//! - Record store (authoritative, SQL or in-memory)
//! - Optional read cache (Redis or in-memory) for `find_one`
//! - Search index (Elasticsearch or in-memory), written only through the
//!   per-id [`IndexDispatcher`] and read through the [`QueryTranslator`]
//!
//! # Write path
//!
//! ```text
//! create ─→ validate ─→ store.save ─→ dispatch_and_wait(Upsert) ─→ Ok(record)
//! update ─→ validate ─→ store.save ─→ evict cache ─→ dispatch(Reindex) ─→ Ok(record)
//! delete ─→ store.delete ─→ evict cache ─→ dispatch(Delete) ─→ Ok(())
//! ```
//!
//! Index failures never fail a write once the store has committed. They are
//! retried with a bounded budget, then reported as [`IndexSyncFailure`].
//!
//! # Example
//!
//! ```rust,no_run
//! use catalog_sync::{Record, RecordService, SyncConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), catalog_sync::ServiceError> {
//! // No backend URLs: in-memory store and index
//! let service = RecordService::connect(SyncConfig::default()).await?;
//!
//! let created = service.create(Record::new("Desk lamp").with_content("Warm white")).await?;
//! service.flush_index().await;
//!
//! let page = service.search("lamp", Default::default()).await?;
//! assert_eq!(page.content[0].id, created.id);
//! # Ok(())
//! # }
//! ```

mod api;
mod dispatcher;
mod search_api;

pub use dispatcher::{IndexDispatcher, IndexOp, IndexSyncFailure, MirrorError};

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::error::ServiceError;
use crate::key_prefix;
use crate::metrics;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::search::{CircuitBreakingIndex, ElasticsearchIndex, MemorySearchIndex, QueryTranslator, SearchIndex};
use crate::storage::memory::InMemoryRecordStore;
use crate::storage::redis::RedisRecordCache;
use crate::storage::sql::SqlRecordStore;
use crate::storage::traits::{RecordCache, RecordStore};

/// Synchronization service and caller-facing record API.
///
/// `Send + Sync`; share it behind an `Arc`.
pub struct RecordService {
    pub(super) config: SyncConfig,

    /// Authoritative store (ground truth)
    pub(super) store: Arc<dyn RecordStore>,

    /// Read-through cache for `find_one`
    pub(super) cache: Option<Arc<dyn RecordCache>>,

    /// Bumped after every committed write, before its cache eviction.
    /// `find_one` compares it across a cache fill to catch racing writes.
    pub(super) write_epoch: AtomicU64,

    /// Index writes go through the breaker; kept for its stats
    pub(super) index: Arc<CircuitBreakingIndex>,

    pub(super) translator: QueryTranslator,

    pub(super) dispatcher: IndexDispatcher,
}

impl RecordService {
    /// Build a service over already-constructed backends.
    ///
    /// Must be called inside a Tokio runtime: index mirror workers are spawned
    /// on first dispatch.
    pub fn new(config: SyncConfig, store: Arc<dyn RecordStore>, index: Arc<dyn SearchIndex>) -> Self {
        let index = Arc::new(CircuitBreakingIndex::new(index, config.index_circuit()));
        let dispatcher = IndexDispatcher::new(
            index.clone(),
            Arc::clone(&store),
            config.index_retry(),
            config.index_max_pending,
        );

        Self {
            translator: QueryTranslator::new(index.clone()),
            config,
            store,
            cache: None,
            write_epoch: AtomicU64::new(0),
            index,
            dispatcher,
        }
    }

    /// Put a read cache in front of `find_one`.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn RecordCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Connect to the backends named in `config`.
    ///
    /// | Setting             | Present                 | Absent                |
    /// |---------------------|-------------------------|-----------------------|
    /// | `sql_url`           | [`SqlRecordStore`]      | [`InMemoryRecordStore`] |
    /// | `elasticsearch_url` | [`ElasticsearchIndex`]  | [`MemorySearchIndex`] |
    /// | `redis_url`         | [`RedisRecordCache`]    | no cache              |
    pub async fn connect(config: SyncConfig) -> Result<Self, ServiceError> {
        // Fix the cache key namespace before any key is built
        let prefix = key_prefix::prefix();

        let store: Arc<dyn RecordStore> = match config.sql_url {
            Some(ref url) => {
                info!("Connecting to SQL record store");
                Arc::new(SqlRecordStore::new(url).await?)
            }
            None => {
                warn!("No sql_url configured, records are kept in memory");
                Arc::new(InMemoryRecordStore::new())
            }
        };

        let index: Arc<dyn SearchIndex> = match config.elasticsearch_url {
            Some(ref url) => {
                info!(index = %config.index_name, "Connecting to Elasticsearch");
                let es = ElasticsearchIndex::new(url, config.index_name.clone()).map_err(ServiceError::Search)?;
                es.ensure_index().await.map_err(ServiceError::Search)?;
                Arc::new(es)
            }
            None => {
                warn!("No elasticsearch_url configured, using in-memory search index");
                Arc::new(MemorySearchIndex::new().map_err(ServiceError::Search)?)
            }
        };

        let cache = match config.redis_url {
            Some(ref url) => {
                info!(prefix = %prefix, "Connecting to Redis record cache");
                Some(Arc::new(RedisRecordCache::new(url).await?) as Arc<dyn RecordCache>)
            }
            None => None,
        };

        let mut service = Self::new(config, store, index);
        service.cache = cache;
        info!("Record service ready");
        Ok(service)
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Circuit breaker guarding index writes.
    #[must_use]
    pub fn index_circuit(&self) -> &CircuitBreaker {
        self.index.circuit()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Index mirror lifecycle
    // ═══════════════════════════════════════════════════════════════════════════

    /// Receive every [`IndexSyncFailure`] from now on.
    pub fn subscribe_sync_failures(&self) -> broadcast::Receiver<IndexSyncFailure> {
        self.dispatcher.subscribe()
    }

    /// Index mirror jobs queued or running.
    #[must_use]
    pub fn pending_index_jobs(&self) -> usize {
        self.dispatcher.pending()
    }

    /// Wait until every queued index mirror job has completed.
    pub async fn flush_index(&self) {
        self.dispatcher.flush().await;
    }

    /// Stop accepting index mirror jobs and drain the queued ones.
    ///
    /// Authoritative writes still work afterwards; their mirror jobs are
    /// dropped and counted.
    pub async fn shutdown(&self) {
        info!(pending = self.pending_index_jobs(), "Record service shutting down");
        self.dispatcher.shutdown().await;
        metrics::set_index_queue_depth(self.pending_index_jobs());
        info!("Record service stopped");
    }
}
