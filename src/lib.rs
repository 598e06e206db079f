// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Catalog Sync
//!
//! An authoritative record store with an eventually-consistent full-text
//! search mirror.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       RecordService                         │
//! │  • create / update / partial_update / delete                │
//! │  • find_one / find_all (store) · search (index)             │
//! └─────────────────────────────────────────────────────────────┘
//!            │ commit first                    │ then mirror
//!            ▼                                 ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │  Record Store (truth)    │   │  IndexDispatcher             │
//! │  • SQLite / MySQL        │   │  • one FIFO worker per id    │
//! │  • in-memory             │   │  • bounded retry, breaker    │
//! │  + optional Redis cache  │   │  • IndexSyncFailure events   │
//! └──────────────────────────┘   └──────────────────────────────┘
//!                                              │
//!                                              ▼
//!                                ┌──────────────────────────────┐
//!                                │  Search Index (derived)      │
//!                                │  • Elasticsearch REST        │
//!                                │  • in-memory                 │
//!                                └──────────────────────────────┘
//! ```
//!
//! The store always wins. Index writes that fail are retried a bounded
//! number of times and then reported, never returned as errors from the
//! write that caused them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use catalog_sync::{PageRequest, Record, RecordPatch, RecordService, SyncConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), catalog_sync::ServiceError> {
//!     let config = SyncConfig {
//!         sql_url: Some("sqlite://catalog.db?mode=rwc".into()),
//!         elasticsearch_url: Some("http://localhost:9200".into()),
//!         ..Default::default()
//!     };
//!     let service = RecordService::connect(config).await?;
//!
//!     let lamp = service.create(Record::new("Desk lamp").with_content("Warm white")).await?;
//!     let id = lamp.id.clone().unwrap_or_default();
//!
//!     service
//!         .partial_update(&id, RecordPatch::default().with_id(id.clone()).with_content("Cool white"))
//!         .await?;
//!
//!     let hits = service.search("content:cool", PageRequest::new(0, 10)).await?;
//!     println!("{} hit(s)", hits.total);
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: [`RecordService`] and the per-id [`IndexDispatcher`]
//! - [`storage`]: record store and cache backends (SQL, Redis, memory)
//! - [`search`]: index adapters, query parsing, error mapping
//! - [`resilience`]: retry and circuit breaker
//! - [`key_prefix`]: process-wide cache key namespace

pub mod config;
pub mod coordinator;
pub mod error;
pub mod key_prefix;
pub mod metrics;
pub mod record;
pub mod resilience;
pub mod search;
pub mod storage;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use config::SyncConfig;
pub use coordinator::{IndexDispatcher, IndexOp, IndexSyncFailure, RecordService};
pub use error::{ServiceError, ValidationError};
pub use record::{Page, PageRequest, Record, RecordPatch};
pub use search::{
    ElasticsearchIndex, EngineError, IndexError, MemorySearchIndex, QuerySyntaxError, QueryTranslator,
    SearchError, SearchIndex, SearchQuery,
};
pub use storage::memory::{InMemoryRecordCache, InMemoryRecordStore};
pub use storage::redis::RedisRecordCache;
pub use storage::sql::SqlRecordStore;
pub use storage::traits::{RecordCache, RecordStore, StorageError};
pub use resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
pub use resilience::retry::RetryConfig;
pub use metrics::LatencyTimer;
