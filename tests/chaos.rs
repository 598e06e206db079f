// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Chaos Testing for the index mirror
//!
//! Failure and interleaving scenarios using:
//! 1. **ChaosIndex** - write failures and slow upserts in front of a real in-memory index
//! 2. **Concurrent writers** - many ids, many tasks, back-to-back mutations
//! 3. **Circuit breaking** - a dead index must fail fast, not pile up retries
//!
//! # Running Chaos Tests
//! ```bash
//! cargo test --test chaos -- --nocapture
//! ```

mod common;

use std::sync::Arc;
use std::time::Duration;
use futures::future::join_all;

use catalog_sync::{Record, RecordPatch, RecordStore, SyncConfig};
use common::{fast_config, harness, harness_with, ChaosIndex};

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
async fn chaos_update_delete_race_never_resurrects_documents() {
    let h = harness_with(
        fast_config(),
        ChaosIndex::new().with_upsert_delay(Duration::from_millis(5)),
    );
    let service = Arc::new(h.service);

    let mut ids = Vec::new();
    for i in 0..20 {
        ids.push(service.create(Record::new(format!("Item {i}"))).await.unwrap().id.unwrap());
    }

    let tasks = ids.iter().cloned().map(|id| {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .update(&id, Record::new("Updated").with_id(id.clone()))
                .await
                .unwrap();
            service.delete(&id).await.unwrap();
        })
    });
    for result in join_all(tasks).await {
        result.unwrap();
    }
    service.flush_index().await;

    assert!(h.index.inner().is_empty(), "no deleted record may stay indexed");
}

#[tokio::test]
async fn chaos_last_write_wins_per_id() {
    let h = harness_with(
        fast_config(),
        ChaosIndex::new().with_upsert_delay(Duration::from_millis(1)),
    );
    let id = h.service.create(Record::new("v0")).await.unwrap().id.unwrap();

    for v in 1..=25 {
        h.service
            .partial_update(&id, RecordPatch::default().with_id(id.clone()).with_name(format!("v{v}")))
            .await
            .unwrap();
    }
    h.service.flush_index().await;

    assert_eq!(h.index.inner().document(&id).unwrap().unwrap().name, "v25");
}

#[tokio::test]
async fn chaos_concurrent_ids_converge_to_store() {
    let h = harness();
    let service = Arc::new(h.service);

    let mut ids = Vec::new();
    for i in 0..30 {
        ids.push(service.create(Record::new(format!("Item {i}"))).await.unwrap().id.unwrap());
    }

    let tasks = ids.iter().cloned().enumerate().map(|(n, id)| {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            for round in 0..5 {
                let patch = RecordPatch::default()
                    .with_id(id.clone())
                    .with_content(format!("round {round} of {n}"));
                service.partial_update(&id, patch).await.unwrap();
            }
            if n % 3 == 0 {
                service.delete(&id).await.unwrap();
            }
        })
    });
    for result in join_all(tasks).await {
        result.unwrap();
    }
    service.flush_index().await;

    for id in &ids {
        let stored = h.store.get(id).await.unwrap();
        let indexed = h.index.inner().document(id).unwrap();
        assert_eq!(stored, indexed, "index diverged from store for {id}");
    }
    assert_eq!(service.pending_index_jobs(), 0);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn chaos_retry_is_bounded() {
    let h = harness();
    let id = h.service.create(Record::new("Lamp")).await.unwrap().id.unwrap();
    let before = h.index.write_calls();
    let mut failures = h.service.subscribe_sync_failures();
    h.index.fail_writes(true);

    h.service.delete(&id).await.unwrap();
    h.service.flush_index().await;

    assert_eq!(h.index.write_calls() - before, 3);
    let failure = failures.try_recv().unwrap();
    assert_eq!(failure.operation, "delete");
    assert_eq!(failure.attempts, 3);
    assert!(failures.try_recv().is_err());
}

#[tokio::test]
async fn chaos_transient_failures_are_absorbed() {
    let h = harness();
    let mut failures = h.service.subscribe_sync_failures();
    h.index.fail_next(2);

    let created = h.service.create(Record::new("Flaky")).await.unwrap();
    let id = created.id.clone().unwrap();

    assert_eq!(h.index.inner().document(&id).unwrap(), Some(created));
    assert!(failures.try_recv().is_err());
}

#[tokio::test]
async fn chaos_failed_mirror_recovers_on_next_write() {
    let h = harness();
    let id = h.service.create(Record::new("Lamp")).await.unwrap().id.unwrap();

    h.index.fail_writes(true);
    h.service
        .partial_update(&id, RecordPatch::default().with_id(id.clone()).with_name("Lost"))
        .await
        .unwrap();
    h.service.flush_index().await;
    assert_eq!(h.index.inner().document(&id).unwrap().unwrap().name, "Lamp");

    h.index.fail_writes(false);
    h.service.reindex(&id).await;
    h.service.flush_index().await;
    assert_eq!(h.index.inner().document(&id).unwrap().unwrap().name, "Lost");
}

#[tokio::test]
async fn chaos_open_circuit_fails_fast() {
    let config = SyncConfig {
        index_circuit_failure_threshold: 2,
        index_circuit_recovery_secs: 60,
        ..fast_config()
    };
    let h = harness_with(config, ChaosIndex::new());
    h.index.fail_writes(true);

    for i in 0..4 {
        h.service.create(Record::new(format!("Item {i}"))).await.unwrap();
    }

    let circuit = h.service.index_circuit();
    assert!(circuit.rejections() > 0, "open circuit should reject index writes");
    // Rejected calls never reach the index
    assert!(h.index.write_calls() < 4 * 3);
    assert_eq!(h.store.len(), 4);
}

// =============================================================================
// Backpressure and shutdown
// =============================================================================

#[tokio::test]
async fn chaos_backpressure_with_tiny_queue() {
    let config = SyncConfig {
        index_max_pending: 2,
        ..fast_config()
    };
    let h = harness_with(config, ChaosIndex::new().with_upsert_delay(Duration::from_millis(2)));
    let service = Arc::new(h.service);

    let tasks = (0..20).map(|i| {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.create(Record::new(format!("Item {i}"))).await.unwrap() })
    });
    for result in join_all(tasks).await {
        result.unwrap();
    }
    service.flush_index().await;

    assert_eq!(h.index.inner().len(), 20);
    assert_eq!(h.store.len(), 20);
}

#[tokio::test]
async fn chaos_shutdown_drains_queued_jobs() {
    let h = harness_with(fast_config(), ChaosIndex::new().with_upsert_delay(Duration::from_millis(2)));
    for i in 0..10 {
        h.store.save(&Record::new(format!("Item {i}")).with_id(format!("r-{i}"))).await.unwrap();
    }

    h.service.reindex_all().await.unwrap();
    h.service.shutdown().await;

    assert_eq!(h.service.pending_index_jobs(), 0);
    assert_eq!(h.index.inner().len(), 10);

    // Writes after shutdown still commit; their mirror jobs are dropped
    let late = h.service.create(Record::new("Late")).await.unwrap();
    assert!(h.service.find_one(late.id().unwrap()).await.unwrap().is_some());
    assert!(!h.index.inner().contains(late.id().unwrap()));
}
