// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for catalog-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `catalog_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: create, update, partial_update, delete, find_one, find_all, search, reindex_all (record ops); upsert, reindex, delete (mirror jobs)
//! - `status`: success, error, not_found, invalid, query_syntax, failure, dropped

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record an authoritative (record store) operation outcome
pub fn record_operation(operation: &str, status: &str) {
    counter!(
        "catalog_sync_record_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record authoritative operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "catalog_sync_record_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

// ═══════════════════════════════════════════════════════════════════════════
// INDEX MIRROR - Derived index writes
// ═══════════════════════════════════════════════════════════════════════════

/// Record the final outcome of one index mirror job
pub fn record_index_mirror(operation: &str, status: &str) {
    counter!(
        "catalog_sync_index_mirror_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record an index sync failure (mirror gave up after its retry budget)
pub fn record_index_sync_failure(operation: &str) {
    counter!(
        "catalog_sync_index_sync_failures_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Set number of index mirror jobs queued or running
pub fn set_index_queue_depth(count: usize) {
    gauge!("catalog_sync_index_queue_depth").set(count as f64);
}

/// Set number of ids with an active mirror worker
pub fn set_index_active_keys(count: usize) {
    gauge!("catalog_sync_index_active_keys").set(count as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// SEARCH - Read path
// ═══════════════════════════════════════════════════════════════════════════

/// Record a search query outcome (success, query_syntax, error)
pub fn record_search_query(status: &str) {
    counter!(
        "catalog_sync_search_queries_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record search latency
pub fn record_search_latency(duration: Duration) {
    histogram!("catalog_sync_search_seconds").record(duration.as_secs_f64());
}

/// Record number of hits on the returned page
pub fn record_search_results(count: usize) {
    histogram!("catalog_sync_search_results").record(count as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// CACHE - Read-through record cache
// ═══════════════════════════════════════════════════════════════════════════

/// Record cache lookup (hit / miss / error)
pub fn record_cache_lookup(result: &str) {
    counter!(
        "catalog_sync_cache_lookups_total",
        "result" => result.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// CIRCUIT BREAKER - Resilience metrics
// ═══════════════════════════════════════════════════════════════════════════

/// Record circuit breaker call outcome
pub fn record_circuit_call(circuit: &str, outcome: &str) {
    counter!(
        "catalog_sync_circuit_breaker_calls_total",
        "circuit" => circuit.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Times an authoritative operation and records on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}
