// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic catalog-sync usage example.
//!
//! Demonstrates:
//! 1. Connecting to whatever backends the environment names (in-memory otherwise)
//! 2. Creating, patching and deleting records
//! 3. Searching the mirrored index, including a malformed query
//! 4. Watching index sync failures
//! 5. Displaying metrics
//! 6. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! # Everything in memory
//! cargo run --example basic_usage
//!
//! # Real backends
//! CATALOG_SQL_URL="sqlite://catalog.db?mode=rwc" \
//! CATALOG_ELASTICSEARCH_URL="http://localhost:9200" \
//! cargo run --example basic_usage
//! ```

use catalog_sync::{PageRequest, Record, RecordPatch, RecordService, ServiceError, SyncConfig};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures all metrics for inspection)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().map_err(|_| "failed to install metrics recorder")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           catalog-sync: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and connect
    // ─────────────────────────────────────────────────────────────────────────
    let config = SyncConfig {
        sql_url: std::env::var("CATALOG_SQL_URL").ok(),
        elasticsearch_url: std::env::var("CATALOG_ELASTICSEARCH_URL").ok(),
        redis_url: std::env::var("CATALOG_REDIS_URL").ok(),
        ..Default::default()
    };
    println!("🔌 Connecting (sql={:?}, es={:?}, redis={:?})...",
        config.sql_url, config.elasticsearch_url, config.redis_url);
    let service = RecordService::connect(config).await?;

    let mut failures = service.subscribe_sync_failures();
    tokio::spawn(async move {
        while let Ok(failure) = failures.recv().await {
            println!("   ⚠️  index sync failure: {}", failure);
        }
    });

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Create records
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Creating records...");
    let mut ids = Vec::new();
    for (name, content) in [
        ("Desk lamp", "warm white, brass finish"),
        ("Floor lamp", "cool white, steel"),
        ("Office chair", "mesh back, adjustable"),
        ("Standing desk", "oak top, electric"),
        ("Bookshelf", "oak, five shelves"),
    ] {
        let record = service.create(Record::new(name).with_content(content)).await?;
        println!("   ✅ {} → {}", name, record.id.as_deref().unwrap_or("?"));
        ids.extend(record.id);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Patch and delete
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🩹 Patching and deleting...");
    if let Some(id) = ids.first() {
        let patch = RecordPatch::default().with_id(id.clone()).with_content("warm white, copper finish");
        if let Some(record) = service.partial_update(id, patch).await? {
            println!("   ✅ patched {} → {:?}", id, record.content);
        }
    }
    if let Some(id) = ids.last() {
        service.delete(id).await?;
        println!("   ✅ deleted {}", id);
    }
    service.flush_index().await;

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Search
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔍 Searching...");
    for query in ["lamp", "content:oak", "copper OR steel", "name:"] {
        match service.search(query, PageRequest::new(0, 10)).await {
            Ok(page) => {
                let names: Vec<_> = page.content.iter().map(|r| r.name.as_str()).collect();
                println!("   {:<18} → {} hit(s) {:?}", query, page.total, names);
            }
            Err(ServiceError::QuerySyntax(e)) => {
                println!("   {:<18} → {} ({} / {})", query, e.message, e.code, e.entity);
            }
            Err(e) => return Err(e.into()),
        }
    }

    let all = service.find_all(service.default_page()).await?;
    println!("\n📚 {} record(s) in the store", all.total);

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Clean shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    service.shutdown().await;
    println!("   ✅ Shutdown complete!");

    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut gauges: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_, key) = composite_key.into_parts();
        let name = key.name().to_string();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        match value {
            DebugValue::Counter(v) => counters.push((name, label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name, label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name, label_str, count, sum));
            }
        }
    }

    counters.sort();
    gauges.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    histograms.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    if !counters.is_empty() {
        println!("   ┌─ Counters (cumulative)");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }

    if !gauges.is_empty() {
        println!("   ├─ Gauges (current value)");
        for (name, labels, value) in &gauges {
            println!("   │  └─ {}{} = {:.2}", name, labels, value);
        }
    }

    if !histograms.is_empty() {
        println!("   └─ Histograms (distributions)");
        for (name, labels, count, sum) in &histograms {
            let avg = if *count > 0 { sum / *count as f64 } else { 0.0 };
            println!("   │  └─ {}{} count={} avg={:.4}s", name, labels, count, avg);
        }
    }

    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
