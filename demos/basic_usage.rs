// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic changelog-engine usage example.
//!
//! Demonstrates:
//! 1. Building a changelog over the in-memory graph store
//! 2. Ingesting the same collection run twice (second run is mostly repeats)
//! 3. Dedup stats and flush batching
//! 4. Turning the feature flag off (pass-through) and on again (fresh cache)
//! 5. Displaying metrics
//! 6. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use changelog_engine::{
    Change, Changelog, ChangelogConfig, Disposition, EdgeChange, FlushMode, GraphStore,
    InMemoryGraphStore, ManualFlag, NodeChange, Properties,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║         changelog-engine: Basic Usage Example                 ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Configuring changelog...");
    let config = ChangelogConfig {
        batch_size: 50,
        flush_interval_ms: 100,
        poll_interval_ms: 50,
        flush_mode: FlushMode::Pool { workers: 2 },
        ..Default::default()
    };
    println!("   └─ batch_size={} flush_interval={:?} poll_interval={:?} workers={}",
        config.batch_size, config.flush_interval(), config.poll_interval(), config.flush_mode.workers());

    let store = Arc::new(InMemoryGraphStore::new());
    let flag = Arc::new(ManualFlag::new(true, 1_000));
    let changelog: Changelog<Change> = Changelog::for_store(config, flag.clone(), store.clone());

    println!("\n🚀 Starting changelog...");
    changelog.start()?;
    while !changelog.is_dedup_enabled() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    println!("   ✅ Running, dedup enabled. State: {}", changelog.state());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Two collection runs over the same environment
    // ─────────────────────────────────────────────────────────────────────────
    for run in 1..=2 {
        println!("\n📝 Collection run {}...", run);
        let start = Instant::now();
        let (mut queued, mut unchanged) = (0usize, 0usize);

        for record in collect(run) {
            match changelog.record(record, WAIT).await? {
                Disposition::Queued => queued += 1,
                Disposition::Unchanged => unchanged += 1,
            }
        }

        let stats = changelog.flush_stats();
        println!("   └─ queued={} unchanged={} ({:?})", queued, unchanged, start.elapsed());
        println!("   └─ hits={} misses={} hit_rate={:.1}%",
            stats.hits, stats.misses, stats.hit_rate() * 100.0);
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("\n💾 Store after two runs:");
    println!("   └─ nodes={} edges={}", store.node_count().await?, store.edge_count().await?);
    println!("   └─ commit sizes: {:?}", store.commit_sizes());

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Flag off: everything passes through
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🚦 Disabling dedup flag...");
    flag.set_enabled(false);
    while changelog.is_dedup_enabled() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let repeat = user(0, "user-0");
    println!("   └─ resolve_change(known record) = {}", changelog.resolve_change(&repeat)?);

    println!("\n🚦 Re-enabling dedup flag (fresh cache)...");
    flag.set_enabled(true);
    while !changelog.is_dedup_enabled() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    println!("   └─ resolve_change(known record) = {}", changelog.resolve_change(&repeat)?);
    println!("   └─ resolve_change(same again)   = {}", changelog.resolve_change(&repeat)?);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Clean shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    changelog.stop(Duration::from_secs(5)).await?;
    println!("   ✅ Shutdown complete! State: {}", changelog.state());

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

fn user(i: usize, name: &str) -> Change {
    NodeChange::new(
        format!("S-1-5-21-{}", 1000 + i),
        ["User", "Base"],
        Properties::new()
            .with("name", name)
            .with("enabled", true)
            .with("lastseen", format!("{:?}", std::time::SystemTime::now())),
    )
    .into()
}

/// 100 users in 5 groups. The second run renames a few users.
fn collect(run: usize) -> Vec<Change> {
    let mut records = Vec::new();
    for i in 0..100 {
        let name = if run > 1 && i % 20 == 0 {
            format!("user-{}-renamed", i)
        } else {
            format!("user-{}", i)
        };
        records.push(user(i, &name));
        records.push(
            EdgeChange::new(
                format!("S-1-5-21-{}", 1000 + i),
                format!("GROUP-{}", i % 5),
                "MemberOf",
                Properties::new().with("isacl", false),
            )
            .into(),
        );
    }
    records
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines = Vec::new();

    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        let rendered = match value {
            DebugValue::Counter(v) => format!("{}", v),
            DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                format!("count={} sum={:.4}", count, sum)
            }
        };
        lines.push(format!("{}{} = {}", key.name(), label_str, rendered));
    }

    lines.sort();
    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {}", line);
    }
}
