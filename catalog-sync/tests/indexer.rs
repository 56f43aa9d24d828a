//! Incremental indexer properties.

mod common;

use catalog_core::{Clock, CoherenceConfig, EntityId};
use catalog_sync::{IncrementalIndexer, RunTrigger};
use catalog_test_utils::generators::{arb_changed_row, arb_changed_rows};
use catalog_test_utils::{changed_row, MemoryStores};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime should build")
}

fn indexer(stores: &MemoryStores, config: &CoherenceConfig) -> IncrementalIndexer {
    IncrementalIndexer::new(
        stores.primary.clone(),
        stores.search.clone(),
        stores.clock.clone(),
        config,
    )
}

fn snapshot_json(stores: &MemoryStores) -> String {
    serde_json::to_string(&stores.search.snapshot()).expect("documents should serialize")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_rerun_produces_identical_documents(rows in arb_changed_rows(40), chunk in 1usize..16) {
        let stores = MemoryStores::new();
        for row in rows {
            stores.primary.upsert_row(row);
        }
        let config = CoherenceConfig { chunk_size: chunk, ..CoherenceConfig::default() };
        let indexer = indexer(&stores, &config);

        let rt = runtime();
        let first = rt.block_on(indexer.run(RunTrigger::FullResync));
        let before = snapshot_json(&stores);
        let second = rt.block_on(indexer.run(RunTrigger::FullResync));
        let after = snapshot_json(&stores);

        prop_assert_eq!(before, after);
        prop_assert_eq!(first.documents_written, second.documents_written);
        prop_assert_eq!(first.rows_dropped, 0);
    }

    #[test]
    fn prop_row_inside_overlap_window_is_never_missed(
        row in arb_changed_row(EntityId::new(11)),
        epsilon_secs in 0u64..=300,
    ) {
        let config = CoherenceConfig::default();
        let stores = MemoryStores::starting_at(row.last_modified);
        // The run starts anywhere in `[t, t + overlap]`, so its lower
        // bound never passes the row.
        let skew = config.overlap_window - Duration::from_secs(epsilon_secs);
        stores.clock.advance(skew);
        stores.primary.upsert_row(row.clone());

        let indexer = indexer(&stores, &config);
        let report = runtime().block_on(indexer.run(RunTrigger::Scheduled));

        prop_assert!(report.lower_bound <= row.last_modified);
        prop_assert_eq!(report.documents_written, 1);
        prop_assert_eq!(stores.search.snapshot()[0].entity_id, row.entity_id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reader_and_writer_concurrency_is_bounded() {
    let stores = MemoryStores::new();
    let now = stores.clock.now();
    for id in 1..=200 {
        stores
            .primary
            .upsert_row(changed_row(id, now - chrono::Duration::seconds(id)));
    }
    stores.primary.faults().set_latency(Duration::from_millis(20));
    stores.search.faults().set_latency(Duration::from_millis(20));

    let config = CoherenceConfig {
        chunk_size: 5,
        reader_concurrency: 4,
        ..CoherenceConfig::default()
    };
    let indexer = Arc::new(indexer(&stores, &config));

    let runs: Vec<_> = (0..4)
        .map(|_| {
            let indexer = indexer.clone();
            tokio::spawn(async move { indexer.run(RunTrigger::OnDemand).await })
        })
        .collect();
    for run in runs {
        let report = run.await.expect("run should not panic");
        assert_eq!(report.pages_read, 40);
        assert_eq!(report.documents_written, 200);
        assert!(!report.read_aborted);
    }

    let reader_peak = stores.primary.fetch_concurrency().peak();
    assert!(reader_peak > 1, "reader peak was {}", reader_peak);
    assert!(reader_peak <= config.reader_concurrency);
    assert!(stores.search.upsert_concurrency().peak() <= config.throttle_limit);
    assert!(stores.search.upsert_concurrency().peak() > 1);
    assert_eq!(stores.search.document_count(), 200);
}

#[tokio::test]
async fn test_dropped_row_is_retried_by_next_overlapping_run() {
    let stores = MemoryStores::new();
    let config = CoherenceConfig::default();
    let indexer = indexer(&stores, &config);
    let now = stores.clock.now();
    stores.primary.upsert_row(changed_row(1, now));
    stores.search.faults().fail("bulk_upsert");

    let failed = indexer.run(RunTrigger::Scheduled).await;
    assert_eq!(failed.chunks_failed, 1);
    assert_eq!(stores.search.document_count(), 0);

    stores.search.faults().heal_all();
    stores.clock.advance(config.indexer_interval);
    let retried = indexer.run(RunTrigger::Scheduled).await;
    assert_eq!(retried.documents_written, 1);
}
