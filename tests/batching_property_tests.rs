mod common;

use common::*;
use futures::StreamExt;
use hybridjoin_dw::join::RunMetrics;
use hybridjoin_dw::{Batch, FactSink, JoinEngine, StreamProducer, StreamRecord};
use proptest::collection::vec as prop_vec;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn record_strategy() -> impl Strategy<Value = StreamRecord> {
    (0i64..20, 0i64..1000).prop_map(|(product_id, customer_id)| {
        StreamRecord::new(product_id, customer_id)
    })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn produce_all(input: Vec<StreamRecord>, batch_size: usize) -> Vec<Batch> {
    let producer = StreamProducer::new(
        &pipeline_config(batch_size, Duration::ZERO),
        Arc::new(RunMetrics::new()),
    );
    runtime().block_on(producer.produce(record_stream(input)).collect())
}

// Property: batches are consecutive chunks of the input, each stably sorted
proptest! {
    #[test]
    fn prop_batches_are_sorted_chunks(
        input in prop_vec(record_strategy(), 0..80),
        batch_size in 1usize..12,
    ) {
        let batches = produce_all(input.clone(), batch_size);

        prop_assert_eq!(batches.len(), input.len().div_ceil(batch_size));
        for (i, (batch, chunk)) in batches.iter().zip(input.chunks(batch_size)).enumerate() {
            prop_assert_eq!(batch.sequence(), i as u64);
            let mut expected = chunk.to_vec();
            expected.sort_by_key(|r| r.product_id);
            prop_assert_eq!(batch.records(), &expected[..]);
        }
        if let Some((_, full)) = batches.split_last() {
            prop_assert!(full.iter().all(|b| b.len() == batch_size));
        }
    }
}

// Property: every record lands in its key's bucket and is emitted once
proptest! {
    #[test]
    fn prop_buckets_hold_every_record_in_arrival_order(
        input in prop_vec(record_strategy(), 0..80),
        batch_size in 1usize..12,
    ) {
        let batches = produce_all(input.clone(), batch_size);
        let sink = Arc::new(RecordingSink::new());
        let config = pipeline_config(batch_size, Duration::ZERO);
        let mut engine = JoinEngine::new(
            Arc::new(StubLookup::mirroring()),
            Arc::clone(&sink) as Arc<dyn FactSink>,
            &config,
            Arc::new(RunMetrics::new()),
        );

        let rt = runtime();
        for batch in &batches {
            rt.block_on(engine.process_batch(batch));
        }

        let mut expected: BTreeMap<i64, Vec<StreamRecord>> = BTreeMap::new();
        for batch in &batches {
            for record in batch.records() {
                expected.entry(record.product_id).or_default().push(*record);
            }
        }

        let table = engine.hash_table();
        prop_assert_eq!(table.len(), input.len());
        prop_assert_eq!(table.keys(), expected.keys().copied().collect::<Vec<_>>());
        for (key, records) in &expected {
            prop_assert_eq!(table.bucket(*key), Some(&records[..]));
        }
        prop_assert_eq!(sink.rows().len(), input.len());
    }
}
