use super::metrics::RunMetrics;
use super::multi_hash_table::MultiHashTable;
use super::{Batch, Dimension, DimensionId, FactRow, StreamRecord};
use crate::error::{Result, SkipReason};
use crate::storage::{DimensionLookup, FactSink};
use crate::PipelineConfig;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Per-batch counts returned by [`JoinEngine::process_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub sequence: u64,
    pub processed: usize,
    pub emitted: usize,
    pub skipped_lookup: usize,
    pub skipped_sink: usize,
}

/// Joins batches against the time and store dimensions.
///
/// Owns the multi-hash table; nothing else mutates it, so it needs no lock.
pub struct JoinEngine {
    table: MultiHashTable,
    lookup: Arc<dyn DimensionLookup>,
    sink: Arc<dyn FactSink>,
    metrics: Arc<RunMetrics>,
    max_attempts: u32,
}

struct RecordFailure {
    reason: SkipReason,
    error: crate::Error,
}

/// Run `op` up to `max_attempts` times, returning the last error.
async fn with_attempts<T, F, Fut>(max_attempts: u32, operation: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts => {
                debug!(operation, attempt, error = %e, "Retrying");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

impl JoinEngine {
    pub fn new(
        lookup: Arc<dyn DimensionLookup>,
        sink: Arc<dyn FactSink>,
        config: &PipelineConfig,
        metrics: Arc<RunMetrics>,
    ) -> Self {
        Self {
            table: MultiHashTable::new(),
            lookup,
            sink,
            metrics,
            max_attempts: config.max_attempts.max(1),
        }
    }

    pub fn hash_table(&self) -> &MultiHashTable {
        &self.table
    }

    pub fn into_hash_table(self) -> MultiHashTable {
        self.table
    }

    pub fn metrics(&self) -> &Arc<RunMetrics> {
        &self.metrics
    }

    /// Join every record of `batch`, in order.
    ///
    /// A failing lookup or sink call skips that record only. Replaying a
    /// batch inserts and emits its records again.
    pub async fn process_batch(&mut self, batch: &Batch) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            sequence: batch.sequence(),
            ..BatchOutcome::default()
        };

        for record in batch.records() {
            outcome.processed += 1;
            self.metrics.record_row_processed();

            match self.join_record(record).await {
                Ok(_) => outcome.emitted += 1,
                Err(failure) => {
                    warn!(
                        product_id = record.product_id,
                        customer_id = record.customer_id,
                        reason = ?failure.reason,
                        error = %failure.error,
                        "Skipping record"
                    );
                    self.metrics.record_skip(failure.reason);
                    match failure.reason {
                        SkipReason::LookupFailure => outcome.skipped_lookup += 1,
                        SkipReason::SinkFailure => outcome.skipped_sink += 1,
                    }
                }
            }
        }

        let batches_processed = self.metrics.record_batch_processed();
        info!(
            batches_processed,
            rows_processed = self.metrics.rows_processed(),
            batch_size = outcome.processed,
            "Batch joined"
        );
        outcome
    }

    async fn join_record(
        &mut self,
        record: &StreamRecord,
    ) -> std::result::Result<FactRow, RecordFailure> {
        self.table.insert(*record);

        let time_id = self.probe(Dimension::Time, record).await?;
        let store_id = self.probe(Dimension::Store, record).await?;
        if time_id.is_none() {
            self.metrics.record_missing_time();
        }
        if store_id.is_none() {
            self.metrics.record_missing_store();
        }

        let row = FactRow::new(record, time_id, store_id);
        let sink = Arc::clone(&self.sink);
        with_attempts(self.max_attempts, "append", || sink.append(row))
            .await
            .map_err(|error| RecordFailure {
                reason: SkipReason::SinkFailure,
                error,
            })?;
        self.metrics.record_fact_emitted();
        Ok(row)
    }

    async fn probe(
        &self,
        dimension: Dimension,
        record: &StreamRecord,
    ) -> std::result::Result<Option<DimensionId>, RecordFailure> {
        let lookup = Arc::clone(&self.lookup);
        with_attempts(self.max_attempts, "lookup", || {
            lookup.lookup(dimension, record.product_id)
        })
        .await
        .map_err(|error| RecordFailure {
            reason: SkipReason::LookupFailure,
            error,
        })
    }

    /// Drain the hand-off channel, batch by batch, until the producer closes it.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Batch>) -> Self {
        while let Some(batch) = rx.recv().await {
            self.process_batch(&batch).await;
        }
        debug!(
            keys = self.table.key_count(),
            entries = self.table.len(),
            "Join engine drained"
        );
        self
    }
}
