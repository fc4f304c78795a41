use crate::error::SkipReason;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters shared by the producer, the join engine and the coordinator.
///
/// Observability only: nothing in the pipeline branches on these values.
#[derive(Debug, Default)]
pub struct RunMetrics {
    batches_produced: AtomicU64,
    batches_processed: AtomicU64,
    rows_read: AtomicU64,
    rows_dispatched: AtomicU64,
    rows_processed: AtomicU64,
    facts_emitted: AtomicU64,
    skipped_lookup_failures: AtomicU64,
    skipped_sink_failures: AtomicU64,
    missing_time_ids: AtomicU64,
    missing_store_ids: AtomicU64,
    source_errors: AtomicU64,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_row_read(&self) {
        self.rows_read.fetch_add(1, Ordering::Relaxed);
    }

    /// A batch of `rows` records entered the hand-off channel.
    pub fn record_batch_produced(&self, rows: usize) {
        self.batches_produced.fetch_add(1, Ordering::Relaxed);
        self.rows_dispatched.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub fn record_source_error(&self) {
        self.source_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the new processed-batch count.
    pub fn record_batch_processed(&self) -> u64 {
        self.batches_processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns the new processed-row count.
    pub fn record_row_processed(&self) -> u64 {
        self.rows_processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_fact_emitted(&self) {
        self.facts_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skip(&self, reason: SkipReason) {
        let counter = match reason {
            SkipReason::LookupFailure => &self.skipped_lookup_failures,
            SkipReason::SinkFailure => &self.skipped_sink_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_missing_time(&self) {
        self.missing_time_ids.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_missing_store(&self) {
        self.missing_store_ids.fetch_add(1, Ordering::Relaxed);
    }

    pub fn batches_processed(&self) -> u64 {
        self.batches_processed.load(Ordering::Relaxed)
    }

    pub fn rows_processed(&self) -> u64 {
        self.rows_processed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, elapsed: Duration) -> RunReport {
        let rows_read = self.rows_read.load(Ordering::Relaxed);
        let rows_dispatched = self.rows_dispatched.load(Ordering::Relaxed);
        RunReport {
            batches_produced: self.batches_produced.load(Ordering::Relaxed),
            batches_processed: self.batches_processed.load(Ordering::Relaxed),
            rows_read,
            undispatched_rows: rows_read.saturating_sub(rows_dispatched),
            rows_processed: self.rows_processed.load(Ordering::Relaxed),
            facts_emitted: self.facts_emitted.load(Ordering::Relaxed),
            skipped_lookup_failures: self.skipped_lookup_failures.load(Ordering::Relaxed),
            skipped_sink_failures: self.skipped_sink_failures.load(Ordering::Relaxed),
            missing_time_ids: self.missing_time_ids.load(Ordering::Relaxed),
            missing_store_ids: self.missing_store_ids.load(Ordering::Relaxed),
            source_errors: self.source_errors.load(Ordering::Relaxed),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Point-in-time copy of [`RunMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub batches_produced: u64,
    pub batches_processed: u64,
    pub rows_read: u64,
    /// Rows read from the source but never handed to the join engine,
    /// left behind when a shutdown stopped the producer.
    pub undispatched_rows: u64,
    pub rows_processed: u64,
    pub facts_emitted: u64,
    pub skipped_lookup_failures: u64,
    pub skipped_sink_failures: u64,
    pub missing_time_ids: u64,
    pub missing_store_ids: u64,
    pub source_errors: u64,
    pub elapsed_ms: u64,
}

impl RunReport {
    /// Records that produced no fact row.
    pub fn skipped(&self) -> u64 {
        self.skipped_lookup_failures + self.skipped_sink_failures
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} batches, {} rows processed, {} fact rows emitted in {:.2}s",
            self.batches_processed,
            self.rows_processed,
            self.facts_emitted,
            self.elapsed().as_secs_f64()
        )?;
        write!(
            f,
            "skipped {} (lookup failures: {}, sink failures: {}); missing time ids: {}, missing store ids: {}, source errors: {}",
            self.skipped(),
            self.skipped_lookup_failures,
            self.skipped_sink_failures,
            self.missing_time_ids,
            self.missing_store_ids,
            self.source_errors
        )?;
        if self.undispatched_rows > 0 {
            write!(
                f,
                "; {} rows read but not dispatched before shutdown",
                self.undispatched_rows
            )?;
        }
        Ok(())
    }
}
