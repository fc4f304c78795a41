use super::metrics::RunMetrics;
use super::pacing::{BatchTiming, FixedPacing, PacingPolicy};
use super::{Batch, StreamRecord};
use crate::error::{Error, Result};
use crate::storage::RecordStream;
use crate::PipelineConfig;
use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Reads the outer relation and cuts it into sorted, paced batches.
pub struct StreamProducer {
    batch_size: usize,
    pacing: Arc<dyn PacingPolicy>,
    metrics: Arc<RunMetrics>,
}

struct ProduceState {
    source: RecordStream,
    batch_size: usize,
    pacing: Arc<dyn PacingPolicy>,
    metrics: Arc<RunMetrics>,
    next_sequence: u64,
    next_dispatch_at: Option<Instant>,
    exhausted: bool,
}

impl ProduceState {
    /// Pull up to `batch_size` records. Ends the source on the first error.
    async fn fill(&mut self) -> Vec<StreamRecord> {
        let mut records = Vec::with_capacity(self.batch_size);
        while records.len() < self.batch_size {
            match self.source.next().await {
                Some(Ok(record)) => {
                    self.metrics.record_row_read();
                    records.push(record);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Outer relation became unreadable, ending stream early");
                    self.metrics.record_source_error();
                    self.exhausted = true;
                    break;
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        records
    }
}

impl StreamProducer {
    pub fn new(config: &PipelineConfig, metrics: Arc<RunMetrics>) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            pacing: Arc::new(FixedPacing::new(config.pace)),
            metrics,
        }
    }

    pub fn with_pacing(mut self, pacing: Arc<dyn PacingPolicy>) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Lazy sequence of batches over `source`.
    ///
    /// Every batch but the last holds exactly `batch_size` records. Each
    /// dispatch after the first waits until the pacing delay has elapsed
    /// since the previous one; nothing waits after the final batch.
    pub fn produce(&self, source: RecordStream) -> impl Stream<Item = Batch> + Send + 'static {
        let state = ProduceState {
            source,
            batch_size: self.batch_size,
            pacing: Arc::clone(&self.pacing),
            metrics: Arc::clone(&self.metrics),
            next_sequence: 0,
            next_dispatch_at: None,
            exhausted: false,
        };

        stream::unfold(state, |mut state| async move {
            if state.exhausted {
                return None;
            }

            let records = state.fill().await;
            if records.is_empty() {
                return None;
            }

            if let Some(deadline) = state.next_dispatch_at {
                sleep_until(deadline).await;
            }

            let batch = Batch::sorted(state.next_sequence, records);
            let timing = BatchTiming {
                sequence: batch.sequence(),
                batch_len: batch.len(),
            };
            state.next_sequence += 1;
            state.next_dispatch_at = Some(Instant::now() + state.pacing.delay_before_next(&timing));

            debug!(
                sequence = timing.sequence,
                batch_size = timing.batch_len,
                "Dispatching batch"
            );
            Some((batch, state))
        })
    }

    /// Forward the produced batches into the hand-off channel.
    ///
    /// Returns the number of batches dispatched. A shutdown signal stops
    /// further dispatches; batches already in the channel are left for the
    /// join engine to drain. Rows read into a batch that was never sent are
    /// reported as `undispatched_rows`.
    pub async fn run(
        self,
        source: RecordStream,
        tx: mpsc::Sender<Batch>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<u64> {
        let metrics = Arc::clone(&self.metrics);
        let batches = self.produce(source);
        tokio::pin!(batches);

        let mut dispatched = 0u64;
        loop {
            let batch = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!(dispatched, "Shutdown requested, producer stops dispatching");
                    break;
                }
                next = batches.next() => match next {
                    Some(batch) => batch,
                    None => break,
                },
            };

            let rows = batch.len();
            tx.send(batch).await.map_err(|_| Error::ChannelClosed)?;
            metrics.record_batch_produced(rows);
            dispatched += 1;
        }

        debug!(dispatched, "Producer finished");
        Ok(dispatched)
    }
}

/// Resolves once shutdown is requested; never if the signal is dropped.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let requested = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn records(pairs: &[(i64, i64)]) -> RecordStream {
        let items: Vec<Result<StreamRecord>> = pairs
            .iter()
            .map(|&(product_id, customer_id)| Ok(StreamRecord::new(product_id, customer_id)))
            .collect();
        stream::iter(items).boxed()
    }

    fn producer(batch_size: usize, pace: Duration) -> StreamProducer {
        let config = PipelineConfig {
            batch_size,
            pace,
            ..PipelineConfig::default()
        };
        StreamProducer::new(&config, Arc::new(RunMetrics::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_sorted_batch() {
        let producer = producer(3, Duration::from_secs(1));
        let batches: Vec<Batch> = producer
            .produce(records(&[(5, 1), (3, 2), (5, 3)]))
            .collect()
            .await;

        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0].records(),
            &[
                StreamRecord::new(3, 2),
                StreamRecord::new(5, 1),
                StreamRecord::new(5, 3)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exact_multiple_has_no_trailing_wait() {
        let producer = producer(2, Duration::from_secs(1));
        let start = Instant::now();
        let batches: Vec<Batch> = producer
            .produce(records(&[(1, 1), (2, 2), (3, 3), (4, 4)]))
            .collect()
            .await;

        assert_eq!(batches.len(), 2);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_source_yields_nothing() {
        let producer = producer(10, Duration::from_secs(1));
        let batches: Vec<Batch> = producer.produce(records(&[])).collect().await;
        assert!(batches.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_error_flushes_partial_batch_and_stops() {
        let metrics = Arc::new(RunMetrics::new());
        let config = PipelineConfig {
            batch_size: 10,
            ..PipelineConfig::default()
        };
        let producer = StreamProducer::new(&config, Arc::clone(&metrics));
        let items: Vec<Result<StreamRecord>> = vec![
            Ok(StreamRecord::new(2, 1)),
            Ok(StreamRecord::new(1, 2)),
            Err(Error::Generic("connection reset".into())),
            Ok(StreamRecord::new(9, 9)),
        ];

        let batches: Vec<Batch> = producer.produce(stream::iter(items).boxed()).collect().await;

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        let report = metrics.snapshot(Duration::ZERO);
        assert_eq!(report.source_errors, 1);
        assert_eq!(report.rows_read, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_dispatching() {
        let producer = producer(1, Duration::from_secs(10));
        let (tx, mut rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(producer.run(records(&[(1, 1), (2, 2), (3, 3)]), tx, stop_rx));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.sequence(), 0);
        stop_tx.send(true).unwrap();

        let dispatched = handle.await.unwrap().unwrap();
        assert_eq!(dispatched, 1);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_channel_is_fatal() {
        let producer = producer(1, Duration::ZERO);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let result = producer.run(records(&[(1, 1)]), tx, stop_rx).await;
        assert!(matches!(result, Err(Error::ChannelClosed)));
    }
}
