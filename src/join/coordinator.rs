use super::engine::JoinEngine;
use super::metrics::{RunMetrics, RunReport};
use super::multi_hash_table::MultiHashTable;
use super::producer::StreamProducer;
use crate::config_management::ConfigManager;
use crate::error::{Error, Result};
use crate::storage::{DimensionLookup, FactSink, OuterRelation, RecordStream};
use crate::PipelineConfig;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{info, warn};

/// Result of a completed fact build.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub batches_dispatched: u64,
    pub hash_table: MultiHashTable,
}

/// Stops the producer of a running pipeline.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// No batch is dispatched after this; dispatched ones are still joined.
    pub fn shutdown(&self) {
        self.signal.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.signal.borrow()
    }
}

/// Runs the producer and the join engine as two tokio tasks joined by a
/// bounded channel.
///
/// A coordinator drives exactly one run: `run` and `run_pipeline` consume it,
/// so its metrics and shutdown signal always describe that run alone. Take
/// [`Coordinator::metrics`] or [`Coordinator::shutdown_handle`] beforehand to
/// observe or stop it.
pub struct Coordinator {
    config: PipelineConfig,
    lookup: Arc<dyn DimensionLookup>,
    sink: Arc<dyn FactSink>,
    metrics: Arc<RunMetrics>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Coordinator {
    pub fn new(
        config: PipelineConfig,
        lookup: Arc<dyn DimensionLookup>,
        sink: Arc<dyn FactSink>,
    ) -> Result<Self> {
        ConfigManager::validate_pipeline(&config)?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            config,
            lookup,
            sink,
            metrics: Arc::new(RunMetrics::new()),
            shutdown: Arc::new(shutdown),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<RunMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            signal: Arc::clone(&self.shutdown),
        }
    }

    /// Producer wired to this coordinator's configuration and metrics.
    pub fn producer(&self) -> StreamProducer {
        StreamProducer::new(&self.config, Arc::clone(&self.metrics))
    }

    /// Join engine wired to this coordinator's lookup, sink and metrics.
    pub fn engine(&self) -> JoinEngine {
        JoinEngine::new(
            Arc::clone(&self.lookup),
            Arc::clone(&self.sink),
            &self.config,
            Arc::clone(&self.metrics),
        )
    }

    /// Check the collaborators, open the outer relation and run the pipeline.
    pub async fn run(self, source: &dyn OuterRelation) -> Result<RunOutcome> {
        self.lookup
            .ping()
            .await
            .map_err(|e| Error::Setup(format!("dimension lookup unreachable: {}", e)))?;
        self.sink
            .ping()
            .await
            .map_err(|e| Error::Setup(format!("fact sink unreachable: {}", e)))?;
        let records = source
            .scan()
            .await
            .map_err(|e| Error::Setup(format!("outer relation unreachable: {}", e)))?;

        let producer = self.producer();
        let engine = self.engine();
        self.run_pipeline(records, producer, engine).await
    }

    /// Spawn `producer` and `engine`, connect them and wait for both.
    ///
    /// A panic in the join engine takes precedence over the producer's
    /// closed-channel error it causes.
    pub async fn run_pipeline(
        self,
        records: RecordStream,
        producer: StreamProducer,
        engine: JoinEngine,
    ) -> Result<RunOutcome> {
        let start = Instant::now();
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);

        info!(
            batch_size = producer.batch_size(),
            pace_ms = self.config.pace.as_millis() as u64,
            channel_capacity = self.config.channel_capacity,
            "Starting fact build"
        );

        let producer_task = tokio::spawn(producer.run(records, tx, self.shutdown.subscribe()));
        let engine_task = tokio::spawn(engine.run(rx));
        let (produced, joined) = tokio::join!(producer_task, engine_task);

        let engine = joined?;
        let batches_dispatched = produced??;

        let report = self.metrics.snapshot(start.elapsed());
        if report.skipped() > 0 {
            warn!(
                skipped = report.skipped(),
                lookup_failures = report.skipped_lookup_failures,
                sink_failures = report.skipped_sink_failures,
                "Fact build skipped records"
            );
        }
        info!(
            batches_processed = report.batches_processed,
            rows_processed = report.rows_processed,
            facts_emitted = report.facts_emitted,
            elapsed_ms = report.elapsed_ms,
            "Fact build finished"
        );

        Ok(RunOutcome {
            report,
            batches_dispatched,
            hash_table: engine.into_hash_table(),
        })
    }
}
