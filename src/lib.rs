pub mod config_management;
pub mod data_import_export;
pub mod error;
pub mod etl;
pub mod join;
pub mod loader;
pub mod logging;
pub mod storage;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use config_management::{ConfigBuilder, ConfigManager, ConfigSource};
pub use error::{Error, Result, SkipReason};
pub use etl::{load_dimensions, run_etl, EtlReport};
pub use join::{
    Batch, Coordinator, Dimension, DimensionId, FactRow, JoinEngine, JoinKey, MultiHashTable,
    RunOutcome, RunReport, StreamProducer, StreamRecord, MISSING_DIMENSION_ID,
};
pub use loader::{DimensionLoader, LoadReport, TableLoadStats};
pub use storage::{DimensionLookup, FactSink, OuterRelation, Warehouse};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_PACE: Duration = Duration::from_millis(1000);
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4;

/// Settings of one fact-build run. Fixed once the run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Records per batch; the final batch may be shorter.
    pub batch_size: usize,
    /// Minimum time between two batch dispatches.
    #[serde(rename = "pace_ms", with = "config_management::duration_ms")]
    pub pace: Duration,
    /// Batches that may wait in the hand-off channel before the producer blocks.
    pub channel_capacity: usize,
    /// Attempts per lookup or sink call; 1 disables retries.
    pub max_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            pace: DEFAULT_PACE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_attempts: 1,
        }
    }
}

/// Source files plus pipeline settings for a full warehouse build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub transactions_path: PathBuf,
    pub master_data_path: PathBuf,
    pub pipeline: PipelineConfig,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            transactions_path: PathBuf::from("data/transactions.csv"),
            master_data_path: PathBuf::from("data/master_data.csv"),
            pipeline: PipelineConfig::default(),
        }
    }
}
