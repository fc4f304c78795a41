//! Streaming HYBRIDJOIN pipeline
//!
//! The outer relation (customer/product pairs) is read sequentially, grouped
//! into fixed-size batches sorted by join key, and handed to a join engine
//! that probes the time and store dimensions for every record and appends
//! the resulting fact rows to the sink.
//!
//! ```text
//! OuterRelation ──▶ StreamProducer ──[bounded mpsc<Batch>]──▶ JoinEngine ──▶ FactSink
//!                   (batch, sort, pace)                        │   ▲
//!                                                              ▼   │
//!                                                     MultiHashTable  DimensionLookup
//! ```
//!
//! Batch order is preserved end to end, and records inside a batch reach the
//! engine in ascending join key order so that a clustered product index on
//! the inner side is probed sequentially.

pub mod coordinator;
pub mod engine;
pub mod metrics;
pub mod multi_hash_table;
pub mod pacing;
pub mod producer;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use coordinator::{Coordinator, RunOutcome, ShutdownHandle};
pub use engine::{BatchOutcome, JoinEngine};
pub use metrics::{RunMetrics, RunReport};
pub use multi_hash_table::MultiHashTable;
pub use pacing::{BatchTiming, FixedPacing, PacingPolicy};
pub use producer::StreamProducer;

/// Product identifier the outer relation is joined on.
pub type JoinKey = i64;
pub type CustomerId = i64;
pub type DimensionId = i64;

/// Foreign key stored for a dimension row that does not exist.
pub const MISSING_DIMENSION_ID: DimensionId = 0;

/// Inner relations probed per outer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Time,
    Store,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Time => write!(f, "time"),
            Dimension::Store => write!(f, "store"),
        }
    }
}

/// One row of the outer relation: a customer having purchased a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamRecord {
    pub product_id: JoinKey,
    pub customer_id: CustomerId,
}

impl StreamRecord {
    pub fn new(product_id: JoinKey, customer_id: CustomerId) -> Self {
        Self {
            product_id,
            customer_id,
        }
    }

    pub fn join_key(&self) -> JoinKey {
        self.product_id
    }
}

/// Records dispatched together to the join engine.
///
/// Only the producer builds batches; a dispatched batch is always sorted and
/// never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    sequence: u64,
    records: Vec<StreamRecord>,
}

impl Batch {
    /// Sorts `records` by join key (stable) and wraps them.
    pub fn sorted(sequence: u64, mut records: Vec<StreamRecord>) -> Self {
        records.sort_by_key(StreamRecord::join_key);
        Self { sequence, records }
    }

    /// Zero-based dispatch position within the run.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn records(&self) -> &[StreamRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<StreamRecord> {
        self.records
    }
}

/// Joined output row. The total sale is derived by storage after insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactRow {
    pub product_id: JoinKey,
    pub customer_id: CustomerId,
    pub time_id: Option<DimensionId>,
    pub store_id: Option<DimensionId>,
}

impl FactRow {
    pub fn new(
        record: &StreamRecord,
        time_id: Option<DimensionId>,
        store_id: Option<DimensionId>,
    ) -> Self {
        Self {
            product_id: record.product_id,
            customer_id: record.customer_id,
            time_id,
            store_id,
        }
    }

    /// Time foreign key as stored, `MISSING_DIMENSION_ID` when absent.
    pub fn time_key(&self) -> DimensionId {
        self.time_id.unwrap_or(MISSING_DIMENSION_ID)
    }

    /// Store foreign key as stored, `MISSING_DIMENSION_ID` when absent.
    pub fn store_key(&self) -> DimensionId {
        self.store_id.unwrap_or(MISSING_DIMENSION_ID)
    }
}
