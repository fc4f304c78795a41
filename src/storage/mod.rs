pub mod warehouse;

use crate::error::Result;
use crate::join::{Dimension, DimensionId, FactRow, JoinKey, StreamRecord};
use async_trait::async_trait;
use futures::stream::BoxStream;

pub use warehouse::{
    Customer, NewTimeRow, Product, SalesFact, Store, Supplier, TableCounts, TimeInsertSummary,
    TimeRow, Warehouse,
};

/// Outer relation records in scan order.
pub type RecordStream = BoxStream<'static, Result<StreamRecord>>;

/// Point lookups into the inner (dimension) relations.
#[async_trait]
pub trait DimensionLookup: Send + Sync {
    /// Id of the `dimension` row associated with `product_id`.
    ///
    /// A missing row is `Ok(None)`; `Err` is reserved for transport or
    /// storage failures.
    async fn lookup(&self, dimension: Dimension, product_id: JoinKey)
        -> Result<Option<DimensionId>>;

    /// Pre-flight connectivity check run before the pipeline starts.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Append-only destination for joined rows.
#[async_trait]
pub trait FactSink: Send + Sync {
    async fn append(&self, row: FactRow) -> Result<()>;

    /// Pre-flight connectivity check run before the pipeline starts.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Replayable source of the outer relation.
#[async_trait]
pub trait OuterRelation: Send + Sync {
    /// Open a new scan. Failing here aborts the run before any batch exists.
    async fn scan(&self) -> Result<RecordStream>;
}
