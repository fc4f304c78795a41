#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use hybridjoin_dw::storage::RecordStream;
use hybridjoin_dw::{
    Dimension, DimensionId, DimensionLookup, Error, FactRow, FactSink, OuterRelation,
    PipelineConfig, Result, StreamRecord,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MASTER_DATA_CSV: &str = "\
productID,productName,productPrice,supplierID,supplierName,storeID,storeName
1,Kettle,$20.00,10,Acme,100,North
2,Toaster,$35.50,11,Brill,101,South
3,Blender,$50.00,10,Acme,102,East
";

pub const TRANSACTIONS_CSV: &str = "\
Order ID,Order Date,ProductID,CustomerID,CustomerName,Gender,Quantity Ordered
500,2019-04-07 21:25:00,1,7,Ann,F,2
501,2019-04-08 10:00:00,2,8,Bob,M,1
502,04/19/19 08:46,1,9,Cid,M,3
503,bad date,3,10,Dee,F,1
";

pub fn records(pairs: &[(i64, i64)]) -> Vec<StreamRecord> {
    pairs
        .iter()
        .map(|&(product_id, customer_id)| StreamRecord::new(product_id, customer_id))
        .collect()
}

pub fn pipeline_config(batch_size: usize, pace: Duration) -> PipelineConfig {
    PipelineConfig {
        batch_size,
        pace,
        ..PipelineConfig::default()
    }
}

pub fn record_stream(records: Vec<StreamRecord>) -> RecordStream {
    stream::iter(records.into_iter().map(Ok)).boxed()
}

pub fn write_fixture(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("Failed to write fixture");
    path
}

/// Lookup backed by fixed maps. With `mirror` every product resolves to
/// its own id in both dimensions.
#[derive(Default)]
pub struct StubLookup {
    time: HashMap<i64, DimensionId>,
    store: HashMap<i64, DimensionId>,
    failing: HashSet<i64>,
    mirror: bool,
    unreachable: bool,
    calls: Mutex<Vec<(Dimension, i64)>>,
}

impl StubLookup {
    pub fn mirroring() -> Self {
        Self {
            mirror: true,
            ..Self::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn with_time(mut self, product_id: i64, time_id: DimensionId) -> Self {
        self.time.insert(product_id, time_id);
        self
    }

    pub fn with_store(mut self, product_id: i64, store_id: DimensionId) -> Self {
        self.store.insert(product_id, store_id);
        self
    }

    pub fn failing_for(mut self, product_id: i64) -> Self {
        self.failing.insert(product_id);
        self
    }

    pub fn calls(&self) -> Vec<(Dimension, i64)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl DimensionLookup for StubLookup {
    async fn lookup(&self, dimension: Dimension, product_id: i64) -> Result<Option<DimensionId>> {
        self.calls.lock().push((dimension, product_id));
        if self.failing.contains(&product_id) {
            return Err(Error::Lookup {
                dimension,
                product_id,
                reason: "connection refused".into(),
            });
        }
        if self.mirror {
            return Ok(Some(product_id));
        }
        let table = match dimension {
            Dimension::Time => &self.time,
            Dimension::Store => &self.store,
        };
        Ok(table.get(&product_id).copied())
    }

    async fn ping(&self) -> Result<()> {
        if self.unreachable {
            return Err(Error::Generic("lookup host down".into()));
        }
        Ok(())
    }
}

/// Sink that keeps every appended row in order.
#[derive(Default)]
pub struct RecordingSink {
    rows: Mutex<Vec<FactRow>>,
    failing_customers: HashSet<i64>,
    unreachable: bool,
    delay: Duration,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    /// Every append takes `delay` before completing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_for_customer(mut self, customer_id: i64) -> Self {
        self.failing_customers.insert(customer_id);
        self
    }

    pub fn rows(&self) -> Vec<FactRow> {
        self.rows.lock().clone()
    }

    pub fn pairs(&self) -> Vec<(i64, i64)> {
        self.rows
            .lock()
            .iter()
            .map(|row| (row.product_id, row.customer_id))
            .collect()
    }
}

#[async_trait]
impl FactSink for RecordingSink {
    async fn append(&self, row: FactRow) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing_customers.contains(&row.customer_id) {
            return Err(Error::Sink(format!("constraint violated for customer {}", row.customer_id)));
        }
        self.rows.lock().push(row);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        if self.unreachable {
            return Err(Error::Generic("sink host down".into()));
        }
        Ok(())
    }
}

/// Outer relation over a fixed list of records.
pub struct VecRelation {
    records: Vec<StreamRecord>,
    unreachable: bool,
}

impl VecRelation {
    pub fn new(records: Vec<StreamRecord>) -> Self {
        Self {
            records,
            unreachable: false,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            records: Vec::new(),
            unreachable: true,
        }
    }
}

#[async_trait]
impl OuterRelation for VecRelation {
    async fn scan(&self) -> Result<RecordStream> {
        if self.unreachable {
            return Err(Error::Generic("outer relation unreachable".into()));
        }
        Ok(record_stream(self.records.clone()))
    }
}
