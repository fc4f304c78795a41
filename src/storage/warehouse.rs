//! In-memory star schema
//!
//! Five dimension tables and the `Sales_Fact` table. Primary-key tables are
//! ordered maps; time and store rows are additionally indexed by product so
//! that the join's point lookups walk a clustered index.

use super::{DimensionLookup, FactSink, OuterRelation, RecordStream};
use crate::error::{Error, Result};
use crate::join::{Dimension, DimensionId, FactRow, JoinKey, StreamRecord};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const ORDER_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%y %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    pub supplier_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: i64,
    pub name: String,
    pub price: f64,
    pub supplier_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: i64,
    pub name: String,
    pub gender: String,
    pub product_id: i64,
}

/// Time row as read from the transactions file, before the id is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTimeRow {
    pub order_id: i64,
    pub order_date: String,
    pub quantity: i64,
    pub product_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRow {
    pub time_id: DimensionId,
    pub order_id: i64,
    pub order_date: NaiveDateTime,
    pub quantity: i64,
    pub product_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub store_id: i64,
    pub name: String,
    pub product_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesFact {
    pub product_id: i64,
    pub customer_id: i64,
    pub time_id: DimensionId,
    pub store_id: DimensionId,
    pub total_sale: f64,
}

/// Result of a time dimension batch insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeInsertSummary {
    pub inserted: usize,
    pub rejected_dates: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub suppliers: usize,
    pub products: usize,
    pub customers: usize,
    pub time_rows: usize,
    pub stores: usize,
    pub sales_facts: usize,
}

#[derive(Debug, Default)]
struct TimeTable {
    rows: Vec<TimeRow>,
    first_by_product: BTreeMap<i64, DimensionId>,
}

impl TimeTable {
    fn get(&self, time_id: DimensionId) -> Option<&TimeRow> {
        time_id
            .checked_sub(1)
            .and_then(|index| usize::try_from(index).ok())
            .and_then(|index| self.rows.get(index))
    }
}

#[derive(Debug, Default)]
struct StoreTable {
    rows: BTreeMap<i64, Store>,
    first_by_product: BTreeMap<i64, DimensionId>,
}

#[derive(Debug, Default)]
pub struct Warehouse {
    suppliers: RwLock<BTreeMap<i64, Supplier>>,
    products: RwLock<BTreeMap<i64, Product>>,
    customers: RwLock<BTreeMap<i64, Customer>>,
    time: RwLock<TimeTable>,
    stores: RwLock<StoreTable>,
    sales: RwLock<Vec<SalesFact>>,
}

/// Rejects the whole batch if any key already exists or repeats within it.
fn insert_keyed<T>(
    table: &RwLock<BTreeMap<i64, T>>,
    table_name: &'static str,
    rows: Vec<T>,
    key: impl Fn(&T) -> i64,
) -> Result<usize> {
    let mut table = table.write();
    let mut seen = std::collections::HashSet::with_capacity(rows.len());
    for row in &rows {
        let id = key(row);
        if table.contains_key(&id) || !seen.insert(id) {
            return Err(Error::DuplicateKey {
                table: table_name,
                key: id.to_string(),
            });
        }
    }
    let count = rows.len();
    for row in rows {
        table.insert(key(&row), row);
    }
    Ok(count)
}

fn parse_order_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    ORDER_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

impl Warehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_suppliers(&self, rows: Vec<Supplier>) -> Result<usize> {
        insert_keyed(&self.suppliers, "Supplier_Dimension", rows, |s| s.supplier_id)
    }

    pub fn insert_products(&self, rows: Vec<Product>) -> Result<usize> {
        insert_keyed(&self.products, "Product_Dimension", rows, |p| p.product_id)
    }

    pub fn insert_customers(&self, rows: Vec<Customer>) -> Result<usize> {
        insert_keyed(&self.customers, "Customer_Dimension", rows, |c| c.customer_id)
    }

    /// Assigns sequential time ids. Rows with an unparseable order date are
    /// dropped individually; the rest of the batch is kept.
    pub fn insert_time_rows(&self, rows: Vec<NewTimeRow>) -> TimeInsertSummary {
        let mut table = self.time.write();
        let mut summary = TimeInsertSummary::default();
        for row in rows {
            let Some(order_date) = parse_order_date(&row.order_date) else {
                debug!(
                    order_id = row.order_id,
                    order_date = %row.order_date,
                    "Ignoring incorrect datetime value"
                );
                summary.rejected_dates += 1;
                continue;
            };
            let time_id = table.rows.len() as DimensionId + 1;
            table.first_by_product.entry(row.product_id).or_insert(time_id);
            table.rows.push(TimeRow {
                time_id,
                order_id: row.order_id,
                order_date,
                quantity: row.quantity,
                product_id: row.product_id,
            });
            summary.inserted += 1;
        }
        if summary.rejected_dates > 0 {
            warn!(
                rejected = summary.rejected_dates,
                "Ignoring incorrect datetime values in Time_Dimension"
            );
        }
        summary
    }

    pub fn insert_stores(&self, rows: Vec<Store>) -> Result<usize> {
        let mut table = self.stores.write();
        let mut seen = std::collections::HashSet::with_capacity(rows.len());
        for row in &rows {
            if table.rows.contains_key(&row.store_id) || !seen.insert(row.store_id) {
                return Err(Error::DuplicateKey {
                    table: "Store_Dimension",
                    key: row.store_id.to_string(),
                });
            }
        }
        let count = rows.len();
        for row in rows {
            table
                .first_by_product
                .entry(row.product_id)
                .or_insert(row.store_id);
            table.rows.insert(row.store_id, row);
        }
        Ok(count)
    }

    pub fn product(&self, product_id: i64) -> Option<Product> {
        self.products.read().get(&product_id).cloned()
    }

    pub fn time_row(&self, time_id: DimensionId) -> Option<TimeRow> {
        self.time.read().get(time_id).cloned()
    }

    pub fn customers(&self) -> Vec<Customer> {
        self.customers.read().values().cloned().collect()
    }

    pub fn sales_facts(&self) -> Vec<SalesFact> {
        self.sales.read().clone()
    }

    pub fn table_counts(&self) -> TableCounts {
        TableCounts {
            suppliers: self.suppliers.read().len(),
            products: self.products.read().len(),
            customers: self.customers.read().len(),
            time_rows: self.time.read().rows.len(),
            stores: self.stores.read().rows.len(),
            sales_facts: self.sales.read().len(),
        }
    }

    /// Price of the product times the quantity ordered on the time row.
    fn total_sale(&self, row: &FactRow) -> f64 {
        let price = self.products.read().get(&row.product_id).map(|p| p.price);
        let quantity = row
            .time_id
            .and_then(|time_id| self.time.read().get(time_id).map(|t| t.quantity));
        match (price, quantity) {
            (Some(price), Some(quantity)) => price * quantity as f64,
            _ => 0.0,
        }
    }

    fn insert_fact(&self, row: &FactRow) -> SalesFact {
        let fact = SalesFact {
            product_id: row.product_id,
            customer_id: row.customer_id,
            time_id: row.time_key(),
            store_id: row.store_key(),
            total_sale: self.total_sale(row),
        };
        self.sales.write().push(fact.clone());
        fact
    }
}

#[async_trait]
impl DimensionLookup for Warehouse {
    async fn lookup(
        &self,
        dimension: Dimension,
        product_id: JoinKey,
    ) -> Result<Option<DimensionId>> {
        let id = match dimension {
            Dimension::Time => self.time.read().first_by_product.get(&product_id).copied(),
            Dimension::Store => self.stores.read().first_by_product.get(&product_id).copied(),
        };
        Ok(id)
    }
}

#[async_trait]
impl FactSink for Warehouse {
    async fn append(&self, row: FactRow) -> Result<()> {
        let stored = self.insert_fact(&row);
        debug!(
            product_id = stored.product_id,
            customer_id = stored.customer_id,
            time_id = stored.time_id,
            store_id = stored.store_id,
            total_sale = stored.total_sale,
            "Sales_Fact row inserted"
        );
        Ok(())
    }
}

#[async_trait]
impl OuterRelation for Warehouse {
    async fn scan(&self) -> Result<RecordStream> {
        let records: Vec<Result<StreamRecord>> = self
            .customers
            .read()
            .values()
            .map(|c| Ok(StreamRecord::new(c.product_id, c.customer_id)))
            .collect();
        Ok(stream::iter(records).boxed())
    }
}
