//! Dimension loading
//!
//! Fills the five dimension tables from the master data and transactions
//! files in the order Supplier, Product, Customer, Time, Store. Ids already
//! loaded by this loader are skipped, so rows repeating a key within or
//! across files never reach the warehouse's primary-key check. A table whose
//! insert is rejected is reported and the remaining tables still load.

use crate::data_import_export::{CsvRow, CsvTable};
use crate::error::Result;
use crate::storage::warehouse::{Customer, NewTimeRow, Product, Store, Supplier};
use crate::storage::Warehouse;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

mod columns {
    pub const SUPPLIER_ID: &str = "supplierID";
    pub const SUPPLIER_NAME: &str = "supplierName";
    pub const PRODUCT_ID: &str = "productID";
    pub const PRODUCT_NAME: &str = "productName";
    pub const PRODUCT_PRICE: &str = "productPrice";
    pub const STORE_ID: &str = "storeID";
    pub const STORE_NAME: &str = "storeName";

    pub const CUSTOMER_ID: &str = "CustomerID";
    pub const CUSTOMER_NAME: &str = "CustomerName";
    pub const GENDER: &str = "Gender";
    pub const TX_PRODUCT_ID: &str = "ProductID";
    pub const ORDER_ID: &str = "Order ID";
    pub const ORDER_DATE: &str = "Order Date";
    pub const QUANTITY: &str = "Quantity Ordered";
}

/// Outcome of loading one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLoadStats {
    pub rows_affected: usize,
    /// Rows with a missing or malformed field, or an unparseable order date.
    pub rows_skipped: usize,
    /// Rows whose id was already loaded.
    pub duplicates: usize,
    /// The warehouse rejected the table's insert; nothing was written.
    pub insert_failed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub suppliers: TableLoadStats,
    pub products: TableLoadStats,
    pub customers: TableLoadStats,
    pub time: TableLoadStats,
    pub stores: TableLoadStats,
}

impl LoadReport {
    pub fn rows_affected(&self) -> usize {
        self.tables().iter().map(|(_, s)| s.rows_affected).sum()
    }

    pub fn rows_skipped(&self) -> usize {
        self.tables().iter().map(|(_, s)| s.rows_skipped).sum()
    }

    pub fn failed_tables(&self) -> Vec<&'static str> {
        self.tables()
            .iter()
            .filter(|(_, s)| s.insert_failed)
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn tables(&self) -> [(&'static str, TableLoadStats); 5] {
        [
            ("Supplier_Dimension", self.suppliers),
            ("Product_Dimension", self.products),
            ("Customer_Dimension", self.customers),
            ("Time_Dimension", self.time),
            ("Store_Dimension", self.stores),
        ]
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, stats) in self.tables() {
            write!(
                f,
                "{:<20} {:>6} rows affected, {} skipped, {} duplicates",
                name, stats.rows_affected, stats.rows_skipped, stats.duplicates
            )?;
            if stats.insert_failed {
                write!(f, " (insert rejected)")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Loads dimension rows, remembering which ids it has already seen.
#[derive(Debug, Default)]
pub struct DimensionLoader {
    suppliers: HashSet<i64>,
    products: HashSet<i64>,
    customers: HashSet<i64>,
    stores: HashSet<i64>,
}

/// Parse `source`, insert the first row per unseen id and remember those
/// ids once the insert has succeeded.
fn load_keyed<T>(
    source: &CsvTable,
    seen: &mut HashSet<i64>,
    table_name: &'static str,
    parse: impl Fn(&CsvRow) -> Result<T>,
    id: impl Fn(&T) -> i64,
    insert: impl FnOnce(Vec<T>) -> Result<usize>,
) -> TableLoadStats {
    let mut stats = TableLoadStats::default();
    let mut pending = HashSet::new();
    let mut rows = Vec::new();
    for csv_row in source.iter() {
        match parse(csv_row) {
            Ok(row) => {
                let row_id = id(&row);
                if seen.contains(&row_id) || !pending.insert(row_id) {
                    stats.duplicates += 1;
                } else {
                    rows.push(row);
                }
            }
            Err(e) => {
                debug!(table = table_name, error = %e, "Skipping source row");
                stats.rows_skipped += 1;
            }
        }
    }

    match insert(rows) {
        Ok(affected) => {
            stats.rows_affected = affected;
            seen.extend(pending);
        }
        Err(e) => {
            warn!(table = table_name, error = %e, "Dimension insert rejected");
            stats.insert_failed = true;
        }
    }
    stats
}

fn parse_supplier(row: &CsvRow) -> Result<Supplier> {
    Ok(Supplier {
        supplier_id: row.parse_i64(columns::SUPPLIER_ID)?,
        name: row.require(columns::SUPPLIER_NAME)?.to_string(),
    })
}

fn parse_product(row: &CsvRow) -> Result<Product> {
    Ok(Product {
        product_id: row.parse_i64(columns::PRODUCT_ID)?,
        name: row.require(columns::PRODUCT_NAME)?.to_string(),
        price: row.parse_price(columns::PRODUCT_PRICE)?,
        supplier_id: row.parse_i64(columns::SUPPLIER_ID)?,
    })
}

fn parse_customer(row: &CsvRow) -> Result<Customer> {
    Ok(Customer {
        customer_id: row.parse_i64(columns::CUSTOMER_ID)?,
        name: row.require(columns::CUSTOMER_NAME)?.to_string(),
        gender: row.require(columns::GENDER)?.to_string(),
        product_id: row.parse_i64(columns::TX_PRODUCT_ID)?,
    })
}

fn parse_time(row: &CsvRow) -> Result<NewTimeRow> {
    Ok(NewTimeRow {
        order_id: row.parse_i64(columns::ORDER_ID)?,
        order_date: row.require(columns::ORDER_DATE)?.to_string(),
        quantity: row.parse_i64(columns::QUANTITY)?,
        product_id: row.parse_i64(columns::TX_PRODUCT_ID)?,
    })
}

fn parse_store(row: &CsvRow) -> Result<Store> {
    Ok(Store {
        store_id: row.parse_i64(columns::STORE_ID)?,
        name: row.require(columns::STORE_NAME)?.to_string(),
        product_id: row.parse_i64(columns::PRODUCT_ID)?,
    })
}

impl DimensionLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load all five dimensions into `warehouse`.
    ///
    /// Master data feeds suppliers, products and stores; transactions feed
    /// customers and time rows. Time rows are not deduplicated. A rejected
    /// insert is recorded in that table's stats and does not stop the
    /// tables after it.
    pub fn load(
        &mut self,
        warehouse: &Warehouse,
        transactions: &CsvTable,
        master_data: &CsvTable,
    ) -> LoadReport {
        let mut report = LoadReport::default();

        report.suppliers = load_keyed(
            master_data,
            &mut self.suppliers,
            "Supplier_Dimension",
            parse_supplier,
            |s| s.supplier_id,
            |rows| warehouse.insert_suppliers(rows),
        );
        report.products = load_keyed(
            master_data,
            &mut self.products,
            "Product_Dimension",
            parse_product,
            |p| p.product_id,
            |rows| warehouse.insert_products(rows),
        );
        report.customers = load_keyed(
            transactions,
            &mut self.customers,
            "Customer_Dimension",
            parse_customer,
            |c| c.customer_id,
            |rows| warehouse.insert_customers(rows),
        );

        let mut time_rows = Vec::with_capacity(transactions.len());
        for row in transactions.iter() {
            match parse_time(row) {
                Ok(time_row) => time_rows.push(time_row),
                Err(e) => {
                    debug!(table = "Time_Dimension", error = %e, "Skipping source row");
                    report.time.rows_skipped += 1;
                }
            }
        }
        let summary = warehouse.insert_time_rows(time_rows);
        report.time.rows_affected = summary.inserted;
        report.time.rows_skipped += summary.rejected_dates;

        report.stores = load_keyed(
            master_data,
            &mut self.stores,
            "Store_Dimension",
            parse_store,
            |s| s.store_id,
            |rows| warehouse.insert_stores(rows),
        );

        for (table, stats) in report.tables() {
            info!(
                table,
                rows_affected = stats.rows_affected,
                rows_skipped = stats.rows_skipped,
                duplicates = stats.duplicates,
                insert_failed = stats.insert_failed,
                "Dimension loaded"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn table(headers: &[&str], rows: &[&[&str]]) -> CsvTable {
        CsvTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .enumerate()
                .map(|(i, values)| CsvRow {
                    row_number: i + 1,
                    fields: headers
                        .iter()
                        .zip(values.iter())
                        .map(|(h, v)| (h.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                })
                .collect(),
        }
    }

    fn master_data() -> CsvTable {
        table(
            &[
                "productID",
                "productName",
                "productPrice",
                "supplierID",
                "supplierName",
                "storeID",
                "storeName",
            ],
            &[
                &["1", "Kettle", "$20.00", "10", "Acme", "100", "North"],
                &["2", "Toaster", "$35.50", "10", "Acme", "101", "South"],
                &["x", "Broken", "$1.00", "11", "Other", "102", "East"],
            ],
        )
    }

    fn transactions() -> CsvTable {
        table(
            &[
                "Order ID",
                "Order Date",
                "ProductID",
                "CustomerID",
                "CustomerName",
                "Gender",
                "Quantity Ordered",
            ],
            &[
                &["500", "2019-04-07 21:25:00", "1", "7", "Ann", "F", "2"],
                &["501", "not a date", "2", "8", "Bob", "M", "1"],
                &["502", "04/19/19 08:46", "2", "7", "Ann", "F", "3"],
            ],
        )
    }

    #[test]
    fn test_load_fills_every_dimension() {
        let warehouse = Warehouse::new();
        let mut loader = DimensionLoader::new();

        let report = loader.load(&warehouse, &transactions(), &master_data());

        // Supplier 10 repeats, the third master row has a bad product id
        // but valid supplier and store columns.
        assert_eq!(report.suppliers.rows_affected, 2);
        assert_eq!(report.suppliers.duplicates, 1);
        assert_eq!(report.products.rows_affected, 2);
        assert_eq!(report.products.rows_skipped, 1);
        assert_eq!(report.stores.rows_affected, 2);
        assert_eq!(report.stores.rows_skipped, 1);
        assert_eq!(report.customers.rows_affected, 2);
        assert_eq!(report.customers.duplicates, 1);
        assert_eq!(report.time.rows_affected, 2);
        assert_eq!(report.time.rows_skipped, 1);

        let counts = warehouse.table_counts();
        assert_eq!(counts.suppliers, 2);
        assert_eq!(counts.products, 2);
        assert_eq!(counts.customers, 2);
        assert_eq!(counts.time_rows, 2);
        assert_eq!(counts.stores, 2);
    }

    #[test]
    fn test_second_load_skips_seen_ids() {
        let warehouse = Warehouse::new();
        let mut loader = DimensionLoader::new();
        loader.load(&warehouse, &transactions(), &master_data());

        let report = loader.load(&warehouse, &transactions(), &master_data());

        assert_eq!(report.suppliers.rows_affected, 0);
        assert_eq!(report.products.rows_affected, 0);
        assert_eq!(report.customers.rows_affected, 0);
        assert_eq!(report.stores.rows_affected, 0);
        // Time rows carry no natural key and load again.
        assert_eq!(report.time.rows_affected, 2);
        assert_eq!(warehouse.table_counts().time_rows, 4);
    }

    #[test]
    fn test_rejected_insert_does_not_mark_ids_loaded() {
        let taken = Warehouse::new();
        DimensionLoader::new().load(&taken, &transactions(), &master_data());

        // A fresh loader trips the primary-key check on every keyed table,
        // yet the time rows still load.
        let mut loader = DimensionLoader::new();
        let rejected = loader.load(&taken, &transactions(), &master_data());
        assert_eq!(
            rejected.failed_tables(),
            vec![
                "Supplier_Dimension",
                "Product_Dimension",
                "Customer_Dimension",
                "Store_Dimension"
            ]
        );
        assert_eq!(rejected.suppliers.rows_affected, 0);
        assert_eq!(rejected.time.rows_affected, 2);
        assert!(rejected.to_string().contains("(insert rejected)"));

        // Nothing was recorded as loaded, so the same loader fills a new warehouse.
        let fresh = Warehouse::new();
        let report = loader.load(&fresh, &transactions(), &master_data());
        assert!(report.failed_tables().is_empty());
        assert_eq!(report.suppliers.rows_affected, 2);
        assert_eq!(report.products.rows_affected, 2);
        assert_eq!(report.customers.rows_affected, 2);
        assert_eq!(report.stores.rows_affected, 2);
    }
}
