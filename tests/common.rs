#![allow(dead_code)]

use std::path::{Path, PathBuf};

use jointadmin::sql::SelectQuery;
use jointadmin::types::Conditions;
use jointadmin::{
    Database, Error, FlatRow, JoinSpec, JointAdmin, MemoryDraftStore, Result, Sql, SqliteSql,
};
use rusqlite::{Connection, OpenFlags};
use serde_json::{Map, Value};

/// Tables for the order fixture. `Order` needs quoting.
pub const ORDER_DDL: &str = r#"
CREATE TABLE "Order" (
    ID         INTEGER PRIMARY KEY,
    Customer   TEXT,
    Total      INTEGER,
    List_ID    INTEGER,
    Address_ID INTEGER
);
CREATE TABLE Item (
    ID      INTEGER PRIMARY KEY,
    List_ID INTEGER,
    SKU     TEXT,
    Qty     INTEGER
);
CREATE TABLE Address (
    ID   INTEGER PRIMARY KEY,
    City TEXT
);
"#;

/// Order → Items (one-to-many by list id) and Order → Address (one-to-one).
///
/// Items come first, so an add writes Item, then Address, then Order.
pub fn order_spec() -> JoinSpec {
    JoinSpec::new("Order")
        .with_fields(["ID", "Customer", "Total"])
        .join(
            JoinSpec::new("Item")
                .with_fields(["ID", "List_ID", "SKU", "Qty"])
                .with_parent_field("List_ID")
                .with_child_field("List_ID")
                .with_joint_key("Items"),
        )
        .join(
            JoinSpec::new("Address")
                .with_fields(["ID", "City"])
                .with_parent_field("Address_ID"),
        )
}

pub fn create_temp_db_file(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    let db = Database::open(&path).expect("initialize database");
    db.execute_batch(ORDER_DDL).expect("create order tables");
    (dir, path)
}

pub fn open_read_only(path: &Path) -> Connection {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .expect("open read-only connection")
}

pub fn open_admin(path: &Path) -> JointAdmin<SqliteSql, MemoryDraftStore> {
    let db = Database::open(path).expect("open database");
    JointAdmin::new(order_spec(), db.into_sql(), MemoryDraftStore::new()).expect("valid spec")
}

pub fn in_memory_admin() -> JointAdmin<SqliteSql, MemoryDraftStore> {
    let db = Database::open_in_memory().expect("open database");
    db.execute_batch(ORDER_DDL).expect("create order tables");
    JointAdmin::new(order_spec(), db.into_sql(), MemoryDraftStore::new()).expect("valid spec")
}

pub fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))
        .expect("count rows")
}

/// Builds flat rows from JSON objects.
pub fn rows(values: Vec<Value>) -> Vec<FlatRow> {
    values
        .into_iter()
        .map(|v| FlatRow::from_value(v).expect("flat row object"))
        .collect()
}

/// Adds one order with the given items and city through a fresh session.
pub fn add_order<S: Sql>(
    admin: &mut JointAdmin<S, MemoryDraftStore>,
    customer: &str,
    skus: &[&str],
    city: &str,
) {
    admin.create_new().expect("create draft");

    let mut input = Vec::new();
    for sku in skus {
        input.push(serde_json::json!({
            "Order.Customer": customer,
            "Order.Total": skus.len(),
            "Item.SKU": sku,
            "Item.Qty": 1,
            "Address.City": city,
        }));
    }
    if skus.is_empty() {
        input.push(serde_json::json!({"Order.Customer": customer, "Address.City": city}));
    }

    admin.update_current_record(&rows(input)).expect("merge draft");
    let outcome = admin.add().expect("add order");
    assert!(outcome.is_committed(), "add should commit, got {outcome:?}");
}

// =============================================================================
// Failure Injection
// =============================================================================

/// Wraps [`SqliteSql`] and fails chosen statements with a backend error.
pub struct FailingSql {
    inner: SqliteSql,
    fail_insert_into: Option<String>,
    fail_delete_from: Option<String>,
}

impl FailingSql {
    pub fn new(inner: SqliteSql) -> Self {
        Self {
            inner,
            fail_insert_into: None,
            fail_delete_from: None,
        }
    }

    pub fn fail_insert_into(mut self, table: &str) -> Self {
        self.fail_insert_into = Some(table.to_string());
        self
    }

    pub fn fail_delete_from(mut self, table: &str) -> Self {
        self.fail_delete_from = Some(table.to_string());
        self
    }

    pub fn connection(&self) -> &Connection {
        self.inner.connection()
    }
}

impl Sql for FailingSql {
    fn select(&mut self, query: &SelectQuery) -> Result<Vec<FlatRow>> {
        self.inner.select(query)
    }

    fn insert(&mut self, table: &str, columns: &[String], rows: &[Vec<Value>]) -> Result<()> {
        if self.fail_insert_into.as_deref() == Some(table) {
            return Err(Error::Sql(format!("injected failure inserting into {table}")));
        }
        self.inner.insert(table, columns, rows)
    }

    fn update(&mut self, table: &str, values: &Map<String, Value>, conditions: &Conditions) -> Result<usize> {
        self.inner.update(table, values, conditions)
    }

    fn delete(&mut self, table: &str, conditions: &Conditions) -> Result<usize> {
        if self.fail_delete_from.as_deref() == Some(table) {
            return Err(Error::Sql(format!("injected failure deleting from {table}")));
        }
        self.inner.delete(table, conditions)
    }

    fn last_insert_id(&mut self, column: &str) -> Result<Value> {
        self.inner.last_insert_id(column)
    }

    fn begin_transaction(&mut self) -> Result<()> {
        self.inner.begin_transaction()
    }

    fn commit(&mut self) -> Result<()> {
        self.inner.commit()
    }

    fn roll_back(&mut self) -> Result<()> {
        self.inner.roll_back()
    }
}

pub fn open_failing_admin(path: &Path, sql: impl FnOnce(FailingSql) -> FailingSql) -> JointAdmin<FailingSql, MemoryDraftStore> {
    let db = Database::open(path).expect("open database");
    let failing = sql(FailingSql::new(db.into_sql()));
    JointAdmin::new(order_spec(), failing, MemoryDraftStore::new()).expect("valid spec")
}
