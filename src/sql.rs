//! # SQL Collaborator
//!
//! The engine talks to storage only through the [`Sql`] trait. [`SqliteSql`]
//! implements it on a rusqlite connection; tests wrap it to inject failures.
//!
//! ## Statement Shapes
//!
//! ```text
//! select  SELECT "A"."f" AS "A.f", ... FROM <join clause> WHERE ... ORDER BY ... LIMIT n
//! insert  INSERT INTO "t" ("c1", "c2") VALUES (?, ?)        (once per row)
//! update  UPDATE "t" SET "c1" = ? WHERE "k" = ?
//! delete  DELETE FROM "t" WHERE "k" = ?
//! ```
//!
//! Identifiers are always double-quoted, so table names such as `Order` that
//! collide with SQL keywords work unchanged. Values are always bound as
//! parameters, never spliced into SQL text.
//!
//! ## Transactions
//!
//! Transactions are driven with raw `BEGIN`/`COMMIT`/`ROLLBACK` statements
//! rather than rusqlite's `Transaction` guard. The guard would hold a mutable
//! borrow of the connection across the whole recursive write, while every
//! callback also needs the connection.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::join::JoinSpec;
use crate::types::{split_column, Conditions, FlatRow};

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quotes an SQL identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a possibly namespaced column: `A.f` becomes `"A"."f"`.
pub fn quote_column(column: &str) -> String {
    match split_column(column) {
        (Some(alias), field) => format!("{}.{}", quote_identifier(alias), quote_identifier(field)),
        (None, field) => quote_identifier(field),
    }
}

// =============================================================================
// Value Conversion
// =============================================================================

/// Converts a JSON value to an owned SQL parameter.
///
/// Booleans become integers (SQLite has no boolean type); arrays and objects
/// are stored as their JSON text.
pub fn json_value_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                SqlValue::Text(n.to_string())
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Converts a column value read from SQLite to JSON.
///
/// BLOBs are returned as base64 strings for JSON compatibility.
pub fn sql_value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => {
            use base64::Engine;
            Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
    }
}

// =============================================================================
// Queries
// =============================================================================

/// Sort direction for `ORDER BY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

/// A select over one table or a join tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    /// Rendered `FROM` clause (a quoted table or a join clause)
    pub from: String,

    /// Columns to select; namespaced columns come back under the same name
    pub columns: Vec<String>,

    /// Equality conditions, AND-ed
    pub conditions: Conditions,

    /// Sort keys, applied in order
    pub order: Vec<(String, Direction)>,

    /// Maximum number of rows
    pub limit: Option<usize>,
}

impl SelectQuery {
    /// Selects `columns` from a single table.
    pub fn table<I, S>(table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            from: quote_identifier(table),
            columns: columns.into_iter().map(Into::into).collect(),
            conditions: Conditions::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    /// Selects every declared column of a join tree.
    ///
    /// Rows come back ordered by the primary keys of the tree (preorder), so
    /// the arranger sees a deterministic first-appearance order.
    pub fn join(spec: &JoinSpec) -> Self {
        let mut order = Vec::new();
        push_key_order(spec, &mut order);

        Self {
            from: spec.join_clause(),
            columns: spec.columns(),
            conditions: Conditions::new(),
            order,
            limit: None,
        }
    }

    /// Replaces the conditions (builder pattern).
    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }

    /// Replaces the sort keys (builder pattern).
    pub fn with_order(mut self, order: Vec<(String, Direction)>) -> Self {
        self.order = order;
        self
    }

    /// Sets the row limit (builder pattern).
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

fn push_key_order(spec: &JoinSpec, order: &mut Vec<(String, Direction)>) {
    order.push((spec.column(spec.primary_key()), Direction::Asc));
    for child in spec.children() {
        push_key_order(child, order);
    }
}

/// Renders a WHERE clause and its parameters.
fn where_clause(conditions: &Conditions) -> (String, Vec<SqlValue>) {
    if conditions.is_empty() {
        return (String::new(), Vec::new());
    }

    let mut parts = Vec::with_capacity(conditions.len());
    let mut params = Vec::with_capacity(conditions.len());

    for (column, value) in conditions.iter() {
        if value.is_null() {
            parts.push(format!("{} IS NULL", quote_column(column)));
        } else {
            parts.push(format!("{} = ?", quote_column(column)));
            params.push(json_value_to_sql(value));
        }
    }

    (format!(" WHERE {}", parts.join(" AND ")), params)
}

// =============================================================================
// Sql Trait
// =============================================================================

/// Storage operations the engine needs.
///
/// # Rust Pattern: Object Safety
///
/// Every method takes plain references, so the trait can be used as
/// `&mut dyn Sql`. The write callbacks and the list-id allocator receive the
/// backend that way without knowing its concrete type.
pub trait Sql {
    /// Runs a select and returns one [`FlatRow`] per result row.
    fn select(&mut self, query: &SelectQuery) -> Result<Vec<FlatRow>>;

    /// Inserts `rows`, each holding one value per entry of `columns`.
    fn insert(&mut self, table: &str, columns: &[String], rows: &[Vec<Value>]) -> Result<()>;

    /// Updates matching rows; returns the number changed.
    fn update(
        &mut self,
        table: &str,
        values: &serde_json::Map<String, Value>,
        conditions: &Conditions,
    ) -> Result<usize>;

    /// Deletes matching rows; returns the number removed.
    fn delete(&mut self, table: &str, conditions: &Conditions) -> Result<usize>;

    /// Key assigned to the most recently inserted row.
    fn last_insert_id(&mut self, column: &str) -> Result<Value>;

    fn begin_transaction(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn roll_back(&mut self) -> Result<()>;
}

// =============================================================================
// SQLite Backend
// =============================================================================

/// How `BEGIN` acquires locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionMode {
    /// Lock lazily on first write.
    Deferred,

    /// Take the write lock immediately, so a write transaction never fails
    /// half-way with SQLITE_BUSY on lock upgrade.
    #[default]
    Immediate,
}

impl TransactionMode {
    fn begin_sql(&self) -> &'static str {
        match self {
            TransactionMode::Deferred => "BEGIN DEFERRED",
            TransactionMode::Immediate => "BEGIN IMMEDIATE",
        }
    }
}

/// [`Sql`] over a rusqlite [`Connection`].
#[derive(Debug)]
pub struct SqliteSql {
    conn: Connection,
    mode: TransactionMode,
}

impl SqliteSql {
    /// Wraps a connection using immediate transactions.
    pub fn new(conn: Connection) -> Self {
        Self::with_mode(conn, TransactionMode::default())
    }

    /// Wraps a connection with an explicit transaction mode.
    pub fn with_mode(conn: Connection, mode: TransactionMode) -> Self {
        Self { conn, mode }
    }

    /// The underlying connection, for DDL and inspection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Unwraps the connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }
}

impl Sql for SqliteSql {
    fn select(&mut self, query: &SelectQuery) -> Result<Vec<FlatRow>> {
        let columns = query
            .columns
            .iter()
            .map(|c| format!("{} AS {}", quote_column(c), quote_identifier(c)))
            .collect::<Vec<_>>()
            .join(", ");

        let (where_sql, params) = where_clause(&query.conditions);

        let mut sql = format!("SELECT {columns} FROM {}{where_sql}", query.from);

        if !query.order.is_empty() {
            let order = query
                .order
                .iter()
                .map(|(column, direction)| {
                    let dir = match direction {
                        Direction::Asc => "ASC",
                        Direction::Desc => "DESC",
                    };
                    format!("{} {dir}", quote_column(column))
                })
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" ORDER BY {order}"));
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let rows = stmt.query_map(params_from_iter(params), |row| {
            let mut flat = FlatRow::new();
            for (i, name) in names.iter().enumerate() {
                flat.insert(name.clone(), sql_value_to_json(row.get_ref(i)?));
            }
            Ok(flat)
        })?;

        let rows = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        tracing::trace!(rows = rows.len(), "select");
        Ok(rows)
    }

    fn insert(&mut self, table: &str, columns: &[String], rows: &[Vec<Value>]) -> Result<()> {
        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_identifier(table))
        } else {
            let names = columns
                .iter()
                .map(|c| quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ");
            let placeholders = vec!["?"; columns.len()].join(", ");
            format!(
                "INSERT INTO {} ({names}) VALUES ({placeholders})",
                quote_identifier(table)
            )
        };

        let mut stmt = self.conn.prepare_cached(&sql)?;
        for row in rows {
            if row.len() != columns.len() {
                return Err(Error::InvalidRecord(format!(
                    "insert into '{table}' has {} values for {} columns",
                    row.len(),
                    columns.len()
                )));
            }
            stmt.execute(params_from_iter(row.iter().map(json_value_to_sql)))?;
        }

        Ok(())
    }

    fn update(
        &mut self,
        table: &str,
        values: &serde_json::Map<String, Value>,
        conditions: &Conditions,
    ) -> Result<usize> {
        if values.is_empty() {
            return Ok(0);
        }

        let assignments = values
            .keys()
            .map(|c| format!("{} = ?", quote_identifier(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let (where_sql, where_params) = where_clause(conditions);

        let sql = format!(
            "UPDATE {} SET {assignments}{where_sql}",
            quote_identifier(table)
        );

        let params = values.values().map(json_value_to_sql).chain(where_params);
        let changed = self.conn.execute(&sql, params_from_iter(params))?;
        Ok(changed)
    }

    fn delete(&mut self, table: &str, conditions: &Conditions) -> Result<usize> {
        if conditions.is_empty() {
            return Err(Error::UnboundedDelete {
                table: table.to_string(),
            });
        }

        let (where_sql, params) = where_clause(conditions);
        let sql = format!("DELETE FROM {}{where_sql}", quote_identifier(table));
        let removed = self.conn.execute(&sql, params_from_iter(params))?;
        Ok(removed)
    }

    /// SQLite tracks one rowid per connection; `column` is not consulted.
    fn last_insert_id(&mut self, _column: &str) -> Result<Value> {
        Ok(Value::from(self.conn.last_insert_rowid()))
    }

    fn begin_transaction(&mut self) -> Result<()> {
        self.conn.execute_batch(self.mode.begin_sql())?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn roll_back(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_sql() -> SqliteSql {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE "Order" (ID INTEGER PRIMARY KEY, Total INTEGER, List_ID INTEGER);
            CREATE TABLE Item (ID INTEGER PRIMARY KEY, List_ID INTEGER, SKU TEXT, Data BLOB);
            "#,
        )
        .unwrap();
        SqliteSql::new(conn)
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_identifier("Order"), "\"Order\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_column("Order.ID"), "\"Order\".\"ID\"");
        assert_eq!(quote_column("ID"), "\"ID\"");
    }

    #[test]
    fn test_value_conversion() {
        assert_eq!(json_value_to_sql(&json!(null)), SqlValue::Null);
        assert_eq!(json_value_to_sql(&json!(true)), SqlValue::Integer(1));
        assert_eq!(json_value_to_sql(&json!(7)), SqlValue::Integer(7));
        assert_eq!(json_value_to_sql(&json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(json_value_to_sql(&json!("a")), SqlValue::Text("a".into()));
        assert_eq!(sql_value_to_json(ValueRef::Blob(b"hi")), json!("aGk="));
    }

    #[test]
    fn test_insert_and_select_join() {
        let mut sql = create_test_sql();

        sql.insert("Order", &columns(&["ID", "Total", "List_ID"]), &[vec![json!(1), json!(10), json!(5)]])
            .unwrap();
        sql.insert(
            "Item",
            &columns(&["List_ID", "SKU"]),
            &[vec![json!(5), json!("A")], vec![json!(5), json!("B")]],
        )
        .unwrap();

        let spec = JoinSpec::new("Order")
            .with_fields(["ID", "Total"])
            .join(
                JoinSpec::new("Item")
                    .with_fields(["ID", "SKU"])
                    .with_parent_field("List_ID")
                    .with_child_field("List_ID"),
            );

        let rows = sql.select(&SelectQuery::join(&spec)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Order.Total"), Some(&json!(10)));
        assert_eq!(rows[0].get("Item.SKU"), Some(&json!("A")));
        assert_eq!(rows[1].get("Item.SKU"), Some(&json!("B")));
    }

    #[test]
    fn test_update_and_delete() {
        let mut sql = create_test_sql();
        sql.insert("Order", &columns(&["Total"]), &[vec![json!(1)], vec![json!(2)]])
            .unwrap();

        let mut values = serde_json::Map::new();
        values.insert("Total".into(), json!(99));
        let changed = sql
            .update("Order", &values, &Conditions::new().eq("ID", 2))
            .unwrap();
        assert_eq!(changed, 1);

        let removed = sql.delete("Order", &Conditions::new().eq("ID", 1)).unwrap();
        assert_eq!(removed, 1);

        let rows = sql
            .select(&SelectQuery::table("Order", ["ID", "Total"]))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Total"), Some(&json!(99)));
    }

    #[test]
    fn test_null_condition_uses_is_null() {
        let mut sql = create_test_sql();
        sql.insert("Order", &columns(&["Total"]), &[vec![json!(null)], vec![json!(3)]])
            .unwrap();

        let rows = sql
            .select(
                &SelectQuery::table("Order", ["ID"]).with_conditions(Conditions::new().eq("Total", json!(null))),
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("ID"), Some(&json!(1)));
    }

    #[test]
    fn test_unconditioned_delete_is_refused() {
        let mut sql = create_test_sql();
        let err = sql.delete("Order", &Conditions::new()).unwrap_err();
        assert!(matches!(err, Error::UnboundedDelete { .. }));
    }

    #[test]
    fn test_last_insert_id() {
        let mut sql = create_test_sql();
        sql.insert("Item", &columns(&["SKU"]), &[vec![json!("A")]]).unwrap();
        assert_eq!(sql.last_insert_id("ID").unwrap(), json!(1));
    }

    #[test]
    fn test_rollback_discards_writes() {
        let mut sql = create_test_sql();

        sql.begin_transaction().unwrap();
        sql.insert("Item", &columns(&["SKU"]), &[vec![json!("A")]]).unwrap();
        sql.roll_back().unwrap();

        let rows = sql.select(&SelectQuery::table("Item", ["ID"])).unwrap();
        assert!(rows.is_empty());

        // Rolling back outside a transaction is a no-op.
        sql.roll_back().unwrap();
    }

    #[test]
    fn test_select_limit_and_order() {
        let mut sql = create_test_sql();
        sql.insert(
            "Item",
            &columns(&["SKU"]),
            &[vec![json!("A")], vec![json!("B")], vec![json!("C")]],
        )
        .unwrap();

        let rows = sql
            .select(
                &SelectQuery::table("Item", ["SKU"])
                    .with_order(vec![("ID".into(), Direction::Desc)])
                    .with_limit(2),
            )
            .unwrap();
        let skus: Vec<&Value> = rows.iter().filter_map(|r| r.get("SKU")).collect();
        assert_eq!(skus, vec![&json!("C"), &json!("B")]);
    }
}
