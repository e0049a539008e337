//! # List Id Allocation
//!
//! Rows of a one-to-many batch share one surrogate value in their child field.
//! The allocator hands out a fresh value per batch.
//!
//! ```text
//! get_new("Item", "List_ID")
//!   │
//!   ├── counter row "Item.List_ID" exists?  ── yes ──► value + 1, UPDATE
//!   │
//!   └── no ──► seed from the highest Item.List_ID already stored, + 1, INSERT
//! ```
//!
//! [`TableListIds`] only issues statements through the [`Sql`] it is handed,
//! so it runs inside the caller's transaction and is rolled back with it.

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::sql::{Direction, SelectQuery, Sql};
use crate::types::{Conditions, ListId};

/// Bookkeeping table holding one counter per `table.field`.
pub const LIST_ID_TABLE: &str = "jointadmin_list_ids";

/// Source of list ids.
pub trait ListIdAllocator {
    /// Returns a value not yet used in `table.field`.
    fn get_new(&mut self, sql: &mut dyn Sql, table: &str, field: &str) -> Result<ListId>;
}

/// Counter-table allocator.
///
/// Requires [`crate::schema::CREATE_LIST_IDS`] to have been applied, which
/// [`crate::schema::Database`] does on open.
#[derive(Debug, Clone, Default)]
pub struct TableListIds;

impl TableListIds {
    /// Creates the allocator; counters live in the database.
    pub fn new() -> Self {
        Self
    }

    /// Highest value currently stored in `table.field`, or 0.
    fn seed(sql: &mut dyn Sql, table: &str, field: &str) -> Result<i64> {
        // NULLs sort first in ascending order, so they are last here.
        let query = SelectQuery::table(table, [field])
            .with_order(vec![(field.to_string(), Direction::Desc)])
            .with_limit(1);

        let rows = sql.select(&query)?;
        let max = rows
            .first()
            .and_then(|row| row.get(field))
            .map(integer_of)
            .transpose()?
            .flatten()
            .unwrap_or(0);
        Ok(max)
    }
}

fn integer_of(value: &Value) -> Result<Option<i64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| Error::Sql(format!("list id {n} is not an integer"))),
        Value::String(s) => s
            .parse()
            .map(Some)
            .map_err(|_| Error::Sql(format!("list id '{s}' is not an integer"))),
        other => Err(Error::Sql(format!("list id {other} is not an integer"))),
    }
}

impl ListIdAllocator for TableListIds {
    fn get_new(&mut self, sql: &mut dyn Sql, table: &str, field: &str) -> Result<ListId> {
        let name = format!("{table}.{field}");
        let by_name = Conditions::new().eq("name", name.as_str());

        let rows = sql.select(
            &SelectQuery::table(LIST_ID_TABLE, ["value"]).with_conditions(by_name.clone()),
        )?;

        let current = match rows.first().and_then(|row| row.get("value")) {
            Some(value) => integer_of(value)?,
            None => None,
        };

        let id = match current {
            Some(last) => {
                let next = ListId::from_raw(last).next();
                let mut values = Map::new();
                values.insert("value".into(), next.into());
                sql.update(LIST_ID_TABLE, &values, &by_name)?;
                next
            }
            None => {
                let next = ListId::from_raw(Self::seed(sql, table, field)?).next();
                sql.insert(
                    LIST_ID_TABLE,
                    &["name".to_string(), "value".to_string()],
                    &[vec![Value::from(name.as_str()), next.into()]],
                )?;
                next
            }
        };

        tracing::debug!(counter = %name, id = %id, "allocated list id");
        Ok(id)
    }
}

// =============================================================================
// Tests
// =============================================================================
