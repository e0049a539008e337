//! # Result Arrangement
//!
//! A SQL LEFT JOIN across a table tree returns one flat row per leaf-level
//! combination. This module folds those rows back into a tree of records and
//! unfolds a tree into rows again.
//!
//! ```text
//! Order.ID  Order.Total  Item.ID  Item.SKU          [{ID: 1, Total: 10, Items: [
//! ────────  ───────────  ───────  ────────              {ID: 1, SKU: "A"},
//!    1          10          1       "A"       ──►       {ID: 2, SKU: "B"}]},
//!    1          10          2       "B"              {ID: 2, Total: 5, Items: []}]
//!    2           5        null     null
//! ```
//!
//! ## Grouping Rules
//!
//! For each JoinSpec node, the rows handed down by the parent group are
//! projected onto the node's own columns and grouped:
//!
//! 1. A projection with only null values contributes no record, so a parent
//!    without child rows gets an empty list instead of one all-null record.
//! 2. Rows with the same primary key belong to the same record. When the
//!    primary key is null the whole projection is the key (strict input only,
//!    see below).
//! 3. Groups keep the order in which they first appear in the input. There
//!    is no secondary sort: callers wanting an order sort the query.
//!
//! Every group then passes its own rows down to each child node, so nesting
//! depth equals JoinSpec depth and no record is shared between parents.
//!
//! ## Strict and Partial Input
//!
//! [`arrange`] is used on query results and fails fast with
//! `Error::MissingColumn` when a declared column is absent. [`arrange_partial`]
//! is used on caller-submitted edits, where absent columns simply mean "not
//! changed": they are left out of the records, and a child group is only
//! produced when the rows mention at least one of its columns.
//!
//! Partial input groups differently. A row belongs to a node whenever it
//! carries any column of the node's subtree, even if the node's own columns
//! are absent or null, so an edit touching only a child still reaches it.
//! Rows without a primary key are new records: each forms its own group, and
//! two identical new rows give two records.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::join::JoinSpec;
use crate::types::{FlatRow, Record, RecordTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Strict,
    Partial,
}

/// A record under construction plus the rows that formed it.
struct Group<'r> {
    record: Record,
    rows: Vec<&'r FlatRow>,
}

// =============================================================================
// Arrange
// =============================================================================

/// Arranges joined rows into a record tree.
///
/// # Errors
///
/// `Error::MissingColumn` if any row lacks a namespaced column declared
/// anywhere in the JoinSpec tree.
///
/// # Example
///
/// ```rust
/// use jointadmin::{arrange, FlatRow, JoinSpec};
/// use serde_json::json;
///
/// let spec = JoinSpec::new("Order").with_fields(["ID", "Total"]);
/// let rows = vec![FlatRow::from_value(json!({"Order.ID": 1, "Order.Total": 10}))?];
///
/// let tree = arrange(&rows, &spec)?;
/// assert_eq!(tree[0].get("Total"), Some(&json!(10)));
/// # Ok::<(), jointadmin::Error>(())
/// ```
pub fn arrange(rows: &[FlatRow], spec: &JoinSpec) -> Result<RecordTree> {
    let columns = spec.columns();

    for row in rows {
        if let Some(missing) = columns.iter().find(|c| row.get(c).is_none()) {
            return Err(Error::MissingColumn {
                column: missing.clone(),
            });
        }
    }

    let refs: Vec<&FlatRow> = rows.iter().collect();
    let tree = arrange_node(&refs, spec, Mode::Strict);

    tracing::debug!(
        table = spec.alias(),
        rows = rows.len(),
        records = tree.len(),
        "arranged joined rows"
    );
    Ok(tree)
}

/// Arranges caller-submitted rows that may cover only some columns.
///
/// Never fails; absent columns are absent from the records.
pub fn arrange_partial(rows: &[FlatRow], spec: &JoinSpec) -> RecordTree {
    let refs: Vec<&FlatRow> = rows.iter().collect();
    arrange_node(&refs, spec, Mode::Partial)
}

fn arrange_node<'r>(rows: &[&'r FlatRow], spec: &JoinSpec, mode: Mode) -> Vec<Record> {
    let mut groups: Vec<Group<'r>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let subtree = match mode {
        Mode::Strict => Vec::new(),
        Mode::Partial => spec.columns(),
    };

    for (position, &row) in rows.iter().enumerate() {
        let projection = project(row, spec);

        let key = match mode {
            Mode::Strict => {
                if projection.values().all(Value::is_null) {
                    continue;
                }
                group_key(&projection, spec)
            }
            Mode::Partial => {
                if !subtree.iter().any(|c| row.get(c).is_some()) {
                    continue;
                }
                match primary_key_of(&projection, spec) {
                    Some(pk) => format!("k{pk}"),
                    None => format!("n{position}"),
                }
            }
        };

        let slot = match index.get(&key) {
            Some(&slot) => slot,
            None => {
                groups.push(Group {
                    record: Record::from_fields(projection),
                    rows: Vec::new(),
                });
                index.insert(key, groups.len() - 1);
                groups.len() - 1
            }
        };
        groups[slot].rows.push(row);
    }

    groups
        .into_iter()
        .map(|group| {
            let mut record = group.record;
            for child in spec.children() {
                if mode == Mode::Partial && !mentions(&group.rows, child) {
                    continue;
                }
                record.set_joint(child.nest_key(), arrange_node(&group.rows, child, mode));
            }
            record
        })
        .collect()
}

/// The node's own fields present in one row.
fn project(row: &FlatRow, spec: &JoinSpec) -> Map<String, Value> {
    spec.fields()
        .iter()
        .filter_map(|field| {
            row.get(&spec.column(field))
                .map(|value| (field.clone(), value.clone()))
        })
        .collect()
}

fn primary_key_of<'p>(projection: &'p Map<String, Value>, spec: &JoinSpec) -> Option<&'p Value> {
    projection.get(spec.primary_key()).filter(|v| !v.is_null())
}

fn group_key(projection: &Map<String, Value>, spec: &JoinSpec) -> String {
    match primary_key_of(projection, spec) {
        Some(pk) => format!("k{pk}"),
        None => {
            let parts: Vec<String> = projection.iter().map(|(f, v)| format!("{f}={v}")).collect();
            format!("r{}", parts.join("\u{1f}"))
        }
    }
}

/// True if any row carries a column of `spec` or its descendants.
fn mentions(rows: &[&FlatRow], spec: &JoinSpec) -> bool {
    let columns = spec.columns();
    rows.iter()
        .any(|row| columns.iter().any(|c| row.get(c).is_some()))
}

// =============================================================================
// Flatten
// =============================================================================

/// Expands a record tree into LEFT JOIN rows.
///
/// Sibling child groups multiply (one row per combination) and an empty group
/// contributes a row of nulls, exactly as the join would. Arranging the
/// result reproduces the tree as long as primary keys are set and unique
/// within each list.
pub fn flatten(tree: &[Record], spec: &JoinSpec) -> Vec<FlatRow> {
    tree.iter()
        .flat_map(|record| flatten_record(record, spec))
        .collect()
}

fn flatten_record(record: &Record, spec: &JoinSpec) -> Vec<FlatRow> {
    let base: FlatRow = spec
        .fields()
        .iter()
        .map(|f| (spec.column(f), record.get(f).cloned().unwrap_or(Value::Null)))
        .collect();

    let mut rows = vec![base];

    for child in spec.children() {
        let child_rows = match record.joint(child.nest_key()) {
            Some(list) if !list.is_empty() => flatten(list, child),
            _ => vec![null_row(child)],
        };

        rows = rows
            .iter()
            .flat_map(|row| {
                child_rows.iter().map(move |child_row| {
                    let mut combined = row.clone();
                    combined.extend(child_row);
                    combined
                })
            })
            .collect();
    }

    rows
}

fn null_row(spec: &JoinSpec) -> FlatRow {
    spec.columns()
        .into_iter()
        .map(|c| (c, Value::Null))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
