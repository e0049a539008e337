//! # Domain Types for JointAdmin
//!
//! This module defines the data shapes that flow between SQL, the arranger,
//! the recursion engine and the orchestrator.
//!
//! ```text
//!   SQL join result                 arranged tree
//!   ┌───────────────────────────┐   ┌────────────────────────────────┐
//!   │ FlatRow {"Order.ID": 1,   │   │ Record {ID: 1, Total: 10}      │
//!   │          "Item.ID": 7 ..} │──►│   └── "Items": [Record {ID: 7}]│
//!   │ FlatRow {...}             │   │ Record {...}                   │
//!   └───────────────────────────┘   └────────────────────────────────┘
//! ```
//!
//! ## Design Philosophy: Values are JSON
//!
//! Scalar values are `serde_json::Value`. SQLite columns map onto it without
//! loss (integer, real, text, null; blobs as base64 text) and records can be
//! persisted in a draft store as-is.
//!
//! ## Invariants
//!
//! - A [`Record`] belongs to exactly one parent group; trees are never shared
//! - Child groups are always lists, possibly empty (LEFT JOIN semantics)

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::join::JoinSpec;

// =============================================================================
// Columns
// =============================================================================

/// Builds the namespaced column name `alias.field` used in joined rows.
pub fn column_name(alias: &str, field: &str) -> String {
    format!("{alias}.{field}")
}

/// Splits a namespaced column into `(Some(alias), field)`.
///
/// Plain field names return `(None, field)`.
pub fn split_column(column: &str) -> (Option<&str>, &str) {
    match column.split_once('.') {
        Some((alias, field)) => (Some(alias), field),
        None => (None, column),
    }
}

// =============================================================================
// Records
// =============================================================================

/// One table row plus the groups of child rows joined to it.
///
/// # Structure
///
/// - `fields`: the table's own columns, in declaration order
/// - `joints`: one list of child records per child JoinSpec, keyed by the
///   child's nesting key (its joint key, or its alias when it has none)
///
/// # Rust Pattern: Typed Joint Data
///
/// Joint data lives in its own map rather than mixed into `fields`. A child
/// group can therefore never be mistaken for a column value, and the caller
/// facing JSON shape is produced on demand by [`Record::to_value`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: Map<String, Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    joints: BTreeMap<String, Vec<Record>>,
}

/// A list of top-level records, each carrying its nested joint data.
pub type RecordTree = Vec<Record>;

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record from an already projected field map.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            joints: BTreeMap::new(),
        }
    }

    /// Adds a field (builder pattern).
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Adds a child group (builder pattern).
    pub fn with_joint(mut self, key: impl Into<String>, records: Vec<Record>) -> Self {
        self.joints.insert(key.into(), records);
        self
    }

    /// Returns a field value, if set.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns a field value only when it is set and not null.
    pub fn get_non_null(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    /// Sets a field, replacing any previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Removes a field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// The record's own columns.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Child group under `key`, if present.
    pub fn joint(&self, key: &str) -> Option<&Vec<Record>> {
        self.joints.get(key)
    }

    /// Mutable child group under `key`, if present.
    pub fn joint_mut(&mut self, key: &str) -> Option<&mut Vec<Record>> {
        self.joints.get_mut(key)
    }

    /// Child group under `key`, created empty when missing.
    pub fn joint_entry(&mut self, key: &str) -> &mut Vec<Record> {
        self.joints.entry(key.to_string()).or_default()
    }

    /// Replaces the child group under `key`.
    pub fn set_joint(&mut self, key: impl Into<String>, records: Vec<Record>) {
        self.joints.insert(key.into(), records);
    }

    /// Takes the child group under `key` out of the record.
    pub fn take_joint(&mut self, key: &str) -> Option<Vec<Record>> {
        self.joints.remove(key)
    }

    /// All child groups.
    pub fn joints(&self) -> &BTreeMap<String, Vec<Record>> {
        &self.joints
    }

    /// Splits the record into its fields and child groups.
    pub fn into_parts(self) -> (Map<String, Value>, BTreeMap<String, Vec<Record>>) {
        (self.fields, self.joints)
    }

    /// Returns true if the record carries no data at all.
    ///
    /// A record is blank when every field is null and every child group is
    /// empty or holds only blank records. Placeholders created for one-to-one
    /// slots stay blank until the user fills them in; an empty string counts
    /// as filled in.
    pub fn is_blank(&self) -> bool {
        let fields_blank = self.fields.values().all(Value::is_null);

        fields_blank && self.joints.values().flatten().all(Record::is_blank)
    }

    // =========================================================================
    // Caller-Facing JSON Shape
    // =========================================================================

    /// Renders the record as a JSON object with children nested by `spec`.
    ///
    /// ```text
    /// {"ID": 1, "Total": 10, "Items": [{"ID": 7, "SKU": "A"}]}
    /// ```
    pub fn to_value(&self, spec: &JoinSpec) -> Value {
        let mut obj = self.fields.clone();

        for child in spec.children() {
            if let Some(records) = self.joints.get(child.nest_key()) {
                let nested = records.iter().map(|r| r.to_value(child)).collect();
                obj.insert(child.nest_key().to_string(), Value::Array(nested));
            }
        }

        Value::Object(obj)
    }

    /// Parses the nested JSON shape produced by [`Record::to_value`].
    ///
    /// # Errors
    ///
    /// - `Error::InvalidRecord` if `value` is not an object
    /// - `Error::NotArray` if a child nesting key does not hold an array
    pub fn from_value(value: &Value, spec: &JoinSpec) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            Error::InvalidRecord(format!("expected an object for '{}'", spec.alias()))
        })?;

        let mut record = Record::new();

        for (key, value) in obj {
            match spec.children().iter().find(|c| c.nest_key() == key) {
                Some(child) => {
                    let items = value.as_array().ok_or_else(|| Error::NotArray {
                        table: spec.alias().to_string(),
                        key: key.clone(),
                    })?;

                    let records = items
                        .iter()
                        .map(|item| Record::from_value(item, child))
                        .collect::<Result<Vec<_>>>()?;
                    record.set_joint(key.clone(), records);
                }
                None => record.set(key.clone(), value.clone()),
            }
        }

        Ok(record)
    }
}

// =============================================================================
// Flat Rows
// =============================================================================

/// One row of a joined query, keyed by namespaced column (`alias.field`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatRow(Map<String, Value>);

impl FlatRow {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a row from a JSON object.
    ///
    /// # Errors
    ///
    /// `Error::InvalidRecord` if `value` is not an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::InvalidRecord(format!(
                "flat row must be an object, got {other}"
            ))),
        }
    }

    /// Returns the value of a namespaced column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Sets a namespaced column.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    /// Iterates over `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Extends this row with another row's columns (used by flattening).
    pub(crate) fn extend(&mut self, other: &FlatRow) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

impl FromIterator<(String, Value)> for FlatRow {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// =============================================================================
// Match Conditions
// =============================================================================

/// Equality conditions, AND-ed together, used to match rows.
///
/// Columns may be plain (`ID`) or namespaced (`Order.ID`). A null value
/// matches with `IS NULL`.
///
/// # Example
///
/// ```rust
/// use jointadmin::types::Conditions;
///
/// let by_id = Conditions::new().eq("Order.ID", 42);
/// assert_eq!(by_id.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conditions(Vec<(String, Value)>);

impl Conditions {
    /// No conditions (matches everything in a select).
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `column = value` condition (builder pattern).
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push((column.into(), value.into()));
        self
    }

    /// Adds a condition in place.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.push((column.into(), value.into()));
    }

    /// Iterates over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// Number of conditions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no conditions.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Prefixes every plain column with `alias`.
    ///
    /// Lets callers write `eq("ID", 1)` against the root table of a join.
    pub fn qualified(&self, alias: &str) -> Self {
        Self(
            self.0
                .iter()
                .map(|(column, value)| match split_column(column) {
                    (Some(_), _) => (column.clone(), value.clone()),
                    (None, field) => (column_name(alias, field), value.clone()),
                })
                .collect(),
        )
    }
}

// =============================================================================
// List Identifiers
// =============================================================================

/// A surrogate key shared by every row of one child batch.
///
/// # Rust Pattern: Newtype
///
/// A list id is stored in an ordinary integer column, but keeping it in its
/// own type stops it being confused with per-row auto-increment ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListId(i64);

impl ListId {
    /// Creates a ListId from a raw value.
    pub fn from_raw(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value for database storage.
    pub fn as_raw(&self) -> i64 {
        self.0
    }

    /// Returns the next id in sequence.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ListId> for Value {
    fn from(id: ListId) -> Self {
        Value::from(id.0)
    }
}

// =============================================================================
// Tests
// =============================================================================
