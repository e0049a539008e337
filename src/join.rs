//! # Join Specifications
//!
//! A [`JoinSpec`] describes how one table takes part in a join tree: which
//! columns it contributes, how it links to its parent and where its rows are
//! nested inside a parent record.
//!
//! ```text
//! Order (ID, Total, List_ID, Address_ID)
//!  ├── Item    ON Order.List_ID    = Item.List_ID      (1:many, child field)
//!  └── Address ON Order.Address_ID = Address.ID        (1:1, last-insert-id)
//! ```
//!
//! ## Link Fields
//!
//! - `parent_field`: column on the parent row that references this table
//! - `child_field`: column on this table shared by a whole batch of rows (a
//!   "list id"). When absent the parent references this table's primary key
//!   and the key is taken from the database after inserting the single row.
//!
//! ## Lifetime
//!
//! A JoinSpec tree is built once, validated when an orchestrator is created and
//! never mutated during traversal. Ownership of the children makes cycles
//! impossible.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::sql::quote_identifier;
use crate::types::column_name;

/// Default primary key column name.
pub const DEFAULT_PRIMARY_KEY: &str = "ID";

// =============================================================================
// JoinSpec
// =============================================================================

/// One node of an immutable join tree.
///
/// # Example
///
/// ```rust
/// use jointadmin::JoinSpec;
///
/// let spec = JoinSpec::new("Order")
///     .with_fields(["ID", "Total", "List_ID"])
///     .join(
///         JoinSpec::new("Item")
///             .with_fields(["ID", "List_ID", "SKU"])
///             .with_parent_field("List_ID")
///             .with_child_field("List_ID")
///             .with_joint_key("Items"),
///     );
///
/// assert!(spec.validate().is_ok());
/// assert_eq!(spec.children()[0].nest_key(), "Items");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    table_name: String,
    table_alias: String,
    primary_key: String,
    fields: Vec<String>,
    parent_field: Option<String>,
    child_field: Option<String>,
    joint_key: Option<String>,
    admin_managed: bool,
    children: Vec<JoinSpec>,
}

impl JoinSpec {
    /// Starts a spec for `table_name`, aliased as itself with primary key `ID`.
    pub fn new(table_name: impl Into<String>) -> Self {
        let table_name = table_name.into();
        Self {
            table_alias: table_name.clone(),
            table_name,
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            fields: Vec::new(),
            parent_field: None,
            child_field: None,
            joint_key: None,
            admin_managed: true,
            children: Vec::new(),
        }
    }

    // =========================================================================
    // Builder
    // =========================================================================

    /// Sets the SQL alias, which is also the column namespace in joined rows.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.table_alias = alias.into();
        self
    }

    /// Sets the primary key column.
    pub fn with_primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = field.into();
        self
    }

    /// Declares the columns this table contributes to the join.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the column on the parent row that references this table.
    pub fn with_parent_field(mut self, field: impl Into<String>) -> Self {
        self.parent_field = Some(field.into());
        self
    }

    /// Sets the list-id column shared by every row of one batch.
    pub fn with_child_field(mut self, field: impl Into<String>) -> Self {
        self.child_field = Some(field.into());
        self
    }

    /// Sets the key under which this table's rows nest inside the parent.
    pub fn with_joint_key(mut self, key: impl Into<String>) -> Self {
        self.joint_key = Some(key.into());
        self
    }

    /// Marks the table as reference data: read, never validated or written.
    pub fn read_only(mut self) -> Self {
        self.admin_managed = false;
        self
    }

    /// Appends a child table.
    pub fn join(mut self, child: JoinSpec) -> Self {
        self.children.push(child);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// SQL table written to and read from.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Alias in the join and namespace of this table's columns.
    pub fn alias(&self) -> &str {
        &self.table_alias
    }

    /// Primary key column, `ID` unless overridden.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Declared columns, in declaration order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Column on the parent row that joins to this table. `None` on the root.
    pub fn parent_field(&self) -> Option<&str> {
        self.parent_field.as_deref()
    }

    /// List-id column shared by a one-to-many batch.
    pub fn child_field(&self) -> Option<&str> {
        self.child_field.as_deref()
    }

    /// Explicit nesting key, if one was set. See [`JoinSpec::nest_key`].
    pub fn joint_key(&self) -> Option<&str> {
        self.joint_key.as_deref()
    }

    /// False for read-only tables, which are joined but never written.
    pub fn is_admin_managed(&self) -> bool {
        self.admin_managed
    }

    /// Child tables, in join order.
    pub fn children(&self) -> &[JoinSpec] {
        &self.children
    }

    /// Key of this table's group inside a parent record.
    pub fn nest_key(&self) -> &str {
        self.joint_key.as_deref().unwrap_or(&self.table_alias)
    }

    /// True when the parent links through this table's own primary key.
    pub fn is_one_to_one(&self) -> bool {
        self.child_field.is_none()
    }

    /// The column on this table that the parent's `parent_field` joins to.
    pub fn link_field(&self) -> &str {
        self.child_field.as_deref().unwrap_or(&self.primary_key)
    }

    /// Namespaced column for one of this table's fields.
    pub fn column(&self, field: &str) -> String {
        column_name(&self.table_alias, field)
    }

    /// Every namespaced column of the tree, in preorder.
    pub fn columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<String>) {
        out.extend(self.fields.iter().map(|f| self.column(f)));
        for child in &self.children {
            child.collect_columns(out);
        }
    }

    /// Finds a node by alias anywhere in the tree.
    pub fn find(&self, alias: &str) -> Option<&JoinSpec> {
        if self.table_alias == alias {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(alias))
    }

    /// Fields of this table that are assigned by the engine, not the user.
    ///
    /// These are the nesting keys of the children, this table's child field
    /// and every column on this table that a child links through.
    pub fn system_fields(&self) -> Vec<String> {
        let mut out = Vec::new();

        for child in &self.children {
            out.push(child.nest_key().to_string());
            if let Some(parent_field) = child.parent_field() {
                out.push(parent_field.to_string());
            }
        }
        if let Some(child_field) = self.child_field() {
            out.push(child_field.to_string());
        }

        out.dedup();
        out
    }

    /// Columns that a write to this table may set.
    ///
    /// Declared fields plus the link columns the engine fills in, so a parent
    /// row can be written even when its link column is not selected.
    pub fn write_columns(&self) -> Vec<String> {
        let mut out = self.fields.clone();

        let links = self
            .children
            .iter()
            .filter_map(|c| c.parent_field())
            .chain(self.child_field());

        for link in links {
            if !out.iter().any(|f| f == link) {
                out.push(link.to_string());
            }
        }
        out
    }

    // =========================================================================
    // SQL Rendering
    // =========================================================================

    /// Renders the `FROM` clause joining every table of the tree.
    ///
    /// ```text
    /// "Order" AS "Order"
    ///   LEFT JOIN "Item" AS "Item" ON "Order"."List_ID" = "Item"."List_ID"
    /// ```
    pub fn join_clause(&self) -> String {
        let mut sql = format!(
            "{} AS {}",
            quote_identifier(&self.table_name),
            quote_identifier(&self.table_alias)
        );
        self.push_joins(&mut sql);
        sql
    }

    fn push_joins(&self, sql: &mut String) {
        for child in &self.children {
            let parent_field = child.parent_field().unwrap_or(&self.primary_key);
            sql.push_str(&format!(
                " LEFT JOIN {} AS {} ON {}.{} = {}.{}",
                quote_identifier(&child.table_name),
                quote_identifier(&child.table_alias),
                quote_identifier(&self.table_alias),
                quote_identifier(parent_field),
                quote_identifier(&child.table_alias),
                quote_identifier(child.link_field()),
            ));
            child.push_joins(sql);
        }
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Checks the tree for configuration mistakes.
    ///
    /// # Errors
    ///
    /// `Error::InvalidJoinSpec` naming the first offending table.
    pub fn validate(&self) -> Result<()> {
        let mut aliases = HashSet::new();
        self.validate_node(true, &mut aliases)
    }

    fn validate_node<'a>(&'a self, is_root: bool, aliases: &mut HashSet<&'a str>) -> Result<()> {
        let fail = |reason: String| Error::InvalidJoinSpec {
            table: self.table_alias.clone(),
            reason,
        };

        if self.table_alias.is_empty() || self.table_alias.contains('.') {
            return Err(fail("alias must be non-empty and contain no '.'".into()));
        }
        if !aliases.insert(&self.table_alias) {
            return Err(fail("alias is used more than once in the tree".into()));
        }
        if self.fields.is_empty() {
            return Err(fail("no fields declared".into()));
        }
        if !self.fields.contains(&self.primary_key) {
            return Err(fail(format!(
                "primary key '{}' is not a declared field",
                self.primary_key
            )));
        }
        if !is_root && self.parent_field.is_none() {
            return Err(fail("child table has no parent field".into()));
        }
        if let Some(child_field) = &self.child_field {
            if !self.fields.contains(child_field) {
                return Err(fail(format!(
                    "child field '{child_field}' is not a declared field"
                )));
            }
        }

        let mut nest_keys = HashSet::new();
        for child in &self.children {
            let key = child.nest_key();
            if !nest_keys.insert(key) {
                return Err(fail(format!("two children nest under '{key}'")));
            }
            if self.fields.iter().any(|f| f == key) {
                return Err(fail(format!("nest key '{key}' collides with a field")));
            }
            child.validate_node(false, aliases)?;
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
