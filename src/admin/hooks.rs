//! Hook sets the orchestrator runs through [`crate::recursion::recurse`].
//!
//! ```text
//! validate   BreadthFirstRecord    check the root and each non-blank, admin-managed record
//! write      DepthFirstData        insert (or update the root) list by list
//!            DepthFirstParentEdge  copy the child's key into the parent link
//! delete     DepthFirstData        delete rows by primary key, leaves first
//! ```

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::join::JoinSpec;
use crate::list_ids::ListIdAllocator;
use crate::recursion::{CallbackSet, Phase};
use crate::sql::Sql;
use crate::types::{Conditions, Record};
use crate::validate::{Failure, Validator};

// =============================================================================
// Validation Pass
// =============================================================================

pub(crate) struct ValidateContext<'a> {
    pub validator: &'a mut dyn Validator,
    pub root_alias: String,
    pub failures: Vec<Failure>,
}

pub(crate) fn validate_callbacks<'a>() -> CallbackSet<ValidateContext<'a>> {
    CallbackSet::new().on_record(Phase::BreadthFirstRecord, validate_record)
}

fn validate_record(ctx: &mut ValidateContext<'_>, record: &mut Record, spec: &JoinSpec) -> Result<()> {
    // Untouched placeholders are not written, so they are not checked. The
    // root is always written and always checked.
    let is_root = spec.alias() == ctx.root_alias;
    if !spec.is_admin_managed() || (!is_root && record.is_blank()) {
        return Ok(());
    }

    let ignored = spec.system_fields();
    if !ctx.validator.is_valid(spec.alias(), record, &ignored) {
        ctx.failures.extend(ctx.validator.failures());
    }
    Ok(())
}

// =============================================================================
// Write Pass
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    /// Every row is inserted.
    Insert,

    /// The root row is updated by `root_key`; everything below is inserted.
    Update,
}

pub(crate) struct WriteContext<'a> {
    pub sql: &'a mut dyn Sql,
    pub list_ids: &'a mut dyn ListIdAllocator,
    pub mode: WriteMode,
    pub root_alias: String,

    /// Primary key of the root row being updated.
    pub root_key: Option<Value>,
}

pub(crate) fn write_callbacks<'a>() -> CallbackSet<WriteContext<'a>> {
    CallbackSet::new()
        .on_data(Phase::DepthFirstData, write_list)
        .on_record(Phase::DepthFirstParentEdge, feed_back_key)
}

/// Writes one list of sibling records.
///
/// Runs after every child list below it has been written and its keys fed
/// back, so the link columns of these rows are already filled in.
fn write_list(ctx: &mut WriteContext<'_>, data: &mut Vec<Record>, spec: &JoinSpec) -> Result<()> {
    if !spec.is_admin_managed() {
        return Ok(());
    }

    let is_root = spec.alias() == ctx.root_alias;
    if is_root && ctx.mode == WriteMode::Update {
        return update_root(ctx, data, spec);
    }

    // Untouched placeholders are not rows. The root is always written.
    let live: Vec<usize> = (0..data.len())
        .filter(|&i| is_root || !data[i].is_blank())
        .collect();
    if live.is_empty() {
        return Ok(());
    }

    let mut columns = spec.write_columns();
    let pk = spec.primary_key();
    if live.iter().all(|&i| data[i].get_non_null(pk).is_none()) {
        columns.retain(|c| c != pk);
    }

    match spec.child_field() {
        Some(child_field) => {
            let existing = live
                .iter()
                .find_map(|&i| data[i].get_non_null(child_field).cloned());

            let list_id = match existing {
                Some(id) => id,
                None => Value::from(ctx.list_ids.get_new(
                    &mut *ctx.sql,
                    spec.table_name(),
                    child_field,
                )?),
            };

            for &i in &live {
                data[i].set(child_field, list_id.clone());
            }

            let rows: Vec<Vec<Value>> = live.iter().map(|&i| row_values(&data[i], &columns)).collect();
            ctx.sql.insert(spec.table_name(), &columns, &rows)?;

            tracing::debug!(
                table = spec.table_name(),
                rows = rows.len(),
                list_id = %list_id,
                "inserted list"
            );
        }
        None => {
            if !is_root && live.len() > 1 {
                return Err(Error::ChildFieldCardinality {
                    table: spec.alias().to_string(),
                    rows: live.len(),
                });
            }

            for &i in &live {
                let row = row_values(&data[i], &columns);
                ctx.sql.insert(spec.table_name(), &columns, &[row])?;

                if data[i].get_non_null(pk).is_none() {
                    let key = ctx.sql.last_insert_id(pk)?;
                    data[i].set(pk, key);
                }
            }

            tracing::debug!(table = spec.table_name(), rows = live.len(), "inserted rows");
        }
    }

    Ok(())
}

fn update_root(ctx: &mut WriteContext<'_>, data: &mut [Record], spec: &JoinSpec) -> Result<()> {
    let key = ctx
        .root_key
        .clone()
        .ok_or(Error::NoDraft { what: "snapshot key" })?;
    let pk = spec.primary_key();

    for record in data.iter_mut() {
        // Columns the record does not carry keep their stored value.
        let values: Map<String, Value> = spec
            .write_columns()
            .into_iter()
            .filter(|c| c != pk)
            .filter_map(|c| record.get(&c).cloned().map(|v| (c, v)))
            .collect();

        let changed = ctx
            .sql
            .update(spec.table_name(), &values, &Conditions::new().eq(pk, key.clone()))?;
        record.set(pk, key.clone());

        tracing::debug!(table = spec.table_name(), changed, "updated root row");
    }

    Ok(())
}

/// Copies the key of a written child list into the parent's link column.
///
/// A parent whose child list holds no rows gets a null link.
fn feed_back_key(_ctx: &mut WriteContext<'_>, record: &mut Record, child: &JoinSpec) -> Result<()> {
    if !child.is_admin_managed() {
        return Ok(());
    }
    let Some(parent_field) = child.parent_field() else {
        return Ok(());
    };

    let live: Vec<&Record> = record
        .joint(child.nest_key())
        .map(|list| list.iter().filter(|r| !r.is_blank()).collect())
        .unwrap_or_default();

    if child.is_one_to_one() && live.len() > 1 {
        return Err(Error::ChildFieldCardinality {
            table: child.alias().to_string(),
            rows: live.len(),
        });
    }

    let key = live
        .first()
        .and_then(|r| r.get_non_null(child.link_field()))
        .cloned()
        .unwrap_or(Value::Null);

    record.set(parent_field, key);
    Ok(())
}

fn row_values(record: &Record, columns: &[String]) -> Vec<Value> {
    columns
        .iter()
        .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
        .collect()
}

// =============================================================================
// Delete Pass
// =============================================================================

pub(crate) struct DeleteContext<'a> {
    pub sql: &'a mut dyn Sql,
    pub root_alias: String,

    /// False when only the subtrees below the root are removed.
    pub include_root: bool,
}

pub(crate) fn delete_callbacks<'a>() -> CallbackSet<DeleteContext<'a>> {
    CallbackSet::new().on_data(Phase::DepthFirstData, delete_list)
}

fn delete_list(ctx: &mut DeleteContext<'_>, data: &mut Vec<Record>, spec: &JoinSpec) -> Result<()> {
    if !spec.is_admin_managed() || (!ctx.include_root && spec.alias() == ctx.root_alias) {
        return Ok(());
    }

    let pk = spec.primary_key();
    let mut removed = 0;

    for record in data.iter() {
        if let Some(key) = record.get_non_null(pk) {
            removed += ctx
                .sql
                .delete(spec.table_name(), &Conditions::new().eq(pk, key.clone()))?;
        }
    }

    tracing::debug!(table = spec.table_name(), removed, "deleted rows");
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
