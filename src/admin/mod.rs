//! # JointAdmin: Multi-Table CRUD Orchestrator
//!
//! [`JointAdmin`] drives a create/edit/delete session over one JoinSpec tree.
//! A draft record lives in a [`DraftStore`] between user interactions and is
//! written to every table of the tree in a single transaction.
//!
//! ## Edit Session
//!
//! ```text
//!          create_new()                 add()
//!   Idle ──────────────► Creating ─────────────► Idle
//!     │     edit(match)              modify()
//!     ├─────────────────► Editing  ─────────────► Idle
//!     │  delete_request(match)       delete_confirm()
//!     └─────────────────► ConfirmingDelete ─────► Idle
//!
//!   cancel() returns to Idle from anywhere without writing.
//! ```
//!
//! ## Write Order
//!
//! A parent row references its children (`parent_field`), so children are
//! written first. The write pass runs on the recursion engine:
//!
//! ```text
//! DepthFirstData        insert a sibling list once everything below it is written
//!                         child-field tables: one list id per list, stamped on each row
//!                         one-to-one tables:  single row, key from last_insert_id
//! DepthFirstParentEdge  copy the written child's key into the parent's link column
//! ```
//!
//! ## Failure Handling
//!
//! | Failure | Transaction | Draft | Result |
//! |---------|-------------|-------|--------|
//! | validation | never opened | kept | `Ok(ValidationFailed)`, failures in [`Messages`] |
//! | persistence | rolled back | kept | `Ok(PersistenceFailed)`, generic failure, detail logged |
//! | contract | rolled back | kept | `Err(..)` |
//!
//! Writes run on a copy of the stored draft, so a failed operation leaves the
//! session exactly as it was and the user can retry.

mod hooks;
mod merge;

use std::fmt;
use std::mem;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::arrange::{arrange, arrange_partial};
use crate::error::{Error, Result};
use crate::join::JoinSpec;
use crate::list_ids::{ListIdAllocator, TableListIds};
use crate::messages::{Message, Messages};
use crate::recursion::recurse;
use crate::sql::{SelectQuery, Sql};
use crate::store::DraftStore;
use crate::types::{Conditions, FlatRow, Record, RecordTree};
use crate::validate::{RuleValidator, Validator};

use hooks::{DeleteContext, ValidateContext, WriteContext, WriteMode};

// =============================================================================
// Configuration
// =============================================================================

/// Orchestrator settings.
///
/// Every field has a default, so a config file only lists what it changes:
///
/// ```rust
/// use jointadmin::AdminConfig;
///
/// let config: AdminConfig = serde_json::from_str(r#"{"added": "Order saved"}"#).unwrap();
/// assert_eq!(config.added, "Order saved");
/// assert_eq!(config.draft_prefix, "jointadmin.");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Prepended to every draft-store key.
    pub draft_prefix: String,

    pub add_failed: String,
    pub modify_failed: String,
    pub delete_failed: String,
    pub nothing_to_delete: String,

    pub added: String,
    pub modified: String,
    pub deleted: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            draft_prefix: "jointadmin.".to_string(),
            add_failed: "The record could not be added.".to_string(),
            modify_failed: "The record could not be saved.".to_string(),
            delete_failed: "The record could not be deleted.".to_string(),
            nothing_to_delete: "No matching record was found.".to_string(),
            added: "The record was added.".to_string(),
            modified: "The record was saved.".to_string(),
            deleted: "The record was deleted.".to_string(),
        }
    }
}

// =============================================================================
// Session Types
// =============================================================================

/// Where an edit session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditState {
    #[default]
    Idle,
    Creating,
    Editing,
    ConfirmingDelete,
}

impl fmt::Display for EditState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EditState::Idle => "idle",
            EditState::Creating => "creating",
            EditState::Editing => "editing",
            EditState::ConfirmingDelete => "confirming delete",
        };
        f.write_str(s)
    }
}

/// Result of a write operation that did not fail with a contract error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Committed,

    /// The draft did not pass validation; nothing was written.
    ValidationFailed,

    /// The database rejected a statement; everything was rolled back.
    PersistenceFailed,
}

impl WriteOutcome {
    /// True if the write reached the database.
    pub fn is_committed(&self) -> bool {
        matches!(self, WriteOutcome::Committed)
    }
}

const KEY_STATE: &str = "state";
const KEY_CURRENT: &str = "current";
const KEY_SNAPSHOT: &str = "snapshot";
const KEY_DELETE: &str = "delete";

// =============================================================================
// JointAdmin
// =============================================================================

/// Create, edit and delete records spanning a JoinSpec tree.
///
/// # Example
///
/// ```rust
/// use jointadmin::{Database, JointAdmin, JoinSpec, MemoryDraftStore, WriteOutcome};
/// use jointadmin::types::{Conditions, FlatRow};
/// use serde_json::json;
///
/// let db = Database::open_in_memory()?;
/// db.execute_batch(
///     r#"CREATE TABLE "Order" (ID INTEGER PRIMARY KEY, Total INTEGER, List_ID INTEGER);
///        CREATE TABLE Item (ID INTEGER PRIMARY KEY, List_ID INTEGER, SKU TEXT);"#,
/// )?;
///
/// let spec = JoinSpec::new("Order").with_fields(["ID", "Total"]).join(
///     JoinSpec::new("Item")
///         .with_fields(["ID", "List_ID", "SKU"])
///         .with_parent_field("List_ID")
///         .with_child_field("List_ID")
///         .with_joint_key("Items"),
/// );
///
/// let mut admin = JointAdmin::new(spec, db.into_sql(), MemoryDraftStore::new())?;
/// admin.create_new()?;
/// admin.update_current_record(&[
///     FlatRow::from_value(json!({"Order.Total": 10, "Item.SKU": "A"}))?,
///     FlatRow::from_value(json!({"Order.Total": 10, "Item.SKU": "B"}))?,
/// ])?;
/// assert_eq!(admin.add()?, WriteOutcome::Committed);
///
/// let orders = admin.read(&Conditions::new().eq("Total", 10))?;
/// assert_eq!(orders[0].joint("Items").map(Vec::len), Some(2));
/// # Ok::<(), jointadmin::Error>(())
/// ```
pub struct JointAdmin<S: Sql, D: DraftStore> {
    spec: JoinSpec,
    sql: S,
    store: D,
    list_ids: Box<dyn ListIdAllocator>,
    validator: Box<dyn Validator>,
    messages: Messages,
    config: AdminConfig,
}

impl<S: Sql, D: DraftStore> JointAdmin<S, D> {
    /// Creates an orchestrator with counter-table list ids and no validation
    /// rules.
    ///
    /// # Errors
    ///
    /// `Error::InvalidJoinSpec` if the tree is inconsistent.
    pub fn new(spec: JoinSpec, sql: S, store: D) -> Result<Self> {
        spec.validate()?;

        Ok(Self {
            spec,
            sql,
            store,
            list_ids: Box::new(TableListIds::new()),
            validator: Box::new(RuleValidator::new()),
            messages: Messages::new(),
            config: AdminConfig::default(),
        })
    }

    /// Replaces the configuration (builder pattern).
    pub fn with_config(mut self, config: AdminConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the validator (builder pattern).
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    /// Replaces the list id allocator (builder pattern).
    pub fn with_list_ids(mut self, list_ids: impl ListIdAllocator + 'static) -> Self {
        self.list_ids = Box::new(list_ids);
        self
    }

    /// The JoinSpec tree this orchestrator edits.
    pub fn spec(&self) -> &JoinSpec {
        &self.spec
    }

    /// Current settings.
    pub fn config(&self) -> &AdminConfig {
        &self.config
    }

    /// The SQL backend.
    pub fn sql(&self) -> &S {
        &self.sql
    }

    /// The draft store.
    pub fn store(&self) -> &D {
        &self.store
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Reads every record matching `conditions`, arranged as a tree.
    ///
    /// Plain column names refer to the root table; namespaced ones
    /// (`Item.SKU`) may filter on any table of the tree.
    pub fn read(&mut self, conditions: &Conditions) -> Result<RecordTree> {
        let query = SelectQuery::join(&self.spec).with_conditions(conditions.qualified(self.spec.alias()));
        let rows = self.sql.select(&query)?;
        arrange(&rows, &self.spec)
    }

    /// Reads every record of the tree.
    pub fn read_all(&mut self) -> Result<RecordTree> {
        self.read(&Conditions::new())
    }

    // =========================================================================
    // Drafts
    // =========================================================================

    /// Starts a new draft shaped by the tree: null fields, one blank record
    /// in every one-to-one slot and an empty list in every one-to-many slot.
    ///
    /// Any draft of an earlier session is discarded.
    pub fn create_new(&mut self) -> Result<Record> {
        let draft = blank_record(&self.spec);

        self.store_record(KEY_CURRENT, &draft)?;
        self.unset(KEY_SNAPSHOT);
        self.unset(KEY_DELETE);
        self.set_state(EditState::Creating)?;

        tracing::debug!(table = self.spec.alias(), "created new draft");
        Ok(draft)
    }

    /// Loads the single record matching `conditions` as the draft.
    ///
    /// # Errors
    ///
    /// `Error::AmbiguousMatch` unless exactly one record matches.
    pub fn edit(&mut self, conditions: &Conditions) -> Result<Record> {
        let mut tree = self.read(conditions)?;
        if tree.len() != 1 {
            return Err(Error::AmbiguousMatch {
                table: self.spec.alias().to_string(),
                count: tree.len(),
            });
        }
        let record = tree.remove(0);

        self.store_record(KEY_CURRENT, &record)?;
        self.store_record(KEY_SNAPSHOT, &record)?;
        self.unset(KEY_DELETE);
        self.set_state(EditState::Editing)?;

        tracing::debug!(table = self.spec.alias(), "loaded record for editing");
        Ok(record)
    }

    /// Merges caller-submitted rows into the draft and returns the result.
    ///
    /// Rows use the namespaced columns of a join result but may cover only
    /// the columns that changed.
    pub fn update_current_record(&mut self, rows: &[FlatRow]) -> Result<Record> {
        self.require_draft_state("update the current record")?;

        let mut current = self.load_record(KEY_CURRENT, "current record")?;
        for partial in arrange_partial(rows, &self.spec) {
            merge::merge_record(&mut current, partial, &self.spec);
        }

        self.store_record(KEY_CURRENT, &current)?;
        Ok(current)
    }

    /// Replaces the draft wholesale, e.g. with a record parsed by
    /// [`Record::from_value`].
    pub fn replace_current_record(&mut self, record: Record) -> Result<()> {
        self.require_draft_state("replace the current record")?;
        self.store_record(KEY_CURRENT, &record)
    }

    /// The draft, if a session is creating or editing one.
    pub fn current_record(&self) -> Result<Option<Record>> {
        self.store
            .get(&self.key(KEY_CURRENT))
            .map(serde_json::from_value::<Record>)
            .transpose()
            .map_err(Error::from)
    }

    /// Where the session stands; `Idle` when nothing is stored.
    pub fn state(&self) -> Result<EditState> {
        match self.store.get(&self.key(KEY_STATE)) {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(EditState::Idle),
        }
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Inserts the draft into every table of the tree.
    pub fn add(&mut self) -> Result<WriteOutcome> {
        self.require_state(EditState::Creating, "add")?;
        let draft = self.load_record(KEY_CURRENT, "current record")?;

        if !self.validate(&draft)? {
            return Ok(WriteOutcome::ValidationFailed);
        }

        let result = self.transact(|admin| admin.write(draft, WriteMode::Insert, None));
        let failed_text = self.config.add_failed.clone();

        match self.finish("Add", result, &failed_text)? {
            Some(tree) => {
                self.end_session()?;
                let text = self.config.added.clone();
                self.messages.add_notification(Message::new("Add", text));

                tracing::info!(
                    table = self.spec.alias(),
                    key = %root_key(&tree, &self.spec),
                    "record added"
                );
                Ok(WriteOutcome::Committed)
            }
            None => Ok(WriteOutcome::PersistenceFailed),
        }
    }

    /// Saves the edited draft over the record it was loaded from.
    ///
    /// In one transaction the child rows loaded by [`JointAdmin::edit`] are
    /// deleted, the root row is updated in place and the draft's child rows
    /// are inserted again. Rows that already had keys keep them, and existing
    /// list ids are reused.
    pub fn modify(&mut self) -> Result<WriteOutcome> {
        self.require_state(EditState::Editing, "modify")?;
        let draft = self.load_record(KEY_CURRENT, "current record")?;
        let snapshot = self.load_record(KEY_SNAPSHOT, "snapshot")?;

        if !self.validate(&draft)? {
            return Ok(WriteOutcome::ValidationFailed);
        }

        let key = snapshot
            .get_non_null(self.spec.primary_key())
            .cloned()
            .ok_or(Error::NoDraft { what: "snapshot key" })?;

        let result = self.transact(|admin| {
            admin.delete(vec![snapshot], false)?;
            admin.write(draft, WriteMode::Update, Some(key))
        });
        let failed_text = self.config.modify_failed.clone();

        match self.finish("Modify", result, &failed_text)? {
            Some(tree) => {
                self.end_session()?;
                let text = self.config.modified.clone();
                self.messages.add_notification(Message::new("Modify", text));

                tracing::info!(
                    table = self.spec.alias(),
                    key = %root_key(&tree, &self.spec),
                    "record modified"
                );
                Ok(WriteOutcome::Committed)
            }
            None => Ok(WriteOutcome::PersistenceFailed),
        }
    }

    // =========================================================================
    // Deleting
    // =========================================================================

    /// Looks up the records to delete and asks for confirmation.
    ///
    /// Returns how many top-level records await confirmation. With no match a
    /// failure is recorded and the session stays idle.
    pub fn delete_request(&mut self, conditions: &Conditions) -> Result<usize> {
        let tree = self.read(conditions)?;

        if tree.is_empty() {
            let text = self.config.nothing_to_delete.clone();
            self.messages.add_failure(Message::new("Delete", text));
            self.unset(KEY_DELETE);
            self.set_state(EditState::Idle)?;
            return Ok(0);
        }

        let key = self.key(KEY_DELETE);
        self.store.set(&key, serde_json::to_value(&tree)?);
        self.unset(KEY_CURRENT);
        self.unset(KEY_SNAPSHOT);
        self.set_state(EditState::ConfirmingDelete)?;

        Ok(tree.len())
    }

    /// Deletes the records stored by [`JointAdmin::delete_request`],
    /// children before parents.
    pub fn delete_confirm(&mut self) -> Result<WriteOutcome> {
        self.require_state(EditState::ConfirmingDelete, "confirm a delete")?;

        let value = self
            .store
            .get(&self.key(KEY_DELETE))
            .ok_or(Error::NoDraft { what: "delete request" })?;
        let tree: RecordTree = serde_json::from_value(value)?;
        let count = tree.len();

        let result = self.transact(|admin| admin.delete(tree, true));
        let failed_text = self.config.delete_failed.clone();

        match self.finish("Delete", result, &failed_text)? {
            Some(()) => {
                self.end_session()?;
                let text = self.config.deleted.clone();
                self.messages.add_notification(Message::new("Delete", text));

                tracing::info!(table = self.spec.alias(), records = count, "records deleted");
                Ok(WriteOutcome::Committed)
            }
            None => Ok(WriteOutcome::PersistenceFailed),
        }
    }

    /// Abandons the session without writing.
    ///
    /// Only this orchestrator's keys are removed; other sessions sharing the
    /// store under a different prefix are left alone.
    pub fn cancel(&mut self) -> Result<()> {
        self.end_session()?;
        tracing::debug!(table = self.spec.alias(), "edit session cancelled");
        Ok(())
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Messages collected since the last [`JointAdmin::take_messages`].
    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    /// Returns the collected messages and starts a fresh list.
    pub fn take_messages(&mut self) -> Messages {
        mem::take(&mut self.messages)
    }

    // =========================================================================
    // Passes
    // =========================================================================

    /// Runs the validator over the draft; failures go to the message sink.
    fn validate(&mut self, draft: &Record) -> Result<bool> {
        let mut ctx = ValidateContext {
            validator: self.validator.as_mut(),
            root_alias: self.spec.alias().to_string(),
            failures: Vec::new(),
        };
        recurse(&hooks::validate_callbacks(), &mut ctx, vec![draft.clone()], &self.spec)?;

        if ctx.failures.is_empty() {
            return Ok(true);
        }

        tracing::warn!(
            table = self.spec.alias(),
            failures = ctx.failures.len(),
            "draft failed validation"
        );
        for failure in ctx.failures {
            self.messages.add_failure(failure.into());
        }
        Ok(false)
    }

    fn write(&mut self, draft: Record, mode: WriteMode, root_key: Option<Value>) -> Result<RecordTree> {
        let mut ctx = WriteContext {
            sql: &mut self.sql,
            list_ids: self.list_ids.as_mut(),
            mode,
            root_alias: self.spec.alias().to_string(),
            root_key,
        };
        recurse(&hooks::write_callbacks(), &mut ctx, vec![draft], &self.spec)
    }

    fn delete(&mut self, tree: RecordTree, include_root: bool) -> Result<()> {
        let mut ctx = DeleteContext {
            sql: &mut self.sql,
            root_alias: self.spec.alias().to_string(),
            include_root,
        };
        recurse(&hooks::delete_callbacks(), &mut ctx, tree, &self.spec)?;
        Ok(())
    }

    /// Runs `op` inside a transaction, rolling back on any error.
    fn transact<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.sql.begin_transaction()?;

        let result = op(self).and_then(|value| {
            self.sql.commit()?;
            Ok(value)
        });

        if let Err(err) = &result {
            if let Err(rollback_err) = self.sql.roll_back() {
                tracing::error!(error = %rollback_err, "rollback failed");
            }
            tracing::warn!(table = self.spec.alias(), error = %err, "transaction rolled back");
        }

        result
    }

    /// Turns a persistence error into a recorded failure (`Ok(None)`).
    /// Contract errors are returned as they are.
    fn finish<T>(&mut self, title: &str, result: Result<T>, failed_text: &str) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_persistence() => {
                tracing::error!(
                    table = self.spec.alias(),
                    operation = title,
                    error = %err,
                    "write failed"
                );
                self.messages.add_failure(Message::new(title, failed_text));
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    // =========================================================================
    // Draft Store Helpers
    // =========================================================================

    fn key(&self, name: &str) -> String {
        format!("{}{name}", self.config.draft_prefix)
    }

    fn unset(&mut self, name: &str) {
        let key = self.key(name);
        self.store.unset(&key);
    }

    fn set_state(&mut self, state: EditState) -> Result<()> {
        let key = self.key(KEY_STATE);
        self.store.set(&key, serde_json::to_value(state)?);
        Ok(())
    }

    fn require_state(&self, expected: EditState, operation: &'static str) -> Result<()> {
        let state = self.state()?;
        if state != expected {
            return Err(Error::InvalidState {
                operation,
                state: state.to_string(),
            });
        }
        Ok(())
    }

    fn require_draft_state(&self, operation: &'static str) -> Result<()> {
        let state = self.state()?;
        if !matches!(state, EditState::Creating | EditState::Editing) {
            return Err(Error::InvalidState {
                operation,
                state: state.to_string(),
            });
        }
        Ok(())
    }

    fn store_record(&mut self, name: &str, record: &Record) -> Result<()> {
        let key = self.key(name);
        self.store.set(&key, serde_json::to_value(record)?);
        Ok(())
    }

    fn load_record(&self, name: &str, what: &'static str) -> Result<Record> {
        let value = self.store.get(&self.key(name)).ok_or(Error::NoDraft { what })?;
        Ok(serde_json::from_value(value)?)
    }

    fn end_session(&mut self) -> Result<()> {
        self.unset(KEY_CURRENT);
        self.unset(KEY_SNAPSHOT);
        self.unset(KEY_DELETE);
        self.set_state(EditState::Idle)
    }
}

/// A draft with null fields, a blank record per one-to-one slot and empty
/// lists elsewhere.
fn blank_record(spec: &JoinSpec) -> Record {
    let mut record = Record::new();
    for field in spec.fields() {
        record.set(field.clone(), Value::Null);
    }

    for child in spec.children() {
        let slot = if child.is_one_to_one() {
            vec![blank_record(child)]
        } else {
            Vec::new()
        };
        record.set_joint(child.nest_key(), slot);
    }

    record
}

fn root_key(tree: &[Record], spec: &JoinSpec) -> Value {
    tree.first()
        .and_then(|r| r.get(spec.primary_key()))
        .cloned()
        .unwrap_or(Value::Null)
}

// =============================================================================
// Tests
// =============================================================================
