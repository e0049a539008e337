//! # JointAdmin - Joint-Table Arrangement and CRUD
//!
//! JointAdmin treats a tree of related SQL tables as one editable record. It
//! provides:
//!
//! - **Arrangement**: fold a flat LEFT JOIN result into nested records without
//!   losing or duplicating rows
//! - **Traversal**: a recursion engine firing ordered hooks over a record tree
//! - **Transactional CRUD**: create, edit and delete a record across every
//!   table of the tree, with generated keys fed back into parent rows
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      JointAdmin (admin)                         │
//! │       create_new / edit / update / add / modify / delete        │
//! └───────┬───────────────────┬─────────────────────┬───────────────┘
//!         │                   │                     │
//!         ▼                   ▼                     ▼
//! ┌───────────────┐  ┌─────────────────┐  ┌──────────────────────┐
//! │   arrange     │  │   recursion     │  │ collaborators        │
//! │ rows ⇄ tree   │  │ six-phase hooks │  │ Sql, DraftStore,     │
//! └───────────────┘  └─────────────────┘  │ ListIdAllocator,     │
//!                                         │ Validator, Messages  │
//!                                         └──────────┬───────────┘
//!                                                    ▼
//!                                         ┌──────────────────────┐
//!                                         │ SQLite (rusqlite)    │
//!                                         └──────────────────────┘
//! ```
//!
//! ## Core Invariants
//!
//! 1. **No duplication**: N parents joined to M children arrange into N
//!    records holding M children each
//! 2. **LEFT JOIN semantics**: a parent without child rows holds an empty list
//! 3. **Write order**: child rows are written before the parent that links to
//!    them
//! 4. **Atomicity**: a write touches every table or none; a failed write leaves
//!    the draft as it was
//!
//! ## Module Organization
//!
//! - [`error`]: Error type for all failure modes
//! - [`types`]: Records, flat rows, conditions, list ids
//! - [`join`]: JoinSpec trees
//! - [`arrange`]: Flat rows to record trees and back
//! - [`recursion`]: Ordered hook traversal
//! - [`sql`]: The `Sql` trait and its SQLite implementation
//! - [`schema`]: Database setup and bookkeeping tables
//! - [`list_ids`], [`validate`], [`messages`], [`store`]: orchestrator collaborators
//! - [`admin`]: The CRUD orchestrator (main entry point)

// =============================================================================
// Module Declarations
// =============================================================================

/// Error types for arrangement, traversal and CRUD.
pub mod error;

/// Records, flat rows and the other values passed between modules.
pub mod types;

/// JoinSpec trees describing how tables nest.
pub mod join;

/// Arrangement of joined rows into record trees.
///
/// [`arrange`](arrange::arrange) is strict and used on query results;
/// [`arrange_partial`](arrange::arrange_partial) accepts caller edits that
/// cover only some columns; [`flatten`](arrange::flatten) is the inverse.
pub mod arrange;

/// Six-phase traversal of record trees.
pub mod recursion;

/// SQL access through the object-safe [`Sql`](sql::Sql) trait.
pub mod sql;

/// SQLite connection setup, pragmas and bookkeeping tables.
pub mod schema;

/// List id allocation for one-to-many batches.
pub mod list_ids;

/// Per-table record validation.
pub mod validate;

/// User-facing failure and notification sinks.
pub mod messages;

/// Session storage for drafts.
pub mod store;

/// The CRUD orchestrator.
///
/// The main entry point is [`JointAdmin`](admin::JointAdmin).
pub mod admin;

// =============================================================================
// Re-exports
// =============================================================================

pub use admin::{AdminConfig, EditState, JointAdmin, WriteOutcome};
pub use arrange::{arrange, arrange_partial, flatten};
pub use error::{Error, Result};
pub use join::JoinSpec;
pub use list_ids::{ListIdAllocator, TableListIds};
pub use messages::{Message, Messages};
pub use recursion::{recurse, CallbackSet, Phase};
pub use schema::{Database, SqliteConfig};
pub use sql::{Sql, SqliteSql};
pub use store::{DraftStore, MemoryDraftStore};
pub use types::{Conditions, FlatRow, ListId, Record, RecordTree};
pub use validate::{Failure, FieldRule, RuleValidator, Validator};
