//! # Error Handling for JointAdmin
//!
//! This module defines the error types used throughout the crate. We use a single
//! error enum ([`Error`]) to represent all failure modes, which keeps function
//! signatures simple and lets callers match on the category they care about.
//!
//! ## Rust Pattern: thiserror
//!
//! We use the `thiserror` crate to derive `std::error::Error` implementations:
//! - `Display` comes from the `#[error(...)]` attributes
//! - `From` conversions come from the `#[from]` attributes
//! - Source chaining is preserved for wrapped errors
//!
//! ## Error Categories
//!
//! | Category | Examples | Typical Response |
//! |----------|----------|------------------|
//! | Contract | Missing column, ambiguous edit target | Fix the JoinSpec or the caller |
//! | Persistence | SQLite error, failed statement | Rolled back; user sees a generic failure |
//! | Serialization | Corrupt draft in the store | Discard the draft |
//!
//! Validation failures are not errors: they are an expected outcome reported
//! through [`crate::messages::Messages`] and [`crate::admin::WriteOutcome`].

use thiserror::Error;

// =============================================================================
// Error Type
// =============================================================================

/// All errors that can occur in arrangement, traversal and CRUD operations.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Contract Errors (programming or configuration mistakes)
    // =========================================================================

    /// A flat row is missing a namespaced column declared by the JoinSpec tree.
    ///
    /// # When This Happens
    ///
    /// The query that produced the rows does not match the JoinSpec it is being
    /// arranged against. Arrangement fails fast instead of dropping data.
    #[error("missing column '{column}' in joined row")]
    MissingColumn {
        /// The namespaced column, e.g. `Order.Total`
        column: String,
    },

    /// The JoinSpec tree is inconsistent (duplicate aliases, undeclared keys, ...).
    #[error("invalid join spec for '{table}': {reason}")]
    InvalidJoinSpec {
        /// Alias of the offending node
        table: String,
        /// What is wrong with it
        reason: String,
    },

    /// An edit target matched zero or several records instead of exactly one.
    #[error("ambiguous edit target on '{table}': expected exactly 1 match, found {count}")]
    AmbiguousMatch {
        /// Root table alias
        table: String,
        /// Number of top-level records matched
        count: usize,
    },

    /// Joint data for a child table was not a list of records.
    #[error("joint data '{key}' on '{table}' must be an array of records")]
    NotArray {
        /// Parent table alias
        table: String,
        /// The nesting key holding the child data
        key: String,
    },

    /// More than one row in a batch for a table keyed by last-insert-id.
    ///
    /// # When This Happens
    ///
    /// A table without a child field links to its parent through the
    /// database-assigned id of a single row. With several rows there is no
    /// single id to feed back, so the write is aborted.
    #[error("table '{table}' has no child field and cannot take {rows} rows in one batch")]
    ChildFieldCardinality {
        /// Child table alias
        table: String,
        /// Number of rows in the offending batch
        rows: usize,
    },

    /// An operation was invoked in the wrong edit state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// The attempted operation
        operation: &'static str,
        /// Display form of the current state
        state: String,
    },

    /// The draft store holds no record for an operation that needs one.
    #[error("no {what} in the draft store")]
    NoDraft {
        /// Which stored item was expected (current record, snapshot, ...)
        what: &'static str,
    },

    /// A caller-supplied record or row has the wrong shape.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// A delete was requested without any condition.
    #[error("refusing to delete from '{table}' without conditions")]
    UnboundedDelete {
        /// Target table
        table: String,
    },

    // =========================================================================
    // Persistence Errors (rolled back and reported generically)
    // =========================================================================

    /// SQLite operation failed.
    ///
    /// # Rust Pattern: #[from]
    ///
    /// `#[from]` generates `impl From<rusqlite::Error> for Error`, so `?`
    /// converts rusqlite errors automatically.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A non-SQLite backend reported a failed statement.
    #[error("sql error: {0}")]
    Sql(String),

    /// Schema version mismatch or corruption of the bookkeeping tables.
    #[error("schema error: {0}")]
    Schema(String),

    // =========================================================================
    // Serialization
    // =========================================================================

    /// A stored draft could not be (de)serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true for failures of the storage layer.
    ///
    /// These are caught at the orchestrator boundary: the transaction is rolled
    /// back and a generic failure is recorded for the user. Every other variant
    /// still propagates to the caller.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Error::Sqlite(_) | Error::Sql(_) | Error::Schema(_))
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================
