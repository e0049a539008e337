//! # SQLite Setup for JointAdmin
//!
//! The engine writes into the caller's own tables, so the only schema it owns
//! is a pair of bookkeeping tables. This module opens the connection, applies
//! pragmas and creates those tables.
//!
//! ## Table Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  jointadmin_metadata          jointadmin_list_ids            │
//! │  ┌─────────────┐              ┌─────────────────────────┐    │
//! │  │ key (PK)    │              │ name (PK) "Item.List_ID"│    │
//! │  │ value       │              │ value     last issued   │    │
//! │  └─────────────┘              └─────────────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Decisions
//!
//! ### Why a table for list ids?
//!
//! A list id is shared by every row of one child batch, so it cannot come from
//! an auto-increment column of the child table. A counter row per
//! `table.field` hands out ids inside the same transaction as the insert, and
//! a rollback rolls the counter back with it.

use std::time::Duration;

use rusqlite::Connection;
use serde::Deserialize;

use crate::sql::{SqliteSql, TransactionMode};
use crate::{Error, Result};

// =============================================================================
// Schema Version
// =============================================================================

/// Current bookkeeping schema version.
///
/// There are no migrations: a mismatch is reported as `Error::Schema`.
const SCHEMA_VERSION: i32 = 1;

// =============================================================================
// DDL Statements
// =============================================================================

/// Key/value metadata (schema version).
const CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS jointadmin_metadata (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
"#;

/// Last issued list id per `table.field`.
///
/// Read and written only through the `Sql` trait by
/// [`crate::list_ids::TableListIds`].
pub const CREATE_LIST_IDS: &str = r#"
CREATE TABLE IF NOT EXISTS jointadmin_list_ids (
    name  TEXT PRIMARY KEY,
    value INTEGER NOT NULL
)
"#;

// =============================================================================
// Configuration
// =============================================================================

/// Connection settings.
///
/// # Example
///
/// ```rust
/// use jointadmin::schema::SqliteConfig;
///
/// let config: SqliteConfig = serde_json::from_str(r#"{"wal": false}"#).unwrap();
/// assert!(!config.wal);
/// assert!(config.foreign_keys);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Use write-ahead logging (ignored for in-memory databases)
    pub wal: bool,

    /// Enforce foreign key constraints
    pub foreign_keys: bool,

    /// How long a writer waits on a locked database, in milliseconds
    pub busy_timeout_ms: u64,

    /// How `BEGIN` acquires locks
    pub transaction_mode: TransactionMode,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            wal: true,
            foreign_keys: true,
            busy_timeout_ms: 5_000,
            transaction_mode: TransactionMode::Immediate,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// An initialized SQLite connection.
///
/// # Rust Pattern: Newtype Wrapper
///
/// Wrapping [`Connection`] guarantees that pragmas and bookkeeping tables are
/// in place before any other code touches the connection.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
    config: SqliteConfig,
}

impl Database {
    /// Opens (or creates) a database file with default settings.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::open_with_config(path, SqliteConfig::default())
    }

    /// Opens (or creates) a database file.
    pub fn open_with_config(path: impl AsRef<std::path::Path>, config: SqliteConfig) -> Result<Self> {
        let conn = Connection::open(path)?;
        let mut db = Self { conn, config };
        db.initialize()?;
        Ok(db)
    }

    /// Creates an in-memory database, lost when the connection closes.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self {
            conn,
            config: SqliteConfig::default(),
        };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&mut self) -> Result<()> {
        if self.config.wal {
            // In-memory databases answer "memory" and keep their journal mode.
            self.conn.execute_batch("PRAGMA journal_mode = WAL")?;
        }
        self.conn.execute_batch("PRAGMA synchronous = NORMAL")?;

        let fk = if self.config.foreign_keys { "ON" } else { "OFF" };
        self.conn.execute_batch(&format!("PRAGMA foreign_keys = {fk}"))?;

        self.conn
            .busy_timeout(Duration::from_millis(self.config.busy_timeout_ms))?;

        self.conn.execute_batch(CREATE_METADATA)?;
        self.conn.execute_batch(CREATE_LIST_IDS)?;

        self.verify_or_set_version()?;

        tracing::debug!(
            wal = self.config.wal,
            foreign_keys = self.config.foreign_keys,
            "database initialized"
        );
        Ok(())
    }

    fn verify_or_set_version(&mut self) -> Result<()> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM jointadmin_metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .ok();

        match existing {
            None => {
                self.conn.execute(
                    "INSERT INTO jointadmin_metadata (key, value) VALUES ('schema_version', ?)",
                    [SCHEMA_VERSION.to_string()],
                )?;
            }
            Some(v) if v.parse::<i32>().ok() == Some(SCHEMA_VERSION) => {}
            Some(v) => {
                return Err(Error::Schema(format!(
                    "schema version mismatch: database has version {v}, but this version requires {SCHEMA_VERSION}"
                )));
            }
        }

        Ok(())
    }

    /// Runs caller DDL, e.g. the tables a JoinSpec tree maps onto.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Returns a reference to the underlying SQLite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Unwraps the connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Turns the database into the [`crate::sql::Sql`] backend the
    /// orchestrator runs on, keeping the configured transaction mode.
    pub fn into_sql(self) -> SqliteSql {
        SqliteSql::with_mode(self.conn, self.config.transaction_mode)
    }
}

// =============================================================================
// Tests
// =============================================================================
