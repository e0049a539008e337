//! Draft storage between user interactions.
//!
//! The orchestrator keeps its edit state and drafts here as JSON under keys
//! prefixed by `AdminConfig::draft_prefix`. A web frontend would back this with
//! its session; [`MemoryDraftStore`] covers a single process.

use std::collections::HashMap;

use serde_json::Value;

/// Key/value store for the current edit session.
pub trait DraftStore {
    /// The value under `key`, if any.
    fn get(&self, key: &str) -> Option<Value>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, value: Value);

    /// Removes `key`; a missing key is not an error.
    fn unset(&mut self, key: &str);

    /// Removes every key.
    fn reset(&mut self);

    /// True if a value is stored under `key`.
    fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// In-memory [`DraftStore`], one per edit session.
#[derive(Debug, Clone, Default)]
pub struct MemoryDraftStore {
    values: HashMap<String, Value>,
}

impl MemoryDraftStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no key is stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl DraftStore for MemoryDraftStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn unset(&mut self, key: &str) {
        self.values.remove(key);
    }

    fn reset(&mut self) {
        self.values.clear();
    }

    fn exists(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}
