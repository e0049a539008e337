//! # Record Validation
//!
//! Each table's contribution to a draft is checked before any write. The
//! orchestrator walks the draft with the recursion engine and calls the
//! [`Validator`] once per non-blank, admin-managed record, passing the fields
//! the engine fills in itself so they are not checked.
//!
//! Failures are collected rather than returned on the first problem, so the
//! user sees every issue of a draft at once.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Record;

// =============================================================================
// Failures
// =============================================================================

/// One field that did not pass validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Table alias
    pub table: String,
    pub field: String,
    pub message: String,
}

impl Failure {
    /// A failure of `table.field` with a user-facing message.
    pub fn new(table: impl Into<String>, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// Validator Trait
// =============================================================================

/// Checks one table record.
///
/// # Contract
///
/// - `is_valid` reports the failures of the latest call only; callers that
///   validate several records collect `failures()` after each call
/// - fields listed in `ignored` are never checked
pub trait Validator {
    fn is_valid(&mut self, table: &str, record: &Record, ignored: &[String]) -> bool;

    fn failures(&self) -> Vec<Failure>;
}

// =============================================================================
// Rule Validator
// =============================================================================

/// A check applied to one field.
#[derive(Debug, Clone)]
pub enum FieldRule {
    /// Present, not null and not an empty string.
    Required,

    /// Strings may hold at most this many characters.
    MaxLength(usize),

    /// Integer numbers, or strings that parse as one.
    Integer,

    /// The text form of the value must match.
    Pattern(Regex),
}

impl FieldRule {
    /// Returns the failure message, if `value` breaks the rule.
    ///
    /// Only `Required` looks at empty values; the other rules accept them.
    fn check(&self, value: Option<&Value>) -> Option<String> {
        let value = match value {
            None | Some(Value::Null) => {
                return matches!(self, FieldRule::Required).then(|| "is required".to_string());
            }
            Some(Value::String(s)) if s.is_empty() => {
                return matches!(self, FieldRule::Required).then(|| "is required".to_string());
            }
            Some(value) => value,
        };

        match self {
            FieldRule::Required => None,
            FieldRule::MaxLength(max) => match value {
                Value::String(s) if s.chars().count() > *max => {
                    Some(format!("must be at most {max} characters"))
                }
                _ => None,
            },
            FieldRule::Integer => {
                let ok = match value {
                    Value::Number(n) => n.is_i64() || n.is_u64(),
                    Value::String(s) => s.trim().parse::<i64>().is_ok(),
                    _ => false,
                };
                (!ok).then(|| "must be an integer".to_string())
            }
            FieldRule::Pattern(re) => {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (!re.is_match(&text)).then(|| "does not match the required format".to_string())
            }
        }
    }
}

/// Per-table field rules.
///
/// With no rules every record is valid, which makes it the default
/// orchestrator validator.
///
/// # Example
///
/// ```rust
/// use jointadmin::validate::{FieldRule, RuleValidator, Validator};
/// use jointadmin::Record;
///
/// let mut validator = RuleValidator::new().rule("Order", "Total", FieldRule::Required);
/// assert!(!validator.is_valid("Order", &Record::new(), &[]));
/// assert_eq!(validator.failures()[0].field, "Total");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleValidator {
    rules: HashMap<String, Vec<(String, FieldRule)>>,
    failures: Vec<Failure>,
}

impl RuleValidator {
    /// A validator without rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule for `table.field` (builder pattern).
    pub fn rule(mut self, table: impl Into<String>, field: impl Into<String>, rule: FieldRule) -> Self {
        self.rules
            .entry(table.into())
            .or_default()
            .push((field.into(), rule));
        self
    }
}

impl Validator for RuleValidator {
    fn is_valid(&mut self, table: &str, record: &Record, ignored: &[String]) -> bool {
        self.failures.clear();

        let Some(rules) = self.rules.get(table) else {
            return true;
        };

        for (field, rule) in rules {
            if ignored.iter().any(|f| f == field) {
                continue;
            }
            if let Some(message) = rule.check(record.get(field)) {
                self.failures.push(Failure::new(table, field.as_str(), message));
            }
        }

        self.failures.is_empty()
    }

    fn failures(&self) -> Vec<Failure> {
        self.failures.clone()
    }
}

// =============================================================================
// Tests
// =============================================================================
