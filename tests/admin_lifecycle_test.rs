//! Admin Lifecycle Tests
//!
//! Drives full edit sessions through the orchestrator against SQLite:
//! - create, add, edit, update and modify a multi-table record
//! - request and confirm deletes
//! - validation failures block writes and report per-field messages
//! - edit targets must match exactly one record

mod common;

use jointadmin::types::Conditions;
use jointadmin::{
    AdminConfig, Database, DraftStore, EditState, Error, FieldRule, JointAdmin, MemoryDraftStore,
    RuleValidator, WriteOutcome,
};
use regex::Regex;
use serde_json::json;

#[test]
fn create_add_edit_modify_read() {
    let mut admin = common::in_memory_admin();

    // Create
    let draft = admin.create_new().unwrap();
    assert_eq!(
        draft.to_value(admin.spec()),
        json!({
            "ID": null, "Customer": null, "Total": null,
            "Items": [],
            "Address": [{"ID": null, "City": null}]
        })
    );

    admin
        .update_current_record(&common::rows(vec![
            json!({"Order.Customer": "ann", "Order.Total": 2, "Item.SKU": "A", "Item.Qty": 1}),
            json!({"Order.Customer": "ann", "Order.Total": 2, "Item.SKU": "B", "Item.Qty": 3}),
            json!({"Order.Customer": "ann", "Address.City": "Oslo"}),
        ]))
        .unwrap();
    assert_eq!(admin.add().unwrap(), WriteOutcome::Committed);
    assert_eq!(admin.state().unwrap(), EditState::Idle);
    assert!(admin.current_record().unwrap().is_none());

    // Edit
    let loaded = admin.edit(&Conditions::new().eq("Customer", "ann")).unwrap();
    assert_eq!(loaded.joint("Items").map(Vec::len), Some(2));
    assert_eq!(admin.state().unwrap(), EditState::Editing);

    let updated = admin
        .update_current_record(&common::rows(vec![
            json!({"Order.ID": 1, "Order.Total": 3, "Item.ID": 2, "Item.Qty": 4}),
            json!({"Order.ID": 1, "Item.SKU": "C", "Item.Qty": 1}),
        ]))
        .unwrap();
    assert_eq!(updated.get("Customer"), Some(&json!("ann")), "untouched fields survive");
    assert_eq!(updated.joint("Items").map(Vec::len), Some(3));

    // Modify
    assert_eq!(admin.modify().unwrap(), WriteOutcome::Committed);

    let tree = admin.read_all().unwrap();
    assert_eq!(
        tree[0].to_value(admin.spec()),
        json!({
            "ID": 1, "Customer": "ann", "Total": 3,
            "Items": [
                {"ID": 1, "List_ID": 1, "SKU": "A", "Qty": 1},
                {"ID": 2, "List_ID": 1, "SKU": "B", "Qty": 4},
                {"ID": 3, "List_ID": 1, "SKU": "C", "Qty": 1}
            ],
            "Address": [{"ID": 1, "City": "Oslo"}]
        })
    );

    let notes: Vec<_> = admin.messages().notifications().iter().map(|m| m.title.as_str()).collect();
    assert_eq!(notes, vec!["Add", "Modify"]);
}

#[test]
fn delete_request_then_confirm() {
    let mut admin = common::in_memory_admin();
    common::add_order(&mut admin, "ann", &["A", "B"], "Oslo");
    common::add_order(&mut admin, "bob", &["C"], "Rome");
    common::add_order(&mut admin, "cat", &[], "Oslo");

    let pending = admin
        .delete_request(&Conditions::new().eq("Address.City", "Oslo"))
        .unwrap();
    assert_eq!(pending, 2);
    assert_eq!(admin.state().unwrap(), EditState::ConfirmingDelete);

    assert_eq!(admin.delete_confirm().unwrap(), WriteOutcome::Committed);
    assert_eq!(admin.state().unwrap(), EditState::Idle);

    let conn = admin.sql().connection();
    assert_eq!(common::count_rows(conn, "Order"), 1);
    assert_eq!(common::count_rows(conn, "Item"), 1);
    assert_eq!(common::count_rows(conn, "Address"), 1);

    let left = admin.read_all().unwrap();
    assert_eq!(left[0].get("Customer"), Some(&json!("bob")));
}

#[test]
fn delete_request_without_match_reports_failure() {
    let mut admin = common::in_memory_admin();
    common::add_order(&mut admin, "ann", &["A"], "Oslo");
    admin.take_messages();

    let pending = admin.delete_request(&Conditions::new().eq("Customer", "zed")).unwrap();
    assert_eq!(pending, 0);
    assert_eq!(admin.state().unwrap(), EditState::Idle);

    let failures = admin.messages().failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].text, admin.config().nothing_to_delete);

    let err = admin.delete_confirm().unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }));
}

#[test]
fn validation_failure_blocks_write() {
    let validator = RuleValidator::new()
        .rule("Order", "Customer", FieldRule::Required)
        .rule("Order", "List_ID", FieldRule::Required)
        .rule("Item", "SKU", FieldRule::MaxLength(3))
        .rule("Item", "Qty", FieldRule::Integer)
        .rule("Address", "City", FieldRule::Required)
        .rule("Address", "City", FieldRule::Pattern(Regex::new(r"^[A-Z]").unwrap()));
    let mut admin = common::in_memory_admin().with_validator(validator);

    admin.create_new().unwrap();
    admin
        .update_current_record(&common::rows(vec![
            json!({"Order.Total": 1, "Item.SKU": "LONGER", "Item.Qty": "two"}),
        ]))
        .unwrap();

    assert_eq!(admin.add().unwrap(), WriteOutcome::ValidationFailed);

    // List_ID is filled in by the engine and the Address slot is untouched.
    let failures: Vec<(String, String)> = admin
        .messages()
        .failures()
        .iter()
        .map(|m| (m.title.clone(), m.text.clone()))
        .collect();
    assert_eq!(
        failures,
        vec![
            ("Order.Customer".to_string(), "is required".to_string()),
            ("Item.SKU".to_string(), "must be at most 3 characters".to_string()),
            ("Item.Qty".to_string(), "must be an integer".to_string()),
        ]
    );
    assert_eq!(common::count_rows(admin.sql().connection(), "Order"), 0);
    assert_eq!(admin.state().unwrap(), EditState::Creating);

    // Fix the draft and retry.
    admin.take_messages();
    admin
        .update_current_record(&common::rows(vec![json!({"Order.Customer": "ann", "Address.City": "oslo"})]))
        .unwrap();
    assert_eq!(admin.add().unwrap(), WriteOutcome::ValidationFailed);
    assert_eq!(admin.messages().failures().len(), 3);
    assert_eq!(admin.messages().failures()[2].title, "Address.City");

    admin.take_messages();
    let mut fixed = admin.current_record().unwrap().unwrap();
    fixed.joint_mut("Items").unwrap()[0].set("SKU", "ABC");
    fixed.joint_mut("Items").unwrap()[0].set("Qty", 2);
    fixed.joint_mut("Address").unwrap()[0].set("City", "Oslo");
    admin.replace_current_record(fixed).unwrap();

    assert_eq!(admin.add().unwrap(), WriteOutcome::Committed);
    assert!(admin.messages().failures().is_empty());
}

#[test]
fn edit_requires_exactly_one_match() {
    let mut admin = common::in_memory_admin();
    common::add_order(&mut admin, "ann", &["A", "B"], "Oslo");
    common::add_order(&mut admin, "bob", &["A"], "Oslo");

    let err = admin.edit(&Conditions::new().eq("Address.City", "Oslo")).unwrap_err();
    assert!(matches!(err, Error::AmbiguousMatch { count: 2, .. }), "got {err}");

    let err = admin.edit(&Conditions::new().eq("Customer", "zed")).unwrap_err();
    assert!(matches!(err, Error::AmbiguousMatch { count: 0, .. }), "got {err}");
    assert_eq!(admin.state().unwrap(), EditState::Idle);

    // A join hit on several child rows is still one record.
    let record = admin.edit(&Conditions::new().eq("Customer", "ann")).unwrap();
    assert_eq!(record.joint("Items").map(Vec::len), Some(2));
}

#[test]
fn cancel_discards_session() {
    let mut admin = common::in_memory_admin();
    common::add_order(&mut admin, "ann", &["A"], "Oslo");

    admin.edit(&Conditions::new().eq("Customer", "ann")).unwrap();
    admin
        .update_current_record(&common::rows(vec![json!({"Order.ID": 1, "Order.Customer": "anne"})]))
        .unwrap();
    admin.cancel().unwrap();

    assert_eq!(admin.state().unwrap(), EditState::Idle);
    assert!(admin.current_record().unwrap().is_none());
    assert!(!admin.store().exists("jointadmin.snapshot"));
    assert_eq!(admin.read_all().unwrap()[0].get("Customer"), Some(&json!("ann")));

    let err = admin.update_current_record(&[]).unwrap_err();
    assert_eq!(err.to_string(), "cannot update the current record while idle");
}

#[test]
fn messages_follow_config_and_drain() {
    let config: AdminConfig = serde_json::from_value(json!({
        "added": "Order saved",
        "deleted": "Order removed",
    }))
    .unwrap();
    let mut admin = common::in_memory_admin().with_config(config);

    common::add_order(&mut admin, "ann", &["A"], "Oslo");
    admin.delete_request(&Conditions::new().eq("Customer", "ann")).unwrap();
    admin.delete_confirm().unwrap();

    let messages = admin.take_messages();
    let texts: Vec<_> = messages.notifications().iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["Order saved", "Order removed"]);
    assert!(admin.messages().is_empty());
}

/// Rows carrying only child columns still reach the draft, and identical new
/// rows are separate records.
#[test]
fn child_only_update_appends_children() {
    let mut admin = common::in_memory_admin();
    admin.create_new().unwrap();

    let draft = admin
        .update_current_record(&common::rows(vec![json!({"Item.SKU": "A", "Item.Qty": 2})]))
        .unwrap();
    assert_eq!(draft.joint("Items").map(Vec::len), Some(1));

    let draft = admin
        .update_current_record(&common::rows(vec![
            json!({"Item.SKU": "B", "Item.Qty": 1}),
            json!({"Item.SKU": "B", "Item.Qty": 1}),
        ]))
        .unwrap();
    assert_eq!(draft.joint("Items").map(Vec::len), Some(3));

    admin
        .update_current_record(&common::rows(vec![json!({"Order.Customer": "ann", "Address.City": "Oslo"})]))
        .unwrap();
    assert_eq!(admin.add().unwrap(), WriteOutcome::Committed);

    let tree = admin.read_all().unwrap();
    let skus: Vec<_> = tree[0]
        .joint("Items")
        .unwrap()
        .iter()
        .map(|item| item.get("SKU").cloned())
        .collect();
    assert_eq!(skus, vec![Some(json!("A")), Some(json!("B")), Some(json!("B"))]);
}

/// An untouched draft is still checked against the root table's rules.
#[test]
fn untouched_draft_fails_root_rules() {
    let validator = RuleValidator::new()
        .rule("Order", "Customer", FieldRule::Required)
        .rule("Address", "City", FieldRule::Required);
    let mut admin = common::in_memory_admin().with_validator(validator);

    admin.create_new().unwrap();
    assert_eq!(admin.add().unwrap(), WriteOutcome::ValidationFailed);

    let titles: Vec<_> = admin.messages().failures().iter().map(|m| m.title.as_str()).collect();
    assert_eq!(titles, vec!["Order.Customer"]);
    assert_eq!(common::count_rows(admin.sql().connection(), "Order"), 0);
    assert_eq!(admin.state().unwrap(), EditState::Creating);

    // An Address the user cleared to "" is checked too.
    admin.take_messages();
    admin
        .update_current_record(&common::rows(vec![json!({"Order.Customer": "ann", "Address.City": ""})]))
        .unwrap();
    assert_eq!(admin.add().unwrap(), WriteOutcome::ValidationFailed);

    let titles: Vec<_> = admin.messages().failures().iter().map(|m| m.title.as_str()).collect();
    assert_eq!(titles, vec!["Address.City"]);
}

/// Cancelling one session leaves another prefix in the same store alone.
#[test]
fn cancel_keeps_other_sessions_in_shared_store() {
    let mut store = MemoryDraftStore::new();
    store.set("menus/state", json!("editing"));
    store.set("menus/current", json!({"fields": {"ID": 3}, "joints": {}}));

    let db = Database::open_in_memory().unwrap();
    db.execute_batch(common::ORDER_DDL).unwrap();
    let mut admin = JointAdmin::new(common::order_spec(), db.into_sql(), store)
        .unwrap()
        .with_config(AdminConfig {
            draft_prefix: "orders/".to_string(),
            ..AdminConfig::default()
        });

    admin.create_new().unwrap();
    admin.cancel().unwrap();

    assert!(admin.store().exists("menus/current"));
    assert_eq!(admin.store().get("menus/state"), Some(json!("editing")));
    assert!(!admin.store().exists("orders/current"));
    assert_eq!(admin.state().unwrap(), EditState::Idle);
}
