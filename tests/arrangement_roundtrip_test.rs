//! Arrangement Round-Trip Property
//!
//! Flattening a record tree into LEFT JOIN rows and arranging the rows again
//! must give back the same tree, for any tree whose primary keys are set and
//! unique. Covers sibling groups (which multiply rows) and three-level
//! nesting.

use jointadmin::{arrange, flatten, JoinSpec, Record};
use proptest::prelude::*;
use serde_json::Value;

fn spec() -> JoinSpec {
    JoinSpec::new("Order")
        .with_fields(["ID", "Total"])
        .join(
            JoinSpec::new("Item")
                .with_fields(["ID", "List_ID", "SKU"])
                .with_parent_field("List_ID")
                .with_child_field("List_ID")
                .with_joint_key("Items")
                .join(
                    JoinSpec::new("Tag")
                        .with_fields(["ID", "Label"])
                        .with_parent_field("Tag_List")
                        .with_joint_key("Tags"),
                ),
        )
        .join(
            JoinSpec::new("Note")
                .with_fields(["ID", "Text"])
                .with_parent_field("Note_ID"),
        )
}

/// Generated shape before keys are assigned.
#[derive(Clone, Debug)]
struct OrderShape {
    total: Option<i64>,
    items: Vec<(Option<String>, Vec<Option<String>>)>,
    notes: Vec<Option<String>>,
}

fn arb_text() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[a-z]{0,4}")
}

fn arb_order() -> impl Strategy<Value = OrderShape> {
    (
        prop::option::of(-1000i64..1000),
        prop::collection::vec((arb_text(), prop::collection::vec(arb_text(), 0..3)), 0..4),
        prop::collection::vec(arb_text(), 0..3),
    )
        .prop_map(|(total, items, notes)| OrderShape { total, items, notes })
}

fn opt(value: &Option<String>) -> Value {
    value.clone().map(Value::from).unwrap_or(Value::Null)
}

/// Builds records with every declared field set and keys numbered 1, 2, ...
fn build_tree(shapes: &[OrderShape]) -> Vec<Record> {
    let mut next_key = 0i64;
    let mut key = || {
        next_key += 1;
        next_key
    };

    shapes
        .iter()
        .map(|shape| {
            let list_id = key();
            let items = shape
                .items
                .iter()
                .map(|(sku, labels)| {
                    let tags = labels
                        .iter()
                        .map(|label| Record::new().with_field("ID", key()).with_field("Label", opt(label)))
                        .collect();
                    Record::new()
                        .with_field("ID", key())
                        .with_field("List_ID", list_id)
                        .with_field("SKU", opt(sku))
                        .with_joint("Tags", tags)
                })
                .collect();
            let notes = shape
                .notes
                .iter()
                .map(|text| Record::new().with_field("ID", key()).with_field("Text", opt(text)))
                .collect();

            Record::new()
                .with_field("ID", key())
                .with_field("Total", shape.total.map(Value::from).unwrap_or(Value::Null))
                .with_joint("Items", items)
                .with_joint("Note", notes)
        })
        .collect()
}

proptest! {
    #[test]
    fn flatten_then_arrange_is_identity(shapes in prop::collection::vec(arb_order(), 0..5)) {
        let spec = spec();
        let tree = build_tree(&shapes);

        let rows = flatten(&tree, &spec);
        let arranged = arrange(&rows, &spec).unwrap();

        prop_assert_eq!(arranged, tree);
    }

    #[test]
    fn row_count_is_product_of_group_sizes(shapes in prop::collection::vec(arb_order(), 0..5)) {
        let spec = spec();
        let tree = build_tree(&shapes);

        let expected: usize = shapes
            .iter()
            .map(|s| {
                let item_rows: usize = s.items.iter().map(|(_, tags)| tags.len().max(1)).sum();
                item_rows.max(1) * s.notes.len().max(1)
            })
            .sum();

        prop_assert_eq!(flatten(&tree, &spec).len(), expected);
    }
}
