//! Merging a partial edit into the current draft.
//!
//! Scalar fields overwrite. Child records are matched by primary key and
//! merged recursively; a one-to-one slot holding a single record takes the
//! incoming child even without a key; anything else is appended. Child groups
//! the partial does not mention are left as they are.

use crate::join::JoinSpec;
use crate::types::Record;

pub(crate) fn merge_record(target: &mut Record, incoming: Record, spec: &JoinSpec) {
    let (fields, mut joints) = incoming.into_parts();

    for (field, value) in fields {
        target.set(field, value);
    }

    for child in spec.children() {
        let Some(list) = joints.remove(child.nest_key()) else {
            continue;
        };

        let existing = target.joint_entry(child.nest_key());
        for item in list {
            merge_into_list(existing, item, child);
        }
    }
}

fn merge_into_list(list: &mut Vec<Record>, incoming: Record, spec: &JoinSpec) {
    let pk = spec.primary_key();

    if let Some(key) = incoming.get_non_null(pk).cloned() {
        if let Some(existing) = list.iter_mut().find(|r| r.get(pk) == Some(&key)) {
            merge_record(existing, incoming, spec);
            return;
        }
    }

    if spec.is_one_to_one() && list.len() == 1 {
        merge_record(&mut list[0], incoming, spec);
        return;
    }

    list.push(incoming);
}
