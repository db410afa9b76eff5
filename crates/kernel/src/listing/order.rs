//! Value ordering shared by the in-memory sort paths.
//!
//! Ordering follows PostgreSQL defaults so that in-memory sorts agree with
//! database sorts on the same data: NULL (or a missing value) sorts after
//! every non-null value in ascending order and first in descending order.

use std::cmp::Ordering;

use serde_json::Value;

use super::tree::EntityNode;
use super::types::{FlatRow, MemorySortKey};

/// Rank of a JSON value type. Mixed types compare by rank.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) => 3,
        Value::Object(_) => 4,
        Value::Null => 5,
    }
}

/// Ascending comparison of two optional JSON values.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            a.to_string().cmp(&b.to_string())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Compare two indexed rows by the in-memory keys, left to right.
///
/// Root keys read the attribute from each row's root, deferred keys read
/// the row field.
fn compare_rows(
    a: &(usize, FlatRow),
    b: &(usize, FlatRow),
    roots: &[EntityNode],
    keys: &[MemorySortKey],
) -> Ordering {
    for key in keys {
        let ordering = match key {
            MemorySortKey::Root(key) => {
                let value = |index: usize| {
                    roots
                        .get(index)
                        .and_then(|root| key.path.lookup(&root.attributes))
                };
                key.direction.apply(compare_values(value(a.0), value(b.0)))
            }
            MemorySortKey::Row(key) => key.direction.apply(compare_values(
                a.1.get(&key.row_field),
                b.1.get(&key.row_field),
            )),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Stable in-memory sort of flattened rows.
///
/// `rows` pair each row with the index of its root in `roots`, as produced
/// by `flatten_indexed` over roots in fetch order. Without deferred keys the
/// fetch order already is the final order and nothing moves. Rows equal on
/// every key keep their flatten order.
pub fn apply_deferred_sort(
    rows: &mut [(usize, FlatRow)],
    roots: &[EntityNode],
    keys: &[MemorySortKey],
) {
    if !keys.iter().any(|key| matches!(key, MemorySortKey::Row(_))) {
        return;
    }
    rows.sort_by(|a, b| compare_rows(a, b, roots, keys));
}
