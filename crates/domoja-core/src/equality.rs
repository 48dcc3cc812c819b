// ── Structural equality ──
//
// Deep comparison over `serde_json::Value` trees. A key that is missing on
// one side and `null` (or missing) on the other is not a difference; a key
// present on both sides with different contents is.

use serde::Serialize;
use serde_json::{Number, Value};

/// Compare two value trees structurally.
///
/// Objects are compared over the union of their keys, arrays element-wise
/// and in order, numbers by numeric value (`1` equals `1.0`).
pub fn structural_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(left), Value::Object(right)) => left
            .keys()
            .chain(right.keys())
            .all(|key| match (present(left.get(key)), present(right.get(key))) {
                (None, None) => true,
                (Some(l), Some(r)) => structural_eq(l, r),
                _ => false,
            }),
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len() && left.iter().zip(right).all(|(l, r)| structural_eq(l, r))
        }
        (Value::Number(l), Value::Number(r)) => numbers_eq(l, r),
        _ => a == b,
    }
}

/// Serialize both sides and compare the resulting trees.
///
/// A value that fails to serialize never compares equal.
pub fn structurally_equal<T: Serialize>(a: &T, b: &T) -> bool {
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(a), Ok(b)) => structural_eq(&a, &b),
        _ => false,
    }
}

/// Integers compare exactly; a float on either side compares as `f64`.
#[allow(clippy::float_cmp)]
fn numbers_eq(l: &Number, r: &Number) -> bool {
    if let (Some(l), Some(r)) = (l.as_i64(), r.as_i64()) {
        return l == r;
    }
    if let (Some(l), Some(r)) = (l.as_u64(), r.as_u64()) {
        return l == r;
    }
    if l.is_f64() || r.is_f64() {
        return matches!((l.as_f64(), r.as_f64()), (Some(l), Some(r)) if l == r);
    }
    false
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}
