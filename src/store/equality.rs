// ============================================================================
// chatmod-core - Value Identity
// Same-value comparison over JSON trees, used to skip no-op writes
// ============================================================================

use serde_json::{Number, Value};

/// Same-value identity for JSON values.
///
/// - numbers: `0.0` and `-0.0` are different, NaN equals NaN, and an integer
///   equals a float of the same value (`1` is `1.0`)
/// - strings, booleans, null: by value
/// - arrays and objects: element-wise / key-wise with this same rule
///
/// # Example
///
/// ```
/// use chatmod_core::store::same_value;
/// use serde_json::json;
///
/// assert!(same_value(&json!(1), &json!(1.0)));
/// assert!(!same_value(&json!(0.0), &json!(-0.0)));
/// assert!(same_value(&json!({"a": [1, 2]}), &json!({"a": [1, 2]})));
/// ```
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => same_number(x, y),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| same_value(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, l)| y.get(k).is_some_and(|r| same_value(l, r)))
        }
        _ => false,
    }
}

fn same_number(a: &Number, b: &Number) -> bool {
    // Exact integer comparison first; going through f64 would merge large
    // neighbouring integers.
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => same_f64(x, y),
        _ => false,
    }
}

/// `Object.is` for doubles.
pub fn same_f64(a: f64, b: f64) -> bool {
    if a.is_nan() {
        return b.is_nan();
    }
    if a == 0.0 && b == 0.0 {
        return a.is_sign_negative() == b.is_sign_negative();
    }
    a == b
}

// =============================================================================
// TESTS
// =============================================================================
