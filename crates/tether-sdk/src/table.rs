//! Table length probes

use crate::context::ScriptStack;
use crate::error::{MarshalError, MarshalResult};
use crate::value::{TableRef, Value};

fn table_at(l: &dyn ScriptStack, idx: i32) -> MarshalResult<TableRef> {
    match l.value(idx) {
        Some(Value::Table(t)) => Ok(t),
        Some(other) => Err(MarshalError::mismatch("table", other.type_name())),
        None => Err(MarshalError::mismatch("table", "no value")),
    }
}

/// Length of the array part of the table at `idx`: the largest positive
/// integral numeric key, or 0.
///
/// Holes are not detected; `{1, nil, 3}` has length 3.
pub fn array_len(l: &dyn ScriptStack, idx: i32) -> MarshalResult<i64> {
    let t = table_at(l, idx)?;
    let mut max = 0i64;
    let mut key = Value::Nil;
    while let Some((k, _)) = l.next(t, &key)? {
        if let Value::Number(n) = k {
            if n >= 1.0 && n.fract() == 0.0 && n <= i64::MAX as f64 {
                max = max.max(n as i64);
            }
        }
        key = k;
    }
    Ok(max)
}

/// Number of key/value pairs in the table at `idx`
pub fn map_len(l: &dyn ScriptStack, idx: i32) -> MarshalResult<i64> {
    let t = table_at(l, idx)?;
    let mut count = 0i64;
    let mut key = Value::Nil;
    while let Some((k, _)) = l.next(t, &key)? {
        count += 1;
        key = k;
    }
    Ok(count)
}
