//! Callable and stringification probes
//!
//! Both probes look at behaviour tables without raising: `is_callable` never
//! invokes anything, and `to_display_string` only runs a `__tostring`
//! behaviour, falling back to the default representation when it fails.

use crate::context::ScriptStack;
use crate::methods::{CALL_ENTRY, TOSTRING_ENTRY};
use crate::registry::TypeId;
use crate::value::{ForeignRef, TableRef, Value};

/// Whether the value at `idx` can be invoked.
///
/// True for native functions, tables whose metatable has a `__call` field and
/// foreign values whose type's method table has a `__call` entry. The type of
/// the `__call` field is not checked.
pub fn is_callable(l: &dyn ScriptStack, idx: i32) -> bool {
    match l.value(idx) {
        Some(Value::Function(_)) => true,
        Some(Value::Table(t)) => metafield(l, t, CALL_ENTRY).is_some(),
        Some(Value::Foreign(r)) => l
            .foreign_type(r)
            .map_or(false, |id| l.registry().has_method(id, CALL_ENTRY)),
        _ => false,
    }
}

/// Human-readable form of the value at `idx`.
///
/// Honors `__tostring` on tables and foreign types. The stack is left as it
/// was found.
pub fn to_display_string(l: &mut dyn ScriptStack, idx: i32) -> String {
    let value = l.value(idx).unwrap_or_default();
    let custom = match &value {
        Value::Table(t) => metafield(l, *t, TOSTRING_ENTRY),
        Value::Foreign(r) => l
            .foreign_type(*r)
            .and_then(|id| l.registry().method(id, TOSTRING_ENTRY))
            .map(Value::Function),
        _ => None,
    };

    if let Some(func) = custom {
        if let Some(s) = call_tostring(l, func, value.clone()) {
            return s;
        }
    }
    default_string(l, &value)
}

fn call_tostring(l: &mut dyn ScriptStack, func: Value, value: Value) -> Option<String> {
    let base = l.top();
    l.push(func);
    l.push(value);
    if let Err(err) = l.call(1, 1) {
        tracing::debug!(error = %err, "__tostring failed, using default representation");
        return None;
    }
    let result = l.value(-1);
    l.pop(l.top() - base);
    match result? {
        Value::String(s) => Some(s.to_string()),
        Value::Number(n) => Some(format_number(n)),
        _ => None,
    }
}

/// Default representation, used when no behaviour applies
fn default_string(l: &dyn ScriptStack, value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Number(n) => format_number(*n),
        Value::String(s) => s.to_string(),
        Value::Table(t) => table_placeholder(*t),
        Value::Function(f) => format!("function: {:p}", std::sync::Arc::as_ptr(f) as *const ()),
        Value::Foreign(r) => foreign_string(l, *r),
    }
}

fn table_placeholder(t: TableRef) -> String {
    format!("table: 0x{:08x}", t.slot())
}

fn foreign_string(l: &dyn ScriptStack, r: ForeignRef) -> String {
    let type_id = l.foreign_type(r);
    let data = l.foreign_data(r).and_then(|d| <[u8; 8]>::try_from(d).ok());
    match (type_id, data) {
        (Some(TypeId::INT64), Some(bytes)) => format!("{}LL", i64::from_ne_bytes(bytes)),
        (Some(TypeId::UINT64), Some(bytes)) => format!("{}ULL", u64::from_ne_bytes(bytes)),
        (Some(id), _) => {
            let name = l.registry().name_of(id).unwrap_or_else(|| id.to_string());
            format!("cdata<{}>: 0x{:08x}", name, r.slot())
        }
        (None, _) => format!("cdata: 0x{:08x}", r.slot()),
    }
}

fn metafield(l: &dyn ScriptStack, t: TableRef, name: &str) -> Option<Value> {
    let mt = l.metatable(t)?;
    match l.raw_get(mt, &Value::from(name)) {
        Ok(Value::Nil) | Err(_) => None,
        Ok(v) => Some(v),
    }
}

/// Format a number the way `%.14g` does
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }

    // 14 significant digits; the exponent decides between fixed and scientific
    let sci = format!("{:.13e}", n);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => return sci,
    };
    if !(-4..14).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exp.abs())
    } else {
        let decimals = (13 - exp) as usize;
        trim_fraction(&format!("{:.*}", decimals, n)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_integers() {
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(-0.0), "-0");
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-7.0), "-7");
        assert_eq!(format_number(1e14), "100000000000000");
    }

    #[test]
    fn test_format_fractions() {
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(3.14159), "3.14159");
        assert_eq!(format_number(0.1), "0.1");
        assert_eq!(format_number(1.0 / 3.0), "0.33333333333333");
    }

    #[test]
    fn test_format_scientific() {
        assert_eq!(format_number(1e15), "1e+15");
        assert_eq!(format_number(1e100), "1e+100");
        assert_eq!(format_number(1.5e-7), "1.5e-07");
        assert_eq!(format_number(2f64.powi(63)), "9.2233720368548e+18");
    }

    #[test]
    fn test_format_special() {
        assert_eq!(format_number(f64::INFINITY), "inf");
        assert_eq!(format_number(f64::NEG_INFINITY), "-inf");
        assert_eq!(format_number(f64::NAN), "nan");
    }
}
