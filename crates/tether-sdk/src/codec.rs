//! Numeric codec for 64-bit integers
//!
//! Script numbers are doubles and cannot hold every 64-bit integer, so wide
//! integers are written as foreign values of the reserved `int64_t` /
//! `uint64_t` types. Reads accept three representations:
//!
//! - a script number holding an integral value
//! - a foreign value of any integer type (the reserved wide types included)
//! - a string holding a decimal or `0x` hexadecimal literal, optionally signed,
//!   surrounded by whitespace and suffixed with `LL` / `ULL`
//!
//! Out-of-range values are rejected by the checked readers. The unchecked
//! readers return 0 for anything the checked readers reject, except
//! [`to_uint64_wrapping`], which maps negative values by two's complement.

use crate::context::ScriptStack;
use crate::error::{MarshalError, MarshalResult};
use crate::registry::TypeId;
use crate::value::Value;

/// Push `value` as a `uint64_t` foreign value
pub fn push_uint64(l: &mut dyn ScriptStack, value: u64) {
    push_wide(l, TypeId::UINT64, value.to_ne_bytes());
}

/// Push `value` as an `int64_t` foreign value
pub fn push_int64(l: &mut dyn ScriptStack, value: i64) {
    push_wide(l, TypeId::INT64, value.to_ne_bytes());
}

fn push_wide(l: &mut dyn ScriptStack, type_id: TypeId, bytes: [u8; 8]) {
    let r = l.alloc_foreign(type_id, bytes.len());
    if let Some(data) = l.foreign_data_mut(r) {
        data.copy_from_slice(&bytes);
    }
}

/// Read the value at `idx` as `u64`, raising a conversion failure if impossible
pub fn check_uint64(l: &dyn ScriptStack, idx: i32) -> MarshalResult<u64> {
    read_integer(l, idx)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| MarshalError::not_integer(idx))
}

/// Read the value at `idx` as `i64`, raising a conversion failure if impossible
pub fn check_int64(l: &dyn ScriptStack, idx: i32) -> MarshalResult<i64> {
    read_integer(l, idx)
        .and_then(|n| i64::try_from(n).ok())
        .ok_or_else(|| MarshalError::not_integer(idx))
}

/// Read the value at `idx` as `u64`, or 0 if it cannot be converted
pub fn to_uint64(l: &dyn ScriptStack, idx: i32) -> u64 {
    check_uint64(l, idx).unwrap_or(0)
}

/// Read the value at `idx` as `i64`, or 0 if it cannot be converted
pub fn to_int64(l: &dyn ScriptStack, idx: i32) -> i64 {
    check_int64(l, idx).unwrap_or(0)
}

/// Read the value at `idx` as `u64`, wrapping negative values.
///
/// `-1` reads as `u64::MAX`. Values outside `i64::MIN..=u64::MAX` and
/// unconvertible values read as 0.
pub fn to_uint64_wrapping(l: &dyn ScriptStack, idx: i32) -> u64 {
    match read_integer(l, idx) {
        Some(n) if n >= 0 => u64::try_from(n).unwrap_or(0),
        Some(n) => i64::try_from(n).map_or(0, |n| n as u64),
        None => 0,
    }
}

/// Integer held at `idx` in any accepted representation, widened to `i128`
fn read_integer(l: &dyn ScriptStack, idx: i32) -> Option<i128> {
    match l.value(idx)? {
        Value::Number(n) => number_to_integer(n),
        Value::String(s) => parse_integer(&s),
        Value::Foreign(r) => {
            let type_id = l.foreign_type(r)?;
            let signed = l
                .registry()
                .with_ctype(type_id, |t| t.integer_signedness())
                .flatten()?;
            decode_integer(l.foreign_data(r)?, signed)
        }
        _ => None,
    }
}

fn number_to_integer(n: f64) -> Option<i128> {
    // 2^64 is exactly representable; anything at or beyond it is out of range
    const LIMIT: f64 = 18446744073709551616.0;
    if n.is_finite() && n.fract() == 0.0 && n > -LIMIT && n < LIMIT {
        Some(n as i128)
    } else {
        None
    }
}

fn decode_integer(data: &[u8], signed: bool) -> Option<i128> {
    let value = match (data.len(), signed) {
        (1, true) => i8::from_ne_bytes(data.try_into().ok()?) as i128,
        (1, false) => u8::from_ne_bytes(data.try_into().ok()?) as i128,
        (2, true) => i16::from_ne_bytes(data.try_into().ok()?) as i128,
        (2, false) => u16::from_ne_bytes(data.try_into().ok()?) as i128,
        (4, true) => i32::from_ne_bytes(data.try_into().ok()?) as i128,
        (4, false) => u32::from_ne_bytes(data.try_into().ok()?) as i128,
        (8, true) => i64::from_ne_bytes(data.try_into().ok()?) as i128,
        (8, false) => u64::from_ne_bytes(data.try_into().ok()?) as i128,
        _ => return None,
    };
    Some(value)
}

/// Parse an integer literal as accepted by the string representation
pub fn parse_integer(s: &str) -> Option<i128> {
    let s = s.trim_matches(|c: char| c.is_ascii_whitespace() || c == '\x0b');
    let (negative, s) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    let s = strip_suffix_ignore_case(s, "ull")
        .or_else(|| strip_suffix_ignore_case(s, "ll"))
        .unwrap_or(s);
    let (radix, digits) = match s.get(..2) {
        Some("0x") | Some("0X") => (16, &s[2..]),
        _ => (10, s),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let magnitude = u64::from_str_radix(digits, radix).ok()? as i128;
    Some(if negative { -magnitude } else { magnitude })
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let split = s.len().checked_sub(suffix.len())?;
    if s.is_char_boundary(split) && s[split..].eq_ignore_ascii_case(suffix) {
        Some(&s[..split])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_integer("42"), Some(42));
        assert_eq!(parse_integer("  -17\t\n"), Some(-17));
        assert_eq!(parse_integer("+8"), Some(8));
        assert_eq!(parse_integer("18446744073709551615"), Some(u64::MAX as i128));
        assert_eq!(parse_integer("-9223372036854775808"), Some(i64::MIN as i128));
    }

    #[test]
    fn test_parse_hex_and_suffix() {
        assert_eq!(parse_integer("0xff"), Some(255));
        assert_eq!(parse_integer("0XFFFFFFFFFFFFFFFF"), Some(u64::MAX as i128));
        assert_eq!(parse_integer("12ULL"), Some(12));
        assert_eq!(parse_integer("-5LL"), Some(-5));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_integer(""), None);
        assert_eq!(parse_integer("   "), None);
        assert_eq!(parse_integer("-"), None);
        assert_eq!(parse_integer("not a number"), None);
        assert_eq!(parse_integer("12abc"), None);
        assert_eq!(parse_integer("1 2"), None);
        assert_eq!(parse_integer("1.5"), None);
        assert_eq!(parse_integer("0x"), None);
        assert_eq!(parse_integer("18446744073709551616"), None);
        assert_eq!(parse_integer("--1"), None);
    }

    #[test]
    fn test_number_to_integer() {
        assert_eq!(number_to_integer(3.0), Some(3));
        assert_eq!(number_to_integer(-0.0), Some(0));
        assert_eq!(number_to_integer(2.5), None);
        assert_eq!(number_to_integer(f64::NAN), None);
        assert_eq!(number_to_integer(f64::INFINITY), None);
        assert_eq!(number_to_integer(18446744073709551616.0), None);
        assert_eq!(number_to_integer(9007199254740992.0), Some(9007199254740992));
    }

    #[test]
    fn test_decode_integer_widths() {
        assert_eq!(decode_integer(&(-3i8).to_ne_bytes(), true), Some(-3));
        assert_eq!(decode_integer(&200u8.to_ne_bytes(), false), Some(200));
        assert_eq!(decode_integer(&u64::MAX.to_ne_bytes(), false), Some(u64::MAX as i128));
        assert_eq!(decode_integer(&[0u8; 3], true), None);
    }
}
