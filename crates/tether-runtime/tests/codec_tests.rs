use std::sync::Arc;

use proptest::prelude::*;
use tether_runtime::State;
use tether_sdk::{
    check_int64, check_uint64, push_foreign, push_int64, push_uint64, to_display_string,
    to_int64, to_uint64, to_uint64_wrapping, ErrorKind, ScriptStack, TypeId, TypeRegistry, Value,
};

fn state() -> State {
    State::new(Arc::new(TypeRegistry::default()))
}

// ============================================================================
// Round trips
// ============================================================================

proptest! {
    #[test]
    fn prop_int64_roundtrip(v in any::<i64>()) {
        let mut l = state();
        push_int64(&mut l, v);
        prop_assert_eq!(check_int64(&l, -1).unwrap(), v);
        prop_assert_eq!(to_int64(&l, -1), v);
    }

    #[test]
    fn prop_uint64_roundtrip(v in any::<u64>()) {
        let mut l = state();
        push_uint64(&mut l, v);
        prop_assert_eq!(check_uint64(&l, -1).unwrap(), v);
        prop_assert_eq!(to_uint64(&l, -1), v);
    }

    #[test]
    fn prop_decimal_string_reads_back(v in any::<u64>()) {
        let mut l = state();
        l.push(Value::from(format!("  {} ", v)));
        prop_assert_eq!(check_uint64(&l, 1).unwrap(), v);
    }
}

#[test]
fn test_int64_extremes() {
    let mut l = state();
    push_int64(&mut l, i64::MIN);
    push_int64(&mut l, i64::MAX);
    assert_eq!(check_int64(&l, 1).unwrap(), i64::MIN);
    assert_eq!(check_int64(&l, 2).unwrap(), i64::MAX);
}

#[test]
fn test_canonical_write_form_is_foreign() {
    let mut l = state();
    push_uint64(&mut l, 7);
    push_int64(&mut l, 7);
    let unsigned = l.value(1).and_then(|v| v.as_foreign()).unwrap();
    let signed = l.value(2).and_then(|v| v.as_foreign()).unwrap();
    assert_eq!(l.foreign_type(unsigned), Some(TypeId::UINT64));
    assert_eq!(l.foreign_type(signed), Some(TypeId::INT64));
}

// ============================================================================
// Strings
// ============================================================================

#[test]
fn test_max_unsigned_string() {
    let mut l = state();
    l.push(Value::from("18446744073709551615"));
    assert_eq!(check_uint64(&l, -1).unwrap(), u64::MAX);
    assert_eq!(check_int64(&l, -1).unwrap_err().kind(), ErrorKind::ConversionFailure);
}

#[test]
fn test_malformed_string() {
    let mut l = state();
    l.push(Value::from("not a number"));
    let err = check_uint64(&l, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConversionFailure);
    assert!(err.to_string().contains("not convertible to integer"));
    assert_eq!(to_uint64(&l, 1), 0);
    assert_eq!(to_int64(&l, 1), 0);
}

#[test]
fn test_string_forms() {
    let mut l = state();
    l.push(Value::from("\t-42\n"));
    l.push(Value::from("+0x10"));
    l.push(Value::from("123ULL"));
    l.push(Value::from("12 monkeys"));
    assert_eq!(check_int64(&l, 1).unwrap(), -42);
    assert_eq!(check_uint64(&l, 2).unwrap(), 16);
    assert_eq!(check_uint64(&l, 3).unwrap(), 123);
    assert!(check_int64(&l, 4).is_err());
}

#[test]
fn test_display_form_reads_back() {
    let mut l = state();
    push_int64(&mut l, -9);
    let shown = to_display_string(&mut l, -1);
    assert_eq!(shown, "-9LL");
    l.push(Value::from(shown));
    assert_eq!(check_int64(&l, -1).unwrap(), -9);
}

// ============================================================================
// Numbers
// ============================================================================

#[test]
fn test_numbers() {
    let mut l = state();
    l.push(Value::from(42));
    l.push(Value::from(-1));
    l.push(Value::from(2.5));
    l.push(Value::from(f64::NAN));
    l.push(Value::from(1e20));

    assert_eq!(check_uint64(&l, 1).unwrap(), 42);
    assert_eq!(check_int64(&l, 2).unwrap(), -1);
    for idx in 3..=5 {
        assert!(check_int64(&l, idx).is_err());
        assert_eq!(to_int64(&l, idx), 0);
    }
}

#[test]
fn test_negative_unsigned_policy() {
    let mut l = state();
    l.push(Value::from(-1));
    push_int64(&mut l, i64::MIN);

    let err = check_uint64(&l, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConversionFailure);
    assert_eq!(to_uint64(&l, 1), 0);
    assert_eq!(to_uint64_wrapping(&l, 1), u64::MAX);
    assert_eq!(to_uint64_wrapping(&l, 2), 1 << 63);
}

#[test]
fn test_unsigned_too_large_for_signed() {
    let mut l = state();
    push_uint64(&mut l, u64::MAX);
    assert!(check_int64(&l, 1).is_err());
    assert_eq!(to_int64(&l, 1), 0);
}

// ============================================================================
// Other representations
// ============================================================================

#[test]
fn test_narrow_integer_foreign_values() {
    let mut l = state();
    push_foreign(&mut l, TypeId::INT16)
        .unwrap()
        .copy_from_slice(&(-300i16).to_ne_bytes());
    push_foreign(&mut l, TypeId::UINT8).unwrap()[0] = 200;
    assert_eq!(check_int64(&l, 1).unwrap(), -300);
    assert_eq!(check_uint64(&l, 2).unwrap(), 200);
    assert!(check_uint64(&l, 1).is_err());
}

#[test]
fn test_non_integer_values_rejected() {
    let mut l = state();
    l.push(Value::from(true));
    let t = l.new_table();
    l.push(Value::Table(t));
    push_foreign(&mut l, TypeId::DOUBLE).unwrap();

    for idx in 1..=3 {
        let err = check_uint64(&l, idx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConversionFailure);
    }
    // absent slot
    assert!(check_int64(&l, 10).is_err());
    assert_eq!(to_uint64(&l, 10), 0);
}
