use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tether_runtime::State;
use tether_sdk::{
    ctypeid, is_callable, native_fn, push_foreign, push_int64, push_uint64, register_type,
    to_display_string, MarshalError, MethodTable, ScriptStack, TableRef, TypeRegistry, Value,
    CALL_ENTRY, TOSTRING_ENTRY,
};

fn state() -> State {
    State::new(Arc::new(TypeRegistry::default()))
}

fn table_with_meta(l: &mut State, name: &str, value: Value) -> TableRef {
    let t = l.new_table();
    let mt = l.new_table();
    l.raw_set(mt, Value::from(name), value).unwrap();
    l.set_metatable(t, Some(mt)).unwrap();
    t
}

// ============================================================================
// is_callable
// ============================================================================

#[test]
fn test_callable_basics() {
    let mut l = state();
    l.push(Value::Function(native_fn(|_| Ok(0))));
    l.push(Value::from(1));
    l.push(Value::from("print"));
    let plain = l.new_table();
    l.push(Value::Table(plain));

    assert!(is_callable(&l, 1));
    assert!(!is_callable(&l, 2));
    assert!(!is_callable(&l, 3));
    assert!(!is_callable(&l, 4));
    assert!(!is_callable(&l, 5));
}

#[test]
fn test_callable_table_is_not_invoked() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let mut l = state();
    let t = table_with_meta(
        &mut l,
        CALL_ENTRY,
        Value::Function(native_fn(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        })),
    );
    l.push(Value::Table(t));
    assert!(is_callable(&l, -1));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(l.top(), 1);
}

#[test]
fn test_callable_foreign_types() {
    let mut l = state();
    let callable = register_type(
        &l,
        "struct closure { int env; }",
        MethodTable::new().method(CALL_ENTRY, native_fn(|_| Ok(0))),
    )
    .unwrap();
    let inert = ctypeid(&l, "struct blob { int data; }").unwrap();

    push_foreign(&mut l, callable).unwrap();
    push_foreign(&mut l, inert).unwrap();
    assert!(is_callable(&l, 1));
    assert!(!is_callable(&l, 2));
}

// ============================================================================
// to_display_string
// ============================================================================

#[test]
fn test_display_primitives() {
    let mut l = state();
    l.push(Value::Nil);
    l.push(Value::from(true));
    l.push(Value::from(42));
    l.push(Value::from(0.25));
    l.push(Value::from("text"));

    assert_eq!(to_display_string(&mut l, 1), "nil");
    assert_eq!(to_display_string(&mut l, 2), "true");
    assert_eq!(to_display_string(&mut l, 3), "42");
    assert_eq!(to_display_string(&mut l, 4), "0.25");
    assert_eq!(to_display_string(&mut l, 5), "text");
    assert_eq!(to_display_string(&mut l, 6), "nil");
    assert_eq!(l.top(), 5);
}

#[test]
fn test_display_wide_integers() {
    let mut l = state();
    push_uint64(&mut l, u64::MAX);
    push_int64(&mut l, i64::MIN);
    assert_eq!(to_display_string(&mut l, 1), "18446744073709551615ULL");
    assert_eq!(to_display_string(&mut l, 2), "-9223372036854775808LL");
}

#[test]
fn test_display_placeholders() {
    let mut l = state();
    let t = l.new_table();
    l.push(Value::Table(t));
    l.push(Value::Function(native_fn(|_| Ok(0))));
    let id = ctypeid(&l, "struct point { int32_t x, y; }").unwrap();
    push_foreign(&mut l, id).unwrap();

    assert!(to_display_string(&mut l, 1).starts_with("table: 0x"));
    assert!(to_display_string(&mut l, 2).starts_with("function: "));
    assert!(to_display_string(&mut l, 3).starts_with("cdata<struct point>: 0x"));
}

#[test]
fn test_display_custom_tostring() {
    let mut l = state();
    let t = table_with_meta(
        &mut l,
        TOSTRING_ENTRY,
        Value::Function(native_fn(|l| {
            assert!(matches!(l.value(1), Some(Value::Table(_))));
            l.push(Value::from("<config>"));
            Ok(1)
        })),
    );
    l.push(Value::from("below"));
    l.push(Value::Table(t));
    assert_eq!(to_display_string(&mut l, -1), "<config>");
    assert_eq!(l.top(), 2);
    assert_eq!(l.value(1).unwrap().as_str(), Some("below"));
}

#[test]
fn test_display_failing_tostring_falls_back() {
    let mut l = state();
    let failing = table_with_meta(
        &mut l,
        TOSTRING_ENTRY,
        Value::Function(native_fn(|_| Err(MarshalError::Runtime("nope".into())))),
    );
    let wrong_type = table_with_meta(
        &mut l,
        TOSTRING_ENTRY,
        Value::Function(native_fn(|l| {
            l.push(Value::from(true));
            Ok(1)
        })),
    );
    l.push(Value::Table(failing));
    l.push(Value::Table(wrong_type));
    assert!(to_display_string(&mut l, 1).starts_with("table: 0x"));
    assert!(to_display_string(&mut l, 2).starts_with("table: 0x"));
    assert_eq!(l.top(), 2);
}

#[test]
fn test_display_foreign_tostring() {
    let mut l = state();
    let methods = MethodTable::new().method(
        TOSTRING_ENTRY,
        native_fn(|l| {
            let (data, _) = tether_sdk::check_foreign(l, 1)?;
            let port = u16::from_ne_bytes([data[0], data[1]]);
            l.push(Value::from(format!("port {}", port)));
            Ok(1)
        }),
    );
    let id = register_type(&l, "struct port { uint16_t number; }", methods).unwrap();
    push_foreign(&mut l, id)
        .unwrap()
        .copy_from_slice(&8080u16.to_ne_bytes());
    assert_eq!(to_display_string(&mut l, 1), "port 8080");
}
