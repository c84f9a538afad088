use std::sync::Arc;

use tether_runtime::State;
use tether_sdk::{
    array_len, map_len, native_fn, register_module, ErrorKind, NativeModule, ScriptStack,
    TypeRegistry, Value,
};

fn state() -> State {
    State::new(Arc::new(TypeRegistry::default()))
}

fn count_globals(l: &mut State) -> i64 {
    let globals = l.globals();
    l.push(Value::Table(globals));
    let n = map_len(l, -1).unwrap();
    l.pop(1);
    n
}

#[test]
fn test_register_module_twice_reuses_namespace() {
    let mut l = state();
    let first = native_fn(|_| Ok(0));
    let second = native_fn(|_| Ok(1));
    let extra = native_fn(|_| Ok(2));

    let t1 = register_module(&mut l, "mod", &[("f", first)]).unwrap();
    let t2 = register_module(&mut l, "mod", &[("f", second.clone()), ("g", extra)]).unwrap();
    assert_eq!(t1, t2);
    assert_eq!(l.global("mod").as_table(), Some(t1));
    assert_eq!(count_globals(&mut l), 1);

    match l.raw_get(t1, &Value::from("f")).unwrap() {
        Value::Function(f) => assert!(Arc::ptr_eq(&f, &second)),
        other => panic!("unexpected {:?}", other),
    }
    l.push(Value::Table(t1));
    assert_eq!(map_len(&l, -1).unwrap(), 2);
}

#[test]
fn test_dotted_module_names() {
    let mut l = state();
    let http = register_module(&mut l, "net.http", &[("get", native_fn(|_| Ok(0)))]).unwrap();
    let tcp = register_module(&mut l, "net.tcp", &[]).unwrap();
    assert_ne!(http, tcp);

    let net = l.global("net").as_table().unwrap();
    assert_eq!(l.raw_get(net, &Value::from("http")).unwrap().as_table(), Some(http));
    assert_eq!(l.raw_get(net, &Value::from("tcp")).unwrap().as_table(), Some(tcp));
}

#[test]
fn test_module_name_conflicts() {
    let mut l = state();
    l.set_global("taken", Value::from(1));
    let err = register_module(&mut l, "taken", &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert_eq!(l.global("taken").as_number(), Some(1.0));

    assert!(register_module(&mut l, "", &[]).is_err());
    assert!(register_module(&mut l, "a..b", &[]).is_err());
}

#[test]
fn test_registered_functions_are_callable() {
    let mut l = state();
    let mut module = NativeModule::new("math");
    module.register_function(
        "double",
        native_fn(|l| {
            let n = tether_sdk::check_int64(l, 1)?;
            tether_sdk::push_int64(l, n * 2);
            Ok(1)
        }),
    );
    let t = module.install(&mut l).unwrap();

    let f = l.raw_get(t, &Value::from("double")).unwrap();
    l.push(f);
    l.push(Value::from(21));
    l.call(1, 1).unwrap();
    assert_eq!(tether_sdk::check_int64(&l, -1).unwrap(), 42);
}

// ============================================================================
// Table lengths
// ============================================================================

#[test]
fn test_array_and_map_len() {
    let mut l = state();
    let t = l.new_table();
    for i in 1..=3 {
        l.raw_set(t, Value::from(i), Value::from("x")).unwrap();
    }
    l.raw_set(t, Value::from("name"), Value::from("y")).unwrap();
    l.raw_set(t, Value::from(2.5), Value::from(true)).unwrap();
    l.raw_set(t, Value::from(-4), Value::from(true)).unwrap();
    l.push(Value::Table(t));

    assert_eq!(array_len(&l, 1).unwrap(), 3);
    assert_eq!(map_len(&l, 1).unwrap(), 6);
}

#[test]
fn test_array_len_with_holes() {
    let mut l = state();
    let t = l.new_table();
    l.raw_set(t, Value::from(1), Value::from(1)).unwrap();
    l.raw_set(t, Value::from(7), Value::from(7)).unwrap();
    l.raw_set(t, Value::from(3), Value::from(3)).unwrap();
    l.raw_set(t, Value::from(7), Value::Nil).unwrap();
    l.push(Value::Table(t));

    assert_eq!(array_len(&l, -1).unwrap(), 3);
    assert_eq!(map_len(&l, -1).unwrap(), 2);
}

#[test]
fn test_lengths_of_empty_and_non_tables() {
    let mut l = state();
    let t = l.new_table();
    l.push(Value::Table(t));
    l.push(Value::from("not a table"));

    assert_eq!(array_len(&l, 1).unwrap(), 0);
    assert_eq!(map_len(&l, 1).unwrap(), 0);
    assert_eq!(array_len(&l, 2).unwrap_err().kind(), ErrorKind::TypeMismatch);
    assert_eq!(map_len(&l, 3).unwrap_err().kind(), ErrorKind::TypeMismatch);
}
