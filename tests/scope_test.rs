use hostbridge::value::String as JsString;
use hostbridge::{EscapableHandleScope, HandleScope, Number, Runtime, Value};

#[test]
fn handles_die_with_their_scope_once_collected() {
    let mut rt = Runtime::new().unwrap();
    let env = rt.env();
    let stale = {
        let _scope = HandleScope::new(&env).unwrap();
        Number::new(&env, 5.0).unwrap()
    };
    rt.collect_garbage();
    // The value was only rooted by the closed scope; any use now reports an
    // error instead of faulting.
    assert!(stale.value().is_err());
}

#[test]
fn escaped_handles_survive_the_scope_and_collection() {
    let mut rt = Runtime::new().unwrap();
    let env = rt.env();
    let kept = {
        let scope = EscapableHandleScope::new(&env).unwrap();
        let value = JsString::new(&env, "escaped").unwrap();
        scope.escape(value).unwrap()
    };
    rt.collect_garbage();
    assert_eq!(kept.to_utf8().unwrap(), "escaped");
}

#[test]
fn escaped_handle_is_strictly_equal_to_its_pre_escape_value() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _outer = HandleScope::new(&env).unwrap();
    let scope = EscapableHandleScope::new(&env).unwrap();
    let original = Number::new(&env, 11.0).unwrap();
    let escaped = scope.escape(original).unwrap();
    assert!(Value::from(escaped).strict_equals(&original.into()).unwrap());
}

#[test]
fn nested_scopes_keep_outer_handles_alive() {
    let mut rt = Runtime::new().unwrap();
    let env = rt.env();
    let _outer_scope = HandleScope::new(&env).unwrap();
    let outer = Number::new(&env, 1.0).unwrap();
    {
        let _inner = HandleScope::new(&env).unwrap();
        let _ = Number::new(&env, 2.0).unwrap();
    }
    rt.collect_garbage();
    assert_eq!(outer.value().unwrap(), 1.0);
}
