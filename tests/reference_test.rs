use hostbridge::value::String as JsString;
use hostbridge::{HandleScope, Object, Reference, Runtime, Value};

#[test]
fn weak_reference_reads_as_undefined_after_collection() {
    let mut rt = Runtime::new().unwrap();
    let env = rt.env();
    let weak = {
        let _scope = HandleScope::new(&env).unwrap();
        let target = Object::new(&env).unwrap();
        Reference::weak(&target).unwrap()
    };
    rt.collect_garbage();
    assert!(weak.value().unwrap().is_none());
    let sentinel = weak.value_or_undefined().unwrap();
    assert!(sentinel.is_undefined().unwrap());
}

#[test]
fn persistent_reference_survives_scopes_and_collection() {
    let mut rt = Runtime::new().unwrap();
    let env = rt.env();
    let strong = {
        let _scope = HandleScope::new(&env).unwrap();
        let target = JsString::new(&env, "pinned").unwrap();
        Reference::persistent(&target).unwrap()
    };
    {
        let _scope = HandleScope::new(&env).unwrap();
    }
    rt.collect_garbage();
    let _scope = HandleScope::new(&env).unwrap();
    let value = strong.value().unwrap().unwrap();
    assert_eq!(value.to_utf8().unwrap(), "pinned");
    assert!(strong.strict_equals(&strong).unwrap());
}

#[test]
fn unref_then_ref_restores_a_retrievable_target() {
    let mut rt = Runtime::new().unwrap();
    let env = rt.env();
    let mut reference = {
        let _scope = HandleScope::new(&env).unwrap();
        let target = Object::new(&env).unwrap();
        Reference::persistent(&target).unwrap()
    };
    assert_eq!(reference.unref().unwrap(), 0);
    assert_eq!(reference.add_ref().unwrap(), 1);
    rt.collect_garbage();
    assert!(reference.value().unwrap().is_some());
}

#[test]
fn reset_empties_the_reference() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    let target = Object::new(&env).unwrap();
    let mut reference = Reference::persistent(&target).unwrap();
    reference.reset().unwrap();
    assert!(reference.is_empty());
    assert!(reference.value().unwrap().is_none());
}

#[test]
fn reset_to_repoints_at_a_new_target() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    let first = JsString::new(&env, "first").unwrap();
    let second = JsString::new(&env, "second").unwrap();
    let mut reference = Reference::persistent(&first).unwrap();
    reference.reset_to(&second, 1).unwrap();
    let value = reference.value().unwrap().unwrap();
    assert_eq!(value.to_utf8().unwrap(), "second");
}

#[test]
fn object_reference_reads_properties_through_its_own_scope() {
    let mut rt = Runtime::new().unwrap();
    let env = rt.env();
    let reference = {
        let _scope = HandleScope::new(&env).unwrap();
        let target = Object::new(&env).unwrap();
        target
            .set("greeting", Value::from(JsString::new(&env, "hello").unwrap()))
            .unwrap();
        Reference::persistent(&target).unwrap()
    };
    rt.collect_garbage();
    let greeting = reference.get("greeting").unwrap();
    assert_eq!(greeting.cast::<JsString>().to_utf8().unwrap(), "hello");
}
