use hostbridge::value::String as JsString;
use hostbridge::{
    Array, ArrayBuffer, Boolean, Buffer, External, HandleScope, Number, Object, Runtime,
    TypedArrayOf, Value,
};

#[test]
fn string_round_trips_are_byte_identical() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    for text in ["", "abc", "héllo wörld \u{1F980}"] {
        let _scope = HandleScope::new(&env).unwrap();
        let proxy = JsString::new(&env, text).unwrap();
        assert_eq!(proxy.to_utf8().unwrap(), text);
    }
}

#[test]
fn utf16_strings_convert_both_ways() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    let units: Vec<u16> = "snøfall".encode_utf16().collect();
    let proxy = JsString::from_utf16(&env, &units).unwrap();
    assert_eq!(proxy.to_utf8().unwrap(), "snøfall");
    assert_eq!(proxy.to_utf16().unwrap(), units);
}

#[test]
fn number_accessors_truncate_consistently() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    let n = Number::new(&env, 42.9).unwrap();
    assert_eq!(n.value().unwrap(), 42.9);
    assert_eq!(n.int32().unwrap(), 42);
    assert_eq!(n.uint32().unwrap(), 42);
    assert_eq!(n.int64().unwrap(), 42);
}

#[test]
fn type_checks_reflect_host_categories() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    assert!(env.undefined().unwrap().is_undefined().unwrap());
    assert!(env.null().unwrap().is_null().unwrap());
    assert!(Boolean::new(&env, true).unwrap().is_boolean().unwrap());
    assert!(JsString::new(&env, "x").unwrap().is_string().unwrap());
    let object = Object::new(&env).unwrap();
    assert!(object.is_object().unwrap());
    assert!(!object.is_array().unwrap());
    assert!(Array::new(&env).unwrap().is_array().unwrap());
}

#[test]
fn strict_equality_is_content_for_primitives_identity_for_objects() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    let a = JsString::new(&env, "same").unwrap();
    let b = JsString::new(&env, "same").unwrap();
    assert!(Value::from(a).strict_equals(&b.into()).unwrap());

    let x = Object::new(&env).unwrap();
    let y = Object::new(&env).unwrap();
    assert!(Value::from(x).strict_equals(&x.into()).unwrap());
    assert!(!Value::from(x).strict_equals(&y.into()).unwrap());
}

#[test]
fn coercions_follow_host_rules() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    let empty = JsString::new(&env, "").unwrap();
    assert!(!empty.coerce_to_boolean().unwrap().value().unwrap());
    let forty_two = JsString::new(&env, " 42 ").unwrap();
    assert_eq!(forty_two.coerce_to_number().unwrap().value().unwrap(), 42.0);
    let n = Number::new(&env, 3.0).unwrap();
    assert_eq!(n.coerce_to_string().unwrap().to_utf8().unwrap(), "3");
}

#[test]
fn externals_round_trip_their_pointer() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    let external = External::new(&env, Box::new(7usize)).unwrap();
    let data = external.data().unwrap();
    assert_eq!(unsafe { *data }, 7);
}

#[test]
fn array_elements_and_length() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    let array = Array::new(&env).unwrap();
    array.set_element(0, Number::new(&env, 1.0).unwrap()).unwrap();
    array.set_element(2, Number::new(&env, 3.0).unwrap()).unwrap();
    assert_eq!(array.len().unwrap(), 3);
    let hole = array.get_element(1).unwrap();
    assert!(hole.is_undefined().unwrap());
    let third = array.get_element(2).unwrap().cast::<Number>();
    assert_eq!(third.value().unwrap(), 3.0);
}

#[test]
fn object_properties_round_trip() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    let object = Object::new(&env).unwrap();
    object.set("answer", Number::new(&env, 42.0).unwrap()).unwrap();
    assert!(object.has("answer").unwrap());
    assert!(!object.has("question").unwrap());
    let read = object.get("answer").unwrap().cast::<Number>();
    assert_eq!(read.value().unwrap(), 42.0);
    let missing = object.get("question").unwrap();
    assert!(missing.is_undefined().unwrap());
}

#[test]
fn array_buffers_expose_writable_storage() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    let mut buffer = ArrayBuffer::new(&env, 4).unwrap();
    assert_eq!(buffer.byte_length().unwrap(), 4);
    buffer.as_mut_slice().unwrap().copy_from_slice(&[1, 2, 3, 4]);
    assert_eq!(buffer.to_bytes().unwrap().as_ref(), &[1, 2, 3, 4]);
}

#[test]
fn typed_arrays_view_their_buffer() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    let mut view = TypedArrayOf::<u32>::new(&env, 3).unwrap();
    view.as_mut_slice().unwrap().copy_from_slice(&[10, 20, 30]);
    assert_eq!(view.len().unwrap(), 3);
    assert_eq!(view.as_slice().unwrap(), &[10, 20, 30]);
    assert!(view.is_typed_array().unwrap());
    let narrowed = view.try_typed::<u32>().unwrap();
    assert!(narrowed.is_some());
    assert!(view.try_typed::<f64>().unwrap().is_none());
    // The backing buffer sees the same bytes.
    let backing = view.array_buffer().unwrap();
    assert_eq!(backing.byte_length().unwrap(), 12);
}

#[test]
fn buffers_copy_and_snapshot() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    let buffer = Buffer::copy_from(&env, b"abc").unwrap();
    assert!(buffer.is_buffer().unwrap());
    assert_eq!(buffer.len().unwrap(), 3);
    assert_eq!(buffer.to_bytes().unwrap().as_ref(), b"abc");
}
