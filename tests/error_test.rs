use hostbridge::value::String as JsString;
use hostbridge::{Array, Error, ErrorKind, Function, HandleScope, Number, Object, Runtime, Value};

#[test]
fn type_expectation_failures_surface_as_type_errors() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    let text = JsString::new(&env, "abc").unwrap();
    let err = text.cast::<Number>().value().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeError);
    assert_eq!(err.message(), "a number was expected");
}

#[test]
fn other_failures_surface_as_plain_errors() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    let object = Object::new(&env).unwrap();
    let err = Value::from(object).cast::<Array>().len().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Error);
}

#[test]
fn explicit_errors_carry_their_message() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    let err = Error::new(&env, "something went sideways");
    assert_eq!(err.kind(), ErrorKind::Error);
    assert_eq!(err.message(), "something went sideways");
    let value = err.value().unwrap();
    assert!(value.is_error().unwrap());
}

#[test]
fn callback_errors_become_host_exceptions_for_the_caller() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    let failing = Function::new(&env, "failing", |info| {
        Err(Error::range_error(&info.env(), "out of range"))
    })
    .unwrap();
    let err = failing.call(&env.undefined().unwrap(), &[]).unwrap_err();
    assert_eq!(err.message(), "out of range");
    // The exception was consumed into the native error; nothing stays
    // pending.
    assert!(!env.is_exception_pending());
}

#[test]
fn callback_results_flow_back_through_the_return_slot() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    let add = Function::new(&env, "add", |info| {
        let a = info.get(0)?.cast::<Number>().value()?;
        let b = info.get(1)?.cast::<Number>().value()?;
        Ok(Number::new(&info.env(), a + b)?.into())
    })
    .unwrap();
    let result = add
        .call(
            &env.undefined().unwrap(),
            &[
                Number::new(&env, 2.0).unwrap().into(),
                Number::new(&env, 40.0).unwrap().into(),
            ],
        )
        .unwrap();
    assert_eq!(result.cast::<Number>().value().unwrap(), 42.0);
}

#[test]
fn missing_arguments_read_as_undefined() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    let probe = Function::new(&env, "probe", |info| {
        let missing = info.get(5)?;
        hostbridge::Boolean::new(&info.env(), missing.is_undefined()?).map(Into::into)
    })
    .unwrap();
    let result = probe.call(&env.undefined().unwrap(), &[]).unwrap();
    assert!(result.cast::<hostbridge::Boolean>().value().unwrap());
}

#[test]
fn thrown_values_round_trip_through_error_wrappers() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let _scope = HandleScope::new(&env).unwrap();
    let rethrower = Function::new(&env, "rethrower", |info| {
        let payload = JsString::new(&info.env(), "custom payload")?;
        Err(Error::from_value(&info.env(), payload.into()))
    })
    .unwrap();
    let err = rethrower.call(&env.undefined().unwrap(), &[]).unwrap_err();
    let value = err.value().unwrap();
    assert_eq!(
        value.coerce_to_string().unwrap().to_utf8().unwrap(),
        "custom payload"
    );
}
