use hostbridge::value::String as JsString;
use hostbridge::{Env, Error, Function, Number, Object, Result, Runtime};

fn math_init(env: Env, exports: Object, _module: Object) -> Result<Object> {
    let double = Function::new(&env, "double", |info| {
        let input = info.get(0)?.cast::<Number>().value()?;
        Ok(Number::new(&info.env(), input * 2.0)?.into())
    })?;
    exports.set("double", double)?;
    exports.set("version", JsString::new(&env, "1.0.0")?)?;
    Ok(exports)
}

#[test]
fn loaded_module_exposes_its_exports() {
    let mut rt = Runtime::new().unwrap();
    let env = rt.env();
    let exports = rt.load_module(math_init).unwrap();

    let version = exports.get("version").unwrap();
    assert_eq!(version.cast::<JsString>().to_utf8().unwrap(), "1.0.0");

    let double = exports.get("double").unwrap().cast::<Function>();
    let result = double
        .call(
            &env.undefined().unwrap(),
            &[Number::new(&env, 21.0).unwrap().into()],
        )
        .unwrap();
    assert_eq!(result.cast::<Number>().value().unwrap(), 42.0);
}

#[test]
fn module_exports_survive_collection() {
    let mut rt = Runtime::new().unwrap();
    let exports = rt.load_module(math_init).unwrap();
    rt.collect_garbage();
    let version = exports.get("version").unwrap();
    assert_eq!(version.cast::<JsString>().to_utf8().unwrap(), "1.0.0");
}

fn broken_init(env: Env, _exports: Object, _module: Object) -> Result<Object> {
    Err(Error::new(&env, "init exploded"))
}

#[test]
fn failing_init_surfaces_as_an_error() {
    let mut rt = Runtime::new().unwrap();
    let env = rt.env();
    let err = rt.load_module(broken_init).unwrap_err();
    assert_eq!(err.message(), "init exploded");
    // The guard threw, load_module captured; nothing stays pending.
    assert!(!env.is_exception_pending());
}

#[test]
fn init_may_replace_the_exports_object() {
    let mut rt = Runtime::new().unwrap();
    let exports = rt
        .load_module(|env, _exports, _module| {
            let replacement = Object::new(&env)?;
            replacement.set("kind", JsString::new(&env, "replacement")?)?;
            Ok(replacement)
        })
        .unwrap();
    let kind = exports.get("kind").unwrap();
    assert_eq!(kind.cast::<JsString>().to_utf8().unwrap(), "replacement");
}

// The entry-symbol macro has to expand in a downstream crate; expanding it
// here proves the generated signature matches the loader contract.
hostbridge::host_module!(math_init);
