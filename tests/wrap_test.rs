use std::sync::atomic::{AtomicUsize, Ordering};

use hostbridge::value::String as JsString;
use hostbridge::{
    Class, ClassBuilder, Env, Error, HandleScope, Number, Object, Reference, Result, Runtime,
    Value,
};

fn error_name(env: &Env, err: &Error) -> String {
    let _scope = HandleScope::new(env).unwrap();
    let value = err.value().unwrap();
    let name = value.coerce_to_object().unwrap().get("name").unwrap();
    name.cast::<JsString>().to_utf8().unwrap()
}

mod counter {
    use super::*;

    pub static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);
    pub static DROPPED: AtomicUsize = AtomicUsize::new(0);

    pub struct Counter {
        pub count: f64,
    }

    impl Class for Counter {
        fn constructor(info: &hostbridge::CallbackInfo) -> Result<Self> {
            let start = if info.is_empty() {
                0.0
            } else {
                info.get(0)?.cast::<Number>().value()?
            };
            CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
            Ok(Counter { count: start })
        }
    }

    impl Drop for Counter {
        fn drop(&mut self) {
            DROPPED.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn increment(this: &mut Counter, info: &hostbridge::CallbackInfo) -> Result<Value> {
        this.count += 1.0;
        Ok(Number::new(&info.env(), this.count)?.into())
    }

    pub fn get_count(this: &Counter, info: &hostbridge::CallbackInfo) -> Result<Value> {
        Ok(Number::new(&info.env(), this.count)?.into())
    }

    pub fn set_count(this: &mut Counter, info: &hostbridge::CallbackInfo) -> Result<()> {
        this.count = info.get(0)?.cast::<Number>().value()?;
        Ok(())
    }

    pub fn zero(info: &hostbridge::CallbackInfo) -> Result<Value> {
        Ok(Number::new(&info.env(), 0.0)?.into())
    }

    pub fn reset(this: &mut Counter, _info: &hostbridge::CallbackInfo) -> Result<()> {
        this.count = 0.0;
        Ok(())
    }
}

fn build_counter_class(env: &Env) -> hostbridge::Function {
    ClassBuilder::<counter::Counter>::new(env, "Counter")
        .method("increment", counter::increment)
        .void_method("reset", counter::reset)
        .accessor("count", Some(counter::get_count), Some(counter::set_count))
        .static_method("zero", counter::zero)
        .build()
        .unwrap()
}

#[test]
fn counter_class_end_to_end() {
    let mut rt = Runtime::new().unwrap();
    let env = rt.env();
    let ctor = build_counter_class(&env);

    // Calling without new is rejected with a type error and builds nothing.
    let before = counter::CONSTRUCTED.load(Ordering::SeqCst);
    let err = ctor.call(&env.undefined().unwrap(), &[]).unwrap_err();
    assert_eq!(error_name(&env, &err), "TypeError");
    assert_eq!(counter::CONSTRUCTED.load(Ordering::SeqCst), before);

    // Construct-call wraps an instance that unwrap recovers.
    let instance = ctor
        .new_instance(&[Number::new(&env, 10.0).unwrap().into()])
        .unwrap();
    assert_eq!(counter::CONSTRUCTED.load(Ordering::SeqCst), before + 1);
    assert!(instance.instance_of(&ctor).unwrap());
    let native = unsafe { hostbridge::wrap::unwrap::<counter::Counter>(&instance).unwrap() };
    assert_eq!(unsafe { &*native }.count, 10.0);

    // Method dispatch mutates the wrapped instance.
    let increment = instance
        .get("increment")
        .unwrap()
        .cast::<hostbridge::Function>();
    let result = increment.call(&instance.into(), &[]).unwrap();
    assert_eq!(result.cast::<Number>().value().unwrap(), 11.0);

    // Accessors read and write through the property.
    let count = instance.get("count").unwrap().cast::<Number>();
    assert_eq!(count.value().unwrap(), 11.0);
    instance
        .set("count", Number::new(&env, 99.0).unwrap())
        .unwrap();
    let count = instance.get("count").unwrap().cast::<Number>();
    assert_eq!(count.value().unwrap(), 99.0);

    // Void methods return undefined to the host.
    let reset = instance.get("reset").unwrap().cast::<hostbridge::Function>();
    let result = reset.call(&instance.into(), &[]).unwrap();
    assert!(result.is_undefined().unwrap());
    let count = instance.get("count").unwrap().cast::<Number>();
    assert_eq!(count.value().unwrap(), 0.0);

    // Static methods live on the constructor, not on instances.
    let zero = ctor.get("zero").unwrap().cast::<hostbridge::Function>();
    let result = zero.call(&env.undefined().unwrap(), &[]).unwrap();
    assert_eq!(result.cast::<Number>().value().unwrap(), 0.0);
    assert!(instance.get("zero").unwrap().is_undefined().unwrap());

    drop(rt);
}

mod settings {
    use super::*;

    pub static LIMIT: AtomicUsize = AtomicUsize::new(16);

    pub struct Settings;

    impl Class for Settings {
        fn constructor(_info: &hostbridge::CallbackInfo) -> Result<Self> {
            Ok(Settings)
        }
    }

    pub fn get_limit(info: &hostbridge::CallbackInfo) -> Result<Value> {
        let limit = LIMIT.load(Ordering::SeqCst) as f64;
        Ok(Number::new(&info.env(), limit)?.into())
    }

    pub fn set_limit(info: &hostbridge::CallbackInfo) -> Result<()> {
        let limit = info.get(0)?.cast::<Number>().value()?;
        LIMIT.store(limit as usize, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn static_accessors_and_values_live_on_the_constructor() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let kind = JsString::new(&env, "settings").unwrap();
    let ctor = ClassBuilder::<settings::Settings>::new(&env, "Settings")
        .static_accessor("limit", Some(settings::get_limit), Some(settings::set_limit))
        .static_value("kind", kind.into())
        .build()
        .unwrap();

    // Reads and writes dispatch without an instance.
    let limit = ctor.get("limit").unwrap().cast::<Number>();
    assert_eq!(limit.value().unwrap(), 16.0);
    ctor.set("limit", Number::new(&env, 64.0).unwrap()).unwrap();
    assert_eq!(settings::LIMIT.load(Ordering::SeqCst), 64);
    let limit = ctor.get("limit").unwrap().cast::<Number>();
    assert_eq!(limit.value().unwrap(), 64.0);

    let kind = ctor.get("kind").unwrap().cast::<JsString>();
    assert_eq!(kind.to_utf8().unwrap(), "settings");

    // Instances do not see constructor properties.
    let instance = ctor.new_instance(&[]).unwrap();
    assert!(instance.get("limit").unwrap().is_undefined().unwrap());
    assert!(instance.get("kind").unwrap().is_undefined().unwrap());
}

mod tracked {
    use super::*;

    pub static DROPPED: AtomicUsize = AtomicUsize::new(0);

    pub struct Tracked;

    impl Class for Tracked {
        fn constructor(_info: &hostbridge::CallbackInfo) -> Result<Self> {
            Ok(Tracked)
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            DROPPED.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn finalizer_runs_exactly_once_and_stale_unwrap_fails() {
    let mut rt = Runtime::new().unwrap();
    let env = rt.env();
    let ctor_ref = {
        let _scope = HandleScope::new(&env).unwrap();
        let ctor = ClassBuilder::<tracked::Tracked>::new(&env, "Tracked")
            .build()
            .unwrap();
        Reference::persistent(&ctor).unwrap()
    };

    let stale = {
        let _scope = HandleScope::new(&env).unwrap();
        let ctor = ctor_ref.value().unwrap().unwrap();
        ctor.new_instance(&[]).unwrap()
    };
    assert_eq!(tracked::DROPPED.load(Ordering::SeqCst), 0);

    rt.collect_garbage();
    assert_eq!(tracked::DROPPED.load(Ordering::SeqCst), 1);
    rt.collect_garbage();
    assert_eq!(tracked::DROPPED.load(Ordering::SeqCst), 1);

    // The stale handle errors instead of faulting.
    assert!(unsafe { hostbridge::wrap::unwrap::<tracked::Tracked>(&stale) }.is_err());
}

mod attached_hook {
    use super::*;

    pub struct Tagged;

    impl Class for Tagged {
        fn constructor(_info: &hostbridge::CallbackInfo) -> Result<Self> {
            Ok(Tagged)
        }

        fn attached(&mut self, env: &Env, this: &Object) -> Result<()> {
            this.set("tagged", hostbridge::Boolean::new(env, true)?)
        }
    }
}

#[test]
fn attached_hook_runs_after_wrapping() {
    let rt = Runtime::new().unwrap();
    let env = rt.env();
    let ctor = ClassBuilder::<attached_hook::Tagged>::new(&env, "Tagged")
        .build()
        .unwrap();
    let instance = ctor.new_instance(&[]).unwrap();
    let tagged = instance
        .get("tagged")
        .unwrap()
        .cast::<hostbridge::Boolean>();
    assert!(tagged.value().unwrap());
}
