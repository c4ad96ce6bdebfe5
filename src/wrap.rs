//! Native classes: host constructors backed by Rust types.
//!
//! A registered class produces host instances that each own a boxed Rust
//! value. The box is attached with `wrap` and released by the host finalizer
//! when the instance is collected; method and accessor trampolines recover it
//! with `unwrap`.

use std::ffi::c_void;

use crate::callback::CallbackInfo;
use crate::env::Env;
use crate::error::{Error, Result};
use crate::function::{dispatch, Function};
use crate::object::Object;
use crate::sys;
use crate::value::{TypedValue, Value};

/// A Rust type exposed as a host class.
pub trait Class: Sized + 'static {
    /// Builds the native state for one instance. Runs under construct-call
    /// semantics only; plain calls are rejected before this point.
    fn constructor(info: &CallbackInfo) -> Result<Self>;

    /// Runs after the instance has been wrapped into its host object. The
    /// default does nothing.
    fn attached(&mut self, _env: &Env, _this: &Object) -> Result<()> {
        Ok(())
    }
}

pub type InstanceMethod<T> = fn(&mut T, &CallbackInfo) -> Result<Value>;
pub type InstanceVoidMethod<T> = fn(&mut T, &CallbackInfo) -> Result<()>;
pub type InstanceGetter<T> = fn(&T, &CallbackInfo) -> Result<Value>;
pub type InstanceSetter<T> = fn(&mut T, &CallbackInfo) -> Result<()>;
pub type StaticMethod = fn(&CallbackInfo) -> Result<Value>;
pub type StaticVoidMethod = fn(&CallbackInfo) -> Result<()>;
pub type StaticGetter = fn(&CallbackInfo) -> Result<Value>;
pub type StaticSetter = fn(&CallbackInfo) -> Result<()>;

/// What a class property is. One variant per shape, so a registration can
/// never mix, say, a method slot with an accessor pair.
pub enum PropertyKind<T: Class> {
    Method { method: InstanceMethod<T> },
    VoidMethod { method: InstanceVoidMethod<T> },
    Accessor {
        getter: Option<InstanceGetter<T>>,
        setter: Option<InstanceSetter<T>>,
    },
    StaticMethod { method: StaticMethod },
    StaticVoidMethod { method: StaticVoidMethod },
    StaticAccessor {
        getter: Option<StaticGetter>,
        setter: Option<StaticSetter>,
    },
    Value { value: Value },
    StaticValue { value: Value },
}

pub struct Property<T: Class> {
    pub name: &'static str,
    pub kind: PropertyKind<T>,
    pub attributes: sys::PropertyAttributes,
}

/// Collects properties and registers the class with the host.
pub struct ClassBuilder<'a, T: Class> {
    env: Env,
    name: &'a str,
    properties: Vec<Property<T>>,
}

impl<'a, T: Class> ClassBuilder<'a, T> {
    pub fn new(env: &Env, name: &'a str) -> ClassBuilder<'a, T> {
        ClassBuilder {
            env: *env,
            name,
            properties: Vec::new(),
        }
    }

    pub fn property(mut self, property: Property<T>) -> Self {
        self.properties.push(property);
        self
    }

    pub fn method(self, name: &'static str, method: InstanceMethod<T>) -> Self {
        self.property(Property {
            name,
            kind: PropertyKind::Method { method },
            attributes: sys::PropertyAttributes::DEFAULT,
        })
    }

    /// A method with no interesting result; the host sees `undefined`.
    pub fn void_method(self, name: &'static str, method: InstanceVoidMethod<T>) -> Self {
        self.property(Property {
            name,
            kind: PropertyKind::VoidMethod { method },
            attributes: sys::PropertyAttributes::DEFAULT,
        })
    }

    pub fn accessor(
        self,
        name: &'static str,
        getter: Option<InstanceGetter<T>>,
        setter: Option<InstanceSetter<T>>,
    ) -> Self {
        self.property(Property {
            name,
            kind: PropertyKind::Accessor { getter, setter },
            attributes: sys::PropertyAttributes::ENUMERABLE
                | sys::PropertyAttributes::CONFIGURABLE,
        })
    }

    pub fn static_method(self, name: &'static str, method: StaticMethod) -> Self {
        self.property(Property {
            name,
            kind: PropertyKind::StaticMethod { method },
            attributes: sys::PropertyAttributes::DEFAULT | sys::PropertyAttributes::STATIC,
        })
    }

    pub fn static_void_method(self, name: &'static str, method: StaticVoidMethod) -> Self {
        self.property(Property {
            name,
            kind: PropertyKind::StaticVoidMethod { method },
            attributes: sys::PropertyAttributes::DEFAULT | sys::PropertyAttributes::STATIC,
        })
    }

    /// An accessor on the constructor itself, dispatching without an
    /// instance.
    pub fn static_accessor(
        self,
        name: &'static str,
        getter: Option<StaticGetter>,
        setter: Option<StaticSetter>,
    ) -> Self {
        self.property(Property {
            name,
            kind: PropertyKind::StaticAccessor { getter, setter },
            attributes: sys::PropertyAttributes::ENUMERABLE
                | sys::PropertyAttributes::CONFIGURABLE
                | sys::PropertyAttributes::STATIC,
        })
    }

    pub fn static_value(self, name: &'static str, value: Value) -> Self {
        self.property(Property {
            name,
            kind: PropertyKind::StaticValue { value },
            attributes: sys::PropertyAttributes::DEFAULT | sys::PropertyAttributes::STATIC,
        })
    }

    pub fn value(self, name: &'static str, value: Value) -> Self {
        self.property(Property {
            name,
            kind: PropertyKind::Value { value },
            attributes: sys::PropertyAttributes::DEFAULT,
        })
    }

    /// Registers the class and returns its constructor function.
    pub fn build(self) -> Result<Function> {
        let env = self.env;
        // Registration data handed to the host per descriptor; reclaimed
        // manually if define_class fails before the host takes ownership.
        let mut handed_out: Vec<(*mut c_void, sys::Finalizer)> = Vec::new();
        let mut descriptors: Vec<sys::RawPropertyDescriptor> =
            Vec::with_capacity(self.properties.len());

        for property in &self.properties {
            let mut descriptor = sys::RawPropertyDescriptor {
                name: property.name.as_ptr(),
                name_len: property.name.len(),
                method: None,
                getter: None,
                setter: None,
                value: sys::RawValue::NONE,
                attributes: property.attributes,
                data: std::ptr::null_mut(),
                data_finalizer: None,
            };
            match &property.kind {
                PropertyKind::Method { method } => {
                    let data = Box::into_raw(Box::new(MethodData::<T> {
                        method: MethodBody::Value(*method),
                    })) as *mut c_void;
                    handed_out.push((data, release_box::<MethodData<T>>));
                    descriptor.method = Some(method_trampoline::<T>);
                    descriptor.data = data;
                    descriptor.data_finalizer = Some(release_box::<MethodData<T>>);
                }
                PropertyKind::VoidMethod { method } => {
                    let data = Box::into_raw(Box::new(MethodData::<T> {
                        method: MethodBody::Void(*method),
                    })) as *mut c_void;
                    handed_out.push((data, release_box::<MethodData<T>>));
                    descriptor.method = Some(method_trampoline::<T>);
                    descriptor.data = data;
                    descriptor.data_finalizer = Some(release_box::<MethodData<T>>);
                }
                PropertyKind::Accessor { getter, setter } => {
                    let data = Box::into_raw(Box::new(AccessorData::<T> {
                        getter: *getter,
                        setter: *setter,
                    })) as *mut c_void;
                    handed_out.push((data, release_box::<AccessorData<T>>));
                    if getter.is_some() {
                        descriptor.getter = Some(getter_trampoline::<T>);
                    }
                    if setter.is_some() {
                        descriptor.setter = Some(setter_trampoline::<T>);
                    }
                    descriptor.data = data;
                    descriptor.data_finalizer = Some(release_box::<AccessorData<T>>);
                }
                PropertyKind::StaticMethod { method } => {
                    let data = Box::into_raw(Box::new(StaticMethodData {
                        method: StaticMethodBody::Value(*method),
                    })) as *mut c_void;
                    handed_out.push((data, release_box::<StaticMethodData>));
                    descriptor.method = Some(static_method_trampoline);
                    descriptor.data = data;
                    descriptor.data_finalizer = Some(release_box::<StaticMethodData>);
                }
                PropertyKind::StaticVoidMethod { method } => {
                    let data = Box::into_raw(Box::new(StaticMethodData {
                        method: StaticMethodBody::Void(*method),
                    })) as *mut c_void;
                    handed_out.push((data, release_box::<StaticMethodData>));
                    descriptor.method = Some(static_method_trampoline);
                    descriptor.data = data;
                    descriptor.data_finalizer = Some(release_box::<StaticMethodData>);
                }
                PropertyKind::StaticAccessor { getter, setter } => {
                    let data = Box::into_raw(Box::new(StaticAccessorData {
                        getter: *getter,
                        setter: *setter,
                    })) as *mut c_void;
                    handed_out.push((data, release_box::<StaticAccessorData>));
                    if getter.is_some() {
                        descriptor.getter = Some(static_getter_trampoline);
                    }
                    if setter.is_some() {
                        descriptor.setter = Some(static_setter_trampoline);
                    }
                    descriptor.data = data;
                    descriptor.data_finalizer = Some(release_box::<StaticAccessorData>);
                }
                PropertyKind::Value { value } | PropertyKind::StaticValue { value } => {
                    descriptor.value = value.raw();
                }
            }
            descriptors.push(descriptor);
        }

        let mut out = sys::RawValue::NONE;
        let status = unsafe {
            (env.abi().define_class)(
                env.raw(),
                self.name.as_ptr(),
                self.name.len(),
                constructor_trampoline::<T>,
                std::ptr::null_mut(),
                None,
                descriptors.len(),
                descriptors.as_ptr(),
                &mut out,
            )
        };
        if let Err(err) = env.check(status) {
            for (data, finalizer) in handed_out {
                unsafe { finalizer(data, std::ptr::null_mut()) };
            }
            return Err(err);
        }
        log::debug!(
            "defined class {} with {} properties",
            self.name,
            descriptors.len()
        );
        Ok(Function::from_raw(env, out))
    }
}

enum MethodBody<T: Class> {
    Value(InstanceMethod<T>),
    Void(InstanceVoidMethod<T>),
}

struct MethodData<T: Class> {
    method: MethodBody<T>,
}

struct AccessorData<T: Class> {
    getter: Option<InstanceGetter<T>>,
    setter: Option<InstanceSetter<T>>,
}

enum StaticMethodBody {
    Value(StaticMethod),
    Void(StaticVoidMethod),
}

struct StaticMethodData {
    method: StaticMethodBody,
}

struct StaticAccessorData {
    getter: Option<StaticGetter>,
    setter: Option<StaticSetter>,
}

unsafe extern "C" fn release_box<D>(data: *mut c_void, _hint: *mut c_void) {
    drop(unsafe { Box::from_raw(data as *mut D) });
}

unsafe extern "C" fn finalize_instance<T: Class>(data: *mut c_void, _hint: *mut c_void) {
    drop(unsafe { Box::from_raw(data as *mut T) });
}

/// Recovers the native instance wrapped into `object`.
///
/// The pointer is valid until the host finalizes the instance; a collected or
/// never-wrapped object yields an error. The caller must know `T` is the type
/// that was wrapped.
pub unsafe fn unwrap<T: Class>(object: &Object) -> Result<*mut T> {
    let env = object.env();
    let mut data: *mut c_void = std::ptr::null_mut();
    let status = unsafe { (env.abi().unwrap)(env.raw(), object.raw(), &mut data) };
    env.check(status)?;
    if data.is_null() {
        return Err(Error::new(&env, "object carries no native instance"));
    }
    Ok(data as *mut T)
}

fn instance_mut<'a, T: Class>(info: &CallbackInfo) -> Result<&'a mut T> {
    let this = info.this().coerce_to_object()?;
    let ptr = unsafe { unwrap::<T>(&this)? };
    Ok(unsafe { &mut *ptr })
}

unsafe extern "C" fn constructor_trampoline<T: Class>(
    env: sys::RawEnv,
    raw: sys::RawCallbackInfo,
) {
    let env = Env::from_raw(env);
    dispatch(env, raw, |info| {
        if !info.is_construct_call()? {
            // Reject before any native state exists.
            return Err(Error::type_error(
                &env,
                "class constructor cannot be invoked without new",
            ));
        }
        let this = info.this().coerce_to_object()?;
        let instance = Box::new(T::constructor(info)?);
        let data = Box::into_raw(instance);
        let mut wrap_ref = sys::RawRef::NONE;
        let status = unsafe {
            (env.abi().wrap)(
                env.raw(),
                this.raw(),
                data as *mut c_void,
                finalize_instance::<T>,
                std::ptr::null_mut(),
                &mut wrap_ref,
            )
        };
        if let Err(err) = env.check(status) {
            drop(unsafe { Box::from_raw(data) });
            return Err(err);
        }
        unsafe { &mut *data }.attached(&env, &this)?;
        Ok(info.this())
    });
}

unsafe extern "C" fn method_trampoline<T: Class>(env: sys::RawEnv, raw: sys::RawCallbackInfo) {
    let env = Env::from_raw(env);
    dispatch(env, raw, |info| {
        let data = info.data() as *mut MethodData<T>;
        if data.is_null() {
            return Err(Error::new(&env, "method has no registration data"));
        }
        let instance = instance_mut::<T>(info)?;
        match unsafe { &*data }.method {
            MethodBody::Value(method) => method(instance, info),
            MethodBody::Void(method) => {
                method(instance, info)?;
                env.undefined()
            }
        }
    });
}

unsafe extern "C" fn getter_trampoline<T: Class>(env: sys::RawEnv, raw: sys::RawCallbackInfo) {
    let env = Env::from_raw(env);
    dispatch(env, raw, |info| {
        let data = info.data() as *mut AccessorData<T>;
        if data.is_null() {
            return Err(Error::new(&env, "accessor has no registration data"));
        }
        let getter = unsafe { &*data }
            .getter
            .ok_or_else(|| Error::new(&env, "property has no getter"))?;
        let instance = instance_mut::<T>(info)?;
        getter(instance, info)
    });
}

unsafe extern "C" fn setter_trampoline<T: Class>(env: sys::RawEnv, raw: sys::RawCallbackInfo) {
    let env = Env::from_raw(env);
    dispatch(env, raw, |info| {
        let data = info.data() as *mut AccessorData<T>;
        if data.is_null() {
            return Err(Error::new(&env, "accessor has no registration data"));
        }
        let setter = unsafe { &*data }
            .setter
            .ok_or_else(|| Error::new(&env, "property has no setter"))?;
        let instance = instance_mut::<T>(info)?;
        setter(instance, info)?;
        env.undefined()
    });
}

unsafe extern "C" fn static_getter_trampoline(env: sys::RawEnv, raw: sys::RawCallbackInfo) {
    let env = Env::from_raw(env);
    dispatch(env, raw, |info| {
        let data = info.data() as *mut StaticAccessorData;
        if data.is_null() {
            return Err(Error::new(&env, "accessor has no registration data"));
        }
        let getter = unsafe { &*data }
            .getter
            .ok_or_else(|| Error::new(&env, "property has no getter"))?;
        getter(info)
    });
}

unsafe extern "C" fn static_setter_trampoline(env: sys::RawEnv, raw: sys::RawCallbackInfo) {
    let env = Env::from_raw(env);
    dispatch(env, raw, |info| {
        let data = info.data() as *mut StaticAccessorData;
        if data.is_null() {
            return Err(Error::new(&env, "accessor has no registration data"));
        }
        let setter = unsafe { &*data }
            .setter
            .ok_or_else(|| Error::new(&env, "property has no setter"))?;
        setter(info)?;
        env.undefined()
    });
}

unsafe extern "C" fn static_method_trampoline(env: sys::RawEnv, raw: sys::RawCallbackInfo) {
    let env = Env::from_raw(env);
    dispatch(env, raw, |info| {
        let data = info.data() as *mut StaticMethodData;
        if data.is_null() {
            return Err(Error::new(&env, "method has no registration data"));
        }
        match unsafe { &*data }.method {
            StaticMethodBody::Value(method) => method(info),
            StaticMethodBody::Void(method) => {
                method(info)?;
                env.undefined()
            }
        }
    });
}
