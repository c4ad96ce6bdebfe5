//! Value proxies: non-owning handles to host values, one wrapper per host
//! category. All of them are `Copy` and valid only while the handle scope
//! they were created in stays open.

use std::ffi::c_void;
use std::marker::PhantomData;

use crate::env::Env;
use crate::error::{Error, Result};
use crate::object::Object;
use crate::sys;

/// Implemented by every value proxy so scopes, references and casts can move
/// between the raw and typed representations.
pub trait TypedValue: Copy {
    fn from_raw(env: Env, raw: sys::RawValue) -> Self;
    fn raw(&self) -> sys::RawValue;
    fn env(&self) -> Env;
}

macro_rules! value_wrapper {
    ($name:ident, $inner:ty) => {
        impl crate::value::TypedValue for $name {
            fn from_raw(env: crate::env::Env, raw: crate::sys::RawValue) -> Self {
                $name(<$inner as crate::value::TypedValue>::from_raw(env, raw))
            }

            fn raw(&self) -> crate::sys::RawValue {
                crate::value::TypedValue::raw(&self.0)
            }

            fn env(&self) -> crate::env::Env {
                crate::value::TypedValue::env(&self.0)
            }
        }

        impl std::ops::Deref for $name {
            type Target = $inner;

            fn deref(&self) -> &$inner {
                &self.0
            }
        }

        impl From<$name> for crate::value::Value {
            fn from(wrapper: $name) -> crate::value::Value {
                crate::value::Value::from_raw(
                    crate::value::TypedValue::env(&wrapper),
                    crate::value::TypedValue::raw(&wrapper),
                )
            }
        }
    };
}

pub(crate) use value_wrapper;

/// Untyped host value handle.
#[derive(Clone, Copy)]
pub struct Value {
    env: Env,
    raw: sys::RawValue,
}

impl TypedValue for Value {
    fn from_raw(env: Env, raw: sys::RawValue) -> Self {
        Value { env, raw }
    }

    fn raw(&self) -> sys::RawValue {
        self.raw
    }

    fn env(&self) -> Env {
        self.env
    }
}

impl Value {
    pub fn value_type(&self) -> Result<sys::ValueType> {
        if self.raw.is_none() {
            return Ok(sys::ValueType::Undefined);
        }
        let mut out = sys::ValueType::Undefined;
        let status = unsafe { (self.env.abi().type_of)(self.env.raw(), self.raw, &mut out) };
        self.env.check(status)?;
        Ok(out)
    }

    /// Reinterprets the handle as a more specific wrapper without checking.
    pub fn cast<T: TypedValue>(&self) -> T {
        T::from_raw(self.env, self.raw)
    }

    pub fn is_undefined(&self) -> Result<bool> {
        Ok(self.value_type()? == sys::ValueType::Undefined)
    }

    pub fn is_null(&self) -> Result<bool> {
        Ok(self.value_type()? == sys::ValueType::Null)
    }

    pub fn is_boolean(&self) -> Result<bool> {
        Ok(self.value_type()? == sys::ValueType::Boolean)
    }

    pub fn is_number(&self) -> Result<bool> {
        Ok(self.value_type()? == sys::ValueType::Number)
    }

    pub fn is_string(&self) -> Result<bool> {
        Ok(self.value_type()? == sys::ValueType::String)
    }

    pub fn is_symbol(&self) -> Result<bool> {
        Ok(self.value_type()? == sys::ValueType::Symbol)
    }

    pub fn is_object(&self) -> Result<bool> {
        Ok(self.value_type()? == sys::ValueType::Object)
    }

    pub fn is_function(&self) -> Result<bool> {
        Ok(self.value_type()? == sys::ValueType::Function)
    }

    pub fn is_external(&self) -> Result<bool> {
        Ok(self.value_type()? == sys::ValueType::External)
    }

    fn check_flag(
        &self,
        query: unsafe extern "C" fn(sys::RawEnv, sys::RawValue, *mut bool) -> sys::Status,
    ) -> Result<bool> {
        if self.raw.is_none() {
            return Ok(false);
        }
        let mut out = false;
        let status = unsafe { query(self.env.raw(), self.raw, &mut out) };
        self.env.check(status)?;
        Ok(out)
    }

    pub fn is_array(&self) -> Result<bool> {
        self.check_flag(self.env.abi().is_array)
    }

    pub fn is_array_buffer(&self) -> Result<bool> {
        self.check_flag(self.env.abi().is_array_buffer)
    }

    pub fn is_typed_array(&self) -> Result<bool> {
        self.check_flag(self.env.abi().is_typed_array)
    }

    pub fn is_buffer(&self) -> Result<bool> {
        self.check_flag(self.env.abi().is_buffer)
    }

    pub fn is_error(&self) -> Result<bool> {
        self.check_flag(self.env.abi().is_error)
    }

    /// Host strict equality (`===` semantics, identity for objects).
    pub fn strict_equals(&self, other: &Value) -> Result<bool> {
        let mut out = false;
        let status = unsafe {
            (self.env.abi().strict_equals)(self.env.raw(), self.raw, other.raw, &mut out)
        };
        self.env.check(status)?;
        Ok(out)
    }

    fn coerce(
        &self,
        op: unsafe extern "C" fn(sys::RawEnv, sys::RawValue, *mut sys::RawValue) -> sys::Status,
    ) -> Result<sys::RawValue> {
        let mut out = sys::RawValue::NONE;
        let status = unsafe { op(self.env.raw(), self.raw, &mut out) };
        self.env.check(status)?;
        Ok(out)
    }

    pub fn coerce_to_boolean(&self) -> Result<Boolean> {
        Ok(Boolean::from_raw(self.env, self.coerce(self.env.abi().coerce_to_bool)?))
    }

    pub fn coerce_to_number(&self) -> Result<Number> {
        Ok(Number::from_raw(self.env, self.coerce(self.env.abi().coerce_to_number)?))
    }

    pub fn coerce_to_string(&self) -> Result<String> {
        Ok(String::from_raw(self.env, self.coerce(self.env.abi().coerce_to_string)?))
    }

    pub fn coerce_to_object(&self) -> Result<Object> {
        Ok(Object::from_raw(self.env, self.coerce(self.env.abi().coerce_to_object)?))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.strict_equals(other).unwrap_or(false)
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Value").field("raw", &self.raw).finish()
    }
}

/// Host boolean proxy.
#[derive(Clone, Copy)]
pub struct Boolean(pub(crate) Value);
value_wrapper!(Boolean, Value);

impl Boolean {
    pub fn new(env: &Env, value: bool) -> Result<Boolean> {
        let mut out = sys::RawValue::NONE;
        let status = unsafe { (env.abi().get_boolean)(env.raw(), value, &mut out) };
        env.check(status)?;
        Ok(Boolean::from_raw(*env, out))
    }

    pub fn value(&self) -> Result<bool> {
        let env = self.env();
        let mut out = false;
        let status = unsafe { (env.abi().get_value_bool)(env.raw(), self.raw(), &mut out) };
        env.check(status)?;
        Ok(out)
    }
}

/// Host number proxy.
#[derive(Clone, Copy)]
pub struct Number(pub(crate) Value);
value_wrapper!(Number, Value);

impl Number {
    pub fn new(env: &Env, value: f64) -> Result<Number> {
        let mut out = sys::RawValue::NONE;
        let status = unsafe { (env.abi().create_number)(env.raw(), value, &mut out) };
        env.check(status)?;
        Ok(Number::from_raw(*env, out))
    }

    pub fn value(&self) -> Result<f64> {
        let env = self.env();
        let mut out = 0.0;
        let status = unsafe { (env.abi().get_value_double)(env.raw(), self.raw(), &mut out) };
        env.check(status)?;
        Ok(out)
    }

    pub fn int32(&self) -> Result<i32> {
        let env = self.env();
        let mut out = 0;
        let status = unsafe { (env.abi().get_value_int32)(env.raw(), self.raw(), &mut out) };
        env.check(status)?;
        Ok(out)
    }

    pub fn uint32(&self) -> Result<u32> {
        let env = self.env();
        let mut out = 0;
        let status = unsafe { (env.abi().get_value_uint32)(env.raw(), self.raw(), &mut out) };
        env.check(status)?;
        Ok(out)
    }

    pub fn int64(&self) -> Result<i64> {
        let env = self.env();
        let mut out = 0;
        let status = unsafe { (env.abi().get_value_int64)(env.raw(), self.raw(), &mut out) };
        env.check(status)?;
        Ok(out)
    }
}

/// Host string proxy.
#[derive(Clone, Copy)]
pub struct String(pub(crate) Value);
value_wrapper!(String, Value);

impl String {
    pub fn new(env: &Env, value: &str) -> Result<String> {
        let mut out = sys::RawValue::NONE;
        let status = unsafe {
            (env.abi().create_string_utf8)(env.raw(), value.as_ptr(), value.len(), &mut out)
        };
        env.check(status)?;
        Ok(String::from_raw(*env, out))
    }

    pub fn from_utf16(env: &Env, value: &[u16]) -> Result<String> {
        let mut out = sys::RawValue::NONE;
        let status = unsafe {
            (env.abi().create_string_utf16)(env.raw(), value.as_ptr(), value.len(), &mut out)
        };
        env.check(status)?;
        Ok(String::from_raw(*env, out))
    }

    /// Reads the string back as UTF-8 bytes, byte-identical to what was
    /// stored.
    pub fn to_utf8(&self) -> Result<std::string::String> {
        let env = self.env();
        let mut len = 0usize;
        let status = unsafe {
            (env.abi().get_value_string_utf8)(
                env.raw(),
                self.raw(),
                std::ptr::null_mut(),
                0,
                &mut len,
            )
        };
        env.check(status)?;

        let mut bytes = vec![0u8; len];
        let mut copied = 0usize;
        let status = unsafe {
            (env.abi().get_value_string_utf8)(
                env.raw(),
                self.raw(),
                bytes.as_mut_ptr(),
                bytes.len(),
                &mut copied,
            )
        };
        env.check(status)?;
        bytes.truncate(copied);
        std::string::String::from_utf8(bytes)
            .map_err(|_| Error::new(&env, "host string is not valid UTF-8"))
    }

    pub fn to_utf16(&self) -> Result<Vec<u16>> {
        let env = self.env();
        let mut len = 0usize;
        let status = unsafe {
            (env.abi().get_value_string_utf16)(
                env.raw(),
                self.raw(),
                std::ptr::null_mut(),
                0,
                &mut len,
            )
        };
        env.check(status)?;

        let mut units = vec![0u16; len];
        let mut copied = 0usize;
        let status = unsafe {
            (env.abi().get_value_string_utf16)(
                env.raw(),
                self.raw(),
                units.as_mut_ptr(),
                units.len(),
                &mut copied,
            )
        };
        env.check(status)?;
        units.truncate(copied);
        Ok(units)
    }
}

/// Host-held pointer to native data, invisible to host code except as an
/// opaque value. The boxed data is dropped when the host collects the value.
pub struct External<T: 'static> {
    value: Value,
    _marker: PhantomData<*mut T>,
}

impl<T: 'static> Clone for External<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: 'static> Copy for External<T> {}

impl<T: 'static> TypedValue for External<T> {
    fn from_raw(env: Env, raw: sys::RawValue) -> Self {
        External {
            value: Value::from_raw(env, raw),
            _marker: PhantomData,
        }
    }

    fn raw(&self) -> sys::RawValue {
        self.value.raw()
    }

    fn env(&self) -> Env {
        self.value.env()
    }
}

unsafe extern "C" fn drop_external<T>(data: *mut c_void, _hint: *mut c_void) {
    drop(unsafe { Box::from_raw(data as *mut T) });
}

impl<T: 'static> External<T> {
    pub fn new(env: &Env, data: Box<T>) -> Result<External<T>> {
        let data = Box::into_raw(data);
        let mut out = sys::RawValue::NONE;
        let status = unsafe {
            (env.abi().create_external)(
                env.raw(),
                data as *mut c_void,
                Some(drop_external::<T>),
                std::ptr::null_mut(),
                &mut out,
            )
        };
        if let Err(err) = env.check(status) {
            // The host did not take ownership; reclaim the box.
            drop(unsafe { Box::from_raw(data) });
            return Err(err);
        }
        Ok(External::from_raw(*env, out))
    }

    /// Raw pointer to the attached data. Valid until the host collects the
    /// external value; the caller is responsible for aliasing discipline.
    pub fn data(&self) -> Result<*mut T> {
        let env = self.env();
        let mut out: *mut c_void = std::ptr::null_mut();
        let status = unsafe { (env.abi().get_value_external)(env.raw(), self.raw(), &mut out) };
        env.check(status)?;
        Ok(out as *mut T)
    }
}
