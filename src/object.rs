//! Object and array proxies.

use crate::env::Env;
use crate::error::Result;
use crate::sys;
use crate::value::{value_wrapper, TypedValue, Value};

/// Host object proxy.
#[derive(Clone, Copy)]
pub struct Object(pub(crate) Value);
value_wrapper!(Object, Value);

impl Object {
    pub fn new(env: &Env) -> Result<Object> {
        let mut out = sys::RawValue::NONE;
        let status = unsafe { (env.abi().create_object)(env.raw(), &mut out) };
        env.check(status)?;
        Ok(Object::from_raw(*env, out))
    }

    /// Property lookup with a string key.
    pub fn get(&self, key: &str) -> Result<Value> {
        let env = self.env();
        let mut out = sys::RawValue::NONE;
        let status = unsafe {
            (env.abi().get_named_property)(env.raw(), self.raw(), key.as_ptr(), key.len(), &mut out)
        };
        env.check(status)?;
        Ok(Value::from_raw(env, out))
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let env = self.env();
        let value = value.into();
        let status = unsafe {
            (env.abi().set_named_property)(
                env.raw(),
                self.raw(),
                key.as_ptr(),
                key.len(),
                value.raw(),
            )
        };
        env.check(status)
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        let env = self.env();
        let mut out = false;
        let status = unsafe {
            (env.abi().has_named_property)(env.raw(), self.raw(), key.as_ptr(), key.len(), &mut out)
        };
        env.check(status)?;
        Ok(out)
    }

    /// Property lookup with an arbitrary host value as the key.
    pub fn get_value(&self, key: &Value) -> Result<Value> {
        let env = self.env();
        let mut out = sys::RawValue::NONE;
        let status =
            unsafe { (env.abi().get_property)(env.raw(), self.raw(), key.raw(), &mut out) };
        env.check(status)?;
        Ok(Value::from_raw(env, out))
    }

    pub fn set_value(&self, key: &Value, value: impl Into<Value>) -> Result<()> {
        let env = self.env();
        let value = value.into();
        let status =
            unsafe { (env.abi().set_property)(env.raw(), self.raw(), key.raw(), value.raw()) };
        env.check(status)
    }

    pub fn has_value(&self, key: &Value) -> Result<bool> {
        let env = self.env();
        let mut out = false;
        let status =
            unsafe { (env.abi().has_property)(env.raw(), self.raw(), key.raw(), &mut out) };
        env.check(status)?;
        Ok(out)
    }

    pub fn get_element(&self, index: u32) -> Result<Value> {
        let env = self.env();
        let mut out = sys::RawValue::NONE;
        let status = unsafe { (env.abi().get_element)(env.raw(), self.raw(), index, &mut out) };
        env.check(status)?;
        Ok(Value::from_raw(env, out))
    }

    pub fn set_element(&self, index: u32, value: impl Into<Value>) -> Result<()> {
        let env = self.env();
        let value = value.into();
        let status =
            unsafe { (env.abi().set_element)(env.raw(), self.raw(), index, value.raw()) };
        env.check(status)
    }

    /// Whether this object was constructed by `constructor` (prototype-chain
    /// walk on the host side).
    pub fn instance_of(&self, constructor: &crate::function::Function) -> Result<bool> {
        let env = self.env();
        let mut out = false;
        let status = unsafe {
            (env.abi().instance_of)(env.raw(), self.raw(), constructor.raw(), &mut out)
        };
        env.check(status)?;
        Ok(out)
    }
}

/// Host array proxy.
#[derive(Clone, Copy)]
pub struct Array(pub(crate) Object);
value_wrapper!(Array, Object);

impl Array {
    pub fn new(env: &Env) -> Result<Array> {
        let mut out = sys::RawValue::NONE;
        let status = unsafe { (env.abi().create_array)(env.raw(), &mut out) };
        env.check(status)?;
        Ok(Array::from_raw(*env, out))
    }

    pub fn with_length(env: &Env, length: usize) -> Result<Array> {
        let mut out = sys::RawValue::NONE;
        let status = unsafe { (env.abi().create_array_with_length)(env.raw(), length, &mut out) };
        env.check(status)?;
        Ok(Array::from_raw(*env, out))
    }

    pub fn len(&self) -> Result<u32> {
        let env = self.env();
        let mut out = 0u32;
        let status = unsafe { (env.abi().get_array_length)(env.raw(), self.raw(), &mut out) };
        env.check(status)?;
        Ok(out)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
