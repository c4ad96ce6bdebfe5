//! GC roots that outlive handle scopes.
//!
//! A [`Reference`] pins (count > 0) or tracks (count 0, weak) a host value
//! across callbacks. References are not handles: reading the value back
//! yields a fresh handle in the current scope.

use std::marker::PhantomData;

use crate::env::Env;
use crate::error::{Error, Result};
use crate::function::Function;
use crate::object::Object;
use crate::scope::EscapableHandleScope;
use crate::sys;
use crate::value::{TypedValue, Value};

/// Who deletes the underlying host reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    /// Dropping the `Reference` deletes the host reference.
    Owned,
    /// The host reference is left alive on drop; some other owner (often the
    /// host itself, through a finalizer) deletes it.
    Borrowed,
}

pub type ObjectReference = Reference<Object>;
pub type FunctionReference = Reference<Function>;

/// A host GC reference with a typed view of its target.
pub struct Reference<T: TypedValue> {
    env: Env,
    raw: sys::RawRef,
    ownership: Ownership,
    _marker: PhantomData<T>,
}

impl<T: TypedValue> Reference<T> {
    /// Creates an owned reference with the given initial count. Count zero
    /// means weak: the target stays collectable.
    pub fn new(value: &T, initial_count: u32) -> Result<Reference<T>> {
        let env = value.env();
        let mut raw = sys::RawRef::NONE;
        let status = unsafe {
            (env.abi().create_reference)(env.raw(), value.raw(), initial_count, &mut raw)
        };
        env.check(status)?;
        log::trace!("created reference {} with count {}", raw.0, initial_count);
        Ok(Reference {
            env,
            raw,
            ownership: Ownership::Owned,
            _marker: PhantomData,
        })
    }

    /// Weak reference: does not keep the target alive.
    pub fn weak(value: &T) -> Result<Reference<T>> {
        Reference::new(value, 0)
    }

    /// Persistent reference: keeps the target alive until unref or drop.
    pub fn persistent(value: &T) -> Result<Reference<T>> {
        Reference::new(value, 1)
    }

    /// Adopts a raw reference id, e.g. one returned by `wrap`.
    pub fn from_raw(env: Env, raw: sys::RawRef, ownership: Ownership) -> Reference<T> {
        Reference {
            env,
            raw,
            ownership,
            _marker: PhantomData,
        }
    }

    pub fn env(&self) -> Env {
        self.env
    }

    pub fn raw(&self) -> sys::RawRef {
        self.raw
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_none()
    }

    /// Releases the raw id to the caller without deleting the host
    /// reference.
    pub fn into_raw(mut self) -> sys::RawRef {
        let raw = self.raw;
        self.raw = sys::RawRef::NONE;
        raw
    }

    pub fn add_ref(&mut self) -> Result<u32> {
        let mut count = 0u32;
        let status = unsafe { (self.env.abi().reference_ref)(self.env.raw(), self.raw, &mut count) };
        self.env.check(status)?;
        Ok(count)
    }

    pub fn unref(&mut self) -> Result<u32> {
        let mut count = 0u32;
        let status =
            unsafe { (self.env.abi().reference_unref)(self.env.raw(), self.raw, &mut count) };
        self.env.check(status)?;
        Ok(count)
    }

    /// The referenced value, or `None` when a weak target has been
    /// collected.
    pub fn value(&self) -> Result<Option<T>> {
        if self.raw.is_none() {
            return Ok(None);
        }
        let mut out = sys::RawValue::NONE;
        let status =
            unsafe { (self.env.abi().get_reference_value)(self.env.raw(), self.raw, &mut out) };
        self.env.check(status)?;
        if out.is_none() {
            Ok(None)
        } else {
            Ok(Some(T::from_raw(self.env, out)))
        }
    }

    /// The referenced value, with a collected weak target reading as
    /// `undefined`.
    pub fn value_or_undefined(&self) -> Result<Value> {
        match self.value()? {
            Some(value) => Ok(Value::from_raw(self.env, value.raw())),
            None => self.env.undefined(),
        }
    }

    /// Deletes the underlying host reference, leaving this empty.
    pub fn reset(&mut self) -> Result<()> {
        if self.raw.is_none() {
            return Ok(());
        }
        let status = unsafe { (self.env.abi().delete_reference)(self.env.raw(), self.raw) };
        self.raw = sys::RawRef::NONE;
        self.env.check(status)
    }

    /// Re-points at `value`, preserving weak/persistent by taking a fresh
    /// count.
    pub fn reset_to(&mut self, value: &T, initial_count: u32) -> Result<()> {
        self.reset()?;
        let mut raw = sys::RawRef::NONE;
        let status = unsafe {
            (self.env.abi().create_reference)(self.env.raw(), value.raw(), initial_count, &mut raw)
        };
        self.env.check(status)?;
        self.raw = raw;
        Ok(())
    }

    /// Strict equality of the two referenced values. Empty or collected
    /// references only equal other empty ones.
    pub fn strict_equals<U: TypedValue>(&self, other: &Reference<U>) -> Result<bool> {
        match (self.value()?, other.value()?) {
            (Some(a), Some(b)) => {
                let a = Value::from_raw(self.env, a.raw());
                let b = Value::from_raw(self.env, b.raw());
                a.strict_equals(&b)
            }
            (None, None) => Ok(true),
            _ => Ok(false),
        }
    }
}

impl<T: TypedValue> std::fmt::Debug for Reference<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reference")
            .field("raw", &self.raw)
            .field("ownership", &self.ownership)
            .finish()
    }
}

impl<T: TypedValue> Drop for Reference<T> {
    fn drop(&mut self) {
        if self.ownership == Ownership::Borrowed || self.raw.is_none() {
            return;
        }
        let status = unsafe { (self.env.abi().delete_reference)(self.env.raw(), self.raw) };
        if status != sys::Status::Ok {
            log::warn!("deleting reference failed: {:?}", status);
        }
    }
}

impl Reference<Object> {
    fn target(&self) -> Result<Object> {
        self.value()?
            .ok_or_else(|| Error::new(&self.env, "referenced object has been collected"))
    }

    /// Property lookup on the referenced object. The result is escaped into
    /// the caller's scope.
    pub fn get(&self, key: &str) -> Result<Value> {
        let scope = EscapableHandleScope::new(&self.env)?;
        let value = self.target()?.get(key)?;
        scope.escape(value)
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let _scope = crate::scope::HandleScope::new(&self.env)?;
        self.target()?.set(key, value)
    }
}

impl Reference<Function> {
    fn target(&self) -> Result<Function> {
        self.value()?
            .ok_or_else(|| Error::new(&self.env, "referenced function has been collected"))
    }

    /// Calls the referenced function, escaping the result into the caller's
    /// scope.
    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value> {
        let scope = EscapableHandleScope::new(&self.env)?;
        let result = self.target()?.call(this, args)?;
        scope.escape(result)
    }

    /// Construct-calls the referenced function, escaping the instance into
    /// the caller's scope.
    pub fn new_instance(&self, args: &[Value]) -> Result<Object> {
        let scope = EscapableHandleScope::new(&self.env)?;
        let instance = self.target()?.new_instance(args)?;
        scope.escape(instance)
    }

    /// See [`Function::make_callback`].
    pub fn make_callback(&self, this: &Value, args: &[Value]) -> Result<Value> {
        let scope = EscapableHandleScope::new(&self.env)?;
        let result = self.target()?.make_callback(this, args)?;
        scope.escape(result)
    }
}
