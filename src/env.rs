//! Environment wrapper threading the host context through every operation.

use crate::error::{Error, Result};
use crate::object::Object;
use crate::sys;
use crate::value::{TypedValue, Value};

/// Per-invocation host context. Cheap to copy; all value operations on it must
/// stay on the host's value thread.
#[derive(Clone, Copy)]
pub struct Env {
    raw: sys::RawEnv,
}

impl Env {
    /// Wraps a raw environment pointer received from the host.
    ///
    /// The pointer must come from the host loader or a host-invoked callback
    /// and outlive every value derived from this `Env`.
    pub fn from_raw(raw: sys::RawEnv) -> Self {
        Env { raw }
    }

    pub fn raw(&self) -> sys::RawEnv {
        self.raw
    }

    pub(crate) fn abi(&self) -> &'static sys::AbiTable {
        // The table is static for the lifetime of the host process.
        unsafe { &*(*self.raw).table }
    }

    /// Converts an ABI status into a `Result`, capturing the host's error
    /// state on failure.
    pub(crate) fn check(&self, status: sys::Status) -> Result<()> {
        if status == sys::Status::Ok {
            Ok(())
        } else {
            Err(Error::last(*self))
        }
    }

    pub fn global(&self) -> Result<Object> {
        let mut out = sys::RawValue::NONE;
        let status = unsafe { (self.abi().get_global)(self.raw, &mut out) };
        self.check(status)?;
        Ok(Object::from_raw(*self, out))
    }

    pub fn undefined(&self) -> Result<Value> {
        let mut out = sys::RawValue::NONE;
        let status = unsafe { (self.abi().get_undefined)(self.raw, &mut out) };
        self.check(status)?;
        Ok(Value::from_raw(*self, out))
    }

    pub fn null(&self) -> Result<Value> {
        let mut out = sys::RawValue::NONE;
        let status = unsafe { (self.abi().get_null)(self.raw, &mut out) };
        self.check(status)?;
        Ok(Value::from_raw(*self, out))
    }

    /// Whether a host exception is waiting to propagate. Never errors: a
    /// failing query reads as "nothing pending".
    pub fn is_exception_pending(&self) -> bool {
        let mut pending = false;
        let status = unsafe { (self.abi().is_exception_pending)(self.raw, &mut pending) };
        status == sys::Status::Ok && pending
    }
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env").field("raw", &self.raw).finish()
    }
}
