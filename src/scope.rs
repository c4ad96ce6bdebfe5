//! RAII handle scopes.
//!
//! Every handle belongs to the innermost open scope and dies when that scope
//! closes. Scopes must close in stack order; the host reports a mismatch as
//! an error status. An escapable scope can promote exactly one handle into
//! its parent before closing.

use crate::env::Env;
use crate::error::{Error, Result};
use crate::sys;
use crate::value::TypedValue;

/// Plain handle scope. Closing happens on drop; close failures are logged,
/// not surfaced, since drop has no error channel.
pub struct HandleScope {
    env: Env,
    raw: sys::RawScope,
}

impl HandleScope {
    pub fn new(env: &Env) -> Result<HandleScope> {
        let mut raw = sys::RawScope(0);
        let status = unsafe { (env.abi().open_handle_scope)(env.raw(), &mut raw) };
        env.check(status)?;
        log::trace!("opened handle scope {}", raw.0);
        Ok(HandleScope { env: *env, raw })
    }

    pub fn env(&self) -> Env {
        self.env
    }
}

impl Drop for HandleScope {
    fn drop(&mut self) {
        let status = unsafe { (self.env.abi().close_handle_scope)(self.env.raw(), self.raw) };
        if status != sys::Status::Ok {
            log::warn!("closing handle scope failed: {:?}", status);
        } else {
            log::trace!("closed handle scope {}", self.raw.0);
        }
    }
}

/// Handle scope that can move one value out into the parent scope.
///
/// `escape` consumes the scope, so a second escape is impossible by
/// construction; the host additionally enforces the once-only rule for raw
/// callers.
pub struct EscapableHandleScope {
    env: Env,
    raw: sys::RawScope,
}

impl EscapableHandleScope {
    pub fn new(env: &Env) -> Result<EscapableHandleScope> {
        let mut raw = sys::RawScope(0);
        let status = unsafe { (env.abi().open_escapable_handle_scope)(env.raw(), &mut raw) };
        env.check(status)?;
        Ok(EscapableHandleScope { env: *env, raw })
    }

    pub fn env(&self) -> Env {
        self.env
    }

    /// Promotes `value` into the parent scope and closes this one. The
    /// returned handle carries the same host value but stays valid after
    /// this scope is gone.
    pub fn escape<T: TypedValue>(self, value: T) -> Result<T> {
        let mut out = sys::RawValue::NONE;
        let status = unsafe {
            (self.env.abi().escape_handle)(self.env.raw(), self.raw, value.raw(), &mut out)
        };
        if status != sys::Status::Ok {
            return Err(Error::last(self.env));
        }
        Ok(T::from_raw(self.env, out))
    }
}

impl Drop for EscapableHandleScope {
    fn drop(&mut self) {
        let status =
            unsafe { (self.env.abi().close_escapable_handle_scope)(self.env.raw(), self.raw) };
        if status != sys::Status::Ok {
            log::warn!("closing escapable handle scope failed: {:?}", status);
        }
    }
}
