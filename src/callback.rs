//! Callback frame access for host-invoked native functions.

use std::ffi::c_void;

use crate::env::Env;
use crate::error::Result;
use crate::sys;
use crate::value::{TypedValue, Value};

/// Arguments live inline up to this count; longer argument lists allocate.
const INLINE_ARGS: usize = 6;

enum Args {
    Inline {
        buf: [sys::RawValue; INLINE_ARGS],
        len: usize,
    },
    Heap(Vec<sys::RawValue>),
}

/// Snapshot of one invocation: receiver, arguments, registration data and the
/// construct-call flag. Built once at trampoline entry, then read-only.
pub struct CallbackInfo {
    env: Env,
    raw: sys::RawCallbackInfo,
    this: sys::RawValue,
    args: Args,
    data: *mut c_void,
}

impl CallbackInfo {
    /// Reads the frame out of the host. Called from trampolines with the
    /// pointers the host just handed over.
    pub fn new(env: Env, raw: sys::RawCallbackInfo) -> Result<CallbackInfo> {
        let abi = env.abi();

        let mut this = sys::RawValue::NONE;
        env.check(unsafe { (abi.get_cb_this)(env.raw(), raw, &mut this) })?;

        let mut len = 0usize;
        env.check(unsafe { (abi.get_cb_args_length)(env.raw(), raw, &mut len) })?;

        let args = if len <= INLINE_ARGS {
            let mut buf = [sys::RawValue::NONE; INLINE_ARGS];
            if len > 0 {
                env.check(unsafe { (abi.get_cb_args)(env.raw(), raw, buf.as_mut_ptr(), len) })?;
            }
            Args::Inline { buf, len }
        } else {
            let mut heap = vec![sys::RawValue::NONE; len];
            env.check(unsafe { (abi.get_cb_args)(env.raw(), raw, heap.as_mut_ptr(), len) })?;
            Args::Heap(heap)
        };

        let mut data: *mut c_void = std::ptr::null_mut();
        env.check(unsafe { (abi.get_cb_data)(env.raw(), raw, &mut data) })?;

        Ok(CallbackInfo {
            env,
            raw,
            this,
            args,
            data,
        })
    }

    pub fn env(&self) -> Env {
        self.env
    }

    pub fn this(&self) -> Value {
        Value::from_raw(self.env, self.this)
    }

    pub fn len(&self) -> usize {
        match &self.args {
            Args::Inline { len, .. } => *len,
            Args::Heap(heap) => heap.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Argument at `index`, or `undefined` past the end.
    pub fn get(&self, index: usize) -> Result<Value> {
        let slot = match &self.args {
            Args::Inline { buf, len } if index < *len => Some(buf[index]),
            Args::Heap(heap) => heap.get(index).copied(),
            _ => None,
        };
        match slot {
            Some(raw) => Ok(Value::from_raw(self.env, raw)),
            None => self.env.undefined(),
        }
    }

    /// Registration data attached when the function or class was created.
    pub fn data(&self) -> *mut c_void {
        self.data
    }

    /// Whether the invocation used construct semantics (`new`).
    pub fn is_construct_call(&self) -> Result<bool> {
        let mut out = false;
        let status =
            unsafe { (self.env.abi().is_construct_call)(self.env.raw(), self.raw, &mut out) };
        self.env.check(status)?;
        Ok(out)
    }

    /// Sets the value the host will see as the call result.
    pub fn set_return_value(&self, value: &Value) -> Result<()> {
        let status =
            unsafe { (self.env.abi().set_return_value)(self.env.raw(), self.raw, value.raw()) };
        self.env.check(status)
    }
}
