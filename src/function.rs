//! Native-backed host functions.
//!
//! A function created here owns its Rust closure. The closure is boxed,
//! handed to the host as registration data and released by the host's
//! finalizer when the function value is collected, so the lifetime of the
//! native side exactly tracks the host value.

use std::ffi::c_void;

use crate::callback::CallbackInfo;
use crate::env::Env;
use crate::error::{Error, Result};
use crate::object::Object;
use crate::sys;
use crate::value::{value_wrapper, TypedValue, Value};

pub(crate) struct CallbackData {
    cb: Box<dyn Fn(&CallbackInfo) -> Result<Value>>,
}

/// Runs a native callback body inside a trampoline: builds the frame, invokes
/// the body, routes the result through the return slot and the error through
/// a thrown host exception. Never unwinds into the host.
pub(crate) fn dispatch(
    env: Env,
    raw: sys::RawCallbackInfo,
    run: impl FnOnce(&CallbackInfo) -> Result<Value>,
) {
    let info = match CallbackInfo::new(env, raw) {
        Ok(info) => info,
        Err(err) => {
            throw_unless_pending(&env, err);
            return;
        }
    };
    match run(&info) {
        Ok(value) => {
            if let Err(err) = info.set_return_value(&value) {
                throw_unless_pending(&env, err);
            }
        }
        Err(err) => throw_unless_pending(&env, err),
    }
}

/// Converts a native error into a thrown host exception, unless the host
/// already has one pending (double reporting would clobber it).
pub(crate) fn throw_unless_pending(env: &Env, err: Error) {
    if !env.is_exception_pending() {
        err.throw();
    }
}

unsafe extern "C" fn call_trampoline(env: sys::RawEnv, raw: sys::RawCallbackInfo) {
    let env = Env::from_raw(env);
    dispatch(env, raw, |info| {
        let data = info.data() as *mut CallbackData;
        if data.is_null() {
            return Err(Error::new(&info.env(), "function has no native callback"));
        }
        (unsafe { &*data }.cb)(info)
    });
}

pub(crate) unsafe extern "C" fn release_callback_data(data: *mut c_void, _hint: *mut c_void) {
    drop(unsafe { Box::from_raw(data as *mut CallbackData) });
}

/// Host function proxy.
#[derive(Clone, Copy)]
pub struct Function(pub(crate) Object);
value_wrapper!(Function, Object);

impl Function {
    /// Creates a host function backed by `cb`. The closure is dropped when
    /// the host collects the function value.
    pub fn new<F>(env: &Env, name: &str, cb: F) -> Result<Function>
    where
        F: Fn(&CallbackInfo) -> Result<Value> + 'static,
    {
        let data = Box::into_raw(Box::new(CallbackData { cb: Box::new(cb) }));
        let mut out = sys::RawValue::NONE;
        let status = unsafe {
            (env.abi().create_function)(
                env.raw(),
                name.as_ptr(),
                name.len(),
                call_trampoline,
                data as *mut c_void,
                Some(release_callback_data),
                &mut out,
            )
        };
        if let Err(err) = env.check(status) {
            // The host did not take ownership; reclaim the box.
            drop(unsafe { Box::from_raw(data) });
            return Err(err);
        }
        Ok(Function::from_raw(*env, out))
    }

    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value> {
        let env = self.env();
        let raw_args: Vec<sys::RawValue> = args.iter().map(|a| a.raw()).collect();
        let mut out = sys::RawValue::NONE;
        let status = unsafe {
            (env.abi().call_function)(
                env.raw(),
                this.raw(),
                self.raw(),
                raw_args.len(),
                raw_args.as_ptr(),
                &mut out,
            )
        };
        env.check(status)?;
        Ok(Value::from_raw(env, out))
    }

    /// Construct-call: runs the function as a constructor and returns the new
    /// instance.
    pub fn new_instance(&self, args: &[Value]) -> Result<Object> {
        let env = self.env();
        let raw_args: Vec<sys::RawValue> = args.iter().map(|a| a.raw()).collect();
        let mut out = sys::RawValue::NONE;
        let status = unsafe {
            (env.abi().new_instance)(
                env.raw(),
                self.raw(),
                raw_args.len(),
                raw_args.as_ptr(),
                &mut out,
            )
        };
        env.check(status)?;
        Ok(Object::from_raw(env, out))
    }

    /// Like [`call`](Function::call), but tells the host this is a re-entry
    /// from outside a callback frame so it can run its usual
    /// after-callback bookkeeping.
    pub fn make_callback(&self, this: &Value, args: &[Value]) -> Result<Value> {
        let env = self.env();
        let raw_args: Vec<sys::RawValue> = args.iter().map(|a| a.raw()).collect();
        let mut out = sys::RawValue::NONE;
        let status = unsafe {
            (env.abi().make_callback)(
                env.raw(),
                this.raw(),
                self.raw(),
                raw_args.len(),
                raw_args.as_ptr(),
                &mut out,
            )
        };
        env.check(status)?;
        Ok(Value::from_raw(env, out))
    }
}
