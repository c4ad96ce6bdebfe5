//! Async work: run native code off the value thread, then report back.
//!
//! The lifecycle is execute, complete, destroy. Execute runs on a host
//! worker-pool thread with no environment access; complete and destroy run
//! back on the value thread. Failure travels as a message from execute to
//! complete, where it becomes a host error value.

use std::ffi::c_void;

use crate::env::Env;
use crate::error::{Error, Result};
use crate::function::Function;
use crate::object::Object;
use crate::reference::{FunctionReference, ObjectReference, Reference};
use crate::scope::HandleScope;
use crate::sys;
use crate::value::Value;

/// A unit of background work with its value-thread result hooks.
pub trait AsyncWork: Send + 'static {
    /// Runs on a worker thread. Must not touch the environment or any host
    /// value. An `Err` message marks the work failed.
    fn execute(&mut self) -> std::result::Result<(), std::string::String>;

    /// Builds the callback arguments for a successful run. Default: none.
    fn on_ok(&mut self, _env: &Env) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    /// Builds the callback arguments for a failed run. Default: the error
    /// value alone.
    fn on_error(&mut self, env: &Env, error: Error) -> Result<Vec<Value>> {
        let value = match error.value() {
            Some(value) => value,
            None => env.undefined()?,
        };
        Ok(vec![value])
    }
}

/// Drives an [`AsyncWork`] and delivers its outcome to a host callback.
///
/// The callback function and the receiver object are held through persistent
/// references for as long as the work is in flight.
pub struct AsyncWorker<W: AsyncWork> {
    env: Env,
    work: W,
    callback: FunctionReference,
    receiver: ObjectReference,
    error_message: Option<std::string::String>,
}

struct WorkState<W: AsyncWork> {
    worker: AsyncWorker<W>,
    raw: sys::RawWork,
}

impl<W: AsyncWork> AsyncWorker<W> {
    pub fn new(env: &Env, receiver: &Object, callback: &Function, work: W) -> Result<AsyncWorker<W>> {
        Ok(AsyncWorker {
            env: *env,
            work,
            callback: Reference::persistent(callback)?,
            receiver: Reference::persistent(receiver)?,
            error_message: None,
        })
    }

    /// Hands the work to the host's pool. The worker is owned by the host
    /// until the destroy hook runs.
    pub fn queue(self) -> Result<()> {
        let env = self.env;
        let state = Box::into_raw(Box::new(WorkState {
            worker: self,
            raw: sys::RawWork(0),
        }));

        let mut raw = sys::RawWork(0);
        let status = unsafe {
            (env.abi().create_async_work)(
                env.raw(),
                state as *mut c_void,
                execute_hook::<W>,
                complete_hook::<W>,
                destroy_hook::<W>,
                &mut raw,
            )
        };
        if let Err(err) = env.check(status) {
            drop(unsafe { Box::from_raw(state) });
            return Err(err);
        }
        unsafe { &mut *state }.raw = raw;

        log::debug!("queueing async work {}", raw.0);
        let status = unsafe { (env.abi().queue_async_work)(env.raw(), raw) };
        if let Err(err) = env.check(status) {
            let status = unsafe { (env.abi().delete_async_work)(env.raw(), raw) };
            if status != sys::Status::Ok {
                log::warn!("deleting unqueued async work failed: {:?}", status);
            }
            drop(unsafe { Box::from_raw(state) });
            return Err(err);
        }
        Ok(())
    }

    fn finish(&mut self, env: &Env) -> Result<()> {
        let _scope = HandleScope::new(env)?;
        let this = self.receiver.value_or_undefined()?;
        let args = match self.error_message.take() {
            None => self.work.on_ok(env)?,
            Some(message) => {
                let error = Error::new(env, &message);
                self.work.on_error(env, error)?
            }
        };
        self.callback.make_callback(&this, &args)?;
        Ok(())
    }
}

unsafe extern "C" fn execute_hook<W: AsyncWork>(data: *mut c_void) {
    let state = unsafe { &mut *(data as *mut WorkState<W>) };
    if let Err(message) = state.worker.work.execute() {
        state.worker.error_message = Some(message);
    }
}

unsafe extern "C" fn complete_hook<W: AsyncWork>(env: sys::RawEnv, data: *mut c_void) {
    let env = Env::from_raw(env);
    let state = unsafe { &mut *(data as *mut WorkState<W>) };
    if let Err(err) = state.worker.finish(&env) {
        crate::function::throw_unless_pending(&env, err);
    }
}

unsafe extern "C" fn destroy_hook<W: AsyncWork>(env: sys::RawEnv, data: *mut c_void) {
    let env = Env::from_raw(env);
    let state = unsafe { Box::from_raw(data as *mut WorkState<W>) };
    if state.raw.0 != 0 {
        let status = unsafe { (env.abi().delete_async_work)(env.raw(), state.raw) };
        if status != sys::Status::Ok {
            log::warn!("deleting async work failed: {:?}", status);
        }
    }
    // Dropping the state releases the callback and receiver references.
}
