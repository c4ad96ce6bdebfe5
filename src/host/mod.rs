//! In-process reference host.
//!
//! A [`Runtime`] owns a complete host: the value store with its mark-sweep
//! collector, the entry-point table and a worker pool for async work. It
//! exists so native modules built on this crate can be exercised against real
//! host semantics without an external runtime; collection and async
//! completion are explicit, which keeps lifetime tests deterministic.

mod abi;
mod store;
mod work_queue;

use std::ffi::c_void;

use crate::env::Env;
use crate::error::{Error, Result};
use crate::object::Object;
use crate::reference::{ObjectReference, Reference};
use crate::scope::HandleScope;
use crate::sys;
use crate::value::TypedValue;

use store::{HostState, HostValue, ObjectData, ObjectKind};
use work_queue::WorkQueue;

pub(crate) struct EnvState {
    pub store: HostState,
    pub queue: WorkQueue,
}

/// One host instance. Single-threaded for all value access; only async
/// execute hooks leave this thread.
pub struct Runtime {
    state: Box<EnvState>,
    env_cell: Box<sys::EnvCell>,
    root_scope: sys::RawScope,
}

impl Runtime {
    pub fn new() -> std::io::Result<Runtime> {
        let mut state = Box::new(EnvState {
            store: HostState::new(),
            queue: WorkQueue::new()?,
        });
        let root_scope = state.store.open_scope(false);
        let global = state
            .store
            .alloc_unrooted(HostValue::Object(ObjectData::new(ObjectKind::Plain)));
        state.store.global = Some(global);
        let env_cell = Box::new(sys::EnvCell {
            table: &abi::ABI_TABLE,
            state: state.as_mut() as *mut EnvState as *mut c_void,
        });
        Ok(Runtime {
            state,
            env_cell,
            root_scope,
        })
    }

    pub fn env(&self) -> Env {
        Env::from_raw(self.env_cell.as_ref() as *const sys::EnvCell as sys::RawEnv)
    }

    /// Runs a module init the way the loader would: fresh exports and module
    /// objects, the registration guard around `init`, and the resulting
    /// exports pinned behind a persistent reference.
    pub fn load_module<F>(&mut self, init: F) -> Result<ObjectReference>
    where
        F: FnOnce(Env, Object, Object) -> Result<Object>,
    {
        let env = self.env();
        let scope = HandleScope::new(&env)?;
        let exports = Object::new(&env)?;
        let module = Object::new(&env)?;
        let raw = crate::module::register_module(env.raw(), exports.raw(), module.raw(), init);
        if raw.is_none() {
            drop(scope);
            return Err(Error::last(env));
        }
        let exports = Object::from_raw(env, raw);
        let reference = Reference::persistent(&exports)?;
        Ok(reference)
    }

    /// Full mark-and-sweep over the store. Finalizers of swept values run
    /// before this returns.
    pub fn collect_garbage(&mut self) {
        let actions = self.state.store.collect();
        log::debug!("collection produced {} finalizable values", actions.len());
        for action in actions {
            unsafe { (action.finalizer)(action.data, action.hint) };
        }
    }

    /// Drains the async queue: waits for every in-flight execute hook and
    /// runs its complete and destroy hooks here, on the value thread.
    pub fn run_until_idle(&mut self) {
        while let Some(id) = self.state.queue.wait_completed() {
            let hooks = self
                .state
                .store
                .works
                .get(&id)
                .map(|entry| (entry.data, entry.complete, entry.destroy));
            let (data, complete, destroy) = match hooks {
                Some(hooks) => hooks,
                None => {
                    log::warn!("completed async work {} is gone from the registry", id);
                    continue;
                }
            };
            let env = self.env().raw();
            unsafe {
                complete(env, data);
                destroy(env, data);
            }
            // Destroy hooks normally delete the work themselves.
            self.state.store.works.remove(&id);
        }
    }

    pub fn pending_async_work(&self) -> usize {
        self.state.queue.outstanding()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.run_until_idle();
        let _ = self.state.store.close_scope(self.root_scope, false);
        let actions = self.state.store.drain_all();
        for action in actions {
            unsafe { (action.finalizer)(action.data, action.hint) };
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::error::ErrorKind;
    use crate::value::{External, Number};

    // An environment with no handle scope open, which a `Runtime` never
    // exposes: its root scope stays open for the runtime's lifetime.
    fn scopeless_env() -> (Box<EnvState>, Box<sys::EnvCell>) {
        let mut state = Box::new(EnvState {
            store: HostState::new(),
            queue: WorkQueue::new().unwrap(),
        });
        let cell = Box::new(sys::EnvCell {
            table: &abi::ABI_TABLE,
            state: state.as_mut() as *mut EnvState as *mut c_void,
        });
        (state, cell)
    }

    fn env_of(cell: &sys::EnvCell) -> Env {
        Env::from_raw(cell as *const sys::EnvCell as sys::RawEnv)
    }

    #[test]
    fn value_creation_without_a_scope_errors_instead_of_crashing() {
        let (_state, cell) = scopeless_env();
        let env = env_of(&cell);
        let err = match Number::new(&env, 1.0) {
            Ok(_) => panic!("value creation succeeded without a scope"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), ErrorKind::Error);
        assert_eq!(err.message(), "handle scope mismatch");
    }

    struct Tracked(Arc<AtomicBool>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn external_payload_is_reclaimed_when_creation_fails() {
        let (_state, cell) = scopeless_env();
        let env = env_of(&cell);
        let dropped = Arc::new(AtomicBool::new(false));
        let result = External::new(&env, Box::new(Tracked(dropped.clone())));
        assert!(result.is_err());
        assert!(dropped.load(Ordering::SeqCst));
    }
}
