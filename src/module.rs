//! Module registration.
//!
//! The host loader calls the module's entry symbol once with the environment,
//! the exports object and the module object. [`register_module`] is the guard
//! around the user's init function: any native error escaping it becomes a
//! thrown host exception before control returns to the loader.

use crate::env::Env;
use crate::error::Result;
use crate::function::throw_unless_pending;
use crate::object::Object;
use crate::sys;
use crate::value::TypedValue;

/// Runs `init` under the boundary guard and returns the raw exports value the
/// loader expects. On error the exports slot reads as "no value" and a host
/// exception is pending.
pub fn register_module<F>(
    env: sys::RawEnv,
    exports: sys::RawValue,
    module: sys::RawValue,
    init: F,
) -> sys::RawValue
where
    F: FnOnce(Env, Object, Object) -> Result<Object>,
{
    let env = Env::from_raw(env);
    let exports = Object::from_raw(env, exports);
    let module = Object::from_raw(env, module);
    match init(env, exports, module) {
        Ok(exports) => exports.raw(),
        Err(err) => {
            throw_unless_pending(&env, err);
            sys::RawValue::NONE
        }
    }
}

/// Declares the exported entry symbol the host loader resolves.
///
/// ```ignore
/// fn init(env: Env, exports: Object, _module: Object) -> Result<Object> {
///     exports.set("answer", Number::new(&env, 42.0)?)?;
///     Ok(exports)
/// }
///
/// hostbridge::host_module!(init);
/// ```
#[macro_export]
macro_rules! host_module {
    ($init:path) => {
        #[no_mangle]
        pub unsafe extern "C" fn hostbridge_module_init(
            env: $crate::sys::RawEnv,
            exports: $crate::sys::RawValue,
            module: $crate::sys::RawValue,
        ) -> $crate::sys::RawValue {
            $crate::module::register_module(env, exports, module, $init)
        }
    };
}
