//! hostbridge: a typed native binding layer over a versioned C host-runtime
//! interface.
//!
//! Native modules use this crate to expose functions, classes and async work
//! to a garbage-collected host runtime without touching the raw entry-point
//! table. The layers, bottom up:
//!
//! - [`sys`] - the raw, versioned C interface (declarations only)
//! - [`env`], [`error`] - per-invocation context and status/exception translation
//! - [`value`], [`object`], [`buffer`] - typed, scope-bound value proxies
//! - [`scope`], [`reference`] - handle lifetime and GC roots
//! - [`function`], [`callback`], [`wrap`] - callables, call frames, native classes
//! - [`async_worker`] - background work with value-thread completion
//! - [`module`] - the loader entry point
//! - [`host`] - an in-process reference host for exercising all of the above

pub mod async_worker;
pub mod buffer;
pub mod callback;
pub mod env;
pub mod error;
pub mod function;
pub mod host;
pub mod module;
pub mod object;
pub mod reference;
pub mod scope;
pub mod sys;
pub mod value;
pub mod wrap;

pub use async_worker::{AsyncWork, AsyncWorker};
pub use buffer::{ArrayBuffer, Buffer, Element, TypedArray, TypedArrayOf};
pub use callback::CallbackInfo;
pub use env::Env;
pub use error::{Error, ErrorKind, Result};
pub use function::Function;
pub use host::Runtime;
pub use module::register_module;
pub use object::{Array, Object};
pub use reference::{FunctionReference, ObjectReference, Ownership, Reference};
pub use scope::{EscapableHandleScope, HandleScope};
pub use value::{Boolean, External, Number, TypedValue, Value};
pub use wrap::{Class, ClassBuilder, Property, PropertyKind};
