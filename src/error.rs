//! Error translation between ABI status codes and host exceptions.
//!
//! Every fallible operation in this crate returns [`Result`]. An [`Error`]
//! either relays a host exception that was already pending, or materializes a
//! new host error from the ABI's last-error snapshot. Conversion back into a
//! thrown host exception happens exactly once, at the boundary trampolines.

use std::cell::OnceCell;

use crate::env::Env;
use crate::scope::HandleScope;
use crate::sys;
use crate::value::{TypedValue, Value};

pub type Result<T> = std::result::Result<T, Error>;

/// Host-visible error category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
}

/// A native error carrying (usually) an underlying host exception value.
///
/// The message is fetched lazily from the host value's `message` property on
/// first access and cached.
pub struct Error {
    env: Env,
    value: sys::RawValue,
    kind: ErrorKind,
    message: OnceCell<String>,
}

impl Error {
    /// Captures the current failure state of the environment.
    ///
    /// Prefers a genuinely pending host exception, capturing and clearing it.
    /// Otherwise classifies the ABI's last status — argument-type-expectation
    /// codes become a type error — and synthesizes a host exception from the
    /// last-error message.
    pub fn last(env: Env) -> Error {
        if env.is_exception_pending() {
            let mut exc = sys::RawValue::NONE;
            let status = unsafe { (env.abi().get_and_clear_last_exception)(env.raw(), &mut exc) };
            if status == sys::Status::Ok {
                return Error {
                    env,
                    value: exc,
                    kind: ErrorKind::Error,
                    message: OnceCell::new(),
                };
            }
        }

        let mut info = sys::RawErrorInfo::EMPTY;
        let status = unsafe { (env.abi().get_last_error_info)(env.raw(), &mut info) };
        let (last_status, text) = if status == sys::Status::Ok {
            let text = if info.message.is_null() || info.message_len == 0 {
                String::from("Error in native callback")
            } else {
                let bytes = unsafe { std::slice::from_raw_parts(info.message, info.message_len) };
                String::from_utf8_lossy(bytes).into_owned()
            };
            (info.status, text)
        } else {
            (
                sys::Status::GenericFailure,
                String::from("Error in native callback"),
            )
        };

        let kind = classify(last_status);
        Error::synthesize(env, kind, &text)
    }

    /// Builds a new base-kind error with a fresh host exception value.
    pub fn new(env: &Env, message: &str) -> Error {
        Error::synthesize(*env, ErrorKind::Error, message)
    }

    pub fn type_error(env: &Env, message: &str) -> Error {
        Error::synthesize(*env, ErrorKind::TypeError, message)
    }

    pub fn range_error(env: &Env, message: &str) -> Error {
        Error::synthesize(*env, ErrorKind::RangeError, message)
    }

    /// Wraps an existing host value (typically a caught exception) as-is.
    pub fn from_value(env: &Env, value: Value) -> Error {
        Error {
            env: *env,
            value: value.raw(),
            kind: ErrorKind::Error,
            message: OnceCell::new(),
        }
    }

    fn synthesize(env: Env, kind: ErrorKind, message: &str) -> Error {
        let abi = env.abi();
        let mut msg = sys::RawValue::NONE;
        let status = unsafe {
            (abi.create_string_utf8)(env.raw(), message.as_ptr(), message.len(), &mut msg)
        };
        let mut value = sys::RawValue::NONE;
        if status == sys::Status::Ok {
            let create = match kind {
                ErrorKind::Error => abi.create_error,
                ErrorKind::TypeError => abi.create_type_error,
                ErrorKind::RangeError => abi.create_range_error,
            };
            let status = unsafe { create(env.raw(), msg, &mut value) };
            if status != sys::Status::Ok {
                value = sys::RawValue::NONE;
            }
        }

        let cached = OnceCell::new();
        if value.is_none() {
            // Could not materialize a host value; keep the message natively so
            // Display still has something to say.
            let _ = cached.set(message.to_string());
        }
        Error {
            env,
            value,
            kind,
            message: cached,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn env(&self) -> Env {
        self.env
    }

    /// The underlying host exception value, if one was materialized. The
    /// handle obeys the usual scope rules.
    pub fn value(&self) -> Option<Value> {
        if self.value.is_none() {
            None
        } else {
            Some(Value::from_raw(self.env, self.value))
        }
    }

    /// Throws the wrapped value as a host exception. No-op when there is no
    /// underlying host value.
    pub fn throw(&self) {
        if self.value.is_none() {
            return;
        }
        let status = unsafe { (self.env.abi().throw)(self.env.raw(), self.value) };
        if status != sys::Status::Ok {
            log::warn!("failed to throw host exception: {:?}", status);
        }
    }

    /// The error message, read from the host value's `message` property on
    /// first access. Empty when no message can be recovered.
    pub fn message(&self) -> String {
        self.message
            .get_or_init(|| self.fetch_message().unwrap_or_default())
            .clone()
    }

    fn fetch_message(&self) -> Option<String> {
        if self.value.is_none() {
            return None;
        }
        let _scope = HandleScope::new(&self.env).ok()?;
        let value = Value::from_raw(self.env, self.value);
        let object = value.coerce_to_object().ok()?;
        let message = object.get("message").ok()?;
        message.cast::<crate::value::String>().to_utf8().ok()
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("message", &self.message())
            .finish()
    }
}

impl std::error::Error for Error {}

/// Maps a failing ABI status to the error kind the spec of the interface
/// prescribes: argument-type expectations are type errors, everything else is
/// a plain error.
fn classify(status: sys::Status) -> ErrorKind {
    match status {
        sys::Status::ObjectExpected
        | sys::Status::StringExpected
        | sys::Status::BooleanExpected
        | sys::Status::NumberExpected => ErrorKind::TypeError,
        _ => ErrorKind::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_expectation_statuses_classify_as_type_errors() {
        assert_eq!(classify(sys::Status::ObjectExpected), ErrorKind::TypeError);
        assert_eq!(classify(sys::Status::StringExpected), ErrorKind::TypeError);
        assert_eq!(classify(sys::Status::BooleanExpected), ErrorKind::TypeError);
        assert_eq!(classify(sys::Status::NumberExpected), ErrorKind::TypeError);
    }

    #[test]
    fn other_statuses_classify_as_plain_errors() {
        assert_eq!(classify(sys::Status::GenericFailure), ErrorKind::Error);
        assert_eq!(classify(sys::Status::FunctionExpected), ErrorKind::Error);
        assert_eq!(classify(sys::Status::InvalidArg), ErrorKind::Error);
    }
}
