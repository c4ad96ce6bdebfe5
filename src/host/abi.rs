//! The reference host's implementation of the entry-point table.
//!
//! Every entry resolves handles against the store, records the status of the
//! call for `get_last_error_info`, and returns through out-parameters. Entries
//! that can re-enter native code (calls, accessor dispatch) release the store
//! borrow before invoking a trampoline and re-borrow afterwards.

use std::ffi::c_void;

use crate::host::store::{
    ClassData, FunctionData, HostState, HostValue, ObjectData, ObjectKind, OwnedRegistration,
    PropertyValue, ViewData, WorkEntry, WrapData,
};
use crate::host::EnvState;
use crate::sys;

pub(crate) unsafe fn env_state<'a>(env: sys::RawEnv) -> &'a mut EnvState {
    unsafe { &mut *((*env).state as *mut EnvState) }
}

fn store<'a>(env: sys::RawEnv) -> &'a mut HostState {
    &mut unsafe { env_state(env) }.store
}

fn write_out<T>(out: *mut T, value: T) {
    if !out.is_null() {
        unsafe { *out = value };
    }
}

fn complete<T>(
    st: &mut HostState,
    out: *mut T,
    result: Result<T, sys::Status>,
) -> sys::Status {
    match result {
        Ok(value) => {
            write_out(out, value);
            st.ok()
        }
        Err(status) => st.fail(status),
    }
}

fn guard_pending(st: &mut HostState) -> Result<(), sys::Status> {
    if st.pending_exception.is_some() {
        Err(sys::Status::PendingException)
    } else {
        Ok(())
    }
}

fn name_from_raw(name: *const u8, len: usize) -> Result<&'static str, sys::Status> {
    if name.is_null() && len > 0 {
        return Err(sys::Status::InvalidArg);
    }
    let bytes = if len == 0 {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(name, len) }
    };
    std::str::from_utf8(bytes).map_err(|_| sys::Status::InvalidArg)
}

// Typed slot lookups

fn expect_object(st: &HostState, raw: sys::RawValue) -> Result<u32, sys::Status> {
    let slot = st.resolve(raw)?;
    match st.slot_value(slot) {
        HostValue::Object(_) => Ok(slot),
        _ => Err(sys::Status::ObjectExpected),
    }
}

fn expect_function(st: &HostState, raw: sys::RawValue) -> Result<u32, sys::Status> {
    let slot = st.resolve(raw)?;
    match st.slot_value(slot) {
        HostValue::Object(object) if matches!(object.kind, ObjectKind::Function(_)) => Ok(slot),
        _ => Err(sys::Status::FunctionExpected),
    }
}

fn expect_string(st: &HostState, raw: sys::RawValue) -> Result<u32, sys::Status> {
    let slot = st.resolve(raw)?;
    match st.slot_value(slot) {
        HostValue::String(_) => Ok(slot),
        _ => Err(sys::Status::StringExpected),
    }
}

fn expect_number(st: &HostState, raw: sys::RawValue) -> Result<f64, sys::Status> {
    let slot = st.resolve(raw)?;
    match st.slot_value(slot) {
        HostValue::Number(n) => Ok(*n),
        _ => Err(sys::Status::NumberExpected),
    }
}

fn value_type_of(st: &HostState, slot: u32) -> sys::ValueType {
    match st.slot_value(slot) {
        HostValue::Undefined => sys::ValueType::Undefined,
        HostValue::Null => sys::ValueType::Null,
        HostValue::Boolean(_) => sys::ValueType::Boolean,
        HostValue::Number(_) => sys::ValueType::Number,
        HostValue::String(_) => sys::ValueType::String,
        HostValue::External { .. } => sys::ValueType::External,
        HostValue::Object(object) => match object.kind {
            ObjectKind::Function(_) => sys::ValueType::Function,
            _ => sys::ValueType::Object,
        },
    }
}

// Coercion helpers

fn truthy(st: &HostState, slot: u32) -> bool {
    match st.slot_value(slot) {
        HostValue::Undefined | HostValue::Null => false,
        HostValue::Boolean(b) => *b,
        HostValue::Number(n) => *n != 0.0 && !n.is_nan(),
        HostValue::String(s) => !s.is_empty(),
        HostValue::External { .. } | HostValue::Object(_) => true,
    }
}

fn to_number(st: &HostState, slot: u32) -> f64 {
    match st.slot_value(slot) {
        HostValue::Undefined => f64::NAN,
        HostValue::Null => 0.0,
        HostValue::Boolean(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        HostValue::Number(n) => *n,
        HostValue::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        HostValue::External { .. } | HostValue::Object(_) => f64::NAN,
    }
}

fn format_number(n: f64) -> std::string::String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn to_string_repr(st: &HostState, slot: u32) -> std::string::String {
    match st.slot_value(slot) {
        HostValue::Undefined => "undefined".to_string(),
        HostValue::Null => "null".to_string(),
        HostValue::Boolean(b) => b.to_string(),
        HostValue::Number(n) => format_number(*n),
        HostValue::String(s) => s.clone(),
        HostValue::External { .. } => "[external]".to_string(),
        HostValue::Object(object) => match &object.kind {
            ObjectKind::Function(f) => format!("function {}() {{ [native code] }}", f.name),
            _ => "[object Object]".to_string(),
        },
    }
}

// Property machinery

/// Walks the prototype chain for a named property.
fn lookup_property(st: &HostState, mut slot: u32, name: &str) -> Option<PropertyValue> {
    loop {
        let object = match st.slot_value(slot) {
            HostValue::Object(object) => object,
            _ => return None,
        };
        if let Some(found) = object.own_property(name) {
            return Some(found);
        }
        match object.prototype {
            Some(proto) => slot = proto,
            None => return None,
        }
    }
}

enum PropertyKey {
    Name(std::string::String),
    Index(u32),
}

fn property_key(st: &HostState, raw: sys::RawValue) -> Result<PropertyKey, sys::Status> {
    let slot = st.resolve(raw)?;
    if let HostValue::Number(n) = st.slot_value(slot) {
        if n.fract() == 0.0 && *n >= 0.0 && *n <= u32::MAX as f64 {
            return Ok(PropertyKey::Index(*n as u32));
        }
    }
    Ok(PropertyKey::Name(to_string_repr(st, slot)))
}

// Call machinery

struct CallFrame {
    this: sys::RawValue,
    args: Vec<sys::RawValue>,
    data: *mut c_void,
    construct: bool,
    ret: sys::RawValue,
}

/// Runs a host function: opens a callee scope, builds the frame, invokes the
/// trampoline, and re-roots the result (or the new instance) in the caller's
/// scope. Returns `PendingException` without clearing it if the callee threw.
fn invoke(
    env: sys::RawEnv,
    func: sys::RawValue,
    this: sys::RawValue,
    argc: usize,
    argv: *const sys::RawValue,
    construct: bool,
) -> Result<sys::RawValue, sys::Status> {
    let (callback, data, scope, frame_ptr) = {
        let st = store(env);
        guard_pending(st)?;
        let func_slot = expect_function(st, func)?;
        let (callback, data, class_proto) = match st.slot_value(func_slot) {
            HostValue::Object(object) => match &object.kind {
                ObjectKind::Function(f) => {
                    (f.callback, f.data, f.class.as_ref().map(|c| c.prototype))
                }
                _ => return Err(sys::Status::FunctionExpected),
            },
            _ => return Err(sys::Status::FunctionExpected),
        };
        let args = if argc == 0 {
            Vec::new()
        } else {
            if argv.is_null() {
                return Err(sys::Status::InvalidArg);
            }
            unsafe { std::slice::from_raw_parts(argv, argc) }.to_vec()
        };
        for arg in &args {
            st.resolve(*arg)?;
        }
        let scope = st.open_scope(false);
        let this = if construct {
            let mut instance = ObjectData::new(ObjectKind::Plain);
            instance.prototype = class_proto;
            match st.alloc(HostValue::Object(instance)) {
                Ok(raw) => raw,
                Err(status) => {
                    let _ = st.close_scope(scope, false);
                    return Err(status);
                }
            }
        } else if this.is_none() {
            match st.alloc(HostValue::Undefined) {
                Ok(raw) => raw,
                Err(status) => {
                    let _ = st.close_scope(scope, false);
                    return Err(status);
                }
            }
        } else {
            this
        };
        let frame = Box::new(CallFrame {
            this,
            args,
            data,
            construct,
            ret: sys::RawValue::NONE,
        });
        (callback, data, scope, Box::into_raw(frame))
    };
    let _ = data;

    unsafe { callback(env, sys::RawCallbackInfo(frame_ptr as *mut c_void)) };

    let frame = unsafe { Box::from_raw(frame_ptr) };
    let st = store(env);
    let threw = st.pending_exception.is_some();
    let result_slot = if construct {
        // A constructor returning an object wins over the fresh instance.
        match st.resolve(frame.ret) {
            Ok(slot) if matches!(st.slot_value(slot), HostValue::Object(_)) => Some(slot),
            _ => st.resolve(frame.this).ok(),
        }
    } else {
        st.resolve(frame.ret).ok()
    };
    st.close_scope(scope, false)?;
    if threw {
        return Err(sys::Status::PendingException);
    }
    match result_slot {
        Some(slot) => st.push_handle(slot),
        None => st.alloc(HostValue::Undefined),
    }
}

/// Invokes an accessor half with one optional argument.
fn invoke_accessor(
    env: sys::RawEnv,
    func_slot: u32,
    this: sys::RawValue,
    arg: Option<sys::RawValue>,
) -> Result<sys::RawValue, sys::Status> {
    let func = store(env).handle_for(func_slot);
    let args: Vec<sys::RawValue> = arg.into_iter().collect();
    invoke(env, func, this, args.len(), args.as_ptr(), false)
}

fn get_property_impl(
    env: sys::RawEnv,
    object: sys::RawValue,
    name: &str,
) -> Result<sys::RawValue, sys::Status> {
    let lookup = {
        let st = store(env);
        guard_pending(st)?;
        let slot = expect_object(st, object)?;
        lookup_property(st, slot, name)
    };
    match lookup {
        None => store(env).alloc(HostValue::Undefined),
        Some(PropertyValue::Slot(slot)) => store(env).push_handle(slot),
        Some(PropertyValue::Accessor { getter, .. }) => match getter {
            Some(getter) => invoke_accessor(env, getter, object, None),
            None => store(env).alloc(HostValue::Undefined),
        },
    }
}

fn set_property_impl(
    env: sys::RawEnv,
    object: sys::RawValue,
    name: &str,
    value: sys::RawValue,
) -> Result<(), sys::Status> {
    let existing = {
        let st = store(env);
        guard_pending(st)?;
        let object_slot = expect_object(st, object)?;
        let value_slot = st.resolve(value)?;
        match lookup_property(st, object_slot, name) {
            Some(PropertyValue::Accessor { setter, .. }) => Some(setter),
            _ => {
                if let HostValue::Object(data) = st.slot_value_mut(object_slot) {
                    data.set_own_property(name, PropertyValue::Slot(value_slot));
                }
                None
            }
        }
    };
    match existing {
        None => Ok(()),
        Some(Some(setter)) => {
            invoke_accessor(env, setter, object, Some(value))?;
            Ok(())
        }
        // Assigning through a getter-only property is silently ignored.
        Some(None) => Ok(()),
    }
}

// Value creation entries

unsafe extern "C" fn abi_get_undefined(env: sys::RawEnv, out: *mut sys::RawValue) -> sys::Status {
    let st = store(env);
    let result = st.alloc(HostValue::Undefined);
    complete(st, out, result)
}

unsafe extern "C" fn abi_get_null(env: sys::RawEnv, out: *mut sys::RawValue) -> sys::Status {
    let st = store(env);
    let result = st.alloc(HostValue::Null);
    complete(st, out, result)
}

unsafe extern "C" fn abi_get_global(env: sys::RawEnv, out: *mut sys::RawValue) -> sys::Status {
    let st = store(env);
    let result = match st.global {
        Some(slot) => st.push_handle(slot),
        None => Err(sys::Status::GenericFailure),
    };
    complete(st, out, result)
}

unsafe extern "C" fn abi_get_boolean(
    env: sys::RawEnv,
    value: bool,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let result = st.alloc(HostValue::Boolean(value));
    complete(st, out, result)
}

unsafe extern "C" fn abi_create_number(
    env: sys::RawEnv,
    value: f64,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let result = st.alloc(HostValue::Number(value));
    complete(st, out, result)
}

unsafe extern "C" fn abi_create_string_utf8(
    env: sys::RawEnv,
    data: *const u8,
    len: usize,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let result = name_from_raw(data, len)
        .and_then(|text| st.alloc(HostValue::String(text.to_string())));
    complete(st, out, result)
}

unsafe extern "C" fn abi_create_string_utf16(
    env: sys::RawEnv,
    data: *const u16,
    len: usize,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let result = if data.is_null() && len > 0 {
        Err(sys::Status::InvalidArg)
    } else {
        let units = if len == 0 {
            &[][..]
        } else {
            unsafe { std::slice::from_raw_parts(data, len) }
        };
        match std::string::String::from_utf16(units) {
            Ok(text) => st.alloc(HostValue::String(text)),
            Err(_) => Err(sys::Status::InvalidArg),
        }
    };
    complete(st, out, result)
}

unsafe extern "C" fn abi_create_object(env: sys::RawEnv, out: *mut sys::RawValue) -> sys::Status {
    let st = store(env);
    let result = st.alloc(HostValue::Object(ObjectData::new(ObjectKind::Plain)));
    complete(st, out, result)
}

unsafe extern "C" fn abi_create_array(env: sys::RawEnv, out: *mut sys::RawValue) -> sys::Status {
    let st = store(env);
    let result = st.alloc(HostValue::Object(ObjectData::new(ObjectKind::Array)));
    complete(st, out, result)
}

unsafe extern "C" fn abi_create_array_with_length(
    env: sys::RawEnv,
    length: usize,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let mut data = ObjectData::new(ObjectKind::Array);
    data.elements = vec![None; length];
    let result = st.alloc(HostValue::Object(data));
    complete(st, out, result)
}

unsafe extern "C" fn abi_create_external(
    env: sys::RawEnv,
    data: *mut c_void,
    finalizer: Option<sys::Finalizer>,
    hint: *mut c_void,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let result = st.alloc(HostValue::External {
        data,
        finalizer,
        hint,
    });
    complete(st, out, result)
}

unsafe extern "C" fn abi_create_function(
    env: sys::RawEnv,
    name: *const u8,
    name_len: usize,
    callback: sys::Callback,
    data: *mut c_void,
    data_finalizer: Option<sys::Finalizer>,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let result = name_from_raw(name, name_len).and_then(|name| {
        st.alloc(HostValue::Object(ObjectData::new(ObjectKind::Function(
            FunctionData {
                name: name.to_string(),
                callback,
                data,
                data_finalizer,
                class: None,
            },
        ))))
    });
    complete(st, out, result)
}

fn create_error_impl(
    st: &mut HostState,
    message: sys::RawValue,
    kind_prop: &str,
) -> Result<sys::RawValue, sys::Status> {
    let message_slot = expect_string(st, message)?;
    let kind_slot = st.alloc_unrooted(HostValue::String(kind_prop.to_string()));
    let mut data = ObjectData::new(ObjectKind::Plain);
    data.is_error = true;
    data.set_own_property("message", PropertyValue::Slot(message_slot));
    data.set_own_property("name", PropertyValue::Slot(kind_slot));
    st.alloc(HostValue::Object(data))
}

unsafe extern "C" fn abi_create_error(
    env: sys::RawEnv,
    message: sys::RawValue,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let result = create_error_impl(st, message, "Error");
    complete(st, out, result)
}

unsafe extern "C" fn abi_create_type_error(
    env: sys::RawEnv,
    message: sys::RawValue,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let result = create_error_impl(st, message, "TypeError");
    complete(st, out, result)
}

unsafe extern "C" fn abi_create_range_error(
    env: sys::RawEnv,
    message: sys::RawValue,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let result = create_error_impl(st, message, "RangeError");
    complete(st, out, result)
}

unsafe extern "C" fn abi_create_array_buffer(
    env: sys::RawEnv,
    len: usize,
    out_data: *mut *mut u8,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let mut storage = vec![0u8; len].into_boxed_slice();
    let ptr = storage.as_mut_ptr();
    let result = st
        .alloc(HostValue::Object(ObjectData::new(ObjectKind::ArrayBuffer(
            storage,
        ))))
        .map(|raw| {
            write_out(out_data, ptr);
            raw
        });
    complete(st, out, result)
}

fn elem_size(kind: sys::TypedArrayKind) -> usize {
    match kind {
        sys::TypedArrayKind::Int8
        | sys::TypedArrayKind::Uint8
        | sys::TypedArrayKind::Uint8Clamped => 1,
        sys::TypedArrayKind::Int16 | sys::TypedArrayKind::Uint16 => 2,
        sys::TypedArrayKind::Int32
        | sys::TypedArrayKind::Uint32
        | sys::TypedArrayKind::Float32 => 4,
        sys::TypedArrayKind::Float64 => 8,
    }
}

unsafe extern "C" fn abi_create_typed_array(
    env: sys::RawEnv,
    kind: sys::TypedArrayKind,
    length: usize,
    buffer: sys::RawValue,
    byte_offset: usize,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let result = (|| {
        let buffer_slot = st.resolve(buffer)?;
        let capacity = match st.slot_value(buffer_slot) {
            HostValue::Object(object) => match &object.kind {
                ObjectKind::ArrayBuffer(storage) => storage.len(),
                _ => return Err(sys::Status::InvalidArg),
            },
            _ => return Err(sys::Status::InvalidArg),
        };
        let span = length
            .checked_mul(elem_size(kind))
            .and_then(|bytes| bytes.checked_add(byte_offset))
            .ok_or(sys::Status::InvalidArg)?;
        if span > capacity {
            return Err(sys::Status::InvalidArg);
        }
        st.alloc(HostValue::Object(ObjectData::new(ObjectKind::View(
            ViewData {
                kind,
                buffer: buffer_slot,
                byte_offset,
                length,
                is_buffer: false,
            },
        ))))
    })();
    complete(st, out, result)
}

fn create_buffer_impl(
    st: &mut HostState,
    len: usize,
    init: Option<&[u8]>,
) -> Result<(*mut u8, sys::RawValue), sys::Status> {
    let mut storage = vec![0u8; len].into_boxed_slice();
    if let Some(init) = init {
        storage.copy_from_slice(init);
    }
    let ptr = storage.as_mut_ptr();
    let buffer_slot = st.alloc_unrooted(HostValue::Object(ObjectData::new(
        ObjectKind::ArrayBuffer(storage),
    )));
    let raw = st.alloc(HostValue::Object(ObjectData::new(ObjectKind::View(
        ViewData {
            kind: sys::TypedArrayKind::Uint8,
            buffer: buffer_slot,
            byte_offset: 0,
            length: len,
            is_buffer: true,
        },
    ))))?;
    Ok((ptr, raw))
}

unsafe extern "C" fn abi_create_buffer(
    env: sys::RawEnv,
    len: usize,
    out_data: *mut *mut u8,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let result = create_buffer_impl(st, len, None).map(|(ptr, raw)| {
        write_out(out_data, ptr);
        raw
    });
    complete(st, out, result)
}

unsafe extern "C" fn abi_create_buffer_copy(
    env: sys::RawEnv,
    data: *const u8,
    len: usize,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let result = if data.is_null() && len > 0 {
        Err(sys::Status::InvalidArg)
    } else {
        let init = if len == 0 {
            &[][..]
        } else {
            unsafe { std::slice::from_raw_parts(data, len) }
        };
        create_buffer_impl(st, len, Some(init)).map(|(_, raw)| raw)
    };
    complete(st, out, result)
}

// Inspection entries

unsafe extern "C" fn abi_type_of(
    env: sys::RawEnv,
    value: sys::RawValue,
    out: *mut sys::ValueType,
) -> sys::Status {
    let st = store(env);
    let result = st.resolve(value).map(|slot| value_type_of(st, slot));
    complete(st, out, result)
}

fn flag_entry(
    env: sys::RawEnv,
    value: sys::RawValue,
    out: *mut bool,
    check: impl Fn(&HostState, u32) -> bool,
) -> sys::Status {
    let st = store(env);
    let result = st.resolve(value).map(|slot| check(st, slot));
    complete(st, out, result)
}

unsafe extern "C" fn abi_is_array(
    env: sys::RawEnv,
    value: sys::RawValue,
    out: *mut bool,
) -> sys::Status {
    flag_entry(env, value, out, |st, slot| {
        matches!(
            st.slot_value(slot),
            HostValue::Object(object) if matches!(object.kind, ObjectKind::Array)
        )
    })
}

unsafe extern "C" fn abi_is_array_buffer(
    env: sys::RawEnv,
    value: sys::RawValue,
    out: *mut bool,
) -> sys::Status {
    flag_entry(env, value, out, |st, slot| {
        matches!(
            st.slot_value(slot),
            HostValue::Object(object) if matches!(object.kind, ObjectKind::ArrayBuffer(_))
        )
    })
}

unsafe extern "C" fn abi_is_typed_array(
    env: sys::RawEnv,
    value: sys::RawValue,
    out: *mut bool,
) -> sys::Status {
    flag_entry(env, value, out, |st, slot| {
        matches!(
            st.slot_value(slot),
            HostValue::Object(object) if matches!(object.kind, ObjectKind::View(_))
        )
    })
}

unsafe extern "C" fn abi_is_buffer(
    env: sys::RawEnv,
    value: sys::RawValue,
    out: *mut bool,
) -> sys::Status {
    flag_entry(env, value, out, |st, slot| {
        matches!(
            st.slot_value(slot),
            HostValue::Object(object)
                if matches!(object.kind, ObjectKind::View(view) if view.is_buffer)
        )
    })
}

unsafe extern "C" fn abi_is_error(
    env: sys::RawEnv,
    value: sys::RawValue,
    out: *mut bool,
) -> sys::Status {
    flag_entry(env, value, out, |st, slot| {
        matches!(st.slot_value(slot), HostValue::Object(object) if object.is_error)
    })
}

unsafe extern "C" fn abi_strict_equals(
    env: sys::RawEnv,
    lhs: sys::RawValue,
    rhs: sys::RawValue,
    out: *mut bool,
) -> sys::Status {
    let st = store(env);
    let result = (|| {
        let a = st.resolve(lhs)?;
        let b = st.resolve(rhs)?;
        let equal = match (st.slot_value(a), st.slot_value(b)) {
            (HostValue::Undefined, HostValue::Undefined) => true,
            (HostValue::Null, HostValue::Null) => true,
            (HostValue::Boolean(x), HostValue::Boolean(y)) => x == y,
            (HostValue::Number(x), HostValue::Number(y)) => x == y,
            (HostValue::String(x), HostValue::String(y)) => x == y,
            (HostValue::External { .. }, HostValue::External { .. })
            | (HostValue::Object(_), HostValue::Object(_)) => a == b,
            _ => false,
        };
        Ok(equal)
    })();
    complete(st, out, result)
}

unsafe extern "C" fn abi_coerce_to_bool(
    env: sys::RawEnv,
    value: sys::RawValue,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let result = st
        .resolve(value)
        .map(|slot| truthy(st, slot))
        .and_then(|b| st.alloc(HostValue::Boolean(b)));
    complete(st, out, result)
}

unsafe extern "C" fn abi_coerce_to_number(
    env: sys::RawEnv,
    value: sys::RawValue,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let result = st
        .resolve(value)
        .map(|slot| to_number(st, slot))
        .and_then(|n| st.alloc(HostValue::Number(n)));
    complete(st, out, result)
}

unsafe extern "C" fn abi_coerce_to_string(
    env: sys::RawEnv,
    value: sys::RawValue,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let result = st
        .resolve(value)
        .map(|slot| to_string_repr(st, slot))
        .and_then(|text| st.alloc(HostValue::String(text)));
    complete(st, out, result)
}

unsafe extern "C" fn abi_coerce_to_object(
    env: sys::RawEnv,
    value: sys::RawValue,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let result = (|| {
        let slot = st.resolve(value)?;
        match st.slot_value(slot) {
            HostValue::Object(_) => st.push_handle(slot),
            HostValue::Undefined | HostValue::Null => Err(sys::Status::ObjectExpected),
            // Primitive boxing: a fresh plain object standing in for the
            // primitive, without the primitive's prototype machinery.
            _ => st.alloc(HostValue::Object(ObjectData::new(ObjectKind::Plain))),
        }
    })();
    complete(st, out, result)
}

// Scalar extraction entries

unsafe extern "C" fn abi_get_value_bool(
    env: sys::RawEnv,
    value: sys::RawValue,
    out: *mut bool,
) -> sys::Status {
    let st = store(env);
    let result = (|| {
        let slot = st.resolve(value)?;
        match st.slot_value(slot) {
            HostValue::Boolean(b) => Ok(*b),
            _ => Err(sys::Status::BooleanExpected),
        }
    })();
    complete(st, out, result)
}

unsafe extern "C" fn abi_get_value_double(
    env: sys::RawEnv,
    value: sys::RawValue,
    out: *mut f64,
) -> sys::Status {
    let st = store(env);
    let result = expect_number(st, value);
    complete(st, out, result)
}

unsafe extern "C" fn abi_get_value_int32(
    env: sys::RawEnv,
    value: sys::RawValue,
    out: *mut i32,
) -> sys::Status {
    let st = store(env);
    let result = expect_number(st, value).map(|n| n as i64 as i32);
    complete(st, out, result)
}

unsafe extern "C" fn abi_get_value_uint32(
    env: sys::RawEnv,
    value: sys::RawValue,
    out: *mut u32,
) -> sys::Status {
    let st = store(env);
    let result = expect_number(st, value).map(|n| n as i64 as u32);
    complete(st, out, result)
}

unsafe extern "C" fn abi_get_value_int64(
    env: sys::RawEnv,
    value: sys::RawValue,
    out: *mut i64,
) -> sys::Status {
    let st = store(env);
    let result = expect_number(st, value).map(|n| n as i64);
    complete(st, out, result)
}

unsafe extern "C" fn abi_get_value_string_utf8(
    env: sys::RawEnv,
    value: sys::RawValue,
    buf: *mut u8,
    cap: usize,
    out_len: *mut usize,
) -> sys::Status {
    let st = store(env);
    let result = (|| {
        let slot = expect_string(st, value)?;
        let bytes = match st.slot_value(slot) {
            HostValue::String(s) => s.as_bytes(),
            _ => return Err(sys::Status::StringExpected),
        };
        if buf.is_null() {
            return Ok(bytes.len());
        }
        let copied = bytes.len().min(cap);
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf, copied) };
        Ok(copied)
    })();
    complete(st, out_len, result)
}

unsafe extern "C" fn abi_get_value_string_utf16(
    env: sys::RawEnv,
    value: sys::RawValue,
    buf: *mut u16,
    cap: usize,
    out_len: *mut usize,
) -> sys::Status {
    let st = store(env);
    let result = (|| {
        let slot = expect_string(st, value)?;
        let units: Vec<u16> = match st.slot_value(slot) {
            HostValue::String(s) => s.encode_utf16().collect(),
            _ => return Err(sys::Status::StringExpected),
        };
        if buf.is_null() {
            return Ok(units.len());
        }
        let copied = units.len().min(cap);
        unsafe { std::ptr::copy_nonoverlapping(units.as_ptr(), buf, copied) };
        Ok(copied)
    })();
    complete(st, out_len, result)
}

unsafe extern "C" fn abi_get_value_external(
    env: sys::RawEnv,
    value: sys::RawValue,
    out: *mut *mut c_void,
) -> sys::Status {
    let st = store(env);
    let result = (|| {
        let slot = st.resolve(value)?;
        match st.slot_value(slot) {
            HostValue::External { data, .. } => Ok(*data),
            _ => Err(sys::Status::InvalidArg),
        }
    })();
    complete(st, out, result)
}

unsafe extern "C" fn abi_get_array_length(
    env: sys::RawEnv,
    value: sys::RawValue,
    out: *mut u32,
) -> sys::Status {
    let st = store(env);
    let result = (|| {
        let slot = st.resolve(value)?;
        match st.slot_value(slot) {
            HostValue::Object(object) if matches!(object.kind, ObjectKind::Array) => {
                Ok(object.elements.len() as u32)
            }
            _ => Err(sys::Status::ArrayExpected),
        }
    })();
    complete(st, out, result)
}

unsafe extern "C" fn abi_get_array_buffer_info(
    env: sys::RawEnv,
    value: sys::RawValue,
    out_data: *mut *mut u8,
    out_len: *mut usize,
) -> sys::Status {
    let st = store(env);
    let result = (|| {
        let slot = st.resolve(value)?;
        match st.slot_value_mut(slot) {
            HostValue::Object(object) => match &mut object.kind {
                ObjectKind::ArrayBuffer(storage) => Ok((storage.as_mut_ptr(), storage.len())),
                _ => Err(sys::Status::InvalidArg),
            },
            _ => Err(sys::Status::InvalidArg),
        }
    })();
    match result {
        Ok((ptr, len)) => {
            write_out(out_data, ptr);
            write_out(out_len, len);
            st.ok()
        }
        Err(status) => st.fail(status),
    }
}

fn view_of(st: &HostState, raw: sys::RawValue) -> Result<(u32, ViewData), sys::Status> {
    let slot = st.resolve(raw)?;
    match st.slot_value(slot) {
        HostValue::Object(object) => match object.kind {
            ObjectKind::View(view) => Ok((slot, view)),
            _ => Err(sys::Status::InvalidArg),
        },
        _ => Err(sys::Status::InvalidArg),
    }
}

fn view_data_ptr(st: &mut HostState, view: &ViewData) -> *mut u8 {
    match st.slot_value_mut(view.buffer) {
        HostValue::Object(object) => match &mut object.kind {
            ObjectKind::ArrayBuffer(storage) => {
                unsafe { storage.as_mut_ptr().add(view.byte_offset) }
            }
            _ => std::ptr::null_mut(),
        },
        _ => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn abi_get_typed_array_info(
    env: sys::RawEnv,
    value: sys::RawValue,
    out_kind: *mut sys::TypedArrayKind,
    out_len: *mut usize,
    out_data: *mut *mut u8,
    out_buffer: *mut sys::RawValue,
    out_offset: *mut usize,
) -> sys::Status {
    let st = store(env);
    let result = (|| {
        let (_, view) = view_of(st, value)?;
        write_out(out_kind, view.kind);
        write_out(out_len, view.length);
        write_out(out_offset, view.byte_offset);
        if !out_data.is_null() {
            let ptr = view_data_ptr(st, &view);
            write_out(out_data, ptr);
        }
        if !out_buffer.is_null() {
            let handle = st.push_handle(view.buffer)?;
            write_out(out_buffer, handle);
        }
        Ok(())
    })();
    match result {
        Ok(()) => st.ok(),
        Err(status) => st.fail(status),
    }
}

unsafe extern "C" fn abi_get_buffer_info(
    env: sys::RawEnv,
    value: sys::RawValue,
    out_data: *mut *mut u8,
    out_len: *mut usize,
) -> sys::Status {
    let st = store(env);
    let result = (|| {
        let (_, view) = view_of(st, value)?;
        if !view.is_buffer {
            return Err(sys::Status::InvalidArg);
        }
        let ptr = view_data_ptr(st, &view);
        Ok((ptr, view.length))
    })();
    match result {
        Ok((ptr, len)) => {
            write_out(out_data, ptr);
            write_out(out_len, len);
            st.ok()
        }
        Err(status) => st.fail(status),
    }
}

// Property entries

unsafe extern "C" fn abi_get_property(
    env: sys::RawEnv,
    object: sys::RawValue,
    key: sys::RawValue,
    out: *mut sys::RawValue,
) -> sys::Status {
    let key = match property_key(store(env), key) {
        Ok(key) => key,
        Err(status) => return store(env).fail(status),
    };
    let result = match key {
        PropertyKey::Index(index) => get_element_impl(env, object, index),
        PropertyKey::Name(name) => get_property_impl(env, object, &name),
    };
    let st = store(env);
    complete(st, out, result)
}

unsafe extern "C" fn abi_set_property(
    env: sys::RawEnv,
    object: sys::RawValue,
    key: sys::RawValue,
    value: sys::RawValue,
) -> sys::Status {
    let key = match property_key(store(env), key) {
        Ok(key) => key,
        Err(status) => return store(env).fail(status),
    };
    let result = match key {
        PropertyKey::Index(index) => set_element_impl(env, object, index, value),
        PropertyKey::Name(name) => set_property_impl(env, object, &name, value),
    };
    let st = store(env);
    match result {
        Ok(()) => st.ok(),
        Err(status) => st.fail(status),
    }
}

unsafe extern "C" fn abi_has_property(
    env: sys::RawEnv,
    object: sys::RawValue,
    key: sys::RawValue,
    out: *mut bool,
) -> sys::Status {
    let st = store(env);
    let result = (|| {
        let slot = expect_object(st, object)?;
        match property_key(st, key)? {
            PropertyKey::Index(index) => match st.slot_value(slot) {
                HostValue::Object(object) => Ok(object
                    .elements
                    .get(index as usize)
                    .map(|e| e.is_some())
                    .unwrap_or(false)),
                _ => Err(sys::Status::ObjectExpected),
            },
            PropertyKey::Name(name) => Ok(lookup_property(st, slot, &name).is_some()),
        }
    })();
    complete(st, out, result)
}

unsafe extern "C" fn abi_get_named_property(
    env: sys::RawEnv,
    object: sys::RawValue,
    name: *const u8,
    name_len: usize,
    out: *mut sys::RawValue,
) -> sys::Status {
    let name = match name_from_raw(name, name_len) {
        Ok(name) => name,
        Err(status) => return store(env).fail(status),
    };
    let result = get_property_impl(env, object, name);
    let st = store(env);
    complete(st, out, result)
}

unsafe extern "C" fn abi_set_named_property(
    env: sys::RawEnv,
    object: sys::RawValue,
    name: *const u8,
    name_len: usize,
    value: sys::RawValue,
) -> sys::Status {
    let name = match name_from_raw(name, name_len) {
        Ok(name) => name,
        Err(status) => return store(env).fail(status),
    };
    let result = set_property_impl(env, object, name, value);
    let st = store(env);
    match result {
        Ok(()) => st.ok(),
        Err(status) => st.fail(status),
    }
}

unsafe extern "C" fn abi_has_named_property(
    env: sys::RawEnv,
    object: sys::RawValue,
    name: *const u8,
    name_len: usize,
    out: *mut bool,
) -> sys::Status {
    let st = store(env);
    let result = (|| {
        let name = name_from_raw(name, name_len)?;
        let slot = expect_object(st, object)?;
        Ok(lookup_property(st, slot, name).is_some())
    })();
    complete(st, out, result)
}

fn get_element_impl(
    env: sys::RawEnv,
    object: sys::RawValue,
    index: u32,
) -> Result<sys::RawValue, sys::Status> {
    let st = store(env);
    guard_pending(st)?;
    let slot = expect_object(st, object)?;
    let element = match st.slot_value(slot) {
        HostValue::Object(data) => data.elements.get(index as usize).copied().flatten(),
        _ => None,
    };
    match element {
        Some(element) => st.push_handle(element),
        None => st.alloc(HostValue::Undefined),
    }
}

fn set_element_impl(
    env: sys::RawEnv,
    object: sys::RawValue,
    index: u32,
    value: sys::RawValue,
) -> Result<(), sys::Status> {
    let st = store(env);
    guard_pending(st)?;
    let slot = expect_object(st, object)?;
    let value_slot = st.resolve(value)?;
    match st.slot_value_mut(slot) {
        HostValue::Object(data) => {
            if matches!(data.kind, ObjectKind::View(_) | ObjectKind::ArrayBuffer(_)) {
                return Err(sys::Status::InvalidArg);
            }
            if data.elements.len() <= index as usize {
                data.elements.resize(index as usize + 1, None);
            }
            data.elements[index as usize] = Some(value_slot);
            Ok(())
        }
        _ => Err(sys::Status::ObjectExpected),
    }
}

unsafe extern "C" fn abi_get_element(
    env: sys::RawEnv,
    object: sys::RawValue,
    index: u32,
    out: *mut sys::RawValue,
) -> sys::Status {
    let result = get_element_impl(env, object, index);
    let st = store(env);
    complete(st, out, result)
}

unsafe extern "C" fn abi_set_element(
    env: sys::RawEnv,
    object: sys::RawValue,
    index: u32,
    value: sys::RawValue,
) -> sys::Status {
    let result = set_element_impl(env, object, index, value);
    let st = store(env);
    match result {
        Ok(()) => st.ok(),
        Err(status) => st.fail(status),
    }
}

unsafe extern "C" fn abi_instance_of(
    env: sys::RawEnv,
    object: sys::RawValue,
    constructor: sys::RawValue,
    out: *mut bool,
) -> sys::Status {
    let st = store(env);
    let result = (|| {
        let object_slot = expect_object(st, object)?;
        let ctor_slot = expect_function(st, constructor)?;
        let proto = match st.slot_value(ctor_slot) {
            HostValue::Object(data) => match &data.kind {
                ObjectKind::Function(f) => match &f.class {
                    Some(class) => Some(class.prototype),
                    None => match data.own_property("prototype") {
                        Some(PropertyValue::Slot(slot)) => Some(slot),
                        _ => None,
                    },
                },
                _ => None,
            },
            _ => None,
        };
        let target = match proto {
            Some(proto) => proto,
            None => return Ok(false),
        };
        let mut current = match st.slot_value(object_slot) {
            HostValue::Object(data) => data.prototype,
            _ => None,
        };
        while let Some(slot) = current {
            if slot == target {
                return Ok(true);
            }
            current = match st.slot_value(slot) {
                HostValue::Object(data) => data.prototype,
                _ => None,
            };
        }
        Ok(false)
    })();
    complete(st, out, result)
}

// Scope entries

unsafe extern "C" fn abi_open_handle_scope(
    env: sys::RawEnv,
    out: *mut sys::RawScope,
) -> sys::Status {
    let st = store(env);
    let scope = st.open_scope(false);
    write_out(out, scope);
    st.ok()
}

unsafe extern "C" fn abi_close_handle_scope(env: sys::RawEnv, scope: sys::RawScope) -> sys::Status {
    let st = store(env);
    match st.close_scope(scope, false) {
        Ok(()) => st.ok(),
        Err(status) => st.fail(status),
    }
}

unsafe extern "C" fn abi_open_escapable_handle_scope(
    env: sys::RawEnv,
    out: *mut sys::RawScope,
) -> sys::Status {
    let st = store(env);
    let scope = st.open_scope(true);
    write_out(out, scope);
    st.ok()
}

unsafe extern "C" fn abi_close_escapable_handle_scope(
    env: sys::RawEnv,
    scope: sys::RawScope,
) -> sys::Status {
    let st = store(env);
    match st.close_scope(scope, true) {
        Ok(()) => st.ok(),
        Err(status) => st.fail(status),
    }
}

unsafe extern "C" fn abi_escape_handle(
    env: sys::RawEnv,
    scope: sys::RawScope,
    value: sys::RawValue,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let result = st.escape(scope, value);
    complete(st, out, result)
}

// Reference entries

unsafe extern "C" fn abi_create_reference(
    env: sys::RawEnv,
    value: sys::RawValue,
    initial_count: u32,
    out: *mut sys::RawRef,
) -> sys::Status {
    let st = store(env);
    let result = st.create_ref(value, initial_count);
    complete(st, out, result)
}

unsafe extern "C" fn abi_delete_reference(env: sys::RawEnv, reference: sys::RawRef) -> sys::Status {
    let st = store(env);
    match st.delete_ref(reference) {
        Ok(()) => st.ok(),
        Err(status) => st.fail(status),
    }
}

unsafe extern "C" fn abi_reference_ref(
    env: sys::RawEnv,
    reference: sys::RawRef,
    out: *mut u32,
) -> sys::Status {
    let st = store(env);
    let result = st.ref_adjust(reference, 1);
    complete(st, out, result)
}

unsafe extern "C" fn abi_reference_unref(
    env: sys::RawEnv,
    reference: sys::RawRef,
    out: *mut u32,
) -> sys::Status {
    let st = store(env);
    let result = st.ref_adjust(reference, -1);
    complete(st, out, result)
}

unsafe extern "C" fn abi_get_reference_value(
    env: sys::RawEnv,
    reference: sys::RawRef,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let result = st.ref_value(reference);
    complete(st, out, result)
}

// Class entries

unsafe extern "C" fn abi_define_class(
    env: sys::RawEnv,
    name: *const u8,
    name_len: usize,
    constructor: sys::Callback,
    data: *mut c_void,
    data_finalizer: Option<sys::Finalizer>,
    prop_count: usize,
    props: *const sys::RawPropertyDescriptor,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    let result = (|| {
        guard_pending(st)?;
        let class_name = name_from_raw(name, name_len)?;
        let descriptors = if prop_count == 0 {
            &[][..]
        } else {
            if props.is_null() {
                return Err(sys::Status::InvalidArg);
            }
            unsafe { std::slice::from_raw_parts(props, prop_count) }
        };

        // Validate every descriptor before any ownership transfer so a
        // failure cannot strand registration data half-adopted.
        for descriptor in descriptors {
            name_from_raw(descriptor.name, descriptor.name_len)?;
            let has_accessor = descriptor.getter.is_some() || descriptor.setter.is_some();
            if descriptor.method.is_some() && has_accessor {
                return Err(sys::Status::InvalidArg);
            }
            if descriptor.method.is_none() && !has_accessor {
                st.resolve(descriptor.value)?;
            }
        }

        let proto_slot = st.alloc_unrooted(HostValue::Object(ObjectData::new(ObjectKind::Plain)));
        let mut owned: Vec<OwnedRegistration> = Vec::new();
        let mut proto_props: Vec<(std::string::String, PropertyValue)> = Vec::new();
        let mut static_props: Vec<(std::string::String, PropertyValue)> = Vec::new();

        for descriptor in descriptors {
            let prop_name = name_from_raw(descriptor.name, descriptor.name_len)?;
            let is_static = descriptor
                .attributes
                .contains(sys::PropertyAttributes::STATIC);
            let value = if let Some(method) = descriptor.method {
                let fn_slot = st.alloc_unrooted(HostValue::Object(ObjectData::new(
                    ObjectKind::Function(FunctionData {
                        name: prop_name.to_string(),
                        callback: method,
                        data: descriptor.data,
                        data_finalizer: descriptor.data_finalizer,
                        class: None,
                    }),
                )));
                PropertyValue::Slot(fn_slot)
            } else if descriptor.getter.is_some() || descriptor.setter.is_some() {
                let mut accessor_fn = |callback: Option<sys::Callback>| {
                    callback.map(|callback| {
                        st.alloc_unrooted(HostValue::Object(ObjectData::new(
                            ObjectKind::Function(FunctionData {
                                name: prop_name.to_string(),
                                callback,
                                data: descriptor.data,
                                data_finalizer: None,
                                class: None,
                            }),
                        )))
                    })
                };
                let getter = accessor_fn(descriptor.getter);
                let setter = accessor_fn(descriptor.setter);
                // The shared accessor context is owned by the class so it is
                // released exactly once.
                if let Some(finalizer) = descriptor.data_finalizer {
                    owned.push(OwnedRegistration {
                        data: descriptor.data,
                        finalizer,
                    });
                }
                PropertyValue::Accessor { getter, setter }
            } else {
                PropertyValue::Slot(st.resolve(descriptor.value)?)
            };
            if is_static {
                static_props.push((prop_name.to_string(), value));
            } else {
                proto_props.push((prop_name.to_string(), value));
            }
        }

        if let HostValue::Object(proto) = st.slot_value_mut(proto_slot) {
            for (prop_name, value) in proto_props {
                proto.set_own_property(&prop_name, value);
            }
        }

        let mut ctor = ObjectData::new(ObjectKind::Function(FunctionData {
            name: class_name.to_string(),
            callback: constructor,
            data,
            data_finalizer,
            class: Some(ClassData {
                prototype: proto_slot,
                owned,
            }),
        }));
        ctor.set_own_property("prototype", PropertyValue::Slot(proto_slot));
        for (prop_name, value) in static_props {
            ctor.set_own_property(&prop_name, value);
        }
        let ctor_handle = st.alloc(HostValue::Object(ctor))?;
        let ctor_slot = st.resolve(ctor_handle)?;
        if let HostValue::Object(proto) = st.slot_value_mut(proto_slot) {
            proto.set_own_property("constructor", PropertyValue::Slot(ctor_slot));
        }
        Ok(ctor_handle)
    })();
    complete(st, out, result)
}

unsafe extern "C" fn abi_wrap(
    env: sys::RawEnv,
    object: sys::RawValue,
    data: *mut c_void,
    finalizer: sys::Finalizer,
    hint: *mut c_void,
    out: *mut sys::RawRef,
) -> sys::Status {
    let st = store(env);
    let result = (|| {
        let slot = expect_object(st, object)?;
        if let HostValue::Object(existing) = st.slot_value(slot) {
            if existing.native.is_some() {
                return Err(sys::Status::InvalidArg);
            }
        }
        // The wrap reference is weak: the host object owns the native
        // instance, never the other way around.
        let reference = st.create_ref(object, 0)?;
        if let HostValue::Object(data_mut) = st.slot_value_mut(slot) {
            data_mut.native = Some(WrapData {
                data,
                finalizer,
                hint,
                ref_id: reference.0,
            });
        }
        Ok(reference)
    })();
    complete(st, out, result)
}

unsafe extern "C" fn abi_unwrap(
    env: sys::RawEnv,
    object: sys::RawValue,
    out: *mut *mut c_void,
) -> sys::Status {
    let st = store(env);
    let result = (|| {
        let slot = expect_object(st, object)?;
        match st.slot_value(slot) {
            HostValue::Object(data) => match &data.native {
                Some(wrap) => Ok(wrap.data),
                None => Err(sys::Status::InvalidArg),
            },
            _ => Err(sys::Status::ObjectExpected),
        }
    })();
    complete(st, out, result)
}

// Call entries

unsafe extern "C" fn abi_call_function(
    env: sys::RawEnv,
    this: sys::RawValue,
    func: sys::RawValue,
    argc: usize,
    argv: *const sys::RawValue,
    out: *mut sys::RawValue,
) -> sys::Status {
    let result = invoke(env, func, this, argc, argv, false);
    let st = store(env);
    complete(st, out, result)
}

unsafe extern "C" fn abi_new_instance(
    env: sys::RawEnv,
    func: sys::RawValue,
    argc: usize,
    argv: *const sys::RawValue,
    out: *mut sys::RawValue,
) -> sys::Status {
    let result = invoke(env, func, sys::RawValue::NONE, argc, argv, true);
    let st = store(env);
    complete(st, out, result)
}

unsafe extern "C" fn abi_make_callback(
    env: sys::RawEnv,
    this: sys::RawValue,
    func: sys::RawValue,
    argc: usize,
    argv: *const sys::RawValue,
    out: *mut sys::RawValue,
) -> sys::Status {
    // The reference host has no microtask queue to drain afterwards, so this
    // is a plain call with re-entry bookkeeping folded in.
    let result = invoke(env, func, this, argc, argv, false);
    let st = store(env);
    complete(st, out, result)
}

// Callback frame entries

unsafe extern "C" fn abi_get_cb_this(
    env: sys::RawEnv,
    info: sys::RawCallbackInfo,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    if info.0.is_null() {
        return st.fail(sys::Status::InvalidArg);
    }
    let frame = unsafe { &*(info.0 as *const CallFrame) };
    write_out(out, frame.this);
    st.ok()
}

unsafe extern "C" fn abi_get_cb_args_length(
    env: sys::RawEnv,
    info: sys::RawCallbackInfo,
    out: *mut usize,
) -> sys::Status {
    let st = store(env);
    if info.0.is_null() {
        return st.fail(sys::Status::InvalidArg);
    }
    let frame = unsafe { &*(info.0 as *const CallFrame) };
    write_out(out, frame.args.len());
    st.ok()
}

unsafe extern "C" fn abi_get_cb_args(
    env: sys::RawEnv,
    info: sys::RawCallbackInfo,
    out: *mut sys::RawValue,
    cap: usize,
) -> sys::Status {
    let st = store(env);
    if info.0.is_null() || out.is_null() {
        return st.fail(sys::Status::InvalidArg);
    }
    let frame = unsafe { &*(info.0 as *const CallFrame) };
    let copied = frame.args.len().min(cap);
    unsafe { std::ptr::copy_nonoverlapping(frame.args.as_ptr(), out, copied) };
    st.ok()
}

unsafe extern "C" fn abi_get_cb_data(
    env: sys::RawEnv,
    info: sys::RawCallbackInfo,
    out: *mut *mut c_void,
) -> sys::Status {
    let st = store(env);
    if info.0.is_null() {
        return st.fail(sys::Status::InvalidArg);
    }
    let frame = unsafe { &*(info.0 as *const CallFrame) };
    write_out(out, frame.data);
    st.ok()
}

unsafe extern "C" fn abi_is_construct_call(
    env: sys::RawEnv,
    info: sys::RawCallbackInfo,
    out: *mut bool,
) -> sys::Status {
    let st = store(env);
    if info.0.is_null() {
        return st.fail(sys::Status::InvalidArg);
    }
    let frame = unsafe { &*(info.0 as *const CallFrame) };
    write_out(out, frame.construct);
    st.ok()
}

unsafe extern "C" fn abi_set_return_value(
    env: sys::RawEnv,
    info: sys::RawCallbackInfo,
    value: sys::RawValue,
) -> sys::Status {
    let st = store(env);
    if info.0.is_null() {
        return st.fail(sys::Status::InvalidArg);
    }
    if !value.is_none() {
        if let Err(status) = st.resolve(value) {
            return st.fail(status);
        }
    }
    let frame = info.0 as *mut CallFrame;
    unsafe { (*frame).ret = value };
    st.ok()
}

// Exception entries

unsafe extern "C" fn abi_throw(env: sys::RawEnv, value: sys::RawValue) -> sys::Status {
    let st = store(env);
    match st.throw(value) {
        Ok(()) => st.ok(),
        Err(status) => st.fail(status),
    }
}

fn throw_message(st: &mut HostState, message: &str, kind: &str) -> Result<(), sys::Status> {
    if st.pending_exception.is_some() {
        return Err(sys::Status::PendingException);
    }
    // Built without handles so throwing works even with no scope open; the
    // pending-exception root keeps the slots alive.
    let message_slot = st.alloc_unrooted(HostValue::String(message.to_string()));
    let kind_slot = st.alloc_unrooted(HostValue::String(kind.to_string()));
    let mut data = ObjectData::new(ObjectKind::Plain);
    data.is_error = true;
    data.set_own_property("message", PropertyValue::Slot(message_slot));
    data.set_own_property("name", PropertyValue::Slot(kind_slot));
    let error_slot = st.alloc_unrooted(HostValue::Object(data));
    st.pending_exception = Some(error_slot);
    Ok(())
}

unsafe extern "C" fn abi_throw_error(
    env: sys::RawEnv,
    message: *const u8,
    len: usize,
) -> sys::Status {
    let st = store(env);
    let result = name_from_raw(message, len)
        .map(|m| m.to_string())
        .and_then(|m| throw_message(st, &m, "Error"));
    match result {
        Ok(()) => st.ok(),
        Err(status) => st.fail(status),
    }
}

unsafe extern "C" fn abi_throw_type_error(
    env: sys::RawEnv,
    message: *const u8,
    len: usize,
) -> sys::Status {
    let st = store(env);
    let result = name_from_raw(message, len)
        .map(|m| m.to_string())
        .and_then(|m| throw_message(st, &m, "TypeError"));
    match result {
        Ok(()) => st.ok(),
        Err(status) => st.fail(status),
    }
}

unsafe extern "C" fn abi_is_exception_pending(env: sys::RawEnv, out: *mut bool) -> sys::Status {
    let st = store(env);
    // Must not disturb the last-error snapshot; error capture reads it right
    // after this query.
    write_out(out, st.pending_exception.is_some());
    sys::Status::Ok
}

unsafe extern "C" fn abi_get_and_clear_last_exception(
    env: sys::RawEnv,
    out: *mut sys::RawValue,
) -> sys::Status {
    let st = store(env);
    match st.take_exception() {
        Some(slot) => match st.push_handle(slot) {
            Ok(raw) => {
                write_out(out, raw);
                sys::Status::Ok
            }
            Err(status) => {
                // Nowhere to root it; restore pending rather than lose it.
                st.pending_exception = Some(slot);
                st.fail(status)
            }
        },
        None => {
            write_out(out, sys::RawValue::NONE);
            sys::Status::Ok
        }
    }
}

unsafe extern "C" fn abi_get_last_error_info(
    env: sys::RawEnv,
    out: *mut sys::RawErrorInfo,
) -> sys::Status {
    let st = store(env);
    if out.is_null() {
        return sys::Status::InvalidArg;
    }
    let info = sys::RawErrorInfo {
        message: st.last_message.as_ptr(),
        message_len: st.last_message.len(),
        status: st.last_status,
    };
    unsafe { *out = info };
    sys::Status::Ok
}

// Async entries

unsafe extern "C" fn abi_create_async_work(
    env: sys::RawEnv,
    data: *mut c_void,
    execute: sys::AsyncExecute,
    complete_hook: sys::AsyncComplete,
    destroy: sys::AsyncDestroy,
    out: *mut sys::RawWork,
) -> sys::Status {
    let state = unsafe { env_state(env) };
    if let Err(status) = guard_pending(&mut state.store) {
        return state.store.fail(status);
    }
    let id = state.store.next_work;
    state.store.next_work += 1;
    state.store.works.insert(
        id,
        WorkEntry {
            data,
            execute,
            complete: complete_hook,
            destroy,
            queued: false,
        },
    );
    write_out(out, sys::RawWork(id));
    state.store.ok()
}

unsafe extern "C" fn abi_queue_async_work(env: sys::RawEnv, work: sys::RawWork) -> sys::Status {
    let state = unsafe { env_state(env) };
    let (data, execute) = match state.store.works.get_mut(&work.0) {
        Some(entry) if !entry.queued => {
            entry.queued = true;
            (entry.data, entry.execute)
        }
        Some(_) => return state.store.fail(sys::Status::GenericFailure),
        None => return state.store.fail(sys::Status::InvalidArg),
    };
    state.queue.submit(work.0, execute, data);
    state.store.ok()
}

unsafe extern "C" fn abi_delete_async_work(env: sys::RawEnv, work: sys::RawWork) -> sys::Status {
    let state = unsafe { env_state(env) };
    match state.store.works.remove(&work.0) {
        Some(_) => state.store.ok(),
        None => state.store.fail(sys::Status::InvalidArg),
    }
}

pub(crate) static ABI_TABLE: sys::AbiTable = sys::AbiTable {
    version: sys::ABI_VERSION,

    get_undefined: abi_get_undefined,
    get_null: abi_get_null,
    get_global: abi_get_global,
    get_boolean: abi_get_boolean,
    create_number: abi_create_number,
    create_string_utf8: abi_create_string_utf8,
    create_string_utf16: abi_create_string_utf16,
    create_object: abi_create_object,
    create_array: abi_create_array,
    create_array_with_length: abi_create_array_with_length,
    create_external: abi_create_external,
    create_function: abi_create_function,
    create_error: abi_create_error,
    create_type_error: abi_create_type_error,
    create_range_error: abi_create_range_error,
    create_array_buffer: abi_create_array_buffer,
    create_typed_array: abi_create_typed_array,
    create_buffer: abi_create_buffer,
    create_buffer_copy: abi_create_buffer_copy,

    type_of: abi_type_of,
    is_array: abi_is_array,
    is_array_buffer: abi_is_array_buffer,
    is_typed_array: abi_is_typed_array,
    is_buffer: abi_is_buffer,
    is_error: abi_is_error,
    strict_equals: abi_strict_equals,
    coerce_to_bool: abi_coerce_to_bool,
    coerce_to_number: abi_coerce_to_number,
    coerce_to_string: abi_coerce_to_string,
    coerce_to_object: abi_coerce_to_object,

    get_value_bool: abi_get_value_bool,
    get_value_double: abi_get_value_double,
    get_value_int32: abi_get_value_int32,
    get_value_uint32: abi_get_value_uint32,
    get_value_int64: abi_get_value_int64,
    get_value_string_utf8: abi_get_value_string_utf8,
    get_value_string_utf16: abi_get_value_string_utf16,
    get_value_external: abi_get_value_external,
    get_array_length: abi_get_array_length,
    get_array_buffer_info: abi_get_array_buffer_info,
    get_typed_array_info: abi_get_typed_array_info,
    get_buffer_info: abi_get_buffer_info,

    get_property: abi_get_property,
    set_property: abi_set_property,
    has_property: abi_has_property,
    get_named_property: abi_get_named_property,
    set_named_property: abi_set_named_property,
    has_named_property: abi_has_named_property,
    get_element: abi_get_element,
    set_element: abi_set_element,
    instance_of: abi_instance_of,

    open_handle_scope: abi_open_handle_scope,
    close_handle_scope: abi_close_handle_scope,
    open_escapable_handle_scope: abi_open_escapable_handle_scope,
    close_escapable_handle_scope: abi_close_escapable_handle_scope,
    escape_handle: abi_escape_handle,

    create_reference: abi_create_reference,
    delete_reference: abi_delete_reference,
    reference_ref: abi_reference_ref,
    reference_unref: abi_reference_unref,
    get_reference_value: abi_get_reference_value,

    define_class: abi_define_class,
    wrap: abi_wrap,
    unwrap: abi_unwrap,

    call_function: abi_call_function,
    new_instance: abi_new_instance,
    make_callback: abi_make_callback,

    get_cb_this: abi_get_cb_this,
    get_cb_args_length: abi_get_cb_args_length,
    get_cb_args: abi_get_cb_args,
    get_cb_data: abi_get_cb_data,
    is_construct_call: abi_is_construct_call,
    set_return_value: abi_set_return_value,

    throw: abi_throw,
    throw_error: abi_throw_error,
    throw_type_error: abi_throw_type_error,
    is_exception_pending: abi_is_exception_pending,
    get_and_clear_last_exception: abi_get_and_clear_last_exception,
    get_last_error_info: abi_get_last_error_info,

    create_async_work: abi_create_async_work,
    queue_async_work: abi_queue_async_work,
    delete_async_work: abi_delete_async_work,
};
