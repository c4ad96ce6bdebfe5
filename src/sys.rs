//! The stable, versioned C interface between native code and the host runtime.
//!
//! The host hands native modules an environment pointer whose first word points
//! at an [`AbiTable`] of entry points (the JNI table-behind-env layout). Every
//! entry returns a [`Status`]; out-parameters carry results. Nothing in this
//! module allocates or panics; it is declarations only.

use std::ffi::c_void;

/// Interface revision implemented by both sides of the boundary.
pub const ABI_VERSION: u32 = 1;

/// Result code returned by every ABI entry point.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok = 0,
    InvalidArg,
    ObjectExpected,
    StringExpected,
    BooleanExpected,
    NumberExpected,
    FunctionExpected,
    ArrayExpected,
    GenericFailure,
    PendingException,
    HandleScopeMismatch,
    EscapeCalledTwice,
}

/// Category reported by `type_of`.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    Undefined = 0,
    Null,
    Boolean,
    Number,
    String,
    Symbol,
    Object,
    Function,
    External,
}

/// Element kind of a typed-array view.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypedArrayKind {
    Int8 = 0,
    Uint8,
    Uint8Clamped,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

/// Non-owning handle to a host value. Valid only while the handle scope it was
/// created in remains open. Zero means "no value".
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawValue(pub u64);

impl RawValue {
    pub const NONE: RawValue = RawValue(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Host GC root created by `create_reference`. Zero means "no reference".
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawRef(pub u64);

impl RawRef {
    pub const NONE: RawRef = RawRef(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Opaque token identifying an open handle scope.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawScope(pub u64);

/// Opaque token identifying a queued unit of async work.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawWork(pub u64);

/// Opaque per-invocation callback frame owned by the host for the duration of
/// one trampoline call.
#[repr(transparent)]
#[derive(Clone, Copy, Debug)]
pub struct RawCallbackInfo(pub *mut c_void);

/// Environment cell. `table` is the versioned function table; `state` is
/// host-private.
#[repr(C)]
pub struct EnvCell {
    pub table: *const AbiTable,
    pub state: *mut c_void,
}

/// Pointer to the host environment, passed to every entry point.
pub type RawEnv = *mut EnvCell;

/// Trampoline signature the host invokes for functions, constructors, methods
/// and accessors. Results and errors travel through `set_return_value` and the
/// exception entries, never through the return channel.
pub type Callback = unsafe extern "C" fn(env: RawEnv, info: RawCallbackInfo);

/// Invoked when the host collects a value carrying native data.
pub type Finalizer = unsafe extern "C" fn(data: *mut c_void, hint: *mut c_void);

/// Async execute hook. Runs on an arbitrary worker-pool thread; receives no
/// environment on purpose — host-visible state is off limits there.
pub type AsyncExecute = unsafe extern "C" fn(data: *mut c_void);

/// Async complete hook. Runs back on the value thread after execute finishes.
pub type AsyncComplete = unsafe extern "C" fn(env: RawEnv, data: *mut c_void);

/// Async destroy hook. Runs exactly once, after complete.
pub type AsyncDestroy = unsafe extern "C" fn(env: RawEnv, data: *mut c_void);

/// Property attribute flags, passed through to the host as-is.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropertyAttributes(pub u32);

impl PropertyAttributes {
    pub const NONE: PropertyAttributes = PropertyAttributes(0);
    pub const WRITABLE: PropertyAttributes = PropertyAttributes(1 << 0);
    pub const ENUMERABLE: PropertyAttributes = PropertyAttributes(1 << 1);
    pub const CONFIGURABLE: PropertyAttributes = PropertyAttributes(1 << 2);
    /// Marks a class property as belonging to the constructor rather than to
    /// instances.
    pub const STATIC: PropertyAttributes = PropertyAttributes(1 << 10);
    pub const DEFAULT: PropertyAttributes = PropertyAttributes(1 << 0 | 1 << 1 | 1 << 2);

    pub fn contains(self, other: PropertyAttributes) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for PropertyAttributes {
    type Output = PropertyAttributes;

    fn bitor(self, rhs: PropertyAttributes) -> PropertyAttributes {
        PropertyAttributes(self.0 | rhs.0)
    }
}

/// One entry of a class registration: a method, an accessor pair, or a plain
/// value, attached either to instances or to the constructor (STATIC bit).
/// `data` is opaque registration context visible to the trampoline; the host
/// releases it through `data_finalizer` when the owning function or class is
/// collected.
#[repr(C)]
pub struct RawPropertyDescriptor {
    pub name: *const u8,
    pub name_len: usize,
    pub method: Option<Callback>,
    pub getter: Option<Callback>,
    pub setter: Option<Callback>,
    pub value: RawValue,
    pub attributes: PropertyAttributes,
    pub data: *mut c_void,
    pub data_finalizer: Option<Finalizer>,
}

/// Snapshot of the last failing entry point, readable via
/// `get_last_error_info`. The message pointer stays valid until the next ABI
/// call on the same environment.
#[repr(C)]
pub struct RawErrorInfo {
    pub message: *const u8,
    pub message_len: usize,
    pub status: Status,
}

impl RawErrorInfo {
    pub const EMPTY: RawErrorInfo = RawErrorInfo {
        message: std::ptr::null(),
        message_len: 0,
        status: Status::Ok,
    };
}

/// The versioned entry-point table.
#[repr(C)]
pub struct AbiTable {
    pub version: u32,

    // Value creation
    pub get_undefined: unsafe extern "C" fn(RawEnv, *mut RawValue) -> Status,
    pub get_null: unsafe extern "C" fn(RawEnv, *mut RawValue) -> Status,
    pub get_global: unsafe extern "C" fn(RawEnv, *mut RawValue) -> Status,
    pub get_boolean: unsafe extern "C" fn(RawEnv, bool, *mut RawValue) -> Status,
    pub create_number: unsafe extern "C" fn(RawEnv, f64, *mut RawValue) -> Status,
    pub create_string_utf8:
        unsafe extern "C" fn(RawEnv, *const u8, usize, *mut RawValue) -> Status,
    pub create_string_utf16:
        unsafe extern "C" fn(RawEnv, *const u16, usize, *mut RawValue) -> Status,
    pub create_object: unsafe extern "C" fn(RawEnv, *mut RawValue) -> Status,
    pub create_array: unsafe extern "C" fn(RawEnv, *mut RawValue) -> Status,
    pub create_array_with_length: unsafe extern "C" fn(RawEnv, usize, *mut RawValue) -> Status,
    pub create_external: unsafe extern "C" fn(
        RawEnv,
        *mut c_void,
        Option<Finalizer>,
        *mut c_void,
        *mut RawValue,
    ) -> Status,
    pub create_function: unsafe extern "C" fn(
        RawEnv,
        *const u8,
        usize,
        Callback,
        *mut c_void,
        Option<Finalizer>,
        *mut RawValue,
    ) -> Status,
    pub create_error: unsafe extern "C" fn(RawEnv, RawValue, *mut RawValue) -> Status,
    pub create_type_error: unsafe extern "C" fn(RawEnv, RawValue, *mut RawValue) -> Status,
    pub create_range_error: unsafe extern "C" fn(RawEnv, RawValue, *mut RawValue) -> Status,
    pub create_array_buffer:
        unsafe extern "C" fn(RawEnv, usize, *mut *mut u8, *mut RawValue) -> Status,
    pub create_typed_array: unsafe extern "C" fn(
        RawEnv,
        TypedArrayKind,
        usize,
        RawValue,
        usize,
        *mut RawValue,
    ) -> Status,
    pub create_buffer: unsafe extern "C" fn(RawEnv, usize, *mut *mut u8, *mut RawValue) -> Status,
    pub create_buffer_copy:
        unsafe extern "C" fn(RawEnv, *const u8, usize, *mut RawValue) -> Status,

    // Value inspection
    pub type_of: unsafe extern "C" fn(RawEnv, RawValue, *mut ValueType) -> Status,
    pub is_array: unsafe extern "C" fn(RawEnv, RawValue, *mut bool) -> Status,
    pub is_array_buffer: unsafe extern "C" fn(RawEnv, RawValue, *mut bool) -> Status,
    pub is_typed_array: unsafe extern "C" fn(RawEnv, RawValue, *mut bool) -> Status,
    pub is_buffer: unsafe extern "C" fn(RawEnv, RawValue, *mut bool) -> Status,
    pub is_error: unsafe extern "C" fn(RawEnv, RawValue, *mut bool) -> Status,
    pub strict_equals: unsafe extern "C" fn(RawEnv, RawValue, RawValue, *mut bool) -> Status,
    pub coerce_to_bool: unsafe extern "C" fn(RawEnv, RawValue, *mut RawValue) -> Status,
    pub coerce_to_number: unsafe extern "C" fn(RawEnv, RawValue, *mut RawValue) -> Status,
    pub coerce_to_string: unsafe extern "C" fn(RawEnv, RawValue, *mut RawValue) -> Status,
    pub coerce_to_object: unsafe extern "C" fn(RawEnv, RawValue, *mut RawValue) -> Status,

    // Scalar extraction
    pub get_value_bool: unsafe extern "C" fn(RawEnv, RawValue, *mut bool) -> Status,
    pub get_value_double: unsafe extern "C" fn(RawEnv, RawValue, *mut f64) -> Status,
    pub get_value_int32: unsafe extern "C" fn(RawEnv, RawValue, *mut i32) -> Status,
    pub get_value_uint32: unsafe extern "C" fn(RawEnv, RawValue, *mut u32) -> Status,
    pub get_value_int64: unsafe extern "C" fn(RawEnv, RawValue, *mut i64) -> Status,
    /// With a null buffer, reports the UTF-8 byte length. Otherwise copies up
    /// to `cap` bytes and reports the count copied.
    pub get_value_string_utf8:
        unsafe extern "C" fn(RawEnv, RawValue, *mut u8, usize, *mut usize) -> Status,
    pub get_value_string_utf16:
        unsafe extern "C" fn(RawEnv, RawValue, *mut u16, usize, *mut usize) -> Status,
    pub get_value_external: unsafe extern "C" fn(RawEnv, RawValue, *mut *mut c_void) -> Status,
    pub get_array_length: unsafe extern "C" fn(RawEnv, RawValue, *mut u32) -> Status,
    pub get_array_buffer_info:
        unsafe extern "C" fn(RawEnv, RawValue, *mut *mut u8, *mut usize) -> Status,
    /// Any out-parameter may be null to skip it.
    pub get_typed_array_info: unsafe extern "C" fn(
        RawEnv,
        RawValue,
        *mut TypedArrayKind,
        *mut usize,
        *mut *mut u8,
        *mut RawValue,
        *mut usize,
    ) -> Status,
    pub get_buffer_info: unsafe extern "C" fn(RawEnv, RawValue, *mut *mut u8, *mut usize) -> Status,

    // Properties
    pub get_property: unsafe extern "C" fn(RawEnv, RawValue, RawValue, *mut RawValue) -> Status,
    pub set_property: unsafe extern "C" fn(RawEnv, RawValue, RawValue, RawValue) -> Status,
    pub has_property: unsafe extern "C" fn(RawEnv, RawValue, RawValue, *mut bool) -> Status,
    pub get_named_property:
        unsafe extern "C" fn(RawEnv, RawValue, *const u8, usize, *mut RawValue) -> Status,
    pub set_named_property:
        unsafe extern "C" fn(RawEnv, RawValue, *const u8, usize, RawValue) -> Status,
    pub has_named_property:
        unsafe extern "C" fn(RawEnv, RawValue, *const u8, usize, *mut bool) -> Status,
    pub get_element: unsafe extern "C" fn(RawEnv, RawValue, u32, *mut RawValue) -> Status,
    pub set_element: unsafe extern "C" fn(RawEnv, RawValue, u32, RawValue) -> Status,
    pub instance_of: unsafe extern "C" fn(RawEnv, RawValue, RawValue, *mut bool) -> Status,

    // Handle scopes
    pub open_handle_scope: unsafe extern "C" fn(RawEnv, *mut RawScope) -> Status,
    pub close_handle_scope: unsafe extern "C" fn(RawEnv, RawScope) -> Status,
    pub open_escapable_handle_scope: unsafe extern "C" fn(RawEnv, *mut RawScope) -> Status,
    pub close_escapable_handle_scope: unsafe extern "C" fn(RawEnv, RawScope) -> Status,
    pub escape_handle:
        unsafe extern "C" fn(RawEnv, RawScope, RawValue, *mut RawValue) -> Status,

    // References
    pub create_reference: unsafe extern "C" fn(RawEnv, RawValue, u32, *mut RawRef) -> Status,
    pub delete_reference: unsafe extern "C" fn(RawEnv, RawRef) -> Status,
    pub reference_ref: unsafe extern "C" fn(RawEnv, RawRef, *mut u32) -> Status,
    pub reference_unref: unsafe extern "C" fn(RawEnv, RawRef, *mut u32) -> Status,
    pub get_reference_value: unsafe extern "C" fn(RawEnv, RawRef, *mut RawValue) -> Status,

    // Classes and wrapping
    pub define_class: unsafe extern "C" fn(
        RawEnv,
        *const u8,
        usize,
        Callback,
        *mut c_void,
        Option<Finalizer>,
        usize,
        *const RawPropertyDescriptor,
        *mut RawValue,
    ) -> Status,
    pub wrap: unsafe extern "C" fn(
        RawEnv,
        RawValue,
        *mut c_void,
        Finalizer,
        *mut c_void,
        *mut RawRef,
    ) -> Status,
    pub unwrap: unsafe extern "C" fn(RawEnv, RawValue, *mut *mut c_void) -> Status,

    // Calls
    pub call_function: unsafe extern "C" fn(
        RawEnv,
        RawValue,
        RawValue,
        usize,
        *const RawValue,
        *mut RawValue,
    ) -> Status,
    pub new_instance:
        unsafe extern "C" fn(RawEnv, RawValue, usize, *const RawValue, *mut RawValue) -> Status,
    pub make_callback: unsafe extern "C" fn(
        RawEnv,
        RawValue,
        RawValue,
        usize,
        *const RawValue,
        *mut RawValue,
    ) -> Status,

    // Callback frames
    pub get_cb_this: unsafe extern "C" fn(RawEnv, RawCallbackInfo, *mut RawValue) -> Status,
    pub get_cb_args_length: unsafe extern "C" fn(RawEnv, RawCallbackInfo, *mut usize) -> Status,
    pub get_cb_args:
        unsafe extern "C" fn(RawEnv, RawCallbackInfo, *mut RawValue, usize) -> Status,
    pub get_cb_data: unsafe extern "C" fn(RawEnv, RawCallbackInfo, *mut *mut c_void) -> Status,
    pub is_construct_call: unsafe extern "C" fn(RawEnv, RawCallbackInfo, *mut bool) -> Status,
    pub set_return_value: unsafe extern "C" fn(RawEnv, RawCallbackInfo, RawValue) -> Status,

    // Exceptions
    pub throw: unsafe extern "C" fn(RawEnv, RawValue) -> Status,
    pub throw_error: unsafe extern "C" fn(RawEnv, *const u8, usize) -> Status,
    pub throw_type_error: unsafe extern "C" fn(RawEnv, *const u8, usize) -> Status,
    pub is_exception_pending: unsafe extern "C" fn(RawEnv, *mut bool) -> Status,
    pub get_and_clear_last_exception: unsafe extern "C" fn(RawEnv, *mut RawValue) -> Status,
    pub get_last_error_info: unsafe extern "C" fn(RawEnv, *mut RawErrorInfo) -> Status,

    // Async work
    pub create_async_work: unsafe extern "C" fn(
        RawEnv,
        *mut c_void,
        AsyncExecute,
        AsyncComplete,
        AsyncDestroy,
        *mut RawWork,
    ) -> Status,
    pub queue_async_work: unsafe extern "C" fn(RawEnv, RawWork) -> Status,
    pub delete_async_work: unsafe extern "C" fn(RawEnv, RawWork) -> Status,
}
