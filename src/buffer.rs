//! Binary data proxies: raw array buffers, typed-array views and byte
//! buffers.
//!
//! Slice accessors borrow host-owned memory. The returned slices are valid
//! while the underlying buffer value is alive and no host call resizes or
//! collects it; holding one across a host callback is not allowed.

use std::marker::PhantomData;

use bytes::Bytes;

use crate::env::Env;
use crate::error::Result;
use crate::object::Object;
use crate::sys;
use crate::value::{value_wrapper, TypedValue, Value};

/// Scalar types that can back a typed-array view.
pub unsafe trait Element: Copy + 'static {
    const KIND: sys::TypedArrayKind;
}

macro_rules! element {
    ($ty:ty, $kind:ident) => {
        unsafe impl Element for $ty {
            const KIND: sys::TypedArrayKind = sys::TypedArrayKind::$kind;
        }
    };
}

element!(i8, Int8);
element!(u8, Uint8);
element!(i16, Int16);
element!(u16, Uint16);
element!(i32, Int32);
element!(u32, Uint32);
element!(f32, Float32);
element!(f64, Float64);

/// Host-allocated contiguous byte storage.
#[derive(Clone, Copy)]
pub struct ArrayBuffer(pub(crate) Object);
value_wrapper!(ArrayBuffer, Object);

impl ArrayBuffer {
    /// Allocates `len` zeroed bytes owned by the host.
    pub fn new(env: &Env, len: usize) -> Result<ArrayBuffer> {
        let mut data: *mut u8 = std::ptr::null_mut();
        let mut out = sys::RawValue::NONE;
        let status = unsafe { (env.abi().create_array_buffer)(env.raw(), len, &mut data, &mut out) };
        env.check(status)?;
        Ok(ArrayBuffer::from_raw(*env, out))
    }

    fn info(&self) -> Result<(*mut u8, usize)> {
        let env = self.env();
        let mut data: *mut u8 = std::ptr::null_mut();
        let mut len = 0usize;
        let status =
            unsafe { (env.abi().get_array_buffer_info)(env.raw(), self.raw(), &mut data, &mut len) };
        env.check(status)?;
        Ok((data, len))
    }

    pub fn byte_length(&self) -> Result<usize> {
        Ok(self.info()?.1)
    }

    pub fn as_slice(&self) -> Result<&[u8]> {
        let (data, len) = self.info()?;
        if data.is_null() {
            return Ok(&[]);
        }
        Ok(unsafe { std::slice::from_raw_parts(data, len) })
    }

    pub fn as_mut_slice(&mut self) -> Result<&mut [u8]> {
        let (data, len) = self.info()?;
        if data.is_null() {
            return Ok(&mut []);
        }
        Ok(unsafe { std::slice::from_raw_parts_mut(data, len) })
    }

    /// Copies the contents out into an owned snapshot.
    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(self.as_slice()?))
    }
}

/// Untyped view over a region of an [`ArrayBuffer`].
#[derive(Clone, Copy)]
pub struct TypedArray(pub(crate) Object);
value_wrapper!(TypedArray, Object);

impl TypedArray {
    pub fn new(
        env: &Env,
        kind: sys::TypedArrayKind,
        length: usize,
        buffer: &ArrayBuffer,
        byte_offset: usize,
    ) -> Result<TypedArray> {
        let mut out = sys::RawValue::NONE;
        let status = unsafe {
            (env.abi().create_typed_array)(
                env.raw(),
                kind,
                length,
                buffer.raw(),
                byte_offset,
                &mut out,
            )
        };
        env.check(status)?;
        Ok(TypedArray::from_raw(*env, out))
    }

    pub fn kind(&self) -> Result<sys::TypedArrayKind> {
        let env = self.env();
        let mut kind = sys::TypedArrayKind::Uint8;
        let status = unsafe {
            (env.abi().get_typed_array_info)(
                env.raw(),
                self.raw(),
                &mut kind,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        env.check(status)?;
        Ok(kind)
    }

    /// Element count of the view.
    pub fn len(&self) -> Result<usize> {
        let env = self.env();
        let mut len = 0usize;
        let status = unsafe {
            (env.abi().get_typed_array_info)(
                env.raw(),
                self.raw(),
                std::ptr::null_mut(),
                &mut len,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        env.check(status)?;
        Ok(len)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn array_buffer(&self) -> Result<ArrayBuffer> {
        let env = self.env();
        let mut buffer = sys::RawValue::NONE;
        let status = unsafe {
            (env.abi().get_typed_array_info)(
                env.raw(),
                self.raw(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                &mut buffer,
                std::ptr::null_mut(),
            )
        };
        env.check(status)?;
        Ok(ArrayBuffer::from_raw(env, buffer))
    }

    pub fn byte_offset(&self) -> Result<usize> {
        let env = self.env();
        let mut offset = 0usize;
        let status = unsafe {
            (env.abi().get_typed_array_info)(
                env.raw(),
                self.raw(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                &mut offset,
            )
        };
        env.check(status)?;
        Ok(offset)
    }

    fn data_and_len(&self) -> Result<(*mut u8, usize)> {
        let env = self.env();
        let mut data: *mut u8 = std::ptr::null_mut();
        let mut len = 0usize;
        let status = unsafe {
            (env.abi().get_typed_array_info)(
                env.raw(),
                self.raw(),
                std::ptr::null_mut(),
                &mut len,
                &mut data,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        env.check(status)?;
        Ok((data, len))
    }

    /// Narrows to an element-typed view after checking the stored kind.
    pub fn try_typed<T: Element>(&self) -> Result<Option<TypedArrayOf<T>>> {
        if self.kind()? == T::KIND {
            Ok(Some(TypedArrayOf {
                view: *self,
                _marker: PhantomData,
            }))
        } else {
            Ok(None)
        }
    }
}

/// Element-typed view over an [`ArrayBuffer`].
pub struct TypedArrayOf<T: Element> {
    view: TypedArray,
    _marker: PhantomData<*mut T>,
}

impl<T: Element> Clone for TypedArrayOf<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Element> Copy for TypedArrayOf<T> {}

impl<T: Element> TypedValue for TypedArrayOf<T> {
    fn from_raw(env: Env, raw: sys::RawValue) -> Self {
        TypedArrayOf {
            view: TypedArray::from_raw(env, raw),
            _marker: PhantomData,
        }
    }

    fn raw(&self) -> sys::RawValue {
        self.view.raw()
    }

    fn env(&self) -> Env {
        self.view.env()
    }
}

impl<T: Element> std::ops::Deref for TypedArrayOf<T> {
    type Target = TypedArray;

    fn deref(&self) -> &TypedArray {
        &self.view
    }
}

impl<T: Element> From<TypedArrayOf<T>> for Value {
    fn from(view: TypedArrayOf<T>) -> Value {
        Value::from_raw(view.env(), view.raw())
    }
}

impl<T: Element> TypedArrayOf<T> {
    /// Allocates a fresh backing buffer and a full-length view over it.
    pub fn new(env: &Env, length: usize) -> Result<TypedArrayOf<T>> {
        let buffer = ArrayBuffer::new(env, length * std::mem::size_of::<T>())?;
        let view = TypedArray::new(env, T::KIND, length, &buffer, 0)?;
        Ok(TypedArrayOf {
            view,
            _marker: PhantomData,
        })
    }

    pub fn as_slice(&self) -> Result<&[T]> {
        let (data, len) = self.view.data_and_len()?;
        if data.is_null() {
            return Ok(&[]);
        }
        Ok(unsafe { std::slice::from_raw_parts(data as *const T, len) })
    }

    pub fn as_mut_slice(&mut self) -> Result<&mut [T]> {
        let (data, len) = self.view.data_and_len()?;
        if data.is_null() {
            return Ok(&mut []);
        }
        Ok(unsafe { std::slice::from_raw_parts_mut(data as *mut T, len) })
    }
}

/// Byte buffer in the style of a `Uint8Array` with its own allocation.
#[derive(Clone, Copy)]
pub struct Buffer(pub(crate) Object);
value_wrapper!(Buffer, Object);

impl Buffer {
    /// Allocates `len` zeroed bytes.
    pub fn new(env: &Env, len: usize) -> Result<Buffer> {
        let mut data: *mut u8 = std::ptr::null_mut();
        let mut out = sys::RawValue::NONE;
        let status = unsafe { (env.abi().create_buffer)(env.raw(), len, &mut data, &mut out) };
        env.check(status)?;
        Ok(Buffer::from_raw(*env, out))
    }

    /// Allocates a buffer holding a copy of an owned byte snapshot.
    pub fn from_bytes(env: &Env, data: &Bytes) -> Result<Buffer> {
        Buffer::copy_from(env, data)
    }

    /// Allocates a buffer initialized with a copy of `data`.
    pub fn copy_from(env: &Env, data: &[u8]) -> Result<Buffer> {
        let mut out = sys::RawValue::NONE;
        let status =
            unsafe { (env.abi().create_buffer_copy)(env.raw(), data.as_ptr(), data.len(), &mut out) };
        env.check(status)?;
        Ok(Buffer::from_raw(*env, out))
    }

    fn info(&self) -> Result<(*mut u8, usize)> {
        let env = self.env();
        let mut data: *mut u8 = std::ptr::null_mut();
        let mut len = 0usize;
        let status =
            unsafe { (env.abi().get_buffer_info)(env.raw(), self.raw(), &mut data, &mut len) };
        env.check(status)?;
        Ok((data, len))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.info()?.1)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn as_slice(&self) -> Result<&[u8]> {
        let (data, len) = self.info()?;
        if data.is_null() {
            return Ok(&[]);
        }
        Ok(unsafe { std::slice::from_raw_parts(data, len) })
    }

    pub fn as_mut_slice(&mut self) -> Result<&mut [u8]> {
        let (data, len) = self.info()?;
        if data.is_null() {
            return Ok(&mut []);
        }
        Ok(unsafe { std::slice::from_raw_parts_mut(data, len) })
    }

    /// Copies the contents out into an owned snapshot.
    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(self.as_slice()?))
    }
}
