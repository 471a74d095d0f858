//! Purpose: Resolve host values into the raw address and record count a backend transfer needs.
//! Exports: `ValueView`, `ValueViewMut`, `ShapeKind`, `RecordSource`, `RecordSink`, `Plain`, `Scalar`.
//! Role: Single place where host memory is reinterpreted as packed records.
//! Invariants: Sources expose initialized bytes only; `Vec` sinks expose spare capacity for writing.
//! Invariants: A source must span a whole number of records; partial records are rejected.
//! Invariants: Capacity is checked before any backend call; destinations are never grown.
use std::mem::size_of;

use bytemuck::Pod;

use crate::core::error::{Error, ErrorKind};
use crate::core::record::RecordType;

/// Element type that can be handed to a backend byte-for-byte.
///
/// Implemented for the primitive numeric types and arrays of them. Record
/// structs opt in after deriving `bytemuck::Pod`:
///
/// ```
/// use packrec::api::Plain;
///
/// #[repr(C)]
/// #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
/// struct Reading {
///     sensor: u32,
///     value: f32,
/// }
///
/// impl Plain for Reading {}
/// ```
pub trait Plain: Pod {}

macro_rules! plain_primitives {
    ($($ty:ty),* $(,)?) => {
        $(impl Plain for $ty {})*
    };
}

plain_primitives!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl<T: Plain, const N: usize> Plain for [T; N]
where
    [T; N]: Pod,
{
}

/// Wraps a single record so it is transferred as one scalar value.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Scalar<T>(pub T);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ShapeKind {
    Array,
    Slice,
    Text,
    Indirect,
    Scalar,
}

/// Read-only view over the bytes a host value exposes.
#[derive(Clone, Copy, Debug)]
pub struct ValueView {
    addr: *const u8,
    count: usize,
    elem_size: usize,
    kind: ShapeKind,
}

impl ValueView {
    pub fn new(addr: *const u8, count: usize, elem_size: usize, kind: ShapeKind) -> Self {
        Self {
            addr,
            count,
            elem_size,
            kind,
        }
    }

    pub fn addr(&self) -> *const u8 {
        self.addr
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn elem_size(&self) -> usize {
        self.elem_size
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn byte_len(&self) -> usize {
        self.count * self.elem_size
    }

    /// Number of whole records of `record_type` this value carries.
    pub fn records(&self, record_type: &RecordType) -> Result<usize, Error> {
        check_widths(self.elem_size, record_type)?;
        let bytes = self.byte_len();
        if bytes % record_type.size() != 0 {
            return Err(Error::new(ErrorKind::LayoutMismatch).with_message(format!(
                "{:?} value spans {bytes} bytes, not a multiple of record size {}",
                self.kind,
                record_type.size()
            )));
        }
        Ok(bytes / record_type.size())
    }
}

/// Writable view over the storage a destination value can receive into.
#[derive(Debug)]
pub struct ValueViewMut {
    addr: *mut u8,
    count: usize,
    elem_size: usize,
    kind: ShapeKind,
}

impl ValueViewMut {
    pub fn new(addr: *mut u8, count: usize, elem_size: usize, kind: ShapeKind) -> Self {
        Self {
            addr,
            count,
            elem_size,
            kind,
        }
    }

    pub fn addr(&self) -> *mut u8 {
        self.addr
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn elem_size(&self) -> usize {
        self.elem_size
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn byte_len(&self) -> usize {
        self.count * self.elem_size
    }

    /// Records of `record_type` that fit in the destination.
    pub fn capacity(&self, record_type: &RecordType) -> Result<usize, Error> {
        check_widths(self.elem_size, record_type)?;
        Ok(self.byte_len() / record_type.size())
    }

    /// Validates that `nrecords` fit and land on element boundaries; returns the byte count.
    pub fn prepare(&self, nrecords: usize, record_type: &RecordType) -> Result<usize, Error> {
        ensure_capacity(self.capacity(record_type)?, nrecords)?;
        let bytes = nrecords * record_type.size();
        if bytes % self.elem_size != 0 {
            return Err(Error::new(ErrorKind::LayoutMismatch).with_message(format!(
                "{nrecords} records of {} bytes do not fill whole {}-byte elements",
                record_type.size(),
                self.elem_size
            )));
        }
        Ok(bytes)
    }
}

/// Fails with `InsufficientCapacity` when fewer than `requested` records are available.
pub fn ensure_capacity(available: usize, requested: usize) -> Result<(), Error> {
    if available < requested {
        return Err(Error::insufficient_capacity(
            available as u64,
            requested as u64,
        ));
    }
    Ok(())
}

fn check_widths(elem_size: usize, record_type: &RecordType) -> Result<(), Error> {
    if elem_size == 0 {
        return Err(Error::new(ErrorKind::UnsupportedShape)
            .with_message("zero-sized elements carry no record bytes"));
    }
    if record_type.size() == 0 {
        return Err(Error::new(ErrorKind::LayoutMismatch).with_message("record size is zero"));
    }
    Ok(())
}

pub enum Source<'a> {
    Records(ValueView),
    Strings(&'a [String]),
}

pub enum Sink<'a> {
    Records(ValueViewMut),
    Strings(&'a mut [String]),
}

/// A host value that can be read as packed records.
///
/// # Safety
///
/// A `Source::Records` view must point at `count * elem_size` initialized bytes
/// that stay valid and unmodified while `self` is borrowed.
pub unsafe trait RecordSource {
    fn source(&self) -> Source<'_>;
}

/// A host value that can receive packed records.
///
/// # Safety
///
/// A `Sink::Records` view must point at `count * elem_size` writable bytes owned
/// by `self`, and any bit pattern written there must be valid for `self` once
/// `commit` has returned `Ok`.
pub unsafe trait RecordSink {
    fn sink(&mut self) -> Sink<'_>;

    /// Called after a transfer wrote `bytes` bytes at the start of the view.
    ///
    /// # Safety
    ///
    /// `bytes` must not exceed the view's byte length and those bytes must have
    /// been written.
    unsafe fn commit(&mut self, bytes: usize) -> Result<(), Error> {
        let _ = bytes;
        Ok(())
    }
}

unsafe impl<T: Plain, const N: usize> RecordSource for [T; N] {
    fn source(&self) -> Source<'_> {
        Source::Records(ValueView::new(
            self.as_ptr().cast(),
            N,
            size_of::<T>(),
            ShapeKind::Array,
        ))
    }
}

unsafe impl<T: Plain> RecordSource for [T] {
    fn source(&self) -> Source<'_> {
        Source::Records(ValueView::new(
            self.as_ptr().cast(),
            self.len(),
            size_of::<T>(),
            ShapeKind::Slice,
        ))
    }
}

// Appends only what is initialized; spare capacity is for sinks.
unsafe impl<T: Plain> RecordSource for Vec<T> {
    fn source(&self) -> Source<'_> {
        self.as_slice().source()
    }
}

unsafe impl RecordSource for str {
    fn source(&self) -> Source<'_> {
        Source::Records(ValueView::new(self.as_ptr(), self.len(), 1, ShapeKind::Text))
    }
}

unsafe impl RecordSource for String {
    fn source(&self) -> Source<'_> {
        self.as_str().source()
    }
}

unsafe impl<T: Plain> RecordSource for Box<T> {
    fn source(&self) -> Source<'_> {
        let ptr: *const T = &**self;
        Source::Records(ValueView::new(
            ptr.cast(),
            1,
            size_of::<T>(),
            ShapeKind::Indirect,
        ))
    }
}

unsafe impl<T: Plain> RecordSource for Scalar<T> {
    fn source(&self) -> Source<'_> {
        let ptr: *const T = &self.0;
        Source::Records(ValueView::new(ptr.cast(), 1, size_of::<T>(), ShapeKind::Scalar))
    }
}

unsafe impl RecordSource for [String] {
    fn source(&self) -> Source<'_> {
        Source::Strings(self)
    }
}

unsafe impl RecordSource for Vec<String> {
    fn source(&self) -> Source<'_> {
        Source::Strings(self.as_slice())
    }
}

unsafe impl<const N: usize> RecordSource for [String; N] {
    fn source(&self) -> Source<'_> {
        Source::Strings(self.as_slice())
    }
}

unsafe impl<T: Plain, const N: usize> RecordSink for [T; N] {
    fn sink(&mut self) -> Sink<'_> {
        Sink::Records(ValueViewMut::new(
            self.as_mut_ptr().cast(),
            N,
            size_of::<T>(),
            ShapeKind::Array,
        ))
    }
}

unsafe impl<T: Plain> RecordSink for [T] {
    fn sink(&mut self) -> Sink<'_> {
        Sink::Records(ValueViewMut::new(
            self.as_mut_ptr().cast(),
            self.len(),
            size_of::<T>(),
            ShapeKind::Slice,
        ))
    }
}

// Capacity, not length, bounds what a Vec can receive.
unsafe impl<T: Plain> RecordSink for Vec<T> {
    fn sink(&mut self) -> Sink<'_> {
        Sink::Records(ValueViewMut::new(
            self.as_mut_ptr().cast(),
            self.capacity(),
            size_of::<T>(),
            ShapeKind::Slice,
        ))
    }

    unsafe fn commit(&mut self, bytes: usize) -> Result<(), Error> {
        let filled = bytes / size_of::<T>();
        if filled > self.len() {
            // SAFETY: the transfer initialized `filled` elements and `T: Pod`
            // accepts any bit pattern; `filled <= capacity` per the caller.
            unsafe { self.set_len(filled) };
        }
        Ok(())
    }
}

unsafe impl RecordSink for String {
    fn sink(&mut self) -> Sink<'_> {
        let len = self.len();
        Sink::Records(ValueViewMut::new(
            self.as_mut_str().as_mut_ptr(),
            len,
            1,
            ShapeKind::Text,
        ))
    }

    unsafe fn commit(&mut self, _bytes: usize) -> Result<(), Error> {
        if let Err(err) = std::str::from_utf8(self.as_bytes()) {
            self.clear();
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("received text is not valid utf-8")
                .with_source(err));
        }
        Ok(())
    }
}

unsafe impl<T: Plain> RecordSink for Box<T> {
    fn sink(&mut self) -> Sink<'_> {
        let ptr: *mut T = &mut **self;
        Sink::Records(ValueViewMut::new(
            ptr.cast(),
            1,
            size_of::<T>(),
            ShapeKind::Indirect,
        ))
    }
}

unsafe impl<T: Plain> RecordSink for Scalar<T> {
    fn sink(&mut self) -> Sink<'_> {
        let ptr: *mut T = &mut self.0;
        Sink::Records(ValueViewMut::new(
            ptr.cast(),
            1,
            size_of::<T>(),
            ShapeKind::Scalar,
        ))
    }
}

unsafe impl RecordSink for [String] {
    fn sink(&mut self) -> Sink<'_> {
        Sink::Strings(self)
    }
}

unsafe impl RecordSink for Vec<String> {
    fn sink(&mut self) -> Sink<'_> {
        Sink::Strings(self.as_mut_slice())
    }
}

unsafe impl<const N: usize> RecordSink for [String; N] {
    fn sink(&mut self) -> Sink<'_> {
        Sink::Strings(self.as_mut_slice())
    }
}

macro_rules! scalar_views {
    ($($ty:ty),* $(,)?) => {
        $(
            unsafe impl RecordSource for $ty {
                fn source(&self) -> Source<'_> {
                    let ptr: *const $ty = self;
                    Source::Records(ValueView::new(
                        ptr.cast(),
                        1,
                        size_of::<$ty>(),
                        ShapeKind::Scalar,
                    ))
                }
            }

            unsafe impl RecordSink for $ty {
                fn sink(&mut self) -> Sink<'_> {
                    let ptr: *mut $ty = self;
                    Sink::Records(ValueViewMut::new(
                        ptr.cast(),
                        1,
                        size_of::<$ty>(),
                        ShapeKind::Scalar,
                    ))
                }
            }
        )*
    };
}

scalar_views!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);
