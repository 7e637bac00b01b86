// Distributed under The MIT License (MIT)
//
// Copyright (c) 2019 The `image-rs` developers
use core::{fmt, mem};

use alloc::collections::TryReserveError;
use alloc::vec::Vec;

use crate::datatype::DataType;
use crate::sample::Sample;

macro_rules! def_max_align {
    (
        $($($arch:literal),* = $num:literal),*
    ) => {
        $(
            /// A byte-like-type that is aligned to the required max alignment.
            ///
            /// This type does not contain padding and implements `Pod`. Generally, the alignment and size
            /// requirement is kept small to avoid overhead.
            #[derive(Clone, Copy)]
            #[cfg(
                any($(target_arch = $arch),*),
            )]
            #[repr(align($num))]
            #[repr(C)]
            pub struct MaxAligned(pub(crate) [u8; $num]);

            #[cfg(
                any($(target_arch = $arch),*),
            )]
            pub(crate) const MAX_ALIGN: usize = $num;
        )*

        #[derive(Clone, Copy)]
        #[cfg(
            not(any(
                $(any($(target_arch = $arch),*)),*
            )),
        )]
        #[repr(align(16))]
        #[repr(C)]
        pub struct MaxAligned(pub(crate) [u8; 16]);

        #[cfg(
            not(any(
                $(any($(target_arch = $arch),*)),*
            )),
        )]
        pub(crate) const MAX_ALIGN: usize = 16;
    }
}

def_max_align! {
    "x86", "x86_64" = 32,
    "arm" = 16,
    "aarch64" = 16,
    "wasm32" = 16
}

// SAFETY: a byte array wrapped in `repr(C)`, the alignment equals the size so there is no
// padding. All bit patterns are valid.
#[allow(unsafe_code)]
unsafe impl bytemuck::Zeroable for MaxAligned {}
#[allow(unsafe_code)]
unsafe impl bytemuck::Pod for MaxAligned {}

// Every sample type must be reinterpretable from the start of a buffer.
const _: () = assert!(MAX_ALIGN >= mem::align_of::<num_complex::Complex64>());
const _: () = assert!(MAX_ALIGN >= mem::align_of::<u64>());

/// Allocates and manages raw bytes.
///
/// Provides a utility to allocate a slice of bytes aligned to the maximally required alignment of
/// any sample type. The backing storage is made of [`MaxAligned`] chunks, the buffer tracks the
/// exact logical byte length on top of that.
#[derive(Clone, Default)]
pub struct Buffer {
    /// The backing memory.
    inner: Vec<MaxAligned>,
    /// The logical length in bytes.
    len: usize,
}

impl Buffer {
    const ELEMENT: MaxAligned = MaxAligned([0; MAX_ALIGN]);

    /// The alignment of the first byte of every buffer.
    pub const ALIGNMENT: usize = MAX_ALIGN;

    /// Allocate a new zeroed buffer with a number of bytes.
    ///
    /// Panics if the allocation fails, see [`Buffer::try_new`] for a fallible version.
    pub fn new(length: usize) -> Self {
        let alloc_len = Self::alloc_len(length);
        let inner = alloc::vec![Self::ELEMENT; alloc_len];
        Buffer { inner, len: length }
    }

    /// Allocate a new zeroed buffer, reporting allocation failure instead of aborting.
    pub fn try_new(length: usize) -> Result<Self, TryReserveError> {
        let alloc_len = Self::alloc_len(length);
        let mut inner = Vec::new();
        inner.try_reserve_exact(alloc_len)?;
        inner.resize(alloc_len, Self::ELEMENT);
        Ok(Buffer { inner, len: length })
    }

    /// Copy samples into a new buffer.
    pub fn from_samples<T: Sample>(samples: &[T]) -> Self {
        let bytes: &[u8] = bytemuck::cast_slice(samples);
        let mut buffer = Buffer::new(bytes.len());
        buffer.as_bytes_mut().copy_from_slice(bytes);
        buffer
    }

    /// The logical length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Retrieve the byte capacity of the allocated storage.
    pub fn capacity(&self) -> usize {
        self.inner.capacity() * mem::size_of::<MaxAligned>()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(self.inner.as_slice())[..self.len]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(self.inner.as_mut_slice())[..self.len]
    }

    /// View the buffer as samples.
    ///
    /// Trailing bytes that do not form a complete sample are not part of the slice.
    pub fn as_samples<T: Sample>(&self) -> &[T] {
        let whole = self.len - self.len % mem::size_of::<T>();
        bytemuck::cast_slice(&self.as_bytes()[..whole])
    }

    pub fn as_samples_mut<T: Sample>(&mut self) -> &mut [T] {
        let whole = self.len - self.len % mem::size_of::<T>();
        bytemuck::cast_slice_mut(&mut self.as_bytes_mut()[..whole])
    }

    /// Ensure to contain a minimum number of bytes.
    ///
    /// Only allocates when the new required size is larger than the previous one. New bytes are
    /// zeroed. If the current length is already large enough then this will not do anything.
    pub fn grow_to(&mut self, bytes: usize) {
        if bytes <= self.len {
            return;
        }

        let new_len = Self::alloc_len(bytes);
        if self.inner.len() < new_len {
            self.inner.resize(new_len, Self::ELEMENT);
        }

        let old = self.len;
        self.len = bytes;
        self.as_bytes_mut()[old..].fill(0);
    }

    /// Reallocate to fit as closely as possible.
    ///
    /// The allocation after resizing may still be larger than requested.
    pub fn resize_to(&mut self, bytes: usize) {
        let new_len = Self::alloc_len(bytes);
        let old = self.len.min(bytes);
        self.inner.resize(new_len, Self::ELEMENT);
        self.inner.shrink_to_fit();
        self.len = bytes;
        self.as_bytes_mut()[old..].fill(0);
    }

    /// Calculates the number of elements to have a byte buffer of requested length.
    fn alloc_len(length: usize) -> usize {
        const CHUNK_SIZE: usize = mem::size_of::<MaxAligned>();
        assert!(CHUNK_SIZE > 1);

        // We allocated enough chunks for at least the length. This can never overflow.
        length / CHUNK_SIZE + usize::from(length % CHUNK_SIZE != 0)
    }
}

impl From<&'_ [u8]> for Buffer {
    fn from(content: &'_ [u8]) -> Self {
        let mut buffer = Buffer::new(content.len());
        buffer.as_bytes_mut().copy_from_slice(content);
        buffer
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Buffer {}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer").field("len", &self.len).finish()
    }
}

/// A typed view was requested for a sample type the buffer does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("buffer holds {held} samples, requested {requested}")]
pub struct SampleTypeMismatch {
    pub held: DataType,
    pub requested: DataType,
}

/// An aligned buffer of samples whose type is only known at runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleBuffer {
    data_type: DataType,
    buffer: Buffer,
}

impl SampleBuffer {
    /// Allocate `len` zeroed samples of the given type.
    pub fn new(data_type: DataType, len: usize) -> Self {
        SampleBuffer {
            data_type,
            buffer: Buffer::new(len * data_type.size_of()),
        }
    }

    pub fn from_samples<T: Sample>(samples: &[T]) -> Self {
        SampleBuffer {
            data_type: T::DATA_TYPE,
            buffer: Buffer::from_samples(samples),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// The number of samples.
    pub fn len(&self) -> usize {
        self.buffer.len() / self.data_type.size_of()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.buffer.as_bytes_mut()
    }

    pub fn as_slice<T: Sample>(&self) -> Result<&[T], SampleTypeMismatch> {
        self.check::<T>()?;
        Ok(self.buffer.as_samples())
    }

    pub fn as_mut_slice<T: Sample>(&mut self) -> Result<&mut [T], SampleTypeMismatch> {
        self.check::<T>()?;
        Ok(self.buffer.as_samples_mut())
    }

    fn check<T: Sample>(&self) -> Result<(), SampleTypeMismatch> {
        if T::DATA_TYPE == self.data_type {
            Ok(())
        } else {
            Err(SampleTypeMismatch {
                held: self.data_type,
                requested: T::DATA_TYPE,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Buffer, SampleBuffer};
    use crate::DataType;

    #[test]
    fn alignment_and_length() {
        let buffer = Buffer::new(13);
        assert_eq!(buffer.len(), 13);
        assert_eq!(buffer.as_bytes().len(), 13);
        assert_eq!(buffer.as_bytes().as_ptr() as usize % Buffer::ALIGNMENT, 0);
        assert!(buffer.capacity() >= 13);
        // Only whole samples are visible.
        assert_eq!(buffer.as_samples::<u32>().len(), 3);
    }

    #[test]
    fn grow_and_resize_zero_new_bytes() {
        let mut buffer = Buffer::from(&[1u8, 2, 3][..]);
        buffer.grow_to(70);
        assert_eq!(buffer.len(), 70);
        assert_eq!(&buffer.as_bytes()[..4], &[1, 2, 3, 0]);
        assert!(buffer.as_bytes()[3..].iter().all(|&b| b == 0));

        buffer.resize_to(2);
        assert_eq!(buffer.as_bytes(), &[1, 2]);
        buffer.resize_to(4);
        assert_eq!(buffer.as_bytes(), &[1, 2, 0, 0]);
    }

    #[test]
    fn fallible_allocation() {
        assert!(Buffer::try_new(1024).is_ok());
        assert!(Buffer::try_new(usize::MAX).is_err());
    }

    #[test]
    fn typed_views_check_the_type() {
        let mut samples = SampleBuffer::new(DataType::UInt16, 5);
        assert_eq!(samples.len(), 5);
        samples.as_mut_slice::<u16>().unwrap()[4] = 7;
        assert_eq!(samples.as_slice::<u16>().unwrap(), &[0, 0, 0, 0, 7]);

        let err = samples.as_slice::<i16>().unwrap_err();
        assert_eq!(err.held, DataType::UInt16);
        assert_eq!(err.requested, DataType::SInt16);
    }
}
