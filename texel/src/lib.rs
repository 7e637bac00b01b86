// Distributed under The MIT License (MIT)
//
// Copyright (c) 2019, 2020 The `image-rs` developers
//! # Samples
//!
//! The value types that N-dimensional images are built from.
//!
//! This library is strictly `no_std`. It defines the closed set of sample kinds an image may hold,
//! and the machinery to write code generic over them while choosing the type at runtime:
//!
//! - [`DataType`], the runtime tag, with the rules that suggest result types of arithmetic.
//! - [`Sample`], implemented by exactly one Rust type per tag, and [`clamp_cast`] converting
//!   between them without ever wrapping.
//! - [`Saturated`] arithmetic, clamping integer results to the range of their type.
//! - [`dispatch!`] and [`SampleAction`], which instantiate generic code for a runtime tag.
//! - [`Buffer`] and [`SampleBuffer`], aligned byte storage that can be viewed as samples.
//!
//! ## Usage
//!
//! ```
//! use ndimage_texel::{clamp_cast, dispatch, DataType, Sample, SampleBuffer, Saturated};
//!
//! let ty = DataType::suggest_arithmetic(DataType::UInt8, DataType::SInt8);
//! assert_eq!(ty, DataType::SInt16);
//!
//! // Fill a buffer of a type only known at runtime.
//! let mut buffer = SampleBuffer::new(ty, 4);
//! dispatch!(ty, T => {
//!     for (idx, sample) in buffer.as_mut_slice::<T>().unwrap().iter_mut().enumerate() {
//!         *sample = clamp_cast::<i32, T>(200 * idx as i32).saturated_sub(T::from_f64(100.0));
//!     }
//! });
//!
//! assert_eq!(buffer.as_slice::<i16>().unwrap(), &[-100, 100, 300, 500]);
//! ```
// Be std for doctests, avoids a weird warning about missing allocator.
#![cfg_attr(not(doctest), no_std)]
// The only `unsafe` are the `Pod` impls of the aligned storage chunk.
#![deny(unsafe_code)]
extern crate alloc;

mod buf;
mod datatype;
mod dispatch;
mod sample;
pub mod saturated;

pub use self::buf::{Buffer, MaxAligned, SampleBuffer, SampleTypeMismatch};
pub use self::datatype::{DataType, DataTypeSet, UnknownDataType};
pub use self::dispatch::SampleAction;
pub use self::sample::{clamp_cast, Bin, Sample, Widened};
pub use self::saturated::Saturated;

pub use num_complex::{Complex32, Complex64};
