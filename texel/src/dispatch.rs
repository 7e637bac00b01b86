// Distributed under The MIT License (MIT)
//
// Copyright (c) 2019 The `image-rs` developers
use crate::datatype::DataType;
use crate::saturated::Saturated;

/// A generic operation that is instantiated for one sample type chosen at runtime.
///
/// This is the trait flavor of [`dispatch!`](crate::dispatch!): implement it on a struct carrying
/// the arguments and pass it to [`DataType::dispatch`].
///
/// ```
/// use ndimage_texel::{DataType, Sample, Saturated, SampleAction};
///
/// struct Size;
///
/// impl SampleAction for Size {
///     type Output = usize;
///
///     fn run<T: Saturated>(self) -> usize {
///         core::mem::size_of::<T>()
///     }
/// }
///
/// assert_eq!(DataType::SInt16.dispatch(Size), 2);
/// ```
pub trait SampleAction {
    type Output;

    fn run<T: Saturated>(self) -> Self::Output;
}

impl DataType {
    /// Run a generic action with the sample type belonging to `self`.
    pub fn dispatch<A: SampleAction>(self, action: A) -> A::Output {
        crate::dispatch!(self, T => action.run::<T>())
    }
}

/// Select a generic code path by a runtime [`DataType`](crate::DataType).
///
/// The body is instantiated once per sample type in the selected set, with the given identifier
/// bound as a type alias to the sample type. Restricted sets require an `else` expression that is
/// evaluated for types outside the set, usually producing an error.
///
/// The available sets are `real`, `integer`, `unsigned`, `signed` (integers), `float`, `complex`,
/// `flex` and `non_binary`, matching the sets of [`DataTypeSet`](crate::DataTypeSet). Without a
/// set name, all types are accepted and the match is exhaustive.
///
/// ```
/// use ndimage_texel::{dispatch, DataType, Sample};
///
/// fn max_of(ty: DataType) -> Result<f64, &'static str> {
///     dispatch!(real: ty, T => Ok(<T as Sample>::max_value().to_f64()), else Err("complex"))
/// }
///
/// assert_eq!(max_of(DataType::UInt8), Ok(255.0));
/// assert!(max_of(DataType::SComplex).is_err());
/// ```
#[macro_export]
macro_rules! dispatch {
    (real: $ty:expr, $T:ident => $body:expr, else $fallback:expr) => {
        $crate::__dispatch_set!($ty, $T => $body, $fallback;
            Bin: $crate::Bin, UInt8: u8, UInt16: u16, UInt32: u32, UInt64: u64,
            SInt8: i8, SInt16: i16, SInt32: i32, SInt64: i64, SFloat: f32, DFloat: f64)
    };
    (integer: $ty:expr, $T:ident => $body:expr, else $fallback:expr) => {
        $crate::__dispatch_set!($ty, $T => $body, $fallback;
            UInt8: u8, UInt16: u16, UInt32: u32, UInt64: u64,
            SInt8: i8, SInt16: i16, SInt32: i32, SInt64: i64)
    };
    (unsigned: $ty:expr, $T:ident => $body:expr, else $fallback:expr) => {
        $crate::__dispatch_set!($ty, $T => $body, $fallback;
            UInt8: u8, UInt16: u16, UInt32: u32, UInt64: u64)
    };
    (signed: $ty:expr, $T:ident => $body:expr, else $fallback:expr) => {
        $crate::__dispatch_set!($ty, $T => $body, $fallback;
            SInt8: i8, SInt16: i16, SInt32: i32, SInt64: i64)
    };
    (float: $ty:expr, $T:ident => $body:expr, else $fallback:expr) => {
        $crate::__dispatch_set!($ty, $T => $body, $fallback; SFloat: f32, DFloat: f64)
    };
    (complex: $ty:expr, $T:ident => $body:expr, else $fallback:expr) => {
        $crate::__dispatch_set!($ty, $T => $body, $fallback;
            SComplex: $crate::Complex32, DComplex: $crate::Complex64)
    };
    (flex: $ty:expr, $T:ident => $body:expr, else $fallback:expr) => {
        $crate::__dispatch_set!($ty, $T => $body, $fallback;
            SFloat: f32, DFloat: f64, SComplex: $crate::Complex32, DComplex: $crate::Complex64)
    };
    (non_binary: $ty:expr, $T:ident => $body:expr, else $fallback:expr) => {
        $crate::__dispatch_set!($ty, $T => $body, $fallback;
            UInt8: u8, UInt16: u16, UInt32: u32, UInt64: u64,
            SInt8: i8, SInt16: i16, SInt32: i32, SInt64: i64, SFloat: f32, DFloat: f64,
            SComplex: $crate::Complex32, DComplex: $crate::Complex64)
    };
    ($ty:expr, $T:ident => $body:expr) => {
        match $ty {
            $crate::DataType::Bin => { type $T = $crate::Bin; $body }
            $crate::DataType::UInt8 => { type $T = u8; $body }
            $crate::DataType::UInt16 => { type $T = u16; $body }
            $crate::DataType::UInt32 => { type $T = u32; $body }
            $crate::DataType::UInt64 => { type $T = u64; $body }
            $crate::DataType::SInt8 => { type $T = i8; $body }
            $crate::DataType::SInt16 => { type $T = i16; $body }
            $crate::DataType::SInt32 => { type $T = i32; $body }
            $crate::DataType::SInt64 => { type $T = i64; $body }
            $crate::DataType::SFloat => { type $T = f32; $body }
            $crate::DataType::DFloat => { type $T = f64; $body }
            $crate::DataType::SComplex => { type $T = $crate::Complex32; $body }
            $crate::DataType::DComplex => { type $T = $crate::Complex64; $body }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __dispatch_set {
    ($ty:expr, $T:ident => $body:expr, $fallback:expr; $($variant:ident: $sample:ty),*) => {
        match $ty {
            $($crate::DataType::$variant => { type $T = $sample; $body })*
            #[allow(unreachable_patterns)]
            _ => $fallback,
        }
    };
}
