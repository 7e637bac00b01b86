// Distributed under The MIT License (MIT)
//
// Copyright (c) 2019 The `image-rs` developers
use core::fmt;

use num_complex::{Complex, Complex32, Complex64};

use crate::datatype::DataType;

/// A binary sample.
///
/// Stored as a single byte. Any non-zero byte reads as `true`, writes always store `0` or `1`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(transparent)]
pub struct Bin(u8);

impl Bin {
    pub const FALSE: Bin = Bin(0);
    pub const TRUE: Bin = Bin(1);

    pub const fn new(value: bool) -> Self {
        Bin(value as u8)
    }

    pub const fn get(self) -> bool {
        self.0 != 0
    }
}

impl From<bool> for Bin {
    fn from(value: bool) -> Self {
        Bin::new(value)
    }
}

impl From<Bin> for bool {
    fn from(value: Bin) -> Self {
        value.get()
    }
}

impl fmt::Debug for Bin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.get(), f)
    }
}

/// A lossless representation of any sample value.
///
/// All integer types fit into `i128`, floats into `f64` and complex values into `Complex64`.
/// Conversions between samples go through this type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Widened {
    Int(i128),
    Float(f64),
    Complex(Complex64),
}

impl Widened {
    /// The real part, as a float.
    pub fn to_f64(self) -> f64 {
        match self {
            Widened::Int(value) => value as f64,
            Widened::Float(value) => value,
            Widened::Complex(value) => value.re,
        }
    }

    pub fn to_complex(self) -> Complex64 {
        match self {
            Widened::Complex(value) => value,
            other => Complex64::new(other.to_f64(), 0.0),
        }
    }
}

/// A type that can be stored as a sample of an image.
///
/// This is implemented for exactly one Rust type per [`DataType`], these are the only types that
/// images can hold. The bound on `bytemuck::Pod` allows samples to be read from and written into
/// the raw byte buffers of images.
pub trait Sample:
    bytemuck::Pod + Default + PartialEq + fmt::Debug + Send + Sync + 'static
{
    /// The runtime tag of this sample type.
    const DATA_TYPE: DataType;

    /// Convert to a lossless intermediate.
    fn widen(self) -> Widened;

    /// Convert from an intermediate, clamping to the representable range.
    ///
    /// Complex values lose their imaginary part when narrowed into a real type, floats are
    /// rounded to the nearest integer (halfway cases away from zero) when narrowed into an integer
    /// type and NaN maps to zero.
    fn narrow(value: Widened) -> Self;

    fn to_f64(self) -> f64 {
        self.widen().to_f64()
    }

    fn to_complex(self) -> Complex64 {
        self.widen().to_complex()
    }

    fn from_f64(value: f64) -> Self {
        Self::narrow(Widened::Float(value))
    }

    fn from_complex(value: Complex64) -> Self {
        Self::narrow(Widened::Complex(value))
    }

    /// The largest value of the type, the real part for complex types.
    fn max_value() -> Self {
        Self::from_f64(Self::DATA_TYPE.max_value())
    }

    /// The smallest value of the type, the real part for complex types.
    fn min_value() -> Self {
        Self::from_f64(Self::DATA_TYPE.min_value())
    }
}

/// Convert a sample into another sample type.
///
/// Values outside the range of `T` are clamped to its extremes, never wrapped.
pub fn clamp_cast<S: Sample, T: Sample>(value: S) -> T {
    T::narrow(value.widen())
}

macro_rules! integer_sample {
    ($(($type:ty, $tag:ident)),*) => {
        $(
            impl Sample for $type {
                const DATA_TYPE: DataType = DataType::$tag;

                fn widen(self) -> Widened {
                    Widened::Int(self as i128)
                }

                fn narrow(value: Widened) -> Self {
                    match value {
                        Widened::Int(value) => {
                            if value < <$type>::MIN as i128 {
                                <$type>::MIN
                            } else if value > <$type>::MAX as i128 {
                                <$type>::MAX
                            } else {
                                value as $type
                            }
                        }
                        // Float to integer casts saturate, and map NaN to zero.
                        Widened::Float(value) => libm::round(value) as $type,
                        Widened::Complex(value) => libm::round(value.re) as $type,
                    }
                }
            }
        )*
    };
}

integer_sample!(
    (u8, UInt8),
    (u16, UInt16),
    (u32, UInt32),
    (u64, UInt64),
    (i8, SInt8),
    (i16, SInt16),
    (i32, SInt32),
    (i64, SInt64)
);

impl Sample for Bin {
    const DATA_TYPE: DataType = DataType::Bin;

    fn widen(self) -> Widened {
        Widened::Int(self.get().into())
    }

    fn narrow(value: Widened) -> Self {
        Bin::new(match value {
            Widened::Int(value) => value != 0,
            Widened::Float(value) => value != 0.0,
            Widened::Complex(value) => value.re != 0.0,
        })
    }
}

impl Sample for f32 {
    const DATA_TYPE: DataType = DataType::SFloat;

    fn widen(self) -> Widened {
        Widened::Float(self.into())
    }

    fn narrow(value: Widened) -> Self {
        value.to_f64() as f32
    }
}

impl Sample for f64 {
    const DATA_TYPE: DataType = DataType::DFloat;

    fn widen(self) -> Widened {
        Widened::Float(self)
    }

    fn narrow(value: Widened) -> Self {
        value.to_f64()
    }
}

impl Sample for Complex32 {
    const DATA_TYPE: DataType = DataType::SComplex;

    fn widen(self) -> Widened {
        Widened::Complex(Complex::new(self.re.into(), self.im.into()))
    }

    fn narrow(value: Widened) -> Self {
        let value = value.to_complex();
        Complex::new(value.re as f32, value.im as f32)
    }
}

impl Sample for Complex64 {
    const DATA_TYPE: DataType = DataType::DComplex;

    fn widen(self) -> Widened {
        Widened::Complex(self)
    }

    fn narrow(value: Widened) -> Self {
        value.to_complex()
    }
}

#[cfg(test)]
mod tests {
    use super::{clamp_cast, Bin, Sample};
    use num_complex::{Complex32, Complex64};

    #[test]
    fn integers_clamp() {
        assert_eq!(clamp_cast::<i16, u8>(-3), 0u8);
        assert_eq!(clamp_cast::<i16, u8>(300), 255u8);
        assert_eq!(clamp_cast::<u64, i64>(u64::MAX), i64::MAX);
        assert_eq!(clamp_cast::<i64, u64>(i64::MIN), 0u64);
        assert_eq!(clamp_cast::<u32, i8>(17), 17i8);
    }

    #[test]
    fn floats_round_and_clamp() {
        assert_eq!(clamp_cast::<f64, u8>(2.5), 3u8);
        assert_eq!(clamp_cast::<f64, i8>(-2.5), -3i8);
        assert_eq!(clamp_cast::<f32, u16>(1e9), u16::MAX);
        assert_eq!(clamp_cast::<f32, i32>(-1e20), i32::MIN);
        assert_eq!(clamp_cast::<f64, i32>(f64::NAN), 0);
        assert_eq!(clamp_cast::<f64, f32>(1e300), f32::INFINITY);
    }

    #[test]
    fn complex_drops_imaginary() {
        let value = Complex64::new(3.4, -8.0);
        assert_eq!(clamp_cast::<Complex64, f64>(value), 3.4);
        assert_eq!(clamp_cast::<Complex64, u8>(value), 3);
        assert_eq!(
            clamp_cast::<f32, Complex32>(1.5),
            Complex32::new(1.5, 0.0)
        );
    }

    #[test]
    fn binary() {
        assert_eq!(clamp_cast::<u8, Bin>(7), Bin::TRUE);
        assert_eq!(clamp_cast::<f32, Bin>(0.0), Bin::FALSE);
        assert_eq!(clamp_cast::<Bin, i16>(Bin::TRUE), 1);
        assert_eq!(<Bin as Sample>::max_value(), Bin::TRUE);
        assert_eq!(<u16 as Sample>::max_value(), u16::MAX);
        assert_eq!(<i8 as Sample>::min_value(), i8::MIN);
    }
}
