// Distributed under The MIT License (MIT)
//
// Copyright (c) 2019 The `image-rs` developers
//! Arithmetic that clamps instead of wrapping.
//!
//! Integer results that do not fit the operand type are clamped to its minimum or maximum. Float
//! and complex types use plain IEEE arithmetic. Integer division by zero is not saturated: it
//! panics, as there is no meaningful value to clamp to.
use num_complex::{Complex32, Complex64};

use crate::sample::{Bin, Sample};

/// Clamping arithmetic on samples of one type.
pub trait Saturated: Sample {
    fn saturated_add(self, rhs: Self) -> Self;
    fn saturated_sub(self, rhs: Self) -> Self;
    fn saturated_mul(self, rhs: Self) -> Self;
    /// # Panics
    ///
    /// For integer types, when `rhs` is zero.
    fn saturated_div(self, rhs: Self) -> Self;
    /// Negation. Unsigned values negate to zero.
    fn saturated_neg(self) -> Self;
}

pub fn saturated_add<T: Saturated>(lhs: T, rhs: T) -> T {
    lhs.saturated_add(rhs)
}

pub fn saturated_sub<T: Saturated>(lhs: T, rhs: T) -> T {
    lhs.saturated_sub(rhs)
}

pub fn saturated_mul<T: Saturated>(lhs: T, rhs: T) -> T {
    lhs.saturated_mul(rhs)
}

pub fn saturated_div<T: Saturated>(lhs: T, rhs: T) -> T {
    lhs.saturated_div(rhs)
}

pub fn saturated_neg<T: Saturated>(value: T) -> T {
    value.saturated_neg()
}

#[cold]
#[track_caller]
fn division_by_zero() -> ! {
    panic!("saturated integer division by zero")
}

macro_rules! unsigned_saturated {
    ($($type:ty),*) => {
        $(
            impl Saturated for $type {
                fn saturated_add(self, rhs: Self) -> Self {
                    self.saturating_add(rhs)
                }

                fn saturated_sub(self, rhs: Self) -> Self {
                    self.saturating_sub(rhs)
                }

                fn saturated_mul(self, rhs: Self) -> Self {
                    self.saturating_mul(rhs)
                }

                #[track_caller]
                fn saturated_div(self, rhs: Self) -> Self {
                    if rhs == 0 {
                        division_by_zero()
                    }
                    self / rhs
                }

                fn saturated_neg(self) -> Self {
                    0
                }
            }
        )*
    };
}

macro_rules! signed_saturated {
    ($($type:ty),*) => {
        $(
            impl Saturated for $type {
                fn saturated_add(self, rhs: Self) -> Self {
                    self.saturating_add(rhs)
                }

                fn saturated_sub(self, rhs: Self) -> Self {
                    self.saturating_sub(rhs)
                }

                fn saturated_mul(self, rhs: Self) -> Self {
                    self.saturating_mul(rhs)
                }

                #[track_caller]
                fn saturated_div(self, rhs: Self) -> Self {
                    if rhs == 0 {
                        division_by_zero()
                    }
                    // Only `MIN / -1` overflows.
                    self.saturating_div(rhs)
                }

                fn saturated_neg(self) -> Self {
                    self.saturating_neg()
                }
            }
        )*
    };
}

macro_rules! ieee_saturated {
    ($($type:ty),*) => {
        $(
            impl Saturated for $type {
                fn saturated_add(self, rhs: Self) -> Self {
                    self + rhs
                }

                fn saturated_sub(self, rhs: Self) -> Self {
                    self - rhs
                }

                fn saturated_mul(self, rhs: Self) -> Self {
                    self * rhs
                }

                fn saturated_div(self, rhs: Self) -> Self {
                    self / rhs
                }

                fn saturated_neg(self) -> Self {
                    -self
                }
            }
        )*
    };
}

unsigned_saturated!(u8, u16, u32, u64);
signed_saturated!(i8, i16, i32, i64);
ieee_saturated!(f32, f64, Complex32, Complex64);

/// Binary samples follow boolean logic: addition is `or`, subtraction is `and not`,
/// multiplication is `and`.
impl Saturated for Bin {
    fn saturated_add(self, rhs: Self) -> Self {
        Bin::new(self.get() || rhs.get())
    }

    fn saturated_sub(self, rhs: Self) -> Self {
        Bin::new(self.get() && !rhs.get())
    }

    fn saturated_mul(self, rhs: Self) -> Self {
        Bin::new(self.get() && rhs.get())
    }

    #[track_caller]
    fn saturated_div(self, rhs: Self) -> Self {
        if !rhs.get() {
            division_by_zero()
        }
        self
    }

    fn saturated_neg(self) -> Self {
        Bin::new(!self.get())
    }
}
