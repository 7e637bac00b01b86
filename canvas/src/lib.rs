//! Strided N-dimensional images, and frameworks to process them line by line.
//!
//! An [`Image`] describes an array of any dimensionality whose pixels are small tensors of
//! samples. The samples are of one [`DataType`] chosen at runtime, from binary through integers
//! and floats to complex numbers. Images share their buffers: views that crop, mirror, permute
//! or broadcast dimensions are cheap, and writes through a view are visible in all of them.
//!
//! # Usage
//!
//! Creating an image and reading back its samples:
//!
//! ```
//! use ndimage_canvas::{DataType, Image, Range};
//!
//! let mut image = Image::new(&[4, 3], 1, DataType::UInt8)?;
//! image.fill(7.0)?;
//!
//! // A view of the second row, sharing the buffer.
//! let mut row = image.at_ranges(&[Range::all(), Range::at(1)])?;
//! assert_eq!(row.sizes(), &[4, 1]);
//! row.fill(1.0)?;
//! assert_eq!(image.to_vec::<u8>()?, vec![7, 7, 7, 7, 1, 1, 1, 1, 7, 7, 7, 7]);
//! # Ok::<(), ndimage_canvas::Error>(())
//! ```
//!
//! Pixel-wise arithmetic is a scan filter. Inputs with a singleton dimension are broadcast:
//!
//! ```
//! use ndimage_canvas::{DataType, Image};
//! use ndimage_canvas::framework::{scan_dyadic, ScanOptions, VariadicScanLineFilter};
//!
//! let lhs = Image::from_vec(&[3, 2], 1, &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0])?;
//! let rhs = Image::from_vec(&[1, 2], 1, &[10.0f32, 20.0])?;
//! let mut sum = Image::default();
//!
//! let mut add = VariadicScanLineFilter::new(|values: &[f32]| values[0] + values[1]);
//! scan_dyadic(&lhs, &rhs, &mut sum, DataType::SFloat, &mut add, ScanOptions::empty())?;
//! assert_eq!(sum.to_vec::<f32>()?, vec![11.0, 12.0, 13.0, 24.0, 25.0, 26.0]);
//! # Ok::<(), ndimage_canvas::Error>(())
//! ```
#![deny(unsafe_code)]

#[macro_use]
mod flags;

pub mod boundary;
pub mod config;
mod error;
pub mod framework;
mod image;
pub mod iter;
mod pixel;
pub mod pixel_table;
pub mod random;
mod range;
mod tensor;


pub use self::error::{messages, Error, ErrorKind, Result, ResultExt};
pub use self::image::{alias, Image};
pub use self::pixel::Pixel;
pub use self::range::{FixedRange, Range};
pub use self::tensor::{Tensor, TensorShape};

pub use ndimage_texel::{
    clamp_cast, dispatch, Bin, Complex32, Complex64, DataType, DataTypeSet, Sample, Saturated,
};
