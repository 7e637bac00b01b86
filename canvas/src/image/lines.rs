//! Copying strided runs of samples between buffers, converting their type on the way.
use std::mem;

use ndimage_texel::{clamp_cast, dispatch, DataType, Sample};

use crate::error::{Error, Result};

/// Where the pixels of a line are found in a buffer.
///
/// Counted in samples of the buffer's type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct LineLayout {
    /// The index of the first sample of the first pixel.
    pub start: usize,
    pub stride: isize,
    pub tensor_stride: isize,
}

impl LineLayout {
    /// A pixel-interleaved contiguous line.
    pub(crate) fn contiguous(start: usize, tensor_elements: usize) -> Self {
        LineLayout {
            start,
            stride: tensor_elements as isize,
            tensor_stride: 1,
        }
    }

    pub(crate) fn at(&self, pixel: usize, element: usize) -> usize {
        let offset = pixel as isize * self.stride + element as isize * self.tensor_stride;
        (self.start as isize + offset) as usize
    }
}

/// View bytes of a sample buffer as whole samples.
pub(crate) fn samples<T: Sample>(bytes: &[u8]) -> Result<&[T]> {
    let whole = bytes.len() - bytes.len() % mem::size_of::<T>();
    bytemuck::try_cast_slice(&bytes[..whole])
        .map_err(|err| Error::internal(format!("sample buffer misaligned: {err}")))
}

pub(crate) fn samples_mut<T: Sample>(bytes: &mut [u8]) -> Result<&mut [T]> {
    let whole = bytes.len() - bytes.len() % mem::size_of::<T>();
    bytemuck::try_cast_slice_mut(&mut bytes[..whole])
        .map_err(|err| Error::internal(format!("sample buffer misaligned: {err}")))
}

/// Copy `length` pixels of `tensor` samples each, converting with [`clamp_cast`].
#[allow(clippy::too_many_arguments)]
pub(crate) fn convert_line(
    src: &[u8],
    src_type: DataType,
    src_at: LineLayout,
    dst: &mut [u8],
    dst_type: DataType,
    dst_at: LineLayout,
    length: usize,
    tensor: usize,
) -> Result<()> {
    dispatch!(src_type, S => {
        let src = samples::<S>(src)?;
        dispatch!(dst_type, D => {
            let dst = samples_mut::<D>(dst)?;
            for pixel in 0..length {
                for element in 0..tensor {
                    dst[dst_at.at(pixel, element)] = clamp_cast::<S, D>(src[src_at.at(pixel, element)]);
                }
            }
            Ok(())
        })
    })
}

/// Write one value to `length` pixels of `tensor` samples each.
pub(crate) fn fill_line<T: Sample>(
    dst: &mut [u8],
    dst_type: DataType,
    dst_at: LineLayout,
    length: usize,
    values: &[T],
) -> Result<()> {
    dispatch!(dst_type, D => {
        let dst = samples_mut::<D>(dst)?;
        let values: Vec<D> = values.iter().map(|&value| clamp_cast::<T, D>(value)).collect();
        for pixel in 0..length {
            for (element, &value) in values.iter().enumerate() {
                dst[dst_at.at(pixel, element)] = value;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::{convert_line, LineLayout};
    use ndimage_texel::{DataType, SampleBuffer};

    #[test]
    fn strided_conversion() {
        let src = SampleBuffer::from_samples(&[1.4f32, -2.0, 300.0, 7.6, 9.0, 10.0]);
        let mut dst = SampleBuffer::new(DataType::UInt8, 3);

        // Every other sample, from the end.
        let src_at = LineLayout {
            start: 5,
            stride: -2,
            tensor_stride: 0,
        };
        convert_line(
            src.as_bytes(),
            DataType::SFloat,
            src_at,
            dst.as_bytes_mut(),
            DataType::UInt8,
            LineLayout::contiguous(0, 1),
            3,
            1,
        )
        .unwrap();

        assert_eq!(dst.as_slice::<u8>().unwrap(), &[10, 8, 0]);
    }
}
