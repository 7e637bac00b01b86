//! The strided N-dimensional image descriptor.
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ndimage_texel::{Buffer, DataType};

use crate::error::{messages, Error, Result};
use crate::tensor::Tensor;

mod access;
mod alias;
pub(crate) mod lines;
mod views;

pub use self::alias::alias;

/// An N-dimensional array of pixels, each a tensor of samples of one [`DataType`].
///
/// An image is either _raw_, a description of sizes, tensor and data type without any data, or
/// _forged_, in which case it refers to a buffer. The properties of a forged image can not be
/// changed, other than by [`Image::strip`]ping it first.
///
/// Cloning an image does not copy its pixels: the clone refers to the same buffer, writes through
/// one are visible through the other. The same holds for all views, such as [`Image::at_ranges`]
/// or [`Image::mirror`]. Use [`Image::copy`] for a deep copy.
///
/// Strides are counted in samples and may be negative, a stride of zero broadcasts a dimension.
/// The tensor elements of a pixel are a separate dimension with a stride of its own.
#[derive(Clone)]
pub struct Image {
    data_type: DataType,
    sizes: Vec<usize>,
    strides: Vec<isize>,
    tensor: Tensor,
    tensor_stride: isize,
    /// Whether `strides` were set by the user for the next forge.
    explicit_strides: bool,
    protect: bool,
    data: Option<DataBlock>,
}

/// A shared buffer, and the position of the sample at the origin of an image.
#[derive(Clone)]
pub(crate) struct DataBlock {
    buffer: Arc<RwLock<Buffer>>,
    /// In bytes, always a multiple of the sample size.
    origin: usize,
}

impl DataBlock {
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Buffer> {
        self.buffer.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Buffer> {
        self.buffer.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn same_buffer(&self, other: &DataBlock) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    pub(crate) fn origin(&self) -> usize {
        self.origin
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("data_type", &self.data_type)
            .field("sizes", &self.sizes)
            .field("strides", &self.strides)
            .field("tensor", &self.tensor)
            .field("tensor_stride", &self.tensor_stride)
            .field("forged", &self.data.is_some())
            .field("protected", &self.protect)
            .finish()
    }
}

impl Default for Image {
    fn default() -> Self {
        Image {
            data_type: DataType::SFloat,
            sizes: Vec::new(),
            strides: Vec::new(),
            tensor: Tensor::scalar(),
            tensor_stride: 1,
            explicit_strides: false,
            protect: false,
            data: None,
        }
    }
}

impl Image {
    /// Create a forged image with normal strides, all samples zero.
    pub fn new(sizes: &[usize], tensor_elements: usize, data_type: DataType) -> Result<Self> {
        let mut image = Image::unforged(sizes, tensor_elements, data_type);
        image.forge()?;
        Ok(image)
    }

    /// Describe an image without allocating it.
    pub fn unforged(sizes: &[usize], tensor_elements: usize, data_type: DataType) -> Self {
        Image {
            data_type,
            sizes: sizes.to_vec(),
            tensor: Tensor::vector(tensor_elements),
            ..Image::default()
        }
    }

    /// Allocate the buffer.
    ///
    /// Strides set with [`Image::set_strides`] are honored when they are valid, otherwise the
    /// image gets normal strides: the tensor elements of a pixel are adjacent, followed by the
    /// pixels along the first dimension, then the second, and so on.
    ///
    /// Does nothing if the image is already forged.
    pub fn forge(&mut self) -> Result<()> {
        if self.is_forged() {
            return Ok(());
        }

        if self.sizes.contains(&0) || self.tensor.elements() == 0 {
            return Err(Error::parameter(messages::ZERO_SIZE));
        }

        let (strides, tensor_stride) = if self.explicit_strides {
            self.validate_explicit_strides()?;
            (self.strides.clone(), self.tensor_stride)
        } else {
            normal_strides(&self.sizes, self.tensor.elements())?
        };

        let (low, high) = span(&self.sizes, &strides, self.tensor.elements(), tensor_stride);
        let sample = self.data_type.size_of();
        let bytes = (high - low + 1)
            .unsigned_abs()
            .checked_mul(sample)
            .ok_or_else(|| Error::allocation(messages::SIZE_EXCEEDS_LIMIT))?;

        let buffer = Buffer::try_new(bytes).map_err(|err| Error::allocation(err.to_string()))?;
        log::trace!(
            "forged {} image of sizes {:?}, {} bytes",
            self.data_type,
            self.sizes,
            bytes
        );

        self.strides = strides;
        self.tensor_stride = tensor_stride;
        self.data = Some(DataBlock {
            buffer: Arc::new(RwLock::new(buffer)),
            origin: low.unsigned_abs() * sample,
        });

        Ok(())
    }

    /// Release the buffer, keeping all properties.
    ///
    /// Other images sharing the buffer keep it alive.
    pub fn strip(&mut self) -> Result<()> {
        if self.protect && self.is_forged() {
            return Err(Error::parameter(messages::IMAGE_PROTECTED));
        }

        self.data = None;
        Ok(())
    }

    /// Make sure the image is forged with the given properties.
    ///
    /// Keeps the current buffer when it already matches, otherwise strips and forges anew. A
    /// protected image with different properties is an error.
    pub fn reforge(
        &mut self,
        sizes: &[usize],
        tensor_elements: usize,
        data_type: DataType,
    ) -> Result<()> {
        if self.is_forged()
            && self.sizes == sizes
            && self.tensor.elements() == tensor_elements
            && self.data_type == data_type
        {
            return Ok(());
        }

        self.strip()?;
        self.sizes = sizes.to_vec();
        self.tensor = Tensor::vector(tensor_elements);
        self.data_type = data_type;
        self.explicit_strides = false;
        self.forge()
    }

    pub fn is_forged(&self) -> bool {
        self.data.is_some()
    }

    /// Protect the image against being stripped or reforged, returns the previous state.
    pub fn protect(&mut self, protect: bool) -> bool {
        std::mem::replace(&mut self.protect, protect)
    }

    pub fn is_protected(&self) -> bool {
        self.protect
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn dimensionality(&self) -> usize {
        self.sizes.len()
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn size(&self, dim: usize) -> Result<usize> {
        self.sizes
            .get(dim)
            .copied()
            .ok_or_else(|| Error::parameter(messages::ILLEGAL_DIMENSION))
    }

    /// The strides, empty for a raw image without explicitly set strides.
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn stride(&self, dim: usize) -> Result<isize> {
        self.strides
            .get(dim)
            .copied()
            .ok_or_else(|| Error::parameter(messages::ILLEGAL_DIMENSION))
    }

    pub fn tensor(&self) -> Tensor {
        self.tensor
    }

    pub fn tensor_elements(&self) -> usize {
        self.tensor.elements()
    }

    pub fn tensor_stride(&self) -> isize {
        self.tensor_stride
    }

    pub fn number_of_pixels(&self) -> usize {
        self.sizes.iter().product()
    }

    pub fn number_of_samples(&self) -> usize {
        self.number_of_pixels() * self.tensor.elements()
    }

    pub fn is_scalar(&self) -> bool {
        self.tensor.is_scalar()
    }

    pub fn is_complex(&self) -> bool {
        self.data_type.is_complex()
    }

    pub fn set_sizes(&mut self, sizes: &[usize]) -> Result<()> {
        self.check_raw()?;
        self.sizes = sizes.to_vec();
        self.strides.clear();
        self.explicit_strides = false;
        Ok(())
    }

    /// Request strides for the next forge. Empty strides request normal strides.
    pub fn set_strides(&mut self, strides: &[isize]) -> Result<()> {
        self.check_raw()?;
        self.strides = strides.to_vec();
        self.explicit_strides = !strides.is_empty();
        Ok(())
    }

    pub fn set_tensor_stride(&mut self, stride: isize) -> Result<()> {
        self.check_raw()?;
        self.tensor_stride = stride;
        Ok(())
    }

    /// Set a vector tensor of `elements` elements.
    pub fn set_tensor_sizes(&mut self, elements: usize) -> Result<()> {
        self.set_tensor_shape(Tensor::vector(elements))
    }

    pub fn set_tensor_shape(&mut self, tensor: Tensor) -> Result<()> {
        self.check_raw()?;
        if self.tensor.elements() != tensor.elements() {
            self.strides.clear();
            self.explicit_strides = false;
        }
        self.tensor = tensor;
        Ok(())
    }

    pub fn set_data_type(&mut self, data_type: DataType) -> Result<()> {
        self.check_raw()?;
        self.data_type = data_type;
        Ok(())
    }

    /// Whether the strides are those [`Image::forge`] chooses by default.
    ///
    /// Singleton dimensions are ignored, their stride is never used.
    pub fn has_normal_strides(&self) -> bool {
        if !self.is_forged() {
            return false;
        }

        let tensor = self.tensor.elements();
        if tensor > 1 && self.tensor_stride != 1 {
            return false;
        }

        let mut expected = tensor as isize;
        for (&size, &stride) in self.sizes.iter().zip(&self.strides) {
            if size > 1 && stride != expected {
                return false;
            }
            expected *= size as isize;
        }

        true
    }

    /// Whether some dimension is broadcast with a zero stride.
    pub fn is_singleton_expanded(&self) -> bool {
        let tensor = self.tensor.elements() > 1 && self.tensor_stride == 0;
        tensor
            || self
                .sizes
                .iter()
                .zip(&self.strides)
                .any(|(&size, &stride)| size > 1 && stride == 0)
    }

    /// Whether no two samples share an address, in a way that allows coordinates to be
    /// recovered from an offset.
    ///
    /// Ordered by the magnitude of their strides, each dimension must step over the full extent
    /// of all dimensions before it.
    pub fn has_valid_strides(&self) -> bool {
        if self.strides.len() != self.sizes.len() {
            return false;
        }

        let mut dims: Vec<(usize, usize)> = self
            .sizes
            .iter()
            .zip(&self.strides)
            .map(|(&size, &stride)| (size, stride.unsigned_abs()))
            .chain([(self.tensor.elements(), self.tensor_stride.unsigned_abs())])
            .filter(|&(size, _)| size > 1)
            .collect();
        nested(&mut dims)
    }

    /// Whether both images have the same sizes, strides, tensor and data type.
    pub fn same_layout(&self, other: &Image) -> bool {
        let strides = |image: &Image| -> Vec<isize> {
            image
                .sizes
                .iter()
                .zip(&image.strides)
                .map(|(&size, &stride)| if size > 1 { stride } else { 0 })
                .collect()
        };

        self.data_type == other.data_type
            && self.sizes == other.sizes
            && self.tensor.elements() == other.tensor.elements()
            && (self.tensor.elements() == 1 || self.tensor_stride == other.tensor_stride)
            && strides(self) == strides(other)
    }

    /// Whether both images refer to the same buffer, overlapping or not.
    pub fn shares_data(&self, other: &Image) -> bool {
        match (&self.data, &other.data) {
            (Some(a), Some(b)) => a.same_buffer(b),
            _ => false,
        }
    }

    /// The offset of a pixel from the origin, in samples.
    pub fn offset(&self, coordinates: &[usize]) -> Result<isize> {
        self.check_forged()?;
        self.check_coordinates(coordinates)?;
        Ok(self.offset_unchecked(coordinates))
    }

    /// The coordinates of the pixel at an offset returned by [`Image::offset`].
    ///
    /// Requires valid strides, see [`Image::has_valid_strides`].
    pub fn offset_to_coordinates(&self, offset: isize) -> Result<Vec<usize>> {
        self.check_forged()?;
        if !self.has_valid_strides() {
            return Err(Error::parameter(messages::STRIDES_INVALID));
        }

        // Walk each mirrored dimension from its other end, then all strides are positive.
        let mut rest = offset;
        for (&size, &stride) in self.sizes.iter().zip(&self.strides) {
            if stride < 0 {
                rest -= (size as isize - 1) * stride;
            }
        }

        let mut order: Vec<usize> = (0..self.sizes.len()).collect();
        order.sort_by_key(|&dim| std::cmp::Reverse(self.strides[dim].unsigned_abs()));

        let mut coordinates = vec![0; self.sizes.len()];
        for dim in order {
            let (size, stride) = (self.sizes[dim], self.strides[dim]);
            if size == 1 || rest < 0 {
                continue;
            }

            let step = stride.abs();
            let index = (rest / step).min(size as isize - 1);
            rest -= index * step;
            coordinates[dim] = if stride < 0 {
                size - 1 - index as usize
            } else {
                index as usize
            };
        }

        if rest != 0 {
            return Err(Error::parameter(messages::INDEX_OUT_OF_RANGE));
        }

        Ok(coordinates)
    }

    /// The linear index of a pixel, the first dimension varying fastest.
    pub fn index(&self, coordinates: &[usize]) -> Result<usize> {
        self.check_coordinates(coordinates)?;
        let mut index = 0;
        for (&coordinate, &size) in coordinates.iter().zip(&self.sizes).rev() {
            index = index * size + coordinate;
        }
        Ok(index)
    }

    pub fn index_to_coordinates(&self, mut index: usize) -> Result<Vec<usize>> {
        if index >= self.number_of_pixels() {
            return Err(Error::parameter(messages::INDEX_OUT_OF_RANGE));
        }

        Ok(self
            .sizes
            .iter()
            .map(|&size| {
                let coordinate = index % size;
                index /= size;
                coordinate
            })
            .collect())
    }

    pub(crate) fn block(&self) -> Result<&DataBlock> {
        self.data
            .as_ref()
            .ok_or_else(|| Error::parameter(messages::IMAGE_NOT_FORGED))
    }

    pub(crate) fn check_forged(&self) -> Result<()> {
        self.block().map(|_| ())
    }

    pub(crate) fn check_raw(&self) -> Result<()> {
        if self.is_forged() {
            Err(Error::parameter(messages::IMAGE_NOT_RAW))
        } else {
            Ok(())
        }
    }

    pub(crate) fn check_coordinates(&self, coordinates: &[usize]) -> Result<()> {
        if coordinates.len() != self.sizes.len() {
            return Err(Error::parameter(messages::DIMENSIONALITIES_DONT_MATCH));
        }

        if coordinates.iter().zip(&self.sizes).any(|(c, s)| c >= s) {
            return Err(Error::parameter(messages::COORDINATES_OUT_OF_RANGE));
        }

        Ok(())
    }

    pub(crate) fn offset_unchecked(&self, coordinates: &[usize]) -> isize {
        coordinates
            .iter()
            .zip(&self.strides)
            .map(|(&coordinate, &stride)| coordinate as isize * stride)
            .sum()
    }

    /// The index of the origin sample in the buffer, counted in samples of the image type.
    pub(crate) fn origin_index(&self) -> Result<usize> {
        Ok(self.block()?.origin / self.data_type.size_of())
    }

    /// The lowest and highest sample offset of any sample, relative to the origin.
    pub(crate) fn span(&self) -> (isize, isize) {
        span(
            &self.sizes,
            &self.strides,
            self.tensor.elements(),
            self.tensor_stride,
        )
    }

    fn validate_explicit_strides(&self) -> Result<()> {
        if self.strides.len() != self.sizes.len() {
            return Err(Error::parameter(messages::ARRAY_SIZES_DONT_MATCH));
        }

        let zero = self
            .sizes
            .iter()
            .zip(&self.strides)
            .any(|(&size, &stride)| size > 1 && stride == 0);
        if zero || (self.tensor.elements() > 1 && self.tensor_stride == 0) {
            return Err(Error::parameter(messages::STRIDES_INVALID));
        }

        if !self.has_valid_strides() {
            return Err(Error::parameter(messages::STRIDES_INVALID));
        }

        Ok(())
    }

    /// Build a view sharing the data block, with a different origin.
    pub(crate) fn with_origin_offset(&self, offset: isize) -> Result<Image> {
        let block = self.block()?;
        let bytes = offset * self.data_type.size_of() as isize;
        let origin = block
            .origin
            .checked_add_signed(bytes)
            .ok_or_else(|| Error::internal("view origin before the start of the buffer"))?;

        Ok(Image {
            data: Some(DataBlock {
                buffer: Arc::clone(&block.buffer),
                origin,
            }),
            protect: false,
            ..self.clone()
        })
    }
}

/// Strides with adjacent tensor elements and the first dimension varying fastest.
pub(crate) fn normal_strides(
    sizes: &[usize],
    tensor_elements: usize,
) -> Result<(Vec<isize>, isize)> {
    let overflow = || Error::allocation(messages::SIZE_EXCEEDS_LIMIT);
    let mut stride = isize::try_from(tensor_elements).map_err(|_| overflow())?;
    let mut strides = Vec::with_capacity(sizes.len());

    for &size in sizes {
        strides.push(stride);
        let size = isize::try_from(size).map_err(|_| overflow())?;
        stride = stride.checked_mul(size).ok_or_else(overflow)?;
    }

    Ok((strides, 1))
}

fn span(sizes: &[usize], strides: &[isize], tensor: usize, tensor_stride: isize) -> (isize, isize) {
    let extents = sizes
        .iter()
        .zip(strides)
        .map(|(&size, &stride)| (size, stride))
        .chain([(tensor, tensor_stride)]);

    let (mut low, mut high) = (0, 0);
    for (size, stride) in extents {
        let extent = (size as isize - 1) * stride;
        if extent < 0 {
            low += extent;
        } else {
            high += extent;
        }
    }

    (low, high)
}

/// Check that `(size, stride)` pairs, with positive strides, nest into each other.
pub(crate) fn nested(dims: &mut [(usize, usize)]) -> bool {
    dims.sort_by_key(|&(_, stride)| stride);
    let mut extent = 0usize;
    for &(size, stride) in dims.iter() {
        if stride <= extent {
            return false;
        }

        extent = match (size - 1)
            .checked_mul(stride)
            .and_then(|reach| reach.checked_add(extent))
        {
            Some(extent) => extent,
            None => return false,
        };
    }

    true
}

#[cfg(test)]
mod tests {
    use super::Image;
    use crate::error::ErrorKind;
    use ndimage_texel::DataType;

    #[test]
    fn forge_normal_strides() {
        let image = Image::new(&[4, 3, 2], 3, DataType::UInt16).unwrap();
        assert_eq!(image.strides(), &[3, 12, 36]);
        assert_eq!(image.tensor_stride(), 1);
        assert!(image.has_normal_strides());
        assert!(image.has_valid_strides());
        assert_eq!(image.number_of_samples(), 72);
    }

    #[test]
    fn forge_explicit_strides() {
        let mut image = Image::unforged(&[4, 3], 1, DataType::SInt32);
        image.set_strides(&[3, -1]).unwrap();
        image.forge().unwrap();
        assert_eq!(image.strides(), &[3, -1]);
        assert!(!image.has_normal_strides());
        // Mirrored second dimension: the origin is not the lowest address.
        assert_eq!(image.offset(&[0, 2]).unwrap(), -2);

        let mut overlapping = Image::unforged(&[4, 3], 1, DataType::SInt32);
        overlapping.set_strides(&[1, 2]).unwrap();
        assert_eq!(overlapping.forge().unwrap_err().kind(), ErrorKind::Parameter);

        let mut broadcast = Image::unforged(&[4, 3], 1, DataType::SInt32);
        broadcast.set_strides(&[0, 1]).unwrap();
        assert!(broadcast.forge().is_err());
        assert!(!broadcast.is_forged());
    }

    #[test]
    fn forge_failures_keep_the_image_raw() {
        let mut zero = Image::unforged(&[4, 0], 1, DataType::UInt8);
        assert_eq!(zero.forge().unwrap_err().kind(), ErrorKind::Parameter);

        let mut huge = Image::unforged(&[usize::MAX / 2, 4], 1, DataType::UInt8);
        assert_eq!(huge.forge().unwrap_err().kind(), ErrorKind::Allocation);
        assert!(!huge.is_forged());
    }

    #[test]
    fn forged_properties_are_frozen() {
        let mut image = Image::new(&[2, 2], 1, DataType::UInt8).unwrap();
        assert!(image.set_sizes(&[3]).is_err());
        assert!(image.set_data_type(DataType::SFloat).is_err());

        image.protect(true);
        assert!(image.strip().is_err());
        assert!(image.reforge(&[2, 2], 1, DataType::UInt8).is_ok());
        assert!(image.reforge(&[3, 2], 1, DataType::UInt8).is_err());

        image.protect(false);
        image.strip().unwrap();
        image.set_sizes(&[3]).unwrap();
        image.forge().unwrap();
        assert_eq!(image.sizes(), &[3]);
    }

    #[test]
    fn zero_dimensional_image_is_a_pixel() {
        let image = Image::new(&[], 2, DataType::DFloat).unwrap();
        assert_eq!(image.number_of_pixels(), 1);
        assert_eq!(image.offset(&[]).unwrap(), 0);
        assert_eq!(image.index_to_coordinates(0).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn index_is_first_dimension_fastest() {
        let image = Image::unforged(&[4, 3, 2], 1, DataType::UInt8);
        assert_eq!(image.index(&[1, 2, 1]).unwrap(), 1 + 2 * 4 + 12);
        assert_eq!(image.index_to_coordinates(21).unwrap(), [1, 2, 1]);
        assert!(image.index(&[4, 0, 0]).is_err());
        assert!(image.index_to_coordinates(24).is_err());
    }
}
