//! Views and metadata transforms. None of these move pixel data.
use super::Image;
use crate::error::{messages, Error, Result};
use crate::range::Range;
use crate::tensor::{Tensor, TensorShape};

impl Image {
    /// A view of a single pixel, keeping the dimensionality.
    pub fn at(&self, coordinates: &[usize]) -> Result<Image> {
        self.check_forged()?;
        self.check_coordinates(coordinates)?;
        let mut view = self.with_origin_offset(self.offset_unchecked(coordinates))?;
        view.sizes.iter_mut().for_each(|size| *size = 1);
        Ok(view)
    }

    /// A view of a strided region, one range per dimension.
    pub fn at_ranges(&self, ranges: &[Range]) -> Result<Image> {
        self.check_forged()?;
        if ranges.len() != self.dimensionality() {
            return Err(Error::parameter(messages::ARRAY_SIZES_DONT_MATCH));
        }

        let fixed = ranges
            .iter()
            .zip(&self.sizes)
            .map(|(range, &size)| range.fix(size))
            .collect::<Result<Vec<_>>>()?;

        let offset = fixed
            .iter()
            .zip(&self.strides)
            .map(|(range, &stride)| range.start as isize * stride)
            .sum();

        let mut view = self.with_origin_offset(offset)?;
        for (dim, range) in fixed.iter().enumerate() {
            view.sizes[dim] = range.len;
            view.strides[dim] *= range.step;
        }

        Ok(view)
    }

    /// A scalar view of one tensor element.
    pub fn tensor_element(&self, index: usize) -> Result<Image> {
        self.check_forged()?;
        if index >= self.tensor_elements() {
            return Err(Error::parameter(messages::INDEX_OUT_OF_RANGE));
        }

        let mut view = self.with_origin_offset(index as isize * self.tensor_stride)?;
        view.tensor = Tensor::scalar();
        view.tensor_stride = 1;
        Ok(view)
    }

    /// A vector view of the diagonal elements of a square matrix tensor.
    pub fn diagonal(&self) -> Result<Image> {
        self.check_forged()?;
        if !self.tensor.is_square() {
            return Err(Error::parameter("tensor is not a square matrix"));
        }

        let (len, step) = self.tensor.diagonal_elements();
        let mut view = self.view();
        view.tensor = Tensor::vector(len);
        view.tensor_stride *= step as isize;
        Ok(view)
    }

    /// A view of the real part of a complex image.
    pub fn real(&self) -> Result<Image> {
        self.complex_part(0)
    }

    /// A view of the imaginary part of a complex image.
    pub fn imaginary(&self) -> Result<Image> {
        self.complex_part(1)
    }

    fn complex_part(&self, part: isize) -> Result<Image> {
        self.check_forged()?;
        if !self.is_complex() {
            return Err(Error::parameter(messages::IMAGE_NOT_COMPLEX));
        }

        // Offsets of the complex view count whole samples, half a sample is one real sample.
        let data_type = self.data_type.real();
        let mut view = self.with_origin_offset(0)?;
        view.data_type = data_type;
        view.strides.iter_mut().for_each(|stride| *stride *= 2);
        view.tensor_stride *= 2;

        if part != 0 {
            let block = view.data.as_mut().ok_or_else(|| Error::internal("view lost its data"))?;
            block.origin += data_type.size_of();
        }

        Ok(view)
    }

    /// Exchange two dimensions.
    pub fn swap_dimensions(&self, a: usize, b: usize) -> Result<Image> {
        let dims = self.dimensionality();
        if a >= dims || b >= dims {
            return Err(Error::parameter(messages::ILLEGAL_DIMENSION));
        }

        let mut view = self.view();
        view.sizes.swap(a, b);
        if view.strides.len() == dims {
            view.strides.swap(a, b);
        }
        Ok(view)
    }

    /// Reorder dimensions, `order[k]` being the old index of the new dimension `k`.
    ///
    /// Dimensions not named in `order` must be singletons, and are dropped.
    pub fn permute_dimensions(&self, order: &[usize]) -> Result<Image> {
        let dims = self.dimensionality();
        let mut used = vec![false; dims];
        for &dim in order {
            match used.get_mut(dim) {
                Some(used) if !*used => *used = true,
                _ => return Err(Error::parameter(messages::INVALID_PERMUTATION)),
            }
        }

        if used.iter().zip(&self.sizes).any(|(&used, &size)| !used && size > 1) {
            return Err(Error::parameter(messages::DIMENSION_NOT_SINGLETON));
        }

        let mut view = self.view();
        view.sizes = order.iter().map(|&dim| self.sizes[dim]).collect();
        if self.strides.len() == dims {
            view.strides = order.iter().map(|&dim| self.strides[dim]).collect();
        }
        Ok(view)
    }

    /// Reverse the direction of the selected dimensions.
    pub fn mirror(&self, process: &[bool]) -> Result<Image> {
        self.check_forged()?;
        if process.len() != self.dimensionality() {
            return Err(Error::parameter(messages::ARRAY_SIZES_DONT_MATCH));
        }

        let offset = process
            .iter()
            .zip(self.sizes.iter().zip(&self.strides))
            .filter(|&(&mirror, _)| mirror)
            .map(|(_, (&size, &stride))| (size as isize - 1) * stride)
            .sum();

        let mut view = self.with_origin_offset(offset)?;
        for (stride, _) in view.strides.iter_mut().zip(process).filter(|&(_, &mirror)| mirror) {
            *stride = -*stride;
        }
        Ok(view)
    }

    /// Append singleton dimensions up to `dims` dimensions.
    pub fn expand_dimensionality(&self, dims: usize) -> Result<Image> {
        let mut view = self.view();
        while view.dimensionality() < dims {
            let at = view.dimensionality();
            view = view.add_singleton(at)?;
        }
        Ok(view)
    }

    /// Insert a singleton dimension before `dim`.
    pub fn add_singleton(&self, dim: usize) -> Result<Image> {
        if dim > self.dimensionality() {
            return Err(Error::parameter(messages::ILLEGAL_DIMENSION));
        }

        let mut view = self.view();
        view.sizes.insert(dim, 1);
        if view.is_forged() || view.explicit_strides {
            view.strides.insert(dim, 0);
        }
        Ok(view)
    }

    /// Broadcast a singleton dimension to `size` pixels, without copying.
    pub fn expand_singleton_dimension(&self, dim: usize, size: usize) -> Result<Image> {
        self.check_forged()?;
        match self.sizes.get(dim) {
            None => return Err(Error::parameter(messages::ILLEGAL_DIMENSION)),
            Some(&1) => {}
            Some(_) => return Err(Error::parameter(messages::DIMENSION_NOT_SINGLETON)),
        }

        let mut view = self.view();
        view.sizes[dim] = size;
        view.strides[dim] = 0;
        Ok(view)
    }

    /// Broadcast a scalar image to a vector of `elements` elements, without copying.
    pub fn expand_singleton_tensor(&self, elements: usize) -> Result<Image> {
        self.check_forged()?;
        if !self.is_scalar() {
            return Err(Error::parameter(messages::IMAGE_NOT_SCALAR));
        }

        let mut view = self.view();
        view.tensor = Tensor::vector(elements);
        view.tensor_stride = 0;
        Ok(view)
    }

    /// Remove all singleton dimensions.
    pub fn squeeze(&self) -> Result<Image> {
        let order: Vec<usize> = (0..self.dimensionality())
            .filter(|&dim| self.sizes[dim] > 1)
            .collect();
        self.permute_dimensions(&order)
    }

    /// A one-dimensional view of all pixels.
    ///
    /// Only possible without copying if the pixels are evenly spaced in memory, see
    /// [`Image::has_simple_stride`]. The order of the pixels follows their addresses.
    pub fn flatten(&self) -> Result<Image> {
        self.check_forged()?;
        let (stride, offset) = self
            .has_simple_stride()
            .ok_or_else(|| Error::parameter(messages::NO_SIMPLE_STRIDE))?;

        let mut view = self.with_origin_offset(offset)?;
        view.sizes = vec![self.number_of_pixels()];
        view.strides = vec![stride];
        Ok(view)
    }

    /// If all pixels are evenly spaced in memory, their distance and the offset of the pixel
    /// with the lowest address.
    pub fn has_simple_stride(&self) -> Option<(isize, isize)> {
        if !self.is_forged() {
            return None;
        }

        let mut dims: Vec<(usize, isize)> = self
            .sizes
            .iter()
            .zip(&self.strides)
            .filter(|&(&size, _)| size > 1)
            .map(|(&size, &stride)| (size, stride))
            .collect();

        let offset = dims
            .iter()
            .filter(|&&(_, stride)| stride < 0)
            .map(|&(size, stride)| (size as isize - 1) * stride)
            .sum();

        dims.sort_by_key(|&(_, stride)| stride.unsigned_abs());
        let step = dims.first().map_or(1, |&(_, stride)| stride.abs());
        let mut expected = step;
        for (size, stride) in dims {
            if stride.abs() != expected {
                return None;
            }
            expected *= size as isize;
        }

        (step != 0).then_some((step, offset))
    }

    /// Whether all samples of the image fill a block of memory without gaps.
    pub fn has_contiguous_data(&self) -> bool {
        if !self.is_forged() {
            return false;
        }

        let mut dims: Vec<(usize, usize)> = self
            .sizes
            .iter()
            .zip(&self.strides)
            .map(|(&size, &stride)| (size, stride.unsigned_abs()))
            .chain([(self.tensor_elements(), self.tensor_stride.unsigned_abs())])
            .filter(|&(size, _)| size > 1)
            .collect();

        dims.sort_by_key(|&(_, stride)| stride);
        let mut expected = 1;
        for (size, stride) in dims {
            if stride != expected {
                return false;
            }
            expected *= size;
        }
        true
    }

    /// Turn the tensor into a spatial dimension inserted at `dim`.
    pub fn tensor_to_spatial(&self, dim: usize) -> Result<Image> {
        self.check_forged()?;
        if dim > self.dimensionality() {
            return Err(Error::parameter(messages::ILLEGAL_DIMENSION));
        }

        let mut view = self.view();
        view.sizes.insert(dim, self.tensor_elements());
        view.strides.insert(dim, self.tensor_stride);
        view.tensor = Tensor::scalar();
        view.tensor_stride = 1;
        Ok(view)
    }

    /// Turn spatial dimension `dim` into a vector tensor.
    pub fn spatial_to_tensor(&self, dim: usize) -> Result<Image> {
        self.check_forged()?;
        if !self.is_scalar() {
            return Err(Error::parameter(messages::IMAGE_NOT_SCALAR));
        }

        if dim >= self.dimensionality() {
            return Err(Error::parameter(messages::ILLEGAL_DIMENSION));
        }

        let mut view = self.view();
        let size = view.sizes.remove(dim);
        view.tensor_stride = view.strides.remove(dim);
        view.tensor = Tensor::vector(size);
        Ok(view)
    }

    /// Reinterpret the tensor as a column-major matrix of another shape.
    pub fn reshape_tensor(&self, rows: usize, columns: usize) -> Result<Image> {
        let tensor = self.tensor.reshape(rows, columns)?;
        let mut view = self.view();
        view.tensor = tensor;
        Ok(view)
    }

    /// Set a tensor shape with the same number of elements.
    pub fn with_tensor_shape(&self, shape: TensorShape, rows: usize, columns: usize) -> Result<Image> {
        let tensor = Tensor::with_shape(shape, rows, columns)?;
        if tensor.elements() != self.tensor_elements() {
            return Err(Error::parameter(messages::TENSOR_ELEMENTS_DONT_MATCH));
        }

        let mut view = self.view();
        view.tensor = tensor;
        Ok(view)
    }

    pub fn transpose_tensor(&self) -> Image {
        let mut view = self.view();
        view.tensor = self.tensor.transpose();
        view
    }

    /// Widen a view into the margin of its buffer by `border` pixels on both sides.
    ///
    /// This is the inverse of cropping with [`Image::at_ranges`], and fails if the enlarged view
    /// does not fit into the buffer.
    pub fn grow_view(&self, border: &[usize]) -> Result<Image> {
        self.check_forged()?;
        if border.len() != self.dimensionality() {
            return Err(Error::parameter(messages::ARRAY_SIZES_DONT_MATCH));
        }

        let offset: isize = border
            .iter()
            .zip(&self.strides)
            .map(|(&border, &stride)| -(border as isize) * stride)
            .sum();

        let (origin, sample) = (self.block()?.origin as isize, self.data_type.size_of() as isize);
        let available = self.block()?.read().len() as isize;

        let mut view = self.view();
        for (size, &border) in view.sizes.iter_mut().zip(border) {
            *size += 2 * border;
        }

        let (low, high) = view.span();
        let new_origin = origin + offset * sample;
        if new_origin + low * sample < 0 || new_origin + (high + 1) * sample > available {
            return Err(Error::parameter("grown view exceeds the image buffer"));
        }

        view.with_origin_offset(offset)
    }

    /// A clone that does not inherit protection.
    fn view(&self) -> Image {
        Image {
            protect: false,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::image::Image;
    use crate::range::Range;
    use crate::tensor::TensorShape;
    use ndimage_texel::{Complex32, DataType};

    fn ramp(sizes: &[usize]) -> Image {
        let count = sizes.iter().product::<usize>();
        let data: Vec<u16> = (0..count as u16).collect();
        Image::from_vec(sizes, 1, &data).unwrap()
    }

    #[test]
    fn ranges_and_pixels_share_data() {
        let image = ramp(&[4, 3]);
        let view = image
            .at_ranges(&[Range::with_step(-1, 0, 2), Range::at(1)])
            .unwrap();
        assert_eq!(view.sizes(), &[2, 1]);
        assert_eq!(view.to_vec::<u16>().unwrap(), [7, 5]);

        let mut pixel = image.at(&[2, 2]).unwrap();
        pixel.fill(100.0).unwrap();
        assert_eq!(image.sample::<u16>(&[2, 2], 0).unwrap(), 100);
        assert!(image.at(&[4, 0]).is_err());
    }

    #[test]
    fn real_and_imaginary_parts() {
        let image = Image::from_vec(
            &[2],
            1,
            &[Complex32::new(1.0, 2.0), Complex32::new(3.0, 4.0)],
        )
        .unwrap();

        let real = image.real().unwrap();
        let mut imaginary = image.imaginary().unwrap();
        assert_eq!(real.data_type(), DataType::SFloat);
        assert_eq!(real.to_vec::<f32>().unwrap(), [1.0, 3.0]);
        assert_eq!(imaginary.to_vec::<f32>().unwrap(), [2.0, 4.0]);

        imaginary.fill(0.0).unwrap();
        assert_eq!(image.sample::<Complex32>(&[1], 0).unwrap(), Complex32::new(3.0, 0.0));
        assert_eq!(real.real().unwrap_err().kind(), ErrorKind::Parameter);
    }

    #[test]
    fn permutations_keep_addresses() {
        let image = ramp(&[4, 3, 1]);
        let permuted = image.permute_dimensions(&[1, 0]).unwrap();
        assert_eq!(permuted.sizes(), &[3, 4]);
        assert_eq!(permuted.sample::<u16>(&[2, 1], 0).unwrap(), 9);

        assert!(image.permute_dimensions(&[0, 0, 1]).is_err());
        assert!(image.permute_dimensions(&[2, 1]).is_err());

        let swapped = image.swap_dimensions(0, 1).unwrap();
        assert_eq!(swapped.strides(), &[4, 1, 12]);
        assert_eq!(image.squeeze().unwrap().sizes(), &[4, 3]);
    }

    #[test]
    fn mirror_and_flatten() {
        let image = ramp(&[3, 2]);
        let mirrored = image.mirror(&[true, false]).unwrap();
        assert_eq!(mirrored.to_vec::<u16>().unwrap(), [2, 1, 0, 5, 4, 3]);

        let flat = mirrored.flatten().unwrap();
        assert_eq!(flat.sizes(), &[6]);
        assert_eq!(flat.to_vec::<u16>().unwrap(), [0, 1, 2, 3, 4, 5]);

        let sparse = image.at_ranges(&[Range::with_step(0, 2, 2), Range::all()]).unwrap();
        assert_eq!(sparse.flatten().unwrap_err().kind(), ErrorKind::Parameter);
        assert!(image.has_contiguous_data());
        assert!(!sparse.has_contiguous_data());
    }

    #[test]
    fn singleton_expansion() {
        let image = ramp(&[3, 1]);
        let wide = image.expand_singleton_dimension(1, 4).unwrap();
        assert!(wide.is_singleton_expanded());
        assert!(!wide.has_valid_strides());
        assert_eq!(wide.sample::<u16>(&[2, 3], 0).unwrap(), 2);
        assert!(wide.expand_singleton_dimension(0, 2).is_err());

        let vector = image.expand_singleton_tensor(3).unwrap();
        assert_eq!(vector.pixel(&[1, 0]).unwrap().get::<u16>(2).unwrap(), 1);

        let grown = image.expand_dimensionality(4).unwrap();
        assert_eq!(grown.sizes(), &[3, 1, 1, 1]);
        assert!(grown.has_normal_strides());
    }

    #[test]
    fn tensor_and_spatial() {
        let image = Image::from_vec(&[2], 4, &[0u8, 1, 2, 3, 4, 5, 6, 7]).unwrap();
        let spatial = image.tensor_to_spatial(0).unwrap();
        assert_eq!(spatial.sizes(), &[4, 2]);
        assert_eq!(spatial.sample::<u8>(&[3, 1], 0).unwrap(), 7);

        let back = spatial.spatial_to_tensor(0).unwrap();
        assert!(back.same_layout(&image));

        let matrix = image.reshape_tensor(2, 2).unwrap();
        assert_eq!(matrix.tensor().shape(), TensorShape::ColumnMajorMatrix);
        let diagonal = matrix.diagonal().unwrap();
        assert_eq!(diagonal.to_vec::<u8>().unwrap(), [0, 3, 4, 7]);

        let transposed = matrix.transpose_tensor();
        assert_eq!(transposed.tensor().shape(), TensorShape::RowMajorMatrix);
    }

    #[test]
    fn grow_into_the_margin() {
        let image = ramp(&[5, 4]);
        let inner = image
            .at_ranges(&[Range::new(1, 3), Range::new(1, 2)])
            .unwrap();
        let grown = inner.grow_view(&[1, 1]).unwrap();
        assert!(grown.same_layout(&image));
        assert_eq!(grown.to_vec::<u16>().unwrap(), image.to_vec::<u16>().unwrap());
        assert!(inner.grow_view(&[2, 1]).is_err());
    }
}
