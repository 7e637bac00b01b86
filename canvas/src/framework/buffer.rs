//! Contiguous typed copies of image lines, and moving samples between them and images.
use std::ops::Range;

use ndimage_texel::{DataType, Sample};

use crate::error::Result;
use crate::image::lines::{convert_line, LineLayout};
use crate::image::Image;

/// The samples of one image line, pixel-interleaved and of one sample type.
///
/// A buffer may have a border of extra pixels on both ends. Indices of the accessors count
/// pixels of the line proper, the border is only visible through [`LineBuffer::with_border`].
#[derive(Clone, Debug, PartialEq)]
pub struct LineBuffer<T> {
    samples: Vec<T>,
    length: usize,
    border: usize,
    tensor_elements: usize,
}

impl<T: Sample> LineBuffer<T> {
    /// A buffer of `length` pixels plus `border` on each end, all samples zero.
    pub fn new(length: usize, tensor_elements: usize, border: usize) -> Self {
        LineBuffer {
            samples: vec![T::default(); (length + 2 * border) * tensor_elements],
            length,
            border,
            tensor_elements,
        }
    }

    pub fn data_type(&self) -> DataType {
        T::DATA_TYPE
    }

    /// The number of pixels, not counting the border.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn border(&self) -> usize {
        self.border
    }

    pub fn tensor_elements(&self) -> usize {
        self.tensor_elements
    }

    /// The distance between pixels, in samples.
    pub fn stride(&self) -> usize {
        self.tensor_elements
    }

    /// The samples of the line without its border.
    pub fn samples(&self) -> &[T] {
        &self.samples[self.interior()]
    }

    pub fn samples_mut(&mut self) -> &mut [T] {
        let interior = self.interior();
        &mut self.samples[interior]
    }

    /// All samples including the border, the first pixel of the line at `border * stride`.
    pub fn with_border(&self) -> &[T] {
        &self.samples
    }

    pub fn with_border_mut(&mut self) -> &mut [T] {
        &mut self.samples
    }

    /// The tensor elements of one pixel.
    pub fn pixel(&self, index: usize) -> &[T] {
        let start = (self.border + index) * self.tensor_elements;
        &self.samples[start..start + self.tensor_elements]
    }

    pub fn pixel_mut(&mut self, index: usize) -> &mut [T] {
        let start = (self.border + index) * self.tensor_elements;
        &mut self.samples[start..start + self.tensor_elements]
    }

    pub fn pixels(&self) -> std::slice::ChunksExact<'_, T> {
        self.samples().chunks_exact(self.tensor_elements)
    }

    pub fn pixels_mut(&mut self) -> std::slice::ChunksExactMut<'_, T> {
        let tensor = self.tensor_elements;
        self.samples_mut().chunks_exact_mut(tensor)
    }

    fn interior(&self) -> Range<usize> {
        self.border * self.tensor_elements..(self.border + self.length) * self.tensor_elements
    }
}

/// The addressing of an image, detached from its buffer so it can be shared by workers.
#[derive(Clone, Debug)]
pub(crate) struct Geometry {
    origin: usize,
    strides: Vec<isize>,
    tensor_stride: isize,
    tensor_elements: usize,
    data_type: DataType,
}

impl Geometry {
    pub(crate) fn of(image: &Image) -> Result<Self> {
        Ok(Geometry {
            origin: image.origin_index()?,
            strides: image.strides().to_vec(),
            tensor_stride: image.tensor_stride(),
            tensor_elements: image.tensor_elements(),
            data_type: image.data_type(),
        })
    }

    pub(crate) fn tensor_elements(&self) -> usize {
        self.tensor_elements
    }

    fn layout(&self, start: &[usize], dim: usize) -> LineLayout {
        let offset: isize = start
            .iter()
            .zip(&self.strides)
            .map(|(&coordinate, &stride)| coordinate as isize * stride)
            .sum();
        LineLayout {
            start: (self.origin as isize + offset) as usize,
            stride: self.strides[dim],
            tensor_stride: self.tensor_stride,
        }
    }

    /// Copy a line of the image into a new buffer, converting samples to `T`.
    pub(crate) fn gather<T: Sample>(
        &self,
        bytes: &[u8],
        start: &[usize],
        dim: usize,
        length: usize,
        border: usize,
    ) -> Result<LineBuffer<T>> {
        let mut line = LineBuffer::new(length, self.tensor_elements, border);
        convert_line(
            bytes,
            self.data_type,
            self.layout(start, dim),
            bytemuck::cast_slice_mut(&mut line.samples),
            T::DATA_TYPE,
            LineLayout::contiguous(border * self.tensor_elements, self.tensor_elements),
            length,
            self.tensor_elements,
        )?;
        Ok(line)
    }

    /// Write the line proper of a buffer to the image, converting samples to its type.
    pub(crate) fn scatter<T: Sample>(
        &self,
        bytes: &mut [u8],
        start: &[usize],
        dim: usize,
        line: &LineBuffer<T>,
    ) -> Result<()> {
        convert_line(
            bytemuck::cast_slice(&line.samples),
            T::DATA_TYPE,
            LineLayout::contiguous(line.border * line.tensor_elements, line.tensor_elements),
            bytes,
            self.data_type,
            self.layout(start, dim),
            line.length,
            self.tensor_elements.min(line.tensor_elements),
        )
    }
}

/// The lines a framework walks: every line along `dim`, each cut into segments of at most
/// `segment` pixels.
#[derive(Clone, Debug)]
pub(crate) struct LinePlan {
    pub sizes: Vec<usize>,
    pub dim: usize,
    pub segment: usize,
}

impl LinePlan {
    pub(crate) fn new(sizes: &[usize], dim: usize) -> Self {
        LinePlan {
            sizes: sizes.to_vec(),
            dim,
            segment: sizes.get(dim).copied().unwrap_or(1),
        }
    }

    fn segments(&self) -> usize {
        self.sizes[self.dim].div_ceil(self.segment.max(1))
    }

    pub(crate) fn count(&self) -> usize {
        let lines: usize = self
            .sizes
            .iter()
            .enumerate()
            .filter(|&(dim, _)| dim != self.dim)
            .map(|(_, &size)| size)
            .product();
        lines * self.segments()
    }

    /// The first pixel and length of a line, lines numbered with the first dimension varying
    /// fastest.
    pub(crate) fn line(&self, index: usize) -> (Vec<usize>, usize) {
        let segments = self.segments();
        let (mut rest, segment) = (index / segments, index % segments);
        let mut start = vec![0; self.sizes.len()];
        for (dim, (coordinate, &size)) in start.iter_mut().zip(&self.sizes).enumerate() {
            if dim == self.dim {
                continue;
            }
            *coordinate = rest % size;
            rest /= size;
        }

        let first = segment * self.segment;
        start[self.dim] = first;
        let length = self.segment.min(self.sizes[self.dim] - first);
        (start, length)
    }

    /// The length of the longest line.
    pub(crate) fn line_length(&self) -> usize {
        self.segment.min(self.sizes[self.dim])
    }
}

#[cfg(test)]
mod tests {
    use super::{Geometry, LineBuffer, LinePlan};
    use crate::image::Image;
    use ndimage_texel::DataType;

    #[test]
    fn borders_are_hidden() {
        let mut line = LineBuffer::<u16>::new(3, 2, 1);
        line.pixel_mut(0).copy_from_slice(&[1, 2]);
        line.pixel_mut(2).copy_from_slice(&[5, 6]);
        assert_eq!(line.samples(), &[1, 2, 0, 0, 5, 6]);
        assert_eq!(line.with_border().len(), 10);
        assert_eq!(line.with_border()[2..4], [1, 2]);
        assert_eq!(line.pixels().count(), 3);
        assert_eq!(line.data_type(), DataType::UInt16);
    }

    #[test]
    fn plan_segments_lines() {
        let plan = LinePlan {
            sizes: vec![10, 3],
            dim: 0,
            segment: 4,
        };
        assert_eq!(plan.count(), 9);
        assert_eq!(plan.line(0), (vec![0, 0], 4));
        assert_eq!(plan.line(2), (vec![8, 0], 2));
        assert_eq!(plan.line(4), (vec![4, 1], 4));

        let columns = LinePlan::new(&[4, 5, 2], 1);
        assert_eq!(columns.count(), 8);
        assert_eq!(columns.line(5), (vec![1, 0, 1], 5));
    }

    #[test]
    fn gather_and_scatter_convert() {
        let values: Vec<f32> = (0..6).map(|v| v as f32 * 1.5).collect();
        let image = Image::from_vec(&[3, 2], 1, &values).unwrap();
        let geometry = Geometry::of(&image).unwrap();
        let block = image.block().unwrap().read();
        let column = geometry
            .gather::<i32>(block.as_bytes(), &[2, 0], 1, 2, 0)
            .unwrap();
        assert_eq!(column.samples(), &[3, 8]);
        drop(block);

        let target = Image::new(&[3, 2], 1, DataType::UInt8).unwrap();
        let geometry = Geometry::of(&target).unwrap();
        let mut bytes = target.block().unwrap().write();
        geometry.scatter(bytes.as_bytes_mut(), &[0, 1], 0, &column).unwrap();
        drop(bytes);
        assert_eq!(target.to_vec::<u8>().unwrap(), vec![0, 0, 0, 3, 8, 0]);
    }
}
