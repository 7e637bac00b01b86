//! Reading, writing and converting the samples of an image.
use ndimage_texel::{DataType, Sample, SampleBuffer};

use super::lines::{convert_line, fill_line, LineLayout};
use super::{normal_strides, Image};
use crate::error::{messages, Error, Result};
use crate::iter::JointImageIterator;
use crate::pixel::Pixel;

/// The lines along the first dimension of images with equal sizes.
struct Lines {
    iter: JointImageIterator,
    strides: Vec<isize>,
    length: usize,
}

impl Lines {
    fn new(sizes: &[usize], strides: Vec<Vec<isize>>) -> Result<Self> {
        let iter = JointImageIterator::from_geometry(sizes, strides.clone());
        if sizes.is_empty() {
            return Ok(Lines {
                iter,
                strides: vec![0; strides.len()],
                length: 1,
            });
        }

        Ok(Lines {
            iter: iter.with_processing_dim(0)?,
            strides: strides.iter().map(|strides| strides[0]).collect(),
            length: sizes[0],
        })
    }

    fn layout(&self, which: usize, origin: usize, offset: isize, image: &Image) -> LineLayout {
        LineLayout {
            start: (origin as isize + offset) as usize,
            stride: self.strides[which],
            tensor_stride: image.tensor_stride,
        }
    }
}

impl Image {
    /// Read one sample, converted to `T`.
    pub fn sample<T: Sample>(&self, coordinates: &[usize], element: usize) -> Result<T> {
        self.pixel(coordinates)?.get(element)
    }

    /// Write one sample, converted to the type of the image.
    pub fn set_sample<T: Sample>(
        &mut self,
        coordinates: &[usize],
        element: usize,
        value: T,
    ) -> Result<()> {
        if element >= self.tensor_elements() {
            return Err(Error::parameter(messages::INDEX_OUT_OF_RANGE));
        }

        let view = self.at(coordinates)?.tensor_element(element)?;
        let index = view.origin_index()?;
        let mut buffer = view.block()?.write();
        fill_line(
            buffer.as_bytes_mut(),
            self.data_type,
            LineLayout::contiguous(index, 1),
            1,
            &[value],
        )
    }

    /// Copy the samples of one pixel.
    pub fn pixel(&self, coordinates: &[usize]) -> Result<Pixel> {
        self.check_forged()?;
        self.check_coordinates(coordinates)?;

        let mut pixel = Pixel::new(self.data_type, self.tensor);
        let start = self.origin_index()? as isize + self.offset_unchecked(coordinates);
        let buffer = self.block()?.read();
        convert_line(
            buffer.as_bytes(),
            self.data_type,
            LineLayout {
                start: start as usize,
                stride: 0,
                tensor_stride: self.tensor_stride,
            },
            pixel.bytes_mut(),
            self.data_type,
            LineLayout::contiguous(0, self.tensor_elements()),
            1,
            self.tensor_elements(),
        )?;

        Ok(pixel)
    }

    /// Overwrite one pixel. A scalar pixel is written to all tensor elements.
    pub fn set_pixel(&mut self, coordinates: &[usize], pixel: &Pixel) -> Result<()> {
        let mut view = self.at(coordinates)?;
        view.fill(pixel.clone())
    }

    /// Write the same value to every pixel. A scalar value is written to all tensor elements.
    pub fn fill(&mut self, value: impl Into<Pixel>) -> Result<()> {
        self.check_forged()?;
        let value = value.into();
        let tensor_stride = match value.tensor_elements() {
            1 => 0,
            n if n == self.tensor_elements() => 1,
            _ => return Err(Error::parameter(messages::TENSOR_ELEMENTS_DONT_MATCH)),
        };

        let lines = Lines::new(&self.sizes, vec![self.strides.clone()])?;
        let origin = self.origin_index()?;
        let mut buffer = self.block()?.write();
        for position in lines.iter.clone() {
            convert_line(
                value.bytes(),
                value.data_type(),
                LineLayout {
                    start: 0,
                    stride: 0,
                    tensor_stride,
                },
                buffer.as_bytes_mut(),
                self.data_type,
                lines.layout(0, origin, position.offsets[0], self),
                lines.length,
                self.tensor_elements(),
            )?;
        }

        Ok(())
    }

    /// Copy the pixels of `source`, converting them to the type of `self`.
    ///
    /// A raw image is forged with the properties of `source` first. Otherwise, sizes and tensor
    /// elements must match. Overlapping images are handled as if `source` was read entirely
    /// before writing.
    pub fn copy_from(&mut self, source: &Image) -> Result<()> {
        source.check_forged()?;
        if !self.is_forged() {
            self.sizes = source.sizes.clone();
            self.tensor = source.tensor;
            self.data_type = source.data_type;
            self.explicit_strides = false;
            self.forge()?;
        }

        if self.sizes != source.sizes {
            return Err(Error::parameter(messages::SIZES_DONT_MATCH));
        }

        if self.tensor_elements() != source.tensor_elements() {
            return Err(Error::parameter(messages::TENSOR_ELEMENTS_DONT_MATCH));
        }

        // Both locks can not be held on the same buffer.
        let snapshot;
        let source = if self.shares_data(source) {
            snapshot = source.copy()?;
            &snapshot
        } else {
            source
        };

        let lines = Lines::new(
            &self.sizes,
            vec![source.strides.clone(), self.strides.clone()],
        )?;
        let (from_origin, into_origin) = (source.origin_index()?, self.origin_index()?);
        let from = source.block()?.read();
        let mut into = self.block()?.write();

        for position in lines.iter.clone() {
            convert_line(
                from.as_bytes(),
                source.data_type,
                lines.layout(0, from_origin, position.offsets[0], source),
                into.as_bytes_mut(),
                self.data_type,
                lines.layout(1, into_origin, position.offsets[1], self),
                lines.length,
                self.tensor_elements(),
            )?;
        }

        Ok(())
    }

    /// A deep copy with normal strides.
    pub fn copy(&self) -> Result<Image> {
        self.converted(self.data_type)
    }

    /// A deep copy with normal strides and samples converted to another type.
    pub fn converted(&self, data_type: DataType) -> Result<Image> {
        self.check_forged()?;
        let mut copy = Image::unforged(&self.sizes, 1, data_type);
        copy.tensor = self.tensor;
        copy.forge()?;
        copy.copy_from(self)?;
        Ok(copy)
    }

    /// Change the sample type.
    ///
    /// A forged image gets a new buffer with normal strides and no longer shares data with other
    /// images.
    pub fn convert(&mut self, data_type: DataType) -> Result<()> {
        if data_type == self.data_type {
            return Ok(());
        }

        if !self.is_forged() {
            self.data_type = data_type;
            return Ok(());
        }

        if self.protect {
            return Err(Error::parameter(messages::IMAGE_PROTECTED));
        }

        *self = self.converted(data_type)?;
        Ok(())
    }

    /// All samples in index order, the tensor elements of each pixel adjacent.
    pub fn to_vec<T: Sample>(&self) -> Result<Vec<T>> {
        self.check_forged()?;
        let mut samples = vec![T::default(); self.number_of_samples()];
        let (packed, _) = normal_strides(&self.sizes, self.tensor_elements())?;
        let lines = Lines::new(&self.sizes, vec![self.strides.clone(), packed])?;

        let origin = self.origin_index()?;
        let buffer = self.block()?.read();
        let into: &mut [u8] = bytemuck::cast_slice_mut(&mut samples);
        for position in lines.iter.clone() {
            convert_line(
                buffer.as_bytes(),
                self.data_type,
                lines.layout(0, origin, position.offsets[0], self),
                into,
                T::DATA_TYPE,
                LineLayout {
                    start: position.offsets[1] as usize,
                    stride: lines.strides[1],
                    tensor_stride: 1,
                },
                lines.length,
                self.tensor_elements(),
            )?;
        }

        Ok(samples)
    }

    /// Create an image holding `samples` in index order, as produced by [`Image::to_vec`].
    pub fn from_vec<T: Sample>(
        sizes: &[usize],
        tensor_elements: usize,
        samples: &[T],
    ) -> Result<Image> {
        let image = Image::new(sizes, tensor_elements, T::DATA_TYPE)?;
        if samples.len() != image.number_of_samples() {
            return Err(Error::parameter(messages::ARRAY_SIZES_DONT_MATCH));
        }

        let bytes: &[u8] = bytemuck::cast_slice(samples);
        let mut buffer = image.block()?.write();
        buffer.as_bytes_mut()[..bytes.len()].copy_from_slice(bytes);
        drop(buffer);
        Ok(image)
    }

    /// Read the pixels along `dim` from `start` to the end of the image, tensor elements
    /// adjacent.
    pub fn read_line<T: Sample>(&self, start: &[usize], dim: usize) -> Result<Vec<T>> {
        let (layout, length) = self.line_layout(start, dim)?;
        let tensor = self.tensor_elements();
        let mut samples = SampleBuffer::new(T::DATA_TYPE, length * tensor);

        let buffer = self.block()?.read();
        convert_line(
            buffer.as_bytes(),
            self.data_type,
            layout,
            samples.as_bytes_mut(),
            T::DATA_TYPE,
            LineLayout::contiguous(0, tensor),
            length,
            tensor,
        )?;

        Ok(samples.as_slice::<T>()?.to_vec())
    }

    /// Write the pixels along `dim` from `start` to the end of the image.
    pub fn write_line<T: Sample>(&mut self, start: &[usize], dim: usize, samples: &[T]) -> Result<()> {
        let (layout, length) = self.line_layout(start, dim)?;
        let tensor = self.tensor_elements();
        if samples.len() != length * tensor {
            return Err(Error::parameter(messages::ARRAY_SIZES_DONT_MATCH));
        }

        let mut buffer = self.block()?.write();
        convert_line(
            bytemuck::cast_slice(samples),
            T::DATA_TYPE,
            LineLayout::contiguous(0, tensor),
            buffer.as_bytes_mut(),
            self.data_type,
            layout,
            length,
            tensor,
        )
    }

    fn line_layout(&self, start: &[usize], dim: usize) -> Result<(LineLayout, usize)> {
        self.check_forged()?;
        self.check_coordinates(start)?;
        let stride = self.stride(dim)?;
        let origin = self.origin_index()? as isize + self.offset_unchecked(start);
        let layout = LineLayout {
            start: origin as usize,
            stride,
            tensor_stride: self.tensor_stride,
        };
        Ok((layout, self.sizes[dim] - start[dim]))
    }
}
