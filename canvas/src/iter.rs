//! Cursors over the pixels of images.
//!
//! These iterators yield positions, coordinates and offsets in samples relative to the origin of
//! an image, never references into the data. Reading samples goes through [`SampleIterator`] or
//! the access methods of [`Image`].
use std::marker::PhantomData;
use std::mem;
use std::sync::RwLockReadGuard;

use ndimage_texel::{Buffer, Sample, SampleTypeMismatch};

use crate::error::{messages, Error, Result};
use crate::image::Image;

/// Walks the pixels of one line of an image.
///
/// Yields the offset of each pixel, the first one being the start coordinates the iterator was
/// created at.
#[derive(Clone, Debug)]
pub struct LineIterator {
    offset: isize,
    stride: isize,
    coordinate: usize,
    end: usize,
}

impl LineIterator {
    /// Iterate along `dim`, from `start` to the end of the image.
    pub fn new(image: &Image, start: &[usize], dim: usize) -> Result<Self> {
        image.check_coordinates(start)?;
        let stride = image.stride(dim)?;
        Ok(LineIterator {
            offset: image.offset_unchecked(start),
            stride,
            coordinate: start[dim],
            end: image.sizes()[dim],
        })
    }

    pub(crate) fn from_parts(offset: isize, stride: isize, length: usize) -> Self {
        LineIterator {
            offset,
            stride,
            coordinate: 0,
            end: length,
        }
    }

    /// The coordinate along the line of the next pixel.
    pub fn coordinate(&self) -> usize {
        self.coordinate
    }

    pub fn stride(&self) -> isize {
        self.stride
    }
}

impl Iterator for LineIterator {
    type Item = isize;

    fn next(&mut self) -> Option<isize> {
        if self.coordinate >= self.end {
            return None;
        }

        let offset = self.offset;
        self.offset += self.stride;
        self.coordinate += 1;
        Some(offset)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.end - self.coordinate;
        (len, Some(len))
    }
}

impl ExactSizeIterator for LineIterator {}

/// A position of an [`ImageIterator`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Position {
    pub coordinates: Vec<usize>,
    /// The offset in samples from the origin.
    pub offset: isize,
}

/// Walks all pixels of an image, the first dimension varying fastest.
///
/// With a processing dimension, the coordinate along that dimension stays zero and each
/// position is the start of a line, see [`ImageIterator::line_iterator`].
#[derive(Clone, Debug)]
pub struct ImageIterator {
    inner: JointImageIterator,
}

impl ImageIterator {
    pub fn new(image: &Image) -> Self {
        ImageIterator {
            inner: JointImageIterator::from_geometry(image.sizes(), vec![strides_of(image)]),
        }
    }

    /// Skip the given dimension, yielding the first pixel of each line along it.
    pub fn with_processing_dim(self, dim: usize) -> Result<Self> {
        Ok(ImageIterator {
            inner: self.inner.with_processing_dim(dim)?,
        })
    }

    pub fn processing_dim(&self) -> Option<usize> {
        self.inner.processing_dim
    }

    /// The line through the pixel the iterator will yield next.
    pub fn line_iterator(&self) -> Option<LineIterator> {
        self.inner.line_iterator(0)
    }
}

impl Iterator for ImageIterator {
    type Item = Position;

    fn next(&mut self) -> Option<Position> {
        let JointPosition {
            coordinates,
            offsets,
        } = self.inner.next()?;
        Some(Position {
            coordinates,
            offset: offsets[0],
        })
    }
}

/// A position of a [`JointImageIterator`], with one offset per image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JointPosition {
    pub coordinates: Vec<usize>,
    pub offsets: Vec<isize>,
}

/// Walks several images of the same sizes in lockstep.
///
/// The images may differ in their strides and data types.
#[derive(Clone, Debug)]
pub struct JointImageIterator {
    sizes: Vec<usize>,
    strides: Vec<Vec<isize>>,
    processing_dim: Option<usize>,
    coordinates: Vec<usize>,
    offsets: Vec<isize>,
    done: bool,
}

impl JointImageIterator {
    /// Fails if the images differ in their sizes.
    pub fn new(images: &[&Image]) -> Result<Self> {
        let first = images
            .first()
            .ok_or_else(|| Error::parameter("no images to iterate over"))?;

        if images.iter().any(|image| image.sizes() != first.sizes()) {
            return Err(Error::parameter(messages::SIZES_DONT_MATCH));
        }

        let strides = images.iter().map(|image| strides_of(image)).collect();
        Ok(Self::from_geometry(first.sizes(), strides))
    }

    pub(crate) fn from_geometry(sizes: &[usize], strides: Vec<Vec<isize>>) -> Self {
        let count = strides.len();
        JointImageIterator {
            sizes: sizes.to_vec(),
            strides,
            processing_dim: None,
            coordinates: vec![0; sizes.len()],
            offsets: vec![0; count],
            done: sizes.contains(&0),
        }
    }

    pub fn with_processing_dim(mut self, dim: usize) -> Result<Self> {
        if dim >= self.sizes.len() {
            return Err(Error::parameter(messages::ILLEGAL_DIMENSION));
        }

        self.processing_dim = Some(dim);
        Ok(self)
    }

    pub fn processing_dim(&self) -> Option<usize> {
        self.processing_dim
    }

    /// The number of positions in total.
    pub fn positions(&self) -> usize {
        self.sizes
            .iter()
            .enumerate()
            .filter(|&(dim, _)| Some(dim) != self.processing_dim)
            .map(|(_, &size)| size)
            .product()
    }

    /// The line of image `which` through the pixel the iterator will yield next.
    pub fn line_iterator(&self, which: usize) -> Option<LineIterator> {
        let dim = self.processing_dim?;
        if self.done {
            return None;
        }

        Some(LineIterator::from_parts(
            self.offsets[which],
            self.strides[which][dim],
            self.sizes[dim],
        ))
    }

    fn advance(&mut self) {
        for dim in 0..self.sizes.len() {
            if Some(dim) == self.processing_dim {
                continue;
            }

            self.coordinates[dim] += 1;
            for (offset, strides) in self.offsets.iter_mut().zip(&self.strides) {
                *offset += strides[dim];
            }

            if self.coordinates[dim] < self.sizes[dim] {
                return;
            }

            let rewind = self.coordinates[dim] as isize;
            for (offset, strides) in self.offsets.iter_mut().zip(&self.strides) {
                *offset -= rewind * strides[dim];
            }
            self.coordinates[dim] = 0;
        }

        self.done = true;
    }
}

impl Iterator for JointImageIterator {
    type Item = JointPosition;

    fn next(&mut self) -> Option<JointPosition> {
        if self.done {
            return None;
        }

        let position = JointPosition {
            coordinates: self.coordinates.clone(),
            offsets: self.offsets.clone(),
        };
        self.advance();
        Some(position)
    }
}

/// Raw images have no strides, walk them as if they had normal ones.
fn strides_of(image: &Image) -> Vec<isize> {
    if image.strides().len() == image.dimensionality() {
        return image.strides().to_vec();
    }

    let mut stride = image.tensor_elements() as isize;
    image
        .sizes()
        .iter()
        .map(|&size| {
            let current = stride;
            stride *= size as isize;
            current
        })
        .collect()
}

/// Reads the samples of one tensor element along a line of an image.
///
/// Holds a read lock on the image data, writes to it block until the iterator is dropped.
pub struct SampleIterator<'data, T> {
    guard: RwLockReadGuard<'data, Buffer>,
    line: LineIterator,
    origin: isize,
    sample: PhantomData<T>,
}

impl<T: Sample> Iterator for SampleIterator<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let index = (self.origin + self.line.next()?) as usize;
        let size = mem::size_of::<T>();
        let bytes = &self.guard.as_bytes()[index * size..(index + 1) * size];
        Some(bytemuck::pod_read_unaligned(bytes))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.line.size_hint()
    }
}

impl<T: Sample> ExactSizeIterator for SampleIterator<'_, T> {}

impl Image {
    /// Read one tensor element of the pixels along `dim`, starting at `start`.
    ///
    /// `T` must be the exact sample type of the image.
    pub fn line_samples<T: Sample>(
        &self,
        start: &[usize],
        dim: usize,
        element: usize,
    ) -> Result<SampleIterator<'_, T>> {
        if T::DATA_TYPE != self.data_type() {
            return Err(SampleTypeMismatch {
                held: self.data_type(),
                requested: T::DATA_TYPE,
            }
            .into());
        }

        if element >= self.tensor_elements() {
            return Err(Error::parameter(messages::INDEX_OUT_OF_RANGE));
        }

        let block = self.block()?;
        let line = LineIterator::new(self, start, dim)?;
        let origin = self.origin_index()? as isize + element as isize * self.tensor_stride();

        Ok(SampleIterator {
            guard: block.read(),
            line,
            origin,
            sample: PhantomData,
        })
    }
}
