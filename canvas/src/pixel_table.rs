//! Neighborhoods as run-length encoded sets of relative coordinates.
//!
//! A [`PixelTable`] lists the pixels of a neighborhood relative to its origin, grouped into runs
//! along one processing dimension. [`PixelTable::prepare`] turns it into sample offsets for the
//! strides of a concrete image. The runs let a window sliding along the processing dimension be
//! updated by only the pixels that enter and leave it.
use core::str::FromStr;

use ndimage_texel::{Bin, DataType};

use crate::boundary::{read_pixel_with_boundary_condition, BoundaryCondition};
use crate::error::{messages, Error, Result};
use crate::image::Image;
use crate::iter::ImageIterator;

/// Named neighborhood shapes for [`PixelTable::new`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelTableShape {
    Rectangular,
    Elliptic,
    Diamond,
    /// A rasterized line through the origin, the sizes give its extent along each dimension.
    DiscreteLine,
    /// Like [`PixelTableShape::DiscreteLine`], but each step along the line is shared by the two
    /// nearest pixels, with weights that sum to one.
    InterpolatedLine,
}

impl FromStr for PixelTableShape {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "rectangular" => Ok(PixelTableShape::Rectangular),
            "elliptic" => Ok(PixelTableShape::Elliptic),
            "diamond" => Ok(PixelTableShape::Diamond),
            "discrete line" | "line" => Ok(PixelTableShape::DiscreteLine),
            "interpolated line" => Ok(PixelTableShape::InterpolatedLine),
            _ => Err(Error::parameter(format!("unknown neighborhood shape: {name:?}"))),
        }
    }
}

/// Consecutive pixels along the processing dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelRun {
    /// The first pixel, relative to the origin.
    pub coordinates: Vec<isize>,
    pub length: usize,
}

/// A neighborhood of pixels relative to an origin.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelTable {
    runs: Vec<PixelRun>,
    sizes: Vec<usize>,
    origin: Vec<isize>,
    pixels: usize,
    processing_dim: usize,
    /// One weight per pixel, in run order.
    weights: Option<Vec<f64>>,
}

/// A run of a [`PixelTableOffsets`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RunOffset {
    /// Offset in samples of the first pixel.
    pub offset: isize,
    pub length: usize,
}

/// A [`PixelTable`] compiled against the strides of one image.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelTableOffsets {
    runs: Vec<RunOffset>,
    offsets: Vec<isize>,
    stride: isize,
    processing_dim: usize,
    weights: Option<Vec<f64>>,
}

impl PixelTable {
    /// A neighborhood of a named shape.
    ///
    /// `sizes` has one value per dimension. For the filled shapes it is the diameter, for the
    /// lines a signed extent whose sign picks the direction.
    pub fn new(shape: PixelTableShape, sizes: &[f64], processing_dim: usize) -> Result<Self> {
        if sizes.is_empty() {
            return Err(Error::parameter(messages::DIMENSIONALITIES_DONT_MATCH));
        }

        if sizes.iter().any(|size| !size.is_finite()) {
            return Err(Error::parameter("neighborhood sizes must be finite"));
        }

        let points = match shape {
            PixelTableShape::Rectangular => rectangle(sizes),
            PixelTableShape::Elliptic => filled(sizes, |x, radius| (x / radius).powi(2)),
            PixelTableShape::Diamond => filled(sizes, |x, radius| x.abs() / radius),
            PixelTableShape::DiscreteLine => discrete_line(sizes),
            PixelTableShape::InterpolatedLine => {
                let (points, weights) = interpolated_line(sizes);
                return PixelTable::from_points(sizes.len(), points, Some(weights), processing_dim);
            }
        };

        PixelTable::from_points(sizes.len(), points, None, processing_dim)
    }

    /// The pixels set in a scalar mask image.
    ///
    /// A binary mask selects its set pixels. Any other real mask selects its finite pixels and
    /// uses their values as weights. The origin defaults to the center of the mask, `sizes / 2`.
    pub fn from_mask(mask: &Image, origin: Option<&[usize]>, processing_dim: usize) -> Result<Self> {
        mask.check_forged()?;
        if !mask.is_scalar() {
            return Err(Error::parameter(messages::IMAGE_NOT_SCALAR));
        }
        if mask.is_complex() {
            return Err(Error::parameter(messages::DATA_TYPE_NOT_SUPPORTED));
        }

        let dims = mask.dimensionality();
        if dims == 0 {
            return Err(Error::parameter(messages::DIMENSIONALITIES_DONT_MATCH));
        }

        let origin: Vec<usize> = match origin {
            Some(origin) if origin.len() == dims => origin.to_vec(),
            Some(_) => return Err(Error::parameter(messages::ARRAY_SIZES_DONT_MATCH)),
            None => mask.sizes().iter().map(|&size| size / 2).collect(),
        };

        let values = mask.to_vec::<f64>()?;
        let binary = mask.data_type() == DataType::Bin;
        let mut points = Vec::new();
        let mut weights = Vec::new();
        for (position, value) in ImageIterator::new(mask).zip(values) {
            let selected = if binary { value != 0.0 } else { value.is_finite() };
            if !selected {
                continue;
            }

            let relative = position
                .coordinates
                .iter()
                .zip(&origin)
                .map(|(&coordinate, &origin)| coordinate as isize - origin as isize)
                .collect();
            points.push(relative);
            weights.push(value);
        }

        let weights = if binary { None } else { Some(weights) };
        PixelTable::from_points(dims, points, weights, processing_dim)
    }

    /// Group points into runs along `processing_dim`.
    ///
    /// Duplicate points are merged, adding their weights.
    fn from_points(
        dims: usize,
        points: Vec<Vec<isize>>,
        weights: Option<Vec<f64>>,
        processing_dim: usize,
    ) -> Result<Self> {
        if processing_dim >= dims {
            return Err(Error::parameter(messages::ILLEGAL_DIMENSION));
        }

        if points.is_empty() {
            return Err(Error::parameter("neighborhood has no pixels"));
        }

        let has_weights = weights.is_some();
        let mut weighted: Vec<(Vec<isize>, f64)> = match weights {
            Some(weights) => points.into_iter().zip(weights).collect(),
            None => points.into_iter().map(|point| (point, 1.0)).collect(),
        };

        // Runs go along the processing dimension, so it sorts last.
        let key = |point: &[isize]| -> Vec<isize> {
            let mut key: Vec<isize> = point.iter().rev().copied().collect();
            let moved = key.remove(dims - 1 - processing_dim);
            key.push(moved);
            key
        };
        weighted.sort_by(|(a, _), (b, _)| key(a).cmp(&key(b)));
        weighted.dedup_by(|(next, weight), (kept, total)| {
            if next == kept {
                *total += *weight;
                true
            } else {
                false
            }
        });

        let mut runs: Vec<PixelRun> = Vec::new();
        for (point, _) in &weighted {
            if let Some(run) = runs.last_mut() {
                let mut end = run.coordinates.clone();
                end[processing_dim] += run.length as isize;
                if &end == point {
                    run.length += 1;
                    continue;
                }
            }
            runs.push(PixelRun {
                coordinates: point.clone(),
                length: 1,
            });
        }

        let mut low = vec![0isize; dims];
        let mut high = vec![0isize; dims];
        for (index, (point, _)) in weighted.iter().enumerate() {
            for dim in 0..dims {
                if index == 0 || point[dim] < low[dim] {
                    low[dim] = point[dim];
                }
                if index == 0 || point[dim] > high[dim] {
                    high[dim] = point[dim];
                }
            }
        }

        Ok(PixelTable {
            runs,
            sizes: low.iter().zip(&high).map(|(&low, &high)| (high - low + 1) as usize).collect(),
            origin: low.iter().map(|&low| -low).collect(),
            pixels: weighted.len(),
            processing_dim,
            weights: has_weights.then(|| weighted.into_iter().map(|(_, weight)| weight).collect()),
        })
    }

    pub fn runs(&self) -> &[PixelRun] {
        &self.runs
    }

    pub fn dimensionality(&self) -> usize {
        self.sizes.len()
    }

    /// The sizes of the bounding box.
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// The position of the origin relative to the corner of the bounding box.
    pub fn origin(&self) -> &[isize] {
        &self.origin
    }

    pub fn number_of_pixels(&self) -> usize {
        self.pixels
    }

    pub fn processing_dimension(&self) -> usize {
        self.processing_dim
    }

    pub fn has_weights(&self) -> bool {
        self.weights.is_some()
    }

    /// The weight of each pixel in the order of [`PixelTable::coordinates`].
    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    /// Every pixel relative to the origin, run after run.
    pub fn coordinates(&self) -> impl Iterator<Item = Vec<isize>> + '_ {
        let dim = self.processing_dim;
        self.runs.iter().flat_map(move |run| {
            (0..run.length).map(move |step| {
                let mut coordinates = run.coordinates.clone();
                coordinates[dim] += step as isize;
                coordinates
            })
        })
    }

    fn weighted_points(&self) -> (Vec<Vec<isize>>, Option<Vec<f64>>) {
        (self.coordinates().collect(), self.weights.clone())
    }

    /// Point the neighborhood the other way, negating all coordinates.
    pub fn mirror(&mut self) -> Result<()> {
        let (mut points, weights) = self.weighted_points();
        for point in &mut points {
            point.iter_mut().for_each(|coordinate| *coordinate = -*coordinate);
        }
        self.rebuild(points, weights, self.processing_dim)
    }

    /// Move the origin by `shift`, so that the pixel at `shift` becomes the new origin.
    pub fn shift_origin(&mut self, shift: &[isize]) -> Result<()> {
        if shift.len() != self.dimensionality() {
            return Err(Error::parameter(messages::ARRAY_SIZES_DONT_MATCH));
        }

        for run in &mut self.runs {
            for (coordinate, &shift) in run.coordinates.iter_mut().zip(shift) {
                *coordinate -= shift;
            }
        }
        for (origin, &shift) in self.origin.iter_mut().zip(shift) {
            *origin += shift;
        }
        Ok(())
    }

    /// Regroup the runs along another dimension.
    pub fn set_processing_dimension(&mut self, dim: usize) -> Result<()> {
        if dim >= self.dimensionality() {
            return Err(Error::parameter(messages::ILLEGAL_DIMENSION));
        }
        if dim != self.processing_dim {
            let (points, weights) = self.weighted_points();
            self.rebuild(points, weights, dim)?;
        }
        Ok(())
    }

    /// Attach one weight per pixel, in the order of [`PixelTable::coordinates`].
    pub fn set_weights(&mut self, weights: Vec<f64>) -> Result<()> {
        if weights.len() != self.pixels {
            return Err(Error::parameter(messages::ARRAY_SIZES_DONT_MATCH));
        }
        self.weights = Some(weights);
        Ok(())
    }

    /// Replace the runs by a regrouping of `points`. The table is unchanged on error.
    fn rebuild(
        &mut self,
        points: Vec<Vec<isize>>,
        weights: Option<Vec<f64>>,
        dim: usize,
    ) -> Result<()> {
        *self = PixelTable::from_points(self.dimensionality(), points, weights, dim)?;
        Ok(())
    }

    /// A binary image of the bounding box with the pixels of the neighborhood set.
    pub fn to_mask_image(&self) -> Result<Image> {
        let mut mask = Image::new(&self.sizes, 1, DataType::Bin)?;
        for coordinates in self.coordinates() {
            let position: Vec<usize> = coordinates
                .iter()
                .zip(&self.origin)
                .map(|(&coordinate, &origin)| (coordinate + origin) as usize)
                .collect();
            mask.set_sample(&position, 0, Bin::TRUE)?;
        }
        Ok(mask)
    }

    /// Compile the coordinates into sample offsets for the strides of `image`.
    pub fn prepare(&self, image: &Image) -> Result<PixelTableOffsets> {
        if image.dimensionality() != self.dimensionality() {
            return Err(Error::parameter(messages::DIMENSIONALITIES_DONT_MATCH));
        }

        let strides = image.strides();
        if strides.len() != self.dimensionality() {
            return Err(Error::parameter(messages::IMAGE_NOT_FORGED));
        }
        self.prepare_strides(strides)
    }

    /// As [`PixelTable::prepare`], for samples laid out with the given strides.
    pub(crate) fn prepare_strides(&self, strides: &[isize]) -> Result<PixelTableOffsets> {
        if strides.len() != self.dimensionality() {
            return Err(Error::parameter(messages::DIMENSIONALITIES_DONT_MATCH));
        }

        let offset_of = |coordinates: &[isize]| -> isize {
            coordinates.iter().zip(strides).map(|(&c, &s)| c * s).sum()
        };
        let stride = strides[self.processing_dim];

        let runs: Vec<RunOffset> = self
            .runs
            .iter()
            .map(|run| RunOffset {
                offset: offset_of(&run.coordinates),
                length: run.length,
            })
            .collect();
        let offsets = runs
            .iter()
            .flat_map(|run| (0..run.length as isize).map(move |step| run.offset + step * stride))
            .collect();

        Ok(PixelTableOffsets {
            runs,
            offsets,
            stride,
            processing_dim: self.processing_dim,
            weights: self.weights.clone(),
        })
    }
}

impl PixelTableOffsets {
    pub fn runs(&self) -> &[RunOffset] {
        &self.runs
    }

    /// The offset of every pixel, run after run.
    pub fn offsets(&self) -> &[isize] {
        &self.offsets
    }

    /// The stride along the processing dimension.
    pub fn stride(&self) -> isize {
        self.stride
    }

    pub fn processing_dimension(&self) -> usize {
        self.processing_dim
    }

    pub fn number_of_pixels(&self) -> usize {
        self.offsets.len()
    }

    pub fn has_weights(&self) -> bool {
        self.weights.is_some()
    }

    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    /// Negate all offsets. Each run is reversed so that it still walks along `stride`.
    pub fn mirror(&mut self) {
        for run in &mut self.runs {
            run.offset = -(run.offset + (run.length as isize - 1) * self.stride);
        }

        if let Some(weights) = &mut self.weights {
            let mut start = 0;
            for run in &self.runs {
                weights[start..start + run.length].reverse();
                start += run.length;
            }
        }

        let stride = self.stride;
        self.offsets = self
            .runs
            .iter()
            .flat_map(|run| (0..run.length as isize).map(move |step| run.offset + step * stride))
            .collect();
    }
}

fn rectangle(sizes: &[f64]) -> Vec<Vec<isize>> {
    let extents: Vec<isize> = sizes.iter().map(|&size| size.floor().max(1.0) as isize).collect();
    let low: Vec<isize> = extents.iter().map(|&extent| -(extent / 2)).collect();
    let high: Vec<isize> = extents.iter().zip(&low).map(|(&extent, &low)| low + extent - 1).collect();
    grid(&low, &high).collect()
}

/// The grid points within the bounding box of the given diameters, for which the distance
/// summed over dimensions is at most one.
fn filled(sizes: &[f64], distance: impl Fn(f64, f64) -> f64) -> Vec<Vec<isize>> {
    let radii: Vec<f64> = sizes.iter().map(|&size| size.max(1.0) / 2.0).collect();
    let high: Vec<isize> = radii.iter().map(|&radius| radius.floor() as isize).collect();
    let low: Vec<isize> = high.iter().map(|&high| -high).collect();

    grid(&low, &high)
        .filter(|point| {
            let total: f64 = point
                .iter()
                .zip(&radii)
                .filter(|&(_, &radius)| radius >= 1.0)
                .map(|(&coordinate, &radius)| distance(coordinate as f64, radius))
                .sum();
            total <= 1.0
        })
        .collect()
}

fn grid<'a>(low: &'a [isize], high: &'a [isize]) -> impl Iterator<Item = Vec<isize>> + 'a {
    let mut next = Some(low.to_vec());
    core::iter::from_fn(move || {
        let current = next.take()?;
        let mut advanced = current.clone();
        for dim in 0..advanced.len() {
            if advanced[dim] < high[dim] {
                advanced[dim] += 1;
                next = Some(advanced);
                break;
            }
            advanced[dim] = low[dim];
        }
        Some(current)
    })
}

/// The extent of a line along each dimension and the number of steps along it.
fn line_extents(sizes: &[f64]) -> (Vec<isize>, usize) {
    let extents: Vec<isize> = sizes
        .iter()
        .map(|&size| {
            let extent = size.abs().round().max(1.0) as isize;
            if size < 0.0 {
                -extent
            } else {
                extent
            }
        })
        .collect();
    let steps = extents.iter().map(|extent| extent.unsigned_abs()).max().unwrap_or(1);
    (extents, steps)
}

/// Position along one dimension at `step`, relative to the middle of the line.
fn line_position(extent: isize, step: usize, steps: usize) -> f64 {
    let length = extent.unsigned_abs();
    if steps <= 1 || length <= 1 {
        return 0.0;
    }

    let along = step as f64 * (length - 1) as f64 / (steps - 1) as f64;
    let along = if extent < 0 { (length - 1) as f64 - along } else { along };
    along - (length / 2) as f64
}

fn discrete_line(sizes: &[f64]) -> Vec<Vec<isize>> {
    let (extents, steps) = line_extents(sizes);
    (0..steps)
        .map(|step| {
            extents
                .iter()
                .map(|&extent| line_position(extent, step, steps).round() as isize)
                .collect()
        })
        .collect()
}

fn interpolated_line(sizes: &[f64]) -> (Vec<Vec<isize>>, Vec<f64>) {
    let (extents, steps) = line_extents(sizes);
    let mut points = Vec::new();
    let mut weights = Vec::new();

    for step in 0..steps {
        let positions: Vec<f64> = extents
            .iter()
            .map(|&extent| line_position(extent, step, steps))
            .collect();

        // Split the step over the corners of the grid cell containing it.
        let mut corners = vec![(Vec::with_capacity(positions.len()), 1.0)];
        for &position in &positions {
            let floor = position.floor();
            let fraction = position - floor;
            let mut split = Vec::with_capacity(corners.len() * 2);
            for (point, weight) in corners {
                let mut below: Vec<isize> = point;
                let mut above = below.clone();
                below.push(floor as isize);
                above.push(floor as isize + 1);
                split.push((below, weight * (1.0 - fraction)));
                split.push((above, weight * fraction));
            }
            corners = split;
        }

        for (point, weight) in corners {
            if weight > 0.0 {
                points.push(point);
                weights.push(weight);
            }
        }
    }

    (points, weights)
}

/// Sum the weighted neighborhood of every pixel, reading each neighbor through
/// [`read_pixel_with_boundary_condition`].
///
/// The result has the sizes and tensor of `input` and type `DFloat`. This is the slow reference
/// that sliding window filters are checked against.
pub fn window_sum_brute_force(
    input: &Image,
    table: &PixelTable,
    conditions: &[BoundaryCondition],
) -> Result<Image> {
    input.check_forged()?;
    if input.dimensionality() != table.dimensionality() {
        return Err(Error::parameter(messages::DIMENSIONALITIES_DONT_MATCH));
    }
    if input.is_complex() {
        return Err(Error::parameter(messages::DATA_TYPE_NOT_SUPPORTED));
    }

    let elements = input.tensor_elements();
    let mut sums = Vec::with_capacity(input.number_of_samples());
    let neighbors: Vec<Vec<isize>> = table.coordinates().collect();
    let weights = table
        .weights()
        .map(<[f64]>::to_vec)
        .unwrap_or_else(|| vec![1.0; neighbors.len()]);

    for position in ImageIterator::new(input) {
        let mut sum = vec![0.0; elements];
        for (neighbor, &weight) in neighbors.iter().zip(&weights) {
            let at: Vec<isize> = position
                .coordinates
                .iter()
                .zip(neighbor)
                .map(|(&coordinate, &offset)| coordinate as isize + offset)
                .collect();
            let pixel = read_pixel_with_boundary_condition(input, &at, conditions)?;
            for (element, sum) in sum.iter_mut().enumerate() {
                *sum += weight * pixel.as_f64(element)?;
            }
        }
        sums.extend(sum);
    }

    Image::from_vec(input.sizes(), elements, &sums)
}
