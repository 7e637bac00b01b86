//! Filters over a neighborhood of each pixel.
use ndimage_texel::{DataType, Sample};

use super::{
    batch_size, optimal_processing_dim_with_kernel, plan_threads, pool, prepare_output,
    run_lines, Geometry, LineBuffer, LinePlan, Threads, WriteLocks,
};
use crate::boundary::{extend_image, BoundaryCondition, ExtendImageOptions};
use crate::error::{messages, Error, Result};
use crate::image::{normal_strides, Image};
use crate::pixel_table::{PixelTable, PixelTableOffsets};
use crate::tensor::Tensor;

option_set! {
    /// Options of [`full`].
    pub struct FullOptions {
        /// Stay on the calling thread.
        const NO_MULTITHREADING = 0;
        /// Filter each tensor element as a scalar image.
        const AS_SCALAR_IMAGE = 1;
        /// The buffer of the input already holds a valid border around the view, read it instead
        /// of synthesizing one. See [`ExtendImageOptions::MASKED`].
        const BORDER_ALREADY_EXPANDED = 2;
    }
}

/// How [`full`] walks the image.
#[derive(Clone, Debug)]
pub struct FullSpec {
    /// The neighborhood, its origin is placed on each pixel in turn.
    pub kernel: PixelTable,
    pub output_type: DataType,
    /// The tensor elements of the output, the tensor of the input when not given.
    pub output_tensor_elements: Option<usize>,
    /// How pixels beyond the edge are filled, see [`BoundaryCondition::array`].
    pub conditions: Vec<BoundaryCondition>,
    pub options: FullOptions,
    pub threads: Threads,
}

impl FullSpec {
    pub fn new(kernel: PixelTable, output_type: DataType) -> Self {
        FullSpec {
            kernel,
            output_type,
            output_tensor_elements: None,
            conditions: Vec::new(),
            options: FullOptions::empty(),
            threads: Threads::Global,
        }
    }

    pub fn with_output_tensor_elements(mut self, elements: usize) -> Self {
        self.output_tensor_elements = Some(elements);
        self
    }

    pub fn with_conditions(mut self, conditions: &[BoundaryCondition]) -> Self {
        self.conditions = conditions.to_vec();
        self
    }

    pub fn with_options(mut self, options: FullOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_threads(mut self, threads: Threads) -> Self {
        self.threads = threads;
        self
    }
}

/// The input of a full filter, extended by the border of the neighborhood.
///
/// Samples are packed, tensor elements adjacent. The offsets of a [`PixelTableOffsets`] added
/// to the index of a pixel give the indices of its neighbors.
#[derive(Clone, Copy, Debug)]
pub struct FullInput<'a, T> {
    samples: &'a [T],
    start: usize,
    stride: isize,
    tensor_elements: usize,
}

impl<'a, T: Sample> FullInput<'a, T> {
    /// All samples of the extended input.
    pub fn samples(&self) -> &'a [T] {
        self.samples
    }

    /// The index of the first sample of the first pixel of the line.
    pub fn start(&self) -> usize {
        self.start
    }

    /// The distance between pixels of the line, in samples.
    pub fn stride(&self) -> isize {
        self.stride
    }

    pub fn tensor_elements(&self) -> usize {
        self.tensor_elements
    }

    /// The sample at `offset` from pixel `pixel` of the line.
    pub fn at(&self, pixel: usize, offset: isize, element: usize) -> T {
        let index = self.start as isize + pixel as isize * self.stride + offset;
        self.samples[index as usize + element]
    }
}

/// One line handed to a [`FullLineFilter`].
#[derive(Debug)]
pub struct FullLine<'a, I, O> {
    pub input: FullInput<'a, I>,
    pub output: &'a mut LineBuffer<O>,
    /// The neighborhood, compiled against the strides of [`FullLine::input`]. Its runs lie
    /// along the line.
    pub table: &'a PixelTableOffsets,
    pub dimension: usize,
    /// The coordinates of the first pixel.
    pub position: &'a [usize],
    /// The number of the line, the same for any number of threads.
    pub line: usize,
    pub thread: usize,
}

/// A filter applied by [`full`].
///
/// A filter typically evaluates the neighborhood of the first pixel completely, then moves
/// along the line updating only the pixels that enter and leave each run.
pub trait FullLineFilter: Sync {
    type Input: Sample;
    type Output: Sample;

    fn filter(&self, line: &mut FullLine<'_, Self::Input, Self::Output>) -> Result<()>;

    /// Estimated operations for one line of `length` pixels.
    fn operations(
        &self,
        length: usize,
        tensor_elements: usize,
        pixels: usize,
        runs: usize,
    ) -> usize {
        length * tensor_elements * pixels + length * (2 * pixels + runs) + length * pixels
    }

    /// Called once before any line with the number of workers that will call the filter.
    fn set_number_of_threads(&mut self, threads: usize) -> Result<()> {
        let _ = threads;
        Ok(())
    }
}

/// Apply a neighborhood filter to `input`, writing `output` of the same sizes.
///
/// The input is copied into a buffer extended by the reach of the kernel, so `output` may be
/// `input` itself.
pub fn full<F: FullLineFilter>(
    input: &Image,
    output: &mut Image,
    spec: &FullSpec,
    filter: &mut F,
) -> Result<()> {
    input.check_forged()?;
    let dims = input.dimensionality();
    if dims == 0 {
        return Err(Error::parameter(messages::ILLEGAL_DIMENSION));
    }
    if spec.kernel.dimensionality() != dims {
        return Err(Error::parameter(messages::DIMENSIONALITIES_DONT_MATCH));
    }

    let conditions = BoundaryCondition::array(&spec.conditions, dims)?;
    let expanded_count = conditions
        .iter()
        .filter(|&&condition| condition == BoundaryCondition::AlreadyExpanded)
        .count();
    if expanded_count != 0 && expanded_count != dims {
        return Err(Error::parameter(
            "an already expanded border cannot be mixed with other boundary conditions",
        ));
    }
    let expanded =
        spec.options.contains(FullOptions::BORDER_ALREADY_EXPANDED) || expanded_count == dims;

    let as_scalar = spec.options.contains(FullOptions::AS_SCALAR_IMAGE) && !input.is_scalar();
    let tensor = match spec.output_tensor_elements {
        Some(elements) if !as_scalar && elements != input.tensor_elements() => {
            Tensor::vector(elements)
        }
        _ => input.tensor(),
    };
    prepare_output(output, input.sizes(), tensor, spec.output_type)?;

    let mut table = spec.kernel.clone();
    let dim = optimal_processing_dim_with_kernel(input, table.sizes());
    table.set_processing_dimension(dim)?;
    let border = reach(&table);

    let planes: Vec<(Image, Image)> = if as_scalar {
        (0..input.tensor_elements())
            .map(|element| Ok((input.tensor_element(element)?, output.tensor_element(element)?)))
            .collect::<Result<_>>()?
    } else {
        vec![(input.clone(), output.clone())]
    };

    let plan = LinePlan::new(input.sizes(), dim);
    let lines = plan.count();
    let length = plan.line_length();
    let input_tensor = planes[0].0.tensor_elements();
    let output_tensor = planes[0].1.tensor_elements();
    let operations = filter
        .operations(length, input_tensor, table.number_of_pixels(), table.runs().len())
        .saturating_mul(lines)
        .saturating_mul(planes.len());
    let threads = plan_threads(
        spec.threads,
        spec.options.contains(FullOptions::NO_MULTITHREADING),
        lines,
        operations,
    );
    filter.set_number_of_threads(threads)?;
    let filter = &*filter;
    let pool = pool(threads)?;
    let batch = batch_size(threads, length * output_tensor * F::Output::DATA_TYPE.size_of());
    log::debug!(
        "full filter along dimension {dim}, border {border:?}, {} planes",
        planes.len()
    );

    for (source, target) in planes {
        let extended = if expanded {
            source.grow_view(&border)?
        } else {
            extend_image(&source, &border, &conditions, ExtendImageOptions::empty())?
        };
        let samples: Vec<F::Input> = extended.to_vec()?;
        let (strides, _) = normal_strides(extended.sizes(), input_tensor)?;
        let offsets = table.prepare_strides(&strides)?;
        let target_geometry = Geometry::of(&target)?;

        let mut first = 0;
        while first < lines {
            let last = lines.min(first + batch);
            let results = run_lines(pool.as_deref(), first..last, |index, thread| {
                let (start, length) = plan.line(index);
                let offset: isize = start
                    .iter()
                    .zip(&border)
                    .zip(&strides)
                    .map(|((&coordinate, &border), &stride)| (coordinate + border) as isize * stride)
                    .sum();
                let mut output = LineBuffer::new(length, output_tensor, 0);
                filter.filter(&mut FullLine {
                    input: FullInput {
                        samples: &samples,
                        start: offset as usize,
                        stride: strides[dim],
                        tensor_elements: input_tensor,
                    },
                    output: &mut output,
                    table: &offsets,
                    dimension: dim,
                    position: &start,
                    line: index,
                    thread,
                })?;
                Ok((start, output))
            })?;

            let mut locks = WriteLocks::new(&[&target])?;
            for (start, line) in results {
                target_geometry.scatter(locks.bytes_mut(0), &start, dim, &line)?;
            }
            first = last;
        }
    }

    Ok(())
}

/// How far the neighborhood reaches from its origin along each dimension.
fn reach(table: &PixelTable) -> Vec<usize> {
    let mut border = vec![0; table.dimensionality()];
    for coordinates in table.coordinates() {
        for (border, coordinate) in border.iter_mut().zip(coordinates) {
            *border = (*border).max(coordinate.unsigned_abs());
        }
    }
    border
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_table::{window_sum_brute_force, PixelTableShape};

    /// Sums the neighborhood, sliding along the line.
    struct WindowSum;

    impl FullLineFilter for WindowSum {
        type Input = f64;
        type Output = f64;

        fn filter(&self, line: &mut FullLine<'_, f64, f64>) -> Result<()> {
            let (input, table) = (line.input, line.table);
            let stride = input.stride();
            for element in 0..line.output.tensor_elements() {
                let mut sum: f64 = table
                    .offsets()
                    .iter()
                    .map(|&offset| input.at(0, offset, element))
                    .sum();
                for pixel in 0..line.output.len() {
                    if pixel > 0 {
                        for run in table.runs() {
                            let entering = run.offset + run.length as isize * stride;
                            sum += input.at(pixel - 1, entering, element)
                                - input.at(pixel - 1, run.offset, element);
                        }
                    }
                    line.output.pixel_mut(pixel)[element] = sum;
                }
            }
            Ok(())
        }
    }

    fn pattern(sizes: &[usize], tensor: usize) -> Image {
        let count = sizes.iter().product::<usize>() * tensor;
        let values: Vec<i16> = (0..count).map(|v| ((v * 37) % 23) as i16 - 11).collect();
        Image::from_vec(sizes, tensor, &values).unwrap()
    }

    #[test]
    fn sliding_sum_matches_brute_force() {
        let input = pattern(&[9, 7], 1);
        let kernel = PixelTable::new(PixelTableShape::Elliptic, &[5.0, 3.0], 0).unwrap();
        for condition in [BoundaryCondition::SymmetricMirror, BoundaryCondition::AddZeros] {
            let mut output = Image::default();
            let spec = FullSpec::new(kernel.clone(), DataType::DFloat).with_conditions(&[condition]);
            full(&input, &mut output, &spec, &mut WindowSum).unwrap();
            let expected = window_sum_brute_force(&input, &kernel, &[condition]).unwrap();
            assert_eq!(output.to_vec::<f64>().unwrap(), expected.to_vec::<f64>().unwrap());
        }
    }

    #[test]
    fn border_already_in_the_buffer() {
        let input = pattern(&[6, 5], 1);
        let kernel = PixelTable::new(PixelTableShape::Rectangular, &[3.0, 3.0], 0).unwrap();
        let masked = extend_image(
            &input,
            &[1],
            &[BoundaryCondition::Periodic],
            ExtendImageOptions::MASKED,
        )
        .unwrap();

        let mut direct = Image::default();
        let spec = FullSpec::new(kernel.clone(), DataType::SInt32)
            .with_conditions(&[BoundaryCondition::Periodic]);
        full(&input, &mut direct, &spec, &mut WindowSum).unwrap();

        let mut reused = Image::default();
        let spec = FullSpec::new(kernel, DataType::SInt32)
            .with_conditions(&[BoundaryCondition::AlreadyExpanded]);
        full(&masked, &mut reused, &spec, &mut WindowSum).unwrap();
        assert_eq!(direct.to_vec::<i32>().unwrap(), reused.to_vec::<i32>().unwrap());

        let mixed = spec.clone().with_conditions(&[
            BoundaryCondition::AlreadyExpanded,
            BoundaryCondition::AddZeros,
        ]);
        assert!(full(&masked, &mut reused, &mixed, &mut WindowSum).is_err());
        // The unextended input has no margin to read.
        assert!(full(&input, &mut reused, &spec, &mut WindowSum).is_err());
    }

    #[test]
    fn tensor_planes_and_in_place() {
        let input = pattern(&[5, 4], 2);
        let kernel = PixelTable::new(PixelTableShape::Diamond, &[3.0, 3.0], 0).unwrap();
        let spec = FullSpec::new(kernel.clone(), DataType::DFloat)
            .with_options(FullOptions::AS_SCALAR_IMAGE)
            .with_threads(Threads::Single);

        let mut output = Image::default();
        full(&input, &mut output, &spec, &mut WindowSum).unwrap();
        let expected = window_sum_brute_force(&input, &kernel, &[]).unwrap();
        assert_eq!(output.tensor_elements(), 2);
        assert_eq!(output.to_vec::<f64>().unwrap(), expected.to_vec::<f64>().unwrap());

        let mut image = input.converted(DataType::DFloat).unwrap();
        let view = image.clone();
        full(&view, &mut image, &spec, &mut WindowSum).unwrap();
        assert_eq!(image.to_vec::<f64>().unwrap(), expected.to_vec::<f64>().unwrap());
    }

    #[test]
    fn kernel_reach() {
        let mut table = PixelTable::new(PixelTableShape::Rectangular, &[5.0, 1.0], 0).unwrap();
        assert_eq!(reach(&table), vec![2, 0]);
        table.shift_origin(&[-1, 0]).unwrap();
        assert_eq!(reach(&table), vec![3, 0]);
    }
}
