//! Filters applied along one dimension at a time.
use std::slice;

use ndimage_texel::{DataType, Sample, Saturated};

use super::{
    batch_size, plan_threads, pool, prepare_output, run_lines, separate_inputs, Geometry,
    LineBuffer, LinePlan, ReadLocks, Threads, WriteLocks,
};
use crate::boundary::{expand_line, BoundaryCondition};
use crate::error::{messages, Error, Result};
use crate::image::Image;

option_set! {
    /// Options of [`separable`].
    pub struct SeparableOptions {
        /// Stay on the calling thread.
        const NO_MULTITHREADING = 0;
        /// Filter each tensor element as a scalar image.
        const AS_SCALAR_IMAGE = 1;
        /// Keep intermediate passes in the output image when it has the sample type of the
        /// filter, instead of a temporary image.
        const CAN_WORK_IN_PLACE = 2;
    }
}

/// How [`separable`] walks the image.
#[derive(Clone, Debug)]
pub struct SeparableSpec {
    pub output_type: DataType,
    /// The dimensions to filter along. Empty means all of them. Dimensions of size 1 are always
    /// skipped.
    pub process: Vec<bool>,
    /// The pixels of extended context the filter needs on each side of a line, one per
    /// dimension or one for all of them.
    pub border: Vec<usize>,
    /// How the border is filled, see [`BoundaryCondition::array`].
    pub conditions: Vec<BoundaryCondition>,
    pub options: SeparableOptions,
    pub threads: Threads,
}

impl SeparableSpec {
    pub fn new(output_type: DataType) -> Self {
        SeparableSpec {
            output_type,
            process: Vec::new(),
            border: Vec::new(),
            conditions: Vec::new(),
            options: SeparableOptions::empty(),
            threads: Threads::Global,
        }
    }

    pub fn with_process(mut self, process: &[bool]) -> Self {
        self.process = process.to_vec();
        self
    }

    pub fn with_border(mut self, border: &[usize]) -> Self {
        self.border = border.to_vec();
        self
    }

    pub fn with_conditions(mut self, conditions: &[BoundaryCondition]) -> Self {
        self.conditions = conditions.to_vec();
        self
    }

    pub fn with_options(mut self, options: SeparableOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_threads(mut self, threads: Threads) -> Self {
        self.threads = threads;
        self
    }
}

/// One line handed to a [`SeparableLineFilter`].
#[derive(Debug)]
pub struct SeparableLine<'a, T> {
    /// The line with its border filled in.
    pub input: &'a LineBuffer<T>,
    /// The same number of pixels as the input, without border.
    pub output: &'a mut LineBuffer<T>,
    /// The dimension the line runs along.
    pub dimension: usize,
    /// The index of this pass among `passes`.
    pub pass: usize,
    pub passes: usize,
    /// The coordinates of the first pixel.
    pub position: &'a [usize],
    /// The number of the line within its pass.
    pub line: usize,
    pub thread: usize,
}

/// A filter applied by [`separable`], once per dimension.
pub trait SeparableLineFilter: Sync {
    /// The sample type of the line buffers, and of intermediate results between passes.
    type Buffer: Saturated;

    fn filter(&self, line: &mut SeparableLine<'_, Self::Buffer>) -> Result<()>;

    /// Estimated operations for one line.
    fn operations(
        &self,
        length: usize,
        tensor_elements: usize,
        border: usize,
        dimension: usize,
    ) -> usize {
        let _ = dimension;
        length * tensor_elements * 2 * (2 * border + 1)
    }

    /// Called once before any line with the number of workers that will call the filter.
    fn set_number_of_threads(&mut self, threads: usize) -> Result<()> {
        let _ = threads;
        Ok(())
    }
}

/// Apply a filter along each processed dimension of `input` in turn, writing `output`.
///
/// The first pass reads the input, the last one writes the output. Passes in between work on
/// an image of the filter's sample type. The output has the sizes and tensor of the input.
pub fn separable<F: SeparableLineFilter>(
    input: &Image,
    output: &mut Image,
    spec: &SeparableSpec,
    filter: &mut F,
) -> Result<()> {
    input.check_forged()?;
    let dims = input.dimensionality();
    let mut process = match spec.process.len() {
        0 => vec![true; dims],
        n if n == dims => spec.process.clone(),
        _ => return Err(Error::parameter(messages::ARRAY_SIZES_DONT_MATCH)),
    };
    let mut border = match spec.border.len() {
        0 => vec![0; dims],
        1 => vec![spec.border[0]; dims],
        n if n == dims => spec.border.clone(),
        _ => return Err(Error::parameter(messages::ARRAY_SIZES_DONT_MATCH)),
    };
    let mut conditions = BoundaryCondition::array(&spec.conditions, dims)?;

    prepare_output(output, input.sizes(), input.tensor(), spec.output_type)?;

    let mut source = input.clone();
    let mut target = output.clone();
    if spec.options.contains(SeparableOptions::AS_SCALAR_IMAGE) && !input.is_scalar() {
        source = source.tensor_to_spatial(dims)?;
        target = target.tensor_to_spatial(dims)?;
        process.push(false);
        border.push(0);
        conditions.push(BoundaryCondition::default());
    }

    let sizes = source.sizes().to_vec();
    let order: Vec<usize> = (0..sizes.len())
        .filter(|&dim| process[dim] && sizes[dim] > 1)
        .collect();
    if order.is_empty() {
        log::debug!("no dimension to filter along, copying");
        return target.copy_from(&source);
    }

    let mut sources = vec![source];
    separate_inputs(&mut sources, &[&target], true)?;
    let [source] = <[Image; 1]>::try_from(sources)
        .map_err(|_| Error::internal("separable framework lost its input"))?;

    let tensor = source.tensor_elements();
    let buffer_type = <F::Buffer as Sample>::DATA_TYPE;
    let in_place = spec.options.contains(SeparableOptions::CAN_WORK_IN_PLACE)
        && target.data_type() == buffer_type
        && target.has_valid_strides();
    let work = if in_place || order.len() == 1 {
        target.clone()
    } else {
        Image::new(&sizes, tensor, buffer_type)?
    };

    let plans: Vec<LinePlan> = order.iter().map(|&dim| LinePlan::new(&sizes, dim)).collect();
    let operations = plans
        .iter()
        .map(|plan| {
            let line = filter.operations(plan.line_length(), tensor, border[plan.dim], plan.dim);
            line.saturating_mul(plan.count())
        })
        .fold(0usize, usize::saturating_add);
    let lines = plans.iter().map(LinePlan::count).max().unwrap_or(0);
    let threads = plan_threads(
        spec.threads,
        spec.options.contains(SeparableOptions::NO_MULTITHREADING),
        lines,
        operations,
    );
    filter.set_number_of_threads(threads)?;
    let pool = pool(threads)?;
    log::debug!("separable passes along {order:?}, in place: {in_place}");

    let passes = order.len();
    for (pass, plan) in plans.iter().enumerate() {
        let from = if pass == 0 { &source } else { &work };
        let to = if pass + 1 == passes { &target } else { &work };
        let walk = Pass {
            plan,
            border: border[plan.dim],
            condition: conditions[plan.dim],
            pass,
            passes,
        };
        walk.run(&*filter, from, to, threads, pool.as_deref())?;
    }

    Ok(())
}

/// One walk over the lines along a dimension.
struct Pass<'a> {
    plan: &'a LinePlan,
    border: usize,
    condition: BoundaryCondition,
    pass: usize,
    passes: usize,
}

impl Pass<'_> {
    fn run<F: SeparableLineFilter>(
        &self,
        filter: &F,
        from: &Image,
        to: &Image,
        threads: usize,
        pool: Option<&rayon::ThreadPool>,
    ) -> Result<()> {
        let source = Geometry::of(from)?;
        let target = Geometry::of(to)?;
        let (dim, border) = (self.plan.dim, self.border);
        let tensor = source.tensor_elements();

        let length = self.plan.line_length();
        let line_bytes = (2 * length + 2 * border) * tensor * <F::Buffer as Sample>::DATA_TYPE.size_of();
        let batch = batch_size(threads, line_bytes);
        let lines = self.plan.count();

        let mut first = 0;
        while first < lines {
            let last = lines.min(first + batch);
            let results = {
                let locks = ReadLocks::new(slice::from_ref(from))?;
                run_lines(pool, first..last, |index, thread| {
                    let (start, length) = self.plan.line(index);
                    let mut input =
                        source.gather::<F::Buffer>(locks.bytes(0), &start, dim, length, border)?;
                    if border > 0 {
                        expand_line(input.with_border_mut(), tensor, length, border, self.condition)?;
                    }
                    let mut output = LineBuffer::new(length, tensor, 0);
                    filter.filter(&mut SeparableLine {
                        input: &input,
                        output: &mut output,
                        dimension: dim,
                        pass: self.pass,
                        passes: self.passes,
                        position: &start,
                        line: index,
                        thread,
                    })?;
                    Ok((start, output))
                })?
            };

            let mut locks = WriteLocks::new(&[to])?;
            for (start, line) in results {
                target.scatter(locks.bytes_mut(0), &start, dim, &line)?;
            }
            first = last;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::Range;

    /// Correlation with an odd number of weights, the border is half of them.
    struct Weights(Vec<f64>);

    impl SeparableLineFilter for Weights {
        type Buffer = f64;

        fn filter(&self, line: &mut SeparableLine<'_, f64>) -> Result<()> {
            let input = line.input;
            let tensor = input.tensor_elements();
            let samples = input.with_border();
            for pixel in 0..line.output.len() {
                for (element, value) in line.output.pixel_mut(pixel).iter_mut().enumerate() {
                    *value = self
                        .0
                        .iter()
                        .enumerate()
                        .map(|(tap, weight)| weight * samples[(pixel + tap) * tensor + element])
                        .sum();
                }
            }
            Ok(())
        }
    }

    fn mirrored_sum(values: &[f64], index: usize) -> f64 {
        let last = values.len() - 1;
        let left = if index == 0 { values[0] } else { values[index - 1] };
        let right = if index == last { values[last] } else { values[index + 1] };
        left + values[index] + right
    }

    #[test]
    fn box_sum_along_every_dimension() {
        let values: Vec<f64> = (0..12).map(|v| (v * v) as f64).collect();
        let input = Image::from_vec(&[4, 3], 1, &values).unwrap();
        let mut output = Image::default();
        let spec = SeparableSpec::new(DataType::DFloat).with_border(&[1]);
        separable(&input, &mut output, &spec, &mut Weights(vec![1.0; 3])).unwrap();

        // Rows first, then columns, each with a mirrored edge.
        let rows: Vec<f64> = (0..12)
            .map(|i| mirrored_sum(&values[i / 4 * 4..i / 4 * 4 + 4], i % 4))
            .collect();
        for x in 0..4 {
            let column: Vec<f64> = (0..3).map(|y| rows[x + 4 * y]).collect();
            for y in 0..3 {
                assert_eq!(output.sample::<f64>(&[x, y], 0).unwrap(), mirrored_sum(&column, y));
            }
        }
    }

    #[test]
    fn process_mask_and_in_place() {
        let input = Image::from_vec(&[3, 2], 1, &[1u8, 2, 3, 10, 20, 30]).unwrap();
        let mut output = Image::default();
        let spec = SeparableSpec::new(DataType::UInt8)
            .with_process(&[true, false])
            .with_border(&[1, 0])
            .with_conditions(&[BoundaryCondition::AddZeros])
            .with_options(SeparableOptions::CAN_WORK_IN_PLACE);
        separable(&input, &mut output, &spec, &mut Weights(vec![1.0, 1.0, 1.0])).unwrap();
        assert_eq!(output.to_vec::<u8>().unwrap(), vec![3, 6, 5, 30, 60, 50]);

        // The input itself as output.
        let mut image = input.copy().unwrap();
        let view = image.clone();
        separable(&view, &mut image, &spec, &mut Weights(vec![1.0, 1.0, 1.0])).unwrap();
        assert_eq!(image.to_vec::<u8>().unwrap(), output.to_vec::<u8>().unwrap());
    }

    #[test]
    fn passes_keep_intermediate_precision() {
        let input = Image::from_vec(&[2, 2], 1, &[1u8, 2, 3, 4]).unwrap();
        let mut halves = Image::default();
        let mut in_place = Image::default();
        let halve = SeparableSpec::new(DataType::UInt8).with_border(&[0]);
        separable(&input, &mut halves, &halve, &mut Weights(vec![0.5])).unwrap();
        // 1 / 4 rounds to 0 only once at the end.
        assert_eq!(halves.to_vec::<u8>().unwrap(), vec![0, 1, 1, 1]);

        let options = SeparableOptions::CAN_WORK_IN_PLACE;
        separable(&input, &mut in_place, &halve.clone().with_options(options), &mut Weights(vec![0.5]))
            .unwrap();
        // The output is not of the buffer type, so passes still go through a temporary.
        assert_eq!(in_place.to_vec::<u8>().unwrap(), halves.to_vec::<u8>().unwrap());
    }

    #[test]
    fn tensor_elements_as_scalars() {
        let input = Image::from_vec(&[3], 2, &[1.0f32, 10.0, 2.0, 20.0, 3.0, 30.0]).unwrap();
        let mut output = Image::default();
        let spec = SeparableSpec::new(DataType::SFloat)
            .with_border(&[1])
            .with_conditions(&[BoundaryCondition::Periodic])
            .with_options(SeparableOptions::AS_SCALAR_IMAGE);
        separable(&input, &mut output, &spec, &mut Weights(vec![1.0, 0.0, 0.0])).unwrap();
        assert_eq!(output.tensor_elements(), 2);
        assert_eq!(output.to_vec::<f32>().unwrap(), vec![3.0, 30.0, 1.0, 10.0, 2.0, 20.0]);

        let strided = input.at_ranges(&[Range::with_step(0, -1, 2)]).unwrap();
        let mut short = Image::default();
        separable(&strided, &mut short, &spec, &mut Weights(vec![1.0, 0.0, 0.0])).unwrap();
        assert_eq!(short.to_vec::<f32>().unwrap(), vec![3.0, 30.0, 1.0, 10.0]);
    }

    #[test]
    fn mismatched_arrays() {
        let input = Image::new(&[4, 4], 1, DataType::UInt8).unwrap();
        let mut output = Image::default();
        let spec = SeparableSpec::new(DataType::UInt8).with_border(&[1, 1, 1]);
        let err = separable(&input, &mut output, &spec, &mut Weights(vec![1.0; 3])).unwrap_err();
        assert_eq!(err.message(), messages::ARRAY_SIZES_DONT_MATCH);
    }
}
