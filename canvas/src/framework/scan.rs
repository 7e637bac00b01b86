//! Pixel-wise processing of any number of inputs into any number of outputs.
use std::marker::PhantomData;

use ndimage_texel::{DataType, Sample};

use super::{
    batch_size, optimal_processing_dim, plan_threads, pool, prepare_output, run_lines,
    separate_inputs, singleton_expand, singleton_expanded_sizes, Geometry, LineBuffer, LinePlan,
    ReadLocks, Threads, WriteLocks,
};
use crate::error::{messages, Error, Result};
use crate::image::Image;
use crate::tensor::Tensor;

/// Lines of images whose pixels are evenly spaced are cut into pieces of this many pixels.
const FLAT_SEGMENT: usize = 4096;

option_set! {
    /// Options of [`scan`].
    pub struct ScanOptions {
        /// Stay on the calling thread.
        const NO_MULTITHREADING = 0;
        /// Walk the tensor elements as one more spatial dimension. Line buffers hold scalar
        /// pixels, and inputs with a single tensor element are broadcast to the others.
        const TENSOR_AS_SPATIAL = 1;
        /// Inputs must have the same sizes, no dimension is broadcast.
        const NO_SINGLETON_EXPANSION = 2;
        /// Never write an output over the samples of an input, copy the input instead.
        const NOT_IN_PLACE = 3;
        /// Process each tensor element as a scalar image. Works like `TENSOR_AS_SPATIAL`.
        const AS_SCALAR_IMAGE = 4;
        /// The filter uses [`ScanLine::position`], lines must follow image dimensions.
        const NEED_COORDINATES = 5;
    }
}

/// What [`scan`] produces.
#[derive(Clone, Debug, Default)]
pub struct ScanSpec {
    /// The type of each output image.
    pub output_types: Vec<DataType>,
    /// The tensor elements of each output image. Empty gives every output the tensor of the
    /// input with the most elements. Ignored when the tensor is walked as a dimension.
    pub output_tensor_elements: Vec<usize>,
    pub options: ScanOptions,
    pub threads: Threads,
}

impl ScanSpec {
    pub fn new(output_types: &[DataType], output_tensor_elements: &[usize]) -> Self {
        ScanSpec {
            output_types: output_types.to_vec(),
            output_tensor_elements: output_tensor_elements.to_vec(),
            ..ScanSpec::default()
        }
    }

    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_threads(mut self, threads: Threads) -> Self {
        self.threads = threads;
        self
    }
}

/// One line handed to a [`ScanLineFilter`].
///
/// All buffers have the same length, the pixel at index `i` of each of them belongs to the same
/// image coordinates.
#[derive(Debug)]
pub struct ScanLine<'a, I, O> {
    pub inputs: &'a [LineBuffer<I>],
    pub outputs: &'a mut [LineBuffer<O>],
    /// The dimension the line runs along.
    pub dimension: usize,
    /// The coordinates of the first pixel.
    pub position: &'a [usize],
    /// The number of the line, the same for any number of threads.
    pub line: usize,
    /// The worker processing the line, below the count given to
    /// [`ScanLineFilter::set_number_of_threads`].
    pub thread: usize,
}

impl<I: Sample, O: Sample> ScanLine<'_, I, O> {
    /// The number of pixels in the line.
    pub fn len(&self) -> usize {
        match self.inputs.first() {
            Some(input) => input.len(),
            None => self.outputs.first().map_or(0, LineBuffer::len),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A filter applied by [`scan`].
///
/// The filter is shared by all workers. State that changes per line must be kept per
/// [`ScanLine::thread`], sized in [`ScanLineFilter::set_number_of_threads`].
pub trait ScanLineFilter: Sync {
    /// The sample type inputs are converted to.
    type Input: Sample;
    /// The sample type outputs are produced in, converted to the output image type on write.
    type Output: Sample;

    fn filter(&self, line: &mut ScanLine<'_, Self::Input, Self::Output>) -> Result<()>;

    /// Estimated operations per pixel, for deciding whether to use threads.
    fn operations(&self, inputs: usize, outputs: usize, tensor_elements: usize) -> usize {
        inputs.max(outputs) * tensor_elements
    }

    /// Called once before any line with the number of workers that will call the filter.
    fn set_number_of_threads(&mut self, threads: usize) -> Result<()> {
        let _ = threads;
        Ok(())
    }
}

/// A scan filter from a function of the samples of all inputs at one pixel and tensor element.
///
/// Produces exactly one output. Inputs with a single tensor element are applied to every
/// element of the output.
pub struct VariadicScanLineFilter<T, F> {
    function: F,
    cost: usize,
    sample: PhantomData<fn() -> T>,
}

impl<T, F> VariadicScanLineFilter<T, F>
where
    T: Sample,
    F: Fn(&[T]) -> T + Sync,
{
    pub fn new(function: F) -> Self {
        VariadicScanLineFilter {
            function,
            cost: 1,
            sample: PhantomData,
        }
    }

    /// Set the estimated cost of one call of the function.
    pub fn with_operations(mut self, cost: usize) -> Self {
        self.cost = cost;
        self
    }
}

impl<T, F> ScanLineFilter for VariadicScanLineFilter<T, F>
where
    T: Sample,
    F: Fn(&[T]) -> T + Sync,
{
    type Input = T;
    type Output = T;

    fn filter(&self, line: &mut ScanLine<'_, T, T>) -> Result<()> {
        let inputs = line.inputs;
        let [output] = &mut *line.outputs else {
            return Err(Error::parameter(messages::ARRAY_SIZES_DONT_MATCH));
        };

        let mut arguments = vec![T::default(); inputs.len()];
        for pixel in 0..output.len() {
            let values = output.pixel_mut(pixel);
            for (element, value) in values.iter_mut().enumerate() {
                for (argument, input) in arguments.iter_mut().zip(inputs) {
                    let samples = input.pixel(pixel);
                    *argument = samples[element.min(samples.len() - 1)];
                }
                *value = (self.function)(&arguments);
            }
        }
        Ok(())
    }

    fn operations(&self, _: usize, _: usize, tensor_elements: usize) -> usize {
        self.cost * tensor_elements
    }
}

/// Apply a pixel-wise filter to `inputs`, writing `outputs`.
///
/// Inputs are broadcast to common sizes, see [`ScanOptions::NO_SINGLETON_EXPANSION`]. Outputs
/// are forged to those sizes with the types and tensors of `spec`. Without inputs the first
/// output must be forged and gives the sizes.
///
/// An output may be one of the inputs, it is then written in place.
pub fn scan<F: ScanLineFilter>(
    inputs: &[&Image],
    outputs: &mut [&mut Image],
    spec: &ScanSpec,
    filter: &mut F,
) -> Result<()> {
    let options = spec.options;
    if spec.output_types.len() != outputs.len()
        || !(spec.output_tensor_elements.is_empty()
            || spec.output_tensor_elements.len() == outputs.len())
    {
        return Err(Error::parameter(messages::ARRAY_SIZES_DONT_MATCH));
    }
    for input in inputs {
        input.check_forged()?;
    }

    let sizes = match inputs.first() {
        None => match outputs.first() {
            Some(output) => {
                output.check_forged()?;
                output.sizes().to_vec()
            }
            None => return Ok(()),
        },
        Some(first) if options.contains(ScanOptions::NO_SINGLETON_EXPANSION) => {
            if inputs.iter().any(|input| input.sizes() != first.sizes()) {
                return Err(Error::parameter(messages::SIZES_DONT_MATCH));
            }
            first.sizes().to_vec()
        }
        Some(_) => singleton_expanded_sizes(inputs)?,
    };

    let widest = inputs.iter().max_by_key(|input| input.tensor_elements());
    let as_spatial = options.contains(ScanOptions::TENSOR_AS_SPATIAL)
        || options.contains(ScanOptions::AS_SCALAR_IMAGE);

    let mut input_views = Vec::with_capacity(inputs.len());
    for input in inputs {
        input_views.push(singleton_expand(input, &sizes)?);
    }

    let mut spatial = None;
    let output_tensors: Vec<Tensor> = if as_spatial {
        let elements = widest.map_or(1, |input| input.tensor_elements());
        for view in &mut input_views {
            if view.tensor_elements() == elements {
                continue;
            }
            if view.tensor_elements() != 1 || options.contains(ScanOptions::NO_SINGLETON_EXPANSION)
            {
                return Err(Error::parameter(messages::TENSOR_ELEMENTS_DONT_MATCH));
            }
            *view = view.expand_singleton_tensor(elements)?;
        }
        let tensor = match (widest, outputs.first()) {
            (Some(input), _) => input.tensor(),
            (None, Some(output)) => output.tensor(),
            (None, None) => Tensor::scalar(),
        };
        spatial = Some(tensor.elements());
        vec![tensor; outputs.len()]
    } else {
        (0..outputs.len())
            .map(|index| {
                let elements = match spec.output_tensor_elements.get(index) {
                    Some(&elements) => elements,
                    None => widest.map_or(outputs[index].tensor_elements(), |input| {
                        input.tensor_elements()
                    }),
                };
                match widest {
                    Some(input) if input.tensor_elements() == elements => input.tensor(),
                    _ => Tensor::vector(elements),
                }
            })
            .collect()
    };

    for ((output, tensor), &data_type) in outputs.iter_mut().zip(&output_tensors).zip(&spec.output_types) {
        prepare_output(output, &sizes, *tensor, data_type)?;
    }

    let mut output_views: Vec<Image> = outputs.iter().map(|output| (**output).clone()).collect();
    let mut sizes = sizes;
    if let Some(elements) = spatial {
        let dim = sizes.len();
        for view in input_views.iter_mut().chain(&mut output_views) {
            *view = view.tensor_to_spatial(dim)?;
        }
        sizes.push(elements);
    }
    if sizes.is_empty() {
        sizes.push(1);
        for view in input_views.iter_mut().chain(&mut output_views) {
            *view = view.expand_dimensionality(1)?;
        }
    }

    {
        let written: Vec<&Image> = output_views.iter().collect();
        let in_place = !options.contains(ScanOptions::NOT_IN_PLACE);
        separate_inputs(&mut input_views, &written, in_place)?;
    }

    let plan = match flattened(&input_views, &output_views, options)? {
        Some((inputs, outputs)) => {
            input_views = inputs;
            output_views = outputs;
            let pixels = input_views
                .first()
                .or(output_views.first())
                .map_or(1, Image::number_of_pixels);
            log::debug!("scanning {pixels} evenly spaced pixels in pieces of {FLAT_SEGMENT}");
            LinePlan {
                sizes: vec![pixels],
                dim: 0,
                segment: FLAT_SEGMENT,
            }
        }
        None => {
            let first = input_views.first().or(output_views.first());
            let dim = first.map_or(0, optimal_processing_dim);
            log::debug!("scanning along dimension {dim} of {sizes:?}");
            LinePlan::new(&sizes, dim)
        }
    };

    let input_geometry: Vec<Geometry> = input_views.iter().map(Geometry::of).collect::<Result<_>>()?;
    let output_geometry: Vec<Geometry> = output_views.iter().map(Geometry::of).collect::<Result<_>>()?;

    let buffer_elements = |geometry: &Geometry| if as_spatial { 1 } else { geometry.tensor_elements() };
    let tensor = input_geometry
        .iter()
        .chain(&output_geometry)
        .map(buffer_elements)
        .max()
        .unwrap_or(1);
    let lines = plan.count();
    let length = plan.line_length();
    let operations = filter
        .operations(inputs.len(), outputs.len(), tensor)
        .saturating_mul(lines)
        .saturating_mul(length);
    let threads = plan_threads(
        spec.threads,
        options.contains(ScanOptions::NO_MULTITHREADING),
        lines,
        operations,
    );
    filter.set_number_of_threads(threads)?;
    let filter = &*filter;

    let line_bytes = length
        * (input_geometry.iter().map(buffer_elements).sum::<usize>() * F::Input::DATA_TYPE.size_of()
            + output_geometry.iter().map(buffer_elements).sum::<usize>()
                * F::Output::DATA_TYPE.size_of());
    let batch = batch_size(threads, line_bytes);
    let pool = pool(threads)?;
    let dim = plan.dim;

    let mut first = 0;
    while first < lines {
        let last = lines.min(first + batch);
        let results = {
            let locks = ReadLocks::new(&input_views)?;
            run_lines(pool.as_deref(), first..last, |index, thread| {
                let (start, length) = plan.line(index);
                let input_lines = input_geometry
                    .iter()
                    .enumerate()
                    .map(|(image, geometry)| {
                        geometry.gather::<F::Input>(locks.bytes(image), &start, dim, length, 0)
                    })
                    .collect::<Result<Vec<_>>>()?;
                let mut output_lines: Vec<LineBuffer<F::Output>> = output_geometry
                    .iter()
                    .map(|geometry| LineBuffer::new(length, geometry.tensor_elements(), 0))
                    .collect();

                filter.filter(&mut ScanLine {
                    inputs: &input_lines,
                    outputs: &mut output_lines,
                    dimension: dim,
                    position: &start,
                    line: index,
                    thread,
                })?;
                Ok((start, output_lines))
            })?
        };

        let written: Vec<&Image> = output_views.iter().collect();
        let mut locks = WriteLocks::new(&written)?;
        for (start, output_lines) in results {
            for (image, (geometry, line)) in output_geometry.iter().zip(&output_lines).enumerate() {
                geometry.scatter(locks.bytes_mut(image), &start, dim, line)?;
            }
        }
        first = last;
    }

    Ok(())
}

/// One-dimensional views of all images, when their pixels are evenly spaced in the same order.
fn flattened(
    inputs: &[Image],
    outputs: &[Image],
    options: ScanOptions,
) -> Result<Option<(Vec<Image>, Vec<Image>)>> {
    let mut all = inputs.iter().chain(outputs);
    let Some(first) = all.next() else {
        return Ok(None);
    };
    if options.contains(ScanOptions::NEED_COORDINATES)
        || first.dimensionality() < 2
        || first.has_simple_stride().is_none()
    {
        return Ok(None);
    }

    let steps = |image: &Image| -> Vec<isize> {
        image
            .sizes()
            .iter()
            .zip(image.strides())
            .map(|(&size, &stride)| if size > 1 { stride } else { 0 })
            .collect()
    };
    let layout = steps(first);
    let matching = all.all(|image| image.has_simple_stride().is_some() && steps(image) == layout);
    if !matching {
        return Ok(None);
    }

    let flatten = |images: &[Image]| images.iter().map(Image::flatten).collect::<Result<Vec<_>>>();
    Ok(Some((flatten(inputs)?, flatten(outputs)?)))
}

/// Apply a filter to one input, producing one output with the tensor of the input.
pub fn scan_monadic<F: ScanLineFilter>(
    input: &Image,
    output: &mut Image,
    output_type: DataType,
    filter: &mut F,
    options: ScanOptions,
) -> Result<()> {
    let spec = ScanSpec::new(&[output_type], &[input.tensor_elements()]).with_options(options);
    scan(&[input], &mut [output], &spec, filter)
}

/// Apply a filter to two inputs, producing one output.
///
/// The inputs must have the same number of tensor elements, or one of them a single element
/// which is then applied to every element of the other.
pub fn scan_dyadic<F: ScanLineFilter>(
    lhs: &Image,
    rhs: &Image,
    output: &mut Image,
    output_type: DataType,
    filter: &mut F,
    mut options: ScanOptions,
) -> Result<()> {
    let (a, b) = (lhs.tensor_elements(), rhs.tensor_elements());
    if a != b {
        if a != 1 && b != 1 {
            return Err(Error::parameter(messages::TENSOR_ELEMENTS_DONT_MATCH));
        }
        options |= ScanOptions::TENSOR_AS_SPATIAL;
    }
    let spec = ScanSpec::new(&[output_type], &[a.max(b)]).with_options(options);
    scan(&[lhs, rhs], &mut [output], &spec, filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::Range;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Sum;

    impl ScanLineFilter for Sum {
        type Input = f64;
        type Output = f64;

        fn filter(&self, line: &mut ScanLine<'_, f64, f64>) -> Result<()> {
            let inputs = line.inputs;
            for (pixel, values) in line.outputs[0].pixels_mut().enumerate() {
                for (element, value) in values.iter_mut().enumerate() {
                    *value = inputs
                        .iter()
                        .map(|input| {
                            let samples = input.pixel(pixel);
                            samples[element.min(samples.len() - 1)]
                        })
                        .sum();
                }
            }
            Ok(())
        }
    }

    fn ramp(sizes: &[usize], tensor: usize) -> Image {
        let count = sizes.iter().product::<usize>() * tensor;
        let values: Vec<u16> = (0..count as u16).collect();
        Image::from_vec(sizes, tensor, &values).unwrap()
    }

    #[test]
    fn dyadic_broadcasts_singletons() {
        let column = ramp(&[1, 3], 1);
        let row = Image::from_vec(&[4], 1, &[10u8, 20, 30, 40]).unwrap();
        let mut output = Image::default();
        scan_dyadic(&column, &row, &mut output, DataType::UInt16, &mut Sum, ScanOptions::empty())
            .unwrap();

        assert_eq!(output.sizes(), &[4, 3]);
        assert_eq!(output.data_type(), DataType::UInt16);
        assert_eq!(output.sample::<u16>(&[2, 1], 0).unwrap(), 31);
        assert_eq!(output.sample::<u16>(&[3, 2], 0).unwrap(), 42);

        let wrong = Image::new(&[3], 1, DataType::UInt8).unwrap();
        let err = scan_dyadic(&wrong, &row, &mut output, DataType::UInt16, &mut Sum, ScanOptions::empty());
        assert_eq!(err.unwrap_err().message(), messages::SIZES_DONT_MATCH);
    }

    #[test]
    fn scalar_applies_to_every_tensor_element() {
        let color = ramp(&[2, 2], 3);
        let offset = Image::from_vec(&[2, 2], 1, &[100u8, 200, 0, 50]).unwrap();
        let mut output = Image::default();
        scan_dyadic(&color, &offset, &mut output, DataType::SInt32, &mut Sum, ScanOptions::empty())
            .unwrap();

        assert_eq!(output.tensor_elements(), 3);
        assert_eq!(output.to_vec::<i32>().unwrap()[..6], [100, 101, 102, 203, 204, 205]);
    }

    #[test]
    fn output_in_place_of_input() {
        let mut image = ramp(&[5, 4], 1);
        let view = image.clone();
        scan_monadic(&view, &mut image, DataType::UInt16, &mut Sum, ScanOptions::empty()).unwrap();
        assert!(image.shares_data(&view));
        assert_eq!(image.sample::<u16>(&[4, 3], 0).unwrap(), 19);
    }

    #[test]
    fn overlapping_views_are_copied_first() {
        // Write every pixel with the sum of itself and its mirror image.
        let image = ramp(&[6], 1);
        let mirrored = image.mirror(&[true]).unwrap();
        let mut output = image.clone();
        output.protect(true);
        let spec = ScanSpec::new(&[DataType::UInt16], &[1]).with_threads(Threads::Single);
        scan(&[&image, &mirrored], &mut [&mut output], &spec, &mut Sum).unwrap();
        assert_eq!(image.to_vec::<u16>().unwrap(), vec![5; 6]);

        let not_in_place = ScanSpec::new(&[DataType::UInt16], &[1]).with_options(ScanOptions::NOT_IN_PLACE);
        scan(&[&image], &mut [&mut output], &not_in_place, &mut Sum).unwrap();
        assert_eq!(output.to_vec::<u16>().unwrap(), vec![5; 6]);
    }

    #[test]
    fn protected_output_converts_on_write() {
        let input = Image::from_vec(&[3], 1, &[-1.5f64, 0.2, 300.0]).unwrap();
        let mut output = Image::new(&[3], 1, DataType::UInt8).unwrap();
        output.protect(true);
        scan_monadic(&input, &mut output, DataType::DFloat, &mut Sum, ScanOptions::empty()).unwrap();
        assert_eq!(output.data_type(), DataType::UInt8);
        assert_eq!(output.to_vec::<u8>().unwrap(), vec![0, 0, 255]);
    }

    #[test]
    fn strided_views_give_the_same_result() {
        let image = ramp(&[7, 5, 3], 1);
        let permuted = image.permute_dimensions(&[2, 0, 1]).unwrap();
        let mirrored = permuted.mirror(&[false, true, false]).unwrap();
        let sub = mirrored
            .at_ranges(&[Range::all(), Range::with_step(0, -1, 2), Range::all()])
            .unwrap();

        let mut direct = Image::default();
        let mut copied = Image::default();
        scan_monadic(&sub, &mut direct, DataType::UInt16, &mut Sum, ScanOptions::empty()).unwrap();
        scan_monadic(&sub.copy().unwrap(), &mut copied, DataType::UInt16, &mut Sum, ScanOptions::empty())
            .unwrap();
        assert_eq!(direct.to_vec::<u16>().unwrap(), sub.to_vec::<u16>().unwrap());
        assert_eq!(direct.to_vec::<u16>().unwrap(), copied.to_vec::<u16>().unwrap());
    }

    #[test]
    fn tensor_as_spatial_buffers_scalars() {
        struct Scalars(AtomicUsize);

        impl ScanLineFilter for Scalars {
            type Input = u8;
            type Output = u8;

            fn filter(&self, line: &mut ScanLine<'_, u8, u8>) -> Result<()> {
                assert_eq!(line.inputs[0].tensor_elements(), 1);
                self.0.fetch_add(line.len(), Ordering::Relaxed);
                let samples = line.inputs[0].samples();
                line.outputs[0].samples_mut().copy_from_slice(samples);
                Ok(())
            }
        }

        let color = ramp(&[4, 3], 3);
        let mut output = Image::default();
        let mut filter = Scalars(AtomicUsize::new(0));
        scan_monadic(&color, &mut output, DataType::UInt8, &mut filter, ScanOptions::TENSOR_AS_SPATIAL)
            .unwrap();
        assert_eq!(filter.0.into_inner(), 36);
        assert_eq!(output.tensor_elements(), 3);
        assert_eq!(output.to_vec::<u8>().unwrap(), color.to_vec::<u8>().unwrap());
    }

    #[test]
    fn variadic_function() {
        let a = ramp(&[3, 2], 1);
        let b = Image::from_vec(&[3, 2], 1, &[2.0f32; 6]).unwrap();
        let c = Image::from_vec(&[1], 1, &[0.5f64]).unwrap();
        let mut output = Image::default();
        let mut filter = VariadicScanLineFilter::new(|v: &[f64]| v[0] * v[1] + v[2]);
        let spec = ScanSpec::new(&[DataType::SFloat], &[1]);
        scan(&[&a, &b, &c], &mut [&mut output], &spec, &mut filter).unwrap();
        assert_eq!(output.to_vec::<f32>().unwrap(), vec![0.5, 2.5, 4.5, 6.5, 8.5, 10.5]);
    }

    #[test]
    fn errors_stop_the_scan() {
        struct Fails;

        impl ScanLineFilter for Fails {
            type Input = u8;
            type Output = u8;

            fn filter(&self, line: &mut ScanLine<'_, u8, u8>) -> Result<()> {
                if line.position.get(1) == Some(&3) {
                    return Err(Error::parameter("line three"));
                }
                Ok(())
            }
        }

        let input = ramp(&[100, 200], 1);
        let mut output = Image::default();
        let spec = ScanSpec::new(&[DataType::UInt8], &[1])
            .with_options(ScanOptions::NEED_COORDINATES)
            .with_threads(Threads::Fixed(4));
        let err = scan(&[&input], &mut [&mut output], &spec, &mut Fails).unwrap_err();
        assert_eq!(err.message(), "line three");
    }

    #[test]
    fn outputs_without_inputs() {
        struct Coordinates;

        impl ScanLineFilter for Coordinates {
            type Input = u8;
            type Output = u32;

            fn filter(&self, line: &mut ScanLine<'_, u8, u32>) -> Result<()> {
                let (dim, start) = (line.dimension, line.position.to_vec());
                for (index, pixel) in line.outputs[0].pixels_mut().enumerate() {
                    let mut coordinates = start.clone();
                    coordinates[dim] += index;
                    pixel[0] = (coordinates[0] * 10 + coordinates[1]) as u32;
                }
                Ok(())
            }
        }

        let mut output = Image::new(&[3, 4], 1, DataType::UInt32).unwrap();
        let spec = ScanSpec::new(&[DataType::UInt32], &[1])
            .with_options(ScanOptions::NEED_COORDINATES);
        scan(&[], &mut [&mut output], &spec, &mut Coordinates).unwrap();
        assert_eq!(output.sample::<u32>(&[2, 3], 0).unwrap(), 23);
    }
}
