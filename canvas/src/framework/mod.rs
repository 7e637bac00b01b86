//! Walking images line by line, in parallel, with a filter called for each line.
//!
//! Three frameworks share the same machinery:
//!
//! - [`scan`] for filters where an output pixel only depends on the input pixels at the same
//!   coordinates, with any number of inputs and outputs.
//! - [`separable`] for filters applied along each dimension in turn, with a border of extended
//!   samples around each line.
//! - [`full`] for filters over a neighborhood described by a
//!   [`PixelTable`](crate::pixel_table::PixelTable).
//!
//! Lines are copied into [`LineBuffer`]s of the sample type the filter asks for, filtered by
//! worker threads of the pool in [`config`](crate::config), and converted back into the output
//! by the calling thread. Work is done in batches of lines so that buffers stay small.
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use rayon::prelude::*;

use ndimage_texel::Buffer;

use crate::config;
use crate::error::{messages, Error, Result};
use crate::image::{alias, Image};
use crate::tensor::Tensor;

mod buffer;
mod full;
mod scan;
mod separable;

pub use self::buffer::LineBuffer;
pub use self::full::{full, FullInput, FullLine, FullLineFilter, FullOptions, FullSpec};
pub use self::scan::{
    scan, scan_dyadic, scan_monadic, ScanLine, ScanLineFilter, ScanOptions, ScanSpec,
    VariadicScanLineFilter,
};
pub use self::separable::{
    separable, SeparableLine, SeparableLineFilter, SeparableOptions, SeparableSpec,
};

pub(crate) use self::buffer::{Geometry, LinePlan};

/// Images with at most this many pixels along a dimension are considered small.
const SMALL_IMAGE: usize = 63;

/// A rough bound on the bytes of line buffers a batch holds per thread.
const MAX_BUFFER_SIZE: usize = 256 * 1024;

/// How many threads a framework may use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Threads {
    /// The number in [`config::number_of_threads`].
    #[default]
    Global,
    Fixed(usize),
    Single,
}

impl Threads {
    pub fn count(self) -> usize {
        match self {
            Threads::Global => config::number_of_threads(),
            Threads::Fixed(n) => n.max(1),
            Threads::Single => 1,
        }
    }
}

/// The dimension along which lines are best processed.
///
/// Prefers the dimension with the smallest stride, which reads memory in order, unless that
/// dimension is short and a longer one exists. Lines along a short dimension cost more in
/// overhead than they gain in locality.
pub fn optimal_processing_dim(image: &Image) -> usize {
    optimal_processing_dim_for(image.sizes(), image.strides())
}

/// As [`optimal_processing_dim`], for a filter whose kernel has the given sizes.
///
/// Dimensions where the kernel has size 1 are not considered, unless no other dimension exists.
pub fn optimal_processing_dim_with_kernel(image: &Image, kernel_sizes: &[usize]) -> usize {
    let sizes: Vec<usize> = image
        .sizes()
        .iter()
        .zip(kernel_sizes.iter().copied().chain(std::iter::repeat(2)))
        .map(|(&size, kernel)| if kernel == 1 { 1 } else { size })
        .collect();
    if sizes.iter().all(|&size| size <= 1) {
        return optimal_processing_dim(image);
    }
    optimal_processing_dim_for(&sizes, image.strides())
}

fn optimal_processing_dim_for(sizes: &[usize], strides: &[isize]) -> usize {
    let mut best = 0;
    for dim in 1..sizes.len() {
        if sizes[dim] <= 1 {
            continue;
        }

        let stride = strides[dim].unsigned_abs();
        let best_stride = strides[best].unsigned_abs();
        let shorter_stride = stride != 0 && (best_stride == 0 || stride < best_stride);
        if sizes[best] <= 1 {
            best = dim;
        } else if shorter_stride {
            if sizes[dim] > SMALL_IMAGE || sizes[dim] > sizes[best] {
                best = dim;
            }
        } else if sizes[best] <= SMALL_IMAGE && sizes[dim] > sizes[best] {
            best = dim;
        }
    }
    best
}

/// The sizes all images broadcast to.
///
/// Images with fewer dimensions get trailing singletons. A dimension of size 1 takes the size
/// of the other images, any other mismatch is an error.
pub(crate) fn singleton_expanded_sizes(images: &[&Image]) -> Result<Vec<usize>> {
    let dims = images.iter().map(|image| image.dimensionality()).max().unwrap_or(0);
    let mut sizes = vec![1; dims];
    for image in images {
        for (size, &own) in sizes.iter_mut().zip(image.sizes()) {
            if *size == 1 {
                *size = own;
            } else if own != 1 && own != *size {
                return Err(Error::parameter(messages::SIZES_DONT_MATCH));
            }
        }
    }
    Ok(sizes)
}

/// A view of `image` broadcast to `sizes`.
pub(crate) fn singleton_expand(image: &Image, sizes: &[usize]) -> Result<Image> {
    let mut view = image.expand_dimensionality(sizes.len())?;
    for (dim, &size) in sizes.iter().enumerate() {
        if view.sizes()[dim] != size {
            view = view.expand_singleton_dimension(dim, size)?;
        }
    }
    Ok(view)
}

/// Make `output` a forged image of the given properties that can be written to line by line.
///
/// A protected output keeps its buffer and type, its samples are converted on write. An
/// unprotected output of the wrong properties is stripped and forged anew.
pub(crate) fn prepare_output(
    output: &mut Image,
    sizes: &[usize],
    tensor: Tensor,
    data_type: ndimage_texel::DataType,
) -> Result<()> {
    let elements = tensor.elements();
    if output.is_forged() {
        let fits = output.sizes() == sizes && output.tensor_elements() == elements;
        if output.is_protected() {
            if !fits {
                return Err(Error::parameter(if output.sizes() == sizes {
                    messages::TENSOR_ELEMENTS_DONT_MATCH
                } else {
                    messages::SIZES_DONT_MATCH
                }));
            }
            if !output.has_valid_strides() {
                return Err(Error::parameter(messages::OUTPUT_STRIDES_ALIAS));
            }
            return Ok(());
        }

        if fits && output.data_type() == data_type && output.has_valid_strides() {
            return Ok(());
        }
        log::warn!(
            "reforging output image of {} {:?} into {} {:?}",
            output.data_type(),
            output.sizes(),
            data_type,
            sizes
        );
        output.strip()?;
        output.set_strides(&[])?;
    }

    // Strides requested on a raw output are kept when they still describe it.
    if output.sizes() != sizes {
        output.set_sizes(sizes)?;
    }
    output.set_tensor_shape(tensor)?;
    output.set_data_type(data_type)?;
    output.forge()
}

/// Replace inputs that share samples with an output by copies.
///
/// An input that addresses exactly the same samples as an output, in the same order, can be
/// read and written in place: each batch reads its lines before it writes them. Any other
/// overlap could read samples already overwritten.
pub(crate) fn separate_inputs(
    inputs: &mut [Image],
    outputs: &[&Image],
    in_place: bool,
) -> Result<()> {
    for (index, input) in inputs.iter_mut().enumerate() {
        let clash = outputs.iter().any(|output| {
            alias(input, output) && !(in_place && same_samples(input, output))
        });
        if clash {
            log::debug!("input {index} overlaps an output, working on a copy");
            *input = input.copy()?;
        }
    }
    Ok(())
}

/// Whether both views address the same samples at the same coordinates.
fn same_samples(a: &Image, b: &Image) -> bool {
    let origins = match (a.block(), b.block()) {
        (Ok(a), Ok(b)) => a.origin() == b.origin(),
        _ => false,
    };
    origins && a.same_layout(b)
}

/// How many threads to use for `lines` lines of `operations` estimated operations in total.
pub(crate) fn plan_threads(
    threads: Threads,
    single: bool,
    lines: usize,
    operations: usize,
) -> usize {
    let requested = if single { 1 } else { threads.count() };
    let threshold = config::threading_threshold();
    let chosen = if requested <= 1 || lines < 2 || operations < threshold {
        1
    } else {
        requested.min(lines)
    };
    log::debug!(
        "{lines} lines, about {operations} operations, using {chosen} of {requested} threads"
    );
    chosen
}

/// How many lines to buffer at once when each needs `line_bytes`.
pub(crate) fn batch_size(threads: usize, line_bytes: usize) -> usize {
    let per_thread = (MAX_BUFFER_SIZE / line_bytes.max(1)).max(1);
    per_thread * threads.max(1)
}

/// Run `work` for each of `lines`, on the workers of `pool` or on the calling thread.
///
/// Results come back in line order. The first error stops the remaining lines from starting.
///
/// Workers only ever see the input buffers through shared read locks and hand their output
/// lines back as owned buffers. The caller scatters a whole batch under write locks once every
/// line of it has been read, so an output that is also an input is never written while a worker
/// reads it, and no worker needs mutable access to a shared buffer.
pub(crate) fn run_lines<R, F>(
    pool: Option<&rayon::ThreadPool>,
    lines: std::ops::Range<usize>,
    work: F,
) -> Result<Vec<R>>
where
    R: Send,
    F: Fn(usize, usize) -> Result<R> + Sync,
{
    match pool {
        Some(pool) => pool.install(|| {
            lines
                .into_par_iter()
                .map(|line| work(line, rayon::current_thread_index().unwrap_or(0)))
                .collect()
        }),
        None => lines.map(|line| work(line, 0)).collect(),
    }
}

/// The pool for a plan of `threads`, none when the work stays on the calling thread.
pub(crate) fn pool(threads: usize) -> Result<Option<std::sync::Arc<rayon::ThreadPool>>> {
    if threads <= 1 {
        Ok(None)
    } else {
        config::pool_for(threads).map(Some)
    }
}

/// Read locks on the buffers of some images, each buffer locked once.
pub(crate) struct ReadLocks<'a> {
    guards: Vec<RwLockReadGuard<'a, Buffer>>,
    which: Vec<usize>,
}

impl<'a> ReadLocks<'a> {
    pub(crate) fn new(images: &'a [Image]) -> Result<Self> {
        let mut guards = Vec::new();
        let mut owners: Vec<&Image> = Vec::new();
        let mut which = Vec::with_capacity(images.len());
        for image in images {
            match owners.iter().position(|owner| owner.shares_data(image)) {
                Some(index) => which.push(index),
                None => {
                    which.push(guards.len());
                    guards.push(image.block()?.read());
                    owners.push(image);
                }
            }
        }
        Ok(ReadLocks { guards, which })
    }

    pub(crate) fn bytes(&self, image: usize) -> &[u8] {
        self.guards[self.which[image]].as_bytes()
    }
}

/// Write locks on the buffers of some images, each buffer locked once.
pub(crate) struct WriteLocks<'a> {
    guards: Vec<RwLockWriteGuard<'a, Buffer>>,
    which: Vec<usize>,
}

impl<'a> WriteLocks<'a> {
    pub(crate) fn new(images: &[&'a Image]) -> Result<Self> {
        let mut guards = Vec::new();
        let mut owners: Vec<&Image> = Vec::new();
        let mut which = Vec::with_capacity(images.len());
        for &image in images {
            match owners.iter().position(|owner| owner.shares_data(image)) {
                Some(index) => which.push(index),
                None => {
                    which.push(guards.len());
                    guards.push(image.block()?.write());
                    owners.push(image);
                }
            }
        }
        Ok(WriteLocks { guards, which })
    }

    pub(crate) fn bytes_mut(&mut self, image: usize) -> &mut [u8] {
        self.guards[self.which[image]].as_bytes_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndimage_texel::DataType;

    #[test]
    fn processing_dim_prefers_small_strides() {
        let image = Image::new(&[100, 80], 1, DataType::UInt8).unwrap();
        assert_eq!(optimal_processing_dim(&image), 0);
        assert_eq!(optimal_processing_dim(&image.swap_dimensions(0, 1).unwrap()), 1);

        // A short first dimension gives way to a long one.
        let short = Image::new(&[3, 500], 1, DataType::UInt8).unwrap();
        assert_eq!(optimal_processing_dim(&short), 1);
        let singleton = Image::new(&[1, 20], 1, DataType::UInt8).unwrap();
        assert_eq!(optimal_processing_dim(&singleton), 1);

        assert_eq!(optimal_processing_dim_with_kernel(&image, &[1, 5]), 1);
        assert_eq!(optimal_processing_dim(&Image::new(&[], 1, DataType::UInt8).unwrap()), 0);
    }

    #[test]
    fn broadcast_sizes() {
        let a = Image::new(&[5, 1], 1, DataType::UInt8).unwrap();
        let b = Image::new(&[1, 4, 2], 1, DataType::UInt8).unwrap();
        assert_eq!(singleton_expanded_sizes(&[&a, &b]).unwrap(), vec![5, 4, 2]);

        let expanded = singleton_expand(&a, &[5, 4, 2]).unwrap();
        assert_eq!(expanded.sizes(), &[5, 4, 2]);
        assert_eq!(expanded.strides()[1], 0);

        let c = Image::new(&[6], 1, DataType::UInt8).unwrap();
        assert!(singleton_expanded_sizes(&[&a, &c]).is_err());
    }

    #[test]
    fn output_preparation() {
        let mut output = Image::new(&[4, 4], 1, DataType::UInt8).unwrap();
        prepare_output(&mut output, &[4, 4], Tensor::vector(3), DataType::SFloat).unwrap();
        assert_eq!(output.tensor_elements(), 3);
        assert_eq!(output.data_type(), DataType::SFloat);

        let mut protected = Image::new(&[4, 4], 1, DataType::UInt8).unwrap();
        protected.protect(true);
        prepare_output(&mut protected, &[4, 4], Tensor::scalar(), DataType::SFloat).unwrap();
        assert_eq!(protected.data_type(), DataType::UInt8);
        assert!(prepare_output(&mut protected, &[4, 5], Tensor::scalar(), DataType::UInt8).is_err());

        let column = Image::new(&[1, 4], 1, DataType::UInt8).unwrap();
        let mut broadcast = column.expand_singleton_dimension(0, 4).unwrap();
        broadcast.protect(true);
        let err = prepare_output(&mut broadcast, &[4, 4], Tensor::scalar(), DataType::UInt8);
        assert_eq!(err.unwrap_err().message(), messages::OUTPUT_STRIDES_ALIAS);
    }

    #[test]
    fn lines_come_back_in_order() {
        let pool = config::pool_for(3).unwrap();
        let squares = run_lines(Some(&*pool), 0..100, |line, _| Ok(line * line)).unwrap();
        assert_eq!(squares, (0..100).map(|line| line * line).collect::<Vec<_>>());
        let serial = run_lines(None, 5..8, |line, thread| Ok((line, thread))).unwrap();
        assert_eq!(serial, [(5, 0), (6, 0), (7, 0)]);

        let failed = run_lines(Some(&*pool), 0..100, |line, _| {
            if line == 42 {
                Err(Error::parameter("line 42"))
            } else {
                Ok(line)
            }
        });
        assert_eq!(failed.unwrap_err().message(), "line 42");
    }

    #[test]
    fn batches_bound_memory() {
        assert_eq!(batch_size(1, MAX_BUFFER_SIZE * 2), 1);
        assert_eq!(batch_size(4, 1024), 1024);
    }
}
