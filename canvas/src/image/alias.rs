//! Deciding whether two views share any sample address.
use std::collections::HashSet;

use super::{nested, Image};

/// Above this many addresses, overlap of irregular views is assumed instead of enumerated.
const ENUMERATION_LIMIT: usize = 1 << 22;

/// The addresses an image covers, as a lattice in units of the smallest sample size involved.
#[derive(Debug)]
struct Lattice {
    base: isize,
    /// `(size, stride)` with positive strides in ascending order, singletons dropped.
    dims: Vec<(usize, usize)>,
}

impl Lattice {
    fn new(image: &Image, origin: usize, unit: usize) -> Self {
        let sample = image.data_type().size_of();
        let scale = (sample / unit) as isize;
        let mut base = (origin / unit) as isize;

        let spatial = image
            .sizes()
            .iter()
            .zip(image.strides())
            .map(|(&size, &stride)| (size, stride * scale));
        let tensor = [(image.tensor_elements(), image.tensor_stride() * scale)];
        // The bytes of one sample, so that samples of different sizes can overlap partially.
        let bytes = [(sample / unit, 1)];

        let mut dims = Vec::new();
        for (size, stride) in spatial.chain(tensor).chain(bytes) {
            if size <= 1 || stride == 0 {
                continue;
            }

            if stride < 0 {
                base += (size as isize - 1) * stride;
            }
            dims.push((size, stride.unsigned_abs()));
        }
        dims.sort_by_key(|&(_, stride)| stride);

        Lattice { base, dims }
    }

    fn count(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |count, &(size, _)| count.checked_mul(size))
    }

    /// Every address is congruent to the base modulo this.
    fn step(&self) -> usize {
        self.dims.iter().fold(0, |step, &(_, stride)| gcd(step, stride))
    }

    /// Whether each stride exceeds the extent of all smaller ones.
    fn is_nested(&self) -> bool {
        nested(&mut self.dims.clone())
    }

    fn blocks(&self) -> Blocks<'_> {
        Blocks {
            base: self.base,
            dims: &self.dims,
        }
    }

    fn addresses(&self) -> impl Iterator<Item = isize> + '_ {
        let mut index = vec![0usize; self.dims.len()];
        let mut address = self.base;
        let mut done = false;

        std::iter::from_fn(move || {
            if done {
                return None;
            }

            let current = address;
            done = true;
            for (idx, &(size, stride)) in index.iter_mut().zip(&self.dims) {
                *idx += 1;
                address += stride as isize;
                if *idx < size {
                    done = false;
                    break;
                }
                address -= (size * stride) as isize;
                *idx = 0;
            }

            Some(current)
        })
    }
}

/// A nested lattice seen as `size` copies of the lattice of its smaller strides, one per step of
/// its largest stride. Each copy fits in the gap before the next one.
#[derive(Clone, Copy, Debug)]
struct Blocks<'a> {
    base: isize,
    dims: &'a [(usize, usize)],
}

impl<'a> Blocks<'a> {
    fn extent(&self) -> isize {
        self.dims
            .iter()
            .map(|&(size, stride)| ((size - 1) * stride) as isize)
            .sum()
    }

    /// Size and stride of the outermost dimension, and the first copy of the rest.
    fn split(&self) -> Option<(usize, isize, Blocks<'a>)> {
        let (&(size, stride), inner) = self.dims.split_last()?;
        let inner = Blocks {
            base: self.base,
            dims: inner,
        };
        Some((size, stride as isize, inner))
    }

    fn shifted(self, by: isize) -> Self {
        Blocks {
            base: self.base + by,
            ..self
        }
    }

    /// Decompose greedily from the largest stride.
    fn contains(&self, address: isize) -> bool {
        let mut rest = address - self.base;
        if rest < 0 {
            return false;
        }

        for &(size, stride) in self.dims.iter().rev() {
            let stride = stride as isize;
            let index = (rest / stride).min(size as isize - 1);
            rest -= index * stride;
        }

        rest == 0
    }
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn div_ceil(numerator: isize, denominator: isize) -> isize {
    -(-numerator).div_euclid(denominator)
}

/// Exact intersection of two nested lattices.
///
/// Peels off the outermost dimension and only descends into the copies that can reach the other
/// lattice. Work grows with the number of such copies, not with the number of addresses.
fn overlap(a: Blocks<'_>, b: Blocks<'_>) -> bool {
    if a.base + a.extent() < b.base || b.base + b.extent() < a.base {
        return false;
    }

    let (size_a, stride_a, inner_a) = match a.split() {
        Some(outer) => outer,
        None => return b.contains(a.base),
    };
    let (size_b, stride_b, inner_b) = match b.split() {
        Some(outer) => outer,
        None => return a.contains(b.base),
    };

    if stride_a == stride_b {
        // `a.base + i * s + x == b.base + j * s + y` with `x`, `y` inside the inner copies
        // pins `i - j` to at most two values, whatever `i` and `j` are.
        let distance = b.base - a.base;
        let first = div_ceil(distance - inner_a.extent(), stride_a);
        let last = (distance + inner_b.extent()).div_euclid(stride_a);
        let (size_a, size_b) = (size_a as isize, size_b as isize);
        return (first..=last).any(|shift| {
            let feasible = 0.max(-shift) < size_b.min(size_a - shift);
            feasible && overlap(inner_a.shifted(shift * stride_a), inner_b)
        });
    }

    let (size, stride, inner, other) = if stride_a > stride_b {
        (size_a, stride_a, inner_a, b)
    } else {
        (size_b, stride_b, inner_b, a)
    };
    let first = div_ceil(other.base - inner.base - inner.extent(), stride).max(0);
    let last = (other.base + other.extent() - inner.base)
        .div_euclid(stride)
        .min(size as isize - 1);
    (first..=last).any(|index| overlap(inner.shifted(index * stride), other))
}

/// Whether two images have any sample address in common.
///
/// Only the geometry is consulted: sizes, strides, origin and sample size. Views of different
/// tensor elements of the same pixels, or of disjoint regions, do not alias. Unforged images and
/// images with separate buffers never alias.
///
/// The test is exact for every view obtained by indexing, subsampling, mirroring or permuting
/// an image, whatever its size. Views whose rows wrap into each other, as [`Image::grow_view`]
/// can produce, are compared address by address, and when one holds more than a few million
/// samples an overlap is assumed.
pub fn alias(a: &Image, b: &Image) -> bool {
    let (block_a, block_b) = match (&a.data, &b.data) {
        (Some(a), Some(b)) if a.same_buffer(b) => (a, b),
        _ => return false,
    };

    let unit = a.data_type().size_of().min(b.data_type().size_of());
    let lattice_a = Lattice::new(a, block_a.origin(), unit);
    let lattice_b = Lattice::new(b, block_b.origin(), unit);

    let (blocks_a, blocks_b) = (lattice_a.blocks(), lattice_b.blocks());
    if blocks_a.base + blocks_a.extent() < blocks_b.base
        || blocks_b.base + blocks_b.extent() < blocks_a.base
    {
        return false;
    }

    let step = gcd(lattice_a.step(), lattice_b.step());
    if step > 1 && (lattice_a.base - lattice_b.base) % step as isize != 0 {
        return false;
    }

    match (lattice_a.is_nested(), lattice_b.is_nested()) {
        (true, true) => overlap(blocks_a, blocks_b),
        (true, false) => enumerate_into(&lattice_b, &lattice_a),
        (false, true) => enumerate_into(&lattice_a, &lattice_b),
        (false, false) => enumerate_both(&lattice_a, &lattice_b),
    }
}

/// Look up each address of an irregular lattice in a nested one.
fn enumerate_into(irregular: &Lattice, regular: &Lattice) -> bool {
    if irregular.count().is_none_or(|count| count > ENUMERATION_LIMIT) {
        return give_up();
    }

    let target = regular.blocks();
    let found = irregular.addresses().any(|address| target.contains(address));
    found
}

fn enumerate_both(a: &Lattice, b: &Lattice) -> bool {
    let (count_a, count_b) = match (a.count(), b.count()) {
        (Some(a), Some(b)) if a.max(b) <= ENUMERATION_LIMIT => (a, b),
        _ => return give_up(),
    };

    let (small, large) = if count_a <= count_b { (a, b) } else { (b, a) };
    let seen: HashSet<isize> = small.addresses().collect();
    let found = large.addresses().any(|address| seen.contains(&address));
    found
}

fn give_up() -> bool {
    log::debug!("alias test gave up after {ENUMERATION_LIMIT} addresses, assuming overlap");
    true
}

#[cfg(test)]
mod tests {
    use super::alias;
    use crate::image::Image;
    use crate::range::Range;
    use ndimage_texel::DataType;

    #[test]
    fn separate_buffers_never_alias() {
        let a = Image::new(&[4, 4], 1, DataType::UInt8).unwrap();
        let b = Image::new(&[4, 4], 1, DataType::UInt8).unwrap();
        assert!(!alias(&a, &b));
        assert!(alias(&a, &a.clone()));
        assert!(!alias(&a, &Image::default()));
    }

    #[test]
    fn tensor_elements_are_disjoint() {
        let image = Image::new(&[5, 3], 3, DataType::SInt16).unwrap();
        let red = image.tensor_element(0).unwrap();
        let green = image.tensor_element(1).unwrap();
        assert!(!alias(&red, &green));
        assert!(alias(&red, &image));
        assert!(!alias(&red.mirror(&[true, false]).unwrap(), &green));
    }

    #[test]
    fn interleaved_subsampling() {
        let image = Image::new(&[10, 4], 1, DataType::UInt8).unwrap();
        let even = image.at_ranges(&[Range::with_step(0, -1, 2), Range::all()]).unwrap();
        let odd = image.at_ranges(&[Range::with_step(1, -1, 2), Range::all()]).unwrap();
        assert!(!alias(&even, &odd));

        let threes = image.at_ranges(&[Range::with_step(0, -1, 3), Range::all()]).unwrap();
        assert!(alias(&even, &threes));
        assert!(alias(&odd, &threes));
    }

    #[test]
    fn real_and_imaginary_halves() {
        let image = Image::new(&[6], 1, DataType::DComplex).unwrap();
        let real = image.real().unwrap();
        let imaginary = image.imaginary().unwrap();
        assert!(!alias(&real, &imaginary));
        assert!(alias(&real, &image));
        assert!(alias(&imaginary, &image.at_ranges(&[Range::at(3)]).unwrap()));
    }

    #[test]
    fn broadcast_views() {
        let image = Image::new(&[4, 1], 1, DataType::SFloat).unwrap();
        let wide = image.expand_singleton_dimension(1, 8).unwrap();
        let last = image.at(&[3, 0]).unwrap();
        assert!(alias(&wide, &last));
        let first = image.at_ranges(&[Range::new(0, 2), Range::all()]).unwrap();
        assert!(!alias(&first, &last));
    }

    #[test]
    fn large_images_are_decided_exactly() {
        let image = Image::new(&[3000, 3000], 3, DataType::UInt8).unwrap();
        let red = image.tensor_element(0).unwrap();
        let green = image.tensor_element(1).unwrap();
        assert!(!alias(&red, &green));
        assert!(alias(&red, &image));
        assert!(alias(&green, &image.at(&[2999, 2999]).unwrap()));

        let left = image.at_ranges(&[Range::new(0, 1499), Range::all()]).unwrap();
        let right = image.at_ranges(&[Range::new(1500, -1), Range::all()]).unwrap();
        assert!(!alias(&left, &right));
        assert!(!alias(
            &left.tensor_element(2).unwrap(),
            &right.mirror(&[true, true]).unwrap()
        ));
        let seam = image.at_ranges(&[Range::new(1499, 1500), Range::new(10, 20)]).unwrap();
        assert!(alias(&left, &seam));
        assert!(alias(&seam, &right));

        let even = image.at_ranges(&[Range::with_step(0, -1, 2), Range::all()]).unwrap();
        let odd = image.at_ranges(&[Range::with_step(1, -1, 2), Range::all()]).unwrap();
        assert!(!alias(&even, &odd));
        let transposed = even.swap_dimensions(0, 1).unwrap();
        assert!(alias(&transposed, &image));
        assert!(alias(&transposed, &even));
        assert!(!alias(&transposed, &odd));
        let rows = image
            .permute_dimensions(&[1, 0])
            .unwrap()
            .at_ranges(&[Range::all(), Range::with_step(1, -1, 2)])
            .unwrap();
        assert!(alias(&rows, &odd));
        assert!(!alias(&rows, &even.mirror(&[true, false]).unwrap()));
    }

    /// Two columns of a volume, with the rows grown past the end of each plane.
    fn wrapped(image: &Image, columns: Range) -> Image {
        image
            .at_ranges(&[columns, Range::new(2, 16), Range::new(1, 2)])
            .unwrap()
            .grow_view(&[0, 3, 0])
            .unwrap()
    }

    #[test]
    fn wrapped_views() {
        let image = Image::new(&[10, 20, 3], 1, DataType::UInt8).unwrap();
        let left = wrapped(&image, Range::new(0, 1));
        let right = wrapped(&image, Range::new(5, 6));
        assert_eq!(left.sizes(), &[2, 21, 2]);

        assert!(!alias(&left, &right));
        assert!(!alias(&left, &right.swap_dimensions(1, 2).unwrap()));
        assert!(!alias(&left, &right.permute_dimensions(&[2, 0, 1]).unwrap()));
        assert!(alias(&left, &left.mirror(&[false, true, false]).unwrap()));

        assert!(alias(&left, &image.at(&[1, 19, 1]).unwrap()));
        assert!(alias(&right, &image.at(&[6, 0, 2]).unwrap()));
        let middle = image.at_ranges(&[Range::new(3, 4), Range::all(), Range::all()]).unwrap();
        assert!(!alias(&left, &middle));
        assert!(!alias(&middle.mirror(&[true, true, false]).unwrap(), &right));
    }

    #[test]
    fn wrapped_views_beyond_enumeration() {
        let image = Image::new(&[4400, 2000], 1, DataType::UInt8).unwrap();
        let wrapped = image
            .at_ranges(&[Range::with_step(2, 4396, 2), Range::new(1, 1998)])
            .unwrap()
            .grow_view(&[2, 0])
            .unwrap();
        assert_eq!(wrapped.sizes(), &[2202, 1998]);

        // Only even addresses on one side, only odd ones on the other.
        let odd = image.at_ranges(&[Range::with_step(1, -1, 2), Range::all()]).unwrap();
        assert!(!alias(&wrapped, &odd));
        assert!(!alias(&wrapped, &image.at(&[1, 1999]).unwrap()));

        // Too many addresses to look up one by one.
        assert!(alias(&wrapped, &image.at(&[0, 1999]).unwrap()));
        assert!(alias(&wrapped, &image));
    }
}
