//! Synthesizing samples outside of an image.
//!
//! A [`BoundaryCondition`] decides per dimension what a pixel beyond the edge of an image looks
//! like. Lines are extended in place with [`expand_line`], whole images are copied into a larger
//! buffer with [`extend_image`], and single pixels are read with
//! [`read_pixel_with_boundary_condition`].
use core::fmt;
use core::str::FromStr;

use ndimage_texel::{dispatch, Complex64, Saturated};

use crate::error::{messages, Error, Result, ResultExt};
use crate::image::Image;
use crate::iter::ImageIterator;
use crate::pixel::Pixel;
use crate::range::Range;

/// How pixels outside the image are defined along one dimension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BoundaryCondition {
    /// Reflect at the edge, the edge pixel is repeated: `... c b a | a b c ...`.
    #[default]
    SymmetricMirror,
    /// Reflect around the edge pixel: `... d c b | a b c d ...`.
    AsymmetricMirror,
    /// Wrap around to the other edge.
    Periodic,
    /// Wrap around, negating each copy.
    AsymmetricPeriodic,
    AddZeros,
    AddMaxValue,
    AddMinValue,
    /// Repeat the edge pixel.
    ZeroOrderExtrapolate,
    /// Continue the straight line through the two pixels at the edge.
    FirstOrderExtrapolate,
    /// Continue the parabola through the three pixels at the edge.
    SecondOrderExtrapolate,
    /// Continue the cubic through the four pixels at the edge.
    ThirdOrderExtrapolate,
    /// The samples already exist in the buffer beyond the view, leave them alone.
    AlreadyExpanded,
}

/// Where a synthesized sample comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    Sample { index: usize, negate: bool },
    Zero,
    Max,
    Min,
    /// Evaluate a polynomial through the `order + 1` pixels nearest to the edge, `distance`
    /// pixels beyond it. The pixels are `edge`, `edge + inward`, and so on.
    Polynomial {
        order: usize,
        distance: usize,
        edge: usize,
        inward: isize,
    },
}

impl BoundaryCondition {
    pub const ALL: [BoundaryCondition; 12] = [
        BoundaryCondition::SymmetricMirror,
        BoundaryCondition::AsymmetricMirror,
        BoundaryCondition::Periodic,
        BoundaryCondition::AsymmetricPeriodic,
        BoundaryCondition::AddZeros,
        BoundaryCondition::AddMaxValue,
        BoundaryCondition::AddMinValue,
        BoundaryCondition::ZeroOrderExtrapolate,
        BoundaryCondition::FirstOrderExtrapolate,
        BoundaryCondition::SecondOrderExtrapolate,
        BoundaryCondition::ThirdOrderExtrapolate,
        BoundaryCondition::AlreadyExpanded,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BoundaryCondition::SymmetricMirror => "mirror",
            BoundaryCondition::AsymmetricMirror => "asym mirror",
            BoundaryCondition::Periodic => "periodic",
            BoundaryCondition::AsymmetricPeriodic => "asym periodic",
            BoundaryCondition::AddZeros => "add zeros",
            BoundaryCondition::AddMaxValue => "add max",
            BoundaryCondition::AddMinValue => "add min",
            BoundaryCondition::ZeroOrderExtrapolate => "zero order",
            BoundaryCondition::FirstOrderExtrapolate => "first order",
            BoundaryCondition::SecondOrderExtrapolate => "second order",
            BoundaryCondition::ThirdOrderExtrapolate => "third order",
            BoundaryCondition::AlreadyExpanded => "already expanded",
        }
    }

    /// One condition per dimension.
    ///
    /// An empty list selects the default for every dimension, a single condition is used for
    /// every dimension, otherwise there must be exactly `dims` conditions.
    pub fn array(conditions: &[BoundaryCondition], dims: usize) -> Result<Vec<BoundaryCondition>> {
        match conditions.len() {
            0 => Ok(vec![BoundaryCondition::default(); dims]),
            1 => Ok(vec![conditions[0]; dims]),
            n if n == dims => Ok(conditions.to_vec()),
            _ => Err(Error::parameter(messages::ARRAY_SIZES_DONT_MATCH)),
        }
    }

    /// Resolve the pixel at `index` of a line of `length` pixels.
    fn source(self, index: isize, length: usize) -> Source {
        let n = length as isize;
        if (0..n).contains(&index) {
            return Source::Sample {
                index: index as usize,
                negate: false,
            };
        }

        let order = match self {
            BoundaryCondition::AddZeros => return Source::Zero,
            BoundaryCondition::AddMaxValue => return Source::Max,
            BoundaryCondition::AddMinValue => return Source::Min,
            BoundaryCondition::FirstOrderExtrapolate => 1,
            BoundaryCondition::SecondOrderExtrapolate => 2,
            BoundaryCondition::ThirdOrderExtrapolate => 3,
            _ => 0,
        };

        // Too short lines fall back to lower orders.
        let order = order.min(length - 1);
        if order > 0 {
            let (distance, edge, inward) = if index < 0 {
                (-index, 0, 1)
            } else {
                (index - (n - 1), length - 1, -1)
            };
            return Source::Polynomial {
                order,
                distance: distance as usize,
                edge,
                inward,
            };
        }

        let (index, negate) = match self {
            BoundaryCondition::SymmetricMirror => {
                let folded = index.rem_euclid(2 * n);
                (folded.min(2 * n - 1 - folded), false)
            }
            BoundaryCondition::AsymmetricMirror if n > 1 => {
                let period = 2 * n - 2;
                let folded = index.rem_euclid(period);
                (folded.min(period - folded), false)
            }
            BoundaryCondition::Periodic => (index.rem_euclid(n), false),
            BoundaryCondition::AsymmetricPeriodic => {
                (index.rem_euclid(n), index.div_euclid(n) % 2 != 0)
            }
            _ => (index.clamp(0, n - 1), false),
        };

        Source::Sample {
            index: index as usize,
            negate,
        }
    }
}

impl fmt::Display for BoundaryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BoundaryCondition {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "" | "default" | "symmetric mirror" => Ok(BoundaryCondition::SymmetricMirror),
            "asymmetric mirror" => Ok(BoundaryCondition::AsymmetricMirror),
            "asymmetric periodic" => Ok(BoundaryCondition::AsymmetricPeriodic),
            "nearest" => Ok(BoundaryCondition::ZeroOrderExtrapolate),
            _ => BoundaryCondition::ALL
                .iter()
                .copied()
                .find(|condition| condition.name() == name)
                .ok_or_else(|| Error::parameter(format!("unknown boundary condition: {name:?}"))),
        }
    }
}

option_set! {
    /// Options for [`extend_image`].
    pub struct ExtendImageOptions {
        /// Return a view of the original size into the extended buffer.
        const MASKED = 0;
        /// Extend the tensor as an extra dimension. Not supported.
        const EXPAND_TENSOR = 1;
    }
}

/// Fill `border` pixels at both ends of a line of `length` pixels.
///
/// `buffer` holds `border + length + border` pixels of `tensor_elements` adjacent samples each,
/// the pixels at `border..border + length` being the line itself.
pub fn expand_line<T: Saturated>(
    buffer: &mut [T],
    tensor_elements: usize,
    length: usize,
    border: usize,
    condition: BoundaryCondition,
) -> Result<()> {
    expand_line_sides(buffer, tensor_elements, border, length, border, condition)
}

/// Like [`expand_line`], with different borders before and after the line.
pub(crate) fn expand_line_sides<T: Saturated>(
    buffer: &mut [T],
    tensor_elements: usize,
    before: usize,
    length: usize,
    after: usize,
    condition: BoundaryCondition,
) -> Result<()> {
    if length == 0 {
        return Err(Error::parameter(messages::ZERO_SIZE));
    }

    if buffer.len() != (before + length + after) * tensor_elements {
        return Err(Error::parameter(messages::ARRAY_SIZES_DONT_MATCH));
    }

    if condition == BoundaryCondition::AlreadyExpanded {
        return Ok(());
    }

    for element in 0..tensor_elements {
        let at = move |pixel: usize| pixel * tensor_elements + element;
        let targets = (1..=before)
            .map(|distance| -(distance as isize))
            .chain((length..length + after).map(|index| index as isize));

        for index in targets {
            let value = synthesize(condition.source(index, length), |pixel| buffer[at(before + pixel)]);
            buffer[at((before as isize + index) as usize)] = value;
        }
    }

    Ok(())
}

fn synthesize<T: Saturated>(source: Source, sample: impl Fn(usize) -> T) -> T {
    match source {
        Source::Sample { index, negate: false } => sample(index),
        Source::Sample { index, negate: true } => sample(index).saturated_neg(),
        Source::Zero => T::default(),
        Source::Max => T::max_value(),
        Source::Min => T::min_value(),
        Source::Polynomial {
            order,
            distance,
            edge,
            inward,
        } => {
            let values: Vec<Complex64> = (0..=order)
                .map(|node| sample(node_index(edge, inward, node)).to_complex())
                .collect();
            T::from_complex(lagrange(&values, -(distance as f64)))
        }
    }
}

fn node_index(edge: usize, inward: isize, node: usize) -> usize {
    (edge as isize + inward * node as isize) as usize
}

/// Evaluate at `x` the polynomial through `(0, values[0])`, `(1, values[1])`, and so on.
fn lagrange(values: &[Complex64], x: f64) -> Complex64 {
    let mut sum = Complex64::new(0.0, 0.0);
    for (node, &value) in values.iter().enumerate() {
        let weight: f64 = (0..values.len())
            .filter(|&other| other != node)
            .map(|other| (x - other as f64) / (node as f64 - other as f64))
            .product();
        sum += value * weight;
    }
    sum
}

/// Read a pixel at coordinates that may lie outside the image.
///
/// Conditions are expanded with [`BoundaryCondition::array`]. Along dimensions marked
/// [`BoundaryCondition::AlreadyExpanded`] the pixel is read from the buffer beyond the view,
/// which fails if the buffer does not extend that far.
pub fn read_pixel_with_boundary_condition(
    image: &Image,
    coordinates: &[isize],
    conditions: &[BoundaryCondition],
) -> Result<Pixel> {
    image.check_forged()?;
    if coordinates.len() != image.dimensionality() {
        return Err(Error::parameter(messages::DIMENSIONALITIES_DONT_MATCH));
    }

    let conditions = BoundaryCondition::array(conditions, image.dimensionality())?;
    let mut coordinates = coordinates.to_vec();

    let margin: Vec<usize> = coordinates
        .iter()
        .zip(image.sizes())
        .zip(&conditions)
        .map(|((&coordinate, &size), &condition)| {
            if condition != BoundaryCondition::AlreadyExpanded {
                return 0;
            }
            let beyond = coordinate - (size as isize - 1);
            coordinate.min(0).unsigned_abs().max(beyond.max(0) as usize)
        })
        .collect();

    if margin.iter().any(|&margin| margin > 0) {
        let grown = image.grow_view(&margin)?;
        for (coordinate, &margin) in coordinates.iter_mut().zip(&margin) {
            *coordinate += margin as isize;
        }
        return read_extended(&grown, &mut coordinates, &conditions, 0)
            .context("read_pixel_with_boundary_condition");
    }

    read_extended(image, &mut coordinates, &conditions, 0).context("read_pixel_with_boundary_condition")
}

/// Resolve the coordinates from `dim` onwards, one dimension after the other.
fn read_extended(
    image: &Image,
    coordinates: &mut [isize],
    conditions: &[BoundaryCondition],
    dim: usize,
) -> Result<Pixel> {
    if dim == coordinates.len() {
        let resolved: Vec<usize> = coordinates.iter().map(|&c| c as usize).collect();
        return image.pixel(&resolved);
    }

    let coordinate = coordinates[dim];
    let pixel = match conditions[dim].source(coordinate, image.sizes()[dim]) {
        Source::Sample { index, negate } => {
            coordinates[dim] = index as isize;
            let pixel = read_extended(image, coordinates, conditions, dim + 1)?;
            if negate {
                pixel.negate()
            } else {
                pixel
            }
        }
        Source::Zero => Pixel::new(image.data_type(), image.tensor()),
        Source::Max => constant_pixel(image, image.data_type().max_value())?,
        Source::Min => constant_pixel(image, image.data_type().min_value())?,
        Source::Polynomial {
            order,
            distance,
            edge,
            inward,
        } => {
            let mut nodes = Vec::with_capacity(order + 1);
            for node in 0..=order {
                coordinates[dim] = node_index(edge, inward, node) as isize;
                nodes.push(read_extended(image, coordinates, conditions, dim + 1)?);
            }

            let mut pixel = Pixel::new(image.data_type(), image.tensor());
            for element in 0..pixel.tensor_elements() {
                let values = nodes
                    .iter()
                    .map(|node| node.as_complex(element))
                    .collect::<Result<Vec<_>>>()?;
                pixel.set(element, lagrange(&values, -(distance as f64)))?;
            }
            pixel
        }
    };

    coordinates[dim] = coordinate;
    Ok(pixel)
}

fn constant_pixel(image: &Image, value: f64) -> Result<Pixel> {
    let mut pixel = Pixel::new(image.data_type(), image.tensor());
    for element in 0..pixel.tensor_elements() {
        pixel.set(element, value)?;
    }
    Ok(pixel)
}

/// Copy an image into a larger one, synthesizing `border` pixels on each side.
///
/// `border` holds one value per dimension or a single value for all of them. The result has
/// normal strides. With [`ExtendImageOptions::MASKED`] the returned image is a view of the
/// original sizes into the extended buffer, and [`Image::grow_view`] recovers the border.
pub fn extend_image(
    input: &Image,
    border: &[usize],
    conditions: &[BoundaryCondition],
    options: ExtendImageOptions,
) -> Result<Image> {
    input.check_forged()?;
    if options.contains(ExtendImageOptions::EXPAND_TENSOR) {
        return Err(Error::parameter(messages::INVALID_FLAG));
    }

    let dims = input.dimensionality();
    let border = match border.len() {
        1 => vec![border[0]; dims],
        n if n == dims => border.to_vec(),
        _ => return Err(Error::parameter(messages::ARRAY_SIZES_DONT_MATCH)),
    };
    let conditions = BoundaryCondition::array(conditions, dims)?;

    let sizes: Vec<usize> = input
        .sizes()
        .iter()
        .zip(&border)
        .map(|(&size, &border)| size + 2 * border)
        .collect();
    let mut output = Image::unforged(&sizes, 1, input.data_type());
    output.set_tensor_shape(input.tensor())?;
    output.forge()?;

    let region: Vec<Range> = border
        .iter()
        .zip(input.sizes())
        .map(|(&border, &size)| Range::new(border as isize, (border + size - 1) as isize))
        .collect();
    let mut interior = output.at_ranges(&region)?;
    interior.copy_from(input)?;

    let lines: Vec<(usize, usize)> = border.iter().zip(input.sizes()).map(|(&b, &s)| (b, s)).collect();
    extend_around(&mut output, &lines, &conditions).context("extend_image")?;

    if options.contains(ExtendImageOptions::MASKED) {
        Ok(interior)
    } else {
        Ok(output)
    }
}

/// Fill everything outside of `region` from the pixels inside of it.
///
/// Each range must be ascending with a unit step. The image keeps its buffer.
pub fn extend_region(
    image: &mut Image,
    region: &[Range],
    conditions: &[BoundaryCondition],
) -> Result<()> {
    image.check_forged()?;
    let dims = image.dimensionality();
    if region.len() != dims {
        return Err(Error::parameter(messages::ARRAY_SIZES_DONT_MATCH));
    }

    let conditions = BoundaryCondition::array(conditions, dims)?;
    let mut lines = Vec::with_capacity(dims);
    for (range, &size) in region.iter().zip(image.sizes()) {
        let fixed = range.fix(size)?;
        if fixed.step != 1 && fixed.len > 1 {
            return Err(Error::parameter("region must be ascending with unit step"));
        }
        lines.push((fixed.start, fixed.len));
    }

    extend_around(image, &lines, &conditions).context("extend_region")
}

/// Extend along each dimension in turn, `lines[d]` being the start and length of the known part.
///
/// Later dimensions overwrite what earlier ones wrote outside of the known part, so the corners
/// end up derived from the already extended edges.
fn extend_around(
    image: &mut Image,
    lines: &[(usize, usize)],
    conditions: &[BoundaryCondition],
) -> Result<()> {
    for (dim, (&(start, length), &condition)) in lines.iter().zip(conditions).enumerate() {
        let size = image.sizes()[dim];
        let after = size - start - length;
        if (start == 0 && after == 0) || condition == BoundaryCondition::AlreadyExpanded {
            continue;
        }

        dispatch!(image.data_type(), T => {
            extend_dimension::<T>(image, dim, (start, length, after), condition)?
        });
    }

    Ok(())
}

fn extend_dimension<T: Saturated>(
    image: &mut Image,
    dim: usize,
    (before, length, after): (usize, usize, usize),
    condition: BoundaryCondition,
) -> Result<()> {
    let starts: Vec<Vec<usize>> = ImageIterator::new(image)
        .with_processing_dim(dim)?
        .map(|position| position.coordinates)
        .collect();

    for start in starts {
        let mut line = image.read_line::<T>(&start, dim)?;
        expand_line_sides(&mut line, image.tensor_elements(), before, length, after, condition)?;
        image.write_line(&start, dim, &line)?;
    }

    Ok(())
}
