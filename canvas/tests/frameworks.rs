use ndimage_canvas::boundary::BoundaryCondition;
use ndimage_canvas::framework::{
    full, scan, separable, FullLine, FullLineFilter, FullSpec, ScanLine, ScanLineFilter,
    ScanOptions, ScanSpec, SeparableLine, SeparableLineFilter, SeparableSpec, Threads,
};
use ndimage_canvas::pixel_table::{window_sum_brute_force, PixelTable, PixelTableShape};
use ndimage_canvas::random::line_rng;
use ndimage_canvas::{DataType, Image, Result};

use rand::Rng;

fn pattern(sizes: &[usize]) -> Image {
    let count: usize = sizes.iter().product();
    let values: Vec<u16> = (0..count).map(|v| ((v * 7919) % 251) as u16).collect();
    Image::from_vec(sizes, 1, &values).unwrap()
}

/// Sums the neighborhood of each pixel from scratch.
struct NeighborhoodSum;

impl FullLineFilter for NeighborhoodSum {
    type Input = f64;
    type Output = f64;

    fn filter(&self, line: &mut FullLine<'_, f64, f64>) -> Result<()> {
        for pixel in 0..line.output.len() {
            for element in 0..line.output.tensor_elements() {
                line.output.pixel_mut(pixel)[element] = line
                    .table
                    .offsets()
                    .iter()
                    .map(|&offset| line.input.at(pixel, offset, element))
                    .sum();
            }
        }
        Ok(())
    }

    fn operations(&self, length: usize, _: usize, pixels: usize, _: usize) -> usize {
        // Large enough to always run threaded.
        length * pixels * 1000
    }
}

#[test]
fn elliptic_neighborhood_sum() {
    let input = pattern(&[20, 15]);
    let kernel = PixelTable::new(PixelTableShape::Elliptic, &[5.0, 5.0], 0).unwrap();
    assert_eq!(kernel.number_of_pixels(), 21);
    let expected = window_sum_brute_force(&input, &kernel, &[]).unwrap();

    for threads in [Threads::Single, Threads::Fixed(3)] {
        let mut output = Image::default();
        let spec = FullSpec::new(kernel.clone(), DataType::DFloat).with_threads(threads);
        full(&input, &mut output, &spec, &mut NeighborhoodSum).unwrap();
        assert_eq!(output.sizes(), &[20, 15]);
        assert_eq!(
            output.to_vec::<f64>().unwrap(),
            expected.to_vec::<f64>().unwrap()
        );
    }
}

/// Correlation with symmetric weights of odd length.
struct Smooth(Vec<f64>);

impl SeparableLineFilter for Smooth {
    type Buffer = f64;

    fn filter(&self, line: &mut SeparableLine<'_, f64>) -> Result<()> {
        let samples = line.input.with_border();
        for pixel in 0..line.output.len() {
            line.output.pixel_mut(pixel)[0] = self
                .0
                .iter()
                .enumerate()
                .map(|(tap, weight)| weight * samples[pixel + tap])
                .sum();
        }
        Ok(())
    }
}

#[test]
fn separable_smoothing_with_zero_border() {
    let (width, height) = (20, 15);
    let input = pattern(&[width, height]);
    let weights: Vec<f64> = [1.0, 2.0, 3.0, 2.0, 1.0].iter().map(|w| w / 9.0).collect();

    let mut output = Image::default();
    let spec = SeparableSpec::new(DataType::UInt16)
        .with_border(&[2])
        .with_conditions(&[BoundaryCondition::AddZeros])
        .with_threads(Threads::Fixed(2));
    separable(&input, &mut output, &spec, &mut Smooth(weights.clone())).unwrap();
    assert_eq!(output.data_type(), DataType::UInt16);

    let samples = input.to_vec::<u16>().unwrap();
    let at = |x: isize, y: isize| -> f64 {
        if (0..width as isize).contains(&x) && (0..height as isize).contains(&y) {
            f64::from(samples[y as usize * width + x as usize])
        } else {
            0.0
        }
    };
    let mut expected = Vec::with_capacity(width * height);
    for y in 0..height as isize {
        for x in 0..width as isize {
            let mut sum = 0.0;
            for (j, wy) in weights.iter().enumerate() {
                for (i, wx) in weights.iter().enumerate() {
                    sum += wx * wy * at(x + i as isize - 2, y + j as isize - 2);
                }
            }
            expected.push(sum.round() as u16);
        }
    }
    assert_eq!(output.to_vec::<u16>().unwrap(), expected);
}

/// Fills its output with noise, one generator per line.
struct Noise {
    seed: u64,
}

impl ScanLineFilter for Noise {
    type Input = u32;
    type Output = u32;

    fn filter(&self, line: &mut ScanLine<'_, u32, u32>) -> Result<()> {
        let mut rng = line_rng(self.seed, line.line);
        for sample in line.outputs[0].samples_mut() {
            *sample = rng.gen();
        }
        Ok(())
    }

    fn operations(&self, _: usize, _: usize, _: usize) -> usize {
        1000
    }
}

fn noise(seed: u64, threads: Threads) -> Vec<u32> {
    let mut image = Image::new(&[64, 48], 1, DataType::UInt32).unwrap();
    let spec = ScanSpec::new(&[DataType::UInt32], &[1])
        .with_options(ScanOptions::NEED_COORDINATES)
        .with_threads(threads);
    scan(&[], &mut [&mut image], &spec, &mut Noise { seed }).unwrap();
    image.to_vec().unwrap()
}

#[test]
fn noise_does_not_depend_on_threads() {
    let single = noise(42, Threads::Fixed(1));
    assert_eq!(single, noise(42, Threads::Fixed(4)));
    assert_eq!(single, noise(42, Threads::Single));
    assert_ne!(single, noise(43, Threads::Fixed(4)));
}
