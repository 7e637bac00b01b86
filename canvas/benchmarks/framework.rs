//! Benchmarks the line frameworks on images of a few types and layouts.
use brunch::Bench;

use ndimage_canvas::boundary::BoundaryCondition;
use ndimage_canvas::framework::{
    scan_dyadic, separable, ScanOptions, SeparableLine, SeparableLineFilter, SeparableSpec,
    VariadicScanLineFilter,
};
use ndimage_canvas::{DataType, Error, Image};

#[derive(Clone, Copy, Debug)]
enum Layout {
    Normal,
    Mirrored,
    Transposed,
}

struct Add {
    data_type: DataType,
    layout: Layout,
    sz: usize,
}

impl Add {
    fn name(&self) -> String {
        format!("scan::add({:?}, {:?}, {})", self.data_type, self.layout, self.sz)
    }

    fn prepare(&self) -> Result<impl FnMut(), Error> {
        let lhs = self.input()?;
        let rhs = self.input()?;
        let mut into = Image::default();
        let data_type = self.data_type;

        Ok(move || {
            let mut add = VariadicScanLineFilter::new(|values: &[f32]| values[0] + values[1]);
            scan_dyadic(&lhs, &rhs, &mut into, data_type, &mut add, ScanOptions::empty()).unwrap()
        })
    }

    fn input(&self) -> Result<Image, Error> {
        let mut image = Image::new(&[self.sz, self.sz], 1, self.data_type)?;
        image.fill(3.0)?;
        match self.layout {
            Layout::Normal => Ok(image),
            Layout::Mirrored => image.mirror(&[true, false]),
            Layout::Transposed => image.swap_dimensions(0, 1),
        }
    }
}

/// Uniform smoothing over three pixels.
struct Box3;

impl SeparableLineFilter for Box3 {
    type Buffer = f32;

    fn filter(&self, line: &mut SeparableLine<'_, f32>) -> ndimage_canvas::Result<()> {
        let samples = line.input.with_border();
        for (pixel, value) in line.output.samples_mut().iter_mut().enumerate() {
            *value = (samples[pixel] + samples[pixel + 1] + samples[pixel + 2]) / 3.0;
        }
        Ok(())
    }
}

struct Smooth {
    data_type: DataType,
    sz: usize,
}

impl Smooth {
    fn name(&self) -> String {
        format!("separable::box3({:?}, {})", self.data_type, self.sz)
    }

    fn prepare(&self) -> Result<impl FnMut(), Error> {
        let mut from = Image::new(&[self.sz, self.sz], 1, self.data_type)?;
        from.fill(1.0)?;
        let mut into = Image::default();
        let spec = SeparableSpec::new(self.data_type)
            .with_border(&[1])
            .with_conditions(&[BoundaryCondition::SymmetricMirror]);

        Ok(move || separable(&from, &mut into, &spec, &mut Box3).unwrap())
    }
}

fn main() {
    let adds = [
        Add {
            data_type: DataType::SFloat,
            layout: Layout::Normal,
            sz: 512,
        },
        Add {
            data_type: DataType::SFloat,
            layout: Layout::Mirrored,
            sz: 512,
        },
        Add {
            data_type: DataType::SFloat,
            layout: Layout::Transposed,
            sz: 512,
        },
        // Converted to and from the filter type on each line.
        Add {
            data_type: DataType::UInt8,
            layout: Layout::Normal,
            sz: 512,
        },
    ];

    let smooths = [
        Smooth {
            data_type: DataType::SFloat,
            sz: 512,
        },
        Smooth {
            data_type: DataType::UInt16,
            sz: 512,
        },
    ];

    let mut benches = brunch::Benches::default();
    benches.extend(adds.map(|add| {
        Bench::new(format!("framework::{}", add.name()))
            .run(add.prepare().expect("Failed to setup benchmark"))
    }));
    benches.extend(smooths.map(|smooth| {
        Bench::new(format!("framework::{}", smooth.name()))
            .run(smooth.prepare().expect("Failed to setup benchmark"))
    }));
    benches.finish();
}
