//! An owned copy of the samples of one pixel.
use ndimage_texel::{
    clamp_cast, dispatch, Complex64, DataType, Sample, SampleBuffer, Saturated,
};

use crate::error::{messages, Error, ErrorKind, Result};
use crate::image::lines::{samples, samples_mut};
use crate::tensor::Tensor;

/// The samples of one pixel, detached from any image.
///
/// Reading a pixel from an image copies its samples, arithmetic on pixels produces new pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Pixel {
    tensor: Tensor,
    samples: SampleBuffer,
}

#[derive(Clone, Copy)]
enum Operation {
    Add,
    Sub,
    Mul,
    Div,
}

impl Pixel {
    /// A pixel with all samples zero.
    pub fn new(data_type: DataType, tensor: Tensor) -> Self {
        Pixel {
            tensor,
            samples: SampleBuffer::new(data_type, tensor.elements()),
        }
    }

    /// A pixel with a vector tensor holding `values`.
    pub fn from_samples<T: Sample>(values: &[T]) -> Self {
        Pixel {
            tensor: Tensor::vector(values.len()),
            samples: SampleBuffer::from_samples(values),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.samples.data_type()
    }

    pub fn tensor(&self) -> Tensor {
        self.tensor
    }

    pub fn tensor_elements(&self) -> usize {
        self.tensor.elements()
    }

    /// Change the tensor shape, keeping the samples.
    pub fn reshape(&mut self, tensor: Tensor) -> Result<()> {
        if tensor.elements() != self.tensor.elements() {
            return Err(Error::parameter(messages::TENSOR_ELEMENTS_DONT_MATCH));
        }
        self.tensor = tensor;
        Ok(())
    }

    /// Read a sample, converted to `T`.
    pub fn get<T: Sample>(&self, element: usize) -> Result<T> {
        self.check_element(element)?;
        dispatch!(self.data_type(), S => {
            Ok(clamp_cast::<S, T>(samples::<S>(self.samples.as_bytes())?[element]))
        })
    }

    /// Write a sample, converted to the type of the pixel.
    pub fn set<T: Sample>(&mut self, element: usize, value: T) -> Result<()> {
        self.check_element(element)?;
        dispatch!(self.data_type(), S => {
            samples_mut::<S>(self.samples.as_bytes_mut())?[element] = clamp_cast::<T, S>(value);
            Ok(())
        })
    }

    pub fn as_f64(&self, element: usize) -> Result<f64> {
        self.get(element)
    }

    pub fn as_complex(&self, element: usize) -> Result<Complex64> {
        self.get(element)
    }

    /// A copy with samples converted to another type.
    pub fn convert(&self, data_type: DataType) -> Pixel {
        let mut converted = Pixel::new(data_type, self.tensor);
        dispatch!(self.data_type(), S => {
            dispatch!(data_type, D => {
                let from = self.samples.as_slice::<S>();
                let into = converted.samples.as_mut_slice::<D>();
                if let (Ok(from), Ok(into)) = (from, into) {
                    for (into, &from) in into.iter_mut().zip(from) {
                        *into = clamp_cast::<S, D>(from);
                    }
                }
            })
        });
        converted
    }

    pub fn add(&self, rhs: &Pixel) -> Result<Pixel> {
        self.arithmetic(rhs, Operation::Add)
    }

    pub fn sub(&self, rhs: &Pixel) -> Result<Pixel> {
        self.arithmetic(rhs, Operation::Sub)
    }

    pub fn mul(&self, rhs: &Pixel) -> Result<Pixel> {
        self.arithmetic(rhs, Operation::Mul)
    }

    /// Divide samplewise.
    ///
    /// Integer division by zero is an [`ErrorKind::Arithmetic`] error here, instead of the panic
    /// of [`Saturated::saturated_div`].
    pub fn div(&self, rhs: &Pixel) -> Result<Pixel> {
        self.arithmetic(rhs, Operation::Div)
    }

    /// Negate every sample, saturating. Binary samples are inverted.
    pub fn negate(&self) -> Pixel {
        let mut negated = self.clone();
        dispatch!(self.data_type(), T => {
            if let Ok(samples) = negated.samples.as_mut_slice::<T>() {
                for sample in samples {
                    *sample = sample.saturated_neg();
                }
            }
        });
        negated
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        self.samples.as_bytes()
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        self.samples.as_bytes_mut()
    }

    /// Samplewise arithmetic in the suggested type of both operands.
    ///
    /// A scalar operand is applied to every element of the other.
    fn arithmetic(&self, rhs: &Pixel, operation: Operation) -> Result<Pixel> {
        let (lhs_n, rhs_n) = (self.tensor_elements(), rhs.tensor_elements());
        let tensor = match (lhs_n, rhs_n) {
            _ if lhs_n == rhs_n => self.tensor,
            (1, _) => rhs.tensor,
            (_, 1) => self.tensor,
            _ => return Err(Error::parameter(messages::TENSOR_ELEMENTS_DONT_MATCH)),
        };

        let data_type = DataType::suggest_arithmetic(self.data_type(), rhs.data_type());
        let (lhs, rhs) = (self.convert(data_type), rhs.convert(data_type));
        let mut result = Pixel::new(data_type, tensor);

        dispatch!(data_type, T => {
            let lhs = lhs.samples.as_slice::<T>()?;
            let rhs = rhs.samples.as_slice::<T>()?;
            let zero = T::default();
            let out = result.samples.as_mut_slice::<T>()?;
            for (idx, out) in out.iter_mut().enumerate() {
                let a = lhs[idx.min(lhs.len() - 1)];
                let b = rhs[idx.min(rhs.len() - 1)];
                *out = match operation {
                    Operation::Add => a.saturated_add(b),
                    Operation::Sub => a.saturated_sub(b),
                    Operation::Mul => a.saturated_mul(b),
                    Operation::Div if !data_type.is_flex() && b == zero => {
                        return Err(Error::new(ErrorKind::Arithmetic, "integer division by zero"));
                    }
                    Operation::Div => a.saturated_div(b),
                };
            }
        });

        Ok(result)
    }

    fn check_element(&self, element: usize) -> Result<()> {
        if element < self.tensor.elements() {
            Ok(())
        } else {
            Err(Error::parameter(messages::INDEX_OUT_OF_RANGE))
        }
    }
}

impl From<f64> for Pixel {
    fn from(value: f64) -> Self {
        Pixel::from_samples(&[value])
    }
}

impl From<Complex64> for Pixel {
    fn from(value: Complex64) -> Self {
        Pixel::from_samples(&[value])
    }
}

#[cfg(test)]
mod tests {
    use super::Pixel;
    use crate::error::ErrorKind;
    use ndimage_texel::{Bin, DataType};

    #[test]
    fn arithmetic_promotes_and_saturates() {
        let a = Pixel::from_samples(&[200u8, 10]);
        let b = Pixel::from_samples(&[100u8, 20]);

        let sum = a.add(&b).unwrap();
        assert_eq!(sum.data_type(), DataType::UInt8);
        assert_eq!(sum.get::<u8>(0).unwrap(), 255);
        assert_eq!(a.sub(&b).unwrap().get::<u8>(1).unwrap(), 0);

        let signed = a.sub(&Pixel::from_samples(&[1i8])).unwrap();
        assert_eq!(signed.data_type(), DataType::SInt16);
        assert_eq!(signed.get::<i16>(0).unwrap(), 199);
        assert_eq!(signed.get::<i16>(1).unwrap(), 9);

        let scaled = a.mul(&Pixel::from(0.5)).unwrap();
        assert_eq!(scaled.data_type(), DataType::DFloat);
        assert_eq!(scaled.as_f64(0).unwrap(), 100.0);
    }

    #[test]
    fn integer_division_by_zero_is_an_error() {
        let a = Pixel::from_samples(&[4i32]);
        let err = a.div(&Pixel::from_samples(&[0i32])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Arithmetic);

        let inf = Pixel::from(1.0).div(&Pixel::from(0.0)).unwrap();
        assert_eq!(inf.as_f64(0).unwrap(), f64::INFINITY);
    }

    #[test]
    fn negation_saturates() {
        let pixel = Pixel::from_samples(&[i8::MIN, 5]).negate();
        assert_eq!(pixel.get::<i8>(0).unwrap(), i8::MAX);
        assert_eq!(pixel.get::<i8>(1).unwrap(), -5);
        assert_eq!(Pixel::from_samples(&[7u16]).negate().get::<u16>(0).unwrap(), 0);
        assert_eq!(Pixel::from_samples(&[Bin::FALSE]).negate().get::<Bin>(0).unwrap(), Bin::TRUE);
    }

    #[test]
    fn tensor_mismatch() {
        let a = Pixel::from_samples(&[1u8, 2]);
        let b = Pixel::from_samples(&[1u8, 2, 3]);
        assert_eq!(a.add(&b).unwrap_err().kind(), ErrorKind::Parameter);
    }

    #[test]
    fn conversion_clamps() {
        let pixel = Pixel::from_samples(&[-3.5f32, 1000.0]);
        let converted = pixel.convert(DataType::UInt8);
        assert_eq!(converted.get::<u8>(0).unwrap(), 0);
        assert_eq!(converted.get::<u8>(1).unwrap(), 255);
        assert_eq!(converted.get::<Bin>(1).unwrap(), Bin::TRUE);
        assert!(pixel.get::<f32>(2).is_err());
    }
}
