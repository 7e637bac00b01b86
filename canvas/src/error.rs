//! The error type shared by all operations on images.
use std::borrow::Cow;
use std::fmt;

use ndimage_texel::{SampleTypeMismatch, UnknownDataType};

/// The category of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A precondition on the arguments was not met. Nothing was modified.
    Parameter,
    /// A buffer could not be allocated. The image stays unforged.
    Allocation,
    /// An internal invariant does not hold, this is a defect in the library.
    Internal,
    /// An arithmetic domain error.
    Arithmetic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Parameter => "parameter error",
            ErrorKind::Allocation => "allocation error",
            ErrorKind::Internal => "internal error",
            ErrorKind::Arithmetic => "arithmetic error",
        })
    }
}

/// An error raised by an image operation.
///
/// Carries a human readable message. In debug builds, operations that forward an error annotate
/// it with their name, available through [`Error::trace`].
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: Cow<'static, str>,
    trace: Vec<&'static str>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Error {
            kind,
            message: message.into(),
            trace: Vec::new(),
        }
    }

    pub fn parameter(message: impl Into<Cow<'static, str>>) -> Self {
        Error::new(ErrorKind::Parameter, message)
    }

    pub fn allocation(message: impl Into<Cow<'static, str>>) -> Self {
        Error::new(ErrorKind::Allocation, message)
    }

    pub fn internal(message: impl Into<Cow<'static, str>>) -> Self {
        Error::new(ErrorKind::Internal, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The operations the error passed through, innermost first. Empty in release builds.
    pub fn trace(&self) -> &[&'static str] {
        &self.trace
    }

    /// Record that the error passed through `site`.
    #[cfg_attr(not(debug_assertions), allow(unused_mut))]
    pub fn context(mut self, site: &'static str) -> Self {
        #[cfg(debug_assertions)]
        self.trace.push(site);
        #[cfg(not(debug_assertions))]
        let _ = site;
        self
    }
}

/// Annotate errors on their way up.
pub trait ResultExt<T> {
    fn context(self, site: &'static str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, site: &'static str) -> Result<T> {
        self.map_err(|err| err.context(site))
    }
}

impl From<UnknownDataType> for Error {
    fn from(err: UnknownDataType) -> Self {
        Error::parameter(err.to_string())
    }
}

impl From<SampleTypeMismatch> for Error {
    fn from(err: SampleTypeMismatch) -> Self {
        Error::parameter(err.to_string())
    }
}

/// Messages used for errors raised in several places.
pub mod messages {
    pub const IMAGE_NOT_FORGED: &str = "image is not forged";
    pub const IMAGE_NOT_RAW: &str = "image is already forged";
    pub const IMAGE_PROTECTED: &str = "image is protected";
    pub const SIZES_DONT_MATCH: &str = "sizes don't match";
    pub const DIMENSIONALITIES_DONT_MATCH: &str = "dimensionalities don't match";
    pub const ARRAY_SIZES_DONT_MATCH: &str = "array sizes don't match";
    pub const TENSOR_ELEMENTS_DONT_MATCH: &str = "number of tensor elements doesn't match";
    pub const INDEX_OUT_OF_RANGE: &str = "index out of range";
    pub const COORDINATES_OUT_OF_RANGE: &str = "coordinates out of range";
    pub const ILLEGAL_DIMENSION: &str = "illegal dimension";
    pub const INVALID_PERMUTATION: &str = "invalid permutation of dimensions";
    pub const DIMENSION_NOT_SINGLETON: &str = "dimension is not a singleton";
    pub const ZERO_SIZE: &str = "sizes must be non-zero";
    pub const STRIDES_INVALID: &str = "strides make samples overlap or are inconsistent with sizes";
    pub const DATA_TYPE_NOT_SUPPORTED: &str = "data type not supported";
    pub const IMAGE_NOT_SCALAR: &str = "image is not scalar";
    pub const IMAGE_NOT_COMPLEX: &str = "image is not complex";
    pub const NO_SIMPLE_STRIDE: &str = "image has no simple stride, cannot flatten without copying";
    pub const SIZE_EXCEEDS_LIMIT: &str = "image size exceeds addressable memory";
    pub const INVALID_FLAG: &str = "invalid flag";
    pub const OUTPUT_STRIDES_ALIAS: &str = "output image has lines that alias each other";
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, ResultExt};

    #[test]
    fn message_and_kind() {
        let err = Error::parameter(super::messages::SIZES_DONT_MATCH);
        assert_eq!(err.kind(), ErrorKind::Parameter);
        assert_eq!(err.to_string(), "parameter error: sizes don't match");
    }

    #[test]
    fn trace_is_recorded_in_debug_builds() {
        let result: super::Result<()> = Err(Error::internal("broken"));
        let err = result.context("inner").context("outer").unwrap_err();
        if cfg!(debug_assertions) {
            assert_eq!(err.trace(), &["inner", "outer"]);
        } else {
            assert!(err.trace().is_empty());
        }
    }
}
