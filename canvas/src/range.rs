//! Index ranges along one dimension, used to slice images.
use crate::error::{messages, Error, Result};

/// A range of indices along one dimension.
///
/// Both ends are inclusive. Negative indices count from the end, `-1` being the last index. If
/// `start` comes after `stop` the range walks backwards, yielding a mirrored view. The `step`
/// is always positive, its sign is implied by the direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: isize,
    pub stop: isize,
    pub step: usize,
}

/// A [`Range`] resolved against a concrete size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FixedRange {
    /// The first index, in bounds.
    pub start: usize,
    /// The number of indices in the range, at least one.
    pub len: usize,
    /// Signed distance between consecutive indices.
    pub step: isize,
}

impl Range {
    /// The whole dimension.
    pub const fn all() -> Self {
        Range {
            start: 0,
            stop: -1,
            step: 1,
        }
    }

    /// A single index.
    pub const fn at(index: isize) -> Self {
        Range {
            start: index,
            stop: index,
            step: 1,
        }
    }

    pub const fn new(start: isize, stop: isize) -> Self {
        Range {
            start,
            stop,
            step: 1,
        }
    }

    pub const fn with_step(start: isize, stop: isize, step: usize) -> Self {
        Range { start, stop, step }
    }

    /// Resolve negative indices and the direction against a dimension of `size`.
    ///
    /// The stop index is moved towards the start so that it is reached by a whole number of
    /// steps.
    pub fn fix(&self, size: usize) -> Result<FixedRange> {
        if self.step == 0 {
            return Err(Error::parameter("range step must be positive"));
        }

        let start = resolve(self.start, size)?;
        let stop = resolve(self.stop, size)?;
        let step = self.step;
        let distance = start.abs_diff(stop);
        let len = distance / step + 1;

        let step = isize::try_from(step)
            .map_err(|_| Error::parameter(messages::INDEX_OUT_OF_RANGE))?;
        Ok(FixedRange {
            start,
            len,
            step: if stop < start { -step } else { step },
        })
    }
}

impl Default for Range {
    fn default() -> Self {
        Range::all()
    }
}

impl FixedRange {
    /// The last index actually visited.
    pub fn last(&self) -> usize {
        let span = (self.len - 1) as isize * self.step;
        (self.start as isize + span) as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).map(move |idx| (self.start as isize + idx as isize * self.step) as usize)
    }
}

fn resolve(index: isize, size: usize) -> Result<usize> {
    let resolved = if index < 0 {
        size.checked_sub(index.unsigned_abs())
    } else {
        Some(index as usize)
    };

    match resolved {
        Some(index) if index < size => Ok(index),
        _ => Err(Error::parameter(messages::INDEX_OUT_OF_RANGE)),
    }
}

#[cfg(test)]
mod tests {
    use super::{FixedRange, Range};

    #[test]
    fn negative_indices_count_from_the_end() {
        assert_eq!(
            Range::all().fix(10).unwrap(),
            FixedRange {
                start: 0,
                len: 10,
                step: 1
            }
        );
        assert_eq!(Range::at(-2).fix(10).unwrap().start, 8);
        assert!(Range::at(-11).fix(10).is_err());
        assert!(Range::at(10).fix(10).is_err());
    }

    #[test]
    fn stop_is_snapped_to_the_step() {
        let fixed = Range::with_step(1, 8, 3).fix(10).unwrap();
        assert_eq!(fixed.len, 3);
        assert_eq!(fixed.last(), 7);
        assert_eq!(fixed.iter().collect::<Vec<_>>(), [1, 4, 7]);
    }

    #[test]
    fn backwards() {
        let fixed = Range::with_step(-1, 0, 2).fix(5).unwrap();
        assert_eq!(fixed.step, -2);
        assert_eq!(fixed.iter().collect::<Vec<_>>(), [4, 2, 0]);
        assert!(Range::with_step(0, 1, 0).fix(5).is_err());
    }
}
