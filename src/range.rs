//! Inclusive strided ranges and their composition into sections
//!
//! A [`Range`] is the per-axis slice request: `first` and `last` are both
//! inclusive and `stride` is at least one. A [`Section`] holds one range per
//! axis of the field being read, in the field's axis order.

use crate::errors::{MeteoError, Result};
use crate::field::Field;
use serde::Serialize;
use std::fmt;

/// Inclusive, strided span along one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Range {
    first: usize,
    last: usize,
    stride: usize,
}

impl Range {
    /// Create a range, normalising `last` to the last index the stride reaches.
    ///
    /// # Errors
    ///
    /// Returns [`MeteoError::InvalidRange`] if `first > last` or `stride < 1`.
    pub fn new(first: usize, last: usize, stride: usize) -> Result<Self> {
        if stride < 1 {
            return Err(MeteoError::invalid_range(format!(
                "stride must be >= 1, got {stride}"
            )));
        }
        if first > last {
            return Err(MeteoError::invalid_range(format!(
                "first ({first}) > last ({last})"
            )));
        }
        let last = first + (last - first) / stride * stride;
        Ok(Self {
            first,
            last,
            stride,
        })
    }

    /// A length-1 range pinned at `index`.
    pub fn single(index: usize) -> Self {
        Self {
            first: index,
            last: index,
            stride: 1,
        }
    }

    /// The maximal range `0..=len-1` for an axis of length `len`.
    pub fn full(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(MeteoError::invalid_range("cannot span an empty axis"));
        }
        Self::new(0, len - 1, 1)
    }

    /// Build from the legacy origin/size/stride triple where `size` is the
    /// number of indices the range covers, not the number it yields.
    pub fn from_origin_size(origin: usize, size: usize, stride: usize) -> Result<Self> {
        if size == 0 {
            return Err(MeteoError::invalid_range(format!(
                "size must be >= 1 at origin {origin}"
            )));
        }
        Self::new(origin, origin + size - 1, stride)
    }

    pub fn first(&self) -> usize {
        self.first
    }

    pub fn last(&self) -> usize {
        self.last
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of indices the range yields.
    pub fn length(&self) -> usize {
        (self.last - self.first) / self.stride + 1
    }

    /// The `i`-th index yielded by the range.
    pub fn element(&self, i: usize) -> Option<usize> {
        (i < self.length()).then(|| self.first + i * self.stride)
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.first && index <= self.last && (index - self.first) % self.stride == 0
    }

    /// Enumerate the indices `first, first+stride, ..., last`.
    pub fn indices(&self) -> impl Iterator<Item = usize> + Clone {
        (self.first..=self.last).step_by(self.stride)
    }

    /// Fail unless every index lies within an axis of length `axis_len`.
    pub fn check_within(&self, axis_len: usize) -> Result<()> {
        if axis_len == 0 || self.last > axis_len - 1 {
            return Err(MeteoError::invalid_range(format!(
                "range {self} exceeds axis length {axis_len}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.first, self.last, self.stride)
    }
}

/// Ordered per-axis ranges describing a slice of one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    ranges: Vec<Range>,
}

impl Section {
    pub fn new(ranges: Vec<Range>) -> Self {
        Self { ranges }
    }

    /// The maximal section of `field`: every axis from 0 to length-1.
    pub fn full(field: &Field) -> Result<Self> {
        let ranges = field
            .axes()
            .iter()
            .map(|axis| Range::full(axis.length()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { ranges })
    }

    /// Build from parallel origin/size/stride arrays; a missing stride
    /// array means unit stride everywhere.
    pub fn from_origin_size_stride(
        origin: &[usize],
        size: &[usize],
        stride: Option<&[usize]>,
    ) -> Result<Self> {
        if origin.len() != size.len() || stride.is_some_and(|s| s.len() != origin.len()) {
            return Err(MeteoError::invalid_range(format!(
                "origin/size/stride rank mismatch: {}/{}/{}",
                origin.len(),
                size.len(),
                stride.map_or(origin.len(), <[usize]>::len)
            )));
        }
        let ranges = origin
            .iter()
            .zip(size)
            .enumerate()
            .map(|(i, (&o, &s))| Range::from_origin_size(o, s, stride.map_or(1, |st| st[i])))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { ranges })
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn range(&self, axis: usize) -> Option<&Range> {
        self.ranges.get(axis)
    }

    pub fn rank(&self) -> usize {
        self.ranges.len()
    }

    /// Output shape: one entry per axis, equal to that range's length.
    pub fn shape(&self) -> Vec<usize> {
        self.ranges.iter().map(Range::length).collect()
    }

    pub fn element_count(&self) -> usize {
        self.ranges.iter().map(Range::length).product()
    }

    /// Check rank and per-axis bounds against a field.
    pub fn validate_for(&self, field: &Field) -> Result<()> {
        if self.rank() != field.rank() {
            return Err(MeteoError::invalid_range(format!(
                "section rank {} does not match rank {} of field '{}'",
                self.rank(),
                field.rank(),
                field.name()
            )));
        }
        for (range, axis) in self.ranges.iter().zip(field.axes()) {
            range.check_within(axis.length()).map_err(|_| {
                MeteoError::invalid_range(format!(
                    "range {range} exceeds axis '{}' (length {}) of field '{}'",
                    axis.short_name(),
                    axis.length(),
                    field.name()
                ))
            })?;
        }
        Ok(())
    }

    /// Iterate index tuples in row-major order, last axis fastest.
    pub fn index_iter(&self) -> SectionIndexIter<'_> {
        SectionIndexIter {
            ranges: &self.ranges,
            counters: vec![0; self.ranges.len()],
            remaining: self.element_count(),
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.ranges.iter().map(Range::to_string).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Odometer over the index tuples of a [`Section`]
pub struct SectionIndexIter<'a> {
    ranges: &'a [Range],
    counters: Vec<usize>,
    remaining: usize,
}

impl Iterator for SectionIndexIter<'_> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let current: Vec<usize> = self
            .ranges
            .iter()
            .zip(&self.counters)
            .map(|(r, &c)| r.first() + c * r.stride())
            .collect();

        self.remaining -= 1;
        for axis in (0..self.ranges.len()).rev() {
            self.counters[axis] += 1;
            if self.counters[axis] < self.ranges[axis].length() {
                break;
            }
            self.counters[axis] = 0;
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for SectionIndexIter<'_> {}
