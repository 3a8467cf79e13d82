//! Axis descriptors
//!
//! An [`Axis`] is one dimension of a field tagged with its semantic kind.
//! Axes are built once while a backend parses its header and are then shared
//! read-only through `Arc<Axis>` by every field that spans them.

use crate::errors::{MeteoError, Result};
use crate::range::Range;
use serde::Serialize;
use std::fmt;

/// Semantic role of an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AxisKind {
    Time,
    Vertical,
    Y,
    X,
    Other,
}

impl AxisKind {
    pub const ALL: [AxisKind; 5] = [
        AxisKind::Time,
        AxisKind::Vertical,
        AxisKind::Y,
        AxisKind::X,
        AxisKind::Other,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Vertical => "vertical",
            Self::Y => "y",
            Self::X => "x",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AxisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dimension of a field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    kind: AxisKind,
    short_name: String,
    length: usize,
    coordinates: Option<Vec<f64>>,
    reversed: bool,
    unlimited: bool,
}

impl Axis {
    /// An axis with explicit coordinate values; length follows the values.
    pub fn with_coordinates(
        kind: AxisKind,
        short_name: impl Into<String>,
        coordinates: Vec<f64>,
    ) -> Self {
        Self {
            kind,
            short_name: short_name.into(),
            length: coordinates.len(),
            coordinates: Some(coordinates),
            reversed: false,
            unlimited: false,
        }
    }

    /// An unindexed axis that only carries a length.
    pub fn unindexed(kind: AxisKind, short_name: impl Into<String>, length: usize) -> Self {
        Self {
            kind,
            short_name: short_name.into(),
            length,
            coordinates: None,
            reversed: false,
            unlimited: false,
        }
    }

    /// Coordinates `start, start+delta, ...` of the given length.
    pub fn regular(
        kind: AxisKind,
        short_name: impl Into<String>,
        start: f64,
        delta: f64,
        length: usize,
    ) -> Self {
        let coords = (0..length).map(|i| start + delta * i as f64).collect();
        Self::with_coordinates(kind, short_name, coords)
    }

    /// Grid-index coordinates `0, 1, ..., length-1`.
    pub fn indexed(kind: AxisKind, short_name: impl Into<String>, length: usize) -> Self {
        Self::regular(kind, short_name, 0.0, 1.0, length)
    }

    /// Mark the axis as stored on disk in descending coordinate order.
    #[must_use]
    pub fn reversed(mut self, reversed: bool) -> Self {
        self.reversed = reversed;
        self
    }

    #[must_use]
    pub fn unlimited(mut self, unlimited: bool) -> Self {
        self.unlimited = unlimited;
        self
    }

    pub fn kind(&self) -> AxisKind {
        self.kind
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn coordinates(&self) -> Option<&[f64]> {
        self.coordinates.as_deref()
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    pub fn is_unlimited(&self) -> bool {
        self.unlimited
    }

    pub fn coordinate(&self, index: usize) -> Option<f64> {
        self.coordinates.as_ref().and_then(|c| c.get(index).copied())
    }

    pub fn min(&self) -> Option<f64> {
        self.coordinates
            .as_ref()
            .and_then(|c| c.iter().copied().reduce(f64::min))
    }

    pub fn max(&self) -> Option<f64> {
        self.coordinates
            .as_ref()
            .and_then(|c| c.iter().copied().reduce(f64::max))
    }

    /// Spacing between the first two coordinates.
    pub fn delta(&self) -> Option<f64> {
        match self.coordinates.as_deref() {
            Some([a, b, ..]) => Some(b - a),
            _ => None,
        }
    }

    /// The sub-axis covered by `range`.
    pub fn extract(&self, range: &Range) -> Result<Axis> {
        range.check_within(self.length)?;
        Ok(self.subset(range.indices()))
    }

    /// The sub-axis made of the listed indices, in list order.
    pub fn extract_indices(&self, indices: &[usize]) -> Result<Axis> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.length) {
            return Err(MeteoError::invalid_range(format!(
                "index {bad} out of bounds for axis '{}' of length {}",
                self.short_name, self.length
            )));
        }
        Ok(self.subset(indices.iter().copied()))
    }

    fn subset(&self, indices: impl Iterator<Item = usize> + Clone) -> Axis {
        let length = indices.clone().count();
        let coordinates = self
            .coordinates
            .as_ref()
            .map(|c| indices.map(|i| c[i]).collect());
        Axis {
            kind: self.kind,
            short_name: self.short_name.clone(),
            length,
            coordinates,
            reversed: self.reversed,
            unlimited: false,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}] ({})", self.short_name, self.length, self.kind)?;
        if self.reversed {
            write!(f, " reversed")?;
        }
        if self.unlimited {
            write!(f, " unlimited")?;
        }
        Ok(())
    }
}
