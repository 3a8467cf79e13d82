//! Reduction names, reduction results and the axis-reduction trait

use crate::axis::Axis;
use crate::errors::{MeteoError, Result};
use ndarray::ArrayD;
use std::str::FromStr;
use std::sync::Arc;

/// Reduction applied to every lane of one axis; only finite values count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatOperation {
    Mean,
    Sum,
    Min,
    Max,
}

impl StatOperation {
    pub const ALL: [StatOperation; 4] = [Self::Mean, Self::Sum, Self::Min, Self::Max];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

impl FromStr for StatOperation {
    type Err = MeteoError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == lower)
            .ok_or_else(|| MeteoError::invalid_range(format!("unknown statistic '{s}'")))
    }
}

/// Result of reducing one field along one axis
#[derive(Debug)]
pub struct StatResult {
    pub data: ArrayD<f64>,
    /// Axes left after the reduction
    pub axes: Vec<Arc<Axis>>,
    pub operation: StatOperation,
    pub field_name: String,
    pub axis_name: String,
}

impl StatResult {
    /// Name a derived field would carry, e.g. `t_mean_over_time`.
    pub fn derived_name(&self) -> String {
        format!(
            "{}_{}_over_{}",
            self.field_name,
            self.operation.as_str(),
            self.axis_name
        )
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }
}

/// Types that can reduce along one axis, skipping non-finite values
pub trait StatisticalReduction {
    /// # Errors
    ///
    /// Returns [`MeteoError::InvalidRange`] if `axis` is out of bounds.
    fn reduce_along_axis(&self, axis: usize, operation: StatOperation) -> Result<ArrayD<f64>>;
}

impl StatisticalReduction for ArrayD<f64> {
    fn reduce_along_axis(&self, axis: usize, operation: StatOperation) -> Result<ArrayD<f64>> {
        if axis >= self.ndim() {
            return Err(MeteoError::invalid_range(format!(
                "axis {axis} is out of bounds for array with {} dimensions",
                self.ndim()
            )));
        }

        Ok(super::lanes::reduce_lanes(self, axis, operation))
    }
}
