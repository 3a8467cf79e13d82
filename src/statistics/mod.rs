//! Statistical reductions over field data
//!
//! Fields are read through any [`FormatBackend`], widened to `f64` with the
//! field's fill value masked to NaN, then reduced in parallel.
//!
//! - [`operations`]: operation names, results and the reduction trait
//! - `lanes`: the rayon lane reducer behind [`StatisticalReduction`]

mod lanes;
pub mod operations;

pub use operations::{StatOperation, StatResult, StatisticalReduction};

use crate::backend::FormatBackend;
use crate::errors::{MeteoError, Result};
use crate::field::{ElementType, Field};
use ndarray::ArrayD;
use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

/// Read the whole field as `f64` with fill values replaced by NaN.
pub fn read_masked<B>(backend: &B, name: &str) -> Result<ArrayD<f64>>
where
    B: FormatBackend + ?Sized,
{
    let field = backend.field(name)?;
    let data = backend.read_full(name)?;
    Ok(mask_fill(data.to_f64(), field))
}

fn mask_fill(mut data: ArrayD<f64>, field: &Field) -> ArrayD<f64> {
    // compare at the stored precision so a widened f32 fill still matches
    let fill = match field.element_type() {
        ElementType::Float => f64::from(field.fill_value() as f32),
        _ => field.fill_value(),
    };
    if fill.is_finite() {
        data.mapv_inplace(|v| if v == fill { f64::NAN } else { v });
    }
    data
}

/// Reduce `name` along the axis with short name `axis_name`.
///
/// # Errors
///
/// Returns [`MeteoError::InvalidRange`] if the field has no such axis.
pub fn reduce_field<B>(
    backend: &B,
    name: &str,
    axis_name: &str,
    operation: StatOperation,
) -> Result<StatResult>
where
    B: FormatBackend + ?Sized,
{
    let field = backend.field(name)?;
    let axis = field.index_of_axis_named(axis_name).ok_or_else(|| {
        let known: Vec<&str> = field.axes().iter().map(|a| a.short_name()).collect();
        MeteoError::invalid_range(format!(
            "field '{name}' has no axis '{axis_name}' (axes: {})",
            known.join(", ")
        ))
    })?;

    info!(
        field = name,
        axis = axis_name,
        op = operation.as_str(),
        "computing reduction"
    );

    let data = read_masked(backend, name)?;
    let reduced = data.reduce_along_axis(axis, operation)?;
    let axes = field
        .axes()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != axis)
        .map(|(_, a)| a.clone())
        .collect();

    Ok(StatResult {
        data: reduced,
        axes,
        operation,
        field_name: name.to_string(),
        axis_name: axis_name.to_string(),
    })
}

/// Whole-field summary over valid (non-fill, finite) values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSummary {
    pub count: usize,
    pub valid: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
}

impl FieldSummary {
    pub fn from_values(data: &ArrayD<f64>) -> Self {
        let values: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
        let count = data.len();
        let valid = values.len();
        if valid == 0 {
            return Self {
                count,
                valid,
                min: None,
                max: None,
                mean: None,
                std: None,
            };
        }

        let (sum, min, max) = values
            .par_iter()
            .fold(
                || (0.0_f64, f64::INFINITY, f64::NEG_INFINITY),
                |(s, lo, hi), &v| (s + v, lo.min(v), hi.max(v)),
            )
            .reduce(
                || (0.0_f64, f64::INFINITY, f64::NEG_INFINITY),
                |a, b| (a.0 + b.0, a.1.min(b.1), a.2.max(b.2)),
            );
        let mean = sum / valid as f64;
        let var = values.par_iter().map(|v| (v - mean).powi(2)).sum::<f64>() / valid as f64;

        Self {
            count,
            valid,
            min: Some(min),
            max: Some(max),
            mean: Some(mean),
            std: Some(var.sqrt()),
        }
    }
}

/// Summarize a whole field.
pub fn summarize_field<B>(backend: &B, name: &str) -> Result<FieldSummary>
where
    B: FormatBackend + ?Sized,
{
    let data = read_masked(backend, name)?;
    Ok(FieldSummary::from_values(&data))
}
