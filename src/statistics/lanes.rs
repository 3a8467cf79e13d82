//! Reductions over the lanes of one axis
//!
//! A lane is the run of values along the reduced axis behind one output
//! cell. Lanes are reduced independently on the rayon pool. Non-finite
//! values (masked fill included) never contribute.

use super::StatOperation;
use ndarray::{ArrayD, ArrayView1, Axis, Zip};
use tracing::debug;

/// Reduce every lane along `axis`; the caller checks `axis < data.ndim()`.
pub(crate) fn reduce_lanes(
    data: &ArrayD<f64>,
    axis: usize,
    operation: StatOperation,
) -> ArrayD<f64> {
    debug!(
        op = operation.as_str(),
        axis,
        lane_len = data.len_of(Axis(axis)),
        threads = rayon::current_num_threads(),
        "reducing lanes"
    );
    Zip::from(data.lanes(Axis(axis))).par_map_collect(|lane| reduce_lane(lane, operation))
}

/// Min, max and mean of a lane with no finite value are NaN; its sum is 0.
fn reduce_lane(lane: ArrayView1<'_, f64>, operation: StatOperation) -> f64 {
    let valid = lane.iter().copied().filter(|v| v.is_finite());
    match operation {
        StatOperation::Sum => valid.sum(),
        StatOperation::Min => valid.reduce(f64::min).unwrap_or(f64::NAN),
        StatOperation::Max => valid.reduce(f64::max).unwrap_or(f64::NAN),
        StatOperation::Mean => {
            let (sum, n) = valid.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            if n == 0 {
                f64::NAN
            } else {
                sum / n as f64
            }
        }
    }
}
