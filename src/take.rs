//! Fancy indexing over any backend
//!
//! Backends only understand regular strided sections. A take request mixes
//! ranges with explicit index lists; it is served by reading the bounding
//! section once and gathering the listed indices out of the result.

use crate::array::LabeledArray;
use crate::axis::Axis;
use crate::backend::FormatBackend;
use crate::errors::{MeteoError, Result};
use crate::range::{Range, Section};
use std::sync::Arc;
use tracing::trace;

/// Per-axis part of a take request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisSelector {
    Range(Range),
    /// Discrete indices in output order; may repeat or run backwards.
    Indices(Vec<usize>),
}

impl AxisSelector {
    pub fn all(len: usize) -> Result<Self> {
        Ok(Self::Range(Range::full(len)?))
    }

    /// Smallest stride-1 range covering the selector, or the range itself.
    pub fn bounding(&self) -> Result<Range> {
        match self {
            Self::Range(r) => Ok(*r),
            Self::Indices(list) => {
                let (Some(&lo), Some(&hi)) = (list.iter().min(), list.iter().max()) else {
                    return Err(MeteoError::invalid_range("empty index list"));
                };
                Range::new(lo, hi, 1)
            }
        }
    }
}

impl From<Range> for AxisSelector {
    fn from(r: Range) -> Self {
        Self::Range(r)
    }
}

impl From<Vec<usize>> for AxisSelector {
    fn from(indices: Vec<usize>) -> Self {
        Self::Indices(indices)
    }
}

/// Read `name` with one selector per axis.
pub fn take<B>(backend: &B, name: &str, selectors: &[AxisSelector]) -> Result<LabeledArray>
where
    B: FormatBackend + ?Sized,
{
    let field = backend.field(name)?;
    if selectors.len() != field.rank() {
        return Err(MeteoError::invalid_range(format!(
            "{} selectors given for '{name}' of rank {}",
            selectors.len(),
            field.rank()
        )));
    }

    let bounds = selectors
        .iter()
        .map(AxisSelector::bounding)
        .collect::<Result<Vec<_>>>()?;
    let section = Section::new(bounds.clone());
    trace!(field = name, section = %section, "take bounding read");
    let mut data = backend.read_section(name, &section)?;

    let mut axes: Vec<Arc<Axis>> = Vec::with_capacity(selectors.len());
    for (i, (selector, bound)) in selectors.iter().zip(&bounds).enumerate() {
        let axis = &field.axes()[i];
        match selector {
            AxisSelector::Range(r) => axes.push(Arc::new(axis.extract(r)?)),
            AxisSelector::Indices(list) => {
                let rebased: Vec<usize> = list.iter().map(|&j| j - bound.first()).collect();
                data = data.select(i, &rebased)?;
                axes.push(Arc::new(axis.extract_indices(list)?));
            }
        }
    }
    LabeledArray::new(data, axes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SurferGridBackend;
    use std::io::Write;

    fn grid() -> (tempfile::NamedTempFile, SurferGridBackend) {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "DSAA\n4 3\n0 3\n0 2\n0 11\n0 1 2 3\n4 5 6 7\n8 9 10 11\n").unwrap();
        tmp.flush().unwrap();
        let b = SurferGridBackend::open(tmp.path()).unwrap();
        (tmp, b)
    }

    #[test]
    fn single_index_matches_length_one_range() {
        let (_tmp, b) = grid();
        for i in 0..4 {
            let picked = take(&b, "var", &[AxisSelector::all(3).unwrap(), vec![i].into()]).unwrap();
            let direct = b
                .read_section(
                    "var",
                    &Section::new(vec![Range::full(3).unwrap(), Range::single(i)]),
                )
                .unwrap();
            assert_eq!(picked.data(), &direct);
        }
    }

    #[test]
    fn gathers_out_of_order_with_axes() {
        let (_tmp, b) = grid();
        let out = take(
            &b,
            "var",
            &[vec![2, 0].into(), Range::new(1, 3, 2).unwrap().into()],
        )
        .unwrap();
        assert_eq!(out.shape(), &[2, 2]);
        assert_eq!(out.data().get_f64(&[0, 0]), Some(9.0));
        assert_eq!(out.data().get_f64(&[1, 1]), Some(3.0));
        assert_eq!(out.axes()[0].coordinates(), Some(&[2.0, 0.0][..]));
        assert_eq!(out.axes()[1].coordinates(), Some(&[1.0, 3.0][..]));
    }

    #[test]
    fn empty_list_and_rank_mismatch() {
        let (_tmp, b) = grid();
        assert!(matches!(
            take(&b, "var", &[vec![].into(), vec![0].into()]),
            Err(MeteoError::InvalidRange(_))
        ));
        assert!(matches!(
            take(&b, "var", &[vec![0].into()]),
            Err(MeteoError::InvalidRange(_))
        ));
        assert!(matches!(
            take(&b, "var", &[vec![5].into(), vec![0].into()]),
            Err(MeteoError::InvalidRange(_))
        ));
    }
}
