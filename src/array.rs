//! Typed in-memory results
//!
//! Backends hand back a [`TypedArray`]: an ndarray `ArrayD<T>` tagged with the
//! element type of the field it came from. [`ArrayCursor`] is the sequential
//! row-major filler backends write decoded values into; it refuses to produce
//! a partially filled array. [`LabeledArray`] pairs a result with the axes that
//! survive the slice.

use crate::axis::Axis;
use crate::errors::{MeteoError, Result};
use crate::field::ElementType;
use ndarray::{ArrayD, IxDyn};
use std::sync::Arc;

/// Scalar types a [`TypedArray`] can hold
pub trait Element: Copy + Default + Into<f64> + Send + Sync + 'static {
    const TYPE: ElementType;
    const WIDTH: usize;

    fn wrap(array: ArrayD<Self>) -> TypedArray;

    /// Decode one value from the first `WIDTH` bytes of `bytes`.
    fn from_le_slice(bytes: &[u8]) -> Self;
    fn from_be_slice(bytes: &[u8]) -> Self;

    /// Lossy conversion used when a delegated reader hands back doubles.
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_element {
    ($t:ty, $variant:ident) => {
        impl Element for $t {
            const TYPE: ElementType = ElementType::$variant;
            const WIDTH: usize = std::mem::size_of::<$t>();

            fn wrap(array: ArrayD<Self>) -> TypedArray {
                TypedArray::$variant(array)
            }

            fn from_le_slice(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(&bytes[..Self::WIDTH]);
                <$t>::from_le_bytes(buf)
            }

            fn from_be_slice(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(&bytes[..Self::WIDTH]);
                <$t>::from_be_bytes(buf)
            }

            fn from_f64(value: f64) -> Self {
                value as $t
            }
        }
    };
}

impl_element!(i8, Byte);
impl_element!(i16, Short);
impl_element!(i32, Int);
impl_element!(f32, Float);
impl_element!(f64, Double);

/// N-dimensional result tagged with its element type
#[derive(Debug, Clone, PartialEq)]
pub enum TypedArray {
    Byte(ArrayD<i8>),
    Short(ArrayD<i16>),
    Int(ArrayD<i32>),
    Float(ArrayD<f32>),
    Double(ArrayD<f64>),
}

macro_rules! dispatch {
    ($value:expr, $a:ident => $body:expr) => {
        match $value {
            TypedArray::Byte($a) => $body,
            TypedArray::Short($a) => $body,
            TypedArray::Int($a) => $body,
            TypedArray::Float($a) => $body,
            TypedArray::Double($a) => $body,
        }
    };
}

macro_rules! rewrap {
    ($value:expr, $a:ident => $body:expr) => {
        match $value {
            TypedArray::Byte($a) => TypedArray::Byte($body),
            TypedArray::Short($a) => TypedArray::Short($body),
            TypedArray::Int($a) => TypedArray::Int($body),
            TypedArray::Float($a) => TypedArray::Float($body),
            TypedArray::Double($a) => TypedArray::Double($body),
        }
    };
}

impl TypedArray {
    pub fn element_type(&self) -> ElementType {
        match self {
            TypedArray::Byte(_) => ElementType::Byte,
            TypedArray::Short(_) => ElementType::Short,
            TypedArray::Int(_) => ElementType::Int,
            TypedArray::Float(_) => ElementType::Float,
            TypedArray::Double(_) => ElementType::Double,
        }
    }

    pub fn shape(&self) -> &[usize] {
        dispatch!(self, a => a.shape())
    }

    pub fn ndim(&self) -> usize {
        dispatch!(self, a => a.ndim())
    }

    pub fn len(&self) -> usize {
        dispatch!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widen every element to `f64`.
    pub fn to_f64(&self) -> ArrayD<f64> {
        dispatch!(self, a => a.mapv(Into::into))
    }

    pub fn get_f64(&self, index: &[usize]) -> Option<f64> {
        dispatch!(self, a => a.get(index).map(|&v| v.into()))
    }

    /// Gather `indices` along `axis`, in list order.
    pub fn select(&self, axis: usize, indices: &[usize]) -> Result<TypedArray> {
        let shape = self.shape();
        let len = *shape.get(axis).ok_or_else(|| {
            MeteoError::invalid_range(format!("axis {axis} out of bounds for rank {}", shape.len()))
        })?;
        if let Some(&bad) = indices.iter().find(|&&i| i >= len) {
            return Err(MeteoError::invalid_range(format!(
                "gather index {bad} out of bounds for axis {axis} of length {len}"
            )));
        }
        Ok(rewrap!(self, a => a.select(ndarray::Axis(axis), indices)))
    }

    /// Flip the storage order of one axis in place.
    pub fn invert_axis(&mut self, axis: usize) {
        dispatch!(self, a => a.invert_axis(ndarray::Axis(axis)))
    }

    /// Drop every length-1 axis.
    #[must_use]
    pub fn reduced(self) -> TypedArray {
        let singletons: Vec<usize> = self
            .shape()
            .iter()
            .enumerate()
            .filter(|(_, &n)| n == 1)
            .map(|(i, _)| i)
            .collect();
        rewrap!(self, a => {
            let mut a = a;
            for &axis in singletons.iter().rev() {
                a = a.index_axis_move(ndarray::Axis(axis), 0);
            }
            a
        })
    }

    pub fn as_f32(&self) -> Option<&ArrayD<f32>> {
        match self {
            TypedArray::Float(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&ArrayD<f64>> {
        match self {
            TypedArray::Double(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<&ArrayD<i16>> {
        match self {
            TypedArray::Short(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_i8(&self) -> Option<&ArrayD<i8>> {
        match self {
            TypedArray::Byte(a) => Some(a),
            _ => None,
        }
    }
}

/// Sequential row-major filler for one result array
#[derive(Debug)]
pub struct ArrayCursor<T: Element> {
    shape: Vec<usize>,
    expected: usize,
    data: Vec<T>,
}

impl<T: Element> ArrayCursor<T> {
    pub fn with_shape(shape: &[usize]) -> Self {
        let expected = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            expected,
            data: Vec::with_capacity(expected),
        }
    }

    pub fn push(&mut self, value: T) {
        self.data.push(value);
    }

    pub fn extend<I: IntoIterator<Item = T>>(&mut self, values: I) {
        self.data.extend(values);
    }

    pub fn written(&self) -> usize {
        self.data.len()
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Freeze into a raw array; fails on under- or over-fill.
    pub fn finish_array(self) -> Result<ArrayD<T>> {
        if self.data.len() != self.expected {
            return Err(MeteoError::format(format!(
                "array cursor wrote {} of {} elements for shape {:?}",
                self.data.len(),
                self.expected,
                self.shape
            )));
        }
        Ok(ArrayD::from_shape_vec(IxDyn(&self.shape), self.data)?)
    }

    pub fn finish(self) -> Result<TypedArray> {
        self.finish_array().map(T::wrap)
    }
}

/// Whether length-1 axes survive into a [`LabeledArray`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReducePolicy {
    #[default]
    Keep,
    DropSingleton,
}

/// A result array together with its post-slice axes
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledArray {
    data: TypedArray,
    axes: Vec<Arc<Axis>>,
}

impl LabeledArray {
    pub fn new(data: TypedArray, axes: Vec<Arc<Axis>>) -> Result<Self> {
        let axis_shape: Vec<usize> = axes.iter().map(|a| a.length()).collect();
        if axis_shape != data.shape() {
            return Err(MeteoError::format(format!(
                "axes shape {axis_shape:?} does not match data shape {:?}",
                data.shape()
            )));
        }
        Ok(Self { data, axes })
    }

    #[must_use]
    pub fn apply(self, policy: ReducePolicy) -> Self {
        match policy {
            ReducePolicy::Keep => self,
            ReducePolicy::DropSingleton => Self {
                data: self.data.reduced(),
                axes: self.axes.into_iter().filter(|a| a.length() != 1).collect(),
            },
        }
    }

    pub fn data(&self) -> &TypedArray {
        &self.data
    }

    pub fn axes(&self) -> &[Arc<Axis>] {
        &self.axes
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn into_parts(self) -> (TypedArray, Vec<Arc<Axis>>) {
        (self.data, self.axes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AxisKind;

    #[test]
    fn cursor_rejects_under_and_over_fill() {
        let mut c = ArrayCursor::<f32>::with_shape(&[2, 2]);
        c.extend([1.0, 2.0, 3.0]);
        assert!(matches!(c.finish(), Err(MeteoError::Format(_))));

        let mut c = ArrayCursor::<i16>::with_shape(&[1, 2]);
        c.extend([1, 2, 3]);
        assert!(c.finish().is_err());

        let mut c = ArrayCursor::<i8>::with_shape(&[1, 2]);
        c.push(-1);
        c.push(5);
        let a = c.finish().unwrap();
        assert_eq!(a.element_type(), ElementType::Byte);
        assert_eq!(a.get_f64(&[0, 0]), Some(-1.0));
    }

    #[test]
    fn select_and_reduce() {
        let a = TypedArray::Float(
            ArrayD::from_shape_vec(IxDyn(&[1, 2, 3]), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(),
        );
        let picked = a.select(2, &[2, 0]).unwrap();
        assert_eq!(picked.shape(), &[1, 2, 2]);
        assert_eq!(picked.get_f64(&[0, 1, 0]), Some(6.0));

        let reduced = picked.reduced();
        assert_eq!(reduced.shape(), &[2, 2]);
        assert!(a.select(2, &[3]).is_err());
    }

    #[test]
    fn labeled_drop_singleton() {
        let data = TypedArray::Double(ArrayD::from_elem(IxDyn(&[1, 3]), 0.5));
        let axes = vec![
            Arc::new(Axis::indexed(AxisKind::Time, "time", 1)),
            Arc::new(Axis::indexed(AxisKind::X, "x", 3)),
        ];
        let labeled = LabeledArray::new(data, axes).unwrap();
        let kept = labeled.clone().apply(ReducePolicy::Keep);
        assert_eq!(kept.shape(), &[1, 3]);
        let dropped = labeled.apply(ReducePolicy::DropSingleton);
        assert_eq!(dropped.shape(), &[3]);
        assert_eq!(dropped.axes().len(), 1);
        assert_eq!(dropped.axes()[0].kind(), AxisKind::X);
    }

    #[test]
    fn decode_endianness() {
        assert_eq!(i16::from_le_slice(&[0x01, 0x02]), 0x0201);
        assert_eq!(i16::from_be_slice(&[0x01, 0x02]), 0x0102);
        assert_eq!(f32::from_be_slice(&1.5f32.to_be_bytes()), 1.5);
    }
}
