//! Token helpers shared by the text formats

use crate::array::{ArrayCursor, Element, TypedArray};
use crate::errors::{MeteoError, Result};
use crate::field::ElementType;
use crate::layout::StorageLayout;
use crate::range::Section;
use std::str::{FromStr, SplitWhitespace};

/// Whitespace token stream with typed, error-reporting accessors
pub(crate) struct Tokens<'a> {
    inner: SplitWhitespace<'a>,
    context: &'static str,
    consumed: usize,
}

impl<'a> Tokens<'a> {
    pub fn new(text: &'a str, context: &'static str) -> Self {
        Self {
            inner: text.split_whitespace(),
            context,
            consumed: 0,
        }
    }

    pub fn next_token(&mut self) -> Result<&'a str> {
        let token = self.inner.next().ok_or_else(|| {
            MeteoError::format(format!(
                "{}: expected more than {} tokens",
                self.context, self.consumed
            ))
        })?;
        self.consumed += 1;
        Ok(token)
    }

    pub fn parse<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self.next_token()?;
        token.parse::<T>().map_err(|_| {
            MeteoError::format(format!("{}: bad {what} '{token}'", self.context))
        })
    }

    /// Numeric token that may be written as a float, e.g. `12.0` for a count.
    pub fn parse_count(&mut self, what: &str) -> Result<usize> {
        let value: f64 = self.parse(what)?;
        if value < 0.0 || value.fract() != 0.0 {
            return Err(MeteoError::format(format!(
                "{}: {what} must be a non-negative integer, got {value}",
                self.context
            )));
        }
        Ok(value as usize)
    }

    /// Up to `n` further values; fewer means the data ran out.
    pub fn take_values(&mut self, n: usize) -> Result<Vec<f64>> {
        let mut values = Vec::with_capacity(n);
        for token in self.inner.by_ref().take(n) {
            let v = token.parse::<f64>().map_err(|_| {
                MeteoError::format(format!("{}: bad value '{token}'", self.context))
            })?;
            values.push(v);
        }
        self.consumed += values.len();
        if values.len() < n {
            return Err(MeteoError::truncated(format!(
                "{}: expected {n} values, found {}",
                self.context,
                values.len()
            )));
        }
        Ok(values)
    }
}

/// Gather `section` out of fully decoded values stored with `layout`
/// (element width 1, so offsets are value indices).
pub(crate) fn gather(
    values: &[f64],
    layout: &StorageLayout,
    element_type: ElementType,
    section: &Section,
) -> Result<TypedArray> {
    match element_type {
        ElementType::Byte => gather_as::<i8>(values, layout, section),
        ElementType::Short => gather_as::<i16>(values, layout, section),
        ElementType::Int => gather_as::<i32>(values, layout, section),
        ElementType::Float => gather_as::<f32>(values, layout, section),
        ElementType::Double => gather_as::<f64>(values, layout, section),
    }
}

fn gather_as<T: Element>(
    values: &[f64],
    layout: &StorageLayout,
    section: &Section,
) -> Result<TypedArray> {
    let mut cursor = ArrayCursor::<T>::with_shape(&section.shape());
    for offset in layout.offsets(section)? {
        let v = values.get(offset as usize).ok_or_else(|| {
            MeteoError::truncated(format!(
                "value {offset} requested but only {} decoded",
                values.len()
            ))
        })?;
        cursor.push(T::from_f64(*v));
    }
    cursor.finish()
}

/// First line of `text`, without the line terminator.
pub(crate) fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim_end_matches('\r')
}
