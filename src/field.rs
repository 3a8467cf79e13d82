//! Field descriptors and attributes
//!
//! A [`Field`] names one readable variable: its axes in storage-independent
//! logical order (outermost first), element type, fill value and attributes.
//! Backends assemble fields with a [`FieldBuilder`] while parsing a header and
//! never touch them again afterwards.

use crate::axis::{Axis, AxisKind};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Element types a backend can hand back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ElementType {
    Byte,
    Short,
    Int,
    Float,
    Double,
}

impl ElementType {
    /// Size in bytes of one stored element.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Short => 2,
            Self::Int | Self::Float => 4,
            Self::Double => 8,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Int => "int",
            Self::Float => "float",
            Self::Double => "double",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Numbers(Vec<f64>),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(s) => f.write_str(s),
            AttributeValue::Numbers(v) if v.len() == 1 => write!(f, "{}", v[0]),
            AttributeValue::Numbers(v) => {
                let parts: Vec<String> = v.iter().map(f64::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Named attribute attached to a field or to the whole dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: AttributeValue::Text(value.into()),
        }
    }

    pub fn number(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: AttributeValue::Numbers(vec![value]),
        }
    }

    pub fn numbers(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            value: AttributeValue::Numbers(values),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            AttributeValue::Text(s) => Some(s),
            AttributeValue::Numbers(_) => None,
        }
    }

    pub fn as_numbers(&self) -> Option<&[f64]> {
        match &self.value {
            AttributeValue::Numbers(v) => Some(v),
            AttributeValue::Text(_) => None,
        }
    }
}

/// Look up an attribute by name.
pub fn find_attribute<'a>(attributes: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
    attributes.iter().find(|a| a.name == name)
}

/// A named, multi-axis variable
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    element_type: ElementType,
    axes: Vec<Arc<Axis>>,
    attributes: Vec<Attribute>,
    fill_value: f64,
    is_station: bool,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn axes(&self) -> &[Arc<Axis>] {
        &self.axes
    }

    pub fn axis(&self, index: usize) -> Option<&Arc<Axis>> {
        self.axes.get(index)
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        find_attribute(&self.attributes, name)
    }

    pub fn fill_value(&self) -> f64 {
        self.fill_value
    }

    pub fn is_station(&self) -> bool {
        self.is_station
    }

    pub fn rank(&self) -> usize {
        self.axes.len()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(|a| a.length()).collect()
    }

    pub fn element_count(&self) -> usize {
        self.axes.iter().map(|a| a.length()).product()
    }

    /// First axis of the given kind.
    pub fn axis_of(&self, kind: AxisKind) -> Option<&Arc<Axis>> {
        self.axes.iter().find(|a| a.kind() == kind)
    }

    /// Position of the first axis of the given kind.
    pub fn index_of_axis(&self, kind: AxisKind) -> Option<usize> {
        self.axes.iter().position(|a| a.kind() == kind)
    }

    /// Position of the axis with the given short name.
    pub fn index_of_axis_named(&self, name: &str) -> Option<usize> {
        self.axes.iter().position(|a| a.short_name() == name)
    }

    pub fn units(&self) -> Option<&str> {
        self.attribute("units").and_then(Attribute::as_text)
    }

    pub fn description(&self) -> Option<&str> {
        self.attribute("description").and_then(Attribute::as_text)
    }
}

/// Append-only builder used during header parsing
#[derive(Debug, Clone)]
pub struct FieldBuilder {
    field: Field,
}

impl FieldBuilder {
    pub fn new(name: impl Into<String>, element_type: ElementType) -> Self {
        Self {
            field: Field {
                name: name.into(),
                element_type,
                axes: Vec::new(),
                attributes: Vec::new(),
                fill_value: f64::NAN,
                is_station: false,
            },
        }
    }

    #[must_use]
    pub fn axis(mut self, axis: Arc<Axis>) -> Self {
        self.field.axes.push(axis);
        self
    }

    #[must_use]
    pub fn axes<I: IntoIterator<Item = Arc<Axis>>>(mut self, axes: I) -> Self {
        self.field.axes.extend(axes);
        self
    }

    #[must_use]
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.field.attributes.push(attribute);
        self
    }

    #[must_use]
    pub fn fill_value(mut self, fill: f64) -> Self {
        self.field.fill_value = fill;
        self
    }

    #[must_use]
    pub fn station(mut self, is_station: bool) -> Self {
        self.field.is_station = is_station;
        self
    }

    #[must_use]
    pub fn units(self, units: impl Into<String>) -> Self {
        self.attribute(Attribute::text("units", units))
    }

    #[must_use]
    pub fn description(self, description: impl Into<String>) -> Self {
        self.attribute(Attribute::text("description", description))
    }

    pub fn build(self) -> Field {
        self.field
    }
}
