//! Dataset inspection and field description
//!
//! Printing helpers used by the CLI, plus serde views of a [`Header`] for
//! `--json` output.

use crate::axis::Axis;
use crate::backend::{BackendKind, Header};
use crate::errors::{MeteoError, Result};
use crate::field::{Attribute, Field};
use crate::statistics::FieldSummary;
use serde::Serialize;
use std::sync::Arc;

/// Serializable view of one axis
#[derive(Debug, Clone, Serialize)]
pub struct AxisMetadata {
    pub name: String,
    pub kind: String,
    pub length: usize,
    pub unlimited: bool,
    pub reversed: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub delta: Option<f64>,
}

impl From<&Axis> for AxisMetadata {
    fn from(axis: &Axis) -> Self {
        Self {
            name: axis.short_name().to_string(),
            kind: axis.kind().as_str().to_string(),
            length: axis.length(),
            unlimited: axis.is_unlimited(),
            reversed: axis.is_reversed(),
            min: axis.min(),
            max: axis.max(),
            delta: axis.delta(),
        }
    }
}

/// Serializable view of one field
#[derive(Debug, Clone, Serialize)]
pub struct FieldMetadata {
    pub name: String,
    pub data_type: String,
    pub axes: Vec<String>,
    pub shape: Vec<usize>,
    pub fill_value: f64,
    pub station: bool,
    pub attributes: Vec<Attribute>,
    pub total_elements: usize,
    pub estimated_size_bytes: usize,
}

impl From<&Field> for FieldMetadata {
    fn from(field: &Field) -> Self {
        let total_elements = field.element_count();
        Self {
            name: field.name().to_string(),
            data_type: field.element_type().as_str().to_string(),
            axes: field.axes().iter().map(|a| a.short_name().to_string()).collect(),
            shape: field.shape(),
            fill_value: field.fill_value(),
            station: field.is_station(),
            attributes: field.attributes().to_vec(),
            total_elements,
            estimated_size_bytes: total_elements * field.element_type().width(),
        }
    }
}

/// Serializable view of a whole dataset
#[derive(Debug, Clone, Serialize)]
pub struct DatasetMetadata {
    pub format: String,
    pub axes: Vec<AxisMetadata>,
    pub fields: Vec<FieldMetadata>,
    pub attributes: Vec<Attribute>,
}

impl DatasetMetadata {
    pub fn new(kind: BackendKind, header: &Header) -> Self {
        Self {
            format: kind.as_str().to_string(),
            axes: header.axes.iter().map(|a| AxisMetadata::from(a.as_ref())).collect(),
            fields: header.fields.iter().map(FieldMetadata::from).collect(),
            attributes: header.attributes.clone(),
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| MeteoError::format(format!("metadata serialization failed: {e}")))
    }
}

fn axis_line(axis: &Arc<Axis>) -> String {
    let length = if axis.is_unlimited() {
        format!("{} (unlimited)", axis.length())
    } else {
        axis.length().to_string()
    };
    format!("{} [{}] = {}", axis.short_name(), axis.kind(), length)
}

/// Prints global attributes and fields.
pub fn print_metadata(kind: BackendKind, header: &Header) {
    println!("\n===== Format: {kind} =====");

    println!("\n===== Global Attributes =====");
    for attr in &header.attributes {
        println!("- {}: {}", attr.name, attr.value);
    }

    println!("\n===== Fields =====");
    for field in &header.fields {
        let dims: Vec<String> = field
            .axes()
            .iter()
            .map(|a| format!("{}[{}]", a.short_name(), a.length()))
            .collect();
        println!("- {} ({})", field.name(), dims.join(", "));
    }
}

/// Lists axes and fields sorted by name.
pub fn list_fields_and_axes(header: &Header) {
    println!("\n Axes");
    println!("==============");

    let mut axes: Vec<_> = header.axes.iter().collect();
    axes.sort_by(|a, b| a.short_name().cmp(b.short_name()));
    axes.dedup_by(|a, b| a.short_name() == b.short_name() && a.length() == b.length());

    if axes.is_empty() {
        println!("   (No axes found)");
    } else {
        for axis in axes {
            println!("    {}", axis_line(axis));
        }
    }

    println!("\n Fields");
    println!("=============");

    let mut fields: Vec<_> = header.fields.iter().collect();
    fields.sort_by(|a, b| a.name().cmp(b.name()));

    if fields.is_empty() {
        println!("   (No fields found)");
        return;
    }
    for field in fields {
        let dims: Vec<&str> = field.axes().iter().map(|a| a.short_name()).collect();
        let shape: Vec<String> = field.shape().iter().map(usize::to_string).collect();
        println!(
            "    {} ({}): [{}] = ({})",
            field.name(),
            field.element_type(),
            dims.join(", "),
            shape.join(" x ")
        );

        let mut key_attrs = Vec::new();
        if let Some(units) = field.units() {
            key_attrs.push(format!("units: {units}"));
        }
        if let Some(desc) = field.description() {
            key_attrs.push(format!("long_name: {desc}"));
        }
        key_attrs.push(format!("fill: {}", field.fill_value()));
        if field.is_station() {
            key_attrs.push("station".to_string());
        }
        println!("      - {}", key_attrs.join(", "));
    }

    println!("\nTip: use --describe <field> for axis coordinates and --stat <op>:<axis> to reduce");
}

/// Describes one field: type, axes with coordinate bounds, attributes.
pub fn describe_field(header: &Header, name: &str) -> Result<()> {
    let field = header.field(name)?;
    let meta = FieldMetadata::from(field);

    println!("\n Field Description: {name}");
    println!("={}", "=".repeat(name.len() + 20));
    println!(" Data type: {}", meta.data_type);
    println!(" Fill value: {}", meta.fill_value);
    if field.rank() == 0 {
        println!(" Axes: (scalar)");
    } else {
        println!(" Axes: [{}]", meta.axes.join(", "));
        let shape: Vec<String> = meta.shape.iter().map(usize::to_string).collect();
        println!(" Shape: ({})", shape.join(" x "));

        println!("\n Axis Details:");
        for axis in field.axes() {
            print!("    {}", axis_line(axis));
            match (axis.min(), axis.max()) {
                (Some(lo), Some(hi)) => {
                    print!("  range {lo} .. {hi}");
                    if let Some(d) = axis.delta() {
                        print!("  delta {d}");
                    }
                    println!();
                }
                _ => println!("  (no coordinates)"),
            }
        }
    }

    if meta.attributes.is_empty() {
        println!("\n  Attributes: (none)");
    } else {
        println!("\n  Attributes:");
        for attr in &meta.attributes {
            println!("   - {}: {}", attr.name, attr.value);
        }
    }

    println!("\n Storage Information:");
    println!("    Total elements: {}", meta.total_elements);
    println!("    Element size: {} bytes", field.element_type().width());
    println!("    Total size: {}", human_size(meta.estimated_size_bytes));
    Ok(())
}

/// Prints a [`FieldSummary`].
pub fn print_field_summary(name: &str, summary: &FieldSummary) {
    println!("\n Summary for Field: {name}");
    println!("================================");
    println!("   Values: {} ({} valid)", summary.count, summary.valid);
    match (summary.min, summary.max, summary.mean, summary.std) {
        (Some(min), Some(max), Some(mean), Some(std)) => {
            println!("   Min: {min}");
            println!("   Max: {max}");
            println!("   Mean: {mean:.2}");
            println!("   Std Dev: {std:.2}");
        }
        _ => println!("   (no valid values)"),
    }
}

fn human_size(bytes: usize) -> String {
    let b = bytes as f64;
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.2} KB", b / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.2} MB", b / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", b / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AxisKind;
    use crate::field::{ElementType, FieldBuilder};

    fn header() -> Header {
        let t = Arc::new(Axis::indexed(AxisKind::Time, "time", 2).unlimited(true));
        let y = Arc::new(Axis::regular(AxisKind::Y, "lat", 10.0, 0.5, 3));
        let field = FieldBuilder::new("t2m", ElementType::Float)
            .axes([t.clone(), y.clone()])
            .units("K")
            .fill_value(-9999.0)
            .build();
        Header {
            fields: vec![field],
            axes: vec![t, y],
            attributes: vec![Attribute::text("source", "unit test")],
        }
    }

    #[test]
    fn field_metadata_sizes() {
        let h = header();
        let meta = FieldMetadata::from(&h.fields[0]);
        assert_eq!(meta.shape, vec![2, 3]);
        assert_eq!(meta.total_elements, 6);
        assert_eq!(meta.estimated_size_bytes, 24);
        assert_eq!(meta.axes, vec!["time", "lat"]);
    }

    #[test]
    fn dataset_json_lists_axes() {
        let h = header();
        let json = DatasetMetadata::new(BackendKind::SurferGrid, &h).to_json().unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["fields"][0]["name"], "t2m");
        assert_eq!(v["axes"][1]["max"], 11.0);
        assert_eq!(v["axes"][0]["unlimited"], true);
        assert_eq!(v["attributes"][0]["value"], "unit test");
    }

    #[test]
    fn describe_unknown_field_fails() {
        assert!(describe_field(&header(), "nope").is_err());
        assert!(describe_field(&header(), "t2m").is_ok());
    }

    #[test]
    fn sizes_are_humanized() {
        assert_eq!(human_size(10), "10 bytes");
        assert_eq!(human_size(2048), "2.00 KB");
    }
}
