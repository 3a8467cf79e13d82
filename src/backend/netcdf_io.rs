//! Delegated NetCDF reader
//!
//! Dimensions become axes and coordinate variables supply their coordinates.
//! Every other numeric variable becomes a field. Axes whose coordinates
//! descend are presented ascending and flagged reversed; reads translate the
//! logical ranges into physical `netcdf::Extent`s and flip those axes back.

use super::{validated, BackendKind, FormatBackend, Header};
use crate::array::{Element, TypedArray};
use crate::axis::{Axis, AxisKind};
use crate::errors::{MeteoError, Result};
use crate::field::{Attribute, AttributeValue, ElementType, FieldBuilder};
use crate::range::Section;
use ::netcdf::types::{FloatType, IntType, NcVariableType};
use ndarray::{ArrayD, IxDyn};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

fn convert_value(value: ::netcdf::AttributeValue) -> Option<AttributeValue> {
    use ::netcdf::AttributeValue as Nc;
    let many = |v: Vec<f64>| Some(AttributeValue::Numbers(v));
    let one = |v: f64| Some(AttributeValue::Numbers(vec![v]));
    match value {
        Nc::Str(s) => Some(AttributeValue::Text(s)),
        Nc::Strs(s) => Some(AttributeValue::Text(s.join(","))),
        Nc::Uchar(v) => one(v.into()),
        Nc::Schar(v) => one(v.into()),
        Nc::Ushort(v) => one(v.into()),
        Nc::Short(v) => one(v.into()),
        Nc::Uint(v) => one(v.into()),
        Nc::Int(v) => one(v.into()),
        Nc::Ulonglong(v) => one(v as f64),
        Nc::Longlong(v) => one(v as f64),
        Nc::Float(v) => one(v.into()),
        Nc::Double(v) => one(v),
        Nc::Uchars(v) => many(v.into_iter().map(f64::from).collect()),
        Nc::Schars(v) => many(v.into_iter().map(f64::from).collect()),
        Nc::Ushorts(v) => many(v.into_iter().map(f64::from).collect()),
        Nc::Shorts(v) => many(v.into_iter().map(f64::from).collect()),
        Nc::Uints(v) => many(v.into_iter().map(f64::from).collect()),
        Nc::Ints(v) => many(v.into_iter().map(f64::from).collect()),
        Nc::Ulonglongs(v) => many(v.into_iter().map(|x| x as f64).collect()),
        Nc::Longlongs(v) => many(v.into_iter().map(|x| x as f64).collect()),
        Nc::Floats(v) => many(v.into_iter().map(f64::from).collect()),
        Nc::Doubles(v) => many(v),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

fn convert_attributes<'a>(attrs: impl Iterator<Item = ::netcdf::Attribute<'a>>) -> Vec<Attribute> {
    attrs
        .filter_map(|a| {
            let name = a.name().to_string();
            match a.value().ok().and_then(convert_value) {
                Some(value) => Some(Attribute { name, value }),
                None => {
                    debug!(attribute = %name, "skipping unreadable attribute");
                    None
                }
            }
        })
        .collect()
}

/// Element type a variable is presented as; `None` for non-numeric types.
fn element_type_of(vartype: &NcVariableType) -> Option<ElementType> {
    match vartype {
        NcVariableType::Int(IntType::I8 | IntType::U8) => Some(ElementType::Byte),
        NcVariableType::Int(IntType::I16) => Some(ElementType::Short),
        NcVariableType::Int(IntType::I32) => Some(ElementType::Int),
        NcVariableType::Int(_) => Some(ElementType::Double),
        NcVariableType::Float(FloatType::F32) => Some(ElementType::Float),
        NcVariableType::Float(FloatType::F64) => Some(ElementType::Double),
        _ => None,
    }
}

/// Kind of an axis from its name and its coordinate variable's attributes.
pub fn classify_axis(name: &str, attributes: &[Attribute]) -> AxisKind {
    let text = |key: &str| {
        attributes
            .iter()
            .find(|a| a.name == key)
            .and_then(Attribute::as_text)
            .map(str::to_ascii_lowercase)
    };
    match text("axis").as_deref() {
        Some("t") => return AxisKind::Time,
        Some("z") => return AxisKind::Vertical,
        Some("y") => return AxisKind::Y,
        Some("x") => return AxisKind::X,
        _ => {}
    }
    if let Some(units) = text("units") {
        if units.contains(" since ") {
            return AxisKind::Time;
        }
        if units.starts_with("degrees_n") || units == "degree_north" {
            return AxisKind::Y;
        }
        if units.starts_with("degrees_e") || units == "degree_east" {
            return AxisKind::X;
        }
    }
    if text("positive").is_some() {
        return AxisKind::Vertical;
    }
    let standard = text("standard_name").unwrap_or_default();
    match (name.to_ascii_lowercase().as_str(), standard.as_str()) {
        (_, "time") | ("time" | "t", _) => AxisKind::Time,
        (_, "latitude") | ("lat" | "latitude" | "y", _) => AxisKind::Y,
        (_, "longitude") | ("lon" | "longitude" | "x", _) => AxisKind::X,
        (_, "altitude" | "air_pressure" | "height" | "depth")
        | ("lev" | "level" | "plev" | "z" | "height" | "depth" | "pressure", _) => {
            AxisKind::Vertical
        }
        _ => AxisKind::Other,
    }
}

/// Build an axis, presenting descending coordinates ascending.
fn build_axis(
    kind: AxisKind,
    name: &str,
    len: usize,
    coords: Option<Vec<f64>>,
    unlimited: bool,
) -> Axis {
    let axis = match coords {
        Some(mut c) if c.len() == len => {
            let descending = len > 1 && c.windows(2).all(|w| w[1] < w[0]);
            if descending {
                c.reverse();
            }
            Axis::with_coordinates(kind, name, c).reversed(descending)
        }
        _ => Axis::indexed(kind, name, len),
    };
    axis.unlimited(unlimited)
}

pub struct NetCdfBackend {
    path: PathBuf,
    handle: Mutex<Option<::netcdf::File>>,
    header: Header,
}

impl fmt::Debug for NetCdfBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetCdfBackend")
            .field("path", &self.path)
            .field("fields", &self.header.field_names())
            .finish_non_exhaustive()
    }
}

impl NetCdfBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let file = ::netcdf::open(path)?;

        let dim_names: Vec<String> = file.dimensions().map(|d| d.name()).collect();
        let mut axes: HashMap<String, Arc<Axis>> = HashMap::new();
        let mut ordered = Vec::new();
        for dim in file.dimensions() {
            let name = dim.name();
            let (coords, attrs) = match file.variable(&name) {
                Some(var) if var.dimensions().len() == 1 => {
                    let attrs = convert_attributes(var.attributes());
                    (var.get_values::<f64, _>(..).ok(), attrs)
                }
                _ => (None, Vec::new()),
            };
            let kind = classify_axis(&name, &attrs);
            let axis = Arc::new(build_axis(kind, &name, dim.len(), coords, dim.is_unlimited()));
            debug!(axis = %axis, "netcdf dimension");
            axes.insert(name, axis.clone());
            ordered.push(axis);
        }

        let mut fields = Vec::new();
        for var in file.variables() {
            let name = var.name();
            let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
            if dims.len() == 1 && dims[0] == name && dim_names.contains(&name) {
                continue;
            }
            let Some(element_type) = element_type_of(&var.vartype()) else {
                debug!(variable = %name, "skipping non-numeric variable");
                continue;
            };
            let attributes = convert_attributes(var.attributes());
            let fill = ["_FillValue", "missing_value"].iter().find_map(|key| {
                attributes
                    .iter()
                    .find(|a| a.name == *key)
                    .and_then(Attribute::as_numbers)
                    .and_then(|v| v.first().copied())
            });
            let mut builder = FieldBuilder::new(name.clone(), element_type);
            for d in &dims {
                let axis = axes.get(d).cloned().ok_or_else(|| {
                    MeteoError::format(format!("variable '{name}' uses unknown dimension '{d}'"))
                })?;
                builder = builder.axis(axis);
            }
            for a in attributes {
                builder = builder.attribute(a);
            }
            if let Some(fill) = fill {
                builder = builder.fill_value(fill);
            }
            fields.push(builder.build());
        }

        let attributes = convert_attributes(file.attributes());
        Ok(Self {
            path: path.to_path_buf(),
            handle: Mutex::new(Some(file)),
            header: Header {
                fields,
                axes: ordered,
                attributes,
            },
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<::netcdf::File>> {
        self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_as<T: Element + ::netcdf::NcTypeDescriptor>(
    var: &::netcdf::Variable<'_>,
    extents: Vec<::netcdf::Extent>,
    shape: &[usize],
) -> Result<TypedArray> {
    let values: Vec<T> = var.get_values::<T, _>(::netcdf::Extents::Extent(extents))?;
    Ok(T::wrap(ArrayD::from_shape_vec(IxDyn(shape), values)?))
}

impl FormatBackend for NetCdfBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::NetCdf
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn read_section(&self, name: &str, section: &Section) -> Result<TypedArray> {
        let field = validated(&self.header, name, section)?;
        let guard = self.lock();
        let file = guard.as_ref().ok_or_else(|| {
            MeteoError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                format!("file {} has been closed", self.path.display()),
            ))
        })?;
        let var = file.variable(name).ok_or_else(|| MeteoError::VariableNotFound {
            var: name.to_string(),
        })?;

        let extents = section
            .ranges()
            .iter()
            .zip(field.axes())
            .map(|(r, axis)| {
                let start = if axis.is_reversed() {
                    axis.length() - 1 - r.last()
                } else {
                    r.first()
                };
                ::netcdf::Extent::SliceCount {
                    start,
                    count: r.length(),
                    stride: r.stride() as isize,
                }
            })
            .collect::<Vec<_>>();
        let shape = section.shape();

        let mut out = match field.element_type() {
            ElementType::Byte => read_as::<i8>(&var, extents, &shape)?,
            ElementType::Short => read_as::<i16>(&var, extents, &shape)?,
            ElementType::Int => read_as::<i32>(&var, extents, &shape)?,
            ElementType::Float => read_as::<f32>(&var, extents, &shape)?,
            ElementType::Double => read_as::<f64>(&var, extents, &shape)?,
        };
        for (i, axis) in field.axes().iter().enumerate() {
            if axis.is_reversed() {
                out.invert_axis(i);
            }
        }
        Ok(out)
    }

    fn close(&self) {
        self.lock().take();
    }
}
