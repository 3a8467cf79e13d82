//! MM5 regrid intermediate format
//!
//! A sequence of big-endian Fortran records, four per 2-D slab:
//!
//! 1. `i32` format version
//! 2. 124 bytes: date (24), forecast hour (f32), field (9), units (25),
//!    description (46), level (f32), nx (i32), ny (i32), projection flag (i32)
//! 3. projection block; for lat/lon grids start lat, start lon, dlat, dlon
//! 4. `nx * ny` f32 values, rows of `nx`
//!
//! Slabs sharing a field name form one field over (time, level, y, x).

use super::fortran::{marker_at, RecordReader};
use super::{validated, BackendKind, FormatBackend, Header};
use crate::array::TypedArray;
use crate::axis::{Axis, AxisKind};
use crate::errors::{MeteoError, Result};
use crate::field::{Attribute, ElementType, FieldBuilder};
use crate::layout::{self, BinaryRead, ElementCodec, Endian, GuardedFile, StorageLayout};
use crate::range::Section;
use crate::time;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub const SLAB_HEADER_BYTES: u32 = 124;
const BE: Endian = Endian::Big;
const LATLON: i32 = 0;

pub fn probe(head: &[u8]) -> bool {
    let version = head
        .get(4..8)
        .and_then(|b| b.try_into().ok())
        .map(i32::from_be_bytes);
    marker_at(head, 0, BE) == Some(4)
        && matches!(version, Some(3..=5))
        && marker_at(head, 8, BE) == Some(4)
        && marker_at(head, 12, BE) == Some(SLAB_HEADER_BYTES)
}

/// Record 2 of every slab
#[derive(Debug, Clone, PartialEq)]
struct SlabHeader {
    date: String,
    forecast_hour: f32,
    field: String,
    units: String,
    description: String,
    level: f32,
    nx: i32,
    ny: i32,
    projection: i32,
}

impl SlabHeader {
    fn parse(mut r: &[u8]) -> std::io::Result<Self> {
        let date = r.read_text(24)?;
        let forecast_hour = r.read_f32_value(BE)?;
        let field = r.read_text(9)?;
        // the name is the first word of the padded field
        let field = field.split_whitespace().next().unwrap_or("").to_string();
        Ok(Self {
            date,
            forecast_hour,
            field,
            units: r.read_text(25)?,
            description: r.read_text(46)?,
            level: r.read_f32_value(BE)?,
            nx: r.read_i32_value(BE)?,
            ny: r.read_i32_value(BE)?,
            projection: r.read_i32_value(BE)?,
        })
    }
}

/// Horizontal grid of one field, fixed by its first slab
#[derive(Debug, Clone, PartialEq)]
struct Grid {
    nx: usize,
    ny: usize,
    lat_lon: Option<[f32; 4]>,
}

impl Grid {
    fn y_reversed(&self) -> bool {
        self.lat_lon.is_some_and(|[_, _, dlat, _]| dlat < 0.0)
    }

    fn y_coordinates(&self) -> Vec<f64> {
        match self.lat_lon {
            Some([lat0, _, dlat, _]) => {
                let (lat0, dlat) = (f64::from(lat0), f64::from(dlat));
                let phys = |j: usize| lat0 + dlat * j as f64;
                if dlat < 0.0 {
                    (0..self.ny).map(|i| phys(self.ny - 1 - i)).collect()
                } else {
                    (0..self.ny).map(phys).collect()
                }
            }
            None => (0..self.ny).map(|i| i as f64).collect(),
        }
    }

    fn x_coordinates(&self) -> Vec<f64> {
        match self.lat_lon {
            Some([_, lon0, _, dlon]) => (0..self.nx)
                .map(|i| f64::from(lon0) + f64::from(dlon) * i as f64)
                .collect(),
            None => (0..self.nx).map(|i| i as f64).collect(),
        }
    }
}

#[derive(Debug)]
struct FieldEntry {
    name: String,
    units: String,
    description: String,
    forecast_hour: f32,
    grid: Grid,
    levels: Vec<f32>,
}

/// Shares structurally equal axes between fields
#[derive(Default)]
struct AxisPool {
    axes: Vec<Arc<Axis>>,
}

impl AxisPool {
    fn intern(&mut self, axis: Axis) -> Arc<Axis> {
        if let Some(existing) = self.axes.iter().find(|a| ***a == axis) {
            return existing.clone();
        }
        let axis = Arc::new(axis);
        self.axes.push(axis.clone());
        axis
    }
}

#[derive(Debug)]
pub struct Mm5IntermediateBackend {
    file: GuardedFile,
    header: Header,
    layouts: HashMap<String, StorageLayout>,
    /// Payload offset of each (field, time index, level index) slab
    slabs: HashMap<(String, usize, usize), u64>,
}

impl Mm5IntermediateBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let file = GuardedFile::open(path)?;
        let mut reader = RecordReader::new(BufReader::new(File::open(path)?), BE);

        let mut dates: Vec<String> = Vec::new();
        let mut entries: Vec<FieldEntry> = Vec::new();
        let mut slabs = HashMap::new();
        let mut version = None;

        while let Some((_, raw_version)) = reader.read_record()? {
            let v = (&raw_version[..]).read_i32_value(BE)?;
            version.get_or_insert(v);

            let (_, raw) = reader.require_record("slab header")?;
            if raw.len() != SLAB_HEADER_BYTES as usize {
                return Err(MeteoError::format(format!(
                    "slab header is {} bytes, expected {SLAB_HEADER_BYTES}",
                    raw.len()
                )));
            }
            let sh = SlabHeader::parse(&raw)?;
            let (_, proj) = reader.require_record("projection block")?;
            let lat_lon = if sh.projection == LATLON {
                let mut r = &proj[..];
                Some([
                    r.read_f32_value(BE)?,
                    r.read_f32_value(BE)?,
                    r.read_f32_value(BE)?,
                    r.read_f32_value(BE)?,
                ])
            } else {
                debug!(
                    field = %sh.field,
                    projection = sh.projection,
                    "non lat/lon slab, using grid indices"
                );
                None
            };
            let data = reader.skip_record()?.ok_or_else(|| {
                MeteoError::truncated(format!("slab '{}' has no data record", sh.field))
            })?;

            let nx = usize::try_from(sh.nx).unwrap_or(0);
            let ny = usize::try_from(sh.ny).unwrap_or(0);
            if nx == 0 || ny == 0 || data.len != (nx * ny * 4) as u64 {
                return Err(MeteoError::format(format!(
                    "slab '{}' declares {nx}x{ny} but holds {} bytes",
                    sh.field, data.len
                )));
            }
            let grid = Grid { nx, ny, lat_lon };

            let t = match dates.iter().position(|d| *d == sh.date) {
                Some(t) => t,
                None => {
                    dates.push(sh.date.clone());
                    dates.len() - 1
                }
            };
            let entry = match entries.iter_mut().position(|e| e.name == sh.field) {
                Some(i) => &mut entries[i],
                None => {
                    entries.push(FieldEntry {
                        name: sh.field.clone(),
                        units: sh.units.clone(),
                        description: sh.description.clone(),
                        forecast_hour: sh.forecast_hour,
                        grid: grid.clone(),
                        levels: Vec::new(),
                    });
                    let last = entries.len() - 1;
                    &mut entries[last]
                }
            };
            if entry.grid.nx != grid.nx || entry.grid.ny != grid.ny {
                return Err(MeteoError::format(format!(
                    "field '{}' changes grid size from {}x{} to {nx}x{ny}",
                    entry.name, entry.grid.nx, entry.grid.ny
                )));
            }
            let z = match entry.levels.iter().position(|&l| l == sh.level) {
                Some(z) => z,
                None => {
                    entry.levels.push(sh.level);
                    entry.levels.len() - 1
                }
            };
            slabs.insert((sh.field.clone(), t, z), data.offset);
        }
        if entries.is_empty() {
            return Err(MeteoError::format("intermediate file contains no slabs"));
        }

        let times = dates
            .iter()
            .map(|d| time::parse_model_date(d).map(time::to_oadate))
            .collect::<Result<Vec<_>>>()?;
        let t_axis = Arc::new(Axis::with_coordinates(AxisKind::Time, "time", times));

        let mut pool = AxisPool::default();
        let mut fields = Vec::with_capacity(entries.len());
        let mut layouts = HashMap::new();
        for e in entries {
            let z = pool.intern(Axis::with_coordinates(
                AxisKind::Vertical,
                "level",
                e.levels.iter().map(|&l| f64::from(l)).collect(),
            ));
            let y = pool.intern(
                Axis::with_coordinates(AxisKind::Y, "lat", e.grid.y_coordinates())
                    .reversed(e.grid.y_reversed()),
            );
            let x = pool.intern(Axis::with_coordinates(AxisKind::X, "lon", e.grid.x_coordinates()));
            let field = FieldBuilder::new(e.name.clone(), ElementType::Float)
                .axes([t_axis.clone(), z, y, x])
                .units(e.units)
                .description(e.description)
                .attribute(Attribute::number("forecast_hour", f64::from(e.forecast_hour)))
                .build();
            fields.push(field);
            layouts.insert(
                e.name,
                StorageLayout::row_major(&[e.grid.ny, e.grid.nx], 4)
                    .with_reversed(0, e.grid.y_reversed()),
            );
        }

        let mut axes = vec![t_axis];
        axes.extend(pool.axes);
        Ok(Self {
            file,
            header: Header {
                fields,
                axes,
                attributes: vec![Attribute::number(
                    "version",
                    f64::from(version.unwrap_or_default()),
                )],
            },
            layouts,
            slabs,
        })
    }
}

impl FormatBackend for Mm5IntermediateBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Mm5Intermediate
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn read_section(&self, name: &str, section: &Section) -> Result<TypedArray> {
        validated(&self.header, name, section)?;
        let inner = self.layouts.get(name).ok_or_else(|| MeteoError::VariableNotFound {
            var: name.to_string(),
        })?;
        let codec = ElementCodec::new(ElementType::Float, BE);
        layout::read_slabs(&self.file, inner, codec, section, 2, |idx| {
            self.slabs
                .get(&(name.to_string(), idx[0], idx[1]))
                .copied()
                .ok_or_else(|| {
                    MeteoError::format(format!(
                        "field '{name}' has no slab at time index {} level index {}",
                        idx[0], idx[1]
                    ))
                })
        })
    }

    fn close(&self) {
        self.file.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descending_latitudes_reverse_y() {
        let grid = Grid {
            nx: 2,
            ny: 3,
            lat_lon: Some([40.0, 100.0, -1.0, 0.5]),
        };
        assert!(grid.y_reversed());
        assert_eq!(grid.y_coordinates(), vec![38.0, 39.0, 40.0]);
        assert_eq!(grid.x_coordinates(), vec![100.0, 100.5]);
    }

    #[test]
    fn slab_header_field_is_first_word() {
        let mut raw = Vec::new();
        raw.extend_from_slice(format!("{:<24}", "1993-03-13_00:00:00").as_bytes());
        raw.extend_from_slice(&0f32.to_be_bytes());
        raw.extend_from_slice(format!("{:<9}", "T  x").as_bytes());
        raw.extend_from_slice(format!("{:<25}", "K").as_bytes());
        raw.extend_from_slice(format!("{:<46}", "Temperature").as_bytes());
        raw.extend_from_slice(&850f32.to_be_bytes());
        raw.extend_from_slice(&3i32.to_be_bytes());
        raw.extend_from_slice(&2i32.to_be_bytes());
        raw.extend_from_slice(&0i32.to_be_bytes());
        assert_eq!(raw.len(), SLAB_HEADER_BYTES as usize);
        let sh = SlabHeader::parse(&raw).unwrap();
        assert_eq!(sh.field, "T");
        assert_eq!((sh.nx, sh.ny, sh.level), (3, 2, 850.0));
    }
}
