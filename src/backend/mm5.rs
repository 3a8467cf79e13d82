//! MM5 version 3 model output
//!
//! Big-endian Fortran sequential records. Every block starts with a one-int
//! flag record:
//!
//! * `0`: a big header record (117600 bytes), skipped
//! * `1`: a 152-byte sub header describing one field, then its data record
//! * `2`: end of the current output time
//!
//! Within a data record the Y index varies fastest, then X, then level.

use super::fortran::{marker_at, Record, RecordReader};
use super::{validated, BackendKind, FormatBackend, Header};
use crate::array::TypedArray;
use crate::axis::{Axis, AxisKind};
use crate::errors::{MeteoError, Result};
use crate::field::{Attribute, ElementType, FieldBuilder};
use crate::layout::{self, BinaryRead, ElementCodec, Endian, GuardedFile, StorageLayout};
use crate::range::Section;
use crate::time;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

pub const BIG_HEADER_BYTES: u32 = 117_600;
pub const SUB_HEADER_BYTES: u32 = 152;
const BE: Endian = Endian::Big;

pub fn probe(head: &[u8]) -> bool {
    let flag = head
        .get(4..8)
        .and_then(|b| b.try_into().ok())
        .map(i32::from_be_bytes);
    match (marker_at(head, 0, BE), flag, marker_at(head, 12, BE)) {
        (Some(4), Some(0), Some(BIG_HEADER_BYTES)) => true,
        (Some(4), Some(1), Some(SUB_HEADER_BYTES)) => true,
        _ => false,
    }
}

/// Sub header preceding every data record
#[derive(Debug, Clone, PartialEq)]
pub struct SubHeader {
    pub ndim: i32,
    pub start_index: [i32; 4],
    pub end_index: [i32; 4],
    pub xtime: f32,
    pub staggering: String,
    pub ordering: String,
    pub current_date: String,
    pub name: String,
    pub unit: String,
    pub description: String,
}

impl SubHeader {
    pub fn parse(mut r: &[u8]) -> std::io::Result<Self> {
        let ndim = r.read_i32_value(BE)?;
        let mut start_index = [0; 4];
        for v in &mut start_index {
            *v = r.read_i32_value(BE)?;
        }
        let mut end_index = [0; 4];
        for v in &mut end_index {
            *v = r.read_i32_value(BE)?;
        }
        Ok(Self {
            ndim,
            start_index,
            end_index,
            xtime: r.read_f32_value(BE)?,
            staggering: r.read_text(4)?,
            ordering: r.read_text(4)?,
            current_date: r.read_text(24)?,
            name: r.read_text(9)?,
            unit: r.read_text(25)?,
            description: r.read_text(46)?,
        })
    }
}

/// Which axes a record ordering spans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// YXS, YXP: half-sigma or pressure levels
    Volume,
    /// YXW: full-sigma levels
    StaggeredVolume,
    /// YX
    Surface,
    /// S, P
    Column,
}

impl Shape {
    fn from_ordering(ordering: &str) -> Option<Self> {
        match ordering {
            "YXS" | "YXP" => Some(Shape::Volume),
            "YXW" => Some(Shape::StaggeredVolume),
            "YX" => Some(Shape::Surface),
            "S" | "P" => Some(Shape::Column),
            _ => None,
        }
    }
}

fn grid_indices(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64).collect()
}

fn positive(v: i32, what: &str, name: &str) -> Result<usize> {
    usize::try_from(v)
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| MeteoError::format(format!("mm5 field '{name}' has {what} {v}")))
}

#[derive(Debug)]
pub struct Mm5Backend {
    file: GuardedFile,
    header: Header,
    /// Layout of one data record, without the time axis
    layouts: HashMap<String, StorageLayout>,
    records: HashMap<(String, usize), Record>,
}

#[derive(Default)]
struct AxisCache {
    axes: HashMap<(&'static str, usize), Arc<Axis>>,
    order: Vec<Arc<Axis>>,
}

impl AxisCache {
    fn get(
        &mut self,
        kind: AxisKind,
        name: &'static str,
        len: usize,
        coords: impl FnOnce() -> Vec<f64>,
    ) -> Arc<Axis> {
        if let Some(axis) = self.axes.get(&(name, len)) {
            return axis.clone();
        }
        let axis = Arc::new(Axis::with_coordinates(kind, name, coords()));
        self.axes.insert((name, len), axis.clone());
        self.order.push(axis.clone());
        axis
    }
}

impl Mm5Backend {
    pub fn open(path: &Path) -> Result<Self> {
        let file = GuardedFile::open(path)?;
        let mut reader = RecordReader::new(BufReader::new(File::open(path)?), BE);

        let mut dates: Vec<String> = Vec::new();
        let mut pending: Vec<(SubHeader, Record, usize)> = Vec::new();
        let mut period_names: HashSet<String> = HashSet::new();
        let mut period_count = 0usize;
        let mut periods = 0usize;
        let mut big_headers = 0usize;

        while let Some((_, flag_bytes)) = reader.read_record()? {
            let flag = (&flag_bytes[..]).read_i32_value(BE)?;
            match flag {
                0 => {
                    let big = reader.skip_record()?.ok_or_else(|| {
                        MeteoError::truncated("big header flag without a big header record")
                    })?;
                    if big.len != u64::from(BIG_HEADER_BYTES) {
                        return Err(MeteoError::format(format!(
                            "mm5 big header is {} bytes, expected {BIG_HEADER_BYTES}",
                            big.len
                        )));
                    }
                    big_headers += 1;
                }
                1 => {
                    let (_, raw) = reader.require_record("mm5 sub header")?;
                    if raw.len() != SUB_HEADER_BYTES as usize {
                        return Err(MeteoError::format(format!(
                            "mm5 sub header is {} bytes, expected {SUB_HEADER_BYTES}",
                            raw.len()
                        )));
                    }
                    let mut sh = SubHeader::parse(&raw)?;
                    let data = reader.skip_record()?.ok_or_else(|| {
                        MeteoError::truncated(format!("mm5 field '{}' has no data record", sh.name))
                    })?;

                    // duplicate names within one output time get a positional suffix
                    if period_names.contains(&sh.name) {
                        sh.name = format!("{}{}", sh.name, period_count);
                    }
                    period_names.insert(sh.name.clone());
                    period_count += 1;

                    let t = match dates.iter().position(|d| *d == sh.current_date) {
                        Some(t) => t,
                        None => {
                            dates.push(sh.current_date.clone());
                            dates.len() - 1
                        }
                    };
                    pending.push((sh, data, t));
                }
                2 => {
                    periods += 1;
                    period_names.clear();
                    period_count = 0;
                }
                other => {
                    return Err(MeteoError::format(format!(
                        "unknown mm5 record flag {other} at byte {}",
                        reader.position()
                    )))
                }
            }
        }
        if pending.is_empty() {
            return Err(MeteoError::format("mm5 file contains no sub headers"));
        }

        let times = dates
            .iter()
            .map(|d| time::parse_model_date(d).map(time::to_oadate))
            .collect::<Result<Vec<_>>>()?;
        let t_axis = Arc::new(Axis::with_coordinates(AxisKind::Time, "time", times));

        let mut cache = AxisCache::default();
        let mut fields = Vec::new();
        let mut layouts = HashMap::new();
        let mut records = HashMap::new();

        for (sh, data, t) in pending {
            let Some(shape) = Shape::from_ordering(&sh.ordering) else {
                warn!(
                    name = %sh.name,
                    ordering = %sh.ordering,
                    "skipping mm5 field with unsupported ordering"
                );
                continue;
            };
            if !layouts.contains_key(&sh.name) {
                let name = sh.name.as_str();
                let (axes, inner) = match shape {
                    Shape::Volume | Shape::StaggeredVolume => {
                        let ny = positive(sh.end_index[0], "y size", name)?;
                        let nx = positive(sh.end_index[1], "x size", name)?;
                        let nz = positive(sh.end_index[2], "level count", name)?;
                        let zname = if shape == Shape::StaggeredVolume {
                            "full_sigma"
                        } else {
                            "half_sigma"
                        };
                        let z = cache.get(AxisKind::Vertical, zname, nz, || {
                            (1..=nz).map(|k| k as f64).collect()
                        });
                        let y = cache.get(AxisKind::Y, "south_north", ny, || grid_indices(ny));
                        let x = cache.get(AxisKind::X, "west_east", nx, || grid_indices(nx));
                        (
                            vec![z, y, x],
                            StorageLayout::contiguous(&[nz, ny, nx], &[0, 2, 1], 4)?,
                        )
                    }
                    Shape::Surface => {
                        let ny = positive(sh.end_index[0], "y size", name)?;
                        let nx = positive(sh.end_index[1], "x size", name)?;
                        let y = cache.get(AxisKind::Y, "south_north", ny, || grid_indices(ny));
                        let x = cache.get(AxisKind::X, "west_east", nx, || grid_indices(nx));
                        (
                            vec![y, x],
                            StorageLayout::contiguous(&[ny, nx], &[1, 0], 4)?,
                        )
                    }
                    Shape::Column => {
                        let nz = positive(sh.end_index[0], "level count", name)?;
                        let z = cache.get(AxisKind::Vertical, "half_sigma", nz, || {
                            (1..=nz).map(|k| k as f64).collect()
                        });
                        (vec![z], StorageLayout::row_major(&[nz], 4))
                    }
                };
                let field = FieldBuilder::new(sh.name.clone(), ElementType::Float)
                    .axis(t_axis.clone())
                    .axes(axes)
                    .units(sh.unit.clone())
                    .description(sh.description.clone())
                    .attribute(Attribute::text("ordering", sh.ordering.clone()))
                    .attribute(Attribute::text("staggering", sh.staggering.clone()))
                    .build();
                fields.push(field);
                layouts.insert(sh.name.clone(), inner);
            }

            let expected = layouts
                .get(&sh.name)
                .map_or(0, StorageLayout::end);
            if data.len != expected {
                return Err(MeteoError::format(format!(
                    "mm5 field '{}' data record is {} bytes, expected {expected}",
                    sh.name, data.len
                )));
            }
            records.insert((sh.name.clone(), t), data);
        }
        debug!(
            fields = fields.len(),
            times = t_axis.length(),
            periods,
            "mm5 header scan finished"
        );

        let mut axes = vec![t_axis];
        axes.extend(cache.order);
        Ok(Self {
            file,
            header: Header {
                fields,
                axes,
                attributes: vec![
                    Attribute::number("big_headers", big_headers as f64),
                    Attribute::number("time_periods", periods as f64),
                ],
            },
            layouts,
            records,
        })
    }
}

impl FormatBackend for Mm5Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::Mm5
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn read_section(&self, name: &str, section: &Section) -> Result<TypedArray> {
        validated(&self.header, name, section)?;
        let layout = self
            .layouts
            .get(name)
            .ok_or_else(|| MeteoError::VariableNotFound {
                var: name.to_string(),
            })?;
        let codec = ElementCodec::new(ElementType::Float, BE);
        layout::read_slabs(&self.file, layout, codec, section, 1, |idx| {
            self.records
                .get(&(name.to_string(), idx[0]))
                .map(|r| r.offset)
                .ok_or_else(|| {
                    MeteoError::format(format!(
                        "mm5 field '{name}' has no record at time index {}",
                        idx[0]
                    ))
                })
        })
    }

    fn close(&self) {
        self.file.close();
    }
}
