//! MICAPS type 131 radar mosaic
//!
//! A fixed 1024-byte little-endian header is followed by `nz` pages of
//! `ny * nx` samples, northernmost row first. The sample width is not in
//! the header; it is inferred from the payload size.
//!
//! Samples decode as signed little-endian integers, so a 1-byte sample of
//! `0xF0` reads as `-16`. Some writers treat 1-byte samples as unsigned
//! (`0..=255`); such files need the offset applied by the caller.

use super::{validated, BackendKind, FormatBackend, Header};
use crate::array::TypedArray;
use crate::axis::{Axis, AxisKind};
use crate::errors::{MeteoError, Result};
use crate::field::{Attribute, ElementType, FieldBuilder};
use crate::layout::{self, BinaryRead, ElementCodec, Endian, GuardedFile, StorageLayout};
use crate::range::Section;
use crate::time;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub const HEADER_BYTES: u64 = 1024;
const MAX_LEVELS: usize = 40;
const MAX_RADARS: usize = 20;
const LE: Endian = Endian::Little;

/// Sample type implied by the payload size, or `None` if it matches
/// neither one nor two bytes per sample. One byte maps to the signed
/// [`ElementType::Byte`].
pub fn infer_sample_type(payload_bytes: u64, samples: u64) -> Option<ElementType> {
    if samples == 0 {
        None
    } else if payload_bytes == samples {
        Some(ElementType::Byte)
    } else if payload_bytes == samples * 2 {
        Some(ElementType::Short)
    } else {
        None
    }
}

fn le_i16(head: &[u8], at: usize) -> Option<i16> {
    Some(i16::from_le_bytes(head.get(at..at + 2)?.try_into().ok()?))
}

pub fn probe(head: &[u8], file_len: u64) -> bool {
    if file_len < HEADER_BYTES || head.len() < 84 {
        return false;
    }
    let dims = (le_i16(head, 78), le_i16(head, 80), le_i16(head, 82));
    let (Some(nx), Some(ny), Some(nz)) = dims else {
        return false;
    };
    if nx <= 0 || ny <= 0 || nz <= 0 || nz as usize > MAX_LEVELS {
        return false;
    }
    let samples = nx as u64 * ny as u64 * nz as u64;
    infer_sample_type(file_len - HEADER_BYTES, samples).is_some()
}

/// Parsed 1024-byte header
#[derive(Debug, Clone, PartialEq)]
struct RadarHeader {
    zone_name: String,
    data_name: String,
    flag: String,
    version: String,
    year: i16,
    month: i16,
    day: i16,
    hour: i16,
    minute: i16,
    interval: i16,
    nx: i16,
    ny: i16,
    nz: i16,
    radar_count: i32,
    start_lon: f32,
    start_lat: f32,
    center_lon: f32,
    center_lat: f32,
    lon_delta: f32,
    lat_delta: f32,
    heights: Vec<f32>,
    radar_names: Vec<String>,
    radar_lons: Vec<f32>,
    radar_lats: Vec<f32>,
    radar_alts: Vec<f32>,
}

impl RadarHeader {
    fn parse(mut r: impl Read) -> std::io::Result<Self> {
        let zone_name = r.read_text(12)?;
        let data_name = r.read_text(38)?;
        let flag = r.read_text(8)?;
        let version = r.read_text(8)?;
        let year = r.read_i16_value(LE)?;
        let month = r.read_i16_value(LE)?;
        let day = r.read_i16_value(LE)?;
        let hour = r.read_i16_value(LE)?;
        let minute = r.read_i16_value(LE)?;
        let interval = r.read_i16_value(LE)?;
        let nx = r.read_i16_value(LE)?;
        let ny = r.read_i16_value(LE)?;
        let nz = r.read_i16_value(LE)?;
        let radar_count = r.read_i32_value(LE)?;
        let start_lon = r.read_f32_value(LE)?;
        let start_lat = r.read_f32_value(LE)?;
        let center_lon = r.read_f32_value(LE)?;
        let center_lat = r.read_f32_value(LE)?;
        let lon_delta = r.read_f32_value(LE)?;
        let lat_delta = r.read_f32_value(LE)?;
        let heights = (0..MAX_LEVELS)
            .map(|_| r.read_f32_value(LE))
            .collect::<std::io::Result<Vec<_>>>()?;
        let radar_names = (0..MAX_RADARS)
            .map(|_| r.read_text(16))
            .collect::<std::io::Result<Vec<_>>>()?;
        let mut floats = || {
            (0..MAX_RADARS)
                .map(|_| r.read_f32_value(LE))
                .collect::<std::io::Result<Vec<_>>>()
        };
        let radar_lons = floats()?;
        let radar_lats = floats()?;
        let radar_alts = floats()?;
        Ok(Self {
            zone_name,
            data_name,
            flag,
            version,
            year,
            month,
            day,
            hour,
            minute,
            interval,
            nx,
            ny,
            nz,
            radar_count,
            start_lon,
            start_lat,
            center_lon,
            center_lat,
            lon_delta,
            lat_delta,
            heights,
            radar_names,
            radar_lons,
            radar_lats,
            radar_alts,
        })
    }
}

#[derive(Debug)]
pub struct Micaps131Backend {
    file: GuardedFile,
    header: Header,
    layout: StorageLayout,
    codec: ElementCodec,
}

impl Micaps131Backend {
    pub fn open(path: &Path) -> Result<Self> {
        let file = GuardedFile::open(path)?;
        let raw = file.read_span(0, HEADER_BYTES as usize)?;
        let h = RadarHeader::parse(raw.as_slice())?;

        let dim = |v: i16, what: &str| -> Result<usize> {
            usize::try_from(v)
                .ok()
                .filter(|&n| n > 0)
                .ok_or_else(|| {
                    MeteoError::format(format!("micaps131 {what} must be positive, got {v}"))
                })
        };
        let nx = dim(h.nx, "nx")?;
        let ny = dim(h.ny, "ny")?;
        let nz = dim(h.nz, "nz")?;
        if nz > MAX_LEVELS {
            return Err(MeteoError::format(format!(
                "micaps131 declares {nz} levels, at most {MAX_LEVELS} fit the header"
            )));
        }

        let samples = (nx * ny * nz) as u64;
        let payload = file.len()?.saturating_sub(HEADER_BYTES);
        let element_type = infer_sample_type(payload, samples).ok_or_else(|| {
            MeteoError::format(format!(
                "micaps131 payload of {payload} bytes matches neither 1 nor 2 bytes \
                 per sample for {samples} samples"
            ))
        })?;
        debug!(nx, ny, nz, width = element_type.width(), "micaps131 header parsed");

        let valid = time::datetime(
            i32::from(h.year),
            u32::try_from(h.month).unwrap_or(0),
            u32::try_from(h.day).unwrap_or(0),
            u32::try_from(h.hour).unwrap_or(0),
            u32::try_from(h.minute).unwrap_or(0),
        )?;
        let lat_delta = f64::from(h.lat_delta);
        let start_lat = f64::from(h.start_lat);
        let y_coords = (0..ny)
            .map(|i| start_lat - (ny - 1 - i) as f64 * lat_delta)
            .collect();

        let t = Arc::new(Axis::with_coordinates(
            AxisKind::Time,
            "time",
            vec![time::to_oadate(valid)],
        ));
        let z = Arc::new(Axis::with_coordinates(
            AxisKind::Vertical,
            "height",
            h.heights[..nz].iter().map(|&v| f64::from(v)).collect(),
        ));
        let y = Arc::new(Axis::with_coordinates(AxisKind::Y, "lat", y_coords).reversed(true));
        let x = Arc::new(Axis::regular(
            AxisKind::X,
            "lon",
            f64::from(h.start_lon),
            f64::from(h.lon_delta),
            nx,
        ));
        let axes = vec![t, z, y, x];

        let field = FieldBuilder::new("var", element_type)
            .axes(axes.iter().cloned())
            .attribute(Attribute::text("data_name", h.data_name.clone()))
            .build();

        let radars = usize::try_from(h.radar_count).unwrap_or(0).min(MAX_RADARS);
        let to_f64 = |v: &[f32]| v[..radars].iter().map(|&x| f64::from(x)).collect();
        let attributes = vec![
            Attribute::text("Zon_Name", h.zone_name.clone()),
            Attribute::text("Data_Name", h.data_name.clone()),
            Attribute::text("Flag", h.flag.clone()),
            Attribute::text("Version", h.version.clone()),
            Attribute::number("interval", f64::from(h.interval)),
            Attribute::number("center_lon", f64::from(h.center_lon)),
            Attribute::number("center_lat", f64::from(h.center_lat)),
            Attribute::number("radar_count", f64::from(h.radar_count)),
            Attribute::text("radar_names", h.radar_names[..radars].join(",")),
            Attribute::numbers("radar_lons", to_f64(&h.radar_lons)),
            Attribute::numbers("radar_lats", to_f64(&h.radar_lats)),
            Attribute::numbers("radar_alts", to_f64(&h.radar_alts)),
        ];

        let layout = StorageLayout::row_major(&[1, nz, ny, nx], element_type.width())
            .with_base(HEADER_BYTES)
            .with_reversed(2, true);

        Ok(Self {
            file,
            header: Header {
                fields: vec![field],
                axes,
                attributes,
            },
            layout,
            codec: ElementCodec::new(element_type, Endian::Little),
        })
    }
}

impl FormatBackend for Micaps131Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::Micaps131
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn read_section(&self, name: &str, section: &Section) -> Result<TypedArray> {
        validated(&self.header, name, section)?;
        layout::read_section(&self.file, &self.layout, self.codec, section)
    }

    fn close(&self) {
        self.file.close();
    }
}
