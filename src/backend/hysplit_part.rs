//! HYSPLIT particle dump
//!
//! Big-endian Fortran sequential records. Every output time is one header
//! record followed by three records per particle:
//!
//! ```text
//! header    particle count, pollutant count, year, month, day, hour [, minute]   i32
//! masses    one value per pollutant                                               f32
//! position  lat, lon, height, sigma_h, vel_w, vel_v                               f32
//! tracking  age, distribution, pollutant, grid, source                            i32
//! ```
//!
//! Fields run over a `time` axis and a `particle` axis as long as the largest
//! population; slots past a time's particle count read as missing.

use super::fortran::{marker_at, RecordReader, MARKER_BYTES};
use super::text::gather;
use super::{validated, BackendKind, FormatBackend, Header};
use crate::array::TypedArray;
use crate::axis::{Axis, AxisKind};
use crate::errors::{MeteoError, Result};
use crate::field::{Attribute, ElementType, FieldBuilder};
use crate::layout::{BinaryRead, Endian, GuardedFile, StorageLayout};
use crate::range::Section;
use crate::time;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub const PART_MISSING: f64 = -9999.0;

/// Field names with their descriptions. `Particle` carries the mass summed
/// over every pollutant the particle holds.
pub const PARTICLE_FIELDS: [(&str, &str); 4] = [
    ("Particle", "particle mass summed over pollutants"),
    ("lat", "particle latitude"),
    ("lon", "particle longitude"),
    ("height", "particle height above ground"),
];

const BE: Endian = Endian::Big;
const POSITION_BYTES: u64 = 24;
const TRACKING_BYTES: u64 = 20;
const HEADER_INTS: usize = 6;

/// One output time of the dump
#[derive(Debug, Clone, PartialEq)]
struct TimeBlock {
    time: f64,
    particles: usize,
    pollutants: usize,
    /// Byte offset of the first particle's mass record prefix
    first_particle: u64,
}

impl TimeBlock {
    fn mass_record(&self) -> u64 {
        2 * MARKER_BYTES + 4 * self.pollutants as u64
    }

    fn particle_stride(&self) -> u64 {
        self.mass_record()
            + (2 * MARKER_BYTES + POSITION_BYTES)
            + (2 * MARKER_BYTES + TRACKING_BYTES)
    }

    /// Value of field `column` for every particle of this block.
    fn decode(&self, block: &[u8], column: usize) -> Result<Vec<f64>> {
        let stride = self.particle_stride() as usize;
        (0..self.particles)
            .map(|p| -> Result<f64> {
                let at = p * stride + MARKER_BYTES as usize;
                let value = if column == 0 {
                    let mut masses = &block[at..at + 4 * self.pollutants];
                    let mut total = 0.0;
                    for _ in 0..self.pollutants {
                        total += f64::from(masses.read_f32_value(BE)?);
                    }
                    total
                } else {
                    let pos = at + self.mass_record() as usize + 4 * (column - 1);
                    f64::from((&block[pos..pos + 4]).read_f32_value(BE)?)
                };
                Ok(value)
            })
            .collect()
    }
}

fn count(v: i32, what: &str, min: usize) -> Result<usize> {
    usize::try_from(v)
        .ok()
        .filter(|&n| n >= min)
        .ok_or_else(|| MeteoError::format(format!("hysplit particle dump has {what} {v}")))
}

fn parse_header(raw: &[u8]) -> Result<(usize, usize, f64)> {
    if raw.len() < HEADER_INTS * 4 {
        return Err(MeteoError::format(format!(
            "hysplit particle header is {} bytes, expected at least {}",
            raw.len(),
            HEADER_INTS * 4
        )));
    }
    let mut r = raw;
    let particles = count(r.read_i32_value(BE)?, "particle count", 0)?;
    let pollutants = count(r.read_i32_value(BE)?, "pollutant count", 1)?;
    let mut parts = [0i32; 4];
    for v in &mut parts {
        *v = r.read_i32_value(BE)?;
    }
    let minute = if r.len() >= 4 { r.read_i32_value(BE)? } else { 0 };
    let calendar = |v: i32| u32::try_from(v).unwrap_or(u32::MAX);
    let t = time::datetime(
        time::expand_two_digit_year(parts[0]),
        calendar(parts[1]),
        calendar(parts[2]),
        calendar(parts[3]),
        calendar(minute),
    )?;
    Ok((particles, pollutants, time::to_oadate(t)))
}

pub fn probe(head: &[u8]) -> bool {
    let Some(len) = marker_at(head, 0, BE) else {
        return false;
    };
    if len != 24 && len != 28 {
        return false;
    }
    let int = |i: usize| marker_at(head, 4 + 4 * i, BE).map(|v| v as i32);
    let in_range = |i: usize, lo: i32, hi: i32| int(i).is_some_and(|v| (lo..=hi).contains(&v));
    in_range(0, 0, i32::MAX)
        && in_range(1, 1, i32::MAX)
        && in_range(3, 1, 12)
        && in_range(4, 1, 31)
        && in_range(5, 0, 23)
        && marker_at(head, 4 + len as usize, BE) == Some(len)
}

#[derive(Debug)]
pub struct HysplitPartBackend {
    file: GuardedFile,
    header: Header,
    blocks: Vec<TimeBlock>,
}

impl HysplitPartBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let file = GuardedFile::open(path)?;
        let mut reader = RecordReader::new(BufReader::new(File::open(path)?), BE);

        let mut blocks = Vec::new();
        while let Some((_, raw)) = reader.read_record()? {
            let (particles, pollutants, time) = parse_header(&raw)?;
            let block = TimeBlock {
                time,
                particles,
                pollutants,
                first_particle: reader.position(),
            };
            let expected = [4 * pollutants as u64, POSITION_BYTES, TRACKING_BYTES];
            for p in 0..particles {
                for (len, what) in expected.iter().zip(["mass", "position", "tracking"]) {
                    let record = reader.skip_record()?.ok_or_else(|| {
                        MeteoError::truncated(format!(
                            "hysplit particle {p} of {particles} has no {what} record"
                        ))
                    })?;
                    if record.len != *len {
                        return Err(MeteoError::format(format!(
                            "hysplit particle {what} record is {} bytes, expected {len}",
                            record.len
                        )));
                    }
                }
            }
            blocks.push(block);
        }

        let max_particles = blocks.iter().map(|b| b.particles).max().unwrap_or(0);
        if max_particles == 0 {
            return Err(MeteoError::format(format!(
                "hysplit particle dump {} holds no particles",
                path.display()
            )));
        }
        debug!(times = blocks.len(), max_particles, "hysplit particle scan finished");

        let t_axis = Arc::new(Axis::with_coordinates(
            AxisKind::Time,
            "time",
            blocks.iter().map(|b| b.time).collect(),
        ));
        let particle = Arc::new(Axis::indexed(AxisKind::Other, "particle", max_particles));
        let fields = PARTICLE_FIELDS
            .iter()
            .map(|(name, description)| {
                FieldBuilder::new(*name, ElementType::Float)
                    .axes([t_axis.clone(), particle.clone()])
                    .description(*description)
                    .station(true)
                    .fill_value(PART_MISSING)
                    .build()
            })
            .collect();
        let per_block = |f: fn(&TimeBlock) -> usize| {
            blocks.iter().map(|b| f(b) as f64).collect::<Vec<_>>()
        };
        let attributes = vec![
            Attribute::numbers("particle_counts", per_block(|b| b.particles)),
            Attribute::numbers("pollutant_counts", per_block(|b| b.pollutants)),
        ];

        Ok(Self {
            file,
            header: Header {
                fields,
                axes: vec![t_axis, particle],
                attributes,
            },
            blocks,
        })
    }
}

impl FormatBackend for HysplitPartBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::HysplitPart
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn read_section(&self, name: &str, section: &Section) -> Result<TypedArray> {
        let field = validated(&self.header, name, section)?;
        let column = PARTICLE_FIELDS
            .iter()
            .position(|(n, _)| *n == name)
            .unwrap_or_default();
        let shape = field.shape();
        let particles = &section.ranges()[1];

        let mut values = vec![PART_MISSING; shape[0] * shape[1]];
        for t in section.ranges()[0].indices() {
            let block = &self.blocks[t];
            // only the particles this block actually holds are read
            let wanted = particles.indices().take_while(|&p| p < block.particles).last();
            let Some(last) = wanted else {
                continue;
            };
            let stride = block.particle_stride();
            let bytes = self
                .file
                .read_span(block.first_particle, ((last as u64 + 1) * stride) as usize)?;
            let held = TimeBlock {
                particles: last + 1,
                ..block.clone()
            };
            for (p, v) in held.decode(&bytes, column)?.into_iter().enumerate() {
                values[t * shape[1] + p] = v;
            }
        }
        let layout = StorageLayout::row_major(&shape, 1);
        gather(&values, &layout, field.element_type(), section)
    }

    fn close(&self) {
        self.file.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::Range;
    use std::io::Write;

    fn record(out: &mut Vec<u8>, payload: &[u8]) {
        let len = (payload.len() as u32).to_be_bytes();
        out.extend_from_slice(&len);
        out.extend_from_slice(payload);
        out.extend_from_slice(&len);
    }

    fn ints(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    fn floats(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    /// One pollutant; each particle is (mass, height).
    fn dump(blocks: &[(i32, Vec<(f32, f32)>)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (hour, particles) in blocks {
            record(&mut out, &ints(&[particles.len() as i32, 1, 95, 3, 10, *hour, 30]));
            for (mass, height) in particles.iter() {
                record(&mut out, &floats(&[*mass]));
                record(&mut out, &floats(&[45.0, -120.0, *height, 0.0, 0.0, 0.0]));
                record(&mut out, &ints(&[3600, 1, 1, 1, 1]));
            }
        }
        out
    }

    fn open(bytes: &[u8]) -> (tempfile::NamedTempFile, Result<HysplitPartBackend>) {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(bytes).unwrap();
        tmp.flush().unwrap();
        let b = HysplitPartBackend::open(tmp.path());
        (tmp, b)
    }

    #[test]
    fn probe_checks_header_record() {
        let bytes = dump(&[(6, vec![(1.0, 100.0)])]);
        assert!(probe(&bytes));
        assert!(!probe(&bytes[4..]));
        let mut bad_month = bytes.clone();
        bad_month[4 + 12..4 + 16].copy_from_slice(&13i32.to_be_bytes());
        assert!(!probe(&bad_month));
    }

    #[test]
    fn minute_and_century_come_from_header() {
        let (_tmp, b) = open(&dump(&[(6, vec![(1.0, 100.0), (2.0, 200.0)])]));
        let b = b.unwrap();
        let t = b.field("height").unwrap().axis_of(AxisKind::Time).unwrap().coordinate(0);
        let expected = time::to_oadate(time::datetime(1995, 3, 10, 6, 30).unwrap());
        assert_eq!(t, Some(expected));

        let second = Section::new(vec![Range::single(0), Range::new(1, 1, 1).unwrap()]);
        let heights = b.read_section("height", &second).unwrap();
        assert_eq!(heights.get_f64(&[0, 0]), Some(200.0));
    }

    #[test]
    fn short_population_reads_missing() {
        let (_tmp, b) = open(&dump(&[(0, vec![(1.0, 10.0), (2.0, 20.0)]), (1, vec![])]));
        let mass = b.unwrap().read_full("Particle").unwrap();
        assert_eq!(mass.get_f64(&[0, 1]), Some(2.0));
        assert_eq!(mass.get_f64(&[1, 0]), Some(PART_MISSING));
    }

    #[test]
    fn empty_dump_is_format_error() {
        let (_tmp, b) = open(&dump(&[(0, vec![])]));
        assert!(matches!(b, Err(MeteoError::Format(_))));
    }

    #[test]
    fn wrong_position_record_is_format_error() {
        let mut out = Vec::new();
        record(&mut out, &ints(&[1, 1, 11, 8, 1, 0]));
        record(&mut out, &floats(&[1.0]));
        record(&mut out, &floats(&[45.0, -120.0, 10.0]));
        record(&mut out, &ints(&[0, 1, 1, 1, 1]));
        let (_tmp, b) = open(&out);
        assert!(matches!(b, Err(MeteoError::Format(_))));
    }
}
