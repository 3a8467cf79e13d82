//! HYSPLIT trajectory endpoints
//!
//! ```text
//! 1                                   meteorological file count
//!     GDAS1    11     8     1     0     0
//! 2 BACKWARD OMEGA                    trajectories, direction, motion
//!  11     8     1     0  39.900  116.400   500.0
//!  11     8     1     0  39.900  116.400  1000.0
//! 1 PRESSURE                          diagnostic count and names
//!  1 1 11 8 1 0 0 0 0.0 39.900 116.400 500.0 952.3
//! ```
//!
//! Endpoint columns are trajectory, grid, year, month, day, hour, minute,
//! forecast hour, age, lat, lon, height and then one column per diagnostic.
//! Long endpoint rows may wrap onto a second line.

use super::text::gather;
use super::{validated, BackendKind, FormatBackend, Header};
use crate::array::TypedArray;
use crate::axis::{Axis, AxisKind};
use crate::errors::{MeteoError, Result};
use crate::field::{Attribute, ElementType, FieldBuilder};
use crate::layout::{GuardedFile, StorageLayout};
use crate::range::Section;
use crate::time;
use std::path::Path;
use std::sync::Arc;

pub const TRAJ_MISSING: f64 = -9999.0;

/// Fields every trajectory file provides before its diagnostics
pub const FIXED_FIELDS: [&str; 5] = ["time", "run_hour", "lat", "lon", "height"];

const ENDPOINT_COLUMNS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "FORWARD" => Some(Self::Forward),
            "BACKWARD" => Some(Self::Backward),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "FORWARD",
            Self::Backward => "BACKWARD",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct TrajStart {
    time: f64,
    lat: f64,
    lon: f64,
    height: f64,
}

/// Parsed trajectory file; `endpoints[t]` holds the rows of trajectory `t`,
/// each laid out like [`FIXED_FIELDS`] followed by the diagnostics.
#[derive(Debug, Clone, PartialEq)]
struct TrajDocument {
    meteo_files: usize,
    direction: Direction,
    vertical_motion: String,
    starts: Vec<TrajStart>,
    diagnostics: Vec<String>,
    endpoints: Vec<Vec<Vec<f64>>>,
}

impl TrajDocument {
    fn obs_count(&self) -> usize {
        self.endpoints.iter().map(Vec::len).max().unwrap_or(0)
    }

    fn field_count(&self) -> usize {
        FIXED_FIELDS.len() + self.diagnostics.len()
    }
}

fn words(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}

fn parse_word<T: std::str::FromStr>(words: &[&str], i: usize, what: &str) -> Result<T> {
    let word = words
        .get(i)
        .ok_or_else(|| MeteoError::format(format!("hysplit: missing {what}")))?;
    word.parse::<T>()
        .map_err(|_| MeteoError::format(format!("hysplit: bad {what} '{word}'")))
}

fn parse_time(words: &[&str], at: usize, with_minute: bool) -> Result<f64> {
    let year = time::expand_two_digit_year(parse_word(words, at, "year")?);
    let minute = if with_minute {
        parse_word(words, at + 4, "minute")?
    } else {
        0
    };
    let t = time::datetime(
        year,
        parse_word(words, at + 1, "month")?,
        parse_word(words, at + 2, "day")?,
        parse_word(words, at + 3, "hour")?,
        minute,
    )?;
    Ok(time::to_oadate(t))
}

fn parse_document(text: &str) -> Result<TrajDocument> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let mut next_line = |what: &str| {
        lines
            .next()
            .ok_or_else(|| MeteoError::format(format!("hysplit: file ends before {what}")))
    };

    let meteo_line = words(next_line("meteo file count")?);
    let meteo_files: usize = parse_word(&meteo_line, 0, "meteo file count")?;
    for _ in 0..meteo_files {
        next_line("meteo file line")?;
    }

    let run = words(next_line("trajectory count")?);
    let traj_count: usize = parse_word(&run, 0, "trajectory count")?;
    let direction = run
        .get(1)
        .and_then(|w| Direction::parse(w))
        .ok_or_else(|| MeteoError::format("hysplit: direction must be FORWARD or BACKWARD"))?;
    let vertical_motion = run.get(2).copied().unwrap_or_default().to_string();

    let mut starts = Vec::with_capacity(traj_count);
    for _ in 0..traj_count {
        let w = words(next_line("trajectory start")?);
        starts.push(TrajStart {
            time: parse_time(&w, 0, false)?,
            lat: parse_word(&w, 4, "start latitude")?,
            lon: parse_word(&w, 5, "start longitude")?,
            height: parse_word(&w, 6, "start height")?,
        });
    }

    let vars = words(next_line("diagnostic list")?);
    let declared: usize = parse_word(&vars, 0, "diagnostic count")?;
    let diagnostics: Vec<String> = vars
        .iter()
        .skip(1)
        .take(declared)
        .map(|s| s.to_string())
        .collect();

    let columns = ENDPOINT_COLUMNS + diagnostics.len();
    let mut endpoints = vec![Vec::new(); traj_count];
    while let Some(line) = lines.next() {
        let mut w = words(line);
        if w.len() < columns {
            if let Some(rest) = lines.next() {
                w.extend(words(rest));
            }
        }
        if w.len() < columns {
            return Err(MeteoError::truncated(format!(
                "hysplit: endpoint row has {} of {columns} columns",
                w.len()
            )));
        }
        let traj: usize = parse_word(&w, 0, "trajectory number")?;
        let rows = traj
            .checked_sub(1)
            .and_then(|t| endpoints.get_mut(t))
            .ok_or_else(|| {
                MeteoError::format(format!(
                    "hysplit: endpoint for trajectory {traj} of {traj_count}"
                ))
            })?;
        let mut row = Vec::with_capacity(FIXED_FIELDS.len() + diagnostics.len());
        row.push(parse_time(&w, 2, true)?);
        row.push(parse_word(&w, 8, "age")?);
        row.push(parse_word(&w, 9, "latitude")?);
        row.push(parse_word(&w, 10, "longitude")?);
        row.push(parse_word(&w, 11, "height")?);
        for (i, name) in diagnostics.iter().enumerate() {
            row.push(parse_word(&w, ENDPOINT_COLUMNS + i, name)?);
        }
        rows.push(row);
    }

    Ok(TrajDocument {
        meteo_files,
        direction,
        vertical_motion,
        starts,
        diagnostics,
        endpoints,
    })
}

pub fn probe(head: &[u8]) -> bool {
    let text = String::from_utf8_lossy(head);
    let mut lines = text.lines();
    let first = lines.next().and_then(|l| l.split_whitespace().next());
    let Some(Ok(n)) = first.map(str::parse::<usize>) else {
        return false;
    };
    lines
        .nth(n)
        .map(words)
        .is_some_and(|w| {
            w.len() >= 2 && w[0].parse::<usize>().is_ok() && Direction::parse(w[1]).is_some()
        })
}

#[derive(Debug)]
pub struct HysplitTrajBackend {
    file: GuardedFile,
    header: Header,
}

impl HysplitTrajBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let file = GuardedFile::open(path)?;
        let doc = parse_document(&file.read_to_string()?)?;
        if doc.obs_count() == 0 {
            return Err(MeteoError::format(format!(
                "hysplit: {} has no trajectory endpoints",
                path.display()
            )));
        }

        let trajectory = Arc::new(Axis::indexed(AxisKind::Other, "trajectory", doc.starts.len()));
        let obs = Arc::new(Axis::indexed(AxisKind::Other, "obs", doc.obs_count()));
        let fields = FIXED_FIELDS
            .iter()
            .copied()
            .chain(doc.diagnostics.iter().map(String::as_str))
            .map(|name| {
                FieldBuilder::new(name, ElementType::Double)
                    .axes([trajectory.clone(), obs.clone()])
                    .attribute(Attribute::text("long_name", name))
                    .fill_value(TRAJ_MISSING)
                    .build()
            })
            .collect();

        let start = |f: fn(&TrajStart) -> f64| doc.starts.iter().map(f).collect::<Vec<_>>();
        let attributes = vec![
            Attribute::number("meteo_files", doc.meteo_files as f64),
            Attribute::text("direction", doc.direction.as_str()),
            Attribute::text("vertical_motion", doc.vertical_motion.clone()),
            Attribute::numbers("start_times", start(|s| s.time)),
            Attribute::numbers("start_lats", start(|s| s.lat)),
            Attribute::numbers("start_lons", start(|s| s.lon)),
            Attribute::numbers("start_heights", start(|s| s.height)),
        ];

        Ok(Self {
            file,
            header: Header {
                fields,
                axes: vec![trajectory, obs],
                attributes,
            },
        })
    }
}

impl FormatBackend for HysplitTrajBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::HysplitTraj
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn read_section(&self, name: &str, section: &Section) -> Result<TypedArray> {
        let field = validated(&self.header, name, section)?;
        let column = self
            .header
            .fields
            .iter()
            .position(|f| f.name() == name)
            .unwrap_or_default();
        let doc = parse_document(&self.file.read_to_string()?)?;
        let shape = field.shape();
        if doc.field_count() != self.header.fields.len()
            || doc.starts.len() != shape[0]
            || doc.obs_count() != shape[1]
        {
            return Err(MeteoError::format("hysplit: file changed since it was opened"));
        }

        let mut values = vec![TRAJ_MISSING; shape[0] * shape[1]];
        for (t, rows) in doc.endpoints.iter().enumerate() {
            for (o, row) in rows.iter().enumerate() {
                values[t * shape[1] + o] = row[column];
            }
        }
        let layout = StorageLayout::row_major(&shape, 1);
        gather(&values, &layout, field.element_type(), section)
    }

    fn close(&self) {
        self.file.close();
    }
}
