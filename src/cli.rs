//! Command-line interface options for the meteoslice binary.

use clap::Parser;
use std::path::PathBuf;

/// Inspect and slice meteorological grid, station and trajectory files
#[derive(Parser, Debug)]
#[command(
    version,
    name = "meteoslice",
    about = "Axis-aware slicing of legacy meteorological data files"
)]
pub struct Args {
    /// Path to the data file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Force a backend instead of sniffing (netcdf, surfer, micaps4, mm5, mm5im, hysplit,
    /// hysplitpart, micaps131, lonlat)
    #[arg(long)]
    pub format: Option<String>,

    /// List all fields and axes
    #[arg(long)]
    pub list_vars: bool,

    /// Describe a field (element type, axes, attributes)
    #[arg(long)]
    pub describe: Option<String>,

    /// Compute quick statistics (min/mean/max/std) for a field
    #[arg(long)]
    pub summary: Option<String>,

    /// Print dataset metadata as JSON
    #[arg(long)]
    pub json: bool,

    /// Read a slice, formatted as <field>,<axis>=<first>:<last>[:<stride>],<axis>=<i>|<j>|...
    #[arg(long, value_parser = parse_select_arg)]
    pub select: Option<SelectSpec>,

    /// Projection mode for a display read (latlon, level_lat, lat, time, ...)
    #[arg(long)]
    pub mode: Option<String>,

    /// Field the projection read uses; defaults to the first field
    #[arg(long)]
    pub field: Option<String>,

    /// Time index pinned by the projection mode
    #[arg(long, default_value_t = 0)]
    pub time: usize,

    /// Level index pinned by the projection mode
    #[arg(long, default_value_t = 0)]
    pub level: usize,

    /// Latitude (Y) index pinned by the projection mode
    #[arg(long, default_value_t = 0)]
    pub lat: usize,

    /// Longitude (X) index pinned by the projection mode
    #[arg(long, default_value_t = 0)]
    pub lon: usize,

    /// Reduce a field along one axis, formatted as <field>:<op>:<axis> with op one of
    /// mean, sum, min, max
    #[arg(long, value_parser = parse_stat_arg)]
    pub stat: Option<StatSpec>,

    /// Number of threads for statistics. Defaults to Rayon's pool size.
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Enable verbose (debug) logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// One axis of a `--select` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisSpec {
    Range { first: usize, last: usize, stride: usize },
    Indices(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectSpec {
    pub field: String,
    /// Axes not named here are read in full.
    pub axes: Vec<(String, AxisSpec)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatSpec {
    pub field: String,
    pub operation: String,
    pub axis: String,
}

fn parse_index(s: &str, axis: &str) -> Result<usize, String> {
    s.trim()
        .parse::<usize>()
        .map_err(|_| format!("invalid index '{s}' for axis '{axis}'"))
}

fn parse_axis_spec(axis: &str, spec: &str) -> Result<AxisSpec, String> {
    if spec.contains('|') || !spec.contains(':') {
        let indices = spec
            .split('|')
            .map(|s| parse_index(s, axis))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(AxisSpec::Indices(indices));
    }
    let parts: Vec<&str> = spec.split(':').collect();
    match parts.as_slice() {
        [first, last] => Ok(AxisSpec::Range {
            first: parse_index(first, axis)?,
            last: parse_index(last, axis)?,
            stride: 1,
        }),
        [first, last, stride] => Ok(AxisSpec::Range {
            first: parse_index(first, axis)?,
            last: parse_index(last, axis)?,
            stride: parse_index(stride, axis)?,
        }),
        _ => Err(format!(
            "invalid range '{spec}' for axis '{axis}': expected <first>:<last>[:<stride>]"
        )),
    }
}

fn parse_select_arg(s: &str) -> Result<SelectSpec, String> {
    let mut parts = s.split(',');
    let field = parts
        .next()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .ok_or_else(|| "invalid select: expected '<field>,<axis>=<spec>,...'".to_string())?
        .to_string();

    let axes = parts
        .map(|part| {
            let (axis, spec) = part
                .split_once('=')
                .ok_or_else(|| format!("invalid axis selection '{part}': expected <axis>=<spec>"))?;
            let axis = axis.trim().to_string();
            let spec = parse_axis_spec(&axis, spec.trim())?;
            Ok((axis, spec))
        })
        .collect::<Result<Vec<_>, String>>()?;

    Ok(SelectSpec { field, axes })
}

fn parse_stat_arg(s: &str) -> Result<StatSpec, String> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [field, op, axis] => Ok(StatSpec {
            field: field.to_string(),
            operation: op.to_string(),
            axis: axis.to_string(),
        }),
        _ => Err("invalid format: expected '<field>:<op>:<axis>'".to_string()),
    }
}
