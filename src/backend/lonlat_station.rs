//! Delimited station table
//!
//! ```text
//! id,lon,lat,temp,rh
//! 54511,116.47,39.80,21.5,40
//! ```
//!
//! The delimiter is a comma when the header row holds one, whitespace
//! otherwise. Columns from the fourth on whose first data cell is numeric
//! become station fields over a single `station` axis.

use super::text::{first_line, gather};
use super::{validated, BackendKind, FormatBackend, Header};
use crate::array::TypedArray;
use crate::axis::{Axis, AxisKind};
use crate::errors::{MeteoError, Result};
use crate::field::{Attribute, ElementType, FieldBuilder};
use crate::layout::{GuardedFile, StorageLayout};
use crate::range::Section;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub const STATION_MISSING: f64 = -9999.0;

const KEY_COLUMNS: usize = 3;

fn split_row(line: &str, comma: bool) -> Vec<&str> {
    if comma {
        line.split(',').map(str::trim).collect()
    } else {
        line.split_whitespace().collect()
    }
}

fn is_numeric(cell: &str) -> bool {
    cell.parse::<f64>().is_ok()
}

fn data_rows(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .skip(1)
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
}

pub fn probe(head: &[u8]) -> bool {
    let text = String::from_utf8_lossy(head);
    let header = first_line(&text);
    let comma = header.contains(',');
    if split_row(header, comma).len() <= KEY_COLUMNS {
        return false;
    }
    let has_data_row = data_rows(&text).next().is_some_and(|row| {
        let cells = split_row(row, comma);
        cells.len() > KEY_COLUMNS && is_numeric(cells[1]) && is_numeric(cells[2])
    });
    has_data_row
}

#[derive(Debug)]
pub struct LonLatStationBackend {
    file: GuardedFile,
    header: Header,
    comma: bool,
    /// Column index of every field
    columns: HashMap<String, usize>,
}

impl LonLatStationBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let file = GuardedFile::open(path)?;
        let text = file.read_to_string()?;
        let header_row = first_line(&text).trim();
        let comma = header_row.contains(',');
        let names = split_row(header_row, comma);
        if names.len() <= KEY_COLUMNS {
            return Err(MeteoError::format(format!(
                "station table needs id, lon, lat and at least one field, header has {} columns",
                names.len()
            )));
        }

        let mut ids = Vec::new();
        let mut lons = Vec::new();
        let mut lats = Vec::new();
        let mut first_cells: Option<Vec<String>> = None;
        for (n, row) in data_rows(&text).enumerate() {
            let cells = split_row(row, comma);
            if cells.len() < KEY_COLUMNS {
                return Err(MeteoError::format(format!(
                    "station row {} has {} columns",
                    n + 1,
                    cells.len()
                )));
            }
            let coord = |i: usize, what: &str| {
                cells[i].parse::<f64>().map_err(|_| {
                    MeteoError::format(format!("station row {}: bad {what} '{}'", n + 1, cells[i]))
                })
            };
            lons.push(coord(1, "longitude")?);
            lats.push(coord(2, "latitude")?);
            ids.push(cells[0].to_string());
            first_cells.get_or_insert_with(|| cells.iter().map(|c| c.to_string()).collect());
        }
        let Some(first_cells) = first_cells else {
            return Err(MeteoError::format("station table has no data rows"));
        };

        let station = Arc::new(Axis::indexed(AxisKind::Other, "station", ids.len()));
        let mut fields = Vec::new();
        let mut columns = HashMap::new();
        for (col, name) in names.iter().enumerate().skip(KEY_COLUMNS) {
            if !first_cells.get(col).is_some_and(|c| is_numeric(c)) {
                debug!(column = %name, "skipping non-numeric station column");
                continue;
            }
            fields.push(
                FieldBuilder::new(*name, ElementType::Float)
                    .axis(station.clone())
                    .fill_value(STATION_MISSING)
                    .station(true)
                    .build(),
            );
            columns.insert(name.to_string(), col);
        }
        if fields.is_empty() {
            return Err(MeteoError::format("station table has no numeric field columns"));
        }

        Ok(Self {
            file,
            header: Header {
                fields,
                axes: vec![station],
                attributes: vec![
                    Attribute::text("station_ids", ids.join(",")),
                    Attribute::numbers("station_lons", lons),
                    Attribute::numbers("station_lats", lats),
                ],
            },
            comma,
            columns,
        })
    }
}

impl FormatBackend for LonLatStationBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::LonLatStation
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn read_section(&self, name: &str, section: &Section) -> Result<TypedArray> {
        let field = validated(&self.header, name, section)?;
        let col = self.columns.get(name).copied().ok_or_else(|| MeteoError::VariableNotFound {
            var: name.to_string(),
        })?;
        let text = self.file.read_to_string()?;
        let values: Vec<f64> = data_rows(&text)
            .map(|row| {
                split_row(row, self.comma)
                    .get(col)
                    .and_then(|c| c.parse::<f64>().ok())
                    .unwrap_or(STATION_MISSING)
            })
            .collect();
        let layout = StorageLayout::row_major(&field.shape(), 1);
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

    fn table(content: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(content.as_bytes()).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn comma_table_with_text_column() {
        let tmp = table(
            "id,lon,lat,name,temp\nA,116.5,39.8,Beijing,21.5\nB,121.4,31.2,Shanghai,x\n",
        );
        let b = LonLatStationBackend::open(tmp.path()).unwrap();
        assert_eq!(b.header().field_names(), vec!["temp"]);
        assert_eq!(
            b.header().attribute("station_lons").unwrap().as_numbers(),
            Some(&[116.5, 121.4][..])
        );
        let temp = b.read_full("temp").unwrap();
        assert_eq!(temp.get_f64(&[0]), Some(21.5));
        assert_eq!(temp.get_f64(&[1]), Some(STATION_MISSING));
    }

    #[test]
    fn whitespace_table_and_strided_read() {
        let tmp = table("id lon lat v\n1 100 30 1\n2 101 31 2\n3 102 32 3\n");
        assert!(probe(b"id lon lat v\n1 100 30 1\n"));
        let b = LonLatStationBackend::open(tmp.path()).unwrap();
        let out = b
            .read_section("v", &Section::new(vec![Range::new(0, 2, 2).unwrap()]))
            .unwrap();
        assert_eq!(out.as_f32().unwrap().iter().copied().collect::<Vec<_>>(), vec![1.0, 3.0]);
    }

    #[test]
    fn probe_needs_coordinates() {
        assert!(!probe(b"a b c d\nx y z w\n"));
        assert!(!probe(b"id lon lat\n1 2 3\n"));
    }
}
