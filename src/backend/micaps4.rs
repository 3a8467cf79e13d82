//! MICAPS type 4 grid
//!
//! A description line (`diamond 4 ...`) is followed by 19 header tokens that
//! may wrap across lines:
//!
//! ```text
//! yy mm dd hh forecast-hours level dx dy x0 x1 y0 y1 nx ny
//! contour-interval contour-start contour-end smooth bold
//! ```
//!
//! then `nx * ny` values. A negative `dy` means the first data row is the
//! northernmost one.

use super::text::{first_line, gather, Tokens};
use super::{validated, BackendKind, FormatBackend, Header};
use crate::array::TypedArray;
use crate::axis::{Axis, AxisKind};
use crate::errors::{MeteoError, Result};
use crate::field::{Attribute, ElementType, FieldBuilder};
use crate::layout::{GuardedFile, StorageLayout};
use crate::range::Section;
use crate::time;
use chrono::Duration;
use std::path::Path;
use std::sync::Arc;

pub const MICAPS_MISSING: f64 = 9999.0;

const HEADER_TOKENS: usize = 19;

pub fn probe(head: &[u8]) -> bool {
    let text = String::from_utf8_lossy(head);
    let mut words = first_line(&text).split_whitespace();
    matches!(
        (words.next(), words.next()),
        (Some(d), Some("4")) if d.eq_ignore_ascii_case("diamond")
    )
}

#[derive(Debug)]
pub struct Micaps4Backend {
    file: GuardedFile,
    header: Header,
    nx: usize,
    ny: usize,
    y_reversed: bool,
}

impl Micaps4Backend {
    pub fn open(path: &Path) -> Result<Self> {
        let file = GuardedFile::open(path)?;
        let text = file.read_to_string()?;
        let description = first_line(&text).trim().to_string();
        let body = text.get(text.find('\n').map_or(text.len(), |i| i + 1)..).unwrap_or("");
        let mut tokens = Tokens::new(body, "micaps4 header");

        let year = time::expand_two_digit_year(tokens.parse("year")?);
        let month: u32 = tokens.parse("month")?;
        let day: u32 = tokens.parse("day")?;
        let hour: u32 = tokens.parse("hour")?;
        let forecast_hours: i64 = tokens.parse("forecast hours")?;
        let level: f64 = tokens.parse("level")?;
        let dx: f64 = tokens.parse("dx")?;
        let mut dy: f64 = tokens.parse("dy")?;
        let x0: f64 = tokens.parse("x0")?;
        let _x1: f64 = tokens.parse("x1")?;
        let mut y0: f64 = tokens.parse("y0")?;
        let mut y1: f64 = tokens.parse("y1")?;
        let nx = tokens.parse_count("nx")?;
        let ny = tokens.parse_count("ny")?;
        let contour_interval: f64 = tokens.parse("contour interval")?;
        let contour_start: f64 = tokens.parse("contour start")?;
        let contour_end: f64 = tokens.parse("contour end")?;
        let smooth: f64 = tokens.parse("smooth")?;
        let bold: f64 = tokens.parse("bold")?;
        if nx == 0 || ny == 0 {
            return Err(MeteoError::format(format!(
                "micaps4 grid has empty dimensions {nx}x{ny}"
            )));
        }

        let valid = time::datetime(year, month, day, hour, 0)? + Duration::hours(forecast_hours);

        let y_reversed = dy < 0.0;
        if y_reversed {
            dy = -dy;
        }
        if y0 > y1 {
            std::mem::swap(&mut y0, &mut y1);
        }

        let t = Arc::new(Axis::with_coordinates(
            AxisKind::Time,
            "time",
            vec![time::to_oadate(valid)],
        ));
        let z = Arc::new(Axis::with_coordinates(AxisKind::Vertical, "level", vec![level]));
        let y = Arc::new(Axis::regular(AxisKind::Y, "lat", y0, dy, ny).reversed(y_reversed));
        let x = Arc::new(Axis::regular(AxisKind::X, "lon", x0, dx, nx));
        let axes = vec![t, z, y, x];

        let field = FieldBuilder::new("var", ElementType::Float)
            .axes(axes.iter().cloned())
            .fill_value(MICAPS_MISSING)
            .build();

        let attributes = vec![
            Attribute::text("description", description),
            Attribute::number("forecast_hours", forecast_hours as f64),
            Attribute::number("contour_interval", contour_interval),
            Attribute::number("contour_start", contour_start),
            Attribute::number("contour_end", contour_end),
            Attribute::number("smooth", smooth),
            Attribute::number("bold", bold),
        ];

        Ok(Self {
            file,
            header: Header {
                fields: vec![field],
                axes,
                attributes,
            },
            nx,
            ny,
            y_reversed,
        })
    }
}

impl FormatBackend for Micaps4Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::Micaps4
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn read_section(&self, name: &str, section: &Section) -> Result<TypedArray> {
        let field = validated(&self.header, name, section)?;
        let text = self.file.read_to_string()?;
        let body = text.get(text.find('\n').map_or(text.len(), |i| i + 1)..).unwrap_or("");
        let mut tokens = Tokens::new(body, "micaps4 data");
        for _ in 0..HEADER_TOKENS {
            tokens.next_token()?;
        }
        let values = tokens.take_values(self.nx * self.ny)?;
        let layout = StorageLayout::row_major(&[1, 1, self.ny, self.nx], 1)
            .with_reversed(2, self.y_reversed);
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

    const SAMPLE: &str = "diamond 4 09071508_500hPa height\n\
        09 07 15 08 24 500\n\
        1.0 -1.0 100.0 102.0 31.0 30.0 3 2 4 0 100 1 0\n\
        1 2 3\n\
        4 5 6\n";

    #[test]
    fn probe_accepts_diamond_4() {
        assert!(probe(SAMPLE.as_bytes()));
        assert!(!probe(b"diamond 3 stations"));
    }

    #[test]
    fn header_and_reversed_rows() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(SAMPLE.as_bytes()).unwrap();
        tmp.flush().unwrap();
        let b = Micaps4Backend::open(tmp.path()).unwrap();
        let field = b.field("var").unwrap();
        assert_eq!(field.shape(), vec![1, 1, 2, 3]);

        let y = field.axis_of(AxisKind::Y).unwrap();
        assert!(y.is_reversed());
        assert_eq!(y.coordinates(), Some(&[30.0, 31.0][..]));

        let t = field.axis_of(AxisKind::Time).unwrap();
        let valid = time::datetime(2009, 7, 16, 8, 0).unwrap();
        assert_eq!(t.coordinate(0), Some(time::to_oadate(valid)));

        // logical row 0 is the southern row, stored last
        let south = b
            .read_section(
                "var",
                &Section::new(vec![
                    Range::single(0),
                    Range::single(0),
                    Range::single(0),
                    Range::full(3).unwrap(),
                ]),
            )
            .unwrap();
        let values: Vec<f32> = south.as_f32().unwrap().iter().copied().collect();
        assert_eq!(values, vec![4.0, 5.0, 6.0]);
    }
}
