//! Surfer ASCII grid (`DSAA`)
//!
//! ```text
//! DSAA
//! nx ny
//! xmin xmax
//! ymin ymax
//! zmin zmax
//! <ny rows of nx values, first row at ymin>
//! ```

use super::text::{gather, Tokens};
use super::{validated, BackendKind, FormatBackend, Header};
use crate::array::TypedArray;
use crate::axis::{Axis, AxisKind};
use crate::errors::{MeteoError, Result};
use crate::field::{Attribute, ElementType, FieldBuilder};
use crate::layout::{GuardedFile, StorageLayout};
use crate::range::Section;
use std::path::Path;
use std::sync::Arc;

/// Blank value Surfer writes into masked nodes.
pub const SURFER_BLANK: f64 = 1.70141e38;

const HEADER_TOKENS: usize = 9;

pub fn probe(head: &[u8]) -> bool {
    head.starts_with(b"DSAA")
}

fn axis_coordinates(kind: AxisKind, name: &str, min: f64, max: f64, n: usize) -> Axis {
    let delta = if n > 1 { (max - min) / (n - 1) as f64 } else { 0.0 };
    Axis::regular(kind, name, min, delta, n)
}

#[derive(Debug)]
pub struct SurferGridBackend {
    file: GuardedFile,
    header: Header,
    nx: usize,
    ny: usize,
}

impl SurferGridBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let file = GuardedFile::open(path)?;
        let text = file.read_to_string()?;
        let mut tokens = Tokens::new(&text, "surfer header");
        if tokens.next_token()? != "DSAA" {
            return Err(MeteoError::format("surfer grid must start with DSAA"));
        }
        let nx = tokens.parse_count("nx")?;
        let ny = tokens.parse_count("ny")?;
        let xmin: f64 = tokens.parse("xmin")?;
        let xmax: f64 = tokens.parse("xmax")?;
        let ymin: f64 = tokens.parse("ymin")?;
        let ymax: f64 = tokens.parse("ymax")?;
        let zmin: f64 = tokens.parse("zmin")?;
        let zmax: f64 = tokens.parse("zmax")?;
        if nx == 0 || ny == 0 {
            return Err(MeteoError::format(format!(
                "surfer grid has empty dimensions {nx}x{ny}"
            )));
        }

        let y = Arc::new(axis_coordinates(AxisKind::Y, "y", ymin, ymax, ny));
        let x = Arc::new(axis_coordinates(AxisKind::X, "x", xmin, xmax, nx));
        let field = FieldBuilder::new("var", ElementType::Float)
            .axes([y.clone(), x.clone()])
            .fill_value(SURFER_BLANK)
            .build();

        Ok(Self {
            file,
            header: Header {
                fields: vec![field],
                axes: vec![y, x],
                attributes: vec![Attribute::number("zmin", zmin), Attribute::number("zmax", zmax)],
            },
            nx,
            ny,
        })
    }
}

impl FormatBackend for SurferGridBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::SurferGrid
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn read_section(&self, name: &str, section: &Section) -> Result<TypedArray> {
        let field = validated(&self.header, name, section)?;
        let text = self.file.read_to_string()?;
        let mut tokens = Tokens::new(&text, "surfer data");
        for _ in 0..HEADER_TOKENS {
            tokens.next_token()?;
        }
        let values = tokens.take_values(self.nx * self.ny)?;
        let layout = StorageLayout::row_major(&[self.ny, self.nx], 1);
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

    fn grid_file() -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(
            tmp,
            "DSAA\n3 2\n0 10\n20 30\n1 6\n1 2 3\n4 5 6\n"
        )
        .unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn parses_header_and_reads_rows() {
        let tmp = grid_file();
        let b = SurferGridBackend::open(tmp.path()).unwrap();
        let field = b.field("var").unwrap();
        assert_eq!(field.shape(), vec![2, 3]);
        let x = field.axis_of(AxisKind::X).unwrap();
        assert_eq!(x.coordinates(), Some(&[0.0, 5.0, 10.0][..]));
        assert_eq!(b.header().attribute("zmax").unwrap().as_numbers(), Some(&[6.0][..]));

        let row = b
            .read_section("var", &Section::new(vec![Range::single(1), Range::full(3).unwrap()]))
            .unwrap();
        assert_eq!(row.as_f32().unwrap().iter().copied().collect::<Vec<_>>(), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn missing_values_are_truncated() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "DSAA\n3 2\n0 10\n20 30\n1 6\n1 2 3\n4\n").unwrap();
        tmp.flush().unwrap();
        let b = SurferGridBackend::open(tmp.path()).unwrap();
        assert!(matches!(b.read_full("var"), Err(MeteoError::Io(_))));
    }
}
