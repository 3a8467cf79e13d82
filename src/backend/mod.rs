//! Format backends
//!
//! Each supported encoding is one backend: a header parser that runs once in
//! `open` and a physical reader that turns a [`Section`] into a
//! [`TypedArray`]. All backends implement [`FormatBackend`]; the [`Backend`]
//! sum type dispatches over them by [`BackendKind`].
//!
//! ## Sniffing
//!
//! [`sniff`] reads the first few kilobytes of a file and walks
//! [`BackendKind::SNIFF_ORDER`]: every kind whose cheap structural probe
//! accepts the head is trial-opened and the first successful open wins.

pub mod fortran;
pub mod hysplit_part;
pub mod hysplit_traj;
pub mod lonlat_station;
pub mod micaps131;
pub mod micaps4;
pub mod mm5;
pub mod mm5im;
#[cfg(feature = "netcdf")]
pub mod netcdf_io;
pub mod surfer;
mod text;

use crate::array::TypedArray;
use crate::axis::Axis;
use crate::errors::{MeteoError, Result};
use crate::field::{find_attribute, Attribute, Field};
use crate::range::Section;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

pub use hysplit_part::HysplitPartBackend;
pub use hysplit_traj::HysplitTrajBackend;
pub use lonlat_station::LonLatStationBackend;
pub use micaps131::Micaps131Backend;
pub use micaps4::Micaps4Backend;
pub use mm5::Mm5Backend;
pub use mm5im::Mm5IntermediateBackend;
#[cfg(feature = "netcdf")]
pub use netcdf_io::NetCdfBackend;
pub use surfer::SurferGridBackend;

const SNIFF_BYTES: u64 = 4096;

/// Tag for every supported encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    NetCdf,
    SurferGrid,
    Micaps4,
    Mm5,
    Mm5Intermediate,
    HysplitTraj,
    HysplitPart,
    Micaps131,
    LonLatStation,
}

impl BackendKind {
    /// Order in which [`sniff`] tries backends.
    pub const SNIFF_ORDER: [BackendKind; 9] = [
        BackendKind::NetCdf,
        BackendKind::SurferGrid,
        BackendKind::Micaps4,
        BackendKind::Mm5,
        BackendKind::Mm5Intermediate,
        BackendKind::HysplitTraj,
        BackendKind::HysplitPart,
        BackendKind::Micaps131,
        BackendKind::LonLatStation,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NetCdf => "netcdf",
            Self::SurferGrid => "surfer",
            Self::Micaps4 => "micaps4",
            Self::Mm5 => "mm5",
            Self::Mm5Intermediate => "mm5im",
            Self::HysplitTraj => "hysplit",
            Self::HysplitPart => "hysplitpart",
            Self::Micaps131 => "micaps131",
            Self::LonLatStation => "lonlat",
        }
    }

    /// Cheap structural check on the first bytes of a file.
    pub fn probe(self, head: &[u8], file_len: u64) -> bool {
        match self {
            Self::NetCdf => {
                head.starts_with(b"CDF\x01")
                    || head.starts_with(b"CDF\x02")
                    || head.starts_with(b"\x89HDF")
            }
            Self::SurferGrid => surfer::probe(head),
            Self::Micaps4 => micaps4::probe(head),
            Self::Mm5 => mm5::probe(head),
            Self::Mm5Intermediate => mm5im::probe(head),
            Self::HysplitTraj => hysplit_traj::probe(head),
            Self::HysplitPart => hysplit_part::probe(head),
            Self::Micaps131 => micaps131::probe(head, file_len),
            Self::LonLatStation => lonlat_station::probe(head),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = MeteoError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        Self::SNIFF_ORDER
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::SNIFF_ORDER.iter().map(|k| k.as_str()).collect();
                MeteoError::UnsupportedFormat(format!(
                    "unknown format '{s}', expected one of: {}",
                    known.join(", ")
                ))
            })
    }
}

/// Immutable result of a header parse
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    pub fields: Vec<Field>,
    pub axes: Vec<Arc<Axis>>,
    pub attributes: Vec<Attribute>,
}

impl Header {
    pub fn field(&self, name: &str) -> Result<&Field> {
        self.fields
            .iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| MeteoError::VariableNotFound {
                var: name.to_string(),
            })
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        find_attribute(&self.attributes, name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(Field::name).collect()
    }
}

/// Capability set every format backend provides
pub trait FormatBackend {
    fn kind(&self) -> BackendKind;

    fn header(&self) -> &Header;

    fn fields(&self) -> &[Field] {
        &self.header().fields
    }

    fn field(&self, name: &str) -> Result<&Field> {
        self.header().field(name)
    }

    fn global_attributes(&self) -> &[Attribute] {
        &self.header().attributes
    }

    /// Read one slice of a field. The section is validated against the
    /// field before any I/O; the result's shape equals the section lengths.
    fn read_section(&self, name: &str, section: &Section) -> Result<TypedArray>;

    fn read_full(&self, name: &str) -> Result<TypedArray> {
        let section = Section::full(self.field(name)?)?;
        self.read_section(name, &section)
    }

    /// Release the file handle; later reads fail with an I/O error.
    fn close(&self);
}

/// Field lookup plus section validation shared by every backend.
pub(crate) fn validated<'a>(
    header: &'a Header,
    name: &str,
    section: &Section,
) -> Result<&'a Field> {
    let field = header.field(name)?;
    section.validate_for(field)?;
    Ok(field)
}

/// One opened backend of any kind
#[derive(Debug)]
pub enum Backend {
    #[cfg(feature = "netcdf")]
    NetCdf(NetCdfBackend),
    SurferGrid(SurferGridBackend),
    Micaps4(Micaps4Backend),
    Micaps131(Micaps131Backend),
    Mm5(Mm5Backend),
    Mm5Intermediate(Mm5IntermediateBackend),
    LonLatStation(LonLatStationBackend),
    HysplitTraj(HysplitTrajBackend),
    HysplitPart(HysplitPartBackend),
}

impl Backend {
    /// Open `path` with a specific backend.
    pub fn open(path: &Path, kind: BackendKind) -> Result<Self> {
        let backend = match kind {
            #[cfg(feature = "netcdf")]
            BackendKind::NetCdf => Backend::NetCdf(NetCdfBackend::open(path)?),
            #[cfg(not(feature = "netcdf"))]
            BackendKind::NetCdf => {
                return Err(MeteoError::UnsupportedFormat(
                    "built without the netcdf feature".to_string(),
                ))
            }
            BackendKind::SurferGrid => Backend::SurferGrid(SurferGridBackend::open(path)?),
            BackendKind::Micaps4 => Backend::Micaps4(Micaps4Backend::open(path)?),
            BackendKind::Micaps131 => Backend::Micaps131(Micaps131Backend::open(path)?),
            BackendKind::Mm5 => Backend::Mm5(Mm5Backend::open(path)?),
            BackendKind::Mm5Intermediate => {
                Backend::Mm5Intermediate(Mm5IntermediateBackend::open(path)?)
            }
            BackendKind::LonLatStation => Backend::LonLatStation(LonLatStationBackend::open(path)?),
            BackendKind::HysplitTraj => Backend::HysplitTraj(HysplitTrajBackend::open(path)?),
            BackendKind::HysplitPart => Backend::HysplitPart(HysplitPartBackend::open(path)?),
        };
        info!(
            path = %path.display(),
            kind = %kind,
            fields = backend.fields().len(),
            "opened dataset"
        );
        Ok(backend)
    }

    fn inner(&self) -> &dyn FormatBackend {
        match self {
            #[cfg(feature = "netcdf")]
            Backend::NetCdf(b) => b,
            Backend::SurferGrid(b) => b,
            Backend::Micaps4(b) => b,
            Backend::Micaps131(b) => b,
            Backend::Mm5(b) => b,
            Backend::Mm5Intermediate(b) => b,
            Backend::LonLatStation(b) => b,
            Backend::HysplitTraj(b) => b,
            Backend::HysplitPart(b) => b,
        }
    }
}

impl FormatBackend for Backend {
    fn kind(&self) -> BackendKind {
        self.inner().kind()
    }

    fn header(&self) -> &Header {
        self.inner().header()
    }

    fn read_section(&self, name: &str, section: &Section) -> Result<TypedArray> {
        self.inner().read_section(name, section)
    }

    fn close(&self) {
        self.inner().close();
    }
}

/// Detect the format of `path` and open it.
pub fn sniff(path: &Path) -> Result<Backend> {
    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut head = Vec::with_capacity(SNIFF_BYTES as usize);
    file.by_ref().take(SNIFF_BYTES).read_to_end(&mut head)?;
    drop(file);

    for kind in BackendKind::SNIFF_ORDER {
        if !kind.probe(&head, file_len) {
            continue;
        }
        debug!(path = %path.display(), kind = %kind, "probe accepted");
        match Backend::open(path, kind) {
            Ok(backend) => return Ok(backend),
            Err(e) => debug!(kind = %kind, error = %e, "trial open failed"),
        }
    }
    Err(MeteoError::UnsupportedFormat(format!(
        "no backend recognizes {}",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in BackendKind::SNIFF_ORDER {
            assert_eq!(kind.as_str().parse::<BackendKind>().unwrap(), kind);
        }
        assert!(matches!(
            "grib".parse::<BackendKind>(),
            Err(MeteoError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn netcdf_magic_probe() {
        assert!(BackendKind::NetCdf.probe(b"CDF\x01rest", 100));
        assert!(BackendKind::NetCdf.probe(b"\x89HDF\r\n", 100));
        assert!(!BackendKind::NetCdf.probe(b"DSAA", 100));
    }
}
