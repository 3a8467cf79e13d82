//! Data source facade
//!
//! [`DataSource`] owns at most one opened [`Backend`], picked by sniffing or
//! forced by kind, and layers projection-mode and station reads on top of the
//! plain section interface. A failed load leaves the source empty; every read
//! on an empty source fails with [`MeteoError::UnsupportedFormat`].

use crate::array::{LabeledArray, ReducePolicy, TypedArray};
use crate::backend::{self, Backend, BackendKind, FormatBackend, Header};
use crate::errors::{MeteoError, Result};
use crate::field::Field;
use crate::projection::ProjectionSelector;
use crate::range::Section;
use crate::take::{self, AxisSelector};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct DataSource {
    path: Option<PathBuf>,
    backend: Option<Backend>,
    pub projection: ProjectionSelector,
}

impl DataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sniff and open `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut source = Self::new();
        source.load(path.as_ref(), None)?;
        Ok(source)
    }

    /// Open `path` with a forced backend.
    pub fn open_as(path: impl AsRef<Path>, kind: BackendKind) -> Result<Self> {
        let mut source = Self::new();
        source.load(path.as_ref(), Some(kind))?;
        Ok(source)
    }

    /// Replace the active backend. On failure the source is left empty.
    pub fn load(&mut self, path: &Path, kind: Option<BackendKind>) -> Result<()> {
        if let Some(old) = self.backend.take() {
            old.close();
        }
        self.path = Some(path.to_path_buf());
        let opened = match kind {
            Some(kind) => Backend::open(path, kind),
            None => backend::sniff(path),
        };
        match opened {
            Ok(b) => {
                self.projection.field = b.fields().first().map(|f| f.name().to_string());
                self.backend = Some(b);
                Ok(())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "dataset could not be opened");
                Err(e)
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend(&self) -> Result<&Backend> {
        self.backend.as_ref().ok_or_else(|| {
            MeteoError::UnsupportedFormat(match &self.path {
                Some(p) => format!("no backend recognizes {}", p.display()),
                None => "no dataset is open".to_string(),
            })
        })
    }

    pub fn kind(&self) -> Result<BackendKind> {
        Ok(self.backend()?.kind())
    }

    pub fn header(&self) -> Result<&Header> {
        Ok(self.backend()?.header())
    }

    pub fn field(&self, name: &str) -> Result<&Field> {
        self.backend()?.field(name)
    }

    pub fn read(&self, name: &str) -> Result<TypedArray> {
        self.backend()?.read_full(name)
    }

    pub fn read_section(&self, name: &str, section: &Section) -> Result<TypedArray> {
        self.backend()?.read_section(name, section)
    }

    /// Read a section and label it with the sliced axes.
    pub fn read_labeled(
        &self,
        name: &str,
        section: &Section,
        policy: ReducePolicy,
    ) -> Result<LabeledArray> {
        let backend = self.backend()?;
        let field = backend.field(name)?;
        let data = backend.read_section(name, section)?;
        let axes = field
            .axes()
            .iter()
            .zip(section.ranges())
            .map(|(axis, r)| axis.extract(r).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        Ok(LabeledArray::new(data, axes)?.apply(policy))
    }

    pub fn take(&self, name: &str, selectors: &[AxisSelector]) -> Result<LabeledArray> {
        take::take(self.backend()?, name, selectors)
    }

    fn projected_field(&self) -> Result<&Field> {
        let backend = self.backend()?;
        match &self.projection.field {
            Some(name) => backend.field(name),
            None => backend.fields().first().ok_or_else(|| {
                MeteoError::format("dataset has no fields to project")
            }),
        }
    }

    /// The 1-D or 2-D slice the projection mode selects, singleton axes
    /// dropped.
    pub fn read_projection(&self) -> Result<LabeledArray> {
        let field = self.projected_field()?;
        let section = self.projection.section_for(field)?;
        info!(
            field = field.name(),
            mode = %self.projection.mode,
            section = %section,
            "projection read"
        );
        self.read_labeled(field.name(), &section, ReducePolicy::DropSingleton)
    }

    /// Every station of the selected field at the pinned time and level.
    pub fn read_stations(&self) -> Result<LabeledArray> {
        let field = self.projected_field()?;
        let section = self.projection.station_section(field)?;
        self.read_labeled(field.name(), &section, ReducePolicy::DropSingleton)
    }

    /// Release the backend's file handle. The header stays available; reads
    /// fail with an I/O error.
    pub fn close(&self) {
        if let Some(b) = &self.backend {
            b.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ProjectionMode;
    use std::io::Write;

    fn micaps4_file() -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(
            tmp,
            "diamond 4 test\n21 01 02 08 0 850\n1 1 100 102 30 31 3 2 4 0 100 1 0\n1 2 3\n4 5 6\n"
        )
        .unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn sniffs_and_projects() {
        let tmp = micaps4_file();
        let mut ds = DataSource::open(tmp.path()).unwrap();
        assert_eq!(ds.kind().unwrap(), BackendKind::Micaps4);
        assert_eq!(ds.projection.field.as_deref(), Some("var"));

        let grid = ds.read_projection().unwrap();
        assert_eq!(grid.shape(), &[2, 3]);

        ds.projection = ProjectionSelector::new(ProjectionMode::Lon)
            .with_field("var")
            .at(0, 0, 1, 0);
        let row = ds.read_projection().unwrap();
        assert_eq!(row.shape(), &[3]);
        assert_eq!(row.data().get_f64(&[2]), Some(6.0));
    }

    #[test]
    fn failed_load_leaves_source_empty() {
        let tmp = micaps4_file();
        let mut ds = DataSource::open(tmp.path()).unwrap();
        let mut garbage = tempfile::NamedTempFile::new().unwrap();
        garbage.write_all(&[0xff; 16]).unwrap();
        assert!(ds.load(garbage.path(), None).is_err());
        assert!(!ds.is_open());
        assert!(matches!(ds.read("var"), Err(MeteoError::UnsupportedFormat(_))));
    }

    #[test]
    fn reads_after_close_fail() {
        let tmp = micaps4_file();
        let ds = DataSource::open(tmp.path()).unwrap();
        ds.close();
        assert!(ds.header().is_ok());
        assert!(matches!(ds.read("var"), Err(MeteoError::Io(_))));
    }
}
