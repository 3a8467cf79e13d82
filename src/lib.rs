//! meteoslice: axis-aware strided access to meteorological data files
//!
//! A Rust library for reading legacy meteorological grid, station and
//! trajectory formats through one uniform model. Every format is exposed as
//! a set of [`field::Field`]s over typed [`axis::Axis`] dimensions, and any
//! field can be read as a strided hyper-rectangular [`range::Section`] that
//! comes back as an `ndarray` array in logical axis order.
//!
//! ## Supported formats
//!
//! - NetCDF classic and NetCDF-4 (delegated to the `netcdf` crate, feature `netcdf`)
//! - Surfer ASCII grids (`DSAA`)
//! - MICAPS type 4 grids and MICAPS 131 radar mosaics
//! - MM5 model output (v3 big header) and MM5 intermediate files
//! - HYSPLIT trajectory endpoints and particle dumps
//! - Lon/lat station tables
//!
//! ## Module Organization
//!
//! - [`range`]: strided ranges and sections
//! - [`axis`] and [`field`]: the dataset model
//! - [`array`]: typed result arrays and labeled arrays
//! - [`layout`]: byte layouts, element codecs and guarded file handles
//! - [`backend`]: per-format header parsers and readers, plus sniffing
//! - [`take`]: fancy indexing with explicit index lists
//! - [`projection`]: projection-mode slice selection
//! - [`source`]: the [`DataSource`] facade
//! - [`statistics`]: axis reductions on the rayon pool and field summaries
//! - [`metadata`]: inspection helpers and JSON metadata
//! - [`parallel`]: global thread pool sizing
//! - [`time`]: OLE automation dates and header timestamps
//! - [`errors`]: centralized error handling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meteoslice::prelude::*;
//!
//! let source = DataSource::open("surface.grd").unwrap();
//! let field = source.header().unwrap().fields[0].name().to_string();
//! let section = Section::new(vec![Range::new(0, 10, 2).unwrap(), Range::full(5).unwrap()]);
//! let data = source.read_section(&field, &section).unwrap();
//! println!("{:?}", data.shape());
//! ```

pub mod array;
pub mod axis;
pub mod backend;
pub mod errors;
pub mod field;
pub mod layout;
pub mod metadata;
pub mod parallel;
pub mod projection;
pub mod range;
pub mod source;
pub mod statistics;
pub mod take;
pub mod time;

pub use errors::{MeteoError, Result};
pub use parallel::ParallelConfig;
pub use source::DataSource;

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::array::{LabeledArray, ReducePolicy, TypedArray};
    pub use crate::axis::{Axis, AxisKind};
    pub use crate::backend::{Backend, BackendKind, FormatBackend, Header};
    pub use crate::errors::{MeteoError, Result};
    pub use crate::field::{Attribute, AttributeValue, ElementType, Field};
    pub use crate::parallel::ParallelConfig;
    pub use crate::projection::{ProjectionMode, ProjectionSelector};
    pub use crate::range::{Range, Section};
    pub use crate::source::DataSource;
    pub use crate::statistics::{StatOperation, StatisticalReduction};
    pub use crate::take::AxisSelector;
}
