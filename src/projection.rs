//! Projection modes
//!
//! A display-oriented shortcut for building sections. A mode names which axis
//! kinds stay free (full length); every other axis is pinned to a single
//! index taken from the selector state. The (mode, kind) table is a plain
//! `match` so adding a mode or a kind fails to compile until it is covered.

use crate::axis::AxisKind;
use crate::errors::{MeteoError, Result};
use crate::field::Field;
use crate::range::{Range, Section};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ProjectionMode {
    /// Full horizontal grid
    #[default]
    LatLon,
    LevelLat,
    LevelLon,
    LevelTime,
    TimeLat,
    TimeLon,
    Lat,
    Lon,
    Level,
    Time,
}

/// Which scalar selector pins an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Time,
    Level,
    Lat,
    Lon,
    /// Axes no selector covers are pinned at index 0.
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisDecision {
    Full,
    Pinned(Selector),
}

impl ProjectionMode {
    pub const ALL: [ProjectionMode; 10] = [
        ProjectionMode::LatLon,
        ProjectionMode::LevelLat,
        ProjectionMode::LevelLon,
        ProjectionMode::LevelTime,
        ProjectionMode::TimeLat,
        ProjectionMode::TimeLon,
        ProjectionMode::Lat,
        ProjectionMode::Lon,
        ProjectionMode::Level,
        ProjectionMode::Time,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LatLon => "latlon",
            Self::LevelLat => "level_lat",
            Self::LevelLon => "level_lon",
            Self::LevelTime => "level_time",
            Self::TimeLat => "time_lat",
            Self::TimeLon => "time_lon",
            Self::Lat => "lat",
            Self::Lon => "lon",
            Self::Level => "level",
            Self::Time => "time",
        }
    }

    pub fn decision(self, kind: AxisKind) -> AxisDecision {
        use AxisKind as K;
        use ProjectionMode as M;
        let free = match (self, kind) {
            (M::LatLon, K::Y | K::X) => true,
            (M::LevelLat, K::Vertical | K::Y) => true,
            (M::LevelLon, K::Vertical | K::X) => true,
            (M::LevelTime, K::Vertical | K::Time) => true,
            (M::TimeLat, K::Time | K::Y) => true,
            (M::TimeLon, K::Time | K::X) => true,
            (M::Lat, K::Y) | (M::Lon, K::X) | (M::Level, K::Vertical) | (M::Time, K::Time) => true,
            (_, K::Time | K::Vertical | K::Y | K::X | K::Other) => false,
        };
        if free {
            return AxisDecision::Full;
        }
        AxisDecision::Pinned(match kind {
            K::Time => Selector::Time,
            K::Vertical => Selector::Level,
            K::Y => Selector::Lat,
            K::X => Selector::Lon,
            K::Other => Selector::Zero,
        })
    }

    /// Axis kinds left at full length.
    pub fn free_kinds(self) -> Vec<AxisKind> {
        AxisKind::ALL
            .into_iter()
            .filter(|&k| self.decision(k) == AxisDecision::Full)
            .collect()
    }

    pub fn dimension_count(self) -> usize {
        match self {
            Self::LatLon
            | Self::LevelLat
            | Self::LevelLon
            | Self::LevelTime
            | Self::TimeLat
            | Self::TimeLon => 2,
            Self::Lat | Self::Lon | Self::Level | Self::Time => 1,
        }
    }
}

impl fmt::Display for ProjectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectionMode {
    type Err = MeteoError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|m| m.as_str()).collect();
                MeteoError::invalid_range(format!(
                    "unknown projection mode '{s}', expected one of: {}",
                    known.join(", ")
                ))
            })
    }
}

/// Mode plus the scalar indices pinned axes are read at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionSelector {
    pub mode: ProjectionMode,
    pub time: usize,
    pub level: usize,
    pub lat: usize,
    pub lon: usize,
    pub field: Option<String>,
}

impl ProjectionSelector {
    pub fn new(mode: ProjectionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>) -> Self {
        self.field = Some(name.into());
        self
    }

    #[must_use]
    pub fn at(mut self, time: usize, level: usize, lat: usize, lon: usize) -> Self {
        self.time = time;
        self.level = level;
        self.lat = lat;
        self.lon = lon;
        self
    }

    pub fn index(&self, selector: Selector) -> usize {
        match selector {
            Selector::Time => self.time,
            Selector::Level => self.level,
            Selector::Lat => self.lat,
            Selector::Lon => self.lon,
            Selector::Zero => 0,
        }
    }

    fn pinned(&self, selector: Selector, field: &Field, axis: usize) -> Result<Range> {
        let index = self.index(selector);
        let len = field.axes()[axis].length();
        if index >= len {
            return Err(MeteoError::invalid_range(format!(
                "{selector:?} index {index} out of bounds for axis '{}' of length {len} in '{}'",
                field.axes()[axis].short_name(),
                field.name()
            )));
        }
        Ok(Range::single(index))
    }

    /// Section the current mode selects from `field`.
    pub fn section_for(&self, field: &Field) -> Result<Section> {
        let ranges = field
            .axes()
            .iter()
            .enumerate()
            .map(|(i, axis)| match self.mode.decision(axis.kind()) {
                AxisDecision::Full => Range::full(axis.length()),
                AxisDecision::Pinned(sel) => self.pinned(sel, field, i),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Section::new(ranges))
    }

    /// Section for a station read: time and level pinned, everything else
    /// full.
    pub fn station_section(&self, field: &Field) -> Result<Section> {
        let ranges = field
            .axes()
            .iter()
            .enumerate()
            .map(|(i, axis)| match axis.kind() {
                AxisKind::Time => self.pinned(Selector::Time, field, i),
                AxisKind::Vertical => self.pinned(Selector::Level, field, i),
                _ => Range::full(axis.length()),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Section::new(ranges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::Axis;
    use crate::field::{ElementType, FieldBuilder};
    use std::sync::Arc;

    fn every_kind() -> Field {
        FieldBuilder::new("f", ElementType::Float)
            .axis(Arc::new(Axis::indexed(AxisKind::Time, "t", 4)))
            .axis(Arc::new(Axis::indexed(AxisKind::Vertical, "z", 5)))
            .axis(Arc::new(Axis::indexed(AxisKind::Other, "member", 2)))
            .axis(Arc::new(Axis::indexed(AxisKind::Y, "y", 6)))
            .axis(Arc::new(Axis::indexed(AxisKind::X, "x", 7)))
            .build()
    }

    #[test]
    fn table_is_complete() {
        let field = every_kind();
        let sel = ProjectionSelector::new(ProjectionMode::LatLon).at(3, 4, 5, 6);
        for mode in ProjectionMode::ALL {
            let free = mode.free_kinds();
            assert_eq!(free.len(), mode.dimension_count(), "{mode}");
            let section = ProjectionSelector { mode, ..sel.clone() }.section_for(&field).unwrap();
            for (axis, range) in field.axes().iter().zip(section.ranges()) {
                if free.contains(&axis.kind()) {
                    assert_eq!(range.length(), axis.length(), "{mode} {}", axis.kind());
                } else {
                    assert_eq!(range.length(), 1, "{mode} {}", axis.kind());
                }
            }
        }
    }

    #[test]
    fn pinned_indices_follow_selectors() {
        let field = every_kind();
        let section = ProjectionSelector::new(ProjectionMode::LevelTime)
            .at(3, 4, 5, 6)
            .section_for(&field)
            .unwrap();
        let firsts: Vec<usize> = section.ranges().iter().map(Range::first).collect();
        assert_eq!(firsts, vec![0, 0, 0, 5, 6]);
        assert_eq!(
            ProjectionMode::Lat.decision(AxisKind::Other),
            AxisDecision::Pinned(Selector::Zero)
        );
    }

    #[test]
    fn out_of_bounds_selector_is_rejected() {
        let field = every_kind();
        let err = ProjectionSelector::new(ProjectionMode::LatLon)
            .at(4, 0, 0, 0)
            .section_for(&field)
            .unwrap_err();
        assert!(matches!(err, MeteoError::InvalidRange(_)));
    }

    #[test]
    fn station_section_keeps_other_axes() {
        let field = every_kind();
        let s = ProjectionSelector::default().at(1, 2, 0, 0).station_section(&field).unwrap();
        assert_eq!(s.shape(), vec![1, 1, 2, 6, 7]);
    }

    #[test]
    fn mode_names_parse() {
        for mode in ProjectionMode::ALL {
            assert_eq!(mode.as_str().parse::<ProjectionMode>().unwrap(), mode);
        }
        assert_eq!("level-lat".parse::<ProjectionMode>().unwrap(), ProjectionMode::LevelLat);
        assert!("diagonal".parse::<ProjectionMode>().is_err());
    }
}
