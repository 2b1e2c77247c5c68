//! Output locations and the model's training grid.

use ds_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate slack when testing containment, in degrees.
const EXTENT_TOLERANCE: f64 = 1e-9;

/// A target point the model predicts at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputLocation {
    pub lon: f64,
    pub lat: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl OutputLocation {
    pub fn new(lon: f64, lat: f64) -> Self {
        OutputLocation { lon, lat, name: None }
    }

    pub fn named(lon: f64, lat: f64, name: impl Into<String>) -> Self {
        OutputLocation {
            lon,
            lat,
            name: Some(name.into()),
        }
    }

    /// Display label: the name, or the coordinates.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("({:.3}, {:.3})", self.lon, self.lat),
        }
    }
}

/// Closed lon/lat bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridExtent {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl GridExtent {
    /// Bounding box of coordinate axes. Fails on empty or non-finite axes.
    pub fn from_axes(lons: &[f64], lats: &[f64]) -> Result<Self> {
        let bounds = |axis: &[f64], what: &str| -> Result<(f64, f64)> {
            if axis.is_empty() {
                return Err(Error::EmptyInput(format!("training grid has no {what}")));
            }
            if axis.iter().any(|v| !v.is_finite()) {
                return Err(Error::Config(format!(
                    "training grid {what} contain non-finite values"
                )));
            }
            let min = axis.iter().copied().fold(f64::INFINITY, f64::min);
            let max = axis.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            Ok((min, max))
        };
        let (lon_min, lon_max) = bounds(lons, "longitudes")?;
        let (lat_min, lat_max) = bounds(lats, "latitudes")?;
        Ok(GridExtent {
            lon_min,
            lon_max,
            lat_min,
            lat_max,
        })
    }

    pub fn contains(&self, location: &OutputLocation) -> bool {
        location.lon >= self.lon_min - EXTENT_TOLERANCE
            && location.lon <= self.lon_max + EXTENT_TOLERANCE
            && location.lat >= self.lat_min - EXTENT_TOLERANCE
            && location.lat <= self.lat_max + EXTENT_TOLERANCE
    }
}

impl fmt::Display for GridExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lon [{}, {}] x lat [{}, {}]",
            self.lon_min, self.lon_max, self.lat_min, self.lat_max
        )
    }
}

/// Target grid the model was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingTemplate {
    pub lons: Vec<f64>,
    pub lats: Vec<f64>,
}

impl TrainingTemplate {
    pub fn new(lons: Vec<f64>, lats: Vec<f64>) -> Self {
        TrainingTemplate { lons, lats }
    }

    /// Template whose extent is exactly `extent`.
    pub fn covering(extent: GridExtent) -> Self {
        TrainingTemplate {
            lons: vec![extent.lon_min, extent.lon_max],
            lats: vec![extent.lat_min, extent.lat_max],
        }
    }

    pub fn extent(&self) -> Result<GridExtent> {
        GridExtent::from_axes(&self.lons, &self.lats)
    }

    /// Check that every location lies within the template extent.
    pub fn check_locations(&self, locations: &[OutputLocation]) -> Result<()> {
        if locations.is_empty() {
            return Err(Error::EmptyInput("no output locations given".into()));
        }
        let extent = self.extent()?;
        match locations.iter().find(|loc| !extent.contains(loc)) {
            Some(outside) => Err(Error::LocationOutsideGrid {
                lon: outside.lon,
                lat: outside.lat,
                extent: extent.to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> TrainingTemplate {
        TrainingTemplate::new(vec![-10.0, -5.0, 0.0, 5.0], vec![35.0, 40.0, 45.0])
    }

    #[test]
    fn test_extent_from_axes() {
        let extent = template().extent().unwrap();
        assert_eq!(extent.lon_min, -10.0);
        assert_eq!(extent.lon_max, 5.0);
        assert_eq!(extent.lat_min, 35.0);
        assert_eq!(extent.lat_max, 45.0);
        assert_eq!(extent.to_string(), "lon [-10, 5] x lat [35, 45]");
    }

    #[test]
    fn test_boundary_locations_are_inside() {
        let locs = [OutputLocation::new(-10.0, 35.0), OutputLocation::named(5.0, 45.0, "ne")];
        assert!(template().check_locations(&locs).is_ok());
    }

    #[test]
    fn test_outside_location_is_domain_error() {
        let locs = [OutputLocation::new(0.0, 40.0), OutputLocation::new(40.1, 2.0)];
        let err = template().check_locations(&locs).unwrap_err();
        match err {
            Error::LocationOutsideGrid { lon, lat, .. } => {
                assert_eq!(lon, 40.1);
                assert_eq!(lat, 2.0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_locations_rejected() {
        assert!(matches!(
            template().check_locations(&[]),
            Err(Error::EmptyInput(_))
        ));
    }

    #[test]
    fn test_covering_round_trips_extent() {
        let extent = template().extent().unwrap();
        assert_eq!(TrainingTemplate::covering(extent).extent().unwrap(), extent);
    }

    #[test]
    fn test_label() {
        assert_eq!(OutputLocation::named(1.0, 2.0, "Madrid").label(), "Madrid");
        assert_eq!(OutputLocation::new(1.0, 2.0).label(), "(1.000, 2.000)");
    }
}
