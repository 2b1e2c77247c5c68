//! JSON file formats read and written by the CLI.
//!
//! Arrays are stored flattened in row-major order next to their shape.

use ds_common::{Error, Result};
use ndarray::{Array2, Array4};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::grid::OutputLocation;
use crate::relevance::{RelevanceMap, RelevanceMapDocument};
use crate::tensor::{check_declared_shape, ChannelTensor, GridMetadata};

/// Gridded dataset `(sample, row, col, channel)`. Coordinate axes are
/// optional; missing ones are filled with indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetFile {
    pub shape: [usize; 4],
    pub data: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lats: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lons: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times: Option<Vec<String>>,
}

impl DatasetFile {
    pub fn into_tensor(self) -> Result<ChannelTensor> {
        check_declared_shape("dataset data", &self.shape, self.data.len())?;
        let [s, r, c, ch] = self.shape;
        let data = Array4::from_shape_vec((s, r, c, ch), self.data).map_err(|e| {
            Error::ShapeMismatch {
                what: "dataset data".into(),
                expected: format!("{:?}", self.shape),
                actual: e.to_string(),
            }
        })?;
        let indexed = GridMetadata::indexed(s, r, c, ch);
        let meta = GridMetadata {
            lats: self.lats.unwrap_or(indexed.lats),
            lons: self.lons.unwrap_or(indexed.lons),
            channels: self.channels.unwrap_or(indexed.channels),
            times: self.times.unwrap_or(indexed.times),
        };
        ChannelTensor::new(data, meta)
    }

    pub fn from_tensor(tensor: &ChannelTensor) -> Self {
        let (s, r, c, ch) = tensor.view().dim();
        let meta = tensor.metadata().clone();
        DatasetFile {
            shape: [s, r, c, ch],
            data: tensor.view().iter().copied().collect(),
            lats: Some(meta.lats),
            lons: Some(meta.lons),
            channels: Some(meta.channels),
            times: Some(meta.times),
        }
    }
}

pub fn parse_dataset(content: &str) -> Result<ChannelTensor> {
    let file: DatasetFile = serde_json::from_str(content)?;
    file.into_tensor()
}

pub fn read_dataset(path: &Path) -> Result<ChannelTensor> {
    parse_dataset(&std::fs::read_to_string(path)?)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationsFile {
    pub locations: Vec<OutputLocation>,
}

pub fn read_locations(path: &Path) -> Result<Vec<OutputLocation>> {
    let file: LocationsFile = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    Ok(file.locations)
}

/// Observed targets `(sample, location)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedFile {
    pub shape: [usize; 2],
    pub data: Vec<f64>,
}

impl ObservedFile {
    pub fn into_array(self) -> Result<Array2<f64>> {
        check_declared_shape("observed data", &self.shape, self.data.len())?;
        let [s, l] = self.shape;
        Array2::from_shape_vec((s, l), self.data).map_err(|e| Error::ShapeMismatch {
            what: "observed data".into(),
            expected: format!("{:?}", self.shape),
            actual: e.to_string(),
        })
    }
}

pub fn read_observed(path: &Path) -> Result<Array2<f64>> {
    let file: ObservedFile = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    file.into_array()
}

pub fn write_map(path: &Path, map: &RelevanceMap) -> Result<()> {
    write_json(path, &map.to_document())
}

pub fn read_map(path: &Path) -> Result<RelevanceMap> {
    let doc: RelevanceMapDocument = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    RelevanceMap::from_document(doc)
}

/// Write pretty JSON, replacing the file atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
