use crate::dataset::error::DatasetError;
use crate::dataset::time::TimeUnits;
use chrono::NaiveDateTime;
use netcdf::AttributeValue;
use std::path::{Path, PathBuf};

pub const TIME: &str = "time";
pub const LAT: &str = "lat";
pub const LON: &str = "lon";

const SKIPPED_VARIABLE_ATTRIBUTES: [&str; 2] = ["_FillValue", "missing_value"];

pub type Attributes = Vec<(String, AttributeValue)>;

/// A gridded data variable laid out as `(time, lat, lon)`.
#[derive(Debug, Clone)]
pub struct VariableInfo {
    pub name: String,
    pub attributes: Attributes,
    pub fill_value: Option<f32>,
}

/// Coordinates, attributes and variable list of a `(time, lat, lon)` file,
/// without the variable data.
#[derive(Debug, Clone)]
pub struct GridHeader {
    pub path: PathBuf,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub time: Vec<NaiveDateTime>,
    pub attributes: Attributes,
    pub variables: Vec<VariableInfo>,
}

impl GridHeader {
    pub fn open(path: &Path) -> Result<Self, DatasetError> {
        let file = netcdf::open(path).map_err(|e| DatasetError::Open(path.to_path_buf(), e))?;

        let lat = read_coordinate(&file, path, LAT)?;
        let lon = read_coordinate(&file, path, LON)?;
        let time = read_time(&file, path)?;

        let mut attributes = Vec::new();
        for attr in file.attributes() {
            let value = attr.value().map_err(|e| DatasetError::Read {
                path: path.to_path_buf(),
                variable: format!("global attribute {}", attr.name()),
                source: e,
            })?;
            attributes.push((attr.name().to_string(), value));
        }

        let mut variables = Vec::new();
        for var in file.variables() {
            let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
            if dims != [TIME, LAT, LON] {
                continue;
            }
            let name = var.name();
            let mut var_attributes = Vec::new();
            let mut fill_value = None;
            for attr in var.attributes() {
                let value = attr.value().map_err(|e| DatasetError::Read {
                    path: path.to_path_buf(),
                    variable: format!("{}:{}", name, attr.name()),
                    source: e,
                })?;
                if SKIPPED_VARIABLE_ATTRIBUTES.contains(&attr.name()) {
                    fill_value = fill_value.or_else(|| as_f32(&value));
                    continue;
                }
                var_attributes.push((attr.name().to_string(), value));
            }
            variables.push(VariableInfo {
                name,
                attributes: var_attributes,
                fill_value,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            lat,
            lon,
            time,
            attributes,
            variables,
        })
    }

    pub fn variable(&self, name: &str) -> Option<&VariableInfo> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variable(name).is_some()
    }

    pub fn cells(&self) -> usize {
        self.lat.len() * self.lon.len()
    }

    /// Reads a whole variable, fill values replaced by NaN.
    pub fn read_variable(&self, name: &str) -> Result<Vec<f32>, DatasetError> {
        let info = self.require(name)?;
        let file = netcdf::open(&self.path)
            .map_err(|e| DatasetError::Open(self.path.clone(), e))?;
        let var = file
            .variable(name)
            .ok_or_else(|| self.missing(name))?;
        let mut values = var
            .get_values::<f32, _>(..)
            .map_err(|e| self.read_error(name, e))?;

        let expected = self.time.len() * self.cells();
        if values.len() != expected {
            return Err(DatasetError::ShapeMismatch {
                path: self.path.clone(),
                variable: name.to_string(),
                expected,
                found: values.len(),
            });
        }
        mask_fill(&mut values, info.fill_value);
        Ok(values)
    }

    /// Reads the full time series of one grid cell, fill values replaced by NaN.
    pub fn read_cell_series(
        &self,
        name: &str,
        lat_index: usize,
        lon_index: usize,
    ) -> Result<Vec<f32>, DatasetError> {
        let info = self.require(name)?;
        let file = netcdf::open(&self.path)
            .map_err(|e| DatasetError::Open(self.path.clone(), e))?;
        let var = file
            .variable(name)
            .ok_or_else(|| self.missing(name))?;
        let mut values = var
            .get_values::<f32, _>((.., lat_index, lon_index))
            .map_err(|e| self.read_error(name, e))?;
        mask_fill(&mut values, info.fill_value);
        Ok(values)
    }

    /// Fails with [`DatasetError::GridMismatch`] unless `other` has the same lat/lon axes.
    pub fn check_same_grid(&self, other: &GridHeader) -> Result<(), DatasetError> {
        if !same_axis(&self.lat, &other.lat) {
            return Err(DatasetError::GridMismatch {
                path: other.path.clone(),
                reason: format!("latitude axis differs from '{}'", self.path.display()),
            });
        }
        if !same_axis(&self.lon, &other.lon) {
            return Err(DatasetError::GridMismatch {
                path: other.path.clone(),
                reason: format!("longitude axis differs from '{}'", self.path.display()),
            });
        }
        Ok(())
    }

    fn require(&self, name: &str) -> Result<&VariableInfo, DatasetError> {
        self.variable(name).ok_or_else(|| self.missing(name))
    }

    fn missing(&self, name: &str) -> DatasetError {
        DatasetError::MissingVariable {
            path: self.path.clone(),
            variable: name.to_string(),
        }
    }

    fn read_error(&self, name: &str, source: netcdf::Error) -> DatasetError {
        DatasetError::Read {
            path: self.path.clone(),
            variable: name.to_string(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GridVariable {
    pub info: VariableInfo,
    /// Row-major `(time, lat, lon)`, NaN where missing.
    pub values: Vec<f32>,
}

/// A `(time, lat, lon)` file held fully in memory.
#[derive(Debug, Clone)]
pub struct GridDataset {
    pub header: GridHeader,
    pub variables: Vec<GridVariable>,
}

impl GridDataset {
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let header = GridHeader::open(path)?;
        let mut variables = Vec::with_capacity(header.variables.len());
        for info in &header.variables {
            let values = header.read_variable(&info.name)?;
            variables.push(GridVariable {
                info: info.clone(),
                values,
            });
        }
        Ok(Self { header, variables })
    }

    pub fn time(&self) -> &[NaiveDateTime] {
        &self.header.time
    }

    pub fn variable(&self, name: &str) -> Option<&GridVariable> {
        self.variables.iter().find(|v| v.info.name == name)
    }

    /// Adds the variables of `other`, which must share this dataset's grid and time axis.
    /// Variables already present are kept.
    pub fn absorb(&mut self, other: GridDataset) -> Result<(), DatasetError> {
        self.header.check_same_grid(&other.header)?;
        if self.header.time != other.header.time {
            return Err(DatasetError::GridMismatch {
                path: other.header.path.clone(),
                reason: format!(
                    "time axis differs from '{}'",
                    self.header.path.display()
                ),
            });
        }
        for variable in other.variables {
            if self.variable(&variable.info.name).is_none() {
                self.header.variables.push(variable.info.clone());
                self.variables.push(variable);
            }
        }
        Ok(())
    }
}

pub(crate) fn same_axis(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-6)
}

fn mask_fill(values: &mut [f32], fill: Option<f32>) {
    let Some(fill) = fill else { return };
    let tolerance = fill.abs() * 1e-6;
    for v in values.iter_mut() {
        if (*v - fill).abs() <= tolerance {
            *v = f32::NAN;
        }
    }
}

fn as_f32(value: &AttributeValue) -> Option<f32> {
    match value {
        AttributeValue::Float(v) => Some(*v),
        AttributeValue::Double(v) => Some(*v as f32),
        AttributeValue::Floats(v) => v.first().copied(),
        AttributeValue::Doubles(v) => v.first().map(|x| *x as f32),
        AttributeValue::Int(v) => Some(*v as f32),
        AttributeValue::Short(v) => Some(*v as f32),
        _ => None,
    }
}

fn read_coordinate(file: &netcdf::File, path: &Path, name: &str) -> Result<Vec<f64>, DatasetError> {
    let var = file
        .variable(name)
        .ok_or_else(|| DatasetError::MissingVariable {
            path: path.to_path_buf(),
            variable: name.to_string(),
        })?;
    var.get_values::<f64, _>(..).map_err(|e| DatasetError::Read {
        path: path.to_path_buf(),
        variable: name.to_string(),
        source: e,
    })
}

fn read_time(file: &netcdf::File, path: &Path) -> Result<Vec<NaiveDateTime>, DatasetError> {
    let var = file
        .variable(TIME)
        .ok_or_else(|| DatasetError::MissingVariable {
            path: path.to_path_buf(),
            variable: TIME.to_string(),
        })?;
    let units: String = match var.attribute_value("units") {
        Some(Ok(AttributeValue::Str(s))) => s,
        Some(Err(e)) => {
            return Err(DatasetError::Read {
                path: path.to_path_buf(),
                variable: "time:units".to_string(),
                source: e,
            })
        }
        _ => String::new(),
    };
    let parsed = TimeUnits::parse(&units).ok_or_else(|| DatasetError::InvalidTimeUnits {
        path: path.to_path_buf(),
        units: units.clone(),
    })?;
    let offsets = var.get_values::<f64, _>(..).map_err(|e| DatasetError::Read {
        path: path.to_path_buf(),
        variable: TIME.to_string(),
        source: e,
    })?;
    offsets
        .into_iter()
        .map(|offset| {
            parsed
                .decode(offset)
                .ok_or_else(|| DatasetError::TimeOutOfRange {
                    path: path.to_path_buf(),
                    offset,
                })
        })
        .collect()
}
