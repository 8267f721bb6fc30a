use crate::dataset::error::DatasetError;
use crate::dataset::grid::{Attributes, LAT, LON, TIME};
use crate::dataset::time::TimeUnits;
use chrono::NaiveDateTime;
use netcdf::AttributeValue;
use std::path::{Path, PathBuf};

/// NetCDF default fill value for `f32`.
pub const FILL_F32: f32 = 9.969_21e36;

/// Writes a consolidated `(time, lat, lon)` file.
///
/// All variables are declared up front in [`ConsolidatedWriter::create`];
/// data can then be written in time slabs, so large roll-ups never need to
/// hold more than one input variable in memory.
pub struct ConsolidatedWriter {
    file: netcdf::FileMut,
    path: PathBuf,
    time_len: usize,
    cells: usize,
}

impl ConsolidatedWriter {
    pub fn create(
        path: &Path,
        lat: &[f64],
        lon: &[f64],
        time: &[NaiveDateTime],
        global_attributes: &Attributes,
        variables: &[(String, Attributes)],
        compression_level: i32,
    ) -> Result<Self, DatasetError> {
        let mut file =
            netcdf::create(path).map_err(|e| DatasetError::Create(path.to_path_buf(), e))?;
        let write_err = |item: &str, e: netcdf::Error| DatasetError::Write {
            path: path.to_path_buf(),
            item: item.to_string(),
            source: e,
        };

        file.add_dimension(TIME, time.len())
            .map_err(|e| write_err(TIME, e))?;
        file.add_dimension(LAT, lat.len())
            .map_err(|e| write_err(LAT, e))?;
        file.add_dimension(LON, lon.len())
            .map_err(|e| write_err(LON, e))?;

        let units = TimeUnits::hours_since_1980();
        {
            let offsets: Vec<f64> = time.iter().map(|t| units.encode(*t)).collect();
            let mut time_var = file
                .add_variable::<f64>(TIME, &[TIME])
                .map_err(|e| write_err(TIME, e))?;
            put_attributes(
                &mut time_var,
                &[
                    ("standard_name", str_attribute("time")),
                    ("long_name", str_attribute("time")),
                    ("units", str_attribute(&units.to_string())),
                    ("calendar", str_attribute("gregorian")),
                    ("axis", str_attribute("T")),
                ],
            )
            .map_err(|e| write_err(TIME, e))?;
            time_var
                .put_values(&offsets, ..)
                .map_err(|e| write_err(TIME, e))?;
        }
        {
            let mut lat_var = file
                .add_variable::<f64>(LAT, &[LAT])
                .map_err(|e| write_err(LAT, e))?;
            put_attributes(
                &mut lat_var,
                &[
                    ("standard_name", str_attribute("latitude")),
                    ("long_name", str_attribute("latitude")),
                    ("units", str_attribute("degrees_north")),
                    ("axis", str_attribute("Y")),
                ],
            )
            .map_err(|e| write_err(LAT, e))?;
            lat_var.put_values(lat, ..).map_err(|e| write_err(LAT, e))?;
        }
        {
            let mut lon_var = file
                .add_variable::<f64>(LON, &[LON])
                .map_err(|e| write_err(LON, e))?;
            put_attributes(
                &mut lon_var,
                &[
                    ("standard_name", str_attribute("longitude")),
                    ("long_name", str_attribute("longitude")),
                    ("units", str_attribute("degrees_east")),
                    ("axis", str_attribute("X")),
                ],
            )
            .map_err(|e| write_err(LON, e))?;
            lon_var.put_values(lon, ..).map_err(|e| write_err(LON, e))?;
        }

        for (name, attributes) in variables {
            let mut var = file
                .add_variable::<f32>(name, &[TIME, LAT, LON])
                .map_err(|e| write_err(name, e))?;
            if compression_level > 0 {
                var.set_compression(compression_level, true)
                    .map_err(|e| write_err(name, e))?;
            }
            var.put_attribute("_FillValue", FILL_F32)
                .map_err(|e| write_err(name, e))?;
            for (attr_name, value) in attributes {
                var.put_attribute(attr_name, value.clone())
                    .map_err(|e| write_err(name, e))?;
            }
        }

        for (name, value) in global_attributes {
            file.add_attribute(name, value.clone())
                .map_err(|e| write_err(name, e))?;
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            time_len: time.len(),
            cells: lat.len() * lon.len(),
        })
    }

    /// Writes `values` (row-major, NaN for missing) starting at time index `time_offset`.
    pub fn write_slab(
        &mut self,
        name: &str,
        time_offset: usize,
        values: &[f32],
    ) -> Result<(), DatasetError> {
        if self.cells == 0 || values.len() % self.cells != 0 {
            return Err(DatasetError::ShapeMismatch {
                path: self.path.clone(),
                variable: name.to_string(),
                expected: self.cells,
                found: values.len(),
            });
        }
        let steps = values.len() / self.cells;
        if time_offset + steps > self.time_len {
            return Err(DatasetError::ShapeMismatch {
                path: self.path.clone(),
                variable: name.to_string(),
                expected: self.time_len * self.cells,
                found: (time_offset + steps) * self.cells,
            });
        }

        let filled: Vec<f32> = values
            .iter()
            .map(|v| if v.is_nan() { FILL_F32 } else { *v })
            .collect();
        let mut var = self
            .file
            .variable_mut(name)
            .ok_or_else(|| DatasetError::MissingVariable {
                path: self.path.clone(),
                variable: name.to_string(),
            })?;
        var.put_values(&filled, (time_offset..time_offset + steps, .., ..))
            .map_err(|e| DatasetError::Write {
                path: self.path.clone(),
                item: name.to_string(),
                source: e,
            })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn put_attributes(
    var: &mut netcdf::VariableMut<'_>,
    attributes: &[(&str, AttributeValue)],
) -> Result<(), netcdf::Error> {
    for (name, value) in attributes {
        var.put_attribute(name, value.clone())?;
    }
    Ok(())
}

pub(crate) fn str_attribute(value: &str) -> AttributeValue {
    AttributeValue::Str(value.to_string())
}
