use crate::dataset::grid::{LAT, LON};
use crate::fetch::error::FetchError;
use std::path::Path;

/// Re-opens a downloaded granule and checks that its coordinates carry data.
///
/// OPeNDAP can answer with a syntactically valid file whose `lat` and `lon`
/// are all zeros when a request silently failed upstream; such a file is
/// rejected so the target is fetched again.
pub fn verify_granule(path: &Path) -> Result<(), FetchError> {
    let integrity = |reason: String| FetchError::Integrity {
        path: path.to_path_buf(),
        reason,
    };

    let file = netcdf::open(path).map_err(|e| integrity(format!("cannot open: {}", e)))?;

    let mut coordinates = Vec::new();
    for name in [LAT, LON] {
        let var = file
            .variable(name)
            .ok_or_else(|| integrity(format!("missing '{}' coordinate", name)))?;
        let values = var
            .get_values::<f64, _>(..)
            .map_err(|e| integrity(format!("cannot read '{}': {}", name, e)))?;
        coordinates.extend(values);
    }

    if coordinates.iter().any(|v| *v != 0.0 && v.is_finite()) {
        Ok(())
    } else {
        Err(integrity("lat/lon contain no non-zero values".to_string()))
    }
}
