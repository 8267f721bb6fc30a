//! Per-site extraction from consolidated files.

pub mod corrections;
pub mod engine;
pub mod error;
pub mod interp;
pub mod locator;
pub mod series;

use crate::extract::error::ExtractError;
use log::debug;
use std::path::{Path, PathBuf};

const CONSTANT_MARKER: &str = "const_2d_asm";
const DATASET_MARKER: &str = "merra2";
const SKIPPED_MARKER: &str = "index";

/// Files of a request directory that take part in extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFiles {
    /// Consolidated files, sorted by name.
    pub datasets: Vec<PathBuf>,
    /// The invariant `const_2d_asm` granule, if present.
    pub constants: Option<PathBuf>,
}

/// Sorts the files of `dir` by name: `const_2d_asm` granules are constants,
/// names containing `merra2` are consolidated datasets, anything with
/// `index` in its name is ignored.
pub fn discover(dir: &Path) -> Result<DataFiles, ExtractError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ExtractError::Discover(dir.to_path_buf(), e))?;
    let mut files = DataFiles::default();
    for entry in entries {
        let entry = entry.map_err(|e| ExtractError::Discover(dir.to_path_buf(), e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.contains(SKIPPED_MARKER) {
            continue;
        }
        if name.contains(CONSTANT_MARKER) {
            if files.constants.is_none() {
                files.constants = Some(entry.path());
            }
        } else if name.contains(DATASET_MARKER) {
            files.datasets.push(entry.path());
        }
    }
    files.datasets.sort();
    debug!(
        "Found {} datasets in {} (constants: {})",
        files.datasets.len(),
        dir.display(),
        files.constants.is_some()
    );
    Ok(files)
}
