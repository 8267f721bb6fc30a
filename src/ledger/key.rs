use crate::types::merge_mode::MergeGranularity;
use std::fmt;
use std::fmt::{Display, Formatter};

const NOT_FOUND_SUFFIX: &str = "#not-found";

/// Canonical identifier of one unit of pipeline work.
///
/// Raw keys look like `daily|MERRA2_400.tavg1_2d_rad_Nx.20151101.nc4.nc?ALBEDO[0:23][..]...`,
/// merge keys like `monthly|merged/<request dir>/month/2015-11`. The merge mode
/// prefix keeps confirmations from one granularity from being reused by another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    /// Key of a remote granule, from its file name and query string.
    pub fn raw(merge: MergeGranularity, remote_file_with_query: &str) -> Self {
        Self(format!("{}|{}", merge, remote_file_with_query))
    }

    /// Key of a consolidated file, e.g. `unit = "day"` and `label = "2015-11-01"`.
    pub fn merged(merge: MergeGranularity, request_dir: &str, unit: &str, label: &str) -> Self {
        Self(format!("{}|merged/{}/{}/{}", merge, request_dir, unit, label))
    }

    /// Marker recording that the remote server reported this artifact as absent.
    pub fn not_found(&self) -> Self {
        Self(format!("{}{}", self.0, NOT_FOUND_SUFFIX))
    }

    pub fn is_not_found_marker(&self) -> bool {
        self.0.ends_with(NOT_FOUND_SUFFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ArtifactKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ArtifactKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}
