use crate::dataset::grid::GridHeader;
use crate::extract::error::ExtractError;
use crate::extract::interp::{covers, lookup, nearest_index, LookupMode};
use crate::extract::locator::GridLocator;
use crate::extract::series::{ExtractedMatrix, SiteSeries};
use crate::types::site::LatLon;
use chrono::{Duration, NaiveDateTime};
use log::{debug, warn};
use std::path::{Path, PathBuf};

/// One consolidated file ready for lookups.
#[derive(Debug, Clone)]
pub struct GridSource {
    header: GridHeader,
    locator: GridLocator,
}

impl GridSource {
    pub fn open(path: &Path) -> Result<Self, ExtractError> {
        let header = GridHeader::open(path)?;
        let locator = GridLocator::new(&header.lat, &header.lon);
        Ok(Self { header, locator })
    }

    pub fn path(&self) -> &Path {
        &self.header.path
    }

    pub fn header(&self) -> &GridHeader {
        &self.header
    }

    pub fn start(&self) -> Option<NaiveDateTime> {
        self.header.time.first().copied()
    }

    pub fn covers(&self, t: NaiveDateTime, tolerance: Duration) -> bool {
        covers(&self.header.time, t, tolerance)
    }
}

/// Per-site values for a set of variables, drawn from files with possibly gapped coverage.
///
/// Sources are ordered by their first timestamp. A requested timestamp is
/// answered by the first source whose span, widened by the tolerance on both
/// sides (upper bound exclusive), contains it. Timestamps no source covers
/// come back as NaN.
#[derive(Debug, Clone)]
pub struct Extractor {
    sources: Vec<GridSource>,
    tolerance: Duration,
}

/// `[variable][time][site]` values for one block of sites.
type Block = Vec<Vec<Vec<f64>>>;

impl Extractor {
    pub fn open(paths: &[PathBuf], tolerance: Duration) -> Result<Self, ExtractError> {
        let sources = paths
            .iter()
            .map(|p| GridSource::open(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_sources(sources, tolerance))
    }

    pub fn from_sources(mut sources: Vec<GridSource>, tolerance: Duration) -> Self {
        sources.sort_by_key(|s| s.start());
        Self { sources, tolerance }
    }

    pub fn sources(&self) -> &[GridSource] {
        &self.sources
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Interpolated series for one site.
    pub fn extract_site(
        &self,
        site: LatLon,
        variables: &[&str],
        times: &[Option<NaiveDateTime>],
    ) -> Result<SiteSeries, ExtractError> {
        let mut series = self.extract_sites(&[site], variables, &[times.to_vec()])?;
        Ok(series.remove(0))
    }

    /// Interpolated series for several sites. `times` holds either one series
    /// shared by every site or one series per site.
    pub fn extract_sites(
        &self,
        sites: &[LatLon],
        variables: &[&str],
        times: &[Vec<Option<NaiveDateTime>>],
    ) -> Result<Vec<SiteSeries>, ExtractError> {
        if sites.is_empty() {
            return Ok(Vec::new());
        }
        if times.len() != 1 && times.len() != sites.len() {
            return Err(ExtractError::SeriesCount {
                expected: sites.len(),
                found: times.len(),
            });
        }
        self.check_variables(variables)?;

        let shared = times.iter().all(|t| *t == times[0]);
        if shared {
            let block = self.extract_block(sites, variables, &times[0], LookupMode::Interpolate)?;
            return Ok(split_block(sites, variables, &times[0], &block, self.distances(sites)));
        }

        let mut result = Vec::with_capacity(sites.len());
        for (i, site) in sites.iter().enumerate() {
            let block = self.extract_block(&[*site], variables, &times[i], LookupMode::Interpolate)?;
            result.extend(split_block(&[*site], variables, &times[i], &block, self.distances(&[*site])));
        }
        Ok(result)
    }

    /// Dense `[time × site]` matrices. Every site must use the same timestamps.
    pub fn extract_matrix(
        &self,
        sites: &[LatLon],
        variables: &[&str],
        times: &[Vec<Option<NaiveDateTime>>],
    ) -> Result<ExtractedMatrix, ExtractError> {
        let Some(first) = times.first() else {
            return Err(ExtractError::SeriesCount {
                expected: sites.len(),
                found: 0,
            });
        };
        if let Some(site) = times.iter().position(|t| t != first) {
            return Err(ExtractError::InconsistentSeries { site });
        }
        self.check_variables(variables)?;
        if sites.is_empty() {
            return Ok(ExtractedMatrix {
                sites: Vec::new(),
                times: first.clone(),
                variables: variables.iter().map(|v| (v.to_string(), Vec::new())).collect(),
            });
        }

        let block = self.extract_block(sites, variables, first, LookupMode::Interpolate)?;
        let variables = variables
            .iter()
            .zip(block)
            .map(|(name, rows)| (name.to_string(), rows.into_iter().flatten().collect()))
            .collect();
        Ok(ExtractedMatrix {
            sites: sites.to_vec(),
            times: first.clone(),
            variables,
        })
    }

    /// Exact-match lookup for invariant fields: one row per site, taken from
    /// the step nearest to `at` (the first step when `at` is `None`).
    pub fn extract_nearest(
        &self,
        sites: &[LatLon],
        variables: &[&str],
        at: Option<NaiveDateTime>,
    ) -> Result<Vec<SiteSeries>, ExtractError> {
        self.check_variables(variables)?;
        if sites.is_empty() {
            return Ok(Vec::new());
        }
        let source = self.sources.first().ok_or_else(|| self.no_data(variables))?;
        let at = at.or_else(|| source.start());
        let time = at
            .and_then(|t| nearest_index(&source.header.time, t))
            .and_then(|i| source.header.time.get(i).copied());

        let block = self.read_source(source, sites, variables, &[(0, time)], LookupMode::Nearest, 1)?;
        Ok(split_block(sites, variables, &[time], &block, self.distances(sites)))
    }

    fn check_variables(&self, variables: &[&str]) -> Result<(), ExtractError> {
        for source in &self.sources {
            if let Some(missing) = variables.iter().find(|v| !source.header.has_variable(v)) {
                return Err(ExtractError::MissingVariable {
                    path: source.header.path.clone(),
                    variable: missing.to_string(),
                });
            }
        }
        Ok(())
    }

    fn no_data(&self, variables: &[&str]) -> ExtractError {
        ExtractError::NoDataExtracted {
            variables: variables.iter().map(|v| v.to_string()).collect(),
        }
    }

    fn distances(&self, sites: &[LatLon]) -> Vec<Option<f64>> {
        let Some(source) = self.sources.first() else {
            return vec![None; sites.len()];
        };
        sites
            .iter()
            .map(|s| source.locator.locate(*s).map(|m| m.distance_km))
            .collect()
    }

    fn extract_block(
        &self,
        sites: &[LatLon],
        variables: &[&str],
        times: &[Option<NaiveDateTime>],
        mode: LookupMode,
    ) -> Result<Block, ExtractError> {
        let mut assigned: Vec<Vec<(usize, Option<NaiveDateTime>)>> = vec![Vec::new(); self.sources.len()];
        for (row, t) in times.iter().enumerate() {
            let Some(t) = t else { continue };
            if let Some(i) = self.sources.iter().position(|s| s.covers(*t, self.tolerance)) {
                assigned[i].push((row, Some(*t)));
            }
        }
        if assigned.iter().all(|a| a.is_empty()) {
            return Err(self.no_data(variables));
        }

        let mut block = vec![vec![vec![f64::NAN; sites.len()]; times.len()]; variables.len()];
        for (source, rows) in self.sources.iter().zip(&assigned) {
            if rows.is_empty() {
                continue;
            }
            debug!("{} answers {} timestamps", source.path().display(), rows.len());
            let partial = self.read_source(source, sites, variables, rows, mode, times.len())?;
            for (v, per_time) in partial.into_iter().enumerate() {
                for (row, _) in rows {
                    block[v][*row].clone_from(&per_time[*row]);
                }
            }
        }
        Ok(block)
    }

    /// Looks up `rows` (row index, timestamp) in one source. Rows not listed stay NaN.
    fn read_source(
        &self,
        source: &GridSource,
        sites: &[LatLon],
        variables: &[&str],
        rows: &[(usize, Option<NaiveDateTime>)],
        mode: LookupMode,
        row_count: usize,
    ) -> Result<Block, ExtractError> {
        let Some(snapped) = source.locator.locate_all(sites) else {
            warn!("{} has an empty grid", source.path().display());
            return Ok(vec![vec![vec![f64::NAN; sites.len()]; row_count]; variables.len()]);
        };

        let mut block = vec![vec![vec![f64::NAN; sites.len()]; row_count]; variables.len()];
        for (v, variable) in variables.iter().enumerate() {
            for (cell_index, found) in snapped.cells.iter().enumerate() {
                let series: Vec<f64> = source
                    .header
                    .read_cell_series(variable, found.cell.lat_index, found.cell.lon_index)?
                    .into_iter()
                    .map(f64::from)
                    .collect();
                for (row, t) in rows {
                    let value = t
                        .or_else(|| source.header.time.first().copied())
                        .map(|t| lookup(mode, &source.header.time, &series, t))
                        .unwrap_or(f64::NAN);
                    for (site, _) in snapped
                        .site_to_cell
                        .iter()
                        .enumerate()
                        .filter(|(_, c)| **c == cell_index)
                    {
                        block[v][*row][site] = value;
                    }
                }
            }
        }
        Ok(block)
    }
}

fn split_block(
    sites: &[LatLon],
    variables: &[&str],
    times: &[Option<NaiveDateTime>],
    block: &Block,
    distances: Vec<Option<f64>>,
) -> Vec<SiteSeries> {
    sites
        .iter()
        .zip(distances)
        .enumerate()
        .map(|(s, (site, distance))| SiteSeries {
            site: *site,
            cell_distance_km: distance,
            times: times.to_vec(),
            columns: variables
                .iter()
                .zip(block)
                .map(|(name, rows)| (name.to_string(), rows.iter().map(|r| r[s]).collect()))
                .collect(),
        })
        .collect()
}
