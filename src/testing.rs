//! Synthetic MERRA-2 files and a scripted transport for tests.

use crate::dataset::error::DatasetError;
use crate::dataset::writer::ConsolidatedWriter;
use crate::fetch::error::FetchError;
use crate::fetch::transport::{part_path, Transport};
use crate::ledger::Ledger;
use crate::plan::RequestPlan;
use crate::resolver::grid::GridSpec;
use crate::types::bounding_box::BoundingBox;
use crate::types::collection::Catalogue;
use crate::types::date_range::DateRange;
use crate::types::merge_mode::MergeGranularity;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

pub(crate) const GRANULE_FILL: f32 = 1.0e15;

pub(crate) fn datetime(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

/// Contents of a raw granule as the OPeNDAP server would return it.
#[derive(Debug, Clone)]
pub(crate) struct GranuleSpec {
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub epoch: NaiveDateTime,
    pub offsets_minutes: Vec<i32>,
    pub variables: Vec<(String, Vec<f32>)>,
}

impl GranuleSpec {
    /// 24 half-past-the-hour steps on `date`; variable `k` holds `base_k + hour` everywhere.
    pub fn hourly(date: NaiveDate, lat: Vec<f64>, lon: Vec<f64>, variables: &[(&str, f32)]) -> Self {
        Self::with_steps(date, 24, lat, lon, variables)
    }

    pub fn with_steps(
        date: NaiveDate,
        steps: usize,
        lat: Vec<f64>,
        lon: Vec<f64>,
        variables: &[(&str, f32)],
    ) -> Self {
        let cells = lat.len() * lon.len();
        let variables = variables
            .iter()
            .map(|(name, base)| {
                let values = (0..steps)
                    .flat_map(|t| std::iter::repeat(base + t as f32).take(cells))
                    .collect();
                (name.to_string(), values)
            })
            .collect();
        Self {
            lat,
            lon,
            epoch: date.and_hms_opt(0, 30, 0).unwrap(),
            offsets_minutes: (0..steps as i32).map(|t| t * 60).collect(),
            variables,
        }
    }

    pub fn hourly_default() -> Self {
        Self::hourly(
            NaiveDate::from_ymd_opt(2015, 11, 1).unwrap(),
            vec![-0.5, 0.0, 0.5],
            vec![-0.625, 0.0, 0.625],
            &[("ALBEDO", 0.1)],
        )
    }

    /// Builds the granule an OPeNDAP URL produced by the resolver would return.
    pub fn from_opendap_url(url: &str) -> Option<Self> {
        let (path, query) = url.split_once('?')?;
        let file_name = path.rsplit('/').next()?;
        let date_part = file_name.split('.').nth(2)?;

        let grid = GridSpec::merra2();
        let mut lat = Vec::new();
        let mut lon = Vec::new();
        let mut names = Vec::new();
        for part in query.split(',') {
            if let Some(range) = part.strip_prefix("lat[") {
                let (a, b) = parse_range(range)?;
                lat = (a..=b).map(|i| grid.latitude_of(i)).collect();
            } else if let Some(range) = part.strip_prefix("lon[") {
                let (a, b) = parse_range(range)?;
                lon = (a..=b).map(|i| grid.longitude_of(i)).collect();
            } else if part != "time" {
                names.push(part.split('[').next()?.to_string());
            }
        }

        let (date, steps) = if date_part == "00000000" {
            (NaiveDate::from_ymd_opt(1980, 1, 1)?, 1)
        } else {
            (NaiveDate::parse_from_str(date_part, "%Y%m%d").ok()?, 24)
        };
        let variables: Vec<(&str, f32)> = names
            .iter()
            .enumerate()
            .map(|(k, name)| (name.as_str(), 1.0 + 10.0 * k as f32))
            .collect();
        Some(Self::with_steps(date, steps, lat, lon, &variables))
    }
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    let inner = range.trim_end_matches(']');
    let (a, b) = inner.split_once(':')?;
    Some((a.parse().ok()?, b.parse().ok()?))
}

pub(crate) fn write_granule(path: &Path, spec: &GranuleSpec) -> Result<(), netcdf::Error> {
    let mut file = netcdf::create(path)?;
    file.add_dimension("time", spec.offsets_minutes.len())?;
    file.add_dimension("lat", spec.lat.len())?;
    file.add_dimension("lon", spec.lon.len())?;
    {
        let mut time = file.add_variable::<i32>("time", &["time"])?;
        let units = format!("minutes since {}", spec.epoch.format("%Y-%m-%d %H:%M:%S"));
        time.put_attribute("units", units.as_str())?;
        time.put_values(&spec.offsets_minutes, ..)?;
    }
    {
        let mut lat = file.add_variable::<f64>("lat", &["lat"])?;
        lat.put_attribute("units", "degrees_north")?;
        lat.put_values(&spec.lat, ..)?;
    }
    {
        let mut lon = file.add_variable::<f64>("lon", &["lon"])?;
        lon.put_attribute("units", "degrees_east")?;
        lon.put_values(&spec.lon, ..)?;
    }
    for (name, values) in &spec.variables {
        let mut var = file.add_variable::<f32>(name, &["time", "lat", "lon"])?;
        var.put_attribute("_FillValue", GRANULE_FILL)?;
        var.put_attribute("long_name", name.as_str())?;
        var.put_values(values, ..)?;
    }
    file.add_attribute("Title", "MERRA2 synthetic granule")?;
    file.add_attribute("Conventions", "CF-1")?;
    Ok(())
}

/// Writes a consolidated file with the given variables (row-major `(time, lat, lon)`).
pub(crate) fn write_consolidated(
    path: &Path,
    lat: &[f64],
    lon: &[f64],
    time: &[NaiveDateTime],
    variables: &[(&str, Vec<f32>)],
) -> Result<(), DatasetError> {
    let declared: Vec<(String, Vec<(String, netcdf::AttributeValue)>)> = variables
        .iter()
        .map(|(name, _)| (name.to_string(), Vec::new()))
        .collect();
    let mut writer = ConsolidatedWriter::create(path, lat, lon, time, &Vec::new(), &declared, 1)?;
    for (name, values) in variables {
        writer.write_slab(name, 0, values)?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub(crate) enum FakeResponse {
    /// A valid granule derived from the URL.
    Granule,
    Status(u16),
    /// A granule whose coordinates are all zero.
    ZeroCoordinates,
    /// Leaves truncated bytes behind, then fails.
    PartialThenFail,
    /// Never completes within any sensible timeout.
    Hang,
}

/// Scripted [`Transport`]: per-URL response sequences (the last one repeats) and call counts.
pub(crate) struct FakeTransport {
    responses: Mutex<HashMap<String, VecDeque<FakeResponse>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn respond(&self, url: &str, response: FakeResponse) {
        self.respond_sequence(url, vec![response]);
    }

    pub fn respond_sequence(&self, url: &str, responses: Vec<FakeResponse>) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), responses.into());
    }

    /// Applies `response` to every URL containing `fragment` that is fetched later.
    pub fn respond_matching(&self, fragment: &str, response: FakeResponse) {
        self.respond(&format!("*{}", fragment), response);
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn next_response(&self, url: &str) -> FakeResponse {
        let mut responses = self.responses.lock().unwrap();
        let key = if responses.contains_key(url) {
            Some(url.to_string())
        } else {
            responses
                .keys()
                .find(|k| k.strip_prefix('*').is_some_and(|frag| url.contains(frag)))
                .cloned()
        };
        match key.and_then(|k| responses.get_mut(&k)) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(FakeResponse::Granule),
            Some(queue) => queue.front().cloned().unwrap_or(FakeResponse::Granule),
            None => FakeResponse::Granule,
        }
    }
}

impl Transport for FakeTransport {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<(), FetchError> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
        let response = self.next_response(url);

        let write = |spec: &GranuleSpec| {
            write_granule(destination, spec).map_err(|e| FetchError::Integrity {
                path: destination.to_path_buf(),
                reason: e.to_string(),
            })
        };

        match response {
            FakeResponse::Granule => {
                let spec = GranuleSpec::from_opendap_url(url).unwrap_or_else(GranuleSpec::hourly_default);
                write(&spec)
            }
            FakeResponse::ZeroCoordinates => {
                let mut spec = GranuleSpec::hourly_default();
                spec.lat.iter_mut().for_each(|v| *v = 0.0);
                spec.lon.iter_mut().for_each(|v| *v = 0.0);
                write(&spec)
            }
            FakeResponse::Status(status) => Err(FetchError::from_status(url, status)),
            FakeResponse::PartialThenFail => {
                std::fs::write(part_path(destination), b"CDF\x01partial")
                    .map_err(|e| FetchError::Io(destination.to_path_buf(), e))?;
                std::fs::write(destination, b"CDF\x01")
                    .map_err(|e| FetchError::Io(destination.to_path_buf(), e))?;
                Err(FetchError::HttpStatus {
                    url: url.to_string(),
                    status: 502,
                })
            }
            FakeResponse::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Ok(())
            }
        }
    }
}

/// Writes the raw granules of `collections` for `date` where the plan expects them
/// and confirms their keys, as a finished fetch stage would.
pub(crate) fn stage_raw_granules(
    plan: &RequestPlan,
    ledger: &mut Ledger,
    date: NaiveDate,
    collections: &[&str],
) {
    std::fs::create_dir_all(plan.request_dir()).unwrap();
    for collection in plan.collections() {
        if !collections.contains(&collection.short_name.as_str()) {
            continue;
        }
        let target = plan.target(collection, date);
        let spec = GranuleSpec::from_opendap_url(&target.url()).unwrap();
        write_granule(&plan.raw_path(&target), &spec).unwrap();
        ledger.mark_done(&plan.raw_key(&target));
    }
}

/// A plan over the scenario region with the builtin catalogue.
pub(crate) fn scenario_plan(
    root: &Path,
    start: NaiveDate,
    end: NaiveDate,
    collections: &[&str],
    merge: MergeGranularity,
) -> RequestPlan {
    RequestPlan::new(
        DateRange::new(start, end).unwrap(),
        Catalogue::builtin().resolve(collections).unwrap(),
        BoundingBox::new(-11.0, -22.0, 11.0, 22.0).unwrap(),
        merge,
        root,
    )
}

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
