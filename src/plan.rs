//! A single logical download request expanded into concrete targets, keys and paths.

use crate::ledger::key::ArtifactKey;
use crate::resolver::grid::{GridSpec, GridWindow};
use crate::resolver::remote;
use crate::types::bounding_box::BoundingBox;
use crate::types::collection::Collection;
use crate::types::date_range::{DateRange, Month};
use crate::types::merge_mode::MergeGranularity;
use chrono::{Datelike, NaiveDate};
use std::path::{Path, PathBuf};

pub const DAY_UNIT: &str = "day";
pub const MONTH_UNIT: &str = "month";
pub const YEAR_UNIT: &str = "year";

/// One granule to fetch: a collection on a date over a grid window.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadTarget {
    pub date: NaiveDate,
    pub collection: Collection,
    pub window: GridWindow,
}

impl DownloadTarget {
    pub fn url(&self) -> String {
        remote::remote_url(&self.collection, self.date, &self.window)
    }

    pub fn file_name(&self) -> String {
        remote::remote_file_name(&self.collection, self.date)
    }

    pub fn query(&self) -> String {
        remote::query_params(&self.collection, &self.window)
    }
}

#[derive(Debug, Clone)]
pub struct RequestPlan {
    range: DateRange,
    collections: Vec<Collection>,
    bbox: BoundingBox,
    window: GridWindow,
    merge: MergeGranularity,
    request_name: String,
    request_dir: PathBuf,
}

impl RequestPlan {
    /// `collections` should already be resolved against a catalogue (sorted, unique).
    pub fn new(
        range: DateRange,
        collections: Vec<Collection>,
        bbox: BoundingBox,
        merge: MergeGranularity,
        output_root: &Path,
    ) -> Self {
        let window = GridSpec::merra2().resolve(&bbox);
        let request_name = remote::request_dir_name(&range, &collections, &bbox);
        let request_dir = output_root.join(&request_name);
        Self {
            range,
            collections,
            bbox,
            window,
            merge,
            request_name,
            request_dir,
        }
    }

    pub fn range(&self) -> &DateRange {
        &self.range
    }

    pub fn collections(&self) -> &[Collection] {
        &self.collections
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn window(&self) -> &GridWindow {
        &self.window
    }

    pub fn merge(&self) -> MergeGranularity {
        self.merge
    }

    pub fn request_name(&self) -> &str {
        &self.request_name
    }

    pub fn request_dir(&self) -> &Path {
        &self.request_dir
    }

    /// Collections with hourly data, the ones that get merged.
    pub fn time_varying(&self) -> Vec<&Collection> {
        self.collections.iter().filter(|c| !c.is_invariant()).collect()
    }

    /// Every granule of the request. Invariant collections contribute a single target.
    pub fn targets(&self) -> Vec<DownloadTarget> {
        let mut targets = Vec::new();
        for collection in &self.collections {
            if collection.is_invariant() {
                targets.push(self.target(collection, self.range.start()));
                continue;
            }
            for date in self.range.days() {
                targets.push(self.target(collection, date));
            }
        }
        targets
    }

    pub fn target(&self, collection: &Collection, date: NaiveDate) -> DownloadTarget {
        DownloadTarget {
            date,
            collection: collection.clone(),
            window: self.window,
        }
    }

    pub fn raw_key(&self, target: &DownloadTarget) -> ArtifactKey {
        ArtifactKey::raw(
            self.merge,
            &format!("{}?{}", target.file_name(), target.query()),
        )
    }

    pub fn raw_path(&self, target: &DownloadTarget) -> PathBuf {
        self.request_dir.join(target.file_name())
    }

    pub fn day_key(&self, date: NaiveDate) -> ArtifactKey {
        ArtifactKey::merged(
            self.merge,
            &self.request_name,
            DAY_UNIT,
            &date.format("%Y-%m-%d").to_string(),
        )
    }

    pub fn month_key(&self, month: Month) -> ArtifactKey {
        ArtifactKey::merged(self.merge, &self.request_name, MONTH_UNIT, &month.to_string())
    }

    pub fn year_key(&self, year: i32) -> ArtifactKey {
        ArtifactKey::merged(
            self.merge,
            &self.request_name,
            YEAR_UNIT,
            &format!("{:04}", year),
        )
    }

    /// Merge keys whose confirmation makes the raw granule of `target` redundant.
    pub fn superseding_keys(&self, target: &DownloadTarget) -> Vec<ArtifactKey> {
        if target.collection.is_invariant() {
            return Vec::new();
        }
        let mut keys = Vec::new();
        if self.merge.merges_days() {
            keys.push(self.day_key(target.date));
        }
        if self.merge.merges_months() {
            keys.push(self.month_key(Month::of(target.date)));
        }
        if self.merge.merges_years() {
            keys.push(self.year_key(target.date.year()));
        }
        keys
    }

    fn consolidated_name(&self, label: &str) -> String {
        let collections: Vec<Collection> = self.time_varying().into_iter().cloned().collect();
        format!(
            "{}_merra2_reanalysis_{}.nc",
            remote::joined_short_names(&collections),
            label
        )
    }

    pub fn daily_path(&self, date: NaiveDate) -> PathBuf {
        self.request_dir
            .join(self.consolidated_name(&date.format("%Y-%m-%d").to_string()))
    }

    pub fn monthly_path(&self, month: Month) -> PathBuf {
        self.request_dir
            .join(self.consolidated_name(&month.to_string()))
    }

    pub fn yearly_path(&self, year: i32) -> PathBuf {
        self.request_dir
            .join(self.consolidated_name(&format!("{:04}", year)))
    }
}
