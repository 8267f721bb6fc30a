//! Consolidates raw granules into daily files, and daily files into monthly
//! and yearly ones.
//!
//! Every unit (a day, a month, a year) follows the same sequence: gather the
//! inputs, write the combined file under a temporary name, rename it into
//! place, re-open it to check the time axis, record the unit in the ledger and
//! persist the ledger, and only then delete the inputs. A crash at any point
//! leaves either the inputs or a confirmed output behind.

pub mod cleanup;
pub mod daily;
pub mod error;
pub mod progress;
pub mod rollup;

use crate::config::PipelineConfig;
use crate::dataset::error::DatasetError;
use crate::dataset::grid::{Attributes, GridHeader};
use crate::dataset::writer::str_attribute;
use crate::ledger::Ledger;
use crate::merge::error::MergeError;
use crate::plan::RequestPlan;
use crate::types::retry::RetryOutcome;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use log::{error, warn};
use netcdf::AttributeValue;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONVENTIONS: &str = "CF-1.7";
pub const TITLE: &str = "Modern-Era Retrospective analysis for Research and Applications, Version 2";
pub const SOURCE: &str = "Reanalysis";
const ORIGINAL_PREFIX: &str = "original_file_";

#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub retry: RetryOutcome,
    pub merged_days: Vec<NaiveDate>,
    pub merged_months: Vec<String>,
    pub merged_years: Vec<i32>,
    /// Days skipped because the server has no data for at least one collection.
    pub unavailable_days: Vec<NaiveDate>,
}

pub struct MergeEngine<'a> {
    plan: &'a RequestPlan,
    compression_level: i32,
    delete_delay: Duration,
    delete_max_attempts: Option<u32>,
}

impl<'a> MergeEngine<'a> {
    pub fn new(plan: &'a RequestPlan, config: &PipelineConfig) -> Self {
        Self {
            plan,
            compression_level: config.compression_level,
            delete_delay: config.delete_retry_delay(),
            delete_max_attempts: config.delete_max_attempts,
        }
    }

    /// Runs every stage the plan's merge granularity asks for.
    ///
    /// Per-unit failures are logged and turned into a retry request; only
    /// ledger failures abort the run.
    pub fn run(&self, ledger: &mut Ledger) -> Result<MergeReport, MergeError> {
        let mut report = MergeReport::default();
        let merge = self.plan.merge();
        if !merge.merges_days() || self.plan.time_varying().is_empty() {
            return Ok(report);
        }

        self.merge_days(ledger, &mut report)?;
        if merge.merges_months() {
            self.merge_months(ledger, &mut report)?;
        }
        if merge.merges_years() {
            self.merge_years(ledger, &mut report)?;
        }
        Ok(report)
    }

    /// Short names of collections the server reported as absent for `date`.
    pub(crate) fn absent_collections(&self, ledger: &Ledger, date: NaiveDate) -> Vec<String> {
        self.plan
            .time_varying()
            .into_iter()
            .filter(|c| {
                let target = self.plan.target(c, date);
                ledger.is_done(&self.plan.raw_key(&target).not_found())
            })
            .map(|c| c.short_name.clone())
            .collect()
    }

    pub(crate) fn remove_inputs(&self, paths: &[PathBuf]) {
        cleanup::remove_all(paths, self.delete_delay, self.delete_max_attempts);
    }

    /// Writes through a temporary sibling of `output` and renames it into place.
    pub(crate) fn write_atomically<F>(&self, output: &Path, write: F) -> Result<(), MergeError>
    where
        F: FnOnce(&Path) -> Result<(), DatasetError>,
    {
        let dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let temp = tempfile::Builder::new()
            .prefix(".merging-")
            .suffix(".nc")
            .tempfile_in(dir)
            .map_err(|e| MergeError::TempFile(dir.to_path_buf(), e))?
            .into_temp_path();
        write(&temp)?;
        temp.persist(output)
            .map_err(|e| MergeError::Persist(output.to_path_buf(), e))?;
        Ok(())
    }

    /// Re-opens `output` and checks its time length. A bad file is removed.
    pub(crate) fn verify(&self, output: &Path, expected: usize) -> Result<(), MergeError> {
        let found = match GridHeader::open(output) {
            Ok(header) => header.time.len(),
            Err(e) => {
                let _ = std::fs::remove_file(output);
                return Err(e.into());
            }
        };
        if found != expected {
            let _ = std::fs::remove_file(output);
            return Err(MergeError::Verification {
                path: output.to_path_buf(),
                expected,
                found,
            });
        }
        Ok(())
    }

    pub(crate) fn compression_level(&self) -> i32 {
        self.compression_level
    }

    pub(crate) fn plan(&self) -> &RequestPlan {
        self.plan
    }
}

/// Turns a per-unit result into a retry verdict, letting ledger failures through.
pub(crate) fn triage<T>(unit: &str, result: Result<T, MergeError>) -> Result<Option<T>, MergeError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(MergeError::Ledger(e)) => Err(MergeError::Ledger(e)),
        Err(e @ MergeError::PartialCollection { .. }) => {
            warn!("{}, will retry", e);
            Ok(None)
        }
        Err(e) => {
            error!("Merging {} failed: {}", unit, e);
            Ok(None)
        }
    }
}

/// Fails unless `time` is strictly increasing; logs irregular steps as gaps.
pub(crate) fn check_time_axis(path: &Path, time: &[NaiveDateTime]) -> Result<(), DatasetError> {
    let Some(step) = time.windows(2).next().map(|w| w[1] - w[0]) else {
        return Ok(());
    };
    for pair in time.windows(2) {
        let delta = pair[1] - pair[0];
        if delta <= chrono::Duration::zero() {
            return Err(DatasetError::NonMonotonicTime {
                path: path.to_path_buf(),
                at: pair[1],
            });
        }
        if delta != step {
            warn!(
                "Gap in time axis of {}: {} -> {} ({} minutes, expected {})",
                path.display(),
                pair[0],
                pair[1],
                delta.num_minutes(),
                step.num_minutes()
            );
        }
    }
    Ok(())
}

/// Global attributes for a consolidated file: our own identification,
/// the accumulated history, then the first input's attributes. Input
/// attributes that clash with ours are kept as `original_file_<name>`.
pub(crate) fn consolidated_attributes(first_input: &Attributes, history_line: &str) -> Attributes {
    let previous_history = first_input.iter().find_map(|(name, value)| match value {
        AttributeValue::Str(s) if name == "history" => Some(s.clone()),
        _ => None,
    });
    let history = match previous_history {
        Some(previous) if !previous.is_empty() => format!("{}\n{}", previous, history_line),
        _ => history_line.to_string(),
    };

    let mut attributes: Attributes = vec![
        ("Conventions".to_string(), str_attribute(CONVENTIONS)),
        ("title".to_string(), str_attribute(TITLE)),
        ("source".to_string(), str_attribute(SOURCE)),
        ("history".to_string(), AttributeValue::Str(history)),
    ];
    let ours: Vec<String> = attributes.iter().map(|(n, _)| n.clone()).collect();

    for (name, value) in first_input {
        if name == "history" {
            continue;
        }
        if ours.contains(name) {
            let renamed = format!("{}{}", ORIGINAL_PREFIX, name);
            if first_input.iter().any(|(n, _)| *n == renamed) {
                continue;
            }
            attributes.push((renamed, value.clone()));
        } else {
            attributes.push((name.clone(), value.clone()));
        }
    }
    attributes
}

pub(crate) fn history_line(count: usize, what: &str, output: &Path) -> String {
    format!(
        "{}: merged {} {} into {}",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        count,
        what,
        output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    )
}
