//! Concatenation of consolidated files along time: days into months, months into years.

use crate::dataset::error::DatasetError;
use crate::dataset::grid::GridHeader;
use crate::dataset::writer::ConsolidatedWriter;
use crate::ledger::key::ArtifactKey;
use crate::ledger::Ledger;
use crate::merge::error::MergeError;
use crate::merge::progress::ProgressTracker;
use crate::merge::{check_time_axis, consolidated_attributes, history_line, triage, MergeEngine, MergeReport};
use crate::types::date_range::Month;
use crate::types::retry::RetryOutcome;
use chrono::NaiveDate;
use log::{info, warn};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RollupOutcome {
    Merged,
    AlreadyDone,
    /// Some inputs are not ready yet.
    Postponed,
    /// Every input is unavailable on the server.
    Empty,
}

impl MergeEngine<'_> {
    pub(crate) fn merge_months(&self, ledger: &mut Ledger, report: &mut MergeReport) -> Result<(), MergeError> {
        let months = self.plan().range().months();
        let mut progress = ProgressTracker::new("month", months.len());
        for month in months {
            progress.start_unit();
            let label = month.to_string();
            let outcome = triage(&label, self.merge_month(ledger, month))?;
            if outcome == Some(RollupOutcome::Merged) {
                progress.finish_unit(&label);
                report.merged_months.push(label);
                continue;
            }
            progress.skip_unit();
            if matches!(outcome, None | Some(RollupOutcome::Postponed)) {
                report.retry |= RetryOutcome::retry();
            }
        }
        Ok(())
    }

    pub(crate) fn merge_years(&self, ledger: &mut Ledger, report: &mut MergeReport) -> Result<(), MergeError> {
        let years = self.plan().range().years();
        let mut progress = ProgressTracker::new("year", years.len());
        for year in years {
            progress.start_unit();
            let label = format!("{:04}", year);
            let outcome = triage(&label, self.merge_year(ledger, year))?;
            if outcome == Some(RollupOutcome::Merged) {
                progress.finish_unit(&label);
                report.merged_years.push(year);
                continue;
            }
            progress.skip_unit();
            if matches!(outcome, None | Some(RollupOutcome::Postponed)) {
                report.retry |= RetryOutcome::retry();
            }
        }
        Ok(())
    }

    pub(crate) fn merge_month(&self, ledger: &mut Ledger, month: Month) -> Result<RollupOutcome, MergeError> {
        let plan = self.plan();
        let key = plan.month_key(month);
        let days = plan.range().days_in_month(month);
        let daily_paths: Vec<PathBuf> = days.iter().map(|d| plan.daily_path(*d)).collect();

        let superseded = plan.merge().merges_years() && ledger.is_done(&plan.year_key(month.year()));
        if ledger.is_done(&key) || superseded {
            self.remove_inputs(&daily_paths);
            return Ok(RollupOutcome::AlreadyDone);
        }

        let mut inputs = Vec::new();
        let mut postponed = false;
        for day in days {
            if !self.absent_collections(ledger, day).is_empty() {
                continue;
            }
            let day_key = plan.day_key(day);
            let path = plan.daily_path(day);
            if ledger.is_done(&day_key) && path.exists() {
                inputs.push(path);
                continue;
            }
            if ledger.is_done(&day_key) {
                warn!("Daily file for {} vanished, it will be rebuilt", day);
                self.forget_day(ledger, day);
            }
            postponed = true;
        }
        if postponed {
            info!("Postponing {} until all its days are merged", month);
            return Ok(RollupOutcome::Postponed);
        }
        if inputs.is_empty() {
            return Ok(RollupOutcome::Empty);
        }

        let output = plan.monthly_path(month);
        self.concatenate(&inputs, &output, "daily files")?;
        self.confirm(ledger, &key, &inputs)?;
        Ok(RollupOutcome::Merged)
    }

    pub(crate) fn merge_year(&self, ledger: &mut Ledger, year: i32) -> Result<RollupOutcome, MergeError> {
        let plan = self.plan();
        let key = plan.year_key(year);
        let months = plan.range().months_in_year(year);
        let monthly_paths: Vec<PathBuf> = months.iter().map(|m| plan.monthly_path(*m)).collect();

        if ledger.is_done(&key) {
            self.remove_inputs(&monthly_paths);
            return Ok(RollupOutcome::AlreadyDone);
        }

        let mut inputs = Vec::new();
        let mut postponed = false;
        for month in months {
            let days = plan.range().days_in_month(month);
            if days.iter().all(|d| !self.absent_collections(ledger, *d).is_empty()) {
                continue;
            }
            let month_key = plan.month_key(month);
            let path = plan.monthly_path(month);
            if ledger.is_done(&month_key) && path.exists() {
                inputs.push(path);
                continue;
            }
            if ledger.is_done(&month_key) {
                warn!("Monthly file for {} vanished, it will be rebuilt", month);
                ledger.unmark(&month_key);
                for day in days {
                    self.forget_day(ledger, day);
                }
            }
            postponed = true;
        }
        if postponed {
            info!("Postponing {} until all its months are merged", year);
            return Ok(RollupOutcome::Postponed);
        }
        if inputs.is_empty() {
            return Ok(RollupOutcome::Empty);
        }

        let output = plan.yearly_path(year);
        self.concatenate(&inputs, &output, "monthly files")?;
        self.confirm(ledger, &key, &inputs)?;
        Ok(RollupOutcome::Merged)
    }

    /// Drops the day key and its raw keys so the next pass fetches and merges the day again.
    fn forget_day(&self, ledger: &mut Ledger, day: NaiveDate) {
        let plan = self.plan();
        ledger.unmark(&plan.day_key(day));
        for collection in plan.time_varying() {
            ledger.unmark(&plan.raw_key(&plan.target(collection, day)));
        }
    }

    fn confirm(&self, ledger: &mut Ledger, key: &ArtifactKey, inputs: &[PathBuf]) -> Result<(), MergeError> {
        ledger.mark_done(key);
        ledger.persist()?;
        self.remove_inputs(inputs);
        Ok(())
    }

    /// Writes `inputs` (in order) back to back along time into `output`,
    /// reading one input variable at a time.
    pub(crate) fn concatenate(&self, inputs: &[PathBuf], output: &Path, what: &str) -> Result<(), MergeError> {
        let headers = inputs
            .iter()
            .map(|p| GridHeader::open(p))
            .collect::<Result<Vec<_>, _>>()?;
        let Some(first) = headers.first() else {
            return Ok(());
        };
        for header in &headers[1..] {
            first.check_same_grid(header)?;
        }

        let time: Vec<_> = headers.iter().flat_map(|h| h.time.iter().copied()).collect();
        check_time_axis(output, &time)?;

        let declared: Vec<_> = first
            .variables
            .iter()
            .map(|v| (v.name.clone(), v.attributes.clone()))
            .collect();
        let attributes = consolidated_attributes(&first.attributes, &history_line(inputs.len(), what, output));

        self.write_atomically(output, |temp| {
            let mut writer = ConsolidatedWriter::create(
                temp,
                &first.lat,
                &first.lon,
                &time,
                &attributes,
                &declared,
                self.compression_level(),
            )?;
            for (name, _) in &declared {
                let mut offset = 0;
                for header in &headers {
                    let values = read_or_blank(header, name)?;
                    writer.write_slab(name, offset, &values)?;
                    offset += header.time.len();
                }
            }
            Ok(())
        })?;
        self.verify(output, time.len())
    }
}

fn read_or_blank(header: &GridHeader, name: &str) -> Result<Vec<f32>, DatasetError> {
    if header.has_variable(name) {
        return header.read_variable(name);
    }
    warn!("{} has no {}, filling with missing values", header.path.display(), name);
    Ok(vec![f32::NAN; header.time.len() * header.cells()])
}
