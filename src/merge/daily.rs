use crate::dataset::grid::GridDataset;
use crate::dataset::writer::ConsolidatedWriter;
use crate::ledger::Ledger;
use crate::merge::error::MergeError;
use crate::merge::progress::ProgressTracker;
use crate::merge::{check_time_axis, consolidated_attributes, history_line, triage, MergeEngine, MergeReport};
use crate::types::date_range::Month;
use crate::types::retry::RetryOutcome;
use chrono::{Datelike, NaiveDate};
use log::{info, warn};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DayOutcome {
    Merged,
    AlreadyDone,
    Unavailable,
}

impl MergeEngine<'_> {
    /// Merges the raw granules of every requested day into one file per day.
    pub(crate) fn merge_days(&self, ledger: &mut Ledger, report: &mut MergeReport) -> Result<(), MergeError> {
        let days: Vec<NaiveDate> = self.plan().range().days().collect();
        let mut progress = ProgressTracker::new("day", days.len());

        for date in days {
            progress.start_unit();
            let label = date.format("%Y-%m-%d").to_string();
            match triage(&label, self.merge_day(ledger, date))? {
                Some(DayOutcome::Merged) => {
                    progress.finish_unit(&label);
                    report.merged_days.push(date);
                }
                Some(DayOutcome::AlreadyDone) => progress.skip_unit(),
                Some(DayOutcome::Unavailable) => {
                    progress.skip_unit();
                    report.unavailable_days.push(date);
                }
                None => {
                    progress.skip_unit();
                    report.retry |= RetryOutcome::retry();
                }
            }
        }
        Ok(())
    }

    pub(crate) fn merge_day(&self, ledger: &mut Ledger, date: NaiveDate) -> Result<DayOutcome, MergeError> {
        let plan = self.plan();
        let day_key = plan.day_key(date);

        if ledger.is_done(&day_key) || self.day_superseded(ledger, date) {
            // A previous run may have died between the ledger write and the deletes.
            self.remove_inputs(&self.raw_paths(date));
            return Ok(DayOutcome::AlreadyDone);
        }

        let absent = self.absent_collections(ledger, date);
        if !absent.is_empty() {
            info!(
                "No data on the server for {} ({}), skipping the day",
                date,
                absent.join(", ")
            );
            return Ok(DayOutcome::Unavailable);
        }

        let mut inputs = Vec::new();
        let mut missing = Vec::new();
        for collection in plan.time_varying() {
            let target = plan.target(collection, date);
            let key = plan.raw_key(&target);
            let path = plan.raw_path(&target);
            if ledger.is_done(&key) && path.exists() {
                inputs.push((key, path));
            } else {
                ledger.unmark(&key);
                missing.push(collection.short_name.clone());
            }
        }
        if !missing.is_empty() {
            ledger.unmark(&day_key);
            return Err(MergeError::PartialCollection { date, missing });
        }

        let mut merged: Option<GridDataset> = None;
        for (key, path) in &inputs {
            let dataset = match GridDataset::load(path) {
                Ok(dataset) => dataset,
                Err(e) => {
                    warn!("Discarding unreadable granule {}", path.display());
                    ledger.unmark(key);
                    let _ = std::fs::remove_file(path);
                    return Err(e.into());
                }
            };
            match merged.as_mut() {
                Some(merged) => merged.absorb(dataset)?,
                None => merged = Some(dataset),
            }
        }
        let Some(merged) = merged else {
            return Ok(DayOutcome::AlreadyDone);
        };
        check_time_axis(&merged.header.path, merged.time())?;

        let output = plan.daily_path(date);
        let history = history_line(inputs.len(), "raw granules", &output);
        self.write_dataset(&merged, &output, &history)?;
        self.verify(&output, merged.time().len())?;

        ledger.mark_done(&day_key);
        ledger.persist()?;

        let raw: Vec<PathBuf> = inputs.into_iter().map(|(_, path)| path).collect();
        self.remove_inputs(&raw);
        Ok(DayOutcome::Merged)
    }

    fn day_superseded(&self, ledger: &Ledger, date: NaiveDate) -> bool {
        let plan = self.plan();
        let merge = plan.merge();
        (merge.merges_months() && ledger.is_done(&plan.month_key(Month::of(date))))
            || (merge.merges_years() && ledger.is_done(&plan.year_key(date.year())))
    }

    fn raw_paths(&self, date: NaiveDate) -> Vec<PathBuf> {
        let plan = self.plan();
        plan.time_varying()
            .into_iter()
            .map(|c| plan.raw_path(&plan.target(c, date)))
            .collect()
    }

    fn write_dataset(&self, dataset: &GridDataset, output: &Path, history: &str) -> Result<(), MergeError> {
        let header = &dataset.header;
        let attributes = consolidated_attributes(&header.attributes, history);
        let declared: Vec<_> = dataset
            .variables
            .iter()
            .map(|v| (v.info.name.clone(), v.info.attributes.clone()))
            .collect();

        self.write_atomically(output, |temp| {
            let mut writer = ConsolidatedWriter::create(
                temp,
                &header.lat,
                &header.lon,
                &header.time,
                &attributes,
                &declared,
                self.compression_level(),
            )?;
            for variable in &dataset.variables {
                writer.write_slab(&variable.info.name, 0, &variable.values)?;
            }
            Ok(())
        })
    }
}
