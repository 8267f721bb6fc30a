//! Main entry point: download, merge and extract MERRA-2 data.
//!
//! A download runs in global passes. Each pass loads the request's ledger,
//! fetches every granule that is neither confirmed nor superseded, records
//! each chunk's results, then merges whatever is complete. Passes repeat
//! until one comes back clean, `max_passes` is reached, or the run is
//! cancelled.

use crate::config::PipelineConfig;
use crate::error::Merra2Error;
use crate::extract::corrections::{atmospheric_series, AtmosphericSeries};
use crate::extract::discover;
use crate::extract::engine::Extractor;
use crate::extract::error::ExtractError;
use crate::extract::series::SiteSeries;
use crate::fetch::pool::{FetchJob, FetchPool, TargetOutcome, TargetReport};
use crate::fetch::transport::{Credentials, HttpTransport, Transport};
use crate::ledger::Ledger;
use crate::merge::MergeEngine;
use crate::plan::RequestPlan;
use crate::types::bounding_box::BoundingBox;
use crate::types::collection::Catalogue;
use crate::types::date_range::DateRange;
use crate::types::merge_mode::MergeGranularity;
use crate::types::retry::RetryOutcome;
use crate::types::site::{LatLon, Site};
use crate::utils::{ensure_dir_exists, get_data_dir};
use bon::bon;
use chrono::{NaiveDate, NaiveDateTime};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Summary of a download run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadReport {
    pub request_dir: PathBuf,
    pub passes: u32,
    pub fetched: usize,
    pub not_found: usize,
    /// Target failures summed over all passes; a target retried in a later pass counts each time.
    pub failed: usize,
    pub merged_days: Vec<NaiveDate>,
    pub merged_months: Vec<String>,
    pub merged_years: Vec<i32>,
    pub unavailable_days: Vec<NaiveDate>,
    pub cancelled: bool,
    /// At least one pass had granules refused for bad credentials.
    pub auth_failed: bool,
    /// The last pass finished without anything left to retry.
    pub complete: bool,
}

/// Client for MERRA-2 downloads and extraction.
///
/// # Examples
///
/// ```no_run
/// # use merra2_clearsky::{Merra2, Merra2Error, BoundingBox, Credentials, MergeGranularity};
/// # use chrono::NaiveDate;
/// # async fn run() -> Result<(), Merra2Error> {
/// let client = Merra2::new().await?;
/// let report = client
///     .download()
///     .collections(&["rad", "slv", "aer"])
///     .start(NaiveDate::from_ymd_opt(2015, 11, 1).unwrap())
///     .bbox(BoundingBox::new(-11.0, -22.0, 11.0, 22.0)?)
///     .merge(MergeGranularity::Daily)
///     .credentials(Credentials::new("user", "secret"))
///     .call()
///     .await?;
/// println!("{} files in {}", report.fetched, report.request_dir.display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Merra2 {
    data_dir: PathBuf,
    config: PipelineConfig,
    catalogue: Catalogue,
}

#[bon]
impl Merra2 {
    /// Creates a client storing requests under `data_folder`, created if missing.
    pub async fn with_data_folder(data_folder: PathBuf) -> Result<Self, Merra2Error> {
        ensure_dir_exists(&data_folder)
            .await
            .map_err(|e| Merra2Error::DataDirCreation(data_folder.clone(), e))?;
        Ok(Self {
            data_dir: data_folder,
            config: PipelineConfig::default(),
            catalogue: Catalogue::builtin(),
        })
    }

    /// Creates a client using `<data dir>/merra2_clearsky`.
    pub async fn new() -> Result<Self, Merra2Error> {
        let data_folder = get_data_dir().map_err(Merra2Error::DataDirResolution)?;
        Self::with_data_folder(data_folder).await
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Result<Self, Merra2Error> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn with_catalogue(mut self, catalogue: Catalogue) -> Self {
        self.catalogue = catalogue;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    /// Resolves a request into targets, keys and paths without touching the network.
    ///
    /// `end` defaults to `start`, `bbox` to the whole globe and `merge` to daily.
    #[builder]
    pub fn plan(
        &self,
        collections: &[&str],
        start: NaiveDate,
        end: Option<NaiveDate>,
        bbox: Option<BoundingBox>,
        merge: Option<MergeGranularity>,
    ) -> Result<RequestPlan, Merra2Error> {
        let range = DateRange::new(start, end.unwrap_or(start))?;
        let collections = self.catalogue.resolve(collections)?;
        Ok(RequestPlan::new(
            range,
            collections,
            bbox.unwrap_or_else(BoundingBox::global),
            merge.unwrap_or_default(),
            &self.data_dir,
        ))
    }

    /// Downloads and merges a request over authenticated HTTPS.
    ///
    /// Everything that can be rejected up front (unknown collections, an
    /// inverted date range, empty credentials) fails before any request is sent.
    #[builder]
    pub async fn download(
        &self,
        collections: &[&str],
        start: NaiveDate,
        end: Option<NaiveDate>,
        bbox: Option<BoundingBox>,
        merge: Option<MergeGranularity>,
        credentials: Credentials,
        cancel: Option<CancellationToken>,
    ) -> Result<DownloadReport, Merra2Error> {
        let plan = self
            .plan()
            .collections(collections)
            .start(start)
            .maybe_end(end)
            .maybe_bbox(bbox)
            .maybe_merge(merge)
            .call()?;
        if credentials.is_empty() {
            return Err(Merra2Error::MissingCredentials);
        }
        let transport = HttpTransport::new(credentials, self.config.attempt_timeout())?;
        let cancel = cancel.unwrap_or_default();
        self.run_with_transport(&plan, transport, &cancel).await
    }

    /// Runs the pass loop for `plan` with any [`Transport`].
    pub async fn run_with_transport<T: Transport>(
        &self,
        plan: &RequestPlan,
        transport: T,
        cancel: &CancellationToken,
    ) -> Result<DownloadReport, Merra2Error> {
        let request_dir = plan.request_dir().to_path_buf();
        ensure_dir_exists(&request_dir)
            .await
            .map_err(|e| Merra2Error::DataDirCreation(request_dir.clone(), e))?;

        let pool = FetchPool::new(transport, &self.config);
        let mut report = DownloadReport {
            request_dir: request_dir.clone(),
            ..DownloadReport::default()
        };

        loop {
            if cancel.is_cancelled() {
                warn!("Run for {} cancelled", plan.request_name());
                report.cancelled = true;
                break;
            }
            if self.config.max_passes.is_some_and(|max| report.passes >= max) {
                warn!(
                    "Giving up on {} after {} passes with work left",
                    plan.request_name(),
                    report.passes
                );
                break;
            }
            report.passes += 1;
            info!("Pass {} for {}", report.passes, plan.request_name());

            let dir = request_dir.clone();
            let mut ledger = tokio::task::spawn_blocking(move || Ledger::load_in(&dir)).await??;

            let jobs = pending_jobs(plan, &mut ledger);
            info!("{} of {} granules to fetch", jobs.len(), plan.targets().len());
            for job in &jobs {
                ledger.mark_pending(&job.key);
            }

            let batch = pool
                .fetch_batch(jobs, cancel, |reports| {
                    record_chunk(&mut ledger, reports);
                    let snapshot = ledger.clone();
                    async move {
                        tokio::task::spawn_blocking(move || snapshot.persist()).await??;
                        Ok::<(), Merra2Error>(())
                    }
                })
                .await?;
            report.fetched += batch.count(|o| *o == TargetOutcome::Fetched);
            report.not_found += batch.count(|o| *o == TargetOutcome::NotFound);
            report.failed += batch.count(|o| matches!(o, TargetOutcome::Failed { .. }));

            if batch.retry.is_auth_failure() {
                report.auth_failed = true;
                error!(
                    "Earthdata refused the credentials for {} granules in pass {}",
                    batch.count(|o| *o == TargetOutcome::Unauthorized),
                    report.passes
                );
            }
            if batch.cancelled {
                report.cancelled = true;
                break;
            }

            let merge_plan = plan.clone();
            let config = self.config.clone();
            let merged = tokio::task::spawn_blocking(move || {
                MergeEngine::new(&merge_plan, &config).run(&mut ledger)
            })
            .await??;
            report.merged_days.extend(&merged.merged_days);
            report.merged_months.extend(merged.merged_months.iter().cloned());
            report.merged_years.extend(&merged.merged_years);
            for day in merged.unavailable_days {
                if !report.unavailable_days.contains(&day) {
                    report.unavailable_days.push(day);
                }
            }

            let retry: RetryOutcome = batch.retry | merged.retry;
            if retry.is_clean() {
                report.complete = true;
                info!(
                    "{} complete after {} passes",
                    plan.request_name(),
                    report.passes
                );
                break;
            }
            info!("Pass {} left work to retry", report.passes);
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.config.retry_delay()) => {}
            }
        }

        Ok(report)
    }

    /// Corrected clear-sky inputs for each site, read from the consolidated
    /// and constant files in `directory` (typically a request directory).
    #[builder]
    pub async fn atmosphere(
        &self,
        directory: PathBuf,
        sites: Vec<Site>,
        times: Vec<Option<NaiveDateTime>>,
    ) -> Result<Vec<AtmosphericSeries>, Merra2Error> {
        let tolerance = self.config.time_tolerance();
        let series = tokio::task::spawn_blocking(move || {
            let files = discover(&directory)?;
            let constants = files
                .constants
                .ok_or_else(|| ExtractError::MissingConstantFile(directory.clone()))?;
            let datasets = Extractor::open(&files.datasets, tolerance)?;
            let constants = Extractor::open(&[constants], tolerance)?;
            atmospheric_series(&datasets, &constants, &sites, &times)
        })
        .await??;
        Ok(series)
    }

    /// Interpolated series of arbitrary variables from the consolidated files in `directory`.
    ///
    /// `times` holds one series shared by all sites or one per site.
    #[builder]
    pub async fn extract(
        &self,
        directory: PathBuf,
        sites: Vec<LatLon>,
        variables: Vec<String>,
        times: Vec<Vec<Option<NaiveDateTime>>>,
    ) -> Result<Vec<SiteSeries>, Merra2Error> {
        let tolerance = self.config.time_tolerance();
        let series = tokio::task::spawn_blocking(move || {
            let files = discover(&directory)?;
            let extractor = Extractor::open(&files.datasets, tolerance)?;
            let variables: Vec<&str> = variables.iter().map(String::as_str).collect();
            extractor.extract_sites(&sites, &variables, &times)
        })
        .await??;
        Ok(series)
    }
}

/// Targets still to fetch. Confirmed keys whose file went missing are dropped
/// from the ledger so they are fetched again, unless a confirmed merge
/// output already contains them.
fn pending_jobs(plan: &RequestPlan, ledger: &mut Ledger) -> Vec<FetchJob> {
    let mut jobs = Vec::new();
    for target in plan.targets() {
        let key = plan.raw_key(&target);
        if ledger.is_done(&key.not_found()) {
            continue;
        }
        if plan
            .superseding_keys(&target)
            .iter()
            .any(|k| ledger.is_done(k))
        {
            continue;
        }
        let destination = plan.raw_path(&target);
        if ledger.is_done(&key) {
            if destination.exists() {
                continue;
            }
            warn!("{} is recorded but missing, fetching again", destination.display());
            ledger.unmark(&key);
        }
        jobs.push(FetchJob {
            key,
            url: target.url(),
            destination,
        });
    }
    jobs
}

/// Records one chunk's outcomes in the in-memory ledger.
fn record_chunk(ledger: &mut Ledger, reports: &[TargetReport]) {
    for report in reports {
        match report.outcome {
            TargetOutcome::Fetched => ledger.mark_done(&report.job.key),
            TargetOutcome::NotFound => {
                ledger.unmark(&report.job.key);
                ledger.mark_done(&report.job.key.not_found());
            }
            TargetOutcome::Unauthorized | TargetOutcome::Failed { .. } => {
                ledger.unmark(&report.job.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::grid::GridHeader;
    use crate::fetch::error::FetchError;
    use crate::testing::{date, datetime, FakeResponse, FakeTransport};
    use crate::types::date_range::Month;
    use std::sync::Arc;

    /// Shares one scripted transport between runs so call counts survive.
    struct Shared(Arc<FakeTransport>);

    impl Transport for Shared {
        async fn fetch(&self, url: &str, destination: &Path) -> Result<(), FetchError> {
            self.0.fetch(url, destination).await
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            concurrency: 3,
            chunk_size: 4,
            max_attempts: 2,
            retry_delay_ms: 0,
            delete_retry_delay_ms: 0,
            delete_max_attempts: Some(1),
            max_passes: Some(3),
            ..PipelineConfig::default()
        }
    }

    async fn client(dir: &Path) -> Merra2 {
        client_with(dir, config()).await
    }

    async fn client_with(dir: &Path, config: PipelineConfig) -> Merra2 {
        Merra2::with_data_folder(dir.to_path_buf())
            .await
            .unwrap()
            .with_config(config)
            .unwrap()
    }

    fn scenario(client: &Merra2, collections: &[&str]) -> RequestPlan {
        request(client, collections, date(2015, 11, 1), MergeGranularity::Daily)
    }

    fn request(client: &Merra2, collections: &[&str], end: NaiveDate, merge: MergeGranularity) -> RequestPlan {
        client
            .plan()
            .collections(collections)
            .start(date(2015, 11, 1))
            .end(end)
            .bbox(BoundingBox::new(-11.0, -22.0, 11.0, 22.0).unwrap())
            .merge(merge)
            .call()
            .unwrap()
    }

    fn url_of(plan: &RequestPlan, short_name: &str, day: NaiveDate) -> String {
        plan.targets()
            .into_iter()
            .find(|t| t.collection.short_name == short_name && t.date == day)
            .unwrap()
            .url()
    }

    fn consolidated_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains("_merra2_reanalysis_"))
            .collect()
    }

    #[tokio::test]
    async fn one_day_three_collections_then_idempotent_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path()).await;
        let plan = scenario(&client, &["rad", "slv", "aer"]);
        let fake = Arc::new(FakeTransport::new());
        let cancel = CancellationToken::new();

        let report = client
            .run_with_transport(&plan, Shared(fake.clone()), &cancel)
            .await
            .unwrap();
        assert!(report.complete);
        assert_eq!(report.passes, 1);
        assert_eq!(report.fetched, 3);
        assert_eq!(report.merged_days, vec![date(2015, 11, 1)]);
        assert_eq!(fake.total_calls(), 3);

        let daily = plan.daily_path(date(2015, 11, 1));
        assert!(daily.ends_with("aer-rad-slv_merra2_reanalysis_2015-11-01.nc"));
        let header = GridHeader::open(&daily).unwrap();
        assert_eq!(header.time.len(), 24);
        assert!(header.has_variable("TOTEXTTAU") && header.has_variable("SWGDN") && header.has_variable("PS"));

        let ledger = Ledger::load_in(plan.request_dir()).unwrap();
        assert_eq!(ledger.len(), 4);
        assert!(ledger.is_done(&plan.day_key(date(2015, 11, 1))));
        for target in plan.targets() {
            assert!(ledger.is_done(&plan.raw_key(&target)));
            assert!(!plan.raw_path(&target).exists());
        }

        fake.reset_calls();
        let again = client
            .run_with_transport(&plan, Shared(fake.clone()), &cancel)
            .await
            .unwrap();
        assert!(again.complete);
        assert_eq!(fake.total_calls(), 0);
        assert!(again.merged_days.is_empty());
        assert_eq!(Ledger::load_in(plan.request_dir()).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_in_the_next_pass() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path()).await;
        let plan = scenario(&client, &["rad", "slv"]);
        let rad_url = plan.targets()[0].url();
        let fake = Arc::new(FakeTransport::new());
        fake.respond_sequence(
            &rad_url,
            vec![FakeResponse::Status(503), FakeResponse::Status(503), FakeResponse::Granule],
        );

        let report = client
            .run_with_transport(&plan, Shared(fake.clone()), &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.complete);
        assert_eq!(report.passes, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(fake.calls_for(&rad_url), 3);
        assert_eq!(fake.total_calls(), 4);
        assert!(plan.daily_path(date(2015, 11, 1)).exists());
    }

    #[tokio::test]
    async fn absent_granule_is_remembered() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path()).await;
        let plan = scenario(&client, &["rad", "aer"]);
        let fake = Arc::new(FakeTransport::new());
        fake.respond_matching("tavg1_2d_aer_Nx", FakeResponse::Status(404));

        let report = client
            .run_with_transport(&plan, Shared(fake.clone()), &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.complete);
        assert_eq!(report.not_found, 1);
        assert_eq!(report.unavailable_days, vec![date(2015, 11, 1)]);
        assert!(!plan.daily_path(date(2015, 11, 1)).exists());

        fake.reset_calls();
        client
            .run_with_transport(&plan, Shared(fake.clone()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fake.total_calls(), 0);
    }

    #[tokio::test]
    async fn rejected_credentials_are_retried_in_the_next_pass() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path()).await;
        let plan = scenario(&client, &["rad", "slv"]);
        let rad_url = url_of(&plan, "rad", date(2015, 11, 1));
        let fake = Arc::new(FakeTransport::new());
        fake.respond_sequence(&rad_url, vec![FakeResponse::Status(401), FakeResponse::Granule]);

        let report = client
            .run_with_transport(&plan, Shared(fake.clone()), &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.complete);
        assert!(report.auth_failed);
        assert_eq!(report.passes, 2);
        assert_eq!(report.merged_days, vec![date(2015, 11, 1)]);
        assert_eq!(fake.calls_for(&rad_url), 2);
        assert!(plan.daily_path(date(2015, 11, 1)).exists());
    }

    #[tokio::test]
    async fn rejected_constants_do_not_hold_back_the_day() {
        let dir = tempfile::tempdir().unwrap();
        let single_pass = PipelineConfig {
            max_passes: Some(1),
            ..config()
        };
        let client = client_with(dir.path(), single_pass).await;
        let plan = scenario(&client, &["rad", "slv", "asm"]);
        let asm_url = url_of(&plan, "asm", date(2015, 11, 1));
        let fake = Arc::new(FakeTransport::new());
        fake.respond_sequence(&asm_url, vec![FakeResponse::Status(401), FakeResponse::Granule]);

        let report = client
            .run_with_transport(&plan, Shared(fake.clone()), &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.auth_failed);
        assert!(!report.complete);
        assert_eq!(report.passes, 1);
        assert_eq!(report.merged_days, vec![date(2015, 11, 1)]);
        assert!(plan.daily_path(date(2015, 11, 1)).exists());

        fake.reset_calls();
        let again = client
            .run_with_transport(&plan, Shared(fake.clone()), &CancellationToken::new())
            .await
            .unwrap();
        assert!(again.complete);
        assert!(!again.auth_failed);
        assert_eq!(fake.total_calls(), 1);
        assert_eq!(fake.calls_for(&asm_url), 1);
    }

    #[tokio::test]
    async fn two_days_roll_up_into_one_month_then_idempotent_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path()).await;
        let plan = request(&client, &["rad", "slv"], date(2015, 11, 2), MergeGranularity::Monthly);
        let november = Month(2015, 11);
        let fake = Arc::new(FakeTransport::new());

        let report = client
            .run_with_transport(&plan, Shared(fake.clone()), &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.complete);
        assert_eq!(report.passes, 1);
        assert_eq!(fake.total_calls(), 4);
        assert_eq!(report.merged_days, vec![date(2015, 11, 1), date(2015, 11, 2)]);
        assert_eq!(report.merged_months, vec!["2015-11".to_string()]);

        fake.reset_calls();
        let again = client
            .run_with_transport(&plan, Shared(fake.clone()), &CancellationToken::new())
            .await
            .unwrap();
        assert!(again.complete);
        assert_eq!(fake.total_calls(), 0);
        assert!(again.merged_days.is_empty() && again.merged_months.is_empty());

        let monthly = plan.monthly_path(november);
        assert!(monthly.exists());
        assert_eq!(GridHeader::open(&monthly).unwrap().time.len(), 48);
        assert_eq!(consolidated_files(plan.request_dir()).len(), 1);
        assert!(!plan.daily_path(date(2015, 11, 1)).exists());
        assert!(!plan.daily_path(date(2015, 11, 2)).exists());

        let ledger = Ledger::load_in(plan.request_dir()).unwrap();
        assert_eq!(ledger.len(), 7);
        for target in plan.targets() {
            assert!(ledger.is_done(&plan.raw_key(&target)));
        }
        assert!(ledger.is_done(&plan.day_key(date(2015, 11, 1))));
        assert!(ledger.is_done(&plan.day_key(date(2015, 11, 2))));
        assert!(ledger.is_done(&plan.month_key(november)));
    }

    #[tokio::test]
    async fn month_waits_for_a_day_that_failed_transiently() {
        let dir = tempfile::tempdir().unwrap();
        let single_pass = PipelineConfig {
            max_passes: Some(1),
            ..config()
        };
        let client = client_with(dir.path(), single_pass).await;
        let plan = request(&client, &["rad", "slv"], date(2015, 11, 2), MergeGranularity::Monthly);
        let november = Month(2015, 11);
        let rad_url = url_of(&plan, "rad", date(2015, 11, 2));
        let fake = Arc::new(FakeTransport::new());
        fake.respond_sequence(
            &rad_url,
            vec![FakeResponse::Status(503), FakeResponse::Status(503), FakeResponse::Granule],
        );

        let first = client
            .run_with_transport(&plan, Shared(fake.clone()), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!first.complete);
        assert_eq!(first.failed, 1);
        assert_eq!(first.merged_days, vec![date(2015, 11, 1)]);
        assert!(first.merged_months.is_empty());
        assert!(!plan.monthly_path(november).exists());
        assert!(plan.daily_path(date(2015, 11, 1)).exists());

        let second = client
            .run_with_transport(&plan, Shared(fake.clone()), &CancellationToken::new())
            .await
            .unwrap();
        assert!(second.complete);
        assert_eq!(second.merged_days, vec![date(2015, 11, 2)]);
        assert_eq!(second.merged_months, vec!["2015-11".to_string()]);
        assert_eq!(fake.calls_for(&rad_url), 3);
        assert!(plan.monthly_path(november).exists());
        assert_eq!(consolidated_files(plan.request_dir()).len(), 1);
        assert!(Ledger::load_in(plan.request_dir()).unwrap().is_done(&plan.month_key(november)));
    }

    /// Cancels `cancel` once `remaining` fetches have completed.
    struct CancelAfter {
        inner: Arc<FakeTransport>,
        cancel: CancellationToken,
        remaining: std::sync::atomic::AtomicUsize,
    }

    impl Transport for CancelAfter {
        async fn fetch(&self, url: &str, destination: &Path) -> Result<(), FetchError> {
            let result = self.inner.fetch(url, destination).await;
            if self.remaining.fetch_sub(1, std::sync::atomic::Ordering::SeqCst) == 1 {
                self.cancel.cancel();
            }
            result
        }
    }

    #[tokio::test]
    async fn interrupted_run_keeps_checkpointed_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let small_chunks = PipelineConfig {
            chunk_size: 2,
            ..config()
        };
        let client = client_with(dir.path(), small_chunks).await;
        let plan = request(&client, &["rad", "slv"], date(2015, 11, 3), MergeGranularity::Daily);
        let fake = Arc::new(FakeTransport::new());
        let cancel = CancellationToken::new();
        let transport = CancelAfter {
            inner: fake.clone(),
            cancel: cancel.clone(),
            remaining: std::sync::atomic::AtomicUsize::new(2),
        };

        let report = client.run_with_transport(&plan, transport, &cancel).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.fetched, 2);
        assert_eq!(fake.total_calls(), 2);
        assert!(report.merged_days.is_empty());

        let ledger = Ledger::load_in(plan.request_dir()).unwrap();
        let targets = plan.targets();
        let recorded: Vec<_> = targets.iter().filter(|t| ledger.is_done(&plan.raw_key(t))).collect();
        assert_eq!(recorded.len(), 2);
        assert!(recorded.iter().all(|t| plan.raw_path(t).exists()));

        fake.reset_calls();
        let resumed = client
            .run_with_transport(&plan, Shared(fake.clone()), &CancellationToken::new())
            .await
            .unwrap();
        assert!(resumed.complete);
        assert_eq!(fake.total_calls(), 4);
        assert_eq!(resumed.merged_days.len(), 3);
    }

    #[tokio::test]
    async fn cancelled_run_fetches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path()).await;
        let plan = scenario(&client, &["rad"]);
        let fake = Arc::new(FakeTransport::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = client
            .run_with_transport(&plan, Shared(fake.clone()), &cancel)
            .await
            .unwrap();
        assert!(report.cancelled);
        assert!(!report.complete);
        assert_eq!(fake.total_calls(), 0);
    }

    #[tokio::test]
    async fn bad_requests_fail_before_any_download() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path()).await;

        let unknown = client
            .download()
            .collections(&["rad", "ocean"])
            .start(date(2015, 11, 1))
            .credentials(Credentials::new("user", "secret"))
            .call()
            .await;
        assert!(matches!(unknown, Err(Merra2Error::Resolve(_))));

        let inverted = client
            .download()
            .collections(&["rad"])
            .start(date(2015, 11, 2))
            .end(date(2015, 11, 1))
            .credentials(Credentials::new("user", "secret"))
            .call()
            .await;
        assert!(matches!(inverted, Err(Merra2Error::Resolve(_))));

        let anonymous = client
            .download()
            .collections(&["rad"])
            .start(date(2015, 11, 1))
            .credentials(Credentials::new("", ""))
            .call()
            .await;
        assert!(matches!(anonymous, Err(Merra2Error::MissingCredentials)));
    }

    #[tokio::test]
    async fn downloaded_request_feeds_the_clear_sky_path() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path()).await;
        let plan = scenario(&client, &["rad", "slv", "aer", "asm"]);
        let report = client
            .run_with_transport(&plan, FakeTransport::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.complete);
        assert_eq!(Ledger::load_in(plan.request_dir()).unwrap().len(), 5);

        // The synthetic PHIS is 1 everywhere, so a site at that height needs no correction.
        let site = Site::new(1.0, 2.0, 1.0 / 9.80665);
        let times: Vec<_> = (0..24).map(|h| Some(datetime(2015, 11, 1, h, 30))).collect();
        let series = client
            .atmosphere()
            .directory(plan.request_dir().to_path_buf())
            .sites(vec![site])
            .times(times.clone())
            .call()
            .await
            .unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].states.len(), 24);
        assert!(series[0].states.iter().all(|s| s.is_complete()));
        // TQV is the first slv variable: 1 + hour, in kg m-2.
        assert!((series[0].states[0].water_vapour - 0.1).abs() < 1e-6);
        assert!((series[0].states[5].water_vapour - 0.6).abs() < 1e-6);

        let raw = client
            .extract()
            .directory(plan.request_dir().to_path_buf())
            .sites(vec![LatLon(1.0, 2.0)])
            .variables(vec!["PS".to_string()])
            .times(vec![times])
            .call()
            .await
            .unwrap();
        assert_eq!(raw[0].column("PS").unwrap()[0], 21.0);
    }
}
