use crate::config::PipelineConfig;
use crate::fetch::error::{FailureKind, FetchError};
use crate::fetch::integrity::verify_granule;
use crate::fetch::transport::{part_path, Transport};
use crate::ledger::key::ArtifactKey;
use crate::types::retry::RetryOutcome;
use futures_util::{stream, StreamExt};
use log::{error, info, warn};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One granule to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub key: ArtifactKey,
    pub url: String,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    /// Downloaded and verified.
    Fetched,
    NotFound,
    Unauthorized,
    Failed { attempts: u32, reason: String },
}

#[derive(Debug, Clone)]
pub struct TargetReport {
    pub job: FetchJob,
    pub outcome: TargetOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub reports: Vec<TargetReport>,
    pub retry: RetryOutcome,
    /// Set when the batch stopped early because of cancellation.
    pub cancelled: bool,
}

impl BatchReport {
    pub fn count(&self, outcome: fn(&TargetOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| outcome(&r.outcome)).count()
    }
}

/// Bounded-concurrency downloader working through explicit chunks.
///
/// Each chunk runs up to `concurrency` downloads at once and must finish
/// (or hit the chunk timeout) before the next chunk starts.
pub struct FetchPool<T: Transport> {
    transport: T,
    concurrency: usize,
    chunk_size: usize,
    max_attempts: u32,
    attempt_timeout: Duration,
    chunk_timeout: Duration,
    retry_delay: Duration,
}

impl<T: Transport> FetchPool<T> {
    pub fn new(transport: T, config: &PipelineConfig) -> Self {
        Self {
            transport,
            concurrency: config.concurrency.max(1),
            chunk_size: config.chunk_size.max(1),
            max_attempts: config.max_attempts.max(1),
            attempt_timeout: config.attempt_timeout(),
            chunk_timeout: config.chunk_timeout(),
            retry_delay: config.retry_delay(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Downloads every job, chunk by chunk.
    ///
    /// `checkpoint` runs after each chunk with that chunk's reports, and its
    /// future is awaited before the next chunk starts, so the caller can
    /// record progress. An error from it aborts the batch. Cancellation is
    /// honoured between chunks.
    pub async fn fetch_batch<E, F, Fut>(
        &self,
        jobs: Vec<FetchJob>,
        cancel: &CancellationToken,
        mut checkpoint: F,
    ) -> Result<BatchReport, E>
    where
        F: FnMut(&[TargetReport]) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let mut batch = BatchReport::default();
        let total_chunks = jobs.len().div_ceil(self.chunk_size);

        for (index, chunk) in jobs.chunks(self.chunk_size).enumerate() {
            if cancel.is_cancelled() {
                warn!("Download cancelled before chunk {}/{}", index + 1, total_chunks);
                batch.cancelled = true;
                batch.retry |= RetryOutcome::retry();
                break;
            }
            info!(
                "Downloading chunk {}/{} ({} files)",
                index + 1,
                total_chunks,
                chunk.len()
            );

            let reports = self.fetch_chunk(chunk.to_vec()).await;
            for report in &reports {
                batch.retry |= match &report.outcome {
                    TargetOutcome::Fetched | TargetOutcome::NotFound => RetryOutcome::clean(),
                    TargetOutcome::Unauthorized => RetryOutcome::auth_failed(),
                    TargetOutcome::Failed { .. } => RetryOutcome::retry(),
                };
            }
            checkpoint(&reports).await?;
            batch.reports.extend(reports);
        }

        Ok(batch)
    }

    async fn fetch_chunk(&self, chunk: Vec<FetchJob>) -> Vec<TargetReport> {
        let deadline = tokio::time::Instant::now() + self.chunk_timeout;
        let mut outcomes: Vec<Option<TargetOutcome>> = chunk.iter().map(|_| None).collect();

        {
            let mut in_flight = stream::iter(chunk.iter().enumerate())
                .map(|(index, job)| async move { (index, self.fetch_one(job).await) })
                .buffer_unordered(self.concurrency);

            loop {
                match tokio::time::timeout_at(deadline, in_flight.next()).await {
                    Ok(Some((index, outcome))) => outcomes[index] = Some(outcome),
                    Ok(None) => break,
                    Err(_) => {
                        error!(
                            "Chunk timed out after {:?}, abandoning unfinished downloads",
                            self.chunk_timeout
                        );
                        break;
                    }
                }
            }
        }

        let mut reports = Vec::with_capacity(chunk.len());
        for (job, outcome) in chunk.into_iter().zip(outcomes) {
            let outcome = match outcome {
                Some(outcome) => outcome,
                None => {
                    remove_partial(&job.destination).await;
                    TargetOutcome::Failed {
                        attempts: 0,
                        reason: "chunk timed out".to_string(),
                    }
                }
            };
            reports.push(TargetReport { job, outcome });
        }
        reports
    }

    async fn fetch_one(&self, job: &FetchJob) -> TargetOutcome {
        let mut reason = String::new();

        for attempt in 1..=self.max_attempts {
            let result = tokio::time::timeout(
                self.attempt_timeout,
                self.transport.fetch(&job.url, &job.destination),
            )
            .await;

            let failure = match result {
                Err(_) => FetchError::Timeout {
                    url: job.url.clone(),
                    after: self.attempt_timeout,
                },
                Ok(Err(e)) => e,
                Ok(Ok(())) => match verify(&job.destination).await {
                    Ok(()) => return TargetOutcome::Fetched,
                    Err(e) => e,
                },
            };

            remove_partial(&job.destination).await;
            match failure.kind() {
                FailureKind::NotFound => {
                    warn!("{} does not exist on the server", job.url);
                    return TargetOutcome::NotFound;
                }
                FailureKind::Unauthorized => {
                    error!("{}", failure);
                    return TargetOutcome::Unauthorized;
                }
                FailureKind::Transient => {
                    warn!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt, self.max_attempts, job.url, failure
                    );
                    reason = failure.to_string();
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay * attempt).await;
            }
        }

        error!("Giving up on {} for this pass", job.url);
        TargetOutcome::Failed {
            attempts: self.max_attempts,
            reason,
        }
    }
}

async fn verify(path: &Path) -> Result<(), FetchError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || verify_granule(&path)).await?
}

/// Removes a destination file and its `.part` sibling, ignoring files that do not exist.
pub(crate) async fn remove_partial(destination: &Path) {
    for path in [destination.to_path_buf(), part_path(destination)] {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove partial download {}: {}", path.display(), e),
        }
    }
}
