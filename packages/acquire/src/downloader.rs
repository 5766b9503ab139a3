//! Convergent month download.
//!
//! A month is complete when every relevant archive in its remote folder
//! exists locally with nonzero size. [`Downloader::download_month`]
//! repeats list, diff, fetch and re-check rounds until that holds or the
//! round budget runs out. Completeness is always recomputed from the
//! remote listing and the filesystem; nothing is cached between calls.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cnpj_getter_acquire_models::{AcquireConfig, AcquisitionResult, ExpectedFile, Month};
use futures::StreamExt as _;

use crate::AcquireError;
use crate::listing::{EmptyListing, ListingClient};
use crate::progress::{ProgressCallback, null_progress};
use crate::relevance::is_expected_archive;
use crate::transfer::TransferWorker;
use crate::webdav::WebDav;

/// Downloads every relevant archive of a month into
/// `<raw_dir>/<YYYY-MM>/`.
pub struct Downloader {
    listing: ListingClient,
    transfer: TransferWorker,
    root_path: String,
    raw_dir: PathBuf,
    workers: usize,
    max_rounds: u32,
    round_delay: Duration,
    progress: Arc<dyn ProgressCallback>,
}

impl Downloader {
    /// Creates a downloader over `dav` using the configured root, raw
    /// directory, worker limit, round budget and retry policies.
    #[must_use]
    pub fn new(config: &AcquireConfig, dav: Arc<dyn WebDav>) -> Self {
        Self {
            listing: ListingClient::new(dav.clone(), config.listing_retry),
            transfer: TransferWorker::new(dav, config.transfer_retry),
            root_path: config.root_path.clone(),
            raw_dir: config.raw_dir.clone(),
            workers: config.workers.max(1),
            max_rounds: config.max_rounds.max(1),
            round_delay: config.round_delay,
            progress: null_progress(),
        }
    }

    /// Reports round progress to `progress` instead of discarding it.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Brings `month` to completeness.
    ///
    /// Archives already present are recorded as skipped and never
    /// transferred again. Failed transfers are not retried here; the
    /// next round's diff picks them up.
    ///
    /// # Errors
    ///
    /// * [`AcquireError::Listing`] if the month folder cannot be listed
    ///   in any round, which aborts the month immediately
    /// * [`AcquireError::IncompleteMonth`] if archives are still missing
    ///   after the last round
    /// * [`AcquireError::Io`] if the month directory cannot be created
    pub async fn download_month(&self, month: &Month) -> Result<AcquisitionResult, AcquireError> {
        let local_dir = self.local_dir(month);
        tokio::fs::create_dir_all(&local_dir)
            .await
            .map_err(|source| AcquireError::Io {
                path: local_dir.display().to_string(),
                source,
            })?;

        let mut result = AcquisitionResult::default();
        let mut missing_count = 0;

        for round in 1..=self.max_rounds {
            log::info!("{month}: round {round}/{}", self.max_rounds);

            let expected = self.expected_files(month).await?;

            let mut missing = Vec::new();
            for file in &expected {
                if is_present(&file.local_path).await {
                    if !result.downloaded.contains(&file.local_path)
                        && !result.skipped.contains(&file.local_path)
                    {
                        log::debug!("{}: already present", file.name);
                        result.skipped.push(file.local_path.clone());
                    }
                } else {
                    missing.push(file);
                }
            }

            log::info!(
                "{month}: {} expected, {} missing",
                expected.len(),
                missing.len()
            );

            if !missing.is_empty() {
                self.fetch_all(month, round, &missing, &mut result).await;
            }

            missing_count = count_missing(&expected).await;
            if missing_count == 0 {
                log::info!(
                    "{month}: complete ({} downloaded, {} skipped)",
                    result.downloaded.len(),
                    result.skipped.len()
                );
                self.progress.finish(format!(
                    "{month}: {} downloaded, {} skipped",
                    result.downloaded.len(),
                    result.skipped.len()
                ));
                return Ok(result);
            }

            if round < self.max_rounds {
                log::warn!(
                    "{month}: {missing_count} file(s) still missing after round {round}, \
                     next round in {:?}",
                    self.round_delay
                );
                tokio::time::sleep(self.round_delay).await;
            }
        }

        log::error!(
            "{month}: {missing_count} file(s) missing after {} round(s)",
            self.max_rounds
        );
        self.progress
            .finish(format!("{month}: incomplete, {missing_count} missing"));

        Err(AcquireError::IncompleteMonth {
            month: month.clone(),
            missing_count,
            rounds: self.max_rounds,
        })
    }

    /// Lists the relevant archives of `month`, sorted by name.
    ///
    /// An empty relevant listing is retried like a transient glitch and
    /// eventually fails, even for a folder that is legitimately empty.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Listing`] once the listing retry budget is
    /// spent.
    pub async fn expected_files(&self, month: &Month) -> Result<Vec<ExpectedFile>, AcquireError> {
        let remote_dir = format!("{}/{month}", self.root_path.trim_end_matches('/'));
        let local_dir = self.local_dir(month);

        let mut entries = self
            .listing
            .list(&format!("{remote_dir}/"), EmptyListing::Retry, |entry| {
                is_expected_archive(&entry.name)
            })
            .await?;

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries.dedup_by(|a, b| a.name == b.name);

        Ok(entries
            .into_iter()
            .map(|entry| ExpectedFile {
                remote_path: format!("{remote_dir}/{}", entry.name),
                local_path: local_dir.join(&entry.name),
                name: entry.name,
            })
            .collect())
    }

    fn local_dir(&self, month: &Month) -> PathBuf {
        cnpj_getter_acquire_models::month_dir(&self.raw_dir, month)
    }

    /// Transfers `missing` with at most `workers` in flight and waits
    /// for all of them. Outcomes are folded into `result` as each one
    /// completes.
    async fn fetch_all(
        &self,
        month: &Month,
        round: u32,
        missing: &[&ExpectedFile],
        result: &mut AcquisitionResult,
    ) {
        self.progress.set_message(format!("{month} round {round}"));
        self.progress
            .set_total(u64::try_from(missing.len()).unwrap_or(u64::MAX));

        let worker = &self.transfer;
        let mut transfers = futures::stream::iter(missing.iter().map(|file| async move {
            let outcome = worker.fetch(&file.remote_path, &file.local_path).await;
            (*file, outcome)
        }))
        .buffer_unordered(self.workers);

        while let Some((file, outcome)) = transfers.next().await {
            match outcome {
                Ok(bytes) => {
                    log::info!("{month}: downloaded {} ({bytes} bytes)", file.name);
                    result.downloaded.push(file.local_path.clone());
                }
                Err(e) => log::warn!("{month}: {} failed this round: {e}", file.name),
            }
            self.progress.inc(1);
        }
    }
}

/// A file counts as present when it exists with nonzero size.
async fn is_present(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}

async fn count_missing(expected: &[ExpectedFile]) -> usize {
    let mut missing = 0;
    for file in expected {
        if !is_present(&file.local_path).await {
            missing += 1;
        }
    }
    missing
}
