//! Discovers which month folders changed recently.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use cnpj_getter_acquire_models::{AcquireConfig, Month};

use crate::AcquireError;
use crate::listing::{EmptyListing, ListingClient};
use crate::webdav::WebDav;

/// Lists `YYYY-MM` folders under the CNPJ root and filters them by
/// last-modified time.
pub struct MonthFinder {
    listing: ListingClient,
    root_path: String,
    window_days: u32,
}

impl MonthFinder {
    /// Creates a finder over `dav` using the configured root, window and
    /// listing retry policy.
    #[must_use]
    pub fn new(config: &AcquireConfig, dav: Arc<dyn WebDav>) -> Self {
        Self {
            listing: ListingClient::new(dav, config.listing_retry),
            root_path: config.root_path.clone(),
            window_days: config.window_days,
        }
    }

    /// Overrides the recency window.
    #[must_use]
    pub const fn with_window_days(mut self, window_days: u32) -> Self {
        self.window_days = window_days;
        self
    }

    /// Returns the months modified within the last `window_days`,
    /// ascending.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Listing`] if the root folder cannot be
    /// listed.
    pub async fn discover_updated_months(&self) -> Result<Vec<Month>, AcquireError> {
        // A window reaching past the representable range counts every month.
        let cutoff = Duration::try_days(i64::from(self.window_days))
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.updated_since(cutoff).await
    }

    /// Returns the months whose folder was modified at or after `cutoff`,
    /// ascending.
    ///
    /// Children that are not `YYYY-MM` folders, or that carry no
    /// last-modified date, are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Listing`] if the root folder cannot be
    /// listed.
    pub async fn updated_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Month>, AcquireError> {
        log::info!(
            "Checking {} for months updated since {}",
            self.root_path,
            cutoff.format("%Y-%m-%d %H:%M")
        );

        let root = format!("{}/", self.root_path.trim_end_matches('/'));
        let folders = self
            .listing
            .list(&root, EmptyListing::Accept, |entry| {
                Month::parse(&entry.name).is_ok()
            })
            .await?;

        let mut updated: Vec<Month> = folders
            .into_iter()
            .filter_map(|entry| {
                let last_modified = entry.last_modified?;
                if last_modified < cutoff {
                    log::debug!("{}: unchanged since {last_modified}", entry.name);
                    return None;
                }
                Month::parse(&entry.name).ok()
            })
            .collect();

        updated.sort();
        updated.dedup();

        log::info!("{} month(s) updated", updated.len());

        Ok(updated)
    }
}
