//! Retrying directory listings.
//!
//! Wraps [`WebDav::propfind`] in the shared [`retry::run`] loop and
//! applies a caller-supplied filter inside each attempt, so an attempt
//! that yields nothing the caller wants can be retried as well.

use std::sync::Arc;

use cnpj_getter_acquire_models::{RemoteEntry, RetryPolicy};

use crate::webdav::WebDav;
use crate::{AcquireError, AttemptError, retry};

/// Whether a listing with no matching children counts as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyListing {
    /// Zero matches is a valid answer.
    Accept,
    /// Zero matches is treated like a transient glitch and retried.
    Retry,
}

/// Lists remote directories with retry and backoff.
#[derive(Clone)]
pub struct ListingClient {
    dav: Arc<dyn WebDav>,
    policy: RetryPolicy,
}

impl ListingClient {
    /// Creates a client that lists through `dav` under `policy`.
    #[must_use]
    pub fn new(dav: Arc<dyn WebDav>, policy: RetryPolicy) -> Self {
        Self { dav, policy }
    }

    /// Lists the immediate children of `path`, keeping entries for which
    /// `keep` returns `true`.
    ///
    /// With [`EmptyListing::Retry`] an attempt that keeps nothing is
    /// retried; this backend sometimes serves an empty page for a
    /// populated folder.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Listing`] once the retry budget is spent.
    pub async fn list<F>(
        &self,
        path: &str,
        empty: EmptyListing,
        keep: F,
    ) -> Result<Vec<RemoteEntry>, AcquireError>
    where
        F: Fn(&RemoteEntry) -> bool + Sync,
    {
        let dav = &self.dav;
        let keep = &keep;
        let label = format!("listing {path}");

        retry::run(&self.policy, &label, move |_| async move {
            let entries: Vec<RemoteEntry> = dav
                .propfind(path)
                .await?
                .into_iter()
                .filter(|entry| keep(entry))
                .collect();

            if entries.is_empty() && empty == EmptyListing::Retry {
                return Err(AttemptError::protocol(format!(
                    "no matching entries in {path}"
                )));
            }

            log::debug!("{path}: {} matching entries", entries.len());
            Ok(entries)
        })
        .await
        .map_err(|exhausted| AcquireError::Listing {
            path: path.to_string(),
            attempts: exhausted.attempts,
            source: exhausted.error,
        })
    }
}
