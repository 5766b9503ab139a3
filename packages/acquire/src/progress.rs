//! Progress reporting for month downloads.
//!
//! [`crate::downloader::Downloader`] reports through [`ProgressCallback`]
//! without knowing how it is rendered. The CLI plugs in an `indicatif`
//! bar; library callers and tests use [`NullProgress`].

use std::sync::Arc;

/// Receives per-round progress of a month download.
///
/// A round calls [`set_total`](Self::set_total) with the number of
/// archives it is about to fetch, then [`inc`](Self::inc) once per
/// finished transfer, successful or not.
pub trait ProgressCallback: Send + Sync {
    /// Resets the bar for a round that will fetch `total` archives.
    fn set_total(&self, total: u64);

    /// Advances by `delta` finished transfers.
    fn inc(&self, delta: u64);

    /// Replaces the status message.
    fn set_message(&self, msg: String);

    /// Finishes with a final message.
    fn finish(&self, msg: String);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
