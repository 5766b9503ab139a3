#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Acquisition of monthly CNPJ archives from the Receita Federal WebDAV
//! share.
//!
//! The share is slow, rate-limited and occasionally answers with empty
//! or truncated listings, so nothing it says is trusted for long:
//!
//! 1. [`finder::MonthFinder`] lists the month folders and keeps those
//!    modified within a recency window.
//! 2. [`downloader::Downloader`] converges a month to "every relevant
//!    archive exists locally with nonzero size" by repeating
//!    list → diff → fetch → re-check rounds.
//!
//! Both sit on the [`webdav::WebDav`] seam, whose production
//! implementation is [`webdav::HttpWebDav`]. Retries of a single call
//! are handled by [`retry::run`]; the downloader never retries a
//! transfer itself and relies on the next round instead.

pub mod downloader;
pub mod finder;
pub mod listing;
pub mod progress;
pub mod relevance;
pub mod retry;
pub mod transfer;
pub mod webdav;

#[cfg(test)]
pub(crate) mod testing;

pub use cnpj_getter_acquire_models as models;

use cnpj_getter_acquire_models::Month;

/// Failure of a single listing or transfer attempt.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    /// Timeout, connection reset, or any other transport failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The response was not what the protocol promised (wrong content
    /// type, malformed or empty listing, empty body).
    #[error("protocol mismatch: {message}")]
    Protocol {
        /// Description of the mismatch.
        message: String,
    },

    /// Local filesystem failure while writing a transfer.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl AttemptError {
    /// Creates a [`AttemptError::Protocol`] from a message.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns `true` if another attempt may succeed.
    ///
    /// Everything the server can cause is retried, since a wrong
    /// content type or an empty listing is indistinguishable from a
    /// transient glitch on this backend. Local disk failures are not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::Io { .. })
    }
}

/// Errors surfaced by the acquisition components.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    /// A directory listing kept failing until its retry budget ran out.
    #[error("listing {path} failed after {attempts} attempt(s): {source}")]
    Listing {
        /// Remote directory path.
        path: String,
        /// Attempts made.
        attempts: u32,
        /// Error of the last attempt.
        source: AttemptError,
    },

    /// A file transfer kept failing until its retry budget ran out.
    #[error("transfer of {path} failed after {attempts} attempt(s): {source}")]
    Transfer {
        /// Remote file path.
        path: String,
        /// Attempts made.
        attempts: u32,
        /// Error of the last attempt.
        source: AttemptError,
    },

    /// The round budget was spent with archives still missing.
    #[error("month {month} incomplete after {rounds} round(s): {missing_count} file(s) missing")]
    IncompleteMonth {
        /// Month that failed to converge.
        month: Month,
        /// Archives still missing after the last round.
        missing_count: usize,
        /// Rounds attempted.
        rounds: u32,
    },

    /// Local filesystem failure outside a transfer.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Client(reqwest::Error),
}
