#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Data types shared by the CNPJ acquisition pipeline.
//!
//! A [`Month`] names one remote folder on the Receita Federal WebDAV
//! share and one unit of download work. Listing calls produce
//! [`RemoteEntry`] values, the downloader turns the relevant ones into
//! [`ExpectedFile`]s, and each `download_month` call reports an
//! [`AcquisitionResult`]. [`AcquireConfig`] carries every tunable and is
//! handed to each component's constructor.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Datelike as _, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Public WebDAV endpoint of the Receita Federal open-data share.
pub const DEFAULT_WEBDAV_BASE: &str = "https://dados-hom.receitafederal.gov.br/public.php/webdav";

/// Remote directory that holds one `YYYY-MM` folder per published month.
pub const DEFAULT_ROOT_PATH: &str = "/Dados/Cadastros/CNPJ";

/// User agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = "cnpj-getter";

/// Concurrent transfers per round. The share throttles aggressive
/// clients, so this stays low regardless of local bandwidth.
pub const DEFAULT_WORKERS: usize = 2;

/// Months modified within this many days count as updated.
pub const DEFAULT_WINDOW_DAYS: u32 = 15;

/// Listing/diff/fetch rounds before a month is declared incomplete.
pub const DEFAULT_MAX_ROUNDS: u32 = 5;

/// Pause between two rounds of the same month.
pub const DEFAULT_ROUND_DELAY: Duration = Duration::from_secs(10);

/// Base of the quadratic backoff (`base * attempt²`).
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(3);

/// Attempts per listing call.
pub const DEFAULT_LISTING_ATTEMPTS: u32 = 5;

/// Attempts per file transfer.
pub const DEFAULT_TRANSFER_ATTEMPTS: u32 = 3;

/// Connect and read timeout for each network call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Returned when a string is not a `YYYY-MM` month identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid month {value:?}: expected YYYY-MM")]
pub struct MonthParseError {
    /// The rejected input.
    pub value: String,
}

/// A `YYYY-MM` month identifier.
///
/// Only the shape is validated (four digits, a hyphen, two digits), the
/// same rule used to recognize month folders on the share. Ordering is
/// lexical, which is chronological for this shape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Month(String);

impl Month {
    /// Parses a `YYYY-MM` identifier.
    ///
    /// # Errors
    ///
    /// Returns [`MonthParseError`] if `value` does not have the exact
    /// `NNNN-NN` shape.
    pub fn parse(value: &str) -> Result<Self, MonthParseError> {
        if is_month_shape(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(MonthParseError {
                value: value.to_string(),
            })
        }
    }

    /// Returns the month preceding the one containing `today`.
    ///
    /// The share publishes a month's archives during the following
    /// month, so this is the most recent month that can be complete.
    #[must_use]
    pub fn preceding(today: NaiveDate) -> Self {
        let (year, month) = if today.month() == 1 {
            (today.year() - 1, 12)
        } else {
            (today.year(), today.month() - 1)
        };
        Self(format!("{year:04}-{month:02}"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_month_shape(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 7
        && bytes[4] == b'-'
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[5..].iter().all(u8::is_ascii_digit)
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Month {
    type Err = MonthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Month {
    type Error = MonthParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Month> for String {
    fn from(month: Month) -> Self {
        month.0
    }
}

impl AsRef<str> for Month {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One child of a WebDAV directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Last segment of the entry's `href`, without a trailing slash.
    pub name: String,
    /// Parsed `getlastmodified` property, if the server reported one.
    pub last_modified: Option<DateTime<Utc>>,
}

/// A remote archive that must exist locally for its month to be complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedFile {
    /// File name as listed remotely (e.g. `Empresas0.zip`).
    pub name: String,
    /// Path of the file relative to the WebDAV base URL.
    pub remote_path: String,
    /// Where the file is stored on disk.
    pub local_path: PathBuf,
}

/// Outcome of a successful `download_month` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionResult {
    /// Files transferred by this call, in completion order.
    pub downloaded: Vec<PathBuf>,
    /// Files that were already present and left untouched.
    pub skipped: Vec<PathBuf>,
}

/// Attempt ceiling and quadratic backoff shared by listings and transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Base delay; the wait after failed attempt `n` is `base * n²`.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the given ceiling and backoff base.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Policy used for `PROPFIND` listings (5 attempts, 3s base).
    #[must_use]
    pub const fn listing() -> Self {
        Self::new(DEFAULT_LISTING_ATTEMPTS, DEFAULT_BACKOFF_BASE)
    }

    /// Policy used for file transfers (3 attempts, 3s base).
    #[must_use]
    pub const fn transfer() -> Self {
        Self::new(DEFAULT_TRANSFER_ATTEMPTS, DEFAULT_BACKOFF_BASE)
    }

    /// Delay to wait after failed attempt `attempt` (1-based) before the
    /// next one.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(attempt.saturating_mul(attempt))
    }
}

/// Every tunable of the acquisition pipeline.
#[derive(Debug, Clone)]
pub struct AcquireConfig {
    /// WebDAV base URL, without a trailing slash.
    pub base_url: String,
    /// Public share token, sent as the Basic auth user name.
    pub token: String,
    /// Remote directory holding the month folders.
    pub root_path: String,
    /// Local directory that receives one sub-directory per month.
    pub raw_dir: PathBuf,
    /// Maximum concurrent transfers within a round.
    pub workers: usize,
    /// Recency window used by the month finder.
    pub window_days: u32,
    /// Round ceiling for a single month.
    pub max_rounds: u32,
    /// Pause between rounds.
    pub round_delay: Duration,
    /// Retry policy for listing calls.
    pub listing_retry: RetryPolicy,
    /// Retry policy for file transfers.
    pub transfer_retry: RetryPolicy,
    /// Connect and read timeout per network call.
    pub request_timeout: Duration,
    /// User agent header value.
    pub user_agent: String,
}

impl AcquireConfig {
    /// Creates a configuration with the default endpoint and limits.
    #[must_use]
    pub fn new(token: impl Into<String>, raw_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: DEFAULT_WEBDAV_BASE.to_string(),
            token: token.into(),
            root_path: DEFAULT_ROOT_PATH.to_string(),
            raw_dir: raw_dir.into(),
            workers: DEFAULT_WORKERS,
            window_days: DEFAULT_WINDOW_DAYS,
            max_rounds: DEFAULT_MAX_ROUNDS,
            round_delay: DEFAULT_ROUND_DELAY,
            listing_retry: RetryPolicy::listing(),
            transfer_retry: RetryPolicy::transfer(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Remote directory path of a month, relative to the base URL.
    #[must_use]
    pub fn month_remote_dir(&self, month: &Month) -> String {
        format!("{}/{month}", self.root_path.trim_end_matches('/'))
    }

    /// Local directory that stores a month's archives.
    #[must_use]
    pub fn month_local_dir(&self, month: &Month) -> PathBuf {
        month_dir(&self.raw_dir, month)
    }
}

/// Joins a month onto a raw-storage root.
#[must_use]
pub fn month_dir(raw_dir: &Path, month: &Month) -> PathBuf {
    raw_dir.join(month.as_str())
}
