//! In-memory [`WebDav`] used by the unit tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cnpj_getter_acquire_models::RemoteEntry;
use tokio::time::Instant;

use crate::AttemptError;
use crate::webdav::WebDav;

/// Bytes every successful fake transfer writes.
pub const ARCHIVE_BYTES: &[u8] = b"PK\x03\x04fake archive";

/// Failure count meaning "never succeeds".
pub const ALWAYS: u32 = u32::MAX;

#[derive(Default)]
pub struct FakeDav {
    listings: Mutex<BTreeMap<String, Vec<RemoteEntry>>>,
    failing_listings: AtomicU32,
    propfinds: Mutex<Vec<(String, Instant)>>,
    downloads: Mutex<Vec<String>>,
    broken: Mutex<BTreeMap<String, u32>>,
    transfer_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeDav {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets what a `PROPFIND` of `path` returns.
    pub fn set_listing(&self, path: &str, entries: Vec<RemoteEntry>) {
        self.listings
            .lock()
            .unwrap()
            .insert(path.trim_end_matches('/').to_string(), entries);
    }

    /// Makes the next `count` listings fail regardless of path.
    pub fn fail_next_listings(&self, count: u32) {
        self.failing_listings.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` transfers of `name` fail after writing a
    /// partial body. [`ALWAYS`] never recovers.
    pub fn break_file(&self, name: &str, count: u32) {
        self.broken.lock().unwrap().insert(name.to_string(), count);
    }

    /// Makes every transfer take `delay` before writing its body.
    pub fn slow_transfers(&self, delay: Duration) {
        *self.transfer_delay.lock().unwrap() = Some(delay);
    }

    /// Most transfers that were ever running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn propfind_count(&self) -> usize {
        self.propfinds.lock().unwrap().len()
    }

    pub fn propfind_instants(&self) -> Vec<Instant> {
        self.propfinds.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    /// Remote paths of every transfer attempt, in call order.
    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }

    fn take_failure(&self, name: &str) -> bool {
        let mut broken = self.broken.lock().unwrap();
        match broken.get_mut(name) {
            Some(remaining) if *remaining == ALWAYS => true,
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl WebDav for FakeDav {
    async fn propfind(&self, path: &str) -> Result<Vec<RemoteEntry>, AttemptError> {
        self.propfinds
            .lock()
            .unwrap()
            .push((path.to_string(), Instant::now()));

        let failing = self.failing_listings.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_listings.store(failing - 1, Ordering::SeqCst);
            return Err(AttemptError::protocol("simulated listing glitch"));
        }

        Ok(self
            .listings
            .lock()
            .unwrap()
            .get(path.trim_end_matches('/'))
            .cloned()
            .unwrap_or_default())
    }

    async fn download(&self, path: &str, dest: &Path) -> Result<u64, AttemptError> {
        self.downloads.lock().unwrap().push(path.to_string());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let delay = *self.transfer_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let name = path.rsplit('/').next().unwrap_or_default().to_string();

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }

        if self.take_failure(&name) {
            std::fs::write(dest, &ARCHIVE_BYTES[..4]).unwrap();
            return Err(AttemptError::protocol("connection reset mid-stream"));
        }

        std::fs::write(dest, ARCHIVE_BYTES).unwrap();
        Ok(ARCHIVE_BYTES.len() as u64)
    }
}

pub fn entry(name: &str) -> RemoteEntry {
    RemoteEntry {
        name: name.to_string(),
        last_modified: None,
    }
}

pub fn dated(name: &str, last_modified: DateTime<Utc>) -> RemoteEntry {
    RemoteEntry {
        name: name.to_string(),
        last_modified: Some(last_modified),
    }
}

/// Fresh, empty directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("cnpj_acquire_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
