//! Retrying single-file transfers.
//!
//! The downloader decides completeness purely from "target exists with
//! nonzero size", so a transfer must never leave a partial file at the
//! target path. Bodies are streamed into a sibling `.part` file that is
//! renamed onto the target only after the stream completes, and the
//! `.part` file is removed after every failed attempt.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cnpj_getter_acquire_models::RetryPolicy;

use crate::webdav::WebDav;
use crate::{AcquireError, AttemptError, retry};

/// Streams remote archives to disk with retry and backoff.
#[derive(Clone)]
pub struct TransferWorker {
    dav: Arc<dyn WebDav>,
    policy: RetryPolicy,
}

impl TransferWorker {
    /// Creates a worker that downloads through `dav` under `policy`.
    #[must_use]
    pub fn new(dav: Arc<dyn WebDav>, policy: RetryPolicy) -> Self {
        Self { dav, policy }
    }

    /// Downloads `remote_path` to `dest`, returning the bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Transfer`] once the retry budget is spent
    /// or a local write fails. In both cases nothing is left at `dest`
    /// or at its `.part` sibling.
    pub async fn fetch(&self, remote_path: &str, dest: &Path) -> Result<u64, AcquireError> {
        let dav = &self.dav;
        let part = part_path(dest);
        let part = part.as_path();
        let label = format!("transfer {remote_path}");

        retry::run(&self.policy, &label, move |_| async move {
            match attempt(dav.as_ref(), remote_path, part, dest).await {
                Ok(written) => Ok(written),
                Err(error) => {
                    discard(part).await;
                    Err(error)
                }
            }
        })
        .await
        .map_err(|exhausted| AcquireError::Transfer {
            path: remote_path.to_string(),
            attempts: exhausted.attempts,
            source: exhausted.error,
        })
    }
}

async fn attempt(
    dav: &dyn WebDav,
    remote_path: &str,
    part: &Path,
    dest: &Path,
) -> Result<u64, AttemptError> {
    let written = dav.download(remote_path, part).await?;

    if written == 0 {
        return Err(AttemptError::protocol(format!(
            "{remote_path} returned an empty body"
        )));
    }

    tokio::fs::rename(part, dest)
        .await
        .map_err(|source| AttemptError::Io {
            path: dest.display().to_string(),
            source,
        })?;

    log::debug!("{remote_path}: {written} bytes -> {}", dest.display());

    Ok(written)
}

/// Removes a partially written file, if any.
async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => log::debug!("removed partial file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("could not remove partial file {}: {e}", path.display()),
    }
}

/// `Empresas0.zip` -> `Empresas0.zip.part`, in the same directory.
fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncWriteExt as _;

    use super::*;
    use crate::testing::{ALWAYS, ARCHIVE_BYTES, FakeDav, scratch_dir};
    use crate::webdav::HttpWebDav;

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let dir = scratch_dir("transfer_recovers");
        let dest = dir.join("Empresas0.zip");
        let dav = Arc::new(FakeDav::new());
        dav.break_file("Empresas0.zip", 2);

        let worker = TransferWorker::new(dav.clone(), RetryPolicy::transfer());
        let written = worker.fetch("/m/Empresas0.zip", &dest).await.unwrap();

        assert_eq!(written, ARCHIVE_BYTES.len() as u64);
        assert_eq!(dav.download_count(), 3);
        assert_eq!(std::fs::read(&dest).unwrap(), ARCHIVE_BYTES);
        assert!(!part_path(&dest).exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_transfer_leaves_nothing_behind() {
        let dir = scratch_dir("transfer_fails");
        let dest = dir.join("Empresas0.zip");
        let dav = Arc::new(FakeDav::new());
        dav.break_file("Empresas0.zip", ALWAYS);

        let worker = TransferWorker::new(dav.clone(), RetryPolicy::transfer());
        let err = worker.fetch("/m/Empresas0.zip", &dest).await.unwrap_err();

        assert!(matches!(err, AcquireError::Transfer { attempts: 3, .. }));
        assert_eq!(dav.download_count(), 3);
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn part_file_is_a_sibling() {
        assert_eq!(
            part_path(Path::new("/data/raw/2024-05/Empresas0.zip")),
            PathBuf::from("/data/raw/2024-05/Empresas0.zip.part")
        );
    }

    /// Serves one response that promises more bytes than it sends, then
    /// drops the connection.
    async fn truncating_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0_u8; 4096];
                let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
                let head = "HTTP/1.1 200 OK\r\n\
                            Content-Type: application/zip\r\n\
                            Content-Length: 1048576\r\n\
                            Connection: close\r\n\r\n";
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&[0x50; 1024]).await;
                let _ = socket.flush().await;
            }
        });

        format!("http://{addr}")
    }

    #[tokio::test]
    async fn truncated_stream_never_leaves_a_file() {
        let base_url = truncating_server().await;
        let dir = scratch_dir("transfer_truncated");
        let dest = dir.join("Estabelecimentos0.zip");

        let mut config = cnpj_getter_acquire_models::AcquireConfig::new("token", &dir);
        config.base_url = base_url;
        let dav = Arc::new(HttpWebDav::new(&config).unwrap());
        let worker = TransferWorker::new(dav, RetryPolicy::new(2, Duration::from_millis(1)));

        let err = worker
            .fetch("/Dados/Cadastros/CNPJ/2024-05/Estabelecimentos0.zip", &dest)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AcquireError::Transfer {
                attempts: 2,
                source: AttemptError::Network(_),
                ..
            }
        ));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
