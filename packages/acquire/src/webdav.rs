//! Single-attempt WebDAV calls against the Receita Federal share.
//!
//! [`WebDav`] is the seam the rest of the crate talks to: one `PROPFIND`
//! or one `GET`, no retries. [`HttpWebDav`] implements it with
//! `reqwest`. Retrying and filtering live in [`crate::listing`] and
//! [`crate::transfer`].

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cnpj_getter_acquire_models::{AcquireConfig, RemoteEntry};
use futures::StreamExt as _;
use quick_xml::Reader;
use quick_xml::events::Event;
use tokio::io::AsyncWriteExt as _;

use crate::{AcquireError, AttemptError};

/// `PROPFIND` request body asking only for the last-modified property.
pub const PROPFIND_BODY: &str = r#"<?xml version="1.0"?>
<d:propfind xmlns:d="DAV:">
    <d:prop>
        <d:getlastmodified />
    </d:prop>
</d:propfind>
"#;

/// Custom HTTP method used for directory listings.
const PROPFIND: &[u8] = b"PROPFIND";

/// Log transfer progress every this many bytes.
const PROGRESS_LOG_BYTES: u64 = 100 * 1_048_576;

/// One-shot WebDAV operations.
#[async_trait]
pub trait WebDav: Send + Sync {
    /// Lists the immediate children of the directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AttemptError`] if the request fails, the status is not
    /// successful, or the body is not a multistatus document.
    async fn propfind(&self, path: &str) -> Result<Vec<RemoteEntry>, AttemptError>;

    /// Streams the file at `path` into `dest`, returning the number of
    /// bytes written.
    ///
    /// Implementations may leave a partial file behind on failure; the
    /// caller cleans up.
    ///
    /// # Errors
    ///
    /// Returns [`AttemptError`] if the request fails, the response is not
    /// a ZIP archive, or `dest` cannot be written.
    async fn download(&self, path: &str, dest: &Path) -> Result<u64, AttemptError>;
}

/// [`WebDav`] over HTTPS with Basic auth derived from the share token.
pub struct HttpWebDav {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpWebDav {
    /// Builds a client from the configured endpoint, token, user agent
    /// and timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Client`] if the TLS backend cannot be
    /// initialized.
    pub fn new(config: &AcquireConfig) -> Result<Self, AcquireError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.request_timeout)
            .read_timeout(config.request_timeout)
            .build()
            .map_err(AcquireError::Client)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Absolute URL of a path on the share.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        // Public shares authenticate with the token as user and no password.
        self.client
            .request(method, url)
            .basic_auth(&self.token, Some(""))
    }
}

#[async_trait]
impl WebDav for HttpWebDav {
    async fn propfind(&self, path: &str) -> Result<Vec<RemoteEntry>, AttemptError> {
        let url = self.url(path);
        let method = reqwest::Method::from_bytes(PROPFIND)
            .map_err(|e| AttemptError::protocol(format!("invalid method: {e}")))?;

        log::debug!("PROPFIND {url}");

        let response = self
            .request(method, &url)
            .header("Depth", "1")
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(PROPFIND_BODY)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        parse_multistatus(&body)
    }

    async fn download(&self, path: &str, dest: &Path) -> Result<u64, AttemptError> {
        let url = self.url(path);
        log::debug!("GET {url} -> {}", dest.display());

        let response = self.request(reqwest::Method::GET, &url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        // An HTML error page served with 200 must not land on disk.
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !content_type.contains("zip") {
            return Err(AttemptError::protocol(format!(
                "expected a ZIP archive from {url}, got content-type {content_type:?}"
            )));
        }

        let total_size = response.content_length();

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| io_error(dest, e))?;

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        let mut last_logged: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| io_error(dest, e))?;
            written += chunk.len() as u64;

            if written / PROGRESS_LOG_BYTES > last_logged {
                last_logged = written / PROGRESS_LOG_BYTES;
                #[allow(clippy::cast_precision_loss)]
                let mb = written as f64 / 1_048_576.0;
                match total_size {
                    Some(total) if total > 0 => {
                        #[allow(clippy::cast_precision_loss)]
                        let pct = (written as f64 / total as f64) * 100.0;
                        log::info!("  {path}: {mb:.0} MB ({pct:.0}%)");
                    }
                    _ => log::info!("  {path}: {mb:.0} MB"),
                }
            }
        }

        file.flush().await.map_err(|e| io_error(dest, e))?;

        Ok(written)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> AttemptError {
    AttemptError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Parses a `207 Multi-Status` body into one entry per `<response>`.
///
/// The listed directory itself is returned too (as its own last path
/// segment); callers filter it out by name. Entries without an `href`
/// are dropped. A missing or unparseable `getlastmodified` yields
/// `last_modified: None`.
///
/// # Errors
///
/// Returns [`AttemptError::Protocol`] if the body is not well-formed XML,
/// contains no `multistatus` element, or ends before it is closed.
pub fn parse_multistatus(xml: &str) -> Result<Vec<RemoteEntry>, AttemptError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut saw_multistatus = false;
    let mut closed_multistatus = false;
    let mut in_response = false;
    let mut current_tag = String::new();
    let mut href = String::new();
    let mut last_modified = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "multistatus" => saw_multistatus = true,
                    "response" => {
                        in_response = true;
                        href.clear();
                        last_modified.clear();
                    }
                    _ => {}
                }
                current_tag = name;
            }
            Ok(Event::End(e)) => {
                let local = e.local_name();
                if local.as_ref() == b"multistatus" {
                    closed_multistatus = true;
                } else if local.as_ref() == b"response" && in_response {
                    if let Some(name) = entry_name(&href) {
                        entries.push(RemoteEntry {
                            name,
                            last_modified: parse_http_date(&last_modified),
                        });
                    }
                    in_response = false;
                }
                current_tag.clear();
            }
            Ok(Event::Text(e)) if in_response => {
                let text = e
                    .unescape()
                    .map_err(|err| AttemptError::protocol(format!("bad listing text: {err}")))?;
                match current_tag.as_str() {
                    "href" => href.push_str(text.trim()),
                    "getlastmodified" => last_modified.push_str(text.trim()),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(AttemptError::protocol(format!("malformed listing XML: {e}")));
            }
            _ => {}
        }
    }

    if !saw_multistatus {
        return Err(AttemptError::protocol(
            "listing response is not a WebDAV multistatus document",
        ));
    }
    if !closed_multistatus {
        return Err(AttemptError::protocol("listing response was truncated"));
    }

    Ok(entries)
}

/// Last non-empty path segment of an `href`.
fn entry_name(href: &str) -> Option<String> {
    href.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(ToString::to_string)
}

/// Parses an RFC 1123 date (`Mon, 13 May 2024 10:00:00 GMT`).
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| log::debug!("unparseable getlastmodified {value:?}: {e}"))
        .ok()
}
