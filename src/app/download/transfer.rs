//! Streaming file transfers
//!
//! A transfer writes the body of one URL to a partial file and reports the
//! server's file name; moving the partial file into place is the manager's job.

use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION};
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;
use url::Url;

use crate::app::client::ClientConfig;
use crate::constants::http;
use crate::errors::{DownloadError, DownloadResult, NetworkError, NetworkResult};

/// Called with the size of every chunk written
pub type ByteProgress<'a> = &'a (dyn Fn(u64) + Send + Sync);

/// What a finished transfer produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub bytes: u64,
    /// File name announced by the server, if any
    pub file_name: Option<String>,
}

impl TransferOutcome {
    /// Extension of the server's file name, everything from the first dot (`.tar.gz`)
    pub fn extension(&self) -> String {
        self.file_name
            .as_deref()
            .and_then(|name| name.find('.').map(|i| name[i..].to_string()))
            .unwrap_or_default()
    }
}

/// Fetches one URL into a partial file
#[async_trait]
pub trait FileTransfer: Send + Sync + Debug {
    /// Stream `url` into `partial`, truncating whatever is there
    ///
    /// # Errors
    ///
    /// Retryable failures come back as `DownloadError::Network` with a
    /// retryable cause or as `DownloadError::IncompleteDownload`.
    async fn fetch(
        &self,
        url: &Url,
        partial: &Path,
        progress: ByteProgress<'_>,
    ) -> DownloadResult<TransferOutcome>;
}

/// reqwest-backed transfer
///
/// There is no deadline for a whole file. Each wait for the response headers
/// or the next body chunk is bounded by the read timeout instead, so large
/// scenes on slow links still finish while a stalled connection is cut off.
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    client: Client,
    read_timeout: Duration,
}

impl HttpTransfer {
    pub fn new(config: &ClientConfig) -> NetworkResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(http::USER_AGENT)
            .pool_max_idle_per_host(config.pool_max_per_host)
            .build()
            .map_err(NetworkError::Http)?;
        Ok(Self {
            client,
            read_timeout: http::TRANSFER_READ_TIMEOUT,
        })
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

#[async_trait]
impl FileTransfer for HttpTransfer {
    async fn fetch(
        &self,
        url: &Url,
        partial: &Path,
        progress: ByteProgress<'_>,
    ) -> DownloadResult<TransferOutcome> {
        let request = self.client.get(url.clone()).send();
        let response = tokio::time::timeout(self.read_timeout, request)
            .await
            .map_err(|_| timed_out(url))?
            .map_err(NetworkError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }
            .into());
        }

        let expected = response.content_length();
        let file_name =
            file_name_from_headers(response.headers()).or_else(|| file_name_from_url(url));
        debug!(
            "Streaming {} ({:?} bytes) to {}",
            url,
            expected,
            partial.display()
        );

        let mut file = File::create(partial).await?;
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(NetworkError::Http));
        let received = copy_body(body, &mut file, self.read_timeout, url, progress).await?;

        if let Some(expected) = expected {
            if received != expected {
                return Err(DownloadError::IncompleteDownload { received, expected });
            }
        }

        Ok(TransferOutcome {
            bytes: received,
            file_name,
        })
    }
}

/// Write every chunk of `body` to `out`, giving up when a single chunk takes
/// longer than `read_timeout` to arrive
async fn copy_body<S, B, W>(
    body: S,
    out: &mut W,
    read_timeout: Duration,
    url: &Url,
    progress: ByteProgress<'_>,
) -> DownloadResult<u64>
where
    S: Stream<Item = NetworkResult<B>>,
    B: AsRef<[u8]>,
    W: AsyncWrite + Unpin,
{
    futures::pin_mut!(body);
    let mut received = 0u64;
    loop {
        let next = tokio::time::timeout(read_timeout, body.next())
            .await
            .map_err(|_| timed_out(url))?;
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk?;
        let chunk = chunk.as_ref();
        out.write_all(chunk).await?;
        received += chunk.len() as u64;
        progress(chunk.len() as u64);
    }
    out.flush().await?;
    Ok(received)
}

fn timed_out(url: &Url) -> NetworkError {
    NetworkError::Timeout {
        endpoint: url.to_string(),
    }
}

/// `filename=` parameter of a Content-Disposition header
fn file_name_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    value
        .split(';')
        .map(str::trim)
        .find_map(|part| {
            part.strip_prefix("filename*=UTF-8''")
                .or_else(|| part.strip_prefix("filename="))
        })
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

fn file_name_from_url(url: &Url) -> Option<String> {
    url.path_segments()?
        .last()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}
