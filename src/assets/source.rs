use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{AssetError, CompositorError, Result};

/// Where an asset lives: a local file or a remote URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssetSource {
    File(PathBuf),
    Url(String),
}

impl AssetSource {
    pub fn parse(reference: &str) -> Self {
        let trimmed = reference.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            AssetSource::Url(trimmed.to_string())
        } else {
            AssetSource::File(PathBuf::from(trimmed))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, AssetSource::Url(_))
    }

    /// Last path segment, without any URL query or fragment
    pub fn file_name(&self) -> Option<String> {
        let name = match self {
            AssetSource::File(path) => path.to_string_lossy().into_owned(),
            AssetSource::Url(url) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
        };
        let file = name.rsplit('/').next()?;
        (!file.is_empty()).then(|| file.to_string())
    }

    /// File extension hint, used to name downloaded temp files
    pub fn extension(&self) -> Option<String> {
        let file = self.file_name()?;
        let (_, ext) = file.rsplit_once('.')?;
        (!ext.is_empty() && ext.len() <= 5).then(|| ext.to_lowercase())
    }

    /// File name without its extension
    pub fn file_stem(&self) -> Option<String> {
        let file = self.file_name()?;
        let stem = file.rsplit_once('.').map_or(file.as_str(), |(stem, _)| stem);
        (!stem.is_empty()).then(|| stem.to_string())
    }
}

impl From<String> for AssetSource {
    fn from(value: String) -> Self {
        AssetSource::parse(&value)
    }
}

impl From<AssetSource> for String {
    fn from(value: AssetSource) -> Self {
        value.to_string()
    }
}

impl fmt::Display for AssetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetSource::File(path) => write!(f, "{}", path.display()),
            AssetSource::Url(url) => f.write_str(url),
        }
    }
}

/// Downloads remote assets to local temporary files
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        extension: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<NamedTempFile>;
}

/// `reqwest`-backed fetcher
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .user_agent(concat!("reel-compositor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CompositorError::generic(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn download(&self, url: &str, extension: Option<&str>) -> Result<NamedTempFile> {
        let fetch_failed = |reason: String| AssetError::FetchFailed { url: url.to_string(), reason };

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_failed(format!("HTTP {}", response.status())).into());
        }

        let suffix = extension.map(|ext| format!(".{}", ext)).unwrap_or_default();
        let file = tempfile::Builder::new()
            .prefix("reel-asset-")
            .suffix(&suffix)
            .tempfile()?;

        // Body chunks go straight to disk; the temp file owns the path
        let mut out = tokio::fs::File::from_std(file.reopen()?);
        let mut written = 0usize;
        while let Some(chunk) = response.chunk().await.map_err(|e| fetch_failed(e.to_string()))? {
            out.write_all(&chunk).await?;
            written += chunk.len();
        }
        out.flush().await?;

        debug!("Downloaded {} bytes from {}", written, url);
        Ok(file)
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        extension: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<NamedTempFile> {
        info!("📥 Fetching remote asset: {}", url);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CompositorError::Cancelled),
            result = self.download(url, extension) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_distinguishes_urls() {
        assert_eq!(
            AssetSource::parse("https://cdn.example.com/a.mp4"),
            AssetSource::Url("https://cdn.example.com/a.mp4".to_string())
        );
        assert_eq!(
            AssetSource::parse("clips/a.mp4"),
            AssetSource::File(PathBuf::from("clips/a.mp4"))
        );
    }

    #[test]
    fn test_extension_ignores_query() {
        let url = AssetSource::parse("https://cdn.example.com/v/clip.MP4?sig=abc");
        assert_eq!(url.extension(), Some("mp4".to_string()));
        assert_eq!(AssetSource::parse("https://cdn.example.com/stream").extension(), None);
        assert_eq!(AssetSource::parse("logo.png").extension(), Some("png".to_string()));
    }

    #[test]
    fn test_file_stem() {
        let url = AssetSource::parse("https://cdn.example.com/v/talk.mp4?sig=abc");
        assert_eq!(url.file_stem(), Some("talk".to_string()));
        assert_eq!(AssetSource::parse("clips/intro").file_stem(), Some("intro".to_string()));
        assert_eq!(AssetSource::parse("https://cdn.example.com/").file_stem(), None);
    }

    #[test]
    fn test_serde_as_plain_string() {
        let source: AssetSource = serde_json::from_str("\"https://x.test/n.mp3\"").unwrap();
        assert!(source.is_remote());
        assert_eq!(serde_json::to_string(&source).unwrap(), "\"https://x.test/n.mp3\"");
    }

    /// Answer one request with `status` and `body`, written in small pieces
    async fn serve_once(status: &'static str, body: Vec<u8>) -> std::net::SocketAddr {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4096];
            let _ = socket.read(&mut request).await.unwrap();
            let header = format!(
                "HTTP/1.1 {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                status,
                body.len()
            );
            socket.write_all(header.as_bytes()).await.unwrap();
            for part in body.chunks(16 * 1024) {
                socket.write_all(part).await.unwrap();
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_download_streams_body_to_temp_file() {
        let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let addr = serve_once("200 OK", body.clone()).await;

        let fetcher = HttpFetcher::new().unwrap();
        let file = fetcher
            .fetch(&format!("http://{}/clip.mp4", addr), Some("mp4"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(std::fs::read(file.path()).unwrap(), body);
        assert!(file.path().to_string_lossy().ends_with(".mp4"));
    }

    #[tokio::test]
    async fn test_download_rejects_error_status() {
        let addr = serve_once("404 Not Found", b"missing".to_vec()).await;

        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher
            .fetch(&format!("http://{}/gone.mp4", addr), None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 404"));
    }

    #[tokio::test]
    async fn test_fetch_observes_cancellation() {
        let fetcher = HttpFetcher::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = fetcher.fetch("http://127.0.0.1:9/never", None, &cancel).await;
        assert!(matches!(result, Err(CompositorError::Cancelled)));
    }
}
