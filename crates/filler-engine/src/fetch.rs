//! Download remote upload sources to a local temp file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use filler_types::{FillerError, Result};

/// Fetches `s3://` and `http(s)://` objects into a local directory.
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    async fn fetch_to(&self, uri: &str, dir: &Path) -> Result<PathBuf>;
}

pub fn is_remote(uri: &str) -> bool {
    uri.starts_with("s3://") || uri.starts_with("http://") || uri.starts_with("https://")
}

pub struct HttpObjectFetcher {
    client: reqwest::Client,
    /// Base URL for `s3://bucket/key`; `{bucket}` is replaced by the bucket.
    s3_endpoint: String,
}

impl HttpObjectFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            s3_endpoint: "https://{bucket}.s3.amazonaws.com".into(),
        }
    }

    pub fn with_s3_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.s3_endpoint = endpoint.into();
        self
    }

    /// The HTTP URL an object URI is downloaded from.
    pub fn http_url(&self, uri: &str) -> Result<String> {
        if let Some(path) = uri.strip_prefix("s3://") {
            let (bucket, key) = path.split_once('/').ok_or_else(|| FillerError::FetchFailed {
                key: uri.into(),
                message: "s3 URI needs a bucket and a key".into(),
            })?;
            let base = self.s3_endpoint.replace("{bucket}", bucket);
            return Ok(format!("{}/{}", base.trim_end_matches('/'), key));
        }
        Ok(uri.to_string())
    }
}

impl Default for HttpObjectFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Local file name for a downloaded object: the URI's last path segment,
/// prefixed so concurrent runs never collide.
fn local_name(uri: &str) -> String {
    let base = uri
        .split(['?', '#'])
        .next()
        .unwrap_or(uri)
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or("upload");
    format!("{}-{}", uuid::Uuid::new_v4().simple(), base)
}

#[async_trait]
impl ObjectFetcher for HttpObjectFetcher {
    async fn fetch_to(&self, uri: &str, dir: &Path) -> Result<PathBuf> {
        let url = self.http_url(uri)?;
        let failed = |message: String| FillerError::FetchFailed {
            key: uri.to_string(),
            message,
        };
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(failed(format!("HTTP {}", status.as_u16())));
        }
        let bytes = resp.bytes().await.map_err(|e| failed(e.to_string()))?;
        let path = dir.join(local_name(uri));
        tokio::fs::write(&path, &bytes).await?;
        tracing::info!(uri = %uri, path = %path.display(), bytes = bytes.len(), "Downloaded upload source");
        Ok(path)
    }
}
