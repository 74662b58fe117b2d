use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use crate::error::PipelineError;

type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PipelineError>> + Send + 'a>>;

/// Key-addressed object storage for published archives.
pub trait BlobStore: Send + Sync {
    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;

    /// Upload the file at `path` under `key`, returning the bytes sent.
    fn upload<'a>(&'a self, key: &'a str, path: &'a Path) -> StoreFuture<'a, u64>;
}

/// Directory standing in for a bucket.
///
/// Layout:
/// ```text
/// root/
///   <key>        -- keys containing `/` become nested directories
/// ```
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, PipelineError> {
        let relative = Path::new(key);
        let escapes = relative.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_))
        });
        if key.is_empty() || escapes {
            return Err(PipelineError::PublishFailure {
                key: key.to_string(),
                reason: "key must be a relative path without `..`".into(),
            });
        }
        Ok(self.root.join(relative))
    }

    async fn put(&self, key: &str, path: &Path) -> Result<u64, PipelineError> {
        let dest = self.object_path(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = tokio::fs::copy(path, &dest)
            .await
            .map_err(|e| PipelineError::PublishFailure {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(key, path = %dest.display(), bytes, "Stored object");
        Ok(bytes)
    }
}

impl BlobStore for LocalBlobStore {
    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move { Ok(tokio::fs::try_exists(self.object_path(key)?).await?) })
    }

    fn upload<'a>(&'a self, key: &'a str, path: &'a Path) -> StoreFuture<'a, u64> {
        Box::pin(self.put(key, path))
    }
}

/// `HEAD`/`PUT` against `<endpoint>/<bucket>/<key>`.
#[cfg(feature = "http")]
pub struct HttpBlobStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    token: Option<String>,
}

#[cfg(feature = "http")]
impl HttpBlobStore {
    pub fn new(endpoint: String, bucket: String, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket,
            token,
        }
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn head(&self, key: &str) -> Result<bool, PipelineError> {
        let response = self
            .authorize(self.client.head(self.url(key)))
            .send()
            .await
            .map_err(|e| publish_failure(key, e))?;
        match response.status() {
            status if status.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            status => Err(PipelineError::PublishFailure {
                key: key.to_string(),
                reason: format!("HEAD returned {status}"),
            }),
        }
    }

    /// Streams the file from disk; the length is sent up front so the body
    /// is not chunk-encoded.
    async fn put(&self, key: &str, path: &Path) -> Result<u64, PipelineError> {
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();

        tracing::debug!(key, url = %self.url(key), bytes = len, "Uploading object");
        let response = self
            .authorize(self.client.put(self.url(key)))
            .header(reqwest::header::CONTENT_TYPE, "application/gzip")
            .header(reqwest::header::CONTENT_LENGTH, len)
            .body(file)
            .send()
            .await
            .map_err(|e| publish_failure(key, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::PublishFailure {
                key: key.to_string(),
                reason: format!("PUT returned {status}: {text}"),
            });
        }
        Ok(len)
    }
}

#[cfg(feature = "http")]
fn publish_failure(key: &str, err: reqwest::Error) -> PipelineError {
    PipelineError::PublishFailure {
        key: key.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(feature = "http")]
impl BlobStore for HttpBlobStore {
    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(self.head(key))
    }

    fn upload<'a>(&'a self, key: &'a str, path: &'a Path) -> StoreFuture<'a, u64> {
        Box::pin(self.put(key, path))
    }
}
