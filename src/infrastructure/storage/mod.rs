use async_trait::async_trait;
use bytes::Bytes;
use futures_util::TryStreamExt;
use futures_util::stream::BoxStream;
use std::path::Path;
use std::time::Duration;

use crate::common::error::{PitchError, PitchResult};

pub mod s3;

/// Lifetime of the signed URL handed to the probe during finalize.
pub const PROBE_GET_TTL: Duration = Duration::from_secs(10 * 60);
/// Lifetime of client upload URLs.
pub const SIGNED_PUT_TTL: Duration = Duration::from_secs(60 * 60);

pub const HLS_MIME: &str = "application/vnd.apple.mpegurl";
pub const SEGMENT_MIME: &str = "video/mp2t";

/// Body of an object read back from storage.
pub struct ObjectStream {
    pub content_length: Option<i64>,
    pub body: BoxStream<'static, std::io::Result<Bytes>>,
}

impl std::fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStream")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl ObjectStream {
    pub fn from_bytes(data: Bytes) -> Self {
        Self {
            content_length: Some(data.len() as i64),
            body: Box::pin(futures_util::stream::once(async move { Ok(data) })),
        }
    }

    pub async fn into_string(self) -> PitchResult<String> {
        let chunks: Vec<Bytes> = self.body.try_collect().await?;
        let data = chunks.concat();
        String::from_utf8(data)
            .map_err(|_| PitchError::Storage("object is not valid UTF-8".to_string()))
    }
}

/// S3-compatible object storage as consumed by the pitch pipeline.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// Whether stored object URLs are directly readable by clients.
    fn is_public(&self) -> bool;

    fn object_url(&self, key: &str) -> String;

    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> PitchResult<String>;

    async fn presign_get(&self, key: &str, expires_in: Duration) -> PitchResult<String>;

    /// Downloads an object to `dest`, returning the number of bytes written.
    async fn download_to(&self, key: &str, dest: &Path) -> PitchResult<u64>;

    async fn get_object(&self, key: &str) -> PitchResult<ObjectStream>;

    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> PitchResult<()>;

    async fn delete_object(&self, key: &str) -> PitchResult<()>;

    /// Deletes every object under `prefix`, returning how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> PitchResult<usize>;

    /// Inverse of [`ObjectStore::object_url`].
    fn key_from_url(&self, url: &str) -> Option<String> {
        key_from_object_url(url, self.bucket())
    }
}

/// Extracts the object key from a path-style URL (`{base}/{bucket}/{key}`),
/// tolerating virtual-host style URLs that omit the bucket segment.
pub fn key_from_object_url(url: &str, bucket: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let path = parsed.path().trim_start_matches('/');
    let key = path
        .strip_prefix(bucket)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(path);
    (!key.is_empty()).then(|| key.to_string())
}

/// Content type used when writing pipeline artifacts.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("m3u8") => HLS_MIME,
        Some("ts") => SEGMENT_MIME,
        Some("key") => "application/octet-stream",
        Some("mp4") => "video/mp4",
        _ => mime_guess::from_path(file_name)
            .first_raw()
            .unwrap_or("application/octet-stream"),
    }
}

/// Final path segment of a key or URL, ignoring any query string.
pub fn file_name_of(reference: &str) -> &str {
    let without_query = reference.split(['?', '#']).next().unwrap_or(reference);
    without_query.rsplit('/').next().unwrap_or(without_query)
}

/// Directory portion of a key including the trailing slash.
pub fn parent_prefix(key: &str) -> &str {
    match key.rfind('/') {
        Some(idx) => &key[..=idx],
        None => "",
    }
}
