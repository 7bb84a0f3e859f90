use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use futures_util::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::common::error::{PitchError, PitchResult};
use crate::common::upload::{MIN_PART_SIZE, upload_file_multipart};
use crate::infrastructure::storage::{ObjectStore, ObjectStream};

#[derive(Clone)]
pub struct StorageService {
    pub client: Client,
    pub bucket: String,
    public_url: String,
    public_bucket: bool,
}

impl StorageService {
    pub async fn new(
        endpoint: &str,
        public_url: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        public_bucket: bool,
    ) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");

        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO
            .build();

        let client = Client::from_conf(config);

        info!(bucket, public_bucket, "✅ Connected to S3 (MinIO)");

        Self {
            client,
            bucket: bucket.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
            public_bucket,
        }
    }

    fn presigning(expires_in: Duration) -> PitchResult<PresigningConfig> {
        PresigningConfig::expires_in(expires_in)
            .map_err(|e| PitchError::Storage(format!("invalid presign expiry: {}", e)))
    }

    pub async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, PitchError> {
        let result = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(aws_sdk_s3::Error::from)?;

        result
            .upload_id
            .ok_or_else(|| PitchError::Storage(format!("no upload id returned for {}", key)))
    }

    pub async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: bytes::Bytes,
    ) -> Result<aws_sdk_s3::types::CompletedPart, PitchError> {
        let result = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(aws_sdk_s3::Error::from)?;

        let e_tag = result
            .e_tag
            .ok_or_else(|| PitchError::Storage(format!("part {} returned no etag", part_number)))?;

        Ok(aws_sdk_s3::types::CompletedPart::builder()
            .e_tag(e_tag)
            .part_number(part_number)
            .build())
    }

    pub async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<aws_sdk_s3::types::CompletedPart>,
    ) -> Result<(), PitchError> {
        let completed_multipart_upload = aws_sdk_s3::types::CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await
            .map_err(aws_sdk_s3::Error::from)?;

        Ok(())
    }

    pub async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), PitchError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(aws_sdk_s3::Error::from)?;

        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> PitchResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(aws_sdk_s3::Error::from)?;

            keys.extend(page.contents().iter().filter_map(|o| o.key().map(str::to_string)));

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl ObjectStore for StorageService {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn is_public(&self) -> bool {
        self.public_bucket
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_url, self.bucket, key)
    }

    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> PitchResult<String> {
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(Self::presigning(expires_in)?)
            .await
            .map_err(aws_sdk_s3::Error::from)?;

        Ok(request.uri().to_string())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> PitchResult<String> {
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(Self::presigning(expires_in)?)
            .await
            .map_err(aws_sdk_s3::Error::from)?;

        Ok(request.uri().to_string())
    }

    async fn download_to(&self, key: &str, dest: &Path) -> PitchResult<u64> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(aws_sdk_s3::Error::from)?;

        let mut reader = resp.body.into_async_read();
        let mut file = tokio::fs::File::create(dest).await?;
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        debug!(key, bytes = written, "downloaded object");
        Ok(written)
    }

    async fn get_object(&self, key: &str) -> PitchResult<ObjectStream> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(aws_sdk_s3::Error::from)?;

        let content_length = resp.content_length();
        let stream = ReaderStream::new(resp.body.into_async_read());

        Ok(ObjectStream {
            content_length,
            body: stream.boxed(),
        })
    }

    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> PitchResult<()> {
        let size = tokio::fs::metadata(path).await?.len();
        if size as usize >= MIN_PART_SIZE {
            return upload_file_multipart(self, path, key, content_type).await;
        }

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| PitchError::Storage(format!("failed to read {}: {}", path.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(aws_sdk_s3::Error::from)?;

        Ok(())
    }

    async fn delete_object(&self, key: &str) -> PitchResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(aws_sdk_s3::Error::from)?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> PitchResult<usize> {
        let keys = self.list_keys(prefix).await?;
        for key in &keys {
            self.delete_object(key).await?;
        }
        debug!(prefix, removed = keys.len(), "deleted prefix");
        Ok(keys.len())
    }
}
