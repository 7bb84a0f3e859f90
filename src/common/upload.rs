use crate::common::error::{PitchError, PitchResult};
use crate::infrastructure::storage::s3::StorageService;
use bytes::Bytes;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, error};

// Minimum part size for S3 is 5MB. We use 6MB to be safe.
pub const MIN_PART_SIZE: usize = 6 * 1024 * 1024;

const READ_CHUNK: usize = 1024 * 1024;

pub struct MultipartUploader<'a> {
    storage: &'a StorageService,
    key: String,
    upload_id: String,
    parts: Vec<aws_sdk_s3::types::CompletedPart>,
    part_number: i32,
    buffer: Vec<u8>,
}

impl<'a> MultipartUploader<'a> {
    pub async fn new(
        storage: &'a StorageService,
        key: String,
        content_type: &str,
    ) -> PitchResult<Self> {
        let upload_id = storage.create_multipart_upload(&key, content_type).await?;

        Ok(Self {
            storage,
            key,
            upload_id,
            parts: Vec::new(),
            part_number: 1,
            buffer: Vec::with_capacity(MIN_PART_SIZE),
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> PitchResult<()> {
        self.buffer.extend_from_slice(chunk);

        if self.buffer.len() >= MIN_PART_SIZE {
            self.flush_part().await?;
        }

        Ok(())
    }

    async fn flush_part(&mut self) -> PitchResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let body = Bytes::from(std::mem::replace(
            &mut self.buffer,
            Vec::with_capacity(MIN_PART_SIZE),
        ));

        let part = self
            .storage
            .upload_part(&self.key, &self.upload_id, self.part_number, body)
            .await
            .map_err(|e| {
                PitchError::Storage(format!("failed to upload part {}: {}", self.part_number, e))
            })?;

        debug!(key = %self.key, part = self.part_number, "uploaded part");
        self.parts.push(part);
        self.part_number += 1;

        Ok(())
    }

    pub async fn finish(mut self) -> PitchResult<()> {
        if !self.buffer.is_empty() {
            self.flush_part().await?;
        }

        self.storage
            .complete_multipart_upload(&self.key, &self.upload_id, self.parts)
            .await?;
        Ok(())
    }

    pub async fn abort(&self) -> PitchResult<()> {
        self.storage
            .abort_multipart_upload(&self.key, &self.upload_id)
            .await?;
        Ok(())
    }
}

/// Streams a local file into object storage part by part.
pub async fn upload_file_multipart(
    storage: &StorageService,
    path: &Path,
    key: &str,
    content_type: &str,
) -> PitchResult<()> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut uploader = MultipartUploader::new(storage, key.to_string(), content_type).await?;
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let read = match file.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                error!(key, "read error during multipart upload: {}", e);
                uploader.abort().await?;
                return Err(e.into());
            }
        };

        if let Err(e) = uploader.write_chunk(&chunk[..read]).await {
            error!(key, "upload error: {}", e);
            uploader.abort().await?;
            return Err(e);
        }
    }

    uploader.finish().await
}
