use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::model::PitchRecord;
use crate::media::VideoMetadata;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlRequest {
    #[validate(length(min = 1, max = 255, message = "fileName is required"))]
    pub file_name: String,
    #[validate(length(min = 1, message = "mimeType is required"))]
    pub mime_type: String,
    #[validate(range(min = 1, message = "fileSize must be positive"))]
    pub file_size: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlResponse {
    pub upload_url: String,
    pub file_key: String,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    #[validate(length(min = 1, message = "fileKey is required"))]
    pub file_key: String,
    pub file_name: Option<String>,
    #[validate(range(min = 1, message = "fileSize must be positive"))]
    pub file_size: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadResponse {
    pub pitch_id: Uuid,
    pub state: String,
    pub metadata: VideoMetadata,
}

/// Lets a privileged user address someone else's pitch.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct OwnerQuery {
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoResponse {
    pub raw_key: Option<String>,
    pub raw_bucket: Option<String>,
    pub hls_url: Option<String>,
    pub encryption_key_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResponse {
    pub state: String,
    #[serde(with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub completed_at: Option<OffsetDateTime>,
    pub retries: i32,
    pub error: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PitchResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub video: VideoResponse,
    pub metadata: Option<VideoMetadata>,
    pub processing: ProcessingResponse,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
}

impl From<PitchRecord> for PitchResponse {
    fn from(record: PitchRecord) -> Self {
        let state = &record.processing.state;
        Self {
            id: record.id,
            owner_id: record.owner_id,
            processing: ProcessingResponse {
                state: state.as_str().to_string(),
                started_at: state.started_at(),
                updated_at: record.processing.updated_at,
                completed_at: state.completed_at(),
                retries: record.processing.retries,
                error: state.error().map(str::to_string),
                file_name: record.processing.file_name,
                file_size: record.processing.file_size,
            },
            video: VideoResponse {
                raw_key: record.video.raw_key,
                raw_bucket: record.video.raw_bucket,
                hls_url: record.video.hls_url,
                encryption_key_url: record.video.encryption_key_url,
            },
            metadata: record.metadata,
            status: record.status.as_str().to_string(),
            created_at: record.created_at,
        }
    }
}
