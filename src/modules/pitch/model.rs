use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::common::error::PitchError;
use crate::media::VideoMetadata;

/// Lifecycle of the transcode pipeline for one pitch.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingState {
    Pending,
    Queued,
    Processing {
        started_at: OffsetDateTime,
    },
    Ready {
        started_at: OffsetDateTime,
        completed_at: OffsetDateTime,
    },
    Failed {
        error: String,
        /// Set when the failure happened after the worker picked the job up.
        started_at: Option<OffsetDateTime>,
    },
}

impl ProcessingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Pending => "pending",
            ProcessingState::Queued => "queued",
            ProcessingState::Processing { .. } => "processing",
            ProcessingState::Ready { .. } => "ready",
            ProcessingState::Failed { .. } => "failed",
        }
    }

    pub fn started_at(&self) -> Option<OffsetDateTime> {
        match self {
            ProcessingState::Processing { started_at } | ProcessingState::Ready { started_at, .. } => {
                Some(*started_at)
            }
            ProcessingState::Failed { started_at, .. } => *started_at,
            _ => None,
        }
    }

    pub fn completed_at(&self) -> Option<OffsetDateTime> {
        match self {
            ProcessingState::Ready { completed_at, .. } => Some(*completed_at),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ProcessingState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PitchStatus {
    Active,
    Deactivate,
}

impl PitchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PitchStatus::Active => "active",
            PitchStatus::Deactivate => "deactivate",
        }
    }
}

impl TryFrom<&str> for PitchStatus {
    type Error = PitchError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "active" => Ok(PitchStatus::Active),
            "deactivate" => Ok(PitchStatus::Deactivate),
            other => Err(PitchError::Internal(format!("unknown pitch status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PitchVideo {
    pub raw_key: Option<String>,
    pub raw_bucket: Option<String>,
    pub hls_url: Option<String>,
    pub encryption_key_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Processing {
    pub state: ProcessingState,
    pub updated_at: OffsetDateTime,
    pub retries: i32,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
}

/// The single elevator pitch owned by a user.
#[derive(Debug, Clone, PartialEq)]
pub struct PitchRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub video: PitchVideo,
    pub metadata: Option<VideoMetadata>,
    pub processing: Processing,
    pub status: PitchStatus,
    pub created_at: OffsetDateTime,
}

impl PitchRecord {
    /// Fresh record awaiting its client upload.
    pub fn new_pending(
        owner_id: Uuid,
        raw_key: String,
        raw_bucket: String,
        file_name: String,
        file_size: Option<i64>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            video: PitchVideo {
                raw_key: Some(raw_key),
                raw_bucket: Some(raw_bucket),
                hls_url: None,
                encryption_key_url: None,
            },
            metadata: None,
            processing: Processing {
                state: ProcessingState::Pending,
                updated_at: now,
                retries: 0,
                file_name: Some(file_name),
                file_size,
            },
            status: PitchStatus::Deactivate,
            created_at: now,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.processing.state, ProcessingState::Ready { .. })
    }

    /// Ready with a playable master playlist.
    pub fn is_playable(&self) -> bool {
        self.is_ready() && self.video.hls_url.is_some()
    }

    /// Records the finished client upload and rewinds to `pending`.
    pub fn accept_upload(
        &mut self,
        raw_key: String,
        file_name: Option<String>,
        file_size: Option<i64>,
        now: OffsetDateTime,
    ) {
        self.video.raw_key = Some(raw_key);
        if file_name.is_some() {
            self.processing.file_name = file_name;
        }
        if file_size.is_some() {
            self.processing.file_size = file_size;
        }
        self.transition(ProcessingState::Pending, now);
    }

    pub fn enqueue(&mut self, metadata: VideoMetadata, now: OffsetDateTime) {
        self.metadata = Some(metadata);
        self.transition(ProcessingState::Queued, now);
    }

    pub fn start_processing(&mut self, now: OffsetDateTime) {
        self.transition(ProcessingState::Processing { started_at: now }, now);
    }

    pub fn complete(
        &mut self,
        hls_url: String,
        encryption_key_url: String,
        metadata: VideoMetadata,
        now: OffsetDateTime,
    ) {
        let started_at = self.processing.state.started_at().unwrap_or(now);
        self.video.hls_url = Some(hls_url);
        self.video.encryption_key_url = Some(encryption_key_url);
        self.metadata = Some(metadata);
        self.status = PitchStatus::Active;
        self.transition(
            ProcessingState::Ready {
                started_at,
                completed_at: now,
            },
            now,
        );
    }

    pub fn fail(&mut self, error: impl Into<String>, now: OffsetDateTime) {
        let started_at = self.processing.state.started_at();
        self.processing.retries += 1;
        self.transition(
            ProcessingState::Failed {
                error: error.into(),
                started_at,
            },
            now,
        );
    }

    /// Puts an interrupted job back in line.
    pub fn requeue(&mut self, now: OffsetDateTime) {
        self.transition(ProcessingState::Queued, now);
    }

    fn transition(&mut self, state: ProcessingState, now: OffsetDateTime) {
        self.processing.state = state;
        self.processing.updated_at = now;
    }
}

/// Flat row layout of `elevator_pitches`.
#[derive(Debug, Clone, FromRow)]
pub struct PitchRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub raw_key: Option<String>,
    pub raw_bucket: Option<String>,
    pub hls_url: Option<String>,
    pub encryption_key_url: Option<String>,
    pub duration_seconds: Option<f64>,
    pub container_format: Option<String>,
    pub video_codec: Option<String>,
    pub rotation_degrees: Option<i16>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub processing_state: String,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub retries: i32,
    pub error: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub status: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<PitchRow> for PitchRecord {
    type Error = PitchError;

    fn try_from(row: PitchRow) -> Result<Self, Self::Error> {
        let missing = |field: &str| {
            PitchError::Internal(format!(
                "pitch {} is {} without {}",
                row.id, row.processing_state, field
            ))
        };

        let state = match row.processing_state.as_str() {
            "pending" => ProcessingState::Pending,
            "queued" => ProcessingState::Queued,
            "processing" => ProcessingState::Processing {
                started_at: row.started_at.ok_or_else(|| missing("started_at"))?,
            },
            "ready" => ProcessingState::Ready {
                started_at: row.started_at.ok_or_else(|| missing("started_at"))?,
                completed_at: row.completed_at.ok_or_else(|| missing("completed_at"))?,
            },
            "failed" => ProcessingState::Failed {
                error: row.error.clone().unwrap_or_default(),
                started_at: row.started_at,
            },
            other => {
                return Err(PitchError::Internal(format!(
                    "unknown processing state '{}'",
                    other
                )));
            }
        };

        let metadata = match (row.duration_seconds, row.video_codec.clone()) {
            (Some(duration_seconds), Some(video_codec)) => Some(VideoMetadata {
                duration_seconds,
                container_format: row.container_format.clone().unwrap_or_default(),
                video_codec,
                rotation_degrees: row.rotation_degrees.unwrap_or(0) as u16,
                width: row.width.map(|w| w as u32),
                height: row.height.map(|h| h as u32),
            }),
            _ => None,
        };

        Ok(PitchRecord {
            id: row.id,
            owner_id: row.owner_id,
            video: PitchVideo {
                raw_key: row.raw_key,
                raw_bucket: row.raw_bucket,
                hls_url: row.hls_url,
                encryption_key_url: row.encryption_key_url,
            },
            metadata,
            processing: Processing {
                state,
                updated_at: row.updated_at,
                retries: row.retries,
                file_name: row.file_name,
                file_size: row.file_size,
            },
            status: PitchStatus::try_from(row.status.as_str())?,
            created_at: row.created_at,
        })
    }
}
