use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::dto::{
    CompleteUploadRequest, CompleteUploadResponse, PitchResponse, UploadUrlRequest,
    UploadUrlResponse,
};
use super::entitlement::{EntitlementPolicy, EntitlementSource};
use super::events::{Notifier, PitchNotification, TranscodeJob};
use super::keys;
use super::model::PitchRecord;
use super::repository::PitchRepository;
use super::stream::can_view;
use crate::common::error::{PitchError, PitchResult};
use crate::infrastructure::storage::{ObjectStore, PROBE_GET_TTL, SIGNED_PUT_TTL};
use crate::media::{MediaInspector, VideoMetadata};
use crate::middleware::auth::CurrentUser;
use crate::workers::queue::TranscodeQueue;

fn validation_error(e: validator::ValidationErrors) -> PitchError {
    PitchError::Validation(e.to_string())
}

/// Upload lifecycle of elevator pitches: signed upload, finalize, read, delete.
#[derive(Clone)]
pub struct PitchService {
    pitches: Arc<dyn PitchRepository>,
    storage: Arc<dyn ObjectStore>,
    inspector: Arc<dyn MediaInspector>,
    entitlements: Arc<dyn EntitlementSource>,
    notifier: Arc<dyn Notifier>,
    queue: TranscodeQueue,
    policy: EntitlementPolicy,
}

impl PitchService {
    pub fn new(
        pitches: Arc<dyn PitchRepository>,
        storage: Arc<dyn ObjectStore>,
        inspector: Arc<dyn MediaInspector>,
        entitlements: Arc<dyn EntitlementSource>,
        notifier: Arc<dyn Notifier>,
        queue: TranscodeQueue,
        policy: EntitlementPolicy,
    ) -> Self {
        Self {
            pitches,
            storage,
            inspector,
            entitlements,
            notifier,
            queue,
            policy,
        }
    }

    /// Issues a signed PUT URL for a new raw upload, replacing any existing
    /// pitch of the owner.
    pub async fn request_upload_url(
        &self,
        owner_id: Uuid,
        req: UploadUrlRequest,
    ) -> PitchResult<UploadUrlResponse> {
        req.validate().map_err(validation_error)?;

        let mime_type = req.mime_type.trim().to_ascii_lowercase();
        if !mime_type.starts_with("video/") {
            return Err(PitchError::Validation(
                "Only video files can be uploaded as an elevator pitch".to_string(),
            ));
        }

        if let Some(existing) = self.pitches.find_by_owner(owner_id).await? {
            info!(owner_id = %owner_id, pitch_id = %existing.id, "replacing existing elevator pitch");
            self.purge_artifacts(&existing).await?;
            self.pitches.delete_by_owner(owner_id).await?;
        }

        let now = OffsetDateTime::now_utc();
        let file_name = keys::upload_file_name(&req.file_name, &mime_type);
        let file_key = keys::source_key(owner_id, now, &keys::random_token(), &file_name);

        let upload_url = self
            .storage
            .presign_put(&file_key, &mime_type, SIGNED_PUT_TTL)
            .await?;

        let record = PitchRecord::new_pending(
            owner_id,
            file_key.clone(),
            self.storage.bucket().to_string(),
            req.file_name,
            req.file_size,
            now,
        );
        self.pitches.insert(&record).await?;

        Ok(UploadUrlResponse {
            upload_url,
            file_key,
            expires_in: SIGNED_PUT_TTL.as_secs(),
        })
    }

    /// Probes the uploaded object, checks the owner's allowance and queues
    /// the pitch for transcoding. Rejected uploads are removed from storage.
    pub async fn finalize_upload(
        &self,
        owner_id: Uuid,
        req: CompleteUploadRequest,
    ) -> PitchResult<CompleteUploadResponse> {
        req.validate().map_err(validation_error)?;

        let mut record = self
            .pitches
            .find_by_owner(owner_id)
            .await?
            .ok_or_else(|| PitchError::NotFound("No elevator pitch upload was requested".to_string()))?;

        if record.is_playable() {
            return Err(PitchError::Conflict(
                "Elevator pitch is already processed; request a new upload URL to replace it"
                    .to_string(),
            ));
        }
        if !req.file_key.starts_with(&keys::source_prefix(owner_id)) || req.file_key.contains("..") {
            return Err(PitchError::Validation(
                "fileKey does not belong to this user".to_string(),
            ));
        }

        record.accept_upload(
            req.file_key.clone(),
            req.file_name.clone(),
            req.file_size,
            OffsetDateTime::now_utc(),
        );
        self.pitches.save(&record).await?;

        let metadata = match self.inspect_upload(owner_id, &req.file_key).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(owner_id = %owner_id, "elevator pitch rejected: {}", e);
                record.fail(e.to_string(), OffsetDateTime::now_utc());
                if let Err(save_err) = self.pitches.save(&record).await {
                    warn!(owner_id = %owner_id, "failed to record rejection: {}", save_err);
                }
                self.discard_upload(owner_id, &req.file_key).await;
                return Err(e);
            }
        };

        record.enqueue(metadata.clone(), OffsetDateTime::now_utc());
        self.pitches.save(&record).await?;

        self.queue.enqueue(TranscodeJob {
            owner_id,
            source_key: req.file_key,
            file_name: record.processing.file_name.clone(),
            file_size: record.processing.file_size,
        })?;
        info!(owner_id = %owner_id, duration = metadata.duration_seconds, "elevator pitch queued");

        Ok(CompleteUploadResponse {
            pitch_id: record.id,
            state: record.processing.state.as_str().to_string(),
            metadata,
        })
    }

    /// The owner's pitch, or `None` when it does not exist or `viewer` may
    /// not see it.
    pub async fn get_pitch(
        &self,
        owner_id: Uuid,
        viewer: CurrentUser,
    ) -> PitchResult<Option<PitchResponse>> {
        Ok(self
            .pitches
            .find_by_owner(owner_id)
            .await?
            .filter(|record| can_view(record, viewer))
            .map(PitchResponse::from))
    }

    /// Removes the pitch of `owner_id` and every stored artifact. The owner
    /// is notified when someone else removed it.
    pub async fn delete_pitch(&self, owner_id: Uuid, requested_by: CurrentUser) -> PitchResult<()> {
        if requested_by.id != owner_id && !requested_by.is_privileged() {
            return Err(PitchError::Forbidden(
                "You cannot delete another user's elevator pitch".to_string(),
            ));
        }

        let record = self
            .pitches
            .find_by_owner(owner_id)
            .await?
            .ok_or_else(|| PitchError::NotFound("Elevator pitch not found".to_string()))?;

        self.purge_artifacts(&record).await?;
        self.pitches.delete_by_owner(owner_id).await?;
        info!(owner_id = %owner_id, deleted_by = %requested_by.id, "elevator pitch deleted");

        if requested_by.id != owner_id {
            if let Err(e) = self
                .notifier
                .notify(PitchNotification::removed_by_moderator(owner_id))
                .await
            {
                warn!(owner_id = %owner_id, "failed to notify owner of removal: {}", e);
            }
        }
        Ok(())
    }

    async fn inspect_upload(&self, owner_id: Uuid, file_key: &str) -> PitchResult<VideoMetadata> {
        let signed = self.storage.presign_get(file_key, PROBE_GET_TTL).await?;
        let metadata = self.inspector.probe(&signed).await?;
        let entitlement = self.entitlements.lookup(owner_id).await?;
        self.policy.validate(&entitlement, metadata.duration_seconds)?;
        Ok(metadata)
    }

    async fn purge_artifacts(&self, record: &PitchRecord) -> PitchResult<()> {
        let removed = self
            .storage
            .delete_prefix(&keys::hls_root(record.owner_id))
            .await?;
        if let Some(raw_key) = &record.video.raw_key {
            self.storage.delete_object(raw_key).await?;
        }
        info!(owner_id = %record.owner_id, hls_objects = removed, "removed elevator pitch artifacts");
        Ok(())
    }

    async fn discard_upload(&self, owner_id: Uuid, file_key: &str) {
        if let Err(e) = self.storage.delete_object(file_key).await {
            warn!(owner_id = %owner_id, "failed to remove rejected upload: {}", e);
        }
        if let Err(e) = self.storage.delete_prefix(&keys::hls_root(owner_id)).await {
            warn!(owner_id = %owner_id, "failed to remove stale HLS output: {}", e);
        }
    }
}
