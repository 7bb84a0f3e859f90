use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::common::error::{PitchError, PitchResult};
use crate::infrastructure::redis::client::RedisService;

/// In-process work item for the transcode worker. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeJob {
    pub owner_id: Uuid,
    pub source_key: String,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
}

/// Event delivered to a user by the notification service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchNotification {
    pub user_id: Uuid,
    pub kind: String,
    pub message: String,
}

impl PitchNotification {
    pub fn removed_by_moderator(owner_id: Uuid) -> Self {
        Self {
            user_id: owner_id,
            kind: "elevator_pitch_removed".to_string(),
            message: "Your elevator pitch was removed by an administrator.".to_string(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: PitchNotification) -> PitchResult<()>;
}

pub const NOTIFICATION_CHANNEL: &str = "notifications";

/// Publishes notifications on a Redis channel consumed by the socket service.
#[derive(Clone)]
pub struct RedisNotifier {
    redis: RedisService,
}

impl RedisNotifier {
    pub fn new(redis: RedisService) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    async fn notify(&self, notification: PitchNotification) -> PitchResult<()> {
        let payload = serde_json::to_string(&notification)
            .map_err(|e| PitchError::Internal(format!("failed to encode notification: {}", e)))?;

        self.redis
            .publish(NOTIFICATION_CHANNEL, &payload)
            .await
            .map_err(|e| PitchError::Internal(format!("failed to publish notification: {}", e)))?;

        debug!(user_id = %notification.user_id, kind = %notification.kind, "published notification");
        Ok(())
    }
}
