use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{PitchRecord, PitchRow};
use crate::common::error::{PitchError, PitchResult};
use crate::infrastructure::db::pool::DbPool;

/// Persistence of pitch records, one per owner.
#[async_trait]
pub trait PitchRepository: Send + Sync {
    async fn find_by_owner(&self, owner_id: Uuid) -> PitchResult<Option<PitchRecord>>;

    async fn find_by_id(&self, id: Uuid) -> PitchResult<Option<PitchRecord>>;

    /// Fails with `Conflict` when the owner already has a record.
    async fn insert(&self, record: &PitchRecord) -> PitchResult<()>;

    /// Overwrites the stored record with the same id.
    async fn save(&self, record: &PitchRecord) -> PitchResult<()>;

    /// Returns whether a record was removed.
    async fn delete_by_owner(&self, owner_id: Uuid) -> PitchResult<bool>;

    /// Records in `state` last touched before `before`.
    async fn list_in_state(
        &self,
        state: &str,
        before: OffsetDateTime,
    ) -> PitchResult<Vec<PitchRecord>>;
}

const SELECT_PITCH: &str = r#"
    SELECT id, owner_id, raw_key, raw_bucket, hls_url, encryption_key_url,
           duration_seconds, container_format, video_codec, rotation_degrees, width, height,
           processing_state, started_at, completed_at, retries, error, file_name, file_size,
           status, created_at, updated_at
    FROM elevator_pitches
"#;

#[derive(Clone)]
pub struct PgPitchRepository {
    pool: DbPool,
}

impl PgPitchRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(&self, clause: &str, id: Uuid) -> PitchResult<Option<PitchRecord>> {
        let sql = format!("{} WHERE {} = $1", SELECT_PITCH, clause);
        let row = sqlx::query_as::<_, PitchRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(PitchRecord::try_from).transpose()
    }
}

#[async_trait]
impl PitchRepository for PgPitchRepository {
    async fn find_by_owner(&self, owner_id: Uuid) -> PitchResult<Option<PitchRecord>> {
        self.fetch_one_where("owner_id", owner_id).await
    }

    async fn find_by_id(&self, id: Uuid) -> PitchResult<Option<PitchRecord>> {
        self.fetch_one_where("id", id).await
    }

    async fn insert(&self, record: &PitchRecord) -> PitchResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO elevator_pitches (
                id, owner_id, raw_key, raw_bucket, processing_state, retries,
                file_name, file_size, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id)
        .bind(record.owner_id)
        .bind(&record.video.raw_key)
        .bind(&record.video.raw_bucket)
        .bind(record.processing.state.as_str())
        .bind(record.processing.retries)
        .bind(&record.processing.file_name)
        .bind(record.processing.file_size)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.processing.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(PitchError::Conflict(
                "an elevator pitch already exists for this user".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, record: &PitchRecord) -> PitchResult<()> {
        let metadata = record.metadata.as_ref();
        let state = &record.processing.state;

        let result = sqlx::query(
            r#"
            UPDATE elevator_pitches SET
                raw_key = $2, raw_bucket = $3, hls_url = $4, encryption_key_url = $5,
                duration_seconds = $6, container_format = $7, video_codec = $8,
                rotation_degrees = $9, width = $10, height = $11,
                processing_state = $12, started_at = $13, completed_at = $14,
                retries = $15, error = $16, file_name = $17, file_size = $18,
                status = $19, updated_at = $20
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(&record.video.raw_key)
        .bind(&record.video.raw_bucket)
        .bind(&record.video.hls_url)
        .bind(&record.video.encryption_key_url)
        .bind(metadata.map(|m| m.duration_seconds))
        .bind(metadata.map(|m| m.container_format.clone()))
        .bind(metadata.map(|m| m.video_codec.clone()))
        .bind(metadata.map(|m| m.rotation_degrees as i16))
        .bind(metadata.and_then(|m| m.width).map(|w| w as i32))
        .bind(metadata.and_then(|m| m.height).map(|h| h as i32))
        .bind(state.as_str())
        .bind(state.started_at())
        .bind(state.completed_at())
        .bind(record.processing.retries)
        .bind(state.error())
        .bind(&record.processing.file_name)
        .bind(record.processing.file_size)
        .bind(record.status.as_str())
        .bind(record.processing.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PitchError::NotFound(format!(
                "elevator pitch {} no longer exists",
                record.id
            )));
        }
        Ok(())
    }

    async fn delete_by_owner(&self, owner_id: Uuid) -> PitchResult<bool> {
        let result = sqlx::query("DELETE FROM elevator_pitches WHERE owner_id = $1")
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_in_state(
        &self,
        state: &str,
        before: OffsetDateTime,
    ) -> PitchResult<Vec<PitchRecord>> {
        let sql = format!(
            "{} WHERE processing_state = $1 AND updated_at <= $2 ORDER BY updated_at ASC",
            SELECT_PITCH
        );
        let rows = sqlx::query_as::<_, PitchRow>(&sql)
            .bind(state)
            .bind(before)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(PitchRecord::try_from).collect()
    }
}
