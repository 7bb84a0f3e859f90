use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::common::error::PitchResult;
use crate::infrastructure::storage::ObjectStore;
use crate::media::{MediaInspector, TranscodeRequest, Transcoder, VideoMetadata};
use crate::modules::pitch::entitlement::{EntitlementPolicy, EntitlementSource};
use crate::modules::pitch::events::TranscodeJob;
use crate::modules::pitch::keys;
use crate::modules::pitch::model::{PitchRecord, ProcessingState};
use crate::modules::pitch::repository::PitchRepository;
use crate::workers::queue::JobReceiver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Skipped(&'static str),
}

struct Packaged {
    hls_url: String,
    key_url: String,
    metadata: VideoMetadata,
}

/// Runs one transcode job at a time against the pitch store.
#[derive(Clone)]
pub struct TranscodeWorker {
    pitches: Arc<dyn PitchRepository>,
    storage: Arc<dyn ObjectStore>,
    inspector: Arc<dyn MediaInspector>,
    transcoder: Arc<dyn Transcoder>,
    entitlements: Arc<dyn EntitlementSource>,
    policy: EntitlementPolicy,
    work_dir: PathBuf,
}

impl TranscodeWorker {
    pub fn new(
        pitches: Arc<dyn PitchRepository>,
        storage: Arc<dyn ObjectStore>,
        inspector: Arc<dyn MediaInspector>,
        transcoder: Arc<dyn Transcoder>,
        entitlements: Arc<dyn EntitlementSource>,
        policy: EntitlementPolicy,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pitches,
            storage,
            inspector,
            transcoder,
            entitlements,
            policy,
            work_dir: work_dir.into(),
        }
    }

    pub async fn process_job(&self, job: &TranscodeJob) -> PitchResult<JobOutcome> {
        let Some(mut record) = self.pitches.find_by_owner(job.owner_id).await? else {
            return Ok(JobOutcome::Skipped("pitch no longer exists"));
        };
        if record.video.raw_key.as_deref() != Some(job.source_key.as_str()) {
            return Ok(JobOutcome::Skipped("pitch was replaced by a newer upload"));
        }
        if record.processing.state != ProcessingState::Queued {
            return Ok(JobOutcome::Skipped("pitch is not queued"));
        }

        let started_at = OffsetDateTime::now_utc();
        record.start_processing(started_at);
        self.pitches.save(&record).await?;

        match self.package(job, started_at).await {
            Ok(packaged) => {
                record.complete(
                    packaged.hls_url,
                    packaged.key_url,
                    packaged.metadata,
                    OffsetDateTime::now_utc(),
                );
                if let Err(e) = self.pitches.save(&record).await {
                    self.mark_failed(&mut record, &e.to_string()).await;
                    return Err(e);
                }
                Ok(JobOutcome::Completed)
            }
            Err(e) => {
                self.mark_failed(&mut record, &e.to_string()).await;
                self.discard_partial_output(job, started_at).await;
                Err(e)
            }
        }
    }

    /// Download, inspect, check entitlement, transcode. The scratch
    /// directory is removed whatever the outcome.
    async fn package(&self, job: &TranscodeJob, started_at: OffsetDateTime) -> PitchResult<Packaged> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}-{}-", job.owner_id, started_at.unix_timestamp()))
            .tempdir_in(&self.work_dir)?;

        let result = self.package_in(job, started_at, scratch.path()).await;

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(path = %scratch_path.display(), "⚠️ Failed to remove scratch directory: {}", e);
        }
        result
    }

    async fn package_in(
        &self,
        job: &TranscodeJob,
        started_at: OffsetDateTime,
        scratch: &Path,
    ) -> PitchResult<Packaged> {
        let source = scratch.join(source_file_name(&job.source_key));

        info!("⬇️ Downloading source: {}", job.source_key);
        let bytes = self.storage.download_to(&job.source_key, &source).await?;
        info!("⬇️ Downloaded {} bytes", bytes);

        let metadata = self.inspector.probe(&source.to_string_lossy()).await?;
        let entitlement = self.entitlements.lookup(job.owner_id).await?;
        self.policy.validate(&entitlement, metadata.duration_seconds)?;

        let dest_prefix = keys::hls_prefix(job.owner_id, started_at);
        let output_dir = scratch.join("hls");
        let output = self
            .transcoder
            .transcode(TranscodeRequest {
                source: &source,
                output_dir: &output_dir,
                owner_id: job.owner_id,
                dest_prefix: &dest_prefix,
                metadata: &metadata,
            })
            .await?;

        info!(
            owner_id = %job.owner_id,
            renditions = output.renditions.len(),
            "📼 Packaged {} files under {}",
            output.files.len(),
            dest_prefix
        );

        Ok(Packaged {
            hls_url: output.master_url()?.to_string(),
            key_url: output.key_url()?.to_string(),
            metadata,
        })
    }

    async fn mark_failed(&self, record: &mut PitchRecord, message: &str) {
        record.fail(message, OffsetDateTime::now_utc());
        if let Err(e) = self.pitches.save(record).await {
            error!(owner_id = %record.owner_id, "❌ Failed to record transcode failure: {}", e);
        }
    }

    /// Removes whatever this run uploaded. The raw upload stays until the
    /// owner replaces or deletes the pitch.
    async fn discard_partial_output(&self, job: &TranscodeJob, started_at: OffsetDateTime) {
        let prefix = keys::hls_prefix(job.owner_id, started_at);
        if let Err(e) = self.storage.delete_prefix(&prefix).await {
            warn!(owner_id = %job.owner_id, "⚠️ Failed to remove partial output {}: {}", prefix, e);
        }
    }
}

fn source_file_name(source_key: &str) -> String {
    match Path::new(source_key).extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("source.{}", ext),
        None => "source".to_string(),
    }
}

/// Consumes jobs one at a time until the queue is closed.
pub async fn start_transcoder_worker(worker: TranscodeWorker, jobs: JobReceiver) {
    info!("🎥 Starting Transcoder Worker...");

    while let Some(job) = jobs.recv().await {
        info!(owner_id = %job.owner_id, pending = jobs.len(), "📦 Received transcoding job");

        let runner = worker.clone();
        let task_job = job.clone();
        let handle = tokio::spawn(async move { runner.process_job(&task_job).await });

        match handle.await {
            Ok(Ok(JobOutcome::Completed)) => info!("✅ Job completed successfully: {:?}", job),
            Ok(Ok(JobOutcome::Skipped(reason))) => {
                warn!(owner_id = %job.owner_id, "⏭️ Skipped transcoding job: {}", reason)
            }
            Ok(Err(e)) if e.is_client_error() => {
                warn!(owner_id = %job.owner_id, "⛔ Pitch rejected during transcoding: {}", e)
            }
            Ok(Err(e)) => error!("❌ Failed to process job {:?}: {}", job, e),
            Err(e) => error!("❌ Transcoding job {:?} aborted: {}", job, e),
        }
    }

    info!("🎥 Transcoder Worker stopped");
}
