use chrono::Utc;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::common::error::{PitchError, PitchResult};
use crate::modules::pitch::events::TranscodeJob;
use crate::modules::pitch::model::{PitchRecord, ProcessingState};
use crate::modules::pitch::repository::PitchRepository;
use crate::workers::queue::TranscodeQueue;

/// Re-enqueues records whose in-memory job has been lost.
#[derive(Clone)]
pub struct Reconciler {
    pitches: Arc<dyn PitchRepository>,
    queue: TranscodeQueue,
    stale_after: Duration,
}

impl Reconciler {
    pub fn new(pitches: Arc<dyn PitchRepository>, queue: TranscodeQueue, stale_after: Duration) -> Self {
        Self {
            pitches,
            queue,
            stale_after,
        }
    }

    /// Run once before the worker starts. Every `queued` record lost its job
    /// with the previous process, and `processing` ones were interrupted.
    pub async fn recover_on_startup(&self) -> PitchResult<usize> {
        let now = OffsetDateTime::now_utc();
        let waiting = self.pitches.list_in_state("queued", now).await?;
        let interrupted = self.pitches.list_in_state("processing", now).await?;
        let mut count = 0;

        for record in &waiting {
            count += self.resubmit(record)?;
        }
        for mut record in interrupted {
            record.requeue(now);
            self.pitches.save(&record).await?;
            count += self.resubmit(&record)?;
        }

        Ok(count)
    }

    /// Resubmits `queued` records that have waited longer than the stale
    /// threshold. Sources whose job is still waiting in the queue are left
    /// alone; anything else that slips through is dropped by the worker.
    pub async fn sweep(&self) -> PitchResult<usize> {
        let cutoff = OffsetDateTime::now_utc() - self.stale_after;
        let mut count = 0;
        for record in self.pitches.list_in_state("queued", cutoff).await? {
            count += self.resubmit(&record)?;
        }
        Ok(count)
    }

    fn resubmit(&self, record: &PitchRecord) -> PitchResult<usize> {
        if record.processing.state != ProcessingState::Queued {
            return Ok(0);
        }
        let Some(source_key) = record.video.raw_key.clone() else {
            warn!(owner_id = %record.owner_id, "queued pitch has no raw upload, skipping");
            return Ok(0);
        };

        let queued = self.queue.enqueue(TranscodeJob {
            owner_id: record.owner_id,
            source_key,
            file_name: record.processing.file_name.clone(),
            file_size: record.processing.file_size,
        })?;
        Ok(usize::from(queued))
    }
}

pub fn parse_schedule(expression: &str) -> PitchResult<Schedule> {
    Schedule::from_str(expression)
        .map_err(|e| PitchError::Internal(format!("invalid reconcile schedule '{}': {}", expression, e)))
}

pub async fn start_reconciler(reconciler: Reconciler, schedule: Schedule) {
    info!("🧹 Starting pitch reconciler");

    for next in schedule.upcoming(Utc) {
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;

        match reconciler.sweep().await {
            Ok(0) => {}
            Ok(n) => info!("🧹 Re-enqueued {} stale pitch jobs", n),
            Err(e) => error!("❌ Reconcile sweep failed: {}", e),
        }
    }
}
