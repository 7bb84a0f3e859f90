use async_channel::{Receiver, Sender};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::common::error::{PitchError, PitchResult};
use crate::modules::pitch::events::TranscodeJob;

type PendingKeys = Arc<Mutex<HashSet<String>>>;

fn lock(pending: &PendingKeys) -> MutexGuard<'_, HashSet<String>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// FIFO handoff between the upload API and the transcode worker.
///
/// Jobs live only in memory; anything lost on restart is recovered by the
/// reconciler from the `queued` records in the database. A source key sits
/// in the queue at most once until the worker takes it.
#[derive(Clone)]
pub struct TranscodeQueue {
    sender: Sender<TranscodeJob>,
    pending: PendingKeys,
}

/// Worker side of a [`TranscodeQueue`].
pub struct JobReceiver {
    receiver: Receiver<TranscodeJob>,
    pending: PendingKeys,
}

impl TranscodeQueue {
    pub fn unbounded() -> (Self, JobReceiver) {
        let (sender, receiver) = async_channel::unbounded();
        let pending = PendingKeys::default();
        (
            Self {
                sender,
                pending: pending.clone(),
            },
            JobReceiver { receiver, pending },
        )
    }

    /// Returns `false` when a job for the same source is already waiting.
    pub fn enqueue(&self, job: TranscodeJob) -> PitchResult<bool> {
        let mut pending = lock(&self.pending);
        if pending.contains(&job.source_key) {
            debug!(owner_id = %job.owner_id, source_key = %job.source_key, "transcode job already waiting");
            return Ok(false);
        }

        debug!(owner_id = %job.owner_id, source_key = %job.source_key, "enqueue transcode job");
        let key = job.source_key.clone();
        self.sender
            .try_send(job)
            .map_err(|e| PitchError::Internal(format!("transcode queue unavailable: {}", e)))?;
        pending.insert(key);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }

    /// Stops accepting jobs; the worker drains what is left and exits.
    pub fn close(&self) -> bool {
        self.sender.close()
    }
}

impl JobReceiver {
    /// Next job, or `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<TranscodeJob> {
        let job = self.receiver.recv().await.ok()?;
        lock(&self.pending).remove(&job.source_key);
        Some(job)
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn job(n: u8) -> TranscodeJob {
        TranscodeJob {
            owner_id: Uuid::from_bytes([n; 16]),
            source_key: format!("elevator_pitches/{}/source/clip.mp4", n),
            file_name: None,
            file_size: None,
        }
    }

    #[tokio::test]
    async fn jobs_come_out_in_order() {
        let (queue, jobs) = TranscodeQueue::unbounded();
        assert!(queue.enqueue(job(1)).unwrap());
        assert!(queue.enqueue(job(2)).unwrap());
        assert_eq!(queue.len(), 2);

        assert_eq!(jobs.recv().await.unwrap(), job(1));
        assert_eq!(jobs.recv().await.unwrap(), job(2));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn waiting_source_is_queued_once_until_taken() {
        let (queue, jobs) = TranscodeQueue::unbounded();
        assert!(queue.enqueue(job(1)).unwrap());
        assert!(!queue.enqueue(job(1)).unwrap());
        assert_eq!(jobs.len(), 1);

        assert_eq!(jobs.recv().await.unwrap(), job(1));
        assert!(queue.enqueue(job(1)).unwrap());
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn closed_queue_rejects_jobs_and_ends_the_stream() {
        let (queue, jobs) = TranscodeQueue::unbounded();
        queue.enqueue(job(1)).unwrap();
        assert!(queue.close());

        assert!(matches!(queue.enqueue(job(2)), Err(PitchError::Internal(_))));
        assert_eq!(jobs.recv().await.unwrap(), job(1));
        assert!(jobs.recv().await.is_none());
    }
}
