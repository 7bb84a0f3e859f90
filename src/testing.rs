//! In-memory doubles for the pipeline's collaborators.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::common::error::{PitchError, PitchResult};
use crate::infrastructure::storage::{ObjectStore, ObjectStream, content_type_for};
use crate::media::hls::{KEY_FILE_NAME, MASTER_PLAYLIST, master_playlist};
use crate::media::renditions::{DEFAULT_LADDER, plan_renditions};
use crate::media::{HlsOutput, MediaInspector, TranscodeRequest, Transcoder, VideoMetadata};
use crate::middleware::role::Role;
use crate::modules::pitch::entitlement::{Entitlement, EntitlementSource, Subscription};
use crate::modules::pitch::events::{Notifier, PitchNotification};
use crate::modules::pitch::model::PitchRecord;
use crate::modules::pitch::repository::PitchRepository;

pub const STORE_BASE: &str = "http://storage.test/videos";

pub fn metadata(duration_seconds: f64) -> VideoMetadata {
    VideoMetadata {
        duration_seconds,
        container_format: "mov,mp4,m4a,3gp,3g2,mj2".into(),
        video_codec: "h264".into(),
        rotation_degrees: 0,
        width: Some(640),
        height: Some(360),
    }
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, (Vec<u8>, String)>>,
    calls: AtomicUsize,
    public: bool,
}

impl MemoryStore {
    pub fn public() -> Self {
        Self {
            public: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, key: &str, data: impl Into<Vec<u8>>) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            (data.into(), content_type_for(key).to_string()),
        );
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects.lock().unwrap().get(key).map(|(_, ct)| ct.clone())
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(data, _)| String::from_utf8_lossy(data).into_owned())
    }

    /// Number of trait calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn read(&self, key: &str) -> PitchResult<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| PitchError::Storage(format!("NoSuchKey: {}", key)))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        "videos"
    }

    fn is_public(&self) -> bool {
        self.public
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", STORE_BASE, key)
    }

    async fn presign_put(
        &self,
        key: &str,
        _content_type: &str,
        expires_in: Duration,
    ) -> PitchResult<String> {
        self.touch();
        Ok(format!(
            "{}?X-Amz-Expires={}&X-Amz-Signature=put",
            self.object_url(key),
            expires_in.as_secs()
        ))
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> PitchResult<String> {
        self.touch();
        Ok(format!(
            "{}?X-Amz-Expires={}&X-Amz-Signature=get",
            self.object_url(key),
            expires_in.as_secs()
        ))
    }

    async fn download_to(&self, key: &str, dest: &Path) -> PitchResult<u64> {
        self.touch();
        let data = self.read(key)?;
        tokio::fs::write(dest, &data).await?;
        Ok(data.len() as u64)
    }

    async fn get_object(&self, key: &str) -> PitchResult<ObjectStream> {
        self.touch();
        Ok(ObjectStream::from_bytes(Bytes::from(self.read(key)?)))
    }

    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> PitchResult<()> {
        self.touch();
        let data = tokio::fs::read(path).await?;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> PitchResult<()> {
        self.touch();
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> PitchResult<usize> {
        self.touch();
        let mut objects = self.objects.lock().unwrap();
        let before = objects.len();
        objects.retain(|key, _| !key.starts_with(prefix));
        Ok(before - objects.len())
    }
}

#[derive(Default)]
pub struct MemoryPitches {
    records: Mutex<HashMap<Uuid, PitchRecord>>,
}

impl MemoryPitches {
    pub fn get(&self, owner_id: Uuid) -> Option<PitchRecord> {
        self.records.lock().unwrap().get(&owner_id).cloned()
    }

    pub fn put(&self, record: PitchRecord) {
        self.records.lock().unwrap().insert(record.owner_id, record);
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl PitchRepository for MemoryPitches {
    async fn find_by_owner(&self, owner_id: Uuid) -> PitchResult<Option<PitchRecord>> {
        Ok(self.get(owner_id))
    }

    async fn find_by_id(&self, id: Uuid) -> PitchResult<Option<PitchRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn insert(&self, record: &PitchRecord) -> PitchResult<()> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&record.owner_id) {
            return Err(PitchError::Conflict("duplicate owner".into()));
        }
        records.insert(record.owner_id, record.clone());
        Ok(())
    }

    async fn save(&self, record: &PitchRecord) -> PitchResult<()> {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(&record.owner_id) {
            Some(existing) if existing.id == record.id => {
                *existing = record.clone();
                Ok(())
            }
            _ => Err(PitchError::NotFound(format!("pitch {}", record.id))),
        }
    }

    async fn delete_by_owner(&self, owner_id: Uuid) -> PitchResult<bool> {
        Ok(self.records.lock().unwrap().remove(&owner_id).is_some())
    }

    async fn list_in_state(
        &self,
        state: &str,
        before: OffsetDateTime,
    ) -> PitchResult<Vec<PitchRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.processing.state.as_str() == state && r.processing.updated_at <= before)
            .cloned()
            .collect())
    }
}

/// Returns fixed metadata and remembers every probed source.
pub struct StubInspector {
    result: Result<VideoMetadata, String>,
    probed: Mutex<Vec<String>>,
}

impl StubInspector {
    pub fn returning(metadata: VideoMetadata) -> Self {
        Self {
            result: Ok(metadata),
            probed: Mutex::default(),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            probed: Mutex::default(),
        }
    }

    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaInspector for StubInspector {
    async fn probe(&self, source: &str) -> PitchResult<VideoMetadata> {
        self.probed.lock().unwrap().push(source.to_string());
        self.result.clone().map_err(PitchError::Transcode)
    }
}

pub struct StubEntitlements(pub Entitlement);

impl StubEntitlements {
    pub fn free_candidate() -> Self {
        Self(Entitlement {
            role: Some(Role::Candidate),
            subscription: None,
        })
    }

    pub fn subscribed_candidate(seconds: u32) -> Self {
        Self(Entitlement {
            role: Some(Role::Candidate),
            subscription: Some(Subscription {
                plan: "pro".into(),
                pitch_duration_seconds: seconds,
            }),
        })
    }

    pub fn employer() -> Self {
        Self(Entitlement {
            role: Some(Role::Employer),
            subscription: None,
        })
    }
}

#[async_trait]
impl EntitlementSource for StubEntitlements {
    async fn lookup(&self, _owner_id: Uuid) -> PitchResult<Entitlement> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<PitchNotification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<PitchNotification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: PitchNotification) -> PitchResult<()> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

/// Writes a small encrypted-looking HLS tree straight into a [`MemoryStore`].
pub struct FakeTranscoder {
    store: std::sync::Arc<MemoryStore>,
    delay: Duration,
    fail_with: Option<String>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    runs: AtomicUsize,
}

impl FakeTranscoder {
    pub fn new(store: std::sync::Arc<MemoryStore>) -> Self {
        Self {
            store,
            delay: Duration::ZERO,
            fail_with: None,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    /// Highest number of overlapping runs observed.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(&self, request: TranscodeRequest<'_>) -> PitchResult<HlsOutput> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = match &self.fail_with {
            Some(message) => Err(PitchError::Transcode(message.clone())),
            None => {
                let renditions = plan_renditions(&DEFAULT_LADDER, request.metadata);
                let mut entries = vec![
                    (MASTER_PLAYLIST.to_string(), master_playlist(&renditions)),
                    (KEY_FILE_NAME.to_string(), "0123456789abcdef".to_string()),
                ];
                for r in &renditions {
                    let segment = format!("{}_000.ts", r.profile.name);
                    entries.push((
                        r.playlist_name(),
                        format!(
                            "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"https://api.test/key\"\n#EXTINF:8.0,\n{}\n#EXT-X-ENDLIST\n",
                            segment
                        ),
                    ));
                    entries.push((segment, "segment".to_string()));
                }

                let mut files = HashMap::new();
                for (name, body) in entries {
                    let key = format!("{}{}", request.dest_prefix, name);
                    self.store.insert(&key, body);
                    files.insert(name, self.store.object_url(&key));
                }
                Ok(HlsOutput { files, renditions })
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
