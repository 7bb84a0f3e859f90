use bytes::Bytes;
use futures_util::TryStreamExt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::model::{PitchRecord, PitchStatus};
use super::repository::PitchRepository;
use crate::common::error::{PitchError, PitchResult};
use crate::infrastructure::storage::{
    HLS_MIME, ObjectStore, ObjectStream, content_type_for, file_name_of, parent_prefix,
};
use crate::middleware::auth::CurrentUser;

pub const ROUTE_PREFIX: &str = "/api/v1/elevator-pitch";

/// Master playlist as served to the player.
#[derive(Debug)]
pub enum MasterPlaylist {
    Rewritten(String),
    /// Public bucket: the player may read the stored playlist directly.
    Redirect(String),
}

#[derive(Debug)]
pub struct StreamedAsset {
    pub content_type: &'static str,
    pub stream: ObjectStream,
}

/// Serves packaged HLS through the API so raw storage URLs never reach clients.
#[derive(Clone)]
pub struct StreamService {
    pitches: Arc<dyn PitchRepository>,
    storage: Arc<dyn ObjectStore>,
}

impl StreamService {
    pub fn new(pitches: Arc<dyn PitchRepository>, storage: Arc<dyn ObjectStore>) -> Self {
        Self { pitches, storage }
    }

    pub async fn master_playlist(
        &self,
        pitch_id: Uuid,
        viewer: CurrentUser,
    ) -> PitchResult<MasterPlaylist> {
        let record = self
            .pitches
            .find_by_id(pitch_id)
            .await?
            .ok_or_else(not_found)?;
        let hls_url = playable_hls_url(&record, viewer)?;

        if self.storage.is_public() {
            return Ok(MasterPlaylist::Redirect(hls_url.to_string()));
        }

        let key = self.storage.key_from_url(hls_url).ok_or_else(not_found)?;
        let text = self.read_text(&key).await?;
        Ok(MasterPlaylist::Rewritten(rewrite_playlist(
            &text,
            &segment_base(record.owner_id),
        )))
    }

    /// Streams a sub-playlist or segment from the directory of the master
    /// playlist. Sub-playlists are rewritten like the master.
    pub async fn segment(
        &self,
        owner_id: Uuid,
        segment: &str,
        viewer: CurrentUser,
    ) -> PitchResult<StreamedAsset> {
        let segment = checked_asset_name(segment)?;

        let record = self
            .pitches
            .find_by_owner(owner_id)
            .await?
            .ok_or_else(not_found)?;
        let hls_url = playable_hls_url(&record, viewer)?;
        let master_key = self.storage.key_from_url(hls_url).ok_or_else(not_found)?;
        let key = format!("{}{}", parent_prefix(&master_key), segment);

        let content_type = content_type_for(segment);
        if content_type == HLS_MIME {
            let text = self.read_text(&key).await?;
            let rewritten = rewrite_playlist(&text, &segment_base(owner_id));
            return Ok(StreamedAsset {
                content_type,
                stream: ObjectStream::from_bytes(Bytes::from(rewritten)),
            });
        }

        let stream = self.storage.get_object(&key).await.map_err(|e| {
            debug!(key = %key, "segment unavailable: {}", e);
            not_found()
        })?;
        Ok(StreamedAsset {
            content_type,
            stream,
        })
    }

    /// Releases the AES-128 key, but only under the exact name recorded for
    /// the pitch.
    pub async fn encryption_key(
        &self,
        owner_id: Uuid,
        key_name: &str,
        viewer: CurrentUser,
    ) -> PitchResult<Bytes> {
        let key_name = checked_asset_name(key_name)?;

        let record = self
            .pitches
            .find_by_owner(owner_id)
            .await?
            .ok_or_else(not_found)?;
        playable_hls_url(&record, viewer)?;

        let key_url = record.video.encryption_key_url.as_deref().ok_or_else(not_found)?;
        if file_name_of(key_url) != key_name {
            return Err(not_found());
        }

        let key = self.storage.key_from_url(key_url).ok_or_else(not_found)?;
        let stream = self.storage.get_object(&key).await.map_err(|e| {
            warn!(owner_id = %owner_id, "encryption key unavailable: {}", e);
            not_found()
        })?;
        let chunks: Vec<Bytes> = stream.body.try_collect().await?;
        Ok(Bytes::from(chunks.concat()))
    }

    async fn read_text(&self, key: &str) -> PitchResult<String> {
        let stream = self.storage.get_object(key).await.map_err(|e| {
            debug!(key = %key, "playlist unavailable: {}", e);
            not_found()
        })?;
        stream.into_string().await
    }
}

fn not_found() -> PitchError {
    PitchError::NotFound("Elevator pitch not found".to_string())
}

/// Owners and privileged users always see a pitch; everyone else only when
/// it is active.
pub fn can_view(record: &PitchRecord, viewer: CurrentUser) -> bool {
    viewer.id == record.owner_id || viewer.is_privileged() || record.status == PitchStatus::Active
}

fn playable_hls_url(record: &PitchRecord, viewer: CurrentUser) -> PitchResult<&str> {
    if !can_view(record, viewer) {
        return Err(not_found());
    }
    if !record.is_ready() {
        return Err(PitchError::Conflict(format!(
            "Elevator pitch is not ready yet (state: {})",
            record.processing.state.as_str()
        )));
    }
    record.video.hls_url.as_deref().ok_or_else(not_found)
}

/// Accepts a single file name in `[A-Za-z0-9._-]`, never a path.
pub fn checked_asset_name(name: &str) -> PitchResult<&str> {
    let valid = !name.is_empty()
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(name)
    } else {
        Err(PitchError::Validation(format!("Invalid segment name '{}'", name)))
    }
}

pub fn segment_base(owner_id: Uuid) -> String {
    format!("{}/stream/{}", ROUTE_PREFIX, owner_id)
}

fn is_media_reference(line: &str) -> bool {
    let name = file_name_of(line);
    name.ends_with(".ts") || name.ends_with(".m3u8")
}

/// Points every segment and variant reference at the gateway under `base`.
/// Tags, comments and blank lines are kept as they are.
pub fn rewrite_playlist(text: &str, base: &str) -> String {
    text.split('\n')
        .map(|raw| {
            let line = raw.trim_end_matches('\r').trim();
            if line.is_empty() || line.starts_with('#') || !is_media_reference(line) {
                raw.to_string()
            } else {
                format!("{}/{}", base, file_name_of(line))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::hls;
    use crate::media::renditions::{DEFAULT_LADDER, plan_renditions};
    use crate::media::VideoMetadata;
    use crate::middleware::role::Role;
    use crate::modules::pitch::keys;
    use crate::testing::{MemoryPitches, MemoryStore, STORE_BASE, metadata};
    use time::OffsetDateTime;

    const MASTER: &str = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-STREAM-INF:BANDWIDTH=952000,RESOLUTION=640x360\n360p.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=1626000,RESOLUTION=854x480\nhttp://minio:9000/videos/elevator_pitches/u/hls/1/480p.m3u8?X-Amz-Signature=abc\n";

    struct Harness {
        service: StreamService,
        pitches: Arc<MemoryPitches>,
        store: Arc<MemoryStore>,
    }

    fn harness(store: MemoryStore) -> Harness {
        let pitches = Arc::new(MemoryPitches::default());
        let store = Arc::new(store);
        Harness {
            service: StreamService::new(pitches.clone(), store.clone()),
            pitches,
            store,
        }
    }

    fn ready_pitch(h: &Harness, owner: Uuid, active: bool) -> PitchRecord {
        let prefix = format!("{}1/", keys::hls_root(owner));
        h.store.insert(&format!("{}master.m3u8", prefix), MASTER);
        h.store.insert(
            &format!("{}360p.m3u8", prefix),
            "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"https://api.test/key\"\n#EXTINF:8.0,\n360p_000.ts\n",
        );
        h.store.insert(&format!("{}360p_000.ts", prefix), "segment-bytes");
        h.store.insert(&format!("{}encryption.key", prefix), "0123456789abcdef");

        let now = OffsetDateTime::now_utc();
        let mut record = PitchRecord::new_pending(
            owner,
            format!("{}1-a-clip.mp4", keys::source_prefix(owner)),
            "videos".into(),
            "clip.mp4".into(),
            None,
            now,
        );
        record.enqueue(metadata(20.0), now);
        record.start_processing(now);
        record.complete(
            format!("{}/{}master.m3u8", STORE_BASE, prefix),
            format!("{}/{}encryption.key", STORE_BASE, prefix),
            metadata(20.0),
            now,
        );
        if !active {
            record.status = PitchStatus::Deactivate;
        }
        h.pitches.put(record.clone());
        record
    }

    fn viewer(role: Role) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            role: Some(role),
        }
    }

    async fn body_text(asset: StreamedAsset) -> String {
        asset.stream.into_string().await.unwrap()
    }

    #[test]
    fn rewrite_points_every_reference_at_gateway() {
        let out = rewrite_playlist(MASTER, "/api/v1/elevator-pitch/stream/u");

        assert!(out.contains("\n/api/v1/elevator-pitch/stream/u/360p.m3u8\n"));
        assert!(out.contains("\n/api/v1/elevator-pitch/stream/u/480p.m3u8\n"));
        assert!(!out.contains("http://"));
        assert!(!out.contains("X-Amz"));
        assert!(out.starts_with("#EXTM3U\n#EXT-X-VERSION:3\n"));
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn packaged_master_playlist_rewrites_to_gateway_only() {
        let source = VideoMetadata {
            width: Some(1920),
            height: Some(1080),
            ..metadata(25.0)
        };
        let renditions = plan_renditions(&DEFAULT_LADDER, &source);
        let packaged = hls::master_playlist(&renditions);
        let base = "/api/v1/elevator-pitch/stream/u";

        let out = rewrite_playlist(&packaged, base);

        let mut proxied = 0;
        for (before, after) in packaged.lines().zip(out.lines()) {
            if before.is_empty() || before.starts_with('#') {
                assert_eq!(before, after);
            } else {
                assert_eq!(after, format!("{}/{}", base, before));
                proxied += 1;
            }
        }
        assert_eq!(proxied, renditions.len());
        assert_eq!(packaged.lines().count(), out.lines().count());
    }

    #[test]
    fn rewrite_keeps_tags_and_unrelated_lines() {
        let text = "#EXTM3U\r\n#EXT-X-KEY:METHOD=AES-128,URI=\"k\"\r\n\r\nnotes.txt\r\n720p_001.ts\r\n";
        let out = rewrite_playlist(text, "/base");
        assert!(out.contains("#EXT-X-KEY:METHOD=AES-128,URI=\"k\"\r\n"));
        assert!(out.contains("notes.txt\r\n"));
        assert!(out.contains("/base/720p_001.ts\n"));
    }

    #[test]
    fn asset_names_must_be_plain() {
        assert!(checked_asset_name("720p_001.ts").is_ok());
        assert!(checked_asset_name("encryption.key").is_ok());
        for bad in ["", "..", "../x.ts", "a/b.ts", "a\\b.ts", "seg%2F.ts"] {
            assert!(
                matches!(checked_asset_name(bad), Err(PitchError::Validation(_))),
                "{}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn master_playlist_is_rewritten_for_viewers() {
        let h = harness(MemoryStore::default());
        let owner = Uuid::new_v4();
        let record = ready_pitch(&h, owner, true);

        let playlist = h
            .service
            .master_playlist(record.id, viewer(Role::Employer))
            .await
            .unwrap();

        match playlist {
            MasterPlaylist::Rewritten(text) => {
                assert!(text.contains(&format!("/api/v1/elevator-pitch/stream/{}/360p.m3u8", owner)));
                assert!(!text.contains("minio"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn public_bucket_redirects_to_stored_playlist() {
        let h = harness(MemoryStore::public());
        let record = ready_pitch(&h, Uuid::new_v4(), true);

        let playlist = h
            .service
            .master_playlist(record.id, viewer(Role::Employer))
            .await
            .unwrap();

        match playlist {
            MasterPlaylist::Redirect(url) => assert!(url.ends_with("/master.m3u8")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn inactive_pitch_is_hidden_from_others() {
        let h = harness(MemoryStore::default());
        let owner = Uuid::new_v4();
        let record = ready_pitch(&h, owner, false);

        let err = h
            .service
            .master_playlist(record.id, viewer(Role::Employer))
            .await
            .unwrap_err();
        assert!(matches!(err, PitchError::NotFound(_)));

        let owner_view = CurrentUser {
            id: owner,
            role: Some(Role::Candidate),
        };
        assert!(h.service.master_playlist(record.id, owner_view).await.is_ok());
        assert!(h.service.master_playlist(record.id, viewer(Role::Admin)).await.is_ok());
    }

    #[tokio::test]
    async fn unfinished_pitch_is_a_conflict() {
        let h = harness(MemoryStore::default());
        let owner = Uuid::new_v4();
        let record = PitchRecord::new_pending(
            owner,
            "raw".into(),
            "videos".into(),
            "clip.mp4".into(),
            None,
            OffsetDateTime::now_utc(),
        );
        h.pitches.put(record.clone());

        let err = h
            .service
            .master_playlist(record.id, CurrentUser { id: owner, role: Some(Role::Candidate) })
            .await
            .unwrap_err();
        assert!(matches!(err, PitchError::Conflict(_)));
    }

    #[tokio::test]
    async fn segments_and_sub_playlists_stream_through() {
        let h = harness(MemoryStore::default());
        let owner = Uuid::new_v4();
        ready_pitch(&h, owner, true);

        let segment = h
            .service
            .segment(owner, "360p_000.ts", viewer(Role::Employer))
            .await
            .unwrap();
        assert_eq!(segment.content_type, "video/mp2t");
        assert_eq!(body_text(segment).await, "segment-bytes");

        let variant = h
            .service
            .segment(owner, "360p.m3u8", viewer(Role::Employer))
            .await
            .unwrap();
        assert_eq!(variant.content_type, HLS_MIME);
        let text = body_text(variant).await;
        assert!(text.contains(&format!("/api/v1/elevator-pitch/stream/{}/360p_000.ts", owner)));
        assert!(text.contains("#EXT-X-KEY:METHOD=AES-128"));

        let missing = h
            .service
            .segment(owner, "360p_999.ts", viewer(Role::Employer))
            .await
            .unwrap_err();
        assert!(matches!(missing, PitchError::NotFound(_)));
    }

    #[tokio::test]
    async fn traversal_is_rejected_before_storage() {
        let h = harness(MemoryStore::default());
        let owner = Uuid::new_v4();
        ready_pitch(&h, owner, true);

        let err = h
            .service
            .segment(owner, "../source/1-a-clip.mp4", viewer(Role::Admin))
            .await
            .unwrap_err();

        assert!(matches!(err, PitchError::Validation(_)));
        assert_eq!(h.store.calls(), 0);
    }

    #[tokio::test]
    async fn key_is_released_only_under_its_recorded_name() {
        let h = harness(MemoryStore::default());
        let owner = Uuid::new_v4();
        ready_pitch(&h, owner, true);

        let key = h
            .service
            .encryption_key(owner, "encryption.key", viewer(Role::Employer))
            .await
            .unwrap();
        assert_eq!(&key[..], b"0123456789abcdef");

        let err = h
            .service
            .encryption_key(owner, "other.key", viewer(Role::Employer))
            .await
            .unwrap_err();
        assert!(matches!(err, PitchError::NotFound(_)));
    }
}
