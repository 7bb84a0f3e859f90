use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::common::error::PitchResult;
use crate::infrastructure::storage::{ObjectStore, content_type_for};
use crate::media::renditions::PlannedRendition;

pub const MASTER_PLAYLIST: &str = "master.m3u8";
pub const KEY_FILE_NAME: &str = "encryption.key";
pub const KEY_INFO_FILE_NAME: &str = "encryption.key.info";
pub const SEGMENT_SECONDS: u32 = 8;
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;
pub const AUDIO_CHANNELS: u32 = 2;
pub const STREAM_CODECS: &str = "avc1.640029,mp4a.40.2";
const GOP_FRAMES: u32 = 48;

/// Static AES-128 key and IV for one packaged asset.
#[derive(Clone)]
pub struct EncryptionKey {
    pub key: [u8; 16],
    pub iv: [u8; 16],
}

impl EncryptionKey {
    pub fn generate() -> Self {
        Self {
            key: rand::random(),
            iv: rand::random(),
        }
    }

    pub fn iv_hex(&self) -> String {
        self.iv.iter().fold(String::with_capacity(32), |mut out, b| {
            let _ = write!(out, "{:02x}", b);
            out
        })
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey").finish_non_exhaustive()
    }
}

/// URL players fetch the key from; it never points at storage directly.
pub fn key_delivery_url(api_base_url: &str, owner_id: Uuid) -> String {
    format!(
        "{}/api/v1/elevator-pitch/key/{}/{}",
        api_base_url.trim_end_matches('/'),
        owner_id,
        KEY_FILE_NAME
    )
}

/// Writes the key file and the key-info descriptor consumed by the HLS muxer.
pub async fn write_key_material(
    output_dir: &Path,
    key: &EncryptionKey,
    key_url: &str,
) -> PitchResult<PathBuf> {
    let key_path = output_dir.join(KEY_FILE_NAME);
    let info_path = output_dir.join(KEY_INFO_FILE_NAME);

    tokio::fs::write(&key_path, key.key).await?;
    let info = format!("{}\n{}\n{}\n", key_url, key_path.display(), key.iv_hex());
    tokio::fs::write(&info_path, info).await?;

    Ok(info_path)
}

/// Filter applied once to turn rotated frames upright.
pub fn rotation_filter(rotation_degrees: u16) -> &'static str {
    match rotation_degrees {
        90 => "transpose=clock",
        180 => "hflip,vflip",
        270 => "transpose=cclock",
        _ => "null",
    }
}

/// Rotation, then one split branch per rendition scaled with lanczos.
pub fn filter_graph(rotation_degrees: u16, renditions: &[PlannedRendition]) -> String {
    let mut graph = format!(
        "[0:v:0]{},split={}",
        rotation_filter(rotation_degrees),
        renditions.len()
    );
    for i in 0..renditions.len() {
        let _ = write!(graph, "[s{}]", i);
    }
    for (i, r) in renditions.iter().enumerate() {
        let _ = write!(
            graph,
            ";[s{i}]scale={}:{}:flags=lanczos,format=yuv420p[v{i}]",
            r.width, r.height
        );
    }
    graph
}

/// Arguments for a single encoder invocation emitting every rendition.
pub fn encoder_args(
    source: &Path,
    output_dir: &Path,
    key_info_path: &Path,
    rotation_degrees: u16,
    renditions: &[PlannedRendition],
) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-nostdin",
        "-y",
        "-loglevel",
        "warning",
        "-noautorotate",
        "-i",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(source.display().to_string());
    args.push("-filter_complex".into());
    args.push(filter_graph(rotation_degrees, renditions));

    for (i, r) in renditions.iter().enumerate() {
        let p = &r.profile;
        let segment_path = output_dir.join(r.segment_pattern());
        let playlist_path = output_dir.join(r.playlist_name());
        args.extend([
            "-map".to_string(),
            format!("[v{}]", i),
            "-map".into(),
            "0:a:0?".into(),
            "-c:v".into(),
            "libx264".into(),
            "-profile:v".into(),
            "high".into(),
            "-preset".into(),
            "veryfast".into(),
            "-crf".into(),
            p.crf.to_string(),
            "-maxrate".into(),
            format!("{}k", p.max_rate_kbps),
            "-bufsize".into(),
            format!("{}k", p.buf_size_kbps),
            "-g".into(),
            GOP_FRAMES.to_string(),
            "-keyint_min".into(),
            GOP_FRAMES.to_string(),
            "-sc_threshold".into(),
            "0".into(),
            "-metadata:s:v:0".into(),
            "rotate=0".into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            format!("{}k", p.audio_bitrate_kbps),
            "-ar".into(),
            AUDIO_SAMPLE_RATE.to_string(),
            "-ac".into(),
            AUDIO_CHANNELS.to_string(),
            "-f".into(),
            "hls".into(),
            "-hls_time".into(),
            SEGMENT_SECONDS.to_string(),
            "-hls_playlist_type".into(),
            "vod".into(),
            "-hls_flags".into(),
            "independent_segments".into(),
            "-hls_key_info_file".into(),
            key_info_path.display().to_string(),
            "-hls_segment_filename".into(),
            segment_path.display().to_string(),
            playlist_path.display().to_string(),
        ]);
    }

    args
}

pub fn master_playlist(renditions: &[PlannedRendition]) -> String {
    let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-INDEPENDENT-SEGMENTS\n");
    for r in renditions {
        let _ = writeln!(
            out,
            "#EXT-X-STREAM-INF:BANDWIDTH={},AVERAGE-BANDWIDTH={},RESOLUTION={},CODECS=\"{}\"",
            r.bandwidth(),
            r.average_bandwidth(),
            r.resolution(),
            STREAM_CODECS
        );
        let _ = writeln!(out, "{}", r.playlist_name());
    }
    out
}

/// Uploads every packaged file except `.info` sidecars under `dest_prefix`.
pub async fn upload_output_dir(
    storage: &dyn ObjectStore,
    output_dir: &Path,
    dest_prefix: &str,
) -> PitchResult<HashMap<String, String>> {
    let mut entries = tokio::fs::read_dir(output_dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".info") {
            continue;
        }
        names.push(name);
    }
    names.sort();

    let mut uploaded = HashMap::with_capacity(names.len());
    for name in names {
        let key = format!("{}{}", dest_prefix, name);
        storage
            .put_file(&key, &output_dir.join(&name), content_type_for(&name))
            .await?;
        debug!(key = %key, "uploaded hls artifact");
        uploaded.insert(name, storage.object_url(&key));
    }

    info!(prefix = dest_prefix, files = uploaded.len(), "uploaded hls output");
    Ok(uploaded)
}
