//! Media inspection and HLS packaging built on the ffmpeg toolchain.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::error::{PitchError, PitchResult};

pub mod hls;
pub mod probe;
pub mod process;
pub mod renditions;
pub mod transcoder;

use renditions::PlannedRendition;

/// Technical metadata extracted from a probed source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub duration_seconds: f64,
    pub container_format: String,
    pub video_codec: String,
    /// Always one of 0, 90, 180 or 270.
    pub rotation_degrees: u16,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl VideoMetadata {
    /// Display dimensions once rotation has been applied.
    pub fn effective_dimensions(&self) -> Option<(u32, u32)> {
        let (w, h) = (self.width?, self.height?);
        if w == 0 || h == 0 {
            return None;
        }
        if self.rotation_degrees % 180 == 90 {
            Some((h, w))
        } else {
            Some((w, h))
        }
    }

    pub fn effective_height(&self) -> Option<u32> {
        self.effective_dimensions().map(|(_, h)| h)
    }
}

/// Extracts [`VideoMetadata`] from a local path or a signed URL.
#[async_trait]
pub trait MediaInspector: Send + Sync {
    async fn probe(&self, source: &str) -> PitchResult<VideoMetadata>;
}

pub struct TranscodeRequest<'a> {
    pub source: &'a Path,
    pub output_dir: &'a Path,
    pub owner_id: Uuid,
    /// Storage prefix (with trailing slash) the packaged files land under.
    pub dest_prefix: &'a str,
    pub metadata: &'a VideoMetadata,
}

/// Uploaded result of one packaging run.
#[derive(Debug, Clone)]
pub struct HlsOutput {
    /// File name to final object URL.
    pub files: HashMap<String, String>,
    pub renditions: Vec<PlannedRendition>,
}

impl HlsOutput {
    pub fn master_url(&self) -> PitchResult<&str> {
        self.file_url(hls::MASTER_PLAYLIST)
    }

    pub fn key_url(&self) -> PitchResult<&str> {
        self.file_url(hls::KEY_FILE_NAME)
    }

    fn file_url(&self, name: &str) -> PitchResult<&str> {
        self.files
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| PitchError::Transcode(format!("{} missing from packaged output", name)))
    }
}

/// Packages a local source into encrypted multi-rendition HLS and uploads it.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, request: TranscodeRequest<'_>) -> PitchResult<HlsOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(width: Option<u32>, height: Option<u32>, rotation: u16) -> VideoMetadata {
        VideoMetadata {
            duration_seconds: 12.0,
            container_format: "mov,mp4,m4a,3gp,3g2,mj2".into(),
            video_codec: "h264".into(),
            rotation_degrees: rotation,
            width,
            height,
        }
    }

    #[test]
    fn quarter_turns_swap_dimensions() {
        assert_eq!(meta(Some(1920), Some(1080), 90).effective_dimensions(), Some((1080, 1920)));
        assert_eq!(meta(Some(1920), Some(1080), 270).effective_height(), Some(1920));
        assert_eq!(meta(Some(1920), Some(1080), 180).effective_dimensions(), Some((1920, 1080)));
    }

    #[test]
    fn unknown_or_zero_dimensions_are_none() {
        assert_eq!(meta(None, Some(1080), 0).effective_dimensions(), None);
        assert_eq!(meta(Some(0), Some(1080), 0).effective_height(), None);
    }
}
