use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::process::Command;
use tracing::info;

use crate::common::error::{PitchError, PitchResult};
use crate::media::process::{STDERR_TAIL_LINES, run_captured};
use crate::media::{MediaInspector, VideoMetadata};

/// Media inspector backed by `ffprobe`.
#[derive(Debug, Clone)]
pub struct FfprobeInspector {
    ffprobe_path: String,
}

impl FfprobeInspector {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }
}

#[async_trait]
impl MediaInspector for FfprobeInspector {
    async fn probe(&self, source: &str) -> PitchResult<VideoMetadata> {
        let mut cmd = Command::new(&self.ffprobe_path);
        cmd.args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            source,
        ]);

        let output = run_captured("ffprobe", cmd, STDERR_TAIL_LINES).await?;
        let metadata = parse_probe_output(&output.stdout)?;

        info!(
            duration = metadata.duration_seconds,
            codec = %metadata.video_codec,
            rotation = metadata.rotation_degrees,
            width = ?metadata.width,
            height = ?metadata.height,
            "probed video"
        );
        Ok(metadata)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<SideData>,
}

#[derive(Debug, Deserialize)]
struct SideData {
    side_data_type: Option<String>,
    rotation: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

/// Maps any angle to the nearest of 0, 90, 180 and 270.
pub fn normalize_rotation(degrees: f64) -> u16 {
    if !degrees.is_finite() {
        return 0;
    }
    let quarter_turns = (degrees.rem_euclid(360.0) / 90.0).round() as u16 % 4;
    quarter_turns * 90
}

fn side_data_rotation(stream: &ProbeStream) -> Option<f64> {
    stream
        .side_data_list
        .iter()
        .filter(|sd| sd.side_data_type.as_deref() == Some("Display Matrix"))
        .find_map(|sd| match sd.rotation.as_ref()? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
}

/// Clockwise rotation needed to display the stream upright.
fn stream_rotation(stream: &ProbeStream) -> u16 {
    if let Some(tag) = stream.tags.get("rotate").and_then(|r| r.trim().parse::<f64>().ok()) {
        return normalize_rotation(tag);
    }
    // Display matrices express the counter-clockwise angle.
    side_data_rotation(stream)
        .map(|r| normalize_rotation(-r))
        .unwrap_or(0)
}

pub fn parse_probe_output(json: &[u8]) -> PitchResult<VideoMetadata> {
    let probe: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| PitchError::Transcode(format!("unreadable ffprobe output: {}", e)))?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| PitchError::Validation("uploaded file has no video stream".to_string()))?;

    let duration_seconds = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let container_format = probe
        .format
        .as_ref()
        .and_then(|f| f.format_name.clone())
        .unwrap_or_else(|| "unknown".to_string());

    Ok(VideoMetadata {
        duration_seconds,
        container_format,
        video_codec: video
            .codec_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        rotation_degrees: stream_rotation(video),
        width: video.width.filter(|w| *w > 0),
        height: video.height.filter(|h| *h > 0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_is_total_and_idempotent() {
        let mut angle = -1080.0;
        while angle <= 1080.0 {
            let once = normalize_rotation(angle);
            assert!(matches!(once, 0 | 90 | 180 | 270), "{} -> {}", angle, once);
            assert_eq!(normalize_rotation(once as f64), once);
            angle += 7.5;
        }
        assert_eq!(normalize_rotation(f64::NAN), 0);
        assert_eq!(normalize_rotation(f64::INFINITY), 0);
    }

    #[test]
    fn rotation_snaps_to_nearest_quarter_turn() {
        assert_eq!(normalize_rotation(-90.0), 270);
        assert_eq!(normalize_rotation(89.6), 90);
        assert_eq!(normalize_rotation(350.0), 0);
        assert_eq!(normalize_rotation(450.0), 90);
        assert_eq!(normalize_rotation(-180.0), 180);
    }

    #[test]
    fn parses_rotate_tag_and_format() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
                 "tags": {"rotate": "90"}}
            ],
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "45.120000"}
        }"#;

        let meta = parse_probe_output(json).unwrap();
        assert_eq!(meta.video_codec, "h264");
        assert_eq!(meta.rotation_degrees, 90);
        assert_eq!(meta.width, Some(1920));
        assert_eq!(meta.effective_height(), Some(1920));
        assert!((meta.duration_seconds - 45.12).abs() < 1e-9);
        assert_eq!(meta.container_format, "mov,mp4,m4a,3gp,3g2,mj2");
    }

    #[test]
    fn display_matrix_rotation_is_inverted() {
        let json = br#"{
            "streams": [{"codec_type": "video", "codec_name": "hevc", "width": 1280, "height": 720,
                "side_data_list": [{"side_data_type": "Display Matrix", "rotation": -90}]}],
            "format": {"format_name": "mov", "duration": "3.5"}
        }"#;
        assert_eq!(parse_probe_output(json).unwrap().rotation_degrees, 90);

        let string_rotation = br#"{
            "streams": [{"codec_type": "video", "width": 10, "height": 10,
                "side_data_list": [{"side_data_type": "Display Matrix", "rotation": "90.00"}]}]
        }"#;
        assert_eq!(parse_probe_output(string_rotation).unwrap().rotation_degrees, 270);
    }

    #[test]
    fn missing_video_stream_is_rejected() {
        let json = br#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "10"}}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(PitchError::Validation(_))
        ));
    }

    #[test]
    fn falls_back_to_stream_duration() {
        let json = br#"{"streams": [{"codec_type": "video", "duration": "12.5"}]}"#;
        let meta = parse_probe_output(json).unwrap();
        assert_eq!(meta.duration_seconds, 12.5);
        assert_eq!(meta.container_format, "unknown");
        assert_eq!(meta.width, None);
    }

    #[test]
    fn garbage_output_is_a_transcode_error() {
        assert!(matches!(
            parse_probe_output(b"not json"),
            Err(PitchError::Transcode(_))
        ));
    }
}
