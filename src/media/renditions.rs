use serde::Serialize;

use crate::media::VideoMetadata;

/// One rung of the encoding ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenditionProfile {
    pub name: &'static str,
    pub target_height: u32,
    pub video_bitrate_kbps: u32,
    pub max_rate_kbps: u32,
    pub buf_size_kbps: u32,
    pub audio_bitrate_kbps: u32,
    pub crf: u8,
}

/// Default ladder, ordered by ascending height.
pub const DEFAULT_LADDER: [RenditionProfile; 4] = [
    RenditionProfile {
        name: "360p",
        target_height: 360,
        video_bitrate_kbps: 800,
        max_rate_kbps: 856,
        buf_size_kbps: 1200,
        audio_bitrate_kbps: 96,
        crf: 23,
    },
    RenditionProfile {
        name: "480p",
        target_height: 480,
        video_bitrate_kbps: 1400,
        max_rate_kbps: 1498,
        buf_size_kbps: 2100,
        audio_bitrate_kbps: 128,
        crf: 23,
    },
    RenditionProfile {
        name: "720p",
        target_height: 720,
        video_bitrate_kbps: 2800,
        max_rate_kbps: 2996,
        buf_size_kbps: 4200,
        audio_bitrate_kbps: 128,
        crf: 22,
    },
    RenditionProfile {
        name: "1080p",
        target_height: 1080,
        video_bitrate_kbps: 5000,
        max_rate_kbps: 5350,
        buf_size_kbps: 7500,
        audio_bitrate_kbps: 192,
        crf: 21,
    },
];

/// A profile bound to a concrete output resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlannedRendition {
    pub profile: RenditionProfile,
    pub width: u32,
    pub height: u32,
}

impl PlannedRendition {
    pub fn playlist_name(&self) -> String {
        format!("{}.m3u8", self.profile.name)
    }

    pub fn segment_pattern(&self) -> String {
        format!("{}_%03d.ts", self.profile.name)
    }

    /// Peak bits per second advertised in the master playlist.
    pub fn bandwidth(&self) -> u64 {
        (self.profile.max_rate_kbps as u64 + self.profile.audio_bitrate_kbps as u64) * 1000
    }

    pub fn average_bandwidth(&self) -> u64 {
        (self.profile.video_bitrate_kbps as u64 + self.profile.audio_bitrate_kbps as u64) * 1000
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Profiles no taller than the source; the lowest profile when none fit.
pub fn select_profiles(
    ladder: &[RenditionProfile],
    effective_height: Option<u32>,
) -> Vec<RenditionProfile> {
    let mut fitting: Vec<RenditionProfile> = match effective_height {
        Some(h) => ladder.iter().filter(|p| p.target_height <= h).copied().collect(),
        None => Vec::new(),
    };

    if fitting.is_empty() {
        if let Some(lowest) = ladder.iter().min_by_key(|p| p.target_height) {
            fitting.push(*lowest);
        }
    }

    fitting.sort_by_key(|p| p.target_height);
    fitting
}

fn round_even(value: f64) -> u32 {
    let rounded = value.round().max(2.0) as u32;
    rounded - rounded % 2
}

/// Even output resolution for `profile`, keeping the source aspect ratio
/// (16:9 when the source dimensions are unknown).
pub fn target_resolution(profile: &RenditionProfile, effective: Option<(u32, u32)>) -> (u32, u32) {
    let height = round_even(profile.target_height as f64);
    let aspect = match effective {
        Some((w, h)) if w > 0 && h > 0 => w as f64 / h as f64,
        _ => 16.0 / 9.0,
    };
    (round_even(height as f64 * aspect), height)
}

pub fn plan_renditions(ladder: &[RenditionProfile], metadata: &VideoMetadata) -> Vec<PlannedRendition> {
    let effective = metadata.effective_dimensions();
    select_profiles(ladder, effective.map(|(_, h)| h))
        .into_iter()
        .map(|profile| {
            let (width, height) = target_resolution(&profile, effective);
            PlannedRendition {
                profile,
                width,
                height,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(width: u32, height: u32, rotation: u16) -> VideoMetadata {
        VideoMetadata {
            duration_seconds: 25.0,
            container_format: "mov".into(),
            video_codec: "h264".into(),
            rotation_degrees: rotation,
            width: Some(width),
            height: Some(height),
        }
    }

    #[test]
    fn never_exceeds_source_height() {
        for h in [100, 359, 360, 479, 480, 719, 720, 1079, 1080, 2160] {
            let selected = select_profiles(&DEFAULT_LADDER, Some(h));
            assert!(!selected.is_empty());
            if h >= 360 {
                assert!(selected.iter().all(|p| p.target_height <= h), "height {}", h);
            } else {
                assert_eq!(selected, vec![DEFAULT_LADDER[0]]);
            }
        }
    }

    #[test]
    fn unknown_height_uses_lowest_profile() {
        assert_eq!(select_profiles(&DEFAULT_LADDER, None), vec![DEFAULT_LADDER[0]]);
    }

    #[test]
    fn rotated_portrait_uses_rotated_height() {
        // 1920x1080 rotated 90 degrees displays as 1080x1920.
        let plan = plan_renditions(&DEFAULT_LADDER, &meta(1920, 1080, 90));
        assert_eq!(plan.len(), 4);
        let top = plan.last().unwrap();
        assert_eq!(top.height, 1080);
        assert_eq!(top.width, 608);
    }

    #[test]
    fn resolutions_are_even_and_keep_aspect() {
        let plan = plan_renditions(&DEFAULT_LADDER, &meta(1280, 720, 0));
        let names: Vec<_> = plan.iter().map(|r| r.profile.name).collect();
        assert_eq!(names, vec!["360p", "480p", "720p"]);
        for r in &plan {
            assert_eq!(r.width % 2, 0);
            assert_eq!(r.height % 2, 0);
        }
        assert_eq!(plan[0].resolution(), "640x360");
        assert_eq!(plan[1].resolution(), "852x480");
    }

    #[test]
    fn unknown_dimensions_assume_sixteen_nine() {
        assert_eq!(target_resolution(&DEFAULT_LADDER[2], None), (1280, 720));
    }

    #[test]
    fn bandwidth_includes_audio() {
        let plan = plan_renditions(&DEFAULT_LADDER, &meta(640, 360, 0));
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].bandwidth(), 952_000);
        assert_eq!(plan[0].average_bandwidth(), 896_000);
        assert_eq!(plan[0].playlist_name(), "360p.m3u8");
        assert_eq!(plan[0].segment_pattern(), "360p_%03d.ts");
    }
}
