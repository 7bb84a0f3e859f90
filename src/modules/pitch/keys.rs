//! Object-storage key layout for pitch artifacts.

use time::OffsetDateTime;
use uuid::Uuid;

pub const PITCH_ROOT: &str = "elevator_pitches";

pub fn owner_root(owner_id: Uuid) -> String {
    format!("{}/{}/", PITCH_ROOT, owner_id)
}

pub fn source_prefix(owner_id: Uuid) -> String {
    format!("{}source/", owner_root(owner_id))
}

/// Every packaged HLS asset ever produced for the owner lives under here.
pub fn hls_root(owner_id: Uuid) -> String {
    format!("{}hls/", owner_root(owner_id))
}

/// Fresh prefix for one transcode run.
pub fn hls_prefix(owner_id: Uuid, started_at: OffsetDateTime) -> String {
    format!(
        "{}{}/",
        hls_root(owner_id),
        started_at.unix_timestamp_nanos() / 1_000_000
    )
}

pub fn source_key(owner_id: Uuid, now: OffsetDateTime, token: &str, file_name: &str) -> String {
    format!(
        "{}{}-{}-{}",
        source_prefix(owner_id),
        now.unix_timestamp_nanos() / 1_000_000,
        token,
        file_name
    )
}

pub fn random_token() -> String {
    Uuid::new_v4().as_simple().to_string()[..8].to_string()
}

/// Lowercases and strips everything outside `[a-z0-9._-]`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
        .collect();

    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "video".to_string()
    } else {
        trimmed.replace("..", ".")
    }
}

/// Sanitized name, with an extension inferred from `mime_type` when absent.
pub fn upload_file_name(name: &str, mime_type: &str) -> String {
    let sanitized = sanitize_file_name(name);
    if sanitized.contains('.') {
        return sanitized;
    }

    let ext = match mime_type {
        "video/mp4" => Some("mp4"),
        "video/quicktime" => Some("mov"),
        "video/webm" => Some("webm"),
        other => mime_guess::get_mime_extensions_str(other).and_then(|exts| exts.first().copied()),
    };

    match ext {
        Some(ext) => format!("{}.{}", sanitized, ext),
        None => sanitized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_to_safe_alphabet() {
        assert_eq!(sanitize_file_name("My Pitch (Final).MP4"), "my-pitch-final.mp4");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\videos\\take 2.mov"), "take-2.mov");
        assert_eq!(sanitize_file_name("こんにちは"), "video");
        assert_eq!(sanitize_file_name("a..b.mp4"), "a.b.mp4");
    }

    #[test]
    fn infers_extension_from_mime() {
        assert_eq!(upload_file_name("pitch", "video/mp4"), "pitch.mp4");
        assert_eq!(upload_file_name("pitch", "video/quicktime"), "pitch.mov");
        assert_eq!(upload_file_name("pitch.webm", "video/mp4"), "pitch.webm");
        assert_eq!(upload_file_name("pitch", "video/x-unknown-thing"), "pitch");
    }

    #[test]
    fn keys_are_scoped_per_owner() {
        let owner = Uuid::nil();
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let key = source_key(owner, now, "abcd1234", "clip.mp4");

        assert_eq!(
            key,
            "elevator_pitches/00000000-0000-0000-0000-000000000000/source/1700000000000-abcd1234-clip.mp4"
        );
        assert!(key.starts_with(&source_prefix(owner)));
        assert!(hls_prefix(owner, now).starts_with(&hls_root(owner)));
        assert!(hls_prefix(owner, now).ends_with("/hls/1700000000000/"));
        assert_eq!(random_token().len(), 8);
    }
}
