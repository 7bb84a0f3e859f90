use crate::config::env::{self, EnvKey};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub minio_url: String,
    /// Base URL clients and stored playlist references use; differs from
    /// `minio_url` when the store sits behind a proxy.
    pub minio_public_url: String,
    pub minio_bucket: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub minio_public_bucket: bool,
    pub jwt_secret: String,
    pub public_api_url: String,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub transcode_tmp_dir: PathBuf,
    pub free_pitch_seconds: u32,
    pub privileged_pitch_seconds: u32,
    pub reconcile_cron: String,
    pub reconcile_stale_seconds: u64,
}

impl AppConfig {
    pub fn new() -> Result<Self, std::env::VarError> {
        let minio_url = env::get(EnvKey::MinioUrl)?;
        let tmp_dir = env::get(EnvKey::TranscodeTmpDir)
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());

        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            database_url: env::get(EnvKey::DatabaseUrl)?,
            redis_url: env::get(EnvKey::RedisUrl)?,
            minio_public_url: env::get_or(EnvKey::MinioPublicUrl, &minio_url),
            minio_url,
            minio_bucket: env::get(EnvKey::MinioBucket)?,
            minio_access_key: env::get(EnvKey::MinioAccessKey)?,
            minio_secret_key: env::get(EnvKey::MinioSecretKey)?,
            minio_public_bucket: env::get_parsed(EnvKey::MinioPublicBucket, false),
            jwt_secret: env::get(EnvKey::JwtSecret)?,
            public_api_url: env::get_or(EnvKey::PublicApiUrl, "http://localhost:3000"),
            ffmpeg_path: env::get_or(EnvKey::FfmpegPath, "ffmpeg"),
            ffprobe_path: env::get_or(EnvKey::FfprobePath, "ffprobe"),
            transcode_tmp_dir: tmp_dir,
            free_pitch_seconds: env::get_parsed(EnvKey::FreePitchSeconds, 30),
            privileged_pitch_seconds: env::get_parsed(EnvKey::PrivilegedPitchSeconds, 300),
            reconcile_cron: env::get_or(EnvKey::ReconcileCron, "0 */5 * * * *"),
            reconcile_stale_seconds: env::get_parsed(EnvKey::ReconcileStaleSeconds, 600),
        })
    }
}
