use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    DatabaseUrl,
    RedisUrl,
    MinioUrl,
    MinioPublicUrl,
    MinioBucket,
    MinioAccessKey,
    MinioSecretKey,
    MinioPublicBucket,
    JwtSecret,
    PublicApiUrl,
    FfmpegPath,
    FfprobePath,
    TranscodeTmpDir,
    FreePitchSeconds,
    PrivilegedPitchSeconds,
    ReconcileCron,
    ReconcileStaleSeconds,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::RedisUrl => "REDIS_URL",
            EnvKey::MinioUrl => "MINIO_ENDPOINT",
            EnvKey::MinioPublicUrl => "MINIO_PUBLIC_URL",
            EnvKey::MinioBucket => "MINIO_BUCKET_VIDEOS",
            EnvKey::MinioAccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::MinioSecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::MinioPublicBucket => "MINIO_PUBLIC_BUCKET",
            EnvKey::JwtSecret => "JWT_SECRET",
            EnvKey::PublicApiUrl => "PUBLIC_API_URL",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::FfprobePath => "FFPROBE_PATH",
            EnvKey::TranscodeTmpDir => "TRANSCODE_TMP_DIR",
            EnvKey::FreePitchSeconds => "FREE_PITCH_SECONDS",
            EnvKey::PrivilegedPitchSeconds => "PRIVILEGED_PITCH_SECONDS",
            EnvKey::ReconcileCron => "RECONCILE_CRON",
            EnvKey::ReconcileStaleSeconds => "RECONCILE_STALE_SECONDS",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
