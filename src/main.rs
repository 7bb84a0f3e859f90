use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod common;
mod config;
mod docs;
mod infrastructure;
mod media;
mod middleware;
mod modules;
mod routes;
mod state;
mod workers;

#[cfg(test)]
mod testing;

use config::settings::AppConfig;
use infrastructure::db::pool::{connect_to_db, run_migrations};
use infrastructure::redis::client::RedisService;
use infrastructure::storage::ObjectStore;
use infrastructure::storage::s3::StorageService;
use media::probe::FfprobeInspector;
use media::transcoder::FfmpegTranscoder;
use modules::pitch::entitlement::{EntitlementPolicy, PgEntitlementSource};
use modules::pitch::events::RedisNotifier;
use modules::pitch::repository::{PgPitchRepository, PitchRepository};
use modules::pitch::service::PitchService;
use modules::pitch::stream::StreamService;
use workers::queue::TranscodeQueue;
use workers::reconciler::{Reconciler, parse_schedule, start_reconciler};
use workers::transcoder::{TranscodeWorker, start_transcoder_worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting server...");

    let config = AppConfig::new().context("missing required environment variable")?;

    let db = connect_to_db(&config.database_url)
        .await
        .context("failed to connect to PostgreSQL")?;
    run_migrations(&db).await.context("failed to run migrations")?;

    let redis = RedisService::new(&config.redis_url)
        .await
        .context("failed to connect to Redis")?;

    let storage: Arc<dyn ObjectStore> = Arc::new(
        StorageService::new(
            &config.minio_url,
            &config.minio_public_url,
            &config.minio_bucket,
            &config.minio_access_key,
            &config.minio_secret_key,
            config.minio_public_bucket,
        )
        .await,
    );

    let pitches: Arc<dyn PitchRepository> = Arc::new(PgPitchRepository::new(db.clone()));
    let entitlements = Arc::new(PgEntitlementSource::new(db.clone()));
    let inspector = Arc::new(FfprobeInspector::new(&config.ffprobe_path));
    let transcoder = Arc::new(FfmpegTranscoder::new(
        &config.ffmpeg_path,
        &config.public_api_url,
        storage.clone(),
    ));
    let policy = EntitlementPolicy {
        free_seconds: config.free_pitch_seconds,
        privileged_seconds: config.privileged_pitch_seconds,
    };

    let (queue, jobs) = TranscodeQueue::unbounded();

    let reconciler = Reconciler::new(
        pitches.clone(),
        queue.clone(),
        Duration::from_secs(config.reconcile_stale_seconds),
    );
    match reconciler.recover_on_startup().await {
        Ok(0) => {}
        Ok(n) => info!("♻️ Re-enqueued {} unfinished pitch jobs", n),
        Err(e) => warn!("⚠️ Startup recovery failed: {}", e),
    }
    let schedule = parse_schedule(&config.reconcile_cron)?;
    tokio::spawn(start_reconciler(reconciler, schedule));

    let worker = TranscodeWorker::new(
        pitches.clone(),
        storage.clone(),
        inspector.clone(),
        transcoder,
        entitlements.clone(),
        policy,
        config.transcode_tmp_dir.clone(),
    );
    tokio::spawn(start_transcoder_worker(worker, jobs));

    let pitch_service = PitchService::new(
        pitches.clone(),
        storage.clone(),
        inspector,
        entitlements,
        Arc::new(RedisNotifier::new(redis.clone())),
        queue,
        policy,
    );
    let stream_service = StreamService::new(pitches, storage);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let state = state::AppState::new(config, redis, pitch_service, stream_service);
    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
