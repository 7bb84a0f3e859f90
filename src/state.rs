use crate::config::settings::AppConfig;
use crate::infrastructure::redis::client::RedisService;
use crate::modules::pitch::service::PitchService;
use crate::modules::pitch::stream::StreamService;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub redis: RedisService,
    pub pitches: PitchService,
    pub streams: StreamService,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        redis: RedisService,
        pitches: PitchService,
        streams: StreamService,
    ) -> Self {
        Self {
            config,
            redis,
            pitches,
            streams,
        }
    }
}
