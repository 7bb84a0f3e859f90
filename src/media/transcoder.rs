use async_trait::async_trait;
use std::sync::Arc;
use tokio::process::Command;
use tracing::info;

use crate::common::error::PitchResult;
use crate::infrastructure::storage::ObjectStore;
use crate::media::hls::{
    EncryptionKey, MASTER_PLAYLIST, encoder_args, key_delivery_url, master_playlist,
    upload_output_dir, write_key_material,
};
use crate::media::process::{STDERR_TAIL_LINES, run_captured};
use crate::media::renditions::{DEFAULT_LADDER, RenditionProfile, plan_renditions};
use crate::media::{HlsOutput, TranscodeRequest, Transcoder};

/// Transcode engine driving a single `ffmpeg` process per asset.
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    api_base_url: String,
    ladder: Vec<RenditionProfile>,
    storage: Arc<dyn ObjectStore>,
}

impl FfmpegTranscoder {
    pub fn new(
        ffmpeg_path: impl Into<String>,
        api_base_url: impl Into<String>,
        storage: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            api_base_url: api_base_url.into(),
            ladder: DEFAULT_LADDER.to_vec(),
            storage,
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, request: TranscodeRequest<'_>) -> PitchResult<HlsOutput> {
        tokio::fs::create_dir_all(request.output_dir).await?;

        let renditions = plan_renditions(&self.ladder, request.metadata);
        let rotation = request.metadata.rotation_degrees;

        let key = EncryptionKey::generate();
        let key_url = key_delivery_url(&self.api_base_url, request.owner_id);
        let key_info = write_key_material(request.output_dir, &key, &key_url).await?;

        info!(
            owner_id = %request.owner_id,
            rotation,
            renditions = ?renditions.iter().map(|r| r.profile.name).collect::<Vec<_>>(),
            "🎥 Starting HLS transcode"
        );

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(encoder_args(
            request.source,
            request.output_dir,
            &key_info,
            rotation,
            &renditions,
        ));
        run_captured("ffmpeg", cmd, STDERR_TAIL_LINES).await?;

        tokio::fs::write(
            request.output_dir.join(MASTER_PLAYLIST),
            master_playlist(&renditions),
        )
        .await?;

        let files =
            upload_output_dir(self.storage.as_ref(), request.output_dir, request.dest_prefix)
                .await?;

        Ok(HlsOutput { files, renditions })
    }
}
