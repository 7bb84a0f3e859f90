use utoipa::OpenApi;
use crate::media::VideoMetadata;
use crate::modules::pitch::dto::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::pitch::handler::request_upload_url,
        crate::modules::pitch::handler::complete_upload,
        crate::modules::pitch::handler::get_pitch,
        crate::modules::pitch::handler::delete_pitch,
        crate::modules::pitch::stream_handler::stream_master,
        crate::modules::pitch::stream_handler::stream_segment,
        crate::modules::pitch::stream_handler::get_key,
    ),
    components(
        schemas(
            UploadUrlRequest, UploadUrlResponse,
            CompleteUploadRequest, CompleteUploadResponse,
            PitchResponse, VideoResponse, ProcessingResponse,
            VideoMetadata,
        )
    ),
    tags(
        (name = "Elevator Pitch", description = "Candidate video pitches: upload, transcoding and HLS playback")
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

use utoipa::Modify;
use utoipa::openapi::security::{SecurityScheme, HttpAuthScheme, HttpBuilder};

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_pitch_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/elevator-pitch",
            "/api/v1/elevator-pitch/upload-url",
            "/api/v1/elevator-pitch/complete-upload",
            "/api/v1/elevator-pitch/stream/{id}",
            "/api/v1/elevator-pitch/stream/{id}/{segment}",
            "/api/v1/elevator-pitch/key/{id}/{key_name}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{}", path);
        }
        assert!(
            doc.components
                .as_ref()
                .is_some_and(|c| c.security_schemes.contains_key("bearer_auth"))
        );
    }
}
