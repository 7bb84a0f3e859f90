use axum::{
    Extension,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use uuid::Uuid;

use crate::common::response::ApiError;
use crate::infrastructure::storage::HLS_MIME;
use crate::middleware::auth::CurrentUser;
use crate::modules::pitch::stream::{MasterPlaylist, StreamedAsset};
use crate::state::AppState;

const PLAYLIST_CACHE: &str = "private, no-cache";
const SEGMENT_CACHE: &str = "private, max-age=3600";

/// Master playlist of a pitch with every reference pointing back at this API
#[utoipa::path(
    get,
    path = "/api/v1/elevator-pitch/stream/{id}",
    params(
        ("id" = Uuid, Path, description = "Pitch ID")
    ),
    responses(
        (status = 200, description = "HLS master playlist", content_type = "application/vnd.apple.mpegurl"),
        (status = 307, description = "Redirect to the public playlist"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Pitch still processing")
    ),
    tag = "Elevator Pitch",
    security(("bearer_auth" = []))
)]
pub async fn stream_master(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.streams.master_playlist(id, user).await {
        Ok(MasterPlaylist::Redirect(url)) => Redirect::temporary(&url).into_response(),
        Ok(MasterPlaylist::Rewritten(text)) => (
            [
                (header::CONTENT_TYPE, HLS_MIME),
                (header::CACHE_CONTROL, PLAYLIST_CACHE),
            ],
            text,
        )
            .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Sub-playlist or transport-stream segment of a pitch
#[utoipa::path(
    get,
    path = "/api/v1/elevator-pitch/stream/{id}/{segment}",
    params(
        ("id" = Uuid, Path, description = "Owner ID"),
        ("segment" = String, Path, description = "Playlist or segment file name")
    ),
    responses(
        (status = 200, description = "Playlist or MPEG-TS segment"),
        (status = 400, description = "Invalid segment name"),
        (status = 404, description = "Not Found")
    ),
    tag = "Elevator Pitch",
    security(("bearer_auth" = []))
)]
pub async fn stream_segment(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path((owner_id, segment)): Path<(Uuid, String)>,
) -> Response {
    match state.streams.segment(owner_id, &segment, user).await {
        Ok(asset) => asset_response(asset),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// AES-128 key of a pitch, never cached
#[utoipa::path(
    get,
    path = "/api/v1/elevator-pitch/key/{id}/{key_name}",
    params(
        ("id" = Uuid, Path, description = "Owner ID"),
        ("key_name" = String, Path, description = "Key file name")
    ),
    responses(
        (status = 200, description = "Raw key bytes", content_type = "application/octet-stream"),
        (status = 404, description = "Not Found")
    ),
    tag = "Elevator Pitch",
    security(("bearer_auth" = []))
)]
pub async fn get_key(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path((owner_id, key_name)): Path<(Uuid, String)>,
) -> Response {
    match state.streams.encryption_key(owner_id, &key_name, user).await {
        Ok(key) => {
            let octet = mime::APPLICATION_OCTET_STREAM;
            (
                [
                    (header::CONTENT_TYPE, octet.as_ref()),
                    (header::CACHE_CONTROL, "no-store"),
                ],
                key,
            )
                .into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

fn asset_response(asset: StreamedAsset) -> Response {
    let cache = if asset.content_type == HLS_MIME {
        PLAYLIST_CACHE
    } else {
        SEGMENT_CACHE
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, asset.content_type)
        .header(header::CACHE_CONTROL, cache);

    if let Some(len) = asset.stream.content_length {
        builder = builder.header(header::CONTENT_LENGTH, len);
    }

    builder
        .body(Body::from_stream(asset.stream.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::ObjectStream;
    use bytes::Bytes;

    #[tokio::test]
    async fn segments_are_streamed_with_length_and_cache_headers() {
        let response = asset_response(StreamedAsset {
            content_type: "video/mp2t",
            stream: ObjectStream::from_bytes(Bytes::from_static(b"0123")),
        });

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "video/mp2t");
        assert_eq!(headers[header::CONTENT_LENGTH], "4");
        assert_eq!(headers[header::CACHE_CONTROL], SEGMENT_CACHE);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"0123");
    }

    #[test]
    fn playlists_are_not_cached() {
        let response = asset_response(StreamedAsset {
            content_type: HLS_MIME,
            stream: ObjectStream::from_bytes(Bytes::from_static(b"#EXTM3U\n")),
        });
        assert_eq!(response.headers()[header::CACHE_CONTROL], PLAYLIST_CACHE);
    }
}
