use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::middleware::auth::CurrentUser;
use crate::modules::pitch::dto::*;
use crate::state::AppState;
use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};

#[utoipa::path(
    post,
    path = "/api/v1/elevator-pitch/upload-url",
    request_body = UploadUrlRequest,
    responses(
        (status = 200, description = "Signed upload URL issued", body = ApiResponse<UploadUrlResponse>),
        (status = 400, description = "Bad Request"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Concurrent upload request"),
        (status = 502, description = "Storage unavailable")
    ),
    tag = "Elevator Pitch",
    security(("bearer_auth" = []))
)]
pub async fn request_upload_url(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<UploadUrlRequest>,
) -> impl IntoResponse {
    match state.pitches.request_upload_url(user.id, req).await {
        Ok(res) => ApiSuccess::ok(res, "Upload URL generated successfully").into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/elevator-pitch/complete-upload",
    request_body = CompleteUploadRequest,
    responses(
        (status = 202, description = "Upload accepted and queued for transcoding", body = ApiResponse<CompleteUploadResponse>),
        (status = 400, description = "Bad Request"),
        (status = 402, description = "Video longer than the plan allows"),
        (status = 403, description = "Role cannot publish a pitch"),
        (status = 404, description = "No upload in progress"),
        (status = 409, description = "Pitch already processed")
    ),
    tag = "Elevator Pitch",
    security(("bearer_auth" = []))
)]
pub async fn complete_upload(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CompleteUploadRequest>,
) -> impl IntoResponse {
    match state.pitches.finalize_upload(user.id, req).await {
        Ok(res) => ApiSuccess::accepted(res, "Elevator pitch queued for processing").into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/elevator-pitch",
    params(OwnerQuery),
    responses(
        (status = 200, description = "Elevator pitch of the user, data is null when none exists", body = ApiResponse<PitchResponse>),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Elevator Pitch",
    security(("bearer_auth" = []))
)]
pub async fn get_pitch(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<OwnerQuery>,
) -> impl IntoResponse {
    let owner_id = query.owner_id.unwrap_or(user.id);
    match state.pitches.get_pitch(owner_id, user).await {
        Ok(Some(res)) => ApiSuccess::ok(Some(res), "Elevator pitch retrieved successfully").into_response(),
        Ok(None) => ApiSuccess::ok(None::<PitchResponse>, "No elevator pitch found").into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/elevator-pitch",
    params(OwnerQuery),
    responses(
        (status = 200, description = "Elevator pitch deleted"),
        (status = 403, description = "Not allowed to delete this pitch"),
        (status = 404, description = "Elevator pitch not found")
    ),
    tag = "Elevator Pitch",
    security(("bearer_auth" = []))
)]
pub async fn delete_pitch(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<OwnerQuery>,
) -> impl IntoResponse {
    let owner_id = query.owner_id.unwrap_or(user.id);
    match state.pitches.delete_pitch(owner_id, user).await {
        Ok(()) => ApiSuccess::ok((), "Elevator pitch deleted successfully").into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}
