use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post};

pub mod dto;
pub mod entitlement;
pub mod events;
pub mod handler;
pub mod keys;
pub mod model;
pub mod repository;
pub mod service;
pub mod stream;
pub mod stream_handler;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/elevator-pitch",
            get(handler::get_pitch).delete(handler::delete_pitch),
        )
        .route("/elevator-pitch/upload-url", post(handler::request_upload_url))
        .route("/elevator-pitch/complete-upload", post(handler::complete_upload))
        .route("/elevator-pitch/stream/{id}", get(stream_handler::stream_master))
        .route(
            "/elevator-pitch/stream/{id}/{segment}",
            get(stream_handler::stream_segment),
        )
        .route(
            "/elevator-pitch/key/{id}/{key_name}",
            get(stream_handler::get_key),
        )
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth::auth_middleware,
        ))
}
