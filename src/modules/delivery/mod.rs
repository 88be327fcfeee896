use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;

pub mod allowlist;
pub mod dto;
pub mod events;
pub mod handler;
pub mod key;
pub mod request;
pub mod service;
pub mod staleness;


pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handler::deliver))
        .route("/assets/{*path}", get(handler::deliver_asset))
        .route("/worker/resize", post(handler::resize_job))
}
