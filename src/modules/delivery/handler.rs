use super::dto::ResizeResponse;
use super::request::{sanitize_local_path, QueryParams, ServingMode};
use super::service::Resolution;
use crate::common::error::{DeliveryError, Stage};
use crate::common::response::{ApiResponse, ApiSuccess};
use crate::infrastructure::storage::local::META_SUFFIX;
use crate::infrastructure::storage::StorageError;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::path::Path as FsPath;

const IMMUTABLE: &str = "public, max-age=31536000, immutable";
const NO_STORE: &str = "no-store";

const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "mov", "webm"];
const VIDEO_CONTENT_TYPES: [&str; 3] = ["video/quicktime", "video/mp4", "video/webm"];

#[utoipa::path(
    get,
    path = "/",
    params(
        ("url" = String, Query, description = "Absolute http(s) URL of the source image"),
        ("width" = u32, Query, description = "Target width, 1 to 4096"),
        ("encoding" = Option<String>, Query, description = "Output encoding (jpeg, png, webp)"),
        ("force" = Option<String>, Query, description = "Present to recompute the artifact"),
        ("clear" = Option<String>, Query, description = "Invalidation code; deletes the artifact")
    ),
    responses(
        (status = 204, description = "Artifact cleared"),
        (status = 307, description = "Transform pending, redirected to the source"),
        (status = 308, description = "Redirected to the artifact"),
        (status = 400, description = "Invalid parameter"),
        (status = 401, description = "Wrong clear code"),
        (status = 403, description = "Source host not permitted"),
        (status = 404, description = "Source not found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Delivery"
)]
pub async fn deliver(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let params = QueryParams::parse(query.as_deref());
    match state.dispatcher.dispatch(&params, &ServingMode::Remote).await {
        Ok(resolution) => resolution.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Images below the asset directory are transformed in the request; videos
/// go through the video queue.
#[utoipa::path(
    get,
    path = "/assets/{path}",
    params(
        ("path" = String, Path, description = "Asset path relative to the asset directory"),
        ("width" = u32, Query, description = "Target width, 1 to 4096"),
        ("encoding" = Option<String>, Query, description = "Output encoding for images"),
        ("force" = Option<String>, Query, description = "Present to recompute the artifact"),
        ("clear" = Option<String>, Query, description = "Invalidation code; deletes the artifact")
    ),
    responses(
        (status = 204, description = "Artifact cleared"),
        (status = 302, description = "Redirected to the encoded video"),
        (status = 308, description = "Redirected to the artifact"),
        (status = 400, description = "Invalid parameter"),
        (status = 401, description = "Wrong clear code"),
        (status = 404, description = "Asset not found or video still processing"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Delivery"
)]
pub async fn deliver_asset(
    State(state): State<AppState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    if state.dispatcher.config().asset_dir.is_none() {
        return DeliveryError::NotFound(path).into_response();
    }

    let params = QueryParams::parse(query.as_deref());
    let result = if is_video(&path, &headers) {
        state.dispatcher.dispatch_video(&path, &params).await
    } else {
        state
            .dispatcher
            .dispatch(&params, &ServingMode::Local { path })
            .await
    };

    match result {
        Ok(resolution) => resolution.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Ingress for jobs delivered over HTTP by a message bus.
#[utoipa::path(
    post,
    path = "/worker/resize",
    request_body = super::events::TransformJob,
    responses(
        (status = 200, description = "Artifact written", body = ApiResponse<ResizeResponse>),
        (status = 400, description = "Invalid job"),
        (status = 404, description = "Source not found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Worker"
)]
pub async fn resize_job(State(state): State<AppState>, body: Bytes) -> Response {
    match state.worker.run_payload(&body).await {
        Ok(key) => {
            let url = state.storage.object_url(&key);
            ApiSuccess(
                ApiResponse::success(ResizeResponse { key, url }, "Artifact written"),
                StatusCode::OK,
            )
            .into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Serves artifacts of the local storage backend, whose public host points
/// back at this server.
#[utoipa::path(
    get,
    path = "/cache/{key}",
    params(("key" = String, Path, description = "Storage key of the artifact")),
    responses(
        (status = 200, description = "Artifact bytes"),
        (status = 404, description = "No such artifact"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Delivery"
)]
pub async fn serve_cached(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    if key.ends_with(META_SUFFIX) || sanitize_local_path(&key).is_none() {
        return DeliveryError::NotFound(key).into_response();
    }

    let artifact = match state.storage.info(&key).await {
        Ok(Some(artifact)) => artifact,
        Ok(None) => return DeliveryError::NotFound(key).into_response(),
        Err(e) => return DeliveryError::system(Stage::Lookup, &key, e).into_response(),
    };
    let data = match state.storage.read(&key).await {
        Ok(data) => data,
        Err(StorageError::NotFound(_)) => return DeliveryError::NotFound(key).into_response(),
        Err(e) => return DeliveryError::system(Stage::Lookup, &key, e).into_response(),
    };

    let content_type = mime_guess::from_path(&key).first_or_octet_stream();
    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type.essence_str().to_string())],
        data,
    )
        .into_response();
    if let Ok(value) = HeaderValue::try_from(artifact.cache_control) {
        if !value.is_empty() {
            response.headers_mut().insert(header::CACHE_CONTROL, value);
        }
    }
    response
}

fn is_video(path: &str, headers: &HeaderMap) -> bool {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if VIDEO_CONTENT_TYPES.contains(&content_type.as_str()) {
        return true;
    }

    FsPath::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn redirect(status: StatusCode, location: &str, cache_control: Option<&'static str>) -> Response {
    let location = match HeaderValue::try_from(location) {
        Ok(value) => value,
        Err(e) => return DeliveryError::system(Stage::Lookup, location, e).into_response(),
    };

    let mut response = status.into_response();
    response.headers_mut().insert(header::LOCATION, location);
    if let Some(cache_control) = cache_control {
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static(cache_control));
    }
    response
}

impl IntoResponse for Resolution {
    fn into_response(self) -> Response {
        match self {
            Resolution::Cached(url) | Resolution::Transformed(url) => {
                redirect(StatusCode::PERMANENT_REDIRECT, &url, Some(IMMUTABLE))
            }
            Resolution::Pending(source) => redirect(StatusCode::TEMPORARY_REDIRECT, &source, Some(NO_STORE)),
            Resolution::VideoReady(url) => redirect(StatusCode::FOUND, &url, None),
            Resolution::Cleared => StatusCode::NO_CONTENT.into_response(),
            Resolution::VideoQueued => (
                StatusCode::NOT_FOUND,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                "Video is being processed.",
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_video_by_extension_or_content_type() {
        let empty = HeaderMap::new();
        assert!(is_video("clips/intro.mp4", &empty));
        assert!(is_video("clips/intro.MOV", &empty));
        assert!(is_video("intro.webm", &empty));
        assert!(!is_video("covers/a.png", &empty));

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("Video/MP4"));
        assert!(is_video("stream", &headers));
    }

    #[test]
    fn test_resolution_status_and_headers() {
        let response = Resolution::Cached("https://cdn.test/a.png".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "https://cdn.test/a.png");
        assert_eq!(response.headers()[header::CACHE_CONTROL], IMMUTABLE);

        let response = Resolution::Pending("https://img.example.com/a.png".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::CACHE_CONTROL], NO_STORE);

        assert_eq!(Resolution::Cleared.into_response().status(), StatusCode::NO_CONTENT);
        assert_eq!(Resolution::VideoQueued.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            Resolution::VideoReady("https://cdn.test/320/a.webm".to_string()).into_response().status(),
            StatusCode::FOUND
        );
    }

    #[test]
    fn test_unrepresentable_location_is_a_server_error() {
        let response = Resolution::Cached("https://cdn.test/\n".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
