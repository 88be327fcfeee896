use crate::common::error::DeliveryError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T, message: &str) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }
}

pub struct ApiSuccess<T>(pub T, pub StatusCode);

impl<T> IntoResponse for ApiSuccess<ApiResponse<T>>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        let (response, status) = (self.0, self.1);
        (status, Json(response)).into_response()
    }
}

impl DeliveryError {
    pub fn status(&self) -> StatusCode {
        match self {
            DeliveryError::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            DeliveryError::HostNotPermitted(_) => StatusCode::FORBIDDEN,
            DeliveryError::Unauthorized => StatusCode::UNAUTHORIZED,
            DeliveryError::NotFound(_) => StatusCode::NOT_FOUND,
            DeliveryError::SystemFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DeliveryError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = status.as_u16();
        match (self.root_cause(), status.is_server_error()) {
            (Some(root), true) => tracing::error!(status = code, stage = ?self.stage(), "{}: {}", self, root),
            (None, true) => tracing::error!(status = code, stage = ?self.stage(), "{}", self),
            (Some(root), false) => tracing::warn!(status = code, param = ?self.param(), "{}: {}", self, root),
            (None, false) => tracing::debug!(status = code, param = ?self.param(), "{}", self),
        }

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.public_message(),
        )
            .into_response()
    }
}
