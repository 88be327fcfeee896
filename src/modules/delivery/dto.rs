use serde::Serialize;
use utoipa::ToSchema;

/// Body returned by the worker ingress once an artifact is written.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResizeResponse {
    pub key: String,
    pub url: String,
}
