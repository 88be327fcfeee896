use crate::modules::delivery::dto::ResizeResponse;
use crate::modules::delivery::events::{PushEnvelope, PushMessage, TransformJob};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::delivery::handler::deliver,
        crate::modules::delivery::handler::deliver_asset,
        crate::modules::delivery::handler::resize_job,
        crate::modules::delivery::handler::serve_cached,
    ),
    components(
        schemas(TransformJob, PushEnvelope, PushMessage, ResizeResponse)
    ),
    tags(
        (name = "Delivery", description = "Resized image and video delivery"),
        (name = "Worker", description = "Transform job ingress")
    )
)]
pub struct ApiDoc;
