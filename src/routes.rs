use crate::config::settings::StorageSettings;
use crate::docs::ApiDoc;
use crate::state::AppState;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub fn configure_routes(state: &AppState) -> Router<AppState> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(|| async { "ok" }))
        .merge(crate::modules::delivery::router());

    // The local backend's public host points back at this server.
    if matches!(state.config.storage, StorageSettings::Local { .. }) {
        router = router.route("/cache/{*key}", get(crate::modules::delivery::handler::serve_cached));
    }

    router.layer(cors)
}
