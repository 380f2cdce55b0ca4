pub mod handlers;
pub mod models;
pub mod openapi;

use std::sync::Arc;

use axum::{Router, routing::get};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use handlers::AppService;
use openapi::ApiDoc;

/// Full application router: health check, the authenticated API under
/// `/api` and the Swagger UI.
pub fn app(service: Arc<AppService>) -> Router {
    Router::new()
        .route("/", get(handlers::health))
        .nest("/api", handlers::api_routes(service))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
