//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Account and hub endpoints are mounted under `/api/v1`; `/health` sits
//! at the root.

pub mod dto;
pub mod handlers;
pub mod openapi;

use axum::Router;

use crate::app_state::AppState;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = {
        use utoipa::OpenApi;
        use utoipa_swagger_ui::SwaggerUi;

        router.merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
    };

    router
}
