//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; the OpenAPI document is
//! served at `/api-docs/openapi.json`.

pub mod dto;
pub mod handlers;

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI document for the REST endpoints.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "plug-gateway", description = "Pluggable WebSocket connection gateway"),
    paths(
        handlers::system::health_handler,
        handlers::connections::list_connections,
        handlers::connections::get_connection,
        handlers::connections::post_command,
    ),
    components(schemas(
        handlers::system::HealthResponse,
        dto::CommandResponse,
        crate::service::CommandMessage,
        crate::domain::RegistrySnapshot,
        crate::domain::SocketState,
        crate::domain::ConnectionInfo,
        crate::domain::GlobalPlugState,
        crate::domain::BulkPlugReport,
        crate::domain::PlugCommand,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    tags(
        (name = "System", description = "Service health"),
        (name = "Connections", description = "Managed connections and plug commands"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_connection_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/connections"));
        assert!(doc.paths.paths.contains_key("/api/v1/connections/{id}"));
        assert!(doc.paths.paths.contains_key("/api/v1/commands"));
        assert!(doc.paths.paths.contains_key("/health"));
    }
}
