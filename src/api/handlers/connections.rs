//! Connection handlers: registry snapshot, single socket, commands.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::CommandResponse;
use crate::app_state::AppState;
use crate::domain::{ConnectionId, RegistrySnapshot, SocketState};
use crate::error::{ErrorResponse, GatewayError};
use crate::service::CommandMessage;

/// `GET /connections` — Global plug state and every live connection.
///
/// # Errors
///
/// Returns [`GatewayError::CoreUnavailable`] if the core has stopped.
#[utoipa::path(
    get,
    path = "/api/v1/connections",
    tag = "Connections",
    summary = "Registry snapshot",
    description = "Returns the global plug state and every live managed connection in id order.",
    responses(
        (status = 200, description = "Registry snapshot", body = RegistrySnapshot),
        (status = 503, description = "Connection core unavailable", body = ErrorResponse),
    )
)]
pub async fn list_connections(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, GatewayError> {
    let snapshot = state.core.snapshot().await?;
    Ok((StatusCode::OK, Json(snapshot)))
}

/// `GET /connections/{id}` — One live connection.
///
/// # Errors
///
/// Returns [`GatewayError::ConnectionNotFound`] for ids that are not live.
#[utoipa::path(
    get,
    path = "/api/v1/connections/{id}",
    tag = "Connections",
    summary = "Get connection",
    params(("id" = u64, Path, description = "Registry-assigned connection id")),
    responses(
        (status = 200, description = "Connection state", body = SocketState),
        (status = 404, description = "Connection not found", body = ErrorResponse),
    )
)]
pub async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, GatewayError> {
    let socket = state.core.socket(ConnectionId::new(id)).await?;
    Ok((StatusCode::OK, Json(socket)))
}

/// `POST /commands` — Route a controller command.
///
/// Commands the router does not understand are discarded and reported
/// with `applied: false`.
///
/// # Errors
///
/// Returns [`GatewayError::CoreUnavailable`] if the core has stopped.
#[utoipa::path(
    post,
    path = "/api/v1/commands",
    tag = "Connections",
    summary = "Send command",
    description = "Routes a `{scope, command, value}` message. `all-connections` / `setPlugged` with a boolean plugs or unplugs every live connection.",
    request_body = CommandMessage,
    responses(
        (status = 200, description = "Command routed", body = CommandResponse),
        (status = 503, description = "Connection core unavailable", body = ErrorResponse),
    )
)]
pub async fn post_command(
    State(state): State<AppState>,
    Json(message): Json<CommandMessage>,
) -> Result<impl IntoResponse, GatewayError> {
    let report = state.core.command(message).await?;
    Ok((StatusCode::OK, Json(CommandResponse::from(report))))
}

/// Connection routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/connections", get(list_connections))
        .route("/connections/{id}", get(get_connection))
        .route("/commands", post(post_command))
}
