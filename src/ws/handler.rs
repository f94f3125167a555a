//! Axum WebSocket upgrade handlers.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;

use super::control::run_control;
use crate::app_state::AppState;

/// Query string of `GET /proxy`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyParams {
    /// Upstream `ws://` or `wss://` address.
    #[serde(default)]
    pub target: String,
    /// Comma-separated sub-protocols to offer upstream.
    #[serde(default)]
    pub protocols: Option<String>,
}

impl ProxyParams {
    /// Sub-protocols as a list, blanks removed.
    #[must_use]
    pub fn protocol_list(&self) -> Vec<String> {
        self.protocols
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|protocol| !protocol.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// `GET /control` — Upgrade to a controller WebSocket.
pub async fn control_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let notifications = state.event_bus.subscribe();
    let core = state.core.clone();

    ws.on_upgrade(move |socket| run_control(socket, notifications, core))
}

/// `GET /proxy?target=ws://...` — Upgrade and relay through a managed
/// upstream connection.
///
/// The requested sub-protocols are accepted downstream as well, so the
/// client sees the same negotiation it would get from the upstream.
pub async fn proxy_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ProxyParams>,
) -> impl IntoResponse {
    let protocols = params.protocol_list();
    let core = state.core.clone();
    let target = params.target;

    ws.protocols(protocols.clone())
        .on_upgrade(move |socket| async move {
            if let Err(err) = core.proxy(socket, target, protocols).await {
                tracing::warn!(error = %err, "proxy session not started");
            }
        })
}
