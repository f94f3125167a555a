//! plug-gateway server entry point.
//!
//! Starts the connection core and the Axum HTTP server with REST, proxy
//! and control endpoints.

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use plug_gateway::api;
use plug_gateway::app_state::AppState;
use plug_gateway::config::GatewayConfig;
use plug_gateway::runtime::spawn_core;
use plug_gateway::service::EventBus;
use plug_gateway::ws::handler::{control_handler, proxy_handler};
use plug_gateway::ws::upstream::TungsteniteConnector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = GatewayConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting plug-gateway");

    // Start the connection core
    let event_bus = EventBus::new(config.event_bus_capacity);
    let (core, core_thread) =
        spawn_core(config.core_settings(), event_bus.clone(), TungsteniteConnector)?;

    // Build application state
    let app_state = AppState { core, event_bus };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .route("/control", get(control_handler))
        .route("/proxy", get(proxy_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    // The router (and with it every CoreHandle) is gone; let the core drain.
    if core_thread.join().is_err() {
        tracing::error!("connection core panicked");
    }

    Ok(())
}
