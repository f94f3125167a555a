//! Shared application state injected into all Axum handlers.

use crate::runtime::CoreHandle;
use crate::service::EventBus;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Entry point into the single-threaded connection core.
    pub core: CoreHandle,
    /// Event bus for control-socket subscriptions.
    pub event_bus: EventBus,
}
