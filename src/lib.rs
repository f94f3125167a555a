//! # plug-gateway
//!
//! WebSocket gateway whose upstream connections can be "unplugged": while
//! unplugged, outgoing frames, close requests and incoming events are held
//! in a per-connection backlog and replayed in order once plugged again.
//!
//! A connection registry tracks every managed connection, answers bulk
//! plug/unplug commands and reports its changes to controllers.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, proxy WS, control WS)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handlers (ws/)
//!     │
//!     ├── CoreHandle (runtime)          ── EventBus (service/)
//!     │                                       ▲
//!     └── connection core thread              │
//!           ├── CommandRouter / ConnectionFactory / notifier (service/)
//!           ├── ConnectionRegistry (domain/)
//!           ├── ManagedConnection + EventTarget (domain/)
//!           └── TungsteniteConnector (ws/upstream)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod runtime;
pub mod service;
pub mod ws;
