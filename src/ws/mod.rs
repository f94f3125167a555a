//! WebSocket layer: upstream sockets, proxy sessions, and the control socket.
//!
//! - `/proxy` relays a downstream client through a managed upstream
//!   connection opened with [`upstream::TungsteniteConnector`].
//! - `/control` streams registry notifications and accepts commands.

pub mod control;
pub mod handler;
pub mod messages;
pub mod proxy;
pub mod upstream;
