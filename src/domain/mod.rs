//! Domain layer: managed connections, their registry, and event plumbing.
//!
//! Everything in this module except the [`Notification`] wire types is
//! single-threaded (`Rc`/`RefCell`) and lives on the core thread.

pub mod address;
pub mod connection_id;
pub mod connection_registry;
pub mod event_target;
pub mod managed_connection;
pub mod notification;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use address::Address;
pub use connection_id::ConnectionId;
pub use connection_registry::{
    BulkPlugReport, ConnectionInfo, ConnectionRegistry, GlobalPlugState, PlugCommand,
    RegistryChange, RegistryEntry, RegistrySnapshot, SocketState,
};
pub use event_target::{Event, EventTarget, Listener, ListenerOptions};
pub use managed_connection::{BacklogEntry, ManagedConnection, PlugState};
pub use notification::{Notification, NotificationKind, NotificationOrigin};
pub use transport::{Connector, InboundEvents, Payload, Transport, TransportEvent};
