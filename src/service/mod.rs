//! Service layer: construction, command routing, and notification wiring.
//!
//! [`ConnectionFactory`] is the single injection point for new managed
//! connections, [`CommandRouter`] turns controller instructions into
//! registry operations, and [`notifier`] forwards registry changes to the
//! control sockets through the [`EventBus`].

pub mod command_router;
pub mod connection_factory;
pub mod notifier;

pub use command_router::{CommandMessage, CommandRouter, RouteError, RoutedCommand};
pub use connection_factory::{ConnectionFactory, OpenedConnection};
pub use notifier::{EventBus, NotificationSink};
