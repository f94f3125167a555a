//! The one place managed connections are constructed.
//!
//! Hosts never build a real socket directly: they call
//! [`ConnectionFactory::open`] (or [`ConnectionFactory::open_with_protocols`]),
//! which validates the address, asks the [`Connector`] for a real socket,
//! and wraps it in a registered [`ManagedConnection`].

use std::fmt;
use std::rc::Rc;

use crate::domain::{Address, ConnectionRegistry, Connector, InboundEvents, ManagedConnection};
use crate::error::ConnectionError;

/// A freshly opened connection and the read half of its real socket.
#[derive(Debug)]
pub struct OpenedConnection {
    /// The registered connection.
    pub connection: Rc<ManagedConnection>,
    /// Events to pump into [`ManagedConnection::on_transport_event`].
    pub inbound: InboundEvents,
}

impl OpenedConnection {
    /// Feeds every inbound event to the connection, one per turn, until the
    /// real socket finishes.
    pub async fn pump(mut self) {
        while let Some(event) = self.inbound.recv().await {
            self.connection.on_transport_event(event);
        }
    }
}

/// Process-wide constructor for managed connections.
#[derive(Clone)]
pub struct ConnectionFactory {
    registry: Rc<ConnectionRegistry>,
    connector: Rc<dyn Connector>,
}

impl ConnectionFactory {
    /// Creates a factory registering into `registry` and opening real
    /// sockets through `connector`.
    #[must_use]
    pub fn new(registry: Rc<ConnectionRegistry>, connector: Rc<dyn Connector>) -> Self {
        Self {
            registry,
            connector,
        }
    }

    /// Registry new connections join.
    #[must_use]
    pub fn registry(&self) -> &Rc<ConnectionRegistry> {
        &self.registry
    }

    /// Opens a connection to `address` without sub-protocols.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectionError`] when `address` is blank or not a
    /// `ws://`/`wss://` URI. Nothing is registered in that case.
    pub fn open(&self, address: &str) -> Result<OpenedConnection, ConnectionError> {
        self.open_with_protocols(address, Vec::new())
    }

    /// Opens a connection to `address`, offering `protocols`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectionError`] when `address` is blank or not a
    /// `ws://`/`wss://` URI. Nothing is registered in that case.
    pub fn open_with_protocols(
        &self,
        address: &str,
        protocols: Vec<String>,
    ) -> Result<OpenedConnection, ConnectionError> {
        let address = Address::parse(address)?;
        let (transport, inbound) = self.connector.connect(&address, &protocols);
        let connection = ManagedConnection::open(&self.registry, transport, address, protocols);
        Ok(OpenedConnection {
            connection,
            inbound,
        })
    }
}

impl fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
