//! The single-threaded connection core and its cross-thread handle.
//!
//! Registry, connections and router use `Rc`/`RefCell` and never leave the
//! core thread. That thread runs a current-thread tokio runtime inside a
//! [`LocalSet`]; every request, proxied frame and transport event is handled
//! as one uninterrupted turn, so a backlog replay never interleaves with
//! anything else.
//!
//! Axum handlers reach the core through [`CoreHandle`], a cloneable `Send`
//! sender of [`CoreRequest`]s with oneshot replies.

use std::rc::Rc;
use std::thread::JoinHandle;

use axum::extract::ws::WebSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::task::LocalSet;

use crate::domain::{
    BulkPlugReport, ConnectionId, ConnectionRegistry, Connector, RegistrySnapshot, SocketState,
};
use crate::error::GatewayError;
use crate::service::{CommandMessage, CommandRouter, ConnectionFactory, EventBus, notifier};
use crate::ws::proxy;

/// Startup options of the core.
#[derive(Debug, Clone, Copy)]
pub struct CoreSettings {
    /// Capacity of the request queue between the HTTP layer and the core.
    pub queue_capacity: usize,
    /// Apply `unplug_all` before anything connects.
    pub start_unplugged: bool,
}

/// Work item for the core thread.
#[derive(Debug)]
pub enum CoreRequest {
    /// Route a controller command.
    Command {
        /// The command as received.
        message: CommandMessage,
        /// Receives the bulk report, or `None` if the command was discarded.
        reply: oneshot::Sender<Option<BulkPlugReport>>,
    },
    /// Read the registry state.
    Snapshot {
        /// Receives the snapshot.
        reply: oneshot::Sender<RegistrySnapshot>,
    },
    /// Read one live connection.
    Socket {
        /// Connection to look up.
        id: ConnectionId,
        /// Receives the state, or `None` for an unknown id.
        reply: oneshot::Sender<Option<SocketState>>,
    },
    /// Relay an accepted downstream socket through a managed upstream one.
    Proxy {
        /// Downstream socket, already upgraded.
        socket: WebSocket,
        /// Upstream address.
        target: String,
        /// Sub-protocols to offer upstream.
        protocols: Vec<String>,
    },
}

/// Cloneable, thread-safe entry point into the core.
#[derive(Debug, Clone)]
pub struct CoreHandle {
    sender: mpsc::Sender<CoreRequest>,
}

impl CoreHandle {
    /// Routes `message` and returns the bulk report if it was applied.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CoreUnavailable`] if the core has stopped.
    pub async fn command(
        &self,
        message: CommandMessage,
    ) -> Result<Option<BulkPlugReport>, GatewayError> {
        let (reply, response) = oneshot::channel();
        self.submit(CoreRequest::Command { message, reply }).await?;
        response.await.map_err(|_| GatewayError::CoreUnavailable)
    }

    /// Returns the current registry snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CoreUnavailable`] if the core has stopped.
    pub async fn snapshot(&self) -> Result<RegistrySnapshot, GatewayError> {
        let (reply, response) = oneshot::channel();
        self.submit(CoreRequest::Snapshot { reply }).await?;
        response.await.map_err(|_| GatewayError::CoreUnavailable)
    }

    /// Returns the state of one live connection.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConnectionNotFound`] for an id that is not
    /// live and [`GatewayError::CoreUnavailable`] if the core has stopped.
    pub async fn socket(&self, id: ConnectionId) -> Result<SocketState, GatewayError> {
        let (reply, response) = oneshot::channel();
        self.submit(CoreRequest::Socket { id, reply }).await?;
        response
            .await
            .map_err(|_| GatewayError::CoreUnavailable)?
            .ok_or(GatewayError::ConnectionNotFound(id))
    }

    /// Hands a downstream socket to the core for proxying.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CoreUnavailable`] if the core has stopped.
    pub async fn proxy(
        &self,
        socket: WebSocket,
        target: String,
        protocols: Vec<String>,
    ) -> Result<(), GatewayError> {
        self.submit(CoreRequest::Proxy {
            socket,
            target,
            protocols,
        })
        .await
    }

    async fn submit(&self, request: CoreRequest) -> Result<(), GatewayError> {
        self.sender
            .send(request)
            .await
            .map_err(|_| GatewayError::CoreUnavailable)
    }
}

/// Starts the core on a dedicated thread.
///
/// `connector` opens the real upstream sockets; notifications go to
/// `event_bus`. The core stops once every [`CoreHandle`] is dropped.
///
/// # Errors
///
/// Returns an error if the core runtime or thread cannot be created.
pub fn spawn_core<C>(
    settings: CoreSettings,
    event_bus: EventBus,
    connector: C,
) -> anyhow::Result<(CoreHandle, JoinHandle<()>)>
where
    C: Connector + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let thread = std::thread::Builder::new()
        .name("connection-core".to_string())
        .spawn(move || {
            let local = LocalSet::new();
            local.block_on(&runtime, async move {
                let core = Core::new(settings, event_bus, Rc::new(connector));
                core.run(receiver).await;
            });
        })?;

    Ok((CoreHandle { sender }, thread))
}

struct Core {
    registry: Rc<ConnectionRegistry>,
    factory: ConnectionFactory,
    router: CommandRouter,
}

impl Core {
    fn new(settings: CoreSettings, event_bus: EventBus, connector: Rc<dyn Connector>) -> Self {
        let registry = Rc::new(ConnectionRegistry::new());
        if settings.start_unplugged {
            let _ = registry.unplug_all();
        }
        let _ = notifier::install(&registry, event_bus);

        Self {
            factory: ConnectionFactory::new(Rc::clone(&registry), connector),
            router: CommandRouter::new(Rc::clone(&registry)),
            registry,
        }
    }

    async fn run(self, mut receiver: mpsc::Receiver<CoreRequest>) {
        tracing::info!(
            global_state = ?self.registry.global_state(),
            "connection core started"
        );
        while let Some(request) = receiver.recv().await {
            self.handle(request);
        }
        tracing::info!(
            live = self.registry.len(),
            removed = self.registry.removed().len(),
            "connection core stopped"
        );
    }

    fn handle(&self, request: CoreRequest) {
        match request {
            CoreRequest::Command { message, reply } => {
                let _ = reply.send(self.router.route(&message));
            }
            CoreRequest::Snapshot { reply } => {
                let _ = reply.send(self.registry.snapshot());
            }
            CoreRequest::Socket { id, reply } => {
                let _ = reply.send(self.registry.socket(id));
            }
            CoreRequest::Proxy {
                socket,
                target,
                protocols,
            } => {
                tokio::task::spawn_local(proxy::run_session(
                    self.factory.clone(),
                    socket,
                    target,
                    protocols,
                ));
            }
        }
    }
}
