//! Bridges registry change events to outbound notifications.
//!
//! The core thread calls [`install`] once; from then on every registry
//! change becomes an `onUpdate` [`Notification`] handed to a
//! [`NotificationSink`]. In the server that sink is the [`EventBus`], which
//! fans notifications out to the control sockets on the HTTP runtime.

use std::rc::Rc;

use tokio::sync::broadcast;

use crate::domain::connection_registry::UPDATE_EVENT;
use crate::domain::{
    ConnectionRegistry, Event, Listener, ListenerOptions, Notification, NotificationOrigin,
    RegistryChange,
};

/// Destination of outbound notifications.
pub trait NotificationSink {
    /// Hands one notification to the external transport.
    fn deliver(&self, notification: Notification);
}

/// Fan-out of notifications from the core thread to every control socket.
///
/// A control socket that falls more than `capacity` notifications behind
/// loses the oldest ones and sees [`broadcast::error::RecvError::Lagged`];
/// each notification carries a full snapshot, so the next one it receives
/// is still current.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Notification>,
}

impl EventBus {
    /// Creates a bus retaining up to `capacity` undelivered notifications
    /// per control socket. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receiver for every notification delivered from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Number of control sockets currently subscribed.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl NotificationSink for EventBus {
    fn deliver(&self, notification: Notification) {
        let origin = notification.origin;
        match self.sender.send(notification) {
            Ok(receivers) => tracing::trace!(?origin, receivers, "notification published"),
            Err(_) => tracing::trace!(?origin, "no control socket subscribed"),
        }
    }
}

/// Sends the `initialization` notification right away, then one `onUpdate`
/// notification per registry change.
///
/// Returns the registered listener so the caller can detach it with
/// [`ConnectionRegistry::remove_listener`].
pub fn install<S>(registry: &Rc<ConnectionRegistry>, sink: S) -> Listener<RegistryChange>
where
    S: NotificationSink + 'static,
{
    sink.deliver(Notification::register(
        NotificationOrigin::Initialization,
        registry.snapshot(),
    ));

    let weak = Rc::downgrade(registry);
    let listener: Listener<RegistryChange> = Rc::new(move |event: &Event<RegistryChange>| {
        let Some(registry) = weak.upgrade() else {
            return;
        };
        tracing::trace!(change = ?event.detail(), "registry changed");
        sink.deliver(Notification::register(
            NotificationOrigin::OnUpdate,
            registry.snapshot(),
        ));
    });
    registry.add_listener(UPDATE_EVENT, Rc::clone(&listener), ListenerOptions::default());
    listener
}
