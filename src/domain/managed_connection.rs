//! A real socket wrapped so its traffic can be withheld and replayed.
//!
//! [`ManagedConnection`] sits between a consumer and one [`Transport`]. While
//! *plugged* everything flows straight through. While *unplugged* outbound
//! sends, explicit closes and inbound events are appended to a backlog
//! instead, and the real socket is left open. [`ManagedConnection::resume`]
//! replays the backlog in the order it was recorded.
//!
//! # Closing during replay
//!
//! A replayed `Close` entry (or a replayed inbound `close` event) closes the
//! connection in the middle of the drain. A closed connection accepts no
//! further operations, so every entry queued after it is dropped. The drop
//! is logged at debug level with the number of discarded entries.
//!
//! # Backlog during replay
//!
//! Replay takes entries off the front of the backlog one at a time, so a
//! listener that calls [`ManagedConnection::backlog`] mid-replay sees only
//! the entries that have not been replayed yet. The backlog is empty once
//! the replay finishes.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use chrono::{DateTime, Utc};

use super::event_target::{Event, EventTarget, compose_event_target};
use super::transport::{Payload, Transport, TransportEvent};
use super::{Address, ConnectionId, ConnectionInfo, ConnectionRegistry};

/// Delivery state of a managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlugState {
    /// Traffic flows immediately.
    Plugged,
    /// Traffic is deferred to the backlog.
    Unplugged,
}

/// An action deferred while a connection was unplugged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BacklogEntry {
    /// Outbound frame.
    Send {
        /// Frame body.
        payload: Payload,
        /// When `send` was called.
        at: DateTime<Utc>,
    },
    /// Explicit close request.
    Close {
        /// Requested close code.
        code: Option<u16>,
        /// Requested close reason.
        reason: Option<String>,
        /// When `close` was called.
        at: DateTime<Utc>,
    },
    /// Event reported by the real socket.
    InboundEvent {
        /// The captured event, replayed unchanged.
        event: TransportEvent,
        /// When the socket reported it.
        at: DateTime<Utc>,
    },
}

impl BacklogEntry {
    /// When the deferred action originally happened.
    #[must_use]
    pub const fn recorded_at(&self) -> DateTime<Utc> {
        match self {
            Self::Send { at, .. } | Self::Close { at, .. } | Self::InboundEvent { at, .. } => *at,
        }
    }
}

/// Proxy around one real socket with plug/unplug control.
///
/// Created through [`crate::service::ConnectionFactory`], which registers it
/// with the [`ConnectionRegistry`] during construction.
pub struct ManagedConnection {
    id: Cell<ConnectionId>,
    address: Address,
    sub_protocols: Vec<String>,
    transport: RefCell<Box<dyn Transport>>,
    state: Cell<PlugState>,
    closed: Cell<bool>,
    draining: Cell<bool>,
    backlog: RefCell<VecDeque<BacklogEntry>>,
    events: EventTarget<TransportEvent>,
    registry: Weak<ConnectionRegistry>,
}

compose_event_target!(ManagedConnection, events, TransportEvent, {
    "open" => onopen / set_onopen,
    "message" => onmessage / set_onmessage,
    "close" => onclose / set_onclose,
    "error" => onerror / set_onerror,
});

impl ManagedConnection {
    /// Wraps `transport` and registers the new connection with `registry`.
    ///
    /// The connection starts plugged; the registry pauses it right away when
    /// its last bulk operation unplugged everything.
    #[must_use]
    pub fn open(
        registry: &Rc<ConnectionRegistry>,
        transport: Box<dyn Transport>,
        address: Address,
        sub_protocols: Vec<String>,
    ) -> Rc<Self> {
        let connection = Rc::new(Self {
            id: Cell::new(ConnectionId::UNASSIGNED),
            address: address.clone(),
            sub_protocols: sub_protocols.clone(),
            transport: RefCell::new(transport),
            state: Cell::new(PlugState::Plugged),
            closed: Cell::new(false),
            draining: Cell::new(false),
            backlog: RefCell::new(VecDeque::new()),
            events: EventTarget::new(Self::EVENT_SLOTS),
            registry: Rc::downgrade(registry),
        });

        let info = ConnectionInfo {
            address,
            sub_protocols,
        };
        let id = registry.register(Rc::clone(&connection), info);
        connection.id.set(id);

        tracing::debug!(%id, address = %connection.address, "managed connection opened");
        connection
    }

    /// Registry-assigned id.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id.get()
    }

    /// Address the real socket was opened against.
    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Sub-protocols offered at construction.
    #[must_use]
    pub fn sub_protocols(&self) -> &[String] {
        &self.sub_protocols
    }

    /// Current delivery state.
    #[must_use]
    pub fn plug_state(&self) -> PlugState {
        self.state.get()
    }

    /// Returns `true` while traffic flows immediately.
    #[must_use]
    pub fn is_plugged(&self) -> bool {
        self.state.get() == PlugState::Plugged
    }

    /// Returns `true` once the connection has closed and gone inert.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Number of deferred actions waiting for [`Self::resume`].
    #[must_use]
    pub fn backlog_len(&self) -> usize {
        self.backlog.borrow().len()
    }

    /// Copy of the deferred actions, oldest first.
    #[must_use]
    pub fn backlog(&self) -> Vec<BacklogEntry> {
        self.backlog.borrow().iter().cloned().collect()
    }

    /// Sends `payload`, or defers it while unplugged.
    pub fn send(&self, payload: Payload) {
        if self.ignore_when_closed("send") {
            return;
        }
        match self.state.get() {
            PlugState::Plugged => self.transport.borrow_mut().send(payload),
            PlugState::Unplugged => self.defer(BacklogEntry::Send {
                payload,
                at: Utc::now(),
            }),
        }
    }

    /// Closes the real socket and leaves the registry, or defers the close
    /// while unplugged (the real socket stays open).
    pub fn close(&self, code: Option<u16>, reason: Option<String>) {
        if self.ignore_when_closed("close") {
            return;
        }
        match self.state.get() {
            PlugState::Plugged => {
                self.closed.set(true);
                self.transport.borrow_mut().close(code, reason);
                self.leave_registry();
            }
            PlugState::Unplugged => self.defer(BacklogEntry::Close {
                code,
                reason,
                at: Utc::now(),
            }),
        }
    }

    /// Handles an event reported by the real socket.
    ///
    /// Plugged: dispatched to this connection's listeners. Unplugged:
    /// deferred. Delivering a `close` event makes the connection inert and
    /// removes it from the registry.
    pub fn on_transport_event(&self, event: TransportEvent) {
        if self.ignore_when_closed(event.kind()) {
            return;
        }
        match self.state.get() {
            PlugState::Plugged => self.deliver(event),
            PlugState::Unplugged => self.defer(BacklogEntry::InboundEvent {
                event,
                at: Utc::now(),
            }),
        }
    }

    /// Stops delivery. Idempotent.
    pub fn pause(&self) {
        if self.ignore_when_closed("pause") {
            return;
        }
        if self.state.replace(PlugState::Unplugged) == PlugState::Plugged {
            tracing::debug!(id = %self.id(), "connection unplugged");
        }
    }

    /// Restores delivery and replays the backlog in FIFO order.
    ///
    /// The state flips to plugged before the first entry is replayed, so
    /// calls made by listeners during the replay see a plugged connection.
    /// A listener that pauses the connection stops the replay; the entries
    /// not yet replayed stay at the front of the backlog.
    pub fn resume(&self) {
        if self.ignore_when_closed("resume") {
            return;
        }
        self.state.set(PlugState::Plugged);
        if self.draining.get() {
            return;
        }

        self.draining.set(true);
        let mut replayed = 0_usize;
        while self.is_plugged() && !self.closed.get() {
            let Some(entry) = self.backlog.borrow_mut().pop_front() else {
                break;
            };
            replayed += 1;
            self.replay(entry);
        }
        self.draining.set(false);

        if self.closed.get() {
            let dropped = {
                let mut backlog = self.backlog.borrow_mut();
                let dropped = backlog.len();
                backlog.clear();
                dropped
            };
            if dropped > 0 {
                tracing::debug!(
                    id = %self.id(),
                    dropped,
                    "connection closed during replay; remaining backlog dropped"
                );
            }
        }

        if replayed > 0 {
            tracing::debug!(id = %self.id(), replayed, "backlog replayed");
        }
    }

    /// Calls [`Self::resume`] or [`Self::pause`].
    pub fn set_plugged(&self, plugged: bool) {
        if plugged {
            self.resume();
        } else {
            self.pause();
        }
    }

    fn replay(&self, entry: BacklogEntry) {
        match entry {
            BacklogEntry::Send { payload, .. } => self.send(payload),
            BacklogEntry::Close { code, reason, .. } => self.close(code, reason),
            BacklogEntry::InboundEvent { event, .. } => self.on_transport_event(event),
        }
    }

    fn deliver(&self, event: TransportEvent) {
        let terminal = matches!(event, TransportEvent::Close { .. });
        let event = Event::new(event.kind(), event);
        self.events.dispatch(&event);

        if terminal && !self.closed.replace(true) {
            tracing::debug!(id = %self.id(), "transport closed by peer");
            self.leave_registry();
        }
    }

    fn defer(&self, entry: BacklogEntry) {
        self.backlog.borrow_mut().push_back(entry);
        tracing::trace!(id = %self.id(), backlog = self.backlog_len(), "action deferred");
    }

    fn leave_registry(&self) {
        if let Some(registry) = self.registry.upgrade() {
            let _ = registry.deregister(self.id());
        }
    }

    fn ignore_when_closed(&self, operation: &str) -> bool {
        if self.closed.get() {
            tracing::debug!(id = %self.id(), operation, "ignored on closed connection");
            return true;
        }
        false
    }
}

impl fmt::Debug for ManagedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedConnection")
            .field("id", &self.id.get())
            .field("address", &self.address)
            .field("sub_protocols", &self.sub_protocols)
            .field("state", &self.state.get())
            .field("closed", &self.closed.get())
            .field("backlog", &self.backlog.borrow().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::event_target::{Listener, ListenerOptions};
    use crate::domain::testing::{Wire, open_recorded};

    fn message(text: &str) -> TransportEvent {
        TransportEvent::Message(Payload::from(text))
    }

    fn message_log(connection: &ManagedConnection) -> Rc<RefCell<Vec<Payload>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        connection.set_onmessage(Some(Rc::new(move |event: &Event<TransportEvent>| {
            if let TransportEvent::Message(payload) = event.detail() {
                sink.borrow_mut().push(payload.clone());
            }
        })));
        log
    }

    #[test]
    fn plugged_send_forwards_immediately() {
        let registry = Rc::new(ConnectionRegistry::new());
        let (connection, wire) = open_recorded(&registry);

        connection.send(Payload::from("a"));
        assert_eq!(*wire.borrow(), vec![Wire::Sent(Payload::from("a"))]);
        assert_eq!(connection.backlog_len(), 0);
    }

    #[test]
    fn unplugged_sends_replay_in_order() {
        let registry = Rc::new(ConnectionRegistry::new());
        let (connection, wire) = open_recorded(&registry);

        connection.pause();
        for text in ["one", "two", "three"] {
            connection.send(Payload::from(text));
        }
        assert!(wire.borrow().is_empty());
        assert_eq!(connection.backlog_len(), 3);

        connection.resume();
        assert_eq!(
            *wire.borrow(),
            vec![
                Wire::Sent(Payload::from("one")),
                Wire::Sent(Payload::from("two")),
                Wire::Sent(Payload::from("three")),
            ]
        );
        assert_eq!(connection.backlog_len(), 0);
    }

    #[test]
    fn pause_then_resume_is_invisible() {
        let registry = Rc::new(ConnectionRegistry::new());
        let (connection, wire) = open_recorded(&registry);

        connection.pause();
        connection.pause();
        connection.resume();
        assert!(wire.borrow().is_empty());
        assert!(connection.is_plugged());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unplugged_close_keeps_transport_open() {
        let registry = Rc::new(ConnectionRegistry::new());
        let (connection, wire) = open_recorded(&registry);

        connection.pause();
        connection.close(Some(1000), Some("bye".to_string()));
        assert!(wire.borrow().is_empty());
        assert!(!connection.is_closed());
        assert!(registry.get(connection.id()).is_some());

        connection.resume();
        assert_eq!(
            *wire.borrow(),
            vec![Wire::Closed(Some(1000), Some("bye".to_string()))]
        );
        assert!(connection.is_closed());
        assert!(registry.get(connection.id()).is_none());
    }

    #[test]
    fn plugged_close_deregisters() {
        let registry = Rc::new(ConnectionRegistry::new());
        let (connection, wire) = open_recorded(&registry);

        connection.close(None, None);
        assert_eq!(*wire.borrow(), vec![Wire::Closed(None, None)]);
        assert!(registry.is_empty());
        assert_eq!(registry.removed(), vec![connection.id()]);
    }

    #[test]
    fn entries_after_replayed_close_are_dropped() {
        let registry = Rc::new(ConnectionRegistry::new());
        let (connection, wire) = open_recorded(&registry);

        connection.pause();
        connection.send(Payload::from("before"));
        connection.close(None, None);
        connection.send(Payload::from("after"));
        connection.resume();

        assert_eq!(
            *wire.borrow(),
            vec![Wire::Sent(Payload::from("before")), Wire::Closed(None, None)]
        );
        assert_eq!(connection.backlog_len(), 0);
    }

    #[test]
    fn closed_connection_is_inert() {
        let registry = Rc::new(ConnectionRegistry::new());
        let (connection, wire) = open_recorded(&registry);
        let log = message_log(&connection);

        connection.close(None, None);
        connection.send(Payload::from("late"));
        connection.pause();
        connection.on_transport_event(message("late"));

        assert_eq!(*wire.borrow(), vec![Wire::Closed(None, None)]);
        assert!(connection.is_plugged());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn inbound_message_waits_for_resume() {
        let registry = Rc::new(ConnectionRegistry::new());
        let (connection, _wire) = open_recorded(&registry);
        let log = message_log(&connection);

        connection.pause();
        connection.on_transport_event(message("hot-update"));
        assert!(log.borrow().is_empty());

        connection.resume();
        assert_eq!(*log.borrow(), vec![Payload::from("hot-update")]);
    }

    #[test]
    fn inbound_close_deregisters_when_delivered() {
        let registry = Rc::new(ConnectionRegistry::new());
        let (connection, _wire) = open_recorded(&registry);

        connection.pause();
        connection.on_transport_event(TransportEvent::Close {
            code: 1001,
            reason: String::new(),
        });
        assert!(registry.get(connection.id()).is_some());

        connection.resume();
        assert!(connection.is_closed());
        assert!(registry.is_empty());
    }

    #[test]
    fn listener_send_during_replay_forwards_in_place() {
        let registry = Rc::new(ConnectionRegistry::new());
        let (connection, wire) = open_recorded(&registry);
        let echo = Rc::downgrade(&connection);
        connection.set_onmessage(Some(Rc::new(move |event: &Event<TransportEvent>| {
            if let (Some(connection), TransportEvent::Message(payload)) =
                (echo.upgrade(), event.detail())
            {
                connection.send(payload.clone());
            }
        })));

        connection.pause();
        connection.send(Payload::from("first"));
        connection.on_transport_event(message("echo"));
        connection.send(Payload::from("last"));
        connection.resume();

        assert_eq!(
            *wire.borrow(),
            vec![
                Wire::Sent(Payload::from("first")),
                Wire::Sent(Payload::from("echo")),
                Wire::Sent(Payload::from("last")),
            ]
        );
    }

    #[test]
    fn pause_from_listener_stops_replay() {
        let registry = Rc::new(ConnectionRegistry::new());
        let (connection, wire) = open_recorded(&registry);
        let handle = Rc::downgrade(&connection);
        let pause: Listener<TransportEvent> = Rc::new(move |_event: &Event<TransportEvent>| {
            if let Some(connection) = handle.upgrade() {
                connection.pause();
            }
        });
        connection.add_listener("message", pause, ListenerOptions::once());

        connection.pause();
        connection.on_transport_event(message("stop"));
        connection.send(Payload::from("held"));
        connection.resume();

        assert!(wire.borrow().is_empty());
        assert!(!connection.is_plugged());
        assert_eq!(connection.backlog_len(), 1);

        connection.resume();
        assert_eq!(*wire.borrow(), vec![Wire::Sent(Payload::from("held"))]);
    }

    #[test]
    fn resume_from_listener_leaves_outer_replay_in_charge() {
        let registry = Rc::new(ConnectionRegistry::new());
        let (connection, wire) = open_recorded(&registry);
        let handle = Rc::downgrade(&connection);
        let toggle: Listener<TransportEvent> = Rc::new(move |_event: &Event<TransportEvent>| {
            if let Some(connection) = handle.upgrade() {
                connection.pause();
                connection.resume();
                connection.send(Payload::from("inside"));
            }
        });
        connection.add_listener("message", toggle, ListenerOptions::once());

        connection.pause();
        connection.on_transport_event(message("toggle"));
        connection.send(Payload::from("a"));
        connection.send(Payload::from("b"));
        connection.resume();

        assert_eq!(
            *wire.borrow(),
            vec![
                Wire::Sent(Payload::from("inside")),
                Wire::Sent(Payload::from("a")),
                Wire::Sent(Payload::from("b")),
            ]
        );
        assert!(connection.is_plugged());
        assert_eq!(connection.backlog_len(), 0);
    }

    #[test]
    fn backlog_shrinks_as_entries_replay() {
        let registry = Rc::new(ConnectionRegistry::new());
        let (connection, _wire) = open_recorded(&registry);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let handle = Rc::downgrade(&connection);
        let sink = Rc::clone(&seen);
        connection.set_onmessage(Some(Rc::new(move |_event: &Event<TransportEvent>| {
            if let Some(connection) = handle.upgrade() {
                sink.borrow_mut().push(connection.backlog_len());
            }
        })));

        connection.pause();
        connection.on_transport_event(message("one"));
        connection.on_transport_event(message("two"));
        connection.send(Payload::from("three"));
        connection.resume();

        assert_eq!(*seen.borrow(), vec![2, 1]);
        assert_eq!(connection.backlog_len(), 0);
    }

    #[test]
    fn backlog_records_timestamps_in_order() {
        let registry = Rc::new(ConnectionRegistry::new());
        let (connection, _wire) = open_recorded(&registry);

        connection.pause();
        connection.send(Payload::from("a"));
        connection.on_transport_event(TransportEvent::Open);
        let backlog = connection.backlog();
        let [first, second] = backlog.as_slice() else {
            panic!("expected two entries");
        };
        assert!(matches!(first, BacklogEntry::Send { .. }));
        assert!(first.recorded_at() <= second.recorded_at());
    }
}
