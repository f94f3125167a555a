//! Directory of every managed connection in the process.
//!
//! [`ConnectionRegistry`] hands out ids, keeps live and removed entries
//! apart, applies bulk plug/unplug, and emits an `update` event for every
//! change. All of it runs on the core thread; interior mutability is plain
//! `RefCell`, never held across a listener call.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use utoipa::ToSchema;

use super::event_target::{Event, EventTarget, compose_event_target};
use super::{Address, ConnectionId, ManagedConnection};

/// Event type of every registry change notification.
pub const UPDATE_EVENT: &str = "update";

/// Construction-time description of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    /// Address the connection was opened against.
    #[schema(value_type = String)]
    pub address: Address,
    /// Sub-protocols offered at construction.
    pub sub_protocols: Vec<String>,
}

/// One registered connection.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    /// Registry-assigned id.
    pub id: ConnectionId,
    /// The connection itself.
    pub connection: Rc<ManagedConnection>,
    /// Construction-time description.
    pub info: ConnectionInfo,
}

/// Summary of the most recent bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GlobalPlugState {
    /// Last bulk operation plugged everything (initial state).
    All,
    /// Last bulk operation unplugged everything.
    None,
}

/// Bulk operation name reported in a [`BulkPlugReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PlugCommand {
    /// `set_plugged_all(true)`.
    Plug,
    /// `set_plugged_all(false)`.
    Unplug,
}

/// Result of [`ConnectionRegistry::set_plugged_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkPlugReport {
    /// Operation applied.
    pub command: PlugCommand,
    /// Number of live connections touched.
    pub total: usize,
    /// Connections that were plugged before the operation.
    pub was_plugged: usize,
    /// Connections that were unplugged before the operation.
    pub was_unplugged: usize,
}

/// State of one live connection inside a [`RegistrySnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SocketState {
    /// Registry-assigned id.
    #[schema(value_type = u64)]
    pub id: ConnectionId,
    /// Construction-time description.
    pub info: ConnectionInfo,
    /// Whether traffic currently flows.
    pub plugged: bool,
}

/// Read-only view of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    /// Result of the most recent bulk operation.
    pub global_state: GlobalPlugState,
    /// Live connections ordered by id.
    pub sockets: Vec<SocketState>,
}

/// Detail of an `update` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RegistryChange {
    /// A connection was registered.
    NewItem {
        /// Id of the new connection.
        id: ConnectionId,
    },
    /// A connection left the live set.
    RemovedItem {
        /// Id of the removed connection.
        id: ConnectionId,
    },
    /// A bulk plug/unplug was applied.
    GlobalState {
        /// Outcome of the bulk operation.
        report: BulkPlugReport,
    },
}

#[derive(Debug)]
struct RegistryState {
    next_id: u64,
    live: BTreeMap<ConnectionId, RegistryEntry>,
    removed: Vec<RegistryEntry>,
    global_state: GlobalPlugState,
}

/// Process-wide directory of managed connections.
///
/// Construct one per process, wrap it in an `Rc`, and hand it to the
/// collaborators that need it.
pub struct ConnectionRegistry {
    state: RefCell<RegistryState>,
    events: EventTarget<RegistryChange>,
}

compose_event_target!(ConnectionRegistry, events, RegistryChange, {
    "update" => onupdate / set_onupdate,
});

impl ConnectionRegistry {
    /// Creates an empty registry with every connection plugged.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RefCell::new(RegistryState {
                next_id: 1,
                live: BTreeMap::new(),
                removed: Vec::new(),
                global_state: GlobalPlugState::All,
            }),
            events: EventTarget::new(Self::EVENT_SLOTS),
        }
    }

    /// Adds `connection` to the live set and returns its id.
    ///
    /// Pauses the connection when the last bulk operation unplugged
    /// everything, then emits [`RegistryChange::NewItem`].
    pub fn register(&self, connection: Rc<ManagedConnection>, info: ConnectionInfo) -> ConnectionId {
        let (id, global_state) = {
            let mut state = self.state.borrow_mut();
            let id = ConnectionId::new(state.next_id);
            state.next_id += 1;
            state.live.insert(
                id,
                RegistryEntry {
                    id,
                    connection: Rc::clone(&connection),
                    info,
                },
            );
            (id, state.global_state)
        };

        if global_state == GlobalPlugState::None {
            connection.pause();
        }

        tracing::debug!(%id, ?global_state, "connection registered");
        self.emit(RegistryChange::NewItem { id });
        id
    }

    /// Moves the entry for `id` from the live set to the removed history.
    ///
    /// Returns `None` (and emits nothing) for an id that is not live.
    pub fn deregister(&self, id: ConnectionId) -> Option<RegistryEntry> {
        let removed = {
            let mut state = self.state.borrow_mut();
            let entry = state.live.remove(&id)?;
            state.removed.push(entry.clone());
            entry
        };

        tracing::debug!(%id, "connection deregistered");
        self.emit(RegistryChange::RemovedItem { id });
        Some(removed)
    }

    /// Looks up a live connection.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<Rc<ManagedConnection>> {
        self.state
            .borrow()
            .live
            .get(&id)
            .map(|entry| Rc::clone(&entry.connection))
    }

    /// Ids of removed connections, in removal order.
    #[must_use]
    pub fn removed(&self) -> Vec<ConnectionId> {
        self.state
            .borrow()
            .removed
            .iter()
            .map(|entry| entry.id)
            .collect()
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().live.len()
    }

    /// Returns `true` if no connection is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.borrow().live.is_empty()
    }

    /// Result of the most recent bulk operation.
    #[must_use]
    pub fn global_state(&self) -> GlobalPlugState {
        self.state.borrow().global_state
    }

    /// Captures the global state and every live connection's state.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.borrow();
        RegistrySnapshot {
            global_state: state.global_state,
            sockets: state.live.values().map(socket_state).collect(),
        }
    }

    /// State of one live connection.
    #[must_use]
    pub fn socket(&self, id: ConnectionId) -> Option<SocketState> {
        self.state.borrow().live.get(&id).map(socket_state)
    }

    /// Plugs or unplugs every live connection and records the outcome as
    /// the global state.
    ///
    /// Individual pause/resume calls are not serialized against this; the
    /// last write wins.
    pub fn set_plugged_all(&self, plug: bool) -> BulkPlugReport {
        let connections = self.live_connections();
        let total = connections.len();
        let mut was_plugged = 0;
        for connection in &connections {
            if connection.is_plugged() {
                was_plugged += 1;
            }
            connection.set_plugged(plug);
        }

        let global_state = if plug {
            GlobalPlugState::All
        } else {
            GlobalPlugState::None
        };
        self.state.borrow_mut().global_state = global_state;

        let report = BulkPlugReport {
            command: if plug {
                PlugCommand::Plug
            } else {
                PlugCommand::Unplug
            },
            total,
            was_plugged,
            was_unplugged: total - was_plugged,
        };
        tracing::info!(
            command = ?report.command,
            total,
            was_plugged,
            was_unplugged = report.was_unplugged,
            "bulk plug state applied"
        );
        self.emit(RegistryChange::GlobalState { report });
        report
    }

    /// Shorthand for `set_plugged_all(true)`.
    pub fn plug_all(&self) -> BulkPlugReport {
        self.set_plugged_all(true)
    }

    /// Shorthand for `set_plugged_all(false)`.
    pub fn unplug_all(&self) -> BulkPlugReport {
        self.set_plugged_all(false)
    }

    fn live_connections(&self) -> Vec<Rc<ManagedConnection>> {
        self.state
            .borrow()
            .live
            .values()
            .map(|entry| Rc::clone(&entry.connection))
            .collect()
    }

    fn emit(&self, change: RegistryChange) {
        self.events.dispatch(&Event::new(UPDATE_EVENT, change));
    }
}

fn socket_state(entry: &RegistryEntry) -> SocketState {
    SocketState {
        id: entry.id,
        info: entry.info.clone(),
        plugged: entry.connection.is_plugged(),
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ConnectionRegistry")
            .field("next_id", &state.next_id)
            .field("live", &state.live.len())
            .field("removed", &state.removed.len())
            .field("global_state", &state.global_state)
            .field("events", &self.events)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::event_target::ListenerOptions;
    use crate::domain::testing::open_recorded;

    fn change_log(registry: &ConnectionRegistry) -> Rc<RefCell<Vec<RegistryChange>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        registry.add_listener(
            UPDATE_EVENT,
            Rc::new(move |event: &Event<RegistryChange>| {
                sink.borrow_mut().push(event.detail().clone());
            }),
            ListenerOptions::default(),
        );
        log
    }

    #[test]
    fn ids_are_sequential_from_one() {
        let registry = Rc::new(ConnectionRegistry::new());
        let ids: Vec<u64> = (0..4)
            .map(|_| open_recorded(&registry).0.id().as_u64())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn removed_ids_are_never_reused() {
        let registry = Rc::new(ConnectionRegistry::new());
        let (first, _) = open_recorded(&registry);
        let (second, _) = open_recorded(&registry);
        first.close(None, None);
        second.close(None, None);

        let (third, _) = open_recorded(&registry);
        assert_eq!(third.id(), ConnectionId::new(3));
        assert_eq!(
            registry.removed(),
            vec![ConnectionId::new(1), ConnectionId::new(2)]
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn deregister_unknown_id_is_none() {
        let registry = ConnectionRegistry::new();
        let log = change_log(&registry);
        assert!(registry.deregister(ConnectionId::new(99)).is_none());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn register_and_deregister_emit_changes() {
        let registry = Rc::new(ConnectionRegistry::new());
        let log = change_log(&registry);
        let (connection, _) = open_recorded(&registry);
        let Some(entry) = registry.deregister(connection.id()) else {
            panic!("entry should be live");
        };
        assert_eq!(entry.id, connection.id());
        assert_eq!(
            *log.borrow(),
            vec![
                RegistryChange::NewItem { id: entry.id },
                RegistryChange::RemovedItem { id: entry.id },
            ]
        );
    }

    #[test]
    fn bulk_unplug_counts_previous_states() {
        let registry = Rc::new(ConnectionRegistry::new());
        let (a, _) = open_recorded(&registry);
        let (b, _) = open_recorded(&registry);
        let (c, _) = open_recorded(&registry);
        b.pause();

        let report = registry.set_plugged_all(false);
        assert_eq!(
            report,
            BulkPlugReport {
                command: PlugCommand::Unplug,
                total: 3,
                was_plugged: 2,
                was_unplugged: 1,
            }
        );
        assert!(!a.is_plugged() && !b.is_plugged() && !c.is_plugged());
        assert_eq!(registry.global_state(), GlobalPlugState::None);
    }

    #[test]
    fn connection_after_bulk_unplug_starts_unplugged() {
        let registry = Rc::new(ConnectionRegistry::new());
        let _ = registry.unplug_all();
        let (late, wire) = open_recorded(&registry);
        assert!(!late.is_plugged());

        late.send(crate::domain::Payload::from("held"));
        assert!(wire.borrow().is_empty());

        let report = registry.plug_all();
        assert_eq!(report.was_unplugged, 1);
        assert_eq!(wire.borrow().len(), 1);
        assert_eq!(registry.global_state(), GlobalPlugState::All);
    }

    #[test]
    fn bulk_plug_survives_close_during_replay() {
        let registry = Rc::new(ConnectionRegistry::new());
        let (closing, _) = open_recorded(&registry);
        let (staying, _) = open_recorded(&registry);
        let _ = registry.unplug_all();
        closing.close(None, None);

        let report = registry.plug_all();
        assert_eq!(report.total, 2);
        assert!(closing.is_closed());
        assert!(staying.is_plugged());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn snapshot_lists_live_sockets_by_id() {
        let registry = Rc::new(ConnectionRegistry::new());
        let (a, _) = open_recorded(&registry);
        let (b, _) = open_recorded(&registry);
        b.pause();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.global_state, GlobalPlugState::All);
        let plugged: Vec<(ConnectionId, bool)> = snapshot
            .sockets
            .iter()
            .map(|socket| (socket.id, socket.plugged))
            .collect();
        assert_eq!(plugged, vec![(a.id(), true), (b.id(), false)]);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let registry = Rc::new(ConnectionRegistry::new());
        let _ = open_recorded(&registry);
        let Ok(json) = serde_json::to_value(registry.snapshot()) else {
            panic!("snapshot serializes");
        };
        assert_eq!(json["globalState"], "all");
        assert_eq!(json["sockets"][0]["id"], 1);
        assert_eq!(json["sockets"][0]["plugged"], true);
        assert_eq!(json["sockets"][0]["info"]["address"], "ws://localhost:5173/hmr");
        assert!(json["sockets"][0]["info"]["subProtocols"].is_array());
    }

    #[test]
    fn onupdate_slot_receives_bulk_report() {
        let registry = ConnectionRegistry::new();
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        registry.set_onupdate(Some(Rc::new(move |event: &Event<RegistryChange>| {
            if let RegistryChange::GlobalState { report } = event.detail() {
                *sink.borrow_mut() = Some(*report);
            }
        })));

        let report = registry.unplug_all();
        assert_eq!(*seen.borrow(), Some(report));
        assert_eq!(report.total, 0);
    }

    #[test]
    fn listener_may_snapshot_during_change() {
        let registry = Rc::new(ConnectionRegistry::new());
        let sizes = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&sizes);
        let weak = Rc::downgrade(&registry);
        registry.add_listener(
            UPDATE_EVENT,
            Rc::new(move |_event: &Event<RegistryChange>| {
                if let Some(registry) = weak.upgrade() {
                    sink.borrow_mut().push(registry.snapshot().sockets.len());
                }
            }),
            ListenerOptions::default(),
        );

        let (connection, _) = open_recorded(&registry);
        connection.close(None, None);
        assert_eq!(*sizes.borrow(), vec![1, 0]);
    }
}
