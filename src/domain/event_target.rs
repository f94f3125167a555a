//! In-process event target with explicit and assignment-slot listeners.
//!
//! [`EventTarget`] is composed into any type that publishes events to local
//! listeners. Two registration styles share one ordered list per event type:
//!
//! - explicit listeners added with [`EventTarget::add_listener`], and
//! - at most one *slot* listener per allow-listed type, replaced wholesale by
//!   [`EventTarget::set_slot`] and surfaced on the composing type as
//!   `on<type>` / `set_on<type>` accessors by [`compose_event_target!`].
//!
//! Listeners run in the order they were added or assigned, whatever their
//! kind. Event types outside the slot allow-list still work with explicit
//! listeners.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Callback invoked with every dispatched event of the type it listens to.
///
/// Identity for [`EventTarget::remove_listener`] is the `Rc` allocation, so
/// keep a clone of the handle to remove it later.
pub type Listener<D> = Rc<dyn Fn(&Event<D>)>;

/// Per-listener registration options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Remove the listener after the first dispatch pass that invokes it.
    pub once: bool,
}

impl ListenerOptions {
    /// Options for a listener that fires a single time.
    #[must_use]
    pub const fn once() -> Self {
        Self { once: true }
    }
}

/// An event travelling through an [`EventTarget`].
#[derive(Debug, Clone)]
pub struct Event<D> {
    kind: String,
    detail: D,
    default_prevented: Cell<bool>,
}

impl<D> Event<D> {
    /// Creates an event of type `kind` carrying `detail`.
    #[must_use]
    pub fn new(kind: impl Into<String>, detail: D) -> Self {
        Self {
            kind: kind.into(),
            detail,
            default_prevented: Cell::new(false),
        }
    }

    /// Event type used to select listeners.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Payload attached at construction.
    #[must_use]
    pub fn detail(&self) -> &D {
        &self.detail
    }

    /// Sets the cancel flag. Observed as a `false` return from dispatch.
    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    /// Returns `true` once any listener called [`Self::prevent_default`].
    #[must_use]
    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }
}

/// Errors raised by slot assignment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// The event type is not in the target's slot allow-list.
    #[error("event type `{0}` has no assignment slot")]
    NoSlot(String),
}

struct ListenerRecord<D> {
    serial: u64,
    callback: Listener<D>,
    options: ListenerOptions,
    is_slot: bool,
}

impl<D> Clone for ListenerRecord<D> {
    fn clone(&self) -> Self {
        Self {
            serial: self.serial,
            callback: Rc::clone(&self.callback),
            options: self.options,
            is_slot: self.is_slot,
        }
    }
}

/// Ordered listener lists keyed by event type.
pub struct EventTarget<D> {
    slots: &'static [&'static str],
    listeners: RefCell<HashMap<String, Vec<ListenerRecord<D>>>>,
    next_serial: Cell<u64>,
}

impl<D> EventTarget<D> {
    /// Creates a target whose assignment slots are limited to `slots`.
    #[must_use]
    pub fn new(slots: &'static [&'static str]) -> Self {
        Self {
            slots,
            listeners: RefCell::new(HashMap::new()),
            next_serial: Cell::new(0),
        }
    }

    /// Returns `true` if `kind` has an assignment slot.
    #[must_use]
    pub fn has_slot(&self, kind: &str) -> bool {
        self.slots.contains(&kind)
    }

    /// Appends an explicit listener for `kind`.
    pub fn add_listener(&self, kind: &str, callback: Listener<D>, options: ListenerOptions) {
        self.push(kind, callback, options, false);
    }

    /// Removes explicit listeners for `kind` that share `callback`'s
    /// allocation. The slot listener is never touched.
    pub fn remove_listener(&self, kind: &str, callback: &Listener<D>) {
        if let Some(list) = self.listeners.borrow_mut().get_mut(kind) {
            list.retain(|record| record.is_slot || !Rc::ptr_eq(&record.callback, callback));
        }
    }

    /// Replaces the slot listener for `kind`; `None` clears it.
    ///
    /// The new listener takes the last position in the shared order.
    /// Explicit listeners are left as they are.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::NoSlot`] if `kind` is not in the allow-list.
    pub fn set_slot(&self, kind: &str, callback: Option<Listener<D>>) -> Result<(), EventError> {
        if !self.has_slot(kind) {
            return Err(EventError::NoSlot(kind.to_string()));
        }
        if let Some(list) = self.listeners.borrow_mut().get_mut(kind) {
            list.retain(|record| !record.is_slot);
        }
        if let Some(callback) = callback {
            self.push(kind, callback, ListenerOptions::default(), true);
        }
        Ok(())
    }

    /// Returns the current slot listener for `kind`.
    #[must_use]
    pub fn slot(&self, kind: &str) -> Option<Listener<D>> {
        self.listeners
            .borrow()
            .get(kind)
            .and_then(|list| list.iter().find(|record| record.is_slot))
            .map(|record| Rc::clone(&record.callback))
    }

    /// Number of listeners (explicit and slot) registered for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: &str) -> usize {
        self.listeners.borrow().get(kind).map_or(0, Vec::len)
    }

    /// Invokes every listener registered for `event.kind()`.
    ///
    /// The pass runs over the list as it stood when dispatch began, so
    /// listeners may add or remove listeners, or dispatch again, without
    /// affecting the current pass. `once` listeners are removed after the
    /// pass. Returns `false` if a listener called
    /// [`Event::prevent_default`].
    pub fn dispatch(&self, event: &Event<D>) -> bool {
        let pass: Vec<ListenerRecord<D>> = match self.listeners.borrow().get(event.kind()) {
            Some(list) if !list.is_empty() => list.clone(),
            _ => return !event.default_prevented(),
        };

        for record in &pass {
            (record.callback)(event);
        }

        let spent: Vec<u64> = pass
            .iter()
            .filter(|record| record.options.once)
            .map(|record| record.serial)
            .collect();
        if !spent.is_empty()
            && let Some(list) = self.listeners.borrow_mut().get_mut(event.kind())
        {
            list.retain(|record| !spent.contains(&record.serial));
        }

        !event.default_prevented()
    }

    fn push(&self, kind: &str, callback: Listener<D>, options: ListenerOptions, is_slot: bool) {
        let serial = self.next_serial.get();
        self.next_serial.set(serial.wrapping_add(1));
        self.listeners
            .borrow_mut()
            .entry(kind.to_string())
            .or_default()
            .push(ListenerRecord {
                serial,
                callback,
                options,
                is_slot,
            });
    }
}

impl<D> fmt::Debug for EventTarget<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<String, usize> = self
            .listeners
            .borrow()
            .iter()
            .map(|(kind, list)| (kind.clone(), list.len()))
            .collect();
        f.debug_struct("EventTarget")
            .field("slots", &self.slots)
            .field("listeners", &counts)
            .finish()
    }
}

/// Composes an [`EventTarget`] field onto a type.
///
/// Generates the slot allow-list constant `EVENT_SLOTS`, delegating
/// `add_listener` / `remove_listener` / `dispatch_event` methods, and one
/// `on<type>` / `set_on<type>` accessor pair per slot.
macro_rules! compose_event_target {
    (
        $ty:ty, $field:ident, $detail:ty,
        { $($kind:literal => $getter:ident / $setter:ident),* $(,)? }
    ) => {
        impl $ty {
            const EVENT_SLOTS: &'static [&'static str] = &[$($kind),*];

            /// Appends an explicit listener for `kind`.
            pub fn add_listener(
                &self,
                kind: &str,
                callback: $crate::domain::event_target::Listener<$detail>,
                options: $crate::domain::event_target::ListenerOptions,
            ) {
                self.$field.add_listener(kind, callback, options);
            }

            /// Removes an explicit listener previously added for `kind`.
            pub fn remove_listener(
                &self,
                kind: &str,
                callback: &$crate::domain::event_target::Listener<$detail>,
            ) {
                self.$field.remove_listener(kind, callback);
            }

            /// Dispatches `event` to this value's listeners.
            pub fn dispatch_event(
                &self,
                event: &$crate::domain::event_target::Event<$detail>,
            ) -> bool {
                self.$field.dispatch(event)
            }

            $(
                #[doc = concat!("Returns the listener assigned to the `", $kind, "` slot.")]
                #[must_use]
                pub fn $getter(&self) -> Option<$crate::domain::event_target::Listener<$detail>> {
                    self.$field.slot($kind)
                }

                #[doc = concat!("Replaces the `", $kind, "` slot listener; `None` clears it.")]
                pub fn $setter(
                    &self,
                    callback: Option<$crate::domain::event_target::Listener<$detail>>,
                ) {
                    if let Err(err) = self.$field.set_slot($kind, callback) {
                        tracing::error!(error = %err, "slot accessor out of sync with allow-list");
                    }
                }
            )*
        }
    };
}

pub(crate) use compose_event_target;
