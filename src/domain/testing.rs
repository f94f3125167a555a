//! Recording transport shared by the domain unit tests.

use std::cell::RefCell;
use std::rc::Rc;

use super::transport::{Payload, Transport};
use super::{Address, ConnectionRegistry, ManagedConnection};

/// What a [`RecordingTransport`] saw on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Wire {
    Sent(Payload),
    Closed(Option<u16>, Option<String>),
}

pub(crate) type WireLog = Rc<RefCell<Vec<Wire>>>;

#[derive(Debug)]
pub(crate) struct RecordingTransport {
    log: WireLog,
}

impl Transport for RecordingTransport {
    fn send(&mut self, payload: Payload) {
        self.log.borrow_mut().push(Wire::Sent(payload));
    }

    fn close(&mut self, code: Option<u16>, reason: Option<String>) {
        self.log.borrow_mut().push(Wire::Closed(code, reason));
    }
}

#[allow(clippy::panic)]
pub(crate) fn open_recorded(registry: &Rc<ConnectionRegistry>) -> (Rc<ManagedConnection>, WireLog) {
    let log = WireLog::default();
    let transport = Box::new(RecordingTransport {
        log: Rc::clone(&log),
    });
    let Ok(address) = Address::parse("ws://localhost:5173/hmr") else {
        panic!("valid test address");
    };
    let connection = ManagedConnection::open(registry, transport, address, Vec::new());
    (connection, log)
}
