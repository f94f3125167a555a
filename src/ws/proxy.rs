//! Relays one downstream socket through a managed upstream connection.
//!
//! Runs on the core thread. Downstream frames become
//! [`ManagedConnection::send`] calls and upstream events reach the
//! downstream socket through the connection's `onmessage` / `onclose` /
//! `onerror` slots, so both directions are subject to plug/unplug.

use std::rc::Rc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::domain::transport::ABNORMAL_CLOSURE;
use crate::domain::{Event, ManagedConnection, Payload, TransportEvent};
use crate::service::{ConnectionFactory, OpenedConnection};

/// Close code sent downstream when the upstream address is rejected.
const POLICY_VIOLATION: u16 = 1008;

/// Close code for an upstream that went away without a usable close frame.
const GOING_AWAY: u16 = 1001;

/// Proxies `socket` to `target` until the managed connection closes.
///
/// The session outlives the real upstream socket while the connection is
/// unplugged: its last events wait in the backlog and are relayed to the
/// client once the connection is plugged again.
pub async fn run_session(
    factory: ConnectionFactory,
    socket: WebSocket,
    target: String,
    protocols: Vec<String>,
) {
    let (mut downstream_tx, mut downstream_rx) = socket.split();

    let OpenedConnection {
        connection,
        mut inbound,
    } = match factory.open_with_protocols(&target, protocols) {
        Ok(opened) => opened,
        Err(err) => {
            tracing::warn!(%target, error = %err, "proxy target rejected");
            let frame = CloseFrame {
                code: POLICY_VIOLATION,
                reason: err.to_string().into(),
            };
            let _ = downstream_tx.send(Message::Close(Some(frame))).await;
            return;
        }
    };
    let id = connection.id();
    tracing::info!(%id, %target, "proxy session started");

    let (relay_tx, mut relay_rx) = mpsc::unbounded_channel::<Message>();
    attach_relay(&connection, relay_tx);

    let mut upstream_open = true;
    let mut downstream_open = true;
    loop {
        if connection.is_closed() {
            break;
        }
        if !upstream_open && connection.is_plugged() {
            // Nothing left to replay and the real socket is gone.
            connection.close(None, None);
            break;
        }
        tokio::select! {
            event = inbound.recv(), if upstream_open => match event {
                Some(event) => connection.on_transport_event(event),
                None => {
                    // Events still in the backlog reach the client on the next plug.
                    upstream_open = false;
                    tracing::debug!(%id, backlog = connection.backlog_len(), "upstream finished");
                }
            },
            Some(frame) = relay_rx.recv() => {
                forward(&mut downstream_tx, &mut downstream_open, frame).await;
            },
            message = downstream_rx.next(), if downstream_open => match message {
                Some(Ok(Message::Text(text))) => {
                    connection.send(Payload::Text(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    connection.send(Payload::Binary(bytes.to_vec()));
                }
                Some(Ok(Message::Close(frame))) => {
                    downstream_open = false;
                    let (code, reason) = frame
                        .map(|frame| (Some(frame.code), Some(frame.reason.as_str().to_owned())))
                        .unwrap_or_default();
                    connection.close(code, reason);
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => {
                    downstream_open = false;
                    connection.close(None, None);
                }
            },
        }
    }

    while let Ok(frame) = relay_rx.try_recv() {
        forward(&mut downstream_tx, &mut downstream_open, frame).await;
    }
    if downstream_open {
        let frame = CloseFrame {
            code: GOING_AWAY,
            reason: "upstream closed".into(),
        };
        let _ = downstream_tx.send(Message::Close(Some(frame))).await;
    }

    tracing::info!(%id, "proxy session finished");
}

/// Sends one relayed frame downstream while the client socket is open.
async fn forward(
    downstream: &mut SplitSink<WebSocket, Message>,
    open: &mut bool,
    frame: Message,
) {
    if !*open {
        return;
    }
    let closing = matches!(frame, Message::Close(_));
    if downstream.send(frame).await.is_err() || closing {
        *open = false;
    }
}

/// Wires the connection's slot listeners to the downstream relay channel.
fn attach_relay(connection: &Rc<ManagedConnection>, relay: mpsc::UnboundedSender<Message>) {
    let id = connection.id();

    let messages = relay.clone();
    connection.set_onmessage(Some(Rc::new(move |event: &Event<TransportEvent>| {
        if let TransportEvent::Message(payload) = event.detail() {
            let frame = match payload {
                Payload::Text(text) => Message::text(text.clone()),
                Payload::Binary(bytes) => Message::binary(bytes.clone()),
            };
            let _ = messages.send(frame);
        }
    })));

    connection.set_onclose(Some(Rc::new(move |event: &Event<TransportEvent>| {
        if let TransportEvent::Close { code, reason } = event.detail() {
            let frame = CloseFrame {
                code: sendable_close_code(*code),
                reason: reason.clone().into(),
            };
            let _ = relay.send(Message::Close(Some(frame)));
        }
    })));

    connection.set_onerror(Some(Rc::new(move |event: &Event<TransportEvent>| {
        if let TransportEvent::Error(error) = event.detail() {
            tracing::warn!(%id, %error, "upstream error");
        }
    })));
}

/// Maps close codes that must not appear on the wire to "going away".
fn sendable_close_code(code: u16) -> u16 {
    match code {
        1005 | ABNORMAL_CLOSURE | 1015 => GOING_AWAY,
        other => other,
    }
}
