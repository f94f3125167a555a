//! Controller WebSocket: commands in, registry notifications out.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::messages::ControlReply;
use crate::domain::{Notification, NotificationOrigin};
use crate::error::GatewayError;
use crate::runtime::CoreHandle;
use crate::service::CommandMessage;

/// Runs the read/write loop for a single controller connection.
///
/// - Sends an `initialization` notification with the current snapshot.
/// - Routes every text frame as a [`CommandMessage`] and answers it.
/// - Forwards every notification from the [`broadcast::Receiver`].
pub async fn run_control(
    socket: WebSocket,
    mut notifications: broadcast::Receiver<Notification>,
    core: CoreHandle,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    match core.snapshot().await {
        Ok(snapshot) => {
            let hello = Notification::register(NotificationOrigin::Initialization, snapshot);
            if ws_tx.send(Message::text(to_json(&hello))).await.is_err() {
                return;
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "control socket opened without core");
            let _ = ws_tx
                .send(Message::text(ControlReply::error(&err).to_json()))
                .await;
            return;
        }
    }

    loop {
        tokio::select! {
            // Incoming frame from the controller
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text_message(text.as_str(), &core).await;
                        if ws_tx.send(Message::text(reply.to_json())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            // Notification from the EventBus
            notification = notifications.recv() => {
                match notification {
                    Ok(notification) => {
                        if ws_tx.send(Message::text(to_json(&notification))).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "control client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("control connection closed");
}

/// Decodes and routes one text frame.
async fn handle_text_message(text: &str, core: &CoreHandle) -> ControlReply {
    let Ok(message) = serde_json::from_str::<CommandMessage>(text) else {
        return ControlReply::error(&GatewayError::InvalidRequest(
            "malformed command".to_string(),
        ));
    };
    match core.command(message).await {
        Ok(report) => ControlReply::routed(report),
        Err(err) => ControlReply::error(&err),
    }
}

fn to_json(notification: &Notification) -> String {
    serde_json::to_string(notification).unwrap_or_default()
}
