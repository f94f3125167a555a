//! Real upstream sockets backed by `tokio-tungstenite`.
//!
//! [`TungsteniteConnector::connect`] returns immediately. The handshake and
//! the read/write loop run in a spawned task which reports everything it
//! sees as [`TransportEvent`]s; outbound frames queue in a channel until the
//! handshake completes.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use crate::domain::transport::ABNORMAL_CLOSURE;
use crate::domain::{Address, Connector, InboundEvents, Payload, Transport, TransportEvent};

/// Opens upstream WebSocket connections with `tokio-tungstenite`.
///
/// Must be used from inside a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[derive(Debug)]
enum Outbound {
    Frame(Payload),
    Close {
        code: Option<u16>,
        reason: Option<String>,
    },
}

/// Write half of an upstream socket.
#[derive(Debug)]
pub struct TungsteniteTransport {
    address: Address,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Transport for TungsteniteTransport {
    fn send(&mut self, payload: Payload) {
        if self.outbound.send(Outbound::Frame(payload)).is_err() {
            tracing::debug!(address = %self.address, "upstream finished; frame discarded");
        }
    }

    fn close(&mut self, code: Option<u16>, reason: Option<String>) {
        if self.outbound.send(Outbound::Close { code, reason }).is_err() {
            tracing::debug!(address = %self.address, "upstream already finished");
        }
    }
}

impl Connector for TungsteniteConnector {
    fn connect(
        &self,
        address: &Address,
        protocols: &[String],
    ) -> (Box<dyn Transport>, InboundEvents) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_upstream(
            address.clone(),
            protocols.to_vec(),
            outbound_rx,
            inbound_tx,
        ));

        let transport = TungsteniteTransport {
            address: address.clone(),
            outbound: outbound_tx,
        };
        (Box::new(transport), inbound_rx)
    }
}

fn build_request(address: &Address, protocols: &[String]) -> anyhow::Result<Request> {
    let mut request = address.as_str().into_client_request()?;
    if !protocols.is_empty() {
        let offered = HeaderValue::from_str(&protocols.join(", "))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, offered);
    }
    Ok(request)
}

fn to_message(payload: Payload) -> Message {
    match payload {
        Payload::Text(text) => Message::text(text),
        Payload::Binary(bytes) => Message::binary(bytes),
    }
}

fn abnormal_close(inbound: &mpsc::UnboundedSender<TransportEvent>, error: String) {
    let _ = inbound.send(TransportEvent::Error(error));
    let _ = inbound.send(TransportEvent::Close {
        code: ABNORMAL_CLOSURE,
        reason: String::new(),
    });
}

async fn run_upstream(
    address: Address,
    protocols: Vec<String>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
) {
    let request = match build_request(&address, &protocols) {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!(%address, error = %err, "cannot build upstream request");
            abnormal_close(&inbound, err.to_string());
            return;
        }
    };

    let stream = match tokio_tungstenite::connect_async(request).await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            tracing::warn!(%address, error = %err, "upstream handshake failed");
            abnormal_close(&inbound, err.to_string());
            return;
        }
    };
    tracing::debug!(%address, "upstream connected");
    let _ = inbound.send(TransportEvent::Open);

    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(Outbound::Frame(payload)) => {
                    if let Err(err) = sink.send(to_message(payload)).await {
                        abnormal_close(&inbound, err.to_string());
                        break;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = code.map(|code| CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.unwrap_or_default().into(),
                    });
                    // Keep reading until the peer answers the close.
                    let _ = sink.send(Message::Close(frame)).await;
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let _ = inbound.send(TransportEvent::Message(Payload::Text(
                        text.as_str().to_owned(),
                    )));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let _ = inbound.send(TransportEvent::Message(Payload::Binary(bytes.to_vec())));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame.map_or((1005, String::new()), |frame| {
                        (u16::from(frame.code), frame.reason.as_str().to_owned())
                    });
                    let _ = inbound.send(TransportEvent::Close { code, reason });
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    abnormal_close(&inbound, err.to_string());
                    break;
                }
                None => {
                    let _ = inbound.send(TransportEvent::Close {
                        code: ABNORMAL_CLOSURE,
                        reason: String::new(),
                    });
                    break;
                }
            },
        }
    }

    tracing::debug!(%address, "upstream finished");
}
