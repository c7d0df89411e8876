//! Socket Mode listener.
//!
//! Opens a WebSocket with `apps.connections.open`, ACKs every envelope as
//! soon as it is parsed, and forwards recognized events to the event queue.
//! The connection is re-established with a linear backoff when Slack closes
//! it (Slack rotates Socket Mode connections routinely).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

use crate::client::SlackClient;
use crate::events::{parse_callback, parse_interaction, Callback, SlackEvent};

/// Reconnect backoff step (seconds).
const RECONNECT_DELAY_SECS: u64 = 5;

/// Maximum consecutive failed connection attempts before giving up.
const MAX_RECONNECT_ATTEMPTS: u32 = 10;

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct SocketEnvelope {
    envelope_id: String,
    /// `"events_api"`, `"interactive"`, `"slash_commands"`.
    #[serde(rename = "type")]
    envelope_type: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Serialize)]
struct SocketAck {
    envelope_id: String,
}

/// What a single WebSocket text frame amounts to.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Hello,
    /// Slack is about to close this connection.
    Disconnect(String),
    Envelope {
        ack: String,
        event: Option<SlackEvent>,
    },
    Unparseable,
}

fn decode_frame(text: &str) -> Frame {
    let Ok(raw) = serde_json::from_str::<Value>(text) else {
        return Frame::Unparseable;
    };
    match raw["type"].as_str() {
        Some("hello") => return Frame::Hello,
        Some("disconnect") => {
            let reason = raw["reason"].as_str().unwrap_or("unknown").to_string();
            return Frame::Disconnect(reason);
        }
        _ => {}
    }

    let envelope: SocketEnvelope = match serde_json::from_value(raw) {
        Ok(e) => e,
        Err(e) => {
            debug!(error = %e, "failed to parse Socket Mode envelope");
            return Frame::Unparseable;
        }
    };

    let ack = serde_json::to_string(&SocketAck {
        envelope_id: envelope.envelope_id.clone(),
    })
    .unwrap_or_default();

    let event = match envelope.envelope_type.as_str() {
        "events_api" => match parse_callback(&envelope.payload) {
            Callback::Event(event) => event,
            other => {
                debug!(callback = ?other, "ignoring non-event callback");
                None
            }
        },
        "interactive" => parse_interaction(&envelope.payload),
        other => {
            debug!(envelope_type = %other, "ignoring envelope type");
            None
        }
    };
    Frame::Envelope { ack, event }
}

// ─────────────────────────────────────────────
// SocketListener
// ─────────────────────────────────────────────

/// Receives events over Socket Mode and publishes them to the event queue.
pub struct SocketListener {
    client: SlackClient,
    app_token: String,
    events: mpsc::Sender<SlackEvent>,
    shutdown: Arc<Notify>,
}

impl SocketListener {
    pub fn new(
        client: SlackClient,
        app_token: impl Into<String>,
        events: mpsc::Sender<SlackEvent>,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            client,
            app_token: app_token.into(),
            events,
            shutdown,
        }
    }

    /// Connect and pump events until shutdown or too many failed reconnects.
    pub async fn run(&self) -> anyhow::Result<()> {
        use futures_util::{SinkExt, StreamExt};
        use tokio_tungstenite::tungstenite::Message as WsMessage;

        let mut attempts: u32 = 0;

        loop {
            if attempts > 0 {
                let delay = Duration::from_secs(RECONNECT_DELAY_SECS * (attempts as u64).min(6));
                info!(
                    attempt = attempts,
                    delay_secs = delay.as_secs(),
                    "reconnecting to Slack Socket Mode..."
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.shutdown.notified() => {
                        info!("shutdown during reconnect backoff");
                        return Ok(());
                    }
                }
            }

            if attempts >= MAX_RECONNECT_ATTEMPTS {
                anyhow::bail!("exceeded max reconnect attempts ({})", MAX_RECONNECT_ATTEMPTS);
            }

            let ws_url = match self.client.open_socket(&self.app_token).await {
                Ok(url) => url,
                Err(e) => {
                    error!(error = %e, "failed to get Socket Mode URL");
                    attempts += 1;
                    continue;
                }
            };

            let ws_stream = match tokio_tungstenite::connect_async(ws_url.as_str()).await {
                Ok((stream, _)) => {
                    info!("connected to Slack Socket Mode");
                    attempts = 0;
                    stream
                }
                Err(e) => {
                    error!(error = %e, "WebSocket connect failed");
                    attempts += 1;
                    continue;
                }
            };

            let (mut write, mut read) = ws_stream.split();

            loop {
                tokio::select! {
                    msg = read.next() => {
                        match msg {
                            Some(Ok(WsMessage::Text(text))) => match decode_frame(text.as_str()) {
                                Frame::Hello => info!("received Socket Mode hello"),
                                Frame::Disconnect(reason) => {
                                    info!(reason = %reason, "Slack requested disconnect");
                                    break;
                                }
                                Frame::Envelope { ack, event } => {
                                    if let Err(e) = write.send(WsMessage::Text(ack.into())).await {
                                        warn!(error = %e, "failed to send ACK");
                                    }
                                    if let Some(event) = event {
                                        debug!(kind = event.kind(), "socket event");
                                        if self.events.send(event).await.is_err() {
                                            warn!("event queue closed, stopping listener");
                                            return Ok(());
                                        }
                                    }
                                }
                                Frame::Unparseable => debug!("ignoring unparseable frame"),
                            },
                            Some(Ok(WsMessage::Ping(data))) => {
                                let _ = write.send(WsMessage::Pong(data)).await;
                            }
                            Some(Ok(WsMessage::Close(_))) => {
                                info!("Slack WebSocket closed by server");
                                break;
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "Slack WebSocket error");
                                break;
                            }
                            None => {
                                info!("Slack WebSocket stream ended");
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = self.shutdown.notified() => {
                        info!("shutdown signal received");
                        let _ = write.close().await;
                        return Ok(());
                    }
                }
            }

            attempts += 1;
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_hello_and_disconnect() {
        assert_eq!(decode_frame(r#"{"type":"hello"}"#), Frame::Hello);
        assert_eq!(
            decode_frame(r#"{"type":"disconnect","reason":"refresh_requested"}"#),
            Frame::Disconnect("refresh_requested".into())
        );
        assert_eq!(decode_frame("not json at all"), Frame::Unparseable);
    }

    #[test]
    fn test_events_api_envelope() {
        let frame = json!({
            "envelope_id": "e1",
            "type": "events_api",
            "payload": {
                "type": "event_callback",
                "event": { "type": "pin_removed", "channel_id": "C1" }
            }
        });
        match decode_frame(&frame.to_string()) {
            Frame::Envelope { ack, event } => {
                assert_eq!(ack, r#"{"envelope_id":"e1"}"#);
                assert_eq!(
                    event,
                    Some(SlackEvent::PinRemoved {
                        channel: "C1".into()
                    })
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_interactive_envelope() {
        let frame = json!({
            "envelope_id": "e2",
            "type": "interactive",
            "payload": {
                "type": "shortcut",
                "callback_id": "csp_update_status_page",
                "user": { "id": "U1" }
            }
        });
        let Frame::Envelope { event: Some(event), .. } = decode_frame(&frame.to_string()) else {
            panic!("expected an event");
        };
        assert!(event.is_refresh_shortcut());
    }

    #[test]
    fn test_ignored_envelope_is_still_acked() {
        let frame = json!({ "envelope_id": "e3", "type": "slash_commands", "payload": {} });
        assert_eq!(
            decode_frame(&frame.to_string()),
            Frame::Envelope {
                ack: r#"{"envelope_id":"e3"}"#.into(),
                event: None
            }
        );
    }

    #[tokio::test]
    async fn test_run_returns_on_shutdown_during_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps.connections.open"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "ok": false, "error": "invalid_auth" })),
            )
            .mount(&server)
            .await;

        let (tx, _rx) = mpsc::channel(4);
        let shutdown = Arc::new(Notify::new());
        let listener = SocketListener::new(
            SlackClient::new("xoxb", server.uri()),
            "xapp",
            tx,
            shutdown.clone(),
        );
        let handle = tokio::spawn(async move { listener.run().await });

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.notify_waiters();
        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
