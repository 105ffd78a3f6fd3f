//! Socket Mode event gateway.
//!
//! Maintains the persistent WebSocket Slack pushes events through:
//! 1. `apps.connections.open` with the app-level token → WebSocket URL
//! 2. Connect, ack every envelope immediately, dispatch the payload
//! 3. On `disconnect` or a dropped connection, reopen after a fixed delay
//!
//! Individual events are never retried; a failed handler is logged and the
//! session keeps reading.

use crate::slack::SlackApi;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

/// A slash command delivered over Socket Mode.
#[derive(Clone, Debug, Deserialize)]
pub struct SlashCommand {
    pub command: String,
    #[serde(default)]
    pub enterprise_id: Option<String>,
    pub team_id: String,
    pub channel_id: String,
    pub user_id: String,
    #[serde(default)]
    pub text: String,
}

/// An `app_mention` event delivered over Socket Mode.
#[derive(Clone, Debug)]
pub struct AppMention {
    pub enterprise_id: Option<String>,
    pub team_id: Option<String>,
    pub channel: String,
    pub user: String,
    pub text: String,
}

/// Business-logic hook the gateway dispatches into.
///
/// Implementations must not fail the event loop; errors are theirs to log.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_slash_command(&self, command: SlashCommand);
    async fn on_app_mention(&self, mention: AppMention);
}

/// Socket Mode envelope wire format.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(rename = "type")]
    envelope_type: String,
    #[serde(default)]
    payload: Value,
}

/// The Event Dispatch Gateway.
pub struct SocketModeGateway {
    slack: Arc<dyn SlackApi>,
    handler: Arc<dyn EventHandler>,
    app_token: String,
    reconnect_delay: Duration,
}

impl SocketModeGateway {
    pub fn new(
        slack: Arc<dyn SlackApi>,
        handler: Arc<dyn EventHandler>,
        app_token: String,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            slack,
            handler,
            app_token,
            reconnect_delay,
        }
    }

    /// Run the gateway until the task is aborted.
    ///
    /// Reconnects after every session end (clean or not) with a fixed
    /// delay; the open call itself failing is also just logged and retried.
    pub async fn run(&self) {
        loop {
            match self.slack.connections_open(&self.app_token).await {
                Ok(url) => {
                    info!("Socket Mode connected");
                    if let Err(e) = self.run_session(&url).await {
                        warn!(error = %e, "Socket Mode session ended with error");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to open Socket Mode connection");
                }
            }
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    /// Read one WebSocket session to completion.
    async fn run_session(&self, socket_url: &str) -> Result<()> {
        let (stream, _response) = connect_async(socket_url)
            .await
            .context("Failed to connect Socket Mode websocket")?;
        let (mut sink, mut source) = stream.split();

        while let Some(message) = source.next().await {
            let message = message.context("Failed reading websocket message")?;

            let text = match message {
                WsMessage::Text(text) => text,
                WsMessage::Close(_) => {
                    debug!("Socket Mode connection closed by peer");
                    return Ok(());
                }
                _ => continue,
            };

            let envelope: Envelope =
                serde_json::from_str(&text).context("Failed to parse Socket Mode envelope")?;

            // Ack before handling; Slack redelivers unacked envelopes
            if let Some(envelope_id) = &envelope.envelope_id {
                let ack = json!({ "envelope_id": envelope_id }).to_string();
                sink.send(WsMessage::Text(ack))
                    .await
                    .context("Failed to send envelope ack")?;
            }

            match envelope.envelope_type.as_str() {
                "hello" => {
                    debug!("Socket Mode hello received");
                }
                "disconnect" => {
                    info!("Socket Mode disconnect requested, reconnecting");
                    return Ok(());
                }
                _ => {
                    dispatch_envelope(&envelope, self.handler.as_ref()).await;
                }
            }
        }

        Ok(())
    }
}

/// Route an event envelope into the handler.
///
/// Unknown envelope and event types are acked and dropped.
async fn dispatch_envelope(envelope: &Envelope, handler: &dyn EventHandler) {
    match envelope.envelope_type.as_str() {
        "slash_commands" => {
            match serde_json::from_value::<SlashCommand>(envelope.payload.clone()) {
                Ok(command) => {
                    debug!(command = %command.command, team_id = %command.team_id, "Dispatching slash command");
                    handler.on_slash_command(command).await;
                }
                Err(e) => {
                    warn!(error = %e, "Malformed slash_commands payload");
                }
            }
        }
        "events_api" => {
            let event = &envelope.payload["event"];
            if event["type"].as_str() != Some("app_mention") {
                debug!(event_type = ?event["type"].as_str(), "Ignoring event");
                return;
            }
            let mention = AppMention {
                enterprise_id: envelope.payload["enterprise_id"]
                    .as_str()
                    .map(|s| s.to_string()),
                team_id: envelope.payload["team_id"].as_str().map(|s| s.to_string()),
                channel: event["channel"].as_str().unwrap_or_default().to_string(),
                user: event["user"].as_str().unwrap_or_default().to_string(),
                text: event["text"].as_str().unwrap_or_default().to_string(),
            };
            debug!(team_id = ?mention.team_id, channel = %mention.channel, "Dispatching app mention");
            handler.on_app_mention(mention).await;
        }
        other => {
            debug!(envelope_type = %other, "Ignoring envelope");
        }
    }
}
