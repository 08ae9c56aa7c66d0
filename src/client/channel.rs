//! Client end of the real-time delivery channel.
//!
//! ```text
//!  session ── send(conversation, content) ──► outbound queue ──► socket writer ──► server
//!  session ◄── inbound receiver ◄── socket reader ◄── receive_message ◄──────────── server
//! ```
//!
//! One socket per authenticated session. Sends are fire-and-forget: `send`
//! only fails when the writer task is already gone.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::conversation::conversation_models::Participant;
use crate::websocket::types::{ClientEvent, ReceiveMessagePayload, ServerEvent};

use super::error::{ClientError, Result};

pub trait DeliveryChannel: Send + Sync + 'static {
    fn send(&self, conversation_id: Uuid, content: String) -> Result<()>;
}

pub type InboundReceiver = mpsc::UnboundedReceiver<ReceiveMessagePayload>;

pub struct WsDeliveryChannel {
    outbound: mpsc::UnboundedSender<ClientEvent>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl WsDeliveryChannel {
    /// Opens the socket and returns the channel plus the stream of inbound messages.
    pub async fn connect(
        ws_base_url: &str,
        token: &str,
        participant: Participant,
    ) -> Result<(Self, InboundReceiver)> {
        let url = connect_url(ws_base_url, token, &participant);
        let (stream, _response) = connect_async(url).await?;
        info!("Delivery channel connected as {} {}", participant.role, participant.id);

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientEvent>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Could not encode outbound frame: {e}");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json)).await {
                    warn!("Delivery channel write failed: {e}");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let pong_tx = outbound_tx.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Delivery channel read failed: {e}");
                        break;
                    }
                };

                match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(ServerEvent::ReceiveMessage(payload)) => {
                        if inbound_tx.send(payload).is_err() {
                            break;
                        }
                    }
                    Ok(ServerEvent::Ping) => {
                        let _ = pong_tx.send(ClientEvent::Pong);
                    }
                    Ok(ServerEvent::Pong) => {}
                    Ok(ServerEvent::Error(err)) => warn!("Server rejected frame: {}", err.message),
                    Err(e) => debug!("Ignoring unknown frame: {e}"),
                }
            }
            // Known gap: no reconnect. Real-time updates stop until a new session.
            warn!("Delivery channel closed; real-time updates stopped");
        });

        Ok((
            Self {
                outbound: outbound_tx,
                writer,
                reader,
            },
            inbound_rx,
        ))
    }

    /// Tears the socket down (logout / unmount).
    pub fn close(self) {}
}

impl DeliveryChannel for WsDeliveryChannel {
    fn send(&self, conversation_id: Uuid, content: String) -> Result<()> {
        self.outbound
            .send(ClientEvent::SendMessage {
                conversation_id,
                content,
            })
            .map_err(|_| ClientError::ChannelClosed)
    }
}

impl Drop for WsDeliveryChannel {
    fn drop(&mut self) {
        self.writer.abort();
        self.reader.abort();
    }
}

pub fn connect_url(ws_base_url: &str, token: &str, participant: &Participant) -> String {
    format!(
        "{}/api/ws?token={}&id={}&type={}",
        ws_base_url.trim_end_matches('/'),
        token,
        participant.id,
        participant.role
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::conversation_models::ParticipantRole;

    #[test]
    fn test_connect_url_carries_identity() {
        let participant = Participant {
            id: Uuid::nil(),
            role: ParticipantRole::Company,
        };
        assert_eq!(
            connect_url("ws://localhost:3000/", "abc", &participant),
            "ws://localhost:3000/api/ws?token=abc&id=00000000-0000-0000-0000-000000000000&type=company"
        );
    }
}
