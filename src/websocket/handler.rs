use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    conversation::conversation_models::{Participant, ParticipantRole},
    error::{AppError, Result},
    middleware::AuthParticipant,
    state::AppState,
    websocket::types::{ClientEvent, ErrorPayload, ServerEvent},
};

use super::connection::WsSender;

const HEARTBEAT_SECS: u64 = 30;

/// Connect parameters sent by the client. Identity always comes from the
/// token; these only have to agree with it.
#[derive(Debug, Deserialize)]
pub struct WsConnectQuery {
    pub id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Real-time delivery channel.
///
/// Handles `send_message` frames from the client and pushes
/// `receive_message` frames for messages written by the counterpart or by
/// the same participant in another tab.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    AuthParticipant(participant): AuthParticipant,
    Query(query): Query<WsConnectQuery>,
) -> Result<Response> {
    check_connect_params(&participant, &query)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, participant, state)))
}

fn check_connect_params(participant: &Participant, query: &WsConnectQuery) -> Result<()> {
    if query.id.is_some_and(|id| id != participant.id) {
        return Err(AppError::Forbidden("id does not match token".to_string()));
    }
    if let Some(kind) = query.kind.as_deref() {
        let role: ParticipantRole = kind.parse().map_err(AppError::BadRequest)?;
        if role != participant.role {
            return Err(AppError::Forbidden("type does not match token".to_string()));
        }
    }
    Ok(())
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, participant: Participant, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let connection_id = state.ws_connections.add_connection(participant, tx.clone());
    tracing::info!(
        "Delivery channel opened for {} {} (connection {})",
        participant.role,
        participant.id,
        connection_id
    );

    // Task: send events from channel to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Task: receive frames from WebSocket
    let state_clone = state.clone();
    let tx_clone = tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Err(e) = process_client_event(
                        &text,
                        &participant,
                        connection_id,
                        &state_clone,
                        &tx_clone,
                    )
                    .await
                    {
                        tracing::warn!("Rejected frame from {}: {}", participant.id, e);
                        let _ = tx_clone.send(ServerEvent::Error(ErrorPayload {
                            message: e.to_string(),
                        }));
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Heartbeat task
    let tx_heartbeat = tx.clone();
    let mut heartbeat_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(HEARTBEAT_SECS));
        loop {
            interval.tick().await;
            if tx_heartbeat.send(ServerEvent::Ping).is_err() {
                break;
            }
        }
    });

    // Stop all tasks when any one finishes
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            heartbeat_task.abort();
        },
        _ = &mut recv_task => {
            send_task.abort();
            heartbeat_task.abort();
        },
        _ = &mut heartbeat_task => {
            send_task.abort();
            recv_task.abort();
        }
    }

    // Cleanup
    state.ws_connections.remove_connection(&participant, connection_id);
    tracing::info!(
        "Delivery channel closed for {} {} (connection {})",
        participant.role,
        participant.id,
        connection_id
    );
}

async fn process_client_event(
    text: &str,
    participant: &Participant,
    connection_id: Uuid,
    state: &AppState,
    tx: &WsSender,
) -> Result<()> {
    let event: ClientEvent = serde_json::from_str(text)
        .map_err(|e| AppError::BadRequest(format!("Invalid message format: {}", e)))?;

    match event {
        ClientEvent::SendMessage {
            conversation_id,
            content,
        } => {
            state
                .conversation_service
                .send_message(participant, conversation_id, content, Some(connection_id))
                .await?;
        }

        ClientEvent::Ping => {
            let _ = tx.send(ServerEvent::Pong);
        }

        ClientEvent::Pong => {}
    }

    Ok(())
}
