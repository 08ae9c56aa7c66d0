use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::conversation::conversation_models::{Message, ParticipantRole};

/// Server-to-client frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    ReceiveMessage(ReceiveMessagePayload),
    Error(ErrorPayload),
    Ping,
    Pong,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct ReceiveMessagePayload {
    /// Server message id, the same one the REST endpoints return.
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub content: String,
    pub date: DateTime<Utc>,
    pub sender: ParticipantRole,
}

impl From<&Message> for ReceiveMessagePayload {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            content: message.content.clone(),
            date: message.created_at,
            sender: message.sender,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorPayload {
    pub message: String,
}

/// Client-to-server frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    SendMessage {
        #[serde(rename = "conversationId")]
        conversation_id: Uuid,
        content: String,
    },
    Ping,
    Pong,
}
