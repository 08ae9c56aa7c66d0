use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware::AuthParticipant,
    state::AppState,
    conversation::{
        conversation_dto::{
            ConversationListQuery, ConversationWithLastMessage, MarkReadResponse, MessageDto,
            PaginatedMessagesQuery, PaginatedMessagesResponse, RecentMessagesQuery,
            RecentMessagesResponse, SendMessageRequest, StartConversationRequest,
        },
        conversation_models::{Conversation, ParticipantRole},
    },
};

/// List the caller's conversations, each with its most recent message
#[utoipa::path(
    get,
    path = "/api/conversations/with-last-message",
    tag = "conversations",
    params(ConversationListQuery),
    responses(
        (status = 200, description = "Conversations ordered by latest activity", body = Vec<ConversationWithLastMessage>),
        (status = 400, description = "Unknown UserType"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "UserId/UserType do not match the token")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_conversations_with_last_message(
    State(state): State<AppState>,
    AuthParticipant(participant): AuthParticipant,
    Query(query): Query<ConversationListQuery>,
) -> Result<impl IntoResponse> {
    if let Some(user_type) = query.user_type.as_deref() {
        let role: ParticipantRole = user_type.parse().map_err(AppError::BadRequest)?;
        if role != participant.role {
            return Err(AppError::Forbidden("UserType does not match token".to_string()));
        }
    }
    if query.user_id.is_some_and(|id| id != participant.id) {
        return Err(AppError::Forbidden("UserId does not match token".to_string()));
    }

    let conversations = state
        .conversation_service
        .list_conversations(&participant)
        .await?;

    Ok((StatusCode::OK, Json(conversations)))
}

/// Start (or fetch) the conversation between the calling company and a user
#[utoipa::path(
    post,
    path = "/api/conversations",
    tag = "conversations",
    request_body = StartConversationRequest,
    responses(
        (status = 201, description = "Conversation created", body = Conversation),
        (status = 200, description = "Conversation already existed", body = Conversation),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller is not a company"),
        (status = 404, description = "User not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn start_conversation(
    State(state): State<AppState>,
    AuthParticipant(participant): AuthParticipant,
    Json(payload): Json<StartConversationRequest>,
) -> Result<impl IntoResponse> {
    let (conversation, created) = state
        .conversation_service
        .start_conversation(&participant, payload.user_id)
        .await?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(conversation)))
}

/// Most recent messages of a conversation, oldest first
#[utoipa::path(
    get,
    path = "/api/conversations/{id}/messages/recent",
    tag = "conversations",
    params(
        ("id" = Uuid, Path, description = "Conversation ID"),
        RecentMessagesQuery
    ),
    responses(
        (status = 200, description = "Recent messages", body = RecentMessagesResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_recent_messages(
    State(state): State<AppState>,
    AuthParticipant(participant): AuthParticipant,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<RecentMessagesQuery>,
) -> Result<impl IntoResponse> {
    let response = state
        .conversation_service
        .recent_messages(conversation_id, &participant, query.limit)
        .await?;

    Ok((StatusCode::OK, Json(response)))
}

/// One page of older messages, pages counted back from the newest
#[utoipa::path(
    get,
    path = "/api/conversations/{id}/messages/paginated",
    tag = "conversations",
    params(
        ("id" = Uuid, Path, description = "Conversation ID"),
        PaginatedMessagesQuery
    ),
    responses(
        (status = 200, description = "Page of messages", body = PaginatedMessagesResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_paginated_messages(
    State(state): State<AppState>,
    AuthParticipant(participant): AuthParticipant,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<PaginatedMessagesQuery>,
) -> Result<impl IntoResponse> {
    let response = state
        .conversation_service
        .page_messages(conversation_id, &participant, query.page, query.limit)
        .await?;

    Ok((StatusCode::OK, Json(response)))
}

/// Send a message over HTTP (the socket `send_message` frame is the usual path)
#[utoipa::path(
    post,
    path = "/api/conversations/{id}/messages",
    tag = "conversations",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message stored and pushed", body = MessageDto),
        (status = 400, description = "Invalid content"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    AuthParticipant(participant): AuthParticipant,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    let message = state
        .conversation_service
        .send_message(&participant, conversation_id, payload.content, None)
        .await?;

    Ok((StatusCode::CREATED, Json(MessageDto::from(message))))
}

/// Mark the counterpart's messages in a conversation as read
#[utoipa::path(
    patch,
    path = "/api/conversations/{id}/read",
    tag = "conversations",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Messages marked as read", body = MarkReadResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    AuthParticipant(participant): AuthParticipant,
    Path(conversation_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let updated = state
        .conversation_service
        .mark_conversation_as_read(conversation_id, &participant)
        .await?;

    Ok((StatusCode::OK, Json(MarkReadResponse { updated })))
}
