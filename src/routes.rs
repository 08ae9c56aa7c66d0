use crate::{
    conversation::{
        conversation_dto::{
            ConversationProfile, ConversationWithLastMessage, LastMessage, MarkReadResponse,
            MessageDto, PaginatedMessagesResponse, PaginationInfo, RecentMessagesResponse,
            SendMessageRequest, StartConversationRequest,
        },
        conversation_handlers,
        conversation_models::{Conversation, ConversationStatus, ParticipantRole},
    },
    middleware::auth_middleware,
    state::AppState,
    websocket::types::{ErrorPayload, ReceiveMessagePayload},
};
use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::{
    middleware,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::conversation::conversation_handlers::get_conversations_with_last_message,
        crate::conversation::conversation_handlers::start_conversation,
        crate::conversation::conversation_handlers::get_recent_messages,
        crate::conversation::conversation_handlers::get_paginated_messages,
        crate::conversation::conversation_handlers::send_message,
        crate::conversation::conversation_handlers::mark_conversation_read,
    ),
    components(
        schemas(
            Conversation,
            ConversationStatus,
            ParticipantRole,
            ConversationProfile,
            ConversationWithLastMessage,
            LastMessage,
            MessageDto,
            RecentMessagesResponse,
            PaginationInfo,
            PaginatedMessagesResponse,
            StartConversationRequest,
            SendMessageRequest,
            MarkReadResponse,
            ReceiveMessagePayload,
            ErrorPayload,
        )
    ),
    tags(
        (name = "conversations", description = "User/company conversations and messages")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            )
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    // Protected routes (auth required)
    let conversation_routes = Router::new()
        .route("/", post(conversation_handlers::start_conversation))
        .route(
            "/with-last-message",
            get(conversation_handlers::get_conversations_with_last_message),
        )
        .route(
            "/:id/messages",
            post(conversation_handlers::send_message),
        )
        .route(
            "/:id/messages/recent",
            get(conversation_handlers::get_recent_messages),
        )
        .route(
            "/:id/messages/paginated",
            get(conversation_handlers::get_paginated_messages),
        )
        .route("/:id/read", patch(conversation_handlers::mark_conversation_read))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // WebSocket route
    let ws_routes = Router::new()
        .route("/ws", get(crate::websocket::ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = Router::new()
        .nest("/conversations", conversation_routes)
        .merge(ws_routes);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
