use crate::{
    auth::verify_jwt, conversation::conversation_models::Participant, error::AppError,
    state::AppState,
};
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, Request},
    middleware::Next,
    response::Response,
};

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req)
        .ok_or(AppError::Unauthorized("Invalid credentials".to_string()))?
        .to_string();

    let claims = verify_jwt(&token, &state.config.jwt_secret)?;
    let participant = claims.participant()?;

    req.extensions_mut().insert(participant);

    Ok(next.run(req).await)
}

/// Bearer token from the `Authorization` header, or from the `token` query
/// parameter (browsers cannot set headers on WebSocket upgrades).
fn bearer_token<B>(req: &Request<B>) -> Option<&str> {
    if let Some(header) = req.headers().get("Authorization").and_then(|h| h.to_str().ok()) {
        return header.strip_prefix("Bearer ");
    }

    req.uri()
        .query()
        .unwrap_or("")
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
}

// Extractor for the participant the middleware authenticated
pub struct AuthParticipant(pub Participant);

#[async_trait]
impl<S> FromRequestParts<S> for AuthParticipant
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Participant>()
            .copied()
            .map(AuthParticipant)
            .ok_or(AppError::Unauthorized("Invalid credentials".to_string()))
    }
}
