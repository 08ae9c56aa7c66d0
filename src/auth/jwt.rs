use crate::conversation::conversation_models::{Participant, ParticipantRole};
use crate::error::{AppError, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // participant id
    pub role: ParticipantRole,
    pub exp: i64,
}

impl Claims {
    pub fn participant(&self) -> Result<Participant> {
        let id = Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))?;
        Ok(Participant { id, role: self.role })
    }
}

/// Issues a token for a participant. Tokens normally come from the marketplace's
/// auth service; this exists for local development and tests.
pub fn create_jwt(participant: Participant, secret: &str, expiration_hours: i64) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(expiration_hours))
        .ok_or(AppError::InternalError)?
        .timestamp();

    let claims = Claims {
        sub: participant.id.to_string(),
        role: participant.role,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AppError::InternalError)
}

pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))
}
