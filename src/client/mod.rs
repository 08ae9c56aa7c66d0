//! Client side of the messaging subsystem: the contact list, per-conversation
//! message windows, live delivery and optimistic sends for one signed-in
//! participant.
//!
//! Start with [`ConversationSession::connect`] (or [`ConversationSession::spawn`]
//! with your own [`ConversationApi`] and [`DeliveryChannel`]) and drive the
//! returned [`SessionHandle`].

pub mod api;
pub mod cache;
pub mod channel;
pub mod error;
pub mod events;
pub mod loader;
pub mod pager;
pub mod session;

use uuid::Uuid;

use crate::conversation::conversation_dto::DEFAULT_MESSAGE_LIMIT;
use crate::conversation::conversation_models::{Participant, ParticipantRole};
use crate::state::ConfigError;

pub use api::{ConversationApi, HttpConversationApi};
pub use cache::{CacheAction, CachedMessage, ConversationCache, ConversationEntry, ListState, MessageRole};
pub use channel::{DeliveryChannel, WsDeliveryChannel};
pub use error::ClientError;
pub use events::{ConversationEvent, ConversationEventKind, EventBus};
pub use session::{ConversationSession, SessionHandle};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// e.g. `http://localhost:3000`
    pub base_url: String,
    /// e.g. `ws://localhost:3000`
    pub ws_url: String,
    pub token: String,
    pub participant: Participant,
    /// Messages per fetch, for the recent window and every older page.
    pub page_size: u32,
}

impl ClientConfig {
    pub fn new(
        base_url: impl Into<String>,
        ws_url: impl Into<String>,
        token: impl Into<String>,
        participant: Participant,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            ws_url: ws_url.into(),
            token: token.into(),
            participant,
            page_size: DEFAULT_MESSAGE_LIMIT,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));

        let base_url = lookup("HIRELINE_API_URL").unwrap_or_else(|| "http://127.0.0.1:3000".to_string());
        let ws_url = lookup("HIRELINE_WS_URL").unwrap_or_else(|| {
            base_url
                .replacen("https://", "wss://", 1)
                .replacen("http://", "ws://", 1)
        });

        let id_raw = required("HIRELINE_PARTICIPANT_ID")?;
        let id = Uuid::parse_str(&id_raw).map_err(|_| ConfigError::Invalid {
            name: "HIRELINE_PARTICIPANT_ID",
            value: id_raw,
        })?;

        let role_raw = required("HIRELINE_PARTICIPANT_TYPE")?;
        let role: ParticipantRole = role_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "HIRELINE_PARTICIPANT_TYPE",
            value: role_raw,
        })?;

        let page_size = match lookup("HIRELINE_PAGE_SIZE") {
            Some(raw) => raw.parse::<u32>().map_err(|_| ConfigError::InvalidNumber {
                name: "HIRELINE_PAGE_SIZE",
                value: raw,
            })?,
            None => DEFAULT_MESSAGE_LIMIT,
        };

        Ok(Self::new(
            base_url,
            ws_url,
            required("HIRELINE_TOKEN")?,
            Participant { id, role },
        )
        .with_page_size(page_size))
    }
}
