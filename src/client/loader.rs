use std::cmp::Ordering;
use std::sync::Arc;

use crate::conversation::conversation_dto::ConversationWithLastMessage;
use crate::conversation::conversation_models::Participant;

use super::api::ConversationApi;
use super::error::Result;

pub const NO_CONVERSATIONS_TEXT: &str = "No conversations found";

pub fn placeholder_preview(name: &str) -> String {
    format!("Start your conversation with {}", name)
}

/// Newest activity first; conversations that never had a message go last.
pub fn sort_by_recency(conversations: &mut [ConversationWithLastMessage]) {
    conversations.sort_by(|a, b| match (&a.last_message, &b.last_message) {
        (Some(a), Some(b)) => b.date.cmp(&a.date),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// One-shot fetch of the contact list. Never loads message history.
#[derive(Clone)]
pub struct ConversationListLoader {
    api: Arc<dyn ConversationApi>,
}

impl ConversationListLoader {
    pub fn new(api: Arc<dyn ConversationApi>) -> Self {
        Self { api }
    }

    pub async fn load(&self, participant: Participant) -> Result<Vec<ConversationWithLastMessage>> {
        let mut conversations = self.api.conversations_with_last_message(participant).await?;
        sort_by_recency(&mut conversations);
        Ok(conversations)
    }
}
