//! REST access to the conversation store.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::conversation::conversation_dto::{
    ConversationWithLastMessage, MarkReadResponse, PaginatedMessagesResponse,
    RecentMessagesResponse,
};
use crate::conversation::conversation_models::Participant;

use super::error::{ClientError, Result};

/// What the messaging client needs from the REST API.
#[async_trait]
pub trait ConversationApi: Send + Sync + 'static {
    async fn conversations_with_last_message(
        &self,
        participant: Participant,
    ) -> Result<Vec<ConversationWithLastMessage>>;

    async fn recent_messages(&self, conversation_id: Uuid, limit: u32)
        -> Result<RecentMessagesResponse>;

    async fn paginated_messages(
        &self,
        conversation_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<PaginatedMessagesResponse>;

    /// Marks the counterpart's messages in the conversation read. Returns how
    /// many changed.
    async fn mark_read(&self, conversation_id: Uuid) -> Result<u64>;
}

#[derive(Clone)]
pub struct HttpConversationApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpConversationApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/conversations{}", self.base_url, path)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.bearer_auth(&self.token).send().await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(ClientError::SessionExpired),
            status if !status.is_success() => Err(ClientError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
            _ => Ok(response.json::<T>().await?),
        }
    }
}

#[async_trait]
impl ConversationApi for HttpConversationApi {
    async fn conversations_with_last_message(
        &self,
        participant: Participant,
    ) -> Result<Vec<ConversationWithLastMessage>> {
        let request = self.http.get(self.url("/with-last-message")).query(&[
            ("UserId", participant.id.to_string()),
            ("UserType", participant.role.to_string()),
        ]);
        self.send_json(request).await
    }

    async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: u32,
    ) -> Result<RecentMessagesResponse> {
        let request = self
            .http
            .get(self.url(&format!("/{}/messages/recent", conversation_id)))
            .query(&[("limit", limit)]);
        self.send_json(request).await
    }

    async fn paginated_messages(
        &self,
        conversation_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<PaginatedMessagesResponse> {
        let request = self
            .http
            .get(self.url(&format!("/{}/messages/paginated", conversation_id)))
            .query(&[("page", page), ("limit", limit)]);
        self.send_json(request).await
    }

    async fn mark_read(&self, conversation_id: Uuid) -> Result<u64> {
        let request = self
            .http
            .patch(self.url(&format!("/{}/read", conversation_id)));
        let response: MarkReadResponse = self.send_json(request).await?;
        Ok(response.updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let api = HttpConversationApi::new("http://localhost:3000/", "token");
        assert_eq!(
            api.url("/with-last-message"),
            "http://localhost:3000/api/conversations/with-last-message"
        );
    }
}
