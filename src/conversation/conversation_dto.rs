use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::conversation_models::{Message, ParticipantRole};

pub const DEFAULT_MESSAGE_LIMIT: u32 = 15;
pub const MAX_MESSAGE_LIMIT: u32 = 100;

/// Clamps a requested page size into `1..=MAX_MESSAGE_LIMIT`.
pub fn clamp_limit(limit: Option<u32>) -> u32 {
    limit
        .unwrap_or(DEFAULT_MESSAGE_LIMIT)
        .clamp(1, MAX_MESSAGE_LIMIT)
}

/// Counterpart card shown in the contact list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConversationProfile {
    #[serde(rename = "ConversationId")]
    pub conversation_id: Uuid,
    #[serde(rename = "Company_id", default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<Uuid>,
    #[serde(rename = "User_id", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Logo", default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(rename = "Photo", default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(rename = "Website", default)]
    pub website: Option<String>,
}

impl ConversationProfile {
    pub fn counterpart_id(&self) -> Option<Uuid> {
        self.company_id.or(self.user_id)
    }

    pub fn image(&self) -> Option<&str> {
        self.logo.as_deref().or(self.photo.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct LastMessage {
    pub content: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConversationWithLastMessage {
    pub profile: ConversationProfile,
    #[serde(rename = "LastMessage")]
    pub last_message: Option<LastMessage>,
    #[serde(rename = "UnreadCount", default)]
    pub unread_count: i64,
}

/// Row shape of the contact list query; the counterpart columns are filled
/// from `companies` or `users` depending on who is asking.
#[derive(Debug, sqlx::FromRow)]
pub struct ConversationListRow {
    pub conversation_id: Uuid,
    pub counterpart_id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
    pub secondary: Option<String>,
    pub last_content: Option<String>,
    pub last_date: Option<DateTime<Utc>>,
    pub unread_count: i64,
}

impl ConversationListRow {
    /// `viewer` is the role of the participant the list was built for.
    pub fn into_dto(self, viewer: ParticipantRole) -> ConversationWithLastMessage {
        let profile = match viewer {
            ParticipantRole::User => ConversationProfile {
                conversation_id: self.conversation_id,
                company_id: Some(self.counterpart_id),
                user_id: None,
                name: self.name,
                logo: self.image_url,
                photo: None,
                website: self.secondary,
            },
            ParticipantRole::Company => ConversationProfile {
                conversation_id: self.conversation_id,
                company_id: None,
                user_id: Some(self.counterpart_id),
                name: self.name,
                logo: None,
                photo: self.image_url,
                website: self.secondary,
            },
        };

        let last_message = match (self.last_content, self.last_date) {
            (Some(content), Some(date)) => Some(LastMessage { content, date }),
            _ => None,
        };

        ConversationWithLastMessage {
            profile,
            last_message,
            unread_count: self.unread_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct MessageDto {
    pub id: Uuid,
    pub sender: ParticipantRole,
    pub content: String,
    pub date: DateTime<Utc>,
    pub is_read: bool,
}

impl From<Message> for MessageDto {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            sender: message.sender,
            content: message.content,
            date: message.created_at,
            is_read: message.is_read,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecentMessagesResponse {
    pub messages: Vec<MessageDto>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    pub has_more: bool,
    pub total_count: i64,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginatedMessagesResponse {
    pub messages: Vec<MessageDto>,
    pub pagination: PaginationInfo,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ConversationListQuery {
    #[serde(rename = "UserId")]
    pub user_id: Option<Uuid>,
    #[serde(rename = "UserType")]
    pub user_type: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecentMessagesQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginatedMessagesQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartConversationRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub updated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), DEFAULT_MESSAGE_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(15)), 15);
        assert_eq!(clamp_limit(Some(10_000)), MAX_MESSAGE_LIMIT);
    }

    #[test]
    fn test_user_view_of_list_row_uses_company_fields() {
        let row = ConversationListRow {
            conversation_id: Uuid::new_v4(),
            counterpart_id: Uuid::new_v4(),
            name: "Acme".to_string(),
            image_url: Some("https://cdn/acme.png".to_string()),
            secondary: Some("https://acme.example".to_string()),
            last_content: None,
            last_date: None,
            unread_count: 0,
        };
        let company_id = row.counterpart_id;

        let dto = row.into_dto(ParticipantRole::User);
        let value = serde_json::to_value(&dto).unwrap();

        assert_eq!(value["profile"]["Company_id"], json!(company_id));
        assert_eq!(value["profile"]["Logo"], json!("https://cdn/acme.png"));
        assert!(value["profile"].get("User_id").is_none());
        assert!(value["LastMessage"].is_null());
    }

    #[test]
    fn test_company_view_of_list_row_uses_user_fields() {
        let now = Utc::now();
        let row = ConversationListRow {
            conversation_id: Uuid::new_v4(),
            counterpart_id: Uuid::new_v4(),
            name: "Jane".to_string(),
            image_url: None,
            secondary: Some("jane@example.com".to_string()),
            last_content: Some("Hi".to_string()),
            last_date: Some(now),
            unread_count: 2,
        };

        let dto = row.into_dto(ParticipantRole::Company);

        assert!(dto.profile.user_id.is_some());
        assert_eq!(dto.last_message.unwrap().content, "Hi");
        assert_eq!(dto.unread_count, 2);
    }

    #[test]
    fn test_message_dto_field_names() {
        let value = serde_json::to_value(MessageDto {
            id: Uuid::nil(),
            sender: ParticipantRole::Company,
            content: "Hello".to_string(),
            date: Utc::now(),
            is_read: false,
        })
        .unwrap();

        assert_eq!(value["Sender"], json!("company"));
        assert_eq!(value["Content"], json!("Hello"));
        assert_eq!(value["IsRead"], json!(false));
        assert!(value.get("Date").is_some());
    }

    #[test]
    fn test_pagination_field_names() {
        let value = serde_json::to_value(PaginationInfo {
            has_more: true,
            total_count: 20,
            page: 1,
            limit: 15,
        })
        .unwrap();

        assert_eq!(value["hasMore"], json!(true));
        assert_eq!(value["totalCount"], json!(20));
    }
}
