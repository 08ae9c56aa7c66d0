use crate::error::{AppError, Result};
use crate::conversation::conversation_cache::ConversationListCache;
use crate::conversation::conversation_dto::{
    clamp_limit, ConversationWithLastMessage, MessageDto, PaginatedMessagesResponse,
    PaginationInfo, RecentMessagesResponse, SendMessageRequest,
};
use crate::conversation::conversation_models::{
    Conversation, ConversationStatus, Message, Participant, ParticipantRole,
};
use crate::conversation::conversation_repository::ConversationRepository;
use crate::websocket::types::{ReceiveMessagePayload, ServerEvent};
use crate::websocket::ConnectionManager;
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct ConversationService {
    repo: ConversationRepository,
    cache: ConversationListCache,
    ws_manager: ConnectionManager,
}

impl ConversationService {
    pub fn new(
        repo: ConversationRepository,
        cache: ConversationListCache,
        ws_manager: ConnectionManager,
    ) -> Self {
        Self {
            repo,
            cache,
            ws_manager,
        }
    }

    /// Loads a conversation and checks that `participant` belongs to it.
    pub async fn authorize(&self, conversation_id: Uuid, participant: &Participant) -> Result<Conversation> {
        let conversation = self
            .repo
            .find_by_id(conversation_id)
            .await?
            .ok_or(AppError::NotFound("Conversation not found".to_string()))?;

        if !conversation.has_participant(participant) {
            return Err(AppError::Forbidden(
                "You are not a participant of this conversation".to_string(),
            ));
        }

        Ok(conversation)
    }

    /// Companies open a conversation once they accept an application. Calling
    /// this again for the same pair returns the existing conversation.
    pub async fn start_conversation(
        &self,
        company: &Participant,
        user_id: Uuid,
    ) -> Result<(Conversation, bool)> {
        if company.role != ParticipantRole::Company {
            return Err(AppError::Forbidden(
                "Only companies can start conversations".to_string(),
            ));
        }
        if !self.repo.user_exists(user_id).await? {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        let (conversation, created) = self.repo.get_or_create(user_id, company.id).await?;
        if created {
            tracing::info!(
                "Conversation {} opened between company {} and user {}",
                conversation.id,
                company.id,
                user_id
            );
            self.cache
                .invalidate(&[
                    conversation.participant(ParticipantRole::User),
                    conversation.participant(ParticipantRole::Company),
                ])
                .await;
        }

        Ok((conversation, created))
    }

    pub async fn list_conversations(
        &self,
        participant: &Participant,
    ) -> Result<Vec<ConversationWithLastMessage>> {
        if let Some(cached) = self.cache.get(participant).await {
            return Ok(cached);
        }

        let version = self.cache.version(participant).await;
        let conversations = self.repo.find_with_last_message(participant).await?;
        if let Some(version) = version {
            self.cache.put(participant, &version, &conversations).await;
        }
        Ok(conversations)
    }

    /// Most recent `limit` messages, oldest first. Opening a conversation this
    /// way also marks the counterpart's messages as read.
    pub async fn recent_messages(
        &self,
        conversation_id: Uuid,
        participant: &Participant,
        limit: Option<u32>,
    ) -> Result<RecentMessagesResponse> {
        let conversation = self.authorize(conversation_id, participant).await?;
        let limit = clamp_limit(limit);

        let messages = self
            .repo
            .find_messages(conversation_id, limit as i64, 0)
            .await?;
        let total = self.repo.count_messages(conversation_id).await?;

        self.mark_read_for(&conversation, participant).await?;

        Ok(RecentMessagesResponse {
            messages: messages.into_iter().map(MessageDto::from).collect(),
            has_more: total > limit as i64,
        })
    }

    /// Page `page` (1-based, counted backwards from the newest message).
    pub async fn page_messages(
        &self,
        conversation_id: Uuid,
        participant: &Participant,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<PaginatedMessagesResponse> {
        self.authorize(conversation_id, participant).await?;
        let page = page.unwrap_or(1).max(1);
        let limit = clamp_limit(limit);
        let offset = (page as i64 - 1) * limit as i64;

        let messages = self
            .repo
            .find_messages(conversation_id, limit as i64, offset)
            .await?;
        let total_count = self.repo.count_messages(conversation_id).await?;

        Ok(PaginatedMessagesResponse {
            messages: messages.into_iter().map(MessageDto::from).collect(),
            pagination: PaginationInfo {
                has_more: page_has_more(page, limit, total_count),
                total_count,
                page,
                limit,
            },
        })
    }

    pub async fn mark_conversation_as_read(
        &self,
        conversation_id: Uuid,
        participant: &Participant,
    ) -> Result<u64> {
        let conversation = self.authorize(conversation_id, participant).await?;
        self.mark_read_for(&conversation, participant).await
    }

    async fn mark_read_for(&self, conversation: &Conversation, reader: &Participant) -> Result<u64> {
        let updated = self
            .repo
            .mark_conversation_as_read(conversation.id, reader.role)
            .await?;
        if updated > 0 {
            self.cache.invalidate(&[*reader]).await;
        }
        Ok(updated)
    }

    /// Persists a message and pushes it to the counterpart's sockets and to the
    /// sender's other sockets. `origin` is the connection the send came from.
    pub async fn send_message(
        &self,
        sender: &Participant,
        conversation_id: Uuid,
        content: String,
        origin: Option<Uuid>,
    ) -> Result<Message> {
        let request = SendMessageRequest { content };
        request.validate()?;
        if request.content.trim().is_empty() {
            return Err(AppError::BadRequest("Message content is empty".to_string()));
        }

        let conversation = self.authorize(conversation_id, sender).await?;
        if conversation.status != ConversationStatus::Active {
            return Err(AppError::Forbidden("Conversation is archived".to_string()));
        }

        let message = self
            .repo
            .create_message(conversation_id, sender.role, &request.content)
            .await?;

        let counterpart = conversation.counterpart_of(sender);
        self.cache.invalidate(&[*sender, counterpart]).await;

        let event = ServerEvent::ReceiveMessage(ReceiveMessagePayload::from(&message));
        let delivered = self.ws_manager.send_to_participant(&counterpart, event.clone());
        match origin {
            Some(origin) => {
                self.ws_manager.send_to_participant_except(sender, origin, event);
            }
            None => {
                self.ws_manager.send_to_participant(sender, event);
            }
        }

        tracing::debug!(
            "Message {} in conversation {} delivered to {} counterpart socket(s)",
            message.id,
            conversation_id,
            delivered
        );

        Ok(message)
    }
}

/// Whether any message exists before page `page` of size `limit`.
pub fn page_has_more(page: u32, limit: u32, total_count: i64) -> bool {
    (page as i64) * (limit as i64) < total_count
}
