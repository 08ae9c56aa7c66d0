//! Recent-window and backward pagination over one conversation's messages.

use std::sync::Arc;

use uuid::Uuid;

use crate::conversation::conversation_dto::MessageDto;

use super::api::ConversationApi;
use super::error::Result;

/// Older history loads when the pane is scrolled this close to the top.
pub const SCROLL_TRIGGER_PX: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct RecentPage {
    pub messages: Vec<MessageDto>,
    pub has_more: bool,
}

#[derive(Debug, Clone)]
pub struct OlderPage {
    pub page: u32,
    pub messages: Vec<MessageDto>,
    pub has_more: bool,
    pub total_count: i64,
}

/// A short page means history is exhausted, whatever the server flag says.
pub fn effective_has_more(returned: usize, limit: u32, reported: bool) -> bool {
    reported && returned >= limit as usize
}

pub fn near_top(scroll_top: f64) -> bool {
    scroll_top <= SCROLL_TRIGGER_PX
}

/// Scroll offset that keeps the same content in view after rows were
/// inserted above it.
pub fn restore_scroll_top(previous_top: f64, previous_height: f64, new_height: f64) -> f64 {
    (previous_top + (new_height - previous_height)).max(0.0)
}

#[derive(Clone)]
pub struct MessagePager {
    api: Arc<dyn ConversationApi>,
    page_size: u32,
}

impl MessagePager {
    pub fn new(api: Arc<dyn ConversationApi>, page_size: u32) -> Self {
        Self {
            api,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// The newest `page_size` messages, oldest first. This is page 1.
    pub async fn fetch_recent(&self, conversation_id: Uuid) -> Result<RecentPage> {
        let response = self
            .api
            .recent_messages(conversation_id, self.page_size)
            .await?;

        let has_more = effective_has_more(response.messages.len(), self.page_size, response.has_more);
        Ok(RecentPage {
            messages: response.messages,
            has_more,
        })
    }

    /// Page `page` counted back from the newest message (1-based).
    pub async fn fetch_page(&self, conversation_id: Uuid, page: u32) -> Result<OlderPage> {
        let response = self
            .api
            .paginated_messages(conversation_id, page, self.page_size)
            .await?;

        let has_more = effective_has_more(
            response.messages.len(),
            self.page_size,
            response.pagination.has_more,
        );
        Ok(OlderPage {
            page,
            messages: response.messages,
            has_more,
            total_count: response.pagination.total_count,
        })
    }
}
