//! Session-local conversation state and the single reducer that mutates it.
//!
//! Every change (list load, selection, hydration, older pages, inbound
//! socket messages, optimistic sends, filter text) goes through
//! [`ConversationCache::apply`]. The reducer never performs I/O; it returns
//! [`Effect`]s for the session to run, whose results come back as actions.
//!
//! Invariants kept here:
//! - each entry's `messages` is a contiguous, chronological suffix of the
//!   server's message sequence (older pages grow it at the head, live
//!   messages at the tail);
//! - the active conversation's unread counter is zero;
//! - recent messages are fetched at most once per conversation, and at most
//!   one older-page request per conversation is in flight.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::conversation::conversation_dto::{
    ConversationProfile, ConversationWithLastMessage, LastMessage, MessageDto,
};
use crate::conversation::conversation_models::{Participant, ParticipantRole};
use crate::websocket::types::ReceiveMessagePayload;

use super::events::{ConversationEvent, ConversationEventKind};
use super::loader::placeholder_preview;
use super::pager::effective_has_more;

/// How far the local clock may run ahead of the server when matching an
/// optimistic message against its stored copy.
const OPTIMISTIC_MATCH_WINDOW_SECS: i64 = 30;

/// Side of a message relative to the local participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    Sender,
    Receiver,
}

impl MessageRole {
    fn of(sender: ParticipantRole, me: ParticipantRole) -> Self {
        if sender == me {
            MessageRole::Sender
        } else {
            MessageRole::Receiver
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedMessage {
    pub local_id: Uuid,
    /// Present for messages that came from the REST endpoints.
    pub server_id: Option<Uuid>,
    pub role: MessageRole,
    pub sender: ParticipantRole,
    pub content: String,
    pub date: DateTime<Utc>,
    pub is_read: bool,
    /// Appended locally before the server stored it.
    pub optimistic: bool,
}

impl CachedMessage {
    fn from_dto(dto: MessageDto, me: ParticipantRole) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            server_id: Some(dto.id),
            role: MessageRole::of(dto.sender, me),
            sender: dto.sender,
            content: dto.content,
            date: dto.date,
            is_read: dto.is_read,
            optimistic: false,
        }
    }

    fn from_inbound(payload: ReceiveMessagePayload, me: ParticipantRole) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            server_id: Some(payload.id),
            role: MessageRole::of(payload.sender, me),
            sender: payload.sender,
            content: payload.content,
            date: payload.date,
            is_read: false,
            optimistic: false,
        }
    }

    /// Whether `stored` (from a fetch) is the server copy of this local message.
    fn matches_stored(&self, stored: &CachedMessage) -> bool {
        if let (Some(mine), Some(theirs)) = (self.server_id, stored.server_id) {
            return mine == theirs;
        }
        if self.sender != stored.sender || self.content != stored.content {
            return false;
        }
        if self.optimistic {
            stored.date >= self.date - Duration::seconds(OPTIMISTIC_MATCH_WINDOW_SECS)
        } else {
            stored.date == self.date
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationState {
    /// Pages held in the window; the recent window counts as page 1.
    pub page: u32,
    pub has_more: bool,
    pub loading_older: bool,
}

#[derive(Debug, Clone)]
pub struct ConversationEntry {
    pub id: Uuid,
    pub profile: ConversationProfile,
    pub last_message: Option<LastMessage>,
    pub messages: Vec<CachedMessage>,
    pub unread_count: u32,
    pub messages_loaded: bool,
    pub hydrating: bool,
    pub pagination: PaginationState,
    /// Live messages that arrived while the recent window was being fetched.
    buffered: Vec<CachedMessage>,
    marking_read: bool,
    mark_read_pending: bool,
}

impl ConversationEntry {
    fn skeleton(item: ConversationWithLastMessage) -> Self {
        Self {
            id: item.profile.conversation_id,
            profile: item.profile,
            last_message: item.last_message,
            messages: Vec::new(),
            unread_count: clamp_unread(item.unread_count),
            messages_loaded: false,
            hydrating: false,
            pagination: PaginationState::default(),
            buffered: Vec::new(),
            marking_read: false,
            mark_read_pending: false,
        }
    }

    /// Text for the contact list: last message, or a prompt to start talking.
    pub fn preview(&self) -> String {
        match &self.last_message {
            Some(last) => last.content.clone(),
            None => placeholder_preview(&self.profile.name),
        }
    }

    fn mark_all_read(&mut self) {
        for message in &mut self.messages {
            message.is_read = true;
        }
    }

    fn holds(&self, server_id: Uuid) -> bool {
        self.messages
            .iter()
            .chain(self.buffered.iter())
            .any(|message| message.server_id == Some(server_id))
    }

    fn has_unread_incoming(&self) -> bool {
        self.messages
            .iter()
            .chain(self.buffered.iter())
            .any(|message| message.role == MessageRole::Receiver && !message.is_read)
    }

    /// At most one mark-read request per conversation is in flight; a request
    /// made meanwhile is replayed when it finishes.
    fn request_mark_read(&mut self) -> Option<Effect> {
        if self.marking_read {
            self.mark_read_pending = true;
            return None;
        }
        self.marking_read = true;
        Some(Effect::MarkRead(self.id))
    }

    /// Inserts a message, keeping the window ordered by date.
    fn push_live(&mut self, message: CachedMessage) {
        let position = self
            .messages
            .iter()
            .rposition(|existing| existing.date <= message.date)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.messages.insert(position, message);
    }
}

fn clamp_unread(count: i64) -> u32 {
    count.clamp(0, u32::MAX as i64) as u32
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListState {
    #[default]
    NotLoaded,
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Clone)]
pub enum CacheAction {
    LoadConversations,
    ConversationsLoaded(Vec<ConversationWithLastMessage>),
    ConversationsFailed,
    Select(Uuid),
    Deselect,
    RecentLoaded {
        conversation_id: Uuid,
        messages: Vec<MessageDto>,
        has_more: bool,
    },
    RecentFailed {
        conversation_id: Uuid,
    },
    RequestOlder {
        conversation_id: Uuid,
    },
    OlderPageLoaded {
        conversation_id: Uuid,
        messages: Vec<MessageDto>,
        has_more: bool,
        page: u32,
    },
    OlderPageFailed {
        conversation_id: Uuid,
    },
    /// The server acknowledged (or failed) a mark-read request.
    MarkReadFinished {
        conversation_id: Uuid,
    },
    Inbound(ReceiveMessagePayload),
    OptimisticSend {
        conversation_id: Uuid,
        content: String,
    },
    SetFilter(String),
}

/// Work the session has to perform on behalf of the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    FetchConversations,
    FetchRecent(Uuid),
    FetchPage { conversation_id: Uuid, page: u32 },
    Send { conversation_id: Uuid, content: String },
    MarkRead(Uuid),
    Publish(ConversationEvent),
}

#[derive(Debug, Clone)]
pub struct ConversationCache {
    me: Participant,
    page_size: u32,
    entries: Vec<ConversationEntry>,
    active: Option<Uuid>,
    list_state: ListState,
    filter_query: String,
}

impl ConversationCache {
    pub fn new(me: Participant, page_size: u32) -> Self {
        Self {
            me,
            page_size: page_size.max(1),
            entries: Vec::new(),
            active: None,
            list_state: ListState::NotLoaded,
            filter_query: String::new(),
        }
    }

    pub fn me(&self) -> Participant {
        self.me
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn entry(&self, conversation_id: Uuid) -> Option<&ConversationEntry> {
        self.entries.iter().find(|entry| entry.id == conversation_id)
    }

    pub fn active(&self) -> Option<Uuid> {
        self.active
    }

    pub fn list_state(&self) -> ListState {
        self.list_state
    }

    pub fn filter_query(&self) -> &str {
        &self.filter_query
    }

    /// True when the list should show "No conversations found".
    pub fn is_empty_state(&self) -> bool {
        matches!(self.list_state, ListState::Loaded | ListState::Failed) && self.entries.is_empty()
    }

    /// Entries whose counterpart name contains `query`, case-insensitively.
    pub fn filter(&self, query: &str) -> Vec<&ConversationEntry> {
        let needle = query.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|entry| needle.is_empty() || entry.profile.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Entries matching the current filter text.
    pub fn visible(&self) -> Vec<&ConversationEntry> {
        self.filter(&self.filter_query)
    }

    fn entry_mut(&mut self, conversation_id: Uuid) -> Option<&mut ConversationEntry> {
        self.entries.iter_mut().find(|entry| entry.id == conversation_id)
    }

    pub fn apply(&mut self, action: CacheAction) -> Vec<Effect> {
        match action {
            CacheAction::LoadConversations => self.begin_load(),
            CacheAction::ConversationsLoaded(list) => {
                self.apply_conversations(list);
                Vec::new()
            }
            CacheAction::ConversationsFailed => {
                self.list_state = ListState::Failed;
                Vec::new()
            }
            CacheAction::Select(id) => self.select_conversation(id),
            CacheAction::Deselect => {
                self.active = None;
                Vec::new()
            }
            CacheAction::RecentLoaded {
                conversation_id,
                messages,
                has_more,
            } => {
                self.apply_recent(conversation_id, messages, has_more);
                Vec::new()
            }
            CacheAction::RecentFailed { conversation_id } => {
                if let Some(entry) = self.entry_mut(conversation_id) {
                    entry.hydrating = false;
                }
                Vec::new()
            }
            CacheAction::RequestOlder { conversation_id } => self.request_older(conversation_id),
            CacheAction::OlderPageLoaded {
                conversation_id,
                messages,
                has_more,
                page,
            } => {
                self.apply_older_page(conversation_id, messages, has_more, page);
                Vec::new()
            }
            CacheAction::OlderPageFailed { conversation_id } => {
                if let Some(entry) = self.entry_mut(conversation_id) {
                    entry.pagination.loading_older = false;
                }
                Vec::new()
            }
            CacheAction::MarkReadFinished { conversation_id } => self
                .entry_mut(conversation_id)
                .and_then(|entry| {
                    entry.marking_read = false;
                    if entry.mark_read_pending {
                        entry.mark_read_pending = false;
                        entry.request_mark_read()
                    } else {
                        None
                    }
                })
                .into_iter()
                .collect(),
            CacheAction::Inbound(payload) => self.apply_inbound(payload),
            CacheAction::OptimisticSend {
                conversation_id,
                content,
            } => self.apply_optimistic_send(conversation_id, content),
            CacheAction::SetFilter(query) => {
                self.filter_query = query;
                Vec::new()
            }
        }
    }

    fn begin_load(&mut self) -> Vec<Effect> {
        if self.list_state == ListState::Loading {
            return Vec::new();
        }
        self.list_state = ListState::Loading;
        vec![Effect::FetchConversations]
    }

    /// Builds skeleton entries; conversations already in the cache keep their
    /// loaded windows.
    fn apply_conversations(&mut self, list: Vec<ConversationWithLastMessage>) {
        let mut previous: HashMap<Uuid, ConversationEntry> = std::mem::take(&mut self.entries)
            .into_iter()
            .map(|entry| (entry.id, entry))
            .collect();

        let active = self.active;
        self.entries = list
            .into_iter()
            .map(|item| {
                let id = item.profile.conversation_id;
                let mut entry = match previous.remove(&id) {
                    Some(mut existing) => {
                        let fetched_date = item.last_message.as_ref().map(|m| m.date);
                        let known_date = existing.last_message.as_ref().map(|m| m.date);
                        if fetched_date >= known_date {
                            existing.last_message = item.last_message;
                        }
                        existing.profile = item.profile;
                        existing.unread_count = clamp_unread(item.unread_count);
                        existing
                    }
                    None => ConversationEntry::skeleton(item),
                };
                if active == Some(id) {
                    entry.unread_count = 0;
                }
                entry
            })
            .collect();

        if let Some(id) = self.active {
            if self.entry(id).is_none() {
                self.active = None;
            }
        }
        self.list_state = ListState::Loaded;
    }

    /// Marks a conversation active, clears its unread counter and asks for
    /// its recent window the first time it is opened. Reopening a window with
    /// unread messages asks the server to mark them read.
    pub fn select_conversation(&mut self, conversation_id: Uuid) -> Vec<Effect> {
        let Some(entry) = self.entry_mut(conversation_id) else {
            debug!("Ignoring selection of unknown conversation {}", conversation_id);
            return Vec::new();
        };

        let mut effects = Vec::new();
        let had_unread = entry.unread_count != 0 || entry.has_unread_incoming();
        if entry.unread_count != 0 {
            entry.unread_count = 0;
            effects.push(Effect::Publish(ConversationEvent::new(
                conversation_id,
                ConversationEventKind::UnreadChanged { unread: 0 },
            )));
        }
        entry.mark_all_read();
        for message in &mut entry.buffered {
            message.is_read = true;
        }

        if !entry.messages_loaded && !entry.hydrating {
            // The recent fetch marks the conversation read on the server
            entry.hydrating = true;
            effects.push(Effect::FetchRecent(conversation_id));
        } else if had_unread {
            effects.extend(entry.request_mark_read());
        }

        self.active = Some(conversation_id);
        effects
    }

    fn apply_recent(&mut self, conversation_id: Uuid, messages: Vec<MessageDto>, has_more: bool) {
        let me = self.me.role;
        let page_size = self.page_size;
        let is_active = self.active == Some(conversation_id);
        let Some(entry) = self.entry_mut(conversation_id) else {
            return;
        };
        if entry.messages_loaded {
            debug!("Recent window for {} already loaded", conversation_id);
            return;
        }

        let returned = messages.len();
        entry.messages = messages
            .into_iter()
            .map(|dto| CachedMessage::from_dto(dto, me))
            .collect();

        // Live messages the fetch may or may not have seen
        let fetched_len = entry.messages.len();
        for buffered in std::mem::take(&mut entry.buffered) {
            let stored = entry.messages[..fetched_len]
                .iter()
                .any(|message| buffered.matches_stored(message));
            if !stored {
                entry.push_live(buffered);
            }
        }

        if is_active {
            entry.mark_all_read();
        }
        entry.messages_loaded = true;
        entry.hydrating = false;
        entry.pagination = PaginationState {
            page: 1,
            has_more: effective_has_more(returned, page_size, has_more),
            loading_older: false,
        };
    }

    /// Starts loading the next older page unless one is already in flight or
    /// history is exhausted.
    pub fn request_older(&mut self, conversation_id: Uuid) -> Vec<Effect> {
        let Some(entry) = self.entry_mut(conversation_id) else {
            return Vec::new();
        };
        if !entry.messages_loaded || !entry.pagination.has_more || entry.pagination.loading_older {
            return Vec::new();
        }

        entry.pagination.loading_older = true;
        vec![Effect::FetchPage {
            conversation_id,
            page: entry.pagination.page + 1,
        }]
    }

    /// Prepends an older page to the window.
    ///
    /// Pages are offset-based, so live traffic since hydration shifts them
    /// towards the present: part of a page may already be in the window, as
    /// server copies or as optimistic sends. Those are merged by id (or
    /// matched to their optimistic copy) instead of being prepended.
    pub fn apply_older_page(
        &mut self,
        conversation_id: Uuid,
        messages: Vec<MessageDto>,
        has_more: bool,
        page_index: u32,
    ) {
        let me = self.me.role;
        let page_size = self.page_size;
        let is_active = self.active == Some(conversation_id);
        let Some(entry) = self.entry_mut(conversation_id) else {
            return;
        };
        entry.pagination.loading_older = false;

        if !entry.messages_loaded || page_index != entry.pagination.page + 1 {
            debug!(
                "Dropping stale page {} for {} (window holds {} page(s))",
                page_index, conversation_id, entry.pagination.page
            );
            return;
        }

        let returned = messages.len();
        let mut known: HashSet<Uuid> = entry.messages.iter().filter_map(|m| m.server_id).collect();
        let mut fresh = Vec::new();
        for dto in messages {
            if !known.insert(dto.id) {
                continue;
            }
            let mut message = CachedMessage::from_dto(dto, me);
            message.is_read |= is_active;

            let sent_here = entry
                .messages
                .iter_mut()
                .find(|local| local.optimistic && local.server_id.is_none() && local.matches_stored(&message));
            match sent_here {
                Some(local) => local.server_id = message.server_id,
                None => fresh.push(message),
            }
        }

        // Anything newer than the head was missed live; slot it in by date
        let head = entry.messages.first().map(|m| m.date);
        let (older, missed): (Vec<_>, Vec<_>) = fresh
            .into_iter()
            .partition(|message| head.map_or(true, |head| message.date <= head));
        entry.messages.splice(0..0, older);
        for message in missed {
            entry.push_live(message);
        }

        entry.pagination.page = page_index;
        entry.pagination.has_more = effective_has_more(returned, page_size, has_more);
    }

    /// Merges a `receive_message` event. Unknown conversations are dropped.
    pub fn apply_inbound(&mut self, payload: ReceiveMessagePayload) -> Vec<Effect> {
        let me = self.me.role;
        let conversation_id = payload.conversation_id;
        let is_active = self.active == Some(conversation_id);
        let Some(entry) = self.entry_mut(conversation_id) else {
            debug!("Dropping message for conversation {} not in cache", conversation_id);
            return Vec::new();
        };

        if entry.holds(payload.id) {
            debug!("Message {} already in conversation {}", payload.id, conversation_id);
            return Vec::new();
        }

        let mut message = CachedMessage::from_inbound(payload, me);
        // Echoes of our own sends from another tab never count as unread
        let from_me = message.role == MessageRole::Sender;
        message.is_read = is_active || from_me;

        entry.last_message = Some(LastMessage {
            content: message.content.clone(),
            date: message.date,
        });

        let mut effects = vec![Effect::Publish(ConversationEvent::new(
            conversation_id,
            ConversationEventKind::MessageAppended {
                content: message.content.clone(),
                sender: message.sender,
            },
        ))];

        if entry.messages_loaded {
            entry.push_live(message);
        } else if entry.hydrating {
            entry.buffered.push(message);
        }

        if is_active && !from_me {
            effects.extend(entry.request_mark_read());
        } else if !from_me {
            entry.unread_count = entry.unread_count.saturating_add(1);
            effects.push(Effect::Publish(ConversationEvent::new(
                conversation_id,
                ConversationEventKind::UnreadChanged {
                    unread: entry.unread_count,
                },
            )));
        }

        effects
    }

    /// Appends a locally sent message right away and asks the session to emit it.
    pub fn apply_optimistic_send(&mut self, conversation_id: Uuid, content: String) -> Vec<Effect> {
        if content.trim().is_empty() {
            return Vec::new();
        }
        let me = self.me.role;
        let Some(entry) = self.entry_mut(conversation_id) else {
            debug!("Not sending to unknown conversation {}", conversation_id);
            return Vec::new();
        };

        // Never let the local clock place a new message above older ones
        let now = Utc::now();
        let date = entry
            .messages
            .last()
            .map(|last| last.date.max(now))
            .unwrap_or(now);

        let message = CachedMessage {
            local_id: Uuid::new_v4(),
            server_id: None,
            role: MessageRole::Sender,
            sender: me,
            content: content.clone(),
            date,
            is_read: true,
            optimistic: true,
        };

        entry.last_message = Some(LastMessage {
            content: content.clone(),
            date,
        });
        if entry.messages_loaded {
            entry.messages.push(message);
        } else if entry.hydrating {
            entry.buffered.push(message);
        }

        vec![
            Effect::Publish(ConversationEvent::new(
                conversation_id,
                ConversationEventKind::MessageAppended {
                    content: content.clone(),
                    sender: me,
                },
            )),
            Effect::Send {
                conversation_id,
                content,
            },
        ]
    }
}
