//! The conversation session: one task owns the [`ConversationCache`] and
//! applies every change in arrival order.
//!
//! UI commands, fetch results and inbound socket messages all funnel into
//! the same loop, so the reducer never sees two writers. Fetches run on
//! spawned tasks and come back as [`CacheAction`]s. Each applied action
//! publishes a fresh snapshot on a watch channel.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::conversation::conversation_models::Participant;

use super::api::{ConversationApi, HttpConversationApi};
use super::cache::{CacheAction, ConversationCache, Effect};
use super::channel::{DeliveryChannel, InboundReceiver, WsDeliveryChannel};
use super::error::{ClientError, Result};
use super::events::{ConversationEvent, EventBus};
use super::loader::ConversationListLoader;
use super::pager::{near_top, MessagePager};
use super::ClientConfig;

enum Command {
    Apply(CacheAction),
    Scrolled { conversation_id: Uuid, scroll_top: f64 },
    Barrier(oneshot::Sender<()>),
    Shutdown,
}

/// Handle held by the UI layer. Dropping every handle stops the session.
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConversationCache>,
    events: EventBus<ConversationEvent>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("Conversation session already stopped");
        }
    }

    fn apply(&self, action: CacheAction) {
        self.command(Command::Apply(action));
    }

    /// Fetches the contact list again. Ignored while a load is in flight.
    pub fn reload(&self) {
        self.apply(CacheAction::LoadConversations);
    }

    pub fn select(&self, conversation_id: Uuid) {
        self.apply(CacheAction::Select(conversation_id));
    }

    pub fn deselect(&self) {
        self.apply(CacheAction::Deselect);
    }

    /// Scroll position of the message pane; near the top this loads older history.
    pub fn scrolled(&self, conversation_id: Uuid, scroll_top: f64) {
        self.command(Command::Scrolled {
            conversation_id,
            scroll_top,
        });
    }

    pub fn load_older(&self, conversation_id: Uuid) {
        self.apply(CacheAction::RequestOlder { conversation_id });
    }

    pub fn send(&self, conversation_id: Uuid, content: impl Into<String>) {
        self.apply(CacheAction::OptimisticSend {
            conversation_id,
            content: content.into(),
        });
    }

    pub fn set_filter(&self, query: impl Into<String>) {
        self.apply(CacheAction::SetFilter(query.into()));
    }

    pub fn snapshot(&self) -> ConversationCache {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ConversationCache> {
        self.state.clone()
    }

    pub fn events(&self) -> &EventBus<ConversationEvent> {
        &self.events
    }

    /// Waits until a snapshot satisfies `predicate` and returns it.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&ConversationCache) -> bool,
    ) -> Result<ConversationCache> {
        let mut state = self.state.clone();
        let snapshot = state
            .wait_for(|cache| predicate(cache))
            .await
            .map_err(|_| ClientError::ChannelClosed)?;
        Ok(snapshot.clone())
    }

    /// Resolves once every command sent before it has been applied.
    pub async fn barrier(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Barrier(tx))
            .map_err(|_| ClientError::ChannelClosed)?;
        rx.await.map_err(|_| ClientError::ChannelClosed)
    }

    /// Stops the session and closes its delivery channel.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            error!("Conversation session task failed: {e}");
        }
    }
}

pub struct ConversationSession {
    cache: ConversationCache,
    api: Arc<dyn ConversationApi>,
    loader: ConversationListLoader,
    pager: MessagePager,
    channel: Arc<dyn DeliveryChannel>,
    events: EventBus<ConversationEvent>,
    state: watch::Sender<ConversationCache>,
    results: mpsc::UnboundedSender<CacheAction>,
}

impl ConversationSession {
    /// Starts a session over the given API and delivery channel and kicks off
    /// the first list load.
    pub fn spawn(
        participant: Participant,
        api: Arc<dyn ConversationApi>,
        channel: Arc<dyn DeliveryChannel>,
        inbound: InboundReceiver,
        page_size: u32,
    ) -> SessionHandle {
        let cache = ConversationCache::new(participant, page_size);
        let (state_tx, state_rx) = watch::channel(cache.clone());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let events = EventBus::new();

        let session = ConversationSession {
            cache,
            api: api.clone(),
            loader: ConversationListLoader::new(api.clone()),
            pager: MessagePager::new(api, page_size),
            channel,
            events: events.clone(),
            state: state_tx,
            results: result_tx,
        };
        let task = tokio::spawn(session.run(command_rx, result_rx, inbound));

        let handle = SessionHandle {
            commands: command_tx,
            state: state_rx,
            events,
            task,
        };
        handle.reload();
        handle
    }

    /// Opens the REST client and socket described by `config` and starts a session.
    pub async fn connect(config: ClientConfig) -> Result<SessionHandle> {
        let api = Arc::new(HttpConversationApi::new(&config.base_url, &config.token));
        let (channel, inbound) =
            WsDeliveryChannel::connect(&config.ws_url, &config.token, config.participant).await?;

        Ok(Self::spawn(
            config.participant,
            api,
            Arc::new(channel),
            inbound,
            config.page_size,
        ))
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut results: mpsc::UnboundedReceiver<CacheAction>,
        mut inbound: InboundReceiver,
    ) {
        let me = self.cache.me();
        info!("Conversation session started for {} {}", me.role, me.id);
        let mut inbound_open = true;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Apply(action)) => self.dispatch(action),
                    Some(Command::Scrolled { conversation_id, scroll_top }) => {
                        if near_top(scroll_top) {
                            self.dispatch(CacheAction::RequestOlder { conversation_id });
                        }
                    }
                    Some(Command::Barrier(done)) => {
                        let _ = done.send(());
                    }
                    Some(Command::Shutdown) | None => break,
                },
                Some(action) = results.recv() => self.dispatch(action),
                message = inbound.recv(), if inbound_open => match message {
                    Some(payload) => self.dispatch(CacheAction::Inbound(payload)),
                    None => {
                        warn!("Delivery channel gone; no more live messages this session");
                        inbound_open = false;
                    }
                },
            }
        }

        info!("Conversation session stopped for {} {}", me.role, me.id);
    }

    fn dispatch(&mut self, action: CacheAction) {
        for effect in self.cache.apply(action) {
            self.run_effect(effect);
        }
        self.state.send_replace(self.cache.clone());
    }

    fn run_effect(&self, effect: Effect) {
        match effect {
            Effect::FetchConversations => {
                let loader = self.loader.clone();
                let results = self.results.clone();
                let me = self.cache.me();
                tokio::spawn(async move {
                    let action = match loader.load(me).await {
                        Ok(list) => {
                            debug!("Loaded {} conversation(s)", list.len());
                            CacheAction::ConversationsLoaded(list)
                        }
                        Err(e) => {
                            log_fetch_error("conversation list", &e);
                            CacheAction::ConversationsFailed
                        }
                    };
                    let _ = results.send(action);
                });
            }
            Effect::FetchRecent(conversation_id) => {
                let pager = self.pager.clone();
                let results = self.results.clone();
                tokio::spawn(async move {
                    let action = match pager.fetch_recent(conversation_id).await {
                        Ok(page) => CacheAction::RecentLoaded {
                            conversation_id,
                            messages: page.messages,
                            has_more: page.has_more,
                        },
                        Err(e) => {
                            log_fetch_error("recent messages", &e);
                            CacheAction::RecentFailed { conversation_id }
                        }
                    };
                    let _ = results.send(action);
                });
            }
            Effect::FetchPage {
                conversation_id,
                page,
            } => {
                let pager = self.pager.clone();
                let results = self.results.clone();
                tokio::spawn(async move {
                    let action = match pager.fetch_page(conversation_id, page).await {
                        Ok(older) => CacheAction::OlderPageLoaded {
                            conversation_id,
                            messages: older.messages,
                            has_more: older.has_more,
                            page: older.page,
                        },
                        Err(e) => {
                            log_fetch_error("older messages", &e);
                            CacheAction::OlderPageFailed { conversation_id }
                        }
                    };
                    let _ = results.send(action);
                });
            }
            Effect::MarkRead(conversation_id) => {
                let api = self.api.clone();
                let results = self.results.clone();
                tokio::spawn(async move {
                    match api.mark_read(conversation_id).await {
                        Ok(updated) => debug!("Marked {} message(s) read in {}", updated, conversation_id),
                        Err(e) => log_fetch_error("read receipt", &e),
                    }
                    let _ = results.send(CacheAction::MarkReadFinished { conversation_id });
                });
            }
            Effect::Send {
                conversation_id,
                content,
            } => {
                // The optimistic copy stays even if the emit fails
                if let Err(e) = self.channel.send(conversation_id, content) {
                    warn!("Message for {} not sent: {}", conversation_id, e);
                }
            }
            Effect::Publish(event) => {
                self.events.publish(event);
            }
        }
    }
}

fn log_fetch_error(what: &str, err: &ClientError) {
    match err {
        ClientError::SessionExpired => error!("Session expired while fetching {}", what),
        other => warn!("Failed to fetch {}: {}", what, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Notify;

    use crate::client::cache::ListState;
    use crate::client::events::ConversationEventKind;
    use crate::conversation::conversation_dto::{
        ConversationProfile, ConversationWithLastMessage, MessageDto, PaginatedMessagesResponse,
        PaginationInfo, RecentMessagesResponse,
    };
    use crate::conversation::conversation_models::ParticipantRole;
    use crate::websocket::types::ReceiveMessagePayload;

    const PAGE: u32 = 15;

    #[derive(Default)]
    struct FakeApi {
        conversations: Mutex<Vec<ConversationWithLastMessage>>,
        history: Mutex<HashMap<Uuid, Vec<MessageDto>>>,
        fail_list: bool,
        recent_gate: Option<Arc<Notify>>,
        page_gate: Option<Arc<Notify>>,
        list_calls: AtomicUsize,
        recent_calls: AtomicUsize,
        page_calls: AtomicUsize,
        mark_read_calls: AtomicUsize,
        marked: Arc<Notify>,
    }

    impl FakeApi {
        fn messages(&self, conversation_id: Uuid) -> Vec<MessageDto> {
            self.history
                .lock()
                .unwrap()
                .get(&conversation_id)
                .cloned()
                .unwrap_or_default()
        }

        /// Stores a message the way the server would and returns its socket frame.
        fn store(&self, conversation_id: Uuid, content: &str) -> ReceiveMessagePayload {
            let message = MessageDto {
                id: Uuid::new_v4(),
                sender: ParticipantRole::Company,
                content: content.to_string(),
                date: Utc::now(),
                is_read: false,
            };
            self.history
                .lock()
                .unwrap()
                .entry(conversation_id)
                .or_default()
                .push(message.clone());
            for conversation in self.conversations.lock().unwrap().iter_mut() {
                if conversation.profile.conversation_id == conversation_id {
                    conversation.unread_count += 1;
                }
            }
            ReceiveMessagePayload {
                id: message.id,
                conversation_id,
                content: message.content,
                date: message.date,
                sender: message.sender,
            }
        }

        /// Newest-first window `[offset, offset + limit)`, returned oldest first.
        fn window(&self, conversation_id: Uuid, offset: usize, limit: usize) -> (Vec<MessageDto>, usize) {
            let all = self.messages(conversation_id);
            let total = all.len();
            let end = total.saturating_sub(offset);
            let start = end.saturating_sub(limit);
            (all[start..end].to_vec(), total)
        }
    }

    #[async_trait]
    impl ConversationApi for FakeApi {
        async fn conversations_with_last_message(
            &self,
            _participant: Participant,
        ) -> Result<Vec<ConversationWithLastMessage>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_list {
                return Err(ClientError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(self.conversations.lock().unwrap().clone())
        }

        async fn recent_messages(
            &self,
            conversation_id: Uuid,
            limit: u32,
        ) -> Result<RecentMessagesResponse> {
            self.recent_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.recent_gate {
                gate.notified().await;
            }
            let (messages, total) = self.window(conversation_id, 0, limit as usize);
            Ok(RecentMessagesResponse {
                messages,
                has_more: total > limit as usize,
            })
        }

        async fn paginated_messages(
            &self,
            conversation_id: Uuid,
            page: u32,
            limit: u32,
        ) -> Result<PaginatedMessagesResponse> {
            self.page_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.page_gate {
                gate.notified().await;
            }
            let offset = ((page - 1) * limit) as usize;
            let (messages, total) = self.window(conversation_id, offset, limit as usize);
            Ok(PaginatedMessagesResponse {
                pagination: PaginationInfo {
                    has_more: offset + messages.len() < total,
                    total_count: total as i64,
                    page,
                    limit,
                },
                messages,
            })
        }

        async fn mark_read(&self, conversation_id: Uuid) -> Result<u64> {
            self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
            let mut updated = 0;
            for conversation in self.conversations.lock().unwrap().iter_mut() {
                if conversation.profile.conversation_id == conversation_id {
                    updated = conversation.unread_count as u64;
                    conversation.unread_count = 0;
                }
            }
            self.marked.notify_one();
            Ok(updated)
        }
    }

    #[derive(Default)]
    struct FakeChannel {
        sent: Mutex<Vec<(Uuid, String)>>,
    }

    impl DeliveryChannel for FakeChannel {
        fn send(&self, conversation_id: Uuid, content: String) -> Result<()> {
            self.sent.lock().unwrap().push((conversation_id, content));
            Ok(())
        }
    }

    fn me() -> Participant {
        Participant {
            id: Uuid::new_v4(),
            role: ParticipantRole::User,
        }
    }

    fn listed(name: &str) -> ConversationWithLastMessage {
        ConversationWithLastMessage {
            profile: ConversationProfile {
                conversation_id: Uuid::new_v4(),
                company_id: Some(Uuid::new_v4()),
                user_id: None,
                name: name.to_string(),
                logo: None,
                photo: None,
                website: None,
            },
            last_message: None,
            unread_count: 0,
        }
    }

    fn history(count: usize) -> Vec<MessageDto> {
        let start = Utc::now() - chrono::Duration::hours(2);
        (0..count)
            .map(|i| MessageDto {
                id: Uuid::new_v4(),
                sender: ParticipantRole::Company,
                content: format!("message {}", i),
                date: start + chrono::Duration::minutes(i as i64),
                is_read: true,
            })
            .collect()
    }

    struct Harness {
        handle: SessionHandle,
        api: Arc<FakeApi>,
        channel: Arc<FakeChannel>,
        inbound: mpsc::UnboundedSender<ReceiveMessagePayload>,
    }

    fn start(api: FakeApi) -> Harness {
        let api = Arc::new(api);
        let channel = Arc::new(FakeChannel::default());
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let handle = ConversationSession::spawn(me(), api.clone(), channel.clone(), inbound_rx, PAGE);
        Harness {
            handle,
            api,
            channel,
            inbound: inbound_tx,
        }
    }

    async fn until(
        handle: &SessionHandle,
        predicate: impl FnMut(&ConversationCache) -> bool,
    ) -> ConversationCache {
        tokio::time::timeout(Duration::from_secs(5), handle.wait_for(predicate))
            .await
            .expect("timed out waiting for session state")
            .unwrap()
    }

    fn loaded(id: Uuid) -> impl FnMut(&ConversationCache) -> bool {
        move |cache| cache.entry(id).map(|e| e.messages_loaded).unwrap_or(false)
    }

    #[tokio::test]
    async fn test_list_loads_on_start() {
        let h = start(FakeApi {
            conversations: Mutex::new(vec![listed("Acme"), listed("Globex")]),
            ..Default::default()
        });

        let cache = until(&h.handle, |c| c.list_state() == ListState::Loaded).await;

        assert_eq!(cache.entries().len(), 2);
        assert!(cache.entries().iter().all(|e| !e.messages_loaded));
        assert_eq!(h.api.recent_calls.load(Ordering::SeqCst), 0);
        h.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_list_load_is_empty_state() {
        let h = start(FakeApi {
            fail_list: true,
            ..Default::default()
        });

        let cache = until(&h.handle, |c| c.list_state() == ListState::Failed).await;
        assert!(cache.is_empty_state());
        h.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_repeated_selection_fetches_recent_once() {
        let c = listed("Acme");
        let id = c.profile.conversation_id;
        let gate = Arc::new(Notify::new());
        let h = start(FakeApi {
            conversations: Mutex::new(vec![c]),
            history: Mutex::new(HashMap::from([(id, history(5))])),
            recent_gate: Some(gate.clone()),
            ..Default::default()
        });
        until(&h.handle, |c| c.list_state() == ListState::Loaded).await;

        h.handle.select(id);
        h.handle.select(id);
        h.handle.deselect();
        h.handle.select(id);
        h.handle.barrier().await.unwrap();
        gate.notify_one();

        let cache = until(&h.handle, loaded(id)).await;
        assert_eq!(cache.entry(id).unwrap().messages.len(), 5);

        h.handle.select(id);
        h.handle.barrier().await.unwrap();
        assert_eq!(h.api.recent_calls.load(Ordering::SeqCst), 1);
        h.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_scrolling_loads_full_history_once_per_page() {
        let c = listed("Acme");
        let id = c.profile.conversation_id;
        let all = history(40);
        let gate = Arc::new(Notify::new());
        let h = start(FakeApi {
            conversations: Mutex::new(vec![c]),
            history: Mutex::new(HashMap::from([(id, all.clone())])),
            page_gate: Some(gate.clone()),
            ..Default::default()
        });
        until(&h.handle, |c| c.list_state() == ListState::Loaded).await;
        h.handle.select(id);
        until(&h.handle, loaded(id)).await;

        // Far from the top: nothing happens
        h.handle.scrolled(id, 800.0);
        h.handle.barrier().await.unwrap();
        assert_eq!(h.api.page_calls.load(Ordering::SeqCst), 0);

        for expected_page in [2u32, 3] {
            h.handle.scrolled(id, 10.0);
            h.handle.scrolled(id, 0.0);
            h.handle.barrier().await.unwrap();
            gate.notify_one();
            until(&h.handle, move |c| {
                c.entry(id).map(|e| e.pagination.page) == Some(expected_page)
            })
            .await;
        }

        assert_eq!(h.api.page_calls.load(Ordering::SeqCst), 2);
        let cache = h.handle.snapshot();
        let entry = cache.entry(id).unwrap();
        let ids: Vec<Uuid> = entry.messages.iter().filter_map(|m| m.server_id).collect();
        assert_eq!(ids, all.iter().map(|m| m.id).collect::<Vec<_>>());
        assert!(!entry.pagination.has_more);

        // History exhausted: no further requests
        h.handle.scrolled(id, 0.0);
        h.handle.barrier().await.unwrap();
        assert_eq!(h.api.page_calls.load(Ordering::SeqCst), 2);
        h.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_inbound_to_background_conversation() {
        let active = listed("Acme");
        let background = listed("Globex");
        let (a, b) = (active.profile.conversation_id, background.profile.conversation_id);
        let h = start(FakeApi {
            conversations: Mutex::new(vec![active, background]),
            ..Default::default()
        });
        until(&h.handle, |c| c.list_state() == ListState::Loaded).await;
        h.handle.select(a);
        until(&h.handle, loaded(a)).await;
        let mut events = h.handle.events().subscribe();

        h.inbound.send(h.api.store(b, "Interview tomorrow?")).unwrap();

        let cache = until(&h.handle, move |c| {
            c.entry(b).map(|e| e.unread_count) == Some(1)
        })
        .await;
        assert_eq!(cache.entry(b).unwrap().preview(), "Interview tomorrow?");
        assert_eq!(cache.entry(a).unwrap().unread_count, 0);
        assert_eq!(cache.active(), Some(a));
        // Only the active conversation was ever hydrated
        assert_eq!(h.api.recent_calls.load(Ordering::SeqCst), 1);

        let first = events.recv().await.unwrap();
        assert!(matches!(first.kind, ConversationEventKind::MessageAppended { .. }));
        let second = events.recv().await.unwrap();
        assert_eq!(second.kind, ConversationEventKind::UnreadChanged { unread: 1 });
        h.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_live_traffic_then_scrolling_keeps_history_intact() {
        let c = listed("Acme");
        let id = c.profile.conversation_id;
        let h = start(FakeApi {
            conversations: Mutex::new(vec![c]),
            history: Mutex::new(HashMap::from([(id, history(40))])),
            ..Default::default()
        });
        until(&h.handle, |c| c.list_state() == ListState::Loaded).await;
        h.handle.select(id);
        until(&h.handle, loaded(id)).await;

        // More than a page of live messages shifts every server offset
        for i in 0..=PAGE {
            h.inbound.send(h.api.store(id, &format!("live {}", i))).unwrap();
        }
        until(&h.handle, move |c| {
            c.entry(id).map(|e| e.messages.len()) == Some(PAGE as usize * 2 + 1)
        })
        .await;

        let mut page = 1;
        while h.handle.snapshot().entry(id).unwrap().pagination.has_more {
            page += 1;
            h.handle.scrolled(id, 0.0);
            h.handle.barrier().await.unwrap();
            until(&h.handle, move |c| c.entry(id).map(|e| e.pagination.page) == Some(page)).await;
            assert!(page < 10, "pagination never finished");
        }

        let cache = h.handle.snapshot();
        let entry = cache.entry(id).unwrap();
        let window: Vec<Uuid> = entry.messages.iter().filter_map(|m| m.server_id).collect();
        let stored: Vec<Uuid> = h.api.messages(id).iter().map(|m| m.id).collect();
        assert_eq!(window, stored);
        assert_eq!(window.len(), 56);
        assert!(entry.messages.windows(2).all(|w| w[0].date <= w[1].date));
        h.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_read_state_reaches_the_server() {
        let first = listed("Acme");
        let second = listed("Globex");
        let (a, b) = (first.profile.conversation_id, second.profile.conversation_id);
        let h = start(FakeApi {
            conversations: Mutex::new(vec![first, second]),
            ..Default::default()
        });
        let marked = h.api.marked.clone();
        let settle = |notify: Arc<Notify>| async move {
            tokio::time::timeout(Duration::from_secs(5), notify.notified())
                .await
                .expect("mark-read request never sent");
        };
        until(&h.handle, |c| c.list_state() == ListState::Loaded).await;
        h.handle.select(a);
        until(&h.handle, loaded(a)).await;

        // Read while the conversation is open
        h.inbound.send(h.api.store(a, "Are you available?")).unwrap();
        settle(marked.clone()).await;

        // Read by coming back to an already loaded conversation
        h.handle.select(b);
        h.inbound.send(h.api.store(a, "Hello?")).unwrap();
        until(&h.handle, move |c| c.entry(a).map(|e| e.unread_count) == Some(1)).await;
        h.handle.select(a);
        settle(marked).await;
        h.handle.select(b);

        h.handle.reload();
        h.handle.barrier().await.unwrap();
        let cache = until(&h.handle, |c| c.list_state() == ListState::Loaded).await;
        assert_eq!(cache.entry(a).unwrap().unread_count, 0);
        assert_eq!(h.api.mark_read_calls.load(Ordering::SeqCst), 2);
        h.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_send_is_optimistic() {
        let c = listed("Acme");
        let id = c.profile.conversation_id;
        let h = start(FakeApi {
            conversations: Mutex::new(vec![c]),
            ..Default::default()
        });
        until(&h.handle, |c| c.list_state() == ListState::Loaded).await;
        h.handle.select(id);
        until(&h.handle, loaded(id)).await;

        h.handle.send(id, "Hello");
        h.handle.barrier().await.unwrap();

        let cache = h.handle.snapshot();
        let last = cache.entry(id).unwrap().messages.last().unwrap().clone();
        assert_eq!(last.content, "Hello");
        assert!(last.optimistic);
        assert_eq!(
            *h.channel.sent.lock().unwrap(),
            vec![(id, "Hello".to_string())]
        );
        h.handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_filter_does_not_refetch() {
        let h = start(FakeApi {
            conversations: Mutex::new(vec![listed("Acme"), listed("Globex")]),
            ..Default::default()
        });
        until(&h.handle, |c| c.list_state() == ListState::Loaded).await;

        h.handle.set_filter("glo");
        h.handle.barrier().await.unwrap();

        let cache = h.handle.snapshot();
        assert_eq!(cache.visible().len(), 1);
        assert_eq!(h.api.list_calls.load(Ordering::SeqCst), 1);
        h.handle.shutdown().await;
    }
}
