//! Typed publish/subscribe for conversation state changes.
//!
//! Other parts of a client (badges, notifications, other windows relaying
//! events) subscribe here instead of polling the session. Every event carries
//! an id; republishing an id that is still in the seen window is a no-op.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use futures::Stream;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::conversation::conversation_models::ParticipantRole;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_SEEN_CAPACITY: usize = 1024;

pub trait BusEvent: Clone + Send + 'static {
    fn event_id(&self) -> Uuid;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationEvent {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub kind: ConversationEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEventKind {
    MessageAppended { content: String, sender: ParticipantRole },
    UnreadChanged { unread: u32 },
}

impl ConversationEvent {
    pub fn new(conversation_id: Uuid, kind: ConversationEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            kind,
        }
    }
}

impl BusEvent for ConversationEvent {
    fn event_id(&self) -> Uuid {
        self.id
    }
}

/// Ids seen recently, oldest evicted first.
struct SeenIds {
    ids: HashSet<Uuid>,
    order: VecDeque<Uuid>,
    capacity: usize,
}

impl SeenIds {
    fn insert(&mut self, id: Uuid) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }
}

#[derive(Clone)]
pub struct EventBus<E: BusEvent> {
    tx: broadcast::Sender<E>,
    seen: Arc<Mutex<SeenIds>>,
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY, DEFAULT_SEEN_CAPACITY)
    }
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(channel_capacity: usize, seen_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            tx,
            seen: Arc::new(Mutex::new(SeenIds {
                ids: HashSet::new(),
                order: VecDeque::new(),
                capacity: seen_capacity.max(1),
            })),
        }
    }

    /// Returns false when the event id was already published.
    pub fn publish(&self, event: E) -> bool {
        let fresh = self
            .seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(event.event_id());
        if fresh {
            // No subscribers is fine
            let _ = self.tx.send(event);
        }
        fresh
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    /// Subscription as a stream; events missed by a lagging subscriber are skipped.
    pub fn stream(&self) -> impl Stream<Item = E> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|event| async move { event.ok() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(conversation_id: Uuid) -> ConversationEvent {
        ConversationEvent::new(conversation_id, ConversationEventKind::UnreadChanged { unread: 1 })
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_dropped() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let e = event(Uuid::new_v4());

        assert!(bus.publish(e.clone()));
        assert!(!bus.publish(e.clone()));

        assert_eq!(rx.recv().await.unwrap(), e);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_seen_window_is_bounded() {
        let bus = EventBus::with_capacity(16, 2);
        let first = event(Uuid::new_v4());

        assert!(bus.publish(first.clone()));
        assert!(bus.publish(event(Uuid::new_v4())));
        assert!(bus.publish(event(Uuid::new_v4())));

        // `first` has been evicted, so it is accepted again
        assert!(bus.publish(first));
    }

    #[tokio::test]
    async fn test_stream_delivers_in_order() {
        let bus = EventBus::new();
        let stream = bus.stream();
        tokio::pin!(stream);
        let a = event(Uuid::new_v4());
        let b = event(Uuid::new_v4());

        bus.publish(a.clone());
        bus.publish(b.clone());

        assert_eq!(stream.next().await, Some(a));
        assert_eq!(stream.next().await, Some(b));
    }
}
