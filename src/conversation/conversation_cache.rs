//! Redis cache for the per-participant contact list.
//!
//! The list query joins every conversation with its newest message, which is
//! the most expensive read the messaging endpoints make. Entries are keyed by
//! `conversations:{role}:{id}` and dropped whenever a message is persisted or
//! read state changes. Redis failures never fail a request; they are logged
//! and the caller falls back to the database.
//!
//! Every invalidation also bumps a per-participant version counter. A reader
//! takes the version before querying and only stores its result if the
//! version is unchanged, so a list built before a write can't overwrite the
//! invalidation that write made.

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::conversation_dto::ConversationWithLastMessage;
use super::conversation_models::Participant;

const KEY_PREFIX: &str = "conversations";

/// Stores the list only while the version key still holds the expected value.
const PUT_IF_CURRENT: &str = r"
local current = redis.call('GET', KEYS[2]) or '0'
if current == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
    return 1
end
return 0
";

#[derive(Clone)]
pub struct ConversationListCache {
    client: Option<redis::Client>,
    conn: Arc<OnceCell<MultiplexedConnection>>,
    ttl_secs: u64,
}

impl ConversationListCache {
    pub fn new(client: redis::Client, ttl_secs: u64) -> Self {
        Self {
            client: Some(client),
            conn: Arc::new(OnceCell::new()),
            ttl_secs,
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            client: None,
            conn: Arc::new(OnceCell::new()),
            ttl_secs: 0,
        }
    }

    pub fn key(participant: &Participant) -> String {
        format!("{KEY_PREFIX}:{}:{}", participant.role, participant.id)
    }

    pub fn version_key(participant: &Participant) -> String {
        format!("{}:version", Self::key(participant))
    }

    async fn connection(&self) -> Option<MultiplexedConnection> {
        let client = self.client.as_ref()?;
        match self
            .conn
            .get_or_try_init(|| client.get_multiplexed_async_connection())
            .await
        {
            Ok(conn) => Some(conn.clone()),
            Err(e) => {
                warn!("Redis unavailable, conversation list cache bypassed: {e}");
                None
            }
        }
    }

    pub async fn get(&self, participant: &Participant) -> Option<Vec<ConversationWithLastMessage>> {
        let mut conn = self.connection().await?;
        let key = Self::key(participant);

        let raw = match conn.get::<_, Option<String>>(&key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Redis GET {key} failed: {e}");
                return None;
            }
        };

        match serde_json::from_str(&raw?) {
            Ok(list) => {
                debug!("Conversation list cache hit for {key}");
                Some(list)
            }
            Err(e) => {
                warn!("Discarding unreadable cache entry {key}: {e}");
                None
            }
        }
    }

    /// Current invalidation version for `participant`, taken before a database read.
    pub async fn version(&self, participant: &Participant) -> Option<String> {
        if self.ttl_secs == 0 {
            return None;
        }
        let mut conn = self.connection().await?;
        let key = Self::version_key(participant);

        match conn.get::<_, Option<String>>(&key).await {
            Ok(version) => Some(version.unwrap_or_else(|| "0".to_string())),
            Err(e) => {
                warn!("Redis GET {key} failed: {e}");
                None
            }
        }
    }

    /// Stores `list` unless the participant was invalidated after `version` was read.
    pub async fn put(
        &self,
        participant: &Participant,
        version: &str,
        list: &[ConversationWithLastMessage],
    ) {
        if self.ttl_secs == 0 {
            return;
        }
        let Some(mut conn) = self.connection().await else {
            return;
        };
        let key = Self::key(participant);

        let payload = match serde_json::to_string(list) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Could not serialize conversation list for {key}: {e}");
                return;
            }
        };

        let stored: redis::RedisResult<i32> = redis::Script::new(PUT_IF_CURRENT)
            .key(&key)
            .key(Self::version_key(participant))
            .arg(version)
            .arg(payload)
            .arg(self.ttl_secs)
            .invoke_async(&mut conn)
            .await;

        match stored {
            Ok(0) => debug!("Skipped stale conversation list for {key}"),
            Ok(_) => {}
            Err(e) => warn!("Redis conditional SET {key} failed: {e}"),
        }
    }

    pub async fn invalidate(&self, participants: &[Participant]) {
        if participants.is_empty() {
            return;
        }
        let Some(mut conn) = self.connection().await else {
            return;
        };
        let keys: Vec<String> = participants.iter().map(Self::key).collect();

        let mut pipe = redis::pipe();
        pipe.atomic().del(&keys).ignore();
        for participant in participants {
            pipe.incr(Self::version_key(participant), 1).ignore();
        }

        let result: redis::RedisResult<()> = pipe.query_async(&mut conn).await;
        if let Err(e) = result {
            warn!("Redis invalidation of {:?} failed: {e}", keys);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::conversation_models::ParticipantRole;
    use uuid::Uuid;

    #[test]
    fn test_key_includes_role_and_id() {
        let id = Uuid::new_v4();
        let key = ConversationListCache::key(&Participant { id, role: ParticipantRole::Company });
        assert_eq!(key, format!("conversations:company:{id}"));
    }

    #[test]
    fn test_version_key_sits_beside_the_list_key() {
        let participant = Participant { id: Uuid::new_v4(), role: ParticipantRole::User };
        let key = ConversationListCache::key(&participant);
        let version = ConversationListCache::version_key(&participant);
        assert_eq!(version, format!("{key}:version"));
        assert_ne!(version, ConversationListCache::key(&Participant {
            id: participant.id,
            role: ParticipantRole::Company,
        }));
    }

    #[test]
    fn test_stale_write_script_compares_before_setting() {
        let compare = PUT_IF_CURRENT.find("current == ARGV[1]").unwrap();
        let set = PUT_IF_CURRENT.find("'SET'").unwrap();
        assert!(compare < set);
    }

    #[tokio::test]
    async fn test_disabled_cache_is_a_no_op() {
        let cache = ConversationListCache::disabled();
        let participant = Participant { id: Uuid::new_v4(), role: ParticipantRole::User };

        assert!(cache.version(&participant).await.is_none());
        cache.put(&participant, "0", &[]).await;
        cache.invalidate(&[participant]).await;
        assert!(cache.get(&participant).await.is_none());
    }
}
