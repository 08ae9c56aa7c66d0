use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::conversation::conversation_models::Participant;

use super::types::ServerEvent;

pub type WsSender = mpsc::UnboundedSender<ServerEvent>;

/// Registry of live sockets. A participant may hold several at once
/// (one per open tab or device), each tagged with its own connection id.
#[derive(Clone, Default)]
pub struct ConnectionManager {
    connections: Arc<DashMap<Participant, Vec<(Uuid, WsSender)>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a socket and returns its connection id.
    pub fn add_connection(&self, participant: Participant, tx: WsSender) -> Uuid {
        let connection_id = Uuid::new_v4();
        self.connections
            .entry(participant)
            .or_default()
            .push((connection_id, tx));
        connection_id
    }

    pub fn remove_connection(&self, participant: &Participant, connection_id: Uuid) {
        self.connections.remove_if_mut(participant, |_, senders| {
            senders.retain(|(id, _)| *id != connection_id);
            senders.is_empty()
        });
    }

    pub fn is_online(&self, participant: &Participant) -> bool {
        self.connections
            .get(participant)
            .map(|senders| !senders.is_empty())
            .unwrap_or(false)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|entry| entry.value().len()).sum()
    }

    /// Sends to every socket of `participant`. Returns how many accepted the event.
    pub fn send_to_participant(&self, participant: &Participant, event: ServerEvent) -> usize {
        self.send_filtered(participant, None, event)
    }

    /// Like `send_to_participant`, skipping the socket the event originated from.
    pub fn send_to_participant_except(
        &self,
        participant: &Participant,
        except: Uuid,
        event: ServerEvent,
    ) -> usize {
        self.send_filtered(participant, Some(except), event)
    }

    fn send_filtered(&self, participant: &Participant, except: Option<Uuid>, event: ServerEvent) -> usize {
        let Some(mut senders) = self.connections.get_mut(participant) else {
            return 0;
        };

        let mut delivered = 0;
        // Closed receivers belong to sockets that are mid-teardown
        senders.retain(|(id, tx)| {
            if Some(*id) == except {
                return true;
            }
            match tx.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::conversation_models::ParticipantRole;

    fn participant(role: ParticipantRole) -> Participant {
        Participant { id: Uuid::new_v4(), role }
    }

    #[test]
    fn test_fan_out_to_every_tab() {
        let manager = ConnectionManager::new();
        let user = participant(ParticipantRole::User);
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        manager.add_connection(user, tx1);
        manager.add_connection(user, tx2);

        assert_eq!(manager.send_to_participant(&user, ServerEvent::Ping), 2);
        assert!(matches!(rx1.try_recv(), Ok(ServerEvent::Ping)));
        assert!(matches!(rx2.try_recv(), Ok(ServerEvent::Ping)));
    }

    #[test]
    fn test_except_skips_origin_socket() {
        let manager = ConnectionManager::new();
        let company = participant(ParticipantRole::Company);
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let origin = manager.add_connection(company, tx1);
        manager.add_connection(company, tx2);

        assert_eq!(manager.send_to_participant_except(&company, origin, ServerEvent::Pong), 1);
        assert!(rx1.try_recv().is_err());
        assert!(matches!(rx2.try_recv(), Ok(ServerEvent::Pong)));
    }

    #[test]
    fn test_closed_sockets_are_pruned() {
        let manager = ConnectionManager::new();
        let user = participant(ParticipantRole::User);
        let (tx, rx) = mpsc::unbounded_channel();
        manager.add_connection(user, tx);
        drop(rx);

        assert_eq!(manager.send_to_participant(&user, ServerEvent::Ping), 0);
        assert_eq!(manager.connection_count(), 0);
    }

    #[test]
    fn test_remove_last_connection_goes_offline() {
        let manager = ConnectionManager::new();
        let user = participant(ParticipantRole::User);
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = manager.add_connection(user, tx);
        assert!(manager.is_online(&user));

        manager.remove_connection(&user, id);
        assert!(!manager.is_online(&user));
        assert_eq!(manager.send_to_participant(&user, ServerEvent::Ping), 0);
    }
}
