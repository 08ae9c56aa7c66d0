use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Which side of a conversation a participant (or a message's sender) is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    User,
    Company,
}

impl ParticipantRole {
    pub fn counterpart(self) -> Self {
        match self {
            ParticipantRole::User => ParticipantRole::Company,
            ParticipantRole::Company => ParticipantRole::User,
        }
    }
}

impl std::fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParticipantRole::User => write!(f, "user"),
            ParticipantRole::Company => write!(f, "company"),
        }
    }
}

impl std::str::FromStr for ParticipantRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(ParticipantRole::User),
            "company" => Ok(ParticipantRole::Company),
            other => Err(format!("unknown participant type: {}", other)),
        }
    }
}

/// An authenticated party: a job seeker or a company account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub role: ParticipantRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text")]
pub enum ConversationStatus {
    Active,
    Archived,
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationStatus::Active => write!(f, "Active"),
            ConversationStatus::Archived => write!(f, "Archived"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn participant(&self, role: ParticipantRole) -> Participant {
        let id = match role {
            ParticipantRole::User => self.user_id,
            ParticipantRole::Company => self.company_id,
        };
        Participant { id, role }
    }

    pub fn has_participant(&self, participant: &Participant) -> bool {
        self.participant(participant.role).id == participant.id
    }

    pub fn counterpart_of(&self, participant: &Participant) -> Participant {
        self.participant(participant.role.counterpart())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: ParticipantRole,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            status: ConversationStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_participant_role_display() {
        assert_eq!(ParticipantRole::User.to_string(), "user");
        assert_eq!(ParticipantRole::Company.to_string(), "company");
        assert_eq!("Company".parse::<ParticipantRole>(), Ok(ParticipantRole::Company));
        assert!("admin".parse::<ParticipantRole>().is_err());
    }

    #[test]
    fn test_membership_checks_role_and_id() {
        let conv = conversation();
        let user = Participant { id: conv.user_id, role: ParticipantRole::User };
        let impostor = Participant { id: conv.user_id, role: ParticipantRole::Company };

        assert!(conv.has_participant(&user));
        assert!(!conv.has_participant(&impostor));
        assert_eq!(conv.counterpart_of(&user).id, conv.company_id);
        assert_eq!(conv.counterpart_of(&user).role, ParticipantRole::Company);
    }
}
