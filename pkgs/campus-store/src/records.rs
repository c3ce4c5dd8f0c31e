//! Record types shared by the stores and the change feed

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::entities::{chat_requests, messages, presence, typing_signals};

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// Identity of a conversation as seen by one viewer.
///
/// Group messages carry an explicit conversation id. Direct messages carry
/// none, so their key is "whoever is not me": the same thread is
/// `Direct(bob)` for Alice and `Direct(alice)` for Bob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id")]
pub enum ConversationKey {
    Direct(String),
    Group(String),
}

impl ConversationKey {
    /// Counterpart id for direct chats, group id for groups
    pub fn id(&self) -> &str {
        match self {
            ConversationKey::Direct(id) | ConversationKey::Group(id) => id,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, ConversationKey::Group(_))
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationKey::Direct(id) => write!(f, "direct:{}", id),
            ConversationKey::Group(id) => write!(f, "group:{}", id),
        }
    }
}

/// Opaque attachment descriptor returned by the upload collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub name: String,
    pub mime_type: String,
}

/// A message about to be appended to the log
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub tenant_id: String,
    pub sender_id: String,
    /// Participant id for direct messages, group id for group messages
    pub receiver_id: String,
    /// Set for group messages only
    pub conversation_id: Option<String>,
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
}

/// Stored message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub tenant_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub conversation_id: Option<String>,
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl MessageRecord {
    /// Conversation key of this message from `viewer`'s point of view
    pub fn conversation_key(&self, viewer: &str) -> ConversationKey {
        match &self.conversation_id {
            Some(id) => ConversationKey::Group(id.clone()),
            None if self.sender_id == viewer => ConversationKey::Direct(self.receiver_id.clone()),
            None => ConversationKey::Direct(self.sender_id.clone()),
        }
    }

    /// Whether `participant` sent or directly received this message
    pub fn involves(&self, participant: &str) -> bool {
        self.sender_id == participant || self.receiver_id == participant
    }

    /// Unread and addressed to `participant`
    pub fn is_unread_for(&self, participant: &str) -> bool {
        self.receiver_id == participant && self.read_at.is_none()
    }
}

impl From<messages::Model> for MessageRecord {
    fn from(model: messages::Model) -> Self {
        let attachment = match (model.attachment_url, model.attachment_name) {
            (Some(url), Some(name)) => Some(Attachment {
                url,
                name,
                mime_type: model
                    .attachment_mime
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
            }),
            _ => None,
        };

        Self {
            id: model.id,
            tenant_id: model.tenant_id,
            sender_id: model.sender_id,
            receiver_id: model.receiver_id,
            conversation_id: model.conversation_id,
            text: model.text,
            attachment,
            sent_at: from_millis(model.sent_at),
            read_at: model.read_at.map(from_millis),
        }
    }
}

/// Online state of one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub participant_id: String,
    pub tenant_id: String,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
}

impl From<presence::Model> for PresenceRecord {
    fn from(model: presence::Model) -> Self {
        Self {
            participant_id: model.participant_id,
            tenant_id: model.tenant_id,
            is_online: model.is_online,
            last_seen: from_millis(model.last_seen),
        }
    }
}

/// Typing flag written by the typist
#[derive(Debug, Clone)]
pub struct TypingUpdate {
    /// Receiver id for direct chats (the typist's conversation key), group id for groups
    pub conversation_id: String,
    pub is_group: bool,
    pub participant_id: String,
    pub tenant_id: String,
    pub is_typing: bool,
}

/// Stored typing flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingRecord {
    pub conversation_id: String,
    pub is_group: bool,
    pub participant_id: String,
    pub tenant_id: String,
    pub is_typing: bool,
    pub updated_at: DateTime<Utc>,
}

impl TypingRecord {
    /// Conversation this signal belongs to from `viewer`'s point of view.
    ///
    /// Returns `None` for direct signals aimed at someone else.
    pub fn conversation_key_for(&self, viewer: &str) -> Option<ConversationKey> {
        if self.is_group {
            Some(ConversationKey::Group(self.conversation_id.clone()))
        } else if self.conversation_id == viewer {
            Some(ConversationKey::Direct(self.participant_id.clone()))
        } else {
            None
        }
    }
}

impl From<typing_signals::Model> for TypingRecord {
    fn from(model: typing_signals::Model) -> Self {
        Self {
            conversation_id: model.conversation_id,
            is_group: model.is_group,
            participant_id: model.participant_id,
            tenant_id: model.tenant_id,
            is_typing: model.is_typing,
            updated_at: from_millis(model.updated_at),
        }
    }
}

/// Chat request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "accepted" => Ok(RequestStatus::Accepted),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(format!("unknown request status '{}'", other)),
        }
    }
}

/// Stored chat request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequestRecord {
    pub id: String,
    pub tenant_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl ChatRequestRecord {
    /// Whether this request is between `a` and `b`, in either direction
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }
}

impl From<chat_requests::Model> for ChatRequestRecord {
    fn from(model: chat_requests::Model) -> Self {
        Self {
            id: model.id,
            tenant_id: model.tenant_id,
            sender_id: model.sender_id,
            receiver_id: model.receiver_id,
            // Unknown strings can only come from manual edits; treat them as still open
            status: model.status.parse().unwrap_or(RequestStatus::Pending),
            created_at: from_millis(model.created_at),
            responded_at: model.responded_at.map(from_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(sender: &str, receiver: &str) -> MessageRecord {
        MessageRecord {
            id: "m1".to_string(),
            tenant_id: "school".to_string(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            conversation_id: None,
            text: Some("hi".to_string()),
            attachment: None,
            sent_at: Utc::now(),
            read_at: None,
        }
    }

    #[test]
    fn test_direct_key_is_counterpart_for_each_viewer() {
        let msg = direct("alice", "bob");
        assert_eq!(
            msg.conversation_key("alice"),
            ConversationKey::Direct("bob".to_string())
        );
        assert_eq!(
            msg.conversation_key("bob"),
            ConversationKey::Direct("alice".to_string())
        );
    }

    #[test]
    fn test_explicit_conversation_id_wins() {
        let mut msg = direct("alice", "class-7b");
        msg.conversation_id = Some("class-7b".to_string());
        assert_eq!(
            msg.conversation_key("alice"),
            ConversationKey::Group("class-7b".to_string())
        );
        assert_eq!(
            msg.conversation_key("carol"),
            ConversationKey::Group("class-7b".to_string())
        );
    }

    #[test]
    fn test_typing_key_resolution() {
        let signal = TypingRecord {
            conversation_id: "bob".to_string(),
            is_group: false,
            participant_id: "alice".to_string(),
            tenant_id: "school".to_string(),
            is_typing: true,
            updated_at: Utc::now(),
        };

        assert_eq!(
            signal.conversation_key_for("bob"),
            Some(ConversationKey::Direct("alice".to_string()))
        );
        assert_eq!(signal.conversation_key_for("carol"), None);
    }

    #[test]
    fn test_request_status_parsing() {
        assert_eq!("accepted".parse::<RequestStatus>(), Ok(RequestStatus::Accepted));
        assert!("revoked".parse::<RequestStatus>().is_err());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(!RequestStatus::Pending.is_terminal());
    }
}
