//! Realtime events in and UI updates out

use campus_store::{
    ChangeEvent, ChangeKind, ChangeRow, ChatRequestRecord, MessageRecord, PresenceRecord,
    TypingRecord,
};
use serde::{Deserialize, Serialize};

use crate::conversation::ConversationSummary;

/// A row change from the realtime feed, typed by entity
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    Message(ChangeKind, MessageRecord),
    Presence(PresenceRecord),
    Typing(TypingRecord),
    ChatRequest(ChangeKind, ChatRequestRecord),
}

impl From<ChangeEvent> for RealtimeEvent {
    fn from(event: ChangeEvent) -> Self {
        match event.row {
            ChangeRow::Message(record) => RealtimeEvent::Message(event.kind, record),
            ChangeRow::Presence(record) => RealtimeEvent::Presence(record),
            ChangeRow::Typing(record) => RealtimeEvent::Typing(record),
            ChangeRow::ChatRequest(record) => RealtimeEvent::ChatRequest(event.kind, record),
        }
    }
}

/// Updates pushed to the UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChatUpdate {
    /// The conversation list was re-derived and differs from the last one
    ConversationsChanged(Vec<ConversationSummary>),

    /// A message this participant can see arrived
    MessageReceived(MessageRecord),

    /// A visible message got its read receipt
    MessageRead(MessageRecord),

    /// A chat request involving this participant was created or answered
    RequestChanged(ChatRequestRecord),

    /// The realtime feed dropped; data shown may be stale
    ConnectionLost,

    /// The feed is back and local state was reloaded
    Reconnected,
}
