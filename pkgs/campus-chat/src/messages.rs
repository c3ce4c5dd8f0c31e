//! Message sending, listing and read receipts
//!
//! [`MessageService`] is the write path into the message log. [`MessageLog`]
//! is the client-side copy that the send path and the realtime feed both feed
//! into; it upserts by message id so a message arriving twice is kept once.

use campus_store::{
    Attachment, ConversationKey, MessageRecord, MessageStore, NewMessage, ThreadScope,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{ChatError, Result};
use crate::participant::Participant;

/// Body of an outgoing message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageContent {
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            attachment: None,
        }
    }

    pub fn attachment(attachment: Attachment) -> Self {
        Self {
            text: None,
            attachment: Some(attachment),
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.text = Some(caption.into());
        self
    }

    /// Drop blank text and fail when nothing is left to send
    pub fn validated(self) -> Result<Self> {
        let text = self
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        if text.is_none() && self.attachment.is_none() {
            return Err(ChatError::Validation(
                "a message needs text or an attachment".to_string(),
            ));
        }

        Ok(Self {
            text,
            attachment: self.attachment,
        })
    }
}

/// Where a message goes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SendTarget {
    Direct(String),
    Group(String),
}

impl SendTarget {
    /// Conversation key of the target as seen by the sender
    pub fn key(&self) -> ConversationKey {
        match self {
            SendTarget::Direct(id) => ConversationKey::Direct(id.clone()),
            SendTarget::Group(id) => ConversationKey::Group(id.clone()),
        }
    }
}

impl From<ConversationKey> for SendTarget {
    fn from(key: ConversationKey) -> Self {
        match key {
            ConversationKey::Direct(id) => SendTarget::Direct(id),
            ConversationKey::Group(id) => SendTarget::Group(id),
        }
    }
}

/// Write and query path for messages of one tenant
#[derive(Clone)]
pub struct MessageService {
    store: MessageStore,
}

impl MessageService {
    pub fn new(store: MessageStore) -> Self {
        Self { store }
    }

    /// Append a message from `sender`.
    ///
    /// Direct messages carry no conversation id; group messages carry the
    /// group id both as conversation id and as receiver.
    pub async fn send(
        &self,
        sender: &Participant,
        target: &SendTarget,
        content: MessageContent,
    ) -> Result<MessageRecord> {
        let content = content.validated()?;

        let (receiver_id, conversation_id) = match target {
            SendTarget::Direct(id) => (id.clone(), None),
            SendTarget::Group(id) => (id.clone(), Some(id.clone())),
        };

        let record = self
            .store
            .insert(NewMessage {
                tenant_id: sender.tenant_id.clone(),
                sender_id: sender.id.clone(),
                receiver_id,
                conversation_id,
                text: content.text,
                attachment: content.attachment,
            })
            .await?;

        debug!("{} sent message {} to {:?}", sender.id, record.id, target);
        Ok(record)
    }

    /// Messages of one conversation, oldest first
    pub async fn list_for_conversation(
        &self,
        viewer: &Participant,
        key: &ConversationKey,
    ) -> Result<Vec<MessageRecord>> {
        let scope = ThreadScope::for_key(&viewer.id, key);
        Ok(self.store.list_thread(&viewer.tenant_id, &scope).await?)
    }

    /// Everything `viewer` can see across direct chats and `group_ids`
    pub async fn list_visible(
        &self,
        viewer: &Participant,
        group_ids: &[String],
    ) -> Result<Vec<MessageRecord>> {
        Ok(self
            .store
            .list_for_participant(&viewer.tenant_id, &viewer.id, group_ids)
            .await?)
    }

    /// Mark messages addressed to `receiver` in `key` as read up to `up_to`.
    ///
    /// Returns the messages newly marked; an empty list means nothing was
    /// unread.
    pub async fn mark_read(
        &self,
        receiver: &Participant,
        key: &ConversationKey,
        up_to: DateTime<Utc>,
    ) -> Result<Vec<MessageRecord>> {
        let scope = ThreadScope::for_key(&receiver.id, key);
        let marked = self
            .store
            .mark_read(&receiver.tenant_id, &receiver.id, &scope, up_to)
            .await?;

        if !marked.is_empty() {
            info!("{} read {} messages in {}", receiver.id, marked.len(), key);
        }
        Ok(marked)
    }
}

/// Local message cache keyed by message id
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    by_id: HashMap<String, MessageRecord>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a message. Returns whether the cache changed.
    ///
    /// A copy without `read_at` never clears one already recorded.
    pub fn upsert(&mut self, mut record: MessageRecord) -> bool {
        match self.by_id.get(&record.id) {
            Some(existing) => {
                if existing.read_at.is_some() {
                    record.read_at = existing.read_at;
                }
                if *existing == record {
                    return false;
                }
                self.by_id.insert(record.id.clone(), record);
                true
            }
            None => {
                self.by_id.insert(record.id.clone(), record);
                true
            }
        }
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = MessageRecord>) -> bool {
        records
            .into_iter()
            .fold(false, |changed, record| self.upsert(record) || changed)
    }

    pub fn get(&self, message_id: &str) -> Option<&MessageRecord> {
        self.by_id.get(message_id)
    }

    /// All messages, oldest first, ties by id
    pub fn messages(&self) -> Vec<MessageRecord> {
        let mut all: Vec<MessageRecord> = self.by_id.values().cloned().collect();
        all.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
