//! Client-side chat state shared by the facade and the dispatcher

use campus_store::{ChangeKind, MessageRecord, TypingStore};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::ChatConfig;
use crate::conversation::{derive_conversations, ConversationIndex, IndexInputs};
use crate::error::Result;
use crate::events::{ChatUpdate, RealtimeEvent};
use crate::messages::{MessageLog, MessageService};
use crate::participant::{DirectoryEntry, GroupInfo, Participant, ParticipantDirectory};
use crate::presence::PresenceTracker;
use crate::requests::ChatRequestWorkflow;
use crate::typing::TypingBoard;

pub(crate) struct ChatState {
    pub(crate) me: Participant,
    pub(crate) config: ChatConfig,
    pub(crate) messages: MessageService,
    pub(crate) presence: Arc<PresenceTracker>,
    pub(crate) requests: ChatRequestWorkflow,
    typing_store: TypingStore,
    directory: Arc<dyn ParticipantDirectory>,
    log: RwLock<MessageLog>,
    typing: RwLock<TypingBoard>,
    participants: RwLock<HashMap<String, DirectoryEntry>>,
    groups: RwLock<Vec<GroupInfo>>,
    index: ConversationIndex,
    updates: broadcast::Sender<ChatUpdate>,
}

impl ChatState {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        me: Participant,
        config: ChatConfig,
        messages: MessageService,
        presence: Arc<PresenceTracker>,
        requests: ChatRequestWorkflow,
        typing_store: TypingStore,
        directory: Arc<dyn ParticipantDirectory>,
    ) -> Self {
        let (updates, _rx) = broadcast::channel(config.update_capacity.max(1));
        Self {
            typing: RwLock::new(TypingBoard::new(config.typing_ttl)),
            me,
            config,
            messages,
            presence,
            requests,
            typing_store,
            directory,
            log: RwLock::new(MessageLog::new()),
            participants: RwLock::new(HashMap::new()),
            groups: RwLock::new(Vec::new()),
            index: ConversationIndex::new(),
            updates,
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ChatUpdate> {
        self.updates.subscribe()
    }

    fn emit(&self, update: ChatUpdate) {
        // No UI listening is fine
        let _ = self.updates.send(update);
    }

    pub(crate) fn index(&self) -> &ConversationIndex {
        &self.index
    }

    pub(crate) fn participant(&self, participant_id: &str) -> Option<Participant> {
        self.participants
            .read()
            .get(participant_id)
            .map(|e| e.participant.clone())
    }

    pub(crate) fn is_member_of(&self, group_id: &str) -> bool {
        self.groups.read().iter().any(|g| g.group_id == group_id)
    }

    pub(crate) fn groups(&self) -> Vec<GroupInfo> {
        self.groups.read().clone()
    }

    /// Whether `message` belongs to a conversation this participant is in
    pub(crate) fn is_visible(&self, message: &MessageRecord) -> bool {
        match &message.conversation_id {
            Some(group_id) => self.is_member_of(group_id),
            None => message.involves(&self.me.id),
        }
    }

    /// Reload everything from the directory and the stores.
    ///
    /// Returns the instants at which loaded typing signals lapse.
    pub(crate) async fn resync(&self) -> Result<Vec<Instant>> {
        let participants = self
            .directory
            .list_participants_in_tenant(&self.me.tenant_id)
            .await?;
        let groups = self.directory.list_groups_for(&self.me).await?;
        let group_ids: Vec<String> = groups.iter().map(|g| g.group_id.clone()).collect();

        let messages = self.messages.list_visible(&self.me, &group_ids).await?;
        self.presence.load(&self.me.tenant_id).await?;
        self.requests.load(&self.me).await?;
        let signals = self.typing_store.list_typing(&self.me.tenant_id).await?;

        *self.participants.write() = participants
            .into_iter()
            .map(|e| (e.participant.id.clone(), e))
            .collect();
        *self.groups.write() = groups;
        self.log.write().extend(messages);

        let now = Instant::now();
        let wall_now = Utc::now();
        let expiries: Vec<Instant> = {
            let mut board = self.typing.write();
            board.clear();
            signals
                .iter()
                .filter_map(|s| board.apply(s, &self.me.id, now, wall_now))
                .collect()
        };

        debug!(
            "Resynced {} messages for {}",
            self.log.read().len(),
            self.me.id
        );
        self.refresh();
        Ok(expiries)
    }

    /// Record a message this client wrote itself
    pub(crate) fn record_local(&self, record: MessageRecord) {
        if self.log.write().upsert(record) {
            self.refresh();
        }
    }

    /// Record read receipts this client wrote itself
    pub(crate) fn record_read(&self, records: Vec<MessageRecord>) {
        if self.log.write().extend(records) {
            self.refresh();
        }
    }

    /// Apply one realtime event. Returns when a typing signal it carried lapses.
    pub(crate) fn apply(&self, event: RealtimeEvent) -> Option<Instant> {
        match event {
            RealtimeEvent::Message(kind, record) => {
                if !self.is_visible(&record) {
                    return None;
                }
                let changed = self.log.write().upsert(record.clone());
                if changed {
                    trace!("Applied {:?} of message {}", kind, record.id);
                    self.emit(match kind {
                        ChangeKind::Insert => ChatUpdate::MessageReceived(record),
                        ChangeKind::Update => ChatUpdate::MessageRead(record),
                    });
                    self.refresh();
                }
                None
            }
            RealtimeEvent::Presence(record) => {
                if self.presence.apply(&record) {
                    self.refresh();
                }
                None
            }
            RealtimeEvent::Typing(record) => {
                let expires_at =
                    self.typing
                        .write()
                        .apply(&record, &self.me.id, Instant::now(), Utc::now());
                self.refresh();
                expires_at
            }
            RealtimeEvent::ChatRequest(_, record) => {
                if record.sender_id != self.me.id && record.receiver_id != self.me.id {
                    return None;
                }
                if self.requests.apply(&record) {
                    self.emit(ChatUpdate::RequestChanged(record));
                }
                None
            }
        }
    }

    /// Drop lapsed typing signals and re-derive
    pub(crate) fn expire_typing(&self, now: Instant) {
        self.typing.write().prune(now);
        self.refresh();
    }

    pub(crate) fn connection_lost(&self) {
        self.emit(ChatUpdate::ConnectionLost);
    }

    pub(crate) fn reconnected(&self) {
        self.emit(ChatUpdate::Reconnected);
    }

    /// Re-derive the conversation list and announce it when it changed
    pub(crate) fn refresh(&self) {
        let messages = self.log.read().messages();
        let presence = self.presence.snapshot();
        let typing = self.typing.read().active_keys(Instant::now());
        let participants = self.participants.read().clone();
        let groups = self.groups.read().clone();

        let summaries = derive_conversations(&IndexInputs {
            viewer: &self.me.id,
            messages: &messages,
            presence: &presence,
            typing: &typing,
            participants: &participants,
            groups: &groups,
        });

        if self.index.replace(summaries.clone()) {
            self.emit(ChatUpdate::ConversationsChanged(summaries));
        }
    }
}
