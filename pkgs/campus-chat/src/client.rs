//! Chat client facade

use async_trait::async_trait;
use campus_store::{
    Attachment, CampusStore, ChatRequestRecord, ConversationKey, MessageRecord, RequestStatus,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::config::ChatConfig;
use crate::conversation::ConversationSummary;
use crate::dispatcher::{Dispatcher, RealtimeSource};
use crate::error::{ChatError, Result};
use crate::events::ChatUpdate;
use crate::messages::{MessageContent, MessageService, SendTarget};
use crate::participant::{GroupInfo, Participant, ParticipantDirectory};
use crate::presence::{PresenceState, PresenceTracker};
use crate::requests::{ChatRequestWorkflow, RequestOutcome};
use crate::state::ChatState;
use crate::typing::{TypingBroadcaster, TypingState};

/// A file picked by the user, before upload
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Stores attachment bytes somewhere and returns where
#[async_trait]
pub trait FileUploader: Send + Sync {
    async fn upload(&self, file: UploadFile) -> Result<Attachment>;
}

/// Messaging session of one signed-in participant
pub struct ChatClient {
    state: Arc<ChatState>,
    typing: TypingBroadcaster,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ChatClient {
    /// Start a session over `store`, fed by the store's own change hub
    pub async fn connect(
        store: &CampusStore,
        directory: Arc<dyn ParticipantDirectory>,
        config: ChatConfig,
    ) -> Result<Self> {
        let source: Arc<dyn RealtimeSource> = Arc::new(store.hub.clone());
        Self::connect_with_source(store, directory, source, config).await
    }

    /// Start a session with a custom realtime source
    #[instrument(skip_all)]
    pub async fn connect_with_source(
        store: &CampusStore,
        directory: Arc<dyn ParticipantDirectory>,
        source: Arc<dyn RealtimeSource>,
        config: ChatConfig,
    ) -> Result<Self> {
        let me = directory.resolve_current_participant().await?;

        let presence = Arc::new(PresenceTracker::new(store.presence.clone()));
        let state = Arc::new(ChatState::new(
            me.clone(),
            config.clone(),
            MessageService::new(store.messages.clone()),
            Arc::clone(&presence),
            ChatRequestWorkflow::new(store.requests.clone()),
            store.typing.clone(),
            directory,
        ));

        // Subscribe before loading so nothing written in between is missed
        let subscription = source
            .connect(&me.tenant_id)
            .await
            .map_err(|e| ChatError::Feed(e.to_string()))?;
        let expiries = state.resync().await?;

        presence.publish(&me, true).await;

        let (shutdown, shutdown_rx) = watch::channel(false);

        let mut dispatcher = Dispatcher::new(Arc::clone(&state), source, shutdown_rx.clone());
        dispatcher.schedule(expiries);
        let dispatcher_task = tokio::spawn(dispatcher.run(subscription));

        let heartbeat_task =
            presence.spawn_heartbeat(me.clone(), config.heartbeat_interval, shutdown_rx);

        info!("Chat client connected as {}", me);

        Ok(Self {
            typing: TypingBroadcaster::new(store.typing.clone(), me, config.typing_ttl),
            state,
            shutdown,
            tasks: vec![dispatcher_task, heartbeat_task],
        })
    }

    pub fn me(&self) -> &Participant {
        &self.state.me
    }

    /// UI update stream
    pub fn subscribe(&self) -> broadcast::Receiver<ChatUpdate> {
        self.state.subscribe()
    }

    /// Latest conversation list, most recent first
    pub fn conversations(&self) -> Vec<ConversationSummary> {
        self.state.index().snapshot()
    }

    pub fn conversation(&self, key: &ConversationKey) -> Option<ConversationSummary> {
        self.state.index().get(key)
    }

    pub fn total_unread(&self) -> usize {
        self.state.index().total_unread()
    }

    pub fn groups(&self) -> Vec<GroupInfo> {
        self.state.groups()
    }

    pub fn presence(&self) -> HashMap<String, PresenceState> {
        self.state.presence.snapshot()
    }

    fn lookup(&self, participant_id: &str) -> Result<Participant> {
        let other = self
            .state
            .participant(participant_id)
            .ok_or_else(|| ChatError::UnknownParticipant(participant_id.to_string()))?;

        if other.tenant_id != self.state.me.tenant_id {
            return Err(ChatError::NotPermitted(format!(
                "{} belongs to another school",
                participant_id
            )));
        }
        Ok(other)
    }

    /// Whether a direct message to `participant_id` would be allowed
    pub async fn can_message(&self, participant_id: &str) -> Result<bool> {
        let other = self.lookup(participant_id)?;
        self.state.requests.can_message(&self.state.me, &other).await
    }

    async fn authorize(&self, target: &SendTarget) -> Result<()> {
        match target {
            SendTarget::Direct(id) => {
                if *id == self.state.me.id {
                    return Err(ChatError::Validation(
                        "cannot message yourself".to_string(),
                    ));
                }
                let other = self.lookup(id)?;
                if !self.state.requests.can_message(&self.state.me, &other).await? {
                    return Err(ChatError::ConsentRequired {
                        sender: self.state.me.id.clone(),
                        receiver: other.id,
                    });
                }
                Ok(())
            }
            SendTarget::Group(id) => {
                if self.state.is_member_of(id) {
                    Ok(())
                } else {
                    Err(ChatError::NotPermitted(format!("not a member of {}", id)))
                }
            }
        }
    }

    async fn deliver(&self, target: &SendTarget, content: MessageContent) -> Result<MessageRecord> {
        let record = self
            .state
            .messages
            .send(&self.state.me, target, content)
            .await?;

        self.state.record_local(record.clone());
        self.typing.stop(&target.key()).await;
        Ok(record)
    }

    /// Send a message after the permission gate
    #[instrument(skip(self, content), fields(from = %self.state.me.id))]
    pub async fn send_message(
        &self,
        target: SendTarget,
        content: MessageContent,
    ) -> Result<MessageRecord> {
        let content = content.validated()?;
        self.authorize(&target).await?;
        self.deliver(&target, content).await
    }

    /// Upload `file` and send it, optionally with a caption.
    ///
    /// Nothing is stored when the gate refuses or the upload fails.
    pub async fn send_file(
        &self,
        target: SendTarget,
        caption: Option<String>,
        file: UploadFile,
        uploader: &dyn FileUploader,
    ) -> Result<MessageRecord> {
        self.authorize(&target).await?;

        let attachment = uploader.upload(file).await.map_err(|e| match e {
            ChatError::Upload(reason) => ChatError::Upload(reason),
            other => ChatError::Upload(other.to_string()),
        })?;

        let mut content = MessageContent::attachment(attachment);
        if let Some(caption) = caption {
            content = content.with_caption(caption);
        }
        self.deliver(&target, content).await
    }

    /// Load a conversation and mark everything in it read
    pub async fn open_conversation(&self, key: &ConversationKey) -> Result<Vec<MessageRecord>> {
        let mut thread = self
            .state
            .messages
            .list_for_conversation(&self.state.me, key)
            .await?;

        let marked = self.mark_read_records(key).await?;
        let marked: HashMap<&str, &MessageRecord> =
            marked.iter().map(|m| (m.id.as_str(), m)).collect();
        for message in thread.iter_mut() {
            if let Some(read) = marked.get(message.id.as_str()) {
                message.read_at = read.read_at;
            }
        }
        Ok(thread)
    }

    /// Mark messages addressed to me in `key` as read; returns how many changed
    pub async fn mark_read(&self, key: &ConversationKey) -> Result<usize> {
        Ok(self.mark_read_records(key).await?.len())
    }

    async fn mark_read_records(&self, key: &ConversationKey) -> Result<Vec<MessageRecord>> {
        let marked = self
            .state
            .messages
            .mark_read(&self.state.me, key, Utc::now())
            .await?;
        self.state.record_read(marked.clone());
        Ok(marked)
    }

    pub async fn keystroke(&self, key: &ConversationKey) -> TypingState {
        self.typing.keystroke(key).await
    }

    pub async fn stop_typing(&self, key: &ConversationKey) {
        self.typing.stop(key).await
    }

    pub fn typing_state(&self, key: &ConversationKey) -> TypingState {
        self.typing.state(key)
    }

    /// Ask `participant_id` for consent to message them
    pub async fn request_chat(&self, participant_id: &str) -> Result<RequestOutcome> {
        let other = self.lookup(participant_id)?;
        self.state.requests.request(&self.state.me, &other).await
    }

    pub async fn accept_request(&self, request_id: &str) -> Result<ChatRequestRecord> {
        self.state.requests.accept(&self.state.me, request_id).await
    }

    pub async fn reject_request(&self, request_id: &str) -> Result<ChatRequestRecord> {
        self.state.requests.reject(&self.state.me, request_id).await
    }

    /// Pending requests waiting for my answer
    pub async fn incoming_requests(&self) -> Result<Vec<ChatRequestRecord>> {
        self.state.requests.incoming_pending(&self.state.me).await
    }

    /// Pending requests I sent
    pub async fn outgoing_requests(&self) -> Result<Vec<ChatRequestRecord>> {
        self.state.requests.outgoing_pending(&self.state.me).await
    }

    pub async fn request_status(&self, participant_id: &str) -> Result<Option<RequestStatus>> {
        let other = self.lookup(participant_id)?;
        self.state
            .requests
            .status_between(&self.state.me, &other)
            .await
    }

    /// Clear typing flags, stop background tasks, then go offline
    pub async fn shutdown(mut self) {
        self.typing.stop_all().await;
        let _ = self.shutdown.send(true);

        // No heartbeat tick may land after the offline write
        for task in std::mem::take(&mut self.tasks) {
            let _ = task.await;
        }
        self.state.presence.publish(&self.state.me, false).await;
        info!("Chat client for {} shut down", self.state.me.id);
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}
