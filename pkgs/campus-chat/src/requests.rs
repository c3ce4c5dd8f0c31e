//! Chat request workflow
//!
//! Students need the other student's consent before a direct conversation.
//! A request moves `pending -> accepted` or `pending -> rejected` exactly
//! once; both terminal states are final. A rejected pair may ask again.

use campus_store::{
    is_unique_violation, ChatRequestRecord, ChatRequestStore, RequestStatus, Transition,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result};
use crate::participant::{MessagingPolicy, Participant};

/// Result of asking for consent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Messaging is already allowed; nothing was written
    AlreadyPermitted,
    Created(ChatRequestRecord),
}

/// Consent state machine plus a local cache fed by the realtime feed
pub struct ChatRequestWorkflow {
    store: ChatRequestStore,
    cache: RwLock<HashMap<String, ChatRequestRecord>>,
}

impl ChatRequestWorkflow {
    pub fn new(store: ChatRequestStore) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Whether `me` may send a direct message to `other`
    pub async fn can_message(&self, me: &Participant, other: &Participant) -> Result<bool> {
        match me.messaging_policy(other) {
            MessagingPolicy::Open => Ok(true),
            MessagingPolicy::ConsentRequired => Ok(self
                .store
                .find_between(&me.tenant_id, &me.id, &other.id, RequestStatus::Accepted)
                .await?
                .is_some()),
        }
    }

    /// Ask `receiver` for consent to message them
    pub async fn request(
        &self,
        sender: &Participant,
        receiver: &Participant,
    ) -> Result<RequestOutcome> {
        if sender.id == receiver.id {
            return Err(ChatError::Validation(
                "cannot send a chat request to yourself".to_string(),
            ));
        }

        if self.can_message(sender, receiver).await? {
            debug!("{} may already message {}", sender.id, receiver.id);
            return Ok(RequestOutcome::AlreadyPermitted);
        }

        let duplicate = || ChatError::DuplicateRequest {
            sender: sender.id.clone(),
            receiver: receiver.id.clone(),
        };

        if self
            .store
            .find_between(&sender.tenant_id, &sender.id, &receiver.id, RequestStatus::Pending)
            .await?
            .is_some()
        {
            return Err(duplicate());
        }

        match self
            .store
            .insert_pending(&sender.tenant_id, &sender.id, &receiver.id)
            .await
        {
            Ok(record) => {
                self.apply(&record);
                Ok(RequestOutcome::Created(record))
            }
            Err(e) if is_unique_violation(&e) => Err(duplicate()),
            Err(e) => Err(e.into()),
        }
    }

    /// Accept a pending request addressed to `actor`
    pub async fn accept(&self, actor: &Participant, request_id: &str) -> Result<ChatRequestRecord> {
        self.answer(actor, request_id, RequestStatus::Accepted).await
    }

    /// Reject a pending request addressed to `actor`
    pub async fn reject(&self, actor: &Participant, request_id: &str) -> Result<ChatRequestRecord> {
        self.answer(actor, request_id, RequestStatus::Rejected).await
    }

    async fn answer(
        &self,
        actor: &Participant,
        request_id: &str,
        status: RequestStatus,
    ) -> Result<ChatRequestRecord> {
        let request = self
            .store
            .get(request_id)
            .await?
            .filter(|r| r.tenant_id == actor.tenant_id)
            .ok_or_else(|| ChatError::RequestNotFound(request_id.to_string()))?;

        if request.receiver_id != actor.id {
            return Err(ChatError::NotPermitted(format!(
                "only {} can answer chat request {}",
                request.receiver_id, request_id
            )));
        }

        let transition = match status {
            RequestStatus::Accepted => self.store.accept(request_id).await?,
            _ => self.store.reject(request_id).await?,
        };

        match transition {
            Transition::Applied(record) => {
                info!("{} {} chat request from {}", actor.id, status, record.sender_id);
                self.apply(&record);
                Ok(record)
            }
            Transition::AlreadyFinal(record) => {
                warn!(
                    "Chat request {} cannot become {}: already {}",
                    request_id, status, record.status
                );
                self.apply(&record);
                Err(ChatError::InvalidState {
                    request_id: request_id.to_string(),
                    status: record.status,
                })
            }
            Transition::Missing => Err(ChatError::RequestNotFound(request_id.to_string())),
        }
    }

    /// Pending requests waiting for `participant`'s answer
    pub async fn incoming_pending(
        &self,
        participant: &Participant,
    ) -> Result<Vec<ChatRequestRecord>> {
        Ok(self
            .store
            .incoming(&participant.tenant_id, &participant.id, RequestStatus::Pending)
            .await?)
    }

    /// Pending requests `participant` sent
    pub async fn outgoing_pending(
        &self,
        participant: &Participant,
    ) -> Result<Vec<ChatRequestRecord>> {
        Ok(self
            .store
            .outgoing(&participant.tenant_id, &participant.id, RequestStatus::Pending)
            .await?)
    }

    /// Status of the pair for badges: accepted wins over pending, pending
    /// over rejected, `None` when the pair never exchanged a request
    pub async fn status_between(
        &self,
        a: &Participant,
        b: &Participant,
    ) -> Result<Option<RequestStatus>> {
        for status in [
            RequestStatus::Accepted,
            RequestStatus::Pending,
            RequestStatus::Rejected,
        ] {
            if self
                .store
                .find_between(&a.tenant_id, &a.id, &b.id, status)
                .await?
                .is_some()
            {
                return Ok(Some(status));
            }
        }
        Ok(None)
    }

    /// Load every request involving `participant` into the cache
    pub async fn load(&self, participant: &Participant) -> Result<()> {
        let records = self
            .store
            .list_for(&participant.tenant_id, &participant.id)
            .await?;
        for record in &records {
            self.apply(record);
        }
        Ok(())
    }

    /// Upsert a request into the cache. A terminal status is never replaced
    /// by an older pending copy. Returns whether the cache changed.
    pub fn apply(&self, record: &ChatRequestRecord) -> bool {
        let mut cache = self.cache.write();
        match cache.get(&record.id) {
            Some(current) if current.status.is_terminal() && !record.status.is_terminal() => false,
            Some(current) if current == record => false,
            _ => {
                cache.insert(record.id.clone(), record.clone());
                true
            }
        }
    }

    pub fn cached(&self, request_id: &str) -> Option<ChatRequestRecord> {
        self.cache.read().get(request_id).cloned()
    }

    /// Cached requests, oldest first
    pub fn cached_requests(&self) -> Vec<ChatRequestRecord> {
        let mut all: Vec<ChatRequestRecord> = self.cache.read().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_store::{CampusStore, StoreConfig};
    use chrono::Utc;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_cache_never_reopens_a_final_request() {
        let file = NamedTempFile::new().unwrap();
        let store = CampusStore::open(StoreConfig {
            db_path: file.path().to_path_buf(),
            ..Default::default()
        })
        .await
        .unwrap();
        let workflow = ChatRequestWorkflow::new(store.requests.clone());

        let pending = ChatRequestRecord {
            id: "req-1".to_string(),
            tenant_id: "school".to_string(),
            sender_id: "s1".to_string(),
            receiver_id: "s2".to_string(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            responded_at: None,
        };
        let accepted = ChatRequestRecord {
            status: RequestStatus::Accepted,
            responded_at: Some(Utc::now()),
            ..pending.clone()
        };

        assert!(workflow.apply(&pending));
        assert!(workflow.apply(&accepted));
        assert!(!workflow.apply(&pending));
        assert!(!workflow.apply(&accepted));
        assert_eq!(
            workflow.cached("req-1").map(|r| r.status),
            Some(RequestStatus::Accepted)
        );
        assert_eq!(workflow.cached_requests().len(), 1);
    }
}
